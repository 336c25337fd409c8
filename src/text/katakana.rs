//! Latin-to-Katakana phonetic conversion for Japanese readout.
//! Greedy longest-match over a romaji syllable table; words that contain no
//! convertible letters pass through unchanged. CamelCase words are split at
//! case boundaries before conversion.

use std::collections::HashMap;
use std::sync::OnceLock;

/// Romaji syllable table. Longest units first is not required; matching is
/// longest-match over the unit lengths present in the table.
const ROMAJI_TABLE: &[(&str, &str)] = &[
    // youon and digraphs
    ("kya", "キャ"), ("kyu", "キュ"), ("kyo", "キョ"),
    ("sha", "シャ"), ("shu", "シュ"), ("sho", "ショ"), ("shi", "シ"),
    ("cha", "チャ"), ("chu", "チュ"), ("cho", "チョ"), ("chi", "チ"),
    ("nya", "ニャ"), ("nyu", "ニュ"), ("nyo", "ニョ"),
    ("hya", "ヒャ"), ("hyu", "ヒュ"), ("hyo", "ヒョ"),
    ("mya", "ミャ"), ("myu", "ミュ"), ("myo", "ミョ"),
    ("rya", "リャ"), ("ryu", "リュ"), ("ryo", "リョ"),
    ("gya", "ギャ"), ("gyu", "ギュ"), ("gyo", "ギョ"),
    ("ja", "ジャ"), ("ju", "ジュ"), ("jo", "ジョ"), ("ji", "ジ"),
    ("bya", "ビャ"), ("byu", "ビュ"), ("byo", "ビョ"),
    ("pya", "ピャ"), ("pyu", "ピュ"), ("pyo", "ピョ"),
    ("tsu", "ツ"),
    // basic syllables
    ("ka", "カ"), ("ki", "キ"), ("ku", "ク"), ("ke", "ケ"), ("ko", "コ"),
    ("sa", "サ"), ("su", "ス"), ("se", "セ"), ("so", "ソ"),
    ("ta", "タ"), ("te", "テ"), ("to", "ト"),
    ("na", "ナ"), ("ni", "ニ"), ("nu", "ヌ"), ("ne", "ネ"), ("no", "ノ"),
    ("ha", "ハ"), ("hi", "ヒ"), ("fu", "フ"), ("he", "ヘ"), ("ho", "ホ"),
    ("ma", "マ"), ("mi", "ミ"), ("mu", "ム"), ("me", "メ"), ("mo", "モ"),
    ("ya", "ヤ"), ("yu", "ユ"), ("yo", "ヨ"),
    ("ra", "ラ"), ("ri", "リ"), ("ru", "ル"), ("re", "レ"), ("ro", "ロ"),
    ("wa", "ワ"), ("wo", "ヲ"),
    ("ga", "ガ"), ("gi", "ギ"), ("gu", "グ"), ("ge", "ゲ"), ("go", "ゴ"),
    ("za", "ザ"), ("zu", "ズ"), ("ze", "ゼ"), ("zo", "ゾ"),
    ("da", "ダ"), ("de", "デ"), ("do", "ド"),
    ("ba", "バ"), ("bi", "ビ"), ("bu", "ブ"), ("be", "ベ"), ("bo", "ボ"),
    ("pa", "パ"), ("pi", "ピ"), ("pu", "プ"), ("pe", "ペ"), ("po", "ポ"),
    ("va", "ヴァ"), ("vi", "ヴィ"), ("vu", "ヴ"), ("ve", "ヴェ"), ("vo", "ヴォ"),
    ("fa", "ファ"), ("fi", "フィ"), ("fe", "フェ"), ("fo", "フォ"),
    ("a", "ア"), ("i", "イ"), ("u", "ウ"), ("e", "エ"), ("o", "オ"),
    ("n", "ン"),
    ("-", "ー"),
];

fn romaji_map() -> &'static (HashMap<&'static str, &'static str>, usize) {
    static MAP: OnceLock<(HashMap<&'static str, &'static str>, usize)> = OnceLock::new();
    MAP.get_or_init(|| {
        let map: HashMap<_, _> = ROMAJI_TABLE.iter().copied().collect();
        let max_unit_len = ROMAJI_TABLE.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
        (map, max_unit_len)
    })
}

/// Convert a single lowercase romaji word to Katakana.
/// Returns None if any part of the word cannot be converted.
fn romaji_word_to_katakana(word: &str) -> Option<String> {
    let (map, max_unit_len) = romaji_map();
    let bytes = word.as_bytes();
    let mut out = String::new();
    let mut pos = 0;

    while pos < bytes.len() {
        // Sokuon: doubled consonant (e.g. "tte") becomes ッ.
        if pos + 1 < bytes.len()
            && bytes[pos] == bytes[pos + 1]
            && bytes[pos].is_ascii_alphabetic()
            && !matches!(bytes[pos], b'a' | b'i' | b'u' | b'e' | b'o' | b'n')
        {
            out.push('ッ');
            pos += 1;
            continue;
        }

        let mut matched = false;
        for len in (1..=(*max_unit_len).min(bytes.len() - pos)).rev() {
            let unit = &word[pos..pos + len];
            if let Some(kana) = map.get(unit) {
                out.push_str(kana);
                pos += len;
                matched = true;
                break;
            }
        }
        if !matched {
            return None;
        }
    }
    Some(out)
}

/// Split a word at CamelCase boundaries ("TwitchBot" -> ["Twitch", "Bot"]).
fn split_camel_case(word: &str) -> Vec<String> {
    let mut parts: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for c in word.chars() {
        if c.is_uppercase() && prev_lower && !current.is_empty() {
            parts.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_lowercase();
        current.push(c);
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

/// Convert Latin words in `content` to Katakana where possible.
/// Non-ASCII runs and unconvertible words are left untouched.
pub fn katakanaize(content: &str) -> String {
    let mut out = String::with_capacity(content.len() * 2);
    let mut word = String::new();

    let flush = |word: &mut String, out: &mut String| {
        if word.is_empty() {
            return;
        }
        let converted: Vec<String> = split_camel_case(word)
            .iter()
            .map(|part| {
                romaji_word_to_katakana(&part.to_lowercase()).unwrap_or_else(|| part.clone())
            })
            .collect();
        out.push_str(&converted.concat());
        word.clear();
    };

    for c in content.chars() {
        if c.is_ascii_alphabetic() || c == '-' {
            word.push(c);
        } else {
            flush(&mut word, &mut out);
            out.push(c);
        }
    }
    flush(&mut word, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_romaji_words_convert() {
        assert_eq!(katakanaize("konnichiwa"), "コンニチワ");
        assert_eq!(katakanaize("arigatou"), "アリガトウ");
    }

    #[test]
    fn sokuon_and_long_vowel() {
        assert_eq!(katakanaize("matte"), "マッテ");
        assert_eq!(katakanaize("ra-men"), "ラーメン");
    }

    #[test]
    fn camel_case_words_split_before_conversion() {
        assert_eq!(katakanaize("NekoSama"), "ネコサマ");
    }

    #[test]
    fn unconvertible_words_pass_through() {
        assert_eq!(katakanaize("xyzzy"), "xyzzy");
        assert_eq!(katakanaize("hello srv"), "hello srv");
    }

    #[test]
    fn japanese_text_is_untouched() {
        assert_eq!(katakanaize("こんにちは world"), "こんにちは world");
        assert_eq!(katakanaize("既に日本語"), "既に日本語");
    }
}
