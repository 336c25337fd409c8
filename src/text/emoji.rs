//! Emoji detection and replacement for readout.
//! Known emoji are replaced with a spoken word in the message language;
//! remaining pictographs are stripped so TTS engines never receive them.

/// (emoji, english reading, japanese reading)
const EMOJI_WORDS: &[(&str, &str, &str)] = &[
    ("😀", "grinning face", "にこにこ"),
    ("😂", "tears of joy", "うれし泣き"),
    ("😅", "sweat smile", "苦笑い"),
    ("😊", "smiling face", "にっこり"),
    ("😍", "heart eyes", "ハートの目"),
    ("🤣", "rolling on the floor laughing", "大笑い"),
    ("😭", "loudly crying", "大泣き"),
    ("👍", "thumbs up", "いいね"),
    ("👏", "clapping", "拍手"),
    ("🙏", "folded hands", "お願い"),
    ("❤", "red heart", "ハート"),
    ("💕", "two hearts", "ハートふたつ"),
    ("🔥", "fire", "ファイア"),
    ("🎉", "party popper", "クラッカー"),
    ("✨", "sparkles", "キラキラ"),
    ("💀", "skull", "ガイコツ"),
    ("😱", "screaming", "絶叫"),
    ("🤔", "thinking face", "考え中"),
    ("👀", "eyes", "目"),
    ("🙌", "raised hands", "ばんざい"),
];

/// Whether a character belongs to the emoji / pictograph blocks.
fn is_emoji_char(c: char) -> bool {
    matches!(c as u32,
        0x1F000..=0x1FAFF   // pictographs, emoticons, symbols
        | 0x2600..=0x27BF   // misc symbols, dingbats
        | 0x2B00..=0x2BFF   // arrows, stars
        | 0x1F1E6..=0x1F1FF // regional indicators
        | 0xFE0E..=0xFE0F   // variation selectors
        | 0x200D            // zero-width joiner
        | 0x20E3            // combining keycap
    )
}

/// Converts emoji to speakable text.
pub struct EmojiHandler {
    native_language: String,
}

impl EmojiHandler {
    pub fn new(native_language: impl Into<String>) -> Self {
        Self {
            native_language: native_language.into(),
        }
    }

    /// True when the text consists only of emoji (whitespace ignored).
    pub fn is_purely_emoji(&self, text: &str) -> bool {
        let mut seen_any = false;
        for c in text.chars() {
            if c.is_whitespace() {
                continue;
            }
            if !is_emoji_char(c) {
                return false;
            }
            seen_any = true;
        }
        seen_any
    }

    /// Replace known emoji with their spoken word in `lang` (falling back to
    /// the native language reading) and strip any remaining pictographs.
    pub fn emojize_to_text(&self, content: &str, lang: &str) -> String {
        let use_japanese = lang == "ja" || (lang.is_empty() && self.native_language == "ja");

        let mut replaced = content.to_string();
        for (emoji, english, japanese) in EMOJI_WORDS {
            if replaced.contains(emoji) {
                let word = if use_japanese { japanese } else { english };
                replaced = replaced.replace(emoji, &format!(" {word} "));
            }
        }

        let stripped: String = replaced.chars().filter(|c| !is_emoji_char(*c)).collect();

        // Collapse whitespace runs introduced by the substitutions.
        let mut out = String::with_capacity(stripped.len());
        let mut last_was_space = false;
        for c in stripped.chars() {
            if c == ' ' {
                if !last_was_space {
                    out.push(c);
                }
                last_was_space = true;
            } else {
                out.push(c);
                last_was_space = false;
            }
        }
        out.trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_emoji_become_words() {
        let handler = EmojiHandler::new("ja");
        assert_eq!(handler.emojize_to_text("nice 👍", "en"), "nice thumbs up");
        assert_eq!(handler.emojize_to_text("すごい 👍", "ja"), "すごい いいね");
    }

    #[test]
    fn unknown_pictographs_are_stripped() {
        let handler = EmojiHandler::new("en");
        assert_eq!(handler.emojize_to_text("hello 🦖 world", "en"), "hello world");
    }

    #[test]
    fn purely_emoji_detection() {
        let handler = EmojiHandler::new("en");
        assert!(handler.is_purely_emoji("😀 👍"));
        assert!(!handler.is_purely_emoji("hi 😀"));
        assert!(!handler.is_purely_emoji("   "));
    }
}
