//! Local language detection via whatlang.
//! Used before hitting a translation engine: reliable detections are cached
//! together with their confidence score.

/// A reliable local detection result.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// ISO 639-1 code ("other" for languages outside the table).
    pub lang: String,
    /// Detector confidence in 0.0..=1.0.
    pub confidence: f64,
}

/// Detects the dominant language of `text`.
/// Returns None if detection is unreliable.
pub fn detect_language(text: &str) -> Option<Detection> {
    let info = whatlang::detect(text)?;
    if !info.is_reliable() {
        return None;
    }
    Some(Detection {
        lang: lang_to_code(info.lang()),
        confidence: info.confidence(),
    })
}

fn lang_to_code(lang: whatlang::Lang) -> String {
    use whatlang::Lang::*;
    match lang {
        Eng => "en",
        Cmn => "zh",
        Jpn => "ja",
        Kor => "ko",
        Fra => "fr",
        Deu => "de",
        Spa => "es",
        Rus => "ru",
        Por => "pt",
        Ita => "it",
        Ara => "ar",
        Hin => "hi",
        Tur => "tr",
        Vie => "vi",
        Tha => "th",
        Nld => "nl",
        Pol => "pl",
        Ukr => "uk",
        _ => "other",
    }
    .to_string()
}
