//! Voice models and per-user-type parameter management.
//! A `TtsParam` is the unit of work flowing through the synthesis and
//! playback queues; it is owned by exactly one stage at a time.

use std::collections::HashMap;
use std::path::PathBuf;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

/// Integer voice parameter, None when the engine does not support it.
/// VOICEVOX-style engines store floating point values multiplied by 100.
pub type VoiceParam = Option<i32>;

/// Voice parameters used for synthesis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Voice {
    pub cast: String,
    pub volume: VoiceParam,
    pub speed: VoiceParam,
    pub tone: VoiceParam,
    pub alpha: VoiceParam,
    pub intonation: VoiceParam,
}

impl Voice {
    /// Parameter value with a fallback for unsupported (None) entries.
    pub fn get(&self, name: &str, default: i32) -> i32 {
        let value = match name {
            "volume" => self.volume,
            "speed" => self.speed,
            "tone" => self.tone,
            "alpha" => self.alpha,
            "intonation" => self.intonation,
            _ => None,
        };
        value.unwrap_or(default)
    }
}

/// Engine and voice configuration for one language.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsInfo {
    pub supported_lang: Option<String>,
    pub engine: Option<String>,
    pub voice: Voice,
}

/// Maps language codes ("ja", "en", "all") to TTS settings.
pub type TtsInfoPerLanguage = HashMap<String, TtsInfo>;

/// Voice configurations organized by user type and language.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UserTypeInfo {
    pub streamer: TtsInfoPerLanguage,
    pub moderator: TtsInfoPerLanguage,
    pub vip: TtsInfoPerLanguage,
    pub subscriber: TtsInfoPerLanguage,
    pub others: TtsInfoPerLanguage,
    pub system: TtsInfoPerLanguage,
}

impl UserTypeInfo {
    fn tables(&self) -> [&TtsInfoPerLanguage; 6] {
        [
            &self.streamer,
            &self.moderator,
            &self.vip,
            &self.subscriber,
            &self.others,
            &self.system,
        ]
    }

    /// Unique engine names across all user types and languages, sorted.
    pub fn get_tts_engine_list(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tables()
            .iter()
            .flat_map(|table| table.values())
            .filter_map(|info| info.engine.clone())
            .filter(|name| !name.is_empty())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Cast names used by the given engine.
    pub fn get_cast_list(&self, engine_name: &str) -> Vec<String> {
        let mut casts: Vec<String> = self
            .tables()
            .iter()
            .flat_map(|table| table.values())
            .filter(|info| info.engine.as_deref() == Some(engine_name))
            .map(|info| info.voice.cast.clone())
            .collect();
        casts.sort();
        casts.dedup();
        casts
    }
}

/// Parameters for one TTS synthesis request.
#[derive(Debug, Clone, Default)]
pub struct TtsParam {
    /// Text to be synthesized.
    pub content: String,
    /// Language code; None means not yet detected.
    pub content_lang: Option<String>,
    pub tts_info: TtsInfo,
    /// Output audio file path, set once synthesis completes.
    pub filepath: Option<PathBuf>,
    pub message_id: Option<String>,
    pub author_name: Option<String>,
}

/// Chat sender category, highest privilege first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserCategory {
    Streamer,
    Moderator,
    Vip,
    Subscriber,
    Others,
    System,
}

/// Inline voice parameter commands, e.g. `{v100, s50}`.
/// v: volume, s: speed, t: tone, a: alpha, i: intonation.
const COMMAND_PATTERN: &str = r"(?i)\{\s*((?:[aistv]-?\d+(?:,\s*|\s+))*[aistv]-?\d+)\s*\}";

/// Selects voices by user category and language and applies one-shot
/// per-message parameter overrides.
pub struct ParameterManager {
    voice_parameters: UserTypeInfo,
    native_language: String,
    onetime_voice: Voice,
    usertype_voices: TtsInfoPerLanguage,
    command_re: Regex,
}

impl ParameterManager {
    pub fn new(voice_parameters: UserTypeInfo, native_language: impl Into<String>) -> Self {
        Self {
            voice_parameters,
            native_language: native_language.into(),
            onetime_voice: Voice::default(),
            usertype_voices: TtsInfoPerLanguage::new(),
            command_re: Regex::new(COMMAND_PATTERN).expect("command pattern must compile"),
        }
    }

    pub fn voice_parameters(&self) -> &UserTypeInfo {
        &self.voice_parameters
    }

    /// Reset temporary state between messages.
    pub fn clear(&mut self) {
        self.onetime_voice = Voice::default();
        self.usertype_voices.clear();
    }

    /// Load the voice table matching the sender's category.
    pub fn select_voice_usertype(&mut self, category: UserCategory) {
        self.clear();
        debug!(?category, "selecting voices for user category");
        let table = match category {
            UserCategory::Streamer => &self.voice_parameters.streamer,
            UserCategory::Moderator => &self.voice_parameters.moderator,
            UserCategory::Vip => &self.voice_parameters.vip,
            UserCategory::Subscriber => &self.voice_parameters.subscriber,
            UserCategory::Others => &self.voice_parameters.others,
            UserCategory::System => &self.voice_parameters.system,
        };
        self.usertype_voices.extend(table.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    /// Parse `{v100, s50}` style command blocks out of the message content,
    /// blanking each block in place. The last command for the same
    /// parameter wins.
    pub fn command_voiceparameters(&mut self, content: &mut String) {
        let matches: Vec<(usize, usize, String)> = self
            .command_re
            .captures_iter(content)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                Some((whole.start(), whole.end(), caps.get(1)?.as_str().to_lowercase()))
            })
            .collect();
        if matches.is_empty() {
            return;
        }

        let mut blanked = content.clone();
        for (start, end, _) in matches.iter().rev() {
            blanked.replace_range(*start..*end, &" ".repeat(end - start));
        }
        *content = blanked;

        for (_, _, body) in &matches {
            for item in body.split([',', ' ']).map(str::trim).filter(|s| !s.is_empty()) {
                if item.len() < 2 {
                    continue;
                }
                let (name, value) = item.split_at(1);
                let Ok(value) = value.parse::<i32>() else {
                    warn!(item, "invalid voice parameter command");
                    continue;
                };
                match name {
                    "v" => self.onetime_voice.volume = Some(value),
                    "s" => self.onetime_voice.speed = Some(value),
                    "t" => self.onetime_voice.tone = Some(value),
                    "a" => self.onetime_voice.alpha = Some(value),
                    "i" => self.onetime_voice.intonation = Some(value),
                    _ => {}
                }
            }
        }
        debug!(voice = ?self.onetime_voice, "temporary voice parameters");
    }

    /// Voice parameters for the given language, falling back to the "all"
    /// entry, with any one-shot overrides applied.
    pub fn get_voice_param(&self, lang: Option<&str>) -> Result<TtsInfo, String> {
        let lang = lang.unwrap_or(&self.native_language);
        let base = self
            .usertype_voices
            .get(lang)
            .or_else(|| self.usertype_voices.get("all"));
        let Some(base) = base else {
            let msg = format!("voice parameters for '{lang}' and 'all' are missing");
            error!("{msg}");
            return Err(msg);
        };

        let mut info = base.clone();
        if let Some(v) = self.onetime_voice.volume {
            info.voice.volume = Some(v);
        }
        if let Some(v) = self.onetime_voice.speed {
            info.voice.speed = Some(v);
        }
        if let Some(v) = self.onetime_voice.tone {
            info.voice.tone = Some(v);
        }
        if let Some(v) = self.onetime_voice.alpha {
            info.voice.alpha = Some(v);
        }
        if let Some(v) = self.onetime_voice.intonation {
            info.voice.intonation = Some(v);
        }
        Ok(info)
    }
}
