//! JSON configuration loading.
//! Every field has a default so a missing or partial file degrades to a
//! runnable configuration instead of failing startup.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::tts::params::UserTypeInfo;

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "config IO error: {e}"),
            ConfigError::Parse(e) => write!(f, "config parse error: {e}"),
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Parse(e)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory for temporary audio files.
    pub tmp_dir: PathBuf,
    /// Path of the persistent translation cache database.
    pub cache_db_path: PathBuf,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            tmp_dir: std::env::temp_dir(),
            cache_db_path: PathBuf::from("translation_cache.db"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TranslationSettings {
    /// Translation engines in priority order; the first one is active.
    pub engines: Vec<String>,
    pub native_language: String,
    pub second_language: String,
}

impl Default for TranslationSettings {
    fn default() -> Self {
        Self {
            engines: vec!["google".to_string()],
            native_language: "ja".to_string(),
            second_language: "en".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TtsSettings {
    /// Languages allowed for readout. Empty list allows every language.
    pub enabled_languages: Vec<String>,
    /// Convert Latin words to Katakana before Japanese readout.
    pub katakanaize: bool,
    /// Maximum characters to read out per message. 0 disables the limit.
    pub limit_characters: usize,
    /// Playback time limit in seconds. 0 disables the limit.
    pub limit_time: f64,
}

impl Default for TtsSettings {
    fn default() -> Self {
        Self {
            enabled_languages: Vec::new(),
            katakanaize: false,
            limit_characters: 0,
            limit_time: 0.0,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Server string, e.g. "http://127.0.0.1:50021". Protocol optional.
    pub server: Option<String>,
    /// Request timeout in seconds.
    pub timeout: f64,
    /// Start speaking before the full message is synthesized.
    pub early_speech: bool,
    /// Launch the engine process together with the bot.
    pub auto_startup: bool,
    /// Path of the engine executable for linked startup.
    pub execute_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralSettings,
    pub translation: TranslationSettings,
    pub tts: TtsSettings,
    /// Per-TTS-engine settings keyed by engine name.
    pub engines: HashMap<String, EngineSettings>,
    pub voice_parameters: UserTypeInfo,
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }
}
