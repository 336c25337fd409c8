//! Text-to-speech pipeline: engine dispatch, audio playback and temporary
//! file lifecycle, coordinated by the TTS manager.

pub mod engine;
pub mod engines;
pub mod file_manager;
pub mod manager;
pub mod params;
pub mod playback;
pub mod synthesis;

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TtsError {
    #[error("audio file already exists: '{0}'")]
    FileExists(PathBuf),
    #[error("could not create audio file: {0}")]
    FileCreate(String),
    #[error("unsupported TTS parameter: {0}")]
    NotSupported(String),
    #[error("invalid server configuration: {0}")]
    ServerConfig(String),
    #[error("TTS engine error: {0}")]
    Engine(String),
}
