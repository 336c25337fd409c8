//! Bundled TTS engines, registered explicitly by name.

pub mod bouyomichan;
pub mod voicevox;

use crate::tts::engine::{EngineContext, SpeechEngine};

/// Construct an engine by name. Returns None for unknown names; callers log
/// and continue with the remaining engines.
pub fn create_engine(name: &str, ctx: EngineContext) -> Option<Box<dyn SpeechEngine>> {
    match name {
        "voicevox" => Some(Box::new(voicevox::VoiceVox::new(ctx))),
        "bouyomichan" => Some(Box::new(bouyomichan::BouyomiChan::new(ctx))),
        _ => None,
    }
}

/// Names accepted by [`create_engine`].
pub fn registered_engine_names() -> Vec<&'static str> {
    vec!["bouyomichan", "voicevox"]
}
