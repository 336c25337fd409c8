//! yomiage: Twitch chat translation + speech readout bot core.
//! Listens to chat messages, detects their language, translates them, and
//! synthesizes speech for playback while echoing results to chat and
//! console. The chat platform itself is an external collaborator; this
//! crate provides the translation cache / in-flight deduplication layer and
//! the TTS synthesis + playback pipeline.

pub mod cache;
pub mod chat;
pub mod config;
pub mod queue;
pub mod text;
pub mod trans;
pub mod tts;
