//! BouyomiChan socket engine.
//! Sends a binary talk command over TCP; BouyomiChan plays the audio on its
//! side, so this engine never produces a file or touches the playback queue.

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, error};

use crate::config::EngineSettings;
use crate::tts::engine::{EngineConfig, EngineContext, SpeechEngine};
use crate::tts::params::{TtsParam, Voice};
use crate::tts::TtsError;

const ENGINE_NAME: &str = "bouyomichan";

/// Talk command id of the BouyomiChan socket protocol.
const C_TALK: u16 = 0x0001;
/// Character code field: 0 = UTF-8.
const CODE_UTF8: u8 = 0;

pub struct BouyomiChan {
    #[allow(dead_code)]
    ctx: EngineContext,
    config: EngineConfig,
}

impl BouyomiChan {
    pub fn new(ctx: EngineContext) -> Self {
        Self {
            ctx,
            config: EngineConfig::default(),
        }
    }

    fn clamp(value: i32, min: i32, max: i32) -> i16 {
        value.clamp(min, max) as i16
    }

    /// Build the talk frame:
    /// command u16, speed i16, tone i16, volume i16, voice u16, code u8,
    /// length u32, message bytes — all little-endian.
    fn talk_command(param: &TtsParam) -> Vec<u8> {
        let voice: &Voice = &param.tts_info.voice;
        let speed = voice.speed.map_or(-1, |v| Self::clamp(v, 50, 300));
        let tone = voice.tone.map_or(-1, |v| Self::clamp(v, 50, 200));
        let volume = voice.volume.map_or(-1, |v| Self::clamp(v, 0, 100));
        let voice_id: u16 = voice.cast.trim().parse().unwrap_or(0);
        let message = param.content.as_bytes();

        let mut frame = Vec::with_capacity(15 + message.len());
        frame.extend_from_slice(&C_TALK.to_le_bytes());
        frame.extend_from_slice(&speed.to_le_bytes());
        frame.extend_from_slice(&tone.to_le_bytes());
        frame.extend_from_slice(&volume.to_le_bytes());
        frame.extend_from_slice(&voice_id.to_le_bytes());
        frame.push(CODE_UTF8);
        frame.extend_from_slice(&(message.len() as u32).to_le_bytes());
        frame.extend_from_slice(message);
        frame
    }
}

#[async_trait]
impl SpeechEngine for BouyomiChan {
    fn engine_name(&self) -> &str {
        ENGINE_NAME
    }

    fn initialize_engine(&mut self, settings: &EngineSettings) -> bool {
        match EngineConfig::from_settings(settings) {
            Ok(config) => {
                self.config = config;
                true
            }
            Err(e) => {
                error!(error = %e, "invalid bouyomichan configuration");
                false
            }
        }
    }

    async fn speech_synthesis(&self, param: TtsParam) -> Result<(), TtsError> {
        debug!(content = %param.content, "bouyomichan talk command");
        let frame = Self::talk_command(&param);
        let address = (self.config.host.as_str(), self.config.port);

        let connect = tokio::time::timeout(self.config.timeout, TcpStream::connect(address))
            .await
            .map_err(|_| TtsError::Engine("connection to BouyomiChan timed out".into()))?
            .map_err(|e| TtsError::Engine(format!("connection to BouyomiChan failed: {e}")))?;

        let mut stream = connect;
        stream
            .write_all(&frame)
            .await
            .map_err(|e| TtsError::Engine(format!("talk command send failed: {e}")))?;
        stream
            .shutdown()
            .await
            .map_err(|e| TtsError::Engine(format!("socket shutdown failed: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tts::params::TtsInfo;

    #[test]
    fn talk_frame_layout() {
        let param = TtsParam {
            content: "abc".to_string(),
            tts_info: TtsInfo {
                voice: Voice {
                    cast: "3".to_string(),
                    speed: Some(120),
                    tone: Some(100),
                    volume: Some(80),
                    ..Voice::default()
                },
                ..TtsInfo::default()
            },
            ..TtsParam::default()
        };

        let frame = BouyomiChan::talk_command(&param);
        assert_eq!(&frame[0..2], &C_TALK.to_le_bytes());
        assert_eq!(&frame[2..4], &120i16.to_le_bytes()); // speed
        assert_eq!(&frame[4..6], &100i16.to_le_bytes()); // tone
        assert_eq!(&frame[6..8], &80i16.to_le_bytes()); // volume
        assert_eq!(&frame[8..10], &3u16.to_le_bytes()); // voice id
        assert_eq!(frame[10], CODE_UTF8);
        assert_eq!(&frame[11..15], &3u32.to_le_bytes()); // message length
        assert_eq!(&frame[15..], b"abc");
    }

    #[test]
    fn unsupported_parameters_send_defaults() {
        let param = TtsParam {
            content: "x".to_string(),
            ..TtsParam::default()
        };
        let frame = BouyomiChan::talk_command(&param);
        assert_eq!(&frame[2..4], &(-1i16).to_le_bytes());
        assert_eq!(&frame[4..6], &(-1i16).to_le_bytes());
        assert_eq!(&frame[6..8], &(-1i16).to_le_bytes());
        assert_eq!(&frame[8..10], &0u16.to_le_bytes());
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let param = TtsParam {
            content: "x".to_string(),
            tts_info: TtsInfo {
                voice: Voice {
                    speed: Some(1000),
                    volume: Some(-5),
                    ..Voice::default()
                },
                ..TtsInfo::default()
            },
            ..TtsParam::default()
        };
        let frame = BouyomiChan::talk_command(&param);
        assert_eq!(&frame[2..4], &300i16.to_le_bytes());
        assert_eq!(&frame[6..8], &0i16.to_le_bytes());
    }
}
