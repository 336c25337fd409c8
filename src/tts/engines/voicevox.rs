//! VOICEVOX-family HTTP engine.
//! Two-call flow against a local server: `audio_query` builds the synthesis
//! request, `synthesis` returns WAV bytes. The WAV is written to a temp file
//! and the param is forwarded into the playback queue.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, error, info};

use crate::config::EngineSettings;
use crate::tts::engine::{EngineConfig, EngineContext, LinkedProcess, SpeechEngine};
use crate::tts::params::{TtsParam, Voice};
use crate::tts::TtsError;

const ENGINE_NAME: &str = "voicevox";

/// (min, max, default) ranges for the float synthesis parameters.
/// Voice values are stored as integers multiplied by 100.
const SPEED_RANGE: (f64, f64, f64) = (0.50, 2.00, 1.00);
const PITCH_RANGE: (f64, f64, f64) = (-0.15, 0.15, 0.00);
const INTONATION_RANGE: (f64, f64, f64) = (0.00, 2.00, 1.00);
const VOLUME_RANGE: (f64, f64, f64) = (0.00, 2.00, 1.00);

pub struct VoiceVox {
    ctx: EngineContext,
    config: EngineConfig,
    http: Option<reqwest::Client>,
    process: LinkedProcess,
}

impl VoiceVox {
    pub fn new(ctx: EngineContext) -> Self {
        Self {
            ctx,
            config: EngineConfig::default(),
            http: None,
            process: LinkedProcess::default(),
        }
    }

    fn http(&self) -> Result<&reqwest::Client, TtsError> {
        self.http
            .as_ref()
            .ok_or_else(|| TtsError::Engine("engine is not initialized".into()))
    }

    fn speaker_id(voice: &Voice) -> u32 {
        voice.cast.trim().parse().unwrap_or(0)
    }

    /// Convert a stored integer parameter (value * 100) into the engine's
    /// float range, clamped.
    fn scale(param: Option<i32>, range: (f64, f64, f64)) -> f64 {
        match param {
            Some(value) => (value as f64 / 100.0).clamp(range.0, range.1),
            None => range.2,
        }
    }

    async fn api_command_procedure(&self, param: &TtsParam) -> Result<Vec<u8>, TtsError> {
        let http = self.http()?;
        let url = self.config.url();
        let speaker = Self::speaker_id(&param.tts_info.voice).to_string();

        let query_response = http
            .post(format!("{url}/audio_query"))
            .query(&[("text", param.content.as_str()), ("speaker", speaker.as_str())])
            .send()
            .await
            .map_err(|e| TtsError::Engine(format!("audio_query request failed: {e}")))?;
        if !query_response.status().is_success() {
            return Err(TtsError::Engine(format!(
                "audio_query returned status {}",
                query_response.status()
            )));
        }
        let mut query: Value = query_response
            .json()
            .await
            .map_err(|e| TtsError::Engine(format!("audio_query parse failed: {e}")))?;

        let voice = &param.tts_info.voice;
        query["speedScale"] = Self::scale(voice.speed, SPEED_RANGE).into();
        query["pitchScale"] = Self::scale(voice.tone, PITCH_RANGE).into();
        query["intonationScale"] = Self::scale(voice.intonation, INTONATION_RANGE).into();
        query["volumeScale"] = Self::scale(voice.volume, VOLUME_RANGE).into();

        let synthesis_response = http
            .post(format!("{url}/synthesis"))
            .query(&[("speaker", speaker.as_str())])
            .json(&query)
            .send()
            .await
            .map_err(|e| TtsError::Engine(format!("synthesis request failed: {e}")))?;
        if !synthesis_response.status().is_success() {
            return Err(TtsError::Engine(format!(
                "synthesis returned status {}",
                synthesis_response.status()
            )));
        }

        let audio = synthesis_response
            .bytes()
            .await
            .map_err(|e| TtsError::Engine(format!("synthesis body read failed: {e}")))?;
        Ok(audio.to_vec())
    }
}

#[async_trait]
impl SpeechEngine for VoiceVox {
    fn engine_name(&self) -> &str {
        ENGINE_NAME
    }

    fn initialize_engine(&mut self, settings: &EngineSettings) -> bool {
        let config = match EngineConfig::from_settings(settings) {
            Ok(config) => config,
            Err(e) => {
                error!(error = %e, "invalid voicevox configuration");
                return false;
            }
        };
        let http = match reqwest::Client::builder().timeout(config.timeout).build() {
            Ok(http) => http,
            Err(e) => {
                error!(error = %e, "failed to build voicevox HTTP client");
                return false;
            }
        };
        self.config = config;
        self.http = Some(http);
        true
    }

    async fn execute(&self) -> Result<(), TtsError> {
        if self.config.linked_startup {
            if let Some(exec_path) = self.config.exec_path.clone() {
                self.process.execute(&exec_path).await;
            }
        }
        Ok(())
    }

    async fn speech_synthesis(&self, mut param: TtsParam) -> Result<(), TtsError> {
        debug!(content = %param.content, "voicevox synthesis started");
        let audio = self.api_command_procedure(&param).await?;
        if audio.is_empty() {
            return Err(TtsError::Engine("no audio data received".into()));
        }
        debug!(bytes = audio.len(), "voicevox synthesis completed");

        let filepath = self.ctx.create_audio_filename(ENGINE_NAME, "wav")?;
        self.ctx.save_audio_file(&filepath, &audio)?;
        param.filepath = Some(filepath);
        self.ctx.play(param).await;
        Ok(())
    }

    async fn close(&self) -> Result<(), TtsError> {
        info!("voicevox engine termination");
        Ok(())
    }

    async fn termination(&self) -> Result<(), TtsError> {
        self.process.kill().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameter_scaling_clamps_to_engine_ranges() {
        assert_eq!(VoiceVox::scale(None, SPEED_RANGE), 1.00);
        assert_eq!(VoiceVox::scale(Some(100), SPEED_RANGE), 1.00);
        assert_eq!(VoiceVox::scale(Some(500), SPEED_RANGE), 2.00);
        assert_eq!(VoiceVox::scale(Some(10), SPEED_RANGE), 0.50);
        assert_eq!(VoiceVox::scale(Some(-50), PITCH_RANGE), -0.15);
    }

    #[test]
    fn speaker_id_falls_back_to_zero() {
        let voice = Voice {
            cast: "8".to_string(),
            ..Voice::default()
        };
        assert_eq!(VoiceVox::speaker_id(&voice), 8);

        let voice = Voice {
            cast: "metan".to_string(),
            ..Voice::default()
        };
        assert_eq!(VoiceVox::speaker_id(&voice), 0);
    }
}
