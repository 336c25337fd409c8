//! Synthesis dispatcher.
//! Builds the engine handler map from the configured voice parameters,
//! routes each queued TtsParam to its engine, and isolates per-engine
//! failures so one broken engine cannot stall the queue or the others.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::{EngineSettings, TtsSettings};
use crate::queue::{QueueConsumer, TaskQueue};
use crate::text::emoji::EmojiHandler;
use crate::text::katakana;
use crate::tts::engine::{dispatch_engines, EngineContext, EngineHandlerMap, SpeechEngine};
use crate::tts::engines;
use crate::tts::params::{TtsParam, UserTypeInfo};

pub struct SynthesisManager {
    tts_settings: TtsSettings,
    engine_settings: HashMap<String, EngineSettings>,
    voice_parameters: UserTypeInfo,
    synthesis_queue: Arc<TaskQueue<TtsParam>>,
    playback_queue: Arc<TaskQueue<TtsParam>>,
    emoji: EmojiHandler,
    audio_dir: PathBuf,
}

impl SynthesisManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tts_settings: TtsSettings,
        engine_settings: HashMap<String, EngineSettings>,
        voice_parameters: UserTypeInfo,
        native_language: &str,
        synthesis_queue: Arc<TaskQueue<TtsParam>>,
        playback_queue: Arc<TaskQueue<TtsParam>>,
        audio_dir: PathBuf,
    ) -> Self {
        Self {
            tts_settings,
            engine_settings,
            voice_parameters,
            synthesis_queue,
            playback_queue,
            emoji: EmojiHandler::new(native_language),
            audio_dir,
        }
    }

    /// Instantiate and initialize every engine the voice parameters refer
    /// to. An engine that is unknown or fails to initialize is logged and
    /// skipped; the rest keep working.
    fn create_handler_map(&self) -> EngineHandlerMap {
        debug!("creating TTS engine handler map");
        let mut handler_map = EngineHandlerMap::new();

        for engine_name in self.voice_parameters.get_tts_engine_list() {
            let ctx = EngineContext::new(Arc::clone(&self.playback_queue), self.audio_dir.clone());
            let Some(mut engine) = engines::create_engine(&engine_name, ctx) else {
                error!(engine = %engine_name, "TTS engine is not registered");
                continue;
            };

            let settings = self
                .engine_settings
                .get(&engine_name)
                .cloned()
                .unwrap_or_default();
            if !engine.initialize_engine(&settings) {
                error!(engine = %engine_name, "failed to initialize TTS engine");
                continue;
            }

            info!(engine = %engine_name, "TTS engine initialized");
            handler_map.insert(engine_name, Arc::from(engine));
        }

        handler_map
    }

    /// Handle one queued item: route it to its engine, swallowing (but
    /// logging) any engine failure.
    async fn handle_tts_param(&self, param: TtsParam, handler_map: &EngineHandlerMap) {
        let engine_name = param.tts_info.engine.clone();
        match engine_name.as_deref().and_then(|name| handler_map.get(name)) {
            Some(engine) => {
                info!(engine = engine_name.as_deref().unwrap_or(""), "dispatching synthesis");
                if let Err(e) = engine.speech_synthesis(param).await {
                    error!(
                        engine = engine_name.as_deref().unwrap_or(""),
                        error = %e,
                        "exception during synthesis"
                    );
                }
            }
            None => {
                warn!(
                    engine = engine_name.as_deref().unwrap_or("<none>"),
                    "TTS engine name not found or invalid"
                );
            }
        }
    }

    /// Main dispatcher task: start the engines, process the synthesis queue
    /// until shutdown, then tear the engines down.
    pub async fn tts_processing_task(&self, consumer: QueueConsumer<TtsParam>) {
        let handler_map = self.create_handler_map();

        // Start engine processes, then warm them up, concurrently per hook.
        dispatch_engines(&handler_map, "execute", |engine| async move {
            engine.execute().await
        })
        .await;
        let voice_parameters = self.voice_parameters.clone();
        dispatch_engines(&handler_map, "async_init", move |engine| {
            let params = voice_parameters.clone();
            async move { engine.async_init(&params).await }
        })
        .await;

        self.processing_loop(&handler_map, consumer).await;

        // Terminate engines: close sessions first, then linked processes.
        dispatch_engines(&handler_map, "close", |engine| async move {
            engine.close().await
        })
        .await;
        dispatch_engines(&handler_map, "termination", |engine| async move {
            engine.termination().await
        })
        .await;
    }

    /// Queue loop, separated from engine startup/teardown for testability.
    pub(crate) async fn processing_loop(
        &self,
        handler_map: &EngineHandlerMap,
        mut consumer: QueueConsumer<TtsParam>,
    ) {
        loop {
            let param = match consumer.get().await {
                Ok(param) => param,
                Err(_) => {
                    info!("TTS processing task terminated");
                    break;
                }
            };
            self.handle_tts_param(param, handler_map).await;
            // Mark the item done exactly once, whatever happened above.
            self.synthesis_queue.task_done();
        }
    }

    /// Prepare content for synthesis: language allow-list, emoji
    /// substitution, optional katakana conversion, character limit.
    /// Returns None when the item should be dropped instead of synthesized.
    pub fn prepare_tts_content(&self, mut param: TtsParam) -> Option<TtsParam> {
        debug!(content = %param.content, "preparing TTS content");
        let Some(lang) = param.content_lang.clone() else {
            error!("no content language code specified");
            return None;
        };

        if !self.tts_settings.enabled_languages.is_empty()
            && !self.tts_settings.enabled_languages.contains(&lang)
        {
            debug!(lang = %lang, "language is not enabled for TTS");
            return None;
        }

        param.content = self.emoji.emojize_to_text(&param.content, &lang);

        if self.tts_settings.katakanaize && lang == "ja" {
            param.content = katakana::katakanaize(&param.content);
        }

        if self.tts_settings.limit_characters > 0 {
            param.content = param
                .content
                .chars()
                .take(self.tts_settings.limit_characters)
                .collect();
        }

        if param.content.is_empty() {
            warn!("TTS content is empty after conversion");
            return None;
        }
        Some(param)
    }

    /// Enqueue a prepared param for synthesis.
    pub async fn enqueue_tts_synthesis(&self, param: TtsParam) {
        debug!(content = %param.content, "enqueuing TTS synthesis");
        if let Err(e) = self.synthesis_queue.put(param).await {
            warn!(error = %e, "failed to enqueue synthesis item");
        }
    }
}
