//! TTS orchestration.
//! Owns the synthesis, playback and deletion queues plus the shared
//! termination token, starts the three background loops exactly once, and
//! coordinates a bounded-time shutdown.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::queue::TaskQueue;
use crate::tts::file_manager::TtsFileManager;
use crate::tts::params::{ParameterManager, TtsInfo, TtsParam, UserCategory};
use crate::tts::playback::AudioPlaybackManager;
use crate::tts::synthesis::SynthesisManager;

/// Bound on how long `close` waits for the background tasks.
const CLOSE_TIMEOUT: Duration = Duration::from_millis(2_000);

const SYNTHESIS_QUEUE_CAPACITY: usize = 64;
const PLAYBACK_QUEUE_CAPACITY: usize = 64;
const DELETION_QUEUE_CAPACITY: usize = 256;

struct NamedTask {
    name: &'static str,
    handle: JoinHandle<()>,
}

pub struct TtsManager {
    synthesis_queue: Arc<TaskQueue<TtsParam>>,
    playback_queue: Arc<TaskQueue<TtsParam>>,
    deletion_queue: Arc<TaskQueue<PathBuf>>,
    /// Signals every background loop to stop. Never cleared.
    task_terminate: CancellationToken,
    file_manager: Arc<TtsFileManager>,
    parameter_manager: Mutex<ParameterManager>,
    synthesis_manager: Arc<SynthesisManager>,
    playback_manager: Arc<AudioPlaybackManager>,
    background_tasks: Mutex<Vec<NamedTask>>,
}

impl TtsManager {
    pub fn new(config: &Config) -> Self {
        debug!("initializing TTS manager");
        let synthesis_queue: Arc<TaskQueue<TtsParam>> =
            Arc::new(TaskQueue::new(SYNTHESIS_QUEUE_CAPACITY));
        let playback_queue: Arc<TaskQueue<TtsParam>> =
            Arc::new(TaskQueue::new(PLAYBACK_QUEUE_CAPACITY));
        let deletion_queue: Arc<TaskQueue<PathBuf>> =
            Arc::new(TaskQueue::new(DELETION_QUEUE_CAPACITY));
        let task_terminate = CancellationToken::new();

        let file_manager = Arc::new(TtsFileManager::new(Arc::clone(&deletion_queue)));
        let parameter_manager = Mutex::new(ParameterManager::new(
            config.voice_parameters.clone(),
            config.translation.native_language.clone(),
        ));
        let synthesis_manager = Arc::new(SynthesisManager::new(
            config.tts.clone(),
            config.engines.clone(),
            config.voice_parameters.clone(),
            &config.translation.native_language,
            Arc::clone(&synthesis_queue),
            Arc::clone(&playback_queue),
            config.general.tmp_dir.clone(),
        ));
        let playback_manager = Arc::new(AudioPlaybackManager::new(
            Arc::clone(&file_manager),
            Arc::clone(&playback_queue),
            task_terminate.clone(),
            config.tts.limit_time,
        ));

        Self {
            synthesis_queue,
            playback_queue,
            deletion_queue,
            task_terminate,
            file_manager,
            parameter_manager,
            synthesis_manager,
            playback_manager,
            background_tasks: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the dispatcher, playback and file-cleanup loops. A second call
    /// is a warned no-op.
    pub async fn initialize(&self) {
        info!("TTS manager initialization started");
        if !self.background_tasks.lock().is_empty() {
            warn!("TTS manager is already initialized");
            return;
        }

        let (Some(synthesis_consumer), Some(playback_consumer), Some(deletion_consumer)) = (
            self.synthesis_queue.take_consumer(),
            self.playback_queue.take_consumer(),
            self.deletion_queue.take_consumer(),
        ) else {
            warn!("queue consumers already taken, TTS manager cannot be re-initialized");
            return;
        };

        let mut tasks = Vec::new();

        let synthesis_manager = Arc::clone(&self.synthesis_manager);
        tasks.push(NamedTask {
            name: "tts_processing_task",
            handle: tokio::spawn(async move {
                synthesis_manager.tts_processing_task(synthesis_consumer).await;
            }),
        });

        let playback_manager = Arc::clone(&self.playback_manager);
        tasks.push(NamedTask {
            name: "play_voicefile_task",
            handle: tokio::spawn(async move {
                playback_manager.playback_queue_processor(playback_consumer).await;
            }),
        });

        let file_manager = Arc::clone(&self.file_manager);
        tasks.push(NamedTask {
            name: "audio_file_cleanup_task",
            handle: tokio::spawn(async move {
                file_manager.audio_file_cleanup_task(deletion_consumer).await;
            }),
        });

        for task in &tasks {
            debug!(task = task.name, "created background task");
        }
        *self.background_tasks.lock() = tasks;
    }

    /// Bounded-time shutdown: signal termination, shut the queues down so
    /// blocked getters wake, wait up to the close timeout for the loops,
    /// log what is still pending, then clear the task set regardless.
    pub async fn close(&self) {
        info!("terminating TTS background tasks");
        self.task_terminate.cancel();

        self.playback_queue.shutdown();
        self.synthesis_queue.shutdown();
        self.deletion_queue.shutdown();

        debug!("waiting for background tasks to finish");
        let tasks: Vec<NamedTask> = std::mem::take(&mut *self.background_tasks.lock());
        let deadline = Instant::now() + CLOSE_TIMEOUT;
        let mut pending: Vec<&'static str> = Vec::new();

        for task in tasks {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, task.handle).await {
                Ok(Ok(())) => debug!(task = task.name, "task completed"),
                Ok(Err(e)) if e.is_cancelled() => debug!(task = task.name, "task was cancelled"),
                Ok(Err(e)) => warn!(task = task.name, error = %e, "task failed"),
                Err(_) => pending.push(task.name),
            }
        }

        if !pending.is_empty() {
            warn!(tasks = ?pending, "some tasks are still pending after shutdown timeout");
        }
        info!("TTS manager closed");
    }

    // Thin pass-throughs to the voice parameter and synthesis managers.

    pub fn select_voice_usertype(&self, category: UserCategory) {
        self.parameter_manager.lock().select_voice_usertype(category);
    }

    pub fn command_voiceparameters(&self, content: &mut String) {
        self.parameter_manager.lock().command_voiceparameters(content);
    }

    pub fn get_voice_param(&self, lang: Option<&str>) -> Result<TtsInfo, String> {
        self.parameter_manager.lock().get_voice_param(lang)
    }

    pub fn prepare_tts_content(&self, param: TtsParam) -> Option<TtsParam> {
        self.synthesis_manager.prepare_tts_content(param)
    }

    pub async fn enqueue_tts_synthesis(&self, param: TtsParam) {
        self.synthesis_manager.enqueue_tts_synthesis(param).await;
    }

    pub async fn cancel_playback(&self) {
        self.playback_manager.cancel_playback().await;
    }

    pub fn is_playing(&self) -> bool {
        self.playback_manager.is_playing()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn initialize_twice_is_a_noop() {
        let manager = TtsManager::new(&Config::default());
        manager.initialize().await;
        assert_eq!(manager.background_tasks.lock().len(), 3);
        // Second call warns and leaves the running tasks alone.
        manager.initialize().await;
        assert_eq!(manager.background_tasks.lock().len(), 3);
        manager.close().await;
    }

    #[tokio::test]
    async fn close_returns_within_bounded_time() {
        let manager = TtsManager::new(&Config::default());
        manager.initialize().await;

        let started = Instant::now();
        manager.close().await;
        // Queue-driven loops exit quickly; well under the 2s bound plus
        // the playback loop's inter-item pause.
        assert!(started.elapsed() < CLOSE_TIMEOUT + Duration::from_secs(1));
        assert!(manager.background_tasks.lock().is_empty());
    }

    #[tokio::test]
    async fn close_reports_hanging_task_without_blocking_forever() {
        let manager = TtsManager::new(&Config::default());
        // Replace the task set with one that never finishes.
        manager.background_tasks.lock().push(NamedTask {
            name: "stuck_task",
            handle: tokio::spawn(async {
                loop {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                }
            }),
        });

        let started = Instant::now();
        manager.close().await;
        assert!(started.elapsed() < CLOSE_TIMEOUT + Duration::from_millis(500));
        // The hanging task was reported and the set cleared regardless.
        assert!(manager.background_tasks.lock().is_empty());
    }

    #[tokio::test]
    async fn enqueued_items_flow_to_synthesis_queue() {
        let manager = TtsManager::new(&Config::default());
        let param = TtsParam {
            content: "hello".to_string(),
            content_lang: Some("ja".to_string()),
            ..TtsParam::default()
        };
        manager.enqueue_tts_synthesis(param).await;
        assert_eq!(manager.synthesis_queue.enqueued_count(), 1);
    }
}
