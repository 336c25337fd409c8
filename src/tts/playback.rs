//! Audio playback manager.
//! Plays exactly one WAV file at a time through a cpal output stream owned
//! by a blocking worker. The stream's fill callback honours the global
//! termination token, reads chunks from the WAV source and signals
//! completion through a crossbeam channel. Every item's file is handed to
//! the file manager for deletion no matter how playback ended.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::queue::{QueueConsumer, TaskQueue};
use crate::tts::file_manager::TtsFileManager;
use crate::tts::params::TtsParam;

/// Pause between items so back-to-back streams don't blend audibly.
const PLAYBACK_PAUSE: Duration = Duration::from_millis(500);
/// How often the worker checks the cancellation tokens while playing.
const WORKER_POLL: Duration = Duration::from_millis(50);

/// How the stream callback finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamEnd {
    Completed,
    Aborted,
    SourceError,
}

pub struct AudioPlaybackManager {
    file_manager: Arc<TtsFileManager>,
    playback_queue: Arc<TaskQueue<TtsParam>>,
    /// Global termination signal; never cleared.
    terminate: CancellationToken,
    /// Cancel signal for the current item; replaced before each playback.
    cancel_token: Mutex<CancellationToken>,
    /// True while the worker has an active output stream.
    is_playing: Arc<AtomicBool>,
    playing_tx: Arc<watch::Sender<bool>>,
    playing_rx: watch::Receiver<bool>,
    /// Playback time limit in seconds; 0 disables it.
    limit_time: f64,
}

impl AudioPlaybackManager {
    pub fn new(
        file_manager: Arc<TtsFileManager>,
        playback_queue: Arc<TaskQueue<TtsParam>>,
        terminate: CancellationToken,
        limit_time: f64,
    ) -> Self {
        let (playing_tx, playing_rx) = watch::channel(false);
        Self {
            file_manager,
            playback_queue,
            terminate,
            cancel_token: Mutex::new(CancellationToken::new()),
            is_playing: Arc::new(AtomicBool::new(false)),
            playing_tx: Arc::new(playing_tx),
            playing_rx,
            limit_time,
        }
    }

    /// True iff an active output stream exists and is producing audio.
    pub fn is_playing(&self) -> bool {
        self.is_playing.load(Ordering::SeqCst)
    }

    /// Main loop: pull one item, validate it, play it with an optional
    /// timeout, then hand the file off for deletion and pause briefly.
    pub async fn playback_queue_processor(&self, mut consumer: QueueConsumer<TtsParam>) {
        loop {
            let param = match consumer.get().await {
                Ok(param) => param,
                Err(_) => {
                    debug!("playback queue closed");
                    break;
                }
            };

            if let Some(file_path) = validate_playback_item(&param) {
                debug!(file = %file_path.display(), "playback start");
                match self.get_timelimit() {
                    Some(limit) => {
                        match tokio::time::timeout(limit, self.play_one(file_path.clone())).await {
                            Ok(()) => info!("playback completed"),
                            Err(_) => {
                                info!("playback timeout reached");
                                self.cancel_playback().await;
                            }
                        }
                    }
                    None => {
                        self.play_one(file_path.clone()).await;
                        info!("playback completed");
                    }
                }
            }

            self.playback_queue.task_done();
            // Pause so the next stream doesn't start immediately after the
            // end of this one.
            tokio::time::sleep(PLAYBACK_PAUSE).await;
        }
        info!("audio playback task finished");
    }

    fn get_timelimit(&self) -> Option<Duration> {
        if self.limit_time > 0.0 {
            Some(Duration::from_secs_f64(self.limit_time))
        } else {
            None
        }
    }

    /// Cancel the current playback, if any. Idempotent: safe to call when
    /// nothing is playing. Waits for the worker to wind down.
    pub async fn cancel_playback(&self) {
        self.cancel_token.lock().cancel();
        let mut rx = self.playing_rx.clone();
        let wait_result = rx.wait_for(|playing| !*playing).await;
        if let Err(e) = wait_result {
            error!(error = %e, "error waiting for playback cancellation");
        }
    }

    /// Run one file on a blocking worker that owns the cpal stream. The
    /// worker marks the playing flag and always enqueues the file for
    /// deletion on exit.
    async fn play_one(&self, file_path: PathBuf) {
        let cancel = CancellationToken::new();
        *self.cancel_token.lock() = cancel.clone();

        let _ = self.playing_tx.send(true);
        let terminate = self.terminate.clone();
        let is_playing = Arc::clone(&self.is_playing);
        let file_manager = Arc::clone(&self.file_manager);
        let playing_tx = Arc::clone(&self.playing_tx);

        let worker = tokio::task::spawn_blocking(move || {
            play_wav_blocking(file_path, terminate, cancel, is_playing, file_manager, playing_tx)
        });
        if let Err(e) = worker.await {
            error!(error = %e, "playback worker panicked");
            let _ = self.playing_tx.send(false);
        }
    }
}

/// Item validation: a missing or non-WAV path is logged and skipped; the
/// item is still marked done by the caller.
fn validate_playback_item(param: &TtsParam) -> Option<PathBuf> {
    let Some(file_path) = param.filepath.clone() else {
        debug!("playback item has no file path, skipping");
        return None;
    };
    if !file_path.is_file() {
        warn!(file = %file_path.display(), "audio file does not exist, skipping");
        return None;
    }
    if file_path
        .extension()
        .and_then(|e| e.to_str())
        .map_or(true, |e| !e.eq_ignore_ascii_case("wav"))
    {
        warn!(file = %file_path.display(), "not a wav file, skipping");
        return None;
    }
    Some(file_path)
}

/// Blocking worker: open the WAV, build the output stream, run until the
/// callback signals the end or a cancellation token fires. The file is
/// unconditionally enqueued for deletion and the stream is closed on every
/// path out of this function.
fn play_wav_blocking(
    file_path: PathBuf,
    terminate: CancellationToken,
    cancel: CancellationToken,
    is_playing: Arc<AtomicBool>,
    file_manager: Arc<TtsFileManager>,
    playing_tx: Arc<watch::Sender<bool>>,
) {
    if let Err(e) = run_stream(&file_path, &terminate, &cancel, &is_playing) {
        error!(file = %file_path.display(), error = %e, "playback error");
    }
    // Finally-style guarantees: flag down, file handed off for deletion.
    is_playing.store(false, Ordering::SeqCst);
    file_manager.enqueue_file_deletion(file_path);
    let _ = playing_tx.send(false);
}

fn run_stream(
    file_path: &Path,
    terminate: &CancellationToken,
    cancel: &CancellationToken,
    is_playing: &Arc<AtomicBool>,
) -> Result<(), String> {
    let reader = hound::WavReader::open(file_path).map_err(|e| format!("wav open failed: {e}"))?;
    let spec = reader.spec();

    // Normalize every supported sample format to f32 for the device.
    let mut next_sample: Box<dyn FnMut() -> Option<Result<f32, hound::Error>> + Send> =
        match (spec.sample_format, spec.bits_per_sample) {
            (hound::SampleFormat::Int, 16) => {
                let mut samples = reader.into_samples::<i16>();
                Box::new(move || samples.next().map(|r| r.map(|s| s as f32 / 32_768.0)))
            }
            (hound::SampleFormat::Int, 32) => {
                let mut samples = reader.into_samples::<i32>();
                Box::new(move || samples.next().map(|r| r.map(|s| s as f32 / 2_147_483_648.0)))
            }
            (hound::SampleFormat::Float, 32) => {
                let mut samples = reader.into_samples::<f32>();
                Box::new(move || samples.next())
            }
            (format, bits) => {
                return Err(format!("unsupported wav file format: {format:?}/{bits}bit"));
            }
        };

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or("no audio output device available")?;

    let stream_config = cpal::StreamConfig {
        channels: spec.channels,
        sample_rate: cpal::SampleRate(spec.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };
    debug!(
        channels = spec.channels,
        sample_rate = spec.sample_rate,
        "audio properties"
    );

    let (done_tx, done_rx) = crossbeam_channel::bounded::<StreamEnd>(1);
    let cb_terminate = terminate.clone();
    let cb_done = done_tx;

    let stream = device
        .build_output_stream(
            &stream_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                // Fill callback contract: abort on termination, deliver the
                // next chunk, complete on short read, abort on source error.
                // Never blocks beyond the read itself.
                if cb_terminate.is_cancelled() {
                    data.fill(0.0);
                    let _ = cb_done.try_send(StreamEnd::Aborted);
                    return;
                }
                let mut filled = 0;
                while filled < data.len() {
                    match next_sample() {
                        Some(Ok(sample)) => {
                            data[filled] = sample;
                            filled += 1;
                        }
                        Some(Err(_)) => {
                            data[filled..].fill(0.0);
                            let _ = cb_done.try_send(StreamEnd::SourceError);
                            return;
                        }
                        None => {
                            data[filled..].fill(0.0);
                            let _ = cb_done.try_send(StreamEnd::Completed);
                            return;
                        }
                    }
                }
            },
            |err| error!(error = %err, "audio output stream error"),
            None,
        )
        .map_err(|e| format!("failed to build output stream: {e}"))?;

    stream.play().map_err(|e| format!("failed to start output stream: {e}"))?;
    is_playing.store(true, Ordering::SeqCst);

    // Wait for the callback to signal the end, or for a cancel/terminate.
    loop {
        match done_rx.recv_timeout(WORKER_POLL) {
            Ok(StreamEnd::Completed) => {
                debug!("stream completed");
                break;
            }
            Ok(StreamEnd::Aborted) => {
                debug!("stream aborted by termination signal");
                break;
            }
            Ok(StreamEnd::SourceError) => {
                warn!("stream aborted on source format error");
                break;
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                if cancel.is_cancelled() || terminate.is_cancelled() {
                    debug!("playback cancelled");
                    break;
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }
    }

    // Dropping the stream stops and releases the device.
    drop(stream);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_wav(path: &Path, samples: usize) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..samples {
            writer.write_sample(((i % 100) as i16) * 10).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn make_manager(limit_time: f64) -> (Arc<AudioPlaybackManager>, Arc<TaskQueue<PathBuf>>) {
        let deletion_queue: Arc<TaskQueue<PathBuf>> = Arc::new(TaskQueue::new(16));
        let file_manager = Arc::new(TtsFileManager::new(Arc::clone(&deletion_queue)));
        let playback_queue: Arc<TaskQueue<TtsParam>> = Arc::new(TaskQueue::new(16));
        let manager = Arc::new(AudioPlaybackManager::new(
            file_manager,
            playback_queue,
            CancellationToken::new(),
            limit_time,
        ));
        (manager, deletion_queue)
    }

    #[tokio::test]
    async fn cancel_playback_is_idempotent_when_idle() {
        let (manager, _deletion) = make_manager(0.0);
        assert!(!manager.is_playing());
        // Nothing is playing; both calls return promptly.
        manager.cancel_playback().await;
        manager.cancel_playback().await;
    }

    #[tokio::test]
    async fn invalid_items_are_skipped_but_marked_done() {
        let (manager, deletion_queue) = make_manager(0.0);
        let playback_queue = Arc::clone(&manager.playback_queue);
        let consumer = playback_queue.take_consumer().unwrap();

        // One item with no path, one pointing at a missing file, one with
        // the wrong extension.
        playback_queue.put(TtsParam::default()).await.unwrap();
        playback_queue
            .put(TtsParam {
                filepath: Some(PathBuf::from("/nonexistent/audio.wav")),
                ..TtsParam::default()
            })
            .await
            .unwrap();
        let dir = TempDir::new().unwrap();
        let not_wav = dir.path().join("speech.mp3");
        std::fs::write(&not_wav, b"mp3").unwrap();
        playback_queue
            .put(TtsParam {
                filepath: Some(not_wav),
                ..TtsParam::default()
            })
            .await
            .unwrap();
        playback_queue.shutdown();

        manager.playback_queue_processor(consumer).await;
        assert_eq!(playback_queue.completed_count(), 3);
        // Skipped items are not handed to the deletion queue.
        assert_eq!(deletion_queue.enqueued_count(), 0);
    }

    #[tokio::test]
    async fn file_is_handed_to_deletion_queue_exactly_once() {
        let (manager, deletion_queue) = make_manager(0.0);
        let dir = TempDir::new().unwrap();
        let wav = dir.path().join("speech.wav");
        write_wav(&wav, 1_600);

        // Run the worker directly; with or without an output device, the
        // file must be enqueued for deletion exactly once.
        let terminate = CancellationToken::new();
        let cancel = CancellationToken::new();
        // Cancel immediately so a real device (if present) stops at the
        // first poll.
        cancel.cancel();
        let is_playing = Arc::clone(&manager.is_playing);
        let file_manager = Arc::new(TtsFileManager::new(Arc::clone(&deletion_queue)));
        let playing_tx = Arc::clone(&manager.playing_tx);

        let wav_clone = wav.clone();
        tokio::task::spawn_blocking(move || {
            play_wav_blocking(wav_clone, terminate, cancel, is_playing, file_manager, playing_tx)
        })
        .await
        .unwrap();

        assert_eq!(deletion_queue.enqueued_count(), 1);
        assert!(!manager.is_playing());
    }

    #[tokio::test]
    async fn unsupported_wav_format_still_hands_off_file() {
        let (manager, deletion_queue) = make_manager(0.0);
        let dir = TempDir::new().unwrap();
        let wav = dir.path().join("odd.wav");
        // 8-bit PCM is outside the supported set.
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8_000,
            bits_per_sample: 8,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&wav, spec).unwrap();
        writer.write_sample(0i8).unwrap();
        writer.finalize().unwrap();

        let file_manager = Arc::new(TtsFileManager::new(Arc::clone(&deletion_queue)));
        let wav_clone = wav.clone();
        let is_playing = Arc::clone(&manager.is_playing);
        let playing_tx = Arc::clone(&manager.playing_tx);
        tokio::task::spawn_blocking(move || {
            play_wav_blocking(
                wav_clone,
                CancellationToken::new(),
                CancellationToken::new(),
                is_playing,
                file_manager,
                playing_tx,
            )
        })
        .await
        .unwrap();

        assert_eq!(deletion_queue.enqueued_count(), 1);
    }
}
