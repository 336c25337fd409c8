//! Asynchronous deletion of temporary audio files.
//! Deletion is decoupled from the playback path through a queue so a locked
//! file can never stall playback. Lock errors are retried a few times;
//! anything else gives up on that file.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::queue::{QueueConsumer, TaskQueue, TryPutError};

const DELETE_MAX_RETRIES: u32 = 3;
const DELETE_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Owns the deletion queue's producer side and the background worker logic.
pub struct TtsFileManager {
    deletion_queue: Arc<TaskQueue<PathBuf>>,
}

impl TtsFileManager {
    pub fn new(deletion_queue: Arc<TaskQueue<PathBuf>>) -> Self {
        debug!("initializing TTS file manager");
        Self { deletion_queue }
    }

    /// Non-blocking enqueue; deletion is best-effort and never fatal.
    pub fn enqueue_file_deletion(&self, file_path: PathBuf) {
        debug!(file = %file_path.display(), "enqueuing file for deletion");
        match self.deletion_queue.try_put(file_path.clone()) {
            Ok(()) => {}
            Err(TryPutError::Full) => {
                warn!(file = %file_path.display(), "deletion queue is full, dropping file");
            }
            Err(TryPutError::Closed) => {
                info!(file = %file_path.display(), "deletion queue is shut down, dropping file");
            }
        }
    }

    /// Background worker: deletes queued files one at a time. On shutdown,
    /// already-queued paths are still processed before exiting.
    pub async fn audio_file_cleanup_task(&self, mut consumer: QueueConsumer<PathBuf>) {
        debug!("starting audio file cleanup task");
        while let Ok(file_path) = consumer.get().await {
            delete_file_with_retry(&file_path, DELETE_MAX_RETRIES, DELETE_RETRY_DELAY).await;
            self.deletion_queue.task_done();
        }
        info!("audio file cleanup task received shutdown signal");
        // get() already drained queued items before reporting the close, but
        // catch anything that raced the final recv.
        while let Some(file_path) = consumer.try_get() {
            delete_file_with_retry(&file_path, DELETE_MAX_RETRIES, DELETE_RETRY_DELAY).await;
            self.deletion_queue.task_done();
        }
        info!("audio file cleanup task finished");
    }
}

/// Delete a file, retrying on permission/lock errors only. A missing file
/// counts as success.
async fn delete_file_with_retry(file_path: &PathBuf, max_retries: u32, delay: Duration) {
    for attempt in 0..max_retries {
        match tokio::fs::remove_file(file_path).await {
            Ok(()) => {
                debug!(file = %file_path.display(), "deleted audio file");
                return;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(file = %file_path.display(), "audio file already gone");
                return;
            }
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                if attempt < max_retries - 1 {
                    debug!(
                        file = %file_path.display(),
                        attempt = attempt + 1,
                        max_retries,
                        "permission error deleting file, retrying"
                    );
                    tokio::time::sleep(delay).await;
                } else {
                    warn!(
                        file = %file_path.display(),
                        error = %e,
                        max_retries,
                        "failed to delete file after retries"
                    );
                }
            }
            Err(e) => {
                error!(file = %file_path.display(), error = %e, "unexpected error deleting file");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_manager(capacity: usize) -> (TtsFileManager, QueueConsumer<PathBuf>) {
        let queue = Arc::new(TaskQueue::new(capacity));
        let consumer = queue.take_consumer().unwrap();
        (TtsFileManager::new(queue), consumer)
    }

    #[tokio::test]
    async fn deletes_enqueued_files() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("audio.wav");
        std::fs::write(&file, b"data").unwrap();

        let (manager, consumer) = make_manager(8);
        manager.enqueue_file_deletion(file.clone());

        let worker = {
            let queue = Arc::clone(&manager.deletion_queue);
            let manager = TtsFileManager::new(queue);
            tokio::spawn(async move { manager.audio_file_cleanup_task(consumer).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!file.exists());

        manager.deletion_queue.shutdown();
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn missing_file_is_success_not_error() {
        let dir = TempDir::new().unwrap();
        let ghost = dir.path().join("never-existed.wav");
        // Returns without retrying or panicking.
        delete_file_with_retry(&ghost, 3, Duration::from_millis(1)).await;
    }

    #[tokio::test]
    async fn drains_queued_files_on_shutdown() {
        let dir = TempDir::new().unwrap();
        let file_a = dir.path().join("a.wav");
        let file_b = dir.path().join("b.wav");
        std::fs::write(&file_a, b"a").unwrap();
        std::fs::write(&file_b, b"b").unwrap();

        let (manager, consumer) = make_manager(8);
        manager.enqueue_file_deletion(file_a.clone());
        manager.enqueue_file_deletion(file_b.clone());
        // Shut down before the worker ever runs.
        manager.deletion_queue.shutdown();

        manager.audio_file_cleanup_task(consumer).await;
        assert!(!file_a.exists());
        assert!(!file_b.exists());
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        let dir = TempDir::new().unwrap();
        let (manager, _consumer) = make_manager(1);
        manager.enqueue_file_deletion(dir.path().join("one.wav"));
        // Queue is full; this drops with a warning instead of blocking.
        manager.enqueue_file_deletion(dir.path().join("two.wav"));
        assert_eq!(manager.deletion_queue.enqueued_count(), 1);
    }
}
