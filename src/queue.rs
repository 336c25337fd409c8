//! Pipeline queues with explicit shutdown.
//! A blocked `get()` observes shutdown instead of hanging forever; items that
//! were already queued at shutdown time are still drained before the consumer
//! sees the close. Tracks a processed-item counter for diagnostics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Raised by `get`/`put` once the queue has been shut down and drained.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("queue is shut down")]
pub struct QueueClosed;

/// Error for the non-blocking `try_put`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TryPutError {
    #[error("queue is full")]
    Full,
    #[error("queue is shut down")]
    Closed,
}

struct Shared {
    shutdown: CancellationToken,
    enqueued: AtomicU64,
    completed: AtomicU64,
}

/// FIFO work queue shared between one conceptual producer side and a single
/// consumer loop. The receiver can be taken exactly once.
pub struct TaskQueue<T> {
    shared: Arc<Shared>,
    tx: mpsc::Sender<T>,
    rx: Mutex<Option<mpsc::Receiver<T>>>,
}

impl<T> TaskQueue<T> {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            shared: Arc::new(Shared {
                shutdown: CancellationToken::new(),
                enqueued: AtomicU64::new(0),
                completed: AtomicU64::new(0),
            }),
            tx,
            rx: Mutex::new(Some(rx)),
        }
    }

    /// Enqueue an item, waiting for a slot if the queue is full.
    pub async fn put(&self, item: T) -> Result<(), QueueClosed> {
        if self.shared.shutdown.is_cancelled() {
            return Err(QueueClosed);
        }
        self.tx.send(item).await.map_err(|_| QueueClosed)?;
        self.shared.enqueued.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Non-blocking enqueue. Used where dropping the item is acceptable.
    pub fn try_put(&self, item: T) -> Result<(), TryPutError> {
        if self.shared.shutdown.is_cancelled() {
            return Err(TryPutError::Closed);
        }
        match self.tx.try_send(item) {
            Ok(()) => {
                self.shared.enqueued.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => Err(TryPutError::Full),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(TryPutError::Closed),
        }
    }

    /// Take the consumer half (can only be called once, by the worker loop).
    pub fn take_consumer(&self) -> Option<QueueConsumer<T>> {
        self.rx.lock().take().map(|rx| QueueConsumer {
            shared: Arc::clone(&self.shared),
            rx,
        })
    }

    /// Shut the queue down. Blocked getters wake up once remaining items
    /// have been drained; subsequent puts fail.
    pub fn shutdown(&self) {
        self.shared.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.shutdown.is_cancelled()
    }

    /// Mark one pulled item as fully processed.
    /// Calling this more times than items were enqueued is logged at debug
    /// level, not escalated.
    pub fn task_done(&self) {
        let completed = self.shared.completed.fetch_add(1, Ordering::SeqCst) + 1;
        let enqueued = self.shared.enqueued.load(Ordering::SeqCst);
        if completed > enqueued {
            debug!(completed, enqueued, "task_done called more times than items enqueued");
        }
    }

    pub fn completed_count(&self) -> u64 {
        self.shared.completed.load(Ordering::SeqCst)
    }

    pub fn enqueued_count(&self) -> u64 {
        self.shared.enqueued.load(Ordering::SeqCst)
    }
}

/// Consumer half of a [`TaskQueue`], owned by exactly one worker loop.
pub struct QueueConsumer<T> {
    shared: Arc<Shared>,
    rx: mpsc::Receiver<T>,
}

impl<T> QueueConsumer<T> {
    /// Wait for the next item. Items queued before shutdown are still
    /// delivered; once the queue is shut down and empty this returns
    /// `Err(QueueClosed)`.
    pub async fn get(&mut self) -> Result<T, QueueClosed> {
        loop {
            match self.rx.try_recv() {
                Ok(item) => return Ok(item),
                Err(mpsc::error::TryRecvError::Disconnected) => return Err(QueueClosed),
                Err(mpsc::error::TryRecvError::Empty) => {}
            }
            if self.shared.shutdown.is_cancelled() {
                return Err(QueueClosed);
            }
            tokio::select! {
                _ = self.shared.shutdown.cancelled() => {
                    // Loop once more to drain anything that raced the signal.
                }
                item = self.rx.recv() => match item {
                    Some(item) => return Ok(item),
                    None => return Err(QueueClosed),
                },
            }
        }
    }

    /// Non-blocking pull, used to drain remaining items during shutdown.
    pub fn try_get(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn fifo_order_preserved() {
        let queue: TaskQueue<u32> = TaskQueue::new(8);
        let mut consumer = queue.take_consumer().expect("first take");
        queue.put(1).await.unwrap();
        queue.put(2).await.unwrap();
        queue.put(3).await.unwrap();
        assert_eq!(consumer.get().await.unwrap(), 1);
        assert_eq!(consumer.get().await.unwrap(), 2);
        assert_eq!(consumer.get().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn consumer_can_only_be_taken_once() {
        let queue: TaskQueue<u32> = TaskQueue::new(1);
        assert!(queue.take_consumer().is_some());
        assert!(queue.take_consumer().is_none());
    }

    #[tokio::test]
    async fn shutdown_wakes_blocked_getter() {
        let queue: TaskQueue<u32> = TaskQueue::new(1);
        let mut consumer = queue.take_consumer().unwrap();
        let getter = tokio::spawn(async move { consumer.get().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.shutdown();
        let result = tokio::time::timeout(Duration::from_secs(1), getter)
            .await
            .expect("getter should wake")
            .unwrap();
        assert_eq!(result, Err(QueueClosed));
    }

    #[tokio::test]
    async fn queued_items_drain_after_shutdown() {
        let queue: TaskQueue<u32> = TaskQueue::new(8);
        let mut consumer = queue.take_consumer().unwrap();
        queue.put(7).await.unwrap();
        queue.put(8).await.unwrap();
        queue.shutdown();
        assert_eq!(consumer.get().await.unwrap(), 7);
        assert_eq!(consumer.get().await.unwrap(), 8);
        assert_eq!(consumer.get().await, Err(QueueClosed));
        assert!(queue.put(9).await.is_err());
    }

    #[tokio::test]
    async fn try_put_reports_full_and_closed() {
        let queue: TaskQueue<u32> = TaskQueue::new(1);
        let _consumer = queue.take_consumer().unwrap();
        assert_eq!(queue.try_put(1), Ok(()));
        assert_eq!(queue.try_put(2), Err(TryPutError::Full));
        queue.shutdown();
        assert_eq!(queue.try_put(3), Err(TryPutError::Closed));
    }

    #[tokio::test]
    async fn done_counter_tracks_processing() {
        let queue: TaskQueue<u32> = TaskQueue::new(4);
        let mut consumer = queue.take_consumer().unwrap();
        queue.put(1).await.unwrap();
        queue.put(2).await.unwrap();
        consumer.get().await.unwrap();
        queue.task_done();
        consumer.get().await.unwrap();
        queue.task_done();
        assert_eq!(queue.completed_count(), 2);
        assert_eq!(queue.enqueued_count(), 2);
        // Over-completion is tolerated (logged, not escalated).
        queue.task_done();
        assert_eq!(queue.completed_count(), 3);
    }
}
