//! In-flight translation deduplication.
//! Guarantees at most one live computation per cache key: the first caller
//! for a key becomes the producer, later callers wait (bounded) for the
//! producer's published outcome instead of issuing a duplicate request.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::trans::{TransError, TransResult};

/// How long a waiter is parked before giving up on the producer.
pub const INFLIGHT_TIMEOUT: Duration = Duration::from_millis(2_000);

type Outcome = Result<TransResult, TransError>;

struct InflightSlot {
    tx: watch::Sender<Option<Outcome>>,
}

/// Tracks pending translations by cache key.
pub struct InFlightManager {
    inflight: Mutex<HashMap<String, Arc<InflightSlot>>>,
    is_initialized: AtomicBool,
    timeout: Duration,
}

impl Default for InFlightManager {
    fn default() -> Self {
        Self::new()
    }
}

impl InFlightManager {
    pub fn new() -> Self {
        Self::with_timeout(INFLIGHT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            inflight: Mutex::new(HashMap::new()),
            is_initialized: AtomicBool::new(false),
            timeout,
        }
    }

    /// Activate the manager. Before this call `mark_start` is a no-op that
    /// always reports "go compute".
    pub fn component_load(&self) {
        self.is_initialized.store(true, Ordering::SeqCst);
        info!("in-flight manager initialized");
    }

    /// Deactivate and cancel every pending slot. Waiters observe a
    /// cancellation-derived timeout error.
    pub fn component_teardown(&self) {
        self.is_initialized.store(false, Ordering::SeqCst);
        let mut map = self.inflight.lock();
        // Dropping a slot drops its watch sender; parked waiters see the
        // channel close and surface it as cancellation.
        map.clear();
        info!("in-flight manager torn down, pending state cleared");
    }

    /// Mark the start of an in-flight translation.
    ///
    /// Returns `Ok(None)` when the caller is the producer (or the manager is
    /// inactive) and must later publish via [`store_result`] /
    /// [`store_exception`]. Returns `Ok(Some(result))` when another
    /// producer's result arrived within the timeout. A stored exception is
    /// returned as that error; timeout and teardown cancellation surface as
    /// [`TransError::InflightTimeout`].
    ///
    /// [`store_result`]: Self::store_result
    /// [`store_exception`]: Self::store_exception
    pub async fn mark_start(&self, cache_key: &str) -> Result<Option<TransResult>, TransError> {
        if !self.is_initialized.load(Ordering::SeqCst) {
            return Ok(None);
        }
        if cache_key.is_empty() {
            warn!("attempted to mark in-flight start with empty cache key");
            return Ok(None);
        }

        let (slot, mut rx) = {
            let mut map = self.inflight.lock();
            let existing = map
                .get(cache_key)
                .map(|slot| (Arc::clone(slot), slot.tx.subscribe()));
            match existing {
                Some(pair) => {
                    debug!(key = key_prefix(cache_key), "in-flight translation detected");
                    pair
                }
                None => {
                    let (tx, _rx) = watch::channel(None);
                    map.insert(cache_key.to_string(), Arc::new(InflightSlot { tx }));
                    debug!(key = key_prefix(cache_key), "marked in-flight start");
                    return Ok(None);
                }
            }
        };

        let wait_result = tokio::time::timeout(self.timeout, rx.wait_for(|v| v.is_some())).await;
        match wait_result {
            Ok(Ok(value)) => match value.as_ref().cloned() {
                Some(Ok(result)) => {
                    debug!(key = key_prefix(cache_key), "received in-flight translation result");
                    Ok(Some(result))
                }
                Some(Err(err)) => Err(err),
                // wait_for only returns once the value is Some.
                None => Err(TransError::InflightTimeout(format!(
                    "in-flight translation failed for key: {}",
                    key_prefix(cache_key)
                ))),
            },
            Ok(Err(_closed)) => {
                // Sender dropped without publishing: manager teardown.
                warn!(key = key_prefix(cache_key), "in-flight translation cancelled");
                self.remove_if_same(cache_key, &slot);
                Err(TransError::InflightTimeout(format!(
                    "in-flight translation cancelled for key: {}",
                    key_prefix(cache_key)
                )))
            }
            Err(_elapsed) => {
                warn!(key = key_prefix(cache_key), "in-flight translation timeout");
                self.remove_if_same(cache_key, &slot);
                Err(TransError::InflightTimeout(format!(
                    "in-flight translation timed out for key: {}",
                    key_prefix(cache_key)
                )))
            }
        }
    }

    /// Remove the map entry only if it still refers to the slot this waiter
    /// was waiting on. Guards against removing a slot that a newer producer
    /// has since created under the same key.
    fn remove_if_same(&self, cache_key: &str, waited_on: &Arc<InflightSlot>) {
        let mut map = self.inflight.lock();
        if let Some(current) = map.get(cache_key) {
            if Arc::ptr_eq(current, waited_on) {
                map.remove(cache_key);
            }
        }
    }

    /// Publish a successful result to all waiters and release the slot.
    pub fn store_result(&self, cache_key: &str, result: TransResult) {
        if cache_key.is_empty() {
            warn!("attempted to store in-flight result with empty cache key");
            return;
        }
        let slot = self.inflight.lock().remove(cache_key);
        match slot {
            Some(slot) => {
                slot.tx.send_replace(Some(Ok(result)));
                debug!(key = key_prefix(cache_key), "stored in-flight translation result");
            }
            None => warn!(
                key = key_prefix(cache_key),
                "no in-flight slot found when storing result"
            ),
        }
    }

    /// Publish a failure to all waiters and release the slot.
    pub fn store_exception(&self, cache_key: &str, err: TransError) {
        if cache_key.is_empty() {
            warn!("attempted to store in-flight exception with empty cache key");
            return;
        }
        let slot = self.inflight.lock().remove(cache_key);
        match slot {
            Some(slot) => {
                slot.tx.send_replace(Some(Err(err)));
                debug!(key = key_prefix(cache_key), "stored in-flight translation exception");
            }
            None => warn!(
                key = key_prefix(cache_key),
                "no in-flight slot found when storing exception"
            ),
        }
    }

    /// Number of currently pending keys.
    pub fn pending_count(&self) -> usize {
        self.inflight.lock().len()
    }
}

fn key_prefix(key: &str) -> &str {
    &key[..key.len().min(16)]
}
