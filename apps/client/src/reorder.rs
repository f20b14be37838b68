//! Debounced batch persistence for drag-and-drop exercise ordering.
//!
//! A drag gesture emits one position change per item moved, many times a
//! second. The manager coalesces a burst into a single write after a quiet
//! period, retries transient failures with backoff, and can roll the whole
//! drag back to the order captured before it began.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::api::{ApiError, OrderStore};
use linguaflow_core::types::OrderUpdate;

/// Quiet period after the last scheduled change before the batch is written.
const DEBOUNCE: Duration = Duration::from_millis(800);

/// Attempts per write: one original plus two retries.
const MAX_ATTEMPTS: u32 = 3;

/// Initial retry backoff; doubles per attempt.
const RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Poll interval while undo waits for an in-flight flush.
const UNDO_POLL: Duration = Duration::from_millis(50);

/// Callbacks fired as a scheduled batch moves through its lifecycle.
///
/// The last caller's callbacks win; in practice one logical drag supplies
/// one set.
#[derive(Default)]
pub struct ReorderCallbacks {
    pub on_pending: Option<Box<dyn Fn() + Send + Sync>>,
    pub on_success: Option<Box<dyn Fn(&[OrderUpdate]) + Send + Sync>>,
    pub on_error: Option<Box<dyn Fn(&str) + Send + Sync>>,
}

#[derive(Default)]
struct ManagerState {
    /// Coalesced changes awaiting flush; last write per id wins.
    pending: HashMap<String, u32>,
    /// Order captured before the first change of a drag sequence. Consumed
    /// by undo, discarded by cancel, never overwritten while present.
    snapshot: Option<Vec<OrderUpdate>>,
    callbacks: Arc<ReorderCallbacks>,
    /// The single live debounce timer.
    timer: Option<JoinHandle<()>>,
    /// Guards against two concurrent writes.
    processing: bool,
    is_pending: bool,
    last_saved: Option<Vec<OrderUpdate>>,
    error: Option<String>,
}

struct ReorderInner {
    store: Arc<dyn OrderStore>,
    state: Mutex<ManagerState>,
}

/// Debounced, coalescing write scheduler for exercise ordering.
///
/// Clone-able; clones share state. The state mutex is never held across an
/// await point.
#[derive(Clone)]
pub struct ReorderManager {
    inner: Arc<ReorderInner>,
}

impl ReorderManager {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self {
            inner: Arc::new(ReorderInner {
                store,
                state: Mutex::new(ManagerState::default()),
            }),
        }
    }

    /// Merge position changes into the pending batch and reset the debounce
    /// timer.
    ///
    /// `previous_order` is recorded as the undo snapshot only when none
    /// exists yet, so undo restores the state before the whole drag
    /// sequence rather than the last micro-move.
    pub fn schedule_update(
        &self,
        updates: Vec<OrderUpdate>,
        callbacks: ReorderCallbacks,
        previous_order: Option<Vec<OrderUpdate>>,
    ) {
        let mut state = self.lock();
        for update in updates {
            state.pending.insert(update.id, update.order_index);
        }
        if state.snapshot.is_none() {
            state.snapshot = previous_order;
        }
        state.callbacks = Arc::new(callbacks);

        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        let inner = self.inner.clone();
        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(DEBOUNCE).await;
            ReorderManager { inner }.flush().await;
        }));
        debug!(pending = state.pending.len(), "reorder batch scheduled");
    }

    /// Cancel the debounce timer and write any pending batch immediately.
    ///
    /// Call before navigation or unmount so a still-debounced change is not
    /// lost.
    pub async fn flush_now(&self) {
        if let Some(timer) = self.lock().timer.take() {
            timer.abort();
        }
        self.flush().await;
    }

    /// Restore the order captured before the drag sequence began.
    ///
    /// Waits out any in-flight flush rather than racing it, discards
    /// unflushed changes, then writes the snapshot with the usual retry
    /// policy. Returns the restored order on success. Returns `None` when
    /// there is no snapshot (no network call is made) or when the write
    /// fails; on failure the snapshot is kept so undo can be retried.
    pub async fn undo(&self) -> Option<Vec<OrderUpdate>> {
        if self.lock().snapshot.is_none() {
            return None;
        }

        // Let an in-flight flush finish; two writes must not race.
        loop {
            {
                let mut state = self.lock();
                if !state.processing {
                    if let Some(timer) = state.timer.take() {
                        timer.abort();
                    }
                    state.pending.clear();
                    state.processing = true;
                    state.is_pending = true;
                    break;
                }
            }
            tokio::time::sleep(UNDO_POLL).await;
        }

        let (batch, callbacks) = {
            let mut state = self.lock();
            match state.snapshot.clone() {
                Some(batch) => (batch, state.callbacks.clone()),
                None => {
                    // Snapshot discarded while waiting (cancel); nothing to
                    // restore.
                    state.processing = false;
                    state.is_pending = false;
                    return None;
                }
            }
        };

        match self.write_with_retry(&batch).await {
            Ok(()) => {
                let mut state = self.lock();
                state.snapshot = None;
                state.last_saved = Some(batch.clone());
                state.processing = false;
                state.is_pending = false;
                state.error = None;
                Some(batch)
            }
            Err(err) => {
                let message = err.to_string();
                {
                    let mut state = self.lock();
                    state.processing = false;
                    state.is_pending = false;
                    state.error = Some(message.clone());
                }
                if let Some(on_error) = &callbacks.on_error {
                    on_error(&message);
                }
                None
            }
        }
    }

    /// Abandon the in-progress reorder: drop the timer, the pending batch
    /// and the undo snapshot without writing anything.
    pub fn cancel(&self) {
        let mut state = self.lock();
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.pending.clear();
        state.snapshot = None;
    }

    /// Whether a write is in flight.
    pub fn is_pending(&self) -> bool {
        self.lock().is_pending
    }

    /// Last write failure, if any.
    pub fn error(&self) -> Option<String> {
        self.lock().error.clone()
    }

    /// Whether coalesced changes are awaiting flush.
    pub fn has_pending_changes(&self) -> bool {
        !self.lock().pending.is_empty()
    }

    /// The batch most recently persisted.
    pub fn last_saved_order(&self) -> Option<Vec<OrderUpdate>> {
        self.lock().last_saved.clone()
    }

    /// Write the coalesced batch. No-op when a write is already in flight
    /// (that write captured the freshest coalesced state) or when nothing
    /// is pending.
    async fn flush(&self) {
        let (batch, callbacks) = {
            let mut state = self.lock();
            if state.processing || state.pending.is_empty() {
                return;
            }
            state.processing = true;
            state.is_pending = true;
            let mut batch: Vec<OrderUpdate> = state
                .pending
                .drain()
                .map(|(id, order_index)| OrderUpdate { id, order_index })
                .collect();
            batch.sort_by_key(|u| u.order_index);
            (batch, state.callbacks.clone())
        };

        if let Some(on_pending) = &callbacks.on_pending {
            on_pending();
        }

        match self.write_with_retry(&batch).await {
            Ok(()) => {
                {
                    let mut state = self.lock();
                    state.last_saved = Some(batch.clone());
                    state.processing = false;
                    state.is_pending = false;
                    state.error = None;
                }
                if let Some(on_success) = &callbacks.on_success {
                    on_success(&batch);
                }
            }
            Err(err) => {
                // Failed changes are not re-queued; the caller re-triggers
                // from the UI.
                let message = err.to_string();
                {
                    let mut state = self.lock();
                    state.processing = false;
                    state.is_pending = false;
                    state.error = Some(message.clone());
                }
                if let Some(on_error) = &callbacks.on_error {
                    on_error(&message);
                }
            }
        }
    }

    async fn write_with_retry(&self, batch: &[OrderUpdate]) -> Result<(), ApiError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.inner.store.save_order(batch).await {
                Ok(()) => return Ok(()),
                Err(err) if err.is_rate_limited() => {
                    warn!(%err, "order write rate-limited; not retrying");
                    return Err(err);
                }
                Err(err) if attempt < MAX_ATTEMPTS => {
                    let backoff = RETRY_BACKOFF * 2u32.pow(attempt - 1);
                    warn!(%err, attempt, "order write failed; retrying");
                    tokio::time::sleep(backoff).await;
                }
                Err(err) => {
                    error!(%err, attempt, "order write failed; giving up");
                    return Err(err);
                }
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, ManagerState> {
        self.inner.state.lock().expect("reorder state lock")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;
    use tokio::time::sleep;

    /// Records every write and fails with the next scripted error, if any.
    #[derive(Default)]
    struct MockStore {
        calls: Mutex<Vec<Vec<OrderUpdate>>>,
        failures: Mutex<VecDeque<ApiError>>,
        delay: Mutex<Option<Duration>>,
    }

    impl MockStore {
        fn calls(&self) -> Vec<Vec<OrderUpdate>> {
            self.calls.lock().expect("calls lock").clone()
        }

        fn push_failure(&self, err: ApiError) {
            self.failures.lock().expect("failures lock").push_back(err);
        }

        fn set_delay(&self, delay: Duration) {
            *self.delay.lock().expect("delay lock") = Some(delay);
        }
    }

    #[async_trait]
    impl OrderStore for MockStore {
        async fn save_order(&self, updates: &[OrderUpdate]) -> Result<(), ApiError> {
            let delay = *self.delay.lock().expect("delay lock");
            if let Some(delay) = delay {
                sleep(delay).await;
            }
            self.calls
                .lock()
                .expect("calls lock")
                .push(updates.to_vec());
            match self.failures.lock().expect("failures lock").pop_front() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }
    }

    fn update(id: &str, order_index: u32) -> OrderUpdate {
        OrderUpdate {
            id: id.to_string(),
            order_index,
        }
    }

    fn capture_errors() -> (Arc<Mutex<Vec<String>>>, ReorderCallbacks) {
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = errors.clone();
        let callbacks = ReorderCallbacks {
            on_error: Some(Box::new(move |msg: &str| {
                sink.lock().expect("errors lock").push(msg.to_string());
            })),
            ..Default::default()
        };
        (errors, callbacks)
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_coalesces_to_one_write() {
        let store = Arc::new(MockStore::default());
        let manager = ReorderManager::new(store.clone());

        for order_index in [2, 5, 3] {
            manager.schedule_update(
                vec![update("ex-1", order_index)],
                ReorderCallbacks::default(),
                None,
            );
            sleep(Duration::from_millis(100)).await;
        }
        assert!(manager.has_pending_changes());

        sleep(Duration::from_millis(900)).await;

        let calls = store.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], vec![update("ex-1", 3)]);
        assert!(!manager.has_pending_changes());
        assert!(!manager.is_pending());
        assert_eq!(manager.error(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_distinct_ids_batch_together() {
        let store = Arc::new(MockStore::default());
        let manager = ReorderManager::new(store.clone());

        manager.schedule_update(
            vec![update("b", 1), update("a", 0)],
            ReorderCallbacks::default(),
            None,
        );
        manager.schedule_update(vec![update("c", 2)], ReorderCallbacks::default(), None);
        sleep(Duration::from_millis(900)).await;

        let calls = store.calls();
        assert_eq!(calls.len(), 1);
        // Batches are written in order_index order.
        assert_eq!(calls[0], vec![update("a", 0), update("b", 1), update("c", 2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_bursts_write_twice_and_undo_targets_first_snapshot() {
        let store = Arc::new(MockStore::default());
        let manager = ReorderManager::new(store.clone());
        let original = vec![update("a", 0), update("b", 1)];

        manager.schedule_update(
            vec![update("a", 1), update("b", 0)],
            ReorderCallbacks::default(),
            Some(original.clone()),
        );
        sleep(Duration::from_millis(900)).await;

        // Second burst supplies its own previous order, which must not
        // displace the unconsumed snapshot from the first.
        manager.schedule_update(
            vec![update("a", 0), update("b", 1)],
            ReorderCallbacks::default(),
            Some(vec![update("a", 1), update("b", 0)]),
        );
        sleep(Duration::from_millis(900)).await;
        assert_eq!(store.calls().len(), 2);

        let restored = manager.undo().await;
        assert_eq!(restored, Some(original.clone()));

        let calls = store.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[2], original);

        // Undo is one-shot.
        assert_eq!(manager.undo().await, None);
        assert_eq!(store.calls().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_retries_three_times() {
        let store = Arc::new(MockStore::default());
        for _ in 0..3 {
            store.push_failure(ApiError::Network("connection reset".to_string()));
        }
        let manager = ReorderManager::new(store.clone());
        let (errors, callbacks) = capture_errors();

        manager.schedule_update(vec![update("ex-1", 4)], callbacks, None);
        sleep(Duration::from_secs(6)).await;

        assert_eq!(store.calls().len(), 3);
        assert_eq!(errors.lock().expect("errors lock").len(), 1);
        let error = manager.error().expect("error surfaced");
        assert!(error.contains("connection reset"));
        assert!(!manager.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_fails_without_retry() {
        let store = Arc::new(MockStore::default());
        store.push_failure(ApiError::Backend {
            status: 429,
            message: "Too Many Requests".to_string(),
        });
        let manager = ReorderManager::new(store.clone());
        let (errors, callbacks) = capture_errors();

        manager.schedule_update(vec![update("ex-1", 4)], callbacks, None);
        sleep(Duration::from_secs(6)).await;

        assert_eq!(store.calls().len(), 1);
        assert_eq!(errors.lock().expect("errors lock").len(), 1);
        assert!(manager.error().expect("error surfaced").contains("429"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_undo_without_snapshot_is_a_no_op() {
        let store = Arc::new(MockStore::default());
        let manager = ReorderManager::new(store.clone());

        assert_eq!(manager.undo().await, None);
        assert!(store.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_now_writes_once_and_cancels_timer() {
        let store = Arc::new(MockStore::default());
        let manager = ReorderManager::new(store.clone());

        manager.schedule_update(vec![update("ex-1", 7)], ReorderCallbacks::default(), None);
        manager.flush_now().await;

        assert_eq!(store.calls().len(), 1);
        assert_eq!(store.calls()[0], vec![update("ex-1", 7)]);

        // The debounced timer must not produce a duplicate write later.
        sleep(Duration::from_secs(2)).await;
        assert_eq!(store.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_discards_everything_without_writing() {
        let store = Arc::new(MockStore::default());
        let manager = ReorderManager::new(store.clone());

        manager.schedule_update(
            vec![update("ex-1", 2)],
            ReorderCallbacks::default(),
            Some(vec![update("ex-1", 0)]),
        );
        manager.cancel();
        sleep(Duration::from_secs(2)).await;

        assert!(store.calls().is_empty());
        assert!(!manager.has_pending_changes());
        assert_eq!(manager.undo().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_undo_failure_keeps_snapshot_for_retry() {
        let store = Arc::new(MockStore::default());
        let manager = ReorderManager::new(store.clone());
        let original = vec![update("a", 0)];

        manager.schedule_update(
            vec![update("a", 3)],
            ReorderCallbacks::default(),
            Some(original.clone()),
        );
        manager.flush_now().await;
        assert_eq!(store.calls().len(), 1);

        for _ in 0..3 {
            store.push_failure(ApiError::Network("connection reset".to_string()));
        }
        assert_eq!(manager.undo().await, None);
        assert!(manager.error().is_some());

        // Snapshot survived the failed undo; a retry succeeds.
        let restored = manager.undo().await;
        assert_eq!(restored, Some(original.clone()));
        assert_eq!(store.calls().last().expect("at least one call"), &original);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_during_in_flight_write_is_dropped() {
        let store = Arc::new(MockStore::default());
        store.set_delay(Duration::from_secs(10));
        let manager = ReorderManager::new(store.clone());

        manager.schedule_update(vec![update("a", 1)], ReorderCallbacks::default(), None);
        let background = manager.clone();
        let first = tokio::spawn(async move { background.flush_now().await });
        tokio::task::yield_now().await;
        assert!(manager.is_pending());

        // Changes scheduled while a write is in flight stay pending; the
        // concurrent flush request is a no-op.
        manager.schedule_update(vec![update("b", 2)], ReorderCallbacks::default(), None);
        manager.flush_now().await;
        assert_eq!(store.calls().len(), 0);

        first.await.expect("flush task");
        assert_eq!(store.calls().len(), 1);
        assert!(manager.has_pending_changes());
    }

    #[tokio::test(start_paused = true)]
    async fn test_undo_waits_for_in_flight_flush() {
        let store = Arc::new(MockStore::default());
        store.set_delay(Duration::from_secs(5));
        let manager = ReorderManager::new(store.clone());
        let original = vec![update("a", 0), update("b", 1)];

        manager.schedule_update(
            vec![update("a", 1), update("b", 0)],
            ReorderCallbacks::default(),
            Some(original.clone()),
        );
        let background = manager.clone();
        let flush = tokio::spawn(async move { background.flush_now().await });
        tokio::task::yield_now().await;

        // Undo must serialize behind the in-flight write.
        let restored = manager.undo().await;
        assert_eq!(restored, Some(original.clone()));

        flush.await.expect("flush task");
        let calls = store.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1], original);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lifecycle_callbacks_fire() {
        let store = Arc::new(MockStore::default());
        let manager = ReorderManager::new(store.clone());

        let events = Arc::new(Mutex::new(Vec::new()));
        let pending_events = events.clone();
        let success_events = events.clone();
        let callbacks = ReorderCallbacks {
            on_pending: Some(Box::new(move || {
                pending_events
                    .lock()
                    .expect("events lock")
                    .push("pending".to_string());
            })),
            on_success: Some(Box::new(move |batch: &[OrderUpdate]| {
                success_events
                    .lock()
                    .expect("events lock")
                    .push(format!("success:{}", batch.len()));
            })),
            on_error: None,
        };

        manager.schedule_update(vec![update("a", 0), update("b", 1)], callbacks, None);
        sleep(Duration::from_millis(900)).await;

        let events = events.lock().expect("events lock").clone();
        assert_eq!(events, vec!["pending".to_string(), "success:2".to_string()]);
        assert_eq!(
            manager.last_saved_order(),
            Some(vec![update("a", 0), update("b", 1)])
        );
    }
}
