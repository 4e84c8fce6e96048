//! The offline queue manager.
//!
//! Owns the pending-mutation queue, the online flag and the sync status.
//! State lives behind a mutex that is never held across an `.await`, so an
//! [`enqueue_action`](OfflineQueueManager::enqueue_action) can land while a
//! sync pass is waiting on the backend. The pass works on a snapshot and
//! merges its results back into the stored queue, which keeps those items.
//!
//! The stored queue is authoritative and may be shared with other
//! processes. Every change is a read-modify-write against the store, and
//! the in-memory copy is refreshed from it before each pass.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::backend::{Backend, DeliveryError};
use super::connectivity::ConnectivityEvent;
use super::item::{generate_id, OperationKind, QueueItem};
use super::persist::{QueueStore, DEFAULT_STORAGE_KEY};
use super::status::QueueStatus;
use crate::core::{truncate_to_millis, Clock};
use crate::error::OffsyncError;
use crate::storage::KeyValueStore;

/// Failed attempts after which an item stops counting retries and waits
/// for manual review.
pub const RETRY_CEILING: u32 = 3;

/// Manager settings.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Key the queue is persisted under.
    pub storage_key: String,
    /// Retry ceiling.
    pub retry_ceiling: u32,
    /// Upper bound on one delivery attempt.
    pub delivery_timeout: Duration,
    /// Sync automatically when connectivity returns.
    pub auto_sync_on_reconnect: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            retry_ceiling: RETRY_CEILING,
            delivery_timeout: Duration::from_secs(15),
            auto_sync_on_reconnect: true,
        }
    }
}

/// Where the manager is in its sync cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// No pass running, last pass (if any) fully succeeded
    Idle,
    /// A pass is in flight
    Syncing,
    /// The last pass left at least one failed item
    Error,
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Syncing => "syncing",
            Self::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// Why a sync request did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Nothing queued
    EmptyQueue,
    /// Connectivity is down
    Offline,
    /// Another pass is in flight
    AlreadySyncing,
    /// Manual retry requested but the last pass did not fail
    NotInError,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::EmptyQueue => "queue is empty",
            Self::Offline => "offline",
            Self::AlreadySyncing => "a sync pass is already running",
            Self::NotInError => "last sync did not fail",
        };
        write!(f, "{s}")
    }
}

/// Result of delivering a single item.
#[derive(Debug, Clone, Serialize)]
pub struct ItemResult {
    /// Queue item id
    pub id: String,
    /// Operation kind
    pub operation_kind: OperationKind,
    /// Entity kind
    pub entity_kind: String,
    /// Whether the backend accepted it
    pub success: bool,
    /// Failure message
    pub error: Option<String>,
    /// Retry count after this attempt
    pub retry_count: u32,
}

/// Result of one sync pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    /// Items delivered and removed
    pub succeeded: usize,
    /// Items that failed and stay queued
    pub failed: usize,
    /// Per-item results in delivery order
    pub results: Vec<ItemResult>,
}

impl SyncReport {
    /// Add a result.
    pub fn add(&mut self, result: ItemResult) {
        if result.success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.results.push(result);
    }

    /// Check if all attempted items succeeded.
    #[must_use]
    pub const fn all_succeeded(&self) -> bool {
        self.failed == 0
    }

    /// Total items attempted.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.succeeded + self.failed
    }
}

/// What a sync request did.
#[derive(Debug, Clone)]
pub enum SyncOutcome {
    /// A pass ran to completion.
    Completed(SyncReport),
    /// No pass ran.
    Skipped(SkipReason),
}

impl SyncOutcome {
    /// The report, if a pass ran.
    #[must_use]
    pub const fn report(&self) -> Option<&SyncReport> {
        match self {
            Self::Completed(report) => Some(report),
            Self::Skipped(_) => None,
        }
    }
}

struct State {
    is_online: bool,
    queue: Vec<QueueItem>,
    sync_status: SyncStatus,
}

/// Offline mutation queue with retrying synchronization.
pub struct OfflineQueueManager {
    state: Mutex<State>,
    store: QueueStore,
    backend: Arc<dyn Backend>,
    clock: Arc<dyn Clock>,
    config: ManagerConfig,
}

impl OfflineQueueManager {
    /// Create a manager and load the persisted queue.
    ///
    /// An unreadable or malformed persisted queue starts the manager empty.
    #[must_use]
    pub fn initialize(
        store: Arc<dyn KeyValueStore>,
        backend: Arc<dyn Backend>,
        clock: Arc<dyn Clock>,
        config: ManagerConfig,
        online: bool,
    ) -> Self {
        let store = QueueStore::new(store, config.storage_key.clone());
        let queue = store.load();
        debug!(items = queue.len(), online, "offline queue loaded");

        Self {
            state: Mutex::new(State {
                is_online: online,
                queue,
                sync_status: SyncStatus::Idle,
            }),
            store,
            backend,
            clock,
            config,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the cached queue with the stored one. A store read error
    /// keeps the cached copy.
    fn refresh(&self, state: &mut State) {
        match self.store.read() {
            Ok(queue) => state.queue = queue,
            Err(e) => warn!(error = %e, "failed to refresh queue from store, keeping cached copy"),
        }
    }

    /// Pick up changes other processes made to the stored queue.
    pub fn reload(&self) {
        let mut state = self.lock();
        self.refresh(&mut state);
    }

    /// Settings in use.
    #[must_use]
    pub const fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Whether the manager currently believes the backend is reachable.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.lock().is_online
    }

    /// Current sync status.
    #[must_use]
    pub fn sync_status(&self) -> SyncStatus {
        self.lock().sync_status
    }

    /// Copy of the queue in FIFO order.
    #[must_use]
    pub fn queue(&self) -> Vec<QueueItem> {
        self.lock().queue.clone()
    }

    /// Number of queued items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    /// Whether nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().queue.is_empty()
    }

    /// Look up a queued item.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<QueueItem> {
        self.lock().queue.iter().find(|item| item.id == id).cloned()
    }

    /// Items whose automatic retries are used up.
    #[must_use]
    pub fn exhausted(&self) -> Vec<QueueItem> {
        let ceiling = self.config.retry_ceiling;
        self.lock()
            .queue
            .iter()
            .filter(|item| item.is_exhausted(ceiling))
            .cloned()
            .collect()
    }

    /// Snapshot for status surfaces.
    #[must_use]
    pub fn status(&self) -> QueueStatus {
        let ceiling = self.config.retry_ceiling;
        let state = self.lock();
        QueueStatus {
            is_online: state.is_online,
            pending: state.queue.len(),
            exhausted: state
                .queue
                .iter()
                .filter(|item| item.is_exhausted(ceiling))
                .count(),
            sync_status: state.sync_status,
            oldest: state.queue.first().map(|item| item.enqueued_at),
        }
    }

    /// Queue a mutation for later delivery and return its id.
    ///
    /// The queue is persisted before this returns; nothing is sent.
    ///
    /// # Errors
    ///
    /// Returns an error if `entity_kind` is blank or the queue cannot be
    /// persisted. In the latter case the item is not kept.
    pub fn enqueue_action(
        &self,
        operation_kind: OperationKind,
        entity_kind: &str,
        payload: serde_json::Value,
    ) -> Result<String, OffsyncError> {
        let entity_kind = entity_kind.trim();
        if entity_kind.is_empty() {
            return Err(OffsyncError::InvalidInput(
                "entity kind must not be empty".to_string(),
            ));
        }

        let now = truncate_to_millis(self.clock.now());
        let mut item = QueueItem::new(operation_kind, entity_kind, payload, now);

        let mut state = self.lock();
        let (queue, id) = self.store.update(|queue| {
            while queue.iter().any(|queued| queued.id == item.id) {
                item.id = generate_id(now);
            }
            let id = item.id.clone();
            queue.push(item);
            id
        })?;
        state.queue = queue;

        info!(
            id = %id,
            operation = operation_kind.as_str(),
            entity = entity_kind,
            pending = state.queue.len(),
            "queued mutation"
        );
        Ok(id)
    }

    /// Remove an item. Returns `false` if no stored item has that id.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue cannot be persisted; the item is then kept.
    pub fn remove_from_queue(&self, id: &str) -> Result<bool, OffsyncError> {
        let mut state = self.lock();
        let (queue, removed) = self.store.update(|queue| {
            let before = queue.len();
            queue.retain(|item| item.id != id);
            queue.len() != before
        })?;
        state.queue = queue;

        if removed {
            info!(id = %id, pending = state.queue.len(), "removed queued mutation");
        }
        Ok(removed)
    }

    /// Drop every queued item. Returns how many stored items were dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or cleared; nothing is
    /// dropped then.
    pub fn clear(&self) -> Result<usize, OffsyncError> {
        let mut state = self.lock();
        let count = self.store.read()?.len();
        self.store.clear()?;
        state.queue.clear();
        info!(count, "cleared offline queue");
        Ok(count)
    }

    /// Record the connectivity state without triggering a sync.
    pub fn set_online(&self, online: bool) {
        self.lock().is_online = online;
    }

    /// React to a connectivity transition.
    ///
    /// Going online with a non-empty queue and an idle status starts a pass.
    /// Going offline only flips the flag; a running pass carries on.
    /// Returns the pass outcome when one was started.
    ///
    /// # Errors
    ///
    /// Returns an error if the pass could not persist its result.
    pub async fn handle_connectivity(
        &self,
        event: ConnectivityEvent,
    ) -> Result<Option<SyncOutcome>, OffsyncError> {
        let should_sync = {
            let mut state = self.lock();
            state.is_online = event.is_online();
            if event.is_online() {
                self.refresh(&mut state);
            }
            event.is_online()
                && self.config.auto_sync_on_reconnect
                && !state.queue.is_empty()
                && state.sync_status == SyncStatus::Idle
        };
        info!(%event, "connectivity changed");

        if should_sync {
            self.sync_queue().await.map(Some)
        } else {
            Ok(None)
        }
    }

    /// Re-run a pass after one that left failures.
    ///
    /// # Errors
    ///
    /// Returns an error if the pass could not persist its result.
    pub async fn retry(&self) -> Result<SyncOutcome, OffsyncError> {
        if self.sync_status() != SyncStatus::Error {
            return Ok(SyncOutcome::Skipped(SkipReason::NotInError));
        }
        self.sync_queue().await
    }

    /// Run one sync pass over a snapshot of the stored queue.
    ///
    /// Items are delivered one at a time in queue order. Delivered items are
    /// removed; failed items stay with their retry count bumped (up to the
    /// ceiling). Items queued while the pass runs, here or by another
    /// process, are left untouched, and items removed meanwhile stay removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the merged queue cannot be persisted. The in-memory
    /// queue and status are already updated at that point.
    pub async fn sync_queue(&self) -> Result<SyncOutcome, OffsyncError> {
        let snapshot = {
            let mut state = self.lock();
            if !state.is_online {
                return Ok(SyncOutcome::Skipped(SkipReason::Offline));
            }
            self.refresh(&mut state);
            if state.queue.is_empty() {
                // Failed items were removed or cleared since the last pass.
                if state.sync_status == SyncStatus::Error {
                    state.sync_status = SyncStatus::Idle;
                }
                return Ok(SyncOutcome::Skipped(SkipReason::EmptyQueue));
            }
            if state.sync_status == SyncStatus::Syncing {
                return Ok(SyncOutcome::Skipped(SkipReason::AlreadySyncing));
            }
            state.sync_status = SyncStatus::Syncing;
            state.queue.clone()
        };
        let mut pass = PassGuard {
            state: &self.state,
            settled: false,
        };
        info!(items = snapshot.len(), "sync pass started");

        let ceiling = self.config.retry_ceiling;
        let mut report = SyncReport::default();
        let mut delivered: HashSet<String> = HashSet::new();
        let mut failed: HashMap<String, QueueItem> = HashMap::new();

        for mut item in snapshot {
            match self.attempt(&item).await {
                Ok(()) => {
                    debug!(id = %item.id, "delivered");
                    report.add(ItemResult {
                        id: item.id.clone(),
                        operation_kind: item.operation_kind,
                        entity_kind: item.entity_kind.clone(),
                        success: true,
                        error: None,
                        retry_count: item.retry_count,
                    });
                    delivered.insert(item.id);
                },
                Err(e) => {
                    item.record_failure(e.to_string(), ceiling);
                    warn!(
                        id = %item.id,
                        retry_count = item.retry_count,
                        exhausted = item.is_exhausted(ceiling),
                        error = %e,
                        "delivery failed"
                    );
                    report.add(ItemResult {
                        id: item.id.clone(),
                        operation_kind: item.operation_kind,
                        entity_kind: item.entity_kind.clone(),
                        success: false,
                        error: Some(e.to_string()),
                        retry_count: item.retry_count,
                    });
                    failed.insert(item.id.clone(), item);
                },
            }
        }

        let saved = {
            let mut state = self.lock();
            let stored = self.store.update(|queue| {
                *queue = merge_pass(std::mem::take(queue), &delivered, &failed);
            });
            let saved = match stored {
                Ok((queue, ())) => {
                    state.queue = queue;
                    Ok(())
                },
                Err(e) => {
                    // The store still holds the pre-pass queue, so delivered
                    // items may be delivered again by a later process.
                    let cached = std::mem::take(&mut state.queue);
                    state.queue = merge_pass(cached, &delivered, &failed);
                    Err(e)
                },
            };
            state.sync_status = if report.all_succeeded() {
                SyncStatus::Idle
            } else {
                SyncStatus::Error
            };
            pass.settled = true;
            saved
        };

        info!(
            succeeded = report.succeeded,
            failed = report.failed,
            remaining = self.len(),
            "sync pass finished"
        );
        saved?;
        Ok(SyncOutcome::Completed(report))
    }

    async fn attempt(&self, item: &QueueItem) -> Result<(), DeliveryError> {
        let limit = self.config.delivery_timeout;
        match tokio::time::timeout(limit, self.backend.deliver(item)).await {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Timeout(limit)),
        }
    }
}

/// Moves the status out of `Syncing` if a pass is dropped before it settles.
struct PassGuard<'a> {
    state: &'a Mutex<State>,
    settled: bool,
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.sync_status == SyncStatus::Syncing {
            warn!("sync pass abandoned before completion");
            state.sync_status = SyncStatus::Error;
        }
    }
}

/// Drop delivered items and swap in the updated copies of failed ones.
/// Items the pass never saw keep their place.
fn merge_pass(
    queue: Vec<QueueItem>,
    delivered: &HashSet<String>,
    failed: &HashMap<String, QueueItem>,
) -> Vec<QueueItem> {
    queue
        .into_iter()
        .filter(|item| !delivered.contains(&item.id))
        .map(|item| failed.get(&item.id).cloned().unwrap_or(item))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ManualClock;
    use crate::features::queue::backend::MockBackend;
    use crate::storage::{MemoryStore, SqliteStore};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Notify;

    /// Succeeds unless the decision function says otherwise.
    struct FnBackend<F>(F);

    #[async_trait]
    impl<F> Backend for FnBackend<F>
    where
        F: Fn(&QueueItem) -> Result<(), DeliveryError> + Send + Sync,
    {
        async fn deliver(&self, item: &QueueItem) -> Result<(), DeliveryError> {
            (self.0)(item)
        }
    }

    fn always_ok() -> Arc<dyn Backend> {
        Arc::new(FnBackend(|_: &QueueItem| Ok::<(), DeliveryError>(())))
    }

    fn always_fail() -> Arc<dyn Backend> {
        Arc::new(FnBackend(|_: &QueueItem| {
            Err::<(), DeliveryError>(DeliveryError::Transport("connection refused".to_string()))
        }))
    }

    /// Signals when a delivery starts and waits to be released.
    #[derive(Default)]
    struct GatedBackend {
        started: Notify,
        release: Notify,
    }

    #[async_trait]
    impl Backend for GatedBackend {
        async fn deliver(&self, _item: &QueueItem) -> Result<(), DeliveryError> {
            self.started.notify_one();
            self.release.notified().await;
            Ok(())
        }
    }

    /// Holds lead deliveries on a gate and fails everything else.
    #[derive(Default)]
    struct LeadGate(GatedBackend);

    #[async_trait]
    impl Backend for LeadGate {
        async fn deliver(&self, item: &QueueItem) -> Result<(), DeliveryError> {
            if item.entity_kind == "lead" {
                self.0.deliver(item).await
            } else {
                Err(DeliveryError::Transport("down".to_string()))
            }
        }
    }

    /// Never answers.
    struct HangingBackend;

    #[async_trait]
    impl Backend for HangingBackend {
        async fn deliver(&self, _item: &QueueItem) -> Result<(), DeliveryError> {
            std::future::pending().await
        }
    }

    /// In-memory store whose writes can be switched off.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        fail_writes: AtomicBool,
    }

    impl FlakyStore {
        fn failing() -> Self {
            let store = Self::default();
            store.fail_writes.store(true, Ordering::SeqCst);
            store
        }

        fn check(&self) -> Result<(), OffsyncError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                Err(OffsyncError::Database("disk full".to_string()))
            } else {
                Ok(())
            }
        }
    }

    impl KeyValueStore for FlakyStore {
        fn get_item(&self, key: &str) -> Result<Option<String>, OffsyncError> {
            self.inner.get_item(key)
        }

        fn set_item(&self, key: &str, value: &str) -> Result<(), OffsyncError> {
            self.check()?;
            self.inner.set_item(key, value)
        }

        fn remove_item(&self, key: &str) -> Result<(), OffsyncError> {
            self.check()?;
            self.inner.remove_item(key)
        }

        fn update_item(
            &self,
            key: &str,
            f: &mut dyn FnMut(Option<String>) -> Result<String, OffsyncError>,
        ) -> Result<(), OffsyncError> {
            self.check()?;
            self.inner.update_item(key, f)
        }
    }

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
        ))
    }

    fn manager_with(
        store: Arc<dyn KeyValueStore>,
        backend: Arc<dyn Backend>,
        online: bool,
    ) -> OfflineQueueManager {
        OfflineQueueManager::initialize(store, backend, clock(), ManagerConfig::default(), online)
    }

    fn manager(backend: Arc<dyn Backend>, online: bool) -> OfflineQueueManager {
        manager_with(Arc::new(MemoryStore::new()), backend, online)
    }

    #[test]
    fn test_enqueue_preserves_order() {
        let manager = manager(always_ok(), false);

        let ids: Vec<String> = ["lead", "deal", "task", "quote"]
            .iter()
            .map(|entity| {
                manager
                    .enqueue_action(OperationKind::Create, entity, json!({}))
                    .unwrap()
            })
            .collect();

        let queue = manager.queue();
        assert_eq!(queue.len(), 4);
        assert_eq!(
            queue.iter().map(|item| item.id.clone()).collect::<Vec<_>>(),
            ids
        );
        assert!(queue.iter().all(|item| item.retry_count == 0));
    }

    #[test]
    fn test_enqueue_persists_immediately() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let manager = manager_with(store.clone(), always_ok(), false);

        let id = manager
            .enqueue_action(OperationKind::Update, "lead", json!({"id": 5}))
            .unwrap();

        let raw = store.get_item(DEFAULT_STORAGE_KEY).unwrap().unwrap();
        assert!(raw.contains(&id));
    }

    #[test]
    fn test_enqueue_rejects_blank_entity() {
        let manager = manager(always_ok(), false);
        let err = manager
            .enqueue_action(OperationKind::Create, "  ", json!({}))
            .unwrap_err();
        assert!(matches!(err, OffsyncError::InvalidInput(_)));
        assert!(manager.is_empty());
    }

    #[test]
    fn test_enqueue_not_kept_when_persist_fails() {
        let manager = manager_with(Arc::new(FlakyStore::failing()), always_ok(), false);

        let err = manager
            .enqueue_action(OperationKind::Create, "lead", json!({}))
            .unwrap_err();

        assert!(matches!(err, OffsyncError::Database(_)));
        assert!(manager.is_empty());
    }

    #[test]
    fn test_remove_missing_id_is_noop() {
        let manager = manager(always_ok(), false);
        manager
            .enqueue_action(OperationKind::Create, "lead", json!({}))
            .unwrap();
        let before = manager.queue();

        assert!(!manager.remove_from_queue("nope").unwrap());
        assert_eq!(manager.queue(), before);
    }

    #[test]
    fn test_remove_existing_id() {
        let manager = manager(always_ok(), false);
        let keep = manager
            .enqueue_action(OperationKind::Create, "lead", json!({}))
            .unwrap();
        let drop = manager
            .enqueue_action(OperationKind::Delete, "deal", json!({"id": 1}))
            .unwrap();

        assert!(manager.remove_from_queue(&drop).unwrap());
        let queue = manager.queue();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].id, keep);
    }

    #[test]
    fn test_reload_reproduces_queue() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let first = manager_with(store.clone(), always_ok(), false);
        first
            .enqueue_action(OperationKind::Update, "lead", json!({"id": 5, "status": "won"}))
            .unwrap();
        first
            .enqueue_action(OperationKind::Delete, "deal", json!({"id": "d-2"}))
            .unwrap();

        let second = manager_with(store, always_ok(), false);
        assert_eq!(second.queue(), first.queue());
    }

    #[test]
    fn test_malformed_persisted_queue_starts_empty() {
        let store = Arc::new(MemoryStore::new());
        store.set_item(DEFAULT_STORAGE_KEY, "[{\"id\":").unwrap();

        let manager = manager_with(store, always_ok(), true);
        assert!(manager.is_empty());
        assert_eq!(manager.sync_status(), SyncStatus::Idle);
    }

    #[test]
    fn test_duplicate_ids_collapse_on_load() {
        let store = Arc::new(MemoryStore::new());
        let record = r#"{"id":"1-a","operationKind":"create","entityKind":"lead","payload":{},"enqueuedAt":"2024-03-01T09:00:00.000Z","retryCount":0}"#;
        store
            .set_item(DEFAULT_STORAGE_KEY, &format!("[{record},{record}]"))
            .unwrap();

        let manager = manager_with(store, always_ok(), false);
        assert_eq!(manager.len(), 1);
    }

    #[tokio::test]
    async fn test_sync_skipped_when_offline() {
        let manager = manager(always_ok(), false);
        manager
            .enqueue_action(OperationKind::Create, "lead", json!({}))
            .unwrap();

        let outcome = manager.sync_queue().await.unwrap();

        assert!(matches!(outcome, SyncOutcome::Skipped(SkipReason::Offline)));
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.sync_status(), SyncStatus::Idle);
    }

    #[tokio::test]
    async fn test_sync_skipped_when_empty() {
        let manager = manager(always_ok(), true);
        let outcome = manager.sync_queue().await.unwrap();
        assert!(matches!(outcome, SyncOutcome::Skipped(SkipReason::EmptyQueue)));
    }

    #[tokio::test]
    async fn test_all_failures_bump_retry_count() {
        let manager = manager(always_fail(), true);
        for entity in ["lead", "deal", "task"] {
            manager
                .enqueue_action(OperationKind::Create, entity, json!({}))
                .unwrap();
        }

        let outcome = manager.sync_queue().await.unwrap();

        let report = outcome.report().unwrap();
        assert_eq!(report.failed, 3);
        let queue = manager.queue();
        assert_eq!(queue.len(), 3);
        assert!(queue.iter().all(|item| item.retry_count == 1));
        assert!(queue
            .iter()
            .all(|item| item.last_error.as_deref() == Some("Transport error: connection refused")));
        assert_eq!(manager.sync_status(), SyncStatus::Error);
    }

    #[tokio::test]
    async fn test_partial_success_keeps_only_failures() {
        let backend = Arc::new(FnBackend(|item: &QueueItem| {
            if item.entity_kind == "deal" {
                Err(DeliveryError::Status {
                    code: 500,
                    body: "boom".to_string(),
                })
            } else {
                Ok(())
            }
        }));
        let manager = manager(backend, true);
        manager
            .enqueue_action(OperationKind::Create, "lead", json!({}))
            .unwrap();
        let b = manager
            .enqueue_action(OperationKind::Update, "deal", json!({"id": 3}))
            .unwrap();

        manager.sync_queue().await.unwrap();

        let queue = manager.queue();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].id, b);
        assert_eq!(queue[0].retry_count, 1);
        assert_eq!(manager.sync_status(), SyncStatus::Error);
    }

    #[tokio::test]
    async fn test_ceiling_item_is_kept_unchanged() {
        let manager = manager(always_fail(), true);
        manager
            .enqueue_action(OperationKind::Delete, "lead", json!({"id": 9}))
            .unwrap();

        for _ in 0..3 {
            manager.sync_queue().await.unwrap();
        }
        assert_eq!(manager.queue()[0].retry_count, 3);

        manager.sync_queue().await.unwrap();

        let queue = manager.queue();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].retry_count, 3);
        assert_eq!(manager.exhausted().len(), 1);
        assert_eq!(manager.status().exhausted, 1);
    }

    #[tokio::test]
    async fn test_failed_pass_is_persisted() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let manager = manager_with(store.clone(), always_fail(), true);
        manager
            .enqueue_action(OperationKind::Create, "lead", json!({}))
            .unwrap();

        manager.sync_queue().await.unwrap();

        let reloaded = manager_with(store, always_ok(), false);
        assert_eq!(reloaded.queue()[0].retry_count, 1);
    }

    #[tokio::test]
    async fn test_offline_update_then_reconnect_drains_queue() {
        let manager = manager(always_ok(), false);
        manager
            .enqueue_action(OperationKind::Update, "lead", json!({"id": 5, "status": "won"}))
            .unwrap();
        assert_eq!(manager.len(), 1);

        let outcome = manager
            .handle_connectivity(ConnectivityEvent::Online)
            .await
            .unwrap();

        assert_eq!(outcome.unwrap().report().unwrap().succeeded, 1);
        assert_eq!(manager.len(), 0);
        assert_eq!(manager.sync_status(), SyncStatus::Idle);
        assert!(manager.is_online());
    }

    #[tokio::test]
    async fn test_going_offline_only_flips_flag() {
        let manager = manager(always_ok(), true);
        manager
            .enqueue_action(OperationKind::Create, "lead", json!({}))
            .unwrap();

        let outcome = manager
            .handle_connectivity(ConnectivityEvent::Offline)
            .await
            .unwrap();

        assert!(outcome.is_none());
        assert!(!manager.is_online());
        assert_eq!(manager.len(), 1);
    }

    #[tokio::test]
    async fn test_reconnect_in_error_waits_for_manual_retry() {
        let fail = Arc::new(std::sync::atomic::AtomicBool::new(true));
        let flag = fail.clone();
        let backend = Arc::new(FnBackend(move |_: &QueueItem| {
            if flag.load(std::sync::atomic::Ordering::SeqCst) {
                Err(DeliveryError::Transport("reset".to_string()))
            } else {
                Ok(())
            }
        }));
        let manager = manager(backend, true);
        manager
            .enqueue_action(OperationKind::Create, "lead", json!({}))
            .unwrap();
        manager.sync_queue().await.unwrap();
        assert_eq!(manager.sync_status(), SyncStatus::Error);

        fail.store(false, std::sync::atomic::Ordering::SeqCst);
        manager
            .handle_connectivity(ConnectivityEvent::Offline)
            .await
            .unwrap();
        let auto = manager
            .handle_connectivity(ConnectivityEvent::Online)
            .await
            .unwrap();
        assert!(auto.is_none());
        assert_eq!(manager.len(), 1);

        let retried = manager.retry().await.unwrap();
        assert_eq!(retried.report().unwrap().succeeded, 1);
        assert!(manager.is_empty());
        assert_eq!(manager.sync_status(), SyncStatus::Idle);
    }

    #[tokio::test]
    async fn test_retry_requires_error_status() {
        let manager = manager(always_ok(), true);
        manager
            .enqueue_action(OperationKind::Create, "lead", json!({}))
            .unwrap();

        let outcome = manager.retry().await.unwrap();
        assert!(matches!(outcome, SyncOutcome::Skipped(SkipReason::NotInError)));
        assert_eq!(manager.len(), 1);
    }

    #[tokio::test]
    async fn test_error_clears_once_failed_items_are_gone() {
        let manager = manager(always_fail(), true);
        let id = manager
            .enqueue_action(OperationKind::Create, "lead", json!({}))
            .unwrap();
        manager.sync_queue().await.unwrap();
        assert_eq!(manager.sync_status(), SyncStatus::Error);

        manager.remove_from_queue(&id).unwrap();
        let outcome = manager.retry().await.unwrap();

        assert!(matches!(outcome, SyncOutcome::Skipped(SkipReason::EmptyQueue)));
        assert_eq!(manager.sync_status(), SyncStatus::Idle);
    }

    #[tokio::test]
    async fn test_auto_sync_can_be_disabled() {
        let config = ManagerConfig {
            auto_sync_on_reconnect: false,
            ..ManagerConfig::default()
        };
        let manager = OfflineQueueManager::initialize(
            Arc::new(MemoryStore::new()),
            always_ok(),
            clock(),
            config,
            false,
        );
        manager
            .enqueue_action(OperationKind::Create, "lead", json!({}))
            .unwrap();

        let outcome = manager
            .handle_connectivity(ConnectivityEvent::Online)
            .await
            .unwrap();
        assert!(outcome.is_none());
        assert_eq!(manager.len(), 1);
    }

    #[tokio::test]
    async fn test_enqueue_during_pass_survives_and_second_pass_is_rejected() {
        let backend = Arc::new(GatedBackend::default());
        let manager = manager(backend.clone(), true);
        let first = manager
            .enqueue_action(OperationKind::Create, "lead", json!({"name": "Acme"}))
            .unwrap();

        let meanwhile = async {
            backend.started.notified().await;
            assert_eq!(manager.sync_status(), SyncStatus::Syncing);
            let second = manager
                .enqueue_action(OperationKind::Update, "lead", json!({"id": 1}))
                .unwrap();
            let concurrent = manager.sync_queue().await.unwrap();
            backend.release.notify_one();
            (second, concurrent)
        };

        let (outcome, (second, concurrent)) = tokio::join!(manager.sync_queue(), meanwhile);

        assert!(matches!(
            concurrent,
            SyncOutcome::Skipped(SkipReason::AlreadySyncing)
        ));
        let report = outcome.unwrap();
        let report = report.report().unwrap();
        assert_eq!(report.total(), 1);
        assert_eq!(report.results[0].id, first);

        let queue = manager.queue();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].id, second);
        assert_eq!(queue[0].retry_count, 0);
        assert_eq!(manager.sync_status(), SyncStatus::Idle);
    }

    #[tokio::test]
    async fn test_removal_during_pass_sticks() {
        let backend = Arc::new(LeadGate::default());
        let manager = manager(backend.clone(), true);
        manager
            .enqueue_action(OperationKind::Create, "lead", json!({}))
            .unwrap();
        let doomed = manager
            .enqueue_action(OperationKind::Create, "deal", json!({}))
            .unwrap();

        let meanwhile = async {
            backend.0.started.notified().await;
            assert!(manager.remove_from_queue(&doomed).unwrap());
            backend.0.release.notify_one();
        };
        let (outcome, ()) = tokio::join!(manager.sync_queue(), meanwhile);

        // The deal failed in the pass but was removed while it ran.
        assert_eq!(outcome.unwrap().report().unwrap().failed, 1);
        assert!(manager.is_empty());
        assert_eq!(manager.sync_status(), SyncStatus::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_delivery_times_out() {
        let config = ManagerConfig {
            delivery_timeout: Duration::from_secs(5),
            ..ManagerConfig::default()
        };
        let manager = OfflineQueueManager::initialize(
            Arc::new(MemoryStore::new()),
            Arc::new(HangingBackend),
            clock(),
            config,
            true,
        );
        manager
            .enqueue_action(OperationKind::Create, "lead", json!({}))
            .unwrap();
        manager
            .enqueue_action(OperationKind::Create, "deal", json!({}))
            .unwrap();

        let outcome = manager.sync_queue().await.unwrap();

        let report = outcome.report().unwrap();
        assert_eq!(report.failed, 2);
        assert!(report.results[0]
            .error
            .as_deref()
            .unwrap()
            .contains("timed out"));
        assert!(manager.queue().iter().all(|item| item.retry_count == 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_pass_does_not_wedge_status() {
        let config = ManagerConfig {
            delivery_timeout: Duration::from_secs(600),
            ..ManagerConfig::default()
        };
        let manager = OfflineQueueManager::initialize(
            Arc::new(MemoryStore::new()),
            Arc::new(HangingBackend),
            clock(),
            config,
            true,
        );
        manager
            .enqueue_action(OperationKind::Create, "lead", json!({}))
            .unwrap();

        let abandoned =
            tokio::time::timeout(Duration::from_secs(1), manager.sync_queue()).await;

        assert!(abandoned.is_err());
        assert_eq!(manager.sync_status(), SyncStatus::Error);
        assert_eq!(manager.queue()[0].retry_count, 0);
    }

    #[tokio::test]
    async fn test_delivery_follows_queue_order() {
        let mut mock = MockBackend::new();
        let mut seq = mockall::Sequence::new();
        mock.expect_deliver()
            .withf(|item: &QueueItem| item.operation_kind == OperationKind::Create)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        mock.expect_deliver()
            .withf(|item: &QueueItem| item.operation_kind == OperationKind::Update)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        let manager = manager(Arc::new(mock), true);
        manager
            .enqueue_action(OperationKind::Create, "lead", json!({"name": "Acme"}))
            .unwrap();
        manager
            .enqueue_action(OperationKind::Update, "lead", json!({"id": 1, "stage": "won"}))
            .unwrap();

        let outcome = manager.sync_queue().await.unwrap();

        assert!(outcome.report().unwrap().all_succeeded());
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn test_persist_failure_after_pass_still_settles_status() {
        let mut mock = MockBackend::new();
        mock.expect_deliver().returning(|_| Ok(()));
        let store = Arc::new(FlakyStore::default());
        let manager = manager_with(store.clone(), Arc::new(mock), true);
        manager
            .enqueue_action(OperationKind::Create, "lead", json!({}))
            .unwrap();
        store.fail_writes.store(true, Ordering::SeqCst);

        let err = manager.sync_queue().await.unwrap_err();

        assert!(matches!(err, OffsyncError::Database(_)));
        assert_eq!(manager.sync_status(), SyncStatus::Idle);
        assert!(manager.is_empty());
        // The store still holds the delivered item.
        assert_eq!(QueueStore::new(store, DEFAULT_STORAGE_KEY).load().len(), 1);
    }

    #[test]
    fn test_status_snapshot() {
        let clock = clock();
        let start = clock.now();
        let manager = OfflineQueueManager::initialize(
            Arc::new(MemoryStore::new()),
            always_ok(),
            clock.clone(),
            ManagerConfig::default(),
            false,
        );
        manager
            .enqueue_action(OperationKind::Create, "lead", json!({}))
            .unwrap();
        clock.advance(chrono::Duration::minutes(5));
        let later = manager
            .enqueue_action(OperationKind::Create, "deal", json!({}))
            .unwrap();

        let status = manager.status();
        assert!(!status.is_online);
        assert_eq!(status.pending, 2);
        assert_eq!(status.exhausted, 0);
        assert_eq!(status.sync_status, SyncStatus::Idle);
        assert_eq!(status.oldest, Some(start));
        assert_eq!(
            manager.get(&later).unwrap().enqueued_at,
            start + chrono::Duration::minutes(5)
        );
    }

    #[test]
    fn test_clear() {
        let manager = manager(always_ok(), false);
        manager
            .enqueue_action(OperationKind::Create, "lead", json!({}))
            .unwrap();
        manager
            .enqueue_action(OperationKind::Create, "deal", json!({}))
            .unwrap();

        assert_eq!(manager.clear().unwrap(), 2);
        assert!(manager.is_empty());
    }

    fn shared_sqlite(path: &std::path::Path) -> Arc<dyn KeyValueStore> {
        Arc::new(SqliteStore::open_at(path).unwrap())
    }

    #[tokio::test]
    async fn test_pass_picks_up_items_queued_by_another_process() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("offsync.db");
        let watcher = manager_with(shared_sqlite(&path), always_fail(), true);
        watcher
            .enqueue_action(OperationKind::Create, "lead", json!({}))
            .unwrap();
        let cli = manager_with(shared_sqlite(&path), always_ok(), false);
        let queued = cli
            .enqueue_action(OperationKind::Update, "deal", json!({"id": 3}))
            .unwrap();

        let outcome = watcher.sync_queue().await.unwrap();

        assert_eq!(outcome.report().unwrap().failed, 2);
        cli.reload();
        let stored = cli.queue();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[1].id, queued);
        assert!(stored.iter().all(|item| item.retry_count == 1));
    }

    #[tokio::test]
    async fn test_other_process_changes_during_pass_are_kept() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("offsync.db");
        let backend = Arc::new(LeadGate::default());
        let watcher = manager_with(shared_sqlite(&path), backend.clone(), true);
        watcher
            .enqueue_action(OperationKind::Create, "lead", json!({}))
            .unwrap();
        let doomed = watcher
            .enqueue_action(OperationKind::Create, "deal", json!({}))
            .unwrap();
        let cli = manager_with(shared_sqlite(&path), always_ok(), false);

        let meanwhile = async {
            backend.0.started.notified().await;
            let added = cli
                .enqueue_action(OperationKind::Create, "task", json!({"title": "call"}))
                .unwrap();
            assert!(cli.remove_from_queue(&doomed).unwrap());
            backend.0.release.notify_one();
            added
        };
        let (outcome, added) = tokio::join!(watcher.sync_queue(), meanwhile);

        let report = outcome.unwrap();
        let report = report.report().unwrap();
        assert_eq!((report.succeeded, report.failed), (1, 1));
        let queue = watcher.queue();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].id, added);
        assert_eq!(queue[0].retry_count, 0);

        let restarted = manager_with(shared_sqlite(&path), always_ok(), false);
        assert_eq!(restarted.queue(), queue);
    }

    #[tokio::test]
    async fn test_reconnect_sees_items_queued_elsewhere() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let watcher = manager_with(store.clone(), always_ok(), false);
        let cli = manager_with(store, always_ok(), false);
        cli.enqueue_action(OperationKind::Delete, "lead", json!({"id": 8}))
            .unwrap();
        assert!(watcher.is_empty());

        let outcome = watcher
            .handle_connectivity(ConnectivityEvent::Online)
            .await
            .unwrap();

        assert_eq!(outcome.unwrap().report().unwrap().succeeded, 1);
        cli.reload();
        assert!(cli.is_empty());
    }

    #[test]
    fn test_clear_drops_items_queued_elsewhere() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let first = manager_with(store.clone(), always_ok(), false);
        let second = manager_with(store, always_ok(), false);
        first
            .enqueue_action(OperationKind::Create, "lead", json!({}))
            .unwrap();
        second
            .enqueue_action(OperationKind::Create, "deal", json!({}))
            .unwrap();

        assert_eq!(first.clear().unwrap(), 2);
        second.reload();
        assert!(second.is_empty());
    }
}
