//! Queue persistence.
//!
//! The whole queue is one JSON array stored under a single key. Several
//! processes may share that key, so every change goes through
//! [`QueueStore::update`], which reads, modifies and writes the stored queue
//! in one store transaction. Reads are forgiving: anything that does not
//! parse becomes an empty queue.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::warn;

use super::item::QueueItem;
use crate::error::OffsyncError;
use crate::storage::KeyValueStore;

/// Key the queue is stored under unless configured otherwise.
pub const DEFAULT_STORAGE_KEY: &str = "offline_queue";

/// Reads and writes the serialized queue.
#[derive(Clone)]
pub struct QueueStore {
    store: Arc<dyn KeyValueStore>,
    key: String,
}

impl QueueStore {
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    /// Load the persisted queue.
    ///
    /// A missing key, an unreadable store or a malformed document all yield
    /// an empty queue; the latter two are logged.
    #[must_use]
    pub fn load(&self) -> Vec<QueueItem> {
        self.read().unwrap_or_else(|e| {
            warn!(key = %self.key, error = %e, "failed to read persisted queue, starting empty");
            Vec::new()
        })
    }

    /// Read the persisted queue, surfacing store errors.
    ///
    /// A missing key or a malformed document still yields an empty queue.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn read(&self) -> Result<Vec<QueueItem>, OffsyncError> {
        Ok(self
            .store
            .get_item(&self.key)?
            .map_or_else(Vec::new, |raw| self.parse(&raw)))
    }

    /// Apply `f` to the persisted queue and store the result, atomically
    /// with respect to other writers.
    ///
    /// Returns the queue as written along with the value `f` produced.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or written. Nothing is
    /// written then.
    pub fn update<T>(
        &self,
        f: impl FnOnce(&mut Vec<QueueItem>) -> T,
    ) -> Result<(Vec<QueueItem>, T), OffsyncError> {
        let mut f = Some(f);
        let mut written = None;

        self.store.update_item(&self.key, &mut |raw| {
            let f = f.take().ok_or_else(|| {
                OffsyncError::Database("queue update applied twice".to_string())
            })?;
            let mut items = raw.map_or_else(Vec::new, |raw| self.parse(&raw));
            let value = f(&mut items);
            let json = serde_json::to_string(&items)
                .map_err(|e| OffsyncError::Parse(format!("Failed to serialize queue: {e}")))?;
            written = Some((items, value));
            Ok(json)
        })?;

        written.ok_or_else(|| OffsyncError::Database("queue update was not applied".to_string()))
    }

    /// Remove the persisted queue entirely.
    ///
    /// # Errors
    ///
    /// Returns an error if the store delete fails.
    pub fn clear(&self) -> Result<(), OffsyncError> {
        self.store.remove_item(&self.key)
    }

    fn parse(&self, raw: &str) -> Vec<QueueItem> {
        match serde_json::from_str::<Vec<QueueItem>>(raw) {
            Ok(items) => dedupe_ids(items),
            Err(e) => {
                warn!(key = %self.key, error = %e, "persisted queue is malformed, starting empty");
                Vec::new()
            },
        }
    }
}

/// Keep the first item for each id.
fn dedupe_ids(items: Vec<QueueItem>) -> Vec<QueueItem> {
    let mut seen = HashSet::new();
    let before = items.len();
    let kept: Vec<QueueItem> = items
        .into_iter()
        .filter(|item| seen.insert(item.id.clone()))
        .collect();
    if kept.len() != before {
        warn!(dropped = before - kept.len(), "persisted queue had duplicate ids");
    }
    kept
}
