//! Offline mutation queue.
//!
//! Mutations made while the backend is unreachable are queued, persisted,
//! and replayed in order once connectivity returns:
//!
//! - [`OfflineQueueManager`] owns the queue and runs sync passes
//! - [`Backend`] delivers one mutation ([`HttpBackend`] over REST)
//! - [`ConnectivityMonitor`] turns probe results into online/offline events
//! - [`QueueStore`] persists the queue as JSON in a [`KeyValueStore`](crate::storage::KeyValueStore)

pub mod backend;
pub mod connectivity;
pub mod item;
pub mod manager;
pub mod persist;
pub mod status;

pub use backend::{Backend, DeliveryError, HttpBackend};
pub use connectivity::{
    ConnectivityEvent, ConnectivityMonitor, ConnectivityProbe, HttpProbe, MonitorUpdate,
};
pub use item::{generate_id, OperationKind, QueueItem};
pub use manager::{
    ItemResult, ManagerConfig, OfflineQueueManager, SkipReason, SyncOutcome, SyncReport,
    SyncStatus, RETRY_CEILING,
};
pub use persist::{QueueStore, DEFAULT_STORAGE_KEY};
pub use status::QueueStatus;
