//! Connectivity detection.
//!
//! A [`ConnectivityProbe`] answers "is the backend reachable right now". The
//! [`ConnectivityMonitor`] polls it and hands transitions to the manager as
//! [`ConnectivityEvent`]s, the way a browser fires `online`/`offline`.
//! Between transitions it retries failed passes and drains items other
//! processes queued while the backend stayed up.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::manager::{OfflineQueueManager, SyncOutcome, SyncStatus};
use crate::config::BackendConfig;
use crate::error::OffsyncError;

/// A connectivity transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityEvent {
    /// The backend became reachable
    Online,
    /// The backend became unreachable
    Offline,
}

impl ConnectivityEvent {
    #[must_use]
    pub const fn from_reachable(reachable: bool) -> Self {
        if reachable {
            Self::Online
        } else {
            Self::Offline
        }
    }

    #[must_use]
    pub const fn is_online(self) -> bool {
        matches!(self, Self::Online)
    }
}

impl std::fmt::Display for ConnectivityEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Online => write!(f, "online"),
            Self::Offline => write!(f, "offline"),
        }
    }
}

/// Answers whether the backend can be reached.
///
/// The answer is advisory: a false "reachable" just makes the next sync
/// pass fail and requeue.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn is_reachable(&self) -> bool;
}

/// Probes the backend health endpoint over HTTP.
///
/// Any HTTP response, even an error status, means the network path works.
pub struct HttpProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpProbe {
    /// Build a probe for `{base_url}{health_path}`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn from_config(config: &BackendConfig) -> Result<Self, OffsyncError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| OffsyncError::Http(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: format!(
                "{}/{}",
                config.base_url.trim_end_matches('/'),
                config.health_path.trim_start_matches('/')
            ),
        })
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ConnectivityProbe for HttpProbe {
    async fn is_reachable(&self) -> bool {
        match self.client.get(&self.url).send().await {
            Ok(resp) => {
                debug!(url = %self.url, status = resp.status().as_u16(), "probe answered");
                true
            },
            Err(e) => {
                debug!(url = %self.url, error = %e, "probe failed");
                false
            },
        }
    }
}

/// What a single poll did.
#[derive(Debug)]
pub enum MonitorUpdate {
    /// Connectivity changed, with the pass it started if any
    Transition {
        event: ConnectivityEvent,
        outcome: Option<SyncOutcome>,
    },
    /// A failed pass was retried while the backend stayed reachable
    Retried(SyncOutcome),
    /// Items queued while online and idle were synced
    Drained(SyncOutcome),
}

impl MonitorUpdate {
    /// The sync outcome this poll produced.
    #[must_use]
    pub const fn outcome(&self) -> Option<&SyncOutcome> {
        match self {
            Self::Transition { outcome, .. } => outcome.as_ref(),
            Self::Retried(outcome) | Self::Drained(outcome) => Some(outcome),
        }
    }
}

/// Polls a probe and feeds transitions to the manager.
pub struct ConnectivityMonitor<'a> {
    manager: &'a OfflineQueueManager,
    probe: &'a dyn ConnectivityProbe,
    interval: Duration,
    retry_interval: Option<Duration>,
    last: Option<bool>,
    last_attempt: Option<Instant>,
}

impl<'a> ConnectivityMonitor<'a> {
    #[must_use]
    pub fn new(
        manager: &'a OfflineQueueManager,
        probe: &'a dyn ConnectivityProbe,
        interval: Duration,
    ) -> Self {
        Self {
            manager,
            probe,
            interval,
            retry_interval: None,
            last: None,
            last_attempt: None,
        }
    }

    /// Retry a failed pass at most once per `every` while the backend stays
    /// reachable. Without this a failed pass waits for a manual retry.
    #[must_use]
    pub fn with_retry_interval(mut self, every: Duration) -> Self {
        self.retry_interval = Some(every);
        self
    }

    fn retry_due(&self) -> bool {
        match (self.retry_interval, self.last_attempt) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(every), Some(at)) => at.elapsed() >= every,
        }
    }

    /// Probe once. The first probe always counts as a transition.
    ///
    /// While the backend stays reachable, a failed pass is retried once the
    /// retry interval has passed, and an idle manager syncs items queued by
    /// other processes when auto-sync is on.
    ///
    /// # Errors
    ///
    /// Returns an error if a sync pass could not persist its result.
    pub async fn poll_once(&mut self) -> Result<Option<MonitorUpdate>, OffsyncError> {
        let reachable = self.probe.is_reachable().await;
        if self.last != Some(reachable) {
            self.last = Some(reachable);
            let event = ConnectivityEvent::from_reachable(reachable);
            let outcome = self.manager.handle_connectivity(event).await?;
            if outcome.is_some() {
                self.last_attempt = Some(Instant::now());
            }
            return Ok(Some(MonitorUpdate::Transition { event, outcome }));
        }
        if !reachable {
            return Ok(None);
        }

        self.manager.reload();
        match self.manager.sync_status() {
            SyncStatus::Error if self.retry_due() => {
                self.last_attempt = Some(Instant::now());
                debug!("retrying failed sync pass");
                let outcome = self.manager.retry().await?;
                Ok(Some(MonitorUpdate::Retried(outcome)))
            },
            SyncStatus::Idle
                if self.manager.config().auto_sync_on_reconnect && !self.manager.is_empty() =>
            {
                self.last_attempt = Some(Instant::now());
                let outcome = self.manager.sync_queue().await?;
                Ok(Some(MonitorUpdate::Drained(outcome)))
            },
            _ => Ok(None),
        }
    }

    /// Poll until `shutdown` resolves, calling `on_update` after every poll
    /// that changed something.
    ///
    /// A pass already running when `shutdown` resolves is allowed to finish.
    pub async fn run<S, F>(mut self, shutdown: S, mut on_update: F)
    where
        S: Future<Output = ()>,
        F: FnMut(&MonitorUpdate),
    {
        tokio::pin!(shutdown);
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval = ?self.interval,
            retry_interval = ?self.retry_interval,
            "connectivity monitor started"
        );
        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("connectivity monitor stopping");
                    return;
                }
                _ = ticker.tick() => {
                    match self.poll_once().await {
                        Ok(Some(update)) => on_update(&update),
                        Ok(None) => {},
                        Err(e) => warn!(error = %e, "sync pass could not persist its result"),
                    }
                }
            }
        }
    }
}
