//! Delivery of queued mutations to the backend.
//!
//! The manager only sees [`Backend::deliver`] succeed or fail. [`HttpBackend`]
//! maps each `(operation, entity)` pair onto a REST call.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use super::item::{OperationKind, QueueItem};
use crate::config::BackendConfig;
use crate::error::OffsyncError;

/// Why a single delivery attempt failed. Every variant is retryable.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeliveryError {
    /// The attempt did not finish within the delivery timeout.
    #[error("Delivery timed out after {0:?}")]
    Timeout(Duration),

    /// The request never got a response.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The backend answered with a non-success status.
    #[error("HTTP {code}: {body}")]
    Status { code: u16, body: String },

    /// The payload cannot be turned into a request.
    #[error("Invalid payload: {0}")]
    Payload(String),
}

/// Applies one queued mutation to the backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Backend: Send + Sync {
    /// Deliver `item`. `Ok` means the backend accepted it.
    async fn deliver(&self, item: &QueueItem) -> Result<(), DeliveryError>;
}

/// REST backend reached over HTTP.
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
    collections: HashMap<String, String>,
}

impl HttpBackend {
    /// Build a backend from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn from_config(config: &BackendConfig) -> Result<Self, OffsyncError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| OffsyncError::Http(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
            collections: config.collections.clone(),
        })
    }

    /// Collection path for an entity kind.
    #[must_use]
    pub fn collection(&self, entity_kind: &str) -> String {
        self.collections
            .get(entity_kind)
            .map_or_else(|| format!("{entity_kind}s"), |c| c.trim_matches('/').to_string())
    }

    /// HTTP method and URL for `item`.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Payload`] when an update or delete has no `payload.id`.
    pub fn route(&self, item: &QueueItem) -> Result<(reqwest::Method, String), DeliveryError> {
        let collection_url = format!("{}/{}", self.base_url, self.collection(&item.entity_kind));

        if !item.operation_kind.targets_existing() {
            return Ok((reqwest::Method::POST, collection_url));
        }

        let id = item.target_id().ok_or_else(|| {
            DeliveryError::Payload(format!(
                "{} {} requires payload.id",
                item.operation_kind.as_str(),
                item.entity_kind
            ))
        })?;
        let method = match item.operation_kind {
            OperationKind::Delete => reqwest::Method::DELETE,
            OperationKind::Update | OperationKind::Create => reqwest::Method::PUT,
        };
        Ok((method, format!("{collection_url}/{id}")))
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn deliver(&self, item: &QueueItem) -> Result<(), DeliveryError> {
        let (method, url) = self.route(item)?;

        let mut req = self.client.request(method.clone(), &url);
        if method != reqwest::Method::DELETE {
            req = req.json(&item.payload);
        }
        if let Some(token) = &self.auth_token {
            req = req.bearer_auth(token);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }

        let body = resp
            .text()
            .await
            .unwrap_or_default()
            .chars()
            .take(200)
            .collect::<String>();
        Err(DeliveryError::Status {
            code: status.as_u16(),
            body,
        })
    }
}
