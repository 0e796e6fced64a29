//! Error taxonomy shared by the sync layer and the REST collaborators.

use std::time::Duration;

/// Errors surfaced by the real-time sync layer.
///
/// Every variant is recoverable from the host's point of view: the worst
/// outcome is a "connection failed" indicator that needs a manual reconnect.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// The transport failed before reaching the open state.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),
    /// The transport did not reach the open state in time.
    #[error("handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),
    /// The physical connection failed while open.
    #[error("transport error: {0}")]
    TransportRuntime(String),
    /// A frame arrived but could not be decoded into an order.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    /// Automatic reconnection gave up.
    #[error("reconnection gave up after {attempts} attempts")]
    RetryBudgetExhausted { attempts: u32 },
    /// The connect attempt was superseded by a disconnect or a forced reconnect.
    #[error("connect attempt cancelled")]
    Cancelled,
}

impl SyncError {
    pub fn malformed<E: std::fmt::Display>(err: E) -> Self {
        SyncError::MalformedPayload(err.to_string())
    }

    /// Whether the reconnection controller treats this error as a reason to back off and retry.
    pub fn triggers_backoff(&self) -> bool {
        matches!(
            self,
            SyncError::HandshakeFailed(_)
                | SyncError::HandshakeTimeout(_)
                | SyncError::TransportRuntime(_)
        )
    }
}

/// Errors returned by the REST collaborators.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("request timeout: {0}")]
    Timeout(String),
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("not found: {0}")]
    NotFound(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_timeout() {
            return Self::Timeout(value.to_string());
        }
        if value.is_decode() {
            return Self::InvalidResponse(value.to_string());
        }
        Self::Request(value.to_string())
    }
}

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}
