//! Transport abstraction for the order push channel.
//!
//! A transport owns exactly one physical connection. It is disposable: the
//! reconnection controller builds a fresh instance for every attempt and
//! closes it when the connection drops or is replaced.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::TransportKind;

/// Capacity of the channel between a transport's reader task and the controller.
pub const FRAME_CHANNEL_CAPACITY: usize = 256;

// ============================================================================
// Connection State
// ============================================================================

/// Lifecycle phase of the logical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Nothing has been attempted yet.
    Idle,
    /// A connect attempt is in flight.
    Connecting,
    /// Handshake completed; frames are flowing.
    Open,
    /// The connection ended, either remotely or by `disconnect()`.
    Closed,
    /// The last connect attempt failed.
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Idle => write!(f, "idle"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Open => write!(f, "open"),
            ConnectionState::Closed => write!(f, "closed"),
            ConnectionState::Failed => write!(f, "failed"),
        }
    }
}

// ============================================================================
// Transport Error Types
// ============================================================================

/// Errors specific to transport operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Could not reach the endpoint.
    Connection(String),
    /// The endpoint answered the handshake with an error status.
    Http { status: u16, message: String },
    /// The protocol handshake was rejected or malformed.
    Handshake(String),
    /// The stream failed after the handshake.
    Stream(String),
    /// A protocol frame could not be decoded.
    Protocol(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Connection(msg) => write!(f, "Connection error: {}", msg),
            TransportError::Http { status, message } => {
                write!(f, "HTTP error {}: {}", status, message)
            }
            TransportError::Handshake(msg) => write!(f, "Handshake rejected: {}", msg),
            TransportError::Stream(msg) => write!(f, "Stream error: {}", msg),
            TransportError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
        }
    }
}

impl std::error::Error for TransportError {}

impl TransportError {
    pub fn connection<E: fmt::Display>(err: E) -> Self {
        TransportError::Connection(err.to_string())
    }

    pub fn stream<E: fmt::Display>(err: E) -> Self {
        TransportError::Stream(err.to_string())
    }
}

// ============================================================================
// Frames
// ============================================================================

/// One unit delivered by an open transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Raw payload text of an order event.
    Data(String),
    /// A fault on the open connection. The stream normally ends right after.
    Fault(TransportError),
}

/// Receiving half handed to the controller when a transport opens.
/// The channel closing means the connection ended.
pub type FrameReceiver = mpsc::Receiver<Frame>;

// ============================================================================
// Transport Trait
// ============================================================================

/// A single physical connection to the backend's push endpoint.
#[async_trait]
pub trait EventTransport: Send + Sync {
    /// Which flavour of push channel this is.
    fn kind(&self) -> TransportKind;

    /// Establish the physical connection and complete the protocol handshake.
    ///
    /// Resolves once the connection is open. Frames arrive on the returned
    /// receiver until the connection ends.
    async fn open(&mut self) -> Result<FrameReceiver, TransportError>;

    /// Tear the connection down. Safe to call more than once.
    async fn close(&mut self);
}

/// Builds a fresh transport for each connection attempt.
pub type TransportFactory = Arc<dyn Fn() -> Box<dyn EventTransport> + Send + Sync>;
