//! Real-time order push channel.
//!
//! This module provides:
//! - Two interchangeable transports behind [`transport::EventTransport`]:
//!   Server-Sent Events and STOMP over a WebSocket
//! - A reconnection controller with handshake timeout and bounded
//!   exponential backoff
//! - Frame decoding into typed orders, dispatched through the subscriber registry

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::SyncConfig;

pub mod backoff;
pub mod connection;
pub mod sse;
pub mod stomp;
pub mod transport;

pub use backoff::BackoffPolicy;
pub use connection::{ConnectionController, ControllerSettings};
pub use transport::{ConnectionState, EventTransport, Frame, TransportError, TransportFactory};

/// Which push channel flavour to use.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Server-Sent Events over a long-lived HTTP response.
    #[default]
    Sse,
    /// STOMP frames over a WebSocket.
    Stomp,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Sse => write!(f, "sse"),
            TransportKind::Stomp => write!(f, "stomp"),
        }
    }
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sse" | "event-stream" => Ok(Self::Sse),
            "stomp" | "websocket" | "ws" => Ok(Self::Stomp),
            _ => Err(format!("unsupported transport: {value}")),
        }
    }
}

/// Build the factory the controller uses to create a fresh transport per attempt.
pub fn transport_factory(config: &SyncConfig) -> TransportFactory {
    match config.transport {
        TransportKind::Sse => {
            let url = config.sse_url();
            let cursor = sse::LastEventId::default();
            Arc::new(move || {
                Box::new(sse::SseTransport::with_cursor(url.clone(), cursor.clone()))
                    as Box<dyn EventTransport>
            })
        }
        TransportKind::Stomp => {
            let settings = stomp::StompSettings {
                url: config.stomp_url(),
                destination: config.stomp_topic.clone(),
                heartbeat: config.heartbeat(),
            };
            Arc::new(move || {
                Box::new(stomp::StompTransport::new(settings.clone())) as Box<dyn EventTransport>
            })
        }
    }
}
