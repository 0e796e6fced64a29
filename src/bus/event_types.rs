//! Event kinds and connection status values delivered to subscribers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The three independent subscription channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Message,
    Error,
    Status,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Message => write!(f, "message"),
            EventKind::Error => write!(f, "error"),
            EventKind::Status => write!(f, "status"),
        }
    }
}

/// User-visible connection phase, as shown by the status indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
    /// An automatic retry is scheduled.
    Reconnecting { attempt: u32, max_attempts: u32 },
    /// Automatic retries are exhausted; only a manual reconnect helps.
    ConnectionFailed,
}

impl ConnectionStatus {
    /// Whether the UI should offer a manual reconnect: any phase where the
    /// connection is down, including while automatic retries are pending.
    pub fn offers_manual_reconnect(&self) -> bool {
        !matches!(self, ConnectionStatus::Connected | ConnectionStatus::Connecting)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionStatus::ConnectionFailed)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Connecting => write!(f, "connecting"),
            ConnectionStatus::Connected => write!(f, "connected"),
            ConnectionStatus::Disconnected => write!(f, "disconnected"),
            ConnectionStatus::Reconnecting {
                attempt,
                max_attempts,
            } => write!(f, "reconnecting ({attempt}/{max_attempts})"),
            ConnectionStatus::ConnectionFailed => write!(f, "connection failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_display() {
        assert_eq!(
            ConnectionStatus::Reconnecting {
                attempt: 3,
                max_attempts: 10
            }
            .to_string(),
            "reconnecting (3/10)"
        );
        assert_eq!(ConnectionStatus::ConnectionFailed.to_string(), "connection failed");
    }

    #[test]
    fn manual_reconnect_offered_whenever_down() {
        assert!(ConnectionStatus::Disconnected.offers_manual_reconnect());
        assert!(ConnectionStatus::ConnectionFailed.offers_manual_reconnect());
        assert!(ConnectionStatus::Reconnecting {
            attempt: 1,
            max_attempts: 10
        }
        .offers_manual_reconnect());
        assert!(!ConnectionStatus::Connected.offers_manual_reconnect());
        assert!(!ConnectionStatus::Connecting.offers_manual_reconnect());
    }

    #[test]
    fn status_serializes_with_tag() {
        let json = serde_json::to_value(ConnectionStatus::Reconnecting {
            attempt: 2,
            max_attempts: 10,
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"status": "reconnecting", "attempt": 2, "max_attempts": 10})
        );
    }
}
