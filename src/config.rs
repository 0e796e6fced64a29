use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::realtime::backoff::BackoffPolicy;
use crate::realtime::TransportKind;

pub const ENV_PREFIX: &str = "KITCHEN_SYNC_";

/// Settings for the sync layer and the REST collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub transport: TransportKind,
    #[serde(default = "default_sse_path")]
    pub sse_path: String,
    #[serde(default = "default_stomp_path")]
    pub stomp_path: String,
    #[serde(default = "default_stomp_topic")]
    pub stomp_topic: String,
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
    #[serde(default = "default_reconnect_base_ms")]
    pub reconnect_base_ms: u64,
    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_force_reconnect_delay_ms")]
    pub force_reconnect_delay_ms: u64,
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_sse_path() -> String {
    "/api/sse/pedidos".to_string()
}

fn default_stomp_path() -> String {
    "/ws-native".to_string()
}

fn default_stomp_topic() -> String {
    "/topic/pedidos".to_string()
}

fn default_handshake_timeout_ms() -> u64 {
    10_000
}

fn default_reconnect_base_ms() -> u64 {
    1_000
}

fn default_reconnect_max_ms() -> u64 {
    30_000
}

fn default_max_reconnect_attempts() -> u32 {
    10
}

fn default_force_reconnect_delay_ms() -> u64 {
    1_000
}

fn default_heartbeat_ms() -> u64 {
    10_000
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            transport: TransportKind::default(),
            sse_path: default_sse_path(),
            stomp_path: default_stomp_path(),
            stomp_topic: default_stomp_topic(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            reconnect_base_ms: default_reconnect_base_ms(),
            reconnect_max_ms: default_reconnect_max_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            force_reconnect_delay_ms: default_force_reconnect_delay_ms(),
            heartbeat_ms: default_heartbeat_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl SyncConfig {
    /// Read a JSON config file. Missing keys fall back to their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: SyncConfig = serde_json::from_str(&raw)?;
        Ok(config)
    }

    /// Build a config from `KITCHEN_SYNC_*` environment variables on top of the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = SyncConfig::default();
        let get = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}"))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(value) = get("BASE_URL") {
            config.base_url = value;
        }
        if let Some(value) = get("TRANSPORT") {
            config.transport = TransportKind::from_str(&value).map_err(|message| {
                ConfigError::InvalidValue {
                    key: format!("{ENV_PREFIX}TRANSPORT"),
                    message,
                }
            })?;
        }
        if let Some(value) = get("SSE_PATH") {
            config.sse_path = value;
        }
        if let Some(value) = get("STOMP_PATH") {
            config.stomp_path = value;
        }
        if let Some(value) = get("STOMP_TOPIC") {
            config.stomp_topic = value;
        }
        if let Some(value) = get("HANDSHAKE_TIMEOUT_MS") {
            config.handshake_timeout_ms = parse_number("HANDSHAKE_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = get("RECONNECT_BASE_MS") {
            config.reconnect_base_ms = parse_number("RECONNECT_BASE_MS", &value)?;
        }
        if let Some(value) = get("RECONNECT_MAX_MS") {
            config.reconnect_max_ms = parse_number("RECONNECT_MAX_MS", &value)?;
        }
        if let Some(value) = get("MAX_RECONNECT_ATTEMPTS") {
            config.max_reconnect_attempts = parse_number("MAX_RECONNECT_ATTEMPTS", &value)?;
        }
        if let Some(value) = get("FORCE_RECONNECT_DELAY_MS") {
            config.force_reconnect_delay_ms = parse_number("FORCE_RECONNECT_DELAY_MS", &value)?;
        }
        if let Some(value) = get("HEARTBEAT_MS") {
            config.heartbeat_ms = parse_number("HEARTBEAT_MS", &value)?;
        }
        if let Some(value) = get("REQUEST_TIMEOUT_MS") {
            config.request_timeout_ms = parse_number("REQUEST_TIMEOUT_MS", &value)?;
        }

        Ok(config)
    }

    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    pub fn sse_url(&self) -> String {
        format!("{}{}", self.base_url(), self.sse_path)
    }

    /// WebSocket URL for the STOMP endpoint, derived from the HTTP base URL.
    pub fn stomp_url(&self) -> String {
        let base = self.base_url();
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        };
        format!("{ws_base}{}", self.stomp_path)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn force_reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.force_reconnect_delay_ms)
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy {
            base_delay: Duration::from_millis(self.reconnect_base_ms),
            max_delay: Duration::from_millis(self.reconnect_max_ms),
            max_attempts: self.max_reconnect_attempts,
        }
    }
}

fn parse_number<T: FromStr>(name: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.parse::<T>().map_err(|e| ConfigError::InvalidValue {
        key: format!("{ENV_PREFIX}{name}"),
        message: e.to_string(),
    })
}
