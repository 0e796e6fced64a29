//! Server-Sent Events transport.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::transport::{
    EventTransport, Frame, FrameReceiver, TransportError, FRAME_CHANNEL_CAPACITY,
};
use super::TransportKind;

/// Event name the backend uses for order pushes.
pub const ORDER_EVENT: &str = "nuevo-pedido";

/// Greeting the backend sends right after the stream opens.
pub const GREETING_EVENT: &str = "connected";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Event decoding
// ============================================================================

/// A fully assembled SSE event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Event type (`message` when the server sends none).
    pub event_type: String,
    /// Data lines joined with `\n`.
    pub data: String,
    /// Last event id seen on the stream, for replay.
    pub id: Option<String>,
    /// Retry timing hint from the server.
    pub retry: Option<u64>,
}

/// Incremental decoder for `text/event-stream` bodies.
///
/// Chunks may split lines or UTF-8 sequences anywhere; only complete lines
/// are interpreted.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event_type: Option<String>,
    data: Vec<String>,
    last_id: Option<String>,
    retry: Option<u64>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and collect every event it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }
        events
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event_type = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            "id" => {
                if !value.contains('\0') {
                    self.last_id = Some(value.to_string());
                }
            }
            "retry" => {
                if let Ok(ms) = value.parse::<u64>() {
                    self.retry = Some(ms);
                }
            }
            _ => trace!("Unknown SSE field: {}", field),
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event_type = self
            .event_type
            .take()
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "message".to_string());
        if self.data.is_empty() {
            return None;
        }
        let data = self.data.join("\n");
        self.data.clear();
        Some(SseEvent {
            event_type,
            data,
            id: self.last_id.clone(),
            retry: self.retry.take(),
        })
    }
}

// ============================================================================
// Replay cursor
// ============================================================================

/// Last event id seen, shared across the transports of one controller so a
/// reconnect can ask the server to replay what was missed.
#[derive(Debug, Clone, Default)]
pub struct LastEventId(Arc<Mutex<Option<String>>>);

impl LastEventId {
    pub fn get(&self) -> Option<String> {
        self.0.lock().expect("last event id mutex poisoned").clone()
    }

    pub fn set(&self, id: String) {
        *self.0.lock().expect("last event id mutex poisoned") = Some(id);
    }
}

// ============================================================================
// Transport
// ============================================================================

/// SSE transport reading order events from a long-lived HTTP response.
pub struct SseTransport {
    url: String,
    cursor: LastEventId,
    reader: Option<JoinHandle<()>>,
}

impl SseTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_cursor(url, LastEventId::default())
    }

    pub fn with_cursor(url: impl Into<String>, cursor: LastEventId) -> Self {
        Self {
            url: url.into(),
            cursor,
            reader: None,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl EventTransport for SseTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Sse
    }

    async fn open(&mut self) -> Result<FrameReceiver, TransportError> {
        self.close().await;

        // No overall request timeout: it would cut the stream itself.
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .pool_max_idle_per_host(1)
            .build()
            .map_err(|e| TransportError::connection(format!("failed to create HTTP client: {e}")))?;

        let mut request = client
            .get(&self.url)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache");
        if let Some(last_id) = self.cursor.get() {
            request = request.header("Last-Event-ID", last_id);
        }

        debug!("Connecting SSE stream at {}", self.url);
        let response = request.send().await.map_err(|e| {
            TransportError::connection(format!("failed to connect to SSE stream: {e}"))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Http {
                status: status.as_u16(),
                message: body,
            });
        }

        info!("Connected to SSE stream at {}", self.url);

        let (tx, rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
        let cursor = self.cursor.clone();
        let mut stream = response.bytes_stream();

        self.reader = Some(tokio::spawn(async move {
            let mut decoder = SseDecoder::new();
            while let Some(chunk) = stream.next().await {
                let bytes = match chunk {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        warn!("SSE stream failed: {}", e);
                        let _ = tx.send(Frame::Fault(TransportError::stream(e))).await;
                        return;
                    }
                };

                for event in decoder.push(&bytes) {
                    if let Some(id) = &event.id {
                        cursor.set(id.clone());
                    }
                    match event.event_type.as_str() {
                        ORDER_EVENT | "message" => {
                            trace!("SSE order event: {}", event.data);
                            if tx.send(Frame::Data(event.data)).await.is_err() {
                                return;
                            }
                        }
                        GREETING_EVENT => debug!("SSE greeting: {}", event.data),
                        other => trace!("Ignoring SSE event type {}", other),
                    }
                }
            }
            debug!("SSE stream ended");
        }));

        Ok(rx)
    }

    async fn close(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
            debug!("SSE transport closed for {}", self.url);
        }
    }
}

impl Drop for SseTransport {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}
