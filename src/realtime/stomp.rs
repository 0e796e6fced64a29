//! STOMP 1.2 over WebSocket transport.
//!
//! The socket is opened, a `CONNECT` frame is exchanged for `CONNECTED`, and
//! the order topic is subscribed. `MESSAGE` bodies become data frames;
//! `ERROR` frames become faults. Heart-beats are negotiated as STOMP 1.2 describes.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use super::transport::{
    EventTransport, Frame, FrameReceiver, TransportError, FRAME_CHANNEL_CAPACITY,
};
use super::TransportKind;

pub const STOMP_VERSION: &str = "1.2";

/// Settings for one STOMP transport instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StompSettings {
    /// `ws://` or `wss://` endpoint.
    pub url: String,
    /// Topic carrying order pushes.
    pub destination: String,
    /// Heart-beat interval offered in both directions.
    pub heartbeat: Duration,
}

// ============================================================================
// Frames
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StompFrame {
    pub command: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl StompFrame {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// First value for `key`; repeated headers keep the first occurrence.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn encode(&self) -> String {
        let escape_headers = !matches!(self.command.as_str(), "CONNECT" | "CONNECTED");
        let mut out = String::with_capacity(self.command.len() + self.body.len() + 64);
        out.push_str(&self.command);
        out.push('\n');
        for (key, value) in &self.headers {
            if escape_headers {
                out.push_str(&escape(key));
                out.push(':');
                out.push_str(&escape(value));
            } else {
                out.push_str(key);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    /// Parse one frame without its trailing NUL.
    pub fn parse(raw: &str) -> Result<Self, TransportError> {
        let raw = raw.trim_start_matches(['\r', '\n']);
        let (head, body) = match raw.find("\n\n") {
            Some(pos) => (&raw[..pos], &raw[pos + 2..]),
            None => match raw.find("\r\n\r\n") {
                Some(pos) => (&raw[..pos], &raw[pos + 4..]),
                None => (raw, ""),
            },
        };

        let mut lines = head.split('\n').map(|l| l.strip_suffix('\r').unwrap_or(l));
        let command = lines
            .next()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| TransportError::Protocol("frame without command".to_string()))?
            .to_string();
        let unescape_headers = command != "CONNECTED";

        let mut headers = Vec::new();
        for line in lines.filter(|l| !l.is_empty()) {
            let (key, value) = line
                .split_once(':')
                .ok_or_else(|| TransportError::Protocol(format!("malformed header: {line}")))?;
            if unescape_headers {
                headers.push((unescape(key)?, unescape(value)?));
            } else {
                headers.push((key.to_string(), value.to_string()));
            }
        }

        Ok(Self {
            command,
            headers,
            body: body.to_string(),
        })
    }
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape(value: &str) -> Result<String, TransportError> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            other => {
                return Err(TransportError::Protocol(format!(
                    "invalid header escape: \\{}",
                    other.map(String::from).unwrap_or_default()
                )))
            }
        }
    }
    Ok(out)
}

/// Splits socket text into NUL-terminated frames, skipping heart-beat EOLs.
#[derive(Debug, Default)]
pub struct StompDecoder {
    buffer: String,
}

impl StompDecoder {
    pub fn push(&mut self, text: &str) -> Vec<Result<StompFrame, TransportError>> {
        self.buffer.push_str(text);

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.find('\0') {
            let raw: String = self.buffer.drain(..=pos).collect();
            let raw = &raw[..raw.len() - 1];
            if raw.trim_matches(['\r', '\n']).is_empty() {
                continue;
            }
            frames.push(StompFrame::parse(raw));
        }
        if self.buffer.trim_matches(['\r', '\n']).is_empty() {
            self.buffer.clear();
        }
        frames
    }
}

/// Negotiated heart-beat periods as `(outgoing, incoming)`.
///
/// `client` is what we offered for both directions; `server` is the
/// `heart-beat` header of `CONNECTED`.
pub fn negotiate_heartbeat(
    client: Duration,
    server: Option<&str>,
) -> (Option<Duration>, Option<Duration>) {
    let client_ms = u64::try_from(client.as_millis()).unwrap_or(u64::MAX);
    let (sx, sy) = server
        .and_then(|h| h.split_once(','))
        .and_then(|(x, y)| Some((x.trim().parse::<u64>().ok()?, y.trim().parse::<u64>().ok()?)))
        .unwrap_or((0, 0));

    let outgoing = (client_ms != 0 && sy != 0).then(|| Duration::from_millis(client_ms.max(sy)));
    let incoming = (client_ms != 0 && sx != 0).then(|| Duration::from_millis(client_ms.max(sx)));
    (outgoing, incoming)
}

/// Whether the broker has been silent for more than two incoming periods.
fn heartbeat_overdue(silence: Duration, period: Duration) -> bool {
    silence > period.saturating_mul(2)
}

// ============================================================================
// Transport
// ============================================================================

pub struct StompTransport {
    settings: StompSettings,
    reader: Option<JoinHandle<()>>,
}

impl StompTransport {
    pub fn new(settings: StompSettings) -> Self {
        Self {
            settings,
            reader: None,
        }
    }

    fn host(&self) -> String {
        reqwest::Url::parse(&self.settings.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| "localhost".to_string())
    }
}

#[async_trait]
impl EventTransport for StompTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Stomp
    }

    async fn open(&mut self) -> Result<FrameReceiver, TransportError> {
        self.close().await;

        debug!("Connecting STOMP socket at {}", self.settings.url);
        let (socket, _) = connect_async(self.settings.url.as_str())
            .await
            .map_err(|e| TransportError::connection(format!("WebSocket connect failed: {e}")))?;
        let (mut write, mut read) = socket.split();

        let offer = self.settings.heartbeat.as_millis().to_string();
        let connect = StompFrame::new("CONNECT")
            .header("accept-version", STOMP_VERSION)
            .header("host", self.host())
            .header("heart-beat", format!("{offer},{offer}"));
        write
            .send(Message::Text(connect.encode()))
            .await
            .map_err(|e| TransportError::Handshake(e.to_string()))?;

        let mut decoder = StompDecoder::default();
        let connected = loop {
            let text = match read.next().await {
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(Message::Binary(bytes))) => String::from_utf8_lossy(&bytes).into_owned(),
                Some(Ok(Message::Close(_))) | None => {
                    return Err(TransportError::Handshake(
                        "socket closed before CONNECTED".to_string(),
                    ))
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(TransportError::Handshake(e.to_string())),
            };

            let mut found = None;
            for frame in decoder.push(&text) {
                let frame = frame?;
                match frame.command.as_str() {
                    "CONNECTED" => {
                        found = Some(frame);
                        break;
                    }
                    "ERROR" => {
                        let message = frame.get("message").unwrap_or("STOMP error").to_string();
                        return Err(TransportError::Handshake(message));
                    }
                    other => trace!("Ignoring {} before CONNECTED", other),
                }
            }
            if let Some(frame) = found {
                break frame;
            }
        };

        let (outgoing, incoming) =
            negotiate_heartbeat(self.settings.heartbeat, connected.get("heart-beat"));

        let subscribe = StompFrame::new("SUBSCRIBE")
            .header("id", format!("sub-{}", Uuid::new_v4()))
            .header("destination", self.settings.destination.clone())
            .header("ack", "auto");
        write
            .send(Message::Text(subscribe.encode()))
            .await
            .map_err(|e| TransportError::Handshake(e.to_string()))?;

        info!(
            "Connected to STOMP endpoint {} (topic {})",
            self.settings.url, self.settings.destination
        );

        let (tx, rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
        let tick = [outgoing, incoming]
            .into_iter()
            .flatten()
            .min()
            .unwrap_or(Duration::from_secs(3600));
        let monitor = outgoing.is_some() || incoming.is_some();

        self.reader = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + tick, tick);
            let mut last_seen = Instant::now();

            loop {
                tokio::select! {
                    message = read.next() => {
                        let text = match message {
                            Some(Ok(Message::Text(text))) => text,
                            Some(Ok(Message::Binary(bytes))) => String::from_utf8_lossy(&bytes).into_owned(),
                            Some(Ok(Message::Ping(payload))) => {
                                last_seen = Instant::now();
                                let _ = write.send(Message::Pong(payload)).await;
                                continue;
                            }
                            Some(Ok(Message::Close(frame))) => {
                                debug!("STOMP socket closed: {:?}", frame);
                                break;
                            }
                            Some(Ok(_)) => continue,
                            Some(Err(e)) => {
                                warn!("STOMP socket failed: {}", e);
                                let _ = tx.send(Frame::Fault(TransportError::stream(e))).await;
                                break;
                            }
                            None => break,
                        };
                        last_seen = Instant::now();
                        if !forward_frames(&mut decoder, &text, &tx).await {
                            break;
                        }
                    }
                    _ = ticker.tick(), if monitor => {
                        if let Some(period) = incoming {
                            if heartbeat_overdue(last_seen.elapsed(), period) {
                                warn!("STOMP heart-beat missed for {:?}", last_seen.elapsed());
                                let _ = tx
                                    .send(Frame::Fault(TransportError::Stream("heart-beat timeout".to_string())))
                                    .await;
                                break;
                            }
                        }
                        if outgoing.is_some() && write.send(Message::Text("\n".to_string())).await.is_err() {
                            let _ = tx
                                .send(Frame::Fault(TransportError::Stream("heart-beat send failed".to_string())))
                                .await;
                            break;
                        }
                    }
                }
            }
            debug!("STOMP stream ended");
        }));

        Ok(rx)
    }

    async fn close(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
            debug!("STOMP transport closed for {}", self.settings.url);
        }
    }
}

impl Drop for StompTransport {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

/// Forward decoded frames; returns `false` once the receiver is gone.
async fn forward_frames(decoder: &mut StompDecoder, text: &str, tx: &mpsc::Sender<Frame>) -> bool {
    for frame in decoder.push(text) {
        let outgoing = match frame {
            Ok(frame) => match frame.command.as_str() {
                "MESSAGE" => Frame::Data(frame.body),
                "ERROR" => {
                    let message = frame.get("message").unwrap_or("STOMP error");
                    Frame::Fault(TransportError::Protocol(format!("{message}: {}", frame.body)))
                }
                other => {
                    trace!("Ignoring STOMP frame {}", other);
                    continue;
                }
            },
            Err(e) => Frame::Fault(e),
        };
        if tx.send(outgoing).await.is_err() {
            return false;
        }
    }
    true
}
