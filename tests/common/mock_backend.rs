// tests/common/mock_backend.rs
//! Scripted push backend for controller integration tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use kitchen_sync_lib::realtime::transport::{FrameReceiver, FRAME_CHANNEL_CAPACITY};
use kitchen_sync_lib::realtime::{
    EventTransport, Frame, TransportError, TransportFactory, TransportKind,
};

/// What the next handshake does.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Fail with a connection error.
    Refuse(String),
    /// Never complete; only the handshake timeout ends it.
    Hang,
    /// Open and keep the connection until the test drops it.
    Accept,
}

/// Shared state behind every transport the factory hands out.
///
/// Handshakes consume scripted outcomes in order; once the script is empty
/// every handshake is refused.
#[derive(Clone, Default)]
pub struct MockBackend {
    script: Arc<Mutex<VecDeque<Outcome>>>,
    live: Arc<Mutex<Option<mpsc::Sender<Frame>>>>,
    opens: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(&self, outcome: Outcome) -> &Self {
        self.script.lock().unwrap().push_back(outcome);
        self
    }

    pub fn accept_next(&self) -> &Self {
        self.then(Outcome::Accept)
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Push a data frame down the live connection.
    pub async fn push(&self, text: impl Into<String>) {
        self.send(Frame::Data(text.into())).await;
    }

    pub async fn fault(&self, error: TransportError) {
        self.send(Frame::Fault(error)).await;
    }

    async fn send(&self, frame: Frame) {
        let sender = self
            .live
            .lock()
            .unwrap()
            .clone()
            .expect("no live connection");
        sender.send(frame).await.expect("connection reader gone");
    }

    /// Simulate the server closing the stream.
    pub fn drop_connection(&self) {
        self.live.lock().unwrap().take();
    }

    pub fn factory(&self) -> TransportFactory {
        let backend = self.clone();
        Arc::new(move || Box::new(MockTransport::new(backend.clone())) as Box<dyn EventTransport>)
    }
}

pub struct MockTransport {
    backend: MockBackend,
}

impl MockTransport {
    pub fn new(backend: MockBackend) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl EventTransport for MockTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Sse
    }

    async fn open(&mut self) -> Result<FrameReceiver, TransportError> {
        self.backend.opens.fetch_add(1, Ordering::SeqCst);
        let outcome = self
            .backend
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Outcome::Refuse("connection refused".to_string()));

        match outcome {
            Outcome::Refuse(message) => Err(TransportError::Connection(message)),
            Outcome::Hang => futures::future::pending().await,
            Outcome::Accept => {
                let (tx, rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
                *self.backend.live.lock().unwrap() = Some(tx);
                Ok(rx)
            }
        }
    }

    async fn close(&mut self) {
        self.backend.closes.fetch_add(1, Ordering::SeqCst);
    }
}
