//! Reconnection controller.
//!
//! Owns the lifecycle of the logical connection: builds a fresh transport per
//! attempt, enforces the handshake timeout, turns frames into typed events and
//! schedules retries with bounded exponential backoff after unplanned drops.
//!
//! Every connection instance carries an epoch. Anything that replaces or ends
//! a connection bumps the epoch, so late frames, stale timers and superseded
//! handshakes are discarded instead of acted upon.

use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use super::backoff::BackoffPolicy;
use super::transport::{ConnectionState, EventTransport, Frame, FrameReceiver, TransportFactory};
use crate::bus::{ConnectionStatus, SubscriberRegistry};
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::kitchen::order::Order;

pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_FORCE_RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Timing knobs for the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerSettings {
    pub backoff: BackoffPolicy,
    pub handshake_timeout: Duration,
    pub force_reconnect_delay: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            backoff: BackoffPolicy::default(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            force_reconnect_delay: DEFAULT_FORCE_RECONNECT_DELAY,
        }
    }
}

impl From<&SyncConfig> for ControllerSettings {
    fn from(config: &SyncConfig) -> Self {
        Self {
            backoff: config.backoff(),
            handshake_timeout: config.handshake_timeout(),
            force_reconnect_delay: config.force_reconnect_delay(),
        }
    }
}

struct ControllerState {
    phase: ConnectionState,
    attempts: u32,
    epoch: u64,
    transport: Option<Box<dyn EventTransport>>,
    pump: Option<JoinHandle<()>>,
    retry_timer: Option<JoinHandle<()>>,
    user_disconnected: bool,
}

impl ControllerState {
    /// Invalidate the current connection instance and stop its tasks.
    async fn teardown(&mut self) {
        self.epoch += 1;
        if let Some(timer) = self.retry_timer.take() {
            timer.abort();
        }
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        if let Some(mut transport) = self.transport.take() {
            transport.close().await;
        }
    }
}

struct Inner {
    factory: TransportFactory,
    registry: Arc<SubscriberRegistry>,
    settings: ControllerSettings,
    status: watch::Sender<ConnectionStatus>,
    // Held while dispatching, so at most one handler runs at a time.
    state: Mutex<ControllerState>,
}

/// Handle to the reconnecting push connection. Cheap to clone.
#[derive(Clone)]
pub struct ConnectionController {
    inner: Arc<Inner>,
}

impl ConnectionController {
    pub fn new(
        factory: TransportFactory,
        registry: Arc<SubscriberRegistry>,
        settings: ControllerSettings,
    ) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            inner: Arc::new(Inner {
                factory,
                registry,
                settings,
                status,
                state: Mutex::new(ControllerState {
                    phase: ConnectionState::Idle,
                    attempts: 0,
                    epoch: 0,
                    transport: None,
                    pump: None,
                    retry_timer: None,
                    user_disconnected: false,
                }),
            }),
        }
    }

    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.inner.registry
    }

    /// Open the connection.
    ///
    /// Returns immediately when already open or connecting. Otherwise resolves
    /// once the handshake completes, or fails with the handshake error (which
    /// is also delivered to error subscribers and schedules a retry).
    pub async fn connect(&self) -> Result<(), SyncError> {
        Inner::connect(Arc::clone(&self.inner)).await
    }

    /// Close the connection and stop retrying. Idempotent.
    pub async fn disconnect(&self) {
        let inner = &self.inner;
        let mut state = inner.state.lock().await;
        state.teardown().await;
        state.attempts = inner.settings.backoff.max_attempts;
        state.user_disconnected = true;
        if state.phase != ConnectionState::Closed {
            tracing::info!("order push channel disconnected by user");
        }
        state.phase = ConnectionState::Closed;
        inner.set_status(ConnectionStatus::Disconnected);
    }

    /// Drop the current connection, reset the retry budget and reconnect
    /// after a short fixed delay.
    pub async fn force_reconnect(&self) {
        let inner = &self.inner;
        let mut state = inner.state.lock().await;
        state.teardown().await;
        state.attempts = 0;
        state.user_disconnected = false;
        state.phase = ConnectionState::Closed;
        inner.set_status(ConnectionStatus::Connecting);

        let delay = inner.settings.force_reconnect_delay;
        tracing::info!("forcing reconnect in {delay:?}");
        state.retry_timer = Some(Inner::spawn_retry(inner, state.epoch, delay));
    }

    /// Current user-visible status.
    pub fn status(&self) -> ConnectionStatus {
        *self.inner.status.borrow()
    }

    /// Receiver that observes every status change.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    pub async fn state(&self) -> ConnectionState {
        self.inner.state.lock().await.phase
    }

    /// Automatic retries consumed since the last successful open.
    pub async fn attempts(&self) -> u32 {
        self.inner.state.lock().await.attempts
    }

    /// Whether a retry timer is armed.
    pub async fn has_pending_retry(&self) -> bool {
        self.inner
            .state
            .lock()
            .await
            .retry_timer
            .as_ref()
            .is_some_and(|timer| !timer.is_finished())
    }
}

impl Inner {
    async fn connect(inner: Arc<Inner>) -> Result<(), SyncError> {
        let (epoch, mut transport) = {
            let mut state = inner.state.lock().await;
            if matches!(state.phase, ConnectionState::Open | ConnectionState::Connecting) {
                return Ok(());
            }
            state.teardown().await;
            if state.user_disconnected {
                state.attempts = 0;
                state.user_disconnected = false;
            }
            state.phase = ConnectionState::Connecting;
            let retrying = matches!(*inner.status.borrow(), ConnectionStatus::Reconnecting { .. });
            if !retrying {
                inner.set_status(ConnectionStatus::Connecting);
            }
            (state.epoch, (inner.factory)())
        };

        let kind = transport.kind();
        tracing::debug!("opening {kind} transport (epoch {epoch})");
        let timeout = inner.settings.handshake_timeout;
        let outcome = match tokio::time::timeout(timeout, transport.open()).await {
            Ok(Ok(frames)) => Ok(frames),
            Ok(Err(err)) => Err(SyncError::HandshakeFailed(err.to_string())),
            Err(_) => Err(SyncError::HandshakeTimeout(timeout)),
        };

        let mut state = inner.state.lock().await;
        if state.epoch != epoch {
            transport.close().await;
            tracing::debug!("discarding superseded {kind} handshake (epoch {epoch})");
            return Err(SyncError::Cancelled);
        }

        match outcome {
            Ok(frames) => {
                state.phase = ConnectionState::Open;
                state.attempts = 0;
                state.transport = Some(transport);
                state.pump = Some(tokio::spawn(pump(Arc::downgrade(&inner), epoch, frames)));
                tracing::info!("order push channel connected over {kind}");
                inner.set_status(ConnectionStatus::Connected);
                Ok(())
            }
            Err(err) => {
                transport.close().await;
                state.phase = ConnectionState::Failed;
                tracing::warn!("{kind} connect failed: {err}");
                inner.registry.dispatch_error(&err);
                Inner::schedule_reconnect(&inner, &mut state);
                Err(err)
            }
        }
    }

    /// Arm the next retry, or give up once the budget is spent.
    fn schedule_reconnect(inner: &Arc<Inner>, state: &mut ControllerState) {
        if state.user_disconnected {
            return;
        }
        let policy = &inner.settings.backoff;
        if policy.is_exhausted(state.attempts) {
            tracing::error!(
                "giving up on the order push channel after {} reconnect attempts",
                state.attempts
            );
            inner.set_status(ConnectionStatus::ConnectionFailed);
            inner.registry.dispatch_error(&SyncError::RetryBudgetExhausted {
                attempts: state.attempts,
            });
            return;
        }

        state.attempts += 1;
        let attempt = state.attempts;
        let delay = policy.delay_for(attempt);
        tracing::warn!(
            "reconnecting in {delay:?} (attempt {attempt}/{})",
            policy.max_attempts
        );
        inner.set_status(ConnectionStatus::Reconnecting {
            attempt,
            max_attempts: policy.max_attempts,
        });
        state.retry_timer = Some(Inner::spawn_retry(inner, state.epoch, delay));
    }

    fn spawn_retry(inner: &Arc<Inner>, epoch: u64, delay: Duration) -> JoinHandle<()> {
        let weak = Arc::downgrade(inner);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                Inner::retry(inner, epoch).await;
            }
        })
    }

    fn retry(inner: Arc<Inner>, epoch: u64) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            {
                let mut state = inner.state.lock().await;
                if state.epoch != epoch || state.user_disconnected {
                    return;
                }
                // Detach our own handle so the connect below does not abort us.
                state.retry_timer.take();
            }
            // Failures were already reported and rescheduled by connect.
            let _ = Inner::connect(inner).await;
        })
    }

    async fn handle_closed(inner: &Arc<Inner>, epoch: u64) {
        let mut state = inner.state.lock().await;
        if state.epoch != epoch || state.phase != ConnectionState::Open {
            return;
        }
        state.pump.take();
        if let Some(mut transport) = state.transport.take() {
            transport.close().await;
        }
        state.phase = ConnectionState::Closed;
        tracing::warn!("order push channel closed by remote");
        inner.set_status(ConnectionStatus::Disconnected);
        Inner::schedule_reconnect(inner, &mut state);
    }

    /// Publish a status change. Repeats of the current status are swallowed.
    fn set_status(&self, status: ConnectionStatus) {
        let changed = self.status.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });
        if changed {
            tracing::debug!("connection status: {status}");
            self.registry.dispatch_status(&status);
        }
    }
}

/// Forward frames of one connection instance until it ends or is replaced.
async fn pump(weak: Weak<Inner>, epoch: u64, mut frames: FrameReceiver) {
    while let Some(frame) = frames.recv().await {
        let Some(inner) = weak.upgrade() else {
            return;
        };
        let state = inner.state.lock().await;
        if state.epoch != epoch {
            return;
        }
        match frame {
            Frame::Data(text) => match Order::from_frame(&text) {
                Ok(order) => {
                    tracing::debug!("order {} received for table {}", order.id, order.table);
                    inner.registry.dispatch_message(&order);
                }
                Err(err) => {
                    tracing::warn!("dropping frame: {err}");
                    inner.registry.dispatch_error(&err);
                }
            },
            Frame::Fault(fault) => {
                tracing::warn!("push channel fault: {fault}");
                inner
                    .registry
                    .dispatch_error(&SyncError::TransportRuntime(fault.to_string()));
            }
        }
        drop(state);
    }

    if let Some(inner) = weak.upgrade() {
        Inner::handle_closed(&inner, epoch).await;
    }
}
