use std::sync::{Arc, Mutex, MutexGuard};

use chrono::NaiveDateTime;

use super::board::{elapsed_label, KitchenBoard, KitchenOrder, MergeOutcome};
use super::order::OrderId;
use crate::bus::{ConnectionStatus, SubscriberRegistry, SubscriptionToken};
use crate::error::SyncError;

#[derive(Debug)]
struct ViewState {
    board: KitchenBoard,
    status: ConnectionStatus,
    last_error: Option<SyncError>,
}

/// The kitchen screen's model: the board plus the connection indicator.
///
/// Registers one handler per event kind on attach and removes them on detach
/// (or drop), so the connection outlives any number of views.
pub struct KitchenView {
    registry: Arc<SubscriberRegistry>,
    state: Arc<Mutex<ViewState>>,
    tokens: Vec<SubscriptionToken>,
}

impl KitchenView {
    pub fn attach(registry: Arc<SubscriberRegistry>) -> Self {
        let state = Arc::new(Mutex::new(ViewState {
            board: KitchenBoard::new(),
            status: ConnectionStatus::Disconnected,
            last_error: None,
        }));

        let on_order = Arc::clone(&state);
        let message = registry.on_message(move |order| {
            let outcome = lock(&on_order).board.merge(order.clone());
            match outcome {
                MergeOutcome::Inserted { index } => {
                    tracing::info!(order = %order.id, table = %order.table, index, "order added to board")
                }
                MergeOutcome::Updated { index } => {
                    tracing::info!(order = %order.id, index, "order updated on board")
                }
                MergeOutcome::Unchanged { .. } => {
                    tracing::debug!(order = %order.id, "duplicate order payload ignored")
                }
            }
        });

        let on_error = Arc::clone(&state);
        let error = registry.on_error(move |err| {
            lock(&on_error).last_error = Some(err.clone());
        });

        let on_status = Arc::clone(&state);
        let status = registry.on_status(move |status| {
            let mut state = lock(&on_status);
            state.status = *status;
            if *status == ConnectionStatus::Connected {
                state.last_error = None;
            }
        });

        Self {
            registry,
            state,
            tokens: vec![message, error, status],
        }
    }

    /// Stop receiving events. Safe to call more than once.
    pub fn detach(&mut self) {
        for token in self.tokens.drain(..) {
            self.registry.unsubscribe(token);
        }
    }

    pub fn is_attached(&self) -> bool {
        !self.tokens.is_empty()
    }

    pub fn snapshot(&self) -> Vec<KitchenOrder> {
        lock(&self.state).board.snapshot()
    }

    /// Snapshot paired with each order's elapsed-time label at `now`.
    pub fn rows(&self, now: NaiveDateTime) -> Vec<(KitchenOrder, Option<String>)> {
        self.snapshot()
            .into_iter()
            .map(|row| {
                let label = elapsed_label(row.order.created_at, now);
                (row, label)
            })
            .collect()
    }

    pub fn set_in_progress(&self, id: &OrderId, value: bool) -> bool {
        lock(&self.state).board.set_in_progress(id, value)
    }

    pub fn set_done(&self, id: &OrderId, value: bool) -> bool {
        lock(&self.state).board.set_done(id, value)
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.state).board.pending_count()
    }

    pub fn status(&self) -> ConnectionStatus {
        lock(&self.state).status
    }

    pub fn last_error(&self) -> Option<SyncError> {
        lock(&self.state).last_error.clone()
    }

    pub fn clear_error(&self) {
        lock(&self.state).last_error = None;
    }

    /// Whether the reconnect button should be shown: the connection is down,
    /// or a connection-level error is still on record.
    pub fn needs_manual_reconnect(&self) -> bool {
        let state = lock(&self.state);
        state.status.offers_manual_reconnect()
            || state
                .last_error
                .as_ref()
                .is_some_and(SyncError::triggers_backoff)
    }
}

impl Drop for KitchenView {
    fn drop(&mut self) {
        self.detach();
    }
}

fn lock(state: &Mutex<ViewState>) -> MutexGuard<'_, ViewState> {
    state.lock().expect("kitchen view mutex poisoned")
}
