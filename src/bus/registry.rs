use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use super::event_types::{ConnectionStatus, EventKind};
use crate::error::SyncError;
use crate::kitchen::order::Order;

/// A registered callback. Identity is the `Arc` allocation.
pub type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Opaque handle returned by a subscribe call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken {
    kind: EventKind,
    id: u64,
}

impl SubscriptionToken {
    pub fn kind(&self) -> EventKind {
        self.kind
    }
}

struct HandlerSet<T> {
    kind: EventKind,
    entries: RwLock<Vec<(u64, Handler<T>)>>,
}

impl<T> HandlerSet<T> {
    fn new(kind: EventKind) -> Self {
        Self {
            kind,
            entries: RwLock::new(Vec::new()),
        }
    }

    fn add(&self, next_id: &AtomicU64, handler: Handler<T>) -> SubscriptionToken {
        let mut entries = self.entries.write().expect("registry lock poisoned");
        if let Some((id, _)) = entries.iter().find(|(_, h)| same_handler(h, &handler)) {
            return SubscriptionToken {
                kind: self.kind,
                id: *id,
            };
        }
        let id = next_id.fetch_add(1, Ordering::Relaxed);
        entries.push((id, handler));
        SubscriptionToken {
            kind: self.kind,
            id,
        }
    }

    fn remove(&self, id: u64) -> bool {
        let mut entries = self.entries.write().expect("registry lock poisoned");
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    fn len(&self) -> usize {
        self.entries.read().expect("registry lock poisoned").len()
    }

    /// Call every handler once. Returns how many panicked.
    fn dispatch(&self, event: &T) -> usize {
        // Snapshot so handlers may (un)subscribe without deadlocking.
        let handlers: Vec<Handler<T>> = self
            .entries
            .read()
            .expect("registry lock poisoned")
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();

        let mut failed = 0;
        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                failed += 1;
                tracing::error!("{} handler panicked; continuing with remaining subscribers", self.kind);
            }
        }
        failed
    }
}

fn same_handler<T>(a: &Handler<T>, b: &Handler<T>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// Fan-out of connection events to independently registered consumers.
///
/// Subscribing the same `Arc` twice returns the original token, so a handler
/// is never called twice for one event.
pub struct SubscriberRegistry {
    next_id: AtomicU64,
    messages: HandlerSet<Order>,
    errors: HandlerSet<SyncError>,
    statuses: HandlerSet<ConnectionStatus>,
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            messages: HandlerSet::new(EventKind::Message),
            errors: HandlerSet::new(EventKind::Error),
            statuses: HandlerSet::new(EventKind::Status),
        }
    }

    pub fn subscribe_messages(&self, handler: Handler<Order>) -> SubscriptionToken {
        self.messages.add(&self.next_id, handler)
    }

    pub fn subscribe_errors(&self, handler: Handler<SyncError>) -> SubscriptionToken {
        self.errors.add(&self.next_id, handler)
    }

    pub fn subscribe_status(&self, handler: Handler<ConnectionStatus>) -> SubscriptionToken {
        self.statuses.add(&self.next_id, handler)
    }

    /// Convenience: wrap a closure and subscribe it. Each call is a new handler.
    pub fn on_message<F>(&self, f: F) -> SubscriptionToken
    where
        F: Fn(&Order) + Send + Sync + 'static,
    {
        self.subscribe_messages(Arc::new(f))
    }

    pub fn on_error<F>(&self, f: F) -> SubscriptionToken
    where
        F: Fn(&SyncError) + Send + Sync + 'static,
    {
        self.subscribe_errors(Arc::new(f))
    }

    pub fn on_status<F>(&self, f: F) -> SubscriptionToken
    where
        F: Fn(&ConnectionStatus) + Send + Sync + 'static,
    {
        self.subscribe_status(Arc::new(f))
    }

    /// Remove a subscription. Unknown or already-removed tokens are ignored.
    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        match token.kind {
            EventKind::Message => self.messages.remove(token.id),
            EventKind::Error => self.errors.remove(token.id),
            EventKind::Status => self.statuses.remove(token.id),
        }
    }

    pub fn handler_count(&self, kind: EventKind) -> usize {
        match kind {
            EventKind::Message => self.messages.len(),
            EventKind::Error => self.errors.len(),
            EventKind::Status => self.statuses.len(),
        }
    }

    pub fn dispatch_message(&self, order: &Order) -> usize {
        self.messages.dispatch(order)
    }

    pub fn dispatch_error(&self, error: &SyncError) -> usize {
        self.errors.dispatch(error)
    }

    pub fn dispatch_status(&self, status: &ConnectionStatus) -> usize {
        self.statuses.dispatch(status)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::kitchen::order::tests::sample_order;

    fn counter() -> (Arc<AtomicUsize>, Handler<Order>) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let handler: Handler<Order> = Arc::new(move |_order: &Order| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        (count, handler)
    }

    #[test]
    fn same_handler_twice_is_delivered_once() {
        let registry = SubscriberRegistry::new();
        let (count, handler) = counter();

        let first = registry.subscribe_messages(handler.clone());
        let second = registry.subscribe_messages(handler);
        assert_eq!(first, second);
        assert_eq!(registry.handler_count(EventKind::Message), 1);

        registry.dispatch_message(&sample_order(1, 2));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn distinct_handlers_each_receive_one_call() {
        let registry = SubscriberRegistry::new();
        let (a, handler_a) = counter();
        let (b, handler_b) = counter();
        registry.subscribe_messages(handler_a);
        registry.subscribe_messages(handler_b);

        registry.dispatch_message(&sample_order(1, 2));
        registry.dispatch_message(&sample_order(2, 1));
        assert_eq!(a.load(Ordering::SeqCst), 2);
        assert_eq!(b.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unsubscribe_stops_delivery_and_is_idempotent() {
        let registry = SubscriberRegistry::new();
        let (count, handler) = counter();
        let token = registry.subscribe_messages(handler);

        assert!(registry.unsubscribe(token));
        assert!(!registry.unsubscribe(token));
        registry.dispatch_message(&sample_order(1, 2));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn tokens_are_scoped_by_kind() {
        let registry = SubscriberRegistry::new();
        let status_token = registry.on_status(|_| {});
        let error_token = registry.on_error(|_| {});
        assert_eq!(status_token.kind(), EventKind::Status);

        assert!(registry.unsubscribe(error_token));
        assert_eq!(registry.handler_count(EventKind::Status), 1);
        assert_eq!(registry.handler_count(EventKind::Error), 0);
    }

    #[test]
    fn panicking_handler_does_not_block_others() {
        let registry = SubscriberRegistry::new();
        let (count, handler) = counter();
        registry.on_status(|_| panic!("boom"));
        let statuses = Arc::new(AtomicUsize::new(0));
        let seen = statuses.clone();
        registry.on_status(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        registry.subscribe_messages(handler);

        let failed = registry.dispatch_status(&ConnectionStatus::Connected);
        assert_eq!(failed, 1);
        assert_eq!(statuses.load(Ordering::SeqCst), 1);

        registry.dispatch_message(&sample_order(1, 1));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn handler_may_unsubscribe_itself_during_dispatch() {
        let registry = Arc::new(SubscriberRegistry::new());
        let slot: Arc<std::sync::Mutex<Option<SubscriptionToken>>> = Arc::default();
        let calls = Arc::new(AtomicUsize::new(0));

        let reg = registry.clone();
        let own = slot.clone();
        let seen = calls.clone();
        let token = registry.on_error(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
            if let Some(token) = *own.lock().unwrap() {
                reg.unsubscribe(token);
            }
        });
        *slot.lock().unwrap() = Some(token);

        registry.dispatch_error(&SyncError::Cancelled);
        registry.dispatch_error(&SyncError::Cancelled);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
