//! Subscriber registry for real-time connection events.
//!
//! Consumers observe three independent event kinds without touching the
//! connection itself:
//! - `message`: a decoded order pushed by the backend
//! - `error`: a recoverable or terminal sync error
//! - `status`: a change of the user-visible connection phase
//!
//! Handlers are added and removed independently of the connection lifecycle.
//! Each handler gets exactly one call per event; a panicking handler is
//! isolated and logged.

pub mod event_types;
mod registry;

pub use event_types::{ConnectionStatus, EventKind};
pub use registry::{Handler, SubscriberRegistry, SubscriptionToken};
