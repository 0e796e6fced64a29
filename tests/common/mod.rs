// tests/common/mod.rs
//! Common test utilities for sync integration tests.

#![allow(dead_code)]

pub mod mock_backend;

pub use mock_backend::{MockBackend, Outcome};

use std::sync::{Arc, Mutex};

use kitchen_sync_lib::bus::{ConnectionStatus, SubscriberRegistry};
use kitchen_sync_lib::error::SyncError;

/// Every status and error delivered through a registry, in order.
#[derive(Clone, Default)]
pub struct EventLog {
    pub statuses: Arc<Mutex<Vec<ConnectionStatus>>>,
    pub errors: Arc<Mutex<Vec<SyncError>>>,
}

impl EventLog {
    pub fn attach(registry: &SubscriberRegistry) -> Self {
        let log = Self::default();
        let statuses = log.statuses.clone();
        registry.on_status(move |status| statuses.lock().unwrap().push(*status));
        let errors = log.errors.clone();
        registry.on_error(move |error| errors.lock().unwrap().push(error.clone()));
        log
    }

    pub fn statuses(&self) -> Vec<ConnectionStatus> {
        self.statuses.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<SyncError> {
        self.errors.lock().unwrap().clone()
    }

    pub fn count_status(&self, wanted: ConnectionStatus) -> usize {
        self.statuses().into_iter().filter(|s| *s == wanted).count()
    }
}

pub fn order_json(id: i64, quantity: u32) -> String {
    serde_json::json!({
        "id": id,
        "table": "5",
        "lineItems": [{"dishName": "Ceviche", "quantity": quantity}]
    })
    .to_string()
}
