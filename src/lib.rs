//! Kitchen order synchronization library.
//!
//! Keeps a live "orders in kitchen" board consistent with the point-of-sale
//! backend over a reconnecting push channel.
//!
//! # Architecture
//!
//! - `realtime`: push transports (SSE, STOMP) and the reconnection controller
//! - `bus`: subscriber registry for message, error and status events
//! - `kitchen`: order model, merge engine and the kitchen view
//! - `api`: REST collaborators for orders and the cash register
//! - `session`: signed-in user and role checks
//! - `config`: file and environment configuration

pub mod api;
pub mod bus;
pub mod config;
pub mod error;
pub mod kitchen;
pub mod realtime;
pub mod session;

use std::sync::Arc;

use api::{ApiClient, CashRegister, OrderRepository};
use bus::SubscriberRegistry;
use config::SyncConfig;
use error::{ApiError, SyncError};
use kitchen::KitchenView;
use realtime::{transport_factory, ConnectionController, ControllerSettings, TransportFactory};

/// Install the fmt subscriber, honouring `RUST_LOG`.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kitchen_sync=debug,info".parse().expect("valid env filter")),
        )
        .init();
}

/// The sync layer wired together: one registry, one controller and the
/// REST collaborators sharing a base URL. Construct once and pass it around.
pub struct SyncService {
    config: SyncConfig,
    registry: Arc<SubscriberRegistry>,
    controller: ConnectionController,
    orders: OrderRepository,
    register: CashRegister,
}

impl SyncService {
    pub fn from_config(config: SyncConfig) -> Result<Self, ApiError> {
        let factory = transport_factory(&config);
        Self::with_factory(config, factory)
    }

    /// Like [`SyncService::from_config`] but with a caller-supplied transport factory.
    pub fn with_factory(config: SyncConfig, factory: TransportFactory) -> Result<Self, ApiError> {
        let api = ApiClient::from_config(&config)?;
        let registry = Arc::new(SubscriberRegistry::new());
        let controller = ConnectionController::new(
            factory,
            Arc::clone(&registry),
            ControllerSettings::from(&config),
        );
        Ok(Self {
            config,
            registry,
            controller,
            orders: OrderRepository::new(api.clone()),
            register: CashRegister::new(api),
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    pub fn controller(&self) -> &ConnectionController {
        &self.controller
    }

    pub fn orders(&self) -> &OrderRepository {
        &self.orders
    }

    pub fn register(&self) -> &CashRegister {
        &self.register
    }

    /// A kitchen view fed by this service's registry.
    pub fn kitchen_view(&self) -> KitchenView {
        KitchenView::attach(Arc::clone(&self.registry))
    }

    /// Connect the push channel. A failed first attempt keeps retrying in
    /// the background; the error is returned for the caller to report.
    pub async fn start(&self) -> Result<(), SyncError> {
        tracing::info!(
            "starting order sync against {} over {}",
            self.config.base_url(),
            self.config.transport
        );
        self.controller.connect().await
    }

    pub async fn stop(&self) {
        self.controller.disconnect().await;
    }
}
