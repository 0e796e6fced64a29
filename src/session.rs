//! Signed-in user and role checks gating the kitchen client's actions.

use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

/// Grants every permission.
pub const ALL_PERMISSIONS: &str = "all";

pub const VIEW_MENU: &str = "view_menu";
pub const CREATE_ORDER: &str = "create_order";
pub const VIEW_ORDERS: &str = "view_orders";
pub const UPDATE_ORDER_STATUS: &str = "update_order_status";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "admin")]
    Admin,
    #[serde(rename = "mesero", alias = "waiter")]
    Waiter,
}

impl Role {
    pub fn default_permissions(&self) -> BTreeSet<String> {
        let names: &[&str] = match self {
            Role::Admin => &[ALL_PERMISSIONS],
            Role::Waiter => &[VIEW_MENU, CREATE_ORDER, VIEW_ORDERS, UPDATE_ORDER_STATUS],
        };
        names.iter().map(|name| name.to_string()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSession {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub role: Role,
    #[serde(default)]
    pub permissions: BTreeSet<String>,
}

impl UserSession {
    /// A session carrying the role's default permissions.
    pub fn new(id: i64, email: impl Into<String>, name: impl Into<String>, role: Role) -> Self {
        Self {
            id,
            email: email.into(),
            name: name.into(),
            role,
            permissions: role.default_permissions(),
        }
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(ALL_PERMISSIONS) || self.permissions.contains(permission)
    }
}

/// Holder of the current session. Clones share the same slot.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    current: Arc<RwLock<Option<UserSession>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sign_in(&self, session: UserSession) {
        tracing::info!("{} signed in as {:?}", session.email, session.role);
        *self.current.write().expect("session lock poisoned") = Some(session);
    }

    pub fn sign_out(&self) {
        *self.current.write().expect("session lock poisoned") = None;
    }

    pub fn current(&self) -> Option<UserSession> {
        self.current.read().expect("session lock poisoned").clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.current().is_some()
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.current().is_some_and(|session| session.role == role)
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.current()
            .is_some_and(|session| session.has_permission(permission))
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(Role::Admin)
    }

    pub fn is_waiter(&self) -> bool {
        self.has_role(Role::Waiter)
    }
}
