//! REST collaborators of the kitchen client: orders and the cash register.

mod client;
pub mod orders;
pub mod register;

pub use client::ApiClient;
pub use orders::OrderRepository;
pub use register::{CashRegister, RegisterState};
