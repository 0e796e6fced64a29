//! Kitchen board: merge of pushed orders with local cook state.

pub mod board;
pub mod order;
mod view;

pub use board::{elapsed_label, KitchenBoard, KitchenFlags, KitchenOrder, MergeOutcome};
pub use order::{LineItem, LineStatus, NewOrder, Order, OrderId, OrderStatus};
pub use view::KitchenView;
