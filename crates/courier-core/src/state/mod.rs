//! Order state management.

pub mod order;

pub use order::{OrderStateError, OrderStateMachine};
