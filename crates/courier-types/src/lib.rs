//! Common types module for the courier order lifecycle engine.
//!
//! This module defines the core data types and structures shared by all
//! engine components. It provides a centralized location for domain types
//! to ensure consistency across the workspace.

/// Delivery agent reference data owned by the external directory.
pub mod agent;
/// Dispatch assignment types binding orders to delivery agents.
pub mod assignment;
/// Event types published on the engine's notification feed.
pub mod events;
/// Order types including line items, snapshots and lifecycle status.
pub mod order;
/// Commission and delivery charge ledger entry types.
pub mod payment;
/// Storage namespace keys for persistent data.
pub mod storage;
/// Small shared helpers.
pub mod utils;

// Re-export all types for convenient access
pub use agent::*;
pub use assignment::*;
pub use events::*;
pub use order::*;
pub use payment::*;
pub use storage::*;
pub use utils::truncate_id;
