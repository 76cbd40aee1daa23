//! Core lifecycle engine for the courier order system.
//!
//! This crate owns the canonical state of every order: preparation
//! progress, delivery assignment and terminal outcome. All portals
//! (kitchen, dispatch, delivery agent, customer, admin) mutate orders
//! exclusively through [`engine::LifecycleEngine`] operations and observe
//! changes through the engine's event feed and read-model projection.

pub mod assignment;
pub mod engine;
pub mod projection;
pub mod state;

pub use engine::{EngineError, LifecycleEngine};
