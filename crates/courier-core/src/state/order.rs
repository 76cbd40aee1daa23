//! Order state machine implementation.
//!
//! Manages order state transitions with validation, ensuring orders move
//! through valid lifecycle states: pending -> preparing -> prepared ->
//! ready -> assigned -> picked_up -> delivered, with cancellation from any
//! non-terminal state. The allowed-next-states table lives with the status
//! metadata in `courier-types` so dashboards and validation share one
//! source of truth.

use backoff::ExponentialBackoff;
use chrono::{DateTime, Utc};
use courier_storage::{StorageError, StorageService};
use courier_types::{Order, OrderStatus, StorageKey};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during order state management.
#[derive(Debug, Error)]
pub enum OrderStateError {
	#[error("Storage error: {0}")]
	Storage(String),
	#[error("invalid transition from {from} to {to}")]
	InvalidTransition { from: OrderStatus, to: OrderStatus },
	#[error("Order not found: {0}")]
	OrderNotFound(String),
}

/// Manages order state transitions and persistence.
pub struct OrderStateMachine {
	storage: Arc<StorageService>,
}

impl OrderStateMachine {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}

	/// Checks if a state transition is valid.
	///
	/// Consults the status metadata table; the table lists forward moves,
	/// the assigned -> ready revert, and cancellation from non-terminal
	/// states.
	pub fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
		from.meta().next.contains(&to)
	}

	/// Validates a transition, returning the states involved on failure.
	pub fn validate_transition(
		from: OrderStatus,
		to: OrderStatus,
	) -> Result<(), OrderStateError> {
		if Self::is_valid_transition(from, to) {
			Ok(())
		} else {
			Err(OrderStateError::InvalidTransition { from, to })
		}
	}

	/// Records the stage timestamp for a transition that was just applied.
	///
	/// Only states with a timestamp column are stamped; reverting from
	/// `assigned` back to `ready` is handled by the caller (it clears
	/// `assigned_at` rather than stamping).
	pub fn stamp_transition(order: &mut Order, to: OrderStatus, at: DateTime<Utc>) {
		match to {
			OrderStatus::Prepared => order.prepared_at = Some(at),
			OrderStatus::Ready => order.ready_at = Some(at),
			OrderStatus::Assigned => order.assigned_at = Some(at),
			OrderStatus::PickedUp => order.picked_up_at = Some(at),
			OrderStatus::Delivered => order.delivered_at = Some(at),
			OrderStatus::Cancelled => order.cancelled_at = Some(at),
			OrderStatus::Pending | OrderStatus::Preparing => {}
		}
	}

	/// Gets an order by id.
	pub async fn get_order(&self, order_id: &str) -> Result<Order, OrderStateError> {
		self.storage
			.retrieve(StorageKey::Orders.as_str(), order_id)
			.await
			.map_err(|e| match e {
				StorageError::NotFound => OrderStateError::OrderNotFound(order_id.to_string()),
				other => OrderStateError::Storage(other.to_string()),
			})
	}

	/// Stores a brand new order.
	pub async fn store_order(&self, order: &Order) -> Result<(), OrderStateError> {
		self.storage
			.store(StorageKey::Orders.as_str(), &order.id, order)
			.await
			.map_err(|e| OrderStateError::Storage(e.to_string()))
	}

	/// Persists an updated order, retrying transient backend failures.
	///
	/// The transition is not considered applied until this succeeds; a
	/// missing order is permanent and fails immediately.
	pub async fn persist_order(&self, order: &Order) -> Result<(), OrderStateError> {
		let policy = ExponentialBackoff {
			max_elapsed_time: Some(Duration::from_secs(5)),
			..Default::default()
		};
		backoff::future::retry(policy, || async {
			self.storage
				.update(StorageKey::Orders.as_str(), &order.id, order)
				.await
				.map_err(|e| match e {
					StorageError::NotFound => backoff::Error::permanent(e),
					other => backoff::Error::transient(other),
				})
		})
		.await
		.map_err(|e| match e {
			StorageError::NotFound => OrderStateError::OrderNotFound(order.id.clone()),
			other => OrderStateError::Storage(other.to_string()),
		})
	}

	/// Returns every stored order.
	pub async fn all_orders(&self) -> Result<Vec<Order>, OrderStateError> {
		self.storage
			.retrieve_all(StorageKey::Orders.as_str())
			.await
			.map_err(|e| OrderStateError::Storage(e.to_string()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn forward_moves_are_valid() {
		use OrderStatus::*;
		for (from, to) in [
			(Pending, Preparing),
			(Preparing, Prepared),
			(Prepared, Ready),
			(Ready, Assigned),
			(Assigned, PickedUp),
			(PickedUp, Delivered),
		] {
			assert!(
				OrderStateMachine::is_valid_transition(from, to),
				"{} -> {} should be allowed",
				from,
				to
			);
		}
	}

	#[test]
	fn skipping_forward_is_invalid() {
		use OrderStatus::*;
		assert!(!OrderStateMachine::is_valid_transition(Pending, Prepared));
		assert!(!OrderStateMachine::is_valid_transition(Ready, PickedUp));
		assert!(!OrderStateMachine::is_valid_transition(Preparing, Delivered));
	}

	#[test]
	fn cancellation_allowed_from_non_terminal_only() {
		use OrderStatus::*;
		for status in OrderStatus::all() {
			let expected = !status.is_terminal();
			assert_eq!(
				OrderStateMachine::is_valid_transition(status, Cancelled),
				expected && status != Cancelled,
				"cancel from {}",
				status
			);
		}
	}

	#[test]
	fn terminal_states_have_no_exits() {
		use OrderStatus::*;
		for to in OrderStatus::all() {
			assert!(!OrderStateMachine::is_valid_transition(Delivered, to));
			assert!(!OrderStateMachine::is_valid_transition(Cancelled, to));
		}
	}

	#[test]
	fn rejected_offer_revert_is_the_only_backward_move() {
		use OrderStatus::*;
		assert!(OrderStateMachine::is_valid_transition(Assigned, Ready));
		assert!(!OrderStateMachine::is_valid_transition(PickedUp, Assigned));
		assert!(!OrderStateMachine::is_valid_transition(Preparing, Pending));
	}
}
