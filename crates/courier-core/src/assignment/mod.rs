//! Dispatch assignment records.
//!
//! The assignment book persists every offer made for an order together
//! with a per-order index, so redispatch can exclude agents that have
//! already been offered the order and dashboards can show the offer
//! history. The single-pending-offer invariant is enforced by the engine,
//! which checks the order's `pending_assignment_id` inside the per-order
//! critical section before asking the book for a new offer.

use chrono::Utc;
use courier_storage::{StorageError, StorageService};
use courier_types::{Assignment, AssignmentStatus, StorageKey};
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur while managing assignments.
#[derive(Debug, Error)]
pub enum AssignmentError {
	#[error("Storage error: {0}")]
	Storage(String),
	#[error("Assignment not found: {0}")]
	NotFound(String),
	#[error("Assignment {id} has already been resolved ({status})")]
	AlreadyResolved { id: String, status: AssignmentStatus },
}

impl From<StorageError> for AssignmentError {
	fn from(err: StorageError) -> Self {
		AssignmentError::Storage(err.to_string())
	}
}

/// Persistent record of all dispatch offers.
pub struct AssignmentBook {
	storage: Arc<StorageService>,
}

impl AssignmentBook {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}

	/// Creates and persists a new pending offer for an order.
	pub async fn create_offer(
		&self,
		order_id: &str,
		agent_id: &str,
	) -> Result<Assignment, AssignmentError> {
		let assignment = Assignment::offer(order_id, agent_id);
		self.storage
			.store(
				StorageKey::Assignments.as_str(),
				&assignment.id,
				&assignment,
			)
			.await?;

		let mut index = self.assignment_ids(order_id).await?;
		index.push(assignment.id.clone());
		self.storage
			.store(StorageKey::OrderAssignments.as_str(), order_id, &index)
			.await?;

		Ok(assignment)
	}

	/// Gets an assignment by id.
	pub async fn get(&self, assignment_id: &str) -> Result<Assignment, AssignmentError> {
		self.storage
			.retrieve(StorageKey::Assignments.as_str(), assignment_id)
			.await
			.map_err(|e| match e {
				StorageError::NotFound => AssignmentError::NotFound(assignment_id.to_string()),
				other => AssignmentError::Storage(other.to_string()),
			})
	}

	/// Records the agent's (or expiry timer's) response on a pending offer.
	///
	/// Assignments are immutable once responded; resolving one twice is
	/// an error carrying the earlier outcome.
	pub async fn resolve(
		&self,
		assignment: &mut Assignment,
		accepted: bool,
		note: Option<String>,
		expired: bool,
	) -> Result<(), AssignmentError> {
		if assignment.status != AssignmentStatus::Pending {
			return Err(AssignmentError::AlreadyResolved {
				id: assignment.id.clone(),
				status: assignment.status,
			});
		}
		assignment.status = if accepted {
			AssignmentStatus::Accepted
		} else {
			AssignmentStatus::Rejected
		};
		assignment.responded_at = Some(Utc::now());
		assignment.note = note;
		assignment.expired = expired;

		self.storage
			.update(
				StorageKey::Assignments.as_str(),
				&assignment.id,
				assignment,
			)
			.await?;
		Ok(())
	}

	/// Returns all offers made for an order, oldest first.
	pub async fn offers_for_order(
		&self,
		order_id: &str,
	) -> Result<Vec<Assignment>, AssignmentError> {
		let ids = self.assignment_ids(order_id).await?;
		let mut offers = Vec::with_capacity(ids.len());
		for id in ids {
			offers.push(self.get(&id).await?);
		}
		Ok(offers)
	}

	/// Agents that have already been offered this order.
	pub async fn offered_agents(&self, order_id: &str) -> Result<Vec<String>, AssignmentError> {
		Ok(self
			.offers_for_order(order_id)
			.await?
			.into_iter()
			.map(|a| a.agent_id)
			.collect())
	}

	async fn assignment_ids(&self, order_id: &str) -> Result<Vec<String>, AssignmentError> {
		match self
			.storage
			.retrieve(StorageKey::OrderAssignments.as_str(), order_id)
			.await
		{
			Ok(ids) => Ok(ids),
			Err(StorageError::NotFound) => Ok(Vec::new()),
			Err(e) => Err(e.into()),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use courier_storage::implementations::memory::MemoryStorage;

	fn book() -> AssignmentBook {
		AssignmentBook::new(Arc::new(StorageService::new(Box::new(
			MemoryStorage::new(),
		))))
	}

	#[tokio::test]
	async fn create_offer_indexes_by_order() {
		let book = book();
		let first = book.create_offer("o1", "agent-a").await.unwrap();
		let second = book.create_offer("o1", "agent-b").await.unwrap();
		book.create_offer("o2", "agent-a").await.unwrap();

		let offers = book.offers_for_order("o1").await.unwrap();
		assert_eq!(
			offers.iter().map(|a| a.id.as_str()).collect::<Vec<_>>(),
			vec![first.id.as_str(), second.id.as_str()]
		);
		assert_eq!(
			book.offered_agents("o1").await.unwrap(),
			vec!["agent-a".to_string(), "agent-b".to_string()]
		);
	}

	#[tokio::test]
	async fn resolve_is_final() {
		let book = book();
		let mut offer = book.create_offer("o1", "agent-a").await.unwrap();

		book.resolve(&mut offer, false, Some("too far".into()), false)
			.await
			.unwrap();
		assert_eq!(offer.status, AssignmentStatus::Rejected);
		assert!(offer.responded_at.is_some());

		let err = book
			.resolve(&mut offer, true, None, false)
			.await
			.unwrap_err();
		assert!(matches!(err, AssignmentError::AlreadyResolved { .. }));

		// The stored copy reflects the first response
		let stored = book.get(&offer.id).await.unwrap();
		assert_eq!(stored.status, AssignmentStatus::Rejected);
		assert_eq!(stored.note.as_deref(), Some("too far"));
	}

	#[tokio::test]
	async fn unknown_order_has_no_offers() {
		let book = book();
		assert!(book.offers_for_order("nope").await.unwrap().is_empty());
	}
}
