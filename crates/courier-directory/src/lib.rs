//! Delivery agent directory for the courier engine.
//!
//! The directory is external reference data: agents are created and
//! edited by the admin portal, and the engine only reads them when
//! making dispatch decisions. This module provides the read interface
//! the engine depends on plus an in-memory implementation backing tests
//! and single-node deployments.

use async_trait::async_trait;
use courier_types::DeliveryAgent;
use dashmap::DashMap;
use thiserror::Error;

/// Errors that can occur during directory lookups.
#[derive(Debug, Error)]
pub enum DirectoryError {
	/// Error that occurs in the directory backend.
	#[error("Backend error: {0}")]
	Backend(String),
}

/// Trait defining the read interface for agent directories.
///
/// Implementations may be backed by a database, an HTTP service, or an
/// in-memory table; the engine treats them all as read-only.
#[async_trait]
pub trait AgentDirectory: Send + Sync {
	/// Looks up a single agent by id.
	async fn get(&self, agent_id: &str) -> Result<Option<DeliveryAgent>, DirectoryError>;

	/// Returns every agent currently marked active.
	async fn active_agents(&self) -> Result<Vec<DeliveryAgent>, DirectoryError>;
}

/// High-level directory service used by the engine.
pub struct DirectoryService {
	/// The underlying directory implementation.
	backend: Box<dyn AgentDirectory>,
}

impl DirectoryService {
	/// Creates a new DirectoryService with the specified backend.
	pub fn new(backend: Box<dyn AgentDirectory>) -> Self {
		Self { backend }
	}

	/// Looks up a single agent by id.
	pub async fn get(&self, agent_id: &str) -> Result<Option<DeliveryAgent>, DirectoryError> {
		self.backend.get(agent_id).await
	}

	/// Returns an active agent not present in the exclusion list.
	///
	/// Candidates are considered in id order so redispatch is
	/// deterministic; returns None when every active agent has already
	/// been offered the order.
	pub async fn next_candidate(
		&self,
		exclude: &[String],
	) -> Result<Option<DeliveryAgent>, DirectoryError> {
		let mut agents = self.backend.active_agents().await?;
		agents.sort_by(|a, b| a.id.cmp(&b.id));
		Ok(agents
			.into_iter()
			.find(|agent| !exclude.contains(&agent.id)))
	}
}

/// In-memory agent directory.
///
/// Backs tests and single-node deployments; the upsert/deactivate
/// methods model the admin portal's CRUD surface.
#[derive(Default)]
pub struct InMemoryDirectory {
	agents: DashMap<String, DeliveryAgent>,
}

impl InMemoryDirectory {
	pub fn new() -> Self {
		Self::default()
	}

	/// Creates or replaces an agent record.
	pub fn upsert(&self, agent: DeliveryAgent) {
		self.agents.insert(agent.id.clone(), agent);
	}

	/// Flips an agent's active flag; unknown ids are ignored.
	pub fn set_active(&self, agent_id: &str, active: bool) {
		if let Some(mut agent) = self.agents.get_mut(agent_id) {
			agent.active = active;
		}
	}
}

#[async_trait]
impl AgentDirectory for InMemoryDirectory {
	async fn get(&self, agent_id: &str) -> Result<Option<DeliveryAgent>, DirectoryError> {
		Ok(self.agents.get(agent_id).map(|a| a.clone()))
	}

	async fn active_agents(&self) -> Result<Vec<DeliveryAgent>, DirectoryError> {
		Ok(self
			.agents
			.iter()
			.filter(|a| a.active)
			.map(|a| a.clone())
			.collect())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use courier_types::VehicleKind;

	fn agent(id: &str, active: bool) -> DeliveryAgent {
		DeliveryAgent {
			id: id.into(),
			name: format!("Agent {}", id),
			phone: "000".into(),
			vehicle: VehicleKind::Motorbike,
			vehicle_no: None,
			active,
		}
	}

	#[tokio::test]
	async fn next_candidate_skips_excluded_and_inactive() {
		let directory = InMemoryDirectory::new();
		directory.upsert(agent("a", true));
		directory.upsert(agent("b", true));
		directory.upsert(agent("c", false));
		let service = DirectoryService::new(Box::new(directory));

		let candidate = service.next_candidate(&["a".into()]).await.unwrap();
		assert_eq!(candidate.unwrap().id, "b");

		let none = service
			.next_candidate(&["a".into(), "b".into()])
			.await
			.unwrap();
		assert!(none.is_none());
	}

	#[tokio::test]
	async fn set_active_changes_eligibility() {
		let directory = InMemoryDirectory::new();
		directory.upsert(agent("a", true));
		directory.set_active("a", false);
		let service = DirectoryService::new(Box::new(directory));
		assert!(service.next_candidate(&[]).await.unwrap().is_none());
	}
}
