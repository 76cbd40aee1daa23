//! Dispatch assignment types.
//!
//! An assignment is a single offer of one order to one delivery agent. At
//! most one assignment per order may be pending at any time; an assignment
//! is immutable once the agent has responded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Response state of a dispatch offer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
	/// Waiting for the agent to accept or reject.
	Pending,
	/// Agent accepted; the order is now bound to the agent.
	Accepted,
	/// Agent rejected, or the offer expired without a response.
	Rejected,
}

impl fmt::Display for AssignmentStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			AssignmentStatus::Pending => write!(f, "pending"),
			AssignmentStatus::Accepted => write!(f, "accepted"),
			AssignmentStatus::Rejected => write!(f, "rejected"),
		}
	}
}

/// A single dispatch offer of one order to one delivery agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
	/// Unique identifier for this offer.
	pub id: String,
	pub order_id: String,
	pub agent_id: String,
	pub status: AssignmentStatus,
	/// When the offer was made.
	pub offered_at: DateTime<Utc>,
	/// When the agent responded, if they have.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub responded_at: Option<DateTime<Utc>>,
	/// Optional note supplied with the response.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub note: Option<String>,
	/// True when the rejection came from the expiry timer rather than the agent.
	#[serde(default)]
	pub expired: bool,
}

impl Assignment {
	/// Creates a new pending offer for the given order and agent.
	pub fn offer(order_id: impl Into<String>, agent_id: impl Into<String>) -> Self {
		Self {
			id: uuid::Uuid::new_v4().to_string(),
			order_id: order_id.into(),
			agent_id: agent_id.into(),
			status: AssignmentStatus::Pending,
			offered_at: Utc::now(),
			responded_at: None,
			note: None,
			expired: false,
		}
	}

	pub fn is_pending(&self) -> bool {
		self.status == AssignmentStatus::Pending
	}
}
