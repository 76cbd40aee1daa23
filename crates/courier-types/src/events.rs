//! Event types for the engine's notification feed.
//!
//! Every successful transition and every assignment response emits exactly
//! one event record. Subscribers (kitchen dashboard, dispatch dashboard,
//! customer tracker, admin notification bell) consume this feed instead of
//! polling raw order rows.

use crate::OrderStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Who performed the action that produced an event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "role", content = "id")]
pub enum Actor {
	/// Kitchen / shop staff.
	Shop,
	/// Dispatch desk.
	Dispatcher,
	/// A delivery agent, by id.
	Agent(String),
	/// The ordering customer, by id.
	Customer(String),
	Admin,
	/// Engine-internal actions such as expiry timers.
	System,
}

impl fmt::Display for Actor {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Actor::Shop => write!(f, "shop"),
			Actor::Dispatcher => write!(f, "dispatcher"),
			Actor::Agent(id) => write!(f, "agent:{}", id),
			Actor::Customer(id) => write!(f, "customer:{}", id),
			Actor::Admin => write!(f, "admin"),
			Actor::System => write!(f, "system"),
		}
	}
}

/// Kind of change an event describes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum EventKind {
	/// A new order entered the pipeline.
	OrderSubmitted,
	/// The order moved from one lifecycle status to another.
	StatusChanged { from: OrderStatus, to: OrderStatus },
	/// A dispatch offer was made to an agent.
	Dispatched { assignment_id: String, agent_id: String },
	/// The agent accepted the offer and is now bound to the order.
	AssignmentAccepted { assignment_id: String, agent_id: String },
	/// The agent rejected the offer.
	AssignmentRejected { assignment_id: String, agent_id: String },
	/// The offer expired without a response and was auto-rejected.
	AssignmentExpired { assignment_id: String, agent_id: String },
	/// No eligible agent is bound; the dispatch desk must redispatch.
	RedispatchRequired,
	/// The order was cancelled.
	OrderCancelled { reason: String },
	/// A ledger entry was created for the delivered order.
	PaymentRecorded { record_id: String },
}

/// One entry on the notification feed.
///
/// Carries a payload snapshot so subscribers can render the change without
/// a follow-up read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
	/// Unique identifier for this event.
	pub id: String,
	/// The order the event concerns.
	pub order_id: String,
	pub kind: EventKind,
	pub actor: Actor,
	pub timestamp: DateTime<Utc>,
	/// JSON snapshot of the affected entity at publish time.
	pub payload: serde_json::Value,
}

impl EventRecord {
	/// Creates a feed entry stamped with the current time.
	pub fn new(
		order_id: impl Into<String>,
		kind: EventKind,
		actor: Actor,
		payload: serde_json::Value,
	) -> Self {
		Self {
			id: uuid::Uuid::new_v4().to_string(),
			order_id: order_id.into(),
			kind,
			actor,
			timestamp: Utc::now(),
			payload,
		}
	}
}
