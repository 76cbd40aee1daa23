//! Delivery agent reference data.
//!
//! Agents are owned and edited by the admin directory; the engine only
//! reads them when dispatching orders.

use serde::{Deserialize, Serialize};

/// Vehicle the agent delivers with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VehicleKind {
	Bicycle,
	Motorbike,
	Car,
}

/// A delivery agent as known to the external directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryAgent {
	pub id: String,
	pub name: String,
	pub phone: String,
	pub vehicle: VehicleKind,
	/// Registration plate, where the vehicle has one.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub vehicle_no: Option<String>,
	/// Inactive agents are never offered assignments.
	pub active: bool,
}
