//! Order types for the courier lifecycle engine.
//!
//! An order is the unit of work moving through the kitchen and delivery
//! pipeline. Customer and shop details are copied into the order as
//! snapshots at creation time so the record survives later edits in the
//! external directories.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of an order.
///
/// Orders progress strictly forward through the preparation and delivery
/// stages. The only backward move is `Assigned` -> `Ready` when a dispatch
/// offer is rejected or expires; `Cancelled` is reachable from every
/// non-terminal state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
	/// Order has been submitted and is waiting for the kitchen.
	Pending,
	/// Kitchen has started preparing the items.
	Preparing,
	/// All items are prepared.
	Prepared,
	/// Order is packed and ready for dispatch.
	Ready,
	/// A dispatch offer exists or an agent is bound to the order.
	Assigned,
	/// The bound agent has picked the order up.
	PickedUp,
	/// Order has been delivered. Terminal.
	Delivered,
	/// Order was cancelled. Terminal.
	Cancelled,
}

impl OrderStatus {
	/// Returns true for states with no outgoing transitions.
	pub fn is_terminal(&self) -> bool {
		matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
	}

	/// Returns the display metadata for this status.
	pub fn meta(&self) -> &'static StatusMeta {
		status_meta(*self)
	}

	/// Returns an iterator over all status variants.
	pub fn all() -> impl Iterator<Item = Self> {
		[
			Self::Pending,
			Self::Preparing,
			Self::Prepared,
			Self::Ready,
			Self::Assigned,
			Self::PickedUp,
			Self::Delivered,
			Self::Cancelled,
		]
		.into_iter()
	}
}

impl fmt::Display for OrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.meta().label)
	}
}

/// Display and transition metadata for a lifecycle status.
///
/// Single source of truth consumed by dashboards for labels/colors and by
/// the state machine for transition validation.
#[derive(Debug)]
pub struct StatusMeta {
	/// Human-readable label shown in UI components.
	pub label: &'static str,
	/// Badge color used by status widgets.
	pub color: &'static str,
	/// States this status may move to next.
	pub next: &'static [OrderStatus],
}

/// Returns the metadata entry for the given status.
pub fn status_meta(status: OrderStatus) -> &'static StatusMeta {
	use OrderStatus::*;
	match status {
		Pending => &StatusMeta {
			label: "pending",
			color: "#f59e0b",
			next: &[Preparing, Cancelled],
		},
		Preparing => &StatusMeta {
			label: "preparing",
			color: "#3b82f6",
			next: &[Prepared, Cancelled],
		},
		Prepared => &StatusMeta {
			label: "prepared",
			color: "#6366f1",
			next: &[Ready, Cancelled],
		},
		Ready => &StatusMeta {
			label: "ready",
			color: "#8b5cf6",
			next: &[Assigned, Cancelled],
		},
		// Ready appears here for the rejected/expired offer revert path.
		Assigned => &StatusMeta {
			label: "assigned",
			color: "#0ea5e9",
			next: &[PickedUp, Ready, Cancelled],
		},
		PickedUp => &StatusMeta {
			label: "picked_up",
			color: "#14b8a6",
			next: &[Delivered, Cancelled],
		},
		Delivered => &StatusMeta {
			label: "delivered",
			color: "#22c55e",
			next: &[],
		},
		Cancelled => &StatusMeta {
			label: "cancelled",
			color: "#ef4444",
			next: &[],
		},
	}
}

/// Payment state of an order, independent of the delivery lifecycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
	Unpaid,
	Paid,
}

/// How the customer pays for an order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
	CashOnDelivery,
	Online,
}

/// A single ordered item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LineItem {
	/// Product name as shown to the customer.
	pub name: String,
	pub quantity: u32,
	pub unit_price: Decimal,
	/// Optional preparation note ("no onions").
	#[serde(skip_serializing_if = "Option::is_none")]
	pub note: Option<String>,
}

impl LineItem {
	/// Price of this line: quantity times unit price.
	pub fn line_total(&self) -> Decimal {
		self.unit_price * Decimal::from(self.quantity)
	}
}

/// Customer details copied into the order at creation time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CustomerSnapshot {
	pub id: String,
	pub name: String,
	pub phone: String,
	pub address: String,
}

/// Shop details copied into the order at creation time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShopSnapshot {
	pub id: String,
	pub name: String,
}

/// Input for creating a new order.
///
/// Everything the engine needs to snapshot an order into storage; the
/// computed total and lifecycle fields are filled in by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDraft {
	pub customer: CustomerSnapshot,
	pub shop: ShopSnapshot,
	pub items: Vec<LineItem>,
	pub delivery_charge: Decimal,
	pub commission: Decimal,
	pub payment_method: PaymentMethod,
}

/// A customer order moving through preparation and delivery.
///
/// Mutated only through engine operations; never deleted, only terminated
/// by reaching `Delivered` or `Cancelled`. Each stage timestamp is set iff
/// the order has passed through the corresponding state on its current path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
	/// Unique identifier for this order.
	pub id: String,
	/// Short human-readable order number shown on receipts.
	pub order_no: String,
	pub customer: CustomerSnapshot,
	pub shop: ShopSnapshot,
	pub items: Vec<LineItem>,
	/// Item total plus delivery charge.
	pub total: Decimal,
	pub delivery_charge: Decimal,
	/// Commission owed by the platform to the shop.
	pub commission: Decimal,
	pub payment_status: PaymentStatus,
	pub payment_method: PaymentMethod,
	/// Current lifecycle status.
	pub status: OrderStatus,
	/// Reason supplied when the order was cancelled.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub cancel_reason: Option<String>,
	/// Id of the unresponded dispatch offer, if one exists.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub pending_assignment_id: Option<String>,
	/// Agent bound to the order after an accepted assignment.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub agent_id: Option<String>,
	/// Number of dispatch offers made for this order.
	#[serde(default)]
	pub dispatch_attempts: u32,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub prepared_at: Option<DateTime<Utc>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub ready_at: Option<DateTime<Utc>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub assigned_at: Option<DateTime<Utc>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub picked_up_at: Option<DateTime<Utc>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub delivered_at: Option<DateTime<Utc>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub cancelled_at: Option<DateTime<Utc>>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

impl Order {
	/// Sum of all line totals, excluding the delivery charge.
	pub fn items_total(&self) -> Decimal {
		self.items.iter().map(LineItem::line_total).sum()
	}

	/// Stage timestamps that are currently set, in lifecycle order.
	///
	/// Used to check the prefix property: the set timestamps must match
	/// exactly the stages the order has reached.
	pub fn stage_timestamps(&self) -> Vec<(OrderStatus, DateTime<Utc>)> {
		[
			(OrderStatus::Prepared, self.prepared_at),
			(OrderStatus::Ready, self.ready_at),
			(OrderStatus::Assigned, self.assigned_at),
			(OrderStatus::PickedUp, self.picked_up_at),
			(OrderStatus::Delivered, self.delivered_at),
		]
		.into_iter()
		.filter_map(|(status, ts)| ts.map(|ts| (status, ts)))
		.collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rust_decimal::prelude::FromPrimitive;

	#[test]
	fn line_total_multiplies_quantity() {
		let item = LineItem {
			name: "Samosa".into(),
			quantity: 3,
			unit_price: Decimal::from_f64(12.5).unwrap(),
			note: None,
		};
		assert_eq!(item.line_total(), Decimal::from_f64(37.5).unwrap());
	}

	#[test]
	fn metadata_marks_terminals() {
		for status in OrderStatus::all() {
			assert_eq!(status.is_terminal(), status.meta().next.is_empty());
		}
	}

	#[test]
	fn status_serializes_snake_case() {
		let json = serde_json::to_string(&OrderStatus::PickedUp).unwrap();
		assert_eq!(json, "\"picked_up\"");
	}
}
