//! Read-optimized projection of engine state.
//!
//! Dashboards and trackers read from this projection instead of polling
//! raw order rows. The engine refreshes it inside the commit path, right
//! after persistence succeeds, so reads are lock-free and at most one
//! commit behind. Each portal gets its own filtered view: the kitchen
//! sees its shop's open orders, an agent sees orders bound to them, a
//! customer sees their own orders.

use courier_types::{EventRecord, Order, OrderStatus};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::Serialize;

/// Denormalized order summary served to dashboards.
#[derive(Debug, Clone, Serialize)]
pub struct OrderView {
	pub id: String,
	pub order_no: String,
	pub shop_id: String,
	pub customer_id: String,
	/// Agent bound to the order, once an offer is accepted.
	pub agent_id: Option<String>,
	/// Agent holding the unresponded offer, if any.
	pub pending_assignment_id: Option<String>,
	pub status: OrderStatus,
	/// Display label from the status metadata table.
	pub status_label: &'static str,
	/// Badge color from the status metadata table.
	pub status_color: &'static str,
	pub total: Decimal,
	pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<&Order> for OrderView {
	fn from(order: &Order) -> Self {
		let meta = order.status.meta();
		Self {
			id: order.id.clone(),
			order_no: order.order_no.clone(),
			shop_id: order.shop.id.clone(),
			customer_id: order.customer.id.clone(),
			agent_id: order.agent_id.clone(),
			pending_assignment_id: order.pending_assignment_id.clone(),
			status: order.status,
			status_label: meta.label,
			status_color: meta.color,
			total: order.total,
			updated_at: order.updated_at,
		}
	}
}

/// In-memory read model refreshed after every committed transition.
#[derive(Default)]
pub struct ProjectionState {
	orders: DashMap<String, OrderView>,
	history: DashMap<String, Vec<EventRecord>>,
}

impl ProjectionState {
	pub fn new() -> Self {
		Self::default()
	}

	/// Refreshes the view of one order after a committed transition.
	pub fn apply_order(&self, order: &Order) {
		self.orders.insert(order.id.clone(), OrderView::from(order));
	}

	/// Appends an event to the order's history.
	pub fn record_event(&self, event: &EventRecord) {
		self.history
			.entry(event.order_id.clone())
			.or_default()
			.push(event.clone());
	}

	/// Current view of a single order.
	pub fn get(&self, order_id: &str) -> Option<OrderView> {
		self.orders.get(order_id).map(|v| v.clone())
	}

	/// Event history of a single order, oldest first.
	pub fn history(&self, order_id: &str) -> Vec<EventRecord> {
		self.history
			.get(order_id)
			.map(|h| h.clone())
			.unwrap_or_default()
	}

	/// Kitchen view: a shop's orders still in the pipeline.
	pub fn open_orders_for_shop(&self, shop_id: &str) -> Vec<OrderView> {
		self.filter(|v| v.shop_id == shop_id && !v.status.is_terminal())
	}

	/// Dispatch view: orders waiting for an offer or a response.
	pub fn dispatchable_orders(&self) -> Vec<OrderView> {
		self.filter(|v| {
			v.status == OrderStatus::Ready
				|| (v.status == OrderStatus::Assigned && v.agent_id.is_none())
		})
	}

	/// Agent view: orders currently bound to the given agent.
	pub fn orders_for_agent(&self, agent_id: &str) -> Vec<OrderView> {
		self.filter(|v| {
			v.agent_id.as_deref() == Some(agent_id) && !v.status.is_terminal()
		})
	}

	/// Customer view: all of a customer's orders, including finished ones.
	pub fn orders_for_customer(&self, customer_id: &str) -> Vec<OrderView> {
		self.filter(|v| v.customer_id == customer_id)
	}

	/// Admin view: orders in a given status.
	pub fn orders_with_status(&self, status: OrderStatus) -> Vec<OrderView> {
		self.filter(|v| v.status == status)
	}

	fn filter(&self, predicate: impl Fn(&OrderView) -> bool) -> Vec<OrderView> {
		let mut views: Vec<OrderView> = self
			.orders
			.iter()
			.filter(|entry| predicate(entry.value()))
			.map(|entry| entry.value().clone())
			.collect();
		views.sort_by(|a, b| a.updated_at.cmp(&b.updated_at));
		views
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use courier_types::{
		Actor, CustomerSnapshot, EventKind, LineItem, PaymentMethod, PaymentStatus,
		ShopSnapshot,
	};

	fn order(id: &str, shop: &str, customer: &str, status: OrderStatus) -> Order {
		let now = chrono::Utc::now();
		Order {
			id: id.into(),
			order_no: format!("ORD-{}", id),
			customer: CustomerSnapshot {
				id: customer.into(),
				name: "Asha".into(),
				phone: "111".into(),
				address: "12 Hill Rd".into(),
			},
			shop: ShopSnapshot {
				id: shop.into(),
				name: "Green Grocer".into(),
			},
			items: vec![LineItem {
				name: "Rice".into(),
				quantity: 1,
				unit_price: Decimal::new(100, 0),
				note: None,
			}],
			total: Decimal::new(100, 0),
			delivery_charge: Decimal::ZERO,
			commission: Decimal::ZERO,
			payment_status: PaymentStatus::Unpaid,
			payment_method: PaymentMethod::CashOnDelivery,
			status,
			cancel_reason: None,
			pending_assignment_id: None,
			agent_id: None,
			dispatch_attempts: 0,
			prepared_at: None,
			ready_at: None,
			assigned_at: None,
			picked_up_at: None,
			delivered_at: None,
			cancelled_at: None,
			created_at: now,
			updated_at: now,
		}
	}

	#[test]
	fn views_are_filtered_per_actor() {
		let projection = ProjectionState::new();
		projection.apply_order(&order("o1", "s1", "c1", OrderStatus::Preparing));
		projection.apply_order(&order("o2", "s1", "c2", OrderStatus::Delivered));
		projection.apply_order(&order("o3", "s2", "c1", OrderStatus::Ready));

		let kitchen = projection.open_orders_for_shop("s1");
		assert_eq!(kitchen.len(), 1);
		assert_eq!(kitchen[0].id, "o1");

		let customer = projection.orders_for_customer("c1");
		assert_eq!(customer.len(), 2);

		let dispatch = projection.dispatchable_orders();
		assert_eq!(dispatch.len(), 1);
		assert_eq!(dispatch[0].id, "o3");
	}

	#[test]
	fn agent_view_requires_binding() {
		let projection = ProjectionState::new();
		let mut bound = order("o1", "s1", "c1", OrderStatus::Assigned);
		bound.agent_id = Some("a1".into());
		projection.apply_order(&bound);

		let mut offered = order("o2", "s1", "c1", OrderStatus::Assigned);
		offered.pending_assignment_id = Some("as-1".into());
		projection.apply_order(&offered);

		assert_eq!(projection.orders_for_agent("a1").len(), 1);
		// The unaccepted offer shows up for dispatch, not for the agent
		assert_eq!(projection.dispatchable_orders().len(), 1);
	}

	#[test]
	fn history_is_appended_in_order() {
		let projection = ProjectionState::new();
		for kind in [
			EventKind::OrderSubmitted,
			EventKind::StatusChanged {
				from: OrderStatus::Pending,
				to: OrderStatus::Preparing,
			},
		] {
			projection.record_event(&EventRecord::new(
				"o1",
				kind,
				Actor::Shop,
				serde_json::Value::Null,
			));
		}
		let history = projection.history("o1");
		assert_eq!(history.len(), 2);
		assert_eq!(history[0].kind, EventKind::OrderSubmitted);
	}
}
