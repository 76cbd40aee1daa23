//! Commission and delivery charge ledger types.
//!
//! A payment record is a ledger entry owed by the platform to a shop,
//! derived from a delivered order. At most one record may exist per
//! (order, type) pair; the record id doubles as the idempotency key that
//! enforces this at write time.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a ledger entry is owed for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
	Commission,
	DeliveryCharge,
	Other,
}

impl PaymentType {
	pub fn as_str(&self) -> &'static str {
		match self {
			PaymentType::Commission => "commission",
			PaymentType::DeliveryCharge => "delivery_charge",
			PaymentType::Other => "other",
		}
	}
}

impl fmt::Display for PaymentType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Settlement state of a ledger entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentRecordStatus {
	Pending,
	Paid,
}

/// A ledger entry owed by the platform to a shop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRecord {
	/// Idempotency key: `{order_id}:{type}`.
	pub id: String,
	pub order_id: String,
	pub shop_name: String,
	pub amount: Decimal,
	#[serde(rename = "type")]
	pub record_type: PaymentType,
	pub status: PaymentRecordStatus,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub paid_by: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub paid_at: Option<DateTime<Utc>>,
	pub created_at: DateTime<Utc>,
}

impl PaymentRecord {
	/// The storage id for a given order and payment type.
	pub fn key(order_id: &str, record_type: PaymentType) -> String {
		format!("{}:{}", order_id, record_type)
	}

	/// Creates a new pending ledger entry for a delivered order.
	pub fn new(
		order_id: impl Into<String>,
		shop_name: impl Into<String>,
		amount: Decimal,
		record_type: PaymentType,
	) -> Self {
		let order_id = order_id.into();
		Self {
			id: Self::key(&order_id, record_type),
			order_id,
			shop_name: shop_name.into(),
			amount,
			record_type,
			status: PaymentRecordStatus::Pending,
			paid_by: None,
			paid_at: None,
			created_at: Utc::now(),
		}
	}
}
