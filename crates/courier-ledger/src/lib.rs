//! Commission and delivery charge ledger for the courier engine.
//!
//! Ledger entries are created when an order is delivered, one per
//! (order, payment type) pair. The record id doubles as an idempotency
//! key, so replaying a delivery after a partial failure never produces
//! duplicates. A backfill sweep repairs gaps left by orders delivered
//! before ledger writes became part of the delivery transition.

use courier_storage::{StorageError, StorageService};
use courier_types::{
	truncate_id, Order, OrderStatus, PaymentRecord, PaymentType, StorageKey,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
	/// Error from the storage backend.
	#[error("Storage error: {0}")]
	Storage(String),
	/// Error that occurs when a ledger entry is not found.
	#[error("Payment record not found: {0}")]
	RecordNotFound(String),
}

// NotFound is mapped to RecordNotFound at the call sites that know the
// record id; the blanket conversion covers backend failures only.
impl From<StorageError> for LedgerError {
	fn from(err: StorageError) -> Self {
		LedgerError::Storage(err.to_string())
	}
}

/// Service that owns all ledger writes.
pub struct LedgerService {
	storage: Arc<StorageService>,
}

impl LedgerService {
	/// Creates a new LedgerService backed by the given storage.
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}

	/// Creates the ledger entries owed for a delivered order.
	///
	/// One entry per nonzero charge type; entries that already exist are
	/// left untouched, so the call is safe to repeat. Returns the records
	/// actually created by this call.
	pub async fn record_delivery(&self, order: &Order) -> Result<Vec<PaymentRecord>, LedgerError> {
		let mut created = Vec::new();
		for (record_type, amount) in [
			(PaymentType::Commission, order.commission),
			(PaymentType::DeliveryCharge, order.delivery_charge),
		] {
			if amount == Decimal::ZERO {
				continue;
			}
			let key = PaymentRecord::key(&order.id, record_type);
			if self
				.storage
				.exists(StorageKey::PaymentRecords.as_str(), &key)
				.await?
			{
				tracing::debug!(
					order_id = %truncate_id(&order.id),
					record_type = %record_type,
					"Ledger entry already present, skipping"
				);
				continue;
			}
			let record = PaymentRecord::new(&order.id, &order.shop.name, amount, record_type);
			self.storage
				.store(StorageKey::PaymentRecords.as_str(), &record.id, &record)
				.await?;
			created.push(record);
		}
		Ok(created)
	}

	/// Repairs ledger gaps for orders delivered before entries were
	/// written at delivery time.
	///
	/// Scans every stored order and creates the entries that are missing
	/// for delivered ones. Returns the number of records created.
	pub async fn backfill(&self) -> Result<usize, LedgerError> {
		let orders: Vec<Order> = self
			.storage
			.retrieve_all(StorageKey::Orders.as_str())
			.await?;

		let mut repaired = 0;
		for order in orders
			.iter()
			.filter(|o| o.status == OrderStatus::Delivered)
		{
			let created = self.record_delivery(order).await?;
			if !created.is_empty() {
				tracing::info!(
					order_id = %truncate_id(&order.id),
					count = created.len(),
					"Backfilled missing ledger entries"
				);
				repaired += created.len();
			}
		}
		Ok(repaired)
	}

	/// Marks a ledger entry as paid out.
	pub async fn mark_paid(&self, record_id: &str, paid_by: &str) -> Result<PaymentRecord, LedgerError> {
		let mut record: PaymentRecord = self
			.storage
			.retrieve(StorageKey::PaymentRecords.as_str(), record_id)
			.await
			.map_err(|e| match e {
				StorageError::NotFound => LedgerError::RecordNotFound(record_id.to_string()),
				other => LedgerError::Storage(other.to_string()),
			})?;

		record.status = courier_types::PaymentRecordStatus::Paid;
		record.paid_by = Some(paid_by.to_string());
		record.paid_at = Some(chrono::Utc::now());

		self.storage
			.update(StorageKey::PaymentRecords.as_str(), record_id, &record)
			.await?;
		Ok(record)
	}

	/// Returns every ledger entry, for the finance view.
	pub async fn all_records(&self) -> Result<Vec<PaymentRecord>, LedgerError> {
		Ok(self
			.storage
			.retrieve_all(StorageKey::PaymentRecords.as_str())
			.await?)
	}

	/// Returns the ledger entries for a single shop.
	pub async fn records_for_shop(&self, shop_name: &str) -> Result<Vec<PaymentRecord>, LedgerError> {
		let mut records = self.all_records().await?;
		records.retain(|r| r.shop_name == shop_name);
		Ok(records)
	}
}
