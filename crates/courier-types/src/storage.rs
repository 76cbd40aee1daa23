//! Storage namespace keys for the engine's persistent data.

use std::str::FromStr;

/// Storage namespaces for the different data collections.
///
/// Replaces string literals with strongly typed variants for storage
/// operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// Namespace for order records.
	Orders,
	/// Namespace for dispatch assignments.
	Assignments,
	/// Namespace mapping an order id to the ids of all its assignments.
	OrderAssignments,
	/// Namespace for commission / delivery charge ledger entries.
	PaymentRecords,
}

impl StorageKey {
	/// Returns the string representation of the storage key.
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::Orders => "orders",
			StorageKey::Assignments => "assignments",
			StorageKey::OrderAssignments => "order_assignments",
			StorageKey::PaymentRecords => "payment_records",
		}
	}

	/// Returns an iterator over all StorageKey variants.
	pub fn all() -> impl Iterator<Item = Self> {
		[
			Self::Orders,
			Self::Assignments,
			Self::OrderAssignments,
			Self::PaymentRecords,
		]
		.into_iter()
	}
}

impl FromStr for StorageKey {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"orders" => Ok(Self::Orders),
			"assignments" => Ok(Self::Assignments),
			"order_assignments" => Ok(Self::OrderAssignments),
			"payment_records" => Ok(Self::PaymentRecords),
			_ => Err(()),
		}
	}
}

impl From<StorageKey> for &'static str {
	fn from(key: StorageKey) -> Self {
		key.as_str()
	}
}
