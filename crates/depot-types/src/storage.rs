//! Storage-related types for the depot lifecycle system.

use std::str::FromStr;

/// Storage tables for the different data collections.
///
/// This enum provides type safety for storage operations by replacing
/// string literals with strongly typed variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageTable {
	/// Table for order records.
	Orders,
	/// Table for audit events.
	AuditEvents,
	/// Table holding the audit log's id sequence counter.
	AuditSequence,
	/// Table mapping webhook idempotency keys to applied event ids.
	WebhookKeys,
}

impl StorageTable {
	/// Returns the string representation of the storage table.
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageTable::Orders => "orders",
			StorageTable::AuditEvents => "audit_events",
			StorageTable::AuditSequence => "audit_seq",
			StorageTable::WebhookKeys => "webhook_keys",
		}
	}

	/// Returns an iterator over all StorageTable variants.
	pub fn all() -> impl Iterator<Item = Self> {
		[
			Self::Orders,
			Self::AuditEvents,
			Self::AuditSequence,
			Self::WebhookKeys,
		]
		.into_iter()
	}
}

impl FromStr for StorageTable {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"orders" => Ok(Self::Orders),
			"audit_events" => Ok(Self::AuditEvents),
			"audit_seq" => Ok(Self::AuditSequence),
			"webhook_keys" => Ok(Self::WebhookKeys),
			_ => Err(()),
		}
	}
}

impl From<StorageTable> for &'static str {
	fn from(table: StorageTable) -> Self {
		table.as_str()
	}
}
