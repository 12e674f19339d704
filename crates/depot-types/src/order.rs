//! Order types for the depot lifecycle system.
//!
//! This module defines the order record tracked through payment, release,
//! and dispatch, together with the closed status enumeration that the
//! state machine moves it through.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A customer order tracked through its lifecycle.
///
/// Orders are created once in `Pending` status by the external ordering
/// flow and are mutated exclusively through state machine transitions.
/// They are never physically deleted; canceled and released orders remain
/// queryable indefinitely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
	/// Unique identifier for this order.
	pub id: String,
	/// Human-readable order code, immutable once assigned.
	pub reference: String,
	/// Current status of the order.
	pub status: OrderStatus,
	/// Timestamp when this order was created. Origin of the auto-cancel timer.
	pub created_at: DateTime<Utc>,
	/// Timestamp when this order was last updated.
	pub updated_at: DateTime<Utc>,
	/// Record version. Every persisted write is a compare-and-swap against
	/// the previously read record, so concurrent writers are detected.
	pub version: u64,
	/// The customer who placed the order.
	pub customer: Customer,
	/// Total price of the order.
	pub total_price: Decimal,
	/// Ordered products. Not consulted by transition logic, but carried
	/// for audit metadata and free-text search.
	#[serde(default)]
	pub line_items: Vec<LineItem>,
	/// How the order leaves the depot.
	pub release_type: ReleaseType,
}

/// The customer that placed an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
	/// Customer display name.
	pub name: String,
	/// Customer contact email.
	pub email: String,
}

/// A single product line on an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
	/// Product name, e.g. "Diesel B7".
	pub product: String,
	/// Ordered quantity in the product's unit.
	pub quantity: Decimal,
	/// Price per unit.
	pub unit_price: Decimal,
}

/// How a released order leaves the depot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ReleaseType {
	/// The depot delivers to the customer.
	Delivery,
	/// The customer collects with their own truck.
	Pickup,
}

/// Status of an order in the lifecycle system.
///
/// `Pending` is the initial status; the other three are terminal with
/// respect to further status changes. A `Released` order may still
/// receive event-only records such as a truck exit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum OrderStatus {
	/// Order has been placed but payment is outstanding.
	Pending,
	/// Payment has been confirmed.
	Paid,
	/// The order has been released for dispatch.
	Released,
	/// The order was canceled, manually or by the stale-order sweep.
	Canceled,
}

impl OrderStatus {
	/// Whether the status accepts any further status change.
	pub fn is_terminal(&self) -> bool {
		!matches!(self, OrderStatus::Pending | OrderStatus::Paid)
	}
}

impl fmt::Display for OrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			OrderStatus::Pending => write!(f, "Pending"),
			OrderStatus::Paid => write!(f, "Paid"),
			OrderStatus::Released => write!(f, "Released"),
			OrderStatus::Canceled => write!(f, "Canceled"),
		}
	}
}

impl fmt::Display for ReleaseType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ReleaseType::Delivery => write!(f, "Delivery"),
			ReleaseType::Pickup => write!(f, "Pickup"),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_status_terminality() {
		assert!(!OrderStatus::Pending.is_terminal());
		assert!(!OrderStatus::Paid.is_terminal());
		assert!(OrderStatus::Released.is_terminal());
		assert!(OrderStatus::Canceled.is_terminal());
	}

	#[test]
	fn test_status_serde_wire_names() {
		let json = serde_json::to_string(&OrderStatus::Pending).unwrap();
		assert_eq!(json, "\"pending\"");
		let status: OrderStatus = serde_json::from_str("\"canceled\"").unwrap();
		assert_eq!(status, OrderStatus::Canceled);
	}
}
