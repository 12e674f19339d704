//! Audit event types for the append-only trail.
//!
//! Every successful state machine transition appends exactly one audit
//! event. Events are immutable once written; corrections are recorded as
//! new events, never as retroactive edits.

use crate::Actor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Closed enumeration of auditable actions.
///
/// The wire codes match the values stored in the audit log and accepted
/// by the transition API. Keeping the enumeration closed gives the
/// transition table exhaustiveness checking.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AuditAction {
	/// An operator confirmed payment manually.
	#[serde(rename = "PAYMENT_CONFIRMED")]
	PaymentConfirmed,
	/// The payment gateway confirmed payment via callback.
	#[serde(rename = "PAYMENT_WEBHOOK_CONFIRMED")]
	PaymentWebhookConfirmed,
	/// The order was released for dispatch.
	#[serde(rename = "ORDER_RELEASED")]
	OrderReleased,
	/// A loaded truck left the depot for this order.
	#[serde(rename = "TRUCK_EXIT_RECORDED")]
	TruckExitRecorded,
	/// The security checkpoint cleared the truck.
	#[serde(rename = "SECURITY_EXIT")]
	SecurityExit,
	/// An operator canceled the order.
	#[serde(rename = "ORDER_CANCELED")]
	OrderCanceled,
	/// The sweeper canceled a stale unpaid order.
	#[serde(rename = "AUTO_CANCELED")]
	AutoCanceled,
	/// A status was corrected by an internal consistency fixup.
	#[serde(rename = "ORDER_STATUS_CHANGED")]
	OrderStatusChanged,
	/// Order fields not affecting status were edited.
	#[serde(rename = "ORDER_UPDATED")]
	OrderUpdated,
}

impl AuditAction {
	/// Returns the wire code for this action.
	pub fn as_str(&self) -> &'static str {
		match self {
			AuditAction::PaymentConfirmed => "PAYMENT_CONFIRMED",
			AuditAction::PaymentWebhookConfirmed => "PAYMENT_WEBHOOK_CONFIRMED",
			AuditAction::OrderReleased => "ORDER_RELEASED",
			AuditAction::TruckExitRecorded => "TRUCK_EXIT_RECORDED",
			AuditAction::SecurityExit => "SECURITY_EXIT",
			AuditAction::OrderCanceled => "ORDER_CANCELED",
			AuditAction::AutoCanceled => "AUTO_CANCELED",
			AuditAction::OrderStatusChanged => "ORDER_STATUS_CHANGED",
			AuditAction::OrderUpdated => "ORDER_UPDATED",
		}
	}

	/// Returns an iterator over all action variants.
	pub fn all() -> impl Iterator<Item = Self> {
		[
			Self::PaymentConfirmed,
			Self::PaymentWebhookConfirmed,
			Self::OrderReleased,
			Self::TruckExitRecorded,
			Self::SecurityExit,
			Self::OrderCanceled,
			Self::AutoCanceled,
			Self::OrderStatusChanged,
			Self::OrderUpdated,
		]
		.into_iter()
	}
}

impl FromStr for AuditAction {
	type Err = UnknownActionError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::all()
			.find(|action| action.as_str() == s)
			.ok_or_else(|| UnknownActionError(s.to_string()))
	}
}

impl fmt::Display for AuditAction {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Error returned when parsing an unrecognized action code.
#[derive(Debug, thiserror::Error)]
#[error("Unknown audit action: {0}")]
pub struct UnknownActionError(pub String);

/// One immutable entry in an order's audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
	/// Monotonically assigned, unique event id.
	pub id: u64,
	/// The order this event describes.
	pub order_id: String,
	/// What happened.
	pub action: AuditAction,
	/// When the transition was recorded.
	pub timestamp: DateTime<Utc>,
	/// Who was responsible.
	pub actor: Actor,
	/// Open context mapping, e.g. payment reference or truck number.
	/// No schema is enforced on these fields.
	#[serde(default)]
	pub metadata: HashMap<String, serde_json::Value>,
}

/// An audit event before the log has assigned it an id.
#[derive(Debug, Clone)]
pub struct NewAuditEvent {
	/// The order the event describes.
	pub order_id: String,
	/// What happened.
	pub action: AuditAction,
	/// When the transition was recorded.
	pub timestamp: DateTime<Utc>,
	/// Who was responsible.
	pub actor: Actor,
	/// Open context mapping.
	pub metadata: HashMap<String, serde_json::Value>,
}
