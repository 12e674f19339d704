//! API types for HTTP endpoints and request/response structures.
//!
//! Wire-facing structs use camelCase field names; query parameters keep
//! the short names the audit dashboard sends (`q`, `action`, `from`,
//! `to`, `page`, `page_size`).

use crate::{AuditAction, Customer, LineItem, OrderStatus, ReleaseType};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Body of `POST /api/orders/{id}/transitions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRequest {
	/// The requested action's wire code, e.g. "PAYMENT_CONFIRMED".
	pub action: AuditAction,
	/// Authenticated principal to resolve into an actor. Absent for
	/// gateway callbacks, which are attributed to the system actor.
	#[serde(rename = "actorId", skip_serializing_if = "Option::is_none")]
	pub actor_id: Option<String>,
	/// Context recorded verbatim on the audit event.
	#[serde(default)]
	pub metadata: HashMap<String, serde_json::Value>,
	/// Gateway transaction id used to deduplicate redelivered webhooks.
	#[serde(rename = "idempotencyKey", skip_serializing_if = "Option::is_none")]
	pub idempotency_key: Option<String>,
}

/// Response to a transition request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionResponse {
	/// The order the transition was applied to.
	#[serde(rename = "orderId")]
	pub order_id: String,
	/// The order's status after the request.
	pub status: OrderStatus,
	/// Id of the appended audit event. Absent when the request was an
	/// idempotent replay that appended nothing.
	#[serde(rename = "eventId", skip_serializing_if = "Option::is_none")]
	pub event_id: Option<u64>,
}

/// Body of `POST /api/orders`, the external ordering flow's entry point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderRequest {
	/// Human-readable order code.
	pub reference: String,
	/// The ordering customer.
	pub customer: Customer,
	/// Total price of the order.
	#[serde(rename = "totalPrice")]
	pub total_price: Decimal,
	/// Ordered products.
	#[serde(rename = "lineItems", default)]
	pub line_items: Vec<LineItem>,
	/// How the order leaves the depot.
	#[serde(rename = "releaseType")]
	pub release_type: ReleaseType,
}

/// Query parameters accepted by the audit search and summary endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditSearchParams {
	/// Free-text filter matched against order id, reference, customer
	/// name/email, product names, and recorded actor emails.
	pub q: Option<String>,
	/// Restrict to orders having at least one event with this action.
	pub action: Option<AuditAction>,
	/// Start of the UTC day range (inclusive), applied to event timestamps.
	pub from: Option<NaiveDate>,
	/// End of the UTC day range (inclusive), applied to event timestamps.
	pub to: Option<NaiveDate>,
	/// 1-based page number.
	pub page: Option<usize>,
	/// Page size.
	pub page_size: Option<usize>,
}

/// One row in an audit search result page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAuditSummary {
	/// Order id.
	pub id: String,
	/// Human-readable order code.
	pub reference: String,
	/// Current order status.
	pub status: OrderStatus,
	/// When the order was created.
	#[serde(rename = "createdAt")]
	pub created_at: DateTime<Utc>,
	/// The ordering customer.
	pub customer: Customer,
	/// Total price of the order.
	#[serde(rename = "totalPrice")]
	pub total_price: Decimal,
	/// How the order leaves the depot.
	#[serde(rename = "releaseType")]
	pub release_type: ReleaseType,
	/// Who confirmed payment, if anyone has.
	#[serde(rename = "paymentActor", skip_serializing_if = "Option::is_none")]
	pub payment_actor: Option<String>,
	/// Who released the order, if anyone has.
	#[serde(rename = "releaseActor", skip_serializing_if = "Option::is_none")]
	pub release_actor: Option<String>,
	/// Who recorded the truck exit, if anyone has.
	#[serde(rename = "truckExitActor", skip_serializing_if = "Option::is_none")]
	pub truck_exit_actor: Option<String>,
	/// Number of audit events recorded for the order.
	#[serde(rename = "eventCount")]
	pub event_count: usize,
}

/// Response of the audit search endpoint: one page plus the size of the
/// full filtered set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditSearchResponse {
	/// Total number of orders matching the filters, independent of the
	/// page returned.
	pub count: usize,
	/// The requested page, ordered by order creation time descending.
	pub results: Vec<OrderAuditSummary>,
}

/// Aggregate counters over a set of audited orders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditTotals {
	/// Orders with at least one payment event.
	#[serde(rename = "withPaymentActor")]
	pub with_payment_actor: usize,
	/// Orders with a release event.
	#[serde(rename = "withReleaseActor")]
	pub with_release_actor: usize,
	/// Orders with a recorded truck exit.
	#[serde(rename = "withTruckExit")]
	pub with_truck_exit: usize,
}

impl AuditTotals {
	/// Counts over one materialized page only.
	///
	/// Dataset-wide totals come from the query service's aggregate
	/// operation; this helper exists for callers that explicitly want the
	/// visible page, and is named so the difference cannot be missed.
	pub fn for_page(page: &[OrderAuditSummary]) -> Self {
		Self {
			with_payment_actor: page.iter().filter(|o| o.payment_actor.is_some()).count(),
			with_release_actor: page.iter().filter(|o| o.release_actor.is_some()).count(),
			with_truck_exit: page.iter().filter(|o| o.truck_exit_actor.is_some()).count(),
		}
	}
}

/// Error payload returned by the HTTP API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
	/// Machine-readable error code, e.g. "ILLEGAL_TRANSITION".
	pub error: String,
	/// Human-readable description.
	pub message: String,
	/// Seconds after which the request may be retried, for busy responses.
	#[serde(rename = "retryAfter", skip_serializing_if = "Option::is_none")]
	pub retry_after: Option<u64>,
}
