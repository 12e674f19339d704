//! Audit endpoints: filtered search, per-order timeline, and summary
//! aggregates for the dashboard's history view.

use crate::apis::ApiError;
use crate::server::AppState;
use axum::extract::{Path, Query, State};
use axum::response::Json;
use depot_audit::AuditFilter;
use depot_types::{AuditEvent, AuditSearchParams, AuditSearchResponse, AuditTotals};

/// Handles GET /api/audit/orders requests.
///
/// Supports `q`, `action`, `from`/`to` (UTC days, inclusive), `page`,
/// and `page_size`; returns `{count, results}` where count covers the
/// full filtered set regardless of the page returned.
pub async fn search_orders(
	State(state): State<AppState>,
	Query(params): Query<AuditSearchParams>,
) -> Result<Json<AuditSearchResponse>, ApiError> {
	let response = state.engine.query().search_params(&params).await?;
	Ok(Json(response))
}

/// Handles GET /api/audit/orders/{id}/timeline requests.
///
/// Returns every event for one order, oldest first.
pub async fn order_timeline(
	Path(id): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<Vec<AuditEvent>>, ApiError> {
	let events = state.engine.query().timeline(&id).await?;
	Ok(Json(events))
}

/// Handles GET /api/audit/summary requests.
///
/// Computes dataset-wide totals over the full filtered set; the paging
/// parameters are ignored here on purpose.
pub async fn audit_summary(
	State(state): State<AppState>,
	Query(params): Query<AuditSearchParams>,
) -> Result<Json<AuditTotals>, ApiError> {
	let filter = AuditFilter::from(&params);
	let totals = state.engine.query().aggregate(&filter).await?;
	Ok(Json(totals))
}
