//! Order endpoints: creation and transition requests.
//!
//! Manual UI actions and the payment-webhook receiver both call the
//! transition endpoint; the webhook receiver is expected to have verified
//! gateway authenticity before calling. Actor attribution: webhook
//! confirmations run as the system actor, every other action must carry a
//! principal the operator directory can resolve.

use crate::apis::ApiError;
use crate::server::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use depot_core::{NewOrder, TransitionCommand};
use depot_types::{
	Actor, AuditAction, CreateOrderRequest, Order, TransitionRequest, TransitionResponse,
};
use uuid::Uuid;

/// Handles POST /api/orders requests.
///
/// Seeds a new pending order; this is the entry point used by the
/// external ordering flow.
pub async fn create_order(
	State(state): State<AppState>,
	Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
	let order = state
		.engine
		.create_order(NewOrder {
			id: Uuid::new_v4().to_string(),
			reference: request.reference,
			customer: request.customer,
			total_price: request.total_price,
			line_items: request.line_items,
			release_type: request.release_type,
		})
		.await?;

	tracing::info!(order_id = %order.id, reference = %order.reference, "Created order");
	Ok((StatusCode::CREATED, Json(order)))
}

/// Handles GET /api/orders/{id} requests.
pub async fn get_order(
	Path(id): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<Order>, ApiError> {
	let order = state.engine.get_order(&id).await?;
	Ok(Json(order))
}

/// Handles POST /api/orders/{id}/transitions requests.
pub async fn request_transition(
	Path(id): Path<String>,
	State(state): State<AppState>,
	Json(request): Json<TransitionRequest>,
) -> Result<Json<TransitionResponse>, ApiError> {
	let actor = resolve_actor(&state, &request)?;

	let mut command = TransitionCommand::new(request.action, actor)
		.with_metadata(request.metadata);
	if let Some(key) = request.idempotency_key {
		command = command.with_idempotency_key(key);
	}

	let outcome = state.engine.request_transition(&id, command).await?;

	Ok(Json(TransitionResponse {
		order_id: id,
		status: outcome.status(),
		event_id: outcome.event_id(),
	}))
}

/// Maps the request's principal to the actor recorded on the event.
fn resolve_actor(state: &AppState, request: &TransitionRequest) -> Result<Actor, ApiError> {
	// Gateway callbacks carry no operator identity.
	if request.action == AuditAction::PaymentWebhookConfirmed {
		return Ok(Actor::System);
	}

	let Some(principal) = &request.actor_id else {
		return Err(ApiError::new(
			StatusCode::BAD_REQUEST,
			"MISSING_ACTOR",
			format!("Action {} requires an actorId", request.action),
		));
	};

	state.resolver.resolve(principal).ok_or_else(|| {
		ApiError::new(
			StatusCode::FORBIDDEN,
			"UNKNOWN_ACTOR",
			format!("Principal '{}' is not a known operator", principal),
		)
	})
}
