//! HTTP API handlers for the depot service.

pub mod audit;
pub mod orders;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use depot_audit::AuditError;
use depot_core::TransitionError;
use depot_types::ErrorResponse;

/// Seconds a caller should wait before retrying a busy transition.
const BUSY_RETRY_AFTER_SECS: u64 = 1;

/// An API error carrying the HTTP status and wire payload.
#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	body: ErrorResponse,
}

impl ApiError {
	pub fn new(status: StatusCode, error: &str, message: impl Into<String>) -> Self {
		Self {
			status,
			body: ErrorResponse {
				error: error.to_string(),
				message: message.into(),
				retry_after: None,
			},
		}
	}

	fn with_retry_after(mut self, seconds: u64) -> Self {
		self.body.retry_after = Some(seconds);
		self
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		(self.status, Json(self.body)).into_response()
	}
}

impl From<TransitionError> for ApiError {
	fn from(err: TransitionError) -> Self {
		let message = err.to_string();
		match err {
			TransitionError::UnknownOrder(_) => {
				ApiError::new(StatusCode::NOT_FOUND, "ORDER_NOT_FOUND", message)
			},
			TransitionError::DuplicateOrder(_) => {
				ApiError::new(StatusCode::CONFLICT, "ORDER_EXISTS", message)
			},
			TransitionError::IllegalTransition { .. } => {
				ApiError::new(StatusCode::CONFLICT, "ILLEGAL_TRANSITION", message)
			},
			TransitionError::Busy(_) => {
				ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "ORDER_BUSY", message)
					.with_retry_after(BUSY_RETRY_AFTER_SECS)
			},
			TransitionError::Storage(_) => {
				ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR", message)
			},
		}
	}
}

impl From<AuditError> for ApiError {
	fn from(err: AuditError) -> Self {
		let message = err.to_string();
		match err {
			AuditError::UnknownOrder(_) => {
				ApiError::new(StatusCode::NOT_FOUND, "ORDER_NOT_FOUND", message)
			},
			AuditError::Storage(_) => {
				ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR", message)
			},
		}
	}
}
