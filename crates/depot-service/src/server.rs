//! HTTP server for the depot lifecycle API.
//!
//! This module provides a minimal HTTP server infrastructure exposing
//! the transition and audit endpoints to the admin dashboard and the
//! payment-webhook receiver.

use crate::apis;
use axum::{
	routing::{get, post},
	Router,
};
use depot_config::ApiConfig;
use depot_core::LifecycleEngine;
use depot_types::ActorResolver;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

/// Shared application state for the API server.
#[derive(Clone)]
pub struct AppState {
	/// Reference to the lifecycle engine for processing requests.
	pub engine: Arc<LifecycleEngine>,
	/// Maps request principals to actor identities.
	pub resolver: Arc<dyn ActorResolver>,
}

/// Starts the HTTP server for the API.
///
/// This function creates and configures the HTTP server with routing,
/// middleware, and error handling for all endpoints.
pub async fn start_server(
	api_config: ApiConfig,
	engine: Arc<LifecycleEngine>,
	resolver: Arc<dyn ActorResolver>,
) -> Result<(), Box<dyn std::error::Error>> {
	let app_state = AppState { engine, resolver };

	let app = Router::new()
		.nest(
			"/api",
			Router::new()
				.route("/orders", post(apis::orders::create_order))
				.route("/orders/{id}", get(apis::orders::get_order))
				.route(
					"/orders/{id}/transitions",
					post(apis::orders::request_transition),
				)
				.route("/audit/orders", get(apis::audit::search_orders))
				.route(
					"/audit/orders/{id}/timeline",
					get(apis::audit::order_timeline),
				)
				.route("/audit/summary", get(apis::audit::audit_summary)),
		)
		.layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
		.with_state(app_state);

	let bind_address = format!("{}:{}", api_config.host, api_config.port);
	let listener = TcpListener::bind(&bind_address).await?;

	tracing::info!("Depot API server starting on {}", bind_address);

	axum::serve(listener, app).await?;

	Ok(())
}
