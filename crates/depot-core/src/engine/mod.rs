//! Core lifecycle engine that orchestrates orders and their audit trail.
//!
//! This module contains the main LifecycleEngine struct which wires the
//! state machine, sweeper, audit log, and query service over a shared
//! storage backend, and runs the main loop until shutdown.

pub mod event_bus;

use crate::state::{
	NewOrder, OrderStateMachine, TransitionCommand, TransitionError, TransitionOutcome,
};
use crate::sweeper::Sweeper;
use depot_audit::{AuditLog, AuditQueryService};
use depot_config::Config;
use depot_storage::StorageService;
use depot_types::{Clock, LifecycleEvent, Order};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Service error: {0}")]
	Service(String),
}

/// Main engine that owns the order lifecycle and audit trail.
///
/// The LifecycleEngine coordinates:
/// - State machine: validates and applies status transitions
/// - Sweeper: auto-cancels stale unpaid orders on a timer
/// - Audit log: the append-only record of every transition
/// - Query service: filtered searches, timelines, and aggregates
/// - Storage: persists orders and events
#[derive(Clone)]
pub struct LifecycleEngine {
	/// Engine configuration.
	config: Config,
	/// Storage service for persisting state.
	storage: Arc<StorageService>,
	/// Append-only audit log.
	audit_log: Arc<AuditLog>,
	/// Order state machine; the only writer of orders and events.
	state_machine: Arc<OrderStateMachine>,
	/// Read-only audit query service.
	query: Arc<AuditQueryService>,
	/// Stale-order sweeper.
	sweeper: Arc<Sweeper>,
	/// Event bus for lifecycle notifications.
	event_bus: event_bus::EventBus,
}

impl LifecycleEngine {
	/// Creates a new engine over the given storage backend and clock.
	pub fn new(config: Config, storage: Arc<StorageService>, clock: Arc<dyn Clock>) -> Self {
		let event_bus = event_bus::EventBus::default();
		let audit_log = Arc::new(AuditLog::new(storage.clone()));
		let state_machine = Arc::new(OrderStateMachine::new(
			storage.clone(),
			audit_log.clone(),
			clock.clone(),
			event_bus.clone(),
			Duration::from_millis(config.depot.lock_wait_ms),
		));
		let query = Arc::new(AuditQueryService::new(storage.clone(), audit_log.clone()));
		let sweeper = Arc::new(Sweeper::new(
			state_machine.clone(),
			storage.clone(),
			clock,
			event_bus.clone(),
			config.sweeper.clone(),
		));

		Self {
			config,
			storage,
			audit_log,
			state_machine,
			query,
			sweeper,
			event_bus,
		}
	}

	/// The engine's configuration.
	pub fn config(&self) -> &Config {
		&self.config
	}

	/// The shared storage service.
	pub fn storage(&self) -> &Arc<StorageService> {
		&self.storage
	}

	/// The append-only audit log.
	pub fn audit_log(&self) -> &Arc<AuditLog> {
		&self.audit_log
	}

	/// The read-only audit query service.
	pub fn query(&self) -> &Arc<AuditQueryService> {
		&self.query
	}

	/// The order state machine.
	pub fn state_machine(&self) -> &Arc<OrderStateMachine> {
		&self.state_machine
	}

	/// The stale-order sweeper. [`LifecycleEngine::run`] drives it on its
	/// interval; tests may call its `sweep_once` directly.
	pub fn sweeper(&self) -> &Arc<Sweeper> {
		&self.sweeper
	}

	/// The lifecycle event bus.
	pub fn event_bus(&self) -> &event_bus::EventBus {
		&self.event_bus
	}

	/// Seeds a new order in pending status.
	pub async fn create_order(&self, order: NewOrder) -> Result<Order, TransitionError> {
		self.state_machine.create_order(order).await
	}

	/// Gets an order by id.
	pub async fn get_order(&self, order_id: &str) -> Result<Order, TransitionError> {
		self.state_machine.get_order(order_id).await
	}

	/// Requests a transition on an order.
	///
	/// This is the single entry point for manual UI actions, the payment
	/// webhook receiver, and the sweeper alike.
	pub async fn request_transition(
		&self,
		order_id: &str,
		command: TransitionCommand,
	) -> Result<TransitionOutcome, TransitionError> {
		self.state_machine.apply(order_id, command).await
	}

	/// Main execution loop for the engine.
	///
	/// This method:
	/// 1. Starts the sweeper on its configured interval
	/// 2. Subscribes to the lifecycle bus for observability logging
	/// 3. Handles graceful shutdown on Ctrl+C
	pub async fn run(&self) -> Result<(), EngineError> {
		let sweeper = self.sweeper.clone();
		let sweep_task = tokio::spawn(async move { sweeper.run().await });

		let mut events = self.event_bus.subscribe();
		loop {
			tokio::select! {
				event = events.recv() => {
					match event {
						Ok(event) => log_event(event),
						// Lagged subscribers pick back up; the audit log
						// has the durable record anyway.
						Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
							tracing::warn!(missed, "Lifecycle bus subscriber lagged");
						},
						Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
					}
				}

				// Shutdown signal
				_ = tokio::signal::ctrl_c() => {
					tracing::info!("Shutdown signal received");
					break;
				}
			}
		}

		sweep_task.abort();
		Ok(())
	}
}

fn log_event(event: LifecycleEvent) {
	match event {
		LifecycleEvent::TransitionApplied {
			order_id,
			action,
			new_status,
			event_id,
		} => {
			tracing::info!(
				order_id = %order_id,
				action = %action,
				status = %new_status,
				event_id,
				"Transition applied"
			);
		},
		LifecycleEvent::TransitionSkipped {
			order_id,
			action,
			reason,
		} => {
			tracing::debug!(order_id = %order_id, action = %action, reason = %reason, "Transition skipped");
		},
		LifecycleEvent::SweepCompleted { scanned, canceled } => {
			tracing::debug!(scanned, canceled, "Sweep completed");
		},
	}
}
