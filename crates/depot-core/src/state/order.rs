//! Order state machine implementation.
//!
//! Validates and applies status transitions, ensuring orders move through
//! valid lifecycle states: Pending -> Paid -> Released, or Pending ->
//! Canceled. Every successful transition appends exactly one audit event;
//! the order write and the append commit or fail together.

use crate::engine::event_bus::EventBus;
use depot_audit::AuditLog;
use depot_storage::{StorageError, StorageService, Versioned};
use depot_types::{
	Actor, AuditAction, AuditEvent, Clock, LifecycleEvent, NewAuditEvent, Order, OrderStatus,
	StorageTable,
};
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::instrument;

/// Errors that can occur during order state management.
#[derive(Debug, Error)]
pub enum TransitionError {
	/// The referenced order id does not exist. Not retryable.
	#[error("Order not found: {0}")]
	UnknownOrder(String),
	/// An order with the same id already exists.
	#[error("Order already exists: {0}")]
	DuplicateOrder(String),
	/// The requested action's source state does not match the order's
	/// current status. Not retryable: a concurrent legitimate change is
	/// the usual explanation.
	#[error("Cannot apply {action} to order in status {from}")]
	IllegalTransition {
		action: AuditAction,
		from: OrderStatus,
	},
	/// The order's critical section could not be acquired within the
	/// bounded wait. Retryable on the caller's schedule.
	#[error("Order busy: {0}")]
	Busy(String),
	/// The underlying store failed. The transition did not happen:
	/// neither the status nor the audit log changed.
	#[error("Storage error: {0}")]
	Storage(String),
}

/// A requested transition: the action plus who asked for it and why.
#[derive(Debug, Clone)]
pub struct TransitionCommand {
	/// The requested action.
	pub action: AuditAction,
	/// The responsible actor, or [`Actor::System`] for the sweeper.
	pub actor: Actor,
	/// Context recorded verbatim on the audit event.
	pub metadata: HashMap<String, serde_json::Value>,
	/// Gateway transaction id deduplicating redelivered webhooks.
	pub idempotency_key: Option<String>,
}

impl TransitionCommand {
	/// A command with empty metadata and no idempotency key.
	pub fn new(action: AuditAction, actor: Actor) -> Self {
		Self {
			action,
			actor,
			metadata: HashMap::new(),
			idempotency_key: None,
		}
	}

	/// Attaches metadata to the command.
	pub fn with_metadata(mut self, metadata: HashMap<String, serde_json::Value>) -> Self {
		self.metadata = metadata;
		self
	}

	/// Attaches an idempotency key to the command.
	pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
		self.idempotency_key = Some(key.into());
		self
	}
}

/// The result of a successful transition request.
#[derive(Debug, Clone)]
pub enum TransitionOutcome {
	/// The transition was applied: the order record was written and one
	/// audit event appended.
	Applied {
		/// The order after the transition.
		order: Order,
		/// The appended audit event.
		event: AuditEvent,
	},
	/// The request was an idempotent replay of an already-satisfied
	/// action: nothing was written, no event was appended.
	AlreadyApplied {
		/// The order's unchanged status.
		status: OrderStatus,
	},
}

impl TransitionOutcome {
	/// The order's status after the request.
	pub fn status(&self) -> OrderStatus {
		match self {
			TransitionOutcome::Applied { order, .. } => order.status,
			TransitionOutcome::AlreadyApplied { status } => *status,
		}
	}

	/// The appended event's id, if an event was appended.
	pub fn event_id(&self) -> Option<u64> {
		match self {
			TransitionOutcome::Applied { event, .. } => Some(event.id),
			TransitionOutcome::AlreadyApplied { .. } => None,
		}
	}
}

/// Fields supplied by the external ordering flow when seeding an order.
#[derive(Debug, Clone)]
pub struct NewOrder {
	/// Order id; unique across the store.
	pub id: String,
	/// Human-readable order code.
	pub reference: String,
	/// The ordering customer.
	pub customer: depot_types::Customer,
	/// Total price.
	pub total_price: rust_decimal::Decimal,
	/// Ordered products.
	pub line_items: Vec<depot_types::LineItem>,
	/// How the order leaves the depot.
	pub release_type: depot_types::ReleaseType,
}

/// What a requested action is allowed to do.
struct TransitionRule {
	/// Statuses the action may be applied in.
	from: &'static [OrderStatus],
	/// Resulting status, or None for event-only actions.
	to: Option<OrderStatus>,
	/// Whether the action may be recorded at most once per order.
	at_most_once: bool,
}

/// Static transition table; requested action -> rule.
///
/// `OrderStatusChanged` is deliberately absent: it is reserved for
/// internal consistency fixups and is not requestable.
static TRANSITIONS: Lazy<HashMap<AuditAction, TransitionRule>> = Lazy::new(|| {
	use AuditAction::*;
	use OrderStatus::*;

	let mut m = HashMap::new();
	m.insert(
		PaymentConfirmed,
		TransitionRule {
			from: &[Pending],
			to: Some(Paid),
			at_most_once: false,
		},
	);
	m.insert(
		PaymentWebhookConfirmed,
		TransitionRule {
			from: &[Pending],
			to: Some(Paid),
			at_most_once: false,
		},
	);
	m.insert(
		OrderCanceled,
		TransitionRule {
			from: &[Pending],
			to: Some(Canceled),
			at_most_once: false,
		},
	);
	m.insert(
		AutoCanceled,
		TransitionRule {
			from: &[Pending],
			to: Some(Canceled),
			at_most_once: false,
		},
	);
	m.insert(
		OrderReleased,
		TransitionRule {
			from: &[Paid],
			to: Some(Released),
			at_most_once: true,
		},
	);
	m.insert(
		TruckExitRecorded,
		TransitionRule {
			from: &[Released],
			to: None,
			at_most_once: true,
		},
	);
	m.insert(
		SecurityExit,
		TransitionRule {
			from: &[Released],
			to: None,
			at_most_once: true,
		},
	);
	m.insert(
		OrderUpdated,
		TransitionRule {
			from: &[Pending, Paid, Released, Canceled],
			to: None,
			at_most_once: false,
		},
	);
	m
});

/// Manages order state transitions and persistence.
///
/// All mutations of the order store and audit log in the system go
/// through this type. Each order's read-check-write-append sequence runs
/// in a per-order critical section; the persisted write is additionally a
/// compare-and-swap against the record bytes read, so a cross-process
/// writer is detected rather than overwritten.
pub struct OrderStateMachine {
	storage: Arc<StorageService>,
	audit: Arc<AuditLog>,
	clock: Arc<dyn Clock>,
	event_bus: EventBus,
	locks: DashMap<String, Arc<Mutex<()>>>,
	lock_wait: Duration,
}

impl OrderStateMachine {
	pub fn new(
		storage: Arc<StorageService>,
		audit: Arc<AuditLog>,
		clock: Arc<dyn Clock>,
		event_bus: EventBus,
		lock_wait: Duration,
	) -> Self {
		Self {
			storage,
			audit,
			clock,
			event_bus,
			locks: DashMap::new(),
			lock_wait,
		}
	}

	/// Seeds a new order in `Pending` status.
	///
	/// Creation belongs to the external ordering flow and appends no
	/// audit event; the trail starts with the first transition.
	pub async fn create_order(&self, new_order: NewOrder) -> Result<Order, TransitionError> {
		let now = self.clock.now();
		let order = Order {
			id: new_order.id,
			reference: new_order.reference,
			status: OrderStatus::Pending,
			created_at: now,
			updated_at: now,
			version: 1,
			customer: new_order.customer,
			total_price: new_order.total_price,
			line_items: new_order.line_items,
			release_type: new_order.release_type,
		};

		match self
			.storage
			.store_new(StorageTable::Orders.as_str(), &order.id, &order)
			.await
		{
			Ok(()) => Ok(order),
			Err(StorageError::Conflict) => Err(TransitionError::DuplicateOrder(order.id)),
			Err(e) => Err(TransitionError::Storage(e.to_string())),
		}
	}

	/// Gets an order by ID.
	pub async fn get_order(&self, order_id: &str) -> Result<Order, TransitionError> {
		match self
			.storage
			.retrieve(StorageTable::Orders.as_str(), order_id)
			.await
		{
			Ok(order) => Ok(order),
			Err(StorageError::NotFound) => {
				Err(TransitionError::UnknownOrder(order_id.to_string()))
			},
			Err(e) => Err(TransitionError::Storage(e.to_string())),
		}
	}

	/// Applies a requested transition to an order.
	///
	/// On success the status update (if the action changes status) and
	/// exactly one audit event commit as a unit. Idempotent replays of
	/// webhook confirmations return [`TransitionOutcome::AlreadyApplied`]
	/// without touching either.
	#[instrument(skip_all, fields(order_id = %order_id, action = %command.action))]
	pub async fn apply(
		&self,
		order_id: &str,
		command: TransitionCommand,
	) -> Result<TransitionOutcome, TransitionError> {
		let lock = Arc::clone(
			self.locks
				.entry(order_id.to_string())
				.or_default()
				.value(),
		);
		let _guard = match tokio::time::timeout(self.lock_wait, lock.lock()).await {
			Ok(guard) => guard,
			Err(_) => return Err(TransitionError::Busy(order_id.to_string())),
		};

		// Redelivered webhook: the key was recorded when the original
		// delivery committed, so this replay appends nothing.
		if let Some(key) = &command.idempotency_key {
			let seen = self
				.storage
				.exists(StorageTable::WebhookKeys.as_str(), key)
				.await
				.map_err(|e| TransitionError::Storage(e.to_string()))?;
			if seen {
				let order = self.get_order(order_id).await?;
				tracing::debug!(idempotency_key = %key, "Duplicate webhook delivery ignored");
				return Ok(TransitionOutcome::AlreadyApplied {
					status: order.status,
				});
			}
		}

		let current: Versioned<Order> = match self
			.storage
			.retrieve_versioned(StorageTable::Orders.as_str(), order_id)
			.await
		{
			Ok(versioned) => versioned,
			Err(StorageError::NotFound) => {
				return Err(TransitionError::UnknownOrder(order_id.to_string()))
			},
			Err(e) => return Err(TransitionError::Storage(e.to_string())),
		};
		let order = &current.value;

		let Some(rule) = TRANSITIONS.get(&command.action) else {
			return Err(TransitionError::IllegalTransition {
				action: command.action,
				from: order.status,
			});
		};

		// A webhook confirmation for an already-paid order is satisfied,
		// not illegal; retried deliveries without a key land here.
		if command.action == AuditAction::PaymentWebhookConfirmed
			&& order.status == OrderStatus::Paid
		{
			return Ok(TransitionOutcome::AlreadyApplied {
				status: order.status,
			});
		}

		if !rule.from.contains(&order.status) {
			return Err(TransitionError::IllegalTransition {
				action: command.action,
				from: order.status,
			});
		}

		// A truck cannot exit twice for the same order.
		if rule.at_most_once {
			let recorded = self
				.audit
				.has_action(order_id, command.action)
				.await
				.map_err(|e| TransitionError::Storage(e.to_string()))?;
			if recorded {
				return Err(TransitionError::IllegalTransition {
					action: command.action,
					from: order.status,
				});
			}
		}

		let now = self.clock.now();
		let mut updated = order.clone();
		updated.version += 1;
		updated.updated_at = now;
		if let Some(to) = rule.to {
			updated.status = to;
		}

		match self
			.storage
			.swap(StorageTable::Orders.as_str(), order_id, &current.raw, &updated)
			.await
		{
			Ok(()) => {},
			// A writer outside this process moved the record between our
			// read and write. Surface as busy; the caller re-requests
			// against the fresh state.
			Err(StorageError::Conflict) => {
				return Err(TransitionError::Busy(order_id.to_string()))
			},
			Err(e) => return Err(TransitionError::Storage(e.to_string())),
		}

		let event = match self
			.audit
			.append(NewAuditEvent {
				order_id: order_id.to_string(),
				action: command.action,
				timestamp: now,
				actor: command.actor,
				metadata: command.metadata,
			})
			.await
		{
			Ok(event) => event,
			Err(e) => {
				// Restore the record read at entry; we still hold the
				// order's critical section, so nothing raced the restore.
				if let Err(restore) = self
					.storage
					.store_raw(StorageTable::Orders.as_str(), order_id, current.raw.clone())
					.await
				{
					tracing::error!(
						order_id = %order_id,
						error = %restore,
						"Failed to restore order record after audit append failure"
					);
				}
				return Err(TransitionError::Storage(e.to_string()));
			},
		};

		if let Some(key) = &command.idempotency_key {
			// The event is already durable; if recording the key fails, a
			// replay is still absorbed by the already-paid check above.
			if let Err(e) = self
				.storage
				.store(StorageTable::WebhookKeys.as_str(), key, &event.id)
				.await
			{
				tracing::warn!(
					order_id = %order_id,
					idempotency_key = %key,
					error = %e,
					"Failed to record webhook idempotency key"
				);
			}
		}

		tracing::info!(
			status = %updated.status,
			event_id = event.id,
			actor = %event.actor,
			"Applied transition"
		);
		self.event_bus
			.publish(LifecycleEvent::TransitionApplied {
				order_id: order_id.to_string(),
				action: command.action,
				new_status: updated.status,
				event_id: event.id,
			})
			.ok();

		Ok(TransitionOutcome::Applied {
			order: updated,
			event,
		})
	}
}
