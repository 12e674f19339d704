//! Auto-cancellation sweeper for stale unpaid orders.
//!
//! Scans pending orders at a fixed interval and requests the
//! `AUTO_CANCELED` transition for those older than the staleness
//! threshold, attributed to the system actor. The sweeper never writes
//! state directly; the state machine's guard decides every outcome, so a
//! manual action winning the race simply shows up here as an illegal
//! transition to skip.

use crate::engine::event_bus::EventBus;
use crate::state::{OrderStateMachine, TransitionCommand, TransitionError};
use chrono::Duration as ChronoDuration;
use depot_config::SweeperConfig;
use depot_storage::StorageService;
use depot_types::{
	Actor, AuditAction, Clock, LifecycleEvent, Order, OrderStatus, StorageTable,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

/// Errors that can abort a whole sweep cycle.
///
/// Per-order failures never surface here; they are logged and skipped so
/// one order cannot delay the rest.
#[derive(Debug, Error)]
pub enum SweepError {
	/// The pending-order scan itself failed.
	#[error("Storage error: {0}")]
	Storage(String),
}

/// Counters for one sweep cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
	/// Stale pending orders the cycle attempted to cancel.
	pub scanned: usize,
	/// Orders actually transitioned to canceled.
	pub canceled: usize,
	/// Attempts dropped because the order moved or stayed busy.
	pub skipped: usize,
}

/// Background process that cancels stale unpaid orders.
pub struct Sweeper {
	state_machine: Arc<OrderStateMachine>,
	storage: Arc<StorageService>,
	clock: Arc<dyn Clock>,
	event_bus: EventBus,
	config: SweeperConfig,
}

impl Sweeper {
	pub fn new(
		state_machine: Arc<OrderStateMachine>,
		storage: Arc<StorageService>,
		clock: Arc<dyn Clock>,
		event_bus: EventBus,
		config: SweeperConfig,
	) -> Self {
		Self {
			state_machine,
			storage,
			clock,
			event_bus,
			config,
		}
	}

	/// Runs sweep cycles forever at the configured interval.
	///
	/// The first tick fires after one full interval, not immediately, so
	/// a restarting service does not sweep before it finishes coming up.
	pub async fn run(&self) {
		let period = std::time::Duration::from_secs(self.config.interval_seconds);
		let mut interval = tokio::time::interval(period);
		interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
		interval.tick().await;

		loop {
			interval.tick().await;
			match self.sweep_once().await {
				Ok(stats) => {
					if stats.scanned > 0 {
						tracing::info!(
							scanned = stats.scanned,
							canceled = stats.canceled,
							skipped = stats.skipped,
							"Sweep cycle finished"
						);
					}
				},
				Err(e) => {
					tracing::warn!(error = %e, "Sweep cycle failed");
				},
			}
		}
	}

	/// Performs one sweep cycle and returns its counters.
	#[instrument(skip_all)]
	pub async fn sweep_once(&self) -> Result<SweepStats, SweepError> {
		let now = self.clock.now();
		let threshold = ChronoDuration::hours(self.config.stale_after_hours as i64);

		let orders: Vec<Order> = self
			.storage
			.list(StorageTable::Orders.as_str(), "")
			.await
			.map_err(|e| SweepError::Storage(e.to_string()))?;

		let stale: Vec<Order> = orders
			.into_iter()
			.filter(|order| {
				order.status == OrderStatus::Pending && now - order.created_at >= threshold
			})
			.collect();

		let mut stats = SweepStats {
			scanned: stale.len(),
			..Default::default()
		};

		// Per-order attempts are independent: one order's lock contention
		// must not delay sweeping of the others.
		let attempts = stale
			.into_iter()
			.map(|order| self.cancel_stale(order))
			.collect::<Vec<_>>();
		for canceled in futures::future::join_all(attempts).await {
			if canceled {
				stats.canceled += 1;
			} else {
				stats.skipped += 1;
			}
		}

		self.event_bus
			.publish(LifecycleEvent::SweepCompleted {
				scanned: stats.scanned,
				canceled: stats.canceled,
			})
			.ok();

		Ok(stats)
	}

	/// Attempts to auto-cancel one stale order. Returns whether the
	/// cancellation was applied.
	#[instrument(skip_all, fields(order_id = %order.id))]
	async fn cancel_stale(&self, order: Order) -> bool {
		let pending_for = self.clock.now() - order.created_at;
		let metadata = std::collections::HashMap::from([(
			"pending_seconds".to_string(),
			serde_json::json!(pending_for.num_seconds()),
		)]);

		let mut attempts = 0;
		loop {
			let command = TransitionCommand::new(AuditAction::AutoCanceled, Actor::System)
				.with_metadata(metadata.clone());

			match self.state_machine.apply(&order.id, command).await {
				Ok(_) => {
					tracing::info!(
						pending_hours = pending_for.num_hours(),
						"Auto-canceled stale order"
					);
					return true;
				},
				// A concurrent legitimate change (payment confirmed,
				// manual cancel) explains this; nothing to surface.
				Err(TransitionError::IllegalTransition { from, .. }) => {
					tracing::debug!(status = %from, "Order moved before sweep, skipping");
					return false;
				},
				Err(TransitionError::Busy(_)) if attempts < self.config.max_busy_retries => {
					attempts += 1;
					tokio::time::sleep(std::time::Duration::from_millis(50)).await;
				},
				Err(TransitionError::Busy(_)) => {
					tracing::debug!("Order stayed busy, deferring to next cycle");
					return false;
				},
				Err(e) => {
					tracing::warn!(error = %e, "Auto-cancel attempt failed");
					return false;
				},
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::state::NewOrder;
	use chrono::{Duration, TimeZone, Utc};
	use depot_audit::AuditLog;
	use depot_storage::implementations::memory::MemoryStorage;
	use depot_types::{Customer, ManualClock, ReleaseType};
	use rust_decimal::Decimal;

	struct Fixture {
		machine: Arc<OrderStateMachine>,
		sweeper: Sweeper,
		clock: Arc<ManualClock>,
		audit: Arc<AuditLog>,
	}

	fn fixture() -> Fixture {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let audit = Arc::new(AuditLog::new(storage.clone()));
		let clock = Arc::new(ManualClock::new(
			Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
		));
		let bus = EventBus::default();
		let machine = Arc::new(OrderStateMachine::new(
			storage.clone(),
			audit.clone(),
			clock.clone(),
			bus.clone(),
			std::time::Duration::from_millis(200),
		));
		let sweeper = Sweeper::new(
			machine.clone(),
			storage,
			clock.clone(),
			bus,
			SweeperConfig::default(),
		);
		Fixture {
			machine,
			sweeper,
			clock,
			audit,
		}
	}

	fn new_order(id: &str) -> NewOrder {
		NewOrder {
			id: id.to_string(),
			reference: format!("FD-{}", id),
			customer: Customer {
				name: "Acme Haulage".to_string(),
				email: "ops@acme.example".to_string(),
			},
			total_price: Decimal::new(80_000, 2),
			line_items: vec![],
			release_type: ReleaseType::Delivery,
		}
	}

	#[tokio::test]
	async fn test_order_untouched_before_threshold() {
		let f = fixture();
		f.machine.create_order(new_order("o-1")).await.unwrap();

		f.clock.advance(Duration::hours(11) + Duration::minutes(59));
		let stats = f.sweeper.sweep_once().await.unwrap();
		assert_eq!(stats, SweepStats::default());

		let order = f.machine.get_order("o-1").await.unwrap();
		assert_eq!(order.status, OrderStatus::Pending);
	}

	#[tokio::test]
	async fn test_stale_order_auto_canceled_at_threshold() {
		let f = fixture();
		f.machine.create_order(new_order("o-1")).await.unwrap();

		f.clock.advance(Duration::hours(12));
		let stats = f.sweeper.sweep_once().await.unwrap();
		assert_eq!(stats.scanned, 1);
		assert_eq!(stats.canceled, 1);

		let order = f.machine.get_order("o-1").await.unwrap();
		assert_eq!(order.status, OrderStatus::Canceled);

		let events = f.audit.events_for_order("o-1").await.unwrap();
		assert_eq!(events.len(), 1);
		assert_eq!(events[0].action, AuditAction::AutoCanceled);
		assert_eq!(events[0].actor, Actor::System);
		assert_eq!(
			events[0].metadata["pending_seconds"],
			serde_json::json!(12 * 3600)
		);
	}

	#[tokio::test]
	async fn test_paid_order_not_swept() {
		let f = fixture();
		f.machine.create_order(new_order("o-1")).await.unwrap();
		f.machine.create_order(new_order("o-2")).await.unwrap();

		// o-1 pays just before the sweep fires.
		f.clock.advance(Duration::hours(12));
		f.machine
			.apply(
				"o-1",
				TransitionCommand::new(AuditAction::PaymentWebhookConfirmed, Actor::System),
			)
			.await
			.unwrap();

		let stats = f.sweeper.sweep_once().await.unwrap();
		assert_eq!(stats.scanned, 1);
		assert_eq!(stats.canceled, 1);

		let paid = f.machine.get_order("o-1").await.unwrap();
		assert_eq!(paid.status, OrderStatus::Paid);
		let canceled = f.machine.get_order("o-2").await.unwrap();
		assert_eq!(canceled.status, OrderStatus::Canceled);
	}

	#[tokio::test]
	async fn test_sweep_is_idempotent_across_cycles() {
		let f = fixture();
		f.machine.create_order(new_order("o-1")).await.unwrap();

		f.clock.advance(Duration::hours(13));
		f.sweeper.sweep_once().await.unwrap();
		let stats = f.sweeper.sweep_once().await.unwrap();

		// Already canceled, so the second cycle scans nothing.
		assert_eq!(stats, SweepStats::default());
		assert_eq!(f.audit.events_for_order("o-1").await.unwrap().len(), 1);
	}
}
