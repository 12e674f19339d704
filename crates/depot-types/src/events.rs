//! Lifecycle event types for intra-engine communication.
//!
//! The engine publishes these on a broadcast bus so observers (the run
//! loop's structured logging, tests) can react to transitions without
//! coupling to the state machine's call sites. The audit log, not the
//! bus, remains the ground truth for what happened.

use crate::{AuditAction, OrderStatus};
use serde::{Deserialize, Serialize};

/// Events published on the engine's lifecycle bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LifecycleEvent {
	/// A transition committed: the order's record and its audit event were
	/// both persisted.
	TransitionApplied {
		order_id: String,
		action: AuditAction,
		new_status: OrderStatus,
		event_id: u64,
	},
	/// A requested transition was not applied. Carries the reason for
	/// observability; the caller has already received the error.
	TransitionSkipped {
		order_id: String,
		action: AuditAction,
		reason: String,
	},
	/// A sweep cycle finished.
	SweepCompleted { scanned: usize, canceled: usize },
}
