//! Core lifecycle engine for the depot system.
//!
//! This module provides the order state machine that validates and
//! applies status transitions, the sweeper that auto-cancels stale
//! unpaid orders, and the engine that wires them to storage, the audit
//! log, and the query service.

pub mod engine;
pub mod state;
pub mod sweeper;

pub use engine::{EngineError, LifecycleEngine};
pub use state::{
	NewOrder, OrderStateMachine, TransitionCommand, TransitionError, TransitionOutcome,
};
pub use sweeper::{SweepError, SweepStats, Sweeper};
