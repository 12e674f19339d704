//! Audit module for the depot lifecycle system.
//!
//! This module owns the append-only audit log that records who did what,
//! when, for every order, and the read-only query service the audit
//! dashboard runs its searches and timelines through.

use thiserror::Error;

pub mod log;
pub mod query;

pub use log::AuditLog;
pub use query::{AuditFilter, AuditQueryService};

/// Errors that can occur during audit operations.
#[derive(Debug, Error)]
pub enum AuditError {
	/// Error that occurs when the referenced order does not exist.
	#[error("Order not found: {0}")]
	UnknownOrder(String),
	/// Error from the underlying store. Never partial: an append that
	/// fails has written nothing.
	#[error("Storage error: {0}")]
	Storage(String),
}
