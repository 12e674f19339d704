//! Append-only audit log store.
//!
//! Events are keyed by order id plus a zero-padded globally monotonic
//! event id, so a sorted prefix scan returns one order's trail oldest
//! first. The public contract has no update or delete; corrections are
//! recorded as new events.

use crate::AuditError;
use depot_storage::{StorageError, StorageService};
use depot_types::{AuditAction, AuditEvent, NewAuditEvent, StorageTable};
use std::sync::Arc;

/// Id under which the sequence counter is stored.
const SEQUENCE_ID: &str = "next";

/// The append-only store of audit events.
pub struct AuditLog {
	storage: Arc<StorageService>,
}

impl AuditLog {
	/// Creates an audit log over the given storage service.
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}

	fn event_id_key(order_id: &str, event_id: u64) -> String {
		// Zero-padded so lexicographic key order equals event order.
		format!("{}:{:020}", order_id, event_id)
	}

	/// Allocates the next event id via compare-and-swap on the persisted
	/// sequence counter, retrying on contention.
	async fn next_id(&self) -> Result<u64, AuditError> {
		let table = StorageTable::AuditSequence.as_str();
		loop {
			match self
				.storage
				.retrieve_versioned::<u64>(table, SEQUENCE_ID)
				.await
			{
				Ok(current) => {
					let id = current.value;
					match self
						.storage
						.swap(table, SEQUENCE_ID, &current.raw, &(id + 1))
						.await
					{
						Ok(()) => return Ok(id),
						Err(StorageError::Conflict) => continue,
						Err(e) => return Err(AuditError::Storage(e.to_string())),
					}
				},
				Err(StorageError::NotFound) => {
					match self.storage.store_new(table, SEQUENCE_ID, &2u64).await {
						Ok(()) => return Ok(1),
						Err(StorageError::Conflict) => continue,
						Err(e) => return Err(AuditError::Storage(e.to_string())),
					}
				},
				Err(e) => return Err(AuditError::Storage(e.to_string())),
			}
		}
	}

	/// Appends one event and returns it with its assigned id.
	pub async fn append(&self, event: NewAuditEvent) -> Result<AuditEvent, AuditError> {
		let id = self.next_id().await?;
		let event = AuditEvent {
			id,
			order_id: event.order_id,
			action: event.action,
			timestamp: event.timestamp,
			actor: event.actor,
			metadata: event.metadata,
		};

		let key = Self::event_id_key(&event.order_id, event.id);
		self.storage
			.store_new(StorageTable::AuditEvents.as_str(), &key, &event)
			.await
			.map_err(|e| AuditError::Storage(e.to_string()))?;

		tracing::debug!(
			order_id = %event.order_id,
			event_id = event.id,
			action = %event.action,
			"Appended audit event"
		);
		Ok(event)
	}

	/// Returns every event for one order, oldest first.
	pub async fn events_for_order(&self, order_id: &str) -> Result<Vec<AuditEvent>, AuditError> {
		self.storage
			.list(
				StorageTable::AuditEvents.as_str(),
				&format!("{}:", order_id),
			)
			.await
			.map_err(|e| AuditError::Storage(e.to_string()))
	}

	/// Returns one page of an order's events, oldest first.
	///
	/// `page` is 1-based; re-requesting a page is restartable because the
	/// log only ever grows at the end.
	pub async fn list_events(
		&self,
		order_id: &str,
		page: usize,
		page_size: usize,
	) -> Result<Vec<AuditEvent>, AuditError> {
		let events = self.events_for_order(order_id).await?;
		let offset = page.saturating_sub(1).saturating_mul(page_size);
		Ok(events.into_iter().skip(offset).take(page_size).collect())
	}

	/// Whether the order already has an event with the given action.
	pub async fn has_action(
		&self,
		order_id: &str,
		action: AuditAction,
	) -> Result<bool, AuditError> {
		let events = self.events_for_order(order_id).await?;
		Ok(events.iter().any(|event| event.action == action))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::{TimeZone, Utc};
	use depot_storage::implementations::memory::MemoryStorage;
	use depot_types::Actor;
	use std::collections::HashMap;

	fn log() -> AuditLog {
		AuditLog::new(Arc::new(StorageService::new(Box::new(MemoryStorage::new()))))
	}

	fn event(order_id: &str, action: AuditAction, minute: u32) -> NewAuditEvent {
		NewAuditEvent {
			order_id: order_id.to_string(),
			action,
			timestamp: Utc.with_ymd_and_hms(2025, 1, 1, 8, minute, 0).unwrap(),
			actor: Actor::System,
			metadata: HashMap::new(),
		}
	}

	#[tokio::test]
	async fn test_ids_are_monotonic() {
		let log = log();
		let first = log
			.append(event("o-1", AuditAction::PaymentConfirmed, 0))
			.await
			.unwrap();
		let second = log
			.append(event("o-2", AuditAction::OrderCanceled, 1))
			.await
			.unwrap();
		assert!(second.id > first.id);
	}

	#[tokio::test]
	async fn test_events_for_order_oldest_first() {
		let log = log();
		for minute in 0..5 {
			log.append(event("o-1", AuditAction::OrderUpdated, minute))
				.await
				.unwrap();
		}
		// Another order's trail must not leak in.
		log.append(event("o-10", AuditAction::OrderCanceled, 9))
			.await
			.unwrap();

		let events = log.events_for_order("o-1").await.unwrap();
		assert_eq!(events.len(), 5);
		let ids: Vec<u64> = events.iter().map(|e| e.id).collect();
		let mut sorted = ids.clone();
		sorted.sort();
		assert_eq!(ids, sorted);
		assert!(events.iter().all(|e| e.order_id == "o-1"));
	}

	#[tokio::test]
	async fn test_pagination_is_restartable() {
		let log = log();
		for minute in 0..7 {
			log.append(event("o-1", AuditAction::OrderUpdated, minute))
				.await
				.unwrap();
		}

		let first = log.list_events("o-1", 1, 3).await.unwrap();
		let second = log.list_events("o-1", 2, 3).await.unwrap();
		let third = log.list_events("o-1", 3, 3).await.unwrap();
		assert_eq!(first.len(), 3);
		assert_eq!(second.len(), 3);
		assert_eq!(third.len(), 1);

		// Re-reading a page returns the same events.
		let again = log.list_events("o-1", 2, 3).await.unwrap();
		let ids: Vec<u64> = second.iter().map(|e| e.id).collect();
		let again_ids: Vec<u64> = again.iter().map(|e| e.id).collect();
		assert_eq!(ids, again_ids);
	}

	#[tokio::test]
	async fn test_has_action() {
		let log = log();
		log.append(event("o-1", AuditAction::TruckExitRecorded, 0))
			.await
			.unwrap();

		assert!(log
			.has_action("o-1", AuditAction::TruckExitRecorded)
			.await
			.unwrap());
		assert!(!log
			.has_action("o-1", AuditAction::SecurityExit)
			.await
			.unwrap());
	}
}
