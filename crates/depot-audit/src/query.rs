//! Read-only query service over the audit log and order store.
//!
//! Answers the audit dashboard's filtered searches, per-order timelines,
//! and summary aggregates. It never mutates state, and storage errors are
//! fatal per request rather than silently degraded.

use crate::{AuditError, AuditLog};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use depot_storage::StorageService;
use depot_types::{
	AuditAction, AuditEvent, AuditSearchParams, AuditSearchResponse, AuditTotals, Order,
	OrderAuditSummary, StorageTable,
};
use std::sync::Arc;

/// Default page size when the caller does not specify one.
const DEFAULT_PAGE_SIZE: usize = 25;
/// Upper bound on page size; larger requests are clamped.
const MAX_PAGE_SIZE: usize = 500;

/// Filters accepted by [`AuditQueryService::search`] and
/// [`AuditQueryService::aggregate`].
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
	/// Case-insensitive free text matched against order id, reference,
	/// customer name/email, product names, and recorded actor emails.
	pub q: Option<String>,
	/// Restrict to orders having at least one event with this action.
	pub action: Option<AuditAction>,
	/// Start of the UTC day range, inclusive.
	pub from: Option<NaiveDate>,
	/// End of the UTC day range, inclusive.
	pub to: Option<NaiveDate>,
}

impl From<&AuditSearchParams> for AuditFilter {
	fn from(params: &AuditSearchParams) -> Self {
		Self {
			q: params.q.clone(),
			action: params.action,
			from: params.from,
			to: params.to,
		}
	}
}

impl AuditFilter {
	/// The half-open UTC instant range `[start, end)` covering the
	/// day-bounded filter, if any bound is set.
	fn timestamp_bounds(&self) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
		let start = self
			.from
			.map(|day| day.and_time(NaiveTime::MIN).and_utc());
		let end = self
			.to
			.map(|day| day.succ_opt().unwrap_or(day).and_time(NaiveTime::MIN).and_utc());
		(start, end)
	}

	fn matches(&self, order: &Order, events: &[AuditEvent]) -> bool {
		if let Some(action) = self.action {
			if !events.iter().any(|event| event.action == action) {
				return false;
			}
		}

		let (start, end) = self.timestamp_bounds();
		if start.is_some() || end.is_some() {
			let in_range = events.iter().any(|event| {
				start.is_none_or(|s| event.timestamp >= s)
					&& end.is_none_or(|e| event.timestamp < e)
			});
			if !in_range {
				return false;
			}
		}

		if let Some(q) = &self.q {
			let needle = q.to_lowercase();
			if !needle.is_empty() && !free_text_matches(order, events, &needle) {
				return false;
			}
		}

		true
	}
}

fn free_text_matches(order: &Order, events: &[AuditEvent], needle: &str) -> bool {
	let mut haystacks: Vec<&str> = vec![
		order.id.as_str(),
		order.reference.as_str(),
		order.customer.name.as_str(),
		order.customer.email.as_str(),
	];
	haystacks.extend(order.line_items.iter().map(|item| item.product.as_str()));
	haystacks.extend(events.iter().filter_map(|event| event.actor.email()));

	haystacks
		.iter()
		.any(|hay| hay.to_lowercase().contains(needle))
}

/// Read-only audit query service.
pub struct AuditQueryService {
	storage: Arc<StorageService>,
	log: Arc<AuditLog>,
}

impl AuditQueryService {
	/// Creates a query service over the order store and audit log.
	pub fn new(storage: Arc<StorageService>, log: Arc<AuditLog>) -> Self {
		Self { storage, log }
	}

	/// Loads every order with its events and keeps the ones matching the
	/// filter, ordered by creation time descending.
	async fn filtered(
		&self,
		filter: &AuditFilter,
	) -> Result<Vec<(Order, Vec<AuditEvent>)>, AuditError> {
		let orders: Vec<Order> = self
			.storage
			.list(StorageTable::Orders.as_str(), "")
			.await
			.map_err(|e| AuditError::Storage(e.to_string()))?;

		let mut matched = Vec::new();
		for order in orders {
			let events = self.log.events_for_order(&order.id).await?;
			if filter.matches(&order, &events) {
				matched.push((order, events));
			}
		}

		matched.sort_by(|(a, _), (b, _)| {
			b.created_at
				.cmp(&a.created_at)
				.then_with(|| b.id.cmp(&a.id))
		});
		Ok(matched)
	}

	/// Searches orders by filter, returning one offset page plus the
	/// total count of the full filtered set.
	pub async fn search(
		&self,
		filter: &AuditFilter,
		page: usize,
		page_size: usize,
	) -> Result<AuditSearchResponse, AuditError> {
		let matched = self.filtered(filter).await?;
		let count = matched.len();

		let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
		let offset = page.saturating_sub(1).saturating_mul(page_size);
		let results = matched
			.into_iter()
			.skip(offset)
			.take(page_size)
			.map(|(order, events)| summarize(&order, &events))
			.collect();

		Ok(AuditSearchResponse { count, results })
	}

	/// Searches with paging defaults taken from the wire parameters.
	pub async fn search_params(
		&self,
		params: &AuditSearchParams,
	) -> Result<AuditSearchResponse, AuditError> {
		let filter = AuditFilter::from(params);
		let page = params.page.unwrap_or(1).max(1);
		let page_size = params.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
		self.search(&filter, page, page_size).await
	}

	/// Returns every event for one order, oldest first, with actor
	/// identity resolved and metadata exposed verbatim.
	pub async fn timeline(&self, order_id: &str) -> Result<Vec<AuditEvent>, AuditError> {
		let known = self
			.storage
			.exists(StorageTable::Orders.as_str(), order_id)
			.await
			.map_err(|e| AuditError::Storage(e.to_string()))?;
		if !known {
			return Err(AuditError::UnknownOrder(order_id.to_string()));
		}

		self.log.events_for_order(order_id).await
	}

	/// Computes dataset-wide totals over the full filtered set.
	///
	/// This is the aggregate the dashboard's summary tiles should use;
	/// counting only a visible page is a different operation
	/// ([`AuditTotals::for_page`]).
	pub async fn aggregate(&self, filter: &AuditFilter) -> Result<AuditTotals, AuditError> {
		let matched = self.filtered(filter).await?;

		let mut totals = AuditTotals::default();
		for (_, events) in &matched {
			if events.iter().any(|e| {
				matches!(
					e.action,
					AuditAction::PaymentConfirmed | AuditAction::PaymentWebhookConfirmed
				)
			}) {
				totals.with_payment_actor += 1;
			}
			if events.iter().any(|e| e.action == AuditAction::OrderReleased) {
				totals.with_release_actor += 1;
			}
			if events
				.iter()
				.any(|e| e.action == AuditAction::TruckExitRecorded)
			{
				totals.with_truck_exit += 1;
			}
		}
		Ok(totals)
	}
}

fn summarize(order: &Order, events: &[AuditEvent]) -> OrderAuditSummary {
	let actor_for = |predicate: fn(AuditAction) -> bool| {
		events
			.iter()
			.find(|event| predicate(event.action))
			.map(|event| event.actor.to_string())
	};

	OrderAuditSummary {
		id: order.id.clone(),
		reference: order.reference.clone(),
		status: order.status,
		created_at: order.created_at,
		customer: order.customer.clone(),
		total_price: order.total_price,
		release_type: order.release_type,
		payment_actor: actor_for(|action| {
			matches!(
				action,
				AuditAction::PaymentConfirmed | AuditAction::PaymentWebhookConfirmed
			)
		}),
		release_actor: actor_for(|action| action == AuditAction::OrderReleased),
		truck_exit_actor: actor_for(|action| action == AuditAction::TruckExitRecorded),
		event_count: events.len(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::{TimeZone, Utc};
	use depot_storage::implementations::memory::MemoryStorage;
	use depot_types::{Actor, Customer, NewAuditEvent, OrderStatus, ReleaseType};
	use rust_decimal::Decimal;
	use std::collections::HashMap;

	fn operator(name: &str, email: &str) -> Actor {
		Actor::Human {
			id: name.to_lowercase(),
			name: name.to_string(),
			email: email.to_string(),
			role: "dispatcher".to_string(),
		}
	}

	fn order(id: &str, day: u32, customer_name: &str) -> Order {
		Order {
			id: id.to_string(),
			reference: format!("FD-{}", id),
			status: OrderStatus::Pending,
			created_at: Utc.with_ymd_and_hms(2025, 1, day, 6, 0, 0).unwrap(),
			updated_at: Utc.with_ymd_and_hms(2025, 1, day, 6, 0, 0).unwrap(),
			version: 1,
			customer: Customer {
				name: customer_name.to_string(),
				email: format!("{}@example.com", customer_name.to_lowercase()),
			},
			total_price: Decimal::new(125_000, 2),
			line_items: vec![depot_types::LineItem {
				product: "Diesel B7".to_string(),
				quantity: Decimal::new(5_000, 0),
				unit_price: Decimal::new(25, 2),
			}],
			release_type: ReleaseType::Pickup,
		}
	}

	async fn fixture() -> (Arc<StorageService>, Arc<AuditLog>, AuditQueryService) {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let log = Arc::new(AuditLog::new(storage.clone()));
		let query = AuditQueryService::new(storage.clone(), log.clone());
		(storage, log, query)
	}

	async fn seed(
		storage: &StorageService,
		log: &AuditLog,
		order: &Order,
		events: Vec<(AuditAction, Actor, u32)>,
	) {
		storage
			.store(StorageTable::Orders.as_str(), &order.id, order)
			.await
			.unwrap();
		for (action, actor, day) in events {
			log.append(NewAuditEvent {
				order_id: order.id.clone(),
				action,
				timestamp: Utc.with_ymd_and_hms(2025, 1, day, 9, 0, 0).unwrap(),
				actor,
				metadata: HashMap::new(),
			})
			.await
			.unwrap();
		}
	}

	#[tokio::test]
	async fn test_free_text_matches_reference_and_actor_email() {
		let (storage, log, query) = fixture().await;
		seed(
			&storage,
			&log,
			&order("o-1", 1, "Acme"),
			vec![(
				AuditAction::PaymentConfirmed,
				operator("Dana", "dana@depot.example"),
				1,
			)],
		)
		.await;
		seed(&storage, &log, &order("o-2", 2, "Borealis"), vec![]).await;

		let by_reference = query
			.search(
				&AuditFilter {
					q: Some("fd-o-1".to_string()),
					..Default::default()
				},
				1,
				10,
			)
			.await
			.unwrap();
		assert_eq!(by_reference.count, 1);
		assert_eq!(by_reference.results[0].id, "o-1");

		let by_actor = query
			.search(
				&AuditFilter {
					q: Some("dana@depot".to_string()),
					..Default::default()
				},
				1,
				10,
			)
			.await
			.unwrap();
		assert_eq!(by_actor.count, 1);
		assert_eq!(by_actor.results[0].id, "o-1");
	}

	#[tokio::test]
	async fn test_action_filter() {
		let (storage, log, query) = fixture().await;
		seed(
			&storage,
			&log,
			&order("o-1", 1, "Acme"),
			vec![(AuditAction::OrderCanceled, Actor::System, 1)],
		)
		.await;
		seed(
			&storage,
			&log,
			&order("o-2", 2, "Borealis"),
			vec![(
				AuditAction::PaymentConfirmed,
				operator("Dana", "dana@depot.example"),
				2,
			)],
		)
		.await;

		let canceled = query
			.search(
				&AuditFilter {
					action: Some(AuditAction::OrderCanceled),
					..Default::default()
				},
				1,
				10,
			)
			.await
			.unwrap();
		assert_eq!(canceled.count, 1);
		assert_eq!(canceled.results[0].id, "o-1");
	}

	#[tokio::test]
	async fn test_date_range_is_day_bounded_inclusive() {
		let (storage, log, query) = fixture().await;
		seed(
			&storage,
			&log,
			&order("o-1", 1, "Acme"),
			vec![(AuditAction::OrderUpdated, Actor::System, 3)],
		)
		.await;
		seed(
			&storage,
			&log,
			&order("o-2", 2, "Borealis"),
			vec![(AuditAction::OrderUpdated, Actor::System, 8)],
		)
		.await;

		let filter = AuditFilter {
			from: Some(NaiveDate::from_ymd_opt(2025, 1, 3).unwrap()),
			to: Some(NaiveDate::from_ymd_opt(2025, 1, 3).unwrap()),
			..Default::default()
		};
		let in_range = query.search(&filter, 1, 10).await.unwrap();
		assert_eq!(in_range.count, 1);
		assert_eq!(in_range.results[0].id, "o-1");
	}

	#[tokio::test]
	async fn test_ordering_and_total_count_independent_of_page() {
		let (storage, log, query) = fixture().await;
		for (id, day) in [("o-1", 1), ("o-2", 3), ("o-3", 2)] {
			seed(&storage, &log, &order(id, day, "Acme"), vec![]).await;
		}

		let page = query.search(&AuditFilter::default(), 1, 2).await.unwrap();
		assert_eq!(page.count, 3);
		let ids: Vec<&str> = page.results.iter().map(|o| o.id.as_str()).collect();
		// created_at descending
		assert_eq!(ids, vec!["o-2", "o-3"]);

		let second = query.search(&AuditFilter::default(), 2, 2).await.unwrap();
		assert_eq!(second.count, 3);
		assert_eq!(second.results.len(), 1);
		assert_eq!(second.results[0].id, "o-1");
	}

	#[tokio::test]
	async fn test_timeline_unknown_order() {
		let (_, _, query) = fixture().await;
		let result = query.timeline("missing").await;
		assert!(matches!(result, Err(AuditError::UnknownOrder(_))));
	}

	#[tokio::test]
	async fn test_aggregate_covers_full_set_not_page() {
		let (storage, log, query) = fixture().await;
		for (id, day) in [("o-1", 1), ("o-2", 2), ("o-3", 3)] {
			seed(
				&storage,
				&log,
				&order(id, day, "Acme"),
				vec![(
					AuditAction::PaymentConfirmed,
					operator("Dana", "dana@depot.example"),
					day,
				)],
			)
			.await;
		}

		let totals = query.aggregate(&AuditFilter::default()).await.unwrap();
		assert_eq!(totals.with_payment_actor, 3);
		assert_eq!(totals.with_release_actor, 0);

		// The page-scoped helper is a different, smaller number.
		let page = query.search(&AuditFilter::default(), 1, 2).await.unwrap();
		let page_totals = AuditTotals::for_page(&page.results);
		assert_eq!(page_totals.with_payment_actor, 2);
	}

	#[tokio::test]
	async fn test_summary_resolves_actors() {
		let (storage, log, query) = fixture().await;
		seed(
			&storage,
			&log,
			&order("o-1", 1, "Acme"),
			vec![
				(
					AuditAction::PaymentWebhookConfirmed,
					Actor::System,
					1,
				),
				(
					AuditAction::OrderReleased,
					operator("Dana", "dana@depot.example"),
					2,
				),
				(
					AuditAction::TruckExitRecorded,
					operator("Femi", "femi@depot.example"),
					3,
				),
			],
		)
		.await;

		let page = query.search(&AuditFilter::default(), 1, 10).await.unwrap();
		let summary = &page.results[0];
		assert_eq!(summary.payment_actor.as_deref(), Some("system"));
		assert_eq!(
			summary.release_actor.as_deref(),
			Some("Dana <dana@depot.example>")
		);
		assert_eq!(
			summary.truck_exit_actor.as_deref(),
			Some("Femi <femi@depot.example>")
		);
		assert_eq!(summary.event_count, 3);
	}
}
