//! Broadcast bus for lifecycle events.
//!
//! The state machine and sweeper publish here; the engine's run loop and
//! any other subscriber consume independently. Publishing never blocks:
//! slow subscribers lag and miss events rather than backpressure the
//! transition path. The audit log, not the bus, is the durable record.

use depot_types::LifecycleEvent;
use tokio::sync::broadcast;

/// Default capacity of the broadcast channel.
const DEFAULT_CAPACITY: usize = 256;

/// Cloneable handle to the lifecycle event bus.
#[derive(Clone)]
pub struct EventBus {
	sender: broadcast::Sender<LifecycleEvent>,
}

impl EventBus {
	/// Creates a bus holding up to `capacity` undelivered events per
	/// subscriber.
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	/// Publishes an event to all current subscribers.
	///
	/// Returns the number of subscribers the event reached; an error
	/// means there are none, which callers may ignore.
	pub fn publish(
		&self,
		event: LifecycleEvent,
	) -> Result<usize, broadcast::error::SendError<LifecycleEvent>> {
		self.sender.send(event)
	}

	/// Creates a new subscription receiving events published after this
	/// call.
	pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
		self.sender.subscribe()
	}
}

impl Default for EventBus {
	fn default() -> Self {
		Self::new(DEFAULT_CAPACITY)
	}
}
