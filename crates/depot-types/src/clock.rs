//! Clock abstraction for the lifecycle system.
//!
//! The sweeper decides staleness by wall-clock difference, so time is
//! injected rather than read ambiently. Tests drive a manual clock to
//! simulate elapsed hours without sleeping.

use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

/// Supplies wall-clock reads to the state machine and sweeper.
pub trait Clock: Send + Sync {
	/// The current time in UTC.
	fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn now(&self) -> DateTime<Utc> {
		Utc::now()
	}
}

/// A settable clock for tests.
///
/// Starts at a fixed instant and only moves when told to, so threshold
/// boundaries like "11h59m is untouched, 12h00m is canceled" can be
/// asserted exactly.
pub struct ManualClock {
	now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
	/// Creates a manual clock frozen at the given instant.
	pub fn new(start: DateTime<Utc>) -> Self {
		Self {
			now: Mutex::new(start),
		}
	}

	/// Moves the clock forward by the given duration.
	pub fn advance(&self, by: Duration) {
		let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
		*now += by;
	}

	/// Sets the clock to an absolute instant.
	pub fn set(&self, to: DateTime<Utc>) {
		let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
		*now = to;
	}
}

impl Clock for ManualClock {
	fn now(&self) -> DateTime<Utc> {
		*self.now.lock().unwrap_or_else(|e| e.into_inner())
	}
}
