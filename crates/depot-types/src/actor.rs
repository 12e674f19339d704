//! Actor identity types for attributing audit events.
//!
//! Every audit event records the actor responsible for it. The system
//! actor is an explicit variant rather than a nullable identity, so every
//! consumer is forced to handle the system case.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The entity responsible for an audit event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Actor {
	/// The distinguished system actor, used exclusively by the stale-order
	/// sweeper and by internal consistency fixups.
	System,
	/// A concrete human identity resolved from the request's principal.
	Human {
		/// Operator account id.
		id: String,
		/// Operator display name.
		name: String,
		/// Operator email. Matched by free-text audit search.
		email: String,
		/// Operator role, e.g. "dispatcher".
		role: String,
	},
}

impl Actor {
	/// The actor's email, if it has one. The system actor has none.
	pub fn email(&self) -> Option<&str> {
		match self {
			Actor::System => None,
			Actor::Human { email, .. } => Some(email),
		}
	}

	/// Whether this is the system actor.
	pub fn is_system(&self) -> bool {
		matches!(self, Actor::System)
	}
}

impl fmt::Display for Actor {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Actor::System => write!(f, "system"),
			Actor::Human { name, email, .. } => write!(f, "{} <{}>", name, email),
		}
	}
}

/// Maps a request's authenticated principal to a concrete actor identity.
///
/// The authentication layer itself is outside this system; implementations
/// typically look the principal up in a configured operator directory.
pub trait ActorResolver: Send + Sync {
	/// Resolves a principal to an actor, or `None` if it is unknown.
	fn resolve(&self, principal: &str) -> Option<Actor>;
}
