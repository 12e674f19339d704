//! Actor identity resolution for API requests.
//!
//! The authentication layer in front of this service hands us an opaque
//! principal; the configured operator directory maps it to a concrete
//! actor identity for attribution on audit events.

use depot_config::OperatorConfig;
use depot_types::{Actor, ActorResolver};
use std::collections::HashMap;

/// Resolver backed by the `[operators]` section of the configuration.
pub struct DirectoryActorResolver {
	operators: HashMap<String, OperatorConfig>,
}

impl DirectoryActorResolver {
	/// Creates a resolver over the configured operator directory.
	pub fn new(operators: HashMap<String, OperatorConfig>) -> Self {
		Self { operators }
	}
}

impl ActorResolver for DirectoryActorResolver {
	fn resolve(&self, principal: &str) -> Option<Actor> {
		self.operators.get(principal).map(|operator| Actor::Human {
			id: principal.to_string(),
			name: operator.name.clone(),
			email: operator.email.clone(),
			role: operator.role.clone(),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn resolver() -> DirectoryActorResolver {
		DirectoryActorResolver::new(HashMap::from([(
			"op-7".to_string(),
			OperatorConfig {
				name: "Dana Ruiz".to_string(),
				email: "dana@depot.example".to_string(),
				role: "dispatcher".to_string(),
			},
		)]))
	}

	#[test]
	fn test_known_principal_resolves() {
		let actor = resolver().resolve("op-7").unwrap();
		assert_eq!(actor.email(), Some("dana@depot.example"));
	}

	#[test]
	fn test_unknown_principal_is_none() {
		assert!(resolver().resolve("op-99").is_none());
	}
}
