//! Registry trait for self-registering implementations.
//!
//! Pluggable backends (storage today) register themselves with the name
//! used in configuration files and a factory function, so the service
//! binary can wire implementations from configuration alone.

/// Base trait for implementation registries.
///
/// Each pluggable implementation module must provide a Registry struct
/// that implements this trait, declaring its configuration name and
/// factory function.
pub trait ImplementationRegistry {
	/// The name used in configuration files to reference this
	/// implementation, e.g. "memory" for `storage.implementations.memory`.
	const NAME: &'static str;

	/// The factory function type this implementation provides.
	type Factory;

	/// Get the factory function for this implementation.
	fn factory() -> Self::Factory;
}
