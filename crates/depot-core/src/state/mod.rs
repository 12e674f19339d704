//! Order state management.

mod order;

pub use order::{
	NewOrder, OrderStateMachine, TransitionCommand, TransitionError, TransitionOutcome,
};
