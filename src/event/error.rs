//! Event utility error types.

use thiserror::Error;

/// Errors raised by the event utilities.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventError {
    /// A forked listener received more results than it was created for.
    #[error("forked listener expected {expected} results but received another")]
    ForkOverflow {
        /// Number of forks the listener was created with.
        expected: usize,
    },

    /// The event bus has no active receivers left.
    #[error("event bus is closed")]
    BusClosed,
}

impl EventError {
    /// Returns true if this error indicates a caller composition bug.
    #[must_use]
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, Self::ForkOverflow { .. })
    }
}
