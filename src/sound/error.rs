//! Media player error types.
//!
//! Precondition violations are reported as errors the moment they happen so
//! that composition bugs surface during development instead of producing
//! silently wrong playback.

use thiserror::Error;

use super::PlayerState;

/// Errors that can occur while composing or driving media players.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PlayerError {
    /// The operation is not legal in the player's current state.
    #[error("cannot {op} while {state}")]
    IllegalState {
        /// The attempted operation.
        op: &'static str,
        /// The state the player was in.
        state: PlayerState,
    },

    /// The player has already been released.
    #[error("cannot {0} a released player")]
    Released(&'static str),

    /// A player involved in the operation has not been prepared yet.
    #[error("cannot {0} before the player is prepared")]
    NotPrepared(&'static str),

    /// The player type does not support this operation.
    #[error("{0} is not supported by {1}")]
    Unsupported(&'static str, &'static str),

    /// A progression was advanced while its current stage was playing.
    #[error("cannot advance a progression while its current stage is playing")]
    AdvanceWhilePlaying,

    /// A composite player was created without any children.
    #[error("{0} needs at least one player")]
    Empty(&'static str),

    /// A multi-track player was created with the same key twice.
    #[error("duplicate track: {0}")]
    DuplicateTrack(String),

    /// The key does not name a track of this multi-track player.
    #[error("unknown track: {0}")]
    UnknownTrack(String),

    /// Two multi-track players were chained with different track sets.
    #[error("multi-track players have different tracks")]
    TrackMismatch,

    /// The platform could not prepare the resource.
    #[error("failed to prepare {resource}: {reason}")]
    Prepare {
        /// Name of the resource being prepared.
        resource: String,
        /// Platform reason.
        reason: String,
    },

    /// The platform backend could not be used.
    #[error("audio backend unavailable: {0}")]
    Backend(String),
}

impl PlayerError {
    /// Creates an [`PlayerError::IllegalState`] error.
    #[must_use]
    pub fn illegal(op: &'static str, state: PlayerState) -> Self {
        Self::IllegalState { op, state }
    }

    /// Returns true if this error is a caller composition bug rather than a
    /// platform problem.
    #[must_use]
    pub fn is_contract_violation(&self) -> bool {
        !matches!(self, Self::Prepare { .. } | Self::Backend(_))
    }

    /// Returns true if this error came from the platform layer.
    #[must_use]
    pub fn is_platform_error(&self) -> bool {
        matches!(self, Self::Prepare { .. } | Self::Backend(_))
    }
}

/// Result alias for player operations.
pub type PlayerResult<T> = Result<T, PlayerError>;
