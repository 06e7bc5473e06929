//! Composable media players.
//!
//! Every player implements [`MediaPlayer`], so decorators can wrap leaves
//! and each other freely:
//!
//! ```text
//! ┌─────────────────────────┐
//! │ ProgressionMediaPlayer  │  one stage at a time
//! └───────────┬─────────────┘
//!             ▼
//! ┌─────────────────────────┐
//! │ MultiTrackMediaPlayer   │  tracks in lockstep
//! └───────────┬─────────────┘
//!             ▼
//! ┌─────────────────────────┐
//! │ LoopMediaPlayer         │  gapless (current, next) pair
//! └───────────┬─────────────┘
//!             ▼
//! ┌─────────────────────────┐     ┌──────────────────┐
//! │ ForwardingMediaPlayer   │────▶│ PlatformPlayer   │
//! └─────────────────────────┘     │ (rodio / fake)   │
//!                                 └──────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use racing_companion::sound::{
//!     ForwardingMediaPlayer, LoopMediaPlayer, MediaPlayer, RodioBackend, SoundSource,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = Arc::new(RodioBackend::new()?);
//! let leaf = ForwardingMediaPlayer::new(backend, SoundSource::file("drums", "drums.ogg"))?;
//! let music = LoopMediaPlayer::new(leaf)?;
//!
//! let handle = music.clone();
//! music.set_volume(0.8).prepare_async(move |ready| {
//!     if ready.is_ok() {
//!         let _ = handle.start();
//!     }
//! })?;
//! # Ok(())
//! # }
//! ```
//!
//! Players are handles: `clone()` returns another handle to the same player,
//! while [`MediaPlayer::copy`] creates an independent, unprepared player.

mod embedded;
mod error;
mod forwarding;
mod lifecycle;
mod looping;
mod multi_track;
mod platform;
mod progression;
mod rodio_backend;
mod source;
pub mod testing;

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use embedded::{embedded_sound, EMBEDDED_SOUND_NAMES};
pub use error::{PlayerError, PlayerResult};
pub use forwarding::ForwardingMediaPlayer;
pub use looping::LoopMediaPlayer;
pub use multi_track::{MultiTrackMediaPlayer, TrackKey};
pub use platform::{CompletionCallback, MediaBackend, PlatformPlayer, PreparedCallback};
pub use progression::ProgressionMediaPlayer;
pub use rodio_backend::{try_create_backend, RodioBackend, RodioPlatformPlayer};
pub use source::SoundSource;

// ============================================================================
// PlayerState
// ============================================================================

/// Lifecycle state of a single platform media resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerState {
    /// Freshly reset; must be re-initialized before use.
    Idle,
    /// Bound to a resource, not yet prepared.
    Initialized,
    /// Asynchronous preparation in flight.
    Preparing,
    /// Ready to start.
    Prepared,
    /// Playing.
    Started,
    /// Paused mid-playback.
    Paused,
    /// Stopped; needs preparing again before it can start.
    Stopped,
    /// Reached the end of the resource.
    PlaybackCompleted,
    /// Released; unusable.
    End,
}

impl PlayerState {
    /// Returns the string representation of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            PlayerState::Idle => "idle",
            PlayerState::Initialized => "initialized",
            PlayerState::Preparing => "preparing",
            PlayerState::Prepared => "prepared",
            PlayerState::Started => "started",
            PlayerState::Paused => "paused",
            PlayerState::Stopped => "stopped",
            PlayerState::PlaybackCompleted => "playback_completed",
            PlayerState::End => "end",
        }
    }

    /// Returns true once preparation finished and until the player is
    /// stopped, reset or released.
    pub fn is_prepared(&self) -> bool {
        matches!(
            self,
            PlayerState::Prepared
                | PlayerState::Started
                | PlayerState::Paused
                | PlayerState::PlaybackCompleted
        )
    }
}

impl fmt::Display for PlayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// MediaPlayer
// ============================================================================

/// The capability every player variant implements.
///
/// Lifecycle operations return `Err` immediately when called in a state
/// where they are structurally invalid; operations that are merely
/// meaningless (pausing a paused player, starting a started one) succeed
/// without effect. Setters cannot fail and return `&Self` for chaining.
///
/// Speed and pitch are stored when set and pushed to the platform on the
/// next start or preparation.
pub trait MediaPlayer: Clone + Send + Sync + Sized + 'static {
    /// Creates an independent, unprepared player bound to the same
    /// resources with the same mute, volume, speed and pitch settings.
    fn copy(&self) -> PlayerResult<Self>;

    /// Number of leaf resources behind this player.
    fn num_media_players(&self) -> usize;

    /// Starts asynchronous preparation; `on_ready` runs exactly once when it
    /// finishes, never synchronously from inside this call.
    fn prepare_async<F>(&self, on_ready: F) -> PlayerResult<&Self>
    where
        F: FnOnce(PlayerResult<()>) + Send + 'static;

    /// Pushes the configured speed and pitch to the platform.
    fn apply_playback_params(&self) -> &Self;

    /// Starts or resumes playback.
    fn start(&self) -> PlayerResult<&Self>;

    /// Pauses playback.
    fn pause(&self) -> PlayerResult<&Self>;

    /// Stops playback; the player must be prepared again to restart.
    fn stop(&self) -> PlayerResult<&Self>;

    /// Pauses and rewinds without releasing platform resources.
    fn soft_reset(&self) -> PlayerResult<&Self>;

    /// Returns the player to the idle state.
    fn reset(&self) -> PlayerResult<&Self>;

    /// Releases platform resources. Releasing twice is an error.
    fn release(&self) -> PlayerResult<&Self>;

    /// Returns true while playing.
    fn is_playing(&self) -> bool;

    /// Rewinds to the beginning, keeping the play/pause state.
    fn seek_to_start(&self) -> PlayerResult<&Self>;

    /// Total length of the underlying media.
    fn duration(&self) -> PlayerResult<Duration>;

    /// Mutes or unmutes, keeping the stored volume.
    fn set_muted(&self, muted: bool) -> &Self;

    /// Sets the volume; stored but inaudible while muted.
    fn set_volume(&self, volume: f32) -> &Self;

    /// Scales the current volume by `ratio`.
    fn multiply_volume(&self, ratio: f32) -> &Self;

    /// Sets the playback speed.
    fn set_speed(&self, speed: f32) -> &Self;

    /// Scales the current speed by `ratio`.
    fn multiply_speed(&self, ratio: f32) -> &Self;

    /// Sets the playback pitch.
    fn set_pitch(&self, pitch: f32) -> &Self;

    /// Scales the current pitch by `ratio`.
    fn multiply_pitch(&self, ratio: f32) -> &Self;

    /// Makes `next` start automatically, without a gap, when this finishes.
    /// Both players must already be prepared.
    fn set_next_media_player(&self, next: &Self) -> PlayerResult<&Self>;

    /// Registers the callback invoked when playback naturally finishes,
    /// replacing any previous one.
    fn set_on_completion_listener<F>(&self, listener: F) -> PlayerResult<&Self>
    where
        F: Fn(&Self) + Send + Sync + 'static;
}

/// Combines the results of several preparations, keeping the first error.
pub(crate) fn first_error(results: Vec<PlayerResult<()>>) -> PlayerResult<()> {
    results.into_iter().find(Result::is_err).unwrap_or(Ok(()))
}
