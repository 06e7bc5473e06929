//! The boundary between the player composition layer and the audio platform.
//!
//! A [`MediaBackend`] turns a [`SoundSource`] into a [`PlatformPlayer`]: one
//! platform media resource with the usual prepare / start / pause / seek
//! controls. Platform players do no state checking of their own; the
//! [`super::ForwardingMediaPlayer`] that owns one gates every call.
//!
//! Implementations must never invoke the prepared or completion callbacks
//! synchronously from inside one of their own methods.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use super::error::PlayerResult;
use super::source::SoundSource;

/// Invoked once when asynchronous preparation finishes.
pub type PreparedCallback = Box<dyn FnOnce(PlayerResult<Duration>) + Send>;

/// Invoked every time playback reaches the end of the resource.
pub type CompletionCallback = Box<dyn Fn() + Send + Sync>;

/// Creates platform media resources.
pub trait MediaBackend: Send + Sync + 'static {
    /// Binds a new, unprepared platform resource to `source`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend can no longer create resources.
    fn create(&self, source: &SoundSource) -> PlayerResult<Arc<dyn PlatformPlayer>>;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}

/// One platform media resource.
pub trait PlatformPlayer: Send + Sync {
    /// Loads and decodes the resource, reporting its duration when done.
    fn prepare_async(&self, on_prepared: PreparedCallback);

    /// Starts or resumes playback.
    fn start(&self);

    /// Pauses playback.
    fn pause(&self);

    /// Stops playback and drops decoded data.
    fn stop(&self);

    /// Drops decoded data and any chained player.
    fn reset(&self);

    /// Frees the resource.
    fn release(&self);

    /// Rewinds to the beginning without changing the play/pause state.
    fn seek_to_start(&self);

    /// Sets the output volume; `0.0` is silent.
    fn set_volume(&self, volume: f32);

    /// Sets speed and pitch.
    fn set_playback_params(&self, speed: f32, pitch: f32);

    /// Sets the resource started automatically when this one finishes.
    fn set_next(&self, next: Option<Arc<dyn PlatformPlayer>>);

    /// Sets the callback invoked when playback reaches the end.
    fn set_on_completion(&self, callback: CompletionCallback);

    /// Allows backends to recognise their own resources in [`Self::set_next`].
    fn as_any(&self) -> &dyn Any;
}
