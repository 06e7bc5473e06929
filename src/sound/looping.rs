//! Gapless looping over a pair of identical players.
//!
//! The loop keeps a `current` player and a prepared `next` copy chained to
//! it. When `current` finishes, the platform starts `next` on its own; the
//! loop then rotates the pair and prepares a fresh copy in the background.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::event::ForkedListener;

use super::error::{PlayerError, PlayerResult};
use super::{first_error, MediaPlayer};

type Listener<T> = Arc<dyn Fn(&LoopMediaPlayer<T>) + Send + Sync>;

/// Plays its wrapped player over and over without gaps.
///
/// The completion listener fires once per finished iteration.
pub struct LoopMediaPlayer<T: MediaPlayer> {
    inner: Arc<LoopInner<T>>,
}

struct LoopInner<T: MediaPlayer> {
    pair: Mutex<Pair<T>>,
    listener: Mutex<Option<Listener<T>>>,
}

struct Pair<T> {
    current: T,
    next: T,
    /// Set once `next` is prepared and chained behind `current`.
    next_ready: bool,
    /// Bumped on rotation and teardown so stale ready callbacks are ignored.
    generation: u64,
    rotations: u64,
}

impl<T: MediaPlayer> Clone for LoopMediaPlayer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: MediaPlayer> LoopMediaPlayer<T> {
    /// Wraps `player`; a copy of it becomes the initial `next`.
    ///
    /// # Errors
    ///
    /// Returns an error if `player` cannot be copied.
    pub fn new(player: T) -> PlayerResult<Self> {
        let next = player.copy()?;
        Ok(Self {
            inner: Arc::new(LoopInner {
                pair: Mutex::new(Pair {
                    current: player,
                    next,
                    next_ready: false,
                    generation: 0,
                    rotations: 0,
                }),
                listener: Mutex::new(None),
            }),
        })
    }

    /// Handle to the player currently at the front of the pair.
    pub fn current(&self) -> T {
        self.inner.pair.lock().current.clone()
    }

    /// Handle to the player queued behind `current`.
    pub fn next(&self) -> T {
        self.inner.pair.lock().next.clone()
    }

    /// Number of completed iterations.
    pub fn rotations(&self) -> u64 {
        self.inner.pair.lock().rotations
    }

    /// Runs `f` on both players while holding the pair lock, so a rotation
    /// can never interleave with it.
    pub fn apply_to_players(&self, mut f: impl FnMut(&T)) -> &Self {
        let pair = self.inner.pair.lock();
        f(&pair.current);
        f(&pair.next);
        self
    }

    fn try_both(&self, mut f: impl FnMut(&T) -> PlayerResult<()>) -> PlayerResult<&Self> {
        let pair = self.inner.pair.lock();
        f(&pair.current)?;
        f(&pair.next)?;
        Ok(self)
    }

    /// Chains `next` behind `current` and routes `current`'s completion to
    /// the rotation.
    fn wire(&self, pair: &Pair<T>) -> PlayerResult<()> {
        let weak = Arc::downgrade(&self.inner);
        pair.current.set_on_completion_listener(move |_| {
            if let Some(inner) = weak.upgrade() {
                LoopMediaPlayer { inner }.rotate();
            }
        })?;
        pair.current.set_next_media_player(&pair.next)?;
        Ok(())
    }

    /// Called when `current` finished and the platform already started
    /// `next`.
    fn rotate(&self) {
        let finished = {
            let mut pair = self.inner.pair.lock();
            let following = match pair.next.copy() {
                Ok(player) => player,
                Err(e) => {
                    error!(error = %e, "could not copy loop player; looping stops");
                    return;
                }
            };
            pair.generation += 1;
            pair.rotations += 1;
            pair.next_ready = false;
            let generation = pair.generation;

            let previous_next = std::mem::replace(&mut pair.next, following);
            let finished = std::mem::replace(&mut pair.current, previous_next);

            let weak = Arc::downgrade(&self.inner);
            let prepared = pair.next.prepare_async(move |result| {
                if let Some(inner) = weak.upgrade() {
                    LoopMediaPlayer { inner }.on_next_ready(generation, result);
                }
            });
            if let Err(e) = prepared {
                error!(error = %e, "could not prepare next loop iteration");
            }
            debug!(rotations = pair.rotations, "loop rotated");
            finished
        };
        drop(finished);

        let listener = self.inner.listener.lock().clone();
        if let Some(listener) = listener {
            listener(self);
        }
    }

    fn on_next_ready(&self, generation: u64, result: PlayerResult<()>) {
        let mut pair = self.inner.pair.lock();
        if pair.generation != generation {
            debug!(generation, "ignoring stale loop preparation");
            return;
        }
        if let Err(e) = result {
            error!(error = %e, "next loop iteration failed to prepare; looping stops");
            return;
        }
        pair.next_ready = true;
        if let Err(e) = self.wire(&pair) {
            warn!(error = %e, "could not chain next loop iteration");
            pair.next_ready = false;
        }
    }

    fn invalidate(pair: &mut Pair<T>) {
        pair.generation += 1;
        pair.next_ready = false;
    }
}

impl<T: MediaPlayer> MediaPlayer for LoopMediaPlayer<T> {
    fn copy(&self) -> PlayerResult<Self> {
        Self::new(self.current().copy()?)
    }

    fn num_media_players(&self) -> usize {
        let pair = self.inner.pair.lock();
        pair.current.num_media_players() + pair.next.num_media_players()
    }

    fn prepare_async<F>(&self, on_ready: F) -> PlayerResult<&Self>
    where
        F: FnOnce(PlayerResult<()>) + Send + 'static,
    {
        let mut pair = self.inner.pair.lock();
        let generation = pair.generation;
        let weak = Arc::downgrade(&self.inner);
        let fork = Arc::new(ForkedListener::all(2, move |results: Vec<PlayerResult<()>>| {
            let outcome = first_error(results);
            if let Some(inner) = weak.upgrade() {
                let mut pair = inner.pair.lock();
                if pair.generation == generation && outcome.is_ok() {
                    pair.next_ready = true;
                }
            }
            on_ready(outcome);
        }));
        let report = |fork: &Arc<ForkedListener<PlayerResult<()>>>| {
            let fork = Arc::clone(fork);
            move |result: PlayerResult<()>| {
                if let Err(e) = fork.handle(result) {
                    warn!(error = %e, "loop preparation reported twice");
                }
            }
        };

        pair.current.prepare_async(report(&fork))?;
        if let Err(e) = pair.next.prepare_async(report(&fork)) {
            debug!(error = %e, "loop successor not preparable; using a fresh copy");
            let fresh = pair.current.copy()?;
            fresh.prepare_async(report(&fork))?;
            pair.next = fresh;
        }
        Ok(self)
    }

    fn apply_playback_params(&self) -> &Self {
        self.apply_to_players(|p| {
            p.apply_playback_params();
        })
    }

    fn start(&self) -> PlayerResult<&Self> {
        let pair = self.inner.pair.lock();
        if pair.next_ready && !pair.current.is_playing() {
            self.wire(&pair)?;
            pair.next.soft_reset()?;
        }
        pair.current.start()?;
        Ok(self)
    }

    fn pause(&self) -> PlayerResult<&Self> {
        self.inner.pair.lock().current.pause()?;
        Ok(self)
    }

    fn stop(&self) -> PlayerResult<&Self> {
        let mut pair = self.inner.pair.lock();
        pair.current.stop()?;
        let next = if pair.next_ready {
            pair.next.stop().map(|_| ())
        } else {
            // The successor may still be preparing and cannot be stopped.
            let fresh = pair.next.copy();
            fresh.map(|fresh| pair.next = fresh)
        };
        Self::invalidate(&mut pair);
        next?;
        Ok(self)
    }

    fn soft_reset(&self) -> PlayerResult<&Self> {
        self.inner.pair.lock().current.soft_reset()?;
        Ok(self)
    }

    fn reset(&self) -> PlayerResult<&Self> {
        let mut pair = self.inner.pair.lock();
        Self::invalidate(&mut pair);
        let current = pair.current.reset().map(|_| ());
        let next = pair.next.reset().map(|_| ());
        first_error(vec![current, next])?;
        Ok(self)
    }

    fn release(&self) -> PlayerResult<&Self> {
        let mut pair = self.inner.pair.lock();
        Self::invalidate(&mut pair);
        let current = pair.current.release().map(|_| ());
        let next = pair.next.release().map(|_| ());
        drop(pair);
        self.inner.listener.lock().take();
        first_error(vec![current, next])?;
        Ok(self)
    }

    fn is_playing(&self) -> bool {
        self.inner.pair.lock().current.is_playing()
    }

    fn seek_to_start(&self) -> PlayerResult<&Self> {
        self.inner.pair.lock().current.seek_to_start()?;
        Ok(self)
    }

    fn duration(&self) -> PlayerResult<Duration> {
        Err(PlayerError::Unsupported("duration", "LoopMediaPlayer"))
    }

    fn set_muted(&self, muted: bool) -> &Self {
        self.apply_to_players(|p| {
            p.set_muted(muted);
        })
    }

    fn set_volume(&self, volume: f32) -> &Self {
        self.apply_to_players(|p| {
            p.set_volume(volume);
        })
    }

    fn multiply_volume(&self, ratio: f32) -> &Self {
        self.apply_to_players(|p| {
            p.multiply_volume(ratio);
        })
    }

    fn set_speed(&self, speed: f32) -> &Self {
        self.apply_to_players(|p| {
            p.set_speed(speed);
        })
    }

    fn multiply_speed(&self, ratio: f32) -> &Self {
        self.apply_to_players(|p| {
            p.multiply_speed(ratio);
        })
    }

    fn set_pitch(&self, pitch: f32) -> &Self {
        self.apply_to_players(|p| {
            p.set_pitch(pitch);
        })
    }

    fn multiply_pitch(&self, ratio: f32) -> &Self {
        self.apply_to_players(|p| {
            p.multiply_pitch(ratio);
        })
    }

    fn set_next_media_player(&self, _next: &Self) -> PlayerResult<&Self> {
        Err(PlayerError::Unsupported(
            "set_next_media_player",
            "LoopMediaPlayer",
        ))
    }

    fn set_on_completion_listener<F>(&self, listener: F) -> PlayerResult<&Self>
    where
        F: Fn(&Self) + Send + Sync + 'static,
    {
        *self.inner.listener.lock() = Some(Arc::new(listener));
        Ok(self)
    }
}

impl<T: MediaPlayer + fmt::Debug> fmt::Debug for LoopMediaPlayer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(pair) = self.inner.pair.try_lock() else {
            return f.debug_struct("LoopMediaPlayer").finish_non_exhaustive();
        };
        f.debug_struct("LoopMediaPlayer")
            .field("current", &pair.current)
            .field("next", &pair.next)
            .field("next_ready", &pair.next_ready)
            .field("rotations", &pair.rotations)
            .finish()
    }
}
