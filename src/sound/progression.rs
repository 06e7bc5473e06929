//! An ordered list of stages, one of which is current.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::event::ForkedListener;

use super::error::{PlayerError, PlayerResult};
use super::{first_error, MediaPlayer};

/// Plays one stage at a time and moves between stages only while stopped
/// or paused.
///
/// Playback controls go to the current stage. Settings, preparation and
/// teardown go to every stage so that any of them can become current.
pub struct ProgressionMediaPlayer<T: MediaPlayer> {
    inner: Arc<ProgressionInner<T>>,
}

struct ProgressionInner<T> {
    stages: Vec<T>,
    index: Mutex<usize>,
}

impl<T: MediaPlayer> Clone for ProgressionMediaPlayer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: MediaPlayer> ProgressionMediaPlayer<T> {
    /// Creates a progression starting at the first of `stages`.
    ///
    /// # Errors
    ///
    /// Returns [`PlayerError::Empty`] if `stages` is empty.
    pub fn new(stages: Vec<T>) -> PlayerResult<Self> {
        if stages.is_empty() {
            return Err(PlayerError::Empty("ProgressionMediaPlayer"));
        }
        Ok(Self {
            inner: Arc::new(ProgressionInner {
                stages,
                index: Mutex::new(0),
            }),
        })
    }

    /// Handle to the current stage.
    pub fn current(&self) -> T {
        let index = *self.inner.index.lock();
        self.inner.stages[index].clone()
    }

    pub fn current_index(&self) -> usize {
        *self.inner.index.lock()
    }

    pub fn len(&self) -> usize {
        self.inner.stages.len()
    }

    /// Always false; a progression has at least one stage.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn stages(&self) -> &[T] {
        &self.inner.stages
    }

    /// Moves to the next stage, staying on the last one once reached.
    ///
    /// # Errors
    ///
    /// Returns [`PlayerError::AdvanceWhilePlaying`] if the current stage is
    /// playing.
    pub fn advance_and_cap(&self) -> PlayerResult<&Self> {
        let last = self.inner.stages.len() - 1;
        self.move_to(|index| (index + 1).min(last))
    }

    /// Moves to the next stage, wrapping to the first after the last.
    ///
    /// # Errors
    ///
    /// Returns [`PlayerError::AdvanceWhilePlaying`] if the current stage is
    /// playing.
    pub fn advance_and_rotate(&self) -> PlayerResult<&Self> {
        let len = self.inner.stages.len();
        self.move_to(|index| (index + 1) % len)
    }

    /// Moves back to the first stage.
    ///
    /// # Errors
    ///
    /// Returns [`PlayerError::AdvanceWhilePlaying`] if the current stage is
    /// playing.
    pub fn rewind(&self) -> PlayerResult<&Self> {
        self.move_to(|_| 0)
    }

    fn move_to(&self, step: impl FnOnce(usize) -> usize) -> PlayerResult<&Self> {
        let mut index = self.inner.index.lock();
        if self.inner.stages[*index].is_playing() {
            return Err(PlayerError::AdvanceWhilePlaying);
        }
        let from = *index;
        *index = step(from);
        debug!(from, to = *index, "progression moved");
        Ok(self)
    }

    fn for_each_stage(&self, mut f: impl FnMut(&T)) -> &Self {
        self.inner.stages.iter().for_each(|stage| f(stage));
        self
    }

    /// Runs `f` on every stage even if some fail, reporting the first error.
    fn try_every_stage(&self, f: impl Fn(&T) -> PlayerResult<()>) -> PlayerResult<&Self> {
        first_error(self.inner.stages.iter().map(f).collect())?;
        Ok(self)
    }
}

impl<T: MediaPlayer> MediaPlayer for ProgressionMediaPlayer<T> {
    fn copy(&self) -> PlayerResult<Self> {
        let stages = self
            .inner
            .stages
            .iter()
            .map(|stage| stage.copy())
            .collect::<PlayerResult<Vec<_>>>()?;
        let copy = Self::new(stages)?;
        *copy.inner.index.lock() = self.current_index();
        Ok(copy)
    }

    fn num_media_players(&self) -> usize {
        self.current().num_media_players()
    }

    fn prepare_async<F>(&self, on_ready: F) -> PlayerResult<&Self>
    where
        F: FnOnce(PlayerResult<()>) + Send + 'static,
    {
        let fork = Arc::new(ForkedListener::all(
            self.inner.stages.len(),
            move |results: Vec<PlayerResult<()>>| on_ready(first_error(results)),
        ));
        for stage in &self.inner.stages {
            let fork = Arc::clone(&fork);
            stage.prepare_async(move |result| {
                if let Err(e) = fork.handle(result) {
                    warn!(error = %e, "stage preparation reported twice");
                }
            })?;
        }
        Ok(self)
    }

    fn apply_playback_params(&self) -> &Self {
        self.for_each_stage(|stage| {
            stage.apply_playback_params();
        })
    }

    fn start(&self) -> PlayerResult<&Self> {
        self.current().start()?;
        Ok(self)
    }

    fn pause(&self) -> PlayerResult<&Self> {
        self.current().pause()?;
        Ok(self)
    }

    fn stop(&self) -> PlayerResult<&Self> {
        self.current().stop()?;
        Ok(self)
    }

    fn soft_reset(&self) -> PlayerResult<&Self> {
        self.current().soft_reset()?;
        Ok(self)
    }

    fn reset(&self) -> PlayerResult<&Self> {
        self.try_every_stage(|stage| stage.reset().map(|_| ()))
    }

    fn release(&self) -> PlayerResult<&Self> {
        self.try_every_stage(|stage| stage.release().map(|_| ()))
    }

    fn is_playing(&self) -> bool {
        self.current().is_playing()
    }

    fn seek_to_start(&self) -> PlayerResult<&Self> {
        self.current().seek_to_start()?;
        Ok(self)
    }

    fn duration(&self) -> PlayerResult<Duration> {
        self.current().duration()
    }

    fn set_muted(&self, muted: bool) -> &Self {
        self.for_each_stage(|stage| {
            stage.set_muted(muted);
        })
    }

    fn set_volume(&self, volume: f32) -> &Self {
        self.for_each_stage(|stage| {
            stage.set_volume(volume);
        })
    }

    fn multiply_volume(&self, ratio: f32) -> &Self {
        self.for_each_stage(|stage| {
            stage.multiply_volume(ratio);
        })
    }

    fn set_speed(&self, speed: f32) -> &Self {
        self.for_each_stage(|stage| {
            stage.set_speed(speed);
        })
    }

    fn multiply_speed(&self, ratio: f32) -> &Self {
        self.for_each_stage(|stage| {
            stage.multiply_speed(ratio);
        })
    }

    fn set_pitch(&self, pitch: f32) -> &Self {
        self.for_each_stage(|stage| {
            stage.set_pitch(pitch);
        })
    }

    fn multiply_pitch(&self, ratio: f32) -> &Self {
        self.for_each_stage(|stage| {
            stage.multiply_pitch(ratio);
        })
    }

    fn set_next_media_player(&self, next: &Self) -> PlayerResult<&Self> {
        self.current().set_next_media_player(&next.current())?;
        Ok(self)
    }

    fn set_on_completion_listener<F>(&self, listener: F) -> PlayerResult<&Self>
    where
        F: Fn(&Self) + Send + Sync + 'static,
    {
        let listener = Arc::new(listener);
        for stage in &self.inner.stages {
            let weak = Arc::downgrade(&self.inner);
            let listener = Arc::clone(&listener);
            stage.set_on_completion_listener(move |_| {
                if let Some(inner) = weak.upgrade() {
                    listener(&ProgressionMediaPlayer { inner });
                }
            })?;
        }
        Ok(self)
    }
}

impl<T: MediaPlayer + fmt::Debug> fmt::Debug for ProgressionMediaPlayer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressionMediaPlayer")
            .field("stages", &self.inner.stages)
            .field("index", &self.current_index())
            .finish()
    }
}
