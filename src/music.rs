//! The background music of a game.
//!
//! Three player graphs make up the music:
//!
//! - `main`: a progression of looping stages that gets one stage further
//!   after every break,
//! - `break_loop`: a single loop played during breaks,
//! - `transition`: a progression of cues played when a break ends.
//!
//! [`BackgroundMusic`] moves between them in response to [`GameEvent`]s.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::MusicConfig;
use crate::event::{EventHandler, ForkedListener};
use crate::sound::{
    first_error, ForwardingMediaPlayer, LoopMediaPlayer, MediaBackend, MediaPlayer, PlayerResult,
    ProgressionMediaPlayer, SoundSource,
};

// ============================================================================
// GameEvent
// ============================================================================

/// Game moments the music reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameEvent {
    /// The game starts.
    Start,
    /// A round ended and a break begins.
    Break,
    /// The break is ending; play the transition cue.
    TransitionIn,
    /// The next round starts.
    Continue,
    /// Little time is left in the round.
    HurryUp,
    /// The game is reset to its initial state.
    Reset,
    /// The game is left.
    Exit,
}

impl GameEvent {
    /// Every event, in game order.
    pub const ALL: [GameEvent; 7] = [
        GameEvent::Start,
        GameEvent::Break,
        GameEvent::TransitionIn,
        GameEvent::Continue,
        GameEvent::HurryUp,
        GameEvent::Reset,
        GameEvent::Exit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GameEvent::Start => "start",
            GameEvent::Break => "break",
            GameEvent::TransitionIn => "transition_in",
            GameEvent::Continue => "continue",
            GameEvent::HurryUp => "hurry_up",
            GameEvent::Reset => "reset",
            GameEvent::Exit => "exit",
        }
    }
}

impl fmt::Display for GameEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// BackgroundMusic
// ============================================================================

/// The background music graph, generic over the leaf player.
pub struct BackgroundMusic<T: MediaPlayer> {
    inner: Arc<MusicInner<T>>,
}

struct MusicInner<T: MediaPlayer> {
    main: ProgressionMediaPlayer<LoopMediaPlayer<T>>,
    break_loop: LoopMediaPlayer<T>,
    transition: ProgressionMediaPlayer<T>,
    hurry_up_speed: f32,
    transition_divisor: u32,
    hurried: AtomicBool,
    transition_interval: Mutex<Option<Duration>>,
}

impl<T: MediaPlayer> Clone for BackgroundMusic<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl BackgroundMusic<ForwardingMediaPlayer> {
    /// Builds the music described by `config` on `backend`.
    ///
    /// # Errors
    ///
    /// Returns an error if a resource cannot be created.
    pub fn from_config(backend: Arc<dyn MediaBackend>, config: &MusicConfig) -> PlayerResult<Self> {
        let leaf = |source: SoundSource| ForwardingMediaPlayer::new(Arc::clone(&backend), source);
        let main = config
            .main_stages
            .iter()
            .map(|source| leaf(source.clone()))
            .collect::<PlayerResult<Vec<_>>>()?;
        let transitions = config
            .transitions
            .iter()
            .map(|source| leaf(source.clone()))
            .collect::<PlayerResult<Vec<_>>>()?;
        let break_track = leaf(config.break_track.clone())?;

        let music = Self::from_players(
            main,
            break_track,
            transitions,
            config.hurry_up_speed,
            config.transition_divisor,
        )?;
        music.set_volume(config.volume);
        Ok(music)
    }
}

impl<T: MediaPlayer> BackgroundMusic<T> {
    /// Builds the music from unprepared leaf players.
    ///
    /// # Errors
    ///
    /// Returns an error if `main_stages` or `transitions` is empty or a
    /// player cannot be copied for looping.
    pub fn from_players(
        main_stages: Vec<T>,
        break_track: T,
        transitions: Vec<T>,
        hurry_up_speed: f32,
        transition_divisor: u32,
    ) -> PlayerResult<Self> {
        let main = main_stages
            .into_iter()
            .map(LoopMediaPlayer::new)
            .collect::<PlayerResult<Vec<_>>>()?;
        Ok(Self {
            inner: Arc::new(MusicInner {
                main: ProgressionMediaPlayer::new(main)?,
                break_loop: LoopMediaPlayer::new(break_track)?,
                transition: ProgressionMediaPlayer::new(transitions)?,
                hurry_up_speed,
                transition_divisor: transition_divisor.max(1),
                hurried: AtomicBool::new(false),
                transition_interval: Mutex::new(None),
            }),
        })
    }

    pub fn main(&self) -> &ProgressionMediaPlayer<LoopMediaPlayer<T>> {
        &self.inner.main
    }

    pub fn break_loop(&self) -> &LoopMediaPlayer<T> {
        &self.inner.break_loop
    }

    pub fn transition(&self) -> &ProgressionMediaPlayer<T> {
        &self.inner.transition
    }

    /// Returns true between hurry-up and the next reset.
    pub fn is_hurried(&self) -> bool {
        self.inner.hurried.load(Ordering::SeqCst)
    }

    /// The continue interval suggested by the last [`Self::start_continue`]
    /// that followed a transition.
    pub fn last_transition_interval(&self) -> Option<Duration> {
        *self.inner.transition_interval.lock()
    }

    /// Prepares all three graphs; `on_ready` runs once all are done.
    ///
    /// # Errors
    ///
    /// Returns an error if a graph cannot start preparing.
    pub fn prepare_async<F>(&self, on_ready: F) -> PlayerResult<()>
    where
        F: FnOnce(PlayerResult<()>) + Send + 'static,
    {
        let fork = Arc::new(ForkedListener::all(3, move |results: Vec<PlayerResult<()>>| {
            on_ready(first_error(results));
        }));
        let report = |fork: &Arc<ForkedListener<PlayerResult<()>>>| {
            let fork = Arc::clone(fork);
            move |result: PlayerResult<()>| {
                if let Err(e) = fork.handle(result) {
                    warn!(error = %e, "music preparation reported twice");
                }
            }
        };
        self.inner.main.prepare_async(report(&fork))?;
        self.inner.break_loop.prepare_async(report(&fork))?;
        self.inner.transition.prepare_async(report(&fork))?;
        Ok(())
    }

    /// Sets the volume of all music.
    pub fn set_volume(&self, volume: f32) {
        self.inner.main.set_volume(volume);
        self.inner.break_loop.set_volume(volume);
        self.inner.transition.set_volume(volume);
    }

    /// Starts (or resumes) the main music.
    ///
    /// # Errors
    ///
    /// Returns an error if the music is not prepared.
    pub fn start(&self) -> PlayerResult<()> {
        self.inner.main.start()?;
        debug!(stage = self.inner.main.current_index(), "main music started");
        Ok(())
    }

    /// Switches to the break music and moves the main music one stage on.
    ///
    /// # Errors
    ///
    /// Returns an error if a player rejects the transition.
    pub fn start_break(&self) -> PlayerResult<()> {
        self.inner.main.pause()?;
        self.inner.break_loop.start()?;
        self.inner.main.advance_and_cap()?;
        self.inner.transition.soft_reset()?;
        debug!(next_stage = self.inner.main.current_index(), "break started");
        Ok(())
    }

    /// Leaves the break music for the transition cue.
    ///
    /// # Errors
    ///
    /// Returns an error if a player rejects the transition.
    pub fn start_transition_in(&self) -> PlayerResult<()> {
        self.inner.break_loop.pause()?;
        self.inner.transition.start()?;
        self.inner.break_loop.soft_reset()?;
        debug!(cue = self.inner.transition.current_index(), "transition started");
        Ok(())
    }

    /// Resumes the main music.
    ///
    /// If the transition cue is playing it is stopped and the next cue
    /// queued; the returned interval is the new cue's length divided by the
    /// configured divisor.
    ///
    /// # Errors
    ///
    /// Returns an error if a player rejects the transition.
    pub fn start_continue(&self) -> PlayerResult<Option<Duration>> {
        let mut interval = None;
        if self.inner.transition.is_playing() {
            self.inner.transition.pause()?;
            self.inner.transition.advance_and_cap()?;
            let scaled = self.inner.transition.duration()? / self.inner.transition_divisor;
            *self.inner.transition_interval.lock() = Some(scaled);
            interval = Some(scaled);
        }
        self.inner.main.start()?;
        debug!(?interval, "continued");
        Ok(interval)
    }

    /// Speeds the main music up. Only the first call per game has an
    /// effect; returns whether this call did.
    ///
    /// # Errors
    ///
    /// Returns an error if the main music cannot be restarted.
    pub fn start_hurry_up(&self) -> PlayerResult<bool> {
        if self.inner.hurried.swap(true, Ordering::SeqCst) {
            return Ok(false);
        }
        let main = &self.inner.main;
        let was_playing = main.is_playing();
        if was_playing {
            main.pause()?;
        }
        main.multiply_speed(self.inner.hurry_up_speed);
        if was_playing {
            main.start()?;
        }
        info!(speed = self.inner.hurry_up_speed, "hurry up");
        Ok(true)
    }

    /// Returns everything to the start of the game.
    ///
    /// # Errors
    ///
    /// Returns an error if a player rejects the transition.
    pub fn reset(&self) -> PlayerResult<()> {
        let inner = &self.inner;
        for stage in inner.main.stages() {
            stage.soft_reset()?;
        }
        inner.main.rewind()?;
        inner.break_loop.soft_reset()?;
        for cue in inner.transition.stages() {
            cue.soft_reset()?;
        }
        inner.transition.rewind()?;
        if inner.hurried.swap(false, Ordering::SeqCst) {
            inner.main.multiply_speed(inner.hurry_up_speed.recip());
        }
        *inner.transition_interval.lock() = None;
        debug!("music reset");
        Ok(())
    }

    /// Resets and releases every player.
    ///
    /// # Errors
    ///
    /// Returns the first error; every player is still released.
    pub fn exit(&self) -> PlayerResult<()> {
        let inner = &self.inner;
        let results = vec![
            inner.main.reset().map(|_| ()),
            inner.break_loop.reset().map(|_| ()),
            inner.transition.reset().map(|_| ()),
            inner.main.release().map(|_| ()),
            inner.break_loop.release().map(|_| ()),
            inner.transition.release().map(|_| ()),
        ];
        debug!("music released");
        first_error(results)
    }

    /// Applies `event`.
    ///
    /// # Errors
    ///
    /// Returns an error if a player rejects the transition.
    pub fn handle(&self, event: GameEvent) -> PlayerResult<()> {
        match event {
            GameEvent::Start => self.start(),
            GameEvent::Break => self.start_break(),
            GameEvent::TransitionIn => self.start_transition_in(),
            GameEvent::Continue => self.start_continue().map(|_| ()),
            GameEvent::HurryUp => self.start_hurry_up().map(|_| ()),
            GameEvent::Reset => self.reset(),
            GameEvent::Exit => self.exit(),
        }
    }

    /// Subscribes the music to every [`GameEvent`] on `handler` under `tag`.
    /// Failures are logged.
    pub fn subscribe(&self, handler: &EventHandler<GameEvent>, tag: &str) {
        for event in GameEvent::ALL {
            let music = self.clone();
            handler.subscribe(&[event], tag, move || {
                if let Err(e) = music.handle(event) {
                    warn!(%event, error = %e, "music could not follow game event");
                }
            });
        }
    }
}

impl<T: MediaPlayer> fmt::Debug for BackgroundMusic<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackgroundMusic")
            .field("main_stage", &self.inner.main.current_index())
            .field("transition_cue", &self.inner.transition.current_index())
            .field("hurried", &self.is_hurried())
            .finish_non_exhaustive()
    }
}
