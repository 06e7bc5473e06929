//! Deterministic fakes for exercising players without audio hardware.
//!
//! [`FakeClock`] is a manual scheduler: nothing happens until
//! [`FakeClock::advance`] is called, at which point every job due up to the
//! target time runs in order. [`FakeMediaPlayer`] is a leaf [`MediaPlayer`]
//! whose preparation and playback are timed by such a clock, and
//! [`FakeBackend`] provides clock-driven [`PlatformPlayer`]s for
//! [`super::ForwardingMediaPlayer`].

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::warn;

use super::error::{PlayerError, PlayerResult};
use super::lifecycle;
use super::platform::{CompletionCallback, MediaBackend, PlatformPlayer, PreparedCallback};
use super::source::SoundSource;
use super::{MediaPlayer, PlayerState};

/// Preparation time used by fakes unless configured otherwise.
pub const DEFAULT_PREPARE_MILLIS: u64 = 10;

/// Resource length used by fakes unless configured otherwise.
pub const DEFAULT_DURATION_MILLIS: u64 = 1_000;

static NEXT_FAKE_ID: AtomicUsize = AtomicUsize::new(0);

fn next_fake_id() -> usize {
    NEXT_FAKE_ID.fetch_add(1, Ordering::Relaxed)
}

// ============================================================================
// FakeClock
// ============================================================================

type Job = Box<dyn FnOnce() + Send>;

struct ScheduledJob {
    tag: String,
    at: u64,
    seq: u64,
    job: Job,
}

#[derive(Default)]
struct ClockState {
    now: u64,
    seq: u64,
    events: Vec<ScheduledJob>,
}

/// A manually advanced millisecond clock with a job queue.
///
/// Jobs are always queued, even when already due, so scheduling from inside
/// a running job never re-enters the caller.
#[derive(Clone, Default)]
pub struct FakeClock {
    state: Arc<Mutex<ClockState>>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current time in milliseconds.
    pub fn now_millis(&self) -> u64 {
        self.state.lock().now
    }

    /// Moves the clock without running anything.
    pub fn set_now(&self, millis: u64) {
        self.state.lock().now = millis;
    }

    /// Queues `job` to run at `at` milliseconds under `tag`.
    pub fn execute_at(&self, tag: impl Into<String>, at: u64, job: impl FnOnce() + Send + 'static) {
        let mut state = self.state.lock();
        let seq = state.seq;
        state.seq += 1;
        state.events.push(ScheduledJob {
            tag: tag.into(),
            at,
            seq,
            job: Box::new(job),
        });
    }

    /// Queues `job` to run `delay` milliseconds from now.
    pub fn execute_after(&self, tag: impl Into<String>, delay: u64, job: impl FnOnce() + Send + 'static) {
        let at = self.now_millis() + delay;
        self.execute_at(tag, at, job);
    }

    /// Drops every queued job carrying `tag`.
    pub fn cancel_events(&self, tag: &str) {
        self.state.lock().events.retain(|event| event.tag != tag);
    }

    pub fn clear_events(&self) {
        self.state.lock().events.clear();
    }

    pub fn pending_events(&self) -> usize {
        self.state.lock().events.len()
    }

    /// Advances the clock by `millis`, running due jobs in time order.
    ///
    /// While a job runs, [`Self::now_millis`] reports the time it was
    /// scheduled for. Jobs queued by running jobs are picked up if they fall
    /// inside the window.
    pub fn advance(&self, millis: u64) {
        let target = self.now_millis() + millis;
        loop {
            let job = {
                let mut state = self.state.lock();
                let due = state
                    .events
                    .iter()
                    .enumerate()
                    .filter(|(_, event)| event.at <= target)
                    .min_by_key(|(_, event)| (event.at, event.seq))
                    .map(|(index, _)| index);
                let Some(index) = due else {
                    break;
                };
                let event = state.events.remove(index);
                state.now = state.now.max(event.at);
                event.job
            };
            job();
        }
        let mut state = self.state.lock();
        state.now = state.now.max(target);
    }

    /// Runs every job that is already due.
    pub fn run_due(&self) {
        self.advance(0);
    }
}

impl fmt::Debug for FakeClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("FakeClock")
            .field("now", &state.now)
            .field("pending", &state.events.len())
            .finish()
    }
}

// ============================================================================
// FakeMediaPlayer
// ============================================================================

type FakeListener = Arc<dyn Fn(&FakeMediaPlayer) + Send + Sync>;

/// A leaf player timed by a [`FakeClock`].
#[derive(Clone)]
pub struct FakeMediaPlayer {
    inner: Arc<FakeInner>,
}

struct FakeInner {
    id: usize,
    clock: FakeClock,
    state: Mutex<FakeState>,
}

struct FakeState {
    prepare_millis: u64,
    duration_millis: u64,
    prepare_failure: Option<String>,
    state: PlayerState,
    start_time: Option<u64>,
    play_task: Option<String>,
    remaining_millis: Option<u64>,
    muted: bool,
    volume: f32,
    speed: f32,
    pitch: f32,
    params_applied: usize,
    next: Option<FakeMediaPlayer>,
    listener: Option<FakeListener>,
}

impl FakeMediaPlayer {
    /// Creates an initialized player with default timings.
    pub fn new(clock: &FakeClock) -> Self {
        Self::with_timing(clock, DEFAULT_PREPARE_MILLIS, DEFAULT_DURATION_MILLIS)
    }

    /// Creates an initialized player that takes `prepare_millis` to prepare
    /// and plays for `duration_millis`.
    pub fn with_timing(clock: &FakeClock, prepare_millis: u64, duration_millis: u64) -> Self {
        Self {
            inner: Arc::new(FakeInner {
                id: next_fake_id(),
                clock: clock.clone(),
                state: Mutex::new(FakeState {
                    prepare_millis,
                    duration_millis,
                    prepare_failure: None,
                    state: PlayerState::Initialized,
                    start_time: None,
                    play_task: None,
                    remaining_millis: None,
                    muted: false,
                    volume: 1.0,
                    speed: 1.0,
                    pitch: 1.0,
                    params_applied: 0,
                    next: None,
                    listener: None,
                }),
            }),
        }
    }

    /// Makes every future preparation of this player (and its copies) fail.
    pub fn fail_preparation(&self, reason: impl Into<String>) -> &Self {
        self.inner.state.lock().prepare_failure = Some(reason.into());
        self
    }

    /// Prepares synchronously, skipping the clock.
    pub fn prepare(&self) -> PlayerResult<&Self> {
        let mut state = self.inner.state.lock();
        lifecycle::prepare(state.state)?;
        state.state = PlayerState::Prepared;
        Ok(self)
    }

    pub fn id(&self) -> usize {
        self.inner.id
    }

    pub fn state(&self) -> PlayerState {
        self.inner.state.lock().state
    }

    pub fn clock(&self) -> &FakeClock {
        &self.inner.clock
    }

    /// Clock time of the current play task's start, if playing.
    pub fn start_time(&self) -> Option<u64> {
        self.inner.state.lock().start_time
    }

    /// Tag of the scheduled completion, if playing.
    pub fn play_task(&self) -> Option<String> {
        self.inner.state.lock().play_task.clone()
    }

    /// Milliseconds left to play when paused mid-way.
    pub fn remaining_millis(&self) -> Option<u64> {
        self.inner.state.lock().remaining_millis
    }

    pub fn is_muted(&self) -> bool {
        self.inner.state.lock().muted
    }

    pub fn volume(&self) -> f32 {
        self.inner.state.lock().volume
    }

    /// Zero while muted, the stored volume otherwise.
    pub fn effective_volume(&self) -> f32 {
        let state = self.inner.state.lock();
        if state.muted {
            0.0
        } else {
            state.volume
        }
    }

    pub fn speed(&self) -> f32 {
        self.inner.state.lock().speed
    }

    pub fn pitch(&self) -> f32 {
        self.inner.state.lock().pitch
    }

    /// How many times speed and pitch were pushed to the "platform".
    pub fn params_applied(&self) -> usize {
        self.inner.state.lock().params_applied
    }

    pub fn next_media_player(&self) -> Option<FakeMediaPlayer> {
        self.inner.state.lock().next.clone()
    }

    pub fn has_completion_listener(&self) -> bool {
        self.inner.state.lock().listener.is_some()
    }

    pub fn duration_millis(&self) -> u64 {
        self.inner.state.lock().duration_millis
    }

    pub fn prepare_millis(&self) -> u64 {
        self.inner.state.lock().prepare_millis
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn cancel_and_reset(&self, state: &mut FakeState) {
        if let Some(task) = state.play_task.take() {
            self.inner.clock.cancel_events(&task);
        }
        state.start_time = None;
        state.remaining_millis = None;
    }

    fn schedule_completion(&self, state: &mut FakeState) {
        let now = self.inner.clock.now_millis();
        let remaining = *state.remaining_millis.get_or_insert(state.duration_millis);
        let task = format!("fake-{}-play-{}", self.inner.id, now);
        state.start_time = Some(now);
        state.play_task = Some(task.clone());

        let player = self.clone();
        self.inner
            .clock
            .execute_at(task, now + remaining, move || player.complete());
    }

    fn complete(&self) {
        let (next, listener) = {
            let mut state = self.inner.state.lock();
            if state.state != PlayerState::Started {
                return;
            }
            state.state = PlayerState::PlaybackCompleted;
            state.play_task = None;
            state.start_time = None;
            state.remaining_millis = None;
            (state.next.take(), state.listener.clone())
        };
        if let Some(next) = next {
            if let Err(e) = next.start() {
                warn!(player = next.id(), error = %e, "chained player failed to start");
            }
        }
        if let Some(listener) = listener {
            listener(self);
        }
    }

    fn update(&self, update: impl FnOnce(&mut FakeState)) -> &Self {
        update(&mut self.inner.state.lock());
        self
    }
}

impl MediaPlayer for FakeMediaPlayer {
    fn copy(&self) -> PlayerResult<Self> {
        let state = self.inner.state.lock();
        let copy = Self::with_timing(&self.inner.clock, state.prepare_millis, state.duration_millis);
        copy.update(|c| {
            c.prepare_failure = state.prepare_failure.clone();
            c.muted = state.muted;
            c.volume = state.volume;
            c.speed = state.speed;
            c.pitch = state.pitch;
        });
        Ok(copy)
    }

    fn num_media_players(&self) -> usize {
        1
    }

    fn prepare_async<F>(&self, on_ready: F) -> PlayerResult<&Self>
    where
        F: FnOnce(PlayerResult<()>) + Send + 'static,
    {
        let prepare_millis = {
            let mut state = self.inner.state.lock();
            state.state = lifecycle::prepare(state.state)?;
            state.prepare_millis
        };
        let player = self.clone();
        let now = self.inner.clock.now_millis();
        self.inner.clock.execute_at(
            format!("fake-{}-prepare-{}", self.inner.id, now),
            now + prepare_millis,
            move || {
                let outcome = {
                    let mut state = player.inner.state.lock();
                    if state.state != PlayerState::Preparing {
                        Err(PlayerError::illegal("finish preparing", state.state))
                    } else if let Some(reason) = state.prepare_failure.clone() {
                        state.state = PlayerState::Idle;
                        Err(PlayerError::Prepare {
                            resource: format!("fake-{}", player.inner.id),
                            reason,
                        })
                    } else {
                        state.state = PlayerState::Prepared;
                        Ok(())
                    }
                };
                on_ready(outcome);
            },
        );
        Ok(self)
    }

    fn apply_playback_params(&self) -> &Self {
        self.update(|s| {
            if s.state.is_prepared() {
                s.params_applied += 1;
            }
        })
    }

    fn start(&self) -> PlayerResult<&Self> {
        {
            let mut state = self.inner.state.lock();
            match lifecycle::start(state.state)? {
                Some(next) => state.state = next,
                None => return Ok(self),
            }
            self.schedule_completion(&mut state);
        }
        Ok(self.apply_playback_params())
    }

    fn pause(&self) -> PlayerResult<&Self> {
        let mut state = self.inner.state.lock();
        if lifecycle::pause(state.state)?.is_none() {
            return Ok(self);
        }
        let elapsed = state
            .start_time
            .map_or(0, |start| self.inner.clock.now_millis().saturating_sub(start));
        let remaining = state
            .remaining_millis
            .unwrap_or(state.duration_millis)
            .saturating_sub(elapsed);
        if let Some(task) = state.play_task.take() {
            self.inner.clock.cancel_events(&task);
        }
        state.start_time = None;
        state.remaining_millis = Some(remaining);
        state.state = PlayerState::Paused;
        Ok(self)
    }

    fn stop(&self) -> PlayerResult<&Self> {
        let mut state = self.inner.state.lock();
        if lifecycle::stop(state.state)?.is_none() {
            return Ok(self);
        }
        self.cancel_and_reset(&mut state);
        state.next = None;
        state.state = PlayerState::Stopped;
        Ok(self)
    }

    fn soft_reset(&self) -> PlayerResult<&Self> {
        self.pause()?.seek_to_start()
    }

    fn reset(&self) -> PlayerResult<&Self> {
        let mut state = self.inner.state.lock();
        state.state = lifecycle::reset(state.state)?;
        self.cancel_and_reset(&mut state);
        state.next = None;
        Ok(self)
    }

    fn release(&self) -> PlayerResult<&Self> {
        let mut state = self.inner.state.lock();
        state.state = lifecycle::release(state.state)?;
        self.cancel_and_reset(&mut state);
        state.next = None;
        state.listener = None;
        Ok(self)
    }

    fn is_playing(&self) -> bool {
        self.state() == PlayerState::Started
    }

    fn seek_to_start(&self) -> PlayerResult<&Self> {
        let mut state = self.inner.state.lock();
        lifecycle::seek(state.state)?;
        self.cancel_and_reset(&mut state);
        if state.state == PlayerState::Started {
            self.schedule_completion(&mut state);
        }
        Ok(self)
    }

    fn duration(&self) -> PlayerResult<Duration> {
        let state = self.inner.state.lock();
        lifecycle::duration(state.state)?;
        Ok(Duration::from_millis(state.duration_millis))
    }

    fn set_muted(&self, muted: bool) -> &Self {
        self.update(|s| s.muted = muted)
    }

    fn set_volume(&self, volume: f32) -> &Self {
        self.update(|s| s.volume = volume)
    }

    fn multiply_volume(&self, ratio: f32) -> &Self {
        self.update(|s| s.volume *= ratio)
    }

    fn set_speed(&self, speed: f32) -> &Self {
        self.update(|s| s.speed = speed)
    }

    fn multiply_speed(&self, ratio: f32) -> &Self {
        self.update(|s| s.speed *= ratio)
    }

    fn set_pitch(&self, pitch: f32) -> &Self {
        self.update(|s| s.pitch = pitch)
    }

    fn multiply_pitch(&self, ratio: f32) -> &Self {
        self.update(|s| s.pitch *= ratio)
    }

    fn set_next_media_player(&self, next: &Self) -> PlayerResult<&Self> {
        if self.ptr_eq(next) {
            return Err(PlayerError::illegal("chain itself while", self.state()));
        }
        lifecycle::chain(next.state())?;
        let mut state = self.inner.state.lock();
        lifecycle::chain(state.state)?;
        state.next = Some(next.clone());
        Ok(self)
    }

    fn set_on_completion_listener<F>(&self, listener: F) -> PlayerResult<&Self>
    where
        F: Fn(&Self) + Send + Sync + 'static,
    {
        let mut state = self.inner.state.lock();
        if state.state == PlayerState::End {
            return Err(PlayerError::Released("set a completion listener on"));
        }
        state.listener = Some(Arc::new(listener));
        Ok(self)
    }
}

impl fmt::Debug for FakeMediaPlayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FakeMediaPlayer")
            .field("id", &self.inner.id)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// FakeBackend
// ============================================================================

/// A [`MediaBackend`] whose resources are timed by a [`FakeClock`].
pub struct FakeBackend {
    clock: FakeClock,
    prepare_millis: u64,
    default_duration_millis: u64,
    durations: HashMap<String, u64>,
    failures: HashSet<String>,
    created: Mutex<Vec<Arc<FakePlatformPlayer>>>,
}

impl FakeBackend {
    pub fn new(clock: &FakeClock) -> Self {
        Self {
            clock: clock.clone(),
            prepare_millis: DEFAULT_PREPARE_MILLIS,
            default_duration_millis: DEFAULT_DURATION_MILLIS,
            durations: HashMap::new(),
            failures: HashSet::new(),
            created: Mutex::new(Vec::new()),
        }
    }

    /// Sets the length of resources named `name`.
    #[must_use]
    pub fn with_duration(mut self, name: impl Into<String>, millis: u64) -> Self {
        self.durations.insert(name.into(), millis);
        self
    }

    /// Makes preparation of resources named `name` fail.
    #[must_use]
    pub fn with_failure(mut self, name: impl Into<String>) -> Self {
        self.failures.insert(name.into());
        self
    }

    #[must_use]
    pub fn with_prepare_millis(mut self, millis: u64) -> Self {
        self.prepare_millis = millis;
        self
    }

    pub fn prepare_millis(&self) -> u64 {
        self.prepare_millis
    }

    /// Every resource created so far, oldest first.
    pub fn created(&self) -> Vec<Arc<FakePlatformPlayer>> {
        self.created.lock().clone()
    }

    /// Resources created for `name` that have not been released.
    pub fn live(&self, name: &str) -> Vec<Arc<FakePlatformPlayer>> {
        self.created
            .lock()
            .iter()
            .filter(|p| p.source().name() == name && !p.is_released())
            .cloned()
            .collect()
    }
}

impl MediaBackend for FakeBackend {
    fn create(&self, source: &SoundSource) -> PlayerResult<Arc<dyn PlatformPlayer>> {
        let name = source.name();
        let player = Arc::new(FakePlatformPlayer {
            core: Arc::new(PlatformCore {
                id: next_fake_id(),
                source: source.clone(),
                clock: self.clock.clone(),
                prepare_millis: self.prepare_millis,
                duration_millis: self
                    .durations
                    .get(name)
                    .copied()
                    .unwrap_or(self.default_duration_millis),
                fails: self.failures.contains(name),
                state: Mutex::new(PlatformState {
                    volume: 1.0,
                    speed: 1.0,
                    pitch: 1.0,
                    ..PlatformState::default()
                }),
            }),
        });
        self.created.lock().push(player.clone());
        Ok(player)
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

#[derive(Default)]
struct PlatformState {
    prepared: bool,
    playing: bool,
    released: bool,
    volume: f32,
    speed: f32,
    pitch: f32,
    start_time: Option<u64>,
    remaining_millis: Option<u64>,
    play_task: Option<String>,
    next: Option<Arc<dyn PlatformPlayer>>,
    on_completion: Option<Arc<dyn Fn() + Send + Sync>>,
}

struct PlatformCore {
    id: usize,
    source: SoundSource,
    clock: FakeClock,
    prepare_millis: u64,
    duration_millis: u64,
    fails: bool,
    state: Mutex<PlatformState>,
}

/// A clock-driven platform resource with introspection for tests.
pub struct FakePlatformPlayer {
    core: Arc<PlatformCore>,
}

impl FakePlatformPlayer {
    pub fn source(&self) -> &SoundSource {
        &self.core.source
    }

    pub fn is_prepared(&self) -> bool {
        self.core.state.lock().prepared
    }

    pub fn is_playing(&self) -> bool {
        self.core.state.lock().playing
    }

    pub fn is_released(&self) -> bool {
        self.core.state.lock().released
    }

    pub fn volume(&self) -> f32 {
        self.core.state.lock().volume
    }

    pub fn speed(&self) -> f32 {
        self.core.state.lock().speed
    }

    pub fn pitch(&self) -> f32 {
        self.core.state.lock().pitch
    }

    pub fn has_next(&self) -> bool {
        self.core.state.lock().next.is_some()
    }
}

impl PlatformCore {
    fn halt(&self, state: &mut PlatformState) {
        if let Some(task) = state.play_task.take() {
            self.clock.cancel_events(&task);
        }
        state.playing = false;
        state.start_time = None;
        state.remaining_millis = None;
    }

    fn play(core: &Arc<Self>) {
        let mut state = core.state.lock();
        if state.playing || !state.prepared || state.released {
            return;
        }
        let now = core.clock.now_millis();
        let remaining = *state.remaining_millis.get_or_insert(core.duration_millis);
        let task = format!("fake-platform-{}-play-{}", core.id, now);
        state.playing = true;
        state.start_time = Some(now);
        state.play_task = Some(task.clone());

        let weak = Arc::downgrade(core);
        core.clock.execute_at(task, now + remaining, move || {
            if let Some(core) = weak.upgrade() {
                core.complete();
            }
        });
    }

    fn complete(&self) {
        let (next, callback) = {
            let mut state = self.state.lock();
            if !state.playing {
                return;
            }
            state.playing = false;
            state.play_task = None;
            state.start_time = None;
            state.remaining_millis = None;
            (state.next.take(), state.on_completion.clone())
        };
        if let Some(next) = next {
            next.start();
        }
        if let Some(callback) = callback {
            callback();
        }
    }
}

impl PlatformPlayer for FakePlatformPlayer {
    fn prepare_async(&self, on_prepared: PreparedCallback) {
        let core = Arc::clone(&self.core);
        let now = core.clock.now_millis();
        let at = now + core.prepare_millis;
        self.core.clock.execute_at(
            format!("fake-platform-{}-prepare-{}", core.id, now),
            at,
            move || {
                let result = if core.fails {
                    Err(core.source.prepare_error("fake preparation failure"))
                } else {
                    core.state.lock().prepared = true;
                    Ok(Duration::from_millis(core.duration_millis))
                };
                on_prepared(result);
            },
        );
    }

    fn start(&self) {
        PlatformCore::play(&self.core);
    }

    fn pause(&self) {
        let mut state = self.core.state.lock();
        if !state.playing {
            return;
        }
        let now = self.core.clock.now_millis();
        let elapsed = state.start_time.map_or(0, |start| now.saturating_sub(start));
        let remaining = state
            .remaining_millis
            .unwrap_or(self.core.duration_millis)
            .saturating_sub(elapsed);
        self.core.halt(&mut state);
        state.remaining_millis = Some(remaining);
    }

    fn stop(&self) {
        let mut state = self.core.state.lock();
        self.core.halt(&mut state);
        state.prepared = false;
    }

    fn reset(&self) {
        let mut state = self.core.state.lock();
        self.core.halt(&mut state);
        state.prepared = false;
        state.next = None;
    }

    fn release(&self) {
        let mut state = self.core.state.lock();
        self.core.halt(&mut state);
        state.prepared = false;
        state.released = true;
        state.next = None;
        state.on_completion = None;
    }

    fn seek_to_start(&self) {
        let was_playing = {
            let mut state = self.core.state.lock();
            let was_playing = state.playing;
            self.core.halt(&mut state);
            was_playing
        };
        if was_playing {
            PlatformCore::play(&self.core);
        }
    }

    fn set_volume(&self, volume: f32) {
        self.core.state.lock().volume = volume;
    }

    fn set_playback_params(&self, speed: f32, pitch: f32) {
        let mut state = self.core.state.lock();
        state.speed = speed;
        state.pitch = pitch;
    }

    fn set_next(&self, next: Option<Arc<dyn PlatformPlayer>>) {
        self.core.state.lock().next = next;
    }

    fn set_on_completion(&self, callback: CompletionCallback) {
        self.core.state.lock().on_completion = Some(Arc::from(callback));
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_runs_jobs_in_time_order() {
        let clock = FakeClock::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for (tag, at) in [("c", 30), ("a", 10), ("b", 20), ("late", 100)] {
            let log = log.clone();
            clock.execute_at(tag, at, move || log.lock().push(tag));
        }

        clock.advance(50);
        assert_eq!(*log.lock(), vec!["a", "b", "c"]);
        assert_eq!(clock.now_millis(), 50);
        assert_eq!(clock.pending_events(), 1);
    }

    #[test]
    fn test_clock_reports_job_time_while_running() {
        let clock = FakeClock::new();
        let seen = Arc::new(Mutex::new(None));
        let (probe, slot) = (clock.clone(), seen.clone());
        clock.execute_at("probe", 40, move || *slot.lock() = Some(probe.now_millis()));
        clock.advance(100);
        assert_eq!(*seen.lock(), Some(40));
    }

    #[test]
    fn test_clock_runs_jobs_scheduled_by_jobs() {
        let clock = FakeClock::new();
        let count = Arc::new(AtomicUsize::new(0));
        let (inner_clock, counter) = (clock.clone(), count.clone());
        clock.execute_at("outer", 10, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            let counter = counter.clone();
            inner_clock.execute_after("inner", 10, move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        });
        clock.advance(25);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_clock_cancel_events() {
        let clock = FakeClock::new();
        clock.execute_at("keep", 5, || {});
        clock.execute_at("drop", 5, || panic!("cancelled job ran"));
        clock.cancel_events("drop");
        clock.advance(10);
        assert_eq!(clock.pending_events(), 0);
    }

    #[test]
    fn test_fake_player_plays_for_its_duration() {
        let clock = FakeClock::new();
        let player = FakeMediaPlayer::with_timing(&clock, 10, 500);
        player.prepare_async(|result| assert!(result.is_ok())).unwrap();
        assert_eq!(player.state(), PlayerState::Preparing);

        clock.advance(10);
        player.start().unwrap();
        assert_eq!(player.start_time(), Some(10));
        assert!(player.play_task().is_some());

        clock.advance(499);
        assert!(player.is_playing());
        clock.advance(1);
        assert_eq!(player.state(), PlayerState::PlaybackCompleted);
        assert!(player.play_task().is_none());
    }

    #[test]
    fn test_fake_player_pause_keeps_remaining_time() {
        let clock = FakeClock::new();
        let player = FakeMediaPlayer::with_timing(&clock, 0, 1_000);
        player.prepare().unwrap().start().unwrap();

        clock.advance(300);
        player.pause().unwrap();
        assert_eq!(player.remaining_millis(), Some(700));

        clock.advance(5_000);
        assert_eq!(player.state(), PlayerState::Paused);

        player.start().unwrap();
        clock.advance(700);
        assert_eq!(player.state(), PlayerState::PlaybackCompleted);
    }

    #[test]
    fn test_fake_player_chains_next() {
        let clock = FakeClock::new();
        let first = FakeMediaPlayer::new(&clock);
        let second = first.copy().unwrap();
        first.prepare().unwrap();
        second.prepare().unwrap();
        first.set_next_media_player(&second).unwrap().start().unwrap();

        clock.advance(DEFAULT_DURATION_MILLIS);
        assert_eq!(first.state(), PlayerState::PlaybackCompleted);
        assert!(second.is_playing());
        assert!(first.next_media_player().is_none());
    }

    #[test]
    fn test_fake_player_preparation_failure() {
        let clock = FakeClock::new();
        let player = FakeMediaPlayer::new(&clock);
        player.fail_preparation("corrupt");
        let result = Arc::new(Mutex::new(None));
        let slot = result.clone();
        player
            .prepare_async(move |r| *slot.lock() = Some(r))
            .unwrap();
        clock.advance(DEFAULT_PREPARE_MILLIS);
        assert!(matches!(
            result.lock().take(),
            Some(Err(PlayerError::Prepare { .. }))
        ));
        assert_eq!(player.state(), PlayerState::Idle);
    }

    #[test]
    fn test_fake_copy_keeps_settings() {
        let clock = FakeClock::new();
        let player = FakeMediaPlayer::with_timing(&clock, 5, 50);
        player.set_volume(0.25).set_muted(true).set_speed(1.5);
        let copy = player.copy().unwrap();
        assert!(!copy.ptr_eq(&player));
        assert_eq!(copy.volume(), 0.25);
        assert!(copy.is_muted());
        assert_eq!(copy.speed(), 1.5);
        assert_eq!(copy.duration_millis(), 50);
        assert_eq!(copy.state(), PlayerState::Initialized);
    }

    #[test]
    fn test_backend_durations_and_failures() {
        let clock = FakeClock::new();
        let backend = FakeBackend::new(&clock)
            .with_duration("short", 100)
            .with_failure("broken");
        let short = backend.create(&SoundSource::embedded("short")).unwrap();
        let broken = backend.create(&SoundSource::embedded("broken")).unwrap();

        let results = Arc::new(Mutex::new(Vec::new()));
        for platform in [&short, &broken] {
            let results = results.clone();
            platform.prepare_async(Box::new(move |r| results.lock().push(r)));
        }
        clock.advance(backend.prepare_millis());

        let results = results.lock();
        assert_eq!(results[0], Ok(Duration::from_millis(100)));
        assert!(results[1].is_err());
        assert_eq!(backend.created().len(), 2);
        assert_eq!(backend.live("short").len(), 1);
    }
}
