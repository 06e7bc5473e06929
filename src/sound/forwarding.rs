//! Leaf player bound to one platform media resource.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error};

use super::error::{PlayerError, PlayerResult};
use super::lifecycle;
use super::platform::{MediaBackend, PlatformPlayer};
use super::source::SoundSource;
use super::{MediaPlayer, PlayerState};

type Listener = Arc<dyn Fn(&ForwardingMediaPlayer) + Send + Sync>;

/// Wraps exactly one platform resource, gating every call on the resource's
/// lifecycle state and keeping the mute/volume/speed/pitch settings.
#[derive(Clone)]
pub struct ForwardingMediaPlayer {
    inner: Arc<ForwardingInner>,
}

struct ForwardingInner {
    backend: Arc<dyn MediaBackend>,
    source: SoundSource,
    platform: Arc<dyn PlatformPlayer>,
    settings: Mutex<Settings>,
}

struct Settings {
    state: PlayerState,
    muted: bool,
    volume: f32,
    speed: f32,
    pitch: f32,
    duration: Option<Duration>,
    next: Option<ForwardingMediaPlayer>,
    listener: Option<Listener>,
}

impl Settings {
    fn effective_volume(&self) -> f32 {
        if self.muted {
            0.0
        } else {
            self.volume
        }
    }
}

impl ForwardingMediaPlayer {
    /// Binds a new player to `source` using `backend`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot create a resource.
    pub fn new(backend: Arc<dyn MediaBackend>, source: SoundSource) -> PlayerResult<Self> {
        let platform = backend.create(&source)?;
        let inner = Arc::new(ForwardingInner {
            backend,
            source,
            platform,
            settings: Mutex::new(Settings {
                state: PlayerState::Initialized,
                muted: false,
                volume: 1.0,
                speed: 1.0,
                pitch: 1.0,
                duration: None,
                next: None,
                listener: None,
            }),
        });

        let weak: Weak<ForwardingInner> = Arc::downgrade(&inner);
        inner.platform.set_on_completion(Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                ForwardingMediaPlayer { inner }.handle_completion();
            }
        }));

        debug!(
            resource = inner.source.name(),
            backend = inner.backend.name(),
            "created media player"
        );
        Ok(Self { inner })
    }

    /// The resource this player is bound to.
    pub fn source(&self) -> &SoundSource {
        &self.inner.source
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PlayerState {
        self.inner.settings.lock().state
    }

    pub fn is_muted(&self) -> bool {
        self.inner.settings.lock().muted
    }

    /// Stored volume, regardless of mute.
    pub fn volume(&self) -> f32 {
        self.inner.settings.lock().volume
    }

    /// Volume actually pushed to the platform.
    pub fn effective_volume(&self) -> f32 {
        self.inner.settings.lock().effective_volume()
    }

    pub fn speed(&self) -> f32 {
        self.inner.settings.lock().speed
    }

    pub fn pitch(&self) -> f32 {
        self.inner.settings.lock().pitch
    }

    /// Returns true if both handles refer to the same player.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn handle_completion(&self) {
        let (next, listener, paused) = {
            let mut settings = self.inner.settings.lock();
            let paused = match settings.state {
                PlayerState::Started => false,
                // Paused after the platform reached the end and already
                // started the chained resource.
                PlayerState::Paused if settings.next.is_some() => true,
                state => {
                    debug!(
                        resource = self.inner.source.name(),
                        %state,
                        "ignoring completion outside playback"
                    );
                    return;
                }
            };
            settings.state = PlayerState::PlaybackCompleted;
            (settings.next.take(), settings.listener.clone(), paused)
        };

        debug!(resource = self.inner.source.name(), paused, "playback completed");
        if let Some(next) = next {
            if paused {
                next.hold_at_start();
            } else {
                next.mark_started();
            }
        }
        if let Some(listener) = listener {
            listener(self);
        }
    }

    /// Records that the platform started this resource as a chained next.
    fn mark_started(&self) {
        let mut settings = self.inner.settings.lock();
        if settings.state.is_prepared() {
            settings.state = PlayerState::Started;
        }
    }

    /// Halts and rewinds a chained resource the platform started while its
    /// predecessor was being paused.
    fn hold_at_start(&self) {
        {
            let mut settings = self.inner.settings.lock();
            if !settings.state.is_prepared() {
                return;
            }
            settings.state = PlayerState::Paused;
        }
        self.inner.platform.pause();
        self.inner.platform.seek_to_start();
    }

    fn finish_preparing(&self, result: PlayerResult<Duration>) -> PlayerResult<()> {
        {
            let mut settings = self.inner.settings.lock();
            if settings.state != PlayerState::Preparing {
                return Err(PlayerError::illegal("finish preparing", settings.state));
            }
            match result {
                Ok(duration) => {
                    settings.state = PlayerState::Prepared;
                    settings.duration = Some(duration);
                }
                Err(e) => {
                    settings.state = PlayerState::Idle;
                    error!(resource = self.inner.source.name(), error = %e, "preparation failed");
                    return Err(e);
                }
            }
        }
        debug!(resource = self.inner.source.name(), "prepared");
        self.push_volume();
        self.apply_playback_params();
        Ok(())
    }

    fn push_volume(&self) {
        let volume = {
            let settings = self.inner.settings.lock();
            if settings.state == PlayerState::End {
                return;
            }
            settings.effective_volume()
        };
        self.inner.platform.set_volume(volume);
    }

    fn update_settings(&self, update: impl FnOnce(&mut Settings)) -> &Self {
        update(&mut self.inner.settings.lock());
        self
    }
}

impl MediaPlayer for ForwardingMediaPlayer {
    fn copy(&self) -> PlayerResult<Self> {
        let player = Self::new(self.inner.backend.clone(), self.inner.source.clone())?;
        let (muted, volume, speed, pitch) = {
            let s = self.inner.settings.lock();
            (s.muted, s.volume, s.speed, s.pitch)
        };
        player
            .set_muted(muted)
            .set_volume(volume)
            .set_speed(speed)
            .set_pitch(pitch);
        Ok(player)
    }

    fn num_media_players(&self) -> usize {
        1
    }

    fn prepare_async<F>(&self, on_ready: F) -> PlayerResult<&Self>
    where
        F: FnOnce(PlayerResult<()>) + Send + 'static,
    {
        {
            let mut settings = self.inner.settings.lock();
            settings.state = lifecycle::prepare(settings.state)?;
        }
        let weak = Arc::downgrade(&self.inner);
        self.inner.platform.prepare_async(Box::new(move |result| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let outcome = ForwardingMediaPlayer { inner }.finish_preparing(result);
            on_ready(outcome);
        }));
        Ok(self)
    }

    fn apply_playback_params(&self) -> &Self {
        let params = {
            let s = self.inner.settings.lock();
            s.state.is_prepared().then_some((s.speed, s.pitch))
        };
        if let Some((speed, pitch)) = params {
            self.inner.platform.set_playback_params(speed, pitch);
        }
        self
    }

    fn start(&self) -> PlayerResult<&Self> {
        {
            let mut settings = self.inner.settings.lock();
            match lifecycle::start(settings.state)? {
                Some(state) => settings.state = state,
                None => return Ok(self),
            }
        }
        self.inner.platform.start();
        self.apply_playback_params();
        debug!(resource = self.inner.source.name(), "started");
        Ok(self)
    }

    fn pause(&self) -> PlayerResult<&Self> {
        {
            let mut settings = self.inner.settings.lock();
            match lifecycle::pause(settings.state)? {
                Some(state) => settings.state = state,
                None => return Ok(self),
            }
        }
        self.inner.platform.pause();
        Ok(self)
    }

    fn stop(&self) -> PlayerResult<&Self> {
        {
            let mut settings = self.inner.settings.lock();
            match lifecycle::stop(settings.state)? {
                Some(state) => settings.state = state,
                None => return Ok(self),
            }
            settings.next = None;
        }
        self.inner.platform.stop();
        Ok(self)
    }

    fn soft_reset(&self) -> PlayerResult<&Self> {
        self.pause()?.seek_to_start()
    }

    fn reset(&self) -> PlayerResult<&Self> {
        {
            let mut settings = self.inner.settings.lock();
            settings.state = lifecycle::reset(settings.state)?;
            settings.duration = None;
            settings.next = None;
        }
        self.inner.platform.reset();
        Ok(self)
    }

    fn release(&self) -> PlayerResult<&Self> {
        {
            let mut settings = self.inner.settings.lock();
            settings.state = lifecycle::release(settings.state)?;
            settings.next = None;
            settings.listener = None;
        }
        self.inner.platform.release();
        debug!(resource = self.inner.source.name(), "released");
        Ok(self)
    }

    fn is_playing(&self) -> bool {
        self.state() == PlayerState::Started
    }

    fn seek_to_start(&self) -> PlayerResult<&Self> {
        lifecycle::seek(self.state())?;
        self.inner.platform.seek_to_start();
        Ok(self)
    }

    fn duration(&self) -> PlayerResult<Duration> {
        let settings = self.inner.settings.lock();
        lifecycle::duration(settings.state)?;
        settings
            .duration
            .ok_or(PlayerError::NotPrepared("read duration of"))
    }

    fn set_muted(&self, muted: bool) -> &Self {
        self.update_settings(|s| s.muted = muted).push_volume();
        self
    }

    fn set_volume(&self, volume: f32) -> &Self {
        self.update_settings(|s| s.volume = volume).push_volume();
        self
    }

    fn multiply_volume(&self, ratio: f32) -> &Self {
        self.update_settings(|s| s.volume *= ratio).push_volume();
        self
    }

    fn set_speed(&self, speed: f32) -> &Self {
        self.update_settings(|s| s.speed = speed)
    }

    fn multiply_speed(&self, ratio: f32) -> &Self {
        self.update_settings(|s| s.speed *= ratio)
    }

    fn set_pitch(&self, pitch: f32) -> &Self {
        self.update_settings(|s| s.pitch = pitch)
    }

    fn multiply_pitch(&self, ratio: f32) -> &Self {
        self.update_settings(|s| s.pitch *= ratio)
    }

    fn set_next_media_player(&self, next: &Self) -> PlayerResult<&Self> {
        if self.ptr_eq(next) {
            return Err(PlayerError::illegal("chain itself while", self.state()));
        }
        lifecycle::chain(next.state())?;
        {
            let mut settings = self.inner.settings.lock();
            lifecycle::chain(settings.state)?;
            settings.next = Some(next.clone());
        }
        self.inner
            .platform
            .set_next(Some(Arc::clone(&next.inner.platform)));
        Ok(self)
    }

    fn set_on_completion_listener<F>(&self, listener: F) -> PlayerResult<&Self>
    where
        F: Fn(&Self) + Send + Sync + 'static,
    {
        {
            let mut settings = self.inner.settings.lock();
            if settings.state == PlayerState::End {
                return Err(PlayerError::Released("set a completion listener on"));
            }
            settings.listener = Some(Arc::new(listener));
        }
        Ok(self)
    }
}

impl Drop for ForwardingInner {
    fn drop(&mut self) {
        if self.settings.get_mut().state != PlayerState::End {
            debug!(resource = self.source.name(), "releasing dropped media player");
            self.platform.release();
        }
    }
}

impl fmt::Debug for ForwardingMediaPlayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(settings) = self.inner.settings.try_lock() else {
            return f
                .debug_struct("ForwardingMediaPlayer")
                .field("source", &self.inner.source)
                .finish_non_exhaustive();
        };
        f.debug_struct("ForwardingMediaPlayer")
            .field("source", &self.inner.source)
            .field("state", &settings.state)
            .field("muted", &settings.muted)
            .field("volume", &settings.volume)
            .field("speed", &settings.speed)
            .field("pitch", &settings.pitch)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::sound::platform::PlatformPlayer as _;
    use crate::sound::testing::{FakeBackend, FakeClock};

    fn setup() -> (FakeClock, Arc<FakeBackend>) {
        let clock = FakeClock::new();
        let backend = Arc::new(FakeBackend::new(&clock).with_duration("drums", 1_000));
        (clock, backend)
    }

    fn prepared(clock: &FakeClock, backend: &Arc<FakeBackend>, name: &str) -> ForwardingMediaPlayer {
        let player = ForwardingMediaPlayer::new(backend.clone(), SoundSource::embedded(name)).unwrap();
        player.prepare_async(|result| assert!(result.is_ok())).unwrap();
        clock.advance(backend.prepare_millis());
        assert_eq!(player.state(), PlayerState::Prepared);
        player
    }

    #[test]
    fn test_new_player_is_initialized() {
        let (_clock, backend) = setup();
        let player = ForwardingMediaPlayer::new(backend.clone(), SoundSource::embedded("drums")).unwrap();
        assert_eq!(player.state(), PlayerState::Initialized);
        assert_eq!(player.num_media_players(), 1);
        assert_eq!(backend.created().len(), 1);
    }

    #[test]
    fn test_prepare_is_asynchronous() {
        let (clock, backend) = setup();
        let player = ForwardingMediaPlayer::new(backend.clone(), SoundSource::embedded("drums")).unwrap();
        let ready = Arc::new(AtomicUsize::new(0));
        let counter = ready.clone();
        player
            .prepare_async(move |result| {
                assert!(result.is_ok());
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        assert_eq!(player.state(), PlayerState::Preparing);
        assert_eq!(ready.load(Ordering::SeqCst), 0);

        clock.advance(backend.prepare_millis());
        assert_eq!(player.state(), PlayerState::Prepared);
        assert_eq!(ready.load(Ordering::SeqCst), 1);
        assert_eq!(player.duration().unwrap(), Duration::from_millis(1_000));
    }

    #[test]
    fn test_prepare_failure_is_reported() {
        let clock = FakeClock::new();
        let backend = Arc::new(FakeBackend::new(&clock).with_failure("broken"));
        let player = ForwardingMediaPlayer::new(backend.clone(), SoundSource::embedded("broken")).unwrap();
        let outcome = Arc::new(Mutex::new(None));
        let slot = outcome.clone();
        player
            .prepare_async(move |result| *slot.lock() = Some(result))
            .unwrap();
        clock.advance(backend.prepare_millis());

        let result = outcome.lock().take().unwrap();
        assert!(matches!(result, Err(PlayerError::Prepare { .. })));
        assert_eq!(player.state(), PlayerState::Idle);
    }

    #[test]
    fn test_start_before_prepare_fails() {
        let (_clock, backend) = setup();
        let player = ForwardingMediaPlayer::new(backend, SoundSource::embedded("drums")).unwrap();
        assert_eq!(
            player.start().unwrap_err(),
            PlayerError::illegal("start", PlayerState::Initialized)
        );
    }

    #[test]
    fn test_start_pause_stop() {
        let (clock, backend) = setup();
        let player = prepared(&clock, &backend, "drums");
        let platform = backend.created()[0].clone();

        player.start().unwrap();
        assert!(player.is_playing());
        assert!(platform.is_playing());

        // Starting twice is harmless.
        player.start().unwrap();

        player.pause().unwrap().pause().unwrap();
        assert_eq!(player.state(), PlayerState::Paused);
        assert!(!platform.is_playing());

        player.stop().unwrap().stop().unwrap();
        assert_eq!(player.state(), PlayerState::Stopped);
        assert!(player.start().is_err());
    }

    #[test]
    fn test_start_applies_playback_params() {
        let (clock, backend) = setup();
        let player = prepared(&clock, &backend, "drums");
        let platform = backend.created()[0].clone();

        player.set_speed(1.5).set_pitch(0.5);
        assert_eq!(platform.speed(), 1.0);

        player.start().unwrap();
        assert_eq!(platform.speed(), 1.5);
        assert_eq!(platform.pitch(), 0.5);
    }

    #[test]
    fn test_mute_keeps_volume() {
        let (clock, backend) = setup();
        let player = prepared(&clock, &backend, "drums");
        let platform = backend.created()[0].clone();

        player.set_volume(0.6).set_muted(true);
        assert_eq!(player.volume(), 0.6);
        assert_eq!(platform.volume(), 0.0);

        player.set_muted(false);
        assert_eq!(platform.volume(), 0.6);

        player.multiply_volume(0.5);
        assert!((platform.volume() - 0.3).abs() < f32::EPSILON);
    }

    #[test]
    fn test_copy_is_independent() {
        let (clock, backend) = setup();
        let player = prepared(&clock, &backend, "drums");
        player.set_volume(0.4).set_speed(2.0).set_muted(true);

        let copy = player.copy().unwrap();
        assert!(!copy.ptr_eq(&player));
        assert_eq!(copy.state(), PlayerState::Initialized);
        assert_eq!(copy.volume(), 0.4);
        assert_eq!(copy.speed(), 2.0);
        assert!(copy.is_muted());
        assert_eq!(backend.created().len(), 2);
    }

    #[test]
    fn test_completion_starts_next_and_notifies() {
        let (clock, backend) = setup();
        let first = prepared(&clock, &backend, "drums");
        let second = prepared(&clock, &backend, "drums");

        let completions = Arc::new(AtomicUsize::new(0));
        let counter = completions.clone();
        first
            .set_on_completion_listener(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        first.set_next_media_player(&second).unwrap();
        first.start().unwrap();

        clock.advance(1_000);
        assert_eq!(first.state(), PlayerState::PlaybackCompleted);
        assert_eq!(second.state(), PlayerState::Started);
        assert!(backend.created()[1].is_playing());
        assert_eq!(completions.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_completion_after_pause_holds_next_at_start() {
        let (clock, backend) = setup();
        let first = prepared(&clock, &backend, "drums");
        let second = prepared(&clock, &backend, "drums");
        let completions = Arc::new(AtomicUsize::new(0));
        let counter = completions.clone();
        first
            .set_on_completion_listener(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        first.set_next_media_player(&second).unwrap();
        first.start().unwrap();

        // The platform reached the end and started the chained resource,
        // but the completion is delivered only after a pause.
        let next_platform = backend.created()[1].clone();
        next_platform.start();
        first.pause().unwrap();
        first.handle_completion();

        assert_eq!(first.state(), PlayerState::PlaybackCompleted);
        assert_eq!(second.state(), PlayerState::Paused);
        assert!(!next_platform.is_playing());
        assert_eq!(completions.load(Ordering::SeqCst), 1);

        second.start().unwrap();
        clock.advance(999);
        assert!(second.is_playing());
        clock.advance(1);
        assert_eq!(second.state(), PlayerState::PlaybackCompleted);
    }

    #[test]
    fn test_completion_while_stopped_is_ignored() {
        let (clock, backend) = setup();
        let player = prepared(&clock, &backend, "drums");
        player.start().unwrap();
        player.stop().unwrap();
        player.handle_completion();
        assert_eq!(player.state(), PlayerState::Stopped);
    }

    #[test]
    fn test_set_next_requires_both_prepared() {
        let (clock, backend) = setup();
        let first = prepared(&clock, &backend, "drums");
        let second = ForwardingMediaPlayer::new(backend.clone(), SoundSource::embedded("drums")).unwrap();

        assert_eq!(
            first.set_next_media_player(&second).unwrap_err(),
            PlayerError::NotPrepared("chain")
        );
        assert!(second.set_next_media_player(&first).is_err());
        assert!(first.set_next_media_player(&first).is_err());
    }

    #[test]
    fn test_release_twice_fails() {
        let (clock, backend) = setup();
        let player = prepared(&clock, &backend, "drums");
        player.release().unwrap();
        assert!(backend.created()[0].is_released());
        assert_eq!(
            player.release().unwrap_err(),
            PlayerError::Released("release")
        );
        assert!(player.start().is_err());
    }

    #[test]
    fn test_drop_releases_platform_resource() {
        let (clock, backend) = setup();
        let player = prepared(&clock, &backend, "drums");
        drop(player);
        assert!(backend.created()[0].is_released());
    }

    #[test]
    fn test_reset_then_duration_fails() {
        let (clock, backend) = setup();
        let player = prepared(&clock, &backend, "drums");
        player.reset().unwrap();
        assert_eq!(player.state(), PlayerState::Idle);
        assert!(player.duration().is_err());
        assert!(player.prepare_async(|_| {}).is_err());
    }

    #[test]
    fn test_soft_reset_rewinds() {
        let (clock, backend) = setup();
        let player = prepared(&clock, &backend, "drums");
        player.start().unwrap();
        clock.advance(400);
        player.soft_reset().unwrap();
        assert_eq!(player.state(), PlayerState::Paused);

        // A full second is needed again after the rewind.
        player.start().unwrap();
        clock.advance(999);
        assert!(player.is_playing());
        clock.advance(1);
        assert_eq!(player.state(), PlayerState::PlaybackCompleted);
    }
}
