//! Several keyed tracks played in lockstep.

use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::event::ForkedListener;

use super::error::{PlayerError, PlayerResult};
use super::{first_error, MediaPlayer};

/// Bounds for track keys.
pub trait TrackKey: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static {}

impl<K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static> TrackKey for K {}

/// Plays a fixed, ordered set of tracks together.
///
/// Only enabled tracks are audible. Disabled tracks keep playing silently,
/// so re-enabling one brings it in at the right position. A fresh player
/// has no tracks enabled.
pub struct MultiTrackMediaPlayer<K: TrackKey, T: MediaPlayer> {
    inner: Arc<MultiInner<K, T>>,
}

struct MultiInner<K, T> {
    tracks: Vec<(K, T)>,
    mix: Mutex<Mix<K>>,
}

struct Mix<K> {
    muted: bool,
    master_volume: f32,
    enabled: HashSet<K>,
}

impl<K: TrackKey, T: MediaPlayer> Clone for MultiTrackMediaPlayer<K, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K: TrackKey, T: MediaPlayer> MultiTrackMediaPlayer<K, T> {
    /// Creates a player over `tracks`, in order.
    ///
    /// # Errors
    ///
    /// Returns an error if `tracks` is empty or a key appears twice.
    pub fn new(tracks: impl IntoIterator<Item = (K, T)>) -> PlayerResult<Self> {
        let tracks: Vec<(K, T)> = tracks.into_iter().collect();
        if tracks.is_empty() {
            return Err(PlayerError::Empty("MultiTrackMediaPlayer"));
        }
        let mut seen = HashSet::new();
        for (key, _) in &tracks {
            if !seen.insert(key) {
                return Err(PlayerError::DuplicateTrack(format!("{key:?}")));
            }
        }
        let player = Self {
            inner: Arc::new(MultiInner {
                tracks,
                mix: Mutex::new(Mix {
                    muted: false,
                    master_volume: 1.0,
                    enabled: HashSet::new(),
                }),
            }),
        };
        player.refresh_mutes();
        Ok(player)
    }

    /// Track keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.inner.tracks.iter().map(|(key, _)| key)
    }

    /// Handle to the track called `key`.
    pub fn track(&self, key: &K) -> Option<&T> {
        self.inner
            .tracks
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, track)| track)
    }

    pub fn num_tracks(&self) -> usize {
        self.inner.tracks.len()
    }

    pub fn num_tracks_enabled(&self) -> usize {
        self.inner.mix.lock().enabled.len()
    }

    pub fn is_track_enabled(&self, key: &K) -> bool {
        self.inner.mix.lock().enabled.contains(key)
    }

    /// Makes the track called `key` audible or silent.
    ///
    /// # Errors
    ///
    /// Returns [`PlayerError::UnknownTrack`] if there is no such track.
    pub fn set_track_enabled(&self, key: &K, enabled: bool) -> PlayerResult<&Self> {
        let track = self
            .track(key)
            .ok_or_else(|| PlayerError::UnknownTrack(format!("{key:?}")))?;
        let mut mix = self.inner.mix.lock();
        if enabled {
            mix.enabled.insert(key.clone());
        } else {
            mix.enabled.remove(key);
        }
        track.set_muted(mix.muted || !enabled);
        debug!(track = ?key, enabled, "track toggled");
        Ok(self)
    }

    /// Enables the first disabled track in order and returns its key, or
    /// `None` when every track is already enabled.
    pub fn enable_next_track(&self) -> Option<K> {
        let key = {
            let mix = self.inner.mix.lock();
            self.keys().find(|key| !mix.enabled.contains(*key)).cloned()
        }?;
        self.set_track_enabled(&key, true).ok()?;
        Some(key)
    }

    fn refresh_mutes(&self) {
        let mix = self.inner.mix.lock();
        for (key, track) in &self.inner.tracks {
            track.set_muted(mix.muted || !mix.enabled.contains(key));
        }
    }

    fn for_each_track(&self, mut f: impl FnMut(&T)) -> &Self {
        for (_, track) in &self.inner.tracks {
            f(track);
        }
        self
    }

    fn try_each_track(&self, mut f: impl FnMut(&T) -> PlayerResult<()>) -> PlayerResult<&Self> {
        for (_, track) in &self.inner.tracks {
            f(track)?;
        }
        Ok(self)
    }

    fn first_track(&self) -> &T {
        // Construction guarantees at least one track.
        &self.inner.tracks[0].1
    }
}

impl<K: TrackKey, T: MediaPlayer> MediaPlayer for MultiTrackMediaPlayer<K, T> {
    fn copy(&self) -> PlayerResult<Self> {
        let tracks = self
            .inner
            .tracks
            .iter()
            .map(|(key, track)| Ok((key.clone(), track.copy()?)))
            .collect::<PlayerResult<Vec<_>>>()?;
        let copy = Self::new(tracks)?;
        {
            let mix = self.inner.mix.lock();
            let mut copy_mix = copy.inner.mix.lock();
            copy_mix.muted = mix.muted;
            copy_mix.master_volume = mix.master_volume;
            copy_mix.enabled = mix.enabled.clone();
        }
        copy.refresh_mutes();
        Ok(copy)
    }

    fn num_media_players(&self) -> usize {
        self.inner
            .tracks
            .iter()
            .map(|(_, track)| track.num_media_players())
            .sum()
    }

    fn prepare_async<F>(&self, on_ready: F) -> PlayerResult<&Self>
    where
        F: FnOnce(PlayerResult<()>) + Send + 'static,
    {
        let fork = Arc::new(ForkedListener::all(
            self.inner.tracks.len(),
            move |results: Vec<PlayerResult<()>>| on_ready(first_error(results)),
        ));
        self.try_each_track(|track| {
            let fork = Arc::clone(&fork);
            track.prepare_async(move |result| {
                if let Err(e) = fork.handle(result) {
                    warn!(error = %e, "track preparation reported twice");
                }
            })?;
            Ok(())
        })
    }

    fn apply_playback_params(&self) -> &Self {
        self.for_each_track(|track| {
            track.apply_playback_params();
        })
    }

    fn start(&self) -> PlayerResult<&Self> {
        let mix = self.inner.mix.lock();
        for (key, track) in &self.inner.tracks {
            track.set_muted(mix.muted || !mix.enabled.contains(key));
            track.start()?;
        }
        Ok(self)
    }

    fn pause(&self) -> PlayerResult<&Self> {
        self.try_each_track(|track| track.pause().map(|_| ()))
    }

    fn stop(&self) -> PlayerResult<&Self> {
        self.try_each_track(|track| track.stop().map(|_| ()))
    }

    fn soft_reset(&self) -> PlayerResult<&Self> {
        self.try_each_track(|track| track.soft_reset().map(|_| ()))
    }

    fn reset(&self) -> PlayerResult<&Self> {
        self.try_each_track(|track| track.reset().map(|_| ()))
    }

    fn release(&self) -> PlayerResult<&Self> {
        let results = self
            .inner
            .tracks
            .iter()
            .map(|(_, track)| track.release().map(|_| ()))
            .collect();
        first_error(results)?;
        Ok(self)
    }

    fn is_playing(&self) -> bool {
        self.inner.tracks.iter().any(|(_, track)| track.is_playing())
    }

    fn seek_to_start(&self) -> PlayerResult<&Self> {
        self.try_each_track(|track| track.seek_to_start().map(|_| ()))
    }

    fn duration(&self) -> PlayerResult<Duration> {
        let mut longest = Duration::ZERO;
        for (_, track) in &self.inner.tracks {
            longest = longest.max(track.duration()?);
        }
        Ok(longest)
    }

    fn set_muted(&self, muted: bool) -> &Self {
        self.inner.mix.lock().muted = muted;
        self.refresh_mutes();
        self
    }

    fn set_volume(&self, volume: f32) -> &Self {
        let mut mix = self.inner.mix.lock();
        if volume == mix.master_volume {
            return self;
        }
        if mix.master_volume == 0.0 {
            // No ratio from zero; fall back to absolute volumes.
            for (_, track) in &self.inner.tracks {
                track.set_volume(volume);
            }
        } else {
            let ratio = volume / mix.master_volume;
            for (_, track) in &self.inner.tracks {
                track.multiply_volume(ratio);
            }
        }
        mix.master_volume = volume;
        drop(mix);
        self
    }

    fn multiply_volume(&self, ratio: f32) -> &Self {
        let target = self.inner.mix.lock().master_volume * ratio;
        self.set_volume(target)
    }

    fn set_speed(&self, speed: f32) -> &Self {
        self.for_each_track(|track| {
            track.set_speed(speed);
        })
    }

    fn multiply_speed(&self, ratio: f32) -> &Self {
        self.for_each_track(|track| {
            track.multiply_speed(ratio);
        })
    }

    fn set_pitch(&self, pitch: f32) -> &Self {
        self.for_each_track(|track| {
            track.set_pitch(pitch);
        })
    }

    fn multiply_pitch(&self, ratio: f32) -> &Self {
        self.for_each_track(|track| {
            track.multiply_pitch(ratio);
        })
    }

    fn set_next_media_player(&self, next: &Self) -> PlayerResult<&Self> {
        if self.inner.tracks.len() != next.inner.tracks.len()
            || self.keys().zip(next.keys()).any(|(a, b)| a != b)
        {
            return Err(PlayerError::TrackMismatch);
        }
        for ((_, track), (_, following)) in self.inner.tracks.iter().zip(&next.inner.tracks) {
            track.set_next_media_player(following)?;
        }
        Ok(self)
    }

    fn set_on_completion_listener<F>(&self, listener: F) -> PlayerResult<&Self>
    where
        F: Fn(&Self) + Send + Sync + 'static,
    {
        let weak: Weak<MultiInner<K, T>> = Arc::downgrade(&self.inner);
        self.first_track().set_on_completion_listener(move |_| {
            if let Some(inner) = weak.upgrade() {
                listener(&MultiTrackMediaPlayer { inner });
            }
        })?;
        for (_, track) in self.inner.tracks.iter().skip(1) {
            track.set_on_completion_listener(|finished| {
                if let Err(e) = finished.reset().and_then(|t| t.release()) {
                    warn!(error = %e, "could not release finished track");
                }
            })?;
        }
        Ok(self)
    }
}

impl<K: TrackKey, T: MediaPlayer + fmt::Debug> fmt::Debug for MultiTrackMediaPlayer<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiTrackMediaPlayer")
            .field("tracks", &self.inner.tracks)
            .field("enabled", &self.num_tracks_enabled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::sound::testing::{FakeClock, FakeMediaPlayer};
    use crate::sound::PlayerState;

    fn three_tracks(clock: &FakeClock) -> MultiTrackMediaPlayer<&'static str, FakeMediaPlayer> {
        MultiTrackMediaPlayer::new([
            ("drums", FakeMediaPlayer::with_timing(clock, 10, 1_000)),
            ("bass", FakeMediaPlayer::with_timing(clock, 20, 1_000)),
            ("lead", FakeMediaPlayer::with_timing(clock, 30, 1_000)),
        ])
        .unwrap()
    }

    fn track<'a>(
        multi: &'a MultiTrackMediaPlayer<&'static str, FakeMediaPlayer>,
        key: &'static str,
    ) -> &'a FakeMediaPlayer {
        multi.track(&key).unwrap()
    }

    #[test]
    fn test_new_rejects_empty_and_duplicates() {
        let clock = FakeClock::new();
        let empty: Vec<(&str, FakeMediaPlayer)> = Vec::new();
        assert_eq!(
            MultiTrackMediaPlayer::new(empty).unwrap_err(),
            PlayerError::Empty("MultiTrackMediaPlayer")
        );

        let duplicate = MultiTrackMediaPlayer::new([
            ("a", FakeMediaPlayer::new(&clock)),
            ("a", FakeMediaPlayer::new(&clock)),
        ]);
        assert!(matches!(duplicate, Err(PlayerError::DuplicateTrack(_))));
    }

    #[test]
    fn test_starts_with_every_track_silent() {
        let clock = FakeClock::new();
        let multi = three_tracks(&clock);
        assert_eq!(multi.num_tracks_enabled(), 0);
        for key in ["drums", "bass", "lead"] {
            assert!(track(&multi, key).is_muted());
        }
    }

    #[test]
    fn test_prepare_waits_for_every_track() {
        let clock = FakeClock::new();
        let multi = three_tracks(&clock);
        let ready = Arc::new(AtomicUsize::new(0));
        let counter = ready.clone();
        multi
            .prepare_async(move |r| {
                assert!(r.is_ok());
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        clock.advance(20);
        assert_eq!(ready.load(Ordering::SeqCst), 0);
        clock.advance(10);
        assert_eq!(ready.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_disabled_tracks_play_silently() {
        let clock = FakeClock::new();
        let multi = three_tracks(&clock);
        multi.prepare_async(|_| {}).unwrap();
        clock.advance(30);
        multi.start().unwrap();

        for key in ["drums", "bass", "lead"] {
            let t = track(&multi, key);
            assert!(t.is_playing());
            assert_eq!(t.effective_volume(), 0.0);
        }
        assert!(multi.is_playing());
    }

    #[test]
    fn test_enable_next_track_in_order() {
        let clock = FakeClock::new();
        let multi = three_tracks(&clock);
        assert_eq!(multi.enable_next_track(), Some("drums"));
        assert!(multi.is_track_enabled(&"drums"));
        assert!(!multi.is_track_enabled(&"bass"));
        assert_eq!(multi.enable_next_track(), Some("bass"));
        assert_eq!(multi.enable_next_track(), Some("lead"));
        assert_eq!(multi.enable_next_track(), None);
        assert_eq!(multi.num_tracks_enabled(), 3);
    }

    #[test]
    fn test_toggle_restores_volume() {
        let clock = FakeClock::new();
        let multi = three_tracks(&clock);
        multi.set_volume(0.8);
        multi.set_track_enabled(&"bass", true).unwrap();
        let before = track(&multi, "bass").effective_volume();
        assert!((before - 0.8).abs() < f32::EPSILON);

        multi.set_track_enabled(&"bass", false).unwrap();
        assert_eq!(track(&multi, "bass").effective_volume(), 0.0);

        multi.set_track_enabled(&"bass", true).unwrap();
        assert_eq!(track(&multi, "bass").effective_volume(), before);
    }

    #[test]
    fn test_enabling_twice_changes_nothing() {
        let clock = FakeClock::new();
        let multi = three_tracks(&clock);
        multi.set_volume(0.7);
        multi.set_track_enabled(&"drums", true).unwrap();
        let volume = track(&multi, "drums").volume();

        multi.set_track_enabled(&"drums", true).unwrap();
        assert!(!track(&multi, "drums").is_muted());
        assert_eq!(track(&multi, "drums").volume(), volume);
        assert_eq!(multi.num_tracks_enabled(), 1);
    }

    #[test]
    fn test_unknown_track() {
        let clock = FakeClock::new();
        let multi = three_tracks(&clock);
        assert!(matches!(
            multi.set_track_enabled(&"vocals", true),
            Err(PlayerError::UnknownTrack(_))
        ));
    }

    #[test]
    fn test_master_mute_overrides_enabled() {
        let clock = FakeClock::new();
        let multi = three_tracks(&clock);
        multi.set_track_enabled(&"drums", true).unwrap();
        multi.set_muted(true);
        assert!(track(&multi, "drums").is_muted());
        multi.set_muted(false);
        assert!(!track(&multi, "drums").is_muted());
        assert!(track(&multi, "bass").is_muted());
    }

    #[test]
    fn test_volume_scales_relative_mix() {
        let clock = FakeClock::new();
        let multi = three_tracks(&clock);
        track(&multi, "drums").set_volume(0.5);
        multi.set_volume(0.5);
        assert!((track(&multi, "drums").volume() - 0.25).abs() < 1e-6);
        assert!((track(&multi, "bass").volume() - 0.5).abs() < 1e-6);

        multi.multiply_volume(2.0);
        assert!((track(&multi, "drums").volume() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_volume_from_zero_is_absolute() {
        let clock = FakeClock::new();
        let multi = three_tracks(&clock);
        multi.set_volume(0.0);
        assert_eq!(track(&multi, "lead").volume(), 0.0);
        multi.set_volume(0.6);
        assert!((track(&multi, "lead").volume() - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_duration_is_longest_track() {
        let clock = FakeClock::new();
        let multi = MultiTrackMediaPlayer::new([
            (1, FakeMediaPlayer::with_timing(&clock, 0, 300)),
            (2, FakeMediaPlayer::with_timing(&clock, 0, 700)),
        ])
        .unwrap();
        for key in [1, 2] {
            multi.track(&key).unwrap().prepare().unwrap();
        }
        assert_eq!(multi.duration().unwrap(), Duration::from_millis(700));
    }

    #[test]
    fn test_set_next_requires_matching_tracks() {
        let clock = FakeClock::new();
        let a = three_tracks(&clock);
        let b = MultiTrackMediaPlayer::new([("drums", FakeMediaPlayer::new(&clock))]).unwrap();
        assert_eq!(
            a.set_next_media_player(&b).unwrap_err(),
            PlayerError::TrackMismatch
        );
    }

    #[test]
    fn test_set_next_chains_each_track() {
        let clock = FakeClock::new();
        let a = three_tracks(&clock);
        let b = a.copy().unwrap();
        for multi in [&a, &b] {
            multi.prepare_async(|_| {}).unwrap();
        }
        clock.advance(30);
        a.set_next_media_player(&b).unwrap();
        for key in ["drums", "bass", "lead"] {
            let next = track(&a, key).next_media_player().unwrap();
            assert!(next.ptr_eq(track(&b, key)));
        }
    }

    #[test]
    fn test_completion_reports_once_and_releases_others() {
        let clock = FakeClock::new();
        let multi = three_tracks(&clock);
        let completions = Arc::new(AtomicUsize::new(0));
        let counter = completions.clone();
        multi
            .set_on_completion_listener(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        multi.prepare_async(|_| {}).unwrap();
        clock.advance(30);
        multi.start().unwrap();
        clock.advance(1_000);

        assert_eq!(completions.load(Ordering::SeqCst), 1);
        assert_eq!(track(&multi, "drums").state(), PlayerState::PlaybackCompleted);
        assert_eq!(track(&multi, "bass").state(), PlayerState::End);
        assert_eq!(track(&multi, "lead").state(), PlayerState::End);
    }

    #[test]
    fn test_copy_keeps_mix() {
        let clock = FakeClock::new();
        let multi = three_tracks(&clock);
        multi.set_track_enabled(&"lead", true).unwrap();
        multi.set_volume(0.5);
        let copy = multi.copy().unwrap();
        assert!(copy.is_track_enabled(&"lead"));
        assert!(!track(&copy, "lead").is_muted());
        assert!(track(&copy, "drums").is_muted());
        assert!((track(&copy, "lead").volume() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_copy_then_same_volume_keeps_children() {
        let clock = FakeClock::new();
        let multi = three_tracks(&clock);
        track(&multi, "bass").set_volume(0.5);
        multi.set_volume(0.6);
        let copy = multi.copy().unwrap();

        copy.set_volume(0.6);
        assert!((track(&copy, "drums").volume() - 0.6).abs() < 1e-6);
        assert!((track(&copy, "bass").volume() - 0.3).abs() < 1e-6);
        assert!((track(&copy, "lead").volume() - 0.6).abs() < 1e-6);
    }
}
