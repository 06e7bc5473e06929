//! Platform players backed by rodio.
//!
//! rodio's `OutputStream` must stay on the thread that created it, so
//! [`RodioBackend`] parks it on a dedicated audio thread and hands out the
//! `OutputStreamHandle`. A second thread runs preparation and delivers every
//! callback, playing the role of the platform's callback thread.

use std::any::Any;
use std::io::Cursor;
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use rodio::source::EmptyCallback;
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};
use tracing::{debug, warn};

use super::embedded::embedded_sound;
use super::error::{PlayerError, PlayerResult};
use super::platform::{CompletionCallback, MediaBackend, PlatformPlayer, PreparedCallback};
use super::source::SoundSource;

type Job = Box<dyn FnOnce() + Send>;

/// Creates [`RodioPlatformPlayer`]s on the default output device.
pub struct RodioBackend {
    stream_handle: OutputStreamHandle,
    jobs: Sender<Job>,
    /// Dropping this lets the audio thread close the output stream.
    _shutdown: Sender<()>,
}

impl RodioBackend {
    /// Opens the default output device.
    ///
    /// # Errors
    ///
    /// Returns [`PlayerError::Backend`] if no audio output device is
    /// available.
    pub fn new() -> PlayerResult<Self> {
        let (handle_tx, handle_rx) = crossbeam_channel::bounded(1);
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(0);

        thread::Builder::new()
            .name("audio-output".into())
            .spawn(move || run_output(handle_tx, shutdown_rx))
            .map_err(|e| PlayerError::Backend(e.to_string()))?;

        let stream_handle = handle_rx
            .recv()
            .map_err(|e| PlayerError::Backend(e.to_string()))?
            .map_err(PlayerError::Backend)?;
        debug!("Audio output stream initialized");

        let (jobs, job_rx) = crossbeam_channel::unbounded::<Job>();
        thread::Builder::new()
            .name("media-callbacks".into())
            .spawn(move || run_jobs(job_rx))
            .map_err(|e| PlayerError::Backend(e.to_string()))?;

        Ok(Self {
            stream_handle,
            jobs,
            _shutdown: shutdown_tx,
        })
    }
}

fn run_output(handle_tx: Sender<Result<OutputStreamHandle, String>>, shutdown: Receiver<()>) {
    match OutputStream::try_default() {
        Ok((_stream, handle)) => {
            if handle_tx.send(Ok(handle)).is_ok() {
                // Returns once the backend is dropped.
                let _ = shutdown.recv();
            }
            debug!("Audio output stream closed");
        }
        Err(e) => {
            let _ = handle_tx.send(Err(e.to_string()));
        }
    }
}

fn run_jobs(jobs: Receiver<Job>) {
    for job in jobs {
        job();
    }
}

impl MediaBackend for RodioBackend {
    fn create(&self, source: &SoundSource) -> PlayerResult<Arc<dyn PlatformPlayer>> {
        Ok(Arc::new(RodioPlatformPlayer {
            shared: Arc::new(Shared {
                source: source.clone(),
                stream_handle: self.stream_handle.clone(),
                jobs: self.jobs.clone(),
                slot: Mutex::new(Slot::default()),
            }),
        }))
    }

    fn name(&self) -> &'static str {
        "rodio"
    }
}

impl std::fmt::Debug for RodioBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RodioBackend").finish_non_exhaustive()
    }
}

/// Opens the default output device, returning None if audio is unavailable.
#[must_use]
pub fn try_create_backend() -> Option<Arc<RodioBackend>> {
    match RodioBackend::new() {
        Ok(backend) => Some(Arc::new(backend)),
        Err(e) => {
            warn!("Audio not available: {}", e);
            None
        }
    }
}

// ============================================================================
// RodioPlatformPlayer
// ============================================================================

/// One decoded resource played through a rodio [`Sink`].
pub struct RodioPlatformPlayer {
    shared: Arc<Shared>,
}

struct Shared {
    source: SoundSource,
    stream_handle: OutputStreamHandle,
    jobs: Sender<Job>,
    slot: Mutex<Slot>,
}

struct Slot {
    data: Option<Arc<[u8]>>,
    sink: Option<Sink>,
    /// Identifies the current sink; end-of-stream markers of replaced sinks
    /// carry an older value and are ignored.
    generation: u64,
    playing: bool,
    finished: bool,
    volume: f32,
    speed: f32,
    next: Option<Arc<Shared>>,
    on_completion: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl Default for Slot {
    fn default() -> Self {
        Self {
            data: None,
            sink: None,
            generation: 0,
            playing: false,
            finished: false,
            volume: 1.0,
            speed: 1.0,
            next: None,
            on_completion: None,
        }
    }
}

impl Shared {
    /// Replaces the sink with a fresh, paused one positioned at the start.
    fn rebuild_sink(self: &Arc<Self>, slot: &mut Slot) -> PlayerResult<()> {
        let data = slot
            .data
            .clone()
            .ok_or(PlayerError::NotPrepared("play"))?;
        let decoder = Decoder::new(Cursor::new(data))
            .map_err(|e| self.source.prepare_error(e.to_string()))?;
        let sink = Sink::try_new(&self.stream_handle)
            .map_err(|e| PlayerError::Backend(e.to_string()))?;
        sink.pause();
        sink.set_volume(slot.volume);
        sink.set_speed(slot.speed);
        sink.append(decoder);

        slot.generation += 1;
        let generation = slot.generation;
        let weak = Arc::downgrade(self);
        sink.append(EmptyCallback::<f32>::new(Box::new(move || {
            on_end_of_stream(&weak, generation);
        })));

        slot.sink = Some(sink);
        slot.finished = false;
        slot.playing = false;
        Ok(())
    }

    fn play(self: &Arc<Self>) {
        let mut guard = self.slot.lock();
        let slot = &mut *guard;
        if slot.finished {
            if let Err(e) = self.rebuild_sink(slot) {
                warn!(resource = self.source.name(), error = %e, "cannot restart playback");
                return;
            }
        }
        if let Some(sink) = &slot.sink {
            sink.play();
            slot.playing = true;
        }
    }

    fn drop_sink(slot: &mut Slot) {
        slot.generation += 1;
        slot.playing = false;
        if let Some(sink) = slot.sink.take() {
            sink.stop();
        }
    }
}

/// Runs on rodio's mixer thread when a sink drains.
fn on_end_of_stream(weak: &Weak<Shared>, generation: u64) {
    let Some(shared) = weak.upgrade() else {
        return;
    };
    let (next, callback) = {
        let mut slot = shared.slot.lock();
        if slot.generation != generation {
            return;
        }
        slot.playing = false;
        slot.finished = true;
        (slot.next.take(), slot.on_completion.clone())
    };
    if let Some(next) = next {
        next.play();
    }
    if let Some(callback) = callback {
        let _ = shared.jobs.send(Box::new(move || callback()));
    }
}

fn load(source: &SoundSource) -> PlayerResult<Arc<[u8]>> {
    match source {
        SoundSource::File { path, .. } => std::fs::read(path)
            .map(Arc::from)
            .map_err(|e| source.prepare_error(format!("{}: {}", path.display(), e))),
        SoundSource::Embedded { name } => embedded_sound(name)
            .map(Arc::from)
            .ok_or_else(|| source.prepare_error("no embedded sound with this name")),
    }
}

/// Decodes `data` once to find its length.
fn measure(source: &SoundSource, data: &Arc<[u8]>) -> PlayerResult<Duration> {
    let decoder = Decoder::new(Cursor::new(Arc::clone(data)))
        .map_err(|e| source.prepare_error(e.to_string()))?;
    if let Some(duration) = decoder.total_duration() {
        return Ok(duration);
    }
    let channels = u64::from(decoder.channels());
    let rate = u64::from(decoder.sample_rate());
    if channels == 0 || rate == 0 {
        return Err(source.prepare_error("decoder reported no audio"));
    }
    let samples = decoder.count() as u64;
    Ok(Duration::from_secs_f64(samples as f64 / (channels * rate) as f64))
}

impl PlatformPlayer for RodioPlatformPlayer {
    fn prepare_async(&self, on_prepared: PreparedCallback) {
        let shared = Arc::clone(&self.shared);
        let job: Job = Box::new(move || {
            let result = load(&shared.source).and_then(|data| {
                let duration = measure(&shared.source, &data)?;
                let mut slot = shared.slot.lock();
                slot.data = Some(data);
                shared.rebuild_sink(&mut slot)?;
                Ok(duration)
            });
            if let Ok(duration) = &result {
                debug!(resource = shared.source.name(), ?duration, "decoded");
            }
            on_prepared(result);
        });
        if let Err(e) = self.shared.jobs.send(job) {
            warn!("media callback thread is gone: {}", e);
        }
    }

    fn start(&self) {
        self.shared.play();
    }

    fn pause(&self) {
        let mut slot = self.shared.slot.lock();
        if let Some(sink) = &slot.sink {
            sink.pause();
        }
        slot.playing = false;
    }

    fn stop(&self) {
        let mut slot = self.shared.slot.lock();
        Shared::drop_sink(&mut slot);
        slot.data = None;
    }

    fn reset(&self) {
        let mut slot = self.shared.slot.lock();
        Shared::drop_sink(&mut slot);
        slot.data = None;
        slot.next = None;
    }

    fn release(&self) {
        let mut slot = self.shared.slot.lock();
        Shared::drop_sink(&mut slot);
        slot.data = None;
        slot.next = None;
        slot.on_completion = None;
    }

    fn seek_to_start(&self) {
        let mut guard = self.shared.slot.lock();
        let slot = &mut *guard;
        let was_playing = slot.playing;
        if let Err(e) = self.shared.rebuild_sink(slot) {
            warn!(resource = self.shared.source.name(), error = %e, "seek failed");
            return;
        }
        if was_playing {
            if let Some(sink) = &slot.sink {
                sink.play();
                slot.playing = true;
            }
        }
    }

    fn set_volume(&self, volume: f32) {
        let mut slot = self.shared.slot.lock();
        slot.volume = volume;
        if let Some(sink) = &slot.sink {
            sink.set_volume(volume);
        }
    }

    fn set_playback_params(&self, speed: f32, pitch: f32) {
        let mut slot = self.shared.slot.lock();
        slot.speed = speed;
        if let Some(sink) = &slot.sink {
            sink.set_speed(speed);
        }
        if (pitch - 1.0).abs() > f32::EPSILON {
            debug!(pitch, "rodio cannot shift pitch independently; ignoring");
        }
    }

    fn set_next(&self, next: Option<Arc<dyn PlatformPlayer>>) {
        let next = next.and_then(|player| {
            let shared = player
                .as_any()
                .downcast_ref::<RodioPlatformPlayer>()
                .map(|rodio| Arc::clone(&rodio.shared));
            if shared.is_none() {
                warn!("cannot chain a player from another backend");
            }
            shared
        });
        self.shared.slot.lock().next = next;
    }

    fn set_on_completion(&self, callback: CompletionCallback) {
        self.shared.slot.lock().on_completion = Some(Arc::from(callback));
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl std::fmt::Debug for RodioPlatformPlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RodioPlatformPlayer")
            .field("source", &self.shared.source)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Tests that need an output device return early when none is available
    // (e.g. CI containers).

    #[test]
    fn test_load_embedded() {
        let data = load(&SoundSource::embedded("tick")).unwrap();
        assert_eq!(&data[0..4], b"RIFF");
    }

    #[test]
    fn test_load_missing_file() {
        let result = load(&SoundSource::file("missing", "/nonexistent/missing.wav"));
        assert!(matches!(result, Err(PlayerError::Prepare { .. })));
    }

    #[test]
    fn test_load_unknown_embedded() {
        assert!(load(&SoundSource::embedded("nope")).is_err());
    }

    #[test]
    fn test_measure_embedded_durations() {
        for (name, millis) in [("silence", 1_000), ("tick", 500)] {
            let source = SoundSource::embedded(name);
            let data = load(&source).unwrap();
            let duration = measure(&source, &data).unwrap();
            assert_eq!(duration.as_millis(), millis, "{name}");
        }
    }

    #[test]
    fn test_measure_rejects_garbage() {
        let source = SoundSource::embedded("garbage");
        let data: Arc<[u8]> = Arc::from(vec![0u8; 64]);
        assert!(measure(&source, &data).is_err());
    }

    #[test]
    fn test_try_create_backend() {
        // Should return None or Some depending on audio availability
        let _backend = try_create_backend();
    }

    #[test]
    fn test_prepare_reports_duration() {
        let Ok(backend) = RodioBackend::new() else {
            return;
        };
        let player = backend.create(&SoundSource::embedded("tick")).unwrap();
        let (tx, rx) = crossbeam_channel::bounded(1);
        player.prepare_async(Box::new(move |result| {
            let _ = tx.send(result);
        }));
        let result = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(result.unwrap(), Duration::from_millis(500));
    }

    #[test]
    fn test_completion_is_delivered() {
        let Ok(backend) = RodioBackend::new() else {
            return;
        };
        let player = backend.create(&SoundSource::embedded("tick")).unwrap();
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        player.set_on_completion(Box::new(move || {
            let _ = done_tx.try_send(());
        }));
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        player.prepare_async(Box::new(move |result| {
            let _ = ready_tx.send(result.is_ok());
        }));
        assert!(ready_rx.recv_timeout(Duration::from_secs(5)).unwrap());

        player.set_volume(0.0);
        player.start();
        assert!(done_rx.recv_timeout(Duration::from_secs(5)).is_ok());
    }
}
