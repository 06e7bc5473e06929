//! Racing Companion Library
//!
//! This library provides the audio core of the racing companion.
//! It includes:
//! - Composable media players: gapless loops, lock-step multi-track mixes,
//!   staged progressions, all over one [`sound::MediaPlayer`] contract
//! - A rodio-backed platform layer and deterministic fakes for tests
//! - Tag-scoped event dispatch and fork/join completion listeners
//! - The background music of a game, driven by [`music::GameEvent`]s
//! - JSON music configuration
//! - CLI command parsing and display utilities

pub mod cli;
pub mod config;
pub mod event;
pub mod music;
pub mod sound;

// Re-export commonly used types for convenience
pub use config::{ConfigError, MusicConfig};

// Re-export event types
pub use event::{EventBus, EventError, EventHandler, ForkedListener};

// Re-export music types
pub use music::{BackgroundMusic, GameEvent};

// Re-export sound types
pub use sound::{
    ForwardingMediaPlayer, LoopMediaPlayer, MediaBackend, MediaPlayer, MultiTrackMediaPlayer,
    PlayerError, PlayerResult, PlayerState, ProgressionMediaPlayer, RodioBackend, SoundSource,
};
