//! Display utilities for the racing-companion CLI.
//!
//! This module provides formatted output for:
//! - Loop playback progress
//! - Game events driving the background music
//! - Configuration summaries
//! - Error messages

use std::path::Path;
use std::time::Duration;

use crate::config::MusicConfig;
use crate::music::GameEvent;
use crate::sound::SoundSource;

// ============================================================================
// Display
// ============================================================================

/// Display utilities for CLI output.
pub struct Display;

impl Display {
    /// Shows that a loop started playing.
    pub fn show_loop_started(path: &Path, seconds: u64, length: Option<Duration>) {
        println!("> Looping {}", path.display());
        if let Some(length) = length {
            println!("  Loop length: {}", Self::format_duration(length));
        }
        println!("  Playing for: {}", Self::format_duration(Duration::from_secs(seconds)));
    }

    /// Shows how a loop session ended.
    pub fn show_loop_finished(rotations: u64) {
        println!("[] Stopped after {}", Self::plural(rotations, "full loop"));
    }

    /// Shows a game event sent to the music.
    pub fn show_event(round: u32, event: GameEvent) {
        println!("{}", Self::format_event(round, event));
    }

    /// Shows the transition interval suggested by a continue.
    pub fn show_transition_interval(interval: Duration) {
        println!("  next transition in {}", Self::format_duration(interval));
    }

    /// Shows a summary of a valid configuration.
    pub fn show_config(path: Option<&Path>, config: &MusicConfig) {
        match path {
            Some(path) => println!("* Configuration OK: {}", path.display()),
            None => println!("* Built-in demo configuration"),
        }
        for line in Self::config_lines(config) {
            println!("  {line}");
        }
    }

    /// Shows an error message.
    pub fn show_error(message: &str) {
        eprintln!("Error: {message}");
    }

    fn format_event(round: u32, event: GameEvent) -> String {
        let symbol = match event {
            GameEvent::Start | GameEvent::Continue => ">",
            GameEvent::Break => "||",
            GameEvent::TransitionIn => "~",
            GameEvent::HurryUp => ">>",
            GameEvent::Reset | GameEvent::Exit => "[]",
        };
        format!("{symbol} round {round}: {event}")
    }

    fn config_lines(config: &MusicConfig) -> Vec<String> {
        let names = |sources: &[SoundSource]| {
            sources
                .iter()
                .map(SoundSource::name)
                .collect::<Vec<_>>()
                .join(", ")
        };
        vec![
            format!("Main stages: {}", names(&config.main_stages)),
            format!("Break: {}", config.break_track.name()),
            format!("Transitions: {}", names(&config.transitions)),
            format!("Volume: {:.0}%", config.volume * 100.0),
            format!("Hurry-up speed: x{}", config.hurry_up_speed),
        ]
    }

    /// Formats a duration as `m:ss`, or `s.ss s` below a minute.
    fn format_duration(duration: Duration) -> String {
        let total = duration.as_secs();
        if total < 60 {
            format!("{:.2} s", duration.as_secs_f64())
        } else {
            format!("{}:{:02}", total / 60, total % 60)
        }
    }

    fn plural(count: u64, noun: &str) -> String {
        if count == 1 {
            format!("1 {noun}")
        } else {
            format!("{count} {noun}s")
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
