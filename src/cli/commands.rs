//! Command definitions for the racing-companion CLI.
//!
//! Uses clap derive macro for argument parsing.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

// ============================================================================
// CLI Structure
// ============================================================================

/// Racing companion - gapless game music from the command line
#[derive(Parser, Debug)]
#[command(
    name = "racing-companion",
    version,
    about = "Plays looping, layered background music for racing games",
    long_about = "Plays gapless loops and drives the background music of a racing game \
                  through scripted rounds, breaks and transitions.",
    propagate_version = true
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable verbose output for debugging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

// ============================================================================
// Subcommands
// ============================================================================

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Loop an audio file without gaps
    Loop(LoopArgs),

    /// Play the background music through scripted game rounds
    Music(MusicArgs),

    /// Load and validate a music configuration
    CheckConfig {
        /// Configuration file (defaults to the user configuration)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell type for completion script
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

// ============================================================================
// Loop Command Arguments
// ============================================================================

/// Arguments for the loop command
#[derive(Args, Debug, Clone)]
pub struct LoopArgs {
    /// Audio file to loop
    pub path: PathBuf,

    /// How long to play, in seconds (1-3600)
    #[arg(
        short,
        long,
        default_value = "10",
        value_parser = clap::value_parser!(u64).range(1..=3600)
    )]
    pub seconds: u64,

    /// Playback volume (0.0-1.0)
    #[arg(long, default_value = "1.0", value_parser = parse_volume)]
    pub volume: f32,

    /// Playback speed factor (0.25-4.0)
    #[arg(long, default_value = "1.0", value_parser = parse_speed)]
    pub speed: f32,
}

// ============================================================================
// Music Command Arguments
// ============================================================================

/// Arguments for the music command
#[derive(Args, Debug, Clone)]
pub struct MusicArgs {
    /// Configuration file (defaults to the user configuration, then the
    /// built-in demo)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Length of a round in seconds (1-600)
    #[arg(
        long,
        default_value = "8",
        value_parser = clap::value_parser!(u64).range(1..=600)
    )]
    pub round_seconds: u64,

    /// Length of a break in seconds (1-600)
    #[arg(
        long,
        default_value = "4",
        value_parser = clap::value_parser!(u64).range(1..=600)
    )]
    pub break_seconds: u64,

    /// Number of rounds to play (1-20)
    #[arg(
        short,
        long,
        default_value = "3",
        value_parser = clap::value_parser!(u32).range(1..=20)
    )]
    pub rounds: u32,
}

impl Default for MusicArgs {
    fn default() -> Self {
        Self {
            config: None,
            round_seconds: 8,
            break_seconds: 4,
            rounds: 3,
        }
    }
}

// ============================================================================
// Validation Functions
// ============================================================================

fn parse_ranged(s: &str, name: &str, min: f32, max: f32) -> Result<f32, String> {
    let value: f32 = s
        .parse()
        .map_err(|_| format!("{name} must be a number, got '{s}'"))?;
    if !(min..=max).contains(&value) {
        return Err(format!("{name} must be between {min} and {max}"));
    }
    Ok(value)
}

fn parse_volume(s: &str) -> Result<f32, String> {
    parse_ranged(s, "volume", 0.0, 1.0)
}

fn parse_speed(s: &str) -> Result<f32, String> {
    parse_ranged(s, "speed", 0.25, 4.0)
}

// ============================================================================
// Tests
// ============================================================================
