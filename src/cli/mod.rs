//! CLI module for the racing companion.
//!
//! This module provides the command-line interface:
//! - `commands`: Command definitions using clap derive
//! - `display`: Output formatting and display logic

pub mod commands;
pub mod display;

pub use commands::{Cli, Commands, LoopArgs, MusicArgs};
pub use display::Display;
