//! Command-line interface module.
//!
//! This module provides the CLI structure and command handlers for the libretto binary.

mod commands;
mod inspect;
mod play;

pub use commands::{Cli, Commands};
pub use inspect::inspect_story;
pub use play::{PlayOptions, play_story};
