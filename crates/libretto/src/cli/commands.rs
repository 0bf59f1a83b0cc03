//! CLI command definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Libretto - play and inspect visual novel stories
#[derive(Parser, Debug)]
#[command(name = "libretto")]
#[command(about = "Play and inspect visual novel stories", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Game configuration file (defaults to the usual search path)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Play the demo story automatically and print the transcript
    Play {
        /// Menu choices to pick, in order (comma separated)
        #[arg(long, value_delimiter = ',')]
        choices: Vec<usize>,

        /// Stop after this many advances of the game
        #[arg(long)]
        max_steps: Option<usize>,

        /// Wait for sleep effects instead of skipping them
        #[arg(long)]
        realtime: bool,

        /// Write a save file when play stops
        #[arg(long)]
        save: Option<PathBuf>,

        /// Resume from a save file instead of starting a new game
        #[arg(long)]
        load: Option<PathBuf>,
    },

    /// Print the demo story's scenes and action graph
    Inspect {
        /// Print the graph as JSON
        #[arg(long)]
        json: bool,
    },
}
