//! Libretto CLI binary.
//!
//! This binary provides command-line access to the bundled demo story:
//! - Play it automatically, optionally saving or resuming a game
//! - Inspect its scenes and action graph

use clap::Parser;
use libretto::{GameConfig, init_telemetry};

mod cli;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    use cli::{Cli, Commands, PlayOptions, inspect_story, play_story};

    // Parse command-line arguments
    let cli = Cli::parse();

    // Initialize tracing (RUST_LOG overrides the default filter)
    init_telemetry()?;

    let config = match &cli.config {
        Some(path) => GameConfig::from_file(path)?,
        None => GameConfig::load()?,
    };

    // Execute the requested command
    match cli.command {
        Commands::Play {
            choices,
            max_steps,
            realtime,
            save,
            load,
        } => {
            let options = PlayOptions {
                choices,
                max_steps,
                realtime,
                save,
                load,
            };
            play_story(config, options).await?;
        }

        Commands::Inspect { json } => {
            inspect_story(&config, json)?;
        }
    }

    Ok(())
}
