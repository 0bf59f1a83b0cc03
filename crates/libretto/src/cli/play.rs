//! Play command handler.

use libretto::{AutoPlayer, GameConfig, GameState, LiveGame, SavedGame, demo_story};
use std::path::PathBuf;
use std::rc::Rc;
use tracing::info;

/// Options of the `play` command.
#[derive(Debug, Clone, Default)]
pub struct PlayOptions {
    /// Menu choices to pick, in order
    pub choices: Vec<usize>,
    /// Stop after this many advances of the game
    pub max_steps: Option<usize>,
    /// Honor sleep durations
    pub realtime: bool,
    /// Save file written when play stops
    pub save: Option<PathBuf>,
    /// Save file to resume from
    pub load: Option<PathBuf>,
}

/// Play the demo story and print its transcript.
pub async fn play_story(
    config: GameConfig,
    options: PlayOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let story = Rc::new(demo_story(&config)?);
    let mut game = LiveGame::new(Rc::clone(&story), config)?;
    let mut state = GameState::new(&story);

    match &options.load {
        Some(path) => {
            let json = std::fs::read_to_string(path)?;
            let saved = SavedGame::from_json(&json)?;
            info!(slot = %saved.name, path = %path.display(), "Resuming saved game");
            game.deserialize(&saved)?;
        }
        None => game.new_game()?,
    }

    let mut player = AutoPlayer::new(options.choices).with_realtime(options.realtime);
    if let Some(max_steps) = options.max_steps {
        player = player.with_max_calls(max_steps);
    }
    let report = player.run(&mut game, &mut state).await?;

    for line in &report.transcript {
        println!("{}", line);
    }
    println!(
        "-- {} steps, {} preload batches{}",
        report.steps.len(),
        report.preloads,
        if report.finished { ", finished" } else { "" }
    );

    if let Some(path) = &options.save {
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| game.config().autosave_name().clone());
        let saved = game.serialize(&name)?;
        std::fs::write(path, saved.to_json()?)?;
        info!(slot = %name, path = %path.display(), "Game saved");
    }
    Ok(())
}
