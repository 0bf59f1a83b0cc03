//! Tests for the demo story played by the automatic player.

use libretto::{
    AutoPlayer, GameConfig, GameState, GameStatus, LiveGame, PlayReport, SavedGame, Story,
    demo_story,
};
use std::rc::Rc;

fn demo_game() -> (LiveGame, GameState) {
    let config = GameConfig::default();
    let story = Rc::new(demo_story(&config).unwrap());
    let game = LiveGame::new(Rc::clone(&story), config).unwrap();
    (game, GameState::new(&story))
}

async fn play(choices: Vec<usize>) -> (LiveGame, PlayReport) {
    let (mut game, mut state) = demo_game();
    game.new_game().unwrap();
    let report = AutoPlayer::new(choices)
        .run(&mut game, &mut state)
        .await
        .unwrap();
    (game, report)
}

#[test]
fn test_demo_story_constructs() {
    let story: Story = demo_story(&GameConfig::default()).unwrap();
    assert!(story.is_constructed());
    assert_eq!(story.scenes().len(), 3);
    assert!(story.entry_root().is_some());
    assert!(story.element_named("Ada").is_some());
}

#[test]
fn test_shallow_scene_depth_fails_construction() {
    let config = GameConfig::default().with_max_scene_depth(0usize);
    assert!(demo_story(&config).is_err());
}

#[tokio::test]
async fn test_library_route_transcript() {
    let (game, report) = play(vec![0]).await;
    assert!(report.finished);
    assert_eq!(game.state(), GameStatus::Ended);
    assert_eq!(
        report.transcript,
        vec![
            "[foyer]",
            "Narrator: Rain drums on the manor windows.",
            "Ada: Where should we look first?",
            "> The library",
            "[library]",
            "Ada: Too dark to read anything.",
            "Narrator: And so the night ends.",
        ]
    );
    assert_eq!(report.preloads, 2);
    assert!(report.steps.last().is_some_and(|step| step.is_end()));
}

#[tokio::test]
async fn test_lighting_candles_reveals_the_door() {
    let (game, report) = play(vec![2]).await;
    assert!(report.finished);
    assert_eq!(game.store().get::<i32>("candles"), Some(3));
    assert!(report.transcript.contains(&"> Light the candles".to_string()));
    assert!(
        report
            .transcript
            .contains(&"Ada: Three candles. Much better.".to_string())
    );
    assert!(
        report
            .transcript
            .contains(&"Ada: The candlelight shows a hidden door.".to_string())
    );
}

#[tokio::test]
async fn test_garden_route_returns_to_the_library() {
    let (_, report) = play(vec![1]).await;
    assert!(report.finished);
    let position = |line: &str| report.transcript.iter().position(|l| l == line);
    let garden = position("[garden]").unwrap();
    let library = position("[library]").unwrap();
    assert!(garden < library);
    assert!(position("Ada: Listen, the bells!").is_some());
    assert_eq!(
        report.transcript.last().map(String::as_str),
        Some("Narrator: And so the night ends.")
    );
}

#[tokio::test]
async fn test_unavailable_choice_falls_back_to_the_first() {
    let (_, report) = play(vec![7]).await;
    assert!(report.transcript.contains(&"> The library".to_string()));
}

#[tokio::test]
async fn test_stopped_game_resumes_from_a_save_file() {
    let (mut game, mut state) = demo_game();
    game.new_game().unwrap();
    let partial = AutoPlayer::new(Vec::new())
        .with_max_calls(3)
        .run(&mut game, &mut state)
        .await
        .unwrap();
    assert!(!partial.finished);

    let file = tempfile::NamedTempFile::new().unwrap();
    let saved = game.serialize("slot").unwrap();
    std::fs::write(file.path(), saved.to_json().unwrap()).unwrap();

    let (mut resumed, mut resumed_state) = demo_game();
    let json = std::fs::read_to_string(file.path()).unwrap();
    resumed.deserialize(&SavedGame::from_json(&json).unwrap()).unwrap();
    let report = AutoPlayer::new(vec![0])
        .run(&mut resumed, &mut resumed_state)
        .await
        .unwrap();
    assert!(report.finished);
    assert_eq!(
        report.transcript.last().map(String::as_str),
        Some("Narrator: And so the night ends.")
    );
}
