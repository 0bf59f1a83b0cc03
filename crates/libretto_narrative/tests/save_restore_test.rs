//! Tests for snapshots and restoring them.

use libretto_core::{CalledActionResult, ImageConfig, Reply, SceneConfig, Story, actions};
use libretto_error::{JsonError, LibrettoResult, RuntimeGameErrorKind};
use libretto_narrative::{
    EffectKind, GameConfig, GameEvent, GameState, GameStatus, LiveGame, Next, SavedElementState,
    SavedGame, Service,
};
use serde_json::{Value, json};
use std::cell::RefCell;
use std::rc::Rc;

fn branching_story() -> Rc<Story> {
    let mut story = Story::new("branching");
    let alice = story.character("Alice");
    let door = story.image("door", ImageConfig::new("door.png"));
    let hall = story.scene("hall", SceneConfig::default()).unwrap();
    let garden = story.scene("garden", SceneConfig::default()).unwrap();
    story
        .script(&hall, |b| {
            actions![
                b.script(|ctx| ctx.set("visits", 1)),
                b.image(&door).show(),
                b.character(&alice).say("Pick a door"),
                b.menu()
                    .choose("Stay", |b| actions![b.script(|ctx| ctx.set("stayed", true))])
                    .choose("Leave", |b| actions![b.scene(&garden).jump()]),
                b.character(&alice).say("Staying then"),
            ]
        })
        .unwrap();
    story
        .script(&garden, |b| {
            actions![
                b.character(&alice).set_name("Alice in the garden"),
                b.character(&alice).say("Fresh air"),
            ]
        })
        .unwrap();
    story.entry(&hall).unwrap();
    story.construct().unwrap();
    Rc::new(story)
}

/// Drive to the end, picking choice 1 at every menu.
fn replay(game: &mut LiveGame, state: &mut GameState) -> Vec<CalledActionResult> {
    let mut results = Vec::new();
    for _ in 0..200 {
        match game.next(state).unwrap() {
            Next::Pending(awaitable) => {
                let reply = if state.stage().menu.is_some() {
                    Reply::Choice(1)
                } else {
                    Reply::Done
                };
                awaitable.resolve(reply);
            }
            Next::Step(result) => {
                results.push(result);
                if result.is_end() {
                    break;
                }
            }
            Next::End => break,
            Next::Locked => panic!("unexpected lock"),
        }
    }
    results
}

/// Advance until the main flow waits on a menu.
fn advance_to_menu(game: &mut LiveGame, state: &mut GameState) {
    for _ in 0..100 {
        if let Next::Pending(awaitable) = game.next(state).unwrap() {
            if state.stage().menu.is_some() {
                return;
            }
            awaitable.resolve(Reply::Done);
        }
    }
    panic!("menu never reached");
}

fn new_game(story: &Rc<Story>) -> (LiveGame, GameState) {
    let game = LiveGame::new(Rc::clone(story), GameConfig::default()).unwrap();
    (game, GameState::new(story))
}

#[test]
fn test_replay_after_restore_matches_original() {
    let story = branching_story();
    let (mut original, mut state) = new_game(&story);
    original.new_game().unwrap();
    advance_to_menu(&mut original, &mut state);

    let json = original.serialize("slot").unwrap().to_json().unwrap();
    let saved = SavedGame::from_json(&json).unwrap();

    let (mut restored, mut restored_state) = new_game(&story);
    restored.deserialize(&saved).unwrap();
    assert_eq!(restored.current_action(), original.current_action());
    assert_eq!(restored.store(), original.store());

    let expected = replay(&mut original, &mut state);
    let actual = replay(&mut restored, &mut restored_state);
    assert_eq!(actual, expected);
    assert_eq!(restored.store(), original.store());
    assert_eq!(restored.state(), GameStatus::Ended);
}

#[test]
fn test_snapshot_omits_unchanged_elements() {
    let story = branching_story();
    let (mut game, mut state) = new_game(&story);
    game.new_game().unwrap();
    advance_to_menu(&mut game, &mut state);

    let saved = game.serialize("slot").unwrap();
    let door = story.element_named("door").unwrap();
    assert_eq!(
        saved.game.element_states,
        vec![SavedElementState {
            id: door.id().to_string(),
            data: json!({ "visible": true }),
        }]
    );
    assert_eq!(saved.game.store.get::<i32>("visits"), Some(1));
    assert!(saved.game.stage.menu.is_some());
    assert_eq!(
        saved.game.current_action,
        game.current_action().map(|id| id.to_string())
    );
}

#[test]
fn test_restored_elements_are_applied() {
    let story = branching_story();
    let (mut game, mut state) = new_game(&story);
    game.new_game().unwrap();
    for _ in 0..100 {
        match game.next(&mut state).unwrap() {
            Next::Pending(awaitable) => {
                let reply = if state.stage().menu.is_some() {
                    Reply::Choice(1)
                } else {
                    Reply::Done
                };
                awaitable.resolve(reply);
            }
            Next::Step(result) if result.is_end() => break,
            _ => {}
        }
        if state.stage().dialog.as_ref().map(|d| d.text.as_str()) == Some("Fresh air") {
            break;
        }
    }
    let saved = game.serialize("garden").unwrap();
    assert_eq!(saved.game.element_states.len(), 2);

    let (mut restored, _) = new_game(&story);
    restored.deserialize(&saved).unwrap();
    let alice = story.element_named("Alice").unwrap();
    let name = restored
        .element_state(*alice.id())
        .and_then(|state| state.as_character())
        .map(|state| state.name.clone());
    assert_eq!(name.as_deref(), Some("Alice in the garden"));
}

#[test]
fn test_unknown_ids_are_rejected_without_touching_live_state() {
    let story = branching_story();
    let (mut game, mut state) = new_game(&story);
    game.new_game().unwrap();
    advance_to_menu(&mut game, &mut state);
    let good = game.serialize("slot").unwrap();
    let current = game.current_action();

    let mut missing_action = good.clone();
    missing_action.game.current_action = Some("action-999".to_string());
    let err = game.deserialize(&missing_action).unwrap_err();
    assert_eq!(
        err.as_runtime().unwrap().kind(),
        &RuntimeGameErrorKind::MissingAction("action-999".into())
    );

    let mut missing_element = good.clone();
    missing_element.game.element_states.push(SavedElementState {
        id: "element-99".to_string(),
        data: json!({}),
    });
    let err = game.deserialize(&missing_element).unwrap_err();
    assert_eq!(
        err.as_runtime().unwrap().kind(),
        &RuntimeGameErrorKind::MissingElement("element-99".into())
    );

    let mut malformed = good.clone();
    malformed.game.element_states[0].id = "door".to_string();
    let err = game.deserialize(&malformed).unwrap_err();
    assert!(matches!(
        err.as_runtime().unwrap().kind(),
        RuntimeGameErrorKind::InvalidSave(_)
    ));

    let mut bad_data = good;
    bad_data.game.element_states[0].data = json!({ "visible": "yes" });
    let err = game.deserialize(&bad_data).unwrap_err();
    assert!(matches!(
        err.as_runtime().unwrap().kind(),
        RuntimeGameErrorKind::InvalidElementData { .. }
    ));

    assert_eq!(game.current_action(), current);
    assert_eq!(game.state(), GameStatus::AwaitingExternalEvent);
}

struct Playtime(u64);

impl Service for Playtime {
    fn name(&self) -> &str {
        "playtime"
    }

    fn serialize(&self) -> LibrettoResult<Value> {
        Ok(json!(self.0))
    }

    fn deserialize(&mut self, data: Value) -> LibrettoResult<()> {
        self.0 = data
            .as_u64()
            .ok_or_else(|| JsonError::new("playtime must be a number"))?;
        Ok(())
    }
}

#[test]
fn test_services_travel_with_the_save() {
    let story = branching_story();
    let (mut game, mut state) = new_game(&story);
    game.register_service(Rc::new(RefCell::new(Playtime(42))));
    game.new_game().unwrap();
    game.next(&mut state).unwrap();

    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    game.on_event(move |event| sink.borrow_mut().push(event.clone()));
    let saved = game.serialize("slot").unwrap();
    assert_eq!(saved.game.services.get("playtime"), Some(&json!(42)));

    let playtime = Rc::new(RefCell::new(Playtime(0)));
    let (mut restored, _) = new_game(&story);
    restored.register_service(playtime.clone());
    let sink = Rc::clone(&events);
    restored.on_event(move |event| sink.borrow_mut().push(event.clone()));
    restored.deserialize(&saved).unwrap();
    assert_eq!(playtime.borrow().0, 42);

    let events = events.borrow();
    assert_eq!(
        events.as_slice(),
        &[
            GameEvent::Saved("slot".into()),
            GameEvent::Loaded("slot".into()),
            GameEvent::Resync,
        ]
    );
}

#[test]
fn test_autosave_uses_configured_name() {
    let story = branching_story();
    let config = GameConfig::default().with_autosave_name("quick".to_string());
    let mut game = LiveGame::new(Rc::clone(&story), config).unwrap();
    game.new_game().unwrap();
    assert_eq!(game.autosave().unwrap().name, "quick");
}

#[test]
fn test_serialize_before_start_is_an_error() {
    let story = branching_story();
    let (game, _) = new_game(&story);
    let err = game.serialize("slot").unwrap_err();
    assert_eq!(
        err.as_runtime().unwrap().kind(),
        &RuntimeGameErrorKind::NotStarted
    );
}

/// Main flow waits on a line while a background block is still sleeping.
fn async_story() -> Rc<Story> {
    let mut story = Story::new("async-save");
    let alice = story.character("Alice");
    let hall = story.scene("hall", SceneConfig::default()).unwrap();
    story
        .script(&hall, |b| {
            actions![
                b.do_async(|b| actions![b.sleep(10), b.script(|ctx| ctx.set("x", true))]),
                b.character(&alice).say("wait"),
                b.condition()
                    .if_(
                        |ctx| ctx.get::<bool>("x") == Some(true),
                        |b| actions![b.character(&alice).say("A")],
                    )
                    .else_(|b| actions![b.character(&alice).say("B")]),
            ]
        })
        .unwrap();
    story.entry(&hall).unwrap();
    story.construct().unwrap();
    Rc::new(story)
}

/// Play to the end, settling every effect and collecting dialog lines.
fn lines(game: &mut LiveGame, state: &mut GameState) -> Vec<String> {
    let mut lines = Vec::new();
    for _ in 0..200 {
        let next = game.next(state).unwrap();
        for effect in state.take_effects() {
            if let EffectKind::Dialog { text, .. } = &effect.kind {
                lines.push(text.clone());
            }
            if let Some(awaitable) = effect.awaitable {
                awaitable.resolve(Reply::Done);
            }
        }
        match next {
            Next::Step(result) if result.is_end() => break,
            Next::End => break,
            _ => {}
        }
    }
    lines
}

#[test]
fn test_background_block_survives_save_and_restore() {
    let story = async_story();
    let (mut original, mut state) = new_game(&story);
    original.new_game().unwrap();
    for _ in 0..3 {
        original.next(&mut state).unwrap();
    }
    assert_eq!(state.stage().dialog.as_ref().map(|d| d.text.as_str()), Some("wait"));
    assert_eq!(original.background_tasks(), 1);

    let saved = original.serialize("mid-block").unwrap();
    assert_eq!(saved.game.background.len(), 1);
    let saved = SavedGame::from_json(&saved.to_json().unwrap()).unwrap();

    let (mut restored, mut restored_state) = new_game(&story);
    restored.deserialize(&saved).unwrap();
    assert_eq!(restored.background_tasks(), 1);

    let expected = lines(&mut original, &mut state);
    assert_eq!(expected, vec!["wait", "A"]);
    assert_eq!(lines(&mut restored, &mut restored_state), expected);
    assert_eq!(restored.store().get::<bool>("x"), Some(true));
}

#[test]
fn test_unknown_background_action_is_rejected() {
    let story = async_story();
    let (mut game, mut state) = new_game(&story);
    game.new_game().unwrap();
    for _ in 0..3 {
        game.next(&mut state).unwrap();
    }
    let mut saved = game.serialize("mid-block").unwrap();
    saved.game.background[0].stack = vec!["action-999".to_string()];

    let (mut restored, _) = new_game(&story);
    let err = restored.deserialize(&saved).unwrap_err();
    assert_eq!(
        err.as_runtime().unwrap().kind(),
        &RuntimeGameErrorKind::MissingAction("action-999".into())
    );
    assert_eq!(restored.state(), GameStatus::NotStarted);
    assert_eq!(restored.background_tasks(), 0);
}

struct Zone(String);

impl Service for Zone {
    fn name(&self) -> &str {
        "zone"
    }

    fn serialize(&self) -> LibrettoResult<Value> {
        Ok(json!(self.0))
    }

    fn deserialize(&mut self, data: Value) -> LibrettoResult<()> {
        self.0 = data
            .as_str()
            .ok_or_else(|| JsonError::new("zone must be a string"))?
            .to_string();
        Ok(())
    }
}

#[test]
fn test_failed_service_restore_keeps_every_service() {
    let story = branching_story();
    let (mut game, mut state) = new_game(&story);
    game.register_service(Rc::new(RefCell::new(Playtime(99))));
    game.register_service(Rc::new(RefCell::new(Zone("attic".to_string()))));
    game.new_game().unwrap();
    game.next(&mut state).unwrap();
    let mut saved = game.serialize("slot").unwrap();
    // "playtime" restores before "zone" rejects its payload.
    saved.game.services.insert("zone".to_string(), json!(5));

    let playtime = Rc::new(RefCell::new(Playtime(1)));
    let zone = Rc::new(RefCell::new(Zone("cellar".to_string())));
    let (mut restored, mut restored_state) = new_game(&story);
    restored.register_service(playtime.clone());
    restored.register_service(zone.clone());
    restored.new_game().unwrap();
    restored.next(&mut restored_state).unwrap();
    let current = restored.current_action();

    let err = restored.deserialize(&saved).unwrap_err();
    assert!(matches!(
        err.as_runtime().unwrap().kind(),
        RuntimeGameErrorKind::Service { name, .. } if name == "zone"
    ));
    assert_eq!(playtime.borrow().0, 1);
    assert_eq!(zone.borrow().0, "cellar");
    assert_eq!(restored.current_action(), current);
}
