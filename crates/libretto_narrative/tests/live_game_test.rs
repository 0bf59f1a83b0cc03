//! Tests for driving a game with `LiveGame::next`.

use libretto_core::{ActionType, CalledActionResult, Reply, SceneConfig, Story, actions};
use libretto_error::RuntimeGameErrorKind;
use libretto_narrative::{GameConfig, GameEvent, GameState, GameStatus, LiveGame, Next};
use std::cell::RefCell;
use std::rc::Rc;

fn start(story: Story) -> (LiveGame, GameState) {
    let story = Rc::new(story);
    let mut game = LiveGame::new(Rc::clone(&story), GameConfig::default()).unwrap();
    let state = GameState::new(&story);
    game.new_game().unwrap();
    (game, state)
}

/// Play to the end, settling every effect with `Done`.
fn play(game: &mut LiveGame, state: &mut GameState) -> Vec<ActionType> {
    let mut steps = Vec::new();
    for _ in 0..500 {
        match game.next(state).unwrap() {
            Next::Step(result) => {
                steps.push(result.action_type);
                if result.is_end() {
                    break;
                }
            }
            Next::Pending(_) => {
                for effect in state.take_effects() {
                    if let Some(awaitable) = effect.awaitable {
                        awaitable.resolve(Reply::Done);
                    }
                }
            }
            Next::Locked => panic!("unexpected lock"),
            Next::End => break,
        }
    }
    steps
}

fn step(next: Next) -> CalledActionResult {
    match next {
        Next::Step(result) => result,
        other => panic!("expected a step, got {:?}", other),
    }
}

#[test]
fn test_dialog_runs_to_the_end() {
    let mut story = Story::new("dialog");
    let alice = story.character("Alice");
    let hall = story.scene("hall", SceneConfig::default()).unwrap();
    story
        .script(&hall, |b| actions![b.character(&alice).say("One").say("Two")])
        .unwrap();
    story.entry(&hall).unwrap();
    story.construct().unwrap();

    let (mut game, mut state) = start(story);
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    game.on_event(move |event| sink.borrow_mut().push(event.clone()));

    let steps = play(&mut game, &mut state);
    assert_eq!(
        steps,
        vec![
            ActionType::SceneInit,
            ActionType::CharacterSay,
            ActionType::CharacterSay
        ]
    );
    assert_eq!(game.state(), GameStatus::Ended);
    assert!(matches!(game.next(&mut state).unwrap(), Next::End));
    assert!(events.borrow().contains(&GameEvent::End));
    assert_eq!(game.game_history().len(), 2);
    assert!(game.game_history().rows().iter().all(|row| !row.is_pending()));
}

#[test]
fn test_next_before_start_is_an_error() {
    let mut story = Story::new("idle");
    let hall = story.scene("hall", SceneConfig::default()).unwrap();
    story.script(&hall, |b| actions![b.sleep(1)]).unwrap();
    story.entry(&hall).unwrap();
    story.construct().unwrap();
    let story = Rc::new(story);

    let mut game = LiveGame::new(Rc::clone(&story), GameConfig::default()).unwrap();
    let mut state = GameState::new(&story);
    let err = game.next(&mut state).unwrap_err();
    assert_eq!(
        err.as_runtime().unwrap().kind(),
        &RuntimeGameErrorKind::NotStarted
    );
    assert_eq!(game.state(), GameStatus::NotStarted);
}

#[test]
fn test_unconstructed_story_is_rejected() {
    let story = Rc::new(Story::new("draft"));
    let err = LiveGame::new(story, GameConfig::default()).unwrap_err();
    assert_eq!(
        err.as_runtime().unwrap().kind(),
        &RuntimeGameErrorKind::StoryNotConstructed("draft".into())
    );
}

#[test]
fn test_state_of_another_story_is_rejected() {
    let mut story = Story::new("mine");
    let hall = story.scene("hall", SceneConfig::default()).unwrap();
    story.script(&hall, |b| actions![b.sleep(1)]).unwrap();
    story.entry(&hall).unwrap();
    story.construct().unwrap();

    let (mut game, _) = start(story);
    let mut foreign = GameState::for_story("theirs");
    let err = game.next(&mut foreign).unwrap_err();
    assert!(matches!(
        err.as_runtime().unwrap().kind(),
        RuntimeGameErrorKind::StoryMismatch { .. }
    ));
}

#[test]
fn test_menu_choice_selects_branch_and_rejoins() {
    let mut story = Story::new("menu");
    let alice = story.character("Alice");
    let hall = story.scene("hall", SceneConfig::default()).unwrap();
    story
        .script(&hall, |b| {
            actions![
                b.menu()
                    .prompt("Where to?")
                    .choose("Left", |b| actions![b.script(|ctx| ctx.set("went", "left"))])
                    .choose("Right", |b| actions![b.script(|ctx| ctx.set("went", "right"))]),
                b.character(&alice).say("Done"),
            ]
        })
        .unwrap();
    story.entry(&hall).unwrap();
    story.construct().unwrap();

    let (mut game, mut state) = start(story);
    step(game.next(&mut state).unwrap());
    let Next::Pending(menu) = game.next(&mut state).unwrap() else {
        panic!("menu should suspend");
    };
    let view = state.stage().menu.clone().unwrap();
    assert_eq!(view.prompt.as_deref(), Some("Where to?"));
    assert_eq!(view.choices.len(), 2);

    menu.resolve(Reply::Choice(1));
    assert_eq!(step(game.next(&mut state).unwrap()).action_type, ActionType::Menu);
    assert!(state.stage().menu.is_none());
    assert_eq!(step(game.next(&mut state).unwrap()).action_type, ActionType::Script);
    assert_eq!(game.store().get::<String>("went").as_deref(), Some("right"));
    assert!(matches!(game.next(&mut state).unwrap(), Next::Pending(_)));
    assert_eq!(state.stage().dialog.as_ref().map(|d| d.text.as_str()), Some("Done"));

    let menu_row = &game.game_history().rows()[0];
    assert_eq!(menu_row.selected(), Some(1));
    assert!(!menu_row.is_pending());
}

#[test]
fn test_guarded_choice_is_hidden_and_cannot_be_picked() {
    let mut story = Story::new("guards");
    let alice = story.character("Alice");
    let hall = story.scene("hall", SceneConfig::default()).unwrap();
    story
        .script(&hall, |b| {
            actions![
                b.menu()
                    .choose_if(
                        "Secret",
                        |ctx| ctx.get::<bool>("vip").unwrap_or(false),
                        |b| actions![b.script(|ctx| ctx.set("secret", true))]
                    )
                    .choose("Plain", |b| actions![b.script(|ctx| ctx.set("plain", true))]),
                b.character(&alice).say("After"),
            ]
        })
        .unwrap();
    story.entry(&hall).unwrap();
    story.construct().unwrap();

    let (mut game, mut state) = start(story);
    step(game.next(&mut state).unwrap());
    let Next::Pending(menu) = game.next(&mut state).unwrap() else {
        panic!("menu should suspend");
    };
    let offered: Vec<usize> = state
        .stage()
        .menu
        .as_ref()
        .unwrap()
        .choices
        .iter()
        .map(|choice| choice.index)
        .collect();
    assert_eq!(offered, vec![1]);

    let menu_action = game.current_action().unwrap();
    let after = game.story().action(menu_action).unwrap().child();
    menu.resolve(Reply::Choice(0));
    assert_eq!(step(game.next(&mut state).unwrap()).node, after);
    assert_eq!(game.store().get::<bool>("secret"), None);
}

#[test]
fn test_condition_reads_script_writes() {
    let mut story = Story::new("condition");
    let alice = story.character("Alice");
    let hall = story.scene("hall", SceneConfig::default()).unwrap();
    story
        .script(&hall, |b| {
            actions![
                b.script(|ctx| ctx.set("coins", 3)),
                b.condition()
                    .if_(
                        |ctx| ctx.get::<i32>("coins").unwrap_or(0) > 5,
                        |b| actions![b.script(|ctx| ctx.set("rich", true))]
                    )
                    .else_(|b| actions![b.script(|ctx| ctx.set("rich", false))]),
                b.character(&alice).say("Counted"),
            ]
        })
        .unwrap();
    story.entry(&hall).unwrap();
    story.construct().unwrap();

    let (mut game, mut state) = start(story);
    let steps = play(&mut game, &mut state);
    assert_eq!(
        steps,
        vec![
            ActionType::SceneInit,
            ActionType::Script,
            ActionType::Condition,
            ActionType::Script,
            ActionType::CharacterSay,
        ]
    );
    assert_eq!(game.store().get::<bool>("rich"), Some(false));
}

#[test]
fn test_dead_cycle_errors_after_the_limit() {
    let mut story = Story::new("spin");
    let alice = story.character("Alice");
    let hall = story.scene("hall", SceneConfig::default()).unwrap();
    story
        .script(&hall, |b| actions![b.character(&alice).say("Waiting")])
        .unwrap();
    story.entry(&hall).unwrap();
    story.construct().unwrap();

    let (mut game, mut state) = start(story);
    step(game.next(&mut state).unwrap());
    assert!(matches!(game.next(&mut state).unwrap(), Next::Pending(_)));
    for _ in 0..1000 {
        assert!(matches!(game.next(&mut state).unwrap(), Next::Pending(_)));
    }
    let err = game.next(&mut state).unwrap_err();
    assert_eq!(
        err.as_runtime().unwrap().kind(),
        &RuntimeGameErrorKind::DeadCycle(1000)
    );
}

#[test]
fn test_held_lock_stops_progress() {
    let mut story = Story::new("locked");
    let hall = story.scene("hall", SceneConfig::default()).unwrap();
    story
        .script(&hall, |b| actions![b.script(|ctx| ctx.set("ran", true))])
        .unwrap();
    story.entry(&hall).unwrap();
    story.construct().unwrap();

    let (mut game, mut state) = start(story);
    let guard = game.lock().acquire();
    assert!(matches!(game.next(&mut state).unwrap(), Next::Locked));
    assert!(matches!(game.next(&mut state).unwrap(), Next::Locked));
    drop(guard);
    assert_eq!(step(game.next(&mut state).unwrap()).action_type, ActionType::SceneInit);
}

#[test]
fn test_background_blocks_wait_while_locked() {
    let mut story = Story::new("locked-async");
    let alice = story.character("Alice");
    let hall = story.scene("hall", SceneConfig::default()).unwrap();
    story
        .script(&hall, |b| {
            actions![
                b.do_async(|b| actions![b.script(|ctx| ctx.set("x", true))]),
                b.character(&alice).say("Hold on"),
            ]
        })
        .unwrap();
    story.entry(&hall).unwrap();
    story.construct().unwrap();

    let (mut game, mut state) = start(story);
    step(game.next(&mut state).unwrap());
    assert_eq!(step(game.next(&mut state).unwrap()).action_type, ActionType::ControlDoAsync);
    let recorded = game.history().len();

    let guard = game.lock().acquire();
    assert!(matches!(game.next(&mut state).unwrap(), Next::Locked));
    assert_eq!(game.store().get::<bool>("x"), None);
    assert_eq!(game.history().len(), recorded);
    assert_eq!(game.background_tasks(), 1);

    drop(guard);
    assert!(matches!(game.next(&mut state).unwrap(), Next::Pending(_)));
    assert_eq!(game.store().get::<bool>("x"), Some(true));
}

#[test]
fn test_aborted_step_still_continues() {
    let mut story = Story::new("skip");
    let alice = story.character("Alice");
    let hall = story.scene("hall", SceneConfig::default()).unwrap();
    story
        .script(&hall, |b| actions![b.character(&alice).say("Skip me").say("Next")])
        .unwrap();
    story.entry(&hall).unwrap();
    story.construct().unwrap();

    let (mut game, mut state) = start(story);
    step(game.next(&mut state).unwrap());
    let Next::Pending(line) = game.next(&mut state).unwrap() else {
        panic!("say should suspend");
    };
    assert!(line.abort());
    let result = step(game.next(&mut state).unwrap());
    assert_eq!(result.action_type, ActionType::CharacterSay);
    assert!(result.node.is_some());
}

#[test]
fn test_all_waits_for_every_block() {
    let mut story = Story::new("all");
    let hall = story.scene("hall", SceneConfig::default()).unwrap();
    story
        .script(&hall, |b| {
            actions![
                b.all(|b| vec![
                    actions![b.script(|ctx| ctx.set("a", true))],
                    actions![b.sleep(10), b.script(|ctx| ctx.set("b", true))],
                ]),
                b.script(|ctx| ctx.set("after", true)),
            ]
        })
        .unwrap();
    story.entry(&hall).unwrap();
    story.construct().unwrap();

    let (mut game, mut state) = start(story);
    step(game.next(&mut state).unwrap());
    let Next::Pending(join) = game.next(&mut state).unwrap() else {
        panic!("all should suspend");
    };
    assert!(matches!(game.next(&mut state).unwrap(), Next::Pending(_)));
    assert_eq!(game.store().get::<bool>("a"), Some(true));
    assert!(!join.is_settled());

    let steps = play(&mut game, &mut state);
    assert_eq!(steps, vec![ActionType::ControlAll, ActionType::Script]);
    assert_eq!(game.store().get::<bool>("b"), Some(true));
    assert_eq!(game.store().get::<bool>("after"), Some(true));
}

#[test]
fn test_any_continues_after_the_first_block() {
    let mut story = Story::new("any");
    let hall = story.scene("hall", SceneConfig::default()).unwrap();
    story
        .script(&hall, |b| {
            actions![
                b.any(|b| vec![
                    actions![b.sleep(50)],
                    actions![b.script(|ctx| ctx.set("fast", true))],
                ]),
                b.script(|ctx| ctx.set("after", true)),
            ]
        })
        .unwrap();
    story.entry(&hall).unwrap();
    story.construct().unwrap();

    let (mut game, mut state) = start(story);
    step(game.next(&mut state).unwrap());
    assert!(matches!(game.next(&mut state).unwrap(), Next::Pending(_)));
    assert_eq!(step(game.next(&mut state).unwrap()).action_type, ActionType::ControlAny);
    assert_eq!(game.store().get::<bool>("fast"), Some(true));
    assert_eq!(game.background_tasks(), 1);

    let last = step(game.next(&mut state).unwrap());
    assert!(last.is_end());
    assert_eq!(game.background_tasks(), 0);
}

#[test]
fn test_repeat_runs_its_block_n_times() {
    let mut story = Story::new("repeat");
    let hall = story.scene("hall", SceneConfig::default()).unwrap();
    story
        .script(&hall, |b| {
            actions![b.repeat(3, |b| {
                actions![b.script(|ctx| {
                    let count = ctx.get::<i32>("count").unwrap_or(0);
                    ctx.set("count", count + 1);
                })]
            })]
        })
        .unwrap();
    story.entry(&hall).unwrap();
    story.construct().unwrap();

    let (mut game, mut state) = start(story);
    let steps = play(&mut game, &mut state);
    assert_eq!(steps, vec![ActionType::SceneInit, ActionType::ControlRepeat]);
    assert_eq!(game.store().get::<i32>("count"), Some(3));
}

#[test]
fn test_do_async_runs_beside_the_main_flow() {
    let mut story = Story::new("async");
    let alice = story.character("Alice");
    let hall = story.scene("hall", SceneConfig::default()).unwrap();
    story
        .script(&hall, |b| {
            actions![
                b.do_async(|b| actions![b.script(|ctx| ctx.set("background", true))]),
                b.character(&alice).say("Meanwhile"),
            ]
        })
        .unwrap();
    story.entry(&hall).unwrap();
    story.construct().unwrap();

    let (mut game, mut state) = start(story);
    step(game.next(&mut state).unwrap());
    assert_eq!(step(game.next(&mut state).unwrap()).action_type, ActionType::ControlDoAsync);
    assert_eq!(game.background_tasks(), 1);
    assert!(matches!(game.next(&mut state).unwrap(), Next::Pending(_)));
    assert_eq!(game.store().get::<bool>("background"), Some(true));
    assert_eq!(game.background_tasks(), 0);
}

#[tokio::test]
async fn test_pending_step_can_be_awaited() {
    let mut story = Story::new("await");
    let alice = story.character("Alice");
    let hall = story.scene("hall", SceneConfig::default()).unwrap();
    story
        .script(&hall, |b| actions![b.character(&alice).say("Hi")])
        .unwrap();
    story.entry(&hall).unwrap();
    story.construct().unwrap();

    let (mut game, mut state) = start(story);
    step(game.next(&mut state).unwrap());
    let Next::Pending(line) = game.next(&mut state).unwrap() else {
        panic!("say should suspend");
    };
    line.resolve(Reply::Done);
    let settled = line.clone().await;
    assert!(!settled.is_aborted());
    assert_eq!(settled.value().map(|r| r.action_type), Some(ActionType::CharacterSay));
}
