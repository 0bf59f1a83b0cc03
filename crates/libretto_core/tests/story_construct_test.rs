//! Tests for story registration, script linking and construction.

use libretto_core::{
    ActionContent, ActionType, ControlOp, ImageConfig, SceneConfig, Story, actions,
};
use libretto_error::StaticScriptWarningKind;

fn script_kind(err: &libretto_error::LibrettoError) -> StaticScriptWarningKind {
    err.as_script()
        .map(|warning| warning.kind().clone())
        .expect("expected a script warning")
}

#[test]
fn test_script_links_scene_root_then_actions() {
    let mut story = Story::new("linking");
    let alice = story.character("Alice");
    let intro = story.scene("intro", SceneConfig::default()).unwrap();
    story
        .script(&intro, |b| {
            actions![b.character(&alice).say("One").say("Two"), b.sleep(5)]
        })
        .unwrap();
    story.entry(&intro).unwrap();
    story.construct().unwrap();

    let root = story.entry_root().unwrap();
    let order: Vec<ActionType> = story
        .get_all_children(root)
        .into_iter()
        .map(|id| *story.action(id).unwrap().action_type())
        .collect();
    assert_eq!(
        order,
        vec![
            ActionType::SceneInit,
            ActionType::CharacterSay,
            ActionType::CharacterSay,
            ActionType::ControlSleep,
        ]
    );
}

#[test]
fn test_condition_branches_rejoin_the_flow() {
    let mut story = Story::new("branches");
    let bob = story.character("Bob");
    let intro = story.scene("intro", SceneConfig::default()).unwrap();
    story
        .script(&intro, |b| {
            actions![
                b.condition()
                    .if_(|ctx| ctx.get::<bool>("lucky").unwrap_or(false), |b| {
                        actions![b.character(&bob).say("Lucky")]
                    })
                    .else_(|b| actions![b.character(&bob).say("Unlucky")]),
                b.character(&bob).say("Either way"),
            ]
        })
        .unwrap();
    story.entry(&intro).unwrap();
    story.construct().unwrap();

    let root = story.entry_root().unwrap();
    let condition = story.action(root).unwrap().child().unwrap();
    let after = story.action(condition).unwrap().child().unwrap();
    let ActionContent::Condition(content) = story.action(condition).unwrap().content() else {
        panic!("expected a condition");
    };
    let lucky = content.branches[0].head.unwrap();
    let unlucky = content.otherwise.unwrap();
    assert_eq!(story.action(lucky).unwrap().child(), Some(after));
    assert_eq!(story.action(unlucky).unwrap().child(), Some(after));
}

#[test]
fn test_async_bodies_do_not_rejoin() {
    let mut story = Story::new("async");
    let carol = story.character("Carol");
    let intro = story.scene("intro", SceneConfig::default()).unwrap();
    story
        .script(&intro, |b| {
            actions![
                b.do_async(|b| actions![b.character(&carol).say("Meanwhile")]),
                b.character(&carol).say("Now"),
            ]
        })
        .unwrap();
    story.entry(&intro).unwrap();
    story.construct().unwrap();

    let root = story.entry_root().unwrap();
    let spawn = story.action(root).unwrap().child().unwrap();
    let ActionContent::Control(ControlOp::DoAsync(Some(body))) =
        story.action(spawn).unwrap().content()
    else {
        panic!("expected do_async");
    };
    assert_eq!(story.action(*body).unwrap().child(), None);
}

#[test]
fn test_duplicate_scene_name_is_rejected() {
    let mut story = Story::new("dupes");
    story.scene("hall", SceneConfig::default()).unwrap();
    let err = story.scene("hall", SceneConfig::default()).unwrap_err();
    assert_eq!(
        script_kind(&err),
        StaticScriptWarningKind::DuplicateSceneName("hall".into())
    );
    assert!(err.as_script().unwrap().call_site().is_some());
}

#[test]
fn test_scene_scripted_twice_is_rejected() {
    let mut story = Story::new("twice");
    let hall = story.scene("hall", SceneConfig::default()).unwrap();
    story.script(&hall, |b| actions![b.sleep(1)]).unwrap();
    let err = story.script(&hall, |b| actions![b.sleep(1)]).unwrap_err();
    assert_eq!(
        script_kind(&err),
        StaticScriptWarningKind::SceneScriptedTwice("hall".into())
    );
}

#[test]
fn test_malformed_conditions_are_rejected() {
    let mut story = Story::new("conditions");
    let a = story.scene("a", SceneConfig::default()).unwrap();
    let err = story
        .script(&a, |b| {
            actions![b
                .condition()
                .if_(|_| true, |_| actions![])
                .if_(|_| false, |_| actions![])]
        })
        .unwrap_err();
    assert_eq!(script_kind(&err), StaticScriptWarningKind::DuplicateIf);

    let b_scene = story.scene("b", SceneConfig::default()).unwrap();
    let err = story
        .script(&b_scene, |b| {
            actions![b
                .condition()
                .if_(|_| true, |_| actions![])
                .else_(|_| actions![])
                .else_if(|_| true, |_| actions![])]
        })
        .unwrap_err();
    assert_eq!(script_kind(&err), StaticScriptWarningKind::ElseIfAfterElse);

    let c = story.scene("c", SceneConfig::default()).unwrap();
    let err = story
        .script(&c, |b| {
            actions![b
                .condition()
                .if_(|_| true, |_| actions![])
                .else_(|_| actions![])
                .else_(|_| actions![])]
        })
        .unwrap_err();
    assert_eq!(script_kind(&err), StaticScriptWarningKind::DuplicateElse);
}

#[test]
fn test_menu_without_choices_is_rejected() {
    let mut story = Story::new("menus");
    let hall = story.scene("hall", SceneConfig::default()).unwrap();
    let err = story
        .script(&hall, |b| actions![b.menu().prompt("Where to?")])
        .unwrap_err();
    assert_eq!(
        script_kind(&err),
        StaticScriptWarningKind::EmptyMenu("Where to?".into())
    );
}

#[test]
fn test_image_mounted_twice_is_rejected() {
    let mut story = Story::new("mounts");
    let door = story.image("door", ImageConfig::new("door.png"));
    let hall = story.scene("hall", SceneConfig::default()).unwrap();
    let err = story
        .script(&hall, |b| actions![b.mount(&door), b.mount(&door)])
        .unwrap_err();
    assert!(matches!(
        script_kind(&err),
        StaticScriptWarningKind::DuplicateMount { .. }
    ));
}

#[test]
fn test_unscripted_reachable_scene_fails_construction() {
    let mut story = Story::new("unscripted");
    let start = story.scene("start", SceneConfig::default()).unwrap();
    let end = story.scene("end", SceneConfig::default()).unwrap();
    story.script(&start, |b| actions![b.scene(&end).jump()]).unwrap();
    story.entry(&start).unwrap();
    let err = story.construct().unwrap_err();
    assert_eq!(
        script_kind(&err),
        StaticScriptWarningKind::UnscriptedScene("end".into())
    );
}

#[test]
fn test_missing_entry_fails_construction() {
    let mut story = Story::new("no entry");
    let err = story.construct().unwrap_err();
    assert_eq!(script_kind(&err), StaticScriptWarningKind::MissingEntry);
}

#[test]
fn test_depth_bound_is_enforced() {
    let mut story = Story::new("deep").with_max_depth(2);
    let scenes: Vec<_> = (0..4)
        .map(|n| story.scene(format!("s{}", n), SceneConfig::default()).unwrap())
        .collect();
    for pair in scenes.windows(2) {
        let target = pair[1];
        story.script(&pair[0], |b| actions![b.scene(&target).jump()]).unwrap();
    }
    story.script(&scenes[3], |b| actions![b.sleep(1)]).unwrap();
    story.entry(&scenes[0]).unwrap();
    let err = story.construct().unwrap_err();
    assert_eq!(script_kind(&err), StaticScriptWarningKind::DepthExceeded(2));
}

#[test]
fn test_traversal_visits_cyclic_scenes_once() {
    let mut story = Story::new("loop");
    let dave = story.character("Dave");
    let a = story.scene("a", SceneConfig::default()).unwrap();
    let b_scene = story.scene("b", SceneConfig::default()).unwrap();
    story
        .script(&a, |b| actions![b.character(&dave).say("A"), b.scene(&b_scene).jump()])
        .unwrap();
    story
        .script(&b_scene, |b| actions![b.character(&dave).say("B"), b.scene(&a).jump()])
        .unwrap();
    story.entry(&a).unwrap();
    story.construct().unwrap();

    let root = story.entry_root().unwrap();
    let visited = story.get_all_children(root);
    assert_eq!(visited.len(), story.action_count());
    let elements = story.get_all_children_elements(root);
    assert!(elements.contains(&dave.id()));
    assert!(elements.contains(&a.element()));
}

#[test]
fn test_story_is_frozen_after_construction() {
    let mut story = Story::new("frozen");
    let hall = story.scene("hall", SceneConfig::default()).unwrap();
    story.script(&hall, |b| actions![b.sleep(1)]).unwrap();
    story.entry(&hall).unwrap();
    story.construct().unwrap();
    story.construct().unwrap();
    let err = story.scene("late", SceneConfig::default()).unwrap_err();
    assert!(matches!(
        script_kind(&err),
        StaticScriptWarningKind::AlreadyConstructed(_)
    ));
}

#[test]
fn test_relabel_names_actions_by_scene() {
    let mut story = Story::new("labels");
    let hall = story.scene("hall", SceneConfig::default()).unwrap();
    story.script(&hall, |b| actions![b.sleep(1)]).unwrap();
    story.entry(&hall).unwrap();
    story.construct().unwrap();
    story.relabel();
    let root = story.entry_root().unwrap();
    let label = story.action(root).unwrap().call_site().label().map(str::to_string);
    assert_eq!(label.as_deref(), Some("hall#0 scene:init"));
}

#[test]
fn test_preload_sources_cover_scene_script() {
    let mut story = Story::new("sources");
    let door = story.image("door", ImageConfig::new("door.png"));
    let rain = story.sound("rain", "rain.ogg");
    let hall = story
        .scene("hall", SceneConfig::default().with_background("hall.png"))
        .unwrap();
    story
        .script(&hall, |b| {
            actions![b.image(&door).show(), b.sound(&rain).play(), b.scene(&hall).set_music("theme.ogg")]
        })
        .unwrap();
    let sources = story.preload_sources(hall.id());
    assert_eq!(sources.images, vec!["hall.png", "door.png"]);
    assert_eq!(sources.sounds, vec!["rain.ogg", "theme.ogg"]);
}

#[test]
fn test_reused_action_is_rejected() {
    let mut story = Story::new("reuse");
    let hall = story.scene("hall", SceneConfig::default()).unwrap();
    let err = story
        .script(&hall, |b| {
            let pause = b.sleep(10);
            let other = b.sleep(20);
            actions![pause, other, pause]
        })
        .unwrap_err();
    assert!(matches!(script_kind(&err), StaticScriptWarningKind::ActionReused(_)));
}

#[test]
fn test_action_reused_across_branches_is_rejected() {
    let mut story = Story::new("reuse-branch");
    let hall = story.scene("hall", SceneConfig::default()).unwrap();
    let err = story
        .script(&hall, |b| {
            let pause = b.sleep(10);
            actions![
                pause,
                b.menu().choose("Again", |_| actions![pause]),
            ]
        })
        .unwrap_err();
    assert!(matches!(script_kind(&err), StaticScriptWarningKind::ActionReused(_)));
}

#[test]
fn test_handles_from_another_story_are_rejected() {
    let mut other = Story::new("other");
    let stranger = other.character("Stranger");
    let elsewhere = other.scene("elsewhere", SceneConfig::default()).unwrap();

    let mut story = Story::new("home");
    let _alice = story.character("Alice");
    let hall = story.scene("hall", SceneConfig::default()).unwrap();
    let study = story.scene("study", SceneConfig::default()).unwrap();

    let err = story
        .script(&hall, |b| actions![b.character(&stranger).say("Hello")])
        .unwrap_err();
    assert_eq!(
        script_kind(&err),
        StaticScriptWarningKind::UnknownElement(stranger.id().to_string())
    );

    let err = story
        .script(&study, |b| actions![b.scene(&elsewhere).jump()])
        .unwrap_err();
    assert_eq!(
        script_kind(&err),
        StaticScriptWarningKind::UnknownScene(elsewhere.id().to_string())
    );

    let err = story.entry(&elsewhere).unwrap_err();
    assert!(matches!(script_kind(&err), StaticScriptWarningKind::UnknownScene(_)));
    assert_ne!(story.key(), other.key());
}
