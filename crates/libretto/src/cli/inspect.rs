//! Inspect command handler.

use libretto::{GameConfig, demo_story};
use serde_json::json;

/// Print the demo story's scenes and actions.
pub fn inspect_story(config: &GameConfig, as_json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let mut story = demo_story(config)?;
    story.relabel();

    if as_json {
        let scenes: Vec<_> = story
            .scenes()
            .iter()
            .map(|scene| {
                json!({
                    "id": scene.id().to_string(),
                    "name": scene.name(),
                    "root": scene.root().map(|root| root.to_string()),
                    "sources": {
                        "images": story.preload_sources(*scene.id()).images,
                        "sounds": story.preload_sources(*scene.id()).sounds,
                    },
                })
            })
            .collect();
        let actions: Vec<_> = story
            .arena()
            .iter()
            .map(|action| {
                json!({
                    "id": action.id().to_string(),
                    "type": action.action_type().to_string(),
                    "child": action.child().map(|child| child.to_string()),
                    "branches": action
                        .content()
                        .branch_heads()
                        .iter()
                        .map(|head| head.to_string())
                        .collect::<Vec<_>>(),
                    "label": action.call_site().label(),
                })
            })
            .collect();
        let graph = json!({
            "story": story.name(),
            "entry": story.entry_root().map(|root| root.to_string()),
            "scenes": scenes,
            "actions": actions,
        });
        println!("{}", serde_json::to_string_pretty(&graph)?);
        return Ok(());
    }

    println!("story {} ({} actions)", story.name(), story.action_count());
    for scene in story.scenes() {
        let root = scene
            .root()
            .map(|root| root.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("scene {} [{}] root {}", scene.name(), scene.id(), root);
    }
    for action in story.arena().iter() {
        let child = action
            .child()
            .map(|child| child.to_string())
            .unwrap_or_else(|| "end".to_string());
        println!(
            "  {:<12} {:<18} -> {:<12} {}",
            action.id().to_string(),
            action.action_type().to_string(),
            child,
            action.call_site()
        );
    }
    Ok(())
}
