//! Look-ahead over the action graph for asset preloading.

use crate::{GameLock, GameLockGuard};
use libretto_core::{ActionContent, ActionId, ControlOp, SceneId, SceneSources, Story};
use std::collections::{HashSet, VecDeque};
use tracing::{debug, trace};

/// Actions that will run from `from` whatever the player does, at most `limit` of them.
///
/// Menus and conditions are opaque: the walk includes them but stops on that
/// branch. Scene jumps are followed once per scene and `do` blocks are entered.
/// The walk is breadth first and terminates on cyclic scene graphs.
pub fn get_all_predictable_actions(story: &Story, from: ActionId, limit: usize) -> Vec<ActionId> {
    let mut visited: HashSet<ActionId> = HashSet::new();
    let mut seen_scenes: HashSet<SceneId> = HashSet::new();
    let mut queue = VecDeque::from([from]);
    let mut out = Vec::new();

    while let Some(id) = queue.pop_front() {
        if out.len() >= limit {
            break;
        }
        if !visited.insert(id) {
            continue;
        }
        let Some(action) = story.action(id) else {
            continue;
        };
        out.push(id);
        match action.content() {
            ActionContent::Menu(_) | ActionContent::Condition(_) => {
                trace!(action = %id, "Look-ahead stops at a branch point");
            }
            ActionContent::Control(ControlOp::Do(head)) => {
                queue.extend(head.or(action.child()));
            }
            ActionContent::Control(_) => {
                queue.extend(action.content().branch_heads());
                queue.extend(action.child());
            }
            content => {
                if let Some(target) = content.jump_target() {
                    if seen_scenes.insert(target) {
                        queue.extend(story.scene_root(target));
                    }
                } else {
                    queue.extend(action.child());
                }
            }
        }
    }
    debug!(%from, predicted = out.len(), "Look-ahead complete");
    out
}

/// Sources needed by the actions predicted from `from`.
pub fn predicted_sources(story: &Story, from: ActionId, limit: usize) -> SceneSources {
    let mut sources = SceneSources::default();
    for id in get_all_predictable_actions(story, from, limit) {
        if let Some(action) = story.action(id) {
            sources.merge(story.action_sources(action));
        }
    }
    sources
}

/// Tracks one outstanding preload batch and holds the game lock meanwhile.
#[derive(Debug)]
pub struct Preloader {
    lock: GameLock,
    batch: Option<(SceneSources, GameLockGuard)>,
}

impl Preloader {
    /// Preloader gating `lock`.
    pub fn new(lock: GameLock) -> Self {
        Self { lock, batch: None }
    }

    /// Start a batch. Empty batches do not lock.
    ///
    /// Returns the sources the host should load, or `None` if a batch is
    /// already outstanding or there is nothing to load.
    pub fn begin(&mut self, sources: SceneSources) -> Option<SceneSources> {
        if self.batch.is_some() {
            debug!("Preload already in progress");
            return None;
        }
        if sources.is_empty() {
            return None;
        }
        debug!(
            images = sources.images.len(),
            sounds = sources.sounds.len(),
            "Preload batch started"
        );
        self.batch = Some((sources.clone(), self.lock.acquire()));
        Some(sources)
    }

    /// Finish the outstanding batch and release the lock.
    pub fn complete(&mut self) -> Option<SceneSources> {
        let (sources, _guard) = self.batch.take()?;
        debug!("Preload batch complete");
        Some(sources)
    }

    /// Whether a batch is outstanding.
    pub fn is_loading(&self) -> bool {
        self.batch.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_holds_the_lock_until_complete() {
        let lock = GameLock::new();
        let mut preloader = Preloader::new(lock.clone());
        let mut sources = SceneSources::default();
        sources.add_image("hall.png");
        assert!(preloader.begin(sources.clone()).is_some());
        assert!(lock.is_locked());
        assert!(preloader.begin(sources).is_none());
        assert!(preloader.complete().is_some());
        assert!(!lock.is_locked());
        assert!(preloader.complete().is_none());
    }

    #[test]
    fn empty_batch_does_not_lock() {
        let lock = GameLock::new();
        let mut preloader = Preloader::new(lock.clone());
        assert!(preloader.begin(SceneSources::default()).is_none());
        assert!(!lock.is_locked());
    }
}
