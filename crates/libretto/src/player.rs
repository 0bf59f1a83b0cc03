//! Headless host that plays a game by settling every effect itself.

use libretto_core::{ActionType, CalledActionResult, Reply};
use libretto_error::LibrettoResult;
use libretto_narrative::{Effect, EffectKind, GameState, LiveGame, MenuView, Next};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Outcome of an automatic play-through.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayReport {
    /// Human-readable transcript: scene entries, dialog lines and menu picks
    pub transcript: Vec<String>,
    /// Every step the main flow completed, in order
    pub steps: Vec<CalledActionResult>,
    /// Preload batches requested along the way
    pub preloads: usize,
    /// Whether the game reached its end within the step budget
    pub finished: bool,
}

/// Plays a [`LiveGame`] without a player.
///
/// Dialog and other blocking effects are acknowledged immediately. Menus take
/// the next scripted choice when it is offered and the first offered choice
/// otherwise. With `realtime`, sleep effects wait for their duration.
#[derive(Debug, Clone, Default)]
pub struct AutoPlayer {
    choices: VecDeque<usize>,
    realtime: bool,
    max_calls: Option<usize>,
}

impl AutoPlayer {
    /// Player that picks `choices` in order at successive menus.
    pub fn new(choices: impl IntoIterator<Item = usize>) -> Self {
        Self {
            choices: choices.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Honor sleep durations.
    pub fn with_realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    /// Stop after this many `next` calls even if the game has not ended.
    pub fn with_max_calls(mut self, max_calls: usize) -> Self {
        self.max_calls = Some(max_calls);
        self
    }

    /// Drive `game` until it ends or the call budget runs out.
    ///
    /// # Errors
    ///
    /// Propagates any error raised by [`LiveGame::next`].
    #[instrument(skip_all, fields(story = %game.story().name()))]
    pub async fn run(&mut self, game: &mut LiveGame, state: &mut GameState) -> LibrettoResult<PlayReport> {
        let mut report = PlayReport::default();
        let mut calls = 0usize;
        loop {
            if self.max_calls.is_some_and(|max| calls >= max) {
                info!(calls, "Call budget exhausted");
                break;
            }
            calls += 1;

            let next = game.next(state)?;
            for effect in state.take_effects() {
                self.settle(effect, game, &mut report).await;
            }
            match next {
                Next::Step(result) => {
                    report.steps.push(result);
                    if result.action_type == ActionType::SceneInit {
                        preload(game, &mut report);
                    }
                    if result.is_end() {
                        report.finished = true;
                        break;
                    }
                }
                Next::End => {
                    report.finished = true;
                    break;
                }
                Next::Pending(_) | Next::Locked => {}
            }
        }
        info!(steps = report.steps.len(), finished = report.finished, "Play-through stopped");
        Ok(report)
    }

    async fn settle(&mut self, effect: Effect, game: &LiveGame, report: &mut PlayReport) {
        let reply = match &effect.kind {
            EffectKind::SceneEnter { scene, .. } => {
                if let Some(scene) = game.story().scene_by_id(*scene) {
                    report.transcript.push(format!("[{}]", scene.name()));
                }
                Reply::Done
            }
            EffectKind::Dialog { speaker, text } => {
                report.transcript.push(format!("{}: {}", speaker, text));
                Reply::Done
            }
            EffectKind::Menu(menu) => {
                let index = self.pick(menu);
                if let Some(choice) = menu.choices.iter().find(|choice| choice.index == index) {
                    report.transcript.push(format!("> {}", choice.text));
                }
                Reply::Choice(index)
            }
            EffectKind::Sleep(millis) => {
                if self.realtime {
                    tokio::time::sleep(Duration::from_millis(*millis)).await;
                }
                Reply::Done
            }
            // Settles on its own once the joined blocks finish.
            EffectKind::Join(_) => return,
            _ => Reply::Done,
        };
        if let Some(awaitable) = effect.awaitable {
            awaitable.resolve(reply);
        }
    }

    fn pick(&mut self, menu: &MenuView) -> usize {
        let offered = |index: usize| menu.choices.iter().any(|choice| choice.index == index);
        match self.choices.pop_front() {
            Some(index) if offered(index) => index,
            other => {
                let fallback = menu.choices.first().map(|choice| choice.index).unwrap_or(0);
                debug!(requested = ?other, fallback, "Scripted choice unavailable");
                fallback
            }
        }
    }
}

/// Load a scene's predicted assets right after entering it.
fn preload(game: &mut LiveGame, report: &mut PlayReport) {
    if let Some(sources) = game.preload() {
        debug!(images = ?sources.images, sounds = ?sources.sounds, "Preloading");
        report.preloads += 1;
        game.preload_complete();
    }
}
