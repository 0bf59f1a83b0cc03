//! Executes actions against the live game state.

use crate::{
    ActionHistory, ActionRunner, BackgroundTask, Dialog, Effect, EffectKind, GameEvent,
    GameHistory, GameHistoryPayload, GameHistoryRow, HistoryId, MenuChoiceView, MenuView, Stage,
    UndoFn, UndoScope, Yielded,
};
use libretto_core::{
    revert_writes, Action, ActionContent, ActionId, ActionType, Awaitable, CalledActionResult,
    Callee, CharacterOp, ControlOp, ElementId, ElementState, ImageOp, LambdaCtx, MenuContent, Reply,
    SceneId, SceneOp, SceneState, ScriptCtx, ScriptFn, SkipController, SoundOp, StepAwaitable,
    Store, Story, TickClock, Timeline,
};
use libretto_error::{LibrettoResult, RuntimeGameError, RuntimeGameErrorKind};
use std::collections::BTreeMap;
use tracing::{debug, instrument, warn};

/// Mutable state shared by the main flow and every background block.
#[derive(Debug)]
pub(crate) struct GameContext {
    pub(crate) store: Store,
    pub(crate) elements: BTreeMap<ElementId, ElementState>,
    pub(crate) stage: Stage,
    pub(crate) history: ActionHistory,
    pub(crate) game_history: GameHistory,
    pub(crate) effects: Vec<Effect>,
    pub(crate) pending_events: Vec<GameEvent>,
    pub(crate) spawned: Vec<BackgroundTask>,
}

impl GameContext {
    pub(crate) fn new(max_history: usize) -> Self {
        Self {
            store: Store::default(),
            elements: BTreeMap::new(),
            stage: Stage::default(),
            history: ActionHistory::new(max_history),
            game_history: GameHistory::default(),
            effects: Vec::new(),
            pending_events: Vec::new(),
            spawned: Vec::new(),
        }
    }

    /// Forget everything a previous game left behind.
    pub(crate) fn reset(&mut self, story: &Story) {
        self.store.clear();
        self.stage = Stage::default();
        self.history.clear();
        self.game_history.clear();
        self.effects.clear();
        self.pending_events.clear();
        self.spawned.clear();
        self.reset_elements(story);
    }

    pub(crate) fn reset_elements(&mut self, story: &Story) {
        self.elements = story
            .elements()
            .iter()
            .map(|def| (*def.id(), def.initial().clone()))
            .collect();
    }

    pub(crate) fn undo_scope(&mut self) -> UndoScope<'_> {
        UndoScope {
            store: &mut self.store,
            elements: &mut self.elements,
            stage: &mut self.stage,
        }
    }

    fn record(&mut self, action: ActionId, background: bool, undo: Option<UndoFn>) -> HistoryId {
        let (token, event) = if background {
            self.history.push_background(action, undo)
        } else {
            self.history.push(action, undo)
        };
        if let Some(event) = event {
            self.game_history.apply(&event);
            self.pending_events
                .push(GameEvent::HistoryLimit(event.ids().to_vec()));
        }
        token
    }
}

/// Runs actions of one story against a [`GameContext`].
pub(crate) struct Executor<'g> {
    story: &'g Story,
    ctx: &'g mut GameContext,
    clock: &'g TickClock,
    background: bool,
}

impl<'g> Executor<'g> {
    pub(crate) fn main(story: &'g Story, ctx: &'g mut GameContext, clock: &'g TickClock) -> Self {
        Self {
            story,
            ctx,
            clock,
            background: false,
        }
    }

    pub(crate) fn background(
        story: &'g Story,
        ctx: &'g mut GameContext,
        clock: &'g TickClock,
    ) -> Self {
        Self {
            story,
            ctx,
            clock,
            background: true,
        }
    }

    fn record(&mut self, action: ActionId, undo: Option<UndoFn>) -> HistoryId {
        self.ctx.record(action, self.background, undo)
    }

    fn element(&self, action: &Action) -> LibrettoResult<ElementId> {
        self.story
            .callee_element(action.callee())
            .ok_or_else(|| {
                RuntimeGameError::new(RuntimeGameErrorKind::MissingElement(format!(
                    "{:?}",
                    action.callee()
                )))
                .into()
            })
    }

    fn state_mut(&mut self, element: ElementId) -> LibrettoResult<&mut ElementState> {
        self.ctx.elements.get_mut(&element).ok_or_else(|| {
            RuntimeGameError::new(RuntimeGameErrorKind::MissingElement(element.to_string())).into()
        })
    }

    /// Undo closure restoring the current state of `element`.
    fn snapshot(&self, element: ElementId) -> Option<UndoFn> {
        let state = self.ctx.elements.get(&element)?.clone();
        Some(Box::new(move |scope: &mut UndoScope<'_>| {
            scope.elements.insert(element, state);
        }))
    }

    fn emit(&mut self, action: ActionId, kind: EffectKind) {
        self.ctx.effects.push(Effect {
            action,
            kind,
            awaitable: None,
            timeline: None,
        });
    }

    /// Hand `awaitable` to the render layer together with its effect.
    fn suspend(&mut self, action: ActionId, kind: EffectKind, awaitable: StepAwaitable) -> Yielded {
        let timeline = Timeline::new(awaitable.clone(), self.clock);
        self.ctx.effects.push(Effect {
            action,
            kind,
            awaitable: Some(awaitable.clone()),
            timeline: Some(timeline),
        });
        Yielded::Awaiting(awaitable)
    }

    fn run_scene(&mut self, action: &Action, op: &SceneOp) -> LibrettoResult<Yielded> {
        let id = *action.id();
        let action_type = *action.action_type();
        let element = self.element(action)?;
        let next = action.child();
        match op {
            SceneOp::Init => {
                let scene = self.scene_of(action)?;
                let config = self
                    .story
                    .scene_by_id(scene)
                    .map(|def| def.config().clone())
                    .unwrap_or_default();
                let element_undo = self.snapshot(element);
                let previous_scene = self.ctx.stage.scene;
                self.record(
                    id,
                    Some(Box::new(move |scope: &mut UndoScope<'_>| {
                        if let Some(undo) = element_undo {
                            undo(&mut *scope);
                        }
                        scope.stage.scene = previous_scene;
                    })),
                );
                *self.state_mut(element)? = ElementState::Scene(SceneState {
                    background: config.background.clone(),
                    music: config.music.clone(),
                });
                self.ctx.stage.scene = Some(scene);
                debug!(%scene, "Entering scene");
                self.emit(
                    id,
                    EffectKind::SceneEnter {
                        scene,
                        background: config.background,
                        music: config.music,
                    },
                );
                self.ctx.pending_events.push(GameEvent::SceneEnter(scene));
            }
            SceneOp::JumpTo(target) => {
                self.record(id, None);
                let root = self.story.scene_root(*target).ok_or_else(|| {
                    RuntimeGameError::new(RuntimeGameErrorKind::MissingAction(format!(
                        "root of {}",
                        target
                    )))
                })?;
                debug!(%target, "Jumping to scene");
                return Ok(Yielded::Result(CalledActionResult::new(action_type, Some(root))));
            }
            SceneOp::SetBackground(src) => {
                let undo = self.snapshot(element);
                self.record(id, undo);
                if let ElementState::Scene(state) = self.state_mut(element)? {
                    state.background = src.clone();
                }
                self.emit(id, EffectKind::SetBackground(src.clone()));
            }
            SceneOp::SetMusic(src) => {
                let undo = self.snapshot(element);
                self.record(id, undo);
                if let ElementState::Scene(state) = self.state_mut(element)? {
                    state.music = src.clone();
                }
                self.emit(id, EffectKind::SetMusic(src.clone()));
            }
        }
        Ok(Yielded::Result(CalledActionResult::new(action_type, next)))
    }

    fn scene_of(&self, action: &Action) -> LibrettoResult<SceneId> {
        match action.callee() {
            Callee::Scene(scene) => Ok(*scene),
            other => Err(RuntimeGameError::new(RuntimeGameErrorKind::MissingElement(format!(
                "{:?}",
                other
            )))
            .into()),
        }
    }

    fn run_character(&mut self, action: &Action, op: &CharacterOp) -> LibrettoResult<Yielded> {
        let id = *action.id();
        let action_type = *action.action_type();
        let element = self.element(action)?;
        let next = action.child();
        match op {
            CharacterOp::Say(text) => {
                let speaker = self
                    .ctx
                    .elements
                    .get(&element)
                    .and_then(ElementState::as_character)
                    .map(|state| state.name.clone())
                    .unwrap_or_default();
                let token = self.record(id, None);
                let awaitable = step(action_type, next);
                self.ctx.game_history.push(
                    GameHistoryRow::new(
                        token,
                        id,
                        Some(element),
                        GameHistoryPayload::Dialog {
                            speaker: speaker.clone(),
                            text: text.clone(),
                        },
                    )
                    .with_awaitable(awaitable.clone()),
                );
                self.ctx.stage.dialog = Some(Dialog {
                    action: id,
                    speaker: speaker.clone(),
                    text: text.clone(),
                });
                Ok(self.suspend(
                    id,
                    EffectKind::Dialog {
                        speaker,
                        text: text.clone(),
                    },
                    awaitable,
                ))
            }
            CharacterOp::SetName(name) => {
                let undo = self.snapshot(element);
                self.record(id, undo);
                if let ElementState::Character(state) = self.state_mut(element)? {
                    state.name = name.clone();
                }
                Ok(Yielded::Result(CalledActionResult::new(action_type, next)))
            }
        }
    }

    fn run_image(&mut self, action: &Action, op: &ImageOp) -> LibrettoResult<Yielded> {
        let id = *action.id();
        let action_type = *action.action_type();
        let element = self.element(action)?;
        let next = action.child();
        let undo = self.snapshot(element);
        self.record(id, undo);
        let ElementState::Image(state) = self.state_mut(element)? else {
            warn!(%element, "Image action on a non-image element; skipped");
            return Ok(Yielded::Result(CalledActionResult::new(action_type, next)));
        };
        match op {
            ImageOp::Show => {
                state.visible = true;
                let kind = EffectKind::ShowImage {
                    element,
                    src: state.src.clone(),
                    position: state.position,
                };
                Ok(self.suspend(id, kind, step(action_type, next)))
            }
            ImageOp::Hide => {
                state.visible = false;
                Ok(self.suspend(id, EffectKind::HideImage { element }, step(action_type, next)))
            }
            ImageOp::SetSource(src) => {
                state.src = src.clone();
                self.emit(
                    id,
                    EffectKind::SetImageSource {
                        element,
                        src: src.clone(),
                    },
                );
                Ok(Yielded::Result(CalledActionResult::new(action_type, next)))
            }
            ImageOp::SetPosition(position) => {
                state.position = *position;
                self.emit(
                    id,
                    EffectKind::MoveImage {
                        element,
                        position: *position,
                    },
                );
                Ok(Yielded::Result(CalledActionResult::new(action_type, next)))
            }
        }
    }

    fn run_sound(&mut self, action: &Action, op: &SoundOp) -> LibrettoResult<Yielded> {
        let id = *action.id();
        let action_type = *action.action_type();
        let element = self.element(action)?;
        let next = action.child();
        let undo = self.snapshot(element);
        self.record(id, undo);
        let ElementState::Sound(state) = self.state_mut(element)? else {
            warn!(%element, "Sound action on a non-sound element; skipped");
            return Ok(Yielded::Result(CalledActionResult::new(action_type, next)));
        };
        match op {
            SoundOp::Play { wait } => {
                state.playing = true;
                let kind = EffectKind::PlaySound {
                    element,
                    src: state.src.clone(),
                    volume: state.volume,
                };
                if *wait {
                    return Ok(self.suspend(id, kind, step(action_type, next)));
                }
                self.emit(id, kind);
            }
            SoundOp::Stop => {
                state.playing = false;
                self.emit(id, EffectKind::StopSound { element });
            }
            SoundOp::SetVolume(volume) => {
                state.volume = *volume;
                self.emit(
                    id,
                    EffectKind::SetVolume {
                        element,
                        volume: *volume,
                    },
                );
            }
        }
        Ok(Yielded::Result(CalledActionResult::new(action_type, next)))
    }

    fn run_menu(&mut self, action: &Action, menu: &MenuContent) -> LibrettoResult<Yielded> {
        let id = *action.id();
        let action_type = *action.action_type();
        let next = action.child();
        let lambda = LambdaCtx::new(&self.ctx.store);
        let offered: Vec<(usize, &str, Option<ActionId>)> = menu
            .choices
            .iter()
            .enumerate()
            .filter(|(_, choice)| {
                choice
                    .guard
                    .as_ref()
                    .is_none_or(|guard| guard.evaluate(&lambda))
            })
            .map(|(index, choice)| (index, choice.text.as_str(), choice.head))
            .collect();
        let token = self.record(id, None);
        if offered.is_empty() {
            warn!(action = %id, "Menu offers no choice; continuing past it");
            return Ok(Yielded::Result(CalledActionResult::new(action_type, next)));
        }

        let view = MenuView {
            action: id,
            prompt: menu.prompt.clone(),
            choices: offered
                .iter()
                .map(|(index, text, _)| MenuChoiceView {
                    index: *index,
                    text: text.to_string(),
                })
                .collect(),
        };
        let row = GameHistoryRow::new(
            token,
            id,
            None,
            GameHistoryPayload::Menu {
                prompt: menu.prompt.clone(),
                choices: view.choices.iter().map(|c| c.text.clone()).collect(),
            },
        );
        let selected = row.selection();
        let targets: Vec<(usize, Option<ActionId>)> =
            offered.iter().map(|(index, _, head)| (*index, *head)).collect();
        let awaitable = StepAwaitable::with_receiver(move |reply| match reply {
            Reply::Choice(picked) => match targets.iter().find(|(index, _)| *index == picked) {
                Some((index, head)) => {
                    selected.set(Some(*index));
                    CalledActionResult::new(action_type, head.or(next))
                }
                None => {
                    warn!(choice = picked, "Choice was not offered; continuing past menu");
                    CalledActionResult::new(action_type, next)
                }
            },
            Reply::Done => {
                warn!("Menu settled without a choice; continuing past it");
                CalledActionResult::new(action_type, next)
            }
        })
        .with_skip(SkipController::new(move || {
            CalledActionResult::new(action_type, next)
        }));
        self.ctx
            .game_history
            .push(row.with_awaitable(awaitable.clone()));
        self.ctx.stage.menu = Some(view.clone());
        Ok(self.suspend(id, EffectKind::Menu(view), awaitable))
    }

    fn run_control(&mut self, action: &Action, op: &ControlOp) -> LibrettoResult<Yielded> {
        let id = *action.id();
        let action_type = *action.action_type();
        let next = action.child();
        self.record(id, None);
        let result = |node| Ok(Yielded::Result(CalledActionResult::new(action_type, node)));
        match op {
            ControlOp::Do(head) => result(head.or(next)),
            ControlOp::DoAsync(head) => {
                if let Some(head) = head {
                    debug!(%head, "Starting background block");
                    self.ctx.spawned.push(BackgroundTask::detached(*head));
                }
                result(next)
            }
            ControlOp::All(heads) | ControlOp::Any(heads) => {
                if heads.is_empty() {
                    return result(next);
                }
                let tasks: Vec<BackgroundTask> =
                    heads.iter().map(|head| BackgroundTask::new(*head, 1)).collect();
                let done: Vec<Awaitable<()>> = tasks.iter().map(BackgroundTask::done).collect();
                let combined = if matches!(op, ControlOp::All(_)) {
                    Awaitable::all(&done)
                } else {
                    Awaitable::any(&done)
                };
                debug!(blocks = tasks.len(), kind = %action_type, "Starting concurrent blocks");
                self.ctx.spawned.extend(tasks);
                Ok(self.wait_for(id, action_type, next, combined))
            }
            ControlOp::Repeat { times, head } => match head {
                Some(head) if *times > 0 => {
                    let task = BackgroundTask::new(*head, *times);
                    let done = task.done();
                    self.ctx.spawned.push(task);
                    Ok(self.wait_for(id, action_type, next, done))
                }
                _ => result(next),
            },
            ControlOp::Sleep(ms) => Ok(self.suspend(id, EffectKind::Sleep(*ms), step(action_type, next))),
        }
    }

    /// Suspend until `gate` settles. Aborting the step aborts the gate.
    fn wait_for(
        &mut self,
        id: ActionId,
        action_type: ActionType,
        next: Option<ActionId>,
        gate: Awaitable<()>,
    ) -> Yielded {
        let held = gate.clone();
        let awaitable = StepAwaitable::with_receiver(move |_| CalledActionResult::new(action_type, next))
            .with_skip(SkipController::new(move || {
                held.abort();
                CalledActionResult::new(action_type, next)
            }));
        let weak = awaitable.downgrade();
        gate.on_settle(move |_| {
            if let Some(step) = weak.upgrade() {
                step.resolve(Reply::Done);
            }
        });
        let timeline = Timeline::new(awaitable.clone(), self.clock);
        timeline.attach_child(Timeline::new(gate, self.clock));
        self.ctx.effects.push(Effect {
            action: id,
            kind: EffectKind::Join(action_type),
            awaitable: None,
            timeline: Some(timeline),
        });
        Yielded::Awaiting(awaitable)
    }

    fn run_script(&mut self, action: &Action, script: &ScriptFn) -> LibrettoResult<Yielded> {
        let id = *action.id();
        let writes = {
            let mut ctx = ScriptCtx::new(&mut self.ctx.store);
            script.run(&mut ctx);
            ctx.into_writes()
        };
        let undo: Option<UndoFn> = if writes.is_empty() {
            None
        } else {
            Some(Box::new(move |scope: &mut UndoScope<'_>| {
                revert_writes(scope.store, writes)
            }))
        };
        self.record(id, undo);
        Ok(Yielded::Result(CalledActionResult::new(
            *action.action_type(),
            action.child(),
        )))
    }
}

/// Step awaitable continuing at `next` however it settles.
fn step(action_type: ActionType, next: Option<ActionId>) -> StepAwaitable {
    StepAwaitable::with_receiver(move |_| CalledActionResult::new(action_type, next))
        .with_skip(SkipController::new(move || CalledActionResult::new(action_type, next)))
}

impl ActionRunner for Executor<'_> {
    #[instrument(level = "debug", skip(self), fields(background = self.background))]
    fn run(&mut self, action: ActionId) -> LibrettoResult<Yielded> {
        let story = self.story;
        let action = story.action(action).ok_or_else(|| {
            RuntimeGameError::new(RuntimeGameErrorKind::MissingAction(action.to_string()))
        })?;
        debug!(action_type = %action.action_type(), "Executing action");
        match action.content() {
            ActionContent::Scene(op) => self.run_scene(action, op),
            ActionContent::Character(op) => self.run_character(action, op),
            ActionContent::Image(op) => self.run_image(action, op),
            ActionContent::Sound(op) => self.run_sound(action, op),
            ActionContent::Menu(menu) => self.run_menu(action, menu),
            ActionContent::Condition(condition) => {
                let selected = condition.select(&LambdaCtx::new(&self.ctx.store));
                self.record(*action.id(), None);
                let node = selected.flatten().or(action.child());
                Ok(Yielded::Result(CalledActionResult::new(*action.action_type(), node)))
            }
            ActionContent::Control(op) => self.run_control(action, op),
            ActionContent::Script(script) => self.run_script(action, script),
        }
    }
}
