//! The running game: one main flow, background blocks, history and saves.

use crate::{
    predicted_sources, BackgroundTask, EventEmitter, Executor, GameConfig, GameContext, GameEvent,
    GameHistory, GameLock, GameState, HistoryEntry, HistoryEvent, HistoryId, ActionHistory,
    Preloader, Rolled, SavedBackgroundTask, SavedElementState, SavedGame, SavedGameState,
    ServiceHandle, ServiceRegistry, StackItem, StackModel, Stage,
};
use libretto_core::{
    ActionId, CalledActionResult, ElementDef, ElementId, ElementState, SceneSources, StepAwaitable,
    Store, Story, TickClock,
};
use libretto_error::{LibrettoResult, RuntimeGameError, RuntimeGameErrorKind};
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;
use tracing::{debug, info, instrument, warn};

/// Lifecycle of a [`LiveGame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum GameStatus {
    /// No game started or loaded yet
    NotStarted,
    /// The main flow can advance
    Running,
    /// The main flow waits for the host to settle an awaitable
    AwaitingExternalEvent,
    /// The main flow reached its end
    Ended,
}

/// What one [`LiveGame::next`] call produced.
#[derive(Debug, Clone)]
pub enum Next {
    /// A game lock is held; nothing moved
    Locked,
    /// The main flow waits on this awaitable
    Pending(StepAwaitable),
    /// One step ran; `node == None` marks the end of the story
    Step(CalledActionResult),
    /// The story already ended
    End,
}

/// A game in progress.
///
/// The host drives it by calling [`next`](Self::next) and settling the
/// awaitables it hands out, directly or through the effects delivered to the
/// [`GameState`].
///
/// # Examples
///
/// ```
/// use std::rc::Rc;
/// use libretto_core::{actions, Reply, SceneConfig, Story};
/// use libretto_narrative::{GameConfig, GameState, LiveGame, Next};
///
/// # fn main() -> libretto_error::LibrettoResult<()> {
/// let mut story = Story::new("demo");
/// let alice = story.character("Alice");
/// let hall = story.scene("hall", SceneConfig::default())?;
/// story.script(&hall, |b| actions![b.character(&alice).say("Hi")])?;
/// story.entry(&hall)?;
/// story.construct()?;
///
/// let story = Rc::new(story);
/// let mut game = LiveGame::new(Rc::clone(&story), GameConfig::default())?;
/// let mut state = GameState::new(&story);
/// game.new_game()?;
///
/// assert!(matches!(game.next(&mut state)?, Next::Step(_)));
/// let Next::Pending(line) = game.next(&mut state)? else { unreachable!() };
/// line.resolve(Reply::Done);
/// assert!(matches!(game.next(&mut state)?, Next::Step(result) if result.is_end()));
/// assert!(matches!(game.next(&mut state)?, Next::End));
/// # Ok(())
/// # }
/// ```
pub struct LiveGame {
    story: Rc<Story>,
    config: GameConfig,
    status: GameStatus,
    main: StackModel,
    current_action: Option<ActionId>,
    locked_awaiting: Option<StepAwaitable>,
    lock: GameLock,
    context: GameContext,
    services: ServiceRegistry,
    events: EventEmitter,
    background: Vec<BackgroundTask>,
    clock: TickClock,
    no_progress: u32,
    preloader: Preloader,
}

impl std::fmt::Debug for LiveGame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveGame")
            .field("story", &self.story.name())
            .field("status", &self.status)
            .field("current_action", &self.current_action)
            .field("background", &self.background.len())
            .field("history", &self.context.history.len())
            .finish()
    }
}

impl LiveGame {
    /// Game over a constructed story.
    ///
    /// # Errors
    ///
    /// Returns an error if the story is not constructed or the configuration is invalid.
    pub fn new(story: Rc<Story>, config: GameConfig) -> LibrettoResult<Self> {
        if !story.is_constructed() {
            return Err(RuntimeGameError::new(RuntimeGameErrorKind::StoryNotConstructed(
                story.name().to_string(),
            ))
            .into());
        }
        config.validate()?;
        let lock = GameLock::new();
        Ok(Self {
            context: GameContext::new(*config.max_history()),
            preloader: Preloader::new(lock.clone()),
            story,
            config,
            status: GameStatus::NotStarted,
            main: StackModel::new(),
            current_action: None,
            locked_awaiting: None,
            lock,
            services: ServiceRegistry::default(),
            events: EventEmitter::default(),
            background: Vec::new(),
            clock: TickClock::new(),
            no_progress: 0,
        })
    }

    /// Start from the entry scene, discarding any previous progress.
    ///
    /// # Errors
    ///
    /// Returns an error if the story has no entry root.
    #[instrument(skip(self), fields(story = %self.story.name()))]
    pub fn new_game(&mut self) -> LibrettoResult<()> {
        let root = self.story.entry_root().ok_or_else(|| {
            RuntimeGameError::new(RuntimeGameErrorKind::MissingAction("entry".to_string()))
        })?;
        self.halt();
        self.context.reset(&self.story);
        self.main.push(StackItem::Action(root));
        self.current_action = Some(root);
        self.status = GameStatus::Running;
        self.no_progress = 0;
        info!(%root, "New game started");
        self.events.emit(&GameEvent::Start);
        Ok(())
    }

    /// Advance the main flow by one step.
    ///
    /// A held [`GameLock`] stops the call before anything moves. Otherwise
    /// background blocks are pumped first, then the main flow steps.
    ///
    /// # Errors
    ///
    /// Returns an error if `state` belongs to another story, the game was not
    /// started, an action cannot run, or the host keeps calling without
    /// settling the pending awaitable.
    #[instrument(skip(self, state), fields(story = %self.story.name(), status = %self.status))]
    pub fn next(&mut self, state: &mut GameState) -> LibrettoResult<Next> {
        if state.story() != self.story.name() {
            return Err(RuntimeGameError::new(RuntimeGameErrorKind::StoryMismatch {
                expected: self.story.name().to_string(),
                found: state.story().to_string(),
            })
            .into());
        }
        match self.status {
            GameStatus::NotStarted => {
                return Err(RuntimeGameError::new(RuntimeGameErrorKind::NotStarted).into());
            }
            GameStatus::Ended => {
                self.sync(state);
                return Ok(Next::End);
            }
            GameStatus::Running | GameStatus::AwaitingExternalEvent => {}
        }

        if self.lock.is_locked() {
            debug!(holders = self.lock.holders(), "Game is locked");
            self.flush_events();
            self.sync(state);
            return Ok(Next::Locked);
        }

        self.clock.advance();
        let progressed = self.pump_background()?;

        if let Some(awaitable) = &self.locked_awaiting {
            if !awaitable.is_settled() {
                let awaitable = awaitable.clone();
                if progressed {
                    self.no_progress = 0;
                } else {
                    self.no_progress += 1;
                }
                let limit = *self.config.dead_cycle_limit();
                if self.no_progress > limit {
                    warn!(calls = self.no_progress, "Dead cycle detected");
                    return Err(RuntimeGameError::new(RuntimeGameErrorKind::DeadCycle(limit)).into());
                }
                self.flush_events();
                self.sync(state);
                return Ok(Next::Pending(awaitable));
            }
            self.locked_awaiting = None;
            self.context.stage.clear_transient();
        }
        self.no_progress = 0;

        let rolled = {
            let mut executor = Executor::main(&self.story, &mut self.context, &self.clock);
            self.main.roll_next(&mut executor)?
        };
        let outcome = match rolled {
            None => {
                self.finish();
                Next::End
            }
            Some(Rolled::Pending(awaitable)) => {
                self.locked_awaiting = Some(awaitable.clone());
                self.status = GameStatus::AwaitingExternalEvent;
                Next::Pending(awaitable)
            }
            Some(Rolled::Resumed(result)) | Some(Rolled::Executed { result, .. }) => {
                self.status = GameStatus::Running;
                self.current_action = result.node;
                if result.is_end() {
                    self.finish();
                }
                Next::Step(result)
            }
            Some(Rolled::Suspended { action, awaitable }) => {
                debug!(%action, "Main flow suspended");
                self.current_action = Some(action);
                self.locked_awaiting = Some(awaitable.clone());
                self.status = GameStatus::AwaitingExternalEvent;
                Next::Pending(awaitable)
            }
        };
        self.background.append(&mut self.context.spawned);
        self.flush_events();
        self.sync(state);
        Ok(outcome)
    }

    /// Revert the newest history entry, or every entry down to `target`.
    ///
    /// Returns `false` when there was nothing to revert, which makes undoing
    /// to the same id twice a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if no game was started.
    #[instrument(skip(self))]
    pub fn undo(&mut self, target: Option<HistoryId>) -> LibrettoResult<bool> {
        if self.status == GameStatus::NotStarted {
            return Err(RuntimeGameError::new(RuntimeGameErrorKind::NotStarted).into());
        }
        let unwound: Vec<HistoryEntry> = match target {
            Some(id) => self.context.history.rewind_to(id),
            None => self.context.history.pop().into_iter().collect(),
        };
        if unwound.is_empty() {
            debug!("Nothing to undo");
            return Ok(false);
        }
        self.halt();

        let ids: Vec<HistoryId> = unwound.iter().map(HistoryEntry::id).collect();
        let resume = unwound
            .iter()
            .rev()
            .find(|entry| entry.is_resumable())
            .map(HistoryEntry::action)
            .or(self.current_action);
        {
            let mut scope = self.context.undo_scope();
            for entry in unwound {
                entry.revert(&mut scope);
            }
        }
        self.context.stage.clear_transient();
        self.context.effects.clear();
        self.context.game_history.apply(&HistoryEvent::Undo(ids.clone()));
        info!(entries = ids.len(), resume = ?resume, "Undo applied");

        self.resume_at(resume);
        self.context.pending_events.push(GameEvent::HistoryUndo(ids));
        self.context.pending_events.push(GameEvent::Resync);
        self.flush_events();
        Ok(true)
    }

    /// Snapshot the game under `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if no game was started, or an element or service
    /// cannot be serialized.
    #[instrument(skip(self), fields(story = %self.story.name()))]
    pub fn serialize(&self, name: &str) -> LibrettoResult<SavedGame> {
        if self.status == GameStatus::NotStarted {
            return Err(RuntimeGameError::new(RuntimeGameErrorKind::NotStarted).into());
        }
        let mut element_states = Vec::new();
        for def in self.story.elements() {
            let Some(current) = self.context.elements.get(def.id()) else {
                continue;
            };
            if let Some(data) = current.to_data(def.initial())? {
                element_states.push(SavedElementState {
                    id: def.id().to_string(),
                    data,
                });
            }
        }
        let game = SavedGameState {
            store: self.context.store.clone(),
            stage: self.context.stage.clone(),
            current_action: self.current_action.map(|action| action.to_string()),
            element_states,
            services: self.services.serialize_all()?,
            background: self
                .background
                .iter()
                .filter(|task| task.is_detached() && !task.is_finished())
                .map(|task| SavedBackgroundTask {
                    head: task.head().to_string(),
                    remaining: task.remaining(),
                    stack: task
                        .pending_actions()
                        .iter()
                        .map(ActionId::to_string)
                        .collect(),
                })
                .collect(),
        };
        info!(
            elements = game.element_states.len(),
            background = game.background.len(),
            "Game serialized"
        );
        self.events.emit(&GameEvent::Saved(name.to_string()));
        Ok(SavedGame::new(name, game))
    }

    /// Snapshot under the configured autosave name.
    ///
    /// # Errors
    ///
    /// See [`serialize`](Self::serialize).
    pub fn autosave(&self) -> LibrettoResult<SavedGame> {
        self.serialize(self.config.autosave_name())
    }

    /// Replace the live state with a snapshot.
    ///
    /// The saved action re-executes on the next [`next`](Self::next) call, and
    /// so does the step each saved background block was suspended on.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot names actions or elements the story
    /// does not have, an element patch does not apply, or a service rejects
    /// its state. Live state is left untouched in that case.
    #[instrument(skip(self, saved), fields(story = %self.story.name(), save = %saved.name))]
    pub fn deserialize(&mut self, saved: &SavedGame) -> LibrettoResult<()> {
        let game = &saved.game;
        let actions = self.action_index();
        let current = match &game.current_action {
            Some(raw) => Some(*actions.get(raw.as_str()).ok_or_else(|| {
                RuntimeGameError::new(RuntimeGameErrorKind::MissingAction(raw.clone()))
            })?),
            None => None,
        };
        let elements = self.restore_elements(&game.element_states)?;
        let background = Self::restore_background(&actions, &game.background)?;
        self.services.restore_all(&game.services)?;

        self.halt();
        self.context.reset(&self.story);
        self.context.elements = elements;
        self.context.store = game.store.clone();
        self.context.stage = game.stage.clone();
        info!(current = ?current, background = background.len(), "Game deserialized");
        self.resume_at(current);
        if self.status == GameStatus::Running {
            self.background = background;
        }
        self.context.pending_events.push(GameEvent::Loaded(saved.name.clone()));
        self.context.pending_events.push(GameEvent::Resync);
        self.flush_events();
        Ok(())
    }

    /// Every action of the story by id, including scenes not reached yet.
    fn action_index(&self) -> HashMap<String, ActionId> {
        let mut index = HashMap::new();
        for scene in self.story.scenes() {
            if let Some(root) = scene.root() {
                for id in self.story.get_all_children(root) {
                    index.insert(id.to_string(), id);
                }
            }
        }
        index
    }

    fn restore_background(
        actions: &HashMap<String, ActionId>,
        saved: &[SavedBackgroundTask],
    ) -> LibrettoResult<Vec<BackgroundTask>> {
        let lookup = |raw: &String| {
            actions.get(raw.as_str()).copied().ok_or_else(|| {
                RuntimeGameError::new(RuntimeGameErrorKind::MissingAction(raw.clone()))
            })
        };
        saved
            .iter()
            .map(|task| -> LibrettoResult<BackgroundTask> {
                let head = lookup(&task.head)?;
                let pending = task.stack.iter().map(&lookup).collect::<Result<Vec<_>, _>>()?;
                Ok(BackgroundTask::restore(head, task.remaining, &pending))
            })
            .collect()
    }

    fn restore_elements(
        &self,
        saved: &[SavedElementState],
    ) -> LibrettoResult<BTreeMap<ElementId, ElementState>> {
        let defs: HashMap<String, &ElementDef> = self
            .story
            .elements()
            .iter()
            .map(|def| (def.id().to_string(), def))
            .collect();
        let mut patches: Vec<(&ElementDef, &SavedElementState)> = Vec::new();
        for entry in saved {
            let def = match defs.get(entry.id.as_str()) {
                Some(def) => *def,
                None if entry.id.parse::<ElementId>().is_err() => {
                    return Err(RuntimeGameError::new(RuntimeGameErrorKind::InvalidSave(format!(
                        "malformed element id '{}'",
                        entry.id
                    )))
                    .into());
                }
                None => {
                    return Err(RuntimeGameError::new(RuntimeGameErrorKind::MissingElement(
                        entry.id.clone(),
                    ))
                    .into());
                }
            };
            patches.push((def, entry));
        }
        patches.sort_by_key(|(def, _)| *def.id());

        let mut elements: BTreeMap<ElementId, ElementState> = self
            .story
            .elements()
            .iter()
            .map(|def| (*def.id(), def.initial().clone()))
            .collect();
        for (def, entry) in patches {
            let state = ElementState::from_data(def.initial(), &entry.data).map_err(|e| {
                RuntimeGameError::new(RuntimeGameErrorKind::InvalidElementData {
                    id: entry.id.clone(),
                    reason: match e.location {
                        Some(at) => format!("{} at {}", e.message, at),
                        None => e.message,
                    },
                })
            })?;
            elements.insert(*def.id(), state);
        }
        Ok(elements)
    }

    /// Abort the pending step, cancel background blocks and empty the main stack.
    fn halt(&mut self) {
        if let Some(awaitable) = self.locked_awaiting.take() {
            awaitable.abort();
        }
        self.main.abort_top();
        for task in self.background.drain(..).chain(self.context.spawned.drain(..)) {
            task.cancel();
        }
        self.main.clear();
        self.no_progress = 0;
    }

    fn resume_at(&mut self, action: Option<ActionId>) {
        self.current_action = action;
        match action {
            Some(action) => {
                self.main.push(StackItem::Action(action));
                self.status = GameStatus::Running;
            }
            None => self.status = GameStatus::Ended,
        }
    }

    fn finish(&mut self) {
        info!("Story ended");
        self.status = GameStatus::Ended;
        self.current_action = None;
        self.locked_awaiting = None;
        for task in self.background.drain(..).chain(self.context.spawned.drain(..)) {
            task.cancel();
        }
        self.context.pending_events.push(GameEvent::End);
    }

    /// Pump every background block once. Returns whether any of them moved.
    fn pump_background(&mut self) -> LibrettoResult<bool> {
        let guard = *self.config.dead_cycle_limit();
        let mut tasks = std::mem::take(&mut self.background);
        let mut progressed = false;
        let mut index = 0;
        while index < tasks.len() {
            let pumped = {
                let mut executor = Executor::background(&self.story, &mut self.context, &self.clock);
                tasks[index].pump(&mut executor, guard)
            };
            if !tasks[index].is_detached() {
                for spawned in &mut self.context.spawned {
                    spawned.attach();
                }
            }
            tasks.append(&mut self.context.spawned);
            match pumped {
                Ok(moved) => progressed |= moved,
                Err(e) => {
                    self.background = tasks;
                    return Err(e);
                }
            }
            index += 1;
        }
        tasks.retain(|task| !task.is_finished());
        self.background = tasks;
        Ok(progressed)
    }

    fn flush_events(&mut self) {
        for event in std::mem::take(&mut self.context.pending_events) {
            self.events.emit(&event);
        }
    }

    fn sync(&mut self, state: &mut GameState) {
        state.sync(&self.context.stage, std::mem::take(&mut self.context.effects));
    }

    /// Sources the next predictable actions need; holds the game lock until
    /// [`preload_complete`](Self::preload_complete).
    pub fn preload(&mut self) -> Option<SceneSources> {
        let from = self.current_action?;
        let sources = predicted_sources(&self.story, from, *self.config.preload_limit());
        self.preloader.begin(sources)
    }

    /// Mark the outstanding preload batch as loaded.
    pub fn preload_complete(&mut self) -> Option<SceneSources> {
        self.preloader.complete()
    }

    /// Subscribe to lifecycle events.
    pub fn on_event(&self, listener: impl FnMut(&GameEvent) + 'static) {
        self.events.subscribe(listener);
    }

    /// Register a service persisted with every save.
    pub fn register_service(&mut self, service: ServiceHandle) {
        self.services.register(service);
    }

    /// Registered services.
    pub fn services(&self) -> &ServiceRegistry {
        &self.services
    }

    /// Lifecycle status.
    pub fn state(&self) -> GameStatus {
        self.status
    }

    /// Action the main flow resumes at.
    pub fn current_action(&self) -> Option<ActionId> {
        self.current_action
    }

    /// Backpressure gate checked by `next()`.
    pub fn lock(&self) -> &GameLock {
        &self.lock
    }

    /// Undo log.
    pub fn history(&self) -> &ActionHistory {
        &self.context.history
    }

    /// Player-facing backlog.
    pub fn game_history(&self) -> &GameHistory {
        &self.context.game_history
    }

    /// Story variables.
    pub fn store(&self) -> &Store {
        &self.context.store
    }

    /// Current stage.
    pub fn stage(&self) -> &Stage {
        &self.context.stage
    }

    /// Runtime state of an element.
    pub fn element_state(&self, id: ElementId) -> Option<&ElementState> {
        self.context.elements.get(&id)
    }

    /// Background blocks still running.
    pub fn background_tasks(&self) -> usize {
        self.background.len()
    }

    /// Story being played.
    pub fn story(&self) -> &Rc<Story> {
        &self.story
    }

    /// Active configuration.
    pub fn config(&self) -> &GameConfig {
        &self.config
    }
}
