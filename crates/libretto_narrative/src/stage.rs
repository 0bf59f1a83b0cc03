//! Render-facing state: the stage and the effect mailbox.

use libretto_core::{ActionId, ActionType, ElementId, Position, SceneId, StepAwaitable, Story, Timeline};
use serde::{Deserialize, Serialize};

/// Line of dialog currently on screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dialog {
    /// Action that produced the line
    pub action: ActionId,
    /// Displayed speaker name
    pub speaker: String,
    /// Line text
    pub text: String,
}

/// One choice offered by the open menu.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuChoiceView {
    /// Authoring index to send back with `Reply::Choice`
    pub index: usize,
    /// Label
    pub text: String,
}

/// Menu currently on screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuView {
    /// Menu action
    pub action: ActionId,
    /// Prompt line
    pub prompt: Option<String>,
    /// Choices whose guards held when the menu opened
    pub choices: Vec<MenuChoiceView>,
}

/// What is on screen. Part of every snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stage {
    /// Scene last entered
    pub scene: Option<SceneId>,
    /// Dialog line waiting for the player
    pub dialog: Option<Dialog>,
    /// Menu waiting for the player
    pub menu: Option<MenuView>,
}

impl Stage {
    /// Drop dialog and menu once the step that opened them settled.
    pub fn clear_transient(&mut self) {
        self.dialog = None;
        self.menu = None;
    }
}

/// Work the render layer has to perform.
#[derive(Debug, Clone, PartialEq)]
pub enum EffectKind {
    /// Scene root executed
    SceneEnter {
        /// Scene entered
        scene: SceneId,
        /// Background to show
        background: Option<String>,
        /// Music to start
        music: Option<String>,
    },
    /// Background replaced
    SetBackground(Option<String>),
    /// Music replaced
    SetMusic(Option<String>),
    /// Show a line of dialog
    Dialog {
        /// Speaker name
        speaker: String,
        /// Line text
        text: String,
    },
    /// Show a menu
    Menu(MenuView),
    /// Put an image on stage
    ShowImage {
        /// Image element
        element: ElementId,
        /// Source
        src: String,
        /// Position
        position: Position,
    },
    /// Take an image off stage
    HideImage {
        /// Image element
        element: ElementId,
    },
    /// Swap an image source
    SetImageSource {
        /// Image element
        element: ElementId,
        /// New source
        src: String,
    },
    /// Move an image
    MoveImage {
        /// Image element
        element: ElementId,
        /// New position
        position: Position,
    },
    /// Start a sound
    PlaySound {
        /// Sound element
        element: ElementId,
        /// Source
        src: String,
        /// Volume
        volume: f64,
    },
    /// Stop a sound
    StopSound {
        /// Sound element
        element: ElementId,
    },
    /// Change a sound volume
    SetVolume {
        /// Sound element
        element: ElementId,
        /// New volume
        volume: f64,
    },
    /// Resolve the awaitable after this many milliseconds
    Sleep(u64),
    /// The flow waits for background blocks; settles without the host
    Join(ActionType),
}

/// One effect plus the handles to settle when it completes.
#[derive(Debug, Clone)]
pub struct Effect {
    /// Action that produced the effect
    pub action: ActionId,
    /// What to render
    pub kind: EffectKind,
    /// Resolve once the effect completed, if the flow waits for it
    pub awaitable: Option<StepAwaitable>,
    /// Settle status of the effect
    pub timeline: Option<Timeline>,
}

impl Effect {
    /// Whether the flow is waiting on this effect.
    pub fn is_blocking(&self) -> bool {
        self.awaitable
            .as_ref()
            .is_some_and(|awaitable| !awaitable.is_settled())
    }
}

/// Host-side view of a game, refreshed by every `next()` call.
#[derive(Debug, Clone)]
pub struct GameState {
    story: String,
    stage: Stage,
    effects: Vec<Effect>,
}

impl GameState {
    /// Empty state bound to `story`.
    pub fn new(story: &Story) -> Self {
        Self::for_story(story.name())
    }

    /// Empty state bound to a story by name.
    pub fn for_story(name: impl Into<String>) -> Self {
        Self {
            story: name.into(),
            stage: Stage::default(),
            effects: Vec::new(),
        }
    }

    /// Story this state belongs to.
    pub fn story(&self) -> &str {
        &self.story
    }

    /// Current stage.
    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    /// Effects delivered so far and not yet taken.
    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }

    /// Drain the effect mailbox.
    pub fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    pub(crate) fn sync(&mut self, stage: &Stage, effects: Vec<Effect>) {
        self.stage = stage.clone();
        self.effects.extend(effects);
    }
}
