//! Actions, their content nodes and execution results.

use crate::{ActionId, Awaitable, ElementId, LambdaCtx, Position, SceneId, ScriptCtx};
use libretto_error::{StaticScriptWarning, StaticScriptWarningKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::Location;
use std::rc::Rc;

/// Stable type tag of an action, as reported in [`CalledActionResult`].
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
)]
pub enum ActionType {
    /// Scene entry
    #[strum(serialize = "scene:init")]
    #[serde(rename = "scene:init")]
    SceneInit,
    /// Jump to another scene
    #[strum(serialize = "scene:jumpTo")]
    #[serde(rename = "scene:jumpTo")]
    SceneJumpTo,
    /// Change the scene background
    #[strum(serialize = "scene:setBackground")]
    #[serde(rename = "scene:setBackground")]
    SceneSetBackground,
    /// Change the scene music
    #[strum(serialize = "scene:setMusic")]
    #[serde(rename = "scene:setMusic")]
    SceneSetMusic,
    /// A character speaks
    #[strum(serialize = "character:say")]
    #[serde(rename = "character:say")]
    CharacterSay,
    /// Rename a character
    #[strum(serialize = "character:setName")]
    #[serde(rename = "character:setName")]
    CharacterSetName,
    /// Show an image
    #[strum(serialize = "image:show")]
    #[serde(rename = "image:show")]
    ImageShow,
    /// Hide an image
    #[strum(serialize = "image:hide")]
    #[serde(rename = "image:hide")]
    ImageHide,
    /// Change an image source
    #[strum(serialize = "image:setSrc")]
    #[serde(rename = "image:setSrc")]
    ImageSetSrc,
    /// Move an image
    #[strum(serialize = "image:setPosition")]
    #[serde(rename = "image:setPosition")]
    ImageSetPosition,
    /// Start a sound
    #[strum(serialize = "sound:play")]
    #[serde(rename = "sound:play")]
    SoundPlay,
    /// Stop a sound
    #[strum(serialize = "sound:stop")]
    #[serde(rename = "sound:stop")]
    SoundStop,
    /// Change a sound volume
    #[strum(serialize = "sound:setVolume")]
    #[serde(rename = "sound:setVolume")]
    SoundSetVolume,
    /// Present a menu
    #[strum(serialize = "menu:action")]
    #[serde(rename = "menu:action")]
    Menu,
    /// Branch on a condition
    #[strum(serialize = "condition:action")]
    #[serde(rename = "condition:action")]
    Condition,
    /// Run a block in sequence
    #[strum(serialize = "control:do")]
    #[serde(rename = "control:do")]
    ControlDo,
    /// Run a block in the background
    #[strum(serialize = "control:doAsync")]
    #[serde(rename = "control:doAsync")]
    ControlDoAsync,
    /// Run blocks concurrently and wait for all
    #[strum(serialize = "control:all")]
    #[serde(rename = "control:all")]
    ControlAll,
    /// Run blocks concurrently and wait for the first
    #[strum(serialize = "control:any")]
    #[serde(rename = "control:any")]
    ControlAny,
    /// Run a block several times
    #[strum(serialize = "control:repeat")]
    #[serde(rename = "control:repeat")]
    ControlRepeat,
    /// Wait for an external timer
    #[strum(serialize = "control:sleep")]
    #[serde(rename = "control:sleep")]
    ControlSleep,
    /// Run a script closure
    #[strum(serialize = "script:action")]
    #[serde(rename = "script:action")]
    Script,
}

/// The narrative element that issued an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Callee {
    /// A scene
    Scene(SceneId),
    /// A character, image or sound
    Element(ElementId),
    /// An anonymous menu
    Menu,
    /// An anonymous condition
    Condition,
    /// An anonymous control block
    Control,
    /// An anonymous script
    Script,
}

impl Callee {
    /// Element id of the callee, if it is a stateful element.
    pub fn element(&self) -> Option<ElementId> {
        match self {
            Self::Element(id) => Some(*id),
            _ => None,
        }
    }
}

/// Boolean predicate over the store, used by conditions and menu choice guards.
#[derive(Clone)]
pub struct Lambda(Rc<dyn Fn(&LambdaCtx<'_>) -> bool>);

impl Lambda {
    /// Wrap a predicate.
    pub fn new(f: impl Fn(&LambdaCtx<'_>) -> bool + 'static) -> Self {
        Self(Rc::new(f))
    }

    /// Evaluate against a store view.
    pub fn evaluate(&self, ctx: &LambdaCtx<'_>) -> bool {
        (self.0)(ctx)
    }
}

impl fmt::Debug for Lambda {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Lambda(..)")
    }
}

/// Script body run by a script action. Store writes are journaled for undo.
#[derive(Clone)]
pub struct ScriptFn(Rc<dyn Fn(&mut ScriptCtx<'_>)>);

impl ScriptFn {
    /// Wrap a script body.
    pub fn new(f: impl Fn(&mut ScriptCtx<'_>) + 'static) -> Self {
        Self(Rc::new(f))
    }

    /// Run the script.
    pub fn run(&self, ctx: &mut ScriptCtx<'_>) {
        (self.0)(ctx)
    }
}

impl fmt::Debug for ScriptFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ScriptFn(..)")
    }
}

/// Scene operations.
#[derive(Debug, Clone, PartialEq)]
pub enum SceneOp {
    /// Enter the scene, applying its configured background and music
    Init,
    /// Continue at another scene's root
    JumpTo(SceneId),
    /// Replace the background
    SetBackground(Option<String>),
    /// Replace the music
    SetMusic(Option<String>),
}

/// Character operations.
#[derive(Debug, Clone, PartialEq)]
pub enum CharacterOp {
    /// Show a line of dialog and wait for the player
    Say(String),
    /// Change the displayed name
    SetName(String),
}

/// Image operations.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageOp {
    /// Put the image on stage and wait for its transition
    Show,
    /// Take the image off stage and wait for its transition
    Hide,
    /// Swap the image source
    SetSource(String),
    /// Move the image
    SetPosition(Position),
}

/// Sound operations.
#[derive(Debug, Clone, PartialEq)]
pub enum SoundOp {
    /// Start playback, optionally waiting until it ends
    Play {
        /// Suspend until the audio layer reports the end
        wait: bool,
    },
    /// Stop playback
    Stop,
    /// Change volume
    SetVolume(f64),
}

/// One selectable menu entry.
#[derive(Debug, Clone)]
pub struct Choice {
    /// Label shown to the player
    pub text: String,
    /// First action of the choice body
    pub head: Option<ActionId>,
    /// Choice is only offered when the guard holds
    pub guard: Option<Lambda>,
}

/// Menu payload.
#[derive(Debug, Clone)]
pub struct MenuContent {
    /// Optional prompt line
    pub prompt: Option<String>,
    /// Choices in authoring order
    pub choices: Vec<Choice>,
}

/// One IF / ELSE-IF branch.
#[derive(Debug, Clone)]
pub struct ConditionBranch {
    /// Predicate selecting this branch
    pub lambda: Lambda,
    /// First action of the branch body
    pub head: Option<ActionId>,
}

/// Condition payload.
#[derive(Debug, Clone)]
pub struct ConditionContent {
    /// IF followed by ELSE-IF branches, evaluated in order
    pub branches: Vec<ConditionBranch>,
    /// ELSE branch body
    pub otherwise: Option<ActionId>,
}

impl ConditionContent {
    /// Head of the first branch whose lambda holds, falling back to ELSE.
    ///
    /// The outer `Option` is `None` when no branch applies at all.
    pub fn select(&self, ctx: &LambdaCtx<'_>) -> Option<Option<ActionId>> {
        self.branches
            .iter()
            .find(|branch| branch.lambda.evaluate(ctx))
            .map(|branch| branch.head)
            .or_else(|| self.otherwise.map(Some))
    }
}

/// Control block operations.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlOp {
    /// Run the block, then continue
    Do(Option<ActionId>),
    /// Start the block in the background and continue immediately
    DoAsync(Option<ActionId>),
    /// Start every block and continue once all have finished
    All(Vec<ActionId>),
    /// Start every block and continue once the first has finished
    Any(Vec<ActionId>),
    /// Run the block `times` times, then continue
    Repeat {
        /// Number of iterations
        times: u32,
        /// First action of the block
        head: Option<ActionId>,
    },
    /// Wait for the host timer
    Sleep(u64),
}

/// Closed set of action payloads.
#[derive(Debug, Clone)]
pub enum ActionContent {
    /// Scene operation
    Scene(SceneOp),
    /// Character operation
    Character(CharacterOp),
    /// Image operation
    Image(ImageOp),
    /// Sound operation
    Sound(SoundOp),
    /// Menu
    Menu(MenuContent),
    /// Condition
    Condition(ConditionContent),
    /// Control block
    Control(ControlOp),
    /// Script
    Script(ScriptFn),
}

impl ActionContent {
    /// Type tag of this payload.
    pub fn action_type(&self) -> ActionType {
        match self {
            Self::Scene(SceneOp::Init) => ActionType::SceneInit,
            Self::Scene(SceneOp::JumpTo(_)) => ActionType::SceneJumpTo,
            Self::Scene(SceneOp::SetBackground(_)) => ActionType::SceneSetBackground,
            Self::Scene(SceneOp::SetMusic(_)) => ActionType::SceneSetMusic,
            Self::Character(CharacterOp::Say(_)) => ActionType::CharacterSay,
            Self::Character(CharacterOp::SetName(_)) => ActionType::CharacterSetName,
            Self::Image(ImageOp::Show) => ActionType::ImageShow,
            Self::Image(ImageOp::Hide) => ActionType::ImageHide,
            Self::Image(ImageOp::SetSource(_)) => ActionType::ImageSetSrc,
            Self::Image(ImageOp::SetPosition(_)) => ActionType::ImageSetPosition,
            Self::Sound(SoundOp::Play { .. }) => ActionType::SoundPlay,
            Self::Sound(SoundOp::Stop) => ActionType::SoundStop,
            Self::Sound(SoundOp::SetVolume(_)) => ActionType::SoundSetVolume,
            Self::Menu(_) => ActionType::Menu,
            Self::Condition(_) => ActionType::Condition,
            Self::Control(ControlOp::Do(_)) => ActionType::ControlDo,
            Self::Control(ControlOp::DoAsync(_)) => ActionType::ControlDoAsync,
            Self::Control(ControlOp::All(_)) => ActionType::ControlAll,
            Self::Control(ControlOp::Any(_)) => ActionType::ControlAny,
            Self::Control(ControlOp::Repeat { .. }) => ActionType::ControlRepeat,
            Self::Control(ControlOp::Sleep(_)) => ActionType::ControlSleep,
            Self::Script(_) => ActionType::Script,
        }
    }

    /// Heads of sub-chains that splice back into the surrounding flow.
    pub fn continuation_branches(&self) -> Vec<ActionId> {
        match self {
            Self::Menu(menu) => menu.choices.iter().filter_map(|c| c.head).collect(),
            Self::Condition(condition) => condition
                .branches
                .iter()
                .filter_map(|b| b.head)
                .chain(condition.otherwise)
                .collect(),
            Self::Control(ControlOp::Do(head)) => head.iter().copied().collect(),
            _ => Vec::new(),
        }
    }

    /// Heads of every sub-chain held by this payload.
    pub fn branch_heads(&self) -> Vec<ActionId> {
        match self {
            Self::Control(ControlOp::DoAsync(head)) => head.iter().copied().collect(),
            Self::Control(ControlOp::All(heads)) | Self::Control(ControlOp::Any(heads)) => {
                heads.clone()
            }
            Self::Control(ControlOp::Repeat { head, .. }) => head.iter().copied().collect(),
            other => other.continuation_branches(),
        }
    }

    /// Target scene, if this payload is a scene jump.
    pub fn jump_target(&self) -> Option<SceneId> {
        match self {
            Self::Scene(SceneOp::JumpTo(target)) => Some(*target),
            _ => None,
        }
    }
}

/// Where an action was authored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    file: &'static str,
    line: u32,
    column: u32,
    label: Option<String>,
}

impl CallSite {
    /// Capture from a caller location.
    pub fn from_location(location: &'static Location<'static>) -> Self {
        Self {
            file: location.file(),
            line: location.line(),
            column: location.column(),
            label: None,
        }
    }

    /// Capture the caller of the function this is called from.
    #[track_caller]
    pub fn here() -> Self {
        Self::from_location(Location::caller())
    }

    /// Development label assigned by [`Story::relabel`](crate::Story::relabel).
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub(crate) fn set_label(&mut self, label: String) {
        self.label = Some(label);
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.label {
            Some(label) => write!(f, "{} ({}:{}:{})", label, self.file, self.line, self.column),
            None => write!(f, "{}:{}:{}", self.file, self.line, self.column),
        }
    }
}

/// Linked node of the action graph. Its id is the id of the owning action.
#[derive(Debug, Clone, derive_getters::Getters)]
pub struct ContentNode {
    /// Node id, equal to the owning action id
    id: ActionId,
    /// Payload
    content: ActionContent,
    /// Next node in the flow
    child: Option<ActionId>,
    /// Node that first linked to this one
    parent: Option<ActionId>,
}

impl ContentNode {
    pub(crate) fn new(id: ActionId, content: ActionContent) -> Self {
        Self {
            id,
            content,
            child: None,
            parent: None,
        }
    }

    /// Owning action id.
    pub fn action(&self) -> ActionId {
        self.id
    }

    /// Link the next node. A node's child is set once.
    pub fn set_init_child(&mut self, child: ActionId) -> Result<(), StaticScriptWarning> {
        self.link(child)
    }

    /// Splice a branch continuation onto a chain tail.
    pub fn graft_child(&mut self, child: ActionId) -> Result<(), StaticScriptWarning> {
        self.link(child)
    }

    fn link(&mut self, child: ActionId) -> Result<(), StaticScriptWarning> {
        match self.child {
            Some(existing) if existing != child => Err(StaticScriptWarning::new(
                StaticScriptWarningKind::ActionRelinked {
                    action: self.id.to_string(),
                    child: existing.to_string(),
                },
            )),
            _ => {
                self.child = Some(child);
                Ok(())
            }
        }
    }

    pub(crate) fn set_parent(&mut self, parent: ActionId) {
        if self.parent.is_none() {
            self.parent = Some(parent);
        }
    }
}

/// Executable unit of the narrative graph.
#[derive(Debug, Clone, derive_getters::Getters)]
pub struct Action {
    /// Story-unique id
    id: ActionId,
    /// Issuing element
    callee: Callee,
    /// Type tag
    action_type: ActionType,
    /// Linked payload
    node: ContentNode,
    /// Authoring location
    call_site: CallSite,
}

impl Action {
    pub(crate) fn new(id: ActionId, callee: Callee, content: ActionContent, call_site: CallSite) -> Self {
        Self {
            id,
            callee,
            action_type: content.action_type(),
            node: ContentNode::new(id, content),
            call_site,
        }
    }

    /// Payload of this action.
    pub fn content(&self) -> &ActionContent {
        self.node.content()
    }

    /// Next action in the flow.
    pub fn child(&self) -> Option<ActionId> {
        *self.node.child()
    }

    pub(crate) fn node_mut(&mut self) -> &mut ContentNode {
        &mut self.node
    }

    pub(crate) fn call_site_mut(&mut self) -> &mut CallSite {
        &mut self.call_site
    }
}

/// Outcome of one executed step: the action type and the node to run next.
///
/// `node == None` marks the end of the story or of a background branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalledActionResult {
    /// Type of the action that produced this result
    #[serde(rename = "type")]
    pub action_type: ActionType,
    /// Next node to execute
    pub node: Option<ActionId>,
}

impl CalledActionResult {
    /// Build a result.
    pub fn new(action_type: ActionType, node: Option<ActionId>) -> Self {
        Self { action_type, node }
    }

    /// Whether this result ends its flow.
    pub fn is_end(&self) -> bool {
        self.node.is_none()
    }
}

/// What the render layer sends back when it settles a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reply {
    /// The effect completed
    Done,
    /// The player picked the menu choice with this authoring index
    Choice(usize),
}

/// Awaitable handed out for suspended steps.
pub type StepAwaitable = Awaitable<CalledActionResult, Reply>;
