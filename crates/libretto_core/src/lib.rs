//! Core types for the Libretto narrative engine.
//!
//! This crate provides the authoring side of a story and the cooperative primitives
//! used to run it:
//!
//! - [`Story`] registers elements and scenes, runs scene scripts through a
//!   [`ScriptBuilder`] and links the resulting [`Action`]s into a graph
//! - [`Awaitable`], [`SkipController`] and [`Timeline`] model suspended steps
//! - [`Store`] holds the story variables read by conditions and written by scripts
//!
//! Execution lives in `libretto_narrative`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod action;
mod awaitable;
mod chain;
mod element;
mod graph;
mod id;
mod scene;
mod store;
mod story;
mod telemetry;
mod timeline;

pub use action::{
    Action, ActionContent, ActionType, CallSite, CalledActionResult, Callee, CharacterOp, Choice,
    ConditionBranch, ConditionContent, ContentNode, ControlOp, ImageOp, Lambda, MenuContent,
    Reply, SceneOp, ScriptFn, SoundOp, StepAwaitable,
};
pub use awaitable::{Awaitable, Settle, Settled, SkipController, WeakAwaitable};
pub use chain::{Actions, Chained, ConditionDraft, MenuDraft, ScriptBuilder};
pub use element::{
    CharacterHandle, CharacterState, ElementDef, ElementKind, ElementState, ImageConfig,
    ImageHandle, ImageState, Position, SceneConfig, SceneHandle, SceneState, SoundHandle,
    SoundState,
};
pub use graph::ActionArena;
pub use id::{ActionId, ElementId, IdAllocator, SceneId, StoryKey};
pub use scene::{Scene, SceneSources};
pub use store::{DEFAULT_NAMESPACE, LambdaCtx, ScriptCtx, Store, StoreWrite, revert_writes};
pub use story::{MAX_DEPTH, Story};
pub use telemetry::{DEFAULT_LOG_FILTER, init_telemetry};
pub use timeline::{TickClock, Timeline, TimelineStatus};
