//! Execution of Libretto stories.
//!
//! A [`LiveGame`] drives a constructed [`Story`](libretto_core::Story) one step
//! per [`next`](LiveGame::next) call:
//!
//! - a [`StackModel`] runs the main flow; concurrent control blocks run as
//!   [`BackgroundTask`]s pumped at the start of every call
//! - suspended steps hand out awaitables the host settles, listed as
//!   [`Effect`]s in the [`GameState`] mailbox
//! - every executed action lands in a bounded [`ActionHistory`] with its
//!   inverse; [`GameHistory`] keeps the player-facing backlog in lockstep
//! - [`SavedGame`] snapshots store, stage, element patches, services and
//!   detached background blocks
//!
//! Configuration is loaded through [`GameConfig`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod event;
mod executor;
mod game_history;
mod history;
mod live_game;
mod lock;
mod preload;
mod saved;
mod service;
mod stack;
mod stage;

pub use config::{GameConfig, GameConfigBuilder};
pub use event::{EventEmitter, GameEvent};
pub(crate) use executor::{Executor, GameContext};
pub use game_history::{GameHistory, GameHistoryPayload, GameHistoryRow};
pub use history::{ActionHistory, HistoryEntry, HistoryEvent, HistoryId, UndoFn, UndoScope};
pub use live_game::{GameStatus, LiveGame, Next};
pub use lock::{GameLock, GameLockGuard};
pub use preload::{Preloader, get_all_predictable_actions, predicted_sources};
pub use saved::{SavedBackgroundTask, SavedElementState, SavedGame, SavedGameState, SavedMeta};
pub use service::{Service, ServiceHandle, ServiceRegistry};
pub use stack::{ActionRunner, BackgroundTask, Rolled, StackItem, StackModel, Yielded};
pub use stage::{Dialog, Effect, EffectKind, GameState, MenuChoiceView, MenuView, Stage};
