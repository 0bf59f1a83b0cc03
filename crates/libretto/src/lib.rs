//! Libretto - a visual novel engine
//!
//! Stories are authored as scripts of chained actions, constructed into an
//! action graph and played one step at a time by a [`LiveGame`]. Every step can
//! be undone, games snapshot into [`SavedGame`]s, and upcoming assets are
//! predicted for preloading.
//!
//! # Quick Start
//!
//! ```
//! use libretto::{GameConfig, GameState, LiveGame, Next, Reply, SceneConfig, Story, actions};
//! use std::rc::Rc;
//!
//! # fn main() -> libretto::LibrettoResult<()> {
//! let mut story = Story::new("hello");
//! let ada = story.character("Ada");
//! let hall = story.scene("hall", SceneConfig::default())?;
//! story.script(&hall, |b| actions![b.character(&ada).say("Hello!")])?;
//! story.entry(&hall)?;
//! story.construct()?;
//!
//! let story = Rc::new(story);
//! let mut game = LiveGame::new(Rc::clone(&story), GameConfig::default())?;
//! let mut state = GameState::new(&story);
//! game.new_game()?;
//! loop {
//!     match game.next(&mut state)? {
//!         Next::Pending(step) => {
//!             step.resolve(Reply::Done);
//!         }
//!         Next::End => break,
//!         _ => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - `libretto_error` - Error types
//! - `libretto_core` - Action graph, story construction, awaitables and timelines
//! - `libretto_narrative` - Game execution, history, saves and preloading
//!
//! This crate re-exports everything and adds a demo story, an automatic player
//! and the `libretto` binary.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub use libretto_core::*;
pub use libretto_error::*;
pub use libretto_narrative::*;

mod demo;
mod player;

pub use demo::demo_story;
pub use player::{AutoPlayer, PlayReport};
