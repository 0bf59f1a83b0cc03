//! Error types for the Libretto narrative engine.
//!
//! This crate provides the foundation error types used throughout the Libretto workspace.
//!
//! # Error Hierarchy
//!
//! All errors follow the `ErrorKind` + wrapper struct pattern:
//! - `*ErrorKind` enum defines specific error conditions
//! - `*Error` struct wraps the kind with source location tracking
//! - All constructors use `#[track_caller]` for automatic location capture
//!
//! Authoring mistakes surface as [`StaticScriptWarning`] while the story is being
//! built. Misuse of a running game surfaces as [`RuntimeGameError`].
//!
//! # Examples
//!
//! ```
//! use libretto_error::{LibrettoResult, RuntimeGameError, RuntimeGameErrorKind};
//!
//! fn advance() -> LibrettoResult<()> {
//!     Err(RuntimeGameError::new(RuntimeGameErrorKind::NotStarted))?
//! }
//!
//! match advance() {
//!     Ok(()) => println!("advanced"),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod json;
mod runtime;
mod script;

pub use config::{ConfigError, ConfigErrorKind};
pub use error::{LibrettoError, LibrettoErrorKind, LibrettoResult};
pub use json::JsonError;
pub use runtime::{RuntimeGameError, RuntimeGameErrorKind};
pub use script::{StaticScriptWarning, StaticScriptWarningKind};
