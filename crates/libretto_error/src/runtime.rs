//! Runtime game error types.

/// Host integration misuse and lifecycle violations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
pub enum RuntimeGameErrorKind {
    /// `next()` or `undo()` called before a game was started or loaded
    #[display("Game has not been started")]
    NotStarted,
    /// The story was used before `construct()` succeeded
    #[display("Story '{}' has not been constructed", _0)]
    StoryNotConstructed(String),
    /// The game state belongs to another story
    #[display("Game state is bound to story '{}', expected '{}'", found, expected)]
    StoryMismatch {
        /// Story the game expects
        expected: String,
        /// Story the state was created for
        found: String,
    },
    /// A saved action id does not exist in the story graph
    #[display("Action not found: {}", _0)]
    MissingAction(String),
    /// A saved element id does not exist in the story
    #[display("Element not found: {}", _0)]
    MissingElement(String),
    /// A saved element patch could not be applied
    #[display("Element '{}' could not be restored: {}", id, reason)]
    InvalidElementData {
        /// Element id
        id: String,
        /// Reason for the failure
        reason: String,
    },
    /// Saved data could not be interpreted
    #[display("Invalid saved game: {}", _0)]
    InvalidSave(String),
    /// A service failed to restore its state
    #[display("Service '{}' failed: {}", name, reason)]
    Service {
        /// Service name
        name: String,
        /// Reason for the failure
        reason: String,
    },
    /// Too many `next()` calls without progress
    #[display("No progress after {} calls to next(); the host loop is spinning on an unresolved awaitable", _0)]
    DeadCycle(u32),
}

/// Runtime error with location tracking.
///
/// # Examples
///
/// ```
/// use libretto_error::{RuntimeGameError, RuntimeGameErrorKind};
///
/// let err = RuntimeGameError::new(RuntimeGameErrorKind::DeadCycle(1000));
/// assert!(format!("{}", err).contains("1000"));
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Runtime Game Error: {} at line {} in {}", kind, line, file)]
pub struct RuntimeGameError {
    /// The specific error condition
    pub kind: RuntimeGameErrorKind,
    /// Line number where the error occurred
    pub line: u32,
    /// Source file where the error occurred
    pub file: &'static str,
}

impl RuntimeGameError {
    /// Create a new RuntimeGameError with automatic location tracking.
    #[track_caller]
    pub fn new(kind: RuntimeGameErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Get the error kind.
    pub fn kind(&self) -> &RuntimeGameErrorKind {
        &self.kind
    }
}
