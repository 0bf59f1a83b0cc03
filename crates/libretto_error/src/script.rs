//! Authoring-time script errors.

/// Structural problems detected while a story is being built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
pub enum StaticScriptWarningKind {
    /// Two scenes registered under the same name
    #[display("Scene '{}' is already registered", _0)]
    DuplicateSceneName(String),
    /// A scene was given a script more than once
    #[display("Scene '{}' already has a script", _0)]
    SceneScriptedTwice(String),
    /// A reachable scene never received a script
    #[display("Scene '{}' is reachable but has no script", _0)]
    UnscriptedScene(String),
    /// A condition received a second IF branch
    #[display("Condition already has an IF branch")]
    DuplicateIf,
    /// A condition received a second ELSE branch
    #[display("Condition already has an ELSE branch")]
    DuplicateElse,
    /// An ELSE-IF branch was added after the ELSE branch
    #[display("ELSE-IF cannot follow ELSE")]
    ElseIfAfterElse,
    /// An ELSE or ELSE-IF branch was added before any IF branch
    #[display("Condition branch added before IF")]
    MissingIf,
    /// A menu was built without any choices
    #[display("Menu '{}' has no choices", _0)]
    EmptyMenu(String),
    /// An image was mounted twice into the same scene
    #[display("Image '{}' is already mounted in scene '{}'", image, scene)]
    DuplicateMount {
        /// Image element name
        image: String,
        /// Scene name
        scene: String,
    },
    /// The same action was linked into two places
    #[display("Action {} is already linked to {}", action, child)]
    ActionRelinked {
        /// Action being linked
        action: String,
        /// Existing child link
        child: String,
    },
    /// The same action was placed in a chain twice
    #[display("Action {} is used more than once", _0)]
    ActionReused(String),
    /// The story has no entry scene
    #[display("Story has no entry scene")]
    MissingEntry,
    /// A referenced scene does not belong to this story
    #[display("Unknown scene: {}", _0)]
    UnknownScene(String),
    /// A referenced element does not belong to this story or has the wrong kind
    #[display("Unknown element: {}", _0)]
    UnknownElement(String),
    /// Scene closure exceeded the configured depth
    #[display("Scene graph deeper than {} levels", _0)]
    DepthExceeded(usize),
    /// The story was modified after construction
    #[display("Story '{}' is already constructed", _0)]
    AlreadyConstructed(String),
}

/// Script error carrying both the authoring call site and the detection location.
///
/// # Examples
///
/// ```
/// use libretto_error::{StaticScriptWarning, StaticScriptWarningKind};
///
/// let warning = StaticScriptWarning::new(StaticScriptWarningKind::DuplicateIf)
///     .with_call_site("story.rs:12:5");
/// assert_eq!(warning.call_site(), Some("story.rs:12:5"));
/// assert!(format!("{}", warning).contains("IF"));
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Static Script Warning: {} (authored at {}) at line {} in {}", kind, call_site.as_deref().unwrap_or("unknown"), line, file)]
pub struct StaticScriptWarning {
    /// The specific error condition
    pub kind: StaticScriptWarningKind,
    /// Where the offending script element was authored
    pub call_site: Option<String>,
    /// Line number where the error was detected
    pub line: u32,
    /// Source file where the error was detected
    pub file: &'static str,
}

impl StaticScriptWarning {
    /// Create a new warning with automatic location tracking.
    #[track_caller]
    pub fn new(kind: StaticScriptWarningKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            call_site: None,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Attach the authoring call site.
    pub fn with_call_site(mut self, call_site: impl Into<String>) -> Self {
        self.call_site = Some(call_site.into());
        self
    }

    /// Get the error kind.
    pub fn kind(&self) -> &StaticScriptWarningKind {
        &self.kind
    }

    /// Get the authoring call site, if one was captured.
    pub fn call_site(&self) -> Option<&str> {
        self.call_site.as_deref()
    }
}
