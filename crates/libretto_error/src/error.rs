//! Top-level error wrapper types.

use crate::{ConfigError, JsonError, RuntimeGameError, StaticScriptWarning};

/// Every error condition the Libretto crates can report.
///
/// # Examples
///
/// ```
/// use libretto_error::{ConfigError, ConfigErrorKind, LibrettoError};
///
/// let err: LibrettoError = ConfigError::new(ConfigErrorKind::Parse("missing field".into())).into();
/// assert!(format!("{}", err).contains("Configuration Error"));
/// ```
#[derive(Debug, derive_more::From, derive_more::Display, derive_more::Error)]
pub enum LibrettoErrorKind {
    /// Structural error in an authored script
    #[from(StaticScriptWarning)]
    Script(StaticScriptWarning),
    /// Host integration or lifecycle misuse
    #[from(RuntimeGameError)]
    Runtime(RuntimeGameError),
    /// Configuration error
    #[from(ConfigError)]
    Config(ConfigError),
    /// JSON serialization/deserialization error
    #[from(JsonError)]
    Json(JsonError),
}

/// Libretto error with kind discrimination.
///
/// # Examples
///
/// ```
/// use libretto_error::{LibrettoResult, StaticScriptWarning, StaticScriptWarningKind};
///
/// fn build() -> LibrettoResult<()> {
///     Err(StaticScriptWarning::new(StaticScriptWarningKind::MissingEntry))?
/// }
///
/// assert!(build().is_err());
/// ```
#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display("Libretto Error: {}", _0)]
pub struct LibrettoError(Box<LibrettoErrorKind>);

impl LibrettoError {
    /// Create a new error from a kind.
    pub fn new(kind: LibrettoErrorKind) -> Self {
        Self(Box::new(kind))
    }

    /// Get the error kind.
    pub fn kind(&self) -> &LibrettoErrorKind {
        &self.0
    }

    /// Returns the script warning if this error came from story construction.
    pub fn as_script(&self) -> Option<&StaticScriptWarning> {
        match self.kind() {
            LibrettoErrorKind::Script(warning) => Some(warning),
            _ => None,
        }
    }

    /// Returns the runtime error if this error came from a running game.
    pub fn as_runtime(&self) -> Option<&RuntimeGameError> {
        match self.kind() {
            LibrettoErrorKind::Runtime(err) => Some(err),
            _ => None,
        }
    }
}

impl<T> From<T> for LibrettoError
where
    T: Into<LibrettoErrorKind>,
{
    fn from(err: T) -> Self {
        Self::new(err.into())
    }
}

/// Result type for Libretto operations.
pub type LibrettoResult<T> = std::result::Result<T, LibrettoError>;
