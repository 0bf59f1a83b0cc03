//! Game configuration errors.

/// What went wrong while loading or checking a game configuration.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum ConfigErrorKind {
    /// A configuration source could not be read or merged
    #[display("Could not load {}: {}", origin, reason)]
    Load {
        /// File or layer that failed
        origin: String,
        /// Underlying failure
        reason: String,
    },
    /// The merged settings do not deserialize into a game configuration
    #[display("Could not parse settings: {}", _0)]
    Parse(String),
    /// A numeric setting is below what the engine can run with
    #[display("{} must be at least {}, got {}", setting, min, value)]
    TooSmall {
        /// Setting name as written in `libretto.toml`
        setting: &'static str,
        /// Smallest accepted value
        min: usize,
        /// Configured value
        value: usize,
    },
}

/// Configuration error with source location.
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Configuration Error: {} at line {} in {}", kind, line, file)]
pub struct ConfigError {
    /// The specific failure
    pub kind: ConfigErrorKind,
    /// Line number where the error occurred
    pub line: u32,
    /// File where the error occurred
    pub file: &'static str,
}

impl ConfigError {
    /// Create a new ConfigError at the current location.
    ///
    /// # Examples
    ///
    /// ```
    /// use libretto_error::{ConfigError, ConfigErrorKind};
    ///
    /// let err = ConfigError::new(ConfigErrorKind::TooSmall {
    ///     setting: "max_history",
    ///     min: 1,
    ///     value: 0,
    /// });
    /// assert!(err.to_string().contains("max_history must be at least 1, got 0"));
    /// ```
    #[track_caller]
    pub fn new(kind: ConfigErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Get the error kind.
    pub fn kind(&self) -> &ConfigErrorKind {
        &self.kind
    }
}
