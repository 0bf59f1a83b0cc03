//! Game configuration.

use config::{Config, File, FileFormat};
use libretto_error::{ConfigError, ConfigErrorKind, LibrettoError, LibrettoResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Bundled defaults, lowest precedence.
const DEFAULT_CONFIG: &str = include_str!("../libretto.toml");

/// Tunables of a running game.
///
/// # Examples
///
/// ```
/// use libretto_narrative::{GameConfig, GameConfigBuilder};
///
/// let config = GameConfigBuilder::default()
///     .max_history(10usize)
///     .build()
///     .unwrap();
/// assert_eq!(*config.max_history(), 10);
/// assert_eq!(*config.dead_cycle_limit(), 1000);
///
/// let tweaked = GameConfig::default().with_preload_limit(5usize);
/// assert_eq!(*tweaked.preload_limit(), 5);
/// ```
#[derive(
    Debug,
    Clone,
    PartialEq,
    Serialize,
    Deserialize,
    derive_getters::Getters,
    derive_setters::Setters,
    derive_builder::Builder,
)]
#[setters(prefix = "with_")]
pub struct GameConfig {
    /// Undo entries kept before the oldest are evicted
    #[serde(default = "default_max_history")]
    #[builder(default = "default_max_history()")]
    max_history: usize,

    /// `next()` calls tolerated against the same unresolved awaitable
    #[serde(default = "default_dead_cycle_limit")]
    #[builder(default = "default_dead_cycle_limit()")]
    dead_cycle_limit: u32,

    /// Actions looked ahead when collecting preload sources
    #[serde(default = "default_preload_limit")]
    #[builder(default = "default_preload_limit()")]
    preload_limit: usize,

    /// Maximum jump distance from the entry scene
    #[serde(default = "default_max_scene_depth")]
    #[builder(default = "default_max_scene_depth()")]
    max_scene_depth: usize,

    /// Save slot used by autosave
    #[serde(default = "default_autosave_name")]
    #[builder(default = "default_autosave_name()")]
    autosave_name: String,
}

fn default_max_history() -> usize {
    100
}

fn default_dead_cycle_limit() -> u32 {
    1000
}

fn default_preload_limit() -> usize {
    30
}

fn default_max_scene_depth() -> usize {
    libretto_core::MAX_DEPTH
}

fn default_autosave_name() -> String {
    "autosave".to_string()
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            max_history: default_max_history(),
            dead_cycle_limit: default_dead_cycle_limit(),
            preload_limit: default_preload_limit(),
            max_scene_depth: default_max_scene_depth(),
            autosave_name: default_autosave_name(),
        }
    }
}

impl GameConfig {
    /// Load configuration from a specific file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<std::path::Path>) -> LibrettoResult<Self> {
        debug!("Loading game configuration from file");

        let config: Self = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()
            .map_err(|e| {
                LibrettoError::from(ConfigError::new(ConfigErrorKind::Load {
                    origin: path.as_ref().display().to_string(),
                    reason: e.to_string(),
                }))
            })?
            .try_deserialize()
            .map_err(|e| LibrettoError::from(ConfigError::new(ConfigErrorKind::Parse(e.to_string()))))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with precedence: current dir > home dir > bundled defaults.
    ///
    /// 1. Bundled defaults (`libretto.toml` shipped with the crate)
    /// 2. `~/.config/libretto/libretto.toml`
    /// 3. `./libretto.toml`
    ///
    /// Missing user files are skipped.
    ///
    /// ```no_run
    /// use libretto_narrative::GameConfig;
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let config = GameConfig::load()?;
    /// println!("keeping {} undo steps", config.max_history());
    /// # Ok(())
    /// # }
    /// ```
    #[instrument]
    pub fn load() -> LibrettoResult<Self> {
        debug!("Loading game configuration with precedence: current dir > home dir > bundled defaults");

        let mut builder =
            Config::builder().add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml));

        if let Some(home) = dirs::home_dir() {
            let home_config = home.join(".config/libretto/libretto.toml");
            builder = builder.add_source(File::from(home_config).required(false));
        }

        builder = builder.add_source(File::with_name("libretto").required(false));

        let config: Self = builder
            .build()
            .map_err(|e| {
                LibrettoError::from(ConfigError::new(ConfigErrorKind::Load {
                    origin: "layered configuration".to_string(),
                    reason: e.to_string(),
                }))
            })?
            .try_deserialize()
            .map_err(|e| LibrettoError::from(ConfigError::new(ConfigErrorKind::Parse(e.to_string()))))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with.
    ///
    /// # Errors
    ///
    /// Returns an error if `max_history` or `dead_cycle_limit` is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let minimums = [
            ("max_history", self.max_history),
            ("dead_cycle_limit", self.dead_cycle_limit as usize),
        ];
        for (setting, value) in minimums {
            if value < 1 {
                return Err(ConfigError::new(ConfigErrorKind::TooSmall {
                    setting,
                    min: 1,
                    value,
                }));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_defaults_match_default_impl() {
        let bundled: GameConfig = Config::builder()
            .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(bundled, GameConfig::default());
    }

    #[test]
    fn zero_history_is_rejected() {
        let config = GameConfig::default().with_max_history(0usize);
        let err = config.validate().unwrap_err();
        assert_eq!(
            err.kind(),
            &ConfigErrorKind::TooSmall {
                setting: "max_history",
                min: 1,
                value: 0,
            }
        );
    }
}
