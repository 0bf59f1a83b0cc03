//! Serializable snapshot of a game.

use crate::Stage;
use libretto_core::Store;
use libretto_error::{JsonError, LibrettoResult};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Bookkeeping attached to every save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedMeta {
    /// Creation time, milliseconds since the Unix epoch
    pub created: i64,
    /// Last update time, milliseconds since the Unix epoch
    pub updated: i64,
    /// Unique save id
    pub id: String,
}

impl SavedMeta {
    fn now() -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            created: now,
            updated: now,
            id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

/// Changed fields of one element, relative to its initial state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedElementState {
    /// Element id, e.g. `element-3`
    pub id: String,
    /// Patch produced by `ElementState::to_data`
    pub data: JsonValue,
}

/// Progress of a detached background block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedBackgroundTask {
    /// First action of the block
    pub head: String,
    /// Runs left, the current one included
    pub remaining: u32,
    /// Actions left on the block's stack, bottom first
    pub stack: Vec<String>,
}

/// Live state captured by a save.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedGameState {
    /// Story variables
    pub store: Store,
    /// What was on screen
    pub stage: Stage,
    /// Action the main flow resumes at; `None` once the story ended
    pub current_action: Option<String>,
    /// Element patches in id order; unchanged elements are omitted
    pub element_states: Vec<SavedElementState>,
    /// Service snapshots by name
    #[serde(default)]
    pub services: BTreeMap<String, JsonValue>,
    /// Detached background blocks still running
    #[serde(default)]
    pub background: Vec<SavedBackgroundTask>,
}

/// A named save.
///
/// # Examples
///
/// ```
/// use libretto_narrative::{SavedGame, SavedGameState};
///
/// let save = SavedGame::new("slot-1", SavedGameState::default());
/// let json = save.to_json().unwrap();
/// assert!(json.contains("\"currentAction\""));
/// assert_eq!(SavedGame::from_json(&json).unwrap(), save);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedGame {
    /// Save name
    pub name: String,
    /// Bookkeeping
    pub meta: SavedMeta,
    /// Captured state
    pub game: SavedGameState,
}

impl SavedGame {
    /// Fresh save with new metadata.
    pub fn new(name: impl Into<String>, game: SavedGameState) -> Self {
        Self {
            name: name.into(),
            meta: SavedMeta::now(),
            game,
        }
    }

    /// Bump the update time.
    pub fn touch(&mut self) {
        self.meta.updated = chrono::Utc::now().timestamp_millis();
    }

    /// Encode as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if a value cannot be represented as JSON.
    pub fn to_json(&self) -> LibrettoResult<String> {
        Ok(serde_json::to_string_pretty(self).map_err(JsonError::from)?)
    }

    /// Decode from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid save.
    pub fn from_json(json: &str) -> LibrettoResult<Self> {
        Ok(serde_json::from_str(json).map_err(JsonError::from)?)
    }
}
