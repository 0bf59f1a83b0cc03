//! Narrative elements and their serializable runtime state.

use crate::{ElementId, SceneId, StoryKey};
use libretto_error::JsonError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Screen position of an image, in stage units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Horizontal offset
    pub x: f64,
    /// Vertical offset
    pub y: f64,
}

impl Position {
    /// Create a position.
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Runtime state of a character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterState {
    /// Name shown in the dialog box
    pub name: String,
}

/// Runtime state of an image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageState {
    /// Image source
    pub src: String,
    /// Whether the image is on stage
    pub visible: bool,
    /// Current position
    pub position: Position,
}

/// Runtime state of a sound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoundState {
    /// Audio source
    pub src: String,
    /// Whether the sound is playing
    pub playing: bool,
    /// Volume in `0.0..=1.0`
    pub volume: f64,
}

/// Runtime state of a scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneState {
    /// Current background source
    pub background: Option<String>,
    /// Current background music source
    pub music: Option<String>,
}

/// Runtime state of any element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ElementState {
    /// Character state
    Character(CharacterState),
    /// Image state
    Image(ImageState),
    /// Sound state
    Sound(SoundState),
    /// Scene state
    Scene(SceneState),
}

impl ElementState {
    /// Diff this state against `initial`, producing a JSON patch of changed fields.
    ///
    /// Returns `None` when nothing changed, so empty patches never reach a save file.
    pub fn to_data(&self, initial: &ElementState) -> Result<Option<JsonValue>, JsonError> {
        let current = object_of(self)?;
        let baseline = object_of(initial)?;
        let patch: Map<String, JsonValue> = current
            .into_iter()
            .filter(|(key, value)| baseline.get(key) != Some(value))
            .collect();
        if patch.is_empty() {
            Ok(None)
        } else {
            Ok(Some(JsonValue::Object(patch)))
        }
    }

    /// Rebuild a state by applying a patch produced by [`to_data`](Self::to_data) on top of `initial`.
    pub fn from_data(initial: &ElementState, patch: &JsonValue) -> Result<ElementState, JsonError> {
        let JsonValue::Object(fields) = patch else {
            return Err(JsonError::new("element patch must be a JSON object"));
        };
        let mut merged = object_of(initial)?;
        for (key, value) in fields {
            if key == "kind" && merged.get("kind") != Some(value) {
                return Err(JsonError::new(format!("element patch changes kind to {}", value)).at("kind"));
            }
            merged.insert(key.clone(), value.clone());
        }
        from_object(merged)
    }

    /// Character state, if this is a character.
    pub fn as_character(&self) -> Option<&CharacterState> {
        match self {
            Self::Character(state) => Some(state),
            _ => None,
        }
    }

    /// Image state, if this is an image.
    pub fn as_image(&self) -> Option<&ImageState> {
        match self {
            Self::Image(state) => Some(state),
            _ => None,
        }
    }

    /// Sound state, if this is a sound.
    pub fn as_sound(&self) -> Option<&SoundState> {
        match self {
            Self::Sound(state) => Some(state),
            _ => None,
        }
    }

    /// Scene state, if this is a scene.
    pub fn as_scene(&self) -> Option<&SceneState> {
        match self {
            Self::Scene(state) => Some(state),
            _ => None,
        }
    }
}

fn object_of(state: &ElementState) -> Result<Map<String, JsonValue>, JsonError> {
    match serde_json::to_value(state)? {
        JsonValue::Object(map) => Ok(map),
        other => Err(JsonError::new(format!("element state serialized to {}", other))),
    }
}

fn from_object<T: DeserializeOwned>(map: Map<String, JsonValue>) -> Result<T, JsonError> {
    Ok(serde_json::from_value(JsonValue::Object(map))?)
}

/// What kind of element an id refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ElementKind {
    /// A speaking character
    Character,
    /// A displayable image
    Image,
    /// A playable sound
    Sound,
    /// A scene
    Scene,
}

/// Static definition of an element registered on a story.
#[derive(Debug, Clone, PartialEq, derive_getters::Getters)]
pub struct ElementDef {
    /// Element id
    id: ElementId,
    /// Authoring name
    name: String,
    /// Element kind
    kind: ElementKind,
    /// State the element starts every game with
    initial: ElementState,
}

impl ElementDef {
    pub(crate) fn new(id: ElementId, name: String, kind: ElementKind, initial: ElementState) -> Self {
        Self {
            id,
            name,
            kind,
            initial,
        }
    }
}

/// Handle to a character, used by the script builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CharacterHandle {
    pub(crate) id: ElementId,
    pub(crate) owner: StoryKey,
}

/// Handle to an image, used by the script builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageHandle {
    pub(crate) id: ElementId,
    pub(crate) owner: StoryKey,
}

/// Handle to a sound, used by the script builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SoundHandle {
    pub(crate) id: ElementId,
    pub(crate) owner: StoryKey,
}

/// Handle to a scene, used by the script builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SceneHandle {
    pub(crate) id: SceneId,
    pub(crate) element: ElementId,
    pub(crate) owner: StoryKey,
}

macro_rules! element_handle_ids {
    ($($handle:ident),*) => {
        $(
            impl $handle {
                /// Element id behind this handle.
                pub fn id(&self) -> ElementId {
                    self.id
                }
            }
        )*
    };
}

element_handle_ids!(CharacterHandle, ImageHandle, SoundHandle);

impl SceneHandle {
    /// Scene id behind this handle.
    pub fn id(&self) -> SceneId {
        self.id
    }

    /// Element id holding the scene state.
    pub fn element(&self) -> ElementId {
        self.element
    }
}

/// Image configuration used at registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Image source
    pub src: String,
    /// Initial position
    #[serde(default)]
    pub position: Position,
    /// Whether the image starts on stage
    #[serde(default)]
    pub visible: bool,
}

impl ImageConfig {
    /// Hidden image at the origin.
    pub fn new(src: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            position: Position::default(),
            visible: false,
        }
    }

    /// Start at the given position.
    pub fn with_position(mut self, position: Position) -> Self {
        self.position = position;
        self
    }
}

/// Scene configuration used at registration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneConfig {
    /// Background shown when the scene is entered
    #[serde(default)]
    pub background: Option<String>,
    /// Music started when the scene is entered
    #[serde(default)]
    pub music: Option<String>,
}

impl SceneConfig {
    /// Set the initial background.
    pub fn with_background(mut self, src: impl Into<String>) -> Self {
        self.background = Some(src.into());
        self
    }

    /// Set the initial music.
    pub fn with_music(mut self, src: impl Into<String>) -> Self {
        self.music = Some(src.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn image() -> ElementState {
        ElementState::Image(ImageState {
            src: "door.png".to_string(),
            visible: false,
            position: Position::default(),
        })
    }

    #[test]
    fn unchanged_state_has_no_patch() {
        assert_eq!(image().to_data(&image()).unwrap(), None);
    }

    #[test]
    fn patch_contains_only_changed_fields() {
        let mut current = image();
        if let ElementState::Image(state) = &mut current {
            state.visible = true;
        }
        let patch = current.to_data(&image()).unwrap().unwrap();
        assert_eq!(patch, json!({ "visible": true }));

        let restored = ElementState::from_data(&image(), &patch).unwrap();
        assert_eq!(restored, current);
    }

    #[test]
    fn patch_cannot_change_kind() {
        let err = ElementState::from_data(&image(), &json!({ "kind": "sound" }));
        assert!(err.is_err());
        assert!(ElementState::from_data(&image(), &json!([1, 2])).is_err());
    }
}
