//! Scenes and their preload sources.

use crate::{ActionId, ElementId, SceneConfig, SceneId};
use libretto_error::{StaticScriptWarning, StaticScriptWarningKind};
use serde::{Deserialize, Serialize};

/// Asset sources a scene needs before it is shown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneSources {
    /// Image sources, deduplicated, in discovery order
    pub images: Vec<String>,
    /// Audio sources, deduplicated, in discovery order
    pub sounds: Vec<String>,
}

impl SceneSources {
    /// Record an image source.
    pub fn add_image(&mut self, src: impl Into<String>) {
        push_unique(&mut self.images, src.into());
    }

    /// Record an audio source.
    pub fn add_sound(&mut self, src: impl Into<String>) {
        push_unique(&mut self.sounds, src.into());
    }

    /// Merge another set of sources.
    pub fn merge(&mut self, other: SceneSources) {
        for src in other.images {
            self.add_image(src);
        }
        for src in other.sounds {
            self.add_sound(src);
        }
    }

    /// Whether no source was recorded.
    pub fn is_empty(&self) -> bool {
        self.images.is_empty() && self.sounds.is_empty()
    }
}

fn push_unique(list: &mut Vec<String>, src: String) {
    if !list.contains(&src) {
        list.push(src);
    }
}

/// A named scene of a story.
#[derive(Debug, Clone, derive_getters::Getters)]
pub struct Scene {
    /// Scene id
    id: SceneId,
    /// Unique scene name
    name: String,
    /// Element holding the scene's runtime state
    element: ElementId,
    /// Registration settings
    config: SceneConfig,
    #[getter(skip)]
    root: Option<ActionId>,
    #[getter(skip)]
    scripted: bool,
    /// Images mounted into this scene
    mounted: Vec<ElementId>,
    #[getter(skip)]
    sources: SceneSources,
}

impl Scene {
    pub(crate) fn new(id: SceneId, name: String, element: ElementId, config: SceneConfig) -> Self {
        let mut sources = SceneSources::default();
        if let Some(background) = &config.background {
            sources.add_image(background.clone());
        }
        if let Some(music) = &config.music {
            sources.add_sound(music.clone());
        }
        Self {
            id,
            name,
            element,
            config,
            root: None,
            scripted: false,
            mounted: Vec::new(),
            sources,
        }
    }

    /// Root action, once built.
    pub fn root(&self) -> Option<ActionId> {
        self.root
    }

    /// Whether a script was attached.
    pub fn is_scripted(&self) -> bool {
        self.scripted
    }

    /// Sources registered directly on the scene: its background, music and mounted images.
    pub fn sources(&self) -> &SceneSources {
        &self.sources
    }

    pub(crate) fn set_root(&mut self, root: ActionId) {
        self.root = Some(root);
    }

    pub(crate) fn mark_scripted(&mut self) -> Result<(), StaticScriptWarning> {
        if self.scripted {
            return Err(StaticScriptWarning::new(
                StaticScriptWarningKind::SceneScriptedTwice(self.name.clone()),
            ));
        }
        self.scripted = true;
        Ok(())
    }

    pub(crate) fn mount(
        &mut self,
        image: ElementId,
        image_name: &str,
        src: &str,
    ) -> Result<(), StaticScriptWarning> {
        if self.mounted.contains(&image) {
            return Err(StaticScriptWarning::new(
                StaticScriptWarningKind::DuplicateMount {
                    image: image_name.to_string(),
                    scene: self.name.clone(),
                },
            ));
        }
        self.mounted.push(image);
        self.sources.add_image(src);
        Ok(())
    }
}
