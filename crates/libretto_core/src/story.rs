//! Story registry, construction and graph traversal.

use crate::{
    Action, ActionArena, ActionContent, ActionId, Actions, CallSite, Callee, CharacterHandle,
    CharacterState, ElementDef, ElementId, ElementKind, ElementState, IdAllocator, ImageConfig,
    ImageHandle, ImageOp, ImageState, Scene, SceneConfig, SceneHandle, SceneId, SceneOp,
    SceneSources, SceneState, ScriptBuilder, SoundHandle, SoundOp, SoundState, StoryKey,
};
use libretto_error::{LibrettoResult, StaticScriptWarning, StaticScriptWarningKind};
use std::collections::VecDeque;
use tracing::{debug, warn};

/// Default bound on how many jumps away from the entry a scene may be.
pub const MAX_DEPTH: usize = 500;

/// A complete narrative: elements, scenes, their scripts and an entry point.
///
/// Stories are built in two phases. Registration and scripting allocate actions
/// and link each scene's chain; [`construct`](Story::construct) then walks every
/// scene reachable from the entry, validates it and freezes the story.
///
/// # Examples
///
/// ```
/// use libretto_core::{actions, SceneConfig, Story};
///
/// # fn main() -> libretto_error::LibrettoResult<()> {
/// let mut story = Story::new("demo");
/// let alice = story.character("Alice");
/// let intro = story.scene("intro", SceneConfig::default())?;
/// story.script(&intro, |b| actions![b.character(&alice).say("Hello!")])?;
/// story.entry(&intro)?;
/// story.construct()?;
///
/// assert!(story.is_constructed());
/// assert_eq!(story.get_all_children(story.entry_root().unwrap()).len(), 2);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Story {
    name: String,
    key: StoryKey,
    ids: IdAllocator,
    arena: ActionArena,
    elements: Vec<ElementDef>,
    scenes: Vec<Scene>,
    entry: Option<SceneId>,
    constructed: bool,
    max_depth: usize,
}

impl Story {
    /// Empty story.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: StoryKey::next(),
            ids: IdAllocator::default(),
            arena: ActionArena::default(),
            elements: Vec::new(),
            scenes: Vec::new(),
            entry: None,
            constructed: false,
            max_depth: MAX_DEPTH,
        }
    }

    /// Override the scene depth bound used by [`construct`](Story::construct).
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Story name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tag carried by every handle this story issues.
    pub fn key(&self) -> StoryKey {
        self.key
    }

    /// Whether [`construct`](Story::construct) succeeded.
    pub fn is_constructed(&self) -> bool {
        self.constructed
    }

    /// Scene depth bound.
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    fn register(&mut self, name: String, kind: ElementKind, initial: ElementState) -> ElementId {
        let id = self.ids.next_element();
        debug!(element = %id, %kind, name = %name, "Registered element");
        self.elements.push(ElementDef::new(id, name, kind, initial));
        id
    }

    /// Register a character.
    pub fn character(&mut self, name: impl Into<String>) -> CharacterHandle {
        let name = name.into();
        let initial = ElementState::Character(CharacterState { name: name.clone() });
        CharacterHandle {
            id: self.register(name, ElementKind::Character, initial),
            owner: self.key,
        }
    }

    /// Register an image.
    pub fn image(&mut self, name: impl Into<String>, config: ImageConfig) -> ImageHandle {
        let initial = ElementState::Image(ImageState {
            src: config.src,
            visible: config.visible,
            position: config.position,
        });
        ImageHandle {
            id: self.register(name.into(), ElementKind::Image, initial),
            owner: self.key,
        }
    }

    /// Register a sound.
    pub fn sound(&mut self, name: impl Into<String>, src: impl Into<String>) -> SoundHandle {
        let initial = ElementState::Sound(SoundState {
            src: src.into(),
            playing: false,
            volume: 1.0,
        });
        SoundHandle {
            id: self.register(name.into(), ElementKind::Sound, initial),
            owner: self.key,
        }
    }

    /// Register a scene under a unique name.
    #[track_caller]
    pub fn scene(&mut self, name: impl Into<String>, config: SceneConfig) -> LibrettoResult<SceneHandle> {
        let call_site = CallSite::here();
        self.ensure_open()?;
        let name = name.into();
        if self.scene_named(&name).is_some() {
            return Err(StaticScriptWarning::new(StaticScriptWarningKind::DuplicateSceneName(name))
                .with_call_site(call_site.to_string())
                .into());
        }
        let initial = ElementState::Scene(SceneState {
            background: config.background.clone(),
            music: config.music.clone(),
        });
        let element = self.register(name.clone(), ElementKind::Scene, initial);
        let id = self.ids.next_scene();
        self.scenes.push(Scene::new(id, name, element, config));
        Ok(SceneHandle {
            id,
            element,
            owner: self.key,
        })
    }

    /// Mount an image into a scene so it is preloaded with it.
    #[track_caller]
    pub fn mount(&mut self, scene: &SceneHandle, image: &ImageHandle) -> LibrettoResult<()> {
        let call_site = CallSite::here();
        self.ensure_open()?;
        self.check_scene_owner(scene)
            .and_then(|()| self.check_element_owner(image.owner, image.id))
            .and_then(|()| self.mount_image(scene.id, image.id))
            .map_err(|warning| warning.with_call_site(call_site.to_string()))?;
        Ok(())
    }

    pub(crate) fn mount_image(
        &mut self,
        scene: SceneId,
        image: ElementId,
    ) -> Result<(), StaticScriptWarning> {
        let (name, src) = self
            .element(image)
            .and_then(|def| {
                def.initial()
                    .as_image()
                    .map(|state| (def.name().clone(), state.src.clone()))
            })
            .ok_or_else(|| {
                StaticScriptWarning::new(StaticScriptWarningKind::UnknownElement(image.to_string()))
            })?;
        let def = self.scenes.get_mut(scene.index()).ok_or_else(|| unknown_scene(scene))?;
        def.mount(image, &name, &src)
    }

    /// Attach the script of a scene. Each scene is scripted exactly once.
    ///
    /// # Errors
    ///
    /// Returns the first authoring mistake found while running `f`.
    #[track_caller]
    pub fn script(
        &mut self,
        scene: &SceneHandle,
        f: impl FnOnce(&mut ScriptBuilder<'_>) -> Actions,
    ) -> LibrettoResult<()> {
        let call_site = CallSite::here();
        self.ensure_open()?;
        self.check_scene_owner(scene)
            .map_err(|warning| warning.with_call_site(call_site.to_string()))?;
        let def = self
            .scenes
            .get_mut(scene.id.index())
            .ok_or_else(|| unknown_scene(scene.id))?;
        def.mark_scripted()
            .map_err(|warning| warning.with_call_site(call_site.to_string()))?;
        let root = self.scene_root_at(scene.id, call_site)?;

        let (list, warnings) = {
            let mut builder = ScriptBuilder::new(self, scene.id);
            let actions = f(&mut builder);
            (actions.flatten(), builder.into_warnings())
        };
        if let Some(warning) = warnings.into_iter().next() {
            return Err(warning.into());
        }

        let mut chain = Vec::with_capacity(list.len() + 1);
        chain.push(root);
        chain.extend(list);
        self.arena.construct(&chain, None)?;
        debug!(scene = %scene.id, actions = chain.len(), "Scene scripted");
        Ok(())
    }

    /// Set the entry scene.
    #[track_caller]
    pub fn entry(&mut self, scene: &SceneHandle) -> LibrettoResult<()> {
        self.ensure_open()?;
        self.check_scene_owner(scene)?;
        if scene.id.index() >= self.scenes.len() {
            return Err(unknown_scene(scene.id).into());
        }
        self.entry = Some(scene.id);
        Ok(())
    }

    /// Root action of a scene, built on first request.
    #[track_caller]
    pub fn construct_scene_root(&mut self, scene: SceneId) -> LibrettoResult<ActionId> {
        let call_site = CallSite::here();
        Ok(self.scene_root_at(scene, call_site)?)
    }

    fn scene_root_at(
        &mut self,
        scene: SceneId,
        call_site: CallSite,
    ) -> Result<ActionId, StaticScriptWarning> {
        let def = self.scenes.get(scene.index()).ok_or_else(|| unknown_scene(scene))?;
        if let Some(root) = def.root() {
            return Ok(root);
        }
        let root = self.arena.alloc(
            &mut self.ids,
            Callee::Scene(scene),
            ActionContent::Scene(SceneOp::Init),
            call_site,
        );
        self.scenes[scene.index()].set_root(root);
        Ok(root)
    }

    /// Resolve every scene reachable from the entry, validate it and freeze the story.
    ///
    /// Calling this again on a constructed story is a no-op.
    #[tracing::instrument(skip(self), fields(story = %self.name))]
    pub fn construct(&mut self) -> LibrettoResult<()> {
        if self.constructed {
            debug!("Story already constructed");
            return Ok(());
        }
        let entry = self
            .entry
            .ok_or_else(|| StaticScriptWarning::new(StaticScriptWarningKind::MissingEntry))?;

        let mut reached = vec![false; self.scenes.len()];
        reached[entry.index()] = true;
        let mut queue = VecDeque::from([(entry, 0usize)]);
        while let Some((scene, depth)) = queue.pop_front() {
            if depth > self.max_depth {
                return Err(StaticScriptWarning::new(StaticScriptWarningKind::DepthExceeded(
                    self.max_depth,
                ))
                .into());
            }
            let def = &self.scenes[scene.index()];
            let root = match (def.is_scripted(), def.root()) {
                (true, Some(root)) => root,
                _ => {
                    return Err(StaticScriptWarning::new(
                        StaticScriptWarningKind::UnscriptedScene(def.name().clone()),
                    )
                    .into());
                }
            };
            let mut targets = Vec::new();
            self.walk_scene(root, |action| targets.extend(action.content().jump_target()));
            for target in targets {
                let Some(seen) = reached.get_mut(target.index()) else {
                    return Err(unknown_scene(target).into());
                };
                if !*seen {
                    *seen = true;
                    queue.push_back((target, depth + 1));
                }
            }
        }

        for (scene, reached) in self.scenes.iter().zip(&reached) {
            if !reached {
                warn!(scene = %scene.name(), "Scene is not reachable from the entry scene");
            }
        }

        if cfg!(debug_assertions) {
            self.relabel();
        }
        self.constructed = true;
        debug!(
            actions = self.arena.len(),
            scenes = self.scenes.len(),
            "Story constructed"
        );
        Ok(())
    }

    /// Label every scripted action with its scene and position, for debugging.
    ///
    /// Only call-site labels change; ids and links are untouched.
    pub fn relabel(&mut self) {
        let mut labels = Vec::new();
        for scene in &self.scenes {
            let Some(root) = scene.root() else {
                continue;
            };
            let mut position = 0usize;
            self.walk_scene(root, |action| {
                labels.push((
                    *action.id(),
                    format!("{}#{} {}", scene.name(), position, action.action_type()),
                ));
                position += 1;
            });
        }
        for (id, label) in labels {
            if let Some(action) = self.arena.get_mut(id) {
                action.call_site_mut().set_label(label);
            }
        }
    }

    #[track_caller]
    pub(crate) fn check_scene_owner(&self, scene: &SceneHandle) -> Result<(), StaticScriptWarning> {
        if scene.owner != self.key {
            return Err(unknown_scene(scene.id));
        }
        Ok(())
    }

    #[track_caller]
    pub(crate) fn check_element_owner(
        &self,
        owner: StoryKey,
        element: ElementId,
    ) -> Result<(), StaticScriptWarning> {
        if owner != self.key {
            return Err(StaticScriptWarning::new(StaticScriptWarningKind::UnknownElement(
                element.to_string(),
            )));
        }
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), StaticScriptWarning> {
        if self.constructed {
            return Err(StaticScriptWarning::new(
                StaticScriptWarningKind::AlreadyConstructed(self.name.clone()),
            ));
        }
        Ok(())
    }

    pub(crate) fn alloc_action(
        &mut self,
        callee: Callee,
        content: ActionContent,
        call_site: CallSite,
    ) -> ActionId {
        self.arena.alloc(&mut self.ids, callee, content, call_site)
    }

    pub(crate) fn arena_mut(&mut self) -> &mut ActionArena {
        &mut self.arena
    }

    /// The action arena.
    pub fn arena(&self) -> &ActionArena {
        &self.arena
    }

    /// Look up an action.
    pub fn action(&self, id: ActionId) -> Option<&Action> {
        self.arena.get(id)
    }

    /// Number of actions in the story.
    pub fn action_count(&self) -> usize {
        self.arena.len()
    }

    /// Look up an element.
    pub fn element(&self, id: ElementId) -> Option<&ElementDef> {
        self.elements.get(id.index())
    }

    /// All elements in id order.
    pub fn elements(&self) -> &[ElementDef] {
        &self.elements
    }

    /// First element registered under `name`.
    pub fn element_named(&self, name: &str) -> Option<&ElementDef> {
        self.elements.iter().find(|def| def.name() == name)
    }

    /// Look up a scene.
    pub fn scene_by_id(&self, id: SceneId) -> Option<&Scene> {
        self.scenes.get(id.index())
    }

    /// Look up a scene by name.
    pub fn scene_named(&self, name: &str) -> Option<&Scene> {
        self.scenes.iter().find(|scene| scene.name() == name)
    }

    /// All scenes in id order.
    pub fn scenes(&self) -> &[Scene] {
        &self.scenes
    }

    /// Entry scene.
    pub fn entry_scene(&self) -> Option<SceneId> {
        self.entry
    }

    /// Root action of the entry scene.
    pub fn entry_root(&self) -> Option<ActionId> {
        self.entry.and_then(|scene| self.scene_root(scene))
    }

    /// Root action of a scene.
    pub fn scene_root(&self, scene: SceneId) -> Option<ActionId> {
        self.scene_by_id(scene).and_then(Scene::root)
    }

    /// Element holding the runtime state a callee acts on.
    pub fn callee_element(&self, callee: &Callee) -> Option<ElementId> {
        match callee {
            Callee::Element(id) => Some(*id),
            Callee::Scene(scene) => self.scene_by_id(*scene).map(|def| *def.element()),
            _ => None,
        }
    }

    /// Visit every action reachable from `from` exactly once, breadth first.
    ///
    /// Follows child links, every branch and scene jumps.
    pub fn for_each_child(&self, from: ActionId, mut f: impl FnMut(&Action)) {
        self.bfs(from, true, &mut f);
    }

    /// Ids of every action reachable from `from`, in visit order.
    pub fn get_all_children(&self, from: ActionId) -> Vec<ActionId> {
        let mut ids = Vec::new();
        self.for_each_child(from, |action| ids.push(*action.id()));
        ids
    }

    /// Elements acted on by any action reachable from `from`, deduplicated.
    pub fn get_all_children_elements(&self, from: ActionId) -> Vec<ElementId> {
        let mut ids: Vec<ElementId> = Vec::new();
        self.for_each_child(from, |action| {
            if let Some(element) = self.callee_element(action.callee()) {
                if !ids.contains(&element) {
                    ids.push(element);
                }
            }
        });
        ids
    }

    fn walk_scene(&self, root: ActionId, mut f: impl FnMut(&Action)) {
        self.bfs(root, false, &mut f);
    }

    fn bfs(&self, from: ActionId, follow_jumps: bool, f: &mut dyn FnMut(&Action)) {
        let mut visited = vec![false; self.arena.len()];
        let mut queue = VecDeque::from([from]);
        while let Some(id) = queue.pop_front() {
            let Some(seen) = visited.get_mut(id.index()) else {
                continue;
            };
            if *seen {
                continue;
            }
            *seen = true;
            let Some(action) = self.arena.get(id) else {
                continue;
            };
            f(action);
            queue.extend(action.child());
            queue.extend(action.content().branch_heads());
            if follow_jumps {
                if let Some(target) = action.content().jump_target() {
                    queue.extend(self.scene_root(target));
                }
            }
        }
    }

    /// Sources an action needs on screen or in the mixer.
    pub fn action_sources(&self, action: &Action) -> SceneSources {
        let mut sources = SceneSources::default();
        let element_state = action
            .callee()
            .element()
            .and_then(|id| self.element(id))
            .map(ElementDef::initial);
        match action.content() {
            ActionContent::Image(ImageOp::SetSource(src)) => sources.add_image(src.clone()),
            ActionContent::Image(_) => {
                if let Some(state) = element_state.and_then(ElementState::as_image) {
                    sources.add_image(state.src.clone());
                }
            }
            ActionContent::Sound(SoundOp::Play { .. }) => {
                if let Some(state) = element_state.and_then(ElementState::as_sound) {
                    sources.add_sound(state.src.clone());
                }
            }
            ActionContent::Scene(SceneOp::SetBackground(Some(src))) => {
                sources.add_image(src.clone())
            }
            ActionContent::Scene(SceneOp::SetMusic(Some(src))) => sources.add_sound(src.clone()),
            ActionContent::Scene(SceneOp::Init) => {
                if let Callee::Scene(scene) = action.callee() {
                    if let Some(def) = self.scene_by_id(*scene) {
                        sources.merge(def.sources().clone());
                    }
                }
            }
            _ => {}
        }
        sources
    }

    /// Every source a scene may need: its own registrations plus those used by its script.
    pub fn preload_sources(&self, scene: SceneId) -> SceneSources {
        let Some(def) = self.scene_by_id(scene) else {
            return SceneSources::default();
        };
        let mut sources = def.sources().clone();
        if let Some(root) = def.root() {
            self.walk_scene(root, |action| sources.merge(self.action_sources(action)));
        }
        sources
    }
}

fn unknown_scene(scene: SceneId) -> StaticScriptWarning {
    StaticScriptWarning::new(StaticScriptWarningKind::UnknownScene(scene.to_string()))
}
