//! Fluent script builder.
//!
//! A [`ScriptBuilder`] is handed to the closure passed to [`Story::script`]. Element
//! accessors return a [`Chained`] value: every element method appends one action to the
//! pending chain and hands the chain back, so calls read in story order. Menus and
//! conditions are drafts that allocate their action when converted into [`Actions`].
//!
//! Authoring mistakes found while building are collected and reported by
//! [`Story::script`] once the closure returns.

use crate::{
    ActionContent, ActionId, CallSite, Callee, CharacterHandle, CharacterOp, Choice,
    ConditionBranch, ConditionContent, ControlOp, ElementId, ImageHandle, ImageOp, Lambda,
    LambdaCtx, MenuContent, Position, SceneHandle, SceneId, SceneOp, ScriptCtx, ScriptFn,
    SoundHandle, SoundOp, Story, StoryKey,
};
use libretto_error::{StaticScriptWarning, StaticScriptWarningKind};
use std::ops::Deref;

/// Ordered list of actions produced by script authoring.
///
/// Nested lists and pending chains flatten into one list in authoring order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Actions {
    items: Vec<ActionId>,
}

impl Actions {
    /// Empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one action.
    pub fn push(&mut self, action: ActionId) {
        self.items.push(action);
    }

    /// Append another list.
    pub fn extend(&mut self, other: Actions) {
        self.items.extend(other.items);
    }

    /// Flat action list in authoring order.
    pub fn flatten(self) -> Vec<ActionId> {
        self.items
    }

    /// Number of actions.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterate in authoring order.
    pub fn iter(&self) -> impl Iterator<Item = &ActionId> {
        self.items.iter()
    }
}

impl From<ActionId> for Actions {
    fn from(action: ActionId) -> Self {
        Self {
            items: vec![action],
        }
    }
}

impl From<Vec<ActionId>> for Actions {
    fn from(items: Vec<ActionId>) -> Self {
        Self { items }
    }
}

impl From<Vec<Actions>> for Actions {
    fn from(lists: Vec<Actions>) -> Self {
        let mut flat = Actions::new();
        for list in lists {
            flat.extend(list);
        }
        flat
    }
}

/// Build an [`Actions`] list from chains, drafts, ids and nested lists.
///
/// Each item is converted before the next one is evaluated, so items may all
/// borrow the same [`ScriptBuilder`].
#[macro_export]
macro_rules! actions {
    () => {
        $crate::Actions::new()
    };
    ($($item:expr),+ $(,)?) => {{
        let mut list = $crate::Actions::new();
        $( list.extend($crate::Actions::from($item)); )+
        list
    }};
}

/// Builder handed to script closures. Borrows the story for the duration of the script.
pub struct ScriptBuilder<'s> {
    story: &'s mut Story,
    scene: SceneId,
    warnings: Vec<StaticScriptWarning>,
}

impl<'s> ScriptBuilder<'s> {
    pub(crate) fn new(story: &'s mut Story, scene: SceneId) -> Self {
        Self {
            story,
            scene,
            warnings: Vec::new(),
        }
    }

    pub(crate) fn into_warnings(self) -> Vec<StaticScriptWarning> {
        self.warnings
    }

    /// Scene being scripted.
    pub fn scene_id(&self) -> SceneId {
        self.scene
    }

    pub(crate) fn warn(&mut self, warning: StaticScriptWarning) {
        self.warnings.push(warning);
    }

    fn push(&mut self, callee: Callee, content: ActionContent, call_site: CallSite) -> ActionId {
        self.story.alloc_action(callee, content, call_site)
    }

    /// Link a sub-chain that ends without a continuation; returns its head.
    fn block(&mut self, actions: Actions) -> Option<ActionId> {
        let list = actions.flatten();
        match self.story.arena_mut().construct(&list, None) {
            Ok(head) => head,
            Err(warning) => {
                self.warn(warning);
                list.first().copied()
            }
        }
    }

    /// Start a chain on a character.
    #[track_caller]
    pub fn character(&mut self, handle: &CharacterHandle) -> Chained<'_, 's, CharacterHandle> {
        self.check_element(handle.owner, handle.id, CallSite::here());
        Chained::new(self, *handle)
    }

    /// Start a chain on an image.
    #[track_caller]
    pub fn image(&mut self, handle: &ImageHandle) -> Chained<'_, 's, ImageHandle> {
        self.check_element(handle.owner, handle.id, CallSite::here());
        Chained::new(self, *handle)
    }

    /// Start a chain on a sound.
    #[track_caller]
    pub fn sound(&mut self, handle: &SoundHandle) -> Chained<'_, 's, SoundHandle> {
        self.check_element(handle.owner, handle.id, CallSite::here());
        Chained::new(self, *handle)
    }

    /// Start a chain on a scene.
    #[track_caller]
    pub fn scene(&mut self, handle: &SceneHandle) -> Chained<'_, 's, SceneHandle> {
        let call_site = CallSite::here();
        if let Err(warning) = self.story.check_scene_owner(handle) {
            self.warn(warning.with_call_site(call_site.to_string()));
        }
        Chained::new(self, *handle)
    }

    fn check_element(&mut self, owner: StoryKey, element: ElementId, call_site: CallSite) {
        if let Err(warning) = self.story.check_element_owner(owner, element) {
            self.warn(warning.with_call_site(call_site.to_string()));
        }
    }

    /// Mount an image into the scene being scripted, so it is preloaded with the scene.
    #[track_caller]
    pub fn mount(&mut self, image: &ImageHandle) -> Actions {
        let call_site = CallSite::here();
        let mounted = self
            .story
            .check_element_owner(image.owner, image.id)
            .and_then(|()| self.story.mount_image(self.scene, image.id));
        if let Err(warning) = mounted {
            self.warn(warning.with_call_site(call_site.to_string()));
        }
        Actions::new()
    }

    /// Start a menu.
    #[track_caller]
    pub fn menu(&mut self) -> MenuDraft<'_, 's> {
        MenuDraft {
            call_site: CallSite::here(),
            builder: self,
            prompt: None,
            choices: Vec::new(),
        }
    }

    /// Start a condition.
    #[track_caller]
    pub fn condition(&mut self) -> ConditionDraft<'_, 's> {
        ConditionDraft {
            call_site: CallSite::here(),
            builder: self,
            branches: Vec::new(),
            otherwise: None,
            has_else: false,
            error: None,
        }
    }

    /// Run a block, then continue after it.
    #[track_caller]
    pub fn do_(&mut self, f: impl FnOnce(&mut ScriptBuilder<'s>) -> Actions) -> ActionId {
        let call_site = CallSite::here();
        let actions = f(self);
        let head = self.block(actions);
        self.push(Callee::Control, ActionContent::Control(ControlOp::Do(head)), call_site)
    }

    /// Start a block in the background and continue immediately.
    #[track_caller]
    pub fn do_async(&mut self, f: impl FnOnce(&mut ScriptBuilder<'s>) -> Actions) -> ActionId {
        let call_site = CallSite::here();
        let actions = f(self);
        let head = self.block(actions);
        self.push(
            Callee::Control,
            ActionContent::Control(ControlOp::DoAsync(head)),
            call_site,
        )
    }

    /// Start every block concurrently and continue once all of them finished.
    #[track_caller]
    pub fn all(&mut self, f: impl FnOnce(&mut ScriptBuilder<'s>) -> Vec<Actions>) -> ActionId {
        let call_site = CallSite::here();
        let heads = self.blocks(f);
        self.push(Callee::Control, ActionContent::Control(ControlOp::All(heads)), call_site)
    }

    /// Start every block concurrently and continue once the first one finished.
    #[track_caller]
    pub fn any(&mut self, f: impl FnOnce(&mut ScriptBuilder<'s>) -> Vec<Actions>) -> ActionId {
        let call_site = CallSite::here();
        let heads = self.blocks(f);
        self.push(Callee::Control, ActionContent::Control(ControlOp::Any(heads)), call_site)
    }

    fn blocks(&mut self, f: impl FnOnce(&mut ScriptBuilder<'s>) -> Vec<Actions>) -> Vec<ActionId> {
        let lists = f(self);
        lists
            .into_iter()
            .filter_map(|actions| self.block(actions))
            .collect()
    }

    /// Run a block `times` times, then continue.
    #[track_caller]
    pub fn repeat(
        &mut self,
        times: u32,
        f: impl FnOnce(&mut ScriptBuilder<'s>) -> Actions,
    ) -> ActionId {
        let call_site = CallSite::here();
        let actions = f(self);
        let head = self.block(actions);
        self.push(
            Callee::Control,
            ActionContent::Control(ControlOp::Repeat { times, head }),
            call_site,
        )
    }

    /// Wait for the host timer.
    #[track_caller]
    pub fn sleep(&mut self, millis: u64) -> ActionId {
        let call_site = CallSite::here();
        self.push(
            Callee::Control,
            ActionContent::Control(ControlOp::Sleep(millis)),
            call_site,
        )
    }

    /// Run a closure against the story variables. Its writes are reverted on undo.
    #[track_caller]
    pub fn script(&mut self, f: impl Fn(&mut ScriptCtx<'_>) + 'static) -> ActionId {
        let call_site = CallSite::here();
        self.push(
            Callee::Script,
            ActionContent::Script(ScriptFn::new(f)),
            call_site,
        )
    }
}

/// A pending chain on one element.
///
/// Dereferences to the element handle, so handle accessors stay available mid-chain.
pub struct Chained<'b, 's, E> {
    builder: &'b mut ScriptBuilder<'s>,
    element: E,
    pending: Vec<ActionId>,
}

impl<'b, 's, E> Chained<'b, 's, E> {
    fn new(builder: &'b mut ScriptBuilder<'s>, element: E) -> Self {
        Self {
            builder,
            element,
            pending: Vec::new(),
        }
    }

    /// Append already-built actions to the chain.
    pub fn chain(mut self, actions: impl Into<Actions>) -> Self {
        self.pending.extend(actions.into().flatten());
        self
    }

    /// Actions queued so far.
    pub fn pending(&self) -> &[ActionId] {
        &self.pending
    }

    /// The element this chain acts on.
    pub fn element(&self) -> &E {
        &self.element
    }

    fn append(mut self, callee: Callee, content: ActionContent, call_site: CallSite) -> Self {
        let id = self.builder.push(callee, content, call_site);
        self.pending.push(id);
        self
    }
}

impl<E> Deref for Chained<'_, '_, E> {
    type Target = E;

    fn deref(&self) -> &E {
        &self.element
    }
}

impl<E> From<Chained<'_, '_, E>> for Actions {
    fn from(chained: Chained<'_, '_, E>) -> Self {
        Actions::from(chained.pending)
    }
}

impl Chained<'_, '_, CharacterHandle> {
    /// Show a line of dialog and wait for the player.
    #[track_caller]
    pub fn say(self, text: impl Into<String>) -> Self {
        let callee = Callee::Element(self.element.id);
        self.append(
            callee,
            ActionContent::Character(CharacterOp::Say(text.into())),
            CallSite::here(),
        )
    }

    /// Change the displayed name.
    #[track_caller]
    pub fn set_name(self, name: impl Into<String>) -> Self {
        let callee = Callee::Element(self.element.id);
        self.append(
            callee,
            ActionContent::Character(CharacterOp::SetName(name.into())),
            CallSite::here(),
        )
    }
}

impl Chained<'_, '_, ImageHandle> {
    /// Put the image on stage.
    #[track_caller]
    pub fn show(self) -> Self {
        let callee = Callee::Element(self.element.id);
        self.append(callee, ActionContent::Image(ImageOp::Show), CallSite::here())
    }

    /// Take the image off stage.
    #[track_caller]
    pub fn hide(self) -> Self {
        let callee = Callee::Element(self.element.id);
        self.append(callee, ActionContent::Image(ImageOp::Hide), CallSite::here())
    }

    /// Swap the image source.
    #[track_caller]
    pub fn set_src(self, src: impl Into<String>) -> Self {
        let callee = Callee::Element(self.element.id);
        self.append(
            callee,
            ActionContent::Image(ImageOp::SetSource(src.into())),
            CallSite::here(),
        )
    }

    /// Move the image.
    #[track_caller]
    pub fn set_position(self, position: Position) -> Self {
        let callee = Callee::Element(self.element.id);
        self.append(
            callee,
            ActionContent::Image(ImageOp::SetPosition(position)),
            CallSite::here(),
        )
    }
}

impl Chained<'_, '_, SoundHandle> {
    /// Start playback and continue immediately.
    #[track_caller]
    pub fn play(self) -> Self {
        let callee = Callee::Element(self.element.id);
        self.append(
            callee,
            ActionContent::Sound(SoundOp::Play { wait: false }),
            CallSite::here(),
        )
    }

    /// Start playback and wait until the audio layer reports the end.
    #[track_caller]
    pub fn play_and_wait(self) -> Self {
        let callee = Callee::Element(self.element.id);
        self.append(
            callee,
            ActionContent::Sound(SoundOp::Play { wait: true }),
            CallSite::here(),
        )
    }

    /// Stop playback.
    #[track_caller]
    pub fn stop(self) -> Self {
        let callee = Callee::Element(self.element.id);
        self.append(callee, ActionContent::Sound(SoundOp::Stop), CallSite::here())
    }

    /// Change the volume, clamped to `0.0..=1.0`.
    #[track_caller]
    pub fn set_volume(self, volume: f64) -> Self {
        let callee = Callee::Element(self.element.id);
        self.append(
            callee,
            ActionContent::Sound(SoundOp::SetVolume(volume.clamp(0.0, 1.0))),
            CallSite::here(),
        )
    }
}

impl Chained<'_, '_, SceneHandle> {
    /// Continue at this scene's root.
    #[track_caller]
    pub fn jump(self) -> Self {
        let target = self.element.id;
        let callee = Callee::Scene(self.builder.scene);
        self.append(
            callee,
            ActionContent::Scene(SceneOp::JumpTo(target)),
            CallSite::here(),
        )
    }

    /// Replace this scene's background.
    #[track_caller]
    pub fn set_background(self, src: impl Into<String>) -> Self {
        let callee = Callee::Scene(self.element.id);
        self.append(
            callee,
            ActionContent::Scene(SceneOp::SetBackground(Some(src.into()))),
            CallSite::here(),
        )
    }

    /// Remove this scene's background.
    #[track_caller]
    pub fn clear_background(self) -> Self {
        let callee = Callee::Scene(self.element.id);
        self.append(
            callee,
            ActionContent::Scene(SceneOp::SetBackground(None)),
            CallSite::here(),
        )
    }

    /// Replace this scene's music.
    #[track_caller]
    pub fn set_music(self, src: impl Into<String>) -> Self {
        let callee = Callee::Scene(self.element.id);
        self.append(
            callee,
            ActionContent::Scene(SceneOp::SetMusic(Some(src.into()))),
            CallSite::here(),
        )
    }

    /// Stop this scene's music.
    #[track_caller]
    pub fn stop_music(self) -> Self {
        let callee = Callee::Scene(self.element.id);
        self.append(
            callee,
            ActionContent::Scene(SceneOp::SetMusic(None)),
            CallSite::here(),
        )
    }
}

/// Menu being authored. Converting it into [`Actions`] allocates the menu action.
pub struct MenuDraft<'b, 's> {
    builder: &'b mut ScriptBuilder<'s>,
    call_site: CallSite,
    prompt: Option<String>,
    choices: Vec<Choice>,
}

impl<'s> MenuDraft<'_, 's> {
    /// Line shown above the choices.
    pub fn prompt(mut self, text: impl Into<String>) -> Self {
        self.prompt = Some(text.into());
        self
    }

    /// Add a choice.
    pub fn choose(
        self,
        text: impl Into<String>,
        f: impl FnOnce(&mut ScriptBuilder<'s>) -> Actions,
    ) -> Self {
        self.add_choice(text.into(), None, f)
    }

    /// Add a choice offered only while `guard` holds.
    pub fn choose_if(
        self,
        text: impl Into<String>,
        guard: impl Fn(&LambdaCtx<'_>) -> bool + 'static,
        f: impl FnOnce(&mut ScriptBuilder<'s>) -> Actions,
    ) -> Self {
        self.add_choice(text.into(), Some(Lambda::new(guard)), f)
    }

    fn add_choice(
        mut self,
        text: String,
        guard: Option<Lambda>,
        f: impl FnOnce(&mut ScriptBuilder<'s>) -> Actions,
    ) -> Self {
        let actions = f(self.builder);
        let head = self.builder.block(actions);
        self.choices.push(Choice { text, head, guard });
        self
    }
}

impl From<MenuDraft<'_, '_>> for Actions {
    fn from(draft: MenuDraft<'_, '_>) -> Self {
        let MenuDraft {
            builder,
            call_site,
            prompt,
            choices,
        } = draft;
        if choices.is_empty() {
            let name = prompt.unwrap_or_else(|| call_site.to_string());
            builder.warn(
                StaticScriptWarning::new(StaticScriptWarningKind::EmptyMenu(name))
                    .with_call_site(call_site.to_string()),
            );
            return Actions::new();
        }
        let id = builder.push(
            Callee::Menu,
            ActionContent::Menu(MenuContent { prompt, choices }),
            call_site,
        );
        Actions::from(id)
    }
}

/// Condition being authored. Converting it into [`Actions`] allocates the condition action.
pub struct ConditionDraft<'b, 's> {
    builder: &'b mut ScriptBuilder<'s>,
    call_site: CallSite,
    branches: Vec<ConditionBranch>,
    otherwise: Option<Option<ActionId>>,
    has_else: bool,
    error: Option<StaticScriptWarningKind>,
}

impl<'s> ConditionDraft<'_, 's> {
    /// First branch.
    pub fn if_(
        mut self,
        lambda: impl Fn(&LambdaCtx<'_>) -> bool + 'static,
        f: impl FnOnce(&mut ScriptBuilder<'s>) -> Actions,
    ) -> Self {
        if !self.branches.is_empty() {
            return self.fail(StaticScriptWarningKind::DuplicateIf);
        }
        let head = self.body(f);
        self.branches.push(ConditionBranch {
            lambda: Lambda::new(lambda),
            head,
        });
        self
    }

    /// Further branch, tried when every earlier branch failed.
    pub fn else_if(
        mut self,
        lambda: impl Fn(&LambdaCtx<'_>) -> bool + 'static,
        f: impl FnOnce(&mut ScriptBuilder<'s>) -> Actions,
    ) -> Self {
        if self.has_else {
            return self.fail(StaticScriptWarningKind::ElseIfAfterElse);
        }
        if self.branches.is_empty() {
            return self.fail(StaticScriptWarningKind::MissingIf);
        }
        let head = self.body(f);
        self.branches.push(ConditionBranch {
            lambda: Lambda::new(lambda),
            head,
        });
        self
    }

    /// Fallback branch.
    pub fn else_(mut self, f: impl FnOnce(&mut ScriptBuilder<'s>) -> Actions) -> Self {
        if self.has_else {
            return self.fail(StaticScriptWarningKind::DuplicateElse);
        }
        if self.branches.is_empty() {
            return self.fail(StaticScriptWarningKind::MissingIf);
        }
        self.has_else = true;
        let head = self.body(f);
        self.otherwise = Some(head);
        self
    }

    fn body(&mut self, f: impl FnOnce(&mut ScriptBuilder<'s>) -> Actions) -> Option<ActionId> {
        let actions = f(self.builder);
        self.builder.block(actions)
    }

    fn fail(mut self, kind: StaticScriptWarningKind) -> Self {
        if self.error.is_none() {
            self.error = Some(kind);
        }
        self
    }
}

impl From<ConditionDraft<'_, '_>> for Actions {
    fn from(draft: ConditionDraft<'_, '_>) -> Self {
        let ConditionDraft {
            builder,
            call_site,
            branches,
            otherwise,
            error,
            ..
        } = draft;
        let error = error.or_else(|| branches.is_empty().then_some(StaticScriptWarningKind::MissingIf));
        if let Some(kind) = error {
            builder.warn(StaticScriptWarning::new(kind).with_call_site(call_site.to_string()));
            return Actions::new();
        }
        let id = builder.push(
            Callee::Condition,
            ActionContent::Condition(ConditionContent {
                branches,
                otherwise: otherwise.flatten(),
            }),
            call_site,
        );
        Actions::from(id)
    }
}
