//! Identifiers and the per-story id allocator.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

macro_rules! story_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            Serialize,
            Deserialize,
            derive_more::Display,
        )]
        #[serde(transparent)]
        #[display("{}-{}", $prefix, _0)]
        pub struct $name(u32);

        impl $name {
            /// Arena index of this id.
            pub fn index(self) -> usize {
                self.0 as usize
            }

            /// Raw numeric value.
            pub fn get(self) -> u32 {
                self.0
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let raw = s
                    .strip_prefix(concat!($prefix, "-"))
                    .ok_or_else(|| format!("expected '{}-<n>', got '{}'", $prefix, s))?;
                raw.parse::<u32>()
                    .map(Self)
                    .map_err(|e| format!("invalid {} id '{}': {}", $prefix, s, e))
            }
        }
    };
}

story_id!(
    /// Identifies an [`Action`](crate::Action) and its content node within one story.
    ActionId,
    "action"
);
story_id!(
    /// Identifies a narrative element (character, image, sound or scene).
    ElementId,
    "element"
);
story_id!(
    /// Identifies a scene within one story.
    SceneId,
    "scene"
);

/// Tag of the story that issued a handle.
///
/// Unique within the process. Handles carry it so a script cannot act on
/// elements registered with another story.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
#[display("story#{}", _0)]
pub struct StoryKey(u64);

impl StoryKey {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Hands out story-scoped identifiers.
///
/// Every story owns exactly one allocator, so two stories built in the same
/// process (or in parallel tests) produce identical ids for identical scripts.
///
/// # Examples
///
/// ```
/// use libretto_core::IdAllocator;
///
/// let mut ids = IdAllocator::default();
/// let first = ids.next_action();
/// let second = ids.next_action();
/// assert_eq!(first.to_string(), "action-0");
/// assert_eq!(second.to_string(), "action-1");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdAllocator {
    actions: u32,
    elements: u32,
    scenes: u32,
}

impl IdAllocator {
    /// Allocate the next action id.
    pub fn next_action(&mut self) -> ActionId {
        let id = ActionId(self.actions);
        self.actions += 1;
        id
    }

    /// Allocate the next element id.
    pub fn next_element(&mut self) -> ElementId {
        let id = ElementId(self.elements);
        self.elements += 1;
        id
    }

    /// Allocate the next scene id.
    pub fn next_scene(&mut self) -> SceneId {
        let id = SceneId(self.scenes);
        self.scenes += 1;
        id
    }

    /// Number of actions allocated so far.
    pub fn action_count(&self) -> usize {
        self.actions as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip_through_display() {
        let mut ids = IdAllocator::default();
        ids.next_action();
        let id = ids.next_action();
        let parsed: ActionId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("element-1".parse::<ActionId>().is_err());
        assert!("action-x".parse::<ActionId>().is_err());
    }

    #[test]
    fn story_keys_are_distinct() {
        assert_ne!(StoryKey::next(), StoryKey::next());
    }

    #[test]
    fn counters_are_independent() {
        let mut ids = IdAllocator::default();
        assert_eq!(ids.next_scene().get(), 0);
        assert_eq!(ids.next_element().get(), 0);
        assert_eq!(ids.next_action().get(), 0);
        assert_eq!(ids.next_element().get(), 1);
        assert_eq!(ids.action_count(), 1);
    }
}
