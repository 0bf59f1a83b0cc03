//! Bounded undo log.

use crate::Stage;
use libretto_core::{ActionId, ElementId, ElementState, Store};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use tracing::{debug, warn};

/// Identifies one history entry. Also the token of its game history row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HistoryId(u64);

impl HistoryId {
    /// Raw value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HistoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "history-{}", self.0)
    }
}

/// Live state an undo closure may rewrite.
pub struct UndoScope<'a> {
    /// Story variables
    pub store: &'a mut Store,
    /// Element states
    pub elements: &'a mut BTreeMap<ElementId, ElementState>,
    /// Stage
    pub stage: &'a mut Stage,
}

/// Inverse of one executed action.
pub type UndoFn = Box<dyn FnOnce(&mut UndoScope<'_>)>;

/// One executed action and how to revert it.
pub struct HistoryEntry {
    id: HistoryId,
    action: ActionId,
    resumable: bool,
    undo: Option<UndoFn>,
}

impl HistoryEntry {
    /// Entry id.
    pub fn id(&self) -> HistoryId {
        self.id
    }

    /// Action this entry recorded.
    pub fn action(&self) -> ActionId {
        self.action
    }

    /// Whether the main flow can resume at this entry's action.
    ///
    /// Entries recorded by background blocks are reverted but never resumed.
    pub fn is_resumable(&self) -> bool {
        self.resumable
    }

    /// Run the inverse, if any.
    pub fn revert(self, scope: &mut UndoScope<'_>) {
        if let Some(undo) = self.undo {
            undo(scope);
        }
    }
}

impl fmt::Debug for HistoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HistoryEntry")
            .field("id", &self.id)
            .field("action", &self.action)
            .field("resumable", &self.resumable)
            .field("reversible", &self.undo.is_some())
            .finish()
    }
}

/// Notification about entries leaving the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryEvent {
    /// Oldest entries evicted to respect the cap
    Limit(Vec<HistoryId>),
    /// Newest entries unwound by undo
    Undo(Vec<HistoryId>),
}

impl HistoryEvent {
    /// Ids carried by the event.
    pub fn ids(&self) -> &[HistoryId] {
        match self {
            Self::Limit(ids) | Self::Undo(ids) => ids,
        }
    }
}

/// Undo log holding at most `max` entries.
#[derive(Debug)]
pub struct ActionHistory {
    entries: VecDeque<HistoryEntry>,
    next_id: u64,
    max: usize,
}

impl ActionHistory {
    /// Empty log with a cap of `max` entries (at least one).
    pub fn new(max: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            next_id: 0,
            max: max.max(1),
        }
    }

    /// Append a main-flow entry, evicting the oldest ones past the cap.
    ///
    /// Returns the new id and the eviction notification, if any.
    pub fn push(&mut self, action: ActionId, undo: Option<UndoFn>) -> (HistoryId, Option<HistoryEvent>) {
        self.insert(action, undo, true)
    }

    /// Append an entry recorded by a background block.
    pub fn push_background(
        &mut self,
        action: ActionId,
        undo: Option<UndoFn>,
    ) -> (HistoryId, Option<HistoryEvent>) {
        self.insert(action, undo, false)
    }

    fn insert(
        &mut self,
        action: ActionId,
        undo: Option<UndoFn>,
        resumable: bool,
    ) -> (HistoryId, Option<HistoryEvent>) {
        let id = HistoryId(self.next_id);
        self.next_id += 1;
        self.entries.push_back(HistoryEntry {
            id,
            action,
            resumable,
            undo,
        });
        let mut evicted = Vec::new();
        while self.entries.len() > self.max {
            if let Some(entry) = self.entries.pop_front() {
                evicted.push(entry.id);
            }
        }
        if evicted.is_empty() {
            return (id, None);
        }
        warn!(evicted = evicted.len(), max = self.max, "History cap reached; oldest entries evicted");
        (id, Some(HistoryEvent::Limit(evicted)))
    }

    /// Remove the newest entry.
    pub fn pop(&mut self) -> Option<HistoryEntry> {
        self.entries.pop_back()
    }

    /// Remove every entry down to and including `id`, newest first.
    ///
    /// Returns nothing when `id` is not in the log.
    pub fn rewind_to(&mut self, id: HistoryId) -> Vec<HistoryEntry> {
        if !self.contains(id) {
            debug!(%id, "Undo target not in history");
            return Vec::new();
        }
        let mut unwound = Vec::new();
        while let Some(entry) = self.entries.pop_back() {
            let reached = entry.id == id;
            unwound.push(entry);
            if reached {
                break;
            }
        }
        unwound
    }

    /// Whether `id` is still in the log.
    pub fn contains(&self, id: HistoryId) -> bool {
        self.entries.iter().any(|entry| entry.id == id)
    }

    /// Id of the newest entry.
    pub fn last_id(&self) -> Option<HistoryId> {
        self.entries.back().map(|entry| entry.id)
    }

    /// Ids oldest first.
    pub fn ids(&self) -> Vec<HistoryId> {
        self.entries.iter().map(|entry| entry.id).collect()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry cap.
    pub fn max(&self) -> usize {
        self.max
    }

    /// Drop every entry without reverting it.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
