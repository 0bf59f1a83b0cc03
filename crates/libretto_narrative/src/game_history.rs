//! Player-facing backlog of dialog lines and menus.

use crate::{HistoryEvent, HistoryId};
use libretto_core::{ActionId, ElementId, StepAwaitable};
use std::cell::Cell;
use std::rc::Rc;
use tracing::trace;

/// What a backlog row shows.
#[derive(Debug, Clone, PartialEq)]
pub enum GameHistoryPayload {
    /// A spoken line
    Dialog {
        /// Speaker name at the time of the line
        speaker: String,
        /// Line text
        text: String,
    },
    /// A menu and the labels it offered
    Menu {
        /// Prompt line
        prompt: Option<String>,
        /// Offered labels
        choices: Vec<String>,
    },
}

/// One backlog row. Its token is the id of the history entry that produced it.
#[derive(Debug, Clone)]
pub struct GameHistoryRow {
    token: HistoryId,
    action: ActionId,
    element: Option<ElementId>,
    payload: GameHistoryPayload,
    awaitable: Option<StepAwaitable>,
    selected: Rc<Cell<Option<usize>>>,
}

impl GameHistoryRow {
    pub(crate) fn new(
        token: HistoryId,
        action: ActionId,
        element: Option<ElementId>,
        payload: GameHistoryPayload,
    ) -> Self {
        Self {
            token,
            action,
            element,
            payload,
            awaitable: None,
            selected: Rc::new(Cell::new(None)),
        }
    }

    pub(crate) fn with_awaitable(mut self, awaitable: StepAwaitable) -> Self {
        self.awaitable = Some(awaitable);
        self
    }

    pub(crate) fn selection(&self) -> Rc<Cell<Option<usize>>> {
        Rc::clone(&self.selected)
    }

    /// Token shared with the history entry.
    pub fn token(&self) -> HistoryId {
        self.token
    }

    /// Action that produced the row.
    pub fn action(&self) -> ActionId {
        self.action
    }

    /// Speaking character, for dialog rows.
    pub fn element(&self) -> Option<ElementId> {
        self.element
    }

    /// Row contents.
    pub fn payload(&self) -> &GameHistoryPayload {
        &self.payload
    }

    /// Whether the player has not acknowledged the row yet.
    pub fn is_pending(&self) -> bool {
        self.awaitable
            .as_ref()
            .is_some_and(|awaitable| !awaitable.is_settled())
    }

    /// Authoring index of the choice picked, for menu rows.
    pub fn selected(&self) -> Option<usize> {
        self.selected.get()
    }
}

/// Backlog kept in lockstep with [`ActionHistory`](crate::ActionHistory).
#[derive(Debug, Default)]
pub struct GameHistory {
    rows: Vec<GameHistoryRow>,
}

impl GameHistory {
    /// Append a row.
    pub fn push(&mut self, row: GameHistoryRow) {
        trace!(token = %row.token, "Backlog row added");
        self.rows.push(row);
    }

    /// Drop the rows whose tokens left the undo log.
    pub fn apply(&mut self, event: &HistoryEvent) {
        let ids = event.ids();
        self.rows.retain(|row| !ids.contains(&row.token));
    }

    /// Rows oldest first.
    pub fn rows(&self) -> &[GameHistoryRow] {
        &self.rows
    }

    /// Row produced by a history entry.
    pub fn find(&self, token: HistoryId) -> Option<&GameHistoryRow> {
        self.rows.iter().find(|row| row.token == token)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the backlog is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Drop every row.
    pub fn clear(&mut self) {
        self.rows.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ActionHistory;
    use libretto_core::IdAllocator;

    #[test]
    fn eviction_removes_matching_rows() {
        let mut ids = IdAllocator::default();
        let mut history = ActionHistory::new(1);
        let mut backlog = GameHistory::default();
        for text in ["one", "two"] {
            let action = ids.next_action();
            let (token, event) = history.push(action, None);
            if let Some(event) = event {
                backlog.apply(&event);
            }
            backlog.push(GameHistoryRow::new(
                token,
                action,
                None,
                GameHistoryPayload::Dialog {
                    speaker: "Alice".to_string(),
                    text: text.to_string(),
                },
            ));
        }
        assert_eq!(backlog.len(), 1);
        assert_eq!(backlog.rows()[0].token(), history.ids()[0]);
    }

    #[test]
    fn pending_follows_the_awaitable() {
        let mut ids = IdAllocator::default();
        let mut history = ActionHistory::new(4);
        let action = ids.next_action();
        let (token, _) = history.push(action, None);
        let awaitable = StepAwaitable::with_receiver(|_| {
            libretto_core::CalledActionResult::new(libretto_core::ActionType::CharacterSay, None)
        });
        let row = GameHistoryRow::new(
            token,
            action,
            None,
            GameHistoryPayload::Menu {
                prompt: None,
                choices: vec!["left".to_string()],
            },
        )
        .with_awaitable(awaitable.clone());
        assert!(row.is_pending());
        awaitable.resolve(libretto_core::Reply::Done);
        assert!(!row.is_pending());
    }
}
