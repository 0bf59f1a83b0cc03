//! Game lifecycle events.

use crate::HistoryId;
use libretto_core::SceneId;
use std::cell::RefCell;
use std::fmt;
use tracing::trace;

/// Lifecycle notification emitted by a [`LiveGame`](crate::LiveGame).
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum GameEvent {
    /// A new game started
    #[display("start")]
    Start,
    /// The main flow reached its end
    #[display("end")]
    End,
    /// Live state was rewritten; renderers should redraw from scratch
    #[display("resync")]
    Resync,
    /// A scene root executed
    #[display("scene enter: {}", _0)]
    SceneEnter(SceneId),
    /// History entries were evicted to respect the cap
    #[display("history limit: {} evicted", _0.len())]
    HistoryLimit(Vec<HistoryId>),
    /// History entries were unwound by undo
    #[display("history undo: {} unwound", _0.len())]
    HistoryUndo(Vec<HistoryId>),
    /// A snapshot was produced under this name
    #[display("saved: {}", _0)]
    Saved(String),
    /// A snapshot with this name was restored
    #[display("loaded: {}", _0)]
    Loaded(String),
}

type Listener = Box<dyn FnMut(&GameEvent)>;

/// Ordered list of event listeners.
#[derive(Default)]
pub struct EventEmitter {
    listeners: RefCell<Vec<Listener>>,
}

impl fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter")
            .field("listeners", &self.listeners.borrow().len())
            .finish()
    }
}

impl EventEmitter {
    /// Register a listener. Listeners run in registration order.
    pub fn subscribe(&self, listener: impl FnMut(&GameEvent) + 'static) {
        self.listeners.borrow_mut().push(Box::new(listener));
    }

    /// Deliver an event to every listener.
    pub fn emit(&self, event: &GameEvent) {
        trace!(%event, "Emitting game event");
        let mut listeners = std::mem::take(&mut *self.listeners.borrow_mut());
        for listener in listeners.iter_mut() {
            listener(event);
        }
        let mut slot = self.listeners.borrow_mut();
        listeners.append(&mut slot);
        *slot = listeners;
    }
}
