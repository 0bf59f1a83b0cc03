//! Hierarchical settle status over awaitables.

use crate::{Awaitable, Settle, SkipController};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::{debug, warn};

/// Logical tick counter shared by a game and every timeline it creates.
///
/// The game advances the clock once per `next()` call.
#[derive(Debug, Clone, Default)]
pub struct TickClock(Rc<Cell<u64>>);

impl TickClock {
    /// Clock starting at tick zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current tick.
    pub fn now(&self) -> u64 {
        self.0.get()
    }

    /// Advance by one tick, returning the new tick.
    pub fn advance(&self) -> u64 {
        let next = self.0.get() + 1;
        self.0.set(next);
        next
    }
}

/// Settle status of a timeline. Moves out of `Pending` at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum TimelineStatus {
    /// Still running
    Pending,
    /// Own awaitable resolved and every child settled
    Resolved,
    /// Own awaitable aborted
    Cancelled,
}

type StatusListener = Box<dyn FnOnce(TimelineStatus)>;

struct TimelineInner {
    own: Rc<dyn Settle>,
    children: Vec<Timeline>,
    held: Vec<Timeline>,
    status: TimelineStatus,
    created_tick: u64,
    clock: TickClock,
    listeners: Vec<StatusListener>,
}

/// One awaitable plus the child timelines attached while it was created.
///
/// # Examples
///
/// ```
/// use libretto_core::{Awaitable, TickClock, Timeline, TimelineStatus};
///
/// let clock = TickClock::new();
/// let fade: Awaitable<()> = Awaitable::new();
/// let sound: Awaitable<()> = Awaitable::new();
/// let timeline = Timeline::new(fade.clone(), &clock);
/// assert!(timeline.attach_child(Timeline::new(sound.clone(), &clock)));
///
/// fade.resolve(());
/// assert_eq!(timeline.status(), TimelineStatus::Pending);
/// sound.resolve(());
/// assert_eq!(timeline.status(), TimelineStatus::Resolved);
/// ```
#[derive(Clone)]
pub struct Timeline {
    inner: Rc<RefCell<TimelineInner>>,
}

impl fmt::Debug for Timeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Timeline")
            .field("status", &inner.status)
            .field("children", &inner.children.len())
            .field("created_tick", &inner.created_tick)
            .finish()
    }
}

impl Timeline {
    /// Track `own` on the current tick of `clock`.
    pub fn new(own: impl Settle + 'static, clock: &TickClock) -> Self {
        let own: Rc<dyn Settle> = Rc::new(own);
        let timeline = Self {
            inner: Rc::new(RefCell::new(TimelineInner {
                own: Rc::clone(&own),
                children: Vec::new(),
                held: Vec::new(),
                status: TimelineStatus::Pending,
                created_tick: clock.now(),
                clock: clock.clone(),
                listeners: Vec::new(),
            })),
        };
        let weak = timeline.downgrade();
        own.when_settled(Box::new(move || {
            if let Some(timeline) = upgrade(&weak) {
                timeline.refresh();
            }
        }));
        timeline
    }

    /// Timeline that settles when the first of `timelines` settles.
    ///
    /// The remaining timelines keep running; aborting the combined timeline aborts them.
    pub fn any(timelines: Vec<Timeline>, clock: &TickClock) -> Self {
        let gate: Awaitable<()> = Awaitable::new();
        if timelines.is_empty() {
            gate.resolve(());
            return Self::new(gate, clock);
        }
        let pending = timelines.clone();
        gate.set_skip_controller(SkipController::new(move || {
            for timeline in &pending {
                timeline.abort();
            }
        }));
        for timeline in &timelines {
            let gate = gate.downgrade();
            timeline.on_status(move |_| {
                if let Some(gate) = gate.upgrade() {
                    gate.resolve(());
                }
            });
        }
        let combined = Self::new(gate, clock);
        combined.inner.borrow_mut().held = timelines;
        combined
    }

    /// Run timelines one after another, starting each once the previous resolved.
    ///
    /// Aborting the sequence aborts the step in flight; a cancelled step cancels the sequence.
    pub fn sequence(steps: Vec<Box<dyn FnOnce() -> Timeline>>, clock: &TickClock) -> Self {
        let gate: Awaitable<()> = Awaitable::new();
        let in_flight: Rc<RefCell<Option<Timeline>>> = Rc::new(RefCell::new(None));
        let current = Rc::clone(&in_flight);
        gate.set_skip_controller(SkipController::new(move || {
            let step = current.borrow_mut().take();
            if let Some(step) = step {
                step.abort();
            }
        }));
        let sequence = Self::new(gate.clone(), clock);
        run_step(steps.into_iter().collect(), gate, in_flight);
        sequence
    }

    /// Attach a child. Only legal during the tick this timeline was created in.
    pub fn attach_child(&self, child: Timeline) -> bool {
        {
            let mut inner = self.inner.borrow_mut();
            let now = inner.clock.now();
            if now != inner.created_tick {
                warn!(
                    created = inner.created_tick,
                    now, "Child attached outside the creation tick; ignored"
                );
                return false;
            }
            if inner.status != TimelineStatus::Pending {
                warn!(status = %inner.status, "Child attached to a settled timeline; ignored");
                return false;
            }
            inner.children.push(child.clone());
        }
        let weak = self.downgrade();
        child.on_status(move |_| {
            if let Some(parent) = upgrade(&weak) {
                parent.refresh();
            }
        });
        true
    }

    /// Abort the own awaitable and, through it, every child.
    pub fn abort(&self) -> bool {
        let (status, own) = {
            let inner = self.inner.borrow();
            (inner.status, Rc::clone(&inner.own))
        };
        match status {
            TimelineStatus::Pending => {
                own.cancel();
                self.refresh();
                true
            }
            TimelineStatus::Resolved => {
                warn!("Abort requested on a resolved timeline; ignored");
                false
            }
            TimelineStatus::Cancelled => false,
        }
    }

    /// Run `f` once the status leaves `Pending`, or immediately if it already has.
    pub fn on_status(&self, f: impl FnOnce(TimelineStatus) + 'static) {
        let status = self.status();
        if status == TimelineStatus::Pending {
            self.inner.borrow_mut().listeners.push(Box::new(f));
        } else {
            f(status);
        }
    }

    /// Current status.
    pub fn status(&self) -> TimelineStatus {
        self.inner.borrow().status
    }

    /// Whether the status left `Pending`.
    pub fn is_settled(&self) -> bool {
        self.status() != TimelineStatus::Pending
    }

    /// Tick this timeline was created in.
    pub fn created_tick(&self) -> u64 {
        self.inner.borrow().created_tick
    }

    /// Attached children.
    pub fn children(&self) -> Vec<Timeline> {
        self.inner.borrow().children.clone()
    }

    fn downgrade(&self) -> Weak<RefCell<TimelineInner>> {
        Rc::downgrade(&self.inner)
    }

    fn refresh(&self) {
        let next = {
            let inner = self.inner.borrow();
            if inner.status != TimelineStatus::Pending {
                return;
            }
            if inner.own.is_cancelled() {
                TimelineStatus::Cancelled
            } else if inner.own.is_settled() && inner.children.iter().all(Timeline::is_settled) {
                TimelineStatus::Resolved
            } else {
                return;
            }
        };
        self.transition(next);
    }

    fn transition(&self, status: TimelineStatus) {
        let (listeners, children) = {
            let mut inner = self.inner.borrow_mut();
            if inner.status != TimelineStatus::Pending {
                warn!(from = %inner.status, to = %status, "Late timeline status change ignored");
                return;
            }
            debug!(%status, "Timeline settled");
            inner.status = status;
            (std::mem::take(&mut inner.listeners), inner.children.clone())
        };
        if status == TimelineStatus::Cancelled {
            for child in children.into_iter().filter(|child| !child.is_settled()) {
                child.abort();
            }
        }
        for listener in listeners {
            listener(status);
        }
    }
}

fn upgrade(weak: &Weak<RefCell<TimelineInner>>) -> Option<Timeline> {
    weak.upgrade().map(|inner| Timeline { inner })
}

fn run_step(
    mut steps: std::collections::VecDeque<Box<dyn FnOnce() -> Timeline>>,
    gate: Awaitable<()>,
    in_flight: Rc<RefCell<Option<Timeline>>>,
) {
    if gate.is_settled() {
        return;
    }
    let Some(step) = steps.pop_front() else {
        gate.resolve(());
        return;
    };
    let timeline = step();
    *in_flight.borrow_mut() = Some(timeline.clone());
    // The sequence owns the step through `in_flight`; the step only points back weakly.
    let gate = gate.downgrade();
    let slot = Rc::downgrade(&in_flight);
    timeline.on_status(move |status| {
        let (Some(gate), Some(slot)) = (gate.upgrade(), slot.upgrade()) else {
            return;
        };
        slot.borrow_mut().take();
        match status {
            TimelineStatus::Resolved => run_step(steps, gate, slot),
            _ => {
                gate.abort();
            }
        }
    });
}
