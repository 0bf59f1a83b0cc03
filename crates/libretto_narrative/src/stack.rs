//! Single-step stack machine and background flows.

use libretto_core::{ActionId, Awaitable, CalledActionResult, StepAwaitable};
use libretto_error::LibrettoResult;
use tracing::{debug, trace, warn};

/// Entry of a [`StackModel`].
#[derive(Debug, Clone)]
pub enum StackItem {
    /// Action waiting to execute
    Action(ActionId),
    /// Step suspended by `action`, waiting for the host
    Awaiting {
        /// Action that suspended
        action: ActionId,
        /// Settles with the step result
        awaitable: StepAwaitable,
    },
}

/// What executing one action produced.
#[derive(Debug, Clone)]
pub enum Yielded {
    /// The action completed immediately
    Result(CalledActionResult),
    /// The action suspended; the awaitable settles with its result
    Awaiting(StepAwaitable),
}

/// Executes single actions on behalf of a stack.
pub trait ActionRunner {
    /// Run one action.
    ///
    /// # Errors
    ///
    /// Returns an error if the action cannot be executed against the live state.
    fn run(&mut self, action: ActionId) -> LibrettoResult<Yielded>;
}

/// Outcome of one [`StackModel::roll_next`] call.
#[derive(Debug, Clone)]
pub enum Rolled {
    /// The awaitable on top has not settled yet
    Pending(StepAwaitable),
    /// A suspended step settled; its follow-up was pushed
    Resumed(CalledActionResult),
    /// An action ran to completion; its follow-up was pushed
    Executed {
        /// Action that ran
        action: ActionId,
        /// Its result
        result: CalledActionResult,
    },
    /// An action suspended; its awaitable is now on top
    Suspended {
        /// Action that ran
        action: ActionId,
        /// Awaitable to hand to the host
        awaitable: StepAwaitable,
    },
}

/// Stack machine advancing exactly one step per [`roll_next`](Self::roll_next).
#[derive(Debug, Default)]
pub struct StackModel {
    items: Vec<StackItem>,
}

impl StackModel {
    /// Empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push an item on top.
    pub fn push(&mut self, item: StackItem) {
        self.items.push(item);
    }

    /// Drop every item.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Whether nothing is left to run.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Item on top.
    pub fn top(&self) -> Option<&StackItem> {
        self.items.last()
    }

    /// Advance one step.
    ///
    /// Returns `None` when the stack is empty, which is how a flow ends.
    ///
    /// # Errors
    ///
    /// Propagates errors from the runner.
    pub fn roll_next(&mut self, runner: &mut impl ActionRunner) -> LibrettoResult<Option<Rolled>> {
        loop {
            let Some(item) = self.items.pop() else {
                warn!("No current action");
                return Ok(None);
            };
            match item {
                StackItem::Awaiting { action, awaitable } => {
                    if !awaitable.is_settled() {
                        self.items.push(StackItem::Awaiting {
                            action,
                            awaitable: awaitable.clone(),
                        });
                        return Ok(Some(Rolled::Pending(awaitable)));
                    }
                    let Some(result) = awaitable.result() else {
                        warn!("Settled step carried no result; dropped");
                        continue;
                    };
                    trace!(node = ?result.node, "Suspended step resumed");
                    self.items.extend(result.node.map(StackItem::Action));
                    return Ok(Some(Rolled::Resumed(result)));
                }
                StackItem::Action(action) => match runner.run(action)? {
                    Yielded::Result(result) => {
                        self.items.extend(result.node.map(StackItem::Action));
                        return Ok(Some(Rolled::Executed { action, result }));
                    }
                    Yielded::Awaiting(awaitable) => {
                        self.items.push(StackItem::Awaiting {
                            action,
                            awaitable: awaitable.clone(),
                        });
                        return Ok(Some(Rolled::Suspended { action, awaitable }));
                    }
                },
            }
        }
    }

    /// Abort the awaitable on top, if any.
    pub fn abort_top(&self) {
        if let Some(StackItem::Awaiting { awaitable, .. }) = self.items.last() {
            awaitable.abort();
        }
    }

    /// Actions left on the stack, bottom first. A suspended step counts as
    /// the action that suspended, so it runs again when rebuilt.
    pub fn pending_actions(&self) -> Vec<ActionId> {
        self.items
            .iter()
            .map(|item| match item {
                StackItem::Action(action) | StackItem::Awaiting { action, .. } => *action,
            })
            .collect()
    }
}

/// Flow started by a concurrent control block.
///
/// The block body runs on its own stack, `remaining` times in a row, and
/// resolves `done` once it has finished.
///
/// Detached tasks (`do_async` blocks nobody waits for) are written to saves.
/// Joined tasks are not: the control action waiting on them runs again after
/// a restore and starts them anew.
#[derive(Debug)]
pub struct BackgroundTask {
    stack: StackModel,
    head: ActionId,
    remaining: u32,
    detached: bool,
    done: Awaitable<()>,
}

impl BackgroundTask {
    /// Task running the block at `head` `times` times.
    pub fn new(head: ActionId, times: u32) -> Self {
        let mut stack = StackModel::new();
        stack.push(StackItem::Action(head));
        Self {
            stack,
            head,
            remaining: times.max(1),
            detached: false,
            done: Awaitable::new(),
        }
    }

    /// Task running the block at `head` once with nothing waiting on it.
    pub fn detached(head: ActionId) -> Self {
        Self {
            detached: true,
            ..Self::new(head, 1)
        }
    }

    /// Rebuild a detached task from saved progress.
    ///
    /// `pending` lists the actions left on its stack, bottom first.
    pub fn restore(head: ActionId, remaining: u32, pending: &[ActionId]) -> Self {
        let mut stack = StackModel::new();
        for action in pending {
            stack.push(StackItem::Action(*action));
        }
        Self {
            stack,
            head,
            remaining: remaining.max(1),
            detached: true,
            done: Awaitable::new(),
        }
    }

    /// First action of the block.
    pub fn head(&self) -> ActionId {
        self.head
    }

    /// Runs left, the current one included.
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Actions left on the task's stack, bottom first.
    pub fn pending_actions(&self) -> Vec<ActionId> {
        self.stack.pending_actions()
    }

    /// Whether the task is written to saves.
    pub fn is_detached(&self) -> bool {
        self.detached
    }

    /// Treat the task as joined. Used for tasks started inside a joined task,
    /// which are recreated along with it.
    pub fn attach(&mut self) {
        self.detached = false;
    }

    /// Settles once the task finished or was cancelled.
    pub fn done(&self) -> Awaitable<()> {
        self.done.clone()
    }

    /// Whether the task is over.
    pub fn is_finished(&self) -> bool {
        self.done.is_settled()
    }

    /// Abort the step in flight and the task itself.
    pub fn cancel(&self) {
        self.stack.abort_top();
        self.done.abort();
    }

    /// Run until the task suspends, finishes or `guard` steps were taken.
    ///
    /// Returns whether any step was taken.
    ///
    /// # Errors
    ///
    /// Propagates errors from the runner.
    pub fn pump(&mut self, runner: &mut impl ActionRunner, guard: u32) -> LibrettoResult<bool> {
        let mut progressed = false;
        for _ in 0..guard {
            if self.done.is_settled() {
                self.stack.abort_top();
                self.stack.clear();
                return Ok(progressed);
            }
            if self.stack.is_empty() {
                if self.remaining > 1 {
                    self.remaining -= 1;
                    debug!(head = %self.head, remaining = self.remaining, "Background block restarted");
                    self.stack.push(StackItem::Action(self.head));
                } else {
                    debug!(head = %self.head, "Background block finished");
                    self.done.resolve(());
                    return Ok(true);
                }
            }
            match self.stack.roll_next(runner)? {
                Some(Rolled::Pending(_)) => return Ok(progressed),
                Some(_) => progressed = true,
                None => {}
            }
        }
        warn!(head = %self.head, guard, "Background block did not yield; resuming next tick");
        Ok(progressed)
    }
}
