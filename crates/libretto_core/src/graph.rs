//! Action arena and chain linking.
//!
//! Actions live in a flat arena indexed by [`ActionId`]. Linking a list of actions sets
//! each node's child to the next one. Nodes whose branches splice back into the flow
//! (condition branches, menu choices and `do` blocks) additionally get the next node
//! grafted onto the tail of every branch, recursing through branches that themselves
//! end in such a node. Every action takes exactly one place in the graph.

use crate::{Action, ActionContent, ActionId, CallSite, Callee, IdAllocator};
use libretto_error::{StaticScriptWarning, StaticScriptWarningKind};
use tracing::trace;

/// Arena owning every action of one story.
#[derive(Debug, Clone, Default)]
pub struct ActionArena {
    actions: Vec<Action>,
    placed: Vec<bool>,
}

impl ActionArena {
    /// Allocate an unlinked action.
    pub(crate) fn alloc(
        &mut self,
        ids: &mut IdAllocator,
        callee: Callee,
        content: ActionContent,
        call_site: CallSite,
    ) -> ActionId {
        let id = ids.next_action();
        debug_assert_eq!(id.index(), self.actions.len());
        trace!(action = %id, kind = %content.action_type(), "Allocated action");
        self.actions.push(Action::new(id, callee, content, call_site));
        self.placed.push(false);
        id
    }

    /// Look up an action.
    pub fn get(&self, id: ActionId) -> Option<&Action> {
        self.actions.get(id.index())
    }

    pub(crate) fn get_mut(&mut self, id: ActionId) -> Option<&mut Action> {
        self.actions.get_mut(id.index())
    }

    /// Number of allocated actions.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Whether the arena is empty.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// All actions in allocation order.
    pub fn iter(&self) -> impl Iterator<Item = &Action> {
        self.actions.iter()
    }

    /// Link `list` into a chain ending in `continuation`, returning the chain head.
    ///
    /// An empty list yields the continuation itself.
    ///
    /// # Errors
    ///
    /// Fails if an action of `list` appears twice in it or was already placed
    /// by an earlier call, or if linking would change an existing child.
    pub fn construct(
        &mut self,
        list: &[ActionId],
        continuation: Option<ActionId>,
    ) -> Result<Option<ActionId>, StaticScriptWarning> {
        self.place(list)?;
        for (index, id) in list.iter().enumerate() {
            if let Some(next) = list.get(index + 1).copied().or(continuation) {
                self.link(*id, next)?;
            }
        }
        Ok(list.first().copied().or(continuation))
    }

    fn place(&mut self, list: &[ActionId]) -> Result<(), StaticScriptWarning> {
        let mut seen = std::collections::HashSet::with_capacity(list.len());
        for id in list {
            let placed = self.placed.get(id.index()).copied().unwrap_or(false);
            if placed || !seen.insert(*id) {
                let warning = StaticScriptWarning::new(StaticScriptWarningKind::ActionReused(id.to_string()));
                return Err(match self.get(*id) {
                    Some(action) => warning.with_call_site(action.call_site().to_string()),
                    None => warning,
                });
            }
        }
        for id in list {
            if let Some(placed) = self.placed.get_mut(id.index()) {
                *placed = true;
            }
        }
        Ok(())
    }

    /// Last node reached from `head` by following child links.
    pub fn tail(&self, head: ActionId) -> ActionId {
        let mut seen = vec![false; self.actions.len()];
        let mut current = head;
        while let Some(next) = self.get(current).and_then(Action::child) {
            if seen[current.index()] {
                break;
            }
            seen[current.index()] = true;
            current = next;
        }
        current
    }

    fn link(&mut self, from: ActionId, next: ActionId) -> Result<(), StaticScriptWarning> {
        let Some(action) = self.get_mut(from) else {
            return Ok(());
        };
        let call_site = action.call_site().to_string();
        action
            .node_mut()
            .set_init_child(next)
            .map_err(|warning| warning.with_call_site(call_site))?;
        let branches = action.content().continuation_branches();
        if let Some(child) = self.get_mut(next) {
            child.node_mut().set_parent(from);
        }
        for head in branches {
            self.graft_tail(head, next)?;
        }
        Ok(())
    }

    fn graft_tail(&mut self, head: ActionId, next: ActionId) -> Result<(), StaticScriptWarning> {
        let tail = self.tail(head);
        let Some(action) = self.get_mut(tail) else {
            return Ok(());
        };
        if action.content().jump_target().is_some() || action.child() == Some(next) {
            return Ok(());
        }
        let call_site = action.call_site().to_string();
        action
            .node_mut()
            .graft_child(next)
            .map_err(|warning| warning.with_call_site(call_site))?;
        let branches = action.content().continuation_branches();
        for nested in branches {
            self.graft_tail(nested, next)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ConditionBranch, ConditionContent, ControlOp, Lambda};

    fn sleep(arena: &mut ActionArena, ids: &mut IdAllocator) -> ActionId {
        arena.alloc(
            ids,
            Callee::Control,
            ActionContent::Control(ControlOp::Sleep(1)),
            CallSite::here(),
        )
    }

    #[test]
    fn construct_links_in_order_with_continuation() {
        let mut ids = IdAllocator::default();
        let mut arena = ActionArena::default();
        let list: Vec<_> = (0..3).map(|_| sleep(&mut arena, &mut ids)).collect();
        let end = sleep(&mut arena, &mut ids);
        let head = arena.construct(&list, Some(end)).unwrap();
        assert_eq!(head, Some(list[0]));
        assert_eq!(arena.get(list[0]).unwrap().child(), Some(list[1]));
        assert_eq!(arena.get(list[2]).unwrap().child(), Some(end));
        assert_eq!(*arena.get(list[1]).unwrap().node().parent(), Some(list[0]));
        assert_eq!(arena.construct(&[], Some(end)).unwrap(), Some(end));
    }

    #[test]
    fn nested_branch_tails_receive_the_continuation() {
        let mut ids = IdAllocator::default();
        let mut arena = ActionArena::default();
        let inner_body = sleep(&mut arena, &mut ids);
        let inner = arena.alloc(
            &mut ids,
            Callee::Condition,
            ActionContent::Condition(ConditionContent {
                branches: vec![ConditionBranch {
                    lambda: Lambda::new(|_| true),
                    head: Some(inner_body),
                }],
                otherwise: None,
            }),
            CallSite::here(),
        );
        let outer_first = sleep(&mut arena, &mut ids);
        arena.construct(&[outer_first, inner], None).unwrap();
        let outer = arena.alloc(
            &mut ids,
            Callee::Control,
            ActionContent::Control(ControlOp::Do(Some(outer_first))),
            CallSite::here(),
        );
        let after = sleep(&mut arena, &mut ids);
        arena.construct(&[outer, after], None).unwrap();

        assert_eq!(arena.get(inner).unwrap().child(), Some(after));
        assert_eq!(arena.get(inner_body).unwrap().child(), Some(after));
        assert_eq!(arena.tail(outer_first), after);
    }

    #[test]
    fn placing_an_action_twice_fails() {
        let mut ids = IdAllocator::default();
        let mut arena = ActionArena::default();
        let (a, b, c) = (
            sleep(&mut arena, &mut ids),
            sleep(&mut arena, &mut ids),
            sleep(&mut arena, &mut ids),
        );
        arena.construct(&[a, b], None).unwrap();
        let err = arena.construct(&[a, c], None).unwrap_err();
        assert_eq!(err.kind(), &StaticScriptWarningKind::ActionReused(a.to_string()));
        assert!(err.call_site().is_some());
        assert_eq!(arena.get(c).unwrap().child(), None);
    }

    #[test]
    fn repeated_action_in_one_chain_fails_before_linking() {
        let mut ids = IdAllocator::default();
        let mut arena = ActionArena::default();
        let (s, x) = (sleep(&mut arena, &mut ids), sleep(&mut arena, &mut ids));
        let err = arena.construct(&[s, x, s], None).unwrap_err();
        assert!(matches!(err.kind(), StaticScriptWarningKind::ActionReused(_)));
        assert_eq!(arena.get(s).unwrap().child(), None);
        assert_eq!(arena.get(x).unwrap().child(), None);
    }
}
