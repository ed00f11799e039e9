// SPDX-License-Identifier: Apache-2.0

//! Breadth-first: resume the oldest state; a state that forked moves to the
//! back of the queue since it evolved.

use std::collections::VecDeque;

use crate::context::ExplorationContext;
use crate::searcher::{live_current, SearchStrategy};
use crate::state::StateId;

#[derive(Debug, Default)]
pub struct BfsSearcher {
    states: VecDeque<StateId>,
}

impl BfsSearcher {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SearchStrategy for BfsSearcher {
    fn select(&mut self, _ctx: &mut ExplorationContext) -> StateId {
        *self.states.front().expect("select on an empty BFS searcher")
    }

    fn update(
        &mut self,
        _ctx: &mut ExplorationContext,
        current: Option<StateId>,
        added: &[StateId],
        removed: &[StateId],
    ) {
        if let Some(cur) = live_current(current, removed) {
            if !added.is_empty() {
                let pos = self
                    .states
                    .iter()
                    .position(|s| *s == cur)
                    .unwrap_or_else(|| panic!("current state {} is not queued", cur));
                self.states.remove(pos);
                self.states.push_back(cur);
            }
        }

        self.states.extend(added.iter().copied());

        for state in removed {
            if self.states.front() == Some(state) {
                self.states.pop_front();
            } else {
                let pos = self
                    .states
                    .iter()
                    .position(|s| s == state)
                    .unwrap_or_else(|| panic!("invalid state {} removed", state));
                self.states.remove(pos);
            }
        }
    }

    fn empty(&self, _ctx: &ExplorationContext) -> bool {
        self.states.is_empty()
    }

    fn describe(&self) -> String {
        "BFSSearcher".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::InstLocation;

    #[test]
    fn test_forking_state_moves_to_back() {
        let mut ctx = ExplorationContext::for_testing(0);
        let a = ctx.spawn_initial_state(InstLocation::new(0, 0));
        let mut s = BfsSearcher::new();
        s.update(&mut ctx, None, &[a], &[]);
        let b = ctx.fork(a);
        s.update(&mut ctx, Some(a), &[b], &[]);
        // `a` was alone in the queue when it forked, so it stays ahead of `b`.
        assert_eq!(s.select(&mut ctx), a);
        let c = ctx.fork(a);
        s.update(&mut ctx, Some(a), &[c], &[]);
        assert_eq!(s.select(&mut ctx), b);
        s.update(&mut ctx, Some(b), &[], &[b]);
        assert_eq!(s.select(&mut ctx), a);
        s.update(&mut ctx, Some(a), &[], &[c]);
        assert_eq!(s.select(&mut ctx), a);
    }

    #[test]
    fn test_removed_current_is_not_requeued() {
        let mut ctx = ExplorationContext::for_testing(0);
        let a = ctx.spawn_initial_state(InstLocation::new(0, 0));
        let mut s = BfsSearcher::new();
        s.update(&mut ctx, None, &[a], &[]);
        let b = ctx.fork(a);
        s.update(&mut ctx, Some(a), &[b], &[a]);
        assert_eq!(s.select(&mut ctx), b);
    }
}
