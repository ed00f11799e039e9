// SPDX-License-Identifier: Apache-2.0

//! Decorator that hides states paused at a close-merge point from the inner
//! searcher and, with incomplete merging, steers execution toward the
//! stragglers of a merge group.

use crate::context::ExplorationContext;
use crate::searcher::{SearchStrategy, Searcher};
use crate::state::StateId;

pub struct MergingSearcher {
    inner: Box<Searcher>,
    paused: Vec<StateId>,
    use_incomplete_merge: bool,
}

impl MergingSearcher {
    pub fn new(inner: Box<Searcher>, use_incomplete_merge: bool) -> Self {
        Self {
            inner,
            paused: Vec::new(),
            use_incomplete_merge,
        }
    }

    pub fn inner(&self) -> &Searcher {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut Searcher {
        &mut self.inner
    }

    pub fn paused_states(&self) -> &[StateId] {
        &self.paused
    }

    pub fn is_paused(&self, state: StateId) -> bool {
        self.paused.contains(&state)
    }

    /// Withdraws `state` from the inner searcher until `continue_state`.
    pub fn pause_state(&mut self, ctx: &mut ExplorationContext, state: StateId) {
        assert!(!self.is_paused(state), "state {} paused twice", state);
        self.paused.push(state);
        self.inner.update(ctx, None, &[], &[state]);
    }

    pub fn continue_state(&mut self, ctx: &mut ExplorationContext, state: StateId) {
        let pos = self
            .paused
            .iter()
            .position(|s| *s == state)
            .unwrap_or_else(|| panic!("state {} is not paused", state));
        self.paused.remove(pos);
        self.inner.update(ctx, None, &[state], &[]);
    }

    /// `state` reached the close-merge point of `ctx.merge_groups[group]`.
    pub fn close_merge(&mut self, ctx: &mut ExplorationContext, group: usize, state: StateId) {
        let now = ctx.stats.instructions;
        ctx.merge_groups[group].arrive(state, now);
        self.pause_state(ctx, state);
    }
}

impl SearchStrategy for MergingSearcher {
    fn select(&mut self, ctx: &mut ExplorationContext) -> StateId {
        assert!(!self.inner.empty(ctx), "base searcher is empty");
        if !self.use_incomplete_merge {
            return self.inner.select(ctx);
        }

        let now = ctx.stats.instructions;
        for group in 0..ctx.merge_groups.len() {
            if !ctx.merge_groups[group].has_merged_states() {
                continue;
            }
            if let Some(state) = ctx.merge_groups[group].prioritized_state(now) {
                return state;
            }
            // Every straggler exceeded the wait budget; resume the states
            // that already arrived.
            let released = ctx.merge_groups[group].release_states();
            log::debug!(
                "merge group {}: releasing {} state(s) after waiting",
                group,
                released.len()
            );
            for state in released {
                self.continue_state(ctx, state);
            }
        }
        self.inner.select(ctx)
    }

    fn update(
        &mut self,
        ctx: &mut ExplorationContext,
        current: Option<StateId>,
        added: &[StateId],
        removed: &[StateId],
    ) {
        // Paused states are unknown to the inner searcher.
        let current_paused = current.is_some_and(|c| self.is_paused(c));
        if current_paused && added.is_empty() && removed.is_empty() {
            return;
        }
        let current = current.filter(|_| !current_paused);
        let mut known_removed = Vec::with_capacity(removed.len());
        for &state in removed {
            match self.paused.iter().position(|s| *s == state) {
                Some(pos) => {
                    log::debug!("paused state {} terminated", state);
                    self.paused.remove(pos);
                }
                None => known_removed.push(state),
            }
        }
        self.inner.update(ctx, current, added, &known_removed);
    }

    fn empty(&self, ctx: &ExplorationContext) -> bool {
        self.inner.empty(ctx)
    }

    fn describe(&self) -> String {
        "MergingSearcher".to_string()
    }
}
