// SPDX-License-Identifier: Apache-2.0

//! Keeps returning the same state until a time or instruction budget has
//! been spent on it, then asks the inner searcher for a new one.

use std::time::Duration;

use crate::context::ExplorationContext;
use crate::searcher::{SearchStrategy, Searcher};
use crate::state::StateId;

pub struct BatchingSearcher {
    inner: Box<Searcher>,
    time_budget: Duration,
    instruction_budget: u64,
    last_state: Option<StateId>,
    last_start_time: Duration,
    last_start_instructions: u64,
}

impl BatchingSearcher {
    /// A zero budget disables that bound.
    pub fn new(inner: Box<Searcher>, time_budget: Duration, instruction_budget: u64) -> Self {
        Self {
            inner,
            time_budget,
            instruction_budget,
            last_state: None,
            last_start_time: Duration::ZERO,
            last_start_instructions: 0,
        }
    }

    pub fn inner(&self) -> &Searcher {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut Searcher {
        &mut self.inner
    }

    pub fn time_budget(&self) -> Duration {
        self.time_budget
    }

    pub fn instruction_budget(&self) -> u64 {
        self.instruction_budget
    }

    fn batch_expired(&self, ctx: &ExplorationContext) -> bool {
        let time_spent = ctx.clock.now().saturating_sub(self.last_start_time);
        let insts_spent = ctx
            .stats
            .instructions
            .saturating_sub(self.last_start_instructions);
        (!self.time_budget.is_zero() && time_spent > self.time_budget)
            || (self.instruction_budget > 0 && insts_spent > self.instruction_budget)
    }
}

impl SearchStrategy for BatchingSearcher {
    fn select(&mut self, ctx: &mut ExplorationContext) -> StateId {
        if let Some(last) = self.last_state {
            if !self.batch_expired(ctx) {
                return last;
            }
            let delta = ctx.clock.now().saturating_sub(self.last_start_time);
            if delta > self.time_budget.mul_f64(1.1) {
                log::info!(
                    "increased time budget from {:.3}s to {:.3}s",
                    self.time_budget.as_secs_f64(),
                    delta.as_secs_f64()
                );
                self.time_budget = delta;
            }
        }
        let state = self.inner.select(ctx);
        self.last_state = Some(state);
        self.last_start_time = ctx.clock.now();
        self.last_start_instructions = ctx.stats.instructions;
        state
    }

    fn update(
        &mut self,
        ctx: &mut ExplorationContext,
        current: Option<StateId>,
        added: &[StateId],
        removed: &[StateId],
    ) {
        if self.last_state.map_or(false, |s| removed.contains(&s)) {
            self.last_state = None;
        }
        self.inner.update(ctx, current, added, removed);
    }

    fn empty(&self, ctx: &ExplorationContext) -> bool {
        self.inner.empty(ctx)
    }

    fn describe(&self) -> String {
        format!(
            "<BatchingSearcher> timeBudget: {:?}, instructionBudget: {}, baseSearcher:\n{}\n</BatchingSearcher>",
            self.time_budget,
            self.instruction_budget,
            self.inner.describe()
        )
    }
}
