// SPDX-License-Identifier: Apache-2.0

//! Iterative deepening on time: a state that runs longer than the current
//! time box is paused. When nothing else is left the box doubles and every
//! paused state gets another turn.

use std::collections::BTreeSet;
use std::time::Duration;

use crate::context::ExplorationContext;
use crate::searcher::{live_current, SearchStrategy, Searcher};
use crate::state::StateId;

const INITIAL_TIME_BOX: Duration = Duration::from_secs(1);

pub struct IterativeDeepeningTimeSearcher {
    inner: Box<Searcher>,
    time_box: Duration,
    start_time: Duration,
    paused: BTreeSet<StateId>,
}

impl IterativeDeepeningTimeSearcher {
    pub fn new(inner: Box<Searcher>) -> Self {
        Self {
            inner,
            time_box: INITIAL_TIME_BOX,
            start_time: Duration::ZERO,
            paused: BTreeSet::new(),
        }
    }

    pub fn inner(&self) -> &Searcher {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut Searcher {
        &mut self.inner
    }

    pub fn time_box(&self) -> Duration {
        self.time_box
    }

    pub fn paused_states(&self) -> &BTreeSet<StateId> {
        &self.paused
    }
}

impl SearchStrategy for IterativeDeepeningTimeSearcher {
    fn select(&mut self, ctx: &mut ExplorationContext) -> StateId {
        let state = self.inner.select(ctx);
        self.start_time = ctx.clock.now();
        state
    }

    fn update(
        &mut self,
        ctx: &mut ExplorationContext,
        current: Option<StateId>,
        added: &[StateId],
        removed: &[StateId],
    ) {
        let elapsed = ctx.clock.now().saturating_sub(self.start_time);

        // Paused states are unknown to the inner searcher.
        let mut known_removed = Vec::with_capacity(removed.len());
        for &state in removed {
            if !self.paused.remove(&state) {
                known_removed.push(state);
            }
        }
        self.inner.update(ctx, current, added, &known_removed);

        if let Some(cur) = live_current(current, removed) {
            if elapsed > self.time_box && self.paused.insert(cur) {
                log::debug!("pausing state {} after {:?}", cur, elapsed);
                self.inner.update(ctx, None, &[], &[cur]);
            }
        }

        if self.inner.empty(ctx) && !self.paused.is_empty() {
            self.time_box *= 2;
            log::info!(
                "increased time budget to {:.3}s",
                self.time_box.as_secs_f64()
            );
            let resumed: Vec<StateId> = std::mem::take(&mut self.paused).into_iter().collect();
            self.inner.update(ctx, None, &resumed, &[]);
        }
    }

    fn empty(&self, ctx: &ExplorationContext) -> bool {
        self.inner.empty(ctx) && self.paused.is_empty()
    }

    fn describe(&self) -> String {
        "IterativeDeepeningTimeSearcher".to_string()
    }
}
