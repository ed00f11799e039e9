// SPDX-License-Identifier: Apache-2.0

//! Round-robin over several searchers that all track the same states.

use crate::context::ExplorationContext;
use crate::searcher::{SearchStrategy, Searcher};
use crate::state::StateId;

pub struct InterleavedSearcher {
    searchers: Vec<Searcher>,
    index: usize,
}

impl InterleavedSearcher {
    pub fn new(searchers: Vec<Searcher>) -> Self {
        assert!(
            !searchers.is_empty(),
            "interleaved searcher needs at least one searcher"
        );
        let index = searchers.len();
        Self { searchers, index }
    }

    pub fn searchers(&self) -> &[Searcher] {
        &self.searchers
    }
}

impl SearchStrategy for InterleavedSearcher {
    fn select(&mut self, ctx: &mut ExplorationContext) -> StateId {
        self.index -= 1;
        let state = self.searchers[self.index].select(ctx);
        if self.index == 0 {
            self.index = self.searchers.len();
        }
        state
    }

    fn update(
        &mut self,
        ctx: &mut ExplorationContext,
        current: Option<StateId>,
        added: &[StateId],
        removed: &[StateId],
    ) {
        for s in self.searchers.iter_mut() {
            s.update(ctx, current, added, removed);
        }
    }

    fn empty(&self, ctx: &ExplorationContext) -> bool {
        self.searchers[0].empty(ctx)
    }

    fn describe(&self) -> String {
        let inner: Vec<String> = self.searchers.iter().map(|s| s.describe()).collect();
        format!(
            "<InterleavedSearcher> containing {} searchers:\n{}\n</InterleavedSearcher>",
            self.searchers.len(),
            inner.join("\n")
        )
    }
}
