// SPDX-License-Identifier: Apache-2.0

//! Searchers decide which suspended state the engine resumes next.
//!
//! Every strategy implements [`SearchStrategy`]. The set of strategies is
//! closed: [`Searcher`] has one variant per strategy and decorators own
//! their inner searchers.

use crate::context::ExplorationContext;
use crate::state::StateId;

pub mod batching;
pub mod bfs;
pub mod dependency_guided;
pub mod dfs;
pub mod discrete_pdf;
pub mod interleaved;
pub mod iterative_deepening;
pub mod merging;
pub mod random_path;
pub mod random_state;
pub mod weighted_random;

pub use batching::BatchingSearcher;
pub use bfs::BfsSearcher;
pub use dependency_guided::DependencyGuidedSearcher;
pub use dfs::DfsSearcher;
pub use interleaved::InterleavedSearcher;
pub use iterative_deepening::IterativeDeepeningTimeSearcher;
pub use merging::MergingSearcher;
pub use random_path::RandomPathSearcher;
pub use random_state::RandomStateSearcher;
pub use weighted_random::{WeightType, WeightedRandomSearcher};

pub trait SearchStrategy {
    /// Returns a live state to resume. Must not be called when `empty`.
    fn select(&mut self, ctx: &mut ExplorationContext) -> StateId;

    /// Reconciles internal bookkeeping after one engine step.
    ///
    /// `current` is the state that just ran (`None` when the caller is only
    /// inserting states), `added` are states created by the step and
    /// `removed` are states that must no longer be referenced.
    fn update(
        &mut self,
        ctx: &mut ExplorationContext,
        current: Option<StateId>,
        added: &[StateId],
        removed: &[StateId],
    );

    fn empty(&self, ctx: &ExplorationContext) -> bool;

    /// Diagnostic label; decorators include their inner searchers.
    fn describe(&self) -> String;
}

pub enum Searcher {
    Dfs(DfsSearcher),
    Bfs(BfsSearcher),
    RandomState(RandomStateSearcher),
    WeightedRandom(WeightedRandomSearcher),
    RandomPath(RandomPathSearcher),
    Merging(MergingSearcher),
    Batching(BatchingSearcher),
    IterativeDeepeningTime(IterativeDeepeningTimeSearcher),
    Interleaved(InterleavedSearcher),
    DependencyGuided(DependencyGuidedSearcher),
}

impl Searcher {
    fn strategy(&self) -> &dyn SearchStrategy {
        match self {
            Searcher::Dfs(s) => s,
            Searcher::Bfs(s) => s,
            Searcher::RandomState(s) => s,
            Searcher::WeightedRandom(s) => s,
            Searcher::RandomPath(s) => s,
            Searcher::Merging(s) => s,
            Searcher::Batching(s) => s,
            Searcher::IterativeDeepeningTime(s) => s,
            Searcher::Interleaved(s) => s,
            Searcher::DependencyGuided(s) => s,
        }
    }

    fn strategy_mut(&mut self) -> &mut dyn SearchStrategy {
        match self {
            Searcher::Dfs(s) => s,
            Searcher::Bfs(s) => s,
            Searcher::RandomState(s) => s,
            Searcher::WeightedRandom(s) => s,
            Searcher::RandomPath(s) => s,
            Searcher::Merging(s) => s,
            Searcher::Batching(s) => s,
            Searcher::IterativeDeepeningTime(s) => s,
            Searcher::Interleaved(s) => s,
            Searcher::DependencyGuided(s) => s,
        }
    }

    /// Finds the merging searcher in a decorator stack, so the engine can
    /// pause and resume states at merge points.
    pub fn merging_mut(&mut self) -> Option<&mut MergingSearcher> {
        match self {
            Searcher::Merging(s) => Some(s),
            Searcher::Batching(s) => s.inner_mut().merging_mut(),
            Searcher::IterativeDeepeningTime(s) => s.inner_mut().merging_mut(),
            _ => None,
        }
    }

    pub fn dependency_guided(&self) -> Option<&DependencyGuidedSearcher> {
        match self {
            Searcher::DependencyGuided(s) => Some(s),
            Searcher::Merging(s) => s.inner().dependency_guided(),
            Searcher::Batching(s) => s.inner().dependency_guided(),
            Searcher::IterativeDeepeningTime(s) => s.inner().dependency_guided(),
            Searcher::Interleaved(s) => s.searchers().iter().find_map(|s| s.dependency_guided()),
            _ => None,
        }
    }
}

impl SearchStrategy for Searcher {
    fn select(&mut self, ctx: &mut ExplorationContext) -> StateId {
        self.strategy_mut().select(ctx)
    }

    fn update(
        &mut self,
        ctx: &mut ExplorationContext,
        current: Option<StateId>,
        added: &[StateId],
        removed: &[StateId],
    ) {
        self.strategy_mut().update(ctx, current, added, removed)
    }

    fn empty(&self, ctx: &ExplorationContext) -> bool {
        self.strategy().empty(ctx)
    }

    fn describe(&self) -> String {
        self.strategy().describe()
    }
}

/// `current` when it is set and not among `removed`.
pub(crate) fn live_current(current: Option<StateId>, removed: &[StateId]) -> Option<StateId> {
    current.filter(|c| !removed.contains(c))
}
