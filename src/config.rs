// SPDX-License-Identifier: Apache-2.0

//! Searcher configuration and construction of the decorator stack.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

use crate::context::ExplorationContext;
use crate::coverage::{
    CoverageQueues, DEFAULT_TARGET_BRANCH_NUM, DEFAULT_TARGET_UPDATE_INSTRUCTIONS,
};
use crate::depsched_error::DepschedError;
use crate::ptree::MAX_OWNERS;
use crate::searcher::{
    BatchingSearcher, BfsSearcher, DependencyGuidedSearcher, DfsSearcher, InterleavedSearcher,
    IterativeDeepeningTimeSearcher, MergingSearcher, RandomPathSearcher, RandomStateSearcher,
    SearchStrategy, Searcher, WeightType, WeightedRandomSearcher,
};

/// A base strategy, by its command-line name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SearchKind {
    Dfs,
    Bfs,
    RandomState,
    RandomPath,
    DependencyGuided,
    Weighted(WeightType),
}

impl SearchKind {
    pub const ALL: [SearchKind; 12] = [
        SearchKind::Dfs,
        SearchKind::Bfs,
        SearchKind::RandomState,
        SearchKind::RandomPath,
        SearchKind::DependencyGuided,
        SearchKind::Weighted(WeightType::CoveringNew),
        SearchKind::Weighted(WeightType::MinDistToUncovered),
        SearchKind::Weighted(WeightType::Depth),
        SearchKind::Weighted(WeightType::RandomPath),
        SearchKind::Weighted(WeightType::InstCount),
        SearchKind::Weighted(WeightType::CpInstCount),
        SearchKind::Weighted(WeightType::QueryCost),
    ];

    pub fn name(self) -> &'static str {
        match self {
            SearchKind::Dfs => "dfs",
            SearchKind::Bfs => "bfs",
            SearchKind::RandomState => "random-state",
            SearchKind::RandomPath => "random-path",
            SearchKind::DependencyGuided => "cgs",
            SearchKind::Weighted(WeightType::CoveringNew) => "nurs:covnew",
            SearchKind::Weighted(WeightType::MinDistToUncovered) => "nurs:md2u",
            SearchKind::Weighted(WeightType::Depth) => "nurs:depth",
            SearchKind::Weighted(WeightType::RandomPath) => "nurs:rp",
            SearchKind::Weighted(WeightType::InstCount) => "nurs:icnt",
            SearchKind::Weighted(WeightType::CpInstCount) => "nurs:cpicnt",
            SearchKind::Weighted(WeightType::QueryCost) => "nurs:qc",
        }
    }

    fn build(self, ctx: &mut ExplorationContext) -> Searcher {
        match self {
            SearchKind::Dfs => Searcher::Dfs(DfsSearcher::new()),
            SearchKind::Bfs => Searcher::Bfs(BfsSearcher::new()),
            SearchKind::RandomState => Searcher::RandomState(RandomStateSearcher::new()),
            SearchKind::RandomPath => Searcher::RandomPath(RandomPathSearcher::new(ctx)),
            SearchKind::DependencyGuided => {
                Searcher::DependencyGuided(DependencyGuidedSearcher::new())
            }
            SearchKind::Weighted(w) => Searcher::WeightedRandom(WeightedRandomSearcher::new(w)),
        }
    }
}

impl fmt::Display for SearchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for SearchKind {
    type Err = DepschedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SearchKind::ALL
            .iter()
            .copied()
            .find(|k| k.name() == s)
            .ok_or_else(|| {
                let known: Vec<&str> = SearchKind::ALL.iter().map(|k| k.name()).collect();
                DepschedError(format!(
                    "unknown search kind {:?}; expected one of: {}",
                    s,
                    known.join(", ")
                ))
            })
    }
}

impl TryFrom<String> for SearchKind {
    type Error = DepschedError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<SearchKind> for String {
    fn from(k: SearchKind) -> String {
        k.name().to_string()
    }
}

fn default_search() -> Vec<SearchKind> {
    vec![
        SearchKind::RandomPath,
        SearchKind::Weighted(WeightType::CoveringNew),
    ]
}

fn default_true() -> bool {
    true
}

fn default_batch_time_ms() -> u64 {
    5000
}

fn default_batch_instructions() -> u64 {
    10_000
}

fn default_target_branch_num() -> usize {
    DEFAULT_TARGET_BRANCH_NUM
}

fn default_target_update_instructions() -> u64 {
    DEFAULT_TARGET_UPDATE_INSTRUCTIONS
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearcherConfig {
    /// Base strategies; several are interleaved round-robin.
    #[serde(default = "default_search")]
    pub search: Vec<SearchKind>,

    #[serde(default = "default_true")]
    pub use_batching_search: bool,

    /// Time budget per batch; zero disables the time bound.
    #[serde(default = "default_batch_time_ms")]
    pub batch_time_ms: u64,

    /// Instruction budget per batch; zero disables the instruction bound.
    #[serde(default = "default_batch_instructions")]
    pub batch_instructions: u64,

    #[serde(default)]
    pub use_iterative_deepening_time_search: bool,

    #[serde(default)]
    pub use_merge: bool,

    /// Lets the merging searcher prioritize states that have yet to reach a
    /// close-merge point.
    #[serde(default)]
    pub use_incomplete_merge: bool,

    /// Seed for the random source; when absent the context keeps its own.
    #[serde(default)]
    pub seed: Option<u64>,

    /// Branches pulled from the partly-covered log on a target refresh.
    #[serde(default = "default_target_branch_num")]
    pub target_branch_num: usize,

    /// Instructions between target refreshes; zero disables them.
    #[serde(default = "default_target_update_instructions")]
    pub target_update_instructions: u64,
}

impl Default for SearcherConfig {
    fn default() -> Self {
        Self {
            search: default_search(),
            use_batching_search: true,
            batch_time_ms: default_batch_time_ms(),
            batch_instructions: default_batch_instructions(),
            use_iterative_deepening_time_search: false,
            use_merge: false,
            use_incomplete_merge: false,
            seed: None,
            target_branch_num: DEFAULT_TARGET_BRANCH_NUM,
            target_update_instructions: DEFAULT_TARGET_UPDATE_INSTRUCTIONS,
        }
    }
}

impl SearcherConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, DepschedError> {
        let config: SearcherConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), DepschedError> {
        if self.search.is_empty() {
            return Err(DepschedError(
                "at least one search kind must be given".to_string(),
            ));
        }
        let random_paths = self
            .search
            .iter()
            .filter(|k| **k == SearchKind::RandomPath)
            .count();
        if random_paths as u32 > MAX_OWNERS {
            return Err(DepschedError(format!(
                "at most {} random-path searchers can be combined, got {}",
                MAX_OWNERS, random_paths
            )));
        }
        if self.use_merge && random_paths > 0 {
            return Err(DepschedError(
                "merging is not supported together with random-path".to_string(),
            ));
        }
        if self.use_incomplete_merge && !self.use_merge {
            return Err(DepschedError(
                "use_incomplete_merge requires use_merge".to_string(),
            ));
        }
        if self.use_batching_search && self.batch_time_ms == 0 && self.batch_instructions == 0 {
            return Err(DepschedError(
                "batching needs a time or an instruction budget".to_string(),
            ));
        }
        Ok(())
    }

    /// Installs the coverage-target policy and the seed into `ctx`. Call
    /// before the first engine event.
    pub fn apply_to_context(&self, ctx: &mut ExplorationContext) {
        ctx.coverage =
            CoverageQueues::new(self.target_branch_num, self.target_update_instructions);
        if let Some(seed) = self.seed {
            ctx.rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        }
    }
}

/// Builds the searcher described by `config` on top of `ctx`: the base
/// strategy (interleaved when several kinds are named), then batching,
/// merging and iterative deepening, each when enabled.
pub fn construct_searcher(
    config: &SearcherConfig,
    ctx: &mut ExplorationContext,
) -> Result<Searcher, DepschedError> {
    config.validate()?;
    config.apply_to_context(ctx);

    let mut searcher = if config.search.len() == 1 {
        config.search[0].build(ctx)
    } else {
        let searchers = config.search.iter().map(|k| k.build(ctx)).collect();
        Searcher::Interleaved(InterleavedSearcher::new(searchers))
    };

    if config.use_batching_search {
        searcher = Searcher::Batching(BatchingSearcher::new(
            Box::new(searcher),
            Duration::from_millis(config.batch_time_ms),
            config.batch_instructions,
        ));
    }

    if config.use_merge {
        searcher = Searcher::Merging(MergingSearcher::new(
            Box::new(searcher),
            config.use_incomplete_merge,
        ));
    }

    if config.use_iterative_deepening_time_search {
        searcher = Searcher::IterativeDeepeningTime(IterativeDeepeningTimeSearcher::new(
            Box::new(searcher),
        ));
    }

    log::info!("searcher: {}", searcher.describe());
    Ok(searcher)
}
