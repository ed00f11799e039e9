// SPDX-License-Identifier: Apache-2.0

//! Non-uniform random search: states are drawn with probability
//! proportional to a heuristic weight.

use std::fmt;

use rand::Rng;

use crate::context::ExplorationContext;
use crate::searcher::discrete_pdf::DiscretePdf;
use crate::searcher::{live_current, SearchStrategy};
use crate::state::StateId;

/// Distance substituted when a state has no known distance to uncovered code.
const UNKNOWN_DISTANCE: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WeightType {
    Depth,
    RandomPath,
    InstCount,
    CpInstCount,
    QueryCost,
    MinDistToUncovered,
    CoveringNew,
}

impl WeightType {
    /// Whether the weight can change while a state runs, so the current
    /// state must be reweighted after every step.
    fn updates_on_step(self) -> bool {
        !matches!(self, WeightType::Depth | WeightType::RandomPath)
    }
}

impl fmt::Display for WeightType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WeightType::Depth => "Depth",
            WeightType::RandomPath => "RandomPath",
            WeightType::InstCount => "InstCount",
            WeightType::CpInstCount => "CPInstCount",
            WeightType::QueryCost => "QueryCost",
            WeightType::MinDistToUncovered => "MinDistToUncovered",
            WeightType::CoveringNew => "CoveringNew",
        };
        write!(f, "{}", name)
    }
}

pub struct WeightedRandomSearcher {
    weight_type: WeightType,
    states: DiscretePdf<StateId>,
}

impl WeightedRandomSearcher {
    pub fn new(weight_type: WeightType) -> Self {
        Self {
            weight_type,
            states: DiscretePdf::new(),
        }
    }

    pub fn weight_type(&self) -> WeightType {
        self.weight_type
    }

    /// Current weight of `state`, if it is tracked.
    pub fn weight_of(&self, state: StateId) -> Option<f64> {
        self.states.weight(&state)
    }

    pub fn compute_weight(&self, ctx: &ExplorationContext, id: StateId) -> f64 {
        let s = ctx.state(id);
        match self.weight_type {
            WeightType::Depth => s.depth as f64,
            WeightType::RandomPath => 0.5f64.powi(s.depth as i32),
            WeightType::InstCount => {
                let count = ctx.stats.instructions_at(s.pc).max(1) as f64;
                let inv = 1.0 / count;
                inv * inv
            }
            WeightType::CpInstCount => 1.0 / s.call_path_instructions.max(1) as f64,
            WeightType::QueryCost => {
                let secs = s.query_cost.as_secs_f64();
                if secs < 0.1 {
                    1.0
                } else {
                    1.0 / secs
                }
            }
            WeightType::MinDistToUncovered | WeightType::CoveringNew => {
                let md2u = match s.min_dist_to_uncovered {
                    0 => UNKNOWN_DISTANCE,
                    d => d,
                } as f64;
                let inv_md2u = 1.0 / md2u;
                if self.weight_type == WeightType::CoveringNew {
                    let inv_cov_new = if s.insts_since_cov_new > 0 {
                        1.0 / s.insts_since_cov_new.saturating_sub(1000).max(1) as f64
                    } else {
                        0.0
                    };
                    inv_cov_new * inv_cov_new + inv_md2u * inv_md2u
                } else {
                    inv_md2u * inv_md2u
                }
            }
        }
    }
}

impl SearchStrategy for WeightedRandomSearcher {
    fn select(&mut self, ctx: &mut ExplorationContext) -> StateId {
        let u: f64 = ctx.rng.gen::<f64>();
        self.states.choose(u)
    }

    fn update(
        &mut self,
        ctx: &mut ExplorationContext,
        current: Option<StateId>,
        added: &[StateId],
        removed: &[StateId],
    ) {
        if let Some(cur) = live_current(current, removed) {
            if self.weight_type.updates_on_step() && self.states.contains(&cur) {
                let w = self.compute_weight(ctx, cur);
                self.states.update(&cur, w);
            }
        }
        for &state in added {
            let w = self.compute_weight(ctx, state);
            self.states.insert(state, w);
        }
        for state in removed {
            assert!(
                self.states.contains(state),
                "invalid state {} removed",
                state
            );
            self.states.remove(state);
        }
    }

    fn empty(&self, _ctx: &ExplorationContext) -> bool {
        self.states.is_empty()
    }

    fn describe(&self) -> String {
        format!("WeightedRandomSearcher::{}", self.weight_type)
    }
}
