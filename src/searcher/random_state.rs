// SPDX-License-Identifier: Apache-2.0

//! Uniformly random choice among the live states.

use rand::Rng;

use crate::context::ExplorationContext;
use crate::searcher::SearchStrategy;
use crate::state::StateId;

#[derive(Debug, Default)]
pub struct RandomStateSearcher {
    states: Vec<StateId>,
}

impl RandomStateSearcher {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SearchStrategy for RandomStateSearcher {
    fn select(&mut self, ctx: &mut ExplorationContext) -> StateId {
        assert!(!self.states.is_empty(), "select on an empty random searcher");
        let i = ctx.rng.gen_range(0..self.states.len());
        self.states[i]
    }

    fn update(
        &mut self,
        _ctx: &mut ExplorationContext,
        _current: Option<StateId>,
        added: &[StateId],
        removed: &[StateId],
    ) {
        self.states.extend_from_slice(added);
        for state in removed {
            let pos = self
                .states
                .iter()
                .position(|s| s == state)
                .unwrap_or_else(|| panic!("invalid state {} removed", state));
            self.states.remove(pos);
        }
    }

    fn empty(&self, _ctx: &ExplorationContext) -> bool {
        self.states.is_empty()
    }

    fn describe(&self) -> String {
        "RandomSearcher".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_every_state_gets_picked() {
        let mut ctx = ExplorationContext::for_testing(3);
        let mut s = RandomStateSearcher::new();
        let states: Vec<StateId> = (0..4).map(StateId).collect();
        s.update(&mut ctx, None, &states, &[]);
        let mut counts: BTreeMap<StateId, usize> = BTreeMap::new();
        for _ in 0..4000 {
            *counts.entry(s.select(&mut ctx)).or_insert(0) += 1;
        }
        assert_eq!(counts.len(), 4);
        for (state, count) in counts {
            assert!(
                (800..1200).contains(&count),
                "state {} picked {} times",
                state,
                count
            );
        }
    }

    #[test]
    fn test_same_seed_same_choices() {
        let states: Vec<StateId> = (0..16).map(StateId).collect();
        let run = |seed| {
            let mut ctx = ExplorationContext::for_testing(seed);
            let mut s = RandomStateSearcher::new();
            s.update(&mut ctx, None, &states, &[]);
            (0..32).map(|_| s.select(&mut ctx)).collect::<Vec<_>>()
        };
        assert_eq!(run(11), run(11));
    }
}
