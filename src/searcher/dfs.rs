// SPDX-License-Identifier: Apache-2.0

//! Depth-first: always resume the most recently inserted state.

use crate::context::ExplorationContext;
use crate::searcher::SearchStrategy;
use crate::state::StateId;

#[derive(Debug, Default)]
pub struct DfsSearcher {
    states: Vec<StateId>,
}

impl DfsSearcher {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SearchStrategy for DfsSearcher {
    fn select(&mut self, _ctx: &mut ExplorationContext) -> StateId {
        *self.states.last().expect("select on an empty DFS searcher")
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
            if self.states.last() == Some(state) {
                self.states.pop();
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
        "DFSSearcher".to_string()
    }
}
