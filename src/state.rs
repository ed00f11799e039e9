// SPDX-License-Identifier: Apache-2.0

//! Scheduling-relevant view of an execution state.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ptree::NodeId;

pub type BranchId = u32;
pub type StoreId = u32;
pub type FunctionId = u32;
pub type BlockId = u32;

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct StateId(pub u64);

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A program point at basic-block granularity.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct InstLocation {
    pub function: FunctionId,
    pub block: BlockId,
}

impl InstLocation {
    pub fn new(function: FunctionId, block: BlockId) -> Self {
        Self { function, block }
    }
}

/// Hint that a state might newly cover `target_branch` through the value it
/// stored at `store`.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub struct BranchInterest {
    pub target_branch: BranchId,
    pub store: StoreId,
}

#[derive(Debug, Clone)]
pub struct ExecutionState {
    pub id: StateId,
    pub depth: u32,
    pub pc: InstLocation,
    pub tree_node: NodeId,

    /// Set by the engine when the last step executed a tracked branch.
    pub reached_branch: Option<BranchId>,
    /// Set by the engine when the last step executed a tracked store.
    pub reached_store: bool,
    pub covered_new: bool,

    /// Last value observed per tracked store.
    pub store_values: HashMap<StoreId, i32>,
    pub branch_interests: Vec<BranchInterest>,

    // Inputs to the weighted-random heuristics.
    pub insts_since_cov_new: u64,
    pub call_path_instructions: u64,
    pub query_cost: Duration,
    pub min_dist_to_uncovered: u64,
}

impl ExecutionState {
    pub fn new(id: StateId, pc: InstLocation, tree_node: NodeId) -> Self {
        Self {
            id,
            depth: 0,
            pc,
            tree_node,
            reached_branch: None,
            reached_store: false,
            covered_new: false,
            store_values: HashMap::new(),
            branch_interests: Vec::new(),
            insts_since_cov_new: 0,
            call_path_instructions: 0,
            query_cost: Duration::ZERO,
            min_dist_to_uncovered: 0,
        }
    }

    /// Creates the sibling produced by a fork. Observed values and interest
    /// records carry over; per-step event flags do not.
    pub fn fork_child(&self, id: StateId, tree_node: NodeId) -> Self {
        Self {
            id,
            depth: self.depth,
            pc: self.pc,
            tree_node,
            reached_branch: None,
            reached_store: false,
            covered_new: false,
            store_values: self.store_values.clone(),
            branch_interests: self.branch_interests.clone(),
            insts_since_cov_new: self.insts_since_cov_new,
            call_path_instructions: self.call_path_instructions,
            query_cost: self.query_cost,
            min_dist_to_uncovered: self.min_dist_to_uncovered,
        }
    }

    pub fn has_interests(&self) -> bool {
        !self.branch_interests.is_empty()
    }

    /// Removes the first record naming `branch`. Returns whether one was found.
    pub fn drop_first_interest_in(&mut self, branch: BranchId) -> bool {
        match self
            .branch_interests
            .iter()
            .position(|b| b.target_branch == branch)
        {
            Some(i) => {
                self.branch_interests.remove(i);
                true
            }
            None => false,
        }
    }

    /// Removes every record naming `branch`.
    pub fn drop_interests_in(&mut self, branch: BranchId) {
        self.branch_interests.retain(|b| b.target_branch != branch);
    }
}
