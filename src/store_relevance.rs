// SPDX-License-Identifier: Apache-2.0

//! Memoized "can this stored value newly cover that branch" classification.

use std::collections::{HashMap, HashSet};

use crate::dependency::{BranchDependency, Predicate};
use crate::state::BranchId;

/// Per-branch cache of store values already classified.
///
/// For a given branch a value only ever lands in one of the two sets, so
/// repeated questions about the same `(branch, value)` pair always get the
/// same answer.
#[derive(Debug, Clone, Default)]
pub struct StoreRelevanceCache {
    invalid: HashMap<BranchId, HashSet<i32>>,
    valid: HashMap<BranchId, HashSet<i32>>,
}

impl StoreRelevanceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classifies `value` as new (can help cover `bid`) or not.
    ///
    /// The first value ever classified for a branch is new unconditionally:
    /// the state that produced it is the one that reached the branch, and the
    /// value itself is recorded as known so later states repeating it are not
    /// prioritized.
    pub fn is_new(&mut self, bid: BranchId, value: i32, dep: &BranchDependency) -> bool {
        let Some(invalid) = self.invalid.get_mut(&bid) else {
            log::debug!("branch {}: bootstrap value {} is new", bid, value);
            self.invalid.entry(bid).or_default().insert(value);
            return true;
        };
        if invalid.contains(&value) {
            return false;
        }
        if self.valid.get(&bid).is_some_and(|v| v.contains(&value)) {
            return true;
        }

        let is_new = evaluate(bid, value, dep);
        if is_new {
            self.valid.entry(bid).or_default().insert(value);
        } else {
            invalid.insert(value);
        }
        log::debug!("branch {}: store value {} new={}", bid, value, is_new);
        is_new
    }

    /// Whether the pair has been classified before, and how.
    pub fn cached(&self, bid: BranchId, value: i32) -> Option<bool> {
        if self.invalid.get(&bid).is_some_and(|v| v.contains(&value)) {
            Some(false)
        } else if self.valid.get(&bid).is_some_and(|v| v.contains(&value)) {
            Some(true)
        } else {
            None
        }
    }
}

fn evaluate(bid: BranchId, value: i32, dep: &BranchDependency) -> bool {
    match &dep.predicate {
        Predicate::MultiWay { uncovered } => uncovered.contains(&value),
        Predicate::Binary {
            op,
            constant,
            adjust,
        } => {
            let adjusted = adjust.map_or(value, |a| a.apply(value));
            match op.eval(adjusted, *constant) {
                Some(holds) => holds,
                None => {
                    log::warn!(
                        "branch {}: unrecognized predicate operator {:?}; treating value {} as not new",
                        bid,
                        op.to_string(),
                        value
                    );
                    false
                }
            }
        }
    }
}
