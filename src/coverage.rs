// SPDX-License-Identifier: Apache-2.0

//! Coverage queues shared between the engine and the dependency-guided
//! searcher.
//!
//! The engine records coverage events here; the searcher consumes them in
//! its next `update` and clears the event flags it handled.

use crate::state::BranchId;

/// Default number of branches pulled from the partly-covered log on a
/// target refresh.
pub const DEFAULT_TARGET_BRANCH_NUM: usize = 10;

/// Default number of executed instructions between target refreshes.
pub const DEFAULT_TARGET_UPDATE_INSTRUCTIONS: u64 = 300_000;

#[derive(Debug, Clone)]
pub struct CoverageQueues {
    /// Branches currently worth steering toward, most recent last.
    pub targeted: Vec<BranchId>,
    /// Branches that just became fully covered, most recent last.
    pub fully_covered: Vec<BranchId>,
    /// Branches that were reached but not fully covered, most recent last.
    pub partly_covered: Vec<BranchId>,

    pub new_fully_covered: bool,
    pub new_partly_covered: bool,
    pub refresh_targets: bool,

    /// How many branches a target refresh pulls from `partly_covered`.
    pub target_branch_num: usize,
    /// Interest records appended by store events since the searcher last
    /// looked at them.
    pub new_branch_num_from_store: usize,

    /// Zero disables periodic refreshes.
    pub target_update_instructions: u64,
    next_refresh_at: u64,
}

impl Default for CoverageQueues {
    fn default() -> Self {
        Self::new(DEFAULT_TARGET_BRANCH_NUM, DEFAULT_TARGET_UPDATE_INSTRUCTIONS)
    }
}

impl CoverageQueues {
    pub fn new(target_branch_num: usize, target_update_instructions: u64) -> Self {
        Self {
            targeted: Vec::new(),
            fully_covered: Vec::new(),
            partly_covered: Vec::new(),
            new_fully_covered: false,
            new_partly_covered: false,
            refresh_targets: false,
            target_branch_num,
            new_branch_num_from_store: 0,
            target_update_instructions,
            next_refresh_at: target_update_instructions,
        }
    }

    pub fn is_targeted(&self, bid: BranchId) -> bool {
        self.targeted.contains(&bid)
    }

    /// Records that `bid` is now fully covered. It stops being a target.
    pub fn mark_fully_covered(&mut self, bid: BranchId) {
        self.targeted.retain(|b| *b != bid);
        self.partly_covered.retain(|b| *b != bid);
        self.fully_covered.push(bid);
        self.new_fully_covered = true;
    }

    /// Records that `bid` was reached without covering every outcome. The
    /// branch becomes a target right away while there is room for it;
    /// otherwise it waits in the log for the next refresh.
    pub fn mark_partly_covered(&mut self, bid: BranchId) {
        if self.is_targeted(bid) {
            return;
        }
        if self.targeted.len() < self.target_branch_num {
            self.targeted.push(bid);
            self.new_partly_covered = true;
        } else if !self.partly_covered.contains(&bid) {
            self.partly_covered.push(bid);
        }
    }

    /// Raises the refresh flag each time `total_instructions` crosses
    /// another multiple of `target_update_instructions`.
    pub fn note_instructions(&mut self, total_instructions: u64) {
        if self.target_update_instructions == 0 {
            return;
        }
        if total_instructions >= self.next_refresh_at {
            self.refresh_targets = true;
            while self.next_refresh_at <= total_instructions {
                self.next_refresh_at += self.target_update_instructions;
            }
        }
    }

    pub fn request_refresh(&mut self) {
        self.refresh_targets = true;
    }
}
