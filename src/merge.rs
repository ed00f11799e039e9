// SPDX-License-Identifier: Apache-2.0

//! Merge groups: states converging on a common close-merge point.
//!
//! States that already arrived at the close point are paused (they sit in
//! `arrived` and are hidden from the inner searcher by the merging
//! searcher). States still running toward it are `open`. While the group's
//! wait budget lasts, the merging searcher prefers an open state so that the
//! stragglers catch up; once it runs out the arrived states are released.

use crate::state::StateId;

/// Default number of instructions a group waits for stragglers after its
/// first arrival.
pub const DEFAULT_MAX_WAIT_INSTRUCTIONS: u64 = 10_000;

#[derive(Debug, Clone)]
pub struct MergeGroup {
    open: Vec<StateId>,
    arrived: Vec<StateId>,
    first_arrival_instructions: Option<u64>,
    max_wait_instructions: u64,
}

impl MergeGroup {
    pub fn new(max_wait_instructions: u64) -> Self {
        Self {
            open: Vec::new(),
            arrived: Vec::new(),
            first_arrival_instructions: None,
            max_wait_instructions,
        }
    }

    /// Registers a state that entered the merge region.
    pub fn open_state(&mut self, state: StateId) {
        if !self.open.contains(&state) {
            self.open.push(state);
        }
    }

    /// Moves `state` from open to arrived. `now_instructions` is the global
    /// instruction count at arrival.
    pub fn arrive(&mut self, state: StateId, now_instructions: u64) {
        self.open.retain(|s| *s != state);
        assert!(
            !self.arrived.contains(&state),
            "state {} arrived at the close-merge point twice",
            state
        );
        self.arrived.push(state);
        self.first_arrival_instructions.get_or_insert(now_instructions);
    }

    pub fn has_merged_states(&self) -> bool {
        !self.arrived.is_empty()
    }

    pub fn arrived(&self) -> &[StateId] {
        &self.arrived
    }

    pub fn open(&self) -> &[StateId] {
        &self.open
    }

    /// The open state worth running next, or `None` when there is none or
    /// the group has waited long enough.
    pub fn prioritized_state(&self, now_instructions: u64) -> Option<StateId> {
        let first = self.first_arrival_instructions?;
        if now_instructions.saturating_sub(first) > self.max_wait_instructions {
            return None;
        }
        self.open.first().copied()
    }

    /// Hands back every arrived state so it can resume.
    pub fn release_states(&mut self) -> Vec<StateId> {
        self.first_arrival_instructions = None;
        std::mem::take(&mut self.arrived)
    }

    /// Forgets a state that terminated.
    pub fn remove_state(&mut self, state: StateId) {
        self.open.retain(|s| *s != state);
        self.arrived.retain(|s| *s != state);
        if self.arrived.is_empty() {
            self.first_arrival_instructions = None;
        }
    }
}
