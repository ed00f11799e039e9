// SPDX-License-Identifier: Apache-2.0

//! The exploration context: everything a searcher reads or annotates
//! between engine steps, gathered in one explicitly passed value.
//!
//! The engine-facing helpers (`fork`, `observe_store`, `reach_branch`, ...)
//! perform the bookkeeping the interpreter does around a step, so that the
//! searchers can be driven from tests and from the replay driver without a
//! real interpreter.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::coverage::CoverageQueues;
use crate::dependency::{DependencyTable, ProgramModel};
use crate::merge::MergeGroup;
use crate::ptree::PTree;
use crate::state::{BranchId, BranchInterest, ExecutionState, InstLocation, StateId, StoreId};

#[derive(Debug, Clone, Default)]
pub struct Statistics {
    /// Instructions executed across all states.
    pub instructions: u64,
    per_location: HashMap<InstLocation, u64>,
}

impl Statistics {
    pub fn instructions_at(&self, loc: InstLocation) -> u64 {
        self.per_location.get(&loc).copied().unwrap_or(0)
    }

    fn record(&mut self, loc: InstLocation) {
        self.instructions += 1;
        *self.per_location.entry(loc).or_insert(0) += 1;
    }
}

/// Time source for the time-budgeted searchers.
#[derive(Debug, Clone)]
pub enum Clock {
    Wall(Instant),
    /// Advanced explicitly; keeps runs reproducible.
    Manual(Duration),
}

impl Clock {
    pub fn wall() -> Self {
        Clock::Wall(Instant::now())
    }

    pub fn manual() -> Self {
        Clock::Manual(Duration::ZERO)
    }

    /// Time elapsed since the clock was created.
    pub fn now(&self) -> Duration {
        match self {
            Clock::Wall(start) => start.elapsed(),
            Clock::Manual(now) => *now,
        }
    }

    pub fn advance(&mut self, by: Duration) {
        match self {
            Clock::Wall(_) => panic!("cannot advance a wall clock"),
            Clock::Manual(now) => *now += by,
        }
    }
}

pub struct ExplorationContext {
    states: BTreeMap<StateId, ExecutionState>,
    next_state_id: u64,
    pub tree: PTree,
    pub coverage: CoverageQueues,
    pub dependencies: DependencyTable,
    pub program: ProgramModel,
    pub stats: Statistics,
    pub clock: Clock,
    pub rng: Xoshiro256PlusPlus,
    pub merge_groups: Vec<MergeGroup>,
}

impl ExplorationContext {
    pub fn new(dependencies: DependencyTable, program: ProgramModel, seed: u64) -> Self {
        Self {
            states: BTreeMap::new(),
            next_state_id: 0,
            tree: PTree::new(),
            coverage: CoverageQueues::default(),
            dependencies,
            program,
            stats: Statistics::default(),
            clock: Clock::wall(),
            rng: Xoshiro256PlusPlus::seed_from_u64(seed),
            merge_groups: Vec::new(),
        }
    }

    /// A context with no dependency facts and a manual clock.
    pub fn for_testing(seed: u64) -> Self {
        let mut ctx = Self::new(DependencyTable::default(), ProgramModel::default(), seed);
        ctx.clock = Clock::manual();
        ctx
    }

    pub fn state(&self, id: StateId) -> &ExecutionState {
        self.states
            .get(&id)
            .unwrap_or_else(|| panic!("unknown state {}", id))
    }

    pub fn state_mut(&mut self, id: StateId) -> &mut ExecutionState {
        self.states
            .get_mut(&id)
            .unwrap_or_else(|| panic!("unknown state {}", id))
    }

    pub fn contains_state(&self, id: StateId) -> bool {
        self.states.contains_key(&id)
    }

    pub fn live_states(&self) -> impl Iterator<Item = StateId> + '_ {
        self.states.keys().copied()
    }

    pub fn live_state_count(&self) -> usize {
        self.states.len()
    }

    fn fresh_id(&mut self) -> StateId {
        let id = StateId(self.next_state_id);
        self.next_state_id += 1;
        id
    }

    /// Creates the initial state at `pc`. The caller hands it to the searcher
    /// through `update(None, [id], [])`.
    pub fn spawn_initial_state(&mut self, pc: InstLocation) -> StateId {
        let id = self.fresh_id();
        let node = self.tree.set_root(id);
        self.states.insert(id, ExecutionState::new(id, pc, node));
        id
    }

    /// Splits `parent` into two states; returns the new sibling.
    pub fn fork(&mut self, parent: StateId) -> StateId {
        let child = self.fresh_id();
        let parent_node = self.state(parent).tree_node;
        let (left, right) = self.tree.attach(parent_node, parent, child);
        let p = self.state_mut(parent);
        p.depth += 1;
        p.tree_node = left;
        let c = p.fork_child(child, right);
        self.states.insert(child, c);
        log::trace!("fork: state {} -> {}", parent, child);
        child
    }

    /// Drops a state for good. Call after the searcher saw it in `removed`.
    pub fn terminate(&mut self, id: StateId) {
        let state = self
            .states
            .remove(&id)
            .unwrap_or_else(|| panic!("terminating unknown state {}", id));
        self.tree.remove(state.tree_node);
        for g in self.merge_groups.iter_mut() {
            g.remove_state(id);
        }
    }

    /// Advances `id` by one instruction, landing at `pc`.
    pub fn step(&mut self, id: StateId, pc: InstLocation) {
        self.stats.record(pc);
        let total = self.stats.instructions;
        let s = self.state_mut(id);
        s.pc = pc;
        s.insts_since_cov_new += 1;
        s.call_path_instructions += 1;
        self.coverage.note_instructions(total);
    }

    pub fn mark_covered_new(&mut self, id: StateId) {
        let s = self.state_mut(id);
        s.covered_new = true;
        s.insts_since_cov_new = 0;
    }

    /// `id` just executed tracked store `sid`, writing `value`. One interest
    /// record is appended for every targeted branch the store can affect.
    pub fn observe_store(&mut self, id: StateId, sid: StoreId, value: i32) {
        let interests: Vec<BranchInterest> = self
            .dependencies
            .branches_affected_by(sid)
            .filter(|bid| self.coverage.is_targeted(*bid))
            .map(|target_branch| BranchInterest {
                target_branch,
                store: sid,
            })
            .collect();
        self.coverage.new_branch_num_from_store += interests.len();
        let s = self.state_mut(id);
        s.store_values.insert(sid, value);
        s.reached_store = true;
        s.branch_interests.extend(interests);
    }

    /// `id` just executed tracked branch `bid`.
    pub fn reach_branch(&mut self, id: StateId, bid: BranchId) {
        self.state_mut(id).reached_branch = Some(bid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependency::{BranchDependency, Predicate};
    use maplit::{btreemap, btreeset};

    #[test]
    fn test_fork_and_terminate_keep_tree_in_sync() {
        let mut ctx = ExplorationContext::for_testing(0);
        let root = ctx.spawn_initial_state(InstLocation::new(0, 0));
        let child = ctx.fork(root);
        assert_eq!(ctx.state(root).depth, 1);
        assert_eq!(ctx.state(child).depth, 1);
        let root_node = ctx.tree.root().unwrap();
        assert_eq!(ctx.tree.state(ctx.state(root).tree_node), Some(root));
        assert_eq!(ctx.tree.state(ctx.state(child).tree_node), Some(child));
        assert_eq!(ctx.tree.parent(ctx.state(child).tree_node), Some(root_node));

        ctx.terminate(child);
        assert!(!ctx.contains_state(child));
        assert_eq!(ctx.tree.right(root_node), None);
        ctx.terminate(root);
        assert_eq!(ctx.tree.root(), None);
        assert_eq!(ctx.live_state_count(), 0);
    }

    #[test]
    fn test_observe_store_appends_targeted_interests() {
        let deps = DependencyTable::new(btreemap! {
            1 => BranchDependency {
                stores: btreeset! {7},
                predicate: Predicate::MultiWay { uncovered: btreeset! {1} },
            },
            2 => BranchDependency {
                stores: btreeset! {7},
                predicate: Predicate::MultiWay { uncovered: btreeset! {1} },
            },
        });
        let mut ctx = ExplorationContext::new(deps, ProgramModel::default(), 0);
        ctx.coverage.targeted = vec![2];
        let s = ctx.spawn_initial_state(InstLocation::new(0, 0));
        ctx.observe_store(s, 7, 11);
        let st = ctx.state(s);
        assert!(st.reached_store);
        assert_eq!(st.store_values.get(&7), Some(&11));
        assert_eq!(
            st.branch_interests,
            vec![BranchInterest {
                target_branch: 2,
                store: 7
            }]
        );
        assert_eq!(ctx.coverage.new_branch_num_from_store, 1);
    }

    #[test]
    fn test_step_counts_instructions() {
        let mut ctx = ExplorationContext::for_testing(0);
        let s = ctx.spawn_initial_state(InstLocation::new(0, 0));
        ctx.step(s, InstLocation::new(0, 1));
        ctx.step(s, InstLocation::new(0, 1));
        ctx.step(s, InstLocation::new(0, 2));
        assert_eq!(ctx.stats.instructions, 3);
        assert_eq!(ctx.stats.instructions_at(InstLocation::new(0, 1)), 2);
        assert_eq!(ctx.state(s).pc, InstLocation::new(0, 2));
        assert_eq!(ctx.state(s).insts_since_cov_new, 3);
        ctx.mark_covered_new(s);
        assert_eq!(ctx.state(s).insts_since_cov_new, 0);
    }

    #[test]
    fn test_manual_clock_advances() {
        let mut clock = Clock::manual();
        clock.advance(Duration::from_millis(5));
        clock.advance(Duration::from_millis(7));
        assert_eq!(clock.now(), Duration::from_millis(12));
    }
}
