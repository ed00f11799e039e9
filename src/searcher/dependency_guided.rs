// SPDX-License-Identifier: Apache-2.0

//! Dependency-guided search.
//!
//! Live states are split into a `priority` pool and a `default` pool, each
//! served breadth-first, with `priority` always served first. A state is in
//! `priority` while it carries branch-interest records: hints that a value
//! it stored can flip a branch outcome not covered yet. Records are created
//! and retired from the coverage events the engine leaves in the
//! [`ExplorationContext`], using the offline dependency facts to decide
//! whether an observed value is worth chasing.

use std::collections::VecDeque;

use crate::context::ExplorationContext;
use crate::searcher::{live_current, SearchStrategy};
use crate::state::{BranchId, BranchInterest, StateId, StoreId};
use crate::store_relevance::StoreRelevanceCache;

#[derive(Debug, Default)]
pub struct DependencyGuidedSearcher {
    default_pool: VecDeque<StateId>,
    priority_pool: VecDeque<StateId>,
    relevance: StoreRelevanceCache,
}

fn remove_from(pool: &mut VecDeque<StateId>, state: StateId) -> bool {
    match pool.iter().position(|s| *s == state) {
        Some(pos) => {
            pool.remove(pos);
            true
        }
        None => false,
    }
}

impl DependencyGuidedSearcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn priority_states(&self) -> &VecDeque<StateId> {
        &self.priority_pool
    }

    pub fn default_states(&self) -> &VecDeque<StateId> {
        &self.default_pool
    }

    pub fn in_priority(&self, state: StateId) -> bool {
        self.priority_pool.contains(&state)
    }

    pub fn relevance(&self) -> &StoreRelevanceCache {
        &self.relevance
    }

    /// Moves `state` from `default` to the tail of `priority`. A state that
    /// is already prioritized stays where it is.
    fn promote(&mut self, state: StateId) {
        if remove_from(&mut self.default_pool, state) {
            log::debug!("state {} -> priority", state);
            self.priority_pool.push_back(state);
        }
    }

    fn demote(&mut self, state: StateId, to_front: bool) {
        if remove_from(&mut self.priority_pool, state) {
            log::debug!("state {} -> default", state);
            if to_front {
                self.default_pool.push_front(state);
            } else {
                self.default_pool.push_back(state);
            }
        }
    }

    fn requeue(&mut self, state: StateId) {
        if remove_from(&mut self.priority_pool, state) {
            self.priority_pool.push_back(state);
        } else if remove_from(&mut self.default_pool, state) {
            self.default_pool.push_back(state);
        } else {
            panic!("current state {} is not queued", state);
        }
    }

    /// Whether the value `state` stored at `sid` can help cover `bid`.
    /// A state without a value for the store, or a branch without facts,
    /// never qualifies.
    fn classify(
        &mut self,
        ctx: &ExplorationContext,
        state: StateId,
        bid: BranchId,
        sid: StoreId,
    ) -> bool {
        let Some(&value) = ctx.state(state).store_values.get(&sid) else {
            return false;
        };
        let Some(dep) = ctx.dependencies.get(bid) else {
            return false;
        };
        self.relevance.is_new(bid, value, dep)
    }

    /// `bid` was reached without covering every outcome. `current` (when
    /// there is one) is tagged with an interest record per dependent store
    /// and prioritized; every other default-pool state that already stored
    /// a new value for one of those stores is prioritized as well.
    pub fn handle_partly_covered(
        &mut self,
        ctx: &mut ExplorationContext,
        current: Option<StateId>,
        bid: BranchId,
    ) {
        let stores: Vec<StoreId> = match ctx.dependencies.get(bid) {
            Some(dep) if !dep.stores.is_empty() => dep.stores.iter().copied().collect(),
            _ => {
                log::debug!("branch {}: no dependency facts, nothing to prioritize", bid);
                return;
            }
        };

        if let Some(cur) = current {
            for &sid in stores.iter() {
                if ctx.state(cur).store_values.contains_key(&sid) {
                    self.classify(ctx, cur, bid, sid);
                }
                ctx.state_mut(cur).branch_interests.push(BranchInterest {
                    target_branch: bid,
                    store: sid,
                });
            }
            self.promote(cur);
        }

        for &sid in stores.iter() {
            let candidates: Vec<StateId> = self
                .default_pool
                .iter()
                .copied()
                .filter(|s| Some(*s) != current)
                .collect();
            for state in candidates {
                if !ctx.state(state).store_values.contains_key(&sid)
                    || !self.classify(ctx, state, bid, sid)
                {
                    continue;
                }
                let st = ctx.state_mut(state);
                st.reached_branch = None;
                st.reached_store = false;
                st.branch_interests.push(BranchInterest {
                    target_branch: bid,
                    store: sid,
                });
                self.promote(state);
            }
        }
    }

    /// `bid` is fully covered: stores that no longer affect any open branch
    /// are retired, and every queued state forgets its records for `bid`.
    /// Prioritized states other than `current` left without records are
    /// demoted.
    pub fn handle_fully_covered(
        &mut self,
        ctx: &mut ExplorationContext,
        current: Option<StateId>,
        bid: BranchId,
    ) {
        let stores: Vec<StoreId> = ctx
            .dependencies
            .get(bid)
            .map(|dep| dep.stores.iter().copied().collect())
            .unwrap_or_default();
        let mut retired = Vec::new();
        for sid in stores {
            if ctx.dependencies.retire_branch_for_store(sid, bid) {
                ctx.program.remove_candidate_store(sid);
                retired.push(sid);
            }
        }
        if !retired.is_empty() {
            log::debug!("branch {} covered; retiring stores {:?}", bid, retired);
        }

        // Resumed states re-enter `default` with their records intact.
        for &state in self.default_pool.iter() {
            ctx.state_mut(state).drop_interests_in(bid);
        }

        let prioritized: Vec<StateId> = self.priority_pool.iter().copied().collect();
        for state in prioritized {
            let st = ctx.state_mut(state);
            for sid in retired.iter() {
                st.store_values.remove(sid);
            }
            st.drop_interests_in(bid);
            if Some(state) != current && !st.has_interests() {
                self.demote(state, false);
            }
        }
    }

    /// Drops every queued state's records, demoting those that have not
    /// covered anything new, and replaces the targeted branches with the most
    /// recent entries of the partly-covered log.
    fn refresh_targets(&mut self, ctx: &mut ExplorationContext, current: Option<StateId>) {
        for &state in self.default_pool.iter() {
            ctx.state_mut(state).branch_interests.clear();
        }
        let prioritized: Vec<StateId> = self.priority_pool.iter().copied().collect();
        for state in prioritized {
            let st = ctx.state_mut(state);
            st.branch_interests.clear();
            if !st.covered_new {
                self.demote(state, false);
            }
        }

        ctx.coverage.targeted.clear();
        let fan_out = ctx.coverage.target_branch_num;
        let mut pulled = Vec::new();
        while pulled.len() < fan_out {
            let Some(bid) = ctx.coverage.partly_covered.pop() else {
                break;
            };
            ctx.coverage.targeted.push(bid);
            pulled.push(bid);
            self.handle_partly_covered(ctx, current, bid);
        }
        log::info!("refreshed target branches: {:?}", pulled);
        ctx.coverage.refresh_targets = false;
    }

    /// Re-examines the interest records the latest store event appended to
    /// `cur`, keeping only those whose stored value is new.
    fn process_store_event(&mut self, ctx: &mut ExplorationContext, cur: StateId) {
        let total = ctx.state(cur).branch_interests.len();
        let start = total - ctx.coverage.new_branch_num_from_store.min(total);
        let fresh: Vec<BranchInterest> = ctx.state(cur).branch_interests[start..].to_vec();
        let mut kept = Vec::with_capacity(fresh.len());
        for rec in fresh {
            if self.classify(ctx, cur, rec.target_branch, rec.store) {
                self.promote(cur);
                kept.push(rec);
            }
        }
        let st = ctx.state_mut(cur);
        st.branch_interests.truncate(start);
        st.branch_interests.extend(kept);
        st.reached_store = false;
        ctx.coverage.new_branch_num_from_store = 0;
    }

    fn process_branch_event(
        &mut self,
        ctx: &mut ExplorationContext,
        cur: StateId,
        reached: BranchId,
    ) {
        if ctx.coverage.new_fully_covered {
            if let Some(&covered) = ctx.coverage.fully_covered.last() {
                self.handle_fully_covered(ctx, Some(cur), covered);
            }
            if !ctx.state(cur).has_interests() {
                self.demote(cur, true);
            }
            ctx.coverage.new_fully_covered = false;
        } else {
            // Reached without newly covering it: the value this state was
            // prioritized for did not help after all.
            ctx.state_mut(cur).drop_first_interest_in(reached);
            if !ctx.state(cur).has_interests() {
                self.demote(cur, false);
            }
        }
        ctx.state_mut(cur).reached_branch = None;
    }
}

impl SearchStrategy for DependencyGuidedSearcher {
    fn select(&mut self, _ctx: &mut ExplorationContext) -> StateId {
        *self
            .priority_pool
            .front()
            .or_else(|| self.default_pool.front())
            .expect("select on an empty dependency-guided searcher")
    }

    fn update(
        &mut self,
        ctx: &mut ExplorationContext,
        current: Option<StateId>,
        added: &[StateId],
        removed: &[StateId],
    ) {
        let live = live_current(current, removed);

        if let Some(cur) = live {
            if !added.is_empty() {
                self.requeue(cur);
            }
            if let Some(reached) = ctx.state(cur).reached_branch {
                self.process_branch_event(ctx, cur, reached);
            }
            if ctx.state(cur).reached_store {
                self.process_store_event(ctx, cur);
            }
            if ctx.coverage.new_partly_covered {
                if let Some(&bid) = ctx.coverage.targeted.last() {
                    self.handle_partly_covered(ctx, Some(cur), bid);
                    ctx.coverage.new_partly_covered = false;
                }
            }
        }

        if ctx.coverage.refresh_targets {
            self.refresh_targets(ctx, live);
        }

        for &state in added {
            let prioritize = current.is_some() && {
                let st = ctx.state(state);
                st.has_interests()
                    || ctx.program.block_has_relevant_store(
                        st.pc.function,
                        st.pc.block,
                        &ctx.dependencies,
                    )
            };
            if prioritize {
                self.priority_pool.push_back(state);
            } else {
                self.default_pool.push_back(state);
            }
        }

        for &state in removed {
            if !remove_from(&mut self.priority_pool, state)
                && !remove_from(&mut self.default_pool, state)
            {
                panic!("invalid state {} removed", state);
            }
        }
    }

    fn empty(&self, _ctx: &ExplorationContext) -> bool {
        self.priority_pool.is_empty() && self.default_pool.is_empty()
    }

    fn describe(&self) -> String {
        format!(
            "DependencyGuidedSearcher default: {}, priority: {}",
            self.default_pool.len(),
            self.priority_pool.len()
        )
    }
}
