// SPDX-License-Identifier: Apache-2.0

//! Replays a JSON-lines trace of engine events against a searcher.
//!
//! Each line is one event tagged by its `event` field, e.g.
//! `{"event": "fork", "state": 0}`. Events mutate the exploration context
//! the way the interpreter would; the accumulated `added`/`removed` lists
//! are handed to the searcher on `update` (and implicitly before every
//! `select`). The initial state is handed over as soon as it is spawned.

use std::io::{BufRead, Write};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use depsched::merge::{MergeGroup, DEFAULT_MAX_WAIT_INSTRUCTIONS};
use depsched::{
    BranchId, ExplorationContext, InstLocation, SearchStrategy, Searcher, StateId, StoreId,
};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case", deny_unknown_fields)]
pub enum TraceEvent {
    Spawn {
        pc: InstLocation,
    },
    Step {
        state: StateId,
        pc: InstLocation,
    },
    Fork {
        state: StateId,
    },
    Terminate {
        state: StateId,
    },
    Store {
        state: StateId,
        store: StoreId,
        value: i32,
    },
    Branch {
        state: StateId,
        branch: BranchId,
    },
    FullyCovered {
        branch: BranchId,
    },
    PartlyCovered {
        branch: BranchId,
    },
    CoveredNew {
        state: StateId,
    },
    /// Weighted-random inputs the interpreter would otherwise supply.
    Annotate {
        state: StateId,
        #[serde(default)]
        query_cost_us: Option<u64>,
        #[serde(default)]
        min_dist_to_uncovered: Option<u64>,
    },
    OpenMerge {
        group: usize,
        state: StateId,
    },
    CloseMerge {
        group: usize,
        state: StateId,
    },
    /// Advances the context clock when it is a manual one.
    Tick {
        ms: u64,
    },
    Refresh,
    Update,
    Select,
}

pub struct Replay {
    pub ctx: ExplorationContext,
    pub searcher: Searcher,
    current: Option<StateId>,
    added: Vec<StateId>,
    removed: Vec<StateId>,
    pending: bool,
    selections: usize,
}

impl Replay {
    pub fn new(ctx: ExplorationContext, searcher: Searcher) -> Self {
        Self {
            ctx,
            searcher,
            current: None,
            added: Vec::new(),
            removed: Vec::new(),
            pending: false,
            selections: 0,
        }
    }

    pub fn selections(&self) -> usize {
        self.selections
    }

    fn live(&self, state: StateId) -> Result<StateId> {
        if !self.ctx.contains_state(state) {
            bail!("state {} does not exist", state);
        }
        if self.removed.contains(&state) {
            bail!("state {} was already terminated", state);
        }
        Ok(state)
    }

    /// Hands the accumulated step outcome to the searcher, then drops the
    /// terminated states from the context.
    pub fn flush(&mut self) {
        if !self.pending {
            return;
        }
        let added = std::mem::take(&mut self.added);
        let removed = std::mem::take(&mut self.removed);
        log::trace!(
            "update current={:?} added={:?} removed={:?}",
            self.current,
            added,
            removed
        );
        self.searcher
            .update(&mut self.ctx, self.current, &added, &removed);
        for state in removed {
            self.ctx.terminate(state);
        }
        if self.current.is_some_and(|c| !self.ctx.contains_state(c)) {
            self.current = None;
        }
        self.pending = false;
    }

    /// Applies one event; returns the selected state for `select`.
    pub fn apply(&mut self, event: TraceEvent) -> Result<Option<StateId>> {
        match event {
            TraceEvent::Spawn { pc } => {
                self.flush();
                let state = self.ctx.spawn_initial_state(pc);
                self.searcher.update(&mut self.ctx, None, &[state], &[]);
            }
            TraceEvent::Step { state, pc } => {
                let state = self.live(state)?;
                self.ctx.step(state, pc);
                self.current = Some(state);
                self.pending = true;
            }
            TraceEvent::Fork { state } => {
                let state = self.live(state)?;
                let child = self.ctx.fork(state);
                log::debug!("state {} forked {}", state, child);
                self.current = Some(state);
                self.added.push(child);
                self.pending = true;
            }
            TraceEvent::Terminate { state } => {
                let state = self.live(state)?;
                self.removed.push(state);
                self.pending = true;
            }
            TraceEvent::Store {
                state,
                store,
                value,
            } => {
                let state = self.live(state)?;
                self.ctx.observe_store(state, store, value);
            }
            TraceEvent::Branch { state, branch } => {
                let state = self.live(state)?;
                self.ctx.reach_branch(state, branch);
            }
            TraceEvent::FullyCovered { branch } => self.ctx.coverage.mark_fully_covered(branch),
            TraceEvent::PartlyCovered { branch } => self.ctx.coverage.mark_partly_covered(branch),
            TraceEvent::CoveredNew { state } => {
                let state = self.live(state)?;
                self.ctx.mark_covered_new(state);
            }
            TraceEvent::Annotate {
                state,
                query_cost_us,
                min_dist_to_uncovered,
            } => {
                let state = self.live(state)?;
                let s = self.ctx.state_mut(state);
                if let Some(us) = query_cost_us {
                    s.query_cost = Duration::from_micros(us);
                }
                if let Some(d) = min_dist_to_uncovered {
                    s.min_dist_to_uncovered = d;
                }
            }
            TraceEvent::OpenMerge { group, state } => {
                let state = self.live(state)?;
                self.merge_group(group).open_state(state);
            }
            TraceEvent::CloseMerge { group, state } => {
                let state = self.live(state)?;
                self.flush();
                self.merge_group(group);
                let merging = self
                    .searcher
                    .merging_mut()
                    .ok_or_else(|| anyhow!("close_merge needs a configuration with use_merge"))?;
                merging.close_merge(&mut self.ctx, group, state);
            }
            TraceEvent::Tick { ms } => {
                if matches!(self.ctx.clock, depsched::context::Clock::Wall(_)) {
                    bail!("tick needs a manual clock");
                }
                self.ctx.clock.advance(Duration::from_millis(ms));
            }
            TraceEvent::Refresh => self.ctx.coverage.request_refresh(),
            TraceEvent::Update => {
                self.pending = true;
                self.flush();
            }
            TraceEvent::Select => {
                self.flush();
                if self.searcher.empty(&self.ctx) {
                    bail!("select with no states left");
                }
                let state = self.searcher.select(&mut self.ctx);
                self.current = Some(state);
                self.selections += 1;
                return Ok(Some(state));
            }
        }
        Ok(None)
    }

    fn merge_group(&mut self, group: usize) -> &mut MergeGroup {
        while self.ctx.merge_groups.len() <= group {
            self.ctx
                .merge_groups
                .push(MergeGroup::new(DEFAULT_MAX_WAIT_INSTRUCTIONS));
        }
        &mut self.ctx.merge_groups[group]
    }

    /// Replays every event in `trace`, writing one `select state=<id>` line
    /// per selection to `out`.
    pub fn run(&mut self, trace: impl BufRead, mut out: impl Write) -> Result<()> {
        for (lineno, line) in trace.lines().enumerate() {
            let line = line.with_context(|| format!("reading trace line {}", lineno + 1))?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let event: TraceEvent = serde_json::from_str(line)
                .with_context(|| format!("trace line {}: malformed event", lineno + 1))?;
            if let Some(state) = self
                .apply(event)
                .with_context(|| format!("trace line {}", lineno + 1))?
            {
                writeln!(out, "select state={}", state)?;
            }
        }
        self.flush();
        Ok(())
    }
}
