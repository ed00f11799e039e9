// SPDX-License-Identifier: Apache-2.0

//! State scheduling for a path-exploring symbolic execution engine.
//!
//! The engine drives a [`searcher::Searcher`] through three calls:
//! `select` picks the next state to resume, `update` reconciles bookkeeping
//! after a step (with the states that were forked and the states that went
//! away), and `empty` says whether anything is left to run. All scheduling
//! inputs (live states, the exploration tree, coverage queues, dependency
//! facts) live in an [`context::ExplorationContext`] that is handed to every
//! call.
//!
//! Besides the classic strategies (depth-first, breadth-first, random,
//! weighted random, random path) and their decorators (batching, merging,
//! iterative deepening, interleaving) the crate provides a
//! dependency-guided searcher that uses offline "which store can influence
//! which branch" facts to prioritize states likely to flip an uncovered
//! branch outcome.

pub mod config;
pub mod context;
pub mod coverage;
pub mod dependency;
mod depsched_error;
pub mod merge;
pub mod ptree;
pub mod searcher;
pub mod state;
pub mod store_relevance;

pub use config::{construct_searcher, SearchKind, SearcherConfig};
pub use context::ExplorationContext;
pub use depsched_error::DepschedError;
pub use searcher::{SearchStrategy, Searcher};
pub use state::{BranchId, BranchInterest, ExecutionState, InstLocation, StateId, StoreId};
