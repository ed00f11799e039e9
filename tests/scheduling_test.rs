// SPDX-License-Identifier: Apache-2.0

//! End-to-end scheduling properties, driven through the public API the way
//! an engine would drive it.

use std::collections::{BTreeMap, BTreeSet};

use depsched::coverage::CoverageQueues;
use depsched::dependency::{BranchDependency, CmpOp, DependencyTable, Predicate, ProgramModel};
use depsched::searcher::{
    DependencyGuidedSearcher, MergingSearcher, RandomPathSearcher, WeightType,
    WeightedRandomSearcher,
};
use depsched::store_relevance::StoreRelevanceCache;
use depsched::{
    construct_searcher, ExplorationContext, InstLocation, SearchKind, SearchStrategy, Searcher,
    SearcherConfig, StateId,
};
use maplit::{btreemap, btreeset};
use pretty_assertions::assert_eq;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

fn binary(store: u32, op: CmpOp, constant: i32) -> BranchDependency {
    BranchDependency {
        stores: btreeset! {store},
        predicate: Predicate::Binary {
            op,
            constant,
            adjust: None,
        },
    }
}

#[test]
fn test_first_value_bootstraps_then_predicate_decides() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dep = binary(1, CmpOp::Eq, 7);
    let mut cache = StoreRelevanceCache::new();
    // X observes 5 first.
    assert!(cache.is_new(1, 5, &dep));
    // Y repeats it.
    assert!(!cache.is_new(1, 5, &dep));
    // Z finds the value the comparison wants.
    assert!(cache.is_new(1, 7, &dep));
    assert_eq!(cache.cached(1, 5), Some(false));
    assert_eq!(cache.cached(1, 7), Some(true));
    // Classification never flips.
    for _ in 0..3 {
        assert!(!cache.is_new(1, 5, &dep));
        assert!(cache.is_new(1, 7, &dep));
    }
}

#[test]
fn test_fork_requeues_parent_and_classifies_child() {
    let deps = DependencyTable::new(btreemap! { 1 => binary(5, CmpOp::Eq, 7) });
    let program = ProgramModel::new(btreemap! { 5 => InstLocation::new(2, 4) });
    let mut ctx = ExplorationContext::new(deps, program, 0);
    let mut s = Searcher::DependencyGuided(DependencyGuidedSearcher::new());

    let w = ctx.spawn_initial_state(InstLocation::new(2, 0));
    s.update(&mut ctx, None, &[w], &[]);
    let x = ctx.fork(w);
    s.update(&mut ctx, Some(w), &[x], &[]);

    // X sits in default; it steps into the block holding store 5 and forks.
    ctx.step(x, InstLocation::new(2, 4));
    let x2 = ctx.fork(x);
    s.update(&mut ctx, Some(x), &[x2], &[]);

    let dg = s.dependency_guided().unwrap();
    assert_eq!(dg.default_states().back(), Some(&x));
    assert!(dg.in_priority(x2));
    assert_eq!(s.select(&mut ctx), x2);
}

#[test]
fn test_full_coverage_demotes_only_states_left_without_interest() {
    let deps = DependencyTable::new(btreemap! {
        2 => binary(20, CmpOp::Ne, 0),
        3 => binary(30, CmpOp::Ne, 0),
    });
    let program = ProgramModel::new(btreemap! {
        20 => InstLocation::new(0, 1),
        30 => InstLocation::new(0, 2),
    });
    let mut ctx = ExplorationContext::new(deps, program, 0);
    let mut dg = DependencyGuidedSearcher::new();
    let root = ctx.spawn_initial_state(InstLocation::new(0, 0));
    let only_b2 = ctx.fork(root);
    let both_1 = ctx.fork(root);
    let both_2 = ctx.fork(root);
    dg.update(&mut ctx, None, &[root, only_b2, both_1, both_2], &[]);

    dg.handle_partly_covered(&mut ctx, Some(only_b2), 2);
    for s in [both_1, both_2] {
        dg.handle_partly_covered(&mut ctx, Some(s), 2);
        dg.handle_partly_covered(&mut ctx, Some(s), 3);
    }

    ctx.reach_branch(root, 2);
    ctx.coverage.mark_fully_covered(2);
    dg.update(&mut ctx, Some(root), &[], &[]);

    assert_eq!(
        dg.priority_states().iter().copied().collect::<Vec<_>>(),
        vec![both_1, both_2]
    );
    assert_eq!(
        dg.default_states().iter().copied().collect::<Vec<_>>(),
        vec![root, only_b2]
    );
    for s in [both_1, both_2] {
        let targets: Vec<u32> = ctx
            .state(s)
            .branch_interests
            .iter()
            .map(|i| i.target_branch)
            .collect();
        assert_eq!(targets, vec![3]);
    }
}

#[test]
fn test_paused_and_resumed_state_drops_covered_records() {
    let deps = DependencyTable::new(btreemap! { 2 => binary(20, CmpOp::Eq, 1) });
    let program = ProgramModel::new(btreemap! { 20 => InstLocation::new(0, 1) });
    let mut ctx = ExplorationContext::new(deps, program, 0);
    let dg = Searcher::DependencyGuided(DependencyGuidedSearcher::new());
    let mut s = Searcher::Merging(MergingSearcher::new(Box::new(dg), false));
    let r = ctx.spawn_initial_state(InstLocation::new(0, 0));
    s.update(&mut ctx, None, &[r], &[]);
    let y = ctx.fork(r);
    s.update(&mut ctx, Some(r), &[y], &[]);

    ctx.coverage.mark_partly_covered(2);
    s.update(&mut ctx, Some(r), &[], &[]);
    assert!(s.dependency_guided().unwrap().in_priority(r));

    let merging = s.merging_mut().unwrap();
    merging.pause_state(&mut ctx, r);
    merging.continue_state(&mut ctx, r);

    ctx.reach_branch(y, 2);
    ctx.coverage.mark_fully_covered(2);
    s.update(&mut ctx, Some(y), &[], &[]);

    for state in ctx.live_states() {
        for interest in ctx.state(state).branch_interests.iter() {
            assert!(
                ctx.coverage.is_targeted(interest.target_branch),
                "state {} holds a record for untargeted branch {}",
                state,
                interest.target_branch
            );
        }
    }
    assert!(ctx.state(r).branch_interests.is_empty());
}

fn assert_partitioned(dg: &DependencyGuidedSearcher, ctx: &ExplorationContext) {
    let priority: BTreeSet<StateId> = dg.priority_states().iter().copied().collect();
    let default: BTreeSet<StateId> = dg.default_states().iter().copied().collect();
    assert_eq!(priority.len(), dg.priority_states().len(), "duplicate in priority");
    assert_eq!(default.len(), dg.default_states().len(), "duplicate in default");
    assert!(priority.is_disjoint(&default));
    let live: BTreeSet<StateId> = ctx.live_states().collect();
    let queued: BTreeSet<StateId> = priority.union(&default).copied().collect();
    assert_eq!(queued, live);
}

#[test]
fn test_pools_partition_live_states_under_random_events() {
    let deps = DependencyTable::new(btreemap! {
        1 => binary(10, CmpOp::Gt, 50),
        2 => BranchDependency {
            stores: btreeset! {10, 11},
            predicate: Predicate::MultiWay { uncovered: btreeset! {3, 4, 5} },
        },
        3 => binary(12, CmpOp::Le, -3),
    });
    let program = ProgramModel::new(btreemap! {
        10 => InstLocation::new(0, 1),
        11 => InstLocation::new(0, 2),
        12 => InstLocation::new(1, 1),
    });
    let mut ctx = ExplorationContext::new(deps, program, 3);
    ctx.coverage = CoverageQueues::new(2, 40);
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(99);
    let mut dg = DependencyGuidedSearcher::new();
    let root = ctx.spawn_initial_state(InstLocation::new(0, 0));
    dg.update(&mut ctx, None, &[root], &[]);

    for _ in 0..500 {
        if dg.empty(&ctx) {
            break;
        }
        let cur = dg.select(&mut ctx);
        let pc = InstLocation::new(rng.gen_range(0..2), rng.gen_range(0..3));
        ctx.step(cur, pc);
        let mut added = Vec::new();
        let mut removed = Vec::new();
        match rng.gen_range(0..8) {
            0 | 1 => added.push(ctx.fork(cur)),
            2 if ctx.live_state_count() > 1 => removed.push(cur),
            3 => ctx.observe_store(cur, rng.gen_range(10..13), rng.gen_range(-5..60)),
            4 => ctx.reach_branch(cur, rng.gen_range(1..4)),
            5 => ctx.coverage.mark_partly_covered(rng.gen_range(1..4)),
            6 => {
                let b = rng.gen_range(1..4);
                ctx.coverage.mark_fully_covered(b);
                ctx.reach_branch(cur, b);
            }
            _ => {
                if rng.gen_bool(0.3) {
                    ctx.mark_covered_new(cur);
                }
            }
        }
        dg.update(&mut ctx, Some(cur), &added, &removed);
        for r in removed.iter() {
            assert!(!dg.priority_states().contains(r));
            assert!(!dg.default_states().contains(r));
            ctx.terminate(*r);
        }
        assert_partitioned(&dg, &ctx);
    }
}

#[test]
fn test_weighted_selection_tracks_normalized_weights() {
    let mut ctx = ExplorationContext::for_testing(1234);
    let a = ctx.spawn_initial_state(InstLocation::new(0, 0));
    let b = ctx.fork(a);
    let c = ctx.fork(a);
    ctx.state_mut(a).min_dist_to_uncovered = 1;
    ctx.state_mut(b).min_dist_to_uncovered = 2;
    ctx.state_mut(c).min_dist_to_uncovered = 2;
    // Weights 1, 1/4, 1/4.
    let mut s = WeightedRandomSearcher::new(WeightType::MinDistToUncovered);
    s.update(&mut ctx, None, &[a, b, c], &[]);
    let draws = 30_000;
    let mut counts: BTreeMap<StateId, usize> = BTreeMap::new();
    for _ in 0..draws {
        *counts.entry(s.select(&mut ctx)).or_insert(0) += 1;
    }
    let expected = [(a, 2.0 / 3.0), (b, 1.0 / 6.0), (c, 1.0 / 6.0)];
    for (state, p) in expected {
        let observed = counts.get(&state).copied().unwrap_or(0) as f64 / draws as f64;
        assert!(
            (observed - p).abs() < 0.02,
            "state {}: observed {} expected {}",
            state,
            observed,
            p
        );
    }
}

#[test]
fn test_random_path_descent_ends_on_owned_leaf() {
    let mut ctx = ExplorationContext::for_testing(8);
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(8);
    let mut s = RandomPathSearcher::new(&mut ctx);
    let bit = s.owner_bit();
    let root = ctx.spawn_initial_state(InstLocation::new(0, 0));
    s.update(&mut ctx, None, &[root], &[]);

    for _ in 0..300 {
        let cur = s.select(&mut ctx);
        assert!(ctx.contains_state(cur));
        assert!(ctx.tree.is_owned(Some(ctx.state(cur).tree_node), bit));
        if rng.gen_bool(0.55) || ctx.live_state_count() == 1 {
            let child = ctx.fork(cur);
            s.update(&mut ctx, Some(cur), &[child], &[]);
        } else {
            s.update(&mut ctx, Some(cur), &[], &[cur]);
            ctx.terminate(cur);
        }
    }
    assert!(!s.empty(&ctx));
}

#[test]
fn test_configured_stack_runs_to_exhaustion() {
    let mut ctx = ExplorationContext::for_testing(5);
    let config = SearcherConfig {
        search: vec![SearchKind::Bfs, SearchKind::Weighted(WeightType::Depth)],
        batch_instructions: 2,
        use_iterative_deepening_time_search: true,
        ..SearcherConfig::default()
    };
    let mut s = construct_searcher(&config, &mut ctx).unwrap();
    let root = ctx.spawn_initial_state(InstLocation::new(0, 0));
    s.update(&mut ctx, None, &[root], &[]);

    let mut forks = 0;
    let mut selections = 0;
    while !s.empty(&ctx) {
        selections += 1;
        assert!(selections < 1000, "searcher never drained");
        let cur = s.select(&mut ctx);
        ctx.step(cur, InstLocation::new(0, 1));
        if forks < 20 {
            forks += 1;
            let child = ctx.fork(cur);
            s.update(&mut ctx, Some(cur), &[child], &[]);
        } else {
            s.update(&mut ctx, Some(cur), &[], &[cur]);
            ctx.terminate(cur);
        }
    }
    assert_eq!(ctx.live_state_count(), 0);
}
