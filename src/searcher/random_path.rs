// SPDX-License-Identifier: Apache-2.0

//! Random-path selection: walk down the exploration tree from the root,
//! flipping a fair coin at every fork, until a leaf is reached. States in
//! shallow subtrees are favoured over those in heavily forked ones.

use rand::RngCore;

use crate::context::ExplorationContext;
use crate::ptree::NodeId;
use crate::searcher::SearchStrategy;
use crate::state::StateId;

pub struct RandomPathSearcher {
    owner_bit: u8,
}

impl RandomPathSearcher {
    /// Claims an ownership bit in `ctx.tree`.
    pub fn new(ctx: &mut ExplorationContext) -> Self {
        Self {
            owner_bit: ctx.tree.allocate_owner_bit(),
        }
    }

    pub fn owner_bit(&self) -> u8 {
        self.owner_bit
    }

    fn owns(&self, ctx: &ExplorationContext, n: Option<NodeId>) -> bool {
        ctx.tree.is_owned(n, self.owner_bit)
    }
}

impl SearchStrategy for RandomPathSearcher {
    fn select(&mut self, ctx: &mut ExplorationContext) -> StateId {
        let mut n = ctx
            .tree
            .root()
            .filter(|r| self.owns(ctx, Some(*r)))
            .expect("root should belong to the random-path searcher");
        let mut flips = 0u32;
        let mut bits = 0u32;
        loop {
            if let Some(state) = ctx.tree.state(n) {
                return state;
            }
            let left = ctx.tree.left(n);
            let right = ctx.tree.right(n);
            let next = match (self.owns(ctx, left), self.owns(ctx, right)) {
                (false, true) => right,
                (true, false) => left,
                (true, true) => {
                    if bits == 0 {
                        flips = ctx.rng.next_u32();
                        bits = 32;
                    }
                    bits -= 1;
                    if flips & (1 << bits) != 0 {
                        left
                    } else {
                        right
                    }
                }
                (false, false) => panic!("both children of node {} are unowned", n.id),
            };
            n = next.expect("owned child exists");
        }
    }

    fn update(
        &mut self,
        ctx: &mut ExplorationContext,
        _current: Option<StateId>,
        added: &[StateId],
        removed: &[StateId],
    ) {
        for &state in added {
            let mut n = Some(ctx.state(state).tree_node);
            while let Some(node) = n {
                if self.owns(ctx, Some(node)) {
                    break;
                }
                ctx.tree.set_owned(node, self.owner_bit);
                n = ctx.tree.parent(node);
            }
        }

        for &state in removed {
            let mut n = Some(ctx.state(state).tree_node);
            while let Some(node) = n {
                let keeps_children = self.owns(ctx, ctx.tree.left(node))
                    || self.owns(ctx, ctx.tree.right(node));
                if keeps_children {
                    break;
                }
                assert!(
                    self.owns(ctx, Some(node)),
                    "removing an exploration tree edge that is not ours"
                );
                ctx.tree.clear_owned(node, self.owner_bit);
                n = ctx.tree.parent(node);
            }
        }
    }

    fn empty(&self, ctx: &ExplorationContext) -> bool {
        !self.owns(ctx, ctx.tree.root())
    }

    fn describe(&self) -> String {
        "RandomPathSearcher".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::InstLocation;
    use std::collections::BTreeMap;

    #[test]
    fn test_ownership_follows_updates() {
        let mut ctx = ExplorationContext::for_testing(0);
        let mut s = RandomPathSearcher::new(&mut ctx);
        assert!(s.empty(&ctx));
        let a = ctx.spawn_initial_state(InstLocation::new(0, 0));
        s.update(&mut ctx, None, &[a], &[]);
        assert!(!s.empty(&ctx));
        let b = ctx.fork(a);
        s.update(&mut ctx, Some(a), &[b], &[]);
        let bit = s.owner_bit();
        assert!(ctx.tree.is_owned(Some(ctx.state(a).tree_node), bit));
        assert!(ctx.tree.is_owned(Some(ctx.state(b).tree_node), bit));

        s.update(&mut ctx, Some(b), &[], &[b]);
        assert!(!ctx.tree.is_owned(Some(ctx.state(b).tree_node), bit));
        assert!(ctx.tree.is_owned(ctx.tree.root(), bit));
        ctx.terminate(b);
        assert_eq!(s.select(&mut ctx), a);

        s.update(&mut ctx, Some(a), &[], &[a]);
        assert!(s.empty(&ctx));
    }

    #[test]
    fn test_two_searchers_share_one_tree() {
        let mut ctx = ExplorationContext::for_testing(0);
        let mut first = RandomPathSearcher::new(&mut ctx);
        let mut second = RandomPathSearcher::new(&mut ctx);
        assert_ne!(first.owner_bit(), second.owner_bit());
        let a = ctx.spawn_initial_state(InstLocation::new(0, 0));
        first.update(&mut ctx, None, &[a], &[]);
        let b = ctx.fork(a);
        // `b` inherits the ownership of `a`'s edge, which only `first` holds.
        first.update(&mut ctx, Some(a), &[b], &[]);
        assert!(second.empty(&ctx));
        second.update(&mut ctx, None, &[b], &[]);
        assert!(!second.empty(&ctx));
        first.update(&mut ctx, None, &[], &[b]);
        assert_eq!(second.select(&mut ctx), b);
        for _ in 0..8 {
            assert_eq!(first.select(&mut ctx), a);
        }
    }

    #[test]
    fn test_shallow_leaf_is_favoured() {
        let mut ctx = ExplorationContext::for_testing(17);
        let mut s = RandomPathSearcher::new(&mut ctx);
        let a = ctx.spawn_initial_state(InstLocation::new(0, 0));
        s.update(&mut ctx, None, &[a], &[]);
        let b = ctx.fork(a);
        s.update(&mut ctx, Some(a), &[b], &[]);
        let c = ctx.fork(b);
        s.update(&mut ctx, Some(b), &[c], &[]);
        // a sits one fork deep, b and c two forks deep.
        let mut counts: BTreeMap<StateId, usize> = BTreeMap::new();
        let draws = 8000;
        for _ in 0..draws {
            *counts.entry(s.select(&mut ctx)).or_insert(0) += 1;
        }
        let share = |id| counts.get(&id).copied().unwrap_or(0) as f64 / draws as f64;
        assert!((share(a) - 0.5).abs() < 0.04, "a share {}", share(a));
        assert!((share(b) - 0.25).abs() < 0.04, "b share {}", share(b));
        assert!((share(c) - 0.25).abs() < 0.04, "c share {}", share(c));
    }
}
