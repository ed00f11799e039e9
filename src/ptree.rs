// SPDX-License-Identifier: Apache-2.0

//! Binary exploration tree shared by the random-path searchers.
//!
//! Nodes live in an arena and are addressed by [`NodeId`]. Leaves carry the
//! live state they stand for; internal nodes record a fork. Each node stores
//! an `owners` bitmask describing which random-path searchers own the edge
//! from its parent to it (for the root, the virtual edge into the tree), so
//! several searchers can co-own disjoint parts of one tree.

use crate::state::StateId;

/// Upper bound on the number of searchers that can share one tree.
pub const MAX_OWNERS: u32 = u8::BITS;

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct NodeId {
    pub id: usize,
}

#[derive(Debug, Clone)]
struct PTreeNode {
    parent: Option<NodeId>,
    left: Option<NodeId>,
    right: Option<NodeId>,
    state: Option<StateId>,
    owners: u8,
}

impl PTreeNode {
    fn leaf(parent: Option<NodeId>, state: StateId, owners: u8) -> Self {
        Self {
            parent,
            left: None,
            right: None,
            state: Some(state),
            owners,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PTree {
    nodes: Vec<Option<PTreeNode>>,
    root: Option<NodeId>,
    next_owner: u32,
}

impl PTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hands out a fresh ownership bit for a searcher sharing this tree.
    pub fn allocate_owner_bit(&mut self) -> u8 {
        assert!(
            self.next_owner < MAX_OWNERS,
            "at most {} searchers can share an exploration tree",
            MAX_OWNERS
        );
        let bit = 1u8 << self.next_owner;
        self.next_owner += 1;
        bit
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Installs the root leaf for the initial state.
    pub fn set_root(&mut self, state: StateId) -> NodeId {
        assert!(self.root.is_none(), "exploration tree already has a root");
        let id = self.push(PTreeNode::leaf(None, state, 0));
        self.root = Some(id);
        id
    }

    fn push(&mut self, node: PTreeNode) -> NodeId {
        self.nodes.push(Some(node));
        NodeId {
            id: self.nodes.len() - 1,
        }
    }

    fn node(&self, n: NodeId) -> &PTreeNode {
        self.nodes[n.id]
            .as_ref()
            .unwrap_or_else(|| panic!("exploration tree node {} was removed", n.id))
    }

    fn node_mut(&mut self, n: NodeId) -> &mut PTreeNode {
        self.nodes[n.id]
            .as_mut()
            .unwrap_or_else(|| panic!("exploration tree node {} was removed", n.id))
    }

    /// Splits leaf `n` after a fork: the left child continues `left_state`,
    /// the right child holds `right_state`. Both children inherit the
    /// ownership of the edge into `n`.
    pub fn attach(
        &mut self,
        n: NodeId,
        left_state: StateId,
        right_state: StateId,
    ) -> (NodeId, NodeId) {
        let owners = {
            let node = self.node(n);
            assert!(node.state.is_some(), "can only fork a leaf");
            node.owners
        };
        let left = self.push(PTreeNode::leaf(Some(n), left_state, owners));
        let right = self.push(PTreeNode::leaf(Some(n), right_state, owners));
        let node = self.node_mut(n);
        node.state = None;
        node.left = Some(left);
        node.right = Some(right);
        (left, right)
    }

    /// Removes leaf `n` and every ancestor left without children.
    pub fn remove(&mut self, n: NodeId) {
        {
            let node = self.node(n);
            assert!(
                node.left.is_none() && node.right.is_none(),
                "can only remove a leaf"
            );
        }
        let mut cur = Some(n);
        while let Some(c) = cur {
            let parent = self.node(c).parent;
            if let Some(p) = parent {
                let pn = self.node_mut(p);
                if pn.left == Some(c) {
                    pn.left = None;
                } else {
                    pn.right = None;
                }
            } else {
                self.root = None;
            }
            self.nodes[c.id] = None;
            cur = parent.filter(|p| {
                let pn = self.node(*p);
                pn.left.is_none() && pn.right.is_none()
            });
        }
    }

    pub fn parent(&self, n: NodeId) -> Option<NodeId> {
        self.node(n).parent
    }

    pub fn left(&self, n: NodeId) -> Option<NodeId> {
        self.node(n).left
    }

    pub fn right(&self, n: NodeId) -> Option<NodeId> {
        self.node(n).right
    }

    pub fn state(&self, n: NodeId) -> Option<StateId> {
        self.node(n).state
    }

    /// Whether `n` exists and the edge into it is owned by `bit`.
    pub fn is_owned(&self, n: Option<NodeId>, bit: u8) -> bool {
        match n {
            Some(n) => self.node(n).owners & bit != 0,
            None => false,
        }
    }

    pub fn set_owned(&mut self, n: NodeId, bit: u8) {
        self.node_mut(n).owners |= bit;
    }

    pub fn clear_owned(&mut self, n: NodeId, bit: u8) {
        self.node_mut(n).owners &= !bit;
    }

    pub fn live_node_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attach_inherits_ownership() {
        let mut t = PTree::new();
        let bit = t.allocate_owner_bit();
        let root = t.set_root(StateId(0));
        t.set_owned(root, bit);
        let (l, r) = t.attach(root, StateId(0), StateId(1));
        assert!(t.is_owned(Some(l), bit));
        assert!(t.is_owned(Some(r), bit));
        assert_eq!(t.state(root), None);
        assert_eq!(t.state(l), Some(StateId(0)));
        assert_eq!(t.state(r), Some(StateId(1)));
        assert_eq!(t.parent(r), Some(root));
    }

    #[test]
    fn test_remove_prunes_childless_ancestors() {
        let mut t = PTree::new();
        let root = t.set_root(StateId(0));
        let (l, r) = t.attach(root, StateId(0), StateId(1));
        let (ll, lr) = t.attach(l, StateId(0), StateId(2));
        t.remove(ll);
        assert_eq!(t.left(l), None);
        assert_eq!(t.right(l), Some(lr));
        t.remove(lr);
        // `l` lost both children so it goes too.
        assert_eq!(t.left(root), None);
        assert_eq!(t.right(root), Some(r));
        t.remove(r);
        assert_eq!(t.root(), None);
        assert_eq!(t.live_node_count(), 0);
    }

    #[test]
    fn test_owner_bits_are_distinct() {
        let mut t = PTree::new();
        let bits: Vec<u8> = (0..MAX_OWNERS).map(|_| t.allocate_owner_bit()).collect();
        assert_eq!(bits, vec![1, 2, 4, 8, 16, 32, 64, 128]);
    }

    #[test]
    #[should_panic(expected = "at most 8 searchers")]
    fn test_owner_bits_exhausted() {
        let mut t = PTree::new();
        for _ in 0..=MAX_OWNERS {
            t.allocate_owner_bit();
        }
    }
}
