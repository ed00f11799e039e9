// SPDX-License-Identifier: Apache-2.0

//! Weighted collection supporting O(log n) insert, reweight, remove and
//! proportional sampling, backed by a Fenwick tree over slot weights.

use std::collections::HashMap;
use std::hash::Hash;

#[derive(Debug, Clone)]
pub struct DiscretePdf<T> {
    /// 1-based Fenwick tree; `tree.len() == weights.len() + 1`.
    tree: Vec<f64>,
    weights: Vec<f64>,
    items: Vec<Option<T>>,
    slots: HashMap<T, usize>,
    free: Vec<usize>,
}

impl<T: Copy + Eq + Hash> Default for DiscretePdf<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy + Eq + Hash> DiscretePdf<T> {
    pub fn new() -> Self {
        Self {
            tree: vec![0.0],
            weights: Vec::new(),
            items: Vec::new(),
            slots: HashMap::new(),
            free: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, item: &T) -> bool {
        self.slots.contains_key(item)
    }

    pub fn total(&self) -> f64 {
        self.prefix(self.weights.len())
    }

    pub fn weight(&self, item: &T) -> Option<f64> {
        self.slots.get(item).map(|&i| self.weights[i])
    }

    pub fn insert(&mut self, item: T, weight: f64) {
        assert!(
            weight >= 0.0 && weight.is_finite(),
            "weight must be finite and non-negative, got {}",
            weight
        );
        assert!(!self.slots.contains_key(&item), "item inserted twice");
        let slot = match self.free.pop() {
            Some(slot) => slot,
            None => self.grow(),
        };
        self.items[slot] = Some(item);
        self.slots.insert(item, slot);
        self.set_weight(slot, weight);
    }

    pub fn update(&mut self, item: &T, weight: f64) {
        assert!(
            weight >= 0.0 && weight.is_finite(),
            "weight must be finite and non-negative, got {}",
            weight
        );
        let slot = *self.slots.get(item).expect("updating an absent item");
        self.set_weight(slot, weight);
    }

    pub fn remove(&mut self, item: &T) {
        let slot = self.slots.remove(item).expect("removing an absent item");
        self.set_weight(slot, 0.0);
        self.items[slot] = None;
        self.free.push(slot);
    }

    /// Picks an item with probability proportional to its weight, given
    /// `u` uniform in `[0, 1)`. When every weight is zero the lowest live
    /// slot wins.
    pub fn choose(&self, u: f64) -> T {
        assert!(!self.is_empty(), "choose on an empty distribution");
        let total = self.total();
        if total <= 0.0 {
            return self.first_live();
        }
        let mut target = u * total;
        let n = self.weights.len();
        let mut pos = 0usize;
        let mut step = if n == 0 {
            0
        } else {
            1usize << (usize::BITS - 1 - n.leading_zeros())
        };
        while step > 0 {
            let next = pos + step;
            if next <= n && self.tree[next] <= target {
                pos = next;
                target -= self.tree[next];
            }
            step >>= 1;
        }
        // `pos` is the number of slots whose cumulative weight does not
        // exceed the target, i.e. the 0-based index of the chosen slot.
        if pos < n && self.weights[pos] > 0.0 {
            if let Some(item) = self.items[pos] {
                return item;
            }
        }
        // Rounding pushed the target past the end; take the last weighted slot.
        (0..n)
            .rev()
            .find(|&i| self.weights[i] > 0.0)
            .and_then(|i| self.items[i])
            .unwrap_or_else(|| self.first_live())
    }

    fn first_live(&self) -> T {
        self.items
            .iter()
            .flatten()
            .next()
            .copied()
            .expect("non-empty distribution has a live item")
    }

    fn prefix(&self, mut i: usize) -> f64 {
        let mut sum = 0.0;
        while i > 0 {
            sum += self.tree[i];
            i &= i - 1;
        }
        sum
    }

    fn set_weight(&mut self, slot: usize, weight: f64) {
        let delta = weight - self.weights[slot];
        self.weights[slot] = weight;
        let mut i = slot + 1;
        while i < self.tree.len() {
            self.tree[i] += delta;
            i += i & i.wrapping_neg();
        }
    }

    /// Doubles capacity, rebuilds the tree from the slot weights and returns
    /// the first new slot. The remaining new slots go on the free list.
    fn grow(&mut self) -> usize {
        let old = self.weights.len();
        let new_len = (old * 2).max(4);
        self.weights.resize(new_len, 0.0);
        self.items.resize(new_len, None);
        self.free.extend((old + 1..new_len).rev());
        self.tree = vec![0.0; new_len + 1];
        for i in 1..=new_len {
            self.tree[i] += self.weights[i - 1];
            let parent = i + (i & i.wrapping_neg());
            if parent <= new_len {
                let v = self.tree[i];
                self.tree[parent] += v;
            }
        }
        old
    }
}
