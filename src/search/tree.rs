//! The per-game search tree: a state-keyed node table.
//!
//! One tree is mutated by exactly one player's simulations at a time.
//! Concurrent simulation threads of that player share it; the table lock
//! only guards insertion, each node carries its own lock around its
//! mutable statistics.

use crate::moves::Action;
use crate::rules::State;
use crate::search::node::SearchNode;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
pub struct SearchTree {
    nodes: Mutex<HashMap<State, Arc<Mutex<SearchNode>>>>,
}

impl SearchTree {
    pub fn new() -> SearchTree {
        SearchTree::default()
    }

    /// Node for `state`, if it was visited before.
    pub fn get(&self, state: &State) -> Option<Arc<Mutex<SearchNode>>> {
        self.nodes
            .lock()
            .expect("search tree lock poisoned")
            .get(state)
            .cloned()
    }

    /// Node for `state`, creating a zero-initialized one on first access.
    pub fn get_or_create(&self, state: &State) -> Arc<Mutex<SearchNode>> {
        self.nodes
            .lock()
            .expect("search tree lock poisoned")
            .entry(state.clone())
            .or_default()
            .clone()
    }

    pub fn len(&self) -> usize {
        self.nodes.lock().expect("search tree lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all nodes; used by the periodic reset when a tree is shared
    /// across consecutive games.
    pub fn clear(&self) {
        self.nodes
            .lock()
            .expect("search tree lock poisoned")
            .clear();
    }

    pub fn apply_virtual_loss(&self, state: &State, action: Action) {
        if let Some(node) = self.get(state) {
            node.lock()
                .expect("node lock poisoned")
                .apply_virtual_loss(action);
        }
    }

    pub fn revert_virtual_loss(&self, state: &State, action: Action) {
        if let Some(node) = self.get(state) {
            node.lock()
                .expect("node lock poisoned")
                .revert_virtual_loss(action);
        }
    }

    /// Walk the traversed path from leaf to root, writing real statistics
    /// and reverting the virtual losses taken during selection.
    ///
    /// `leaf_value` is from the perspective of the side to move at the
    /// leaf; the sign alternates at each ply up the path.
    pub fn backup(&self, path: &[(State, Action)], leaf_value: f32) {
        let mut value = leaf_value;
        for (state, action) in path.iter().rev() {
            value = -value;
            if let Some(node) = self.get(state) {
                let mut node = node.lock().expect("node lock poisoned");
                node.revert_virtual_loss(*action);
                node.visit(*action, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(s: &str) -> State {
        State::new(s)
    }

    fn act(s: &str) -> Action {
        s.parse().unwrap()
    }

    #[test]
    fn get_or_create_returns_zero_initialized_nodes() {
        let tree = SearchTree::new();
        let node = tree.get_or_create(&state("a"));
        {
            let node = node.lock().unwrap();
            assert!(!node.expanded);
            assert_eq!(node.sum_n, 0);
        }
        assert_eq!(tree.len(), 1);
        // Same node on repeat access, not a fresh default.
        assert!(Arc::ptr_eq(&node, &tree.get_or_create(&state("a"))));
    }

    #[test]
    fn backup_updates_exactly_the_path_with_alternating_signs() {
        let tree = SearchTree::new();
        let path = vec![
            (state("s0"), act("0010")),
            (state("s1"), act("0908")),
            (state("s2"), act("1011")),
        ];
        for (s, a) in &path {
            tree.get_or_create(s)
                .lock()
                .unwrap()
                .expand(vec![(*a, 1.0)]);
        }

        tree.backup(&path, 1.0);

        // Exactly k nodes updated, each N by exactly 1, Q = W / N.
        let expected = [-1.0, 1.0, -1.0];
        for ((s, a), want) in path.iter().zip(expected) {
            let node = tree.get(s).unwrap();
            let node = node.lock().unwrap();
            let stats = node.stats(*a).unwrap();
            assert_eq!(stats.n, 1);
            assert_eq!(stats.w, want);
            assert_eq!(stats.q, stats.w / stats.n as f32);
            assert_eq!(node.sum_n, 1);
        }
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn backup_reverts_virtual_losses() {
        let tree = SearchTree::new();
        let path = vec![(state("s0"), act("0010"))];
        tree.get_or_create(&state("s0"))
            .lock()
            .unwrap()
            .expand(vec![(act("0010"), 1.0)]);

        tree.apply_virtual_loss(&state("s0"), act("0010"));
        tree.backup(&path, -0.5);

        let node = tree.get(&state("s0")).unwrap();
        let node = node.lock().unwrap();
        let stats = node.stats(act("0010")).unwrap();
        assert_eq!(stats.vloss, 0);
        assert_eq!(stats.n, 1);
        assert_eq!(stats.w, 0.5);
    }

    #[test]
    fn clear_empties_the_table() {
        let tree = SearchTree::new();
        tree.get_or_create(&state("a"));
        tree.get_or_create(&state("b"));
        tree.clear();
        assert!(tree.is_empty());
    }
}
