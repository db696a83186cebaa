//! Shared MCTS tree with arena allocation.
//!
//! Nodes live in an append-only arena and refer to each other by [`NodeId`];
//! the parent link is a plain index and never implies ownership. Worker
//! threads share one tree: statistics are atomics, the arena is guarded by
//! an `RwLock` that is only write-locked while children are appended.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use chess::ChessMove;
use engine_core::GameView;
use thiserror::Error;

use crate::node::{MctsNode, NodeId, NodeState};

/// Structural errors raised while walking the tree.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("node {node} is tagged expanded but has no children")]
    IllegalSelection { node: NodeId },

    #[error("node {node} has no move leading to it")]
    MissingMove { node: NodeId },
}

/// A visit-count mismatch found by [`MctsTree::check_invariants`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error(
    "node {node}: visits {visits} != leaf visits {leaf_visits} + child visits {child_visits} \
     (virtual loss {virtual_loss})"
)]
pub struct InvariantViolation {
    pub node: NodeId,
    pub visits: u32,
    pub leaf_visits: u32,
    pub child_visits: u64,
    pub virtual_loss: u32,
}

/// Result of descending from the root to a leaf.
#[derive(Debug, Clone)]
pub struct Selection {
    /// Root first, leaf last. Every node carries one unit of virtual loss.
    pub path: Vec<NodeId>,
    /// Game view at the leaf.
    pub view: GameView,
}

impl Selection {
    #[inline]
    pub fn leaf(&self) -> NodeId {
        // Path always holds at least the root.
        self.path[self.path.len() - 1]
    }
}

/// MCTS tree with arena-based node storage.
#[derive(Debug)]
pub struct MctsTree {
    /// Arena storing all nodes
    nodes: RwLock<Vec<Arc<MctsNode>>>,

    /// Root node index (always 0 after initialization)
    root: NodeId,

    /// Next build-order value; scoped to this tree.
    next_build_order: AtomicU64,
}

impl Default for MctsTree {
    fn default() -> Self {
        Self::new()
    }
}

impl MctsTree {
    /// Create a new tree holding only an unexpanded root.
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(vec![Arc::new(MctsNode::new_root(0))]),
            root: NodeId(0),
            next_build_order: AtomicU64::new(1),
        }
    }

    /// Get the root node ID.
    #[inline]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Get a node by ID.
    ///
    /// Ids are only handed out by this tree, so an unknown id is a bug.
    #[inline]
    pub fn get(&self, id: NodeId) -> Arc<MctsNode> {
        let nodes = self.nodes.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&nodes[id.index()])
    }

    /// Get the total number of nodes in the tree.
    pub fn len(&self) -> usize {
        self.nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Check if tree is empty (never true after construction).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pick the child of `node_id` with the highest PUCT score.
    ///
    /// The exploration term uses the parent's visits plus its in-flight
    /// virtual loss. Ties go to the lowest build order.
    pub fn select_child(&self, node_id: NodeId, c_puct: f32) -> Result<NodeId, TreeError> {
        let node = self.get(node_id);
        let children = match node.children() {
            Some(children) if !children.is_empty() => children,
            _ => return Err(TreeError::IllegalSelection { node: node_id }),
        };

        let parent_sqrt = ((node.visits() + node.virtual_loss()) as f32).sqrt();
        let nodes = self.nodes.read().unwrap_or_else(PoisonError::into_inner);

        let mut best: Option<(NodeId, f32, u64)> = None;
        for &child_id in children {
            let child = &nodes[child_id.index()];
            let score = child.puct_score(parent_sqrt, c_puct);
            let better = match best {
                None => true,
                Some((_, best_score, best_order)) => {
                    score > best_score || (score == best_score && child.build_order < best_order)
                }
            };
            if better {
                best = Some((child_id, score, child.build_order));
            }
        }

        best.map(|(id, _, _)| id)
            .ok_or(TreeError::IllegalSelection { node: node_id })
    }

    /// Descend from the root to a node that is not expanded, applying one
    /// unit of virtual loss to every node visited (root included).
    ///
    /// On error all virtual loss applied so far is removed again.
    pub fn select(&self, root_view: &GameView, c_puct: f32) -> Result<Selection, TreeError> {
        let mut path = vec![self.root];
        let mut view = root_view.clone();
        let mut current = self.get(self.root);
        current.add_virtual_loss();

        while current.state() == NodeState::Expanded {
            let step = self.select_child(path[path.len() - 1], c_puct).and_then(|child_id| {
                let child = self.get(child_id);
                let mv = child.mv.ok_or(TreeError::MissingMove { node: child_id })?;
                Ok((child_id, child, mv))
            });

            match step {
                Ok((child_id, child, mv)) => {
                    child.add_virtual_loss();
                    view.push(mv);
                    path.push(child_id);
                    current = child;
                }
                Err(e) => {
                    self.revert_virtual_loss(&path);
                    return Err(e);
                }
            }
        }

        Ok(Selection { path, view })
    }

    /// Create one child per `(move, prior)` pair under `node_id`.
    ///
    /// Expansion happens exactly once: concurrent callers that lose the race
    /// reuse the winner's children. Returns true if this call created them.
    pub fn expand(&self, node_id: NodeId, priors: &[(ChessMove, f32)]) -> bool {
        let node = self.get(node_id);
        node.publish_children(|| {
            let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
            let mut ids = Vec::with_capacity(priors.len());
            for &(mv, prior) in priors {
                let id = NodeId(nodes.len() as u32);
                let order = self.next_build_order.fetch_add(1, Ordering::Relaxed);
                nodes.push(Arc::new(MctsNode::new_child(node_id, Some(mv), prior, order)));
                ids.push(id);
            }
            ids.into_boxed_slice()
        })
    }

    /// Tag an unexpanded leaf with a terminal outcome.
    pub fn mark_terminal(&self, node_id: NodeId, state: NodeState) -> bool {
        self.get(node_id).mark_terminal(state)
    }

    /// Back up `value` (from the leaf's side to move) along `path`, leaf to
    /// root, negating per ply and releasing the virtual loss from selection.
    pub fn backup(&self, path: &[NodeId], value: f32) {
        let Some(&leaf_id) = path.last() else {
            return;
        };
        self.get(leaf_id).record_leaf();

        let mut current_value = value;
        for &node_id in path.iter().rev() {
            let node = self.get(node_id);
            node.record(current_value);
            node.remove_virtual_loss();

            // Negate for opponent's perspective
            current_value = -current_value;
        }
    }

    /// Drop the virtual loss of an abandoned simulation.
    pub fn revert_virtual_loss(&self, path: &[NodeId]) {
        for &node_id in path {
            self.get(node_id).remove_virtual_loss();
        }
    }

    /// Root children as `(move, visits)` in build order.
    pub fn root_visit_distribution(&self) -> Vec<(ChessMove, u32)> {
        let root = self.get(self.root);
        let Some(children) = root.children() else {
            return Vec::new();
        };
        children
            .iter()
            .filter_map(|&id| {
                let child = self.get(id);
                child.mv.map(|mv| (mv, child.visits()))
            })
            .collect()
    }

    /// Most visited root move; ties go to the lowest build order.
    pub fn best_move(&self) -> Option<(ChessMove, u32)> {
        let mut best: Option<(ChessMove, u32)> = None;
        for (mv, visits) in self.root_visit_distribution() {
            if best.map_or(true, |(_, best_visits)| visits > best_visits) {
                best = Some((mv, visits));
            }
        }
        best
    }

    /// Visit distribution at the root scaled by `1 / temperature`.
    /// A temperature near zero puts all mass on the best move.
    pub fn root_policy(&self, temperature: f32) -> Vec<(ChessMove, f32)> {
        let distribution = self.root_visit_distribution();
        if distribution.is_empty() {
            return Vec::new();
        }

        if temperature < 1e-6 {
            let best = self.best_move().map(|(mv, _)| mv);
            return distribution
                .into_iter()
                .map(|(mv, _)| (mv, if Some(mv) == best { 1.0 } else { 0.0 }))
                .collect();
        }

        let weights: Vec<f32> = distribution
            .iter()
            .map(|&(_, visits)| {
                let v = visits as f32;
                if temperature == 1.0 {
                    v
                } else {
                    v.powf(1.0 / temperature)
                }
            })
            .collect();
        let total: f32 = weights.iter().sum();

        distribution
            .into_iter()
            .zip(weights)
            .map(|((mv, _), w)| (mv, if total > 0.0 { w / total } else { 0.0 }))
            .collect()
    }

    /// Check `visits == leaf_visits + Σ visits(children)` and zero virtual
    /// loss for every node. Only meaningful with no simulations in flight.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        let nodes = self.nodes.read().unwrap_or_else(PoisonError::into_inner);
        for (index, node) in nodes.iter().enumerate() {
            let child_visits: u64 = node
                .children()
                .map(|children| {
                    children
                        .iter()
                        .map(|id| u64::from(nodes[id.index()].visits()))
                        .sum()
                })
                .unwrap_or(0);

            let visits = node.visits();
            let leaf_visits = node.leaf_visits();
            let virtual_loss = node.virtual_loss();
            if u64::from(visits) != u64::from(leaf_visits) + child_visits || virtual_loss != 0 {
                return Err(InvariantViolation {
                    node: NodeId(index as u32),
                    visits,
                    leaf_visits,
                    child_visits,
                    virtual_loss,
                });
            }
        }
        Ok(())
    }

    /// Get statistics about the tree for debugging.
    pub fn stats(&self) -> TreeStats {
        let root = self.get(self.root);
        TreeStats {
            total_nodes: self.len(),
            root_visits: root.visits(),
            root_value: root.mean_value(),
            max_depth: self.compute_max_depth(),
            total_virtual_loss: self.total_virtual_loss(),
        }
    }

    fn total_virtual_loss(&self) -> u64 {
        let nodes = self.nodes.read().unwrap_or_else(PoisonError::into_inner);
        nodes.iter().map(|n| u64::from(n.virtual_loss())).sum()
    }

    fn compute_max_depth(&self) -> u32 {
        let nodes = self.nodes.read().unwrap_or_else(PoisonError::into_inner);
        let mut max_depth = 0;
        let mut stack = vec![(self.root, 0u32)];
        while let Some((id, depth)) = stack.pop() {
            max_depth = max_depth.max(depth);
            if let Some(children) = nodes[id.index()].children() {
                stack.extend(children.iter().map(|&c| (c, depth + 1)));
            }
        }
        max_depth
    }
}

/// Statistics about an MCTS tree.
#[derive(Debug, Clone)]
pub struct TreeStats {
    pub total_nodes: usize,
    pub root_visits: u32,
    pub root_value: f32,
    pub max_depth: u32,
    /// In-flight simulations summed over all nodes; 0 between searches.
    pub total_virtual_loss: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_core::Position;

    fn uniform_priors(view: &GameView) -> Vec<(ChessMove, f32)> {
        let moves = view.position().legal_moves();
        let p = 1.0 / moves.len() as f32;
        moves.into_iter().map(|mv| (mv, p)).collect()
    }

    #[test]
    fn test_new_tree() {
        let tree = MctsTree::new();

        assert_eq!(tree.len(), 1);
        assert_eq!(tree.root(), NodeId(0));
        assert!(tree.get(tree.root()).parent.is_none());
        assert_eq!(tree.get(tree.root()).state(), NodeState::Unexpanded);
    }

    #[test]
    fn test_expand_once() {
        let tree = MctsTree::new();
        let view = GameView::new(Position::startpos());
        let priors = uniform_priors(&view);

        assert!(tree.expand(tree.root(), &priors));
        assert!(!tree.expand(tree.root(), &priors));

        assert_eq!(tree.len(), 21);
        let root = tree.get(tree.root());
        assert_eq!(root.children().map(<[NodeId]>::len), Some(20));

        let first = tree.get(NodeId(1));
        assert_eq!(first.parent, tree.root());
        assert_eq!(first.build_order, 1);
        assert!((first.prior - 0.05).abs() < 1e-6);
    }

    #[test]
    fn test_concurrent_expansion_creates_children_once() {
        let tree = MctsTree::new();
        let view = GameView::new(Position::startpos());
        let priors = uniform_priors(&view);

        let created: usize = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(|| tree.expand(tree.root(), &priors)))
                .collect();
            handles
                .into_iter()
                .map(|h| usize::from(h.join().unwrap()))
                .sum()
        });

        assert_eq!(created, 1);
        assert_eq!(tree.len(), 21);
    }

    #[test]
    fn test_backup_negates_per_ply() {
        let tree = MctsTree::new();
        let view = GameView::new(Position::startpos());
        tree.expand(tree.root(), &uniform_priors(&view));

        let selection = tree.select(&view, 1.5).unwrap();
        assert_eq!(selection.path.len(), 2);
        assert_eq!(selection.view.ply(), 1);

        let leaf = selection.leaf();
        assert_eq!(tree.get(leaf).virtual_loss(), 1);

        tree.backup(&selection.path, 1.0);

        assert_eq!(tree.get(leaf).visits(), 1);
        assert!((tree.get(leaf).value_sum() - 1.0).abs() < 1e-6);
        assert!((tree.get(tree.root()).value_sum() + 1.0).abs() < 1e-6);
        assert_eq!(tree.get(leaf).virtual_loss(), 0);
        assert!(tree.check_invariants().is_ok());
    }

    #[test]
    fn test_select_ties_go_to_lowest_build_order() {
        let tree = MctsTree::new();
        let view = GameView::new(Position::startpos());
        tree.expand(tree.root(), &uniform_priors(&view));

        let best = tree.select_child(tree.root(), 1.0).unwrap();
        assert_eq!(best, NodeId(1));
    }

    #[test]
    fn test_virtual_loss_spreads_descents() {
        let tree = MctsTree::new();
        let view = GameView::new(Position::startpos());
        tree.expand(tree.root(), &uniform_priors(&view));

        let first = tree.select(&view, 1.5).unwrap();
        let second = tree.select(&view, 1.5).unwrap();
        assert_ne!(first.leaf(), second.leaf());

        tree.revert_virtual_loss(&first.path);
        tree.revert_virtual_loss(&second.path);
        assert!(tree.check_invariants().is_ok());
    }

    #[test]
    fn test_select_child_prefers_higher_prior() {
        let tree = MctsTree::new();
        let view = GameView::new(Position::startpos());
        let moves = view.position().legal_moves();
        let priors: Vec<_> = moves
            .iter()
            .enumerate()
            .map(|(i, &mv)| (mv, if i == 5 { 0.5 } else { 0.5 / 19.0 }))
            .collect();
        tree.expand(tree.root(), &priors);

        // A descent in flight gives the exploration term a non-zero scale.
        tree.get(tree.root()).add_virtual_loss();
        let best = tree.select_child(tree.root(), 1.0).unwrap();
        assert_eq!(tree.get(best).mv, Some(moves[5]));
    }

    #[test]
    fn test_expanded_without_children_is_illegal() {
        let tree = MctsTree::new();
        tree.expand(tree.root(), &[]);

        let view = GameView::new(Position::startpos());
        let err = tree.select(&view, 1.0).unwrap_err();
        assert_eq!(err, TreeError::IllegalSelection { node: NodeId(0) });
        assert_eq!(tree.get(tree.root()).virtual_loss(), 0);
    }

    #[test]
    fn test_root_policy() {
        let tree = MctsTree::new();
        let view = GameView::new(Position::startpos());
        tree.expand(tree.root(), &uniform_priors(&view));

        // 3 simulations into child 1, 7 into child 2.
        for (child, n) in [(NodeId(1), 3), (NodeId(2), 7)] {
            for _ in 0..n {
                tree.backup(&[tree.root(), child], 0.0);
            }
        }

        let policy = tree.root_policy(1.0);
        assert_eq!(policy.len(), 20);
        assert!((policy[0].1 - 0.3).abs() < 1e-6);
        assert!((policy[1].1 - 0.7).abs() < 1e-6);

        let greedy = tree.root_policy(0.0);
        assert!(greedy[0].1.abs() < 1e-6);
        assert!((greedy[1].1 - 1.0).abs() < 1e-6);

        assert_eq!(tree.best_move().map(|(_, v)| v), Some(7));
    }

    #[test]
    fn test_invariant_violation_detected() {
        let tree = MctsTree::new();
        let view = GameView::new(Position::startpos());
        tree.expand(tree.root(), &uniform_priors(&view));

        // Visit recorded on the root only.
        tree.get(tree.root()).record(0.0);
        let violation = tree.check_invariants().unwrap_err();
        assert_eq!(violation.node, tree.root());
        assert_eq!(violation.visits, 1);
        assert_eq!(violation.child_visits, 0);
    }

    #[test]
    fn test_tree_stats() {
        let tree = MctsTree::new();
        let view = GameView::new(Position::startpos());
        tree.expand(tree.root(), &uniform_priors(&view));

        let stats = tree.stats();
        assert_eq!(stats.total_nodes, 21);
        assert_eq!(stats.max_depth, 1);
    }
}
