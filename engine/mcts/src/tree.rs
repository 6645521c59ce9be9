//! MCTS tree structure with arena allocation.
//!
//! The tree uses arena allocation for efficient node storage and
//! cache-friendly traversal. Nodes are stored in a contiguous Vec
//! and referenced by NodeId indices; parents are always allocated
//! before their children.

use std::time::Instant;

use engine_core::game_utils::normalize_weights;
use engine_core::{outcome_value, Game};
use tracing::trace;

use crate::evaluator::{EvalResult, Evaluator, EvaluatorError};
use crate::node::{Node, NodeId};
use crate::search::SearchError;

/// MCTS tree with arena-based node storage.
#[derive(Debug)]
pub struct SearchTree<G: Game> {
    /// Arena storing all nodes
    nodes: Vec<Node<G::State, G::Action>>,

    /// Root node index (always 0)
    root: NodeId,
}

/// Outcome of one round of simulations.
#[derive(Debug, Default)]
pub struct SimulationBatch {
    /// Simulations that reached backup
    pub completed: u32,
    /// Leaves sent to the evaluator and backed up
    pub evaluated: u32,
    /// Simulations that ended on a terminal node
    pub terminal_hits: u32,
    /// Time spent inside the evaluator
    pub inference_us: u64,
    /// Set when the evaluator call failed; pending leaves were abandoned
    pub failure: Option<EvaluatorError>,
}

impl<G: Game> SearchTree<G> {
    /// Create a new tree rooted at `position`.
    pub fn new(game: &G, position: G::State) -> Self {
        let is_terminal = game.is_terminal(&position);
        let terminal_value = if is_terminal {
            outcome_value(game.winner(&position), game.current_player(&position))
        } else {
            0.0
        };
        Self {
            nodes: vec![Node::new_root(position, is_terminal, terminal_value)],
            root: NodeId(0),
        }
    }

    /// Get the root node ID.
    #[inline]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Get a reference to a node by ID.
    #[inline]
    pub fn get(&self, id: NodeId) -> &Node<G::State, G::Action> {
        &self.nodes[id.index()]
    }

    /// Get a mutable reference to a node by ID.
    #[inline]
    pub fn get_mut(&mut self, id: NodeId) -> &mut Node<G::State, G::Action> {
        &mut self.nodes[id.index()]
    }

    /// Get the total number of nodes in the tree.
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if tree is empty (never true after construction).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn allocate(&mut self, node: Node<G::State, G::Action>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    /// Select the best child of a node by selection score.
    /// Ties go to the first child in legal-move order.
    pub fn select_child(&self, node_id: NodeId, c_puct: f32, virtual_loss: f32) -> Option<NodeId> {
        let node = self.get(node_id);
        // Pre-compute sqrt once instead of per-child comparison
        let parent_visits_sqrt = (node.effective_visits() as f32).sqrt();

        let mut best: Option<(NodeId, f32)> = None;
        for &child_id in &node.children {
            let score = self
                .get(child_id)
                .ucb_score(parent_visits_sqrt, c_puct, virtual_loss);
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((child_id, score)),
            }
        }
        best.map(|(id, _)| id)
    }

    /// Walk from the root to a leaf. Returns the leaf and the path
    /// (root first, leaf last).
    pub fn select_leaf(&self, c_puct: f32, virtual_loss: f32) -> (NodeId, Vec<NodeId>) {
        let mut path = vec![self.root];
        let mut current = self.root;

        while !self.get(current).is_leaf() {
            match self.select_child(current, c_puct, virtual_loss) {
                Some(child_id) => {
                    path.push(child_id);
                    current = child_id;
                }
                None => break,
            }
        }

        (current, path)
    }

    /// Create one child per legal move of `node_id`.
    ///
    /// Priors are `policy[action_index]` renormalized over legal moves.
    /// Negative or non-finite entries count as zero; if no mass is left
    /// the priors are uniform.
    pub fn expand(&mut self, game: &G, node_id: NodeId, policy: &[f32]) -> Result<(), SearchError> {
        let node = self.get(node_id);
        if node.expanded {
            return Err(SearchError::InvalidState(format!(
                "node {} is already expanded",
                node_id.0
            )));
        }
        if node.is_terminal {
            return Err(SearchError::InvalidState(format!(
                "node {} is terminal",
                node_id.0
            )));
        }

        let legal = game.legal_moves(&node.position);
        if legal.is_empty() {
            return Err(SearchError::InvalidState(
                "non-terminal position has no legal moves".into(),
            ));
        }

        let mut priors: Vec<f32> = legal
            .iter()
            .map(|mv| policy.get(game.action_index(mv)).copied().unwrap_or(0.0))
            .collect();
        if !normalize_weights(&mut priors) {
            priors.fill(1.0 / legal.len() as f32);
        }

        let mut children = Vec::with_capacity(legal.len());
        for (mv, prior) in legal.into_iter().zip(priors) {
            let position = game.apply(&node.position, mv)?;
            let is_terminal = game.is_terminal(&position);
            let terminal_value = if is_terminal {
                outcome_value(game.winner(&position), game.current_player(&position))
            } else {
                0.0
            };
            children.push(Node::new_child(
                node_id,
                mv,
                prior,
                position,
                is_terminal,
                terminal_value,
            ));
        }

        let ids: Vec<NodeId> = children
            .into_iter()
            .map(|child| self.allocate(child))
            .collect();
        let node = self.get_mut(node_id);
        node.children = ids;
        node.expanded = true;
        Ok(())
    }

    /// Back a value up from a leaf to the root.
    ///
    /// `value` is from the perspective of the player to move at the leaf.
    /// Each node stores it for the player who moved into it, so the leaf
    /// receives `-value`, its parent `+value`, and so on.
    pub fn backpropagate(&mut self, leaf_id: NodeId, value: f32) {
        let mut current_id = leaf_id;
        let mut current_value = -value;

        while current_id.is_some() {
            let node = self.get_mut(current_id);
            node.visit_count += 1;
            node.value_sum += current_value;

            // Opponent's perspective one ply up
            current_value = -current_value;
            current_id = node.parent;
        }
    }

    /// Mark a path as awaiting evaluation.
    pub fn apply_virtual_loss(&mut self, path: &[NodeId]) {
        for &node_id in path {
            self.get_mut(node_id).in_flight += 1;
        }
    }

    /// Undo [`apply_virtual_loss`](Self::apply_virtual_loss).
    pub fn revert_virtual_loss(&mut self, path: &[NodeId]) {
        for &node_id in path {
            let node = self.get_mut(node_id);
            node.in_flight = node.in_flight.saturating_sub(1);
        }
    }

    /// Run one round of up to `max_leaves` simulations with a single
    /// evaluator call.
    ///
    /// Terminal leaves are backed up immediately. Non-terminal leaves get
    /// virtual loss along their path and are evaluated together; collection
    /// stops early when selection lands on a leaf that is already pending.
    /// With `max_leaves == 1` this is one plain sequential simulation.
    ///
    /// An evaluator failure is reported in the result, not as an error:
    /// the pending leaves are abandoned and all virtual loss is reverted.
    /// Virtual loss is also cleared before an expansion error is returned.
    pub fn simulate_batch<E: Evaluator + ?Sized>(
        &mut self,
        game: &G,
        evaluator: &E,
        c_puct: f32,
        max_leaves: u32,
        virtual_loss: f32,
    ) -> Result<SimulationBatch, SearchError> {
        let mut batch = SimulationBatch::default();
        let mut pending: Vec<(NodeId, Vec<NodeId>)> = Vec::new();

        while (pending.len() as u32) + batch.terminal_hits < max_leaves.max(1) {
            let (leaf_id, path) = self.select_leaf(c_puct, virtual_loss);
            let leaf = self.get(leaf_id);

            if leaf.is_terminal {
                let value = leaf.terminal_value;
                self.backpropagate(leaf_id, value);
                batch.terminal_hits += 1;
                batch.completed += 1;
                continue;
            }
            if leaf.in_flight > 0 {
                break;
            }

            self.apply_virtual_loss(&path);
            pending.push((leaf_id, path));
        }

        if pending.is_empty() {
            return Ok(batch);
        }

        let features: Vec<Vec<f32>> = pending
            .iter()
            .map(|(leaf_id, _)| game.encode(&self.get(*leaf_id).position))
            .collect();

        let started = Instant::now();
        let outcome = evaluator.evaluate_batch(&features);
        batch.inference_us = started.elapsed().as_micros() as u64;

        for (_, path) in &pending {
            self.revert_virtual_loss(path);
        }
        let results = match outcome.and_then(|results| validate_results(results, pending.len())) {
            Ok(results) => results,
            Err(e) => {
                batch.failure = Some(e);
                return Ok(batch);
            }
        };

        for ((leaf_id, path), result) in pending.into_iter().zip(results) {
            self.expand(game, leaf_id, &result.policy)?;
            let value = result.value.clamp(-1.0, 1.0);
            self.backpropagate(leaf_id, value);
            batch.evaluated += 1;
            batch.completed += 1;

            trace!(
                leaf = leaf_id.0,
                depth = path.len() - 1,
                value,
                "MCTS simulation complete"
            );
        }

        Ok(batch)
    }

    /// Most visited root child. Ties go to the first child.
    pub fn best_action(&self) -> Option<(G::Action, u32)> {
        let mut best: Option<(G::Action, u32)> = None;
        for &child_id in &self.get(self.root).children {
            let child = self.get(child_id);
            let Some(mv) = child.mv else { continue };
            match best {
                Some((_, visits)) if child.visit_count <= visits => {}
                _ => best = Some((mv, child.visit_count)),
            }
        }
        best
    }

    /// `(move, visits)` for every root child, in legal-move order.
    pub fn visit_counts(&self) -> Vec<(G::Action, u32)> {
        self.get(self.root)
            .children
            .iter()
            .filter_map(|&id| {
                let child = self.get(id);
                child.mv.map(|mv| (mv, child.visit_count))
            })
            .collect()
    }

    /// Normalized root visit counts indexed by action index.
    /// All zeros when the root has no visited children.
    pub fn visit_distribution(&self, game: &G, num_actions: usize) -> Vec<f32> {
        let mut policy = vec![0.0; num_actions];
        let visits = self.visit_counts();
        let total: u32 = visits.iter().map(|(_, n)| n).sum();
        if total == 0 {
            return policy;
        }

        for (mv, n) in visits {
            if let Some(slot) = policy.get_mut(game.action_index(&mv)) {
                *slot = n as f32 / total as f32;
            }
        }
        policy
    }

    /// Value of the root position for its player to move.
    pub fn root_value(&self) -> f32 {
        -self.get(self.root).mean_value()
    }

    /// Get statistics about the tree for debugging.
    pub fn stats(&self) -> TreeStats {
        let root = self.get(self.root);
        TreeStats {
            total_nodes: self.nodes.len(),
            root_visits: root.visit_count,
            root_value: self.root_value(),
            max_depth: self.compute_max_depth(),
        }
    }

    fn compute_max_depth(&self) -> u32 {
        // Parents precede children in the arena, so one forward pass suffices
        let mut depths = vec![0u32; self.nodes.len()];
        let mut max_depth = 0;
        for (i, node) in self.nodes.iter().enumerate() {
            if node.parent.is_some() {
                depths[i] = depths[node.parent.index()] + 1;
                max_depth = max_depth.max(depths[i]);
            }
        }
        max_depth
    }
}

fn validate_results(
    results: Vec<EvalResult>,
    expected: usize,
) -> Result<Vec<EvalResult>, EvaluatorError> {
    if results.len() != expected {
        return Err(EvaluatorError::MalformedResponse(format!(
            "expected {} results, got {}",
            expected,
            results.len()
        )));
    }
    if let Some(bad) = results.iter().find(|r| !r.value.is_finite()) {
        return Err(EvaluatorError::MalformedResponse(format!(
            "non-finite value {}",
            bad.value
        )));
    }
    Ok(results)
}

/// Statistics about an MCTS tree.
#[derive(Debug, Clone)]
pub struct TreeStats {
    pub total_nodes: usize,
    pub root_visits: u32,
    pub root_value: f32,
    pub max_depth: u32,
}
