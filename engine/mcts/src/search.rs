//! MCTS search implementation.
//!
//! Implements the core MCTS algorithm:
//! 1. Selection: Traverse tree using the selection score to find a leaf
//! 2. Expansion: Add children to the leaf using policy prior
//! 3. Evaluation: Get value estimate from evaluator
//! 4. Backpropagation: Update statistics along the path
//!
//! One [`MctsSearch`] owns one tree for one decision. [`MctsEngine`] wraps
//! it with a shared game, a shared evaluator and an owned RNG so callers can
//! search move after move.

use std::sync::Arc;
use std::time::Instant;

use engine_core::{Game, GameError};
use rand::Rng;
use rand_chacha::ChaCha20Rng;
use rand_distr::{Distribution, Gamma};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::MctsConfig;
use crate::evaluator::{Evaluator, EvaluatorError};
use crate::tree::{SearchTree, SimulationBatch};

/// Errors that can occur during MCTS search.
#[derive(Debug, Clone, Error)]
pub enum SearchError {
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Evaluation failed: {0}")]
    Evaluation(#[from] EvaluatorError),

    #[error("Search deadline passed before any simulation completed")]
    Timeout,

    #[error("Game error: {0}")]
    Game(#[from] GameError),

    #[error("Invalid MCTS config: {0}")]
    InvalidConfig(String),
}

/// Why the simulation loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StopReason {
    /// All configured simulations completed
    BudgetExhausted,
    /// The deadline passed first
    Deadline,
    /// Only one legal move; no simulations were run
    SingleLegalMove,
}

/// Per-search counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchStats {
    pub total_time_us: u64,
    pub inference_time_us: u64,
    /// Evaluator rounds, including the root expansion
    pub num_batches: u32,
    /// Positions evaluated
    pub total_evals: u32,
    pub terminal_hits: u32,
    pub evaluation_failures: u32,
    pub tree_nodes: usize,
    pub max_depth: u32,
}

/// Result of an MCTS search.
#[derive(Debug, Clone)]
pub struct SearchResult<A> {
    /// Move to play
    pub mv: A,

    /// Normalized root visit counts indexed by action index
    pub policy: Vec<f32>,

    /// Root visit count per legal move, in legal-move order
    pub visits: Vec<(A, u32)>,

    /// Root value for the player to move
    pub value: f32,

    /// Completed simulations, not counting the root expansion
    pub simulations: u32,

    pub stop_reason: StopReason,

    pub stats: SearchStats,
}

/// MCTS search state.
pub struct MctsSearch<'a, G: Game, E: Evaluator + ?Sized> {
    tree: SearchTree<G>,
    game: &'a G,
    evaluator: &'a E,
    config: MctsConfig,
    deadline: Option<Instant>,
    num_actions: usize,
}

impl<'a, G: Game, E: Evaluator + ?Sized> MctsSearch<'a, G, E> {
    /// Create a new MCTS search from the given position.
    ///
    /// The deadline defaults to `config.time_limit` from now.
    pub fn new(
        game: &'a G,
        evaluator: &'a E,
        config: MctsConfig,
        state: G::State,
    ) -> Result<Self, SearchError> {
        config.validate()?;
        if game.is_terminal(&state) {
            return Err(SearchError::InvalidState(
                "cannot search a terminal position".into(),
            ));
        }

        let deadline = config.time_limit.map(|limit| Instant::now() + limit);
        let num_actions = game.num_actions();
        Ok(Self {
            tree: SearchTree::new(game, state),
            game,
            evaluator,
            config,
            deadline,
            num_actions,
        })
    }

    /// Replace the deadline.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Run the MCTS search for the configured number of simulations.
    pub fn run(&mut self, rng: &mut ChaCha20Rng) -> Result<SearchResult<G::Action>, SearchError> {
        let start = Instant::now();
        let mut stats = SearchStats::default();

        let root_id = self.tree.root();
        let legal = self.game.legal_moves(&self.tree.get(root_id).position);
        match legal.as_slice() {
            [] => {
                return Err(SearchError::InvalidState(
                    "non-terminal position has no legal moves".into(),
                ))
            }
            [only] => return self.single_move(*only, start),
            _ => {}
        }

        let mut failures = 0u32;

        // The root expansion is one evaluator round whose value is backed up
        // into the root, but it does not count as a simulation.
        while !self.tree.get(root_id).is_expanded() {
            if self.deadline_passed() {
                return Err(SearchError::Timeout);
            }
            let batch = self.round(1)?;
            self.record(&batch, &mut stats);
            self.check_failure(batch.failure, &mut failures)?;
        }

        if self.config.root_noise {
            self.add_dirichlet_noise(rng)?;
        }

        let mut simulations = 0u32;
        let stop_reason = loop {
            if simulations >= self.config.num_simulations {
                break StopReason::BudgetExhausted;
            }
            if self.deadline_passed() {
                break StopReason::Deadline;
            }

            let remaining = self.config.num_simulations - simulations;
            let max_leaves = remaining.min(self.config.eval_batch_size as u32);
            let batch = self.round(max_leaves)?;
            self.record(&batch, &mut stats);
            simulations += batch.completed;
            self.check_failure(batch.failure, &mut failures)?;
        };

        if simulations == 0 {
            return Err(SearchError::Timeout);
        }

        let mv = self.choose_move(rng)?;
        let policy = self.tree.visit_distribution(self.game, self.num_actions);
        let tree_stats = self.tree.stats();

        stats.total_time_us = start.elapsed().as_micros() as u64;
        stats.tree_nodes = tree_stats.total_nodes;
        stats.max_depth = tree_stats.max_depth;

        debug!(
            simulations,
            batches = stats.num_batches,
            failures = stats.evaluation_failures,
            nodes = stats.tree_nodes,
            depth = stats.max_depth,
            value = tree_stats.root_value,
            elapsed_us = stats.total_time_us,
            ?stop_reason,
            "MCTS search complete"
        );

        Ok(SearchResult {
            mv,
            policy,
            visits: self.tree.visit_counts(),
            value: tree_stats.root_value,
            simulations,
            stop_reason,
            stats,
        })
    }

    /// Get the search tree (for inspection/debugging).
    pub fn tree(&self) -> &SearchTree<G> {
        &self.tree
    }

    fn single_move(
        &self,
        mv: G::Action,
        start: Instant,
    ) -> Result<SearchResult<G::Action>, SearchError> {
        let mut policy = vec![0.0; self.num_actions];
        let index = self.game.action_index(&mv);
        match policy.get_mut(index) {
            Some(slot) => *slot = 1.0,
            None => {
                return Err(SearchError::InvalidState(format!(
                    "action index {} out of range for {} actions",
                    index, self.num_actions
                )))
            }
        }

        Ok(SearchResult {
            mv,
            policy,
            visits: vec![(mv, 0)],
            value: 0.0,
            simulations: 0,
            stop_reason: StopReason::SingleLegalMove,
            stats: SearchStats {
                total_time_us: start.elapsed().as_micros() as u64,
                tree_nodes: 1,
                ..SearchStats::default()
            },
        })
    }

    fn round(&mut self, max_leaves: u32) -> Result<SimulationBatch, SearchError> {
        self.tree.simulate_batch(
            self.game,
            self.evaluator,
            self.config.c_puct,
            max_leaves,
            self.config.virtual_loss,
        )
    }

    fn record(&self, batch: &SimulationBatch, stats: &mut SearchStats) {
        stats.terminal_hits += batch.terminal_hits;
        stats.inference_time_us += batch.inference_us;
        if batch.evaluated > 0 || batch.failure.is_some() {
            stats.num_batches += 1;
        }
        stats.total_evals += batch.evaluated;
        if batch.failure.is_some() {
            stats.evaluation_failures += 1;
        }
    }

    /// Count consecutive failed rounds; a successful round resets the count.
    fn check_failure(
        &self,
        failure: Option<EvaluatorError>,
        consecutive: &mut u32,
    ) -> Result<(), SearchError> {
        match failure {
            None => {
                *consecutive = 0;
                Ok(())
            }
            Some(e) => {
                *consecutive += 1;
                if *consecutive >= self.config.max_consecutive_failures {
                    return Err(SearchError::Evaluation(e));
                }
                warn!(
                    error = %e,
                    consecutive = *consecutive,
                    "Evaluation failed, abandoning pending simulations"
                );
                Ok(())
            }
        }
    }

    fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Add Dirichlet noise to root node priors for exploration.
    fn add_dirichlet_noise(&mut self, rng: &mut ChaCha20Rng) -> Result<(), SearchError> {
        let root_id = self.tree.root();
        let children = self.tree.get(root_id).children.clone();
        if children.is_empty() {
            return Ok(());
        }

        let noise = dirichlet_noise(children.len(), self.config.dirichlet_alpha, rng)?;
        let eps = self.config.dirichlet_epsilon;
        for (child_id, eta) in children.into_iter().zip(noise) {
            let child = self.tree.get_mut(child_id);
            child.prior = (1.0 - eps) * child.prior + eps * eta;
        }
        Ok(())
    }

    fn choose_move(&self, rng: &mut ChaCha20Rng) -> Result<G::Action, SearchError> {
        let no_children = || SearchError::InvalidState("root has no children".into());

        if self.config.temperature <= 1e-6 {
            return self.tree.best_action().map(|(mv, _)| mv).ok_or_else(no_children);
        }

        let visits = self.tree.visit_counts();
        let counts: Vec<u32> = visits.iter().map(|(_, n)| *n).collect();
        match sample_index(&counts, self.config.temperature, rng) {
            Some(i) => Ok(visits[i].0),
            None => self.tree.best_action().map(|(mv, _)| mv).ok_or_else(no_children),
        }
    }
}

/// Sample an index with probability proportional to `visits^(1/temperature)`.
///
/// Weights are computed relative to the largest count so small temperatures
/// do not overflow. Returns `None` when every count is zero.
fn sample_index(visits: &[u32], temperature: f32, rng: &mut ChaCha20Rng) -> Option<usize> {
    let max = visits.iter().copied().max().filter(|&m| m > 0)? as f64;
    let inv_t = 1.0 / temperature as f64;
    let weights: Vec<f64> = visits
        .iter()
        .map(|&n| {
            if n == 0 {
                0.0
            } else {
                (((n as f64).ln() - max.ln()) * inv_t).exp()
            }
        })
        .collect();

    let total: f64 = weights.iter().sum();
    let r = rng.gen::<f64>() * total;
    let mut cumsum = 0.0;
    for (i, &w) in weights.iter().enumerate() {
        cumsum += w;
        if r < cumsum {
            return Some(i);
        }
    }

    // Floating point slack: fall back to the last non-zero weight
    weights.iter().rposition(|&w| w > 0.0)
}

/// Generate Dirichlet-distributed noise using Gamma variates.
fn dirichlet_noise(n: usize, alpha: f32, rng: &mut ChaCha20Rng) -> Result<Vec<f32>, SearchError> {
    let gamma = Gamma::new(alpha as f64, 1.0)
        .map_err(|e| SearchError::InvalidConfig(format!("dirichlet_alpha {alpha}: {e}")))?;
    let mut samples: Vec<f32> = (0..n).map(|_| gamma.sample(rng) as f32).collect();

    let sum: f32 = samples.iter().sum();
    if sum > 0.0 && sum.is_finite() {
        for s in &mut samples {
            *s /= sum;
        }
    } else {
        samples.fill(1.0 / n as f32);
    }

    Ok(samples)
}

/// Search engine bound to one game and one evaluator.
///
/// Holds its own RNG so a seeded engine replays identically.
pub struct MctsEngine<G: Game, E: Evaluator + ?Sized> {
    game: Arc<G>,
    evaluator: Arc<E>,
    config: MctsConfig,
    rng: ChaCha20Rng,
}

impl<G: Game, E: Evaluator + ?Sized> MctsEngine<G, E> {
    pub fn new(game: Arc<G>, evaluator: Arc<E>, config: MctsConfig, rng: ChaCha20Rng) -> Self {
        Self {
            game,
            evaluator,
            config,
            rng,
        }
    }

    /// Search `state` using `config.time_limit` as the deadline.
    pub fn search(&mut self, state: &G::State) -> Result<SearchResult<G::Action>, SearchError> {
        let mut search = MctsSearch::new(
            &*self.game,
            &*self.evaluator,
            self.config.clone(),
            state.clone(),
        )?;
        search.run(&mut self.rng)
    }

    /// Search `state`, stopping new simulations at `deadline`.
    pub fn search_with_deadline(
        &mut self,
        state: &G::State,
        deadline: Instant,
    ) -> Result<SearchResult<G::Action>, SearchError> {
        let mut search = MctsSearch::new(
            &*self.game,
            &*self.evaluator,
            self.config.clone(),
            state.clone(),
        )?
        .with_deadline(deadline);
        search.run(&mut self.rng)
    }

    pub fn set_temperature(&mut self, temperature: f32) {
        self.config.temperature = temperature;
    }

    pub fn config(&self) -> &MctsConfig {
        &self.config
    }

    pub fn game(&self) -> &G {
        &self.game
    }

    pub fn rng_mut(&mut self) -> &mut ChaCha20Rng {
        &mut self.rng
    }
}

/// Convenience function to run a single MCTS search.
pub fn run_mcts<G: Game, E: Evaluator + ?Sized>(
    game: &G,
    evaluator: &E,
    config: MctsConfig,
    state: G::State,
    rng: &mut ChaCha20Rng,
) -> Result<SearchResult<G::Action>, SearchError> {
    let mut search = MctsSearch::new(game, evaluator, config, state)?;
    search.run(rng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::{LocalEvaluator, UniformEvaluator, UniformModel};
    use crate::node::NodeId;
    use crate::testing::{constant, failing, flaky, Countdown, CountdownState};
    use engine_core::Player;
    use games_rps_card::RpsCard;
    use rand::SeedableRng;

    fn rng(seed: u64) -> ChaCha20Rng {
        ChaCha20Rng::seed_from_u64(seed)
    }

    fn countdown(remaining: u8) -> (Countdown, CountdownState) {
        (
            Countdown { start: remaining },
            CountdownState::new(remaining, Player::One),
        )
    }

    /// Every expanded node has one visit of its own plus its children's,
    /// and no virtual loss survives the search.
    fn assert_visit_accounting<G: Game>(tree: &SearchTree<G>) {
        for id in 0..tree.len() {
            let node = tree.get(NodeId(id as u32));
            assert_eq!(node.in_flight, 0, "node {id} still in flight");
            if !node.is_expanded() {
                continue;
            }
            let child_visits: u32 = node
                .children
                .iter()
                .map(|&child| tree.get(child).visit_count)
                .sum();
            assert_eq!(node.visit_count, 1 + child_visits, "node {id}");
        }
    }

    #[test]
    fn test_search_rps_card_invariants() {
        let game = RpsCard::default();
        let evaluator = UniformEvaluator::new(game.num_actions());
        let state = game.new_game(&mut rng(1));
        let config = MctsConfig::for_testing().with_simulations(100);

        let mut search = MctsSearch::new(&game, &evaluator, config, state.clone()).unwrap();
        let result = search.run(&mut rng(2)).unwrap();

        assert_eq!(result.simulations, 100);
        assert_eq!(result.stop_reason, StopReason::BudgetExhausted);
        assert_eq!(result.policy.len(), game.num_actions());
        let total: f32 = result.policy.iter().sum();
        assert!((total - 1.0).abs() < 1e-5);

        let legal = game.legal_moves(&state);
        assert!(legal.contains(&result.mv));

        let tree = search.tree();
        let root = tree.get(tree.root());
        let child_visits: u32 = result.visits.iter().map(|(_, n)| n).sum();
        assert_eq!(child_visits, 100);
        assert_eq!(root.visit_count, 1 + child_visits);

        // Illegal actions never receive mass
        for (i, p) in result.policy.iter().enumerate() {
            if !legal.iter().any(|mv| game.action_index(mv) == i) {
                assert_eq!(*p, 0.0);
            }
        }
    }

    #[test]
    fn test_single_legal_move_skips_evaluator() {
        let (game, state) = countdown(1);
        let evaluator = constant(vec![0.5, 0.5], 0.0);

        let result = run_mcts(&game, &evaluator, MctsConfig::for_testing(), state, &mut rng(0))
            .unwrap();

        assert_eq!(result.mv, 1);
        assert_eq!(result.policy, vec![1.0, 0.0]);
        assert_eq!(result.visits, vec![(1, 0)]);
        assert_eq!(result.simulations, 0);
        assert_eq!(result.value, 0.0);
        assert_eq!(result.stop_reason, StopReason::SingleLegalMove);
        assert_eq!(evaluator.calls(), 0);
    }

    #[test]
    fn test_terminal_root_rejected() {
        let (game, state) = countdown(0);
        let evaluator = constant(vec![0.5, 0.5], 0.0);

        let err = run_mcts(&game, &evaluator, MctsConfig::for_testing(), state, &mut rng(0))
            .unwrap_err();
        assert!(matches!(err, SearchError::InvalidState(_)));
        assert_eq!(evaluator.calls(), 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let (game, state) = countdown(4);
        let evaluator = constant(vec![0.5, 0.5], 0.0);
        let config = MctsConfig::for_testing().with_simulations(0);

        let err = run_mcts(&game, &evaluator, config, state, &mut rng(0)).unwrap_err();
        assert!(matches!(err, SearchError::InvalidConfig(_)));
    }

    #[test]
    fn test_finds_immediate_win() {
        // Taking both stones wins on the spot; taking one hands the win over
        let (game, state) = countdown(2);
        let evaluator = constant(vec![0.5, 0.5], 0.0);
        let config = MctsConfig::for_testing().with_simulations(100);

        let result = run_mcts(&game, &evaluator, config, state, &mut rng(0)).unwrap();

        assert_eq!(result.mv, 2);
        assert!(result.value > 0.5, "root value {}", result.value);
        assert!(result.stats.terminal_hits > 0);
    }

    #[test]
    fn test_finds_forcing_move() {
        // From 4, taking one leaves the opponent on a multiple of three
        let (game, state) = countdown(4);
        let evaluator = constant(vec![0.5, 0.5], 0.0);
        let config = MctsConfig::for_testing().with_simulations(400);

        let result = run_mcts(&game, &evaluator, config, state, &mut rng(0)).unwrap();
        assert_eq!(result.mv, 1);
        assert!(result.value > 0.0);
    }

    #[test]
    fn test_zero_epsilon_keeps_raw_priors() {
        let (game, state) = countdown(4);
        let evaluator = constant(vec![0.8, 0.2], 0.0);
        let config = MctsConfig::for_testing()
            .with_simulations(1)
            .with_root_noise(0.3, 0.0);

        let mut search = MctsSearch::new(&game, &evaluator, config, state).unwrap();
        search.run(&mut rng(3)).unwrap();

        let tree = search.tree();
        let priors: Vec<f32> = tree
            .get(tree.root())
            .children
            .iter()
            .map(|&c| tree.get(c).prior)
            .collect();
        assert_eq!(priors, vec![0.8, 0.2]);
    }

    #[test]
    fn test_full_epsilon_replaces_priors_with_noise() {
        let (game, state) = countdown(4);
        let evaluator = constant(vec![0.8, 0.2], 0.0);
        let config = MctsConfig::for_testing()
            .with_simulations(1)
            .with_root_noise(0.3, 1.0);

        let mut search = MctsSearch::new(&game, &evaluator, config, state).unwrap();
        search.run(&mut rng(3)).unwrap();

        // Noise is the first thing drawn from the RNG
        let expected = dirichlet_noise(2, 0.3, &mut rng(3)).unwrap();
        let tree = search.tree();
        let priors: Vec<f32> = tree
            .get(tree.root())
            .children
            .iter()
            .map(|&c| tree.get(c).prior)
            .collect();
        assert_eq!(priors, expected);
        assert!((priors.iter().sum::<f32>() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_dirichlet_noise_is_a_distribution() {
        let mut r = rng(9);
        for n in [1usize, 2, 45] {
            let noise = dirichlet_noise(n, 0.3, &mut r).unwrap();
            assert_eq!(noise.len(), n);
            assert!(noise.iter().all(|&x| x >= 0.0));
            assert!((noise.iter().sum::<f32>() - 1.0).abs() < 1e-4);
        }
        assert!(matches!(
            dirichlet_noise(3, 0.0, &mut r),
            Err(SearchError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_persistent_failure_aborts() {
        let (game, state) = countdown(4);
        let evaluator = failing();

        let err = run_mcts(&game, &evaluator, MctsConfig::for_testing(), state, &mut rng(0))
            .unwrap_err();
        assert!(matches!(
            err,
            SearchError::Evaluation(EvaluatorError::Connection(_))
        ));
        assert_eq!(evaluator.calls(), 3);
    }

    #[test]
    fn test_transient_failures_recover() {
        let (game, state) = countdown(4);
        let evaluator = flaky(2, 2);
        let config = MctsConfig::for_testing().with_simulations(20);

        let result = run_mcts(&game, &evaluator, config, state, &mut rng(0)).unwrap();
        assert_eq!(result.simulations, 20);
        assert_eq!(result.stats.evaluation_failures, 2);
    }

    #[test]
    fn test_failure_counter_resets_after_success() {
        // Two failures, then successes: a budget of two still aborts,
        // a budget of three does not.
        let (game, state) = countdown(4);
        let config = MctsConfig::for_testing()
            .with_simulations(10)
            .with_max_consecutive_failures(2);
        let err = run_mcts(&game, &flaky(2, 2), config.clone(), state.clone(), &mut rng(0))
            .unwrap_err();
        assert!(matches!(err, SearchError::Evaluation(_)));

        let config = config.with_max_consecutive_failures(3);
        assert!(run_mcts(&game, &flaky(2, 2), config, state, &mut rng(0)).is_ok());
    }

    #[test]
    fn test_past_deadline_times_out() {
        let (game, state) = countdown(4);
        let evaluator = constant(vec![0.5, 0.5], 0.0);

        let mut search = MctsSearch::new(&game, &evaluator, MctsConfig::for_testing(), state)
            .unwrap()
            .with_deadline(Instant::now());
        let err = search.run(&mut rng(0)).unwrap_err();
        assert!(matches!(err, SearchError::Timeout));
    }

    #[test]
    fn test_time_limit_stops_early() {
        let game = RpsCard::default();
        let evaluator = UniformEvaluator::new(game.num_actions());
        let state = game.new_game(&mut rng(5));
        let config = MctsConfig::for_testing()
            .with_simulations(u32::MAX)
            .with_time_limit(std::time::Duration::from_millis(20));

        let result = run_mcts(&game, &evaluator, config, state, &mut rng(0)).unwrap();
        assert_eq!(result.stop_reason, StopReason::Deadline);
        assert!(result.simulations > 0);
    }

    #[test]
    fn test_batched_search_invariants() {
        let game = RpsCard::default();
        let state = game.new_game(&mut rng(11));
        let n = game.num_actions();
        let evaluator = constant(vec![1.0 / n as f32; n], 0.1);
        let config = MctsConfig::for_testing()
            .with_simulations(64)
            .with_eval_batch_size(8);

        let mut search = MctsSearch::new(&game, &evaluator, config, state).unwrap();
        let result = search.run(&mut rng(0)).unwrap();

        assert_eq!(result.simulations, 64);
        let tree = search.tree();
        let root = tree.get(tree.root());
        let child_visits: u32 = result.visits.iter().map(|(_, n)| n).sum();
        assert_eq!(child_visits, 64);
        assert_eq!(root.visit_count, 65);
        assert_eq!(root.in_flight, 0);

        let sizes = evaluator.batch_sizes.lock().unwrap();
        assert!(sizes.iter().all(|&s| s <= 8));
        assert!(sizes.iter().any(|&s| s > 1));
        assert!(result.stats.num_batches < 64);
    }

    #[test]
    fn test_visit_accounting_holds_at_every_node() {
        let game = RpsCard::default();
        let evaluator = UniformEvaluator::new(game.num_actions());

        for batch_size in [1, 4, 16] {
            for seed in 0..3 {
                let state = game.new_game(&mut rng(seed));
                let config = MctsConfig::for_testing()
                    .with_simulations(200)
                    .with_eval_batch_size(batch_size);

                let mut search = MctsSearch::new(&game, &evaluator, config, state).unwrap();
                let result = search.run(&mut rng(seed + 100)).unwrap();

                assert_eq!(result.simulations, 200, "batch {batch_size} seed {seed}");
                assert!(search.tree().len() > game.num_actions());
                assert_visit_accounting(search.tree());
            }
        }
    }

    #[test]
    fn test_sample_index_follows_visits() {
        let mut r = rng(4);
        for _ in 0..50 {
            assert_eq!(sample_index(&[0, 5, 0], 1.0, &mut r), Some(1));
        }
        assert_eq!(sample_index(&[0, 0], 1.0, &mut r), None);

        let draws = 4000;
        let ones = (0..draws)
            .filter(|_| sample_index(&[1, 3], 1.0, &mut r) == Some(1))
            .count();
        let frac = ones as f64 / draws as f64;
        assert!((frac - 0.75).abs() < 0.05, "fraction {frac}");

        // Tiny temperatures concentrate on the max without overflowing
        assert_eq!(sample_index(&[9, 10], 0.01, &mut r), Some(1));
    }

    #[test]
    fn test_engine_is_reproducible() {
        let game = Arc::new(RpsCard::default());
        let evaluator: Arc<dyn Evaluator> =
            Arc::new(LocalEvaluator::new(UniformModel::new(game.num_actions())));
        let state = game.new_game(&mut rng(7));
        let config = MctsConfig::for_training().with_simulations(64);

        let mut a = MctsEngine::new(game.clone(), evaluator.clone(), config.clone(), rng(8));
        let mut b = MctsEngine::new(game.clone(), evaluator, config, rng(8));

        for _ in 0..3 {
            let ra = a.search(&state).unwrap();
            let rb = b.search(&state).unwrap();
            assert_eq!(ra.mv, rb.mv);
            assert_eq!(ra.policy, rb.policy);
        }
    }

    #[test]
    fn test_engine_set_temperature() {
        let game = Arc::new(Countdown { start: 2 });
        let evaluator = Arc::new(constant(vec![0.5, 0.5], 0.0));
        let mut engine = MctsEngine::new(game, evaluator, MctsConfig::for_testing(), rng(0));

        engine.set_temperature(1.0);
        assert_eq!(engine.config().temperature, 1.0);
        let result = engine
            .search(&CountdownState::new(2, Player::One))
            .unwrap();
        assert!(result.mv == 1 || result.mv == 2);
    }
}
