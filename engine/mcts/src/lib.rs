//! Monte Carlo Tree Search (MCTS) implementation for AlphaZero-style game playing.
//!
//! This crate provides a game-agnostic MCTS implementation that works with any
//! game implementing the `engine-core` Game trait.
//!
//! # Overview
//!
//! MCTS is a search algorithm that builds a search tree by running simulations.
//! Each simulation consists of four phases:
//!
//! 1. **Selection**: Traverse the tree using UCB (Upper Confidence Bound) to
//!    balance exploration and exploitation
//! 2. **Expansion**: When reaching a leaf, expand it by adding children for
//!    each legal action
//! 3. **Evaluation**: Use a policy/value network (or uniform prior for testing)
//!    to estimate the value of the new state
//! 4. **Backpropagation**: Update visit counts and value estimates along the
//!    path from leaf to root
//!
//! # Usage
//!
//! ```rust
//! use engine_core::Game;
//! use games_rps_card::RpsCard;
//! use mcts::{run_mcts, MctsConfig, UniformEvaluator};
//! use rand::SeedableRng;
//! use rand_chacha::ChaCha20Rng;
//!
//! let game = RpsCard::default();
//! let mut rng = ChaCha20Rng::seed_from_u64(42);
//! let state = game.new_game(&mut rng);
//!
//! let evaluator = UniformEvaluator::new(game.num_actions());
//! let config = MctsConfig::for_testing();
//!
//! let result = run_mcts(&game, &evaluator, config, state, &mut rng).unwrap();
//! assert!((result.policy.iter().sum::<f32>() - 1.0).abs() < 1e-5);
//! println!("Best move: {:?}, value {}", result.mv, result.value);
//! ```
//!
//! # Configuration
//!
//! The [`MctsConfig`] struct controls search behavior:
//!
//! - `num_simulations`: Number of simulations per search (default: 800)
//! - `c_puct`: Exploration constant for UCB (default: 1.25)
//! - `dirichlet_alpha`: Noise parameter for exploration at root (default: 0.3)
//! - `temperature`: Temperature for action selection (1.0 = proportional, 0.0 = greedy)
//! - `eval_batch_size`: Leaves gathered under virtual loss per evaluator call (default: 1)
//! - `time_limit`: Optional wall-clock budget per search
//!
//! # Evaluators
//!
//! The search requires an [`Evaluator`] to estimate policy and value:
//!
//! - [`UniformEvaluator`]: uniform priors and zero value (for testing)
//! - [`LocalEvaluator`]: any in-process [`PolicyValueModel`], such as the
//!   ONNX model behind the `onnx` feature
//! - [`BatchingEvaluator`]: coalesces positions from many searches into
//!   batched calls to a [`ModelBackend`] such as [`HttpModelBackend`]
//!
//! # Architecture
//!
//! ```text
//! +------------------------------------------------------------+
//! |                        MctsEngine                          |
//! |  +--------------+   +-----------+   +--------------------+ |
//! |  |  SearchTree  |   |   Game    |   |     Evaluator      | |
//! |  |   (arena)    |   | (rules)   |   |  (policy/value)    | |
//! |  +------+-------+   +-----+-----+   +---------+----------+ |
//! |         |                 |                   |            |
//! |         v                 v                   v            |
//! |  +------------------------------------------------------+  |
//! |  |   select -> (virtual loss) -> evaluate batch ->      |  |
//! |  |              expand -> backpropagate                 |  |
//! |  +------------------------------------------------------+  |
//! +------------------------------------------------------------+
//! ```

pub mod batching;
pub mod config;
pub mod evaluator;
pub mod node;
pub mod remote;
pub mod search;
pub mod tree;

#[cfg(feature = "onnx")]
pub mod onnx;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types
pub use batching::{BatchConfig, BatcherSnapshot, BatcherStats, BatchingEvaluator, ModelBackend};
pub use config::MctsConfig;
pub use evaluator::{
    EvalResult, Evaluator, EvaluatorError, LocalEvaluator, PolicyValueModel, UniformEvaluator,
    UniformModel,
};
pub use node::{Node, NodeId};
pub use remote::HttpModelBackend;
pub use search::{
    run_mcts, MctsEngine, MctsSearch, SearchError, SearchResult, SearchStats, StopReason,
};
pub use tree::{SearchTree, SimulationBatch, TreeStats};

#[cfg(feature = "onnx")]
pub use onnx::OnnxModel;
