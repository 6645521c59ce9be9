//! MCTS configuration parameters.

use std::time::Duration;

use crate::search::SearchError;

/// Configuration for Monte Carlo Tree Search.
#[derive(Debug, Clone)]
pub struct MctsConfig {
    /// Number of simulations to run per search.
    pub num_simulations: u32,

    /// Exploration constant for the selection score (c_puct in AlphaZero).
    /// Higher values encourage exploration, lower values favor exploitation.
    pub c_puct: f32,

    /// Dirichlet noise concentration for root exploration.
    /// For games with ~10 legal moves, use ~0.3.
    pub dirichlet_alpha: f32,

    /// Fraction of the root prior that comes from Dirichlet noise.
    /// 0.25 means 75% prior + 25% noise.
    pub dirichlet_epsilon: f32,

    /// Mix Dirichlet noise into the root priors (self-play only).
    pub root_noise: bool,

    /// Temperature for move selection after search.
    /// 1.0 = sample proportional to visit counts
    /// 0.0 = always pick most-visited (argmax)
    pub temperature: f32,

    /// Penalty applied per pending evaluation while leaves are batched.
    pub virtual_loss: f32,

    /// Leaves collected per evaluator call.
    /// Set to 1 for the plain sequential search.
    pub eval_batch_size: usize,

    /// Consecutive failed evaluator rounds tolerated before the search aborts.
    pub max_consecutive_failures: u32,

    /// Wall-clock budget for one search. `None` runs the full simulation budget.
    pub time_limit: Option<Duration>,
}

impl Default for MctsConfig {
    fn default() -> Self {
        Self {
            num_simulations: 800,
            c_puct: 1.25,
            dirichlet_alpha: 0.3,
            dirichlet_epsilon: 0.25,
            root_noise: true,
            temperature: 1.0,
            virtual_loss: 1.0,
            eval_batch_size: 1,
            max_consecutive_failures: 3,
            time_limit: None,
        }
    }
}

impl MctsConfig {
    /// Create config for training (with exploration noise).
    pub fn for_training() -> Self {
        Self::default()
    }

    /// Create config for evaluation/inference (no noise, greedy selection).
    pub fn for_evaluation() -> Self {
        Self {
            root_noise: false,
            dirichlet_epsilon: 0.0,
            temperature: 0.0,
            ..Self::default()
        }
    }

    /// Create a fast config for testing.
    pub fn for_testing() -> Self {
        Self {
            num_simulations: 50,
            root_noise: false,
            dirichlet_epsilon: 0.0,
            temperature: 0.0,
            ..Self::default()
        }
    }

    /// Builder pattern: set number of simulations.
    pub fn with_simulations(mut self, n: u32) -> Self {
        self.num_simulations = n;
        self
    }

    /// Builder pattern: set c_puct exploration constant.
    pub fn with_c_puct(mut self, c: f32) -> Self {
        self.c_puct = c;
        self
    }

    /// Builder pattern: set temperature.
    pub fn with_temperature(mut self, t: f32) -> Self {
        self.temperature = t;
        self
    }

    /// Builder pattern: enable root noise with the given parameters.
    pub fn with_root_noise(mut self, alpha: f32, epsilon: f32) -> Self {
        self.root_noise = true;
        self.dirichlet_alpha = alpha;
        self.dirichlet_epsilon = epsilon;
        self
    }

    /// Builder pattern: disable root noise.
    pub fn without_root_noise(mut self) -> Self {
        self.root_noise = false;
        self
    }

    /// Builder pattern: set evaluation batch size.
    pub fn with_eval_batch_size(mut self, size: usize) -> Self {
        self.eval_batch_size = size;
        self
    }

    /// Builder pattern: set the per-search time limit.
    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    /// Builder pattern: set the consecutive failure budget.
    pub fn with_max_consecutive_failures(mut self, n: u32) -> Self {
        self.max_consecutive_failures = n;
        self
    }

    /// Check parameter ranges.
    pub fn validate(&self) -> Result<(), SearchError> {
        let invalid = |msg: String| Err(SearchError::InvalidConfig(msg));

        if self.num_simulations == 0 {
            return invalid("num_simulations must be > 0".into());
        }
        if !self.c_puct.is_finite() || self.c_puct < 0.0 {
            return invalid(format!("c_puct must be finite and >= 0, got {}", self.c_puct));
        }
        if !self.temperature.is_finite() || self.temperature < 0.0 {
            return invalid(format!(
                "temperature must be finite and >= 0, got {}",
                self.temperature
            ));
        }
        if !(0.0..=1.0).contains(&self.dirichlet_epsilon) {
            return invalid(format!(
                "dirichlet_epsilon must be in [0, 1], got {}",
                self.dirichlet_epsilon
            ));
        }
        if self.root_noise && !(self.dirichlet_alpha.is_finite() && self.dirichlet_alpha > 0.0) {
            return invalid(format!(
                "dirichlet_alpha must be > 0 when root noise is enabled, got {}",
                self.dirichlet_alpha
            ));
        }
        if !self.virtual_loss.is_finite() || self.virtual_loss < 0.0 {
            return invalid(format!(
                "virtual_loss must be finite and >= 0, got {}",
                self.virtual_loss
            ));
        }
        if self.eval_batch_size == 0 {
            return invalid("eval_batch_size must be >= 1".into());
        }
        if self.max_consecutive_failures == 0 {
            return invalid("max_consecutive_failures must be >= 1".into());
        }
        Ok(())
    }
}
