//! Command-line configuration for the actor binary
//!
//! Defaults come from the central configuration (`config.toml` plus
//! `RPSZERO_*` environment overrides, see `engine-config`). Flags given on
//! the command line take priority over both.

use anyhow::{anyhow, Result};
use clap::Parser;
use games_rps_card::RpsCardConfig;
use mcts::{BatchConfig, MctsConfig};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::level_filters::LevelFilter;

use engine_config::{load_config, CentralConfig};

use crate::selfplay::SelfPlayConfig;
use crate::storage::STORE_KINDS;

// Load central config once at startup
static CENTRAL_CONFIG: Lazy<CentralConfig> = Lazy::new(load_config);

/// Evaluator backends this build supports.
pub fn evaluator_backends() -> &'static [&'static str] {
    if cfg!(feature = "onnx") {
        &["uniform", "remote", "onnx"]
    } else {
        &["uniform", "remote"]
    }
}

fn default_data_dir() -> String {
    CENTRAL_CONFIG.common.data_dir.clone()
}

fn default_env_id() -> String {
    CENTRAL_CONFIG.common.env_id.clone()
}

fn default_log_level() -> String {
    CENTRAL_CONFIG.common.log_level.clone()
}

fn default_deck_size() -> usize {
    CENTRAL_CONFIG.game.deck_size
}

fn default_hand_size() -> usize {
    CENTRAL_CONFIG.game.hand_size
}

fn default_max_rounds() -> u32 {
    CENTRAL_CONFIG.game.max_rounds
}

fn default_num_simulations() -> u32 {
    CENTRAL_CONFIG.mcts.num_simulations
}

fn default_c_puct() -> f32 {
    CENTRAL_CONFIG.mcts.c_puct as f32
}

fn default_temperature() -> f32 {
    CENTRAL_CONFIG.mcts.temperature as f32
}

fn default_temp_threshold() -> u32 {
    CENTRAL_CONFIG.mcts.temp_threshold
}

fn default_final_temperature() -> f32 {
    CENTRAL_CONFIG.mcts.final_temperature as f32
}

fn default_dirichlet_alpha() -> f32 {
    CENTRAL_CONFIG.mcts.dirichlet_alpha as f32
}

fn default_dirichlet_epsilon() -> f32 {
    CENTRAL_CONFIG.mcts.dirichlet_epsilon as f32
}

fn default_eval_batch_size() -> usize {
    CENTRAL_CONFIG.mcts.eval_batch_size
}

fn default_virtual_loss() -> f32 {
    CENTRAL_CONFIG.mcts.virtual_loss as f32
}

fn default_max_consecutive_failures() -> u32 {
    CENTRAL_CONFIG.mcts.max_consecutive_failures
}

fn default_search_timeout_ms() -> u64 {
    CENTRAL_CONFIG.mcts.search_timeout_ms
}

fn default_backend() -> String {
    CENTRAL_CONFIG.evaluator.backend.clone()
}

fn default_evaluator_url() -> String {
    CENTRAL_CONFIG.evaluator.url.clone()
}

fn default_max_batch_size() -> usize {
    CENTRAL_CONFIG.evaluator.max_batch_size
}

fn default_max_wait_ms() -> u64 {
    CENTRAL_CONFIG.evaluator.max_wait_ms
}

fn default_max_retries() -> u32 {
    CENTRAL_CONFIG.evaluator.max_retries
}

fn default_retry_backoff_ms() -> u64 {
    CENTRAL_CONFIG.evaluator.retry_backoff_ms
}

fn default_request_timeout_ms() -> u64 {
    CENTRAL_CONFIG.evaluator.request_timeout_ms
}

fn default_num_games() -> u64 {
    CENTRAL_CONFIG.selfplay.num_games
}

fn default_workers() -> usize {
    CENTRAL_CONFIG.selfplay.workers
}

fn default_seed() -> u64 {
    CENTRAL_CONFIG.selfplay.seed
}

fn default_max_moves() -> u32 {
    CENTRAL_CONFIG.selfplay.max_moves
}

fn default_example_store() -> String {
    CENTRAL_CONFIG.selfplay.example_store.clone()
}

fn default_db_path() -> String {
    CENTRAL_CONFIG.selfplay.db_path.clone()
}

fn default_log_interval() -> u64 {
    CENTRAL_CONFIG.selfplay.log_interval
}

fn default_health_port() -> u16 {
    CENTRAL_CONFIG.selfplay.health_port
}

#[derive(Parser, Debug, Clone, Serialize, Deserialize)]
#[command(name = "actor")]
#[command(about = "rpszero actor - MCTS self-play example generator")]
#[command(
    long_about = "Plays self-play games of the RPS card game with MCTS and stores one
training example per move.

Configuration is loaded from config.toml with RPSZERO_* environment variable
overrides. CLI arguments take highest priority."
)]
pub struct Config {
    /// Data directory for stats and models
    #[arg(long, default_value_t = default_data_dir())]
    pub data_dir: String,

    /// Environment ID recorded with the examples
    #[arg(long, default_value_t = default_env_id())]
    pub env_id: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value_t = default_log_level())]
    pub log_level: String,

    // ---- game ----
    /// Cards in the shared deck
    #[arg(long, default_value_t = default_deck_size())]
    pub deck_size: usize,

    /// Cards dealt to each player
    #[arg(long, default_value_t = default_hand_size())]
    pub hand_size: usize,

    #[arg(long, default_value_t = default_max_rounds())]
    pub max_rounds: u32,

    // ---- search ----
    /// Number of MCTS simulations per move
    #[arg(long, default_value_t = default_num_simulations())]
    pub num_simulations: u32,

    #[arg(long, default_value_t = default_c_puct())]
    pub c_puct: f32,

    /// Move sampling temperature (0 = always the most visited move)
    #[arg(long, default_value_t = default_temperature())]
    pub temperature: f32,

    /// Move number after which `final_temperature` applies (0 to disable)
    #[arg(long, default_value_t = default_temp_threshold())]
    pub temp_threshold: u32,

    #[arg(long, default_value_t = default_final_temperature())]
    pub final_temperature: f32,

    #[arg(long, default_value_t = default_dirichlet_alpha())]
    pub dirichlet_alpha: f32,

    /// Share of root priors replaced by Dirichlet noise (0 disables noise)
    #[arg(long, default_value_t = default_dirichlet_epsilon())]
    pub dirichlet_epsilon: f32,

    /// Leaves evaluated per round (1 disables virtual-loss batching)
    #[arg(long, default_value_t = default_eval_batch_size())]
    pub eval_batch_size: usize,

    #[arg(long, default_value_t = default_virtual_loss())]
    pub virtual_loss: f32,

    #[arg(long, default_value_t = default_max_consecutive_failures())]
    pub max_consecutive_failures: u32,

    /// Per-move search deadline in milliseconds (0 for none)
    #[arg(long, default_value_t = default_search_timeout_ms())]
    pub search_timeout_ms: u64,

    // ---- evaluator ----
    /// Evaluator backend: uniform, remote (or onnx when built with the feature)
    #[arg(long, default_value_t = default_backend())]
    pub backend: String,

    /// Base URL of the remote model service
    #[arg(long, default_value_t = default_evaluator_url())]
    pub evaluator_url: String,

    /// ONNX model file for the onnx backend
    #[arg(long)]
    pub model_path: Option<String>,

    #[arg(long, default_value_t = default_max_batch_size())]
    pub max_batch_size: usize,

    #[arg(long, default_value_t = default_max_wait_ms())]
    pub max_wait_ms: u64,

    #[arg(long, default_value_t = default_max_retries())]
    pub max_retries: u32,

    #[arg(long, default_value_t = default_retry_backoff_ms())]
    pub retry_backoff_ms: u64,

    #[arg(long, default_value_t = default_request_timeout_ms())]
    pub request_timeout_ms: u64,

    // ---- self-play ----
    /// Number of games to generate
    #[arg(long, default_value_t = default_num_games())]
    pub num_games: u64,

    /// Concurrent self-play workers (1 plays sequentially)
    #[arg(long, default_value_t = default_workers())]
    pub workers: usize,

    #[arg(long, default_value_t = default_seed())]
    pub seed: u64,

    /// Abort a game still running after this many moves
    #[arg(long, default_value_t = default_max_moves())]
    pub max_moves: u32,

    /// Example store: sqlite or memory
    #[arg(long, default_value_t = default_example_store())]
    pub example_store: String,

    /// Path to the SQLite example database
    #[arg(long, default_value_t = default_db_path())]
    pub db_path: String,

    /// Log progress every N games (0 to disable)
    #[arg(long, default_value_t = default_log_interval())]
    pub log_interval: u64,

    /// Health/metrics server port (0 to disable)
    #[arg(long, default_value_t = default_health_port())]
    pub health_port: u16,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.env_id.is_empty() {
            return Err(anyhow!("env_id cannot be empty"));
        }

        if self.log_level.parse::<LevelFilter>().is_err() {
            return Err(anyhow!(
                "invalid log level '{}', expected one of trace, debug, info, warn, error",
                self.log_level
            ));
        }

        if self.workers == 0 {
            return Err(anyhow!("workers must be greater than 0"));
        }

        if self.max_moves == 0 {
            return Err(anyhow!("max_moves must be greater than 0"));
        }

        if !self.final_temperature.is_finite() || self.final_temperature < 0.0 {
            return Err(anyhow!(
                "final_temperature must be finite and non-negative, got {}",
                self.final_temperature
            ));
        }

        if !evaluator_backends().contains(&self.backend.as_str()) {
            return Err(anyhow!(
                "unknown backend '{}', expected one of {:?}",
                self.backend,
                evaluator_backends()
            ));
        }

        if self.backend == "remote" {
            if self.evaluator_url.is_empty() {
                return Err(anyhow!("evaluator_url is required for the remote backend"));
            }
            if self.max_batch_size == 0 {
                return Err(anyhow!("max_batch_size must be greater than 0"));
            }
            if self.request_timeout_ms == 0 {
                return Err(anyhow!("request_timeout_ms must be greater than 0"));
            }
        }

        if self.backend == "onnx" && self.model_path.is_none() {
            return Err(anyhow!("model_path is required for the onnx backend"));
        }

        if !STORE_KINDS.contains(&self.example_store.as_str()) {
            return Err(anyhow!(
                "unknown example_store '{}', expected one of {:?}",
                self.example_store,
                STORE_KINDS
            ));
        }

        self.game_config()
            .validate()
            .map_err(|e| anyhow!("invalid game settings: {e}"))?;

        // Names the offending mcts field, e.g. "num_simulations must be > 0"
        self.mcts_config()
            .validate()
            .map_err(|e| anyhow!("{e}"))?;

        Ok(())
    }

    pub fn game_config(&self) -> RpsCardConfig {
        RpsCardConfig {
            deck_size: self.deck_size,
            hand_size: self.hand_size,
            max_rounds: self.max_rounds,
        }
    }

    pub fn mcts_config(&self) -> MctsConfig {
        MctsConfig {
            num_simulations: self.num_simulations,
            c_puct: self.c_puct,
            dirichlet_alpha: self.dirichlet_alpha,
            dirichlet_epsilon: self.dirichlet_epsilon,
            root_noise: self.dirichlet_epsilon > 0.0,
            temperature: self.temperature,
            virtual_loss: self.virtual_loss,
            eval_batch_size: self.eval_batch_size,
            max_consecutive_failures: self.max_consecutive_failures,
            time_limit: None,
        }
    }

    pub fn batch_config(&self) -> BatchConfig {
        BatchConfig {
            max_batch_size: self.max_batch_size,
            max_wait: Duration::from_millis(self.max_wait_ms),
            max_retries: self.max_retries,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            ..BatchConfig::default()
        }
    }

    pub fn search_timeout(&self) -> Option<Duration> {
        (self.search_timeout_ms > 0).then(|| Duration::from_millis(self.search_timeout_ms))
    }

    pub fn selfplay_config(&self) -> SelfPlayConfig {
        SelfPlayConfig {
            workers: self.workers,
            mcts: self.mcts_config(),
            temp_threshold: self.temp_threshold,
            final_temperature: self.final_temperature,
            max_moves: self.max_moves,
            search_timeout: self.search_timeout(),
            log_interval: self.log_interval,
        }
    }

    /// Games run in parallel whenever more than one worker is configured.
    pub fn parallel(&self) -> bool {
        self.workers > 1
    }
}
