//! Configuration struct definitions.
//!
//! Every field falls back to the embedded defaults when absent from
//! config.toml, so partial files are valid.

use crate::defaults;
use serde::Deserialize;

// ============================================================================
// Serde default functions (required for #[serde(default = "...")])
// ============================================================================

fn d_data_dir() -> String {
    defaults::data_dir().into()
}
fn d_env_id() -> String {
    defaults::env_id().into()
}
fn d_log_level() -> String {
    defaults::log_level().into()
}
fn d_deck_size() -> usize {
    defaults::deck_size()
}
fn d_hand_size() -> usize {
    defaults::hand_size()
}
fn d_max_rounds() -> u32 {
    defaults::max_rounds()
}
fn d_num_sims() -> u32 {
    defaults::num_simulations()
}
fn d_c_puct() -> f64 {
    defaults::c_puct()
}
fn d_temperature() -> f64 {
    defaults::temperature()
}
fn d_temp_threshold() -> u32 {
    defaults::temp_threshold()
}
fn d_final_temperature() -> f64 {
    defaults::final_temperature()
}
fn d_dirichlet_alpha() -> f64 {
    defaults::dirichlet_alpha()
}
fn d_dirichlet_epsilon() -> f64 {
    defaults::dirichlet_epsilon()
}
fn d_eval_batch_size() -> usize {
    defaults::eval_batch_size()
}
fn d_virtual_loss() -> f64 {
    defaults::virtual_loss()
}
fn d_max_failures() -> u32 {
    defaults::max_consecutive_failures()
}
fn d_search_timeout_ms() -> u64 {
    defaults::search_timeout_ms()
}
fn d_backend() -> String {
    defaults::evaluator_backend().into()
}
fn d_url() -> String {
    defaults::evaluator_url().into()
}
fn d_max_batch_size() -> usize {
    defaults::max_batch_size()
}
fn d_max_wait_ms() -> u64 {
    defaults::max_wait_ms()
}
fn d_max_retries() -> u32 {
    defaults::max_retries()
}
fn d_retry_backoff_ms() -> u64 {
    defaults::retry_backoff_ms()
}
fn d_request_timeout_ms() -> u64 {
    defaults::request_timeout_ms()
}
fn d_num_games() -> u64 {
    defaults::num_games()
}
fn d_workers() -> usize {
    defaults::workers()
}
fn d_seed() -> u64 {
    defaults::seed()
}
fn d_max_moves() -> u32 {
    defaults::max_moves()
}
fn d_example_store() -> String {
    defaults::example_store().into()
}
fn d_db_path() -> String {
    defaults::db_path().into()
}
fn d_log_interval() -> u64 {
    defaults::log_interval()
}
fn d_health_port() -> u16 {
    defaults::health_port()
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Root configuration structure matching config.toml
#[derive(Debug, Deserialize, Default, Clone)]
pub struct CentralConfig {
    #[serde(default)]
    pub common: CommonConfig,
    #[serde(default)]
    pub game: GameConfig,
    #[serde(default)]
    pub mcts: MctsConfig,
    #[serde(default)]
    pub evaluator: EvaluatorConfig,
    #[serde(default)]
    pub selfplay: SelfPlayConfig,
}

/// Common configuration shared by all components
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CommonConfig {
    #[serde(default = "d_data_dir")]
    pub data_dir: String,
    #[serde(default = "d_env_id")]
    pub env_id: String,
    #[serde(default = "d_log_level")]
    pub log_level: String,
}

impl Default for CommonConfig {
    fn default() -> Self {
        Self {
            data_dir: defaults::data_dir().into(),
            env_id: defaults::env_id().into(),
            log_level: defaults::log_level().into(),
        }
    }
}

/// Card game rules
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GameConfig {
    #[serde(default = "d_deck_size")]
    pub deck_size: usize,
    #[serde(default = "d_hand_size")]
    pub hand_size: usize,
    #[serde(default = "d_max_rounds")]
    pub max_rounds: u32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            deck_size: defaults::deck_size(),
            hand_size: defaults::hand_size(),
            max_rounds: defaults::max_rounds(),
        }
    }
}

/// MCTS (Monte Carlo Tree Search) configuration
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MctsConfig {
    #[serde(default = "d_num_sims")]
    pub num_simulations: u32,
    #[serde(default = "d_c_puct")]
    pub c_puct: f64,
    #[serde(default = "d_temperature")]
    pub temperature: f64,
    /// Moves played at `temperature` before switching to `final_temperature` (0 = never)
    #[serde(default = "d_temp_threshold")]
    pub temp_threshold: u32,
    #[serde(default = "d_final_temperature")]
    pub final_temperature: f64,
    #[serde(default = "d_dirichlet_alpha")]
    pub dirichlet_alpha: f64,
    #[serde(default = "d_dirichlet_epsilon")]
    pub dirichlet_epsilon: f64,
    /// Leaves evaluated per round; 1 disables virtual-loss batching
    #[serde(default = "d_eval_batch_size")]
    pub eval_batch_size: usize,
    #[serde(default = "d_virtual_loss")]
    pub virtual_loss: f64,
    #[serde(default = "d_max_failures")]
    pub max_consecutive_failures: u32,
    /// Per-move search deadline in milliseconds (0 = none)
    #[serde(default = "d_search_timeout_ms")]
    pub search_timeout_ms: u64,
}

impl Default for MctsConfig {
    fn default() -> Self {
        Self {
            num_simulations: defaults::num_simulations(),
            c_puct: defaults::c_puct(),
            temperature: defaults::temperature(),
            temp_threshold: defaults::temp_threshold(),
            final_temperature: defaults::final_temperature(),
            dirichlet_alpha: defaults::dirichlet_alpha(),
            dirichlet_epsilon: defaults::dirichlet_epsilon(),
            eval_batch_size: defaults::eval_batch_size(),
            virtual_loss: defaults::virtual_loss(),
            max_consecutive_failures: defaults::max_consecutive_failures(),
            search_timeout_ms: defaults::search_timeout_ms(),
        }
    }
}

/// Policy/value evaluator configuration
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EvaluatorConfig {
    /// "uniform" or "remote"
    #[serde(default = "d_backend")]
    pub backend: String,
    /// Base URL of the remote model service
    #[serde(default = "d_url")]
    pub url: String,
    #[serde(default = "d_max_batch_size")]
    pub max_batch_size: usize,
    #[serde(default = "d_max_wait_ms")]
    pub max_wait_ms: u64,
    #[serde(default = "d_max_retries")]
    pub max_retries: u32,
    #[serde(default = "d_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "d_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            backend: defaults::evaluator_backend().into(),
            url: defaults::evaluator_url().into(),
            max_batch_size: defaults::max_batch_size(),
            max_wait_ms: defaults::max_wait_ms(),
            max_retries: defaults::max_retries(),
            retry_backoff_ms: defaults::retry_backoff_ms(),
            request_timeout_ms: defaults::request_timeout_ms(),
        }
    }
}

/// Self-play run configuration
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SelfPlayConfig {
    #[serde(default = "d_num_games")]
    pub num_games: u64,
    #[serde(default = "d_workers")]
    pub workers: usize,
    #[serde(default = "d_seed")]
    pub seed: u64,
    #[serde(default = "d_max_moves")]
    pub max_moves: u32,
    /// "sqlite" or "memory"
    #[serde(default = "d_example_store")]
    pub example_store: String,
    #[serde(default = "d_db_path")]
    pub db_path: String,
    #[serde(default = "d_log_interval")]
    pub log_interval: u64,
    /// Port for the health/metrics server (0 = disabled)
    #[serde(default = "d_health_port")]
    pub health_port: u16,
}

impl Default for SelfPlayConfig {
    fn default() -> Self {
        Self {
            num_games: defaults::num_games(),
            workers: defaults::workers(),
            seed: defaults::seed(),
            max_moves: defaults::max_moves(),
            example_store: defaults::example_store().into(),
            db_path: defaults::db_path().into(),
            log_interval: defaults::log_interval(),
            health_port: defaults::health_port(),
        }
    }
}
