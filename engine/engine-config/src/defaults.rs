//! Default configuration values loaded from config.defaults.toml.
//!
//! The defaults file is embedded at compile time, so a binary built from
//! this workspace always carries the same baseline as the checked-in TOML.

use once_cell::sync::Lazy;
use serde::Deserialize;

/// The embedded defaults TOML file (loaded at compile time)
const DEFAULTS_TOML: &str = include_str!("../../../config.defaults.toml");

/// Parsed defaults structure (parsed once at first use)
static DEFAULTS: Lazy<DefaultsConfig> = Lazy::new(|| {
    toml::from_str(DEFAULTS_TOML).expect("config.defaults.toml should be valid TOML")
});

// ============================================================================
// Internal structs for parsing config.defaults.toml
// ============================================================================

#[derive(Debug, Deserialize)]
struct DefaultsConfig {
    common: CommonDefaults,
    game: GameDefaults,
    mcts: MctsDefaults,
    evaluator: EvaluatorDefaults,
    selfplay: SelfPlayDefaults,
}

#[derive(Debug, Deserialize)]
struct CommonDefaults {
    data_dir: String,
    env_id: String,
    log_level: String,
}

#[derive(Debug, Deserialize)]
struct GameDefaults {
    deck_size: usize,
    hand_size: usize,
    max_rounds: u32,
}

#[derive(Debug, Deserialize)]
struct MctsDefaults {
    num_simulations: u32,
    c_puct: f64,
    temperature: f64,
    temp_threshold: u32,
    final_temperature: f64,
    dirichlet_alpha: f64,
    dirichlet_epsilon: f64,
    eval_batch_size: usize,
    virtual_loss: f64,
    max_consecutive_failures: u32,
    search_timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
struct EvaluatorDefaults {
    backend: String,
    url: String,
    max_batch_size: usize,
    max_wait_ms: u64,
    max_retries: u32,
    retry_backoff_ms: u64,
    request_timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
struct SelfPlayDefaults {
    num_games: u64,
    workers: usize,
    seed: u64,
    max_moves: u32,
    example_store: String,
    db_path: String,
    log_interval: u64,
    health_port: u16,
}

// ============================================================================
// Public accessor functions
// ============================================================================

// Common
pub fn data_dir() -> &'static str {
    &DEFAULTS.common.data_dir
}
pub fn env_id() -> &'static str {
    &DEFAULTS.common.env_id
}
pub fn log_level() -> &'static str {
    &DEFAULTS.common.log_level
}

// Game
pub fn deck_size() -> usize {
    DEFAULTS.game.deck_size
}
pub fn hand_size() -> usize {
    DEFAULTS.game.hand_size
}
pub fn max_rounds() -> u32 {
    DEFAULTS.game.max_rounds
}

// MCTS
pub fn num_simulations() -> u32 {
    DEFAULTS.mcts.num_simulations
}
pub fn c_puct() -> f64 {
    DEFAULTS.mcts.c_puct
}
pub fn temperature() -> f64 {
    DEFAULTS.mcts.temperature
}
pub fn temp_threshold() -> u32 {
    DEFAULTS.mcts.temp_threshold
}
pub fn final_temperature() -> f64 {
    DEFAULTS.mcts.final_temperature
}
pub fn dirichlet_alpha() -> f64 {
    DEFAULTS.mcts.dirichlet_alpha
}
pub fn dirichlet_epsilon() -> f64 {
    DEFAULTS.mcts.dirichlet_epsilon
}
pub fn eval_batch_size() -> usize {
    DEFAULTS.mcts.eval_batch_size
}
pub fn virtual_loss() -> f64 {
    DEFAULTS.mcts.virtual_loss
}
pub fn max_consecutive_failures() -> u32 {
    DEFAULTS.mcts.max_consecutive_failures
}
pub fn search_timeout_ms() -> u64 {
    DEFAULTS.mcts.search_timeout_ms
}

// Evaluator
pub fn evaluator_backend() -> &'static str {
    &DEFAULTS.evaluator.backend
}
pub fn evaluator_url() -> &'static str {
    &DEFAULTS.evaluator.url
}
pub fn max_batch_size() -> usize {
    DEFAULTS.evaluator.max_batch_size
}
pub fn max_wait_ms() -> u64 {
    DEFAULTS.evaluator.max_wait_ms
}
pub fn max_retries() -> u32 {
    DEFAULTS.evaluator.max_retries
}
pub fn retry_backoff_ms() -> u64 {
    DEFAULTS.evaluator.retry_backoff_ms
}
pub fn request_timeout_ms() -> u64 {
    DEFAULTS.evaluator.request_timeout_ms
}

// Self-play
pub fn num_games() -> u64 {
    DEFAULTS.selfplay.num_games
}
pub fn workers() -> usize {
    DEFAULTS.selfplay.workers
}
pub fn seed() -> u64 {
    DEFAULTS.selfplay.seed
}
pub fn max_moves() -> u32 {
    DEFAULTS.selfplay.max_moves
}
pub fn example_store() -> &'static str {
    &DEFAULTS.selfplay.example_store
}
pub fn db_path() -> &'static str {
    &DEFAULTS.selfplay.db_path
}
pub fn log_interval() -> u64 {
    DEFAULTS.selfplay.log_interval
}
pub fn health_port() -> u16 {
    DEFAULTS.selfplay.health_port
}
