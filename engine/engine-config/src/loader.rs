//! Configuration loading logic.
//!
//! Handles loading config from files and applying environment variable overrides.

use crate::CentralConfig;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Standard locations to search for config.toml
pub const CONFIG_SEARCH_PATHS: &[&str] = &[
    "config.toml",      // Current directory
    "../config.toml",   // Parent directory (when running from subdirectory)
    "/app/config.toml", // Docker container
];

/// Load the central configuration from config.toml.
///
/// Searches for config.toml in the following order:
/// 1. Path specified by RPSZERO_CONFIG environment variable
/// 2. Current directory (config.toml)
/// 3. Parent directory (../config.toml)
/// 4. Docker container path (/app/config.toml)
///
/// After loading, environment variable overrides are applied.
pub fn load_config() -> CentralConfig {
    if let Ok(path) = std::env::var("RPSZERO_CONFIG") {
        let path = PathBuf::from(&path);
        if path.exists() {
            info!("Loading config from RPSZERO_CONFIG: {}", path.display());
            return load_from_path(&path);
        }
        warn!(
            "RPSZERO_CONFIG={} not found, searching defaults",
            path.display()
        );
    }

    for path_str in CONFIG_SEARCH_PATHS {
        let path = Path::new(path_str);
        if path.exists() {
            info!("Loading config from {}", path.display());
            return load_from_path(path);
        }
    }

    debug!("No config.toml found, using built-in defaults");
    apply_env_overrides(CentralConfig::default())
}

/// Load configuration from a specific path.
///
/// An unreadable or malformed file falls back to the built-in defaults
/// with a warning; env overrides are applied either way.
pub fn load_from_path(path: &Path) -> CentralConfig {
    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => apply_env_overrides(config),
            Err(e) => {
                warn!("Failed to parse {}: {}, using defaults", path.display(), e);
                apply_env_overrides(CentralConfig::default())
            }
        },
        Err(e) => {
            warn!("Failed to read {}: {}, using defaults", path.display(), e);
            apply_env_overrides(CentralConfig::default())
        }
    }
}

/// Macro to reduce env override boilerplate
macro_rules! env_override {
    // String field
    ($config:expr, $section:ident . $field:ident, $key:expr) => {
        if let Ok(v) = std::env::var($key) {
            $config.$section.$field = v;
        }
    };
    // Parseable field (u32, u64, f64, etc.)
    ($config:expr, $section:ident . $field:ident, $key:expr, parse) => {
        match std::env::var($key).map(|s| s.parse()) {
            Ok(Ok(v)) => $config.$section.$field = v,
            Ok(Err(_)) => warn!("Ignoring unparsable value for {}", $key),
            Err(_) => {}
        }
    };
}

/// Apply environment variable overrides to a configuration.
///
/// Environment variables follow the pattern: RPSZERO_<SECTION>_<KEY>
pub fn apply_env_overrides(mut config: CentralConfig) -> CentralConfig {
    // Common
    env_override!(config, common.env_id, "RPSZERO_COMMON_ENV_ID");
    env_override!(config, common.data_dir, "RPSZERO_COMMON_DATA_DIR");
    env_override!(config, common.log_level, "RPSZERO_COMMON_LOG_LEVEL");

    // Game
    env_override!(config, game.deck_size, "RPSZERO_GAME_DECK_SIZE", parse);
    env_override!(config, game.hand_size, "RPSZERO_GAME_HAND_SIZE", parse);
    env_override!(config, game.max_rounds, "RPSZERO_GAME_MAX_ROUNDS", parse);

    // MCTS
    env_override!(
        config,
        mcts.num_simulations,
        "RPSZERO_MCTS_NUM_SIMULATIONS",
        parse
    );
    env_override!(config, mcts.c_puct, "RPSZERO_MCTS_C_PUCT", parse);
    env_override!(
        config,
        mcts.temperature,
        "RPSZERO_MCTS_TEMPERATURE",
        parse
    );
    env_override!(
        config,
        mcts.temp_threshold,
        "RPSZERO_MCTS_TEMP_THRESHOLD",
        parse
    );
    env_override!(
        config,
        mcts.final_temperature,
        "RPSZERO_MCTS_FINAL_TEMPERATURE",
        parse
    );
    env_override!(
        config,
        mcts.dirichlet_alpha,
        "RPSZERO_MCTS_DIRICHLET_ALPHA",
        parse
    );
    env_override!(
        config,
        mcts.dirichlet_epsilon,
        "RPSZERO_MCTS_DIRICHLET_EPSILON",
        parse
    );
    env_override!(
        config,
        mcts.eval_batch_size,
        "RPSZERO_MCTS_EVAL_BATCH_SIZE",
        parse
    );
    env_override!(
        config,
        mcts.virtual_loss,
        "RPSZERO_MCTS_VIRTUAL_LOSS",
        parse
    );
    env_override!(
        config,
        mcts.max_consecutive_failures,
        "RPSZERO_MCTS_MAX_CONSECUTIVE_FAILURES",
        parse
    );
    env_override!(
        config,
        mcts.search_timeout_ms,
        "RPSZERO_MCTS_SEARCH_TIMEOUT_MS",
        parse
    );

    // Evaluator
    env_override!(config, evaluator.backend, "RPSZERO_EVALUATOR_BACKEND");
    env_override!(config, evaluator.url, "RPSZERO_EVALUATOR_URL");
    env_override!(
        config,
        evaluator.max_batch_size,
        "RPSZERO_EVALUATOR_MAX_BATCH_SIZE",
        parse
    );
    env_override!(
        config,
        evaluator.max_wait_ms,
        "RPSZERO_EVALUATOR_MAX_WAIT_MS",
        parse
    );
    env_override!(
        config,
        evaluator.max_retries,
        "RPSZERO_EVALUATOR_MAX_RETRIES",
        parse
    );
    env_override!(
        config,
        evaluator.retry_backoff_ms,
        "RPSZERO_EVALUATOR_RETRY_BACKOFF_MS",
        parse
    );
    env_override!(
        config,
        evaluator.request_timeout_ms,
        "RPSZERO_EVALUATOR_REQUEST_TIMEOUT_MS",
        parse
    );

    // Self-play
    env_override!(
        config,
        selfplay.num_games,
        "RPSZERO_SELFPLAY_NUM_GAMES",
        parse
    );
    env_override!(config, selfplay.workers, "RPSZERO_SELFPLAY_WORKERS", parse);
    env_override!(config, selfplay.seed, "RPSZERO_SELFPLAY_SEED", parse);
    env_override!(
        config,
        selfplay.max_moves,
        "RPSZERO_SELFPLAY_MAX_MOVES",
        parse
    );
    env_override!(
        config,
        selfplay.example_store,
        "RPSZERO_SELFPLAY_EXAMPLE_STORE"
    );
    env_override!(config, selfplay.db_path, "RPSZERO_SELFPLAY_DB_PATH");
    env_override!(
        config,
        selfplay.log_interval,
        "RPSZERO_SELFPLAY_LOG_INTERVAL",
        parse
    );
    env_override!(
        config,
        selfplay.health_port,
        "RPSZERO_SELFPLAY_HEALTH_PORT",
        parse
    );

    config
}
