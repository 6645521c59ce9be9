//! Centralized configuration loading from config.toml.
//!
//! This crate provides configuration structs and loading logic shared
//! across the search engine and the self-play actor.
//!
//! # Configuration Priority
//!
//! Settings are loaded with the following priority (highest to lowest):
//! 1. Environment variables (`RPSZERO_<SECTION>_<KEY>`)
//! 2. config.toml file
//! 3. Built-in defaults (`config.defaults.toml`, embedded at compile time)
//!
//! Command-line flags of the actor binary sit above all three.
//!
//! # Environment Variable Override Pattern
//!
//! ```text
//! RPSZERO_<SECTION>_<KEY>=value
//!
//! Examples:
//!     RPSZERO_COMMON_DATA_DIR=/data
//!     RPSZERO_MCTS_NUM_SIMULATIONS=200
//!     RPSZERO_EVALUATOR_BACKEND=remote
//!     RPSZERO_SELFPLAY_WORKERS=8
//! ```

mod defaults;
mod loader;
mod structs;

pub use defaults::*;
pub use loader::{apply_env_overrides, load_config, load_from_path, CONFIG_SEARCH_PATHS};
pub use structs::*;
