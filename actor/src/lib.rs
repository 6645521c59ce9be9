//! Actor - self-play example generation for rpszero
//!
//! Plays complete games of an engine-core [`Game`](engine_core::Game) against
//! itself with MCTS, records one training example per move and back-fills
//! each example with the final outcome once the game ends.
//!
//! - [`selfplay`]: the orchestrator, sequential or across blocking workers
//! - [`storage`]: where finished games go (SQLite or in-memory)
//! - [`stats`], [`metrics`], [`health`]: run statistics, Prometheus metrics
//!   and the optional probe server
//! - [`config`]: CLI flags layered over the central configuration

pub mod config;
pub mod health;
pub mod metrics;
pub mod selfplay;
pub mod stats;
pub mod storage;

pub use selfplay::{
    GameRecord, SelfPlayConfig, SelfPlayError, SelfPlayExample, SelfPlayOrchestrator,
};
pub use stats::{ActorStats, ActorStatsSnapshot};
pub use storage::{ExampleStore, MemoryExampleStore, SqliteExampleStore};
