//! Example stores for finished self-play games.
//!
//! # Usage
//!
//! ```rust,ignore
//! use actor::storage::{create_example_store, ExampleStore};
//!
//! let store = create_example_store("sqlite", "./data/examples.db")?;
//! store.store_metadata(&game.metadata()).await?;
//! let run_id = store.begin_run(seed).await?;
//! store.store_game(run_id, &record.examples).await?;
//! ```

mod memory;
mod sqlite;

pub use memory::MemoryExampleStore;
pub use sqlite::SqliteExampleStore;

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use engine_core::GameMetadata;

use crate::selfplay::SelfPlayExample;

/// Store kinds accepted by [`create_example_store`].
pub const STORE_KINDS: &[&str] = &["sqlite", "memory"];

/// Destination for finished games.
///
/// Game ids restart at 0 on every run, so examples are keyed by
/// `(run_id, game_id, move_number)`. Writing an existing key is an error;
/// stored games are never overwritten.
///
/// A game's examples are written together, so a reader never sees a game
/// with outcomes missing.
#[async_trait]
pub trait ExampleStore: Send + Sync {
    /// Register a new generation run and return its id.
    async fn begin_run(&self, seed: u64) -> Result<u64>;

    /// Store every example of one finished game atomically.
    async fn store_game(&self, run_id: u64, examples: &[SelfPlayExample]) -> Result<()>;

    /// Total number of stored examples.
    async fn count(&self) -> Result<usize>;

    /// Store or update game metadata (upsert)
    async fn store_metadata(&self, metadata: &GameMetadata) -> Result<()>;

    /// Delete all examples (preserves metadata)
    async fn clear(&self) -> Result<()>;
}

/// Open the store named by `kind`.
pub fn create_example_store(kind: &str, db_path: &str) -> Result<Arc<dyn ExampleStore>> {
    match kind {
        "sqlite" => Ok(Arc::new(SqliteExampleStore::new(db_path)?)),
        "memory" => Ok(Arc::new(MemoryExampleStore::new())),
        other => bail!(
            "unknown example store '{}', expected one of {:?}",
            other,
            STORE_KINDS
        ),
    }
}
