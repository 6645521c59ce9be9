//! In-process example store, used by tests and `--example-store memory`.

use anyhow::{bail, Result};
use async_trait::async_trait;
use engine_core::GameMetadata;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use super::ExampleStore;
use crate::selfplay::SelfPlayExample;

type ExampleKey = (u64, u64, u32);

#[derive(Debug, Default)]
struct Examples {
    rows: Vec<(u64, SelfPlayExample)>,
    keys: HashSet<ExampleKey>,
    last_run: u64,
}

#[derive(Debug, Default)]
pub struct MemoryExampleStore {
    examples: Mutex<Examples>,
    metadata: Mutex<Option<GameMetadata>>,
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|e| anyhow::anyhow!("Lock poisoned: {}", e))
}

impl MemoryExampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything stored so far, in arrival order.
    pub fn examples(&self) -> Result<Vec<SelfPlayExample>> {
        Ok(lock(&self.examples)?
            .rows
            .iter()
            .map(|(_, e)| e.clone())
            .collect())
    }

    /// Examples written under `run_id`, in arrival order.
    pub fn run_examples(&self, run_id: u64) -> Result<Vec<SelfPlayExample>> {
        Ok(lock(&self.examples)?
            .rows
            .iter()
            .filter(|(run, _)| *run == run_id)
            .map(|(_, e)| e.clone())
            .collect())
    }

    pub fn metadata(&self) -> Result<Option<GameMetadata>> {
        Ok(lock(&self.metadata)?.clone())
    }
}

#[async_trait]
impl ExampleStore for MemoryExampleStore {
    async fn begin_run(&self, _seed: u64) -> Result<u64> {
        let mut examples = lock(&self.examples)?;
        examples.last_run += 1;
        Ok(examples.last_run)
    }

    async fn store_game(&self, run_id: u64, examples: &[SelfPlayExample]) -> Result<()> {
        let mut stored = lock(&self.examples)?;
        let mut incoming = HashSet::with_capacity(examples.len());
        for example in examples {
            let key = (run_id, example.game_id, example.move_number);
            if stored.keys.contains(&key) || !incoming.insert(key) {
                bail!(
                    "example (run {}, game {}, move {}) already stored",
                    run_id,
                    example.game_id,
                    example.move_number
                );
            }
        }

        stored.keys.extend(incoming);
        stored
            .rows
            .extend(examples.iter().map(|e| (run_id, e.clone())));
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        Ok(lock(&self.examples)?.rows.len())
    }

    async fn store_metadata(&self, metadata: &GameMetadata) -> Result<()> {
        *lock(&self.metadata)? = Some(metadata.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut examples = lock(&self.examples)?;
        examples.rows.clear();
        examples.keys.clear();
        Ok(())
    }
}
