//! SQLite example store.
//!
//! The default backend for local runs and single-machine training. Feature
//! and policy vectors are stored as little-endian `f32` blobs. Each call to
//! `begin_run` allocates a row in `runs`, and examples are keyed by
//! `(run_id, game_id, move_number)`.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use engine_core::{GameMetadata, Player};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::ExampleStore;
use crate::selfplay::SelfPlayExample;

const INSERT_EXAMPLE: &str = "INSERT INTO examples
     (run_id, game_id, move_number, player, features, policy, search_value, outcome)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)";

/// SQLite-backed example store.
///
/// `rusqlite::Connection` is not `Sync`, so it sits behind a `Mutex`.
pub struct SqliteExampleStore {
    conn: Mutex<Connection>,
}

pub(crate) fn f32s_to_blob(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub(crate) fn blob_to_f32s(blob: &[u8]) -> Result<Vec<f32>> {
    if blob.len() % 4 != 0 {
        bail!("blob length {} is not a multiple of 4", blob.len());
    }
    Ok(blob
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

fn player_from_index(index: i64) -> Result<Player> {
    match index {
        0 => Ok(Player::One),
        1 => Ok(Player::Two),
        other => bail!("invalid player index {}", other),
    }
}

impl SqliteExampleStore {
    /// Open (or create) the database at `db_path`, creating parent directories.
    pub fn new(db_path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(db_path).parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }

        let conn = Connection::open(db_path).with_context(|| format!("opening {db_path}"))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS runs (
                run_id INTEGER PRIMARY KEY AUTOINCREMENT,
                seed INTEGER NOT NULL,
                started_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS examples (
                run_id INTEGER NOT NULL,
                game_id INTEGER NOT NULL,
                move_number INTEGER NOT NULL,
                player INTEGER NOT NULL,
                features BLOB NOT NULL,
                policy BLOB NOT NULL,
                search_value REAL NOT NULL,
                outcome REAL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (run_id, game_id, move_number)
            )",
            [],
        )?;

        let keyed_by_run = conn
            .prepare("SELECT 1 FROM pragma_table_info('examples') WHERE name = 'run_id'")?
            .exists([])?;
        if !keyed_by_run {
            bail!(
                "{db_path} has an examples table without a run_id column; \
                 move it aside or choose another db_path"
            );
        }

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_examples_created ON examples(created_at)",
            [],
        )?;

        // Makes the database self-describing for the trainer
        conn.execute(
            "CREATE TABLE IF NOT EXISTS game_metadata (
                env_id TEXT PRIMARY KEY,
                display_name TEXT NOT NULL,
                board_width INTEGER NOT NULL,
                board_height INTEGER NOT NULL,
                num_actions INTEGER NOT NULL,
                obs_size INTEGER NOT NULL,
                player_count INTEGER NOT NULL,
                description TEXT NOT NULL,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock poisoned: {}", e))
    }

    /// Every stored example, ordered by run, game, then move.
    pub fn load_all(&self) -> Result<Vec<SelfPlayExample>> {
        self.load(None)
    }

    /// Examples of one run, ordered by game then move.
    pub fn load_run(&self, run_id: u64) -> Result<Vec<SelfPlayExample>> {
        self.load(Some(run_id))
    }

    fn load(&self, run_id: Option<u64>) -> Result<Vec<SelfPlayExample>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT game_id, move_number, player, features, policy, search_value, outcome
             FROM examples
             WHERE ?1 IS NULL OR run_id = ?1
             ORDER BY run_id, game_id, move_number",
        )?;
        let rows = stmt.query_map(params![run_id.map(|id| id as i64)], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, u32>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, Vec<u8>>(3)?,
                row.get::<_, Vec<u8>>(4)?,
                row.get::<_, f32>(5)?,
                row.get::<_, Option<f32>>(6)?,
            ))
        })?;

        let mut examples = Vec::new();
        for row in rows {
            let (game_id, move_number, player, features, policy, search_value, outcome) = row?;
            examples.push(SelfPlayExample {
                game_id: game_id as u64,
                move_number,
                player: player_from_index(player)?,
                features: blob_to_f32s(&features)?,
                policy: blob_to_f32s(&policy)?,
                search_value,
                outcome,
            });
        }
        Ok(examples)
    }

    pub fn load_metadata(&self, env_id: &str) -> Result<Option<GameMetadata>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT env_id, display_name, board_width, board_height, num_actions,
                    obs_size, player_count, description
             FROM game_metadata WHERE env_id = ?1",
        )?;
        let mut rows = stmt.query(params![env_id])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };
        Ok(Some(GameMetadata {
            env_id: row.get(0)?,
            display_name: row.get(1)?,
            board_width: row.get::<_, i64>(2)? as usize,
            board_height: row.get::<_, i64>(3)? as usize,
            num_actions: row.get::<_, i64>(4)? as usize,
            obs_size: row.get::<_, i64>(5)? as usize,
            player_count: row.get::<_, i64>(6)? as usize,
            description: row.get(7)?,
        }))
    }
}

#[async_trait]
impl ExampleStore for SqliteExampleStore {
    async fn begin_run(&self, seed: u64) -> Result<u64> {
        let conn = self.lock()?;
        conn.execute("INSERT INTO runs (seed) VALUES (?1)", params![seed as i64])?;
        Ok(conn.last_insert_rowid() as u64)
    }

    async fn store_game(&self, run_id: u64, examples: &[SelfPlayExample]) -> Result<()> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;

        let mut stmt = tx.prepare_cached(INSERT_EXAMPLE)?;
        for example in examples {
            stmt.execute(params![
                run_id as i64,
                example.game_id as i64,
                example.move_number,
                example.player.index() as i64,
                f32s_to_blob(&example.features),
                f32s_to_blob(&example.policy),
                example.search_value,
                example.outcome,
            ])
            .with_context(|| {
                format!(
                    "inserting run {} game {} move {}",
                    run_id, example.game_id, example.move_number
                )
            })?;
        }

        // Drop stmt before commit to release borrow on tx
        drop(stmt);
        tx.commit()?;
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM examples", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    async fn store_metadata(&self, metadata: &GameMetadata) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO game_metadata
             (env_id, display_name, board_width, board_height, num_actions,
              obs_size, player_count, description, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, CURRENT_TIMESTAMP)",
            params![
                metadata.env_id,
                metadata.display_name,
                metadata.board_width as i64,
                metadata.board_height as i64,
                metadata.num_actions as i64,
                metadata.obs_size as i64,
                metadata.player_count as i64,
                metadata.description,
            ],
        )?;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM examples", [])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn example(game_id: u64, move_number: u32) -> SelfPlayExample {
        let player = if move_number % 2 == 0 {
            Player::One
        } else {
            Player::Two
        };
        SelfPlayExample {
            game_id,
            move_number,
            player,
            features: vec![0.0, 1.0, -2.5, 0.125],
            policy: vec![0.25, 0.75],
            search_value: 0.5,
            outcome: Some(if player == Player::One { 1.0 } else { -1.0 }),
        }
    }

    fn open(dir: &tempfile::TempDir) -> SqliteExampleStore {
        let db_path = dir.path().join("examples.db");
        SqliteExampleStore::new(db_path.to_str().unwrap()).unwrap()
    }

    #[test]
    fn test_blob_encoding() {
        let values = [1.5f32, -0.0, f32::MAX, 3.25e-8];
        let blob = f32s_to_blob(&values);
        assert_eq!(blob.len(), 16);
        assert_eq!(&blob[..4], &1.5f32.to_le_bytes());
        assert_eq!(blob_to_f32s(&blob).unwrap(), values);
        assert!(blob_to_f32s(&[0, 1, 2]).is_err());
    }

    #[test]
    fn test_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("nested").join("examples.db");
        SqliteExampleStore::new(db_path.to_str().unwrap()).unwrap();
        assert!(db_path.exists());
    }

    #[tokio::test]
    async fn test_store_game_and_load_all_in_order() {
        let dir = tempdir().unwrap();
        let store = open(&dir);
        let run = store.begin_run(0).await.unwrap();

        // Second game first to check ordering on read
        store
            .store_game(run, &[example(2, 0), example(2, 1)])
            .await
            .unwrap();
        store
            .store_game(run, &[example(1, 0), example(1, 1), example(1, 2)])
            .await
            .unwrap();

        assert_eq!(store.count().await.unwrap(), 5);
        let loaded = store.load_all().unwrap();
        let keys: Vec<_> = loaded.iter().map(|e| (e.game_id, e.move_number)).collect();
        assert_eq!(keys, vec![(1, 0), (1, 1), (1, 2), (2, 0), (2, 1)]);
        assert_eq!(loaded[1], example(1, 1));
    }

    #[tokio::test]
    async fn test_rewrite_same_key_is_rejected() {
        let dir = tempdir().unwrap();
        let store = open(&dir);
        let run = store.begin_run(0).await.unwrap();

        store.store_game(run, &[example(1, 0)]).await.unwrap();
        let mut updated = example(1, 0);
        updated.outcome = Some(0.0);
        let err = store
            .store_game(run, &[example(1, 1), updated])
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("run 1 game 1 move 0"));

        // The failed game leaves nothing behind
        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.load_all().unwrap(), vec![example(1, 0)]);
    }

    #[tokio::test]
    async fn test_runs_keep_same_game_ids_apart() {
        let dir = tempdir().unwrap();
        let store = open(&dir);

        let first = store.begin_run(9).await.unwrap();
        let second = store.begin_run(9).await.unwrap();
        assert!(second > first);

        store
            .store_game(first, &[example(0, 0), example(0, 1), example(0, 2)])
            .await
            .unwrap();
        // Shorter game under the same id in the next run
        store.store_game(second, &[example(0, 0)]).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 4);
        assert_eq!(store.load_run(first).unwrap().len(), 3);
        assert_eq!(store.load_run(second).unwrap(), vec![example(0, 0)]);
    }

    #[tokio::test]
    async fn test_run_ids_continue_after_reopen() {
        let dir = tempdir().unwrap();
        let first = open(&dir).begin_run(1).await.unwrap();
        let second = open(&dir).begin_run(1).await.unwrap();
        assert!(second > first);
    }

    #[test]
    fn test_rejects_examples_table_without_run_id() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("examples.db");
        Connection::open(&db_path)
            .unwrap()
            .execute(
                "CREATE TABLE examples (
                    game_id INTEGER NOT NULL,
                    move_number INTEGER NOT NULL,
                    PRIMARY KEY (game_id, move_number)
                )",
                [],
            )
            .unwrap();

        let err = SqliteExampleStore::new(db_path.to_str().unwrap())
            .err()
            .unwrap();
        assert!(err.to_string().contains("run_id"));
    }

    #[tokio::test]
    async fn test_missing_outcome_round_trips_as_null() {
        let dir = tempdir().unwrap();
        let store = open(&dir);

        let run = store.begin_run(0).await.unwrap();

        let mut pending = example(3, 0);
        pending.outcome = None;
        store.store_game(run, &[pending]).await.unwrap();

        assert_eq!(store.load_all().unwrap()[0].outcome, None);
    }

    #[tokio::test]
    async fn test_metadata_upsert() {
        let dir = tempdir().unwrap();
        let store = open(&dir);

        let mut metadata = GameMetadata::new("rps_card", "RPS Card")
            .with_actions(45)
            .with_observation(71);
        store.store_metadata(&metadata).await.unwrap();

        metadata.description = "updated".into();
        store.store_metadata(&metadata).await.unwrap();

        assert_eq!(store.load_metadata("rps_card").unwrap(), Some(metadata));
        assert_eq!(store.load_metadata("other").unwrap(), None);
    }

    #[tokio::test]
    async fn test_clear_keeps_metadata() {
        let dir = tempdir().unwrap();
        let store = open(&dir);

        store
            .store_metadata(&GameMetadata::new("rps_card", "RPS Card"))
            .await
            .unwrap();
        let run = store.begin_run(0).await.unwrap();
        store
            .store_game(run, &[example(1, 0), example(1, 1)])
            .await
            .unwrap();

        store.clear().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
        assert!(store.load_metadata("rps_card").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_reopen_sees_existing_rows() {
        let dir = tempdir().unwrap();
        let store = open(&dir);
        let run = store.begin_run(0).await.unwrap();
        store.store_game(run, &[example(1, 0)]).await.unwrap();
        drop(store);

        assert_eq!(open(&dir).count().await.unwrap(), 1);
    }
}
