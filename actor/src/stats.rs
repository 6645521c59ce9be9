//! Self-play run statistics and persistence.
//!
//! Counters are updated lock-free from every worker and written as a JSON
//! snapshot to `<data_dir>/actor_stats.json`.

use engine_core::Player;
use mcts::SearchStats;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, warn};

/// Aggregated self-play statistics, designed for lock-free updates.
#[derive(Debug)]
pub struct ActorStats {
    games_completed: AtomicU64,
    games_failed: AtomicU64,
    total_moves: AtomicU64,
    player1_wins: AtomicU64,
    player2_wins: AtomicU64,
    draws: AtomicU64,
    examples_written: AtomicU64,
    mcts_searches: AtomicU64,
    mcts_simulations: AtomicU64,
    /// Evaluator time summed over all searches (microseconds)
    mcts_inference_us: AtomicU64,
    /// Simulations abandoned after evaluator failures
    mcts_eval_failures: AtomicU64,
    start_time: Instant,
    stats_path: PathBuf,
    env_id: String,
}

/// Serializable stats for JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorStatsSnapshot {
    pub env_id: String,
    pub games_completed: u64,
    pub games_failed: u64,
    pub total_moves: u64,
    pub player1_wins: u64,
    pub player2_wins: u64,
    pub draws: u64,
    pub examples_written: u64,
    pub avg_game_length: f64,
    pub games_per_second: f64,
    pub runtime_seconds: f64,
    pub mcts_searches: u64,
    pub mcts_avg_simulations: f64,
    pub mcts_avg_inference_us: f64,
    pub mcts_eval_failures: u64,
    pub timestamp: u64,
}

fn ratio(num: u64, den: u64) -> f64 {
    if den > 0 {
        num as f64 / den as f64
    } else {
        0.0
    }
}

impl ActorStats {
    /// Create a tracker writing to `<data_dir>/actor_stats.json`.
    pub fn new(data_dir: impl AsRef<Path>, env_id: &str) -> Self {
        let data_dir = data_dir.as_ref();
        if let Err(e) = fs::create_dir_all(data_dir) {
            warn!(dir = %data_dir.display(), error = %e, "Failed to create data directory");
        }

        Self {
            games_completed: AtomicU64::new(0),
            games_failed: AtomicU64::new(0),
            total_moves: AtomicU64::new(0),
            player1_wins: AtomicU64::new(0),
            player2_wins: AtomicU64::new(0),
            draws: AtomicU64::new(0),
            examples_written: AtomicU64::new(0),
            mcts_searches: AtomicU64::new(0),
            mcts_simulations: AtomicU64::new(0),
            mcts_inference_us: AtomicU64::new(0),
            mcts_eval_failures: AtomicU64::new(0),
            start_time: Instant::now(),
            stats_path: data_dir.join("actor_stats.json"),
            env_id: env_id.to_string(),
        }
    }

    /// Record a completed game.
    pub fn record_game(&self, moves: u32, winner: Option<Player>) {
        self.games_completed.fetch_add(1, Ordering::Relaxed);
        self.total_moves.fetch_add(moves as u64, Ordering::Relaxed);
        let bucket = match winner {
            Some(Player::One) => &self.player1_wins,
            Some(Player::Two) => &self.player2_wins,
            None => &self.draws,
        };
        bucket.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.games_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_examples(&self, count: usize) {
        self.examples_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Record one search's cost.
    pub fn record_search(&self, simulations: u32, stats: &SearchStats) {
        self.mcts_searches.fetch_add(1, Ordering::Relaxed);
        self.mcts_simulations
            .fetch_add(simulations as u64, Ordering::Relaxed);
        self.mcts_inference_us
            .fetch_add(stats.inference_time_us, Ordering::Relaxed);
        self.mcts_eval_failures
            .fetch_add(stats.evaluation_failures as u64, Ordering::Relaxed);
    }

    pub fn games_completed(&self) -> u64 {
        self.games_completed.load(Ordering::Relaxed)
    }

    /// Get a snapshot of current stats.
    pub fn snapshot(&self) -> ActorStatsSnapshot {
        let games = self.games_completed.load(Ordering::Relaxed);
        let moves = self.total_moves.load(Ordering::Relaxed);
        let searches = self.mcts_searches.load(Ordering::Relaxed);
        let runtime = self.start_time.elapsed().as_secs_f64();

        ActorStatsSnapshot {
            env_id: self.env_id.clone(),
            games_completed: games,
            games_failed: self.games_failed.load(Ordering::Relaxed),
            total_moves: moves,
            player1_wins: self.player1_wins.load(Ordering::Relaxed),
            player2_wins: self.player2_wins.load(Ordering::Relaxed),
            draws: self.draws.load(Ordering::Relaxed),
            examples_written: self.examples_written.load(Ordering::Relaxed),
            avg_game_length: ratio(moves, games),
            games_per_second: if runtime > 0.0 {
                games as f64 / runtime
            } else {
                0.0
            },
            runtime_seconds: runtime,
            mcts_searches: searches,
            mcts_avg_simulations: ratio(self.mcts_simulations.load(Ordering::Relaxed), searches),
            mcts_avg_inference_us: ratio(self.mcts_inference_us.load(Ordering::Relaxed), searches),
            mcts_eval_failures: self.mcts_eval_failures.load(Ordering::Relaxed),
            timestamp: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        }
    }

    /// Write stats to JSON file (atomic write-then-rename).
    pub fn write_stats(&self) {
        let snapshot = self.snapshot();

        let json = match serde_json::to_string_pretty(&snapshot) {
            Ok(j) => j,
            Err(e) => {
                warn!("Failed to serialize actor stats: {}", e);
                return;
            }
        };

        let temp_path = self.stats_path.with_extension("json.tmp");
        let written =
            fs::File::create(&temp_path).and_then(|mut file| file.write_all(json.as_bytes()));
        if let Err(e) = written {
            warn!("Failed to write actor stats: {}", e);
            let _ = fs::remove_file(&temp_path);
            return;
        }

        if let Err(e) = fs::rename(&temp_path, &self.stats_path) {
            warn!("Failed to rename stats file: {}", e);
            let _ = fs::remove_file(&temp_path);
            return;
        }

        debug!(path = %self.stats_path.display(), "Wrote actor stats");
    }

    pub fn stats_path(&self) -> &Path {
        &self.stats_path
    }
}
