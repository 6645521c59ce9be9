//! Prometheus metrics for the self-play actor.
//!
//! Covers game throughput, outcomes, per-search cost and example storage.
//! Everything lives in a private [`REGISTRY`] served by the health server.

use engine_core::Player;
use lazy_static::lazy_static;
use prometheus::{
    Encoder, Gauge, Histogram, HistogramOpts, IntCounter, IntGauge, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use std::sync::Once;

// Metric definitions are static; construction only fails on malformed names.
lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ========== Game Counters ==========

    /// Total number of self-play games completed
    pub static ref GAMES_TOTAL: IntCounter = IntCounter::with_opts(
        Opts::new("actor_games_total", "Total number of self-play games completed")
    ).expect("metric definition");

    pub static ref MOVES_TOTAL: IntCounter = IntCounter::with_opts(
        Opts::new("actor_moves_total", "Total moves played across all games")
    ).expect("metric definition");

    pub static ref PLAYER1_WINS: IntCounter = IntCounter::with_opts(
        Opts::new("actor_player1_wins_total", "Total games won by player 1")
    ).expect("metric definition");

    pub static ref PLAYER2_WINS: IntCounter = IntCounter::with_opts(
        Opts::new("actor_player2_wins_total", "Total games won by player 2")
    ).expect("metric definition");

    pub static ref DRAWS: IntCounter = IntCounter::with_opts(
        Opts::new("actor_draws_total", "Total games ending in a draw")
    ).expect("metric definition");

    /// Games aborted by a search, game or storage error
    pub static ref GAME_FAILURES: IntCounter = IntCounter::with_opts(
        Opts::new("actor_game_failures_total", "Games aborted by a fatal error")
    ).expect("metric definition");

    // ========== Throughput ==========

    pub static ref GAMES_PER_SECOND: Gauge = Gauge::with_opts(
        Opts::new("actor_games_per_second", "Current game generation throughput")
    ).expect("metric definition");

    pub static ref GAME_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new("actor_game_duration_seconds", "Time to complete one game")
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0])
    ).expect("metric definition");

    pub static ref GAME_MOVES: Histogram = Histogram::with_opts(
        HistogramOpts::new("actor_game_moves", "Number of moves per game")
            .buckets(vec![2.0, 4.0, 6.0, 8.0, 10.0, 15.0, 20.0, 50.0, 100.0])
    ).expect("metric definition");

    // ========== MCTS Metrics ==========

    pub static ref MCTS_SEARCHES_TOTAL: IntCounter = IntCounter::with_opts(
        Opts::new("actor_mcts_searches_total", "Total MCTS searches performed")
    ).expect("metric definition");

    /// Evaluator time per search (seconds)
    pub static ref MCTS_INFERENCE_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new("actor_mcts_inference_seconds", "Evaluator time per MCTS search")
            .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5])
    ).expect("metric definition");

    pub static ref MCTS_SEARCH_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new("actor_mcts_search_seconds", "Total MCTS time per search")
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0])
    ).expect("metric definition");

    pub static ref MCTS_SIMULATIONS_PER_SEARCH: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "actor_mcts_simulations_per_search",
            "Number of MCTS simulations per search"
        )
            .buckets(vec![0.0, 50.0, 100.0, 200.0, 400.0, 800.0, 1600.0])
    ).expect("metric definition");

    /// Simulations abandoned after an evaluator failure
    pub static ref MCTS_EVAL_FAILURES: IntCounter = IntCounter::with_opts(
        Opts::new(
            "actor_mcts_evaluation_failures_total",
            "Simulations abandoned after an evaluator failure"
        )
    ).expect("metric definition");

    /// Positions per evaluator call, as seen by the search
    pub static ref EVAL_BATCH_SIZE: Histogram = Histogram::with_opts(
        HistogramOpts::new("actor_eval_batch_size", "Positions per evaluator call")
            .buckets(vec![1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 64.0, 128.0])
    ).expect("metric definition");

    // ========== Storage Metrics ==========

    pub static ref EXAMPLES_STORED: IntCounter = IntCounter::with_opts(
        Opts::new("actor_examples_stored_total", "Total examples written to the example store")
    ).expect("metric definition");

    pub static ref DB_WRITE_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new("actor_db_write_seconds", "Example store write latency")
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0])
    ).expect("metric definition");

    // ========== Resource Metrics ==========

    pub static ref MEMORY_RSS_BYTES: IntGauge = IntGauge::with_opts(
        Opts::new("actor_memory_rss_bytes", "Resident set size in bytes")
    ).expect("metric definition");

    // ========== Info Metrics ==========

    /// Run metadata labelled with game and evaluator backend
    pub static ref ACTOR_INFO: IntGaugeVec = IntGaugeVec::new(
        Opts::new("actor_info", "Actor metadata"),
        &["game", "backend"]
    ).expect("metric definition");
}

static INIT: Once = Once::new();

/// Register every metric with [`REGISTRY`]. Safe to call repeatedly.
pub fn init_metrics() {
    INIT.call_once(|| {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(GAMES_TOTAL.clone()),
            Box::new(MOVES_TOTAL.clone()),
            Box::new(PLAYER1_WINS.clone()),
            Box::new(PLAYER2_WINS.clone()),
            Box::new(DRAWS.clone()),
            Box::new(GAME_FAILURES.clone()),
            Box::new(GAMES_PER_SECOND.clone()),
            Box::new(GAME_DURATION.clone()),
            Box::new(GAME_MOVES.clone()),
            Box::new(MCTS_SEARCHES_TOTAL.clone()),
            Box::new(MCTS_INFERENCE_SECONDS.clone()),
            Box::new(MCTS_SEARCH_SECONDS.clone()),
            Box::new(MCTS_SIMULATIONS_PER_SEARCH.clone()),
            Box::new(MCTS_EVAL_FAILURES.clone()),
            Box::new(EVAL_BATCH_SIZE.clone()),
            Box::new(EXAMPLES_STORED.clone()),
            Box::new(DB_WRITE_SECONDS.clone()),
            Box::new(MEMORY_RSS_BYTES.clone()),
            Box::new(ACTOR_INFO.clone()),
        ];
        for collector in collectors {
            if let Err(e) = REGISTRY.register(collector) {
                tracing::warn!(error = %e, "Failed to register metric");
            }
        }
    });
}

pub fn set_actor_info(game: &str, backend: &str) {
    ACTOR_INFO.with_label_values(&[game, backend]).set(1);
}

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// Update memory RSS gauge from /proc/self/status (Linux only)
pub fn update_memory_metrics() {
    #[cfg(target_os = "linux")]
    {
        if let Ok(contents) = std::fs::read_to_string("/proc/self/status") {
            let rss_kb = contents
                .lines()
                .find(|line| line.starts_with("VmRSS:"))
                .and_then(|line| line.split_whitespace().nth(1))
                .and_then(|kb| kb.parse::<i64>().ok());
            if let Some(kb) = rss_kb {
                MEMORY_RSS_BYTES.set(kb * 1024);
            }
        }
    }
}

/// Record a finished game's winner.
pub fn record_outcome(winner: Option<Player>) {
    match winner {
        Some(Player::One) => PLAYER1_WINS.inc(),
        Some(Player::Two) => PLAYER2_WINS.inc(),
        None => DRAWS.inc(),
    }
}

/// Record the cost of one search.
pub fn record_search(total_us: u64, inference_us: u64, simulations: u32, failures: u32) {
    MCTS_SEARCHES_TOTAL.inc();
    MCTS_SEARCH_SECONDS.observe(total_us as f64 / 1_000_000.0);
    MCTS_INFERENCE_SECONDS.observe(inference_us as f64 / 1_000_000.0);
    MCTS_SIMULATIONS_PER_SEARCH.observe(simulations as f64);
    MCTS_EVAL_FAILURES.inc_by(failures as u64);
}
