//! Actor - self-play example generator for rpszero
//!
//! A batch process that:
//! 1. Builds the RPS card game and a policy/value evaluator
//! 2. Plays `num_games` MCTS self-play games, optionally across workers
//! 3. Writes one example per move to the example store (SQLite by default)
//! 4. Exposes health and Prometheus endpoints while running (optional)

use anyhow::{Context, Result};
use clap::Parser;
use engine_core::Game;
use games_rps_card::RpsCard;
use mcts::{BatchingEvaluator, Evaluator, HttpModelBackend, LocalEvaluator, UniformModel};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

use actor::config::Config;
use actor::health::{start_health_server, HealthState};
use actor::metrics;
use actor::selfplay::SelfPlayOrchestrator;
use actor::stats::ActorStats;
use actor::storage::create_example_store;

fn init_tracing(level: &str) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    Ok(())
}

/// Evaluator for the configured backend, plus the batcher handle when remote.
fn build_evaluator(
    config: &Config,
    game: &RpsCard,
) -> Result<(Arc<dyn Evaluator>, Option<BatchingEvaluator>)> {
    match config.backend.as_str() {
        "uniform" => {
            let evaluator = LocalEvaluator::new(UniformModel::new(game.num_actions()));
            Ok((Arc::new(evaluator), None))
        }
        "remote" => {
            let batch = config.batch_config();
            let backend = HttpModelBackend::new(&config.evaluator_url, batch.request_timeout)
                .context("creating model service client")?;
            info!(endpoint = backend.endpoint(), "Using remote evaluator");
            let batcher =
                BatchingEvaluator::spawn(backend, batch, &tokio::runtime::Handle::current());
            Ok((Arc::new(batcher.clone()), Some(batcher)))
        }
        #[cfg(feature = "onnx")]
        "onnx" => {
            let path = config
                .model_path
                .as_deref()
                .context("model_path is required for the onnx backend")?;
            let model = mcts::OnnxModel::load(path, game.obs_size())
                .with_context(|| format!("loading ONNX model {path}"))?;
            Ok((Arc::new(LocalEvaluator::new(model)), None))
        }
        other => anyhow::bail!("unknown backend '{}'", other),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    eprintln!("Actor starting...");

    let config = Config::parse();
    config.validate()?;

    init_tracing(&config.log_level)?;
    info!(log_level = %config.log_level, "Tracing initialized");

    let game = Arc::new(RpsCard::new(config.game_config())?);
    let metadata = game.metadata();
    info!(
        env_id = %metadata.env_id,
        num_actions = metadata.num_actions,
        obs_size = metadata.obs_size,
        "Game ready"
    );

    metrics::init_metrics();
    metrics::set_actor_info(&metadata.env_id, &config.backend);

    let (evaluator, batcher) = build_evaluator(&config, &game)?;

    let store = create_example_store(&config.example_store, &config.db_path)
        .with_context(|| format!("opening {} example store", config.example_store))?;
    store
        .store_metadata(&metadata)
        .await
        .context("storing game metadata")?;

    let stats = Arc::new(ActorStats::new(&config.data_dir, &config.env_id));
    let health = HealthState::new();
    if config.health_port != 0 {
        start_health_server(config.health_port, health.clone())
            .await
            .context("starting health server")?;
    }

    let orchestrator =
        SelfPlayOrchestrator::new(game, evaluator, config.selfplay_config(), config.seed)
            .with_sink(Arc::clone(&store))
            .with_stats(Arc::clone(&stats))
            .with_health(health.clone());
    health.set_ready();

    // Setup graceful shutdown
    let shutdown = orchestrator.shutdown_flag();
    let shutdown_handle = tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received, finishing running games...");
                shutdown.store(true, Ordering::Relaxed);
            }
            Err(e) => warn!(error = %e, "Failed to listen for ctrl+c"),
        }
    });

    let result = orchestrator
        .generate_games(config.num_games, config.parallel())
        .await;
    shutdown_handle.abort();

    stats.write_stats();
    if let Some(batcher) = &batcher {
        let snapshot = batcher.stats().snapshot();
        info!(
            batches = snapshot.batches,
            positions = snapshot.positions,
            mean_batch_size = format!("{:.1}", snapshot.mean_batch_size),
            max_batch = snapshot.max_batch_seen,
            retries = snapshot.retries,
            failures = snapshot.failures,
            "Batching evaluator stats"
        );
    }

    match result {
        Ok(examples) => {
            let summary = stats.snapshot();
            info!(
                games = summary.games_completed,
                examples = examples.len(),
                stored = store.count().await?,
                player1_wins = summary.player1_wins,
                player2_wins = summary.player2_wins,
                draws = summary.draws,
                avg_game_length = format!("{:.1}", summary.avg_game_length),
                "Actor completed successfully"
            );
            Ok(())
        }
        Err(e) => {
            error!("Actor failed: {}", e);
            Err(e.into())
        }
    }
}
