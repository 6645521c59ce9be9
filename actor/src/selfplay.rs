//! Self-play game generation.
//!
//! [`SelfPlayOrchestrator`] plays whole games with MCTS on both sides,
//! records one [`SelfPlayExample`] per move and back-fills the outcome once
//! the winner is known.
//!
//! Every game draws its randomness from two ChaCha streams keyed by the run
//! seed and the game id: one for dealing, one for the search. The examples
//! for a given seed and evaluator are therefore identical whether the games
//! run sequentially or spread over any number of workers.

use std::io::IsTerminal;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use engine_core::{outcome_value, Game, GameError, Player};
use indicatif::{ProgressBar, ProgressStyle};
use mcts::{Evaluator, MctsConfig, MctsEngine, SearchError, SearchResult};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use crate::health::HealthState;
use crate::metrics;
use crate::stats::ActorStats;
use crate::storage::ExampleStore;

#[derive(Debug, Error)]
pub enum SelfPlayError {
    #[error("search failed in game {game_id} at move {move_number}: {source}")]
    Search {
        game_id: u64,
        move_number: u32,
        #[source]
        source: SearchError,
    },

    #[error(transparent)]
    Game(#[from] GameError),

    #[error("example store failed: {0}")]
    Store(String),

    #[error("self-play worker panicked: {0}")]
    WorkerPanicked(String),

    #[error("game {game_id} did not finish within {max_moves} moves")]
    StepLimit { game_id: u64, max_moves: u32 },

    #[error("invalid self-play configuration: {0}")]
    InvalidConfig(String),
}

/// One training example: the position before a move and the search's
/// answer to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelfPlayExample {
    pub game_id: u64,
    pub move_number: u32,
    /// Player to move when the example was recorded
    pub player: Player,
    pub features: Vec<f32>,
    /// Normalized root visit counts, indexed by action
    pub policy: Vec<f32>,
    /// Root value from `player`'s perspective
    pub search_value: f32,
    /// Final result from `player`'s perspective, `None` until the game ends
    pub outcome: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct SelfPlayConfig {
    /// Blocking workers used by the parallel path
    pub workers: usize,
    pub mcts: MctsConfig,
    /// Moves played at `mcts.temperature` before switching to
    /// `final_temperature`. 0 keeps the initial temperature all game.
    pub temp_threshold: u32,
    pub final_temperature: f32,
    /// Games still running after this many moves fail with `StepLimit`
    pub max_moves: u32,
    pub search_timeout: Option<Duration>,
    /// Log a progress line every this many games (0 disables)
    pub log_interval: u64,
}

impl Default for SelfPlayConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            mcts: MctsConfig::for_training(),
            temp_threshold: 0,
            final_temperature: 0.1,
            max_moves: 200,
            search_timeout: None,
            log_interval: 10,
        }
    }
}

impl SelfPlayConfig {
    pub fn validate(&self) -> Result<(), SelfPlayError> {
        if self.workers == 0 {
            return Err(SelfPlayError::InvalidConfig("workers must be at least 1".into()));
        }
        if self.max_moves == 0 {
            return Err(SelfPlayError::InvalidConfig("max_moves must be at least 1".into()));
        }
        if !self.final_temperature.is_finite() || self.final_temperature < 0.0 {
            return Err(SelfPlayError::InvalidConfig(format!(
                "final_temperature must be finite and non-negative, got {}",
                self.final_temperature
            )));
        }
        self.mcts
            .validate()
            .map_err(|e| SelfPlayError::InvalidConfig(e.to_string()))
    }

    /// Sampling temperature for the move at `move_number`.
    pub fn temperature_for_move(&self, move_number: u32) -> f32 {
        if self.temp_threshold > 0 && move_number >= self.temp_threshold {
            self.final_temperature
        } else {
            self.mcts.temperature
        }
    }
}

/// A finished game.
#[derive(Debug, Clone)]
pub struct GameRecord {
    pub game_id: u64,
    pub examples: Vec<SelfPlayExample>,
    pub winner: Option<Player>,
    pub moves: u32,
    pub duration: Duration,
}

/// Dealing and search RNGs for one game.
fn game_rngs(seed: u64, game_id: u64) -> (ChaCha20Rng, ChaCha20Rng) {
    let stream = game_id.wrapping_mul(2);
    let mut deal = ChaCha20Rng::seed_from_u64(seed);
    deal.set_stream(stream);
    let mut search = ChaCha20Rng::seed_from_u64(seed);
    search.set_stream(stream.wrapping_add(1));
    (deal, search)
}

fn progress_bar(total: u64) -> Option<ProgressBar> {
    if !std::io::stderr().is_terminal() {
        return None;
    }
    let pb = ProgressBar::new(total);
    let template = "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} games ({eta})";
    if let Ok(style) = ProgressStyle::with_template(template) {
        pb.set_style(style.progress_chars("#>-"));
    }
    Some(pb)
}

/// Drives self-play games against a shared evaluator.
///
/// Cloning is cheap; clones share the evaluator, sink, stats and shutdown
/// flag.
pub struct SelfPlayOrchestrator<G: Game, E: Evaluator + ?Sized> {
    game: Arc<G>,
    evaluator: Arc<E>,
    config: SelfPlayConfig,
    seed: u64,
    sink: Option<Arc<dyn ExampleStore>>,
    stats: Option<Arc<ActorStats>>,
    health: Option<HealthState>,
    shutdown: Arc<AtomicBool>,
}

impl<G: Game, E: Evaluator + ?Sized> Clone for SelfPlayOrchestrator<G, E> {
    fn clone(&self) -> Self {
        Self {
            game: Arc::clone(&self.game),
            evaluator: Arc::clone(&self.evaluator),
            config: self.config.clone(),
            seed: self.seed,
            sink: self.sink.clone(),
            stats: self.stats.clone(),
            health: self.health.clone(),
            shutdown: Arc::clone(&self.shutdown),
        }
    }
}

impl<G: Game, E: Evaluator + ?Sized + 'static> SelfPlayOrchestrator<G, E> {
    pub fn new(game: Arc<G>, evaluator: Arc<E>, config: SelfPlayConfig, seed: u64) -> Self {
        Self {
            game,
            evaluator,
            config,
            seed,
            sink: None,
            stats: None,
            health: None,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flush every finished game to `sink` as it completes.
    pub fn with_sink(mut self, sink: Arc<dyn ExampleStore>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_stats(mut self, stats: Arc<ActorStats>) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn with_health(mut self, health: HealthState) -> Self {
        self.health = Some(health);
        self
    }

    pub fn config(&self) -> &SelfPlayConfig {
        &self.config
    }

    /// Flag checked between games. Setting it lets running games finish and
    /// starts no new ones.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        info!("Self-play shutdown requested");
    }

    /// Engine for one worker. Its RNG is replaced at the start of every game.
    pub fn new_engine(&self) -> MctsEngine<G, E> {
        MctsEngine::new(
            Arc::clone(&self.game),
            Arc::clone(&self.evaluator),
            self.config.mcts.clone(),
            ChaCha20Rng::seed_from_u64(self.seed),
        )
    }

    /// Play one game to completion.
    ///
    /// `rng` deals the starting position; the search draws from the engine's
    /// own RNG.
    pub fn play_game(
        &self,
        game_id: u64,
        engine: &mut MctsEngine<G, E>,
        rng: &mut ChaCha20Rng,
    ) -> Result<GameRecord, SelfPlayError> {
        let started = Instant::now();
        let game = &*self.game;
        let mut state = game.new_game(rng);
        let mut examples: Vec<SelfPlayExample> = Vec::new();
        let mut move_number = 0u32;

        while !game.is_terminal(&state) {
            if move_number >= self.config.max_moves {
                return Err(SelfPlayError::StepLimit {
                    game_id,
                    max_moves: self.config.max_moves,
                });
            }

            engine.set_temperature(self.config.temperature_for_move(move_number));
            let searched = match self.config.search_timeout {
                Some(timeout) => engine.search_with_deadline(&state, Instant::now() + timeout),
                None => engine.search(&state),
            };
            let result = searched.map_err(|source| SelfPlayError::Search {
                game_id,
                move_number,
                source,
            })?;
            self.record_search(&result);
            trace!(
                game = game_id,
                move_number,
                mv = ?result.mv,
                value = result.value,
                simulations = result.simulations,
                "Move searched"
            );

            examples.push(SelfPlayExample {
                game_id,
                move_number,
                player: game.current_player(&state),
                features: game.encode(&state),
                policy: result.policy,
                search_value: result.value,
                outcome: None,
            });
            state = game.apply(&state, result.mv)?;
            move_number += 1;
        }

        let winner = game.winner(&state);
        for example in &mut examples {
            example.outcome = Some(outcome_value(winner, example.player));
        }

        let duration = started.elapsed();
        debug!(
            game = game_id,
            moves = move_number,
            ?winner,
            duration_ms = duration.as_millis() as u64,
            "Game finished"
        );
        Ok(GameRecord {
            game_id,
            examples,
            winner,
            moves: move_number,
            duration,
        })
    }

    fn record_search(&self, result: &SearchResult<G::Action>) {
        let s = &result.stats;
        metrics::record_search(
            s.total_time_us,
            s.inference_time_us,
            result.simulations,
            s.evaluation_failures,
        );
        if s.num_batches > 0 {
            metrics::EVAL_BATCH_SIZE.observe(s.total_evals as f64 / s.num_batches as f64);
        }
        if let Some(stats) = &self.stats {
            stats.record_search(result.simulations, s);
        }
    }

    /// Play games until `n` are claimed, the run aborts or shutdown is requested.
    fn worker_loop(
        &self,
        worker_id: usize,
        n: u64,
        next_game: &AtomicU64,
        abort: &AtomicBool,
        tx: &mpsc::Sender<Result<GameRecord, SelfPlayError>>,
    ) {
        let mut engine = self.new_engine();
        let mut played = 0u64;

        loop {
            if abort.load(Ordering::Relaxed) || self.shutdown.load(Ordering::Relaxed) {
                break;
            }
            let game_id = next_game.fetch_add(1, Ordering::Relaxed);
            if game_id >= n {
                break;
            }

            let (mut deal_rng, search_rng) = game_rngs(self.seed, game_id);
            *engine.rng_mut() = search_rng;
            let result = self.play_game(game_id, &mut engine, &mut deal_rng);
            let failed = result.is_err();
            played += 1;

            if tx.blocking_send(result).is_err() || failed {
                break;
            }
        }

        debug!(worker = worker_id, games = played, "Self-play worker finished");
    }

    /// Generate `n` games and return their examples ordered by game id.
    ///
    /// With `parallel`, games are spread over `config.workers` blocking
    /// workers, each owning its own engine. The first fatal error stops new
    /// games from starting and is returned; games already flushed to the
    /// sink stay there. After [`shutdown`](Self::shutdown) the games
    /// finished so far are returned.
    pub async fn generate_games(
        &self,
        n: u64,
        parallel: bool,
    ) -> Result<Vec<SelfPlayExample>, SelfPlayError> {
        self.config.validate()?;
        if n == 0 {
            return Ok(Vec::new());
        }

        let workers = if parallel {
            (self.config.workers as u64).clamp(1, n) as usize
        } else {
            1
        };
        let run_id = self.begin_run().await?;
        info!(games = n, workers, seed = self.seed, run_id, "Starting self-play");

        let run_started = Instant::now();
        let next_game = Arc::new(AtomicU64::new(0));
        let abort = Arc::new(AtomicBool::new(false));
        let (tx, mut rx) = mpsc::channel(workers * 2);

        let handles: Vec<_> = (0..workers)
            .map(|worker_id| {
                let this = self.clone();
                let next_game = Arc::clone(&next_game);
                let abort = Arc::clone(&abort);
                let tx = tx.clone();
                tokio::task::spawn_blocking(move || {
                    this.worker_loop(worker_id, n, &next_game, &abort, &tx)
                })
            })
            .collect();
        drop(tx);

        let progress = progress_bar(n);
        let mut records: Vec<GameRecord> = Vec::new();
        let mut first_error: Option<SelfPlayError> = None;

        while let Some(message) = rx.recv().await {
            let outcome = match message {
                Ok(record) => self.flush(run_id, &record).await.map(|()| record),
                Err(e) => Err(e),
            };
            match outcome {
                Ok(record) => {
                    let completed = records.len() as u64 + 1;
                    self.on_game_finished(&record, completed, run_started, progress.as_ref());
                    records.push(record);
                }
                Err(e) => {
                    abort.store(true, Ordering::Relaxed);
                    metrics::GAME_FAILURES.inc();
                    if let Some(stats) = &self.stats {
                        stats.record_failure();
                    }
                    error!(error = %e, "Self-play game failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        for handle in handles {
            if let Err(e) = handle.await {
                abort.store(true, Ordering::Relaxed);
                error!(error = %e, "Self-play worker panicked");
                first_error.get_or_insert(SelfPlayError::WorkerPanicked(e.to_string()));
            }
        }

        if let Some(pb) = progress {
            pb.finish_with_message("done");
        }

        if let Some(e) = first_error {
            if let Some(health) = &self.health {
                health.set_unhealthy();
            }
            return Err(e);
        }

        if (records.len() as u64) < n {
            warn!(completed = records.len(), requested = n, "Self-play stopped early");
        }
        info!(
            games = records.len(),
            elapsed_s = run_started.elapsed().as_secs_f64(),
            "Self-play finished"
        );

        records.sort_by_key(|r| r.game_id);
        Ok(records.into_iter().flat_map(|r| r.examples).collect())
    }

    /// Run id allocated by the sink, 0 without one.
    async fn begin_run(&self) -> Result<u64, SelfPlayError> {
        let Some(sink) = &self.sink else {
            return Ok(0);
        };
        sink.begin_run(self.seed)
            .await
            .map_err(|e| SelfPlayError::Store(format!("starting run: {e:#}")))
    }

    async fn flush(&self, run_id: u64, record: &GameRecord) -> Result<(), SelfPlayError> {
        let Some(sink) = &self.sink else {
            return Ok(());
        };
        let started = Instant::now();
        sink.store_game(run_id, &record.examples)
            .await
            .map_err(|e| SelfPlayError::Store(format!("game {}: {e:#}", record.game_id)))?;

        metrics::DB_WRITE_SECONDS.observe(started.elapsed().as_secs_f64());
        metrics::EXAMPLES_STORED.inc_by(record.examples.len() as u64);
        if let Some(stats) = &self.stats {
            stats.record_examples(record.examples.len());
        }
        Ok(())
    }

    fn on_game_finished(
        &self,
        record: &GameRecord,
        completed: u64,
        run_started: Instant,
        progress: Option<&ProgressBar>,
    ) {
        metrics::GAMES_TOTAL.inc();
        metrics::MOVES_TOTAL.inc_by(record.moves as u64);
        metrics::GAME_DURATION.observe(record.duration.as_secs_f64());
        metrics::GAME_MOVES.observe(record.moves as f64);
        metrics::record_outcome(record.winner);

        let elapsed = run_started.elapsed().as_secs_f64();
        let games_per_second = if elapsed > 0.0 {
            completed as f64 / elapsed
        } else {
            0.0
        };
        metrics::GAMES_PER_SECOND.set(games_per_second);

        if let Some(stats) = &self.stats {
            stats.record_game(record.moves, record.winner);
        }
        if let Some(health) = &self.health {
            health.record_game_complete();
        }
        if let Some(pb) = progress {
            pb.inc(1);
        }

        let interval = self.config.log_interval;
        if interval > 0 && completed % interval == 0 {
            let log = || {
                info!(
                    games = completed,
                    games_per_second = format!("{:.2}", games_per_second),
                    last_moves = record.moves,
                    "Self-play progress"
                )
            };
            match progress {
                Some(pb) => pb.suspend(log),
                None => log(),
            }
        }
    }
}
