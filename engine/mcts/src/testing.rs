//! Small games and scripted evaluators shared by the unit tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use engine_core::{Game, GameError, GameMetadata, Player};
use rand_chacha::ChaCha20Rng;

use crate::evaluator::{EvalResult, Evaluator, EvaluatorError};

/// Take one or two stones; whoever takes the last stone wins.
#[derive(Debug, Clone)]
pub struct Countdown {
    pub start: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CountdownState {
    pub remaining: u8,
    pub to_move: Player,
}

impl CountdownState {
    pub fn new(remaining: u8, to_move: Player) -> Self {
        Self { remaining, to_move }
    }
}

impl Game for Countdown {
    type State = CountdownState;
    type Action = u8;

    fn metadata(&self) -> GameMetadata {
        GameMetadata::new("countdown", "Countdown")
            .with_actions(2)
            .with_observation(2)
    }

    fn new_game(&self, _rng: &mut ChaCha20Rng) -> CountdownState {
        CountdownState::new(self.start, Player::One)
    }

    fn legal_moves(&self, state: &CountdownState) -> Vec<u8> {
        (1..=2).filter(|&take| take <= state.remaining).collect()
    }

    fn apply(&self, state: &CountdownState, take: u8) -> Result<CountdownState, GameError> {
        if self.is_terminal(state) {
            return Err(GameError::GameOver);
        }
        if !(1..=2).contains(&take) || take > state.remaining {
            return Err(GameError::IllegalMove(format!("take {take}")));
        }
        Ok(CountdownState::new(
            state.remaining - take,
            state.to_move.opponent(),
        ))
    }

    fn is_terminal(&self, state: &CountdownState) -> bool {
        state.remaining == 0
    }

    fn winner(&self, state: &CountdownState) -> Option<Player> {
        self.is_terminal(state).then(|| state.to_move.opponent())
    }

    fn current_player(&self, state: &CountdownState) -> Player {
        state.to_move
    }

    fn encode(&self, state: &CountdownState) -> Vec<f32> {
        let flag = if state.to_move == Player::One { 1.0 } else { 0.0 };
        vec![state.remaining as f32, flag]
    }

    fn action_index(&self, take: &u8) -> usize {
        (*take - 1) as usize
    }
}

/// Evaluator driven by a closure over the encoded features.
pub struct FnEvaluator<F> {
    f: F,
    pub calls: AtomicU32,
    pub batch_sizes: Mutex<Vec<usize>>,
}

impl<F> FnEvaluator<F>
where
    F: Fn(&[f32]) -> Result<EvalResult, EvaluatorError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            calls: AtomicU32::new(0),
            batch_sizes: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl<F> Evaluator for FnEvaluator<F>
where
    F: Fn(&[f32]) -> Result<EvalResult, EvaluatorError> + Send + Sync,
{
    fn evaluate_batch(&self, features: &[Vec<f32>]) -> Result<Vec<EvalResult>, EvaluatorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.batch_sizes.lock().unwrap().push(features.len());
        features.iter().map(|f| (self.f)(f)).collect()
    }
}

/// Fixed policy and value for every position.
pub fn constant(
    policy: Vec<f32>,
    value: f32,
) -> FnEvaluator<impl Fn(&[f32]) -> Result<EvalResult, EvaluatorError> + Send + Sync> {
    FnEvaluator::new(move |_| {
        Ok(EvalResult {
            policy: policy.clone(),
            value,
        })
    })
}

/// Always fails with a connection error.
pub fn failing() -> FnEvaluator<impl Fn(&[f32]) -> Result<EvalResult, EvaluatorError> + Send + Sync>
{
    FnEvaluator::new(|_| Err(EvaluatorError::Connection("refused".into())))
}

/// Fails the first `failures` positions, then returns uniform priors.
pub fn flaky(
    failures: u32,
    num_actions: usize,
) -> FnEvaluator<impl Fn(&[f32]) -> Result<EvalResult, EvaluatorError> + Send + Sync> {
    let seen = AtomicU32::new(0);
    FnEvaluator::new(move |_| {
        if seen.fetch_add(1, Ordering::SeqCst) < failures {
            Err(EvaluatorError::Timeout("scripted".into()))
        } else {
            Ok(EvalResult {
                policy: vec![1.0 / num_actions as f32; num_actions],
                value: 0.0,
            })
        }
    })
}
