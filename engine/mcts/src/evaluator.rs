//! Evaluator trait for position evaluation.
//!
//! The evaluator provides policy (action probabilities) and value estimates
//! for encoded positions. Search code only sees [`Evaluator`]; whether the
//! numbers come from an in-process model or a remote service is hidden
//! behind it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use thiserror::Error;

/// Errors that can occur during evaluation.
///
/// `Clone` so a failed batch can hand the same error to every caller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluatorError {
    #[error("Evaluation failed: {0}")]
    EvaluationFailed(String),

    #[error("Connection to model service failed: {0}")]
    Connection(String),

    #[error("Evaluation timed out: {0}")]
    Timeout(String),

    #[error("Malformed model response: {0}")]
    MalformedResponse(String),

    #[error("Model error: {0}")]
    ModelError(String),

    #[error("Evaluator is shut down")]
    Closed,
}

impl EvaluatorError {
    /// Failures of the transport rather than of the request itself.
    /// These are retried by the batching layer.
    pub fn is_connection_level(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Timeout(_))
    }

    /// Failures that may succeed on a second attempt: transport errors
    /// plus model or service failures. Malformed responses and a closed
    /// evaluator are final.
    pub fn is_retryable(&self) -> bool {
        self.is_connection_level()
            || matches!(self, Self::EvaluationFailed(_) | Self::ModelError(_))
    }
}

/// Result of evaluating a position.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalResult {
    /// Policy indexed by `Game::action_index`.
    /// Mass on illegal actions is discarded during expansion.
    pub policy: Vec<f32>,

    /// Value estimate for the player to move.
    /// Range: -1.0 (certain loss) to +1.0 (certain win).
    pub value: f32,
}

/// Trait for position evaluators.
///
/// Implementations:
/// - [`LocalEvaluator`]: calls a [`PolicyValueModel`] in-process
/// - [`UniformEvaluator`]: uniform priors, zero value (testing and baselines)
/// - [`BatchingEvaluator`](crate::BatchingEvaluator): coalesces concurrent
///   callers into one remote request
pub trait Evaluator: Send + Sync {
    /// Evaluate a batch of encoded positions.
    ///
    /// Returns exactly one result per input, in input order.
    fn evaluate_batch(&self, features: &[Vec<f32>]) -> Result<Vec<EvalResult>, EvaluatorError>;

    /// Evaluate a single encoded position.
    fn evaluate(&self, features: &[f32]) -> Result<EvalResult, EvaluatorError> {
        let mut results = self.evaluate_batch(&[features.to_vec()])?;
        match (results.pop(), results.is_empty()) {
            (Some(result), true) => Ok(result),
            _ => Err(EvaluatorError::MalformedResponse(
                "expected exactly one result for a single position".into(),
            )),
        }
    }
}

impl<E: Evaluator + ?Sized> Evaluator for Arc<E> {
    fn evaluate_batch(&self, features: &[Vec<f32>]) -> Result<Vec<EvalResult>, EvaluatorError> {
        (**self).evaluate_batch(features)
    }

    fn evaluate(&self, features: &[f32]) -> Result<EvalResult, EvaluatorError> {
        (**self).evaluate(features)
    }
}

/// Policy/value model contract.
///
/// Training and weight persistence live outside this crate; only
/// prediction is required here.
pub trait PolicyValueModel: Send + Sync {
    fn predict(&self, features: &[f32]) -> Result<EvalResult, EvaluatorError>;

    /// Batched prediction. Default implementation calls `predict` in a loop.
    fn predict_batch(&self, batch: &[Vec<f32>]) -> Result<Vec<EvalResult>, EvaluatorError> {
        batch.iter().map(|features| self.predict(features)).collect()
    }
}

/// Synchronous evaluator that calls the model directly on the caller's thread.
#[derive(Debug)]
pub struct LocalEvaluator<M> {
    model: M,
    calls: AtomicU64,
    positions: AtomicU64,
}

impl<M: PolicyValueModel> LocalEvaluator<M> {
    pub fn new(model: M) -> Self {
        Self {
            model,
            calls: AtomicU64::new(0),
            positions: AtomicU64::new(0),
        }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Number of `evaluate_batch` calls that reached the model.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Number of positions evaluated.
    pub fn positions(&self) -> u64 {
        self.positions.load(Ordering::Relaxed)
    }
}

impl<M: PolicyValueModel> Evaluator for LocalEvaluator<M> {
    fn evaluate_batch(&self, features: &[Vec<f32>]) -> Result<Vec<EvalResult>, EvaluatorError> {
        if features.is_empty() {
            return Ok(Vec::new());
        }

        self.calls.fetch_add(1, Ordering::Relaxed);
        let results = self.model.predict_batch(features)?;
        if results.len() != features.len() {
            return Err(EvaluatorError::MalformedResponse(format!(
                "model returned {} results for {} positions",
                results.len(),
                features.len()
            )));
        }
        self.positions
            .fetch_add(features.len() as u64, Ordering::Relaxed);
        Ok(results)
    }
}

/// Model that assigns equal probability to every action and a neutral value.
#[derive(Debug, Clone)]
pub struct UniformModel {
    num_actions: usize,
}

impl UniformModel {
    pub fn new(num_actions: usize) -> Self {
        Self { num_actions }
    }
}

impl PolicyValueModel for UniformModel {
    fn predict(&self, _features: &[f32]) -> Result<EvalResult, EvaluatorError> {
        let p = if self.num_actions == 0 {
            0.0
        } else {
            1.0 / self.num_actions as f32
        };
        Ok(EvalResult {
            policy: vec![p; self.num_actions],
            value: 0.0,
        })
    }
}

/// Uniform evaluator: equal priors, value always 0.0.
/// Useful for testing MCTS without a model.
#[derive(Debug, Clone)]
pub struct UniformEvaluator {
    model: UniformModel,
}

impl UniformEvaluator {
    pub fn new(num_actions: usize) -> Self {
        Self {
            model: UniformModel::new(num_actions),
        }
    }
}

impl Evaluator for UniformEvaluator {
    fn evaluate_batch(&self, features: &[Vec<f32>]) -> Result<Vec<EvalResult>, EvaluatorError> {
        self.model.predict_batch(features)
    }
}
