//! ONNX Runtime policy/value model.
//!
//! Loads a network exported by the trainer and runs it in-process. Wrap it
//! in a [`LocalEvaluator`](crate::LocalEvaluator) to search with it.
//!
//! # Model Format
//!
//! The ONNX model is expected to have:
//! - Input: "observation" - shape (batch_size, obs_size) float32
//! - Output: "policy_logits" - shape (batch_size, action_size) float32
//! - Output: "value" - shape (batch_size, 1) float32
//!
//! For the default RPS card game: obs_size=71, action_size=45

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use ort::{session::Session, value::Value};
use tracing::{debug, info};

use crate::evaluator::{EvalResult, EvaluatorError, PolicyValueModel};

/// ONNX Runtime model.
///
/// Uses a Mutex internally because `Session::run` requires `&mut self`,
/// but [`PolicyValueModel`] uses `&self` for thread-safe sharing.
pub struct OnnxModel {
    session: Mutex<Session>,
    obs_size: usize,
    /// Positions evaluated (for diagnostics)
    inference_count: AtomicU64,
    /// Total inference time in microseconds (for diagnostics)
    total_inference_time_us: AtomicU64,
}

impl std::fmt::Debug for OnnxModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxModel")
            .field("obs_size", &self.obs_size)
            .finish_non_exhaustive()
    }
}

fn model_error<E: std::fmt::Display>(context: &str) -> impl Fn(E) -> EvaluatorError + '_ {
    move |e| EvaluatorError::ModelError(format!("{context}: {e}"))
}

impl OnnxModel {
    /// Load an ONNX model from the given path.
    pub fn load<P: AsRef<Path>>(model_path: P, obs_size: usize) -> Result<Self, EvaluatorError> {
        let path = model_path.as_ref();
        let session = Session::builder()
            .map_err(model_error("Failed to create session builder"))?
            .with_intra_threads(4)
            .map_err(model_error("Failed to set intra threads"))?
            .commit_from_file(path)
            .map_err(model_error("Failed to load model"))?;

        info!(path = %path.display(), obs_size, "Loaded ONNX model");
        Ok(Self::from_session(session, obs_size))
    }

    /// Load an ONNX model from memory.
    pub fn load_from_memory(model_data: &[u8], obs_size: usize) -> Result<Self, EvaluatorError> {
        let session = Session::builder()
            .map_err(model_error("Failed to create session builder"))?
            .with_intra_threads(1)
            .map_err(model_error("Failed to set intra threads"))?
            .commit_from_memory(model_data)
            .map_err(model_error("Failed to load model from memory"))?;

        Ok(Self::from_session(session, obs_size))
    }

    fn from_session(session: Session, obs_size: usize) -> Self {
        Self {
            session: Mutex::new(session),
            obs_size,
            inference_count: AtomicU64::new(0),
            total_inference_time_us: AtomicU64::new(0),
        }
    }

    pub fn obs_size(&self) -> usize {
        self.obs_size
    }

    /// Numerically stable softmax. Legal-move masking happens at expansion.
    fn softmax(logits: &[f32]) -> Vec<f32> {
        let max_logit = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        if !max_logit.is_finite() {
            return vec![0.0; logits.len()];
        }

        let mut exp_values: Vec<f32> = logits.iter().map(|&l| (l - max_logit).exp()).collect();
        let exp_sum: f32 = exp_values.iter().sum();
        if exp_sum > 0.0 {
            for v in &mut exp_values {
                *v /= exp_sum;
            }
        }
        exp_values
    }

    fn record_timing(&self, started: Instant, batch_size: u64) {
        let elapsed_us = started.elapsed().as_micros() as u64;
        let total_us = self
            .total_inference_time_us
            .fetch_add(elapsed_us, Ordering::Relaxed)
            + elapsed_us;
        let before = self.inference_count.fetch_add(batch_size, Ordering::Relaxed);
        let count = before + batch_size;

        // Log roughly every 10,000 positions
        if before / 10_000 != count / 10_000 {
            debug!(
                positions = count,
                avg_ms = total_us as f64 / count as f64 / 1000.0,
                "ONNX inference stats"
            );
        }
    }
}

impl PolicyValueModel for OnnxModel {
    fn predict(&self, features: &[f32]) -> Result<EvalResult, EvaluatorError> {
        let mut results = self.predict_batch(&[features.to_vec()])?;
        results
            .pop()
            .ok_or_else(|| EvaluatorError::ModelError("model returned an empty batch".into()))
    }

    fn predict_batch(&self, batch: &[Vec<f32>]) -> Result<Vec<EvalResult>, EvaluatorError> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let batch_size = batch.len();
        let mut flat_obs = Vec::with_capacity(batch_size * self.obs_size);
        for features in batch {
            if features.len() != self.obs_size {
                return Err(EvaluatorError::EvaluationFailed(format!(
                    "Expected {} features, got {}",
                    self.obs_size,
                    features.len()
                )));
            }
            flat_obs.extend_from_slice(features);
        }

        // Create input tensor with shape (batch_size, obs_size)
        let input_array = ndarray::Array2::from_shape_vec((batch_size, self.obs_size), flat_obs)
            .map_err(|e| {
                EvaluatorError::EvaluationFailed(format!("Failed to create input array: {}", e))
            })?;
        let input_value =
            Value::from_array(input_array).map_err(model_error("Failed to create input tensor"))?;

        // Run inference - extract all data inside the lock scope
        let started = Instant::now();
        let (policy_flat, values, action_size) = {
            let mut session = self.session.lock().map_err(|e| {
                EvaluatorError::EvaluationFailed(format!("Failed to acquire session lock: {}", e))
            })?;
            let outputs = session
                .run(ort::inputs!["observation" => input_value])
                .map_err(|e| EvaluatorError::EvaluationFailed(format!("Inference failed: {}", e)))?;

            let policy_output = outputs.get("policy_logits").ok_or_else(|| {
                EvaluatorError::ModelError("Missing policy_logits output".to_string())
            })?;
            let (policy_shape, policy_data) = policy_output
                .try_extract_tensor::<f32>()
                .map_err(model_error("Failed to extract policy tensor"))?;
            let action_size = match policy_shape.get(1) {
                Some(&n) => n as usize,
                None => policy_data.len() / batch_size,
            };

            let value_output = outputs
                .get("value")
                .ok_or_else(|| EvaluatorError::ModelError("Missing value output".to_string()))?;
            let (_value_shape, value_data) = value_output
                .try_extract_tensor::<f32>()
                .map_err(model_error("Failed to extract value tensor"))?;

            (policy_data.to_vec(), value_data.to_vec(), action_size)
        };
        self.record_timing(started, batch_size as u64);

        if policy_flat.len() != batch_size * action_size || values.len() < batch_size {
            return Err(EvaluatorError::MalformedResponse(format!(
                "model produced {} logits and {} values for a batch of {}",
                policy_flat.len(),
                values.len(),
                batch_size
            )));
        }

        Ok(policy_flat
            .chunks_exact(action_size.max(1))
            .zip(values)
            .map(|(logits, value)| EvalResult {
                policy: Self::softmax(logits),
                value,
            })
            .collect())
    }
}
