//! HTTP client for a remote policy/value service.
//!
//! The service exposes `POST <base_url>/predict`:
//!
//! ```text
//! request:  {"features": [[f32, ...], ...]}
//! response: {"policies": [[f32, ...], ...], "values": [f32, ...]}
//! ```

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::batching::ModelBackend;
use crate::evaluator::{EvalResult, EvaluatorError};

#[derive(Serialize)]
struct PredictRequest<'a> {
    features: &'a [Vec<f32>],
}

#[derive(Deserialize)]
struct PredictResponse {
    policies: Vec<Vec<f32>>,
    values: Vec<f32>,
}

/// [`ModelBackend`] that posts batches to a model service.
#[derive(Debug, Clone)]
pub struct HttpModelBackend {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpModelBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, EvaluatorError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EvaluatorError::Connection(format!("failed to build HTTP client: {e}")))?;
        let endpoint = format!("{}/predict", base_url.trim_end_matches('/'));
        debug!(%endpoint, "Created HTTP model backend");
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn map_transport_error(e: reqwest::Error) -> EvaluatorError {
    if e.is_timeout() {
        EvaluatorError::Timeout(e.to_string())
    } else if e.is_connect() {
        EvaluatorError::Connection(e.to_string())
    } else if e.is_decode() {
        EvaluatorError::MalformedResponse(e.to_string())
    } else {
        EvaluatorError::EvaluationFailed(e.to_string())
    }
}

#[async_trait]
impl ModelBackend for HttpModelBackend {
    async fn predict_batch(
        &self,
        features: &[Vec<f32>],
    ) -> Result<Vec<EvalResult>, EvaluatorError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&PredictRequest { features })
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EvaluatorError::EvaluationFailed(format!(
                "model service returned {status}: {body}"
            )));
        }

        let body: PredictResponse = response.json().await.map_err(map_transport_error)?;
        if body.policies.len() != features.len() || body.values.len() != features.len() {
            return Err(EvaluatorError::MalformedResponse(format!(
                "{} policies and {} values for {} positions",
                body.policies.len(),
                body.values.len(),
                features.len()
            )));
        }

        Ok(body
            .policies
            .into_iter()
            .zip(body.values)
            .map(|(policy, value)| EvalResult { policy, value })
            .collect())
    }
}
