//! Request coalescing in front of a model service.
//!
//! Many searches running on separate threads each need one position
//! evaluated at a time. [`BatchingEvaluator`] queues those requests on a
//! channel; a background task on the tokio runtime drains the queue into
//! batches of up to `max_batch_size` positions, waiting at most `max_wait`
//! after the first request, and sends each batch to a [`ModelBackend`] in a
//! single call. Results are routed back to the caller that submitted each
//! position.
//!
//! The sync [`Evaluator`] impl blocks the calling thread, so it must be
//! used from plain threads or `spawn_blocking`, never from inside an async
//! task. Async callers use [`BatchingEvaluator::evaluate_async`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, trace, warn};

use crate::evaluator::{EvalResult, Evaluator, EvaluatorError};

/// A model reachable asynchronously, typically over the network.
#[async_trait]
pub trait ModelBackend: Send + Sync + 'static {
    /// Evaluate a batch; must return one result per input, in order.
    async fn predict_batch(&self, features: &[Vec<f32>]) -> Result<Vec<EvalResult>, EvaluatorError>;
}

/// Batching and retry parameters.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Maximum positions sent in one backend call
    pub max_batch_size: usize,
    /// How long the first queued request may wait for company
    pub max_wait: Duration,
    /// Retries after a connection-level failure
    pub max_retries: u32,
    /// Backoff before the first retry; doubles on each further retry
    pub retry_backoff: Duration,
    /// Deadline for one backend call
    pub request_timeout: Duration,
    /// Pending requests buffered before callers block
    pub queue_capacity: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 64,
            max_wait: Duration::from_millis(5),
            max_retries: 2,
            retry_backoff: Duration::from_millis(10),
            request_timeout: Duration::from_secs(5),
            queue_capacity: 1024,
        }
    }
}

/// Counters shared between the collector task and its handles.
#[derive(Debug, Default)]
pub struct BatcherStats {
    batches: AtomicU64,
    positions: AtomicU64,
    retries: AtomicU64,
    failures: AtomicU64,
    max_batch_seen: AtomicU64,
}

/// Point-in-time copy of [`BatcherStats`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatcherSnapshot {
    pub batches: u64,
    pub positions: u64,
    pub retries: u64,
    pub failures: u64,
    pub max_batch_seen: u64,
    pub mean_batch_size: f64,
}

impl BatcherStats {
    pub fn snapshot(&self) -> BatcherSnapshot {
        let batches = self.batches.load(Ordering::Relaxed);
        let positions = self.positions.load(Ordering::Relaxed);
        BatcherSnapshot {
            batches,
            positions,
            retries: self.retries.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            max_batch_seen: self.max_batch_seen.load(Ordering::Relaxed),
            mean_batch_size: if batches == 0 {
                0.0
            } else {
                positions as f64 / batches as f64
            },
        }
    }
}

struct Request {
    features: Vec<f32>,
    reply: oneshot::Sender<Result<EvalResult, EvaluatorError>>,
}

/// Cloneable handle to a running collector task.
///
/// The task stops once every handle is dropped or its runtime shuts down;
/// after that every call fails with [`EvaluatorError::Closed`].
#[derive(Clone)]
pub struct BatchingEvaluator {
    tx: mpsc::Sender<Request>,
    stats: Arc<BatcherStats>,
}

impl BatchingEvaluator {
    /// Start the collector task on `handle`.
    pub fn spawn<B: ModelBackend>(backend: B, config: BatchConfig, handle: &Handle) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let stats = Arc::new(BatcherStats::default());
        debug!(
            max_batch_size = config.max_batch_size,
            max_wait_ms = config.max_wait.as_millis() as u64,
            "Starting batching evaluator"
        );
        handle.spawn(collect(backend, config, rx, stats.clone()));
        Self { tx, stats }
    }

    pub fn stats(&self) -> &BatcherStats {
        &self.stats
    }

    /// Submit one position and wait for its result.
    pub async fn evaluate_async(&self, features: Vec<f32>) -> Result<EvalResult, EvaluatorError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Request { features, reply })
            .await
            .map_err(|_| EvaluatorError::Closed)?;
        rx.await.map_err(|_| EvaluatorError::Closed)?
    }
}

impl Evaluator for BatchingEvaluator {
    /// Queues every position before waiting, so one caller's leaves can
    /// share a backend call with each other and with other callers.
    fn evaluate_batch(&self, features: &[Vec<f32>]) -> Result<Vec<EvalResult>, EvaluatorError> {
        let mut pending = Vec::with_capacity(features.len());
        for f in features {
            let (reply, rx) = oneshot::channel();
            self.tx
                .blocking_send(Request {
                    features: f.clone(),
                    reply,
                })
                .map_err(|_| EvaluatorError::Closed)?;
            pending.push(rx);
        }

        pending
            .into_iter()
            .map(|rx| rx.blocking_recv().map_err(|_| EvaluatorError::Closed)?)
            .collect()
    }
}

/// Collector loop: gather, flush, repeat until the channel closes.
async fn collect<B: ModelBackend>(
    backend: B,
    config: BatchConfig,
    mut rx: mpsc::Receiver<Request>,
    stats: Arc<BatcherStats>,
) {
    let max_batch = config.max_batch_size.max(1);
    let mut open = true;

    while open {
        let Some(first) = rx.recv().await else {
            break;
        };
        let deadline = Instant::now() + config.max_wait;
        let mut batch = vec![first];

        while batch.len() < max_batch {
            match timeout_at(deadline, rx.recv()).await {
                Ok(Some(request)) => batch.push(request),
                Ok(None) => {
                    open = false;
                    break;
                }
                Err(_) => break,
            }
        }

        flush(&backend, &config, &stats, batch).await;
    }

    debug!("Batching evaluator stopped");
}

async fn flush<B: ModelBackend>(
    backend: &B,
    config: &BatchConfig,
    stats: &BatcherStats,
    batch: Vec<Request>,
) {
    // Callers that gave up need no answer
    let (features, replies): (Vec<_>, Vec<_>) = batch
        .into_iter()
        .filter(|r| !r.reply.is_closed())
        .map(|r| (r.features, r.reply))
        .unzip();
    if features.is_empty() {
        return;
    }

    let size = features.len() as u64;
    stats.batches.fetch_add(1, Ordering::Relaxed);
    stats.positions.fetch_add(size, Ordering::Relaxed);
    stats.max_batch_seen.fetch_max(size, Ordering::Relaxed);
    trace!(size, "Flushing evaluation batch");

    match predict_with_retry(backend, config, stats, &features).await {
        Ok(results) => {
            for (reply, result) in replies.into_iter().zip(results) {
                let _ = reply.send(Ok(result));
            }
        }
        Err(e) => {
            stats.failures.fetch_add(1, Ordering::Relaxed);
            warn!(error = %e, size, "Evaluation batch failed");
            for reply in replies {
                let _ = reply.send(Err(e.clone()));
            }
        }
    }
}

/// Call the backend, retrying transient failures with backoff.
///
/// A response of the wrong length is never retried.
async fn predict_with_retry<B: ModelBackend>(
    backend: &B,
    config: &BatchConfig,
    stats: &BatcherStats,
    features: &[Vec<f32>],
) -> Result<Vec<EvalResult>, EvaluatorError> {
    let mut attempt = 0u32;
    let mut backoff = config.retry_backoff;

    loop {
        let outcome = match timeout(config.request_timeout, backend.predict_batch(features)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(EvaluatorError::Timeout(format!(
                "no response within {:?}",
                config.request_timeout
            ))),
        };

        match outcome {
            Ok(results) if results.len() == features.len() => return Ok(results),
            Ok(results) => {
                return Err(EvaluatorError::MalformedResponse(format!(
                    "backend returned {} results for {} positions",
                    results.len(),
                    features.len()
                )))
            }
            Err(e) if e.is_retryable() && attempt < config.max_retries => {
                attempt += 1;
                stats.retries.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, attempt, "Retrying evaluation batch");
                tokio::time::sleep(backoff).await;
                backoff = backoff.saturating_mul(2);
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: AtomicU32,
        sizes: Mutex<Vec<usize>>,
    }

    impl Recorder {
        fn record(&self, n: usize) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.sizes.lock().unwrap().push(n);
        }
    }

    /// Echoes the first feature back as the value.
    #[derive(Clone, Default)]
    struct EchoBackend(Arc<Recorder>);

    #[async_trait]
    impl ModelBackend for EchoBackend {
        async fn predict_batch(
            &self,
            features: &[Vec<f32>],
        ) -> Result<Vec<EvalResult>, EvaluatorError> {
            self.0.record(features.len());
            Ok(features
                .iter()
                .map(|f| EvalResult {
                    policy: vec![1.0],
                    value: f[0],
                })
                .collect())
        }
    }

    #[derive(Clone, Default)]
    struct RefusingBackend(Arc<Recorder>);

    #[async_trait]
    impl ModelBackend for RefusingBackend {
        async fn predict_batch(
            &self,
            features: &[Vec<f32>],
        ) -> Result<Vec<EvalResult>, EvaluatorError> {
            self.0.record(features.len());
            Err(EvaluatorError::Connection("refused".into()))
        }
    }

    /// Fails the first `failures` calls with `error`, then echoes.
    #[derive(Clone)]
    struct FlakyBackend {
        recorder: Arc<Recorder>,
        failures: u32,
        error: EvaluatorError,
    }

    impl FlakyBackend {
        fn new(failures: u32, error: EvaluatorError) -> Self {
            Self {
                recorder: Arc::default(),
                failures,
                error,
            }
        }
    }

    #[async_trait]
    impl ModelBackend for FlakyBackend {
        async fn predict_batch(
            &self,
            features: &[Vec<f32>],
        ) -> Result<Vec<EvalResult>, EvaluatorError> {
            let call = self.recorder.calls.load(Ordering::SeqCst);
            self.recorder.record(features.len());
            if call < self.failures {
                return Err(self.error.clone());
            }
            Ok(features
                .iter()
                .map(|f| EvalResult {
                    policy: vec![1.0],
                    value: f[0],
                })
                .collect())
        }
    }

    #[derive(Clone, Default)]
    struct ShortBackend(Arc<Recorder>);

    #[async_trait]
    impl ModelBackend for ShortBackend {
        async fn predict_batch(
            &self,
            features: &[Vec<f32>],
        ) -> Result<Vec<EvalResult>, EvaluatorError> {
            self.0.record(features.len());
            Ok(Vec::new())
        }
    }

    struct SlowBackend;

    #[async_trait]
    impl ModelBackend for SlowBackend {
        async fn predict_batch(
            &self,
            _features: &[Vec<f32>],
        ) -> Result<Vec<EvalResult>, EvaluatorError> {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Ok(Vec::new())
        }
    }

    fn fast_config() -> BatchConfig {
        BatchConfig {
            max_batch_size: 8,
            max_wait: Duration::from_millis(100),
            max_retries: 2,
            retry_backoff: Duration::from_millis(1),
            request_timeout: Duration::from_secs(1),
            queue_capacity: 64,
        }
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_call() {
        let backend = EchoBackend::default();
        let recorder = backend.0.clone();
        let evaluator = BatchingEvaluator::spawn(backend, fast_config(), &Handle::current());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let evaluator = evaluator.clone();
                tokio::spawn(async move { evaluator.evaluate_async(vec![i as f32]).await })
            })
            .collect();

        for (i, handle) in handles.into_iter().enumerate() {
            let result = handle.await.unwrap().unwrap();
            assert_eq!(result.value, i as f32);
        }

        assert_eq!(recorder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(*recorder.sizes.lock().unwrap(), vec![8]);

        let snapshot = evaluator.stats().snapshot();
        assert_eq!(snapshot.batches, 1);
        assert_eq!(snapshot.positions, 8);
        assert_eq!(snapshot.max_batch_seen, 8);
        assert!((snapshot.mean_batch_size - 8.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_partial_batch_flushes_after_wait() {
        let backend = EchoBackend::default();
        let recorder = backend.0.clone();
        let config = BatchConfig {
            max_wait: Duration::from_millis(10),
            ..fast_config()
        };
        let evaluator = BatchingEvaluator::spawn(backend, config, &Handle::current());

        let result = evaluator.evaluate_async(vec![0.5]).await.unwrap();
        assert_eq!(result.value, 0.5);
        assert_eq!(*recorder.sizes.lock().unwrap(), vec![1]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_blocking_callers() {
        let evaluator =
            BatchingEvaluator::spawn(EchoBackend::default(), fast_config(), &Handle::current());

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let evaluator = evaluator.clone();
                tokio::task::spawn_blocking(move || {
                    evaluator.evaluate_batch(&[vec![i as f32], vec![-(i as f32)]])
                })
            })
            .collect();

        for (i, handle) in handles.into_iter().enumerate() {
            let results = handle.await.unwrap().unwrap();
            let values: Vec<f32> = results.iter().map(|r| r.value).collect();
            assert_eq!(values, vec![i as f32, -(i as f32)]);
        }
        assert_eq!(evaluator.stats().snapshot().positions, 8);
    }

    #[tokio::test]
    async fn test_connection_errors_are_retried() {
        let backend = RefusingBackend::default();
        let recorder = backend.0.clone();
        let evaluator = BatchingEvaluator::spawn(backend, fast_config(), &Handle::current());

        let err = evaluator.evaluate_async(vec![0.0]).await.unwrap_err();
        assert!(matches!(err, EvaluatorError::Connection(_)));
        assert_eq!(recorder.calls.load(Ordering::SeqCst), 3);

        let snapshot = evaluator.stats().snapshot();
        assert_eq!(snapshot.retries, 2);
        assert_eq!(snapshot.failures, 1);
    }

    #[tokio::test]
    async fn test_transient_model_failure_is_retried() {
        let backend = FlakyBackend::new(1, EvaluatorError::EvaluationFailed("HTTP 503".into()));
        let recorder = Arc::clone(&backend.recorder);
        let evaluator = BatchingEvaluator::spawn(backend, fast_config(), &Handle::current());

        let result = evaluator.evaluate_async(vec![0.25]).await.unwrap();
        assert_eq!(result.value, 0.25);
        assert_eq!(recorder.calls.load(Ordering::SeqCst), 2);

        let snapshot = evaluator.stats().snapshot();
        assert_eq!(snapshot.retries, 1);
        assert_eq!(snapshot.failures, 0);
    }

    #[tokio::test]
    async fn test_persistent_model_error_surfaces_after_retries() {
        let backend = FlakyBackend::new(u32::MAX, EvaluatorError::ModelError("oom".into()));
        let recorder = Arc::clone(&backend.recorder);
        let evaluator = BatchingEvaluator::spawn(backend, fast_config(), &Handle::current());

        let err = evaluator.evaluate_async(vec![0.0]).await.unwrap_err();
        assert_eq!(err, EvaluatorError::ModelError("oom".into()));
        assert_eq!(recorder.calls.load(Ordering::SeqCst), 3);
        assert_eq!(evaluator.stats().snapshot().retries, 2);
    }

    #[tokio::test]
    async fn test_malformed_response_is_not_retried() {
        let backend = ShortBackend::default();
        let recorder = backend.0.clone();
        let evaluator = BatchingEvaluator::spawn(backend, fast_config(), &Handle::current());

        let err = evaluator.evaluate_async(vec![0.0]).await.unwrap_err();
        assert!(matches!(err, EvaluatorError::MalformedResponse(_)));
        assert_eq!(recorder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_request_timeout() {
        let config = BatchConfig {
            max_wait: Duration::from_millis(1),
            max_retries: 0,
            request_timeout: Duration::from_millis(20),
            ..fast_config()
        };
        let evaluator = BatchingEvaluator::spawn(SlowBackend, config, &Handle::current());

        let err = evaluator.evaluate_async(vec![0.0]).await.unwrap_err();
        assert!(matches!(err, EvaluatorError::Timeout(_)));
    }

    #[test]
    fn test_closed_after_runtime_shutdown() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let evaluator =
            BatchingEvaluator::spawn(EchoBackend::default(), fast_config(), runtime.handle());
        drop(runtime);

        let err = evaluator.evaluate(&[0.0]).unwrap_err();
        assert_eq!(err, EvaluatorError::Closed);
    }

    #[test]
    fn test_empty_batch_needs_no_runtime() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let evaluator =
            BatchingEvaluator::spawn(EchoBackend::default(), fast_config(), runtime.handle());
        assert!(evaluator.evaluate_batch(&[]).unwrap().is_empty());
    }
}
