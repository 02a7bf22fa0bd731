//! Concurrent request batching
//!
//! The [`Dispatcher`] runs every request of a [`RequestBatch`] as its own tokio
//! task, gated by a semaphore sized to the concurrency limit, and waits for all
//! of them to settle. Each task hands back its `(key, outcome)` pair; the map is
//! assembled only after every handle has been joined, so no task ever touches
//! shared result state.

use crate::{CarbonError, Config, Metrics, RequestBatch, RequestDescriptor, RequestFailure};
use async_trait::async_trait;
use futures::future::join_all;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::AbortHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Settled result of one request in a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    Success(Value),
    Failure(RequestFailure),
}

impl BatchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, BatchOutcome::Success(_))
    }

    pub fn success(&self) -> Option<&Value> {
        match self {
            BatchOutcome::Success(value) => Some(value),
            BatchOutcome::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&RequestFailure> {
        match self {
            BatchOutcome::Success(_) => None,
            BatchOutcome::Failure(failure) => Some(failure),
        }
    }

    pub fn into_result(self) -> Result<Value, RequestFailure> {
        match self {
            BatchOutcome::Success(value) => Ok(value),
            BatchOutcome::Failure(failure) => Err(failure),
        }
    }
}

impl From<Result<Value, RequestFailure>> for BatchOutcome {
    fn from(result: Result<Value, RequestFailure>) -> Self {
        match result {
            Ok(value) => BatchOutcome::Success(value),
            Err(failure) => BatchOutcome::Failure(failure),
        }
    }
}

pub type BatchOutcomes = BTreeMap<String, BatchOutcome>;

/// Executes a single request and decodes its body.
///
/// Implementations are shared by every task of a batch, so they must be safe
/// for concurrent use. The dispatcher applies the per-request timeout itself.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport {
    async fn execute(&self, request: &RequestDescriptor) -> Result<Value, RequestFailure>;
}

/// [`Transport`] backed by one pooled `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    client_timeout: Option<Duration>,
}

impl HttpTransport {
    pub fn new(config: &Config) -> Result<Self, CarbonError> {
        let mut builder = reqwest::Client::builder()
            .timeout(config.client_timeout)
            .danger_accept_invalid_certs(config.accept_invalid_certs);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent);
        }

        let client = builder
            .build()
            .map_err(|e| CarbonError::TransportSetup(e.to_string()))?;

        Ok(Self {
            client,
            client_timeout: Some(config.client_timeout),
        })
    }

    /// Wrap an existing client. Client-side timeouts are then reported with
    /// the request's own deadline.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self {
            client,
            client_timeout: None,
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: &RequestDescriptor) -> Result<Value, RequestFailure> {
        let deadline = self.client_timeout.unwrap_or(request.timeout);
        let classify = |e: reqwest::Error| RequestFailure::from_reqwest(e, deadline);
        let mut builder = self.client.request(request.method.clone(), &request.url);

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(classify)?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RequestFailure::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await.map_err(classify)?;
        serde_json::from_slice(&bytes).map_err(|e| RequestFailure::Decode(e.to_string()))
    }
}

pub struct Dispatcher<T: Transport> {
    transport: Arc<T>,
    metrics: Arc<Metrics>,
}

impl Dispatcher<HttpTransport> {
    /// Build a dispatcher around a fresh HTTP client.
    pub fn http(config: &Config) -> Result<Self, CarbonError> {
        Ok(Self::new(HttpTransport::new(config)?))
    }
}

impl<T: Transport + Send + Sync + 'static> Dispatcher<T> {
    pub fn new(transport: T) -> Self {
        Self::with_shared(Arc::new(transport))
    }

    /// Reuse a long-lived transport across several dispatchers.
    pub fn with_shared(transport: Arc<T>) -> Self {
        Self {
            transport,
            metrics: Arc::new(Metrics::new()),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Issue every request in `batch` with at most `concurrency_limit` in
    /// flight and wait for all of them to settle.
    ///
    /// The returned map has exactly one entry per input key. Individual
    /// failures are reported in their entry; the call itself only fails when
    /// `concurrency_limit` is zero.
    pub async fn dispatch(
        &self,
        batch: RequestBatch,
        concurrency_limit: usize,
    ) -> Result<BatchOutcomes, CarbonError> {
        if concurrency_limit == 0 {
            return Err(CarbonError::InvalidConcurrency);
        }

        if batch.is_empty() {
            return Ok(BatchOutcomes::new());
        }

        let batch_id = uuid::Uuid::new_v4();
        let total = batch.len();
        let start_time = Instant::now();
        let semaphore = Arc::new(Semaphore::new(concurrency_limit));

        debug!(
            "Dispatching batch {} with {} requests (concurrency {})",
            batch_id, total, concurrency_limit
        );

        let mut keys = Vec::with_capacity(total);
        let mut tasks = Vec::with_capacity(total);
        let mut in_flight = AbortOnDrop(Vec::with_capacity(total));

        for request in batch {
            let permit = semaphore.clone().acquire_owned().await?;
            let transport = self.transport.clone();
            let metrics = self.metrics.clone();

            keys.push(request.key.clone());
            let handle = tokio::spawn(async move {
                let _permit = permit;
                let outcome = execute_one(transport.as_ref(), &request, &metrics).await;
                (request.key, outcome)
            });
            in_flight.0.push(handle.abort_handle());
            tasks.push(handle);
        }

        let mut outcomes = BatchOutcomes::new();
        for (key, joined) in keys.into_iter().zip(join_all(tasks).await) {
            let (key, outcome) = joined.unwrap_or_else(|e| {
                warn!("Request {} in batch {} did not complete: {}", key, batch_id, e);
                self.metrics.record_failure(&RequestFailure::Aborted(e.to_string()));
                (key, BatchOutcome::Failure(RequestFailure::Aborted(e.to_string())))
            });
            outcomes.insert(key, outcome);
        }

        let succeeded = outcomes.values().filter(|o| o.is_success()).count();
        info!(
            "Batch {} completed in {:?}. Success: {}, Errors: {}",
            batch_id,
            start_time.elapsed(),
            succeeded,
            total - succeeded
        );

        Ok(outcomes)
    }
}

/// Aborts every spawned request when `dispatch` is dropped before it settles.
struct AbortOnDrop(Vec<AbortHandle>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

async fn execute_one<T: Transport + ?Sized>(
    transport: &T,
    request: &RequestDescriptor,
    metrics: &Metrics,
) -> BatchOutcome {
    let start_time = Instant::now();
    debug!("{} {} ({})", request.method, request.url, request.key);

    let result = match timeout(request.timeout, transport.execute(request)).await {
        Ok(result) => result,
        Err(_) => Err(RequestFailure::Timeout(request.timeout)),
    };

    metrics.record_request_duration(start_time.elapsed());

    match &result {
        Ok(_) => {
            metrics.record_success();
            debug!("Request {} succeeded in {:?}", request.key, start_time.elapsed());
        }
        Err(failure) => {
            metrics.record_failure(failure);
            warn!("Request {} failed: {}", request.key, failure);
        }
    }

    result.into()
}
