//! The retry loop behind a single dispatched request.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, warn};

use super::stats::bump;
use super::{ExecutorInner, Outcome, RequestOptions};
use crate::cache::Payload;
use crate::core::{ClassifiedError, TransportError, classify};
use crate::executor::CacheMode;

/// Progress of one logical request. Lives only as long as the request.
#[derive(Debug, Default)]
pub(crate) struct RetryState {
    /// 1-based number of the attempt in progress.
    pub(crate) attempt: u32,
    pub(crate) last_error: Option<ClassifiedError>,
}

/// Runs attempts until one succeeds, a failure is terminal, or the budget is spent.
///
/// One gate slot is held from the first attempt until the request settles, backoff sleeps
/// included, so a retry never queues behind later work. Each attempt re-reads the network
/// profile for its timeout and retry budget.
pub(crate) async fn execute<T, F, Fut>(
    inner: Arc<ExecutorInner>,
    key: String,
    transport_fn: Arc<F>,
    options: RequestOptions,
) -> Outcome
where
    T: Send + Sync + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, TransportError>> + Send + 'static,
{
    let retry = options.retry.clone().unwrap_or_else(|| inner.retry.clone());
    let mut state = RetryState::default();
    let limit = inner.profiler.classify().max_concurrent;
    let _permit = inner.gate.acquire(limit, options.priority).await;

    loop {
        state.attempt += 1;
        let profile = inner.profiler.classify();
        let budget = retry.budget(profile.max_retries);

        bump(&inner.counters.network_attempts);
        let result = match tokio::time::timeout(profile.timeout, transport_fn()).await {
            Ok(result) => result,
            Err(_elapsed) => Err(TransportError::Timeout),
        };

        let raw = match result {
            Ok(value) => {
                let payload: Payload = Arc::new(value);
                if options.cache_mode != CacheMode::Bypass {
                    let ttl = options.ttl.unwrap_or(inner.default_ttl);
                    inner
                        .cache
                        .set(&key, Arc::clone(&payload), ttl, &options.namespace);
                }
                debug!(key = %key, attempt = state.attempt, "request succeeded");
                return Ok(payload);
            }
            Err(raw) => raw,
        };

        let err = classify(&raw);
        if !err.retryable || !retry.allows_retry(state.attempt, err.kind, budget) {
            bump(&inner.counters.failures);
            debug!(
                key = %key,
                attempt = state.attempt,
                kind = %err.kind,
                retryable = err.retryable,
                previous = ?state.last_error.as_ref().map(|e| e.kind),
                "request failed"
            );
            return Err(err);
        }

        let delay = retry
            .backoff
            .compute_delay(state.attempt, err.kind, err.retry_after);
        warn!(
            key = %key,
            attempt = state.attempt,
            budget,
            kind = %err.kind,
            delay_ms = delay.as_millis() as u64,
            "retrying request"
        );
        bump(&inner.counters.retries);
        state.last_error = Some(err);
        tokio::time::sleep(delay).await;
    }
}
