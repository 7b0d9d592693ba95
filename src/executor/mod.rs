//! The request orchestration pipeline.
//!
//! A call to [`RequestExecutor::request`] goes through:
//!
//! 1. the TTL cache (optionally serving stale data while revalidating in the background),
//! 2. the in-flight registry, so identical concurrent calls share one execution,
//! 3. the concurrency gate, sized by the current network profile,
//! 4. the transport function, bounded by the profile's timeout,
//! 5. on failure, classification and backoff until the retry budget is spent,
//! 6. a cache write on success.

mod attempt;
mod builder;
mod options;
mod stats;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

pub use builder::RequestExecutorBuilder;
pub use options::{CacheMode, Fetched, Invalidate, RequestOptions};
pub use stats::{ExecutorStats, RequestCounters};

use crate::cache::{Payload, TtlCache};
use crate::core::{
    ClassifiedError, ErrorKind, NetworkProfile, NetworkProfiler, RetryConfig, TransportError,
};
use crate::gate::{ConcurrencyGate, Priority};
use crate::handle::RequestHandle;
use crate::inflight::{Admission, InFlightRegistry};
use stats::{Counters, bump};

/// What a dispatched execution settles with, shared by every joined caller.
pub type Outcome = Result<Payload, ClassifiedError>;

pub(crate) struct ExecutorInner {
    pub(crate) cache: Arc<TtlCache>,
    pub(crate) inflight: InFlightRegistry<Outcome>,
    pub(crate) gate: ConcurrencyGate,
    pub(crate) profiler: NetworkProfiler,
    pub(crate) retry: RetryConfig,
    pub(crate) default_ttl: Duration,
    pub(crate) counters: Counters,
}

/// Orchestrates cached, deduplicated, rate-bounded and retried requests.
///
/// Cloning is cheap; clones share the cache, registry, gate and counters. An application
/// normally builds one executor at start-up and hands clones to every service.
///
/// # Example
///
/// ```no_run
/// # use std::time::Duration;
/// # use cinefetch::{RequestExecutor, RequestOptions, TransportError};
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let executor = RequestExecutor::builder()
///     .default_ttl(Duration::from_secs(60))
///     .build();
///
/// let trending = executor
///     .request(
///         "trending:week",
///         || async { Ok::<_, TransportError>(vec!["Dune".to_string()]) },
///         RequestOptions::new().namespace("movies").stale_while_revalidate(true),
///     )
///     .await?;
/// println!("{} titles (cached: {})", trending.data.len(), trending.from_cache);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RequestExecutor {
    inner: Arc<ExecutorInner>,
}

impl std::fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("cache", &self.inner.cache.stats())
            .field("gate", &self.inner.gate.stats())
            .field("in_flight", &self.inner.inflight.len())
            .finish_non_exhaustive()
    }
}

impl Default for RequestExecutor {
    fn default() -> Self {
        Self::builder().build()
    }
}

fn downcast<T: Clone + 'static>(payload: &Payload) -> Result<T, ClassifiedError> {
    payload.downcast_ref::<T>().cloned().ok_or_else(|| {
        ClassifiedError::new(
            ErrorKind::Unknown,
            format!(
                "cached payload is not a `{}`; was the key reused for another type?",
                std::any::type_name::<T>()
            ),
        )
        .not_retryable()
    })
}

fn flight_key(key: &str, namespace: &str) -> String {
    format!("{namespace}\u{1f}{key}")
}

impl RequestExecutor {
    /// Create a new builder.
    pub fn builder() -> RequestExecutorBuilder {
        RequestExecutorBuilder::default()
    }

    /// Performs one logical request for `key`.
    ///
    /// `transport_fn` is called once per attempt and must produce a fresh future each time.
    /// With [`CacheMode::Use`] a fresh cache entry answers immediately; with
    /// `stale_while_revalidate` an expired one does too, and a background refresh is started.
    /// Otherwise identical concurrent calls are collapsed into one execution whose result
    /// (or error) every caller receives.
    ///
    /// # Errors
    ///
    /// Returns the final [`ClassifiedError`] once retries are exhausted or on the first
    /// non-retryable failure, unless `stale_on_error` allows falling back to cached data.
    #[tracing::instrument(level = "debug", skip_all, fields(key = %key, ns = %options.namespace))]
    pub async fn request<T, F, Fut>(
        &self,
        key: &str,
        transport_fn: F,
        options: RequestOptions,
    ) -> Result<Fetched<T>, ClassifiedError>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, TransportError>> + Send + 'static,
    {
        let counters = &self.inner.counters;
        bump(&counters.requests);
        let transport_fn = Arc::new(transport_fn);
        let ns = options.namespace.as_str();

        let cached = match options.cache_mode {
            CacheMode::Use => match self.inner.cache.lookup(key, ns) {
                Some(hit) if hit.fresh || options.stale_while_revalidate => {
                    let data = downcast::<T>(&hit.value)?;
                    bump(&counters.cache_hits);
                    if !hit.fresh {
                        bump(&counters.stale_served);
                    }
                    debug!(fresh = hit.fresh, age_ms = hit.age.as_millis() as u64, "cache hit");
                    if options.stale_while_revalidate {
                        self.revalidate::<T, F, Fut>(key, transport_fn, &options);
                    }
                    return Ok(Fetched {
                        data,
                        from_cache: true,
                        stale: !hit.fresh,
                        error: None,
                    });
                }
                Some(expired) => Some(expired.value),
                None => None,
            },
            CacheMode::Refresh => self.inner.cache.peek(key, ns).map(|entry| entry.value),
            CacheMode::Bypass => None,
        };

        match self.dispatch::<T, F, Fut>(key, transport_fn, &options).await {
            Ok(payload) => Ok(Fetched::from_network(downcast(&payload)?)),
            Err(err) => match cached {
                Some(value) if options.stale_on_error && !err.is_cancelled() => {
                    warn!(kind = %err.kind, error = %err, "request failed, serving stale data");
                    bump(&counters.stale_served);
                    Ok(Fetched {
                        data: downcast(&value)?,
                        from_cache: true,
                        stale: true,
                        error: Some(err),
                    })
                }
                _ => Err(err),
            },
        }
    }

    /// Like [`request`](Self::request), but runs on the runtime and can be cancelled.
    ///
    /// Cancelling rejects this caller with [`ErrorKind::Cancelled`]. The transport attempt is
    /// aborted, and its gate slot freed, once no other caller is waiting on it.
    pub fn spawn_request<T, F, Fut>(
        &self,
        key: impl Into<String>,
        transport_fn: F,
        options: RequestOptions,
    ) -> RequestHandle<Fetched<T>>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, TransportError>> + Send + 'static,
    {
        let exec = self.clone();
        let key = key.into();
        RequestHandle::spawn(async move { exec.request::<T, F, Fut>(&key, transport_fn, options).await })
    }

    /// Fills the cache for `key` in the background at low priority.
    ///
    /// Nothing is fetched if a fresh entry exists. Failures are logged, never returned to a
    /// caller; the handle only reports completion.
    pub fn prefetch<T, F, Fut>(
        &self,
        key: impl Into<String>,
        transport_fn: F,
        options: RequestOptions,
    ) -> RequestHandle<()>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, TransportError>> + Send + 'static,
    {
        let exec = self.clone();
        let key = key.into();
        let options = options.priority(Priority::Low);
        RequestHandle::spawn(async move {
            match exec.request::<T, F, Fut>(&key, transport_fn, options).await {
                Ok(_) => Ok(()),
                Err(err) if err.is_cancelled() => Err(err),
                Err(err) => {
                    warn!(key = %key, kind = %err.kind, error = %err, "prefetch failed");
                    Ok(())
                }
            }
        })
    }

    /// Drops cached entries.
    pub fn invalidate(&self, target: Invalidate) {
        debug!(?target, "invalidating cache");
        match target {
            Invalidate::Key { key, namespace } => {
                self.inner.cache.remove(&key, &namespace);
            }
            Invalidate::Namespace(namespace) => self.inner.cache.clear(Some(&namespace)),
            Invalidate::All => self.inner.cache.clear(None),
        }
    }

    #[must_use]
    pub fn stats(&self) -> ExecutorStats {
        ExecutorStats {
            cache: self.inner.cache.stats(),
            gate: self.inner.gate.stats(),
            in_flight: self.inner.inflight.len(),
            requests: self.inner.counters.snapshot(),
            network: self.inner.profiler.classify(),
        }
    }

    /// The profile the next attempt would use.
    #[must_use]
    pub fn network_profile(&self) -> NetworkProfile {
        self.inner.profiler.classify()
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<TtlCache> {
        &self.inner.cache
    }

    #[must_use]
    pub fn gate(&self) -> &ConcurrencyGate {
        &self.inner.gate
    }

    #[must_use]
    pub fn in_flight(&self) -> &InFlightRegistry<Outcome> {
        &self.inner.inflight
    }

    /// Runs the request through the registry (unless deduplication is off) and the retry loop.
    async fn dispatch<T, F, Fut>(
        &self,
        key: &str,
        transport_fn: Arc<F>,
        options: &RequestOptions,
    ) -> Outcome
    where
        T: Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, TransportError>> + Send + 'static,
    {
        let job = {
            let inner = Arc::clone(&self.inner);
            let key = key.to_string();
            let options = options.clone();
            move || attempt::execute::<T, F, Fut>(inner, key, transport_fn, options)
        };

        if !options.dedupe {
            return job().await;
        }

        let (pending, admission) = self
            .inner
            .inflight
            .get_or_create(&flight_key(key, &options.namespace), job);
        if admission == Admission::Joined {
            bump(&self.inner.counters.deduplicated);
            debug!("joined in-flight request");
        }
        pending.await
    }

    /// Fire-and-forget refresh after serving from the cache. Errors are logged only.
    fn revalidate<T, F, Fut>(&self, key: &str, transport_fn: Arc<F>, options: &RequestOptions)
    where
        T: Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, TransportError>> + Send + 'static,
    {
        bump(&self.inner.counters.background_refreshes);
        let exec = self.clone();
        let key = key.to_string();
        let options = options
            .clone()
            .cache_mode(CacheMode::Refresh)
            .priority(Priority::Low);

        tokio::spawn(async move {
            if let Err(err) = exec.dispatch::<T, F, Fut>(&key, transport_fn, &options).await {
                warn!(key = %key, kind = %err.kind, error = %err, "background refresh failed");
            }
        });
    }
}
