use std::sync::Arc;
use std::time::Duration;

use super::stats::Counters;
use super::{ExecutorInner, Outcome, RequestExecutor};
use crate::cache::{DEFAULT_CAPACITY, TtlCache};
use crate::core::{BackoffPolicy, NetworkProfiler, NetworkSignalSource, RetryConfig};
use crate::gate::ConcurrencyGate;
use crate::inflight::InFlightRegistry;

/// Default freshness window for cached results.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/* ----------------------- Builder ----------------------- */

/// Assembles a [`RequestExecutor`]. Every shared component can be injected, so an application
/// decides where its single cache, registry and gate live.
#[derive(Default)]
pub struct RequestExecutorBuilder {
    cache: Option<Arc<TtlCache>>,
    cache_capacity: Option<usize>,
    default_ttl: Option<Duration>,
    gate: Option<ConcurrencyGate>,
    inflight: Option<InFlightRegistry<Outcome>>,
    signal_source: Option<Arc<dyn NetworkSignalSource>>,
    retry: RetryConfig,
}

impl RequestExecutorBuilder {
    /// Maximum number of cached entries. Ignored when a cache is injected. Default: 200.
    #[must_use]
    pub fn cache_capacity(mut self, entries: usize) -> Self {
        self.cache_capacity = Some(entries);
        self
    }

    /// TTL for calls that do not set one. Default: 5 minutes.
    #[must_use]
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Use an existing cache instance.
    #[must_use]
    pub fn cache(mut self, cache: Arc<TtlCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Use an existing gate, e.g. one shared with non-cached traffic.
    #[must_use]
    pub fn gate(mut self, gate: ConcurrencyGate) -> Self {
        self.gate = Some(gate);
        self
    }

    #[must_use]
    pub fn inflight(mut self, registry: InFlightRegistry<Outcome>) -> Self {
        self.inflight = Some(registry);
        self
    }

    /// Where connection hints come from. Default: none, which classifies as fast.
    #[must_use]
    pub fn signal_source(mut self, source: Arc<dyn NetworkSignalSource>) -> Self {
        self.signal_source = Some(source);
        self
    }

    /// Replace the whole retry configuration.
    #[must_use]
    pub fn retry_config(mut self, cfg: RetryConfig) -> Self {
        self.retry = cfg;
        self
    }

    /// Enable or disable retries.
    #[must_use]
    pub fn retry_enabled(mut self, enabled: bool) -> Self {
        self.retry.enabled = enabled;
        self
    }

    /// Fix the retry budget instead of deriving it from the network profile.
    #[must_use]
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.retry.max_retries = Some(retries);
        self
    }

    #[must_use]
    pub fn backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.retry.backoff = backoff;
        self
    }

    pub fn build(self) -> RequestExecutor {
        let cache = self.cache.unwrap_or_else(|| {
            Arc::new(TtlCache::new(self.cache_capacity.unwrap_or(DEFAULT_CAPACITY)))
        });
        let profiler = self
            .signal_source
            .map(NetworkProfiler::new)
            .unwrap_or_default();

        RequestExecutor {
            inner: Arc::new(ExecutorInner {
                cache,
                inflight: self.inflight.unwrap_or_default(),
                gate: self.gate.unwrap_or_default(),
                profiler,
                retry: self.retry,
                default_ttl: self.default_ttl.unwrap_or(DEFAULT_TTL),
                counters: Counters::default(),
            }),
        }
    }
}
