use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::cache::CacheStats;
use crate::core::NetworkProfile;
use crate::gate::GateStats;

/// Request-level counters since the executor was built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RequestCounters {
    /// Calls to `request`, including prefetches. Background refreshes are counted only in
    /// `background_refreshes`.
    pub requests: u64,
    /// Calls answered from the cache without waiting on the network.
    pub cache_hits: u64,
    /// Calls that joined an already running execution.
    pub deduplicated: u64,
    /// Transport invocations.
    pub network_attempts: u64,
    pub retries: u64,
    /// Executions that ended in an error.
    pub failures: u64,
    /// Calls answered with expired data.
    pub stale_served: u64,
    /// Revalidations started after serving from the cache.
    pub background_refreshes: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) requests: AtomicU64,
    pub(crate) cache_hits: AtomicU64,
    pub(crate) deduplicated: AtomicU64,
    pub(crate) network_attempts: AtomicU64,
    pub(crate) retries: AtomicU64,
    pub(crate) failures: AtomicU64,
    pub(crate) stale_served: AtomicU64,
    pub(crate) background_refreshes: AtomicU64,
}

pub(crate) fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl Counters {
    pub(crate) fn snapshot(&self) -> RequestCounters {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        RequestCounters {
            requests: get(&self.requests),
            cache_hits: get(&self.cache_hits),
            deduplicated: get(&self.deduplicated),
            network_attempts: get(&self.network_attempts),
            retries: get(&self.retries),
            failures: get(&self.failures),
            stale_served: get(&self.stale_served),
            background_refreshes: get(&self.background_refreshes),
        }
    }
}

/// Everything a debugging surface may want to show about the executor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ExecutorStats {
    pub cache: CacheStats,
    pub gate: GateStats,
    pub in_flight: usize,
    pub requests: RequestCounters,
    pub network: NetworkProfile,
}
