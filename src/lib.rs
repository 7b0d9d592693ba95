//! cinefetch: client-side request orchestration for the streaming companion API.
//!
//! Every outbound call goes through a [`RequestExecutor`], which layers a namespaced
//! [`TtlCache`], an [`InFlightRegistry`] for deduplication, a [`ConcurrencyGate`] sized by the
//! current [`NetworkProfile`], and classified retries with exponential backoff. [`ApiClient`]
//! wraps the executor for JSON endpoints.

pub mod api;
pub mod cache;
pub mod core;
pub mod executor;
pub mod gate;
pub mod handle;
pub mod inflight;
pub mod transport;

pub use api::{ApiClient, ApiClientBuilder};
pub use cache::{CacheEntry, CacheStats, Lookup, Payload, TtlCache};
pub use crate::core::{
    BackoffPolicy, ClassifiedError, ErrorKind, FetchError, NetworkBucket, NetworkProfile,
    NetworkProfiler, NetworkSignalSource, NetworkSignals, NoSignals, RetryConfig, StaticSignals,
    TransportError, classify, parse_retry_after,
};
pub use executor::{
    CacheMode, ExecutorStats, Fetched, Invalidate, Outcome, RequestCounters, RequestExecutor,
    RequestExecutorBuilder, RequestOptions,
};
pub use gate::{ConcurrencyGate, GatePermit, GateStats, Priority};
pub use handle::{Canceller, RequestHandle};
pub use inflight::{Admission, InFlightRegistry, Pending};
pub use transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport};

/// Installs a `fmt` subscriber filtered by `RUST_LOG` (default `cinefetch=info`).
///
/// Does nothing if a global subscriber is already set.
#[cfg(feature = "tracing-subscriber")]
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cinefetch=info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
