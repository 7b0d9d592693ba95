//! Core components of the `cinefetch` request pipeline.
//!
//! This module contains the foundational building blocks shared by the executor and the
//! API client:
//! - The error taxonomy ([`ErrorKind`], [`ClassifiedError`]) and raw [`TransportError`]s.
//! - The deterministic error classifier.
//! - Backoff and retry budgets.
//! - Network quality profiling.

/// Maps raw transport failures onto the error taxonomy.
pub mod classify;
/// Error types for the crate.
pub mod error;
/// Network signal sources and the profiles derived from them.
pub mod network;
/// Backoff policy and retry configuration.
pub mod retry;

pub use classify::{classify, parse_retry_after};
pub use error::{ClassifiedError, ErrorKind, FetchError, TransportError};
pub use network::{
    NetworkBucket, NetworkProfile, NetworkProfiler, NetworkSignalSource, NetworkSignals,
    NoSignals, StaticSignals,
};
pub use retry::{BackoffPolicy, RetryConfig};
