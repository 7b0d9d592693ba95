//! Network quality classification.
//!
//! Connection hints come from a [`NetworkSignalSource`]. The profiler turns them into a
//! [`NetworkProfile`] that drives per-request timeouts, retry budgets and the gate limit.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Raw connection hints, as a browser or host platform reports them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetworkSignals {
    /// Effective connection type, e.g. `"4g"`, `"3g"`, `"2g"` or `"slow-2g"`.
    pub effective_type: Option<String>,
    /// The user asked for reduced data usage.
    pub save_data: bool,
    /// Estimated downlink in megabits per second.
    pub downlink: Option<f64>,
}

/// Anything that can report the current connection hints.
pub trait NetworkSignalSource: Send + Sync {
    /// Returns `None` when the platform exposes no connection data.
    fn read(&self) -> Option<NetworkSignals>;
}

/// A source for platforms without connection data. Always classifies as fast.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSignals;

impl NetworkSignalSource for NoSignals {
    fn read(&self) -> Option<NetworkSignals> {
        None
    }
}

/// A source whose signals are pushed in by the host, e.g. on a connection change event.
#[derive(Debug, Default)]
pub struct StaticSignals {
    current: Mutex<Option<NetworkSignals>>,
}

impl StaticSignals {
    pub fn new(signals: NetworkSignals) -> Self {
        Self {
            current: Mutex::new(Some(signals)),
        }
    }

    /// Replaces the reported signals. `None` means "no data".
    pub fn set(&self, signals: Option<NetworkSignals>) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = signals;
    }
}

impl NetworkSignalSource for StaticSignals {
    fn read(&self) -> Option<NetworkSignals> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Coarse network quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum NetworkBucket {
    Fast,
    Slow,
    VerySlow,
}

/// Budgets derived from the current network quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct NetworkProfile {
    pub bucket: NetworkBucket,
    /// Deadline for a single transport attempt.
    pub timeout: Duration,
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
    /// Maximum simultaneous outbound requests.
    pub max_concurrent: usize,
}

impl NetworkProfile {
    #[must_use]
    pub const fn for_bucket(bucket: NetworkBucket) -> Self {
        match bucket {
            NetworkBucket::Fast => Self {
                bucket,
                timeout: Duration::from_secs(8),
                max_retries: 2,
                max_concurrent: 8,
            },
            NetworkBucket::Slow => Self {
                bucket,
                timeout: Duration::from_secs(15),
                max_retries: 3,
                max_concurrent: 4,
            },
            NetworkBucket::VerySlow => Self {
                bucket,
                timeout: Duration::from_secs(25),
                max_retries: 4,
                max_concurrent: 2,
            },
        }
    }
}

/// Classifies the network on demand. Holds no state besides its signal source, so every call
/// reflects the conditions at that moment.
pub struct NetworkProfiler {
    source: Arc<dyn NetworkSignalSource>,
}

impl std::fmt::Debug for NetworkProfiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkProfiler").finish_non_exhaustive()
    }
}

impl Default for NetworkProfiler {
    fn default() -> Self {
        Self::new(Arc::new(NoSignals))
    }
}

impl NetworkProfiler {
    pub fn new(source: Arc<dyn NetworkSignalSource>) -> Self {
        Self { source }
    }

    /// Reads the signal source and returns the matching profile.
    #[must_use]
    pub fn classify(&self) -> NetworkProfile {
        let bucket = self
            .source
            .read()
            .map_or(NetworkBucket::Fast, |s| bucket_for(&s));
        NetworkProfile::for_bucket(bucket)
    }
}

/// `VerySlow` on save-data or 2g, `Slow` on 3g or a sub-1Mbps downlink, `Fast` otherwise.
#[must_use]
pub fn bucket_for(signals: &NetworkSignals) -> NetworkBucket {
    let effective = signals
        .effective_type
        .as_deref()
        .map(str::to_ascii_lowercase);

    if signals.save_data || matches!(effective.as_deref(), Some("2g" | "slow-2g")) {
        NetworkBucket::VerySlow
    } else if effective.as_deref() == Some("3g") || signals.downlink.is_some_and(|d| d < 1.0) {
        NetworkBucket::Slow
    } else {
        NetworkBucket::Fast
    }
}
