use std::time::Duration;

use crate::cache::DEFAULT_NAMESPACE;
use crate::core::{ClassifiedError, RetryConfig};
use crate::gate::Priority;

/// Cache stage of a request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CacheMode {
    /// Answer from a fresh entry (or an expired one under stale-while-revalidate), otherwise
    /// dispatch and store the result.
    #[default]
    Use,
    /// Skip the lookup and store the result. Set by `force_refresh(true)` and used by
    /// background revalidation. The old entry still backs `stale_on_error`.
    Refresh,
    /// Skip the lookup and the store. Used for writes such as `ApiClient::post_json`.
    Bypass,
}

/// Per-call options for [`RequestExecutor::request`](super::RequestExecutor::request).
#[derive(Clone, Debug)]
pub struct RequestOptions {
    pub(crate) ttl: Option<Duration>,
    pub(crate) namespace: String,
    pub(crate) stale_while_revalidate: bool,
    pub(crate) cache_mode: CacheMode,
    pub(crate) priority: Priority,
    pub(crate) stale_on_error: bool,
    pub(crate) retry: Option<RetryConfig>,
    pub(crate) dedupe: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            ttl: None,
            namespace: DEFAULT_NAMESPACE.to_string(),
            stale_while_revalidate: false,
            cache_mode: CacheMode::Use,
            priority: Priority::Normal,
            stale_on_error: false,
            retry: None,
            dedupe: true,
        }
    }
}

impl RequestOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// How long a successful result stays fresh. Defaults to the executor's TTL.
    /// A zero TTL disables caching for the call.
    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Groups the cached result so it can be invalidated together with related keys.
    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Serve cached data, even expired, immediately and refresh it in the background.
    #[must_use]
    pub fn stale_while_revalidate(mut self, enabled: bool) -> Self {
        self.stale_while_revalidate = enabled;
        self
    }

    /// Skip the cache read. Shorthand for [`CacheMode::Refresh`].
    #[must_use]
    pub fn force_refresh(mut self, enabled: bool) -> Self {
        self.cache_mode = if enabled {
            CacheMode::Refresh
        } else {
            CacheMode::Use
        };
        self
    }

    #[must_use]
    pub fn cache_mode(mut self, mode: CacheMode) -> Self {
        self.cache_mode = mode;
        self
    }

    #[must_use]
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// On terminal failure, answer with the cached value (marked `stale`) if one exists.
    ///
    /// The failure is still reported through [`Fetched::error`].
    #[must_use]
    pub fn stale_on_error(mut self, enabled: bool) -> Self {
        self.stale_on_error = enabled;
        self
    }

    /// Overrides the executor's retry policy for this call.
    #[must_use]
    pub fn retry_policy(mut self, cfg: Option<RetryConfig>) -> Self {
        self.retry = cfg;
        self
    }

    /// Whether identical concurrent calls may share one execution. Disable for
    /// non-idempotent requests.
    #[must_use]
    pub fn dedupe(mut self, enabled: bool) -> Self {
        self.dedupe = enabled;
        self
    }

    #[must_use]
    pub fn namespace_str(&self) -> &str {
        &self.namespace
    }
}

/// A successful request outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
    pub data: T,
    /// The data came from the cache rather than this call's own transport attempt.
    pub from_cache: bool,
    /// The data outlived its TTL, or is a fallback for a failed refresh.
    pub stale: bool,
    /// Set when stale data is served because the request failed.
    pub error: Option<ClassifiedError>,
}

impl<T> Fetched<T> {
    pub(crate) fn from_network(data: T) -> Self {
        Self {
            data,
            from_cache: false,
            stale: false,
            error: None,
        }
    }

    #[must_use]
    pub fn into_data(self) -> T {
        self.data
    }

    /// Transforms the payload, keeping the cache flags.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Fetched<U> {
        Fetched {
            data: f(self.data),
            from_cache: self.from_cache,
            stale: self.stale,
            error: self.error,
        }
    }

    /// Fallible counterpart of [`map`](Self::map).
    pub fn try_map<U, E>(self, f: impl FnOnce(T) -> Result<U, E>) -> Result<Fetched<U>, E> {
        Ok(Fetched {
            data: f(self.data)?,
            from_cache: self.from_cache,
            stale: self.stale,
            error: self.error,
        })
    }
}

/// What to drop from the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invalidate {
    Key { key: String, namespace: String },
    Namespace(String),
    All,
}

impl Invalidate {
    /// A key in the default namespace.
    pub fn key(key: impl Into<String>) -> Self {
        Self::Key {
            key: key.into(),
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }

    pub fn namespace(namespace: impl Into<String>) -> Self {
        Self::Namespace(namespace.into())
    }
}
