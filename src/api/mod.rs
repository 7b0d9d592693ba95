//! Typed JSON access to the companion backend.
//! Internals are split into `auth` (token attachment) and `constants` (UA + defaults).

mod auth;
mod constants;

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use reqwest::Method;
use reqwest::header::{ACCEPT, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use url::Url;

use crate::core::{FetchError, RetryConfig, TransportError};
use crate::executor::{
    CacheMode, ExecutorStats, Fetched, Invalidate, RequestExecutor, RequestOptions,
};
use crate::handle::RequestHandle;
use crate::transport::{HttpRequest, ReqwestTransport, Transport};
use constants::{DEFAULT_BASE_URL, USER_AGENT};

/// A JSON API client whose GETs are cached, deduplicated, gated and retried.
///
/// Responses are cached as raw bodies keyed by their full URL and the current token, and
/// decoded on every call, so the same endpoint can be read into different types.
///
/// # Example
///
/// ```no_run
/// # use cinefetch::{ApiClient, RequestOptions};
/// # use serde::Deserialize;
/// #[derive(Deserialize)]
/// struct Title { id: u64, name: String }
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let api = ApiClient::builder()
///     .base_url(url::Url::parse("https://api.example.com/v1/")?)
///     .build()?;
///
/// let popular = api
///     .get_json::<Vec<Title>>("movies/popular", &[("page", "1")], RequestOptions::new().namespace("movies"))
///     .await?;
/// println!("{} titles", popular.data.len());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    executor: RequestExecutor,
    base_url: Url,
    token: Arc<RwLock<Option<String>>>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url.as_str())
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}

type BodyFuture = BoxFuture<'static, Result<String, TransportError>>;

/// Cache and dedup key for `url` as seen by the holder of the token behind `fingerprint`.
fn scoped_key(url: &Url, fingerprint: Option<u64>) -> String {
    match fingerprint {
        Some(fp) => format!("{url} auth:{fp:016x}"),
        None => url.to_string(),
    }
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T, serde_json::Error> {
    // 204s and empty 200s decode like `null`
    if body.trim().is_empty() {
        serde_json::from_str("null")
    } else {
        serde_json::from_str(body)
    }
}

impl ApiClient {
    /// Create a new builder.
    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::default()
    }

    #[must_use]
    pub fn executor(&self) -> &RequestExecutor {
        &self.executor
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolves `path` against the base URL and appends `query`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Url`] if the path cannot be joined.
    pub fn url_for(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, FetchError> {
        let mut url = self.base_url.join(path.trim_start_matches('/'))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// Fetches and decodes a JSON resource.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Request`] if the request fails after retries, or
    /// [`FetchError::Decode`] if the body does not match `T`.
    #[tracing::instrument(level = "debug", skip(self, query, options), err)]
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        options: RequestOptions,
    ) -> Result<Fetched<T>, FetchError> {
        let url = self.url_for(path, query)?;
        let (request, key) = self.prepare(HttpRequest::get(url)).await;

        let fetched = self
            .executor
            .request(&key, self.body_fetcher(request), options)
            .await?;
        Ok(fetched.try_map(|body| decode(&body))?)
    }

    /// Sends a JSON body with POST and decodes the response.
    ///
    /// POSTs are never cached, never joined with other calls and never retried.
    ///
    /// # Errors
    ///
    /// See [`get_json`](Self::get_json).
    #[tracing::instrument(level = "debug", skip(self, body), err)]
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, FetchError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url_for(path, &[])?;
        let payload = serde_json::to_string(body)?;
        let (request, key) = self
            .prepare(HttpRequest::new(Method::POST, url).json_body(payload))
            .await;
        let key = format!("POST {key}");

        let options = RequestOptions::new()
            .cache_mode(CacheMode::Bypass)
            .dedupe(false)
            .retry_policy(Some(RetryConfig::disabled()));
        let fetched = self
            .executor
            .request(&key, self.body_fetcher(request), options)
            .await?;
        Ok(decode(&fetched.data)?)
    }

    /// Warms the cache for a GET in the background.
    ///
    /// # Errors
    ///
    /// Only fails if the URL cannot be built; request failures are logged.
    pub async fn prefetch_json(
        &self,
        path: &str,
        query: &[(&str, &str)],
        options: RequestOptions,
    ) -> Result<RequestHandle<()>, FetchError> {
        let url = self.url_for(path, query)?;
        let (request, key) = self.prepare(HttpRequest::get(url)).await;
        Ok(self
            .executor
            .prefetch(key, self.body_fetcher(request), options))
    }

    /// Drops the cached response of one GET made with the current token.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Url`] if the URL cannot be built.
    pub async fn invalidate(
        &self,
        path: &str,
        query: &[(&str, &str)],
        namespace: &str,
    ) -> Result<(), FetchError> {
        let url = self.url_for(path, query)?;
        let fingerprint = self.auth_scope().await.fingerprint;
        self.executor.invalidate(Invalidate::Key {
            key: scoped_key(&url, fingerprint),
            namespace: namespace.to_string(),
        });
        Ok(())
    }

    /// Drops every cached response in `namespace`, e.g. after a write to that area.
    pub fn invalidate_namespace(&self, namespace: &str) {
        self.executor.invalidate(Invalidate::namespace(namespace));
    }

    #[must_use]
    pub fn stats(&self) -> ExecutorStats {
        self.executor.stats()
    }

    /// Adds the JSON and auth headers and returns the request with its token-scoped key.
    async fn prepare(&self, mut request: HttpRequest) -> (HttpRequest, String) {
        request
            .headers
            .insert(ACCEPT, HeaderValue::from_static("application/json"));
        let scope = self.auth_scope().await;
        if let Some((name, value)) = scope.header {
            request.headers.insert(name, value);
        }
        let key = scoped_key(&request.url, scope.fingerprint);
        (request, key)
    }

    /// A transport function yielding the body of a successful response.
    fn body_fetcher(
        &self,
        request: HttpRequest,
    ) -> impl Fn() -> BodyFuture + Send + Sync + 'static {
        let transport = Arc::clone(&self.transport);
        move || {
            let transport = Arc::clone(&transport);
            let request = request.clone();
            async move {
                let response = transport.send(request).await?.error_for_status()?;
                Ok(response.body)
            }
            .boxed()
        }
    }
}

/* ----------------------- Builder ----------------------- */

#[derive(Default)]
pub struct ApiClientBuilder {
    base_url: Option<Url>,
    user_agent: Option<String>,
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    token: Option<String>,
    executor: Option<RequestExecutor>,
    transport: Option<Arc<dyn Transport>>,
}

impl ApiClientBuilder {
    /// Override the API root (e.g., `https://api.example.com/v1/`).
    #[must_use]
    pub fn base_url(mut self, url: Url) -> Self {
        self.base_url = Some(url);
        self
    }

    /// Override the User-Agent.
    #[must_use]
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Set an overall HTTP client timeout. Default: none (the network profile still applies).
    #[must_use]
    pub fn timeout(mut self, dur: Duration) -> Self {
        self.timeout = Some(dur);
        self
    }

    /// Set a connect timeout. Default: none.
    #[must_use]
    pub fn connect_timeout(mut self, dur: Duration) -> Self {
        self.connect_timeout = Some(dur);
        self
    }

    /// Attach `Authorization: Bearer <token>` from the start.
    #[must_use]
    pub fn bearer_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Share an executor (and with it the cache and gate) with other clients.
    #[must_use]
    pub fn executor(mut self, executor: RequestExecutor) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Use a custom transport instead of building a reqwest client.
    /// `user_agent` and the timeouts are ignored in that case.
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// # Errors
    ///
    /// Fails if the default base URL cannot be parsed or the HTTP client cannot be built.
    pub fn build(self) -> Result<ApiClient, FetchError> {
        let mut base_url = match self.base_url {
            Some(url) => url,
            None => Url::parse(DEFAULT_BASE_URL)?,
        };
        // `Url::join` drops the last segment unless the base ends with a slash
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let transport: Arc<dyn Transport> = match self.transport {
            Some(t) => t,
            None => {
                let mut httpb = reqwest::Client::builder()
                    .user_agent(self.user_agent.as_deref().unwrap_or(USER_AGENT));
                if let Some(t) = self.timeout {
                    httpb = httpb.timeout(t);
                }
                if let Some(ct) = self.connect_timeout {
                    httpb = httpb.connect_timeout(ct);
                }
                Arc::new(ReqwestTransport::new(httpb.build()?))
            }
        };

        Ok(ApiClient {
            transport,
            executor: self.executor.unwrap_or_default(),
            base_url,
            token: Arc::new(RwLock::new(self.token)),
        })
    }
}
