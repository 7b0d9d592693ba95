//! The HTTP capability the pipeline runs on.
//!
//! The executor never talks to an HTTP client directly: it calls transport functions, and the
//! [`ApiClient`](crate::ApiClient) builds those on top of a [`Transport`]. Any client can be
//! plugged in; [`ReqwestTransport`] is the default. Dropping the future returned by
//! [`Transport::send`] aborts the request, which is how timeouts and cancellation reach it.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue, RETRY_AFTER};
use reqwest::{Client, Method};
use url::Url;

use crate::core::{TransportError, parse_retry_after};

/// A request as the transport sees it.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<String>,
    /// Per-request deadline enforced by the HTTP client itself.
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// Sets a JSON body and the matching content type.
    #[must_use]
    pub fn json_body(mut self, body: String) -> Self {
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.body = Some(body);
        self
    }
}

/// A response with its body read to completion.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
}

impl HttpResponse {
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The `Retry-After` header, parsed.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        self.headers
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after)
    }

    /// Turns a non-2xx response into a [`TransportError::Status`], keeping the body for
    /// classification hints.
    pub fn error_for_status(self) -> Result<Self, TransportError> {
        if self.is_success() {
            return Ok(self);
        }
        Err(TransportError::Status {
            status: self.status,
            retry_after: self.retry_after(),
            body: Some(self.body),
        })
    }
}

/// Sends HTTP requests on behalf of the pipeline.
///
/// Implemented by [`ReqwestTransport`]; tests and hosts with their own HTTP stack can supply
/// another implementation.
pub trait Transport: Send + Sync {
    /// Performs the request. Unsuccessful statuses are returned as responses, not errors.
    fn send<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, TransportError>> + Send + 'a>>;
}

/// A [`Transport`] over a `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: Client,
}

impl ReqwestTransport {
    pub fn new(http: Client) -> Self {
        Self { http }
    }
}

impl Transport for ReqwestTransport {
    fn send<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, TransportError>> + Send + 'a>> {
        Box::pin(async move {
            let mut req = self
                .http
                .request(request.method, request.url)
                .headers(request.headers);
            if let Some(body) = request.body {
                req = req.body(body);
            }
            if let Some(timeout) = request.timeout {
                req = req.timeout(timeout);
            }

            let resp = req.send().await?;
            let status = resp.status().as_u16();
            let headers = resp.headers().clone();
            let body = resp.text().await?;

            Ok(HttpResponse {
                status,
                headers,
                body,
            })
        })
    }
}
