#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use cinefetch::{BackoffPolicy, RequestExecutor, TransportError};
use futures::FutureExt;
use futures::future::BoxFuture;

pub type Attempt<T> = BoxFuture<'static, Result<T, TransportError>>;

/// Counts transport invocations.
#[derive(Clone, Default)]
pub struct Calls(Arc<AtomicUsize>);

impl Calls {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    pub fn bump(&self) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst)
    }
}

/// A transport function that always succeeds with `value` after `delay`.
pub fn ok_after<T>(calls: &Calls, value: T, delay: Duration) -> impl Fn() -> Attempt<T> + Send + Sync + 'static
where
    T: Clone + Send + Sync + 'static,
{
    let calls = calls.clone();
    move || {
        calls.bump();
        let value = value.clone();
        async move {
            tokio::time::sleep(delay).await;
            Ok(value)
        }
        .boxed()
    }
}

/// A transport function that answers the n-th call with `script[n]`, repeating the last entry.
pub fn scripted<T>(calls: &Calls, script: Vec<Result<T, TransportError>>) -> impl Fn() -> Attempt<T> + Send + Sync + 'static
where
    T: Clone + Send + Sync + 'static,
{
    assert!(!script.is_empty());
    let calls = calls.clone();
    move || {
        let n = calls.bump().min(script.len() - 1);
        let outcome = script[n].clone();
        async move { outcome }.boxed()
    }
}

pub fn status(code: u16) -> TransportError {
    TransportError::Status {
        status: code,
        retry_after: None,
        body: None,
    }
}

pub fn reset() -> TransportError {
    TransportError::Connect("connection reset by peer".into())
}

/// Millisecond backoff so retry tests stay fast.
pub fn quick_backoff() -> BackoffPolicy {
    BackoffPolicy::fixed_base(Duration::from_millis(10), Duration::from_millis(100))
}

pub fn executor() -> RequestExecutor {
    RequestExecutor::builder().backoff(quick_backoff()).build()
}
