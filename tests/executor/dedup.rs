use std::time::Duration;

use cinefetch::{ErrorKind, RequestOptions, RetryConfig, TransportError};
use futures::FutureExt;

use crate::common::{Calls, executor, ok_after, status};

const LATENCY: Duration = Duration::from_millis(100);

#[tokio::test(start_paused = true)]
async fn concurrent_identical_requests_share_one_call() {
    let exec = executor();
    let calls = Calls::default();

    let (a, b, c) = tokio::join!(
        exec.request("movie:42", ok_after(&calls, 42u32, LATENCY), RequestOptions::new()),
        exec.request("movie:42", ok_after(&calls, 42u32, LATENCY), RequestOptions::new()),
        exec.request("movie:42", ok_after(&calls, 42u32, LATENCY), RequestOptions::new()),
    );

    assert_eq!(calls.get(), 1);
    for fetched in [a, b, c] {
        assert_eq!(fetched.unwrap().data, 42);
    }
    assert_eq!(exec.stats().requests.deduplicated, 2);
    assert!(exec.in_flight().is_empty());
}

#[tokio::test(start_paused = true)]
async fn joined_callers_receive_the_same_error() {
    let exec = executor();
    let calls = Calls::default();
    let failing = || {
        let calls = calls.clone();
        move || {
            calls.bump();
            async {
                tokio::time::sleep(LATENCY).await;
                Err::<u32, _>(status(404))
            }
            .boxed()
        }
    };

    let (a, b) = tokio::join!(
        exec.request("missing", failing(), RequestOptions::new()),
        exec.request("missing", failing(), RequestOptions::new()),
    );

    assert_eq!(calls.get(), 1);
    let (a, b) = (a.unwrap_err(), b.unwrap_err());
    assert_eq!(a.kind, ErrorKind::ClientError);
    assert_eq!(a, b);
}

#[tokio::test(start_paused = true)]
async fn namespaces_are_deduplicated_separately() {
    let exec = executor();
    let calls = Calls::default();

    let (a, b) = tokio::join!(
        exec.request("42", ok_after(&calls, "movie", LATENCY), RequestOptions::new().namespace("movies")),
        exec.request("42", ok_after(&calls, "show", LATENCY), RequestOptions::new().namespace("tv")),
    );

    assert_eq!(calls.get(), 2);
    assert_eq!(a.unwrap().data, "movie");
    assert_eq!(b.unwrap().data, "show");
}

#[tokio::test(start_paused = true)]
async fn dedupe_can_be_disabled_per_call() {
    let exec = executor();
    let calls = Calls::default();
    let options = || RequestOptions::new().dedupe(false);

    let (a, b) = tokio::join!(
        exec.request("rate", ok_after(&calls, 1u8, LATENCY), options()),
        exec.request("rate", ok_after(&calls, 1u8, LATENCY), options()),
    );

    assert!(a.is_ok() && b.is_ok());
    assert_eq!(calls.get(), 2);
    assert_eq!(exec.stats().requests.deduplicated, 0);
}

#[tokio::test(start_paused = true)]
async fn settled_requests_leave_the_registry() {
    let exec = executor();
    let calls = Calls::default();
    let no_cache = || RequestOptions::new().ttl(Duration::ZERO);

    exec.request("k", ok_after(&calls, 1u8, LATENCY), no_cache())
        .await
        .unwrap();
    assert!(exec.in_flight().is_empty());

    exec.request("k", ok_after(&calls, 1u8, LATENCY), no_cache())
        .await
        .unwrap();
    assert_eq!(calls.get(), 2);
}

#[tokio::test(start_paused = true)]
async fn failed_requests_leave_the_registry_too() {
    let exec = executor();
    let calls = Calls::default();
    let options = RequestOptions::new().retry_policy(Some(RetryConfig::disabled()));
    let fail = {
        let calls = calls.clone();
        move || {
            calls.bump();
            async { Err::<u8, _>(TransportError::Timeout) }.boxed()
        }
    };

    assert!(exec.request("k", fail, options).await.is_err());
    assert!(exec.in_flight().is_empty());
    assert_eq!(calls.get(), 1);
}
