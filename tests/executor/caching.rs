use std::time::Duration;

use cinefetch::{CacheMode, ErrorKind, Invalidate, RequestOptions, RetryConfig};

use crate::common::{Calls, executor, ok_after, scripted, status};

const TTL: Duration = Duration::from_millis(100);

fn short_ttl() -> RequestOptions {
    RequestOptions::new().ttl(TTL)
}

/// Lets background refreshes run to completion.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[tokio::test(start_paused = true)]
async fn second_call_is_served_from_cache() {
    let exec = executor();
    let calls = Calls::default();

    let first = exec
        .request("trending", ok_after(&calls, 1u32, Duration::ZERO), short_ttl())
        .await
        .unwrap();
    let second = exec
        .request("trending", ok_after(&calls, 2u32, Duration::ZERO), short_ttl())
        .await
        .unwrap();

    assert!(!first.from_cache);
    assert!(second.from_cache && !second.stale);
    assert_eq!(second.data, 1);
    assert_eq!(calls.get(), 1);
    assert_eq!(exec.stats().requests.cache_hits, 1);
}

#[tokio::test(start_paused = true)]
async fn expired_entries_are_refetched() {
    let exec = executor();
    let calls = Calls::default();

    exec.request("k", ok_after(&calls, 1u32, Duration::ZERO), short_ttl())
        .await
        .unwrap();
    tokio::time::advance(TTL + Duration::from_millis(50)).await;
    let again = exec
        .request("k", ok_after(&calls, 2u32, Duration::ZERO), short_ttl())
        .await
        .unwrap();

    assert_eq!(again.data, 2);
    assert!(!again.from_cache);
    assert_eq!(calls.get(), 2);
}

#[tokio::test(start_paused = true)]
async fn stale_data_is_served_while_revalidating() {
    let exec = executor();
    let calls = Calls::default();
    let options = || short_ttl().stale_while_revalidate(true);

    exec.request("k", scripted(&calls, vec![Ok("v1"), Ok("v2")]), options())
        .await
        .unwrap();
    tokio::time::advance(TTL + Duration::from_millis(50)).await;

    let stale = exec
        .request("k", scripted(&calls, vec![Ok("v2")]), options())
        .await
        .unwrap();
    assert_eq!(stale.data, "v1");
    assert!(stale.from_cache && stale.stale);

    settle().await;
    let refreshed = exec.cache().peek("k", "default").unwrap();
    assert_eq!(refreshed.value.downcast_ref::<&str>(), Some(&"v2"));
    assert!(refreshed.is_fresh());

    let counters = exec.stats().requests;
    assert_eq!(counters.stale_served, 1);
    assert_eq!(counters.background_refreshes, 1);
    assert_eq!(counters.requests, 2);
    assert_eq!(counters.network_attempts, 2);
}

#[tokio::test(start_paused = true)]
async fn background_refresh_failures_keep_the_old_value() {
    let exec = executor();
    let calls = Calls::default();
    let options = || short_ttl().stale_while_revalidate(true);

    exec.request("k", scripted(&calls, vec![Ok(1u8)]), options())
        .await
        .unwrap();
    tokio::time::advance(TTL * 2).await;

    let served = exec
        .request("k", scripted::<u8>(&calls, vec![Err(status(404))]), options())
        .await
        .unwrap();
    assert_eq!(served.data, 1);

    settle().await;
    assert_eq!(exec.stats().requests.failures, 1);
    assert_eq!(exec.cache().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn stale_on_error_falls_back_to_cached_data() {
    let exec = executor();
    let calls = Calls::default();
    let no_retry = Some(RetryConfig::disabled());

    exec.request("k", scripted(&calls, vec![Ok("cached")]), short_ttl())
        .await
        .unwrap();
    tokio::time::advance(TTL * 2).await;

    let fetched = exec
        .request(
            "k",
            scripted::<&str>(&calls, vec![Err(status(503))]),
            short_ttl().stale_on_error(true).retry_policy(no_retry.clone()),
        )
        .await
        .unwrap();
    assert_eq!(fetched.data, "cached");
    assert!(fetched.stale && fetched.from_cache);
    assert_eq!(fetched.error.unwrap().kind, ErrorKind::ServiceUnavailable);

    let err = exec
        .request(
            "k",
            scripted::<&str>(&calls, vec![Err(status(503))]),
            short_ttl().retry_policy(no_retry),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::ServiceUnavailable);
}

#[tokio::test(start_paused = true)]
async fn force_refresh_skips_a_fresh_entry() {
    let exec = executor();
    let calls = Calls::default();

    exec.request("k", ok_after(&calls, 1u8, Duration::ZERO), RequestOptions::new())
        .await
        .unwrap();
    let refreshed = exec
        .request(
            "k",
            ok_after(&calls, 2u8, Duration::ZERO),
            RequestOptions::new().force_refresh(true),
        )
        .await
        .unwrap();

    assert_eq!(refreshed.data, 2);
    assert!(!refreshed.from_cache);
    assert_eq!(calls.get(), 2);

    let cached = exec
        .request("k", ok_after(&calls, 3u8, Duration::ZERO), RequestOptions::new())
        .await
        .unwrap();
    assert_eq!(cached.data, 2);
}

#[tokio::test(start_paused = true)]
async fn bypass_and_zero_ttl_do_not_write_the_cache() {
    let exec = executor();
    let calls = Calls::default();

    exec.request(
        "a",
        ok_after(&calls, 1u8, Duration::ZERO),
        RequestOptions::new().cache_mode(CacheMode::Bypass),
    )
    .await
    .unwrap();
    exec.request(
        "b",
        ok_after(&calls, 1u8, Duration::ZERO),
        RequestOptions::new().ttl(Duration::ZERO),
    )
    .await
    .unwrap();

    assert!(exec.cache().is_empty());
}

#[tokio::test(start_paused = true)]
async fn reusing_a_key_for_another_type_is_an_error() {
    let exec = executor();
    let calls = Calls::default();

    exec.request("k", ok_after(&calls, 1u8, Duration::ZERO), RequestOptions::new())
        .await
        .unwrap();
    let err = exec
        .request(
            "k",
            ok_after(&calls, String::from("x"), Duration::ZERO),
            RequestOptions::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Unknown);
    assert!(!err.retryable);
}

#[tokio::test(start_paused = true)]
async fn invalidation_targets_keys_namespaces_or_everything() {
    let exec = executor();
    let calls = Calls::default();
    for (key, ns) in [("1", "movies"), ("2", "movies"), ("1", "tv"), ("x", "default")] {
        exec.request(
            key,
            ok_after(&calls, 0u8, Duration::ZERO),
            RequestOptions::new().namespace(ns),
        )
        .await
        .unwrap();
    }
    assert_eq!(exec.cache().len(), 4);

    exec.invalidate(Invalidate::key("x"));
    assert!(exec.cache().peek("x", "default").is_none());

    exec.invalidate(Invalidate::namespace("movies"));
    assert_eq!(exec.cache().len(), 1);
    assert!(exec.cache().peek("1", "tv").is_some());

    exec.invalidate(Invalidate::All);
    assert!(exec.cache().is_empty());
}
