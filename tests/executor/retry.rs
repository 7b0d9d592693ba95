use std::sync::Arc;
use std::time::Duration;

use cinefetch::{
    BackoffPolicy, ErrorKind, NetworkSignals, RequestExecutor, RequestOptions, RetryConfig, StaticSignals,
    TransportError,
};
use tokio::time::Instant;

use crate::common::{Calls, executor, ok_after, quick_backoff, reset, scripted, status};

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried_until_success() {
    let exec = RequestExecutor::builder()
        .backoff(quick_backoff())
        .max_retries(3)
        .build();
    let calls = Calls::default();
    let transport = scripted(&calls, vec![Err(reset()), Err(reset()), Ok("payload")]);

    let fetched = exec
        .request("k", transport, RequestOptions::new())
        .await
        .unwrap();

    assert_eq!(fetched.data, "payload");
    assert_eq!(calls.get(), 3);
    let counters = exec.stats().requests;
    assert_eq!(counters.retries, 2);
    assert_eq!(counters.network_attempts, 3);
    assert_eq!(counters.failures, 0);
}

#[tokio::test(start_paused = true)]
async fn auth_errors_fail_immediately() {
    let exec = executor();
    let calls = Calls::default();

    let err = exec
        .request("k", scripted::<u8>(&calls, vec![Err(status(401))]), RequestOptions::new())
        .await
        .unwrap_err();

    assert_eq!(calls.get(), 1);
    assert_eq!(err.kind, ErrorKind::AuthError);
    assert!(!err.retryable);
    assert_eq!(err.status, Some(401));
}

#[tokio::test(start_paused = true)]
async fn retries_stop_at_the_configured_budget() {
    let exec = RequestExecutor::builder()
        .backoff(quick_backoff())
        .max_retries(2)
        .build();
    let calls = Calls::default();

    let err = exec
        .request("k", scripted::<u8>(&calls, vec![Err(status(503))]), RequestOptions::new())
        .await
        .unwrap_err();

    assert_eq!(calls.get(), 3);
    assert_eq!(err.kind, ErrorKind::ServiceUnavailable);
    assert_eq!(exec.stats().requests.failures, 1);
}

#[tokio::test(start_paused = true)]
async fn unknown_failures_are_retried_once() {
    let exec = executor();
    let calls = Calls::default();

    let err = exec
        .request("k", scripted::<u8>(&calls, vec![Err(status(500))]), RequestOptions::new())
        .await
        .unwrap_err();

    assert_eq!(calls.get(), 2);
    assert_eq!(err.kind, ErrorKind::Unknown);
}

#[tokio::test(start_paused = true)]
async fn slow_attempts_time_out_per_profile() {
    let exec = RequestExecutor::builder()
        .backoff(quick_backoff())
        .max_retries(1)
        .build();
    let calls = Calls::default();
    let profile_timeout = exec.network_profile().timeout;

    let started = Instant::now();
    let err = exec
        .request(
            "k",
            ok_after(&calls, 1u8, Duration::from_secs(600)),
            RequestOptions::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Timeout);
    assert_eq!(calls.get(), 2);
    assert!(started.elapsed() >= profile_timeout * 2);
    assert!(started.elapsed() < Duration::from_secs(600));
}

#[tokio::test(start_paused = true)]
async fn slow_networks_get_a_larger_budget() {
    let signals = Arc::new(StaticSignals::new(NetworkSignals {
        effective_type: Some("2g".into()),
        ..NetworkSignals::default()
    }));
    let exec = RequestExecutor::builder()
        .backoff(quick_backoff())
        .signal_source(signals)
        .build();
    let calls = Calls::default();
    let budget = exec.network_profile().max_retries as usize;

    let err = exec
        .request("k", scripted::<u8>(&calls, vec![Err(reset())]), RequestOptions::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::ConnectionReset);
    assert_eq!(calls.get(), budget + 1);
    assert_eq!(budget, 4);
}

#[tokio::test(start_paused = true)]
async fn retries_can_be_disabled() {
    let exec = RequestExecutor::builder().retry_enabled(false).build();
    let calls = Calls::default();

    let err = exec
        .request("k", scripted::<u8>(&calls, vec![Err(reset())]), RequestOptions::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::ConnectionReset);
    assert_eq!(calls.get(), 1);
}

#[tokio::test(start_paused = true)]
async fn per_call_policy_overrides_the_executor() {
    let exec = executor();
    let calls = Calls::default();
    let policy = RetryConfig {
        max_retries: Some(0),
        ..RetryConfig::default()
    };

    let result = exec
        .request(
            "k",
            scripted::<u8>(&calls, vec![Err(TransportError::Timeout), Ok(1)]),
            RequestOptions::new().retry_policy(Some(policy)),
        )
        .await;

    assert!(result.is_err());
    assert_eq!(calls.get(), 1);
}

#[tokio::test(start_paused = true)]
async fn rate_limits_wait_for_the_server_hint() {
    let exec = RequestExecutor::builder()
        .backoff(BackoffPolicy::fixed_base(
            Duration::from_millis(10),
            Duration::from_secs(30),
        ))
        .build();
    let calls = Calls::default();
    let limited = TransportError::Status {
        status: 429,
        retry_after: Some(Duration::from_secs(3)),
        body: None,
    };

    let started = Instant::now();
    let fetched = exec
        .request("k", scripted(&calls, vec![Err(limited), Ok(7u8)]), RequestOptions::new())
        .await
        .unwrap();

    assert_eq!(fetched.data, 7);
    assert!(started.elapsed() >= Duration::from_secs(3));
    assert_eq!(calls.get(), 2);
}

#[tokio::test(start_paused = true)]
async fn retries_keep_their_gate_slot_through_backoff() {
    let signals = Arc::new(StaticSignals::new(NetworkSignals {
        effective_type: Some("2g".into()),
        ..NetworkSignals::default()
    }));
    let exec = RequestExecutor::builder()
        .backoff(quick_backoff())
        .signal_source(signals)
        .build();
    assert_eq!(exec.network_profile().max_concurrent, 2);

    let flaky_calls = Calls::default();
    let started = Instant::now();
    let flaky = exec.spawn_request(
        "flaky",
        scripted(&flaky_calls, vec![Err(reset()), Ok("recovered")]),
        RequestOptions::new(),
    );
    while flaky_calls.get() == 0 {
        tokio::task::yield_now().await;
    }
    // first attempt failed; the request is now sleeping out its backoff
    assert_eq!(exec.gate().stats().active, 1);

    let slow_calls = Calls::default();
    let slow_b = exec.spawn_request("b", ok_after(&slow_calls, 1u8, Duration::from_secs(5)), RequestOptions::new());
    let slow_c = exec.spawn_request("c", ok_after(&slow_calls, 2u8, Duration::from_secs(5)), RequestOptions::new());

    let fetched = flaky.result().await.unwrap();
    assert_eq!(fetched.data, "recovered");
    assert_eq!(flaky_calls.get(), 2);
    assert!(started.elapsed() < Duration::from_secs(1));

    assert_eq!(slow_b.result().await.unwrap().data, 1);
    assert_eq!(slow_c.result().await.unwrap().data, 2);
    assert_eq!(slow_calls.get(), 2);
}
