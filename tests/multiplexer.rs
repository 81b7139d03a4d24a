//! Scenario tests for the multiplexer against an in-memory mock transport.
//! SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

mod support;

use reqres_mux::{Config, Error, LifecycleState, Multiplexer};
use std::time::Duration;
use support::{MockTransport, Msg};
use tokio_util::sync::CancellationToken;

fn never() -> CancellationToken {
    CancellationToken::new()
}

// S1: single round-trip.
#[tokio::test]
async fn single_round_trip_resolves_with_matching_response() {
    let transport = MockTransport::new(Duration::from_millis(100), Duration::from_millis(100));
    let mux = Multiplexer::new(transport, Config::default()).unwrap();
    mux.start(never()).await.unwrap();

    let response = mux.send(Msg(1), never()).await.unwrap();
    assert_eq!(response, Msg(1));

    mux.stop(never()).await.unwrap();
    assert_eq!(mux.state(), LifecycleState::Stopped);
}

// S2: ten interleaved requests from ten concurrent callers.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn ten_concurrent_requests_all_resolve_to_their_own_response() {
    let transport = MockTransport::new(Duration::from_millis(100), Duration::from_millis(10));
    let mux = std::sync::Arc::new(Multiplexer::new(transport, Config::default()).unwrap());
    mux.start(never()).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..10u128 {
        let mux = std::sync::Arc::clone(&mux);
        handles.push(tokio::spawn(async move { mux.send(Msg(i), never()).await }));
    }
    for (i, handle) in handles.into_iter().enumerate() {
        let response = handle.await.unwrap().unwrap();
        assert_eq!(response, Msg(i as u128));
    }

    mux.stop(never()).await.unwrap();
}

// S3: per-request timeout.
#[tokio::test]
async fn slow_transport_times_out_before_response_arrives() {
    let transport = MockTransport::new(Duration::from_secs(1), Duration::from_secs(1));
    let config = Config {
        request_timeout: Duration::from_millis(100),
        ..Config::default()
    };
    let mux = Multiplexer::new(transport, config).unwrap();
    mux.start(never()).await.unwrap();

    let started = tokio::time::Instant::now();
    let err = mux.send(Msg(1), never()).await.unwrap_err();
    assert!(matches!(err, Error::TimedOut(_)));
    assert!(started.elapsed() < Duration::from_millis(500));
}

// S4: caller cancels mid-flight; multiplexer remains usable afterward.
#[tokio::test]
async fn caller_cancellation_resolves_with_cancelled() {
    let transport = MockTransport::new(Duration::from_millis(500), Duration::from_millis(500));
    let config = Config {
        request_timeout: Duration::from_secs(2),
        ..Config::default()
    };
    let mux = Multiplexer::new(transport, config).unwrap();
    mux.start(never()).await.unwrap();

    let cancel = CancellationToken::new();
    let mux_ref = &mux;
    let cancel_clone = cancel.clone();
    let send = async move { mux_ref.send(Msg(1), cancel_clone).await };
    tokio::pin!(send);

    tokio::select! {
        _ = &mut send => panic!("send resolved before cancellation"),
        () = tokio::time::sleep(Duration::from_millis(100)) => {}
    }
    cancel.cancel();
    let err = send.await.unwrap_err();
    assert!(matches!(err, Error::Cancelled(Some(_))));

    mux.stop(never()).await.unwrap();
}

// S5: forced stop fails every pending send and stop itself.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn forced_stop_fails_all_pending_requests() {
    let transport = MockTransport::new(Duration::from_millis(500), Duration::from_millis(500));
    let mux = std::sync::Arc::new(Multiplexer::new(transport, Config::default()).unwrap());
    mux.start(never()).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..5u128 {
        let mux = std::sync::Arc::clone(&mux);
        handles.push(tokio::spawn(async move { mux.send(Msg(i), never()).await }));
    }
    // Give the sends a moment to register before forcing shutdown.
    tokio::time::sleep(Duration::from_millis(20)).await;

    let already_cancelled = CancellationToken::new();
    already_cancelled.cancel();
    let stop_result = mux.stop(already_cancelled).await;
    assert!(matches!(stop_result, Err(Error::Cancelled(None))));

    for handle in handles {
        let result = handle.await.unwrap();
        assert!(result.is_err());
    }
}

// S6: graceful drain delivers every outstanding response before stop returns.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn graceful_stop_drains_all_outstanding_responses() {
    let transport = MockTransport::new(Duration::from_millis(50), Duration::from_millis(50));
    let mux = std::sync::Arc::new(Multiplexer::new(transport, Config::default()).unwrap());
    mux.start(never()).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..5u128 {
        let mux = std::sync::Arc::clone(&mux);
        handles.push(tokio::spawn(async move { mux.send(Msg(i), never()).await }));
    }

    mux.stop(never()).await.unwrap();

    for (i, handle) in handles.into_iter().enumerate() {
        let response = handle.await.unwrap().unwrap();
        assert_eq!(response, Msg(i as u128));
    }
}

// S7: duplicate request ids are rejected without touching the transport.
#[tokio::test]
async fn duplicate_request_id_is_rejected() {
    let transport = MockTransport::new(Duration::from_millis(200), Duration::from_millis(200));
    let mux = std::sync::Arc::new(Multiplexer::new(transport, Config::default()).unwrap());
    mux.start(never()).await.unwrap();

    let first_mux = std::sync::Arc::clone(&mux);
    let first = tokio::spawn(async move { first_mux.send(Msg(7), never()).await });
    // Give the first send time to register its pending entry.
    tokio::time::sleep(Duration::from_millis(20)).await;

    let second = mux.send(Msg(7), never()).await;
    assert!(matches!(second, Err(Error::DuplicateRequestId(_))));

    let first_result = first.await.unwrap();
    assert!(first_result.is_ok());

    mux.stop(never()).await.unwrap();
}

// S8: a channel-fatal transport failure fails every outstanding request.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn transport_read_failure_fails_all_pending_requests() {
    let transport = std::sync::Arc::new(MockTransport::new(
        Duration::from_millis(20),
        Duration::from_millis(500),
    ));
    // `Multiplexer` takes ownership of the transport, so keep our own handle
    // to trigger the failure by wrapping it in a thin passthrough.
    struct Shared(std::sync::Arc<MockTransport>);

    #[async_trait::async_trait]
    impl reqres_mux::Transport for Shared {
        type Request = Msg;
        type Response = Msg;
        type Error = support::MockError;

        async fn read(
            &self,
            cancel: &CancellationToken,
        ) -> Result<Msg, reqres_mux::ReadError<support::MockError>> {
            self.0.read(cancel).await
        }

        async fn write(
            &self,
            request: &Msg,
            cancel: &CancellationToken,
        ) -> Result<(), reqres_mux::WriteError<support::MockError>> {
            self.0.write(request, cancel).await
        }
    }

    let handle_for_failure = std::sync::Arc::clone(&transport);
    let mux = std::sync::Arc::new(Multiplexer::new(Shared(transport), Config::default()).unwrap());
    mux.start(never()).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..3u128 {
        let mux = std::sync::Arc::clone(&mux);
        handles.push(tokio::spawn(async move { mux.send(Msg(i), never()).await }));
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    handle_for_failure.fail_reads_from_now_on();

    for handle in handles {
        let result = handle.await.unwrap();
        assert!(matches!(result, Err(Error::Transport(_))));
    }

    // The multiplexer noticed the dead channel on its own; a subsequent stop
    // completes without erroring.
    mux.stop(never()).await.unwrap();
}
