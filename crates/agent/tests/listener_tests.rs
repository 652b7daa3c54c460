//! Integration tests for UDP telemetry ingestion.
//!
//! Binds the listener on an ephemeral loopback port and pushes real
//! datagrams at it.

use std::net::SocketAddr;
use std::time::Duration;

use forkwatch_agent::listener::{TelemetryListener, RECV_TIMEOUT};
use forkwatch_core::telemetry::{self, TelemetryReader, TelemetryReading};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

async fn start() -> (
    SocketAddr,
    TelemetryReader,
    CancellationToken,
    tokio::task::JoinHandle<()>,
) {
    let (writer, reader) = telemetry::channel(Duration::from_secs(2));
    let listener = TelemetryListener::bind("127.0.0.1:0".parse().unwrap(), writer)
        .await
        .expect("bind should succeed");
    let addr = listener.local_addr().unwrap();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(listener.run(cancel.clone()));
    (addr, reader, cancel, handle)
}

/// Poll the reader until `predicate` holds or two seconds pass.
async fn wait_for(
    reader: &TelemetryReader,
    predicate: impl Fn(&TelemetryReading) -> bool,
) -> TelemetryReading {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let reading = reader.read();
            if predicate(&reading) {
                return reading;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("telemetry did not arrive in time")
}

// ---------------------------------------------------------------------------
// Test: datagrams update the shared telemetry
// ---------------------------------------------------------------------------

/// A well-formed packet sets both readings and marks the data fresh.
#[tokio::test]
async fn datagram_updates_both_readings() {
    let (addr, reader, cancel, handle) = start().await;
    assert!(!reader.read().fresh, "no data received yet");

    let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    sender.send_to(b"D1:45.3,D2:67.8\n", addr).await.unwrap();

    let reading = wait_for(&reader, |r| r.distance_1_cm == 45.3).await;
    assert_eq!(reading.distance_2_cm, 67.8);
    assert!(reading.fresh);

    cancel.cancel();
    handle.await.unwrap();
}

/// Partial and garbage packets keep last-known values and never stop the
/// listener.
#[tokio::test]
async fn partial_and_garbage_datagrams_keep_prior_values() {
    let (addr, reader, cancel, handle) = start().await;
    let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    sender.send_to(b"D1:45.3,D2:67.8", addr).await.unwrap();
    wait_for(&reader, |r| r.distance_2_cm == 67.8).await;

    sender.send_to(b"garbage", addr).await.unwrap();
    sender.send_to(&[0xff, 0xfe, 0x00], addr).await.unwrap();
    sender.send_to(b"D1:20.0", addr).await.unwrap();

    let reading = wait_for(&reader, |r| r.distance_1_cm == 20.0).await;
    assert_eq!(reading.distance_2_cm, 67.8);

    assert!(!handle.is_finished(), "listener must survive bad input");
    cancel.cancel();
    handle.await.unwrap();
}

// ---------------------------------------------------------------------------
// Test: shutdown and startup failures
// ---------------------------------------------------------------------------

/// Cancellation is observed within one receive timeout on a silent link.
#[tokio::test]
async fn stops_promptly_when_cancelled() {
    let (_addr, _reader, cancel, handle) = start().await;

    cancel.cancel();
    tokio::time::timeout(RECV_TIMEOUT + Duration::from_millis(500), handle)
        .await
        .expect("listener should stop within one receive timeout")
        .unwrap();
}

/// Binding a port that is already taken is reported as an error, not a
/// panic.
#[tokio::test]
async fn bind_conflict_is_an_error() {
    let taken = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = taken.local_addr().unwrap();
    let (writer, _reader) = telemetry::channel(Duration::from_secs(2));

    let result = TelemetryListener::bind(addr, writer).await;
    assert!(result.is_err());
}
