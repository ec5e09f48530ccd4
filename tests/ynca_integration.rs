//! YNCA client integration tests
//!
//! Runs the adapter against a mock receiver (a plain TCP listener
//! speaking the line protocol) and verifies:
//! - End-to-end framing → parsing → reducer flow over a real socket
//! - Bus event emission in arrival order
//! - Keepalive pings on the wire
//! - Reconnection after connection loss and after refused connects
//! - Serialized command writes under concurrency

use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::time::timeout;

use ynca_bridge::adapters::ynca::YncaAdapter;
use ynca_bridge::bus::{create_bus, BusEvent, SharedBus};
use ynca_bridge::config::ReceiverConfig;
use ynca_bridge::state::{InputSource, PlayStatus};

// =============================================================================
// Test utilities
// =============================================================================

fn test_config(port: u16) -> ReceiverConfig {
    ReceiverConfig {
        host: "127.0.0.1".to_string(),
        port,
        connect_timeout_ms: 1000,
        ping_command: "@MAIN:PWR=?".to_string(),
        // Long interval so the derived idle timeout and periodic pings
        // stay out of the way unless a test wants them.
        ping_interval_ms: 60_000,
        strict_parsing: true,
    }
}

async fn start_mock_receiver() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

fn start_adapter(config: ReceiverConfig) -> (Arc<YncaAdapter>, SharedBus) {
    let bus = create_bus();
    let adapter = Arc::new(YncaAdapter::new(config, bus.clone()));
    adapter.start();
    (adapter, bus)
}

/// Wait for an event matching the predicate, ignoring others.
async fn expect_event<F>(
    rx: &mut broadcast::Receiver<BusEvent>,
    predicate: F,
    timeout_ms: u64,
) -> Option<BusEvent>
where
    F: Fn(&BusEvent) -> bool,
{
    timeout(Duration::from_millis(timeout_ms), async {
        loop {
            match rx.recv().await {
                Ok(event) if predicate(&event) => return Some(event),
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
    })
    .await
    .unwrap_or(None)
}

// =============================================================================
// End-to-end flow
// =============================================================================

#[tokio::test]
async fn messages_flow_end_to_end() {
    let (listener, port) = start_mock_receiver().await;
    let (adapter, bus) = start_adapter(test_config(port));
    let mut rx = bus.subscribe();

    let (mut socket, _) = listener.accept().await.unwrap();

    // Split across writes mid-line to exercise framing over the socket.
    socket.write_all(b"@SPOTIFY:ARTIST=Daft").await.unwrap();
    socket
        .write_all(b" Punk\r\n@SPOTIFY:PLAYBACKINFO=Play\r\n")
        .await
        .unwrap();

    let first = expect_event(&mut rx, |e| matches!(e, BusEvent::Message { .. }), 2000)
        .await
        .expect("first message");
    match first {
        BusEvent::Message { message } => {
            assert_eq!(message.sub_unit, "SPOTIFY");
            assert_eq!(message.function, "ARTIST");
            assert_eq!(message.value, "Daft Punk");
            assert_eq!(message.raw, "@SPOTIFY:ARTIST=Daft Punk");
        }
        _ => unreachable!(),
    }

    expect_event(
        &mut rx,
        |e| matches!(e, BusEvent::NowPlayingChanged { .. }),
        2000,
    )
    .await
    .expect("state change");

    let state = adapter.now_playing().await;
    assert_eq!(state.status, PlayStatus::Playing);
    assert_eq!(state.input, InputSource::Spotify);
    assert_eq!(state.media.artist, "Daft Punk");

    adapter.stop().await;
}

#[tokio::test]
async fn connected_event_carries_endpoint() {
    let (listener, port) = start_mock_receiver().await;
    let (adapter, bus) = start_adapter(test_config(port));
    let mut rx = bus.subscribe();

    let (_socket, _) = listener.accept().await.unwrap();

    let event = expect_event(
        &mut rx,
        |e| matches!(e, BusEvent::ReceiverConnected { .. }),
        2000,
    )
    .await
    .expect("connected event");
    match event {
        BusEvent::ReceiverConnected { host, port: p } => {
            assert_eq!(host, "127.0.0.1");
            assert_eq!(p, port);
        }
        _ => unreachable!(),
    }
    assert!(adapter.is_connected());

    adapter.stop().await;
}

#[tokio::test]
async fn unknown_messages_do_not_change_state() {
    let (listener, port) = start_mock_receiver().await;
    let (adapter, bus) = start_adapter(test_config(port));
    let mut rx = bus.subscribe();

    let (mut socket, _) = listener.accept().await.unwrap();
    socket
        .write_all(b"@MAIN:PWR=On\r\n@SYS:VERSION=1.80\r\n")
        .await
        .unwrap();

    // Both lines are valid and published raw...
    for _ in 0..2 {
        expect_event(&mut rx, |e| matches!(e, BusEvent::Message { .. }), 2000)
            .await
            .expect("raw message");
    }

    // ...but neither touches the snapshot.
    let state = adapter.now_playing().await;
    assert_eq!(state.status, PlayStatus::Standby);
    assert_eq!(state.input, InputSource::Other);

    adapter.stop().await;
}

// =============================================================================
// Keepalive
// =============================================================================

#[tokio::test]
async fn keepalive_pings_arrive_on_the_wire() {
    let (listener, port) = start_mock_receiver().await;
    let mut config = test_config(port);
    config.ping_interval_ms = 100;
    let (adapter, _bus) = start_adapter(config);

    let (socket, _) = listener.accept().await.unwrap();
    let (read_half, mut write_half) = socket.into_split();
    let mut reader = BufReader::new(read_half);

    // Keep the peer chatty so the 200ms idle timeout never fires.
    tokio::spawn(async move {
        loop {
            if write_half.write_all(b"@MAIN:PWR=On\r\n").await.is_err() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    });

    let mut line = String::new();
    timeout(Duration::from_millis(2000), reader.read_line(&mut line))
        .await
        .expect("ping within two intervals")
        .unwrap();
    assert_eq!(line.trim_end(), "@MAIN:PWR=?");

    // And it repeats.
    line.clear();
    timeout(Duration::from_millis(2000), reader.read_line(&mut line))
        .await
        .expect("second ping")
        .unwrap();
    assert_eq!(line.trim_end(), "@MAIN:PWR=?");

    adapter.stop().await;
}

// =============================================================================
// Reconnection
// =============================================================================

#[tokio::test]
async fn reconnects_after_peer_closes() {
    let (listener, port) = start_mock_receiver().await;
    let (adapter, bus) = start_adapter(test_config(port));
    let mut rx = bus.subscribe();

    let (mut socket, _) = listener.accept().await.unwrap();
    socket
        .write_all(b"@AIRPLAY:PLAYBACKINFO=Play\r\n")
        .await
        .unwrap();
    expect_event(
        &mut rx,
        |e| matches!(e, BusEvent::NowPlayingChanged { .. }),
        2000,
    )
    .await
    .expect("state change before disconnect");

    // Peer drops the connection.
    drop(socket);

    expect_event(
        &mut rx,
        |e| matches!(e, BusEvent::ReceiverDisconnected { .. }),
        2000,
    )
    .await
    .expect("disconnected event");

    // Last known state still served while down.
    let state = adapter.now_playing().await;
    assert_eq!(state.status, PlayStatus::Playing);
    assert_eq!(state.input, InputSource::AirPlay);

    // One flat reconnect interval later the client is back.
    let (_socket2, _) = timeout(Duration::from_millis(3000), listener.accept())
        .await
        .expect("reconnect within the fixed interval")
        .unwrap();
    expect_event(
        &mut rx,
        |e| matches!(e, BusEvent::ReceiverConnected { .. }),
        2000,
    )
    .await
    .expect("reconnected event");

    adapter.stop().await;
}

#[tokio::test]
async fn retries_refused_connects_until_server_appears() {
    // Reserve a port, then free it so connects are refused.
    let (listener, port) = start_mock_receiver().await;
    drop(listener);

    let (adapter, bus) = start_adapter(test_config(port));
    let mut rx = bus.subscribe();

    // Let a couple of refused attempts happen.
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(!adapter.is_connected());

    // Server comes up; the flat retry finds it.
    let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
    timeout(Duration::from_millis(5000), listener.accept())
        .await
        .expect("connect after server appears")
        .unwrap();
    expect_event(
        &mut rx,
        |e| matches!(e, BusEvent::ReceiverConnected { .. }),
        2000,
    )
    .await
    .expect("connected event");

    adapter.stop().await;
}

#[tokio::test]
async fn malformed_line_forces_reconnect_in_strict_mode() {
    let (listener, port) = start_mock_receiver().await;
    let (adapter, bus) = start_adapter(test_config(port));
    let mut rx = bus.subscribe();

    let (mut socket, _) = listener.accept().await.unwrap();
    socket.write_all(b"not a protocol line\r\n").await.unwrap();

    expect_event(
        &mut rx,
        |e| matches!(e, BusEvent::ReceiverDisconnected { .. }),
        2000,
    )
    .await
    .expect("grammar error tears the connection down");

    // And the client comes back for a resync.
    timeout(Duration::from_millis(3000), listener.accept())
        .await
        .expect("reconnect after grammar error")
        .unwrap();

    adapter.stop().await;
}

// =============================================================================
// Command channel
// =============================================================================

#[tokio::test]
async fn concurrent_sends_are_never_interleaved() {
    let (listener, port) = start_mock_receiver().await;
    let (adapter, _bus) = start_adapter(test_config(port));

    let (socket, _) = listener.accept().await.unwrap();
    let mut reader = BufReader::new(socket);

    // Wait until the writer is installed.
    timeout(Duration::from_millis(2000), async {
        while !adapter.is_connected() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    // Two senders racing with long payloads.
    const PER_TASK: usize = 50;
    let a_payload = format!("@ZONEA:TEST={}", "a".repeat(300));
    let b_payload = format!("@ZONEB:TEST={}", "b".repeat(300));

    let sender_a = {
        let adapter = adapter.clone();
        let payload = a_payload.clone();
        tokio::spawn(async move {
            for _ in 0..PER_TASK {
                adapter.send_command(&payload).await;
            }
        })
    };
    let sender_b = {
        let adapter = adapter.clone();
        let payload = b_payload.clone();
        tokio::spawn(async move {
            for _ in 0..PER_TASK {
                adapter.send_command(&payload).await;
            }
        })
    };
    sender_a.await.unwrap();
    sender_b.await.unwrap();

    let mut a_seen = 0;
    let mut b_seen = 0;
    let mut line = String::new();
    while a_seen + b_seen < PER_TASK * 2 {
        line.clear();
        timeout(Duration::from_millis(2000), reader.read_line(&mut line))
            .await
            .expect("command line")
            .unwrap();
        match line.trim_end() {
            l if l == a_payload => a_seen += 1,
            l if l == b_payload => b_seen += 1,
            // The keepalive shares the wire; its pings must also arrive whole.
            "@MAIN:PWR=?" => {}
            other => panic!("interleaved or corrupted line: {:?}", other),
        }
    }
    assert_eq!(a_seen, PER_TASK);
    assert_eq!(b_seen, PER_TASK);

    adapter.stop().await;
}

#[tokio::test]
async fn failed_write_tears_the_connection_down_silently() {
    let (listener, port) = start_mock_receiver().await;
    let (adapter, bus) = start_adapter(test_config(port));
    let mut rx = bus.subscribe();

    let (socket, _) = listener.accept().await.unwrap();

    timeout(Duration::from_millis(2000), async {
        while !adapter.is_connected() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    // Reset the connection from the peer side; the client finds out
    // through whichever I/O touches the dead socket next.
    socket.set_linger(Some(Duration::ZERO)).unwrap();
    drop(socket);

    // Every call must complete normally; the failure stays internal.
    let mut torn_down = false;
    for _ in 0..200 {
        timeout(
            Duration::from_millis(500),
            adapter.send_command("@MAIN:PWR=?"),
        )
        .await
        .expect("send_command must never surface a write failure");
        if !adapter.is_connected() {
            torn_down = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(torn_down, "failed write should destroy the connection");

    expect_event(
        &mut rx,
        |e| matches!(e, BusEvent::ReceiverDisconnected { .. }),
        2000,
    )
    .await
    .expect("disconnected event after write failure");

    // The usual reconnect cycle follows.
    timeout(Duration::from_millis(3000), listener.accept())
        .await
        .expect("reconnect after write failure")
        .unwrap();

    adapter.stop().await;
}

#[tokio::test]
async fn send_while_disconnected_is_a_noop() {
    // No server at all.
    let (listener, port) = start_mock_receiver().await;
    drop(listener);

    let (adapter, _bus) = start_adapter(test_config(port));

    // Completes immediately without error.
    timeout(
        Duration::from_millis(500),
        adapter.send_command("@MAIN:PWR=?"),
    )
    .await
    .expect("send while disconnected must not block");

    adapter.stop().await;
}

#[tokio::test]
async fn idle_receiver_triggers_read_timeout_and_reconnect() {
    let (listener, port) = start_mock_receiver().await;
    let mut config = test_config(port);
    // Derived idle timeout is 2x this: 200ms.
    config.ping_interval_ms = 100;
    let (adapter, bus) = start_adapter(config);
    let mut rx = bus.subscribe();

    // Accept but stay silent and swallow pings without answering.
    let (socket, _) = listener.accept().await.unwrap();
    tokio::spawn(async move {
        let mut reader = BufReader::new(socket);
        let mut line = String::new();
        while reader.read_line(&mut line).await.unwrap_or(0) > 0 {
            line.clear();
        }
    });

    expect_event(
        &mut rx,
        |e| matches!(e, BusEvent::ReceiverDisconnected { .. }),
        2000,
    )
    .await
    .expect("idle timeout tears the connection down");

    adapter.stop().await;
}
