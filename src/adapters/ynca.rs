//! YNCA Protocol Client
//!
//! Owns the TCP connection to the receiver and runs the
//! connect → read → teardown → reconnect cycle for the lifetime of the
//! process. Incoming bytes are framed into lines, parsed, and fanned out
//! to the bus and the now-playing reducer. Outbound writes (keepalive
//! probes and any future command senders) go through [`YncaAdapter::send_command`],
//! which serializes them under one lock so commands are never interleaved
//! on the wire.
//!
//! The same lock owns the active-connection slot itself, so a write
//! either targets the current connection or no-ops; a reconnect can never
//! race a write onto a stale handle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, RwLock};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::bus::{BusEvent, SharedBus};
use crate::config::ReceiverConfig;
use crate::protocol::{parse_line, LineFramer, ProtocolError, DELIMITER};
use crate::state::{self, PlaybackState};

/// Flat delay between reconnect attempts. No backoff, no attempt bound.
const RECONNECT_INTERVAL: Duration = Duration::from_millis(1000);
const READ_CHUNK_SIZE: usize = 4096;

/// Everything that can end a connection. All variants are handled the
/// same way: log, tear down, wait, reconnect. None is fatal to the
/// process.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("connect to {addr} timed out after {timeout:?}")]
    ConnectTimeout { addr: String, timeout: Duration },
    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("no data from receiver within {0:?}")]
    ReadTimeout(Duration),
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
    #[error("receiver closed the connection")]
    Closed,
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("connection destroyed after write failure")]
    Destroyed,
}

/// The currently installed connection, write side.
///
/// Lives inside the command lock. `abort` is cancelled when a write
/// fails so the receive loop (which owns the read half) exits promptly
/// instead of waiting for the idle timeout.
struct ActiveConnection {
    writer: OwnedWriteHalf,
    abort: CancellationToken,
}

/// YNCA receiver client.
///
/// Cheap to clone; all clones share the same connection slot, snapshot,
/// and shutdown token.
#[derive(Clone)]
pub struct YncaAdapter {
    config: ReceiverConfig,
    bus: SharedBus,
    connection: Arc<Mutex<Option<ActiveConnection>>>,
    state: Arc<RwLock<PlaybackState>>,
    connected: Arc<AtomicBool>,
    shutdown: CancellationToken,
}

impl YncaAdapter {
    pub fn new(config: ReceiverConfig, bus: SharedBus) -> Self {
        Self {
            config,
            bus,
            connection: Arc::new(Mutex::new(None)),
            state: Arc::new(RwLock::new(PlaybackState::default())),
            connected: Arc::new(AtomicBool::new(false)),
            shutdown: CancellationToken::new(),
        }
    }

    /// Spawn the connection loop and the keepalive loop. Both run until
    /// [`stop`](Self::stop).
    pub fn start(&self) {
        let client = self.clone();
        tokio::spawn(async move { client.run_connection_loop().await });

        let client = self.clone();
        tokio::spawn(async move { client.run_keepalive_loop().await });
    }

    /// Signal shutdown and drop the active connection.
    pub async fn stop(&self) {
        self.shutdown.cancel();

        let mut conn = self.connection.lock().await;
        *conn = None;

        info!("YNCA adapter stopped");
    }

    /// Current now-playing snapshot. Always answers, even while the
    /// receiver connection is down (last known state).
    pub async fn now_playing(&self) -> PlaybackState {
        self.state.read().await.clone()
    }

    /// Whether a receiver connection is currently established.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn receiver_host(&self) -> &str {
        &self.config.host
    }

    pub fn receiver_port(&self) -> u16 {
        self.config.port
    }

    /// Write one command line to the receiver.
    ///
    /// Holds the command lock for the whole write, so concurrent callers
    /// never interleave bytes. While disconnected this is a silent no-op;
    /// on write failure the connection is destroyed (forcing the receive
    /// loop into its reconnect path) and the error is logged, never
    /// surfaced. Callers cannot observe delivery.
    pub async fn send_command(&self, command: &str) {
        let mut guard = self.connection.lock().await;
        let Some(conn) = guard.as_mut() else {
            trace!("No active receiver connection, dropping command {:?}", command);
            return;
        };

        let mut frame = Vec::with_capacity(command.len() + DELIMITER.len());
        frame.extend_from_slice(command.as_bytes());
        frame.extend_from_slice(DELIMITER);

        let result = async {
            conn.writer.write_all(&frame).await?;
            conn.writer.flush().await
        }
        .await;

        if let Err(e) = result {
            warn!("Write to receiver failed, destroying connection: {}", e);
            conn.abort.cancel();
            *guard = None;
        }
    }

    /// Keepalive: ping, sleep, repeat, unconditionally. Relies on
    /// `send_command` no-opping while disconnected.
    async fn run_keepalive_loop(self) {
        let interval = Duration::from_millis(self.config.ping_interval_ms);

        loop {
            self.send_command(&self.config.ping_command).await;

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        debug!("Keepalive loop stopped");
    }

    /// Connect/read/reconnect forever. Every failure mode funnels here:
    /// log, flat delay, retry.
    async fn run_connection_loop(self) {
        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            match self.run_once().await {
                // Clean exit only happens on shutdown
                Ok(()) => break,
                Err(e) => warn!("Receiver connection failed: {}", e),
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(RECONNECT_INTERVAL) => {}
            }
        }

        info!("Receiver connection loop stopped");
    }

    /// One full connection lifetime: connect, install, receive until
    /// something goes wrong, tear down.
    async fn run_once(&self) -> Result<(), ClientError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let connect_timeout = Duration::from_millis(self.config.connect_timeout_ms);

        let stream = tokio::select! {
            _ = self.shutdown.cancelled() => return Ok(()),
            result = timeout(connect_timeout, TcpStream::connect(&addr)) => match result {
                Err(_) => {
                    return Err(ClientError::ConnectTimeout {
                        addr,
                        timeout: connect_timeout,
                    })
                }
                Ok(Err(source)) => return Err(ClientError::Connect { addr, source }),
                Ok(Ok(stream)) => stream,
            },
        };

        info!("Connected to YNCA receiver at {}", addr);

        let (mut read_half, write_half) = stream.into_split();
        let abort = CancellationToken::new();

        // Install as the active connection for command senders.
        {
            let mut conn = self.connection.lock().await;
            *conn = Some(ActiveConnection {
                writer: write_half,
                abort: abort.clone(),
            });
        }
        self.connected.store(true, Ordering::Relaxed);
        self.bus.publish(BusEvent::ReceiverConnected {
            host: self.config.host.clone(),
            port: self.config.port,
        });

        let result = self.receive_loop(&mut read_half, &abort).await;

        // Teardown: clear the active connection before the reconnect wait
        // so commands no-op instead of targeting a dead handle.
        {
            let mut conn = self.connection.lock().await;
            *conn = None;
        }
        self.connected.store(false, Ordering::Relaxed);
        self.bus.publish(BusEvent::ReceiverDisconnected {
            host: self.config.host.clone(),
            port: self.config.port,
        });

        result
    }

    /// Blocking receive loop over one connection. Any read error, idle
    /// timeout, EOF, or (in strict mode) grammar error exits.
    async fn receive_loop(
        &self,
        reader: &mut OwnedReadHalf,
        abort: &CancellationToken,
    ) -> Result<(), ClientError> {
        // Prolonged silence should not happen while the keepalive is
        // running, so treat it as connection failure.
        let idle_timeout = Duration::from_millis(self.config.ping_interval_ms * 2);
        let mut framer = LineFramer::new();
        let mut buf = [0u8; READ_CHUNK_SIZE];

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return Ok(()),
                _ = abort.cancelled() => return Err(ClientError::Destroyed),
                result = timeout(idle_timeout, reader.read(&mut buf)) => {
                    let n = match result {
                        Err(_) => return Err(ClientError::ReadTimeout(idle_timeout)),
                        Ok(Err(e)) => return Err(ClientError::Transport(e)),
                        Ok(Ok(0)) => return Err(ClientError::Closed),
                        Ok(Ok(n)) => n,
                    };

                    for line in framer.feed(&buf[..n]) {
                        self.process_line(&line).await?;
                    }
                }
            }
        }
    }

    /// Parse one line and fan it out: raw message to the bus, then
    /// through the reducer, publishing the snapshot when it changed.
    async fn process_line(&self, line: &str) -> Result<(), ClientError> {
        let message = match parse_line(line) {
            Ok(message) => message,
            // Default is fail-fast: a malformed line forces a reconnect
            // to resync the stream, as the receiver never sends one
            // mid-session under normal operation.
            Err(e) if self.config.strict_parsing => return Err(e.into()),
            Err(e) => {
                warn!("Skipping malformed line: {}", e);
                return Ok(());
            }
        };

        trace!(
            sub_unit = %message.sub_unit,
            function = %message.function,
            value = %message.value,
            "Receiver message"
        );

        self.bus.publish(BusEvent::Message {
            message: message.clone(),
        });

        let changed = {
            let mut snapshot = self.state.write().await;
            state::apply(&mut snapshot, &message).then(|| snapshot.clone())
        };

        if let Some(snapshot) = changed {
            debug!(?snapshot, "Now-playing state changed");
            self.bus
                .publish(BusEvent::NowPlayingChanged { state: snapshot });
        }

        Ok(())
    }
}
