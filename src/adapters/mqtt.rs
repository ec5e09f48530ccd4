//! MQTT Adapter
//!
//! Bridges the internal event bus to MQTT: raw protocol lines, derived
//! now-playing state, and receiver connectivity. Publish-only; the
//! original bridge accepted no inbound MQTT commands and neither does
//! this one.

use anyhow::{Context, Result};
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, TlsConfiguration, Transport};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::bus::{BusEvent, SharedBus};
use crate::config::MqttConfig;

const CLIENT_ID: &str = "ynca-bridge";
const RECONNECT_POLL_DELAY: Duration = Duration::from_secs(5);

/// MQTT connection status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttStatus {
    pub connected: bool,
    pub host: String,
    pub port: u16,
    pub topic_prefix: String,
}

/// Internal state
struct MqttState {
    config: MqttConfig,
    connected: bool,
}

/// MQTT Adapter
#[derive(Clone)]
pub struct MqttAdapter {
    state: Arc<RwLock<MqttState>>,
    client: Arc<RwLock<Option<AsyncClient>>>,
    bus: SharedBus,
    shutdown: CancellationToken,
}

impl MqttAdapter {
    pub fn new(config: MqttConfig, bus: SharedBus) -> Self {
        Self {
            state: Arc::new(RwLock::new(MqttState {
                config,
                connected: false,
            })),
            client: Arc::new(RwLock::new(None)),
            bus,
            shutdown: CancellationToken::new(),
        }
    }

    /// Get connection status
    pub async fn get_status(&self) -> MqttStatus {
        let state = self.state.read().await;
        MqttStatus {
            connected: state.connected,
            host: state.config.host.clone(),
            port: state.config.port,
            topic_prefix: state.config.topic_prefix.clone(),
        }
    }

    /// Start MQTT connection and the bus → MQTT bridge
    pub async fn start(&self) -> Result<()> {
        let config = self.state.read().await.config.clone();

        let mut options = MqttOptions::new(CLIENT_ID, &config.host, config.port);
        options.set_keep_alive(Duration::from_secs(30));

        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            options.set_credentials(user, pass);
        }

        if config.tls {
            let ca_path = config
                .ca_certificate_path
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("mqtt.tls requires mqtt.ca_certificate_path"))?;
            let ca = std::fs::read(ca_path)
                .with_context(|| format!("reading CA certificate {}", ca_path))?;
            options.set_transport(Transport::Tls(TlsConfiguration::Simple {
                ca,
                alpn: None,
                client_auth: None,
            }));
        }

        let (client, mut eventloop) = AsyncClient::new(options, 100);

        {
            let mut client_guard = self.client.write().await;
            *client_guard = Some(client);
        }

        tracing::info!(
            "MQTT connecting to {}:{} (tls: {})...",
            config.host,
            config.port,
            config.tls
        );

        // Event loop handler (connection state tracking; rumqttc
        // reconnects internally as long as poll keeps being called)
        let state = self.state.clone();
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::info!("MQTT event loop shutting down");
                        break;
                    }
                    result = eventloop.poll() => {
                        match result {
                            Ok(Event::Incoming(Incoming::ConnAck(ack))) => {
                                tracing::info!("MQTT connected (code: {:?})", ack.code);
                                let mut state = state.write().await;
                                state.connected = true;
                            }
                            Ok(Event::Incoming(Incoming::Disconnect)) => {
                                tracing::warn!("MQTT disconnected");
                                let mut state = state.write().await;
                                state.connected = false;
                            }
                            Err(e) => {
                                tracing::error!("MQTT error: {}", e);
                                let mut state = state.write().await;
                                state.connected = false;
                                drop(state);
                                // Check shutdown before sleeping
                                tokio::select! {
                                    _ = shutdown.cancelled() => break,
                                    _ = tokio::time::sleep(RECONNECT_POLL_DELAY) => {}
                                }
                            }
                            _ => {}
                        }
                    }
                }
            }
        });

        // Bus event forwarder
        let client_slot = self.client.clone();
        let bus = self.bus.clone();
        let prefix = config.topic_prefix.clone();
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            let mut rx = bus.subscribe();

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::info!("MQTT bus forwarder shutting down");
                        break;
                    }
                    result = rx.recv() => {
                        match result {
                            Ok(event) => {
                                if let Some(client) = client_slot.read().await.as_ref() {
                                    if let Err(e) = publish_event(client, &prefix, &event).await {
                                        tracing::debug!("MQTT publish failed: {}", e);
                                    }
                                }
                            }
                            Err(_) => {
                                // Channel lagged or closed, continue
                            }
                        }
                    }
                }
            }
        });

        Ok(())
    }

    /// Stop MQTT connection
    pub async fn stop(&self) {
        // Cancel background tasks first
        self.shutdown.cancel();

        let mut client = self.client.write().await;
        if let Some(c) = client.take() {
            let _ = c.disconnect().await;
        }

        let mut state = self.state.write().await;
        state.connected = false;

        tracing::info!("MQTT adapter stopped");
    }
}

/// Map one bus event to its MQTT topic and payload
async fn publish_event(client: &AsyncClient, prefix: &str, event: &BusEvent) -> Result<()> {
    let (topic_suffix, payload) = match event {
        // Raw republishing: the line exactly as received, not JSON
        BusEvent::Message { message } => ("raw".to_string(), message.raw.clone()),
        BusEvent::NowPlayingChanged { state } => {
            ("now_playing".to_string(), serde_json::to_string(state)?)
        }
        BusEvent::ReceiverConnected { host, port } => (
            "status".to_string(),
            serde_json::json!({
                "connected": true,
                "host": host,
                "port": port
            })
            .to_string(),
        ),
        BusEvent::ReceiverDisconnected { host, port } => (
            "status".to_string(),
            serde_json::json!({
                "connected": false,
                "host": host,
                "port": port
            })
            .to_string(),
        ),
        BusEvent::ShuttingDown { reason } => (
            "status".to_string(),
            serde_json::json!({
                "connected": false,
                "shutting_down": true,
                "reason": reason
            })
            .to_string(),
        ),
    };

    let topic = format!("{}/{}", prefix, topic_suffix);
    client
        .publish(&topic, rumqttc::QoS::AtMostOnce, false, payload.as_bytes())
        .await?;

    Ok(())
}
