//! HTTP API handlers

use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::adapters::mqtt::MqttAdapter;
use crate::adapters::ynca::YncaAdapter;
use crate::bus::SharedBus;
use crate::state::PlaybackState;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub ynca: Arc<YncaAdapter>,
    pub mqtt: Option<Arc<MqttAdapter>>,
    pub bus: SharedBus,
}

impl AppState {
    pub fn new(ynca: Arc<YncaAdapter>, mqtt: Option<Arc<MqttAdapter>>, bus: SharedBus) -> Self {
        Self { ynca, mqtt, bus }
    }
}

/// General status response
#[derive(Serialize)]
pub struct StatusResponse {
    pub service: &'static str,
    pub version: &'static str,
    pub receiver_connected: bool,
    pub receiver_host: String,
    pub receiver_port: u16,
    pub mqtt_connected: bool,
    pub bus_subscribers: usize,
}

/// GET /status - Service health check
pub async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    let mqtt_connected = match &state.mqtt {
        Some(mqtt) => mqtt.get_status().await.connected,
        None => false,
    };

    Json(StatusResponse {
        service: "ynca-bridge",
        version: env!("CARGO_PKG_VERSION"),
        receiver_connected: state.ynca.is_connected(),
        receiver_host: state.ynca.receiver_host().to_string(),
        receiver_port: state.ynca.receiver_port(),
        mqtt_connected,
        bus_subscribers: state.bus.subscriber_count(),
    })
}

/// GET /now-playing - Current playback snapshot
///
/// Always answers with the last known state, even while the receiver
/// connection is down.
pub async fn now_playing_handler(State(state): State<AppState>) -> Json<PlaybackState> {
    Json(state.ynca.now_playing().await)
}
