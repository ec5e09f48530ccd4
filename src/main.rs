//! ynca-bridge
//!
//! Connects to a Yamaha receiver's YNCA control port, republishes the
//! protocol stream over MQTT, and serves the derived now-playing state
//! over HTTP.

use ynca_bridge::{adapters, api, bus, config};

use anyhow::Result;
use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ynca_bridge=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting ynca-bridge v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = config::load_config()?;
    tracing::info!(
        "Configuration loaded, receiver {}:{}, http port {}",
        config.receiver.host,
        config.receiver.port,
        config.port
    );

    // Create event bus
    let bus = bus::create_bus();

    // Start the YNCA client (connection loop + keepalive)
    let ynca = Arc::new(adapters::ynca::YncaAdapter::new(
        config.receiver.clone(),
        bus.clone(),
    ));
    ynca.start();
    tracing::info!("YNCA client started");

    // Start MQTT republishing when configured
    let mqtt = match config.mqtt {
        Some(ref mqtt_config) => {
            let adapter = Arc::new(adapters::mqtt::MqttAdapter::new(
                mqtt_config.clone(),
                bus.clone(),
            ));
            match adapter.start().await {
                Ok(()) => {
                    tracing::info!("MQTT adapter started for {}", mqtt_config.host);
                    Some(adapter)
                }
                Err(e) => {
                    tracing::warn!("Failed to start MQTT adapter: {}", e);
                    None
                }
            }
        }
        None => {
            tracing::info!("MQTT not configured, raw republishing disabled");
            None
        }
    };

    // Build API routes
    let state = api::AppState::new(ynca.clone(), mqtt.clone(), bus.clone());
    let app = Router::new()
        .route("/status", get(api::status_handler))
        .route("/now-playing", get(api::now_playing_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server with graceful shutdown
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Cleanup: stop adapters
    tracing::info!("Shutting down adapters...");
    bus.publish(bus::BusEvent::ShuttingDown {
        reason: "signal".to_string(),
    });
    ynca.stop().await;
    if let Some(mqtt) = mqtt {
        mqtt.stop().await;
    }
    tracing::info!("Shutdown complete");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}
