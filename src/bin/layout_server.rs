//! Layout server: web API plus optional MQTT bridge over one shared layout.
//!
//! # Usage
//!
//! Web server only:
//! ```sh
//! cargo run --bin layout_server --features web -- config.json
//! ```
//!
//! Web server + MQTT:
//! ```sh
//! cargo run --bin layout_server --features web,mqtt -- config.json
//! ```
//!
//! Without a config file the defaults apply: port 8080, layout stored in
//! `layout.json`, MQTT disabled. Log verbosity follows `RUST_LOG`.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};

use rs_railcontrol::services::{
    spawn_feedback_relay, BroadcastPublisher, SharedLayoutState, WebServerConfig,
};
use rs_railcontrol::{Config, JsonFileStore, Layout};

#[cfg(feature = "mqtt")]
use rs_railcontrol::services::{MqttBridge, MqttRuntimeConfig};

/// Buffered state changes per subscriber.
const EVENT_CAPACITY: usize = 256;

/// Buffered sensor reports.
const FEEDBACK_CAPACITY: usize = 256;

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .compact()
        .with_writer(std::io::stdout);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .init();
}

fn load_config() -> anyhow::Result<Config> {
    match std::env::args().nth(1) {
        Some(path) => Config::from_json_file(&path),
        None => Ok(Config::default()),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let config = load_config()?;

    let events = BroadcastPublisher::new(EVENT_CAPACITY);
    let layout = Layout::from_config(&config.layout).with_publisher(Arc::new(events.clone()));

    let store = if config.storage.is_persistent() {
        let store = JsonFileStore::open(config.storage.path.as_str())?;
        layout
            .load_from(&store)
            .with_context(|| format!("restoring layout from {}", store.path().display()))?;
        Some(store)
    } else {
        None
    };
    info!(
        tracks = layout.track_ids().len(),
        routes = layout.route_ids().len(),
        "layout ready"
    );

    let state = Arc::new(SharedLayoutState::new(layout, events));
    let (feedback_tx, relay) = spawn_feedback_relay(Arc::clone(&state), FEEDBACK_CAPACITY);

    #[cfg(feature = "mqtt")]
    let mqtt = if config.mqtt.enabled {
        let bridge = MqttBridge::new(
            Arc::clone(&state),
            feedback_tx.clone(),
            MqttRuntimeConfig::from_config(&config.mqtt),
        );
        Some(tokio::spawn(async move {
            if let Err(e) = bridge.run().await {
                warn!(error = %e, "mqtt bridge stopped");
            }
        }))
    } else {
        None
    };

    if config.web.enabled {
        let web_config = WebServerConfig::from_config(&config.web);
        rs_railcontrol::services::run_server(Arc::clone(&state), web_config, shutdown_signal())
            .await
            .context("web server failed")?;
    } else {
        shutdown_signal().await;
    }

    #[cfg(feature = "mqtt")]
    {
        if let Some(handle) = mqtt {
            handle.abort();
        }
    }
    drop(feedback_tx);
    if let Err(e) = relay.await {
        warn!(error = %e, "feedback relay ended abnormally");
    }

    if let Some(store) = store.filter(|_| config.storage.save_on_exit) {
        state.layout().save_to(&store)?;
        info!(path = %store.path().display(), "layout saved");
    }
    Ok(())
}
