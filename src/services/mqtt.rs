//! MQTT bridge for the layout.
//!
//! **Subscribe Topics:**
//! - `layout/feedback/<id>/set` - Sensor report, payload `occupied`, `free`, `1` or `0`
//!
//! **Publish Topics:**
//! - `layout/track/<id>/state` - Segment snapshot JSON (retained, on change + heartbeat)
//!
//! Feedback reports go through the [feedback relay](super::feedback), so the
//! MQTT event loop never waits on a segment mutex.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::config::MqttConfig as SharedMqttConfig;
use crate::track::TrackSnapshot;
use crate::types::{FeedbackId, FeedbackState};

use super::feedback::FeedbackEvent;
use super::shared::SharedLayoutState;

// ============================================================================
// Configuration
// ============================================================================

/// Runtime MQTT client configuration for `rumqttc`.
#[derive(Debug, Clone)]
pub struct MqttRuntimeConfig {
    /// MQTT broker hostname
    pub host: String,
    /// MQTT broker port
    pub port: u16,
    /// Client ID
    pub client_id: String,
    /// Topic prefix (default: "layout")
    pub topic_prefix: String,
    /// Username (empty = no auth)
    pub username: String,
    /// Password
    pub password: String,
    /// Heartbeat interval in milliseconds (0 = no heartbeat)
    pub heartbeat_ms: u64,
    /// Keep-alive interval in seconds
    pub keep_alive_secs: u16,
}

impl Default for MqttRuntimeConfig {
    fn default() -> Self {
        Self::from_config(&SharedMqttConfig::default())
    }
}

impl MqttRuntimeConfig {
    /// Create from shared MqttConfig
    pub fn from_config(config: &SharedMqttConfig) -> Self {
        Self {
            host: config.host.as_str().to_string(),
            port: config.port,
            client_id: config.client_id.as_str().to_string(),
            topic_prefix: config.topic_prefix.as_str().to_string(),
            username: config.username.as_str().to_string(),
            password: config.password.as_str().to_string(),
            heartbeat_ms: config.heartbeat_ms as u64,
            keep_alive_secs: config.keep_alive_secs,
        }
    }

    /// Set the topic prefix
    pub fn topic_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.topic_prefix = prefix.into();
        self
    }

    fn topic(&self, suffix: &str) -> String {
        format!("{}/{}", self.topic_prefix, suffix)
    }

    /// Topic carrying the state of one segment.
    pub fn track_state_topic(&self, snapshot: &TrackSnapshot) -> String {
        self.topic(&format!("track/{}/state", snapshot.id.0))
    }

    /// Parse `<prefix>/feedback/<id>/set` into the sensor id.
    pub fn parse_feedback_topic(&self, topic: &str) -> Option<FeedbackId> {
        let rest = topic
            .strip_prefix(self.topic_prefix.as_str())?
            .strip_prefix("/feedback/")?;
        let id = rest.strip_suffix("/set")?;
        id.parse().ok().map(FeedbackId)
    }
}

/// Parse a sensor payload.
pub fn parse_feedback_payload(payload: &[u8]) -> Option<FeedbackState> {
    std::str::from_utf8(payload)
        .ok()
        .and_then(FeedbackState::from_text)
}

// ============================================================================
// MQTT Bridge
// ============================================================================

/// Bridges MQTT sensor reports into the layout and publishes segment state.
pub struct MqttBridge {
    state: Arc<SharedLayoutState>,
    feedback: mpsc::Sender<FeedbackEvent>,
    config: MqttRuntimeConfig,
}

impl MqttBridge {
    /// Create a bridge that forwards sensor reports to `feedback`.
    pub fn new(
        state: Arc<SharedLayoutState>,
        feedback: mpsc::Sender<FeedbackEvent>,
        config: MqttRuntimeConfig,
    ) -> Self {
        Self {
            state,
            feedback,
            config,
        }
    }

    /// Run the bridge until the feedback relay shuts down.
    pub async fn run(self) -> Result<(), MqttError> {
        let mut options =
            MqttOptions::new(&self.config.client_id, &self.config.host, self.config.port);
        options.set_keep_alive(Duration::from_secs(self.config.keep_alive_secs as u64));
        if !self.config.username.is_empty() {
            options.set_credentials(&self.config.username, &self.config.password);
        }

        let (client, mut eventloop) = AsyncClient::new(options, 32);

        let subscription = self.config.topic("feedback/+/set");
        client
            .subscribe(&subscription, QoS::AtLeastOnce)
            .await
            .map_err(|e| MqttError::Subscribe(e.to_string()))?;
        info!(host = %self.config.host, port = self.config.port, topic = %subscription, "mqtt bridge started");

        // Change publisher
        let mut changes = self.state.subscribe();
        let client_for_changes = client.clone();
        let config_for_changes = self.config.clone();
        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(snapshot) => {
                        publish_snapshot(&client_for_changes, &config_for_changes, &snapshot).await
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "mqtt publisher lagging; heartbeat will catch up");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        // Heartbeat
        if self.config.heartbeat_ms > 0 {
            let state = Arc::clone(&self.state);
            let client_for_heartbeat = client.clone();
            let config_for_heartbeat = self.config.clone();
            tokio::spawn(async move {
                let mut interval =
                    tokio::time::interval(Duration::from_millis(config_for_heartbeat.heartbeat_ms));
                loop {
                    interval.tick().await;
                    for snapshot in state.layout().snapshots() {
                        publish_snapshot(&client_for_heartbeat, &config_for_heartbeat, &snapshot)
                            .await;
                    }
                }
            });
        }

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    if !self.handle_message(&publish.topic, &publish.payload).await {
                        info!("feedback relay closed; stopping mqtt bridge");
                        return Ok(());
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "mqtt connection error; retrying");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
        }
    }

    /// Forward one message. Returns false once the relay is gone.
    async fn handle_message(&self, topic: &str, payload: &[u8]) -> bool {
        let Some(sensor) = self.config.parse_feedback_topic(topic) else {
            debug!(%topic, "ignoring message");
            return true;
        };
        let Some(state) = parse_feedback_payload(payload) else {
            warn!(%topic, "invalid feedback payload");
            return true;
        };
        self.feedback
            .send(FeedbackEvent { sensor, state })
            .await
            .is_ok()
    }
}

async fn publish_snapshot(client: &AsyncClient, config: &MqttRuntimeConfig, snapshot: &TrackSnapshot) {
    let payload = match serde_json::to_vec(snapshot) {
        Ok(p) => p,
        Err(e) => {
            warn!(track = %snapshot.id, error = %e, "cannot encode snapshot");
            return;
        }
    };
    if let Err(e) = client
        .publish(config.track_state_topic(snapshot), QoS::AtLeastOnce, true, payload)
        .await
    {
        warn!(track = %snapshot.id, error = %e, "mqtt publish failed");
    }
}

/// MQTT-related errors
#[derive(Debug)]
pub enum MqttError {
    /// Failed to subscribe to topic
    Subscribe(String),
}

impl fmt::Display for MqttError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Subscribe(e) => write!(f, "mqtt subscribe failed: {}", e),
        }
    }
}

impl std::error::Error for MqttError {}
