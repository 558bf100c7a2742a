//! Server configuration.
//!
//! Uses `heapless::String` for the short text fields so every section has a
//! fixed footprint and serializes as plain JSON strings.
//!
//! # Example
//!
//! ```rust
//! use rs_railcontrol::config::{Config, LayoutConfig, MqttConfig, WebConfig};
//! use rs_railcontrol::SelectRouteApproach;
//!
//! // Use defaults
//! let config = Config::default();
//!
//! // Or customize
//! let config = Config::default()
//!     .with_layout(LayoutConfig::default().with_default_approach(SelectRouteApproach::LongestUnused))
//!     .with_mqtt(MqttConfig::default().with_host("192.168.1.100"))
//!     .with_web(WebConfig::default().with_port(3000));
//! ```

use std::path::Path;

use anyhow::Context;
use heapless::String as HString;
use serde::{Deserialize, Serialize};

use crate::selector::SelectRouteApproach;

/// Maximum length for short config strings (hostnames, client IDs)
pub const MAX_SHORT_STRING: usize = 64;

/// Maximum length for longer config strings (file paths)
pub const MAX_LONG_STRING: usize = 128;

/// Type alias for short config strings
pub type ShortString = HString<MAX_SHORT_STRING>;

/// Type alias for longer config strings
pub type LongString = HString<MAX_LONG_STRING>;

// ============================================================================
// Helpers for creating heapless strings
// ============================================================================

fn bounded<const N: usize>(s: &str) -> HString<N> {
    let mut hs = HString::new();
    let valid_end = s
        .char_indices()
        .map(|(i, c)| i + c.len_utf8())
        .take_while(|end| *end <= N)
        .last()
        .unwrap_or(0);
    let _ = hs.push_str(&s[..valid_end]);
    hs
}

/// Create a ShortString from a &str, truncating on a char boundary if too long
pub fn short_string(s: &str) -> ShortString {
    bounded(s)
}

/// Create a LongString from a &str, truncating on a char boundary if too long
pub fn long_string(s: &str) -> LongString {
    bounded(s)
}

// ============================================================================
// Main Config
// ============================================================================

/// Complete server configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Reservation and route-selection settings
    pub layout: LayoutConfig,
    /// Web API configuration
    pub web: WebConfig,
    /// MQTT bridge configuration
    pub mqtt: MqttConfig,
    /// Layout persistence
    pub storage: StorageConfig,
}

impl Config {
    /// Set layout configuration
    pub fn with_layout(mut self, layout: LayoutConfig) -> Self {
        self.layout = layout;
        self
    }

    /// Set web configuration
    pub fn with_web(mut self, web: WebConfig) -> Self {
        self.web = web;
        self
    }

    /// Set MQTT configuration
    pub fn with_mqtt(mut self, mqtt: MqttConfig) -> Self {
        self.mqtt = mqtt;
        self
    }

    /// Set storage configuration
    pub fn with_storage(mut self, storage: StorageConfig) -> Self {
        self.storage = storage;
        self
    }

    /// Parse a JSON document. Missing sections and fields take defaults.
    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).context("invalid configuration")
    }

    /// Read a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_json_str(&text)
    }
}

// ============================================================================
// Layout Config
// ============================================================================

/// Reservation and route-selection settings
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Ordering used when neither the caller nor the segment picks one
    pub default_approach: SelectRouteApproach,
    /// Fixed seed for random route ordering (None = seeded from entropy)
    pub rng_seed: Option<u64>,
}

impl LayoutConfig {
    /// Set the system default approach
    pub fn with_default_approach(mut self, approach: SelectRouteApproach) -> Self {
        self.default_approach = approach;
        self
    }

    /// Fix the random seed
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }
}

// ============================================================================
// MQTT Config
// ============================================================================

/// MQTT client configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Broker hostname or IP
    pub host: ShortString,
    /// Broker port
    pub port: u16,
    /// Client ID
    pub client_id: ShortString,
    /// Topic prefix for all pub/sub (e.g., "layout" -> "layout/track/3/state")
    pub topic_prefix: ShortString,
    /// Username for authentication (empty = no auth)
    pub username: ShortString,
    /// Password for authentication
    pub password: ShortString,
    /// Full state republish interval in milliseconds
    pub heartbeat_ms: u32,
    /// Keep-alive interval in seconds
    pub keep_alive_secs: u16,
    /// Whether MQTT is enabled
    pub enabled: bool,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: short_string("localhost"),
            port: 1883,
            client_id: short_string("rs-railcontrol"),
            topic_prefix: short_string("layout"),
            username: ShortString::new(),
            password: ShortString::new(),
            heartbeat_ms: 30_000,
            keep_alive_secs: 30,
            enabled: false,
        }
    }
}

impl MqttConfig {
    /// Set the broker host
    pub fn with_host(mut self, host: &str) -> Self {
        self.host = short_string(host);
        self
    }

    /// Set the broker port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the topic prefix
    pub fn with_topic_prefix(mut self, prefix: &str) -> Self {
        self.topic_prefix = short_string(prefix);
        self
    }

    /// Set authentication credentials
    pub fn with_auth(mut self, username: &str, password: &str) -> Self {
        self.username = short_string(username);
        self.password = short_string(password);
        self
    }

    /// Set the heartbeat interval
    pub fn with_heartbeat_ms(mut self, ms: u32) -> Self {
        self.heartbeat_ms = ms;
        self
    }

    /// Enable or disable MQTT
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

// ============================================================================
// Web Config
// ============================================================================

/// Web API configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// Port to listen on
    pub port: u16,
    /// Whether to enable CORS for all origins
    pub cors_permissive: bool,
    /// Whether the web API is enabled
    pub enabled: bool,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            cors_permissive: true,
            enabled: true,
        }
    }
}

impl WebConfig {
    /// Set the port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

// ============================================================================
// Storage Config
// ============================================================================

/// Layout persistence configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON file holding the layout (empty = in-memory only)
    pub path: LongString,
    /// Save the layout on shutdown
    pub save_on_exit: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: long_string("layout.json"),
            save_on_exit: true,
        }
    }
}

impl StorageConfig {
    /// Set the storage file
    pub fn with_path(mut self, path: &str) -> Self {
        self.path = long_string(path);
        self
    }

    /// Whether a storage file is configured
    pub fn is_persistent(&self) -> bool {
        !self.path.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
