//! Cluster link configuration
//!
//! Loaded from TOML. Every section has defaults, so an empty file describes
//! a cluster subscribing to the two local telemetry ports.
//!
//! ```toml
//! [critical]
//! endpoint = "tcp://192.168.1.20:5555"
//! policy = { type = "latest_only" }
//!
//! [non_critical]
//! endpoint = "tcp://192.168.1.20:5556"
//! policy = { type = "queued", depth = 100 }
//!
//! [synthetic]
//! enabled = false
//! period_ms = 500
//!
//! [sign]
//! hide_after_ms = 6000
//! ```

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Port carrying speed, lane, obstacle and sign data
pub const CRITICAL_DATA_PORT: u16 = 5555;
/// Port carrying battery, charging, mode and odometer data
pub const NON_CRITICAL_DATA_PORT: u16 = 5556;

const DEFAULT_HOST: &str = "127.0.0.1";

/// Logical telemetry channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Critical,
    NonCritical,
}

impl ChannelKind {
    pub fn default_port(&self) -> u16 {
        match self {
            ChannelKind::Critical => CRITICAL_DATA_PORT,
            ChannelKind::NonCritical => NON_CRITICAL_DATA_PORT,
        }
    }

    pub fn default_endpoint(&self) -> String {
        format!("tcp://{}:{}", DEFAULT_HOST, self.default_port())
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelKind::Critical => f.write_str("critical"),
            ChannelKind::NonCritical => f.write_str("non_critical"),
        }
    }
}

/// How unread frames are buffered between the socket and the event loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueuePolicy {
    /// Keep only the newest unread frame
    LatestOnly,
    /// Keep up to `depth` unread frames in arrival order
    Queued {
        #[serde(default = "default_queue_depth")]
        depth: usize,
    },
}

fn default_queue_depth() -> usize {
    100
}

impl Default for QueuePolicy {
    fn default() -> Self {
        QueuePolicy::Queued {
            depth: default_queue_depth(),
        }
    }
}

impl QueuePolicy {
    /// Maximum number of unread frames held
    pub fn capacity(&self) -> usize {
        match self {
            QueuePolicy::LatestOnly => 1,
            QueuePolicy::Queued { depth } => *depth,
        }
    }
}

/// One channel's endpoint and buffering
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// ZeroMQ endpoint, e.g. `tcp://10.0.0.2:5555`
    pub endpoint: String,
    #[serde(default)]
    pub policy: QueuePolicy,
}

impl ChannelConfig {
    pub fn new(endpoint: impl Into<String>, policy: QueuePolicy) -> Self {
        Self {
            endpoint: endpoint.into(),
            policy,
        }
    }

    pub fn for_kind(kind: ChannelKind) -> Self {
        Self::new(kind.default_endpoint(), QueuePolicy::default())
    }
}

/// Synthetic feed settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    pub enabled: bool,
    pub period_ms: u64,
    /// Fixed seed for a reproducible feed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            period_ms: 500,
            seed: None,
        }
    }
}

/// Advisory sign settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignConfig {
    pub hide_after_ms: u64,
}

impl Default for SignConfig {
    fn default() -> Self {
        Self {
            hide_after_ms: 6000,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub critical: ChannelConfig,
    pub non_critical: ChannelConfig,
    pub synthetic: SyntheticConfig,
    pub sign: SignConfig,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            critical: ChannelConfig::for_kind(ChannelKind::Critical),
            non_critical: ChannelConfig::for_kind(ChannelKind::NonCritical),
            synthetic: SyntheticConfig::default(),
            sign: SignConfig::default(),
        }
    }
}

impl ClusterConfig {
    /// Load and validate a TOML configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that parse but cannot be used
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (kind, channel) in self.channels() {
            if channel.endpoint.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{} endpoint is empty", kind)));
            }
            if channel.policy.capacity() == 0 {
                return Err(ConfigError::Invalid(format!(
                    "{} queue depth must be at least 1",
                    kind
                )));
            }
        }

        if self.synthetic.period_ms == 0 {
            return Err(ConfigError::Invalid(
                "synthetic.period_ms must be greater than 0".to_string(),
            ));
        }
        if self.sign.hide_after_ms == 0 {
            return Err(ConfigError::Invalid(
                "sign.hide_after_ms must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn channel(&self, kind: ChannelKind) -> &ChannelConfig {
        match kind {
            ChannelKind::Critical => &self.critical,
            ChannelKind::NonCritical => &self.non_critical,
        }
    }

    pub fn channel_mut(&mut self, kind: ChannelKind) -> &mut ChannelConfig {
        match kind {
            ChannelKind::Critical => &mut self.critical,
            ChannelKind::NonCritical => &mut self.non_critical,
        }
    }

    pub fn channels(&self) -> [(ChannelKind, &ChannelConfig); 2] {
        [
            (ChannelKind::Critical, &self.critical),
            (ChannelKind::NonCritical, &self.non_critical),
        ]
    }

    pub fn synthetic_period(&self) -> Duration {
        Duration::from_millis(self.synthetic.period_ms)
    }

    pub fn sign_hide_after(&self) -> Duration {
        Duration::from_millis(self.sign.hide_after_ms)
    }
}
