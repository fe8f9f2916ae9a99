use crate::defaults;
use crate::error::{Result, VoxbridgeError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub queues: QueueConfig,
    pub session: SessionConfig,
    pub device: DeviceConfig,
}

/// Per-endpoint queue configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QueueConfig {
    /// Capacity of each endpoint's inbound (producer-side) queue.
    pub inbound_capacity: usize,
    /// Capacity of each endpoint's outbound (delivery-side) queue.
    /// `None` removes the bound (set programmatically; TOML cannot express
    /// it); when bounded, the oldest queued event is evicted rather than
    /// blocking the router.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outbound_capacity: Option<usize>,
}

/// Session lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Delay between signaling stop and forcing teardown, in milliseconds.
    pub grace_period_ms: u64,
}

/// Audio device adapter configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DeviceConfig {
    /// Sample rate devices are expected to run at.
    pub sample_rate: u32,
    /// Depth of the capture worker's frame channel.
    pub capture_buffer: usize,
    /// Depth of the playback worker's frame channel.
    pub playback_buffer: usize,
    /// Polling interval when the capture device has no samples ready (ms).
    pub poll_interval_ms: u64,
    /// MIME tag stamped on captured audio chunks.
    pub mime_type: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            inbound_capacity: defaults::INBOUND_QUEUE_CAPACITY,
            outbound_capacity: Some(defaults::OUTBOUND_QUEUE_CAPACITY),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: defaults::TEARDOWN_GRACE_MS,
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            sample_rate: defaults::SAMPLE_RATE,
            capture_buffer: defaults::CAPTURE_BUFFER,
            playback_buffer: defaults::PLAYBACK_BUFFER,
            poll_interval_ms: defaults::DEVICE_POLL_INTERVAL_MS,
            mime_type: defaults::AUDIO_MIME_PCM.to_string(),
        }
    }
}

impl SessionConfig {
    /// The grace period as a [`Duration`].
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - VOXBRIDGE_INBOUND_CAPACITY → queues.inbound_capacity
    /// - VOXBRIDGE_GRACE_PERIOD_MS → session.grace_period_ms
    /// - VOXBRIDGE_SAMPLE_RATE → device.sample_rate
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(capacity) = std::env::var("VOXBRIDGE_INBOUND_CAPACITY")
            && let Ok(capacity) = capacity.parse::<usize>()
            && capacity > 0
        {
            self.queues.inbound_capacity = capacity;
        }
        if let Ok(grace) = std::env::var("VOXBRIDGE_GRACE_PERIOD_MS")
            && let Ok(grace) = grace.parse::<u64>()
        {
            self.session.grace_period_ms = grace;
        }
        if let Ok(rate) = std::env::var("VOXBRIDGE_SAMPLE_RATE")
            && let Ok(rate) = rate.parse::<u32>()
            && rate > 0
        {
            self.device.sample_rate = rate;
        }
        self
    }

    /// Check semantic constraints the TOML schema cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.queues.inbound_capacity == 0 {
            return Err(VoxbridgeError::ConfigInvalidValue {
                key: "queues.inbound_capacity".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.queues.outbound_capacity == Some(0) {
            return Err(VoxbridgeError::ConfigInvalidValue {
                key: "queues.outbound_capacity".to_string(),
                message: "must be at least 1 (omit for unbounded)".to_string(),
            });
        }
        if self.device.sample_rate == 0 {
            return Err(VoxbridgeError::ConfigInvalidValue {
                key: "device.sample_rate".to_string(),
                message: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}
