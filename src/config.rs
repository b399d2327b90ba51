use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use hub_shared::{limits, DeviceConfig};
use serde::Deserialize;

use crate::transport::{LinkTimeouts, TransportSettings};

/// On-disk client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    pub device: DeviceConfig,
    pub transport: TransportSettings,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub video: Option<VideoConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub connect_ms: u64,
    pub io_ms: u64,
    pub poll_ms: u64,
    pub inter_frame_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_ms: limits::CONNECT_TIMEOUT_MS,
            io_ms: limits::IO_TIMEOUT_MS,
            poll_ms: limits::POLL_INTERVAL_MS,
            inter_frame_ms: limits::INTER_FRAME_GAP_MS,
        }
    }
}

impl From<TimeoutConfig> for LinkTimeouts {
    fn from(config: TimeoutConfig) -> Self {
        Self {
            connect: Duration::from_millis(config.connect_ms),
            io: Duration::from_millis(config.io_ms),
            poll: Duration::from_millis(config.poll_ms),
            inter_frame: Duration::from_millis(config.inter_frame_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VideoConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl ClientConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: ClientConfig = toml::from_str(content)?;
        config.device.validate()?;
        Ok(config)
    }

    pub fn link_timeouts(&self) -> LinkTimeouts {
        self.timeouts.into()
    }
}
