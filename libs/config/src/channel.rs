//! Channel, server, reconnect and preferred-host settings

use crate::defaults;
use crate::error::{ConfigError, Result};
use network::{Backpressure, BackoffPolicy, ChannelSettings, Endpoint};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What `submit` does when the output buffer pool is exhausted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackpressureMode {
    #[default]
    Block,
    Reject,
}

/// Output buffer and writer tuning shared by client channels and server channels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelTuning {
    pub ping_timeout_ms: u64,
    pub guaranteed_output_buffers: usize,
    pub max_output_buffers: usize,
    pub high_water_mark: usize,
    pub compression_threshold: usize,
    pub direct_write: bool,
    pub backpressure: BackpressureMode,
    /// Upper bound for a blocked submit; unset waits indefinitely
    pub block_timeout_ms: Option<u64>,
}

impl Default for ChannelTuning {
    fn default() -> Self {
        Self {
            ping_timeout_ms: defaults::PING_TIMEOUT_MS,
            guaranteed_output_buffers: defaults::GUARANTEED_OUTPUT_BUFFERS,
            max_output_buffers: defaults::MAX_OUTPUT_BUFFERS,
            high_water_mark: defaults::HIGH_WATER_MARK,
            compression_threshold: defaults::COMPRESSION_THRESHOLD,
            direct_write: false,
            backpressure: BackpressureMode::Block,
            block_timeout_ms: None,
        }
    }
}

impl ChannelTuning {
    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    pub fn backpressure(&self) -> Backpressure {
        match self.backpressure {
            BackpressureMode::Block => {
                Backpressure::Block(self.block_timeout_ms.map(Duration::from_millis))
            }
            BackpressureMode::Reject => Backpressure::Reject,
        }
    }

    /// Live writer settings seeded from this configuration
    pub fn settings(&self) -> ChannelSettings {
        ChannelSettings::new(
            self.high_water_mark,
            self.compression_threshold,
            self.direct_write,
        )
    }

    pub fn validate(&self, owner: &str) -> Result<()> {
        if self.ping_timeout_ms == 0 {
            return Err(ConfigError::invalid(
                format!("{owner}.ping_timeout_ms"),
                "must be greater than zero",
            ));
        }
        if self.guaranteed_output_buffers == 0 {
            return Err(ConfigError::invalid(
                format!("{owner}.guaranteed_output_buffers"),
                "at least one buffer is required",
            ));
        }
        if self.max_output_buffers < self.guaranteed_output_buffers {
            return Err(ConfigError::invalid(
                format!("{owner}.max_output_buffers"),
                format!(
                    "{} is below guaranteed_output_buffers {}",
                    self.max_output_buffers, self.guaranteed_output_buffers
                ),
            ));
        }
        if self.compression_threshold < defaults::COMPRESSION_THRESHOLD {
            return Err(ConfigError::invalid(
                format!("{owner}.compression_threshold"),
                format!("must be at least {}", defaults::COMPRESSION_THRESHOLD),
            ));
        }
        Ok(())
    }
}

/// One client channel: a host to connect to plus its tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub name: String,
    /// `host:port` or `memory://name`
    pub host: String,
    #[serde(default = "defaults::connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Request a CRC32 trailer on every frame
    #[serde(default)]
    pub checksum: bool,
    #[serde(flatten)]
    pub tuning: ChannelTuning,
}

impl ChannelConfig {
    /// Channel with default tuning; fails on an empty name or malformed host
    pub fn new(name: impl Into<String>, host: impl Into<String>) -> Result<Self> {
        let config = Self {
            name: name.into(),
            host: host.into(),
            connect_timeout_ms: defaults::CONNECT_TIMEOUT_MS,
            checksum: false,
            tuning: ChannelTuning::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn endpoint(&self) -> Result<Endpoint> {
        parse_endpoint(&format!("channel {}", self.name), &self.host)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn with_tuning(mut self, tuning: ChannelTuning) -> Result<Self> {
        tuning.validate(&self.name)?;
        self.tuning = tuning;
        Ok(self)
    }

    pub fn with_checksum(mut self, checksum: bool) -> Self {
        self.checksum = checksum;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::invalid("channel.name", "must not be empty"));
        }
        self.endpoint()?;
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::invalid(
                format!("{}.connect_timeout_ms", self.name),
                "must be greater than zero",
            ));
        }
        self.tuning.validate(&self.name)
    }
}

/// Listening side of an interactive provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub name: String,
    /// `host:port` (port 0 picks a free port) or `memory://name`
    pub bind: String,
    /// Buffers shared by all accepted channels beyond their guaranteed ones
    #[serde(default = "defaults::server_pool_buffers")]
    pub shared_pool_buffers: usize,
    /// Time allowed for a client to complete the handshake
    #[serde(default = "defaults::connect_timeout_ms")]
    pub handshake_timeout_ms: u64,
    #[serde(default = "defaults::allow_checksum")]
    pub allow_checksum: bool,
    #[serde(flatten)]
    pub tuning: ChannelTuning,
}

impl ServerConfig {
    pub fn new(name: impl Into<String>, bind: impl Into<String>) -> Result<Self> {
        let config = Self {
            name: name.into(),
            bind: bind.into(),
            shared_pool_buffers: defaults::SERVER_POOL_BUFFERS,
            handshake_timeout_ms: defaults::CONNECT_TIMEOUT_MS,
            allow_checksum: true,
            tuning: ChannelTuning::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn endpoint(&self) -> Result<Endpoint> {
        parse_endpoint(&format!("server {}", self.name), &self.bind)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::invalid("server.name", "must not be empty"));
        }
        self.endpoint()?;
        self.tuning.validate(&self.name)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "Server_1".into(),
            bind: format!("0.0.0.0:{}", defaults::PORT),
            shared_pool_buffers: defaults::SERVER_POOL_BUFFERS,
            handshake_timeout_ms: defaults::CONNECT_TIMEOUT_MS,
            allow_checksum: true,
            tuning: ChannelTuning::default(),
        }
    }
}

/// Reconnect policy for client channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    /// -1 retries forever
    pub attempt_limit: i32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: defaults::RECONNECT_MIN_DELAY_MS,
            max_delay_ms: defaults::RECONNECT_MAX_DELAY_MS,
            attempt_limit: -1,
        }
    }
}

impl ReconnectConfig {
    pub fn new(min_delay: Duration, max_delay: Duration, attempt_limit: i32) -> Result<Self> {
        let config = Self {
            min_delay_ms: min_delay.as_millis() as u64,
            max_delay_ms: max_delay.as_millis() as u64,
            attempt_limit,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            min_delay: Duration::from_millis(self.min_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            attempt_limit: self.attempt_limit,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_delay_ms == 0 {
            return Err(ConfigError::invalid(
                "reconnect.min_delay_ms",
                "must be greater than zero",
            ));
        }
        if self.min_delay_ms > self.max_delay_ms {
            return Err(ConfigError::invalid(
                "reconnect.max_delay_ms",
                format!(
                    "{} is below min_delay_ms {}",
                    self.max_delay_ms, self.min_delay_ms
                ),
            ));
        }
        if self.attempt_limit < -1 {
            return Err(ConfigError::invalid(
                "reconnect.attempt_limit",
                "use -1 for unlimited attempts",
            ));
        }
        Ok(())
    }
}

/// Fallback to a preferred host while connected elsewhere
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PreferredHostConfig {
    pub enabled: bool,
    /// Index into the session's channel list
    pub host_index: usize,
    /// 0 disables periodic detection; fallback then only happens on request
    pub detection_interval_ms: u64,
}

impl PreferredHostConfig {
    pub fn detection_interval(&self) -> Option<Duration> {
        (self.enabled && self.detection_interval_ms > 0)
            .then(|| Duration::from_millis(self.detection_interval_ms))
    }

    pub fn validate(&self, channel_count: usize) -> Result<()> {
        if self.enabled && self.host_index >= channel_count {
            return Err(ConfigError::invalid(
                "preferred_host.host_index",
                format!("{} exceeds the {channel_count} configured channels", self.host_index),
            ));
        }
        Ok(())
    }
}

/// Named group of channels serving the same services (request routing)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub name: String,
    /// Channel names, in failover order
    pub channels: Vec<String>,
}

fn parse_endpoint(owner: &str, value: &str) -> Result<Endpoint> {
    value
        .parse::<Endpoint>()
        .map_err(|e| ConfigError::invalid(format!("{owner} host"), e.to_string()))
}
