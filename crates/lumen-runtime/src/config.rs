//! Agent configuration
//!
//! Durations are written as human-readable strings (`"500ms"`, `"2s"`).

use std::path::Path;
use std::time::Duration;

use lumen_core::{DeviceId, EpochSeconds, LumenError, LumenResult, MIN_PLAUSIBLE_EPOCH};
use lumen_time::{ClockSyncGate, NTP_SERVERS, SYNC_RETRY_INTERVAL};
use lumen_transport::Protocol;
use serde::{Deserialize, Serialize};

use crate::restart::RESTART_GRACE;

/// Connection string baked in at build time
pub const DEFAULT_CONNECTION_STRING: &str = match option_env!("LUMEN_CONNECTION_STRING") {
    Some(s) => s,
    None => "<Your device connection string>",
};

/// Device id reported in telemetry
pub const DEFAULT_DEVICE_ID: &str = "LightSensorDevice";

/// Agent configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Device connection string
    pub connection_string: String,
    /// Device id carried in every telemetry sample
    pub device_id: String,
    pub protocol: Protocol,
    /// Delay between a reset command and the restart, never below 500 ms
    #[serde(with = "duration_str")]
    pub restart_grace: Duration,
    /// Main loop period
    #[serde(with = "duration_str")]
    pub tick_interval: Duration,
    pub clock_sync: ClockSyncConfig,
    pub log: LogConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            connection_string: DEFAULT_CONNECTION_STRING.to_string(),
            device_id: DEFAULT_DEVICE_ID.to_string(),
            protocol: Protocol::Mqtt,
            restart_grace: RESTART_GRACE,
            tick_interval: Duration::from_millis(100),
            clock_sync: ClockSyncConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl AgentConfig {
    pub fn from_json_str(json: &str) -> LumenResult<Self> {
        let config: AgentConfig =
            serde_json::from_str(json).map_err(|e| LumenError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> LumenResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Check the configuration. The connection string is only parsed at
    /// connection time, where a bad one is a setup failure.
    pub fn validate(&self) -> LumenResult<()> {
        DeviceId::new(self.device_id.as_str())
            .map_err(|_| LumenError::InvalidConfig("device_id must not be empty".into()))?;
        if self.restart_grace < RESTART_GRACE {
            return Err(LumenError::InvalidConfig(format!(
                "restart_grace must be at least {}",
                humantime::format_duration(RESTART_GRACE)
            )));
        }
        if self.tick_interval.is_zero() {
            return Err(LumenError::InvalidConfig("tick_interval must be positive".into()));
        }
        self.clock_sync.validate()
    }

    pub fn device_id(&self) -> LumenResult<DeviceId> {
        DeviceId::new(self.device_id.as_str())
    }
}

/// Clock sync gate settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockSyncConfig {
    pub servers: Vec<String>,
    #[serde(with = "duration_str")]
    pub retry_interval: Duration,
    /// Smallest epoch time accepted as synchronized
    pub min_epoch: u64,
}

impl Default for ClockSyncConfig {
    fn default() -> Self {
        ClockSyncConfig {
            servers: NTP_SERVERS.iter().map(|s| s.to_string()).collect(),
            retry_interval: SYNC_RETRY_INTERVAL,
            min_epoch: MIN_PLAUSIBLE_EPOCH.as_secs(),
        }
    }
}

impl ClockSyncConfig {
    fn validate(&self) -> LumenResult<()> {
        if self.servers.is_empty() {
            return Err(LumenError::InvalidConfig("clock_sync.servers is empty".into()));
        }
        Ok(())
    }

    pub fn gate(&self) -> ClockSyncGate {
        ClockSyncGate::new()
            .with_servers(self.servers.clone())
            .with_retry_interval(self.retry_interval)
            .with_min_epoch(EpochSeconds::new(self.min_epoch))
    }
}

/// Logging settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter used when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: "info".to_string(),
            json: false,
        }
    }
}

mod duration_str {
    use std::time::Duration;

    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*duration))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(de::Error::custom)
    }
}
