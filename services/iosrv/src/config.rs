//! iosrv configuration
//!
//! Loaded from `config/iosrv.yaml`, overridden by `IOSRV_SECTION__FIELD`
//! environment variables. Every field has a default so a missing file still
//! yields a runnable (simulated) gateway.

use std::path::{Path, PathBuf};
use std::time::Duration;

use pulse_model::{CLASSIFICATION_BITS, OUTPUT_BITS};
use serde::{Deserialize, Serialize};

use crate::error::{IoSrvError, Result};

/// Environment variable prefix
pub const ENV_PREFIX: &str = "IOSRV_";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IoSrvConfig {
    pub machine: MachineConfig,
    pub input_device: InputDeviceConfig,
    pub output_device: OutputDeviceConfig,
    pub connection: ConnectionConfig,
    pub database: DatabaseConfig,
    pub retry: RetryConfig,
    pub sync: SyncConfig,
    pub blink: BlinkConfig,
    pub pipeline: PipelineConfig,
    pub simulation: SimulationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    pub machine_id: i64,
    pub device_name: String,
    pub location: String,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            machine_id: 1,
            device_name: "machine-1".to_string(),
            location: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputDeviceConfig {
    /// `host:port` of the input module
    pub address: String,
    pub number_of_inputs: usize,
    /// Optional per-line labels for logs
    pub input_names: Vec<String>,
}

impl Default for InputDeviceConfig {
    fn default() -> Self {
        Self {
            address: "192.168.127.254:9500".to_string(),
            number_of_inputs: 16,
            input_names: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputDeviceConfig {
    pub address: String,
    pub number_of_outputs: usize,
}

impl Default for OutputDeviceConfig {
    fn default() -> Self {
        Self {
            address: "192.168.127.253:9500".to_string(),
            number_of_outputs: 16,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub reconnect_interval_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            reconnect_interval_ms: 2000,
        }
    }
}

impl ConnectionConfig {
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Primary (shared) store
    pub primary_path: PathBuf,
    /// Local store holding the rule copy and the retry queue
    pub fallback_path: PathBuf,
    pub enable_fallback: bool,
    /// In-place retries of a transient upsert failure
    pub store_retry_attempts: u32,
    pub store_retry_delay_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            primary_path: PathBuf::from("data/pulse.db"),
            fallback_path: PathBuf::from("fallback.db"),
            enable_fallback: true,
            store_retry_attempts: 3,
            store_retry_delay_ms: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub interval_secs: u64,
    pub max_attempts: i64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            interval_secs: pulse_store::DEFAULT_RETRY_INTERVAL_SECS,
            max_attempts: pulse_store::DEFAULT_MAX_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Local wall-clock hour of the daily run
    pub hour: u32,
    pub run_on_startup: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            hour: pulse_store::sync::DEFAULT_SYNC_HOUR,
            run_on_startup: true,
        }
    }
}

/// How marked bits move during a blink
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlinkMode {
    /// Start from the final values and invert marked bits every tick
    #[default]
    Toggle,
    /// Marked bits alternate between their final value and off
    Pattern,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BlinkConfig {
    pub period_ms: u64,
    pub duration_ms: u64,
    pub mode: BlinkMode,
}

impl Default for BlinkConfig {
    fn default() -> Self {
        Self {
            period_ms: 125,
            duration_ms: 5000,
            mode: BlinkMode::Toggle,
        }
    }
}

impl BlinkConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Snapshots buffered between the monitor and the recorder
    pub queue_capacity: usize,
    /// Skip a snapshot identical to the one before it
    pub suppress_duplicates: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 100,
            suppress_duplicates: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Flip random input lines on the simulated input module
    pub enabled: bool,
    pub change_interval_ms: u64,
    /// Chance per change tick that the simulated module drops its session
    pub disconnect_chance: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            change_interval_ms: 3000,
            disconnect_chance: 0.0,
        }
    }
}

impl IoSrvConfig {
    /// Load from file and environment, then validate
    pub fn load(path: &Path) -> Result<Self> {
        let config: Self = common::config_loader::load_config(path, ENV_PREFIX)
            .map_err(|e| IoSrvError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(IoSrvError::ConfigError(msg));

        if self.input_device.number_of_inputs < CLASSIFICATION_BITS {
            return fail(format!(
                "input_device.number_of_inputs must be at least {}, got {}",
                CLASSIFICATION_BITS, self.input_device.number_of_inputs
            ));
        }
        if self.output_device.number_of_outputs < OUTPUT_BITS {
            return fail(format!(
                "output_device.number_of_outputs must be at least {}, got {}",
                OUTPUT_BITS, self.output_device.number_of_outputs
            ));
        }
        if self.connection.reconnect_interval_ms == 0 {
            return fail("connection.reconnect_interval_ms must be greater than 0".into());
        }
        if self.retry.interval_secs == 0 {
            return fail("retry.interval_secs must be greater than 0".into());
        }
        if self.retry.max_attempts <= 0 {
            return fail("retry.max_attempts must be greater than 0".into());
        }
        if self.sync.hour > 23 {
            return fail(format!("sync.hour must be 0-23, got {}", self.sync.hour));
        }
        if self.blink.period_ms == 0 {
            return fail("blink.period_ms must be greater than 0".into());
        }
        if self.pipeline.queue_capacity == 0 {
            return fail("pipeline.queue_capacity must be greater than 0".into());
        }
        if self.simulation.enabled && self.simulation.change_interval_ms == 0 {
            return fail("simulation.change_interval_ms must be greater than 0".into());
        }
        if !(0.0..=1.0).contains(&self.simulation.disconnect_chance) {
            return fail("simulation.disconnect_chance must be between 0 and 1".into());
        }
        Ok(())
    }

    /// Effective configuration as YAML (for `--validate`)
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| IoSrvError::InternalError(e.to_string()))
    }
}
