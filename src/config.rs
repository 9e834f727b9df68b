//! config.rs
//! Runtime configuration: DAQ cadence, PID defaults, power supply polling and log location.
//!
//! Every field has a default matching the reference deployment, so an empty (or absent)
//! YAML file yields a working setup.

use serde::{Deserialize, Serialize};
use std::{fs, path::{Path, PathBuf}, time::Duration};

use crate::error::DaqResult;

pub const DEFAULT_DAQ_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_CHART_INTERVAL_MS: u64 = 500;
pub const DEFAULT_CHART_HISTORY_SECS: u64 = 7_200;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub daq_interval_ms: u64,
    pub chart_interval_ms: u64,
    pub chart_history_secs: u64,
    /// Consecutive failed cycles before the DAQ worker declares the sensor lost.
    pub critical_not_alive_count: u32,
    pub pid: PidConfig,
    pub psu: PsuConfig,
    pub log_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PidConfig {
    pub setpoint: f64,
    pub kp: f64,
    /// Integral gain, per second.
    pub ki: f64,
    pub kd: f64,
    /// Upper clamp on the commanded heater voltage [V].
    pub output_ceiling: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PsuConfig {
    pub poll_interval_ms: u64,
    pub critical_not_alive_count: u32,
    /// Queued commands beyond this are dropped.
    pub command_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            daq_interval_ms: DEFAULT_DAQ_INTERVAL_MS,
            chart_interval_ms: DEFAULT_CHART_INTERVAL_MS,
            chart_history_secs: DEFAULT_CHART_HISTORY_SECS,
            critical_not_alive_count: 1,
            pid: PidConfig::default(),
            psu: PsuConfig::default(),
            log_dir: PathBuf::from("data/logs"),
        }
    }
}

impl Default for PidConfig {
    fn default() -> Self {
        Self {
            setpoint: 37.0,
            kp: 4.0,
            ki: 0.003,
            kd: 0.0,
            output_ceiling: 12.0,
        }
    }
}

impl Default for PsuConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 200,
            critical_not_alive_count: 3,
            command_capacity: 8,
        }
    }
}

impl Config {
    pub fn from_yaml_str(text: &str) -> DaqResult<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn load(path: &Path) -> DaqResult<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    pub fn daq_interval(&self) -> Duration {
        Duration::from_millis(self.daq_interval_ms.max(1))
    }

    pub fn chart_interval(&self) -> Duration {
        Duration::from_millis(self.chart_interval_ms.max(1))
    }

    /// Number of DAQ samples that cover the chart history window.
    pub fn chart_capacity(&self) -> usize {
        let ms = self.chart_history_secs.saturating_mul(1_000);
        (ms / self.daq_interval_ms.max(1)).max(1) as usize
    }
}

impl PsuConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_yaml_gives_defaults() {
        let cfg = Config::from_yaml_str("").unwrap();
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.chart_capacity(), 7_200);
    }

    #[test]
    fn partial_yaml_overrides_only_named_fields() {
        let cfg = Config::from_yaml_str("daq_interval_ms: 500\npid:\n  kp: 2.5\n").unwrap();
        assert_eq!(cfg.daq_interval_ms, 500);
        assert_eq!(cfg.pid.kp, 2.5);
        assert_eq!(cfg.pid.setpoint, 37.0);
        assert_eq!(cfg.psu.poll_interval_ms, 200);
        assert_eq!(cfg.chart_capacity(), 14_400);
    }

    #[test]
    fn malformed_yaml_is_a_config_error() {
        assert!(Config::from_yaml_str("daq_interval_ms: [1, 2").is_err());
    }
}
