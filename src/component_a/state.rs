//! state.rs
//! Process state of the heater box and its published snapshot.
//!
//! `ProcessState` is owned by the acquisition cycle and is the only writer.
//! Readers (status display, chart feeder, operator console) never touch it; they read a
//! `ProcessSnapshot` copied into a `SnapshotCell` once per cycle. The lock is held only
//! for the copy, never for the cycle.

use parking_lot::RwLock;
use std::sync::Arc;

use crate::component_a::sensor::SensorReading;
use crate::component_b::controller::ControllerMode;

/// Latest reading and derived control status. Single writer: the acquisition cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessState {
    /// Local monotonic time of the last successful reading [s]; NaN until the first one.
    pub timestamp: f64,
    /// Device uptime of the last successful reading [s]; liveness signal only.
    pub device_time: f64,
    pub measured_temperature: f64,
    pub measured_humidity: f64,
    pub aux_temperature: f64,
    pub controller_engaged: bool,
}

impl Default for ProcessState {
    fn default() -> Self {
        Self {
            timestamp: f64::NAN,
            device_time: f64::NAN,
            measured_temperature: f64::NAN,
            measured_humidity: f64::NAN,
            aux_temperature: f64::NAN,
            controller_engaged: false,
        }
    }
}

impl ProcessState {
    /// Fold a successful reading into the state, stamped with the local clock.
    ///
    /// A stamp older than the current one is ignored so `timestamp` never decreases.
    pub fn apply_reading(&mut self, reading: &SensorReading, local_time: f64) {
        if self.timestamp.is_nan() || local_time >= self.timestamp {
            self.timestamp = local_time;
        }
        self.device_time = reading.elapsed_device_time;
        self.measured_temperature = reading.temperature_c;
        self.measured_humidity = reading.humidity_pct;
        self.aux_temperature = reading.aux_temperature_c;
    }

    pub fn measured_value_is_valid(&self) -> bool {
        self.measured_temperature.is_finite()
    }
}

/// Immutable per-cycle view for readers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessSnapshot {
    pub process: ProcessState,
    pub mode: ControllerMode,
    pub feedback_enabled: bool,
    pub setpoint: f64,
    /// Last controller output [V]; meaningful only when `mode` is `Auto`.
    pub pid_output: f64,
    pub heater_power: f64,
    pub source_voltage: f64,
    pub psu_output_enabled: bool,
    /// Successful cycles since start.
    pub update_counter: u64,
}

impl Default for ProcessSnapshot {
    fn default() -> Self {
        Self {
            process: ProcessState::default(),
            mode: ControllerMode::Manual,
            feedback_enabled: false,
            setpoint: f64::NAN,
            pid_output: f64::NAN,
            heater_power: f64::NAN,
            source_voltage: f64::NAN,
            psu_output_enabled: false,
            update_counter: 0,
        }
    }
}

/// Shared, lock-for-copy-only holder of the latest snapshot.
#[derive(Clone, Default)]
pub struct SnapshotCell {
    inner: Arc<RwLock<ProcessSnapshot>>,
}

impl SnapshotCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, snapshot: ProcessSnapshot) {
        *self.inner.write() = snapshot;
    }

    #[inline]
    pub fn get(&self) -> ProcessSnapshot {
        *self.inner.read()
    }
}
