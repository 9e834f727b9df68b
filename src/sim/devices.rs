//! devices.rs
//! Simulated sensor and power supply attached to a `ThermalPlant`.
//! - `SimulatedSensor`: DHT22-like climate sensor behind a text query interface
//! - `SimulatedPsu`: programmable supply driving the plant's heater
//! - `SimFaults`: shared switches to unplug the devices or make the sensor read `nan`

use rand::random_range;
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Instant,
};

use crate::component_a::sensor::{SensorTransport, IDENTITY_QUERY, READINGS_QUERY};
use crate::component_b::actuator::{ActuatorTransport, PsuReadback};
use crate::error::{DaqError, DaqResult};
use crate::sim::plant::SharedPlant;
use crate::utils::session_log::fixed_or_nan;

pub const SENSOR_IDENTITY: &str = "Arduino, E. coli sauna";

/// Exponential smoothing weight of the previous value.
const SMOOTHING: f64 = 0.95;

#[derive(Debug, Default)]
struct Faults {
    disconnected: AtomicBool,
    sensor_nan: AtomicBool,
}

/// Fault injection shared between the test/operator side and the devices.
#[derive(Debug, Clone, Default)]
pub struct SimFaults(Arc<Faults>);

impl SimFaults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Devices stop answering.
    pub fn set_disconnected(&self, on: bool) {
        self.0.disconnected.store(on, Ordering::Release);
    }

    pub fn is_disconnected(&self) -> bool {
        self.0.disconnected.load(Ordering::Acquire)
    }

    /// Sensor keeps answering but its climate reads fail (`nan`).
    pub fn set_sensor_nan(&self, on: bool) {
        self.0.sensor_nan.store(on, Ordering::Release);
    }

    pub fn sensor_nan(&self) -> bool {
        self.0.sensor_nan.load(Ordering::Acquire)
    }
}

// ============================================================================
// Sensor
// ============================================================================

pub struct SimulatedSensor {
    plant: SharedPlant,
    faults: SimFaults,
    started: Instant,
    temperature: f64,
    humidity: f64,
    aux_temperature: f64,
    /// Peak-to-peak measurement noise [°C]; humidity noise is ten times larger.
    noise: f64,
}

impl SimulatedSensor {
    pub fn new(plant: SharedPlant, faults: SimFaults) -> Self {
        Self {
            plant,
            faults,
            started: Instant::now(),
            temperature: f64::NAN,
            humidity: f64::NAN,
            aux_temperature: f64::NAN,
            noise: 0.1,
        }
    }

    pub fn with_noise(mut self, noise: f64) -> Self {
        self.noise = noise.max(0.0);
        self
    }

    fn jitter(&self, scale: f64) -> f64 {
        let half = 0.5 * self.noise * scale;
        if half > 0.0 { random_range(-half..half) } else { 0.0 }
    }

    /// Smooth toward the raw value; a failed read (NaN) restarts the filter.
    fn smooth(prev: f64, raw: f64) -> f64 {
        if prev.is_nan() || raw.is_nan() {
            raw
        } else {
            SMOOTHING * prev + (1.0 - SMOOTHING) * raw
        }
    }

    fn sample(&mut self) {
        let (air, heater, rh) = {
            let mut plant = self.plant.lock();
            plant.advance(Instant::now());
            (plant.air_temperature(), plant.heater_temperature(), plant.humidity())
        };

        let (t_raw, rh_raw) = if self.faults.sensor_nan() {
            (f64::NAN, f64::NAN)
        } else {
            (air + self.jitter(1.0), rh + self.jitter(10.0))
        };
        self.temperature = Self::smooth(self.temperature, t_raw);
        self.humidity = Self::smooth(self.humidity, rh_raw);
        self.aux_temperature = Self::smooth(self.aux_temperature, heater + self.jitter(1.0));
    }

    fn reading_line(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}",
            self.started.elapsed().as_millis(),
            fixed_or_nan(self.temperature, 2),
            fixed_or_nan(self.humidity, 1),
            fixed_or_nan(self.aux_temperature, 2)
        )
    }
}

impl SensorTransport for SimulatedSensor {
    fn name(&self) -> &str {
        "sim-sensor"
    }

    fn query(&mut self, command: &str) -> DaqResult<String> {
        if self.faults.is_disconnected() {
            return Err(DaqError::transport(self.name(), "read timed out"));
        }
        match command.trim() {
            READINGS_QUERY => {
                self.sample();
                Ok(format!("{}\n", self.reading_line()))
            }
            IDENTITY_QUERY => Ok(format!("{}\n", SENSOR_IDENTITY)),
            other => Err(DaqError::transport(self.name(), format!("unknown command {:?}", other))),
        }
    }
}

// ============================================================================
// Power supply
// ============================================================================

pub struct SimulatedPsu {
    plant: SharedPlant,
    faults: SimFaults,
}

impl SimulatedPsu {
    pub fn new(plant: SharedPlant, faults: SimFaults) -> Self {
        Self { plant, faults }
    }

    fn check_link(&self) -> DaqResult<()> {
        if self.faults.is_disconnected() {
            return Err(DaqError::transport(self.name(), "no reply"));
        }
        Ok(())
    }
}

impl ActuatorTransport for SimulatedPsu {
    fn name(&self) -> &str {
        "sim-psu"
    }

    fn set_source_voltage(&mut self, volts: f64) -> DaqResult<()> {
        self.check_link()?;
        if !volts.is_finite() {
            return Err(DaqError::InvalidArg { what: "source voltage must be finite" });
        }
        self.plant.lock().set_source_voltage(volts);
        Ok(())
    }

    fn set_output_enabled(&mut self, enabled: bool) -> DaqResult<()> {
        self.check_link()?;
        self.plant.lock().set_output_enabled(enabled);
        Ok(())
    }

    fn read_back(&mut self) -> DaqResult<PsuReadback> {
        self.check_link()?;
        let mut plant = self.plant.lock();
        plant.advance(Instant::now());
        Ok(PsuReadback {
            source_voltage: plant.source_voltage(),
            measured_voltage: plant.heater_voltage(),
            measured_current: plant.heater_current(),
            measured_power: plant.heater_power(),
            output_enabled: plant.output_enabled(),
        })
    }
}
