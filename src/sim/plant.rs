//! plant.rs
//! Lumped thermal model of the heater box.
//!
//! One air node and one heater node, both losing heat to ambient. Heater power is
//! `V²/R` while the supply output is on. Humidity follows the air temperature: the box is
//! sealed, so relative humidity drops as the air warms up.
//!
//! The model integrates lazily: every access advances it to the current instant, scaled by
//! `time_scale` so a long warm-up can be watched in a short run.

use parking_lot::Mutex;
use std::{sync::Arc, time::Instant};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlantParams {
    pub ambient_c: f64,
    /// Relative humidity at ambient temperature.
    pub ambient_humidity_pct: f64,
    pub heater_resistance_ohm: f64,
    /// Heat capacity of the air node [J/K].
    pub air_capacity: f64,
    /// Heat capacity of the heater node [J/K].
    pub heater_capacity: f64,
    /// Heater → air conductance [W/K].
    pub heater_to_air: f64,
    /// Air → ambient conductance [W/K].
    pub air_to_ambient: f64,
    /// Simulated seconds per wall-clock second.
    pub time_scale: f64,
}

impl Default for PlantParams {
    fn default() -> Self {
        Self {
            ambient_c: 22.0,
            ambient_humidity_pct: 55.0,
            heater_resistance_ohm: 10.0,
            air_capacity: 400.0,
            heater_capacity: 60.0,
            heater_to_air: 1.5,
            air_to_ambient: 0.45,
            time_scale: 1.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ThermalPlant {
    params: PlantParams,
    air_c: f64,
    heater_c: f64,
    source_voltage: f64,
    output_enabled: bool,
    last_update: Instant,
}

/// Plant shared by the simulated sensor and power supply.
pub type SharedPlant = Arc<Mutex<ThermalPlant>>;

/// Largest explicit Euler step [s].
const MAX_STEP_S: f64 = 0.5;

impl ThermalPlant {
    pub fn new(params: PlantParams) -> Self {
        Self {
            air_c: params.ambient_c,
            heater_c: params.ambient_c,
            params,
            source_voltage: 0.0,
            output_enabled: false,
            last_update: Instant::now(),
        }
    }

    pub fn shared(params: PlantParams) -> SharedPlant {
        Arc::new(Mutex::new(Self::new(params)))
    }

    pub fn params(&self) -> &PlantParams {
        &self.params
    }

    pub fn air_temperature(&self) -> f64 {
        self.air_c
    }

    pub fn heater_temperature(&self) -> f64 {
        self.heater_c
    }

    /// Relative humidity of the sealed box at the current air temperature.
    pub fn humidity(&self) -> f64 {
        let rh = self.params.ambient_humidity_pct * (-0.06 * (self.air_c - self.params.ambient_c)).exp();
        rh.clamp(0.0, 100.0)
    }

    pub fn source_voltage(&self) -> f64 {
        self.source_voltage
    }

    pub fn output_enabled(&self) -> bool {
        self.output_enabled
    }

    pub fn set_source_voltage(&mut self, volts: f64) {
        self.advance(Instant::now());
        self.source_voltage = volts.max(0.0);
    }

    pub fn set_output_enabled(&mut self, enabled: bool) {
        self.advance(Instant::now());
        self.output_enabled = enabled;
    }

    /// Voltage across the heater.
    pub fn heater_voltage(&self) -> f64 {
        if self.output_enabled { self.source_voltage } else { 0.0 }
    }

    pub fn heater_current(&self) -> f64 {
        self.heater_voltage() / self.params.heater_resistance_ohm
    }

    pub fn heater_power(&self) -> f64 {
        let v = self.heater_voltage();
        v * v / self.params.heater_resistance_ohm
    }

    /// Integrate up to `now`.
    pub fn advance(&mut self, now: Instant) {
        let wall = now.saturating_duration_since(self.last_update).as_secs_f64();
        self.last_update = self.last_update.max(now);
        self.step(wall * self.params.time_scale);
    }

    /// Integrate `dt` simulated seconds.
    pub fn step(&mut self, dt: f64) {
        let mut remaining = dt.max(0.0);
        while remaining > 0.0 {
            let h = remaining.min(MAX_STEP_S);
            let p = &self.params;
            let q_heater = self.heater_power();
            let q_transfer = p.heater_to_air * (self.heater_c - self.air_c);
            let q_loss = p.air_to_ambient * (self.air_c - p.ambient_c);

            self.heater_c += h * (q_heater - q_transfer) / p.heater_capacity;
            self.air_c += h * (q_transfer - q_loss) / p.air_capacity;
            remaining -= h;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heater_off_stays_at_ambient() {
        let mut plant = ThermalPlant::new(PlantParams::default());
        plant.step(3_600.0);
        assert!((plant.air_temperature() - 22.0).abs() < 1e-9);
        assert!((plant.humidity() - 55.0).abs() < 1e-9);
    }

    #[test]
    fn heating_warms_air_and_dries_it() {
        let mut plant = ThermalPlant::new(PlantParams::default());
        plant.set_source_voltage(12.0);
        plant.set_output_enabled(true);
        assert!((plant.heater_power() - 14.4).abs() < 1e-9);

        plant.step(1_800.0);
        assert!(plant.air_temperature() > 30.0);
        assert!(plant.heater_temperature() > plant.air_temperature());
        assert!(plant.humidity() < 55.0);
    }

    #[test]
    fn steady_state_matches_loss_balance() {
        let mut plant = ThermalPlant::new(PlantParams::default());
        plant.set_source_voltage(6.0);
        plant.set_output_enabled(true);
        plant.step(50_000.0);
        // 3.6 W / 0.45 W/K above ambient
        assert!((plant.air_temperature() - 30.0).abs() < 0.05);
    }

    #[test]
    fn output_off_means_no_power() {
        let mut plant = ThermalPlant::new(PlantParams::default());
        plant.set_source_voltage(12.0);
        assert_eq!(plant.heater_power(), 0.0);
        assert_eq!(plant.heater_current(), 0.0);
    }
}
