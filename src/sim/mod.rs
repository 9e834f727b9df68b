// Simulated heater box: thermal plant plus the sensor and power supply wired to it.
// Lets the binary and the integration tests run the full loop without hardware.

pub mod clock;
pub mod plant;
pub mod devices;
