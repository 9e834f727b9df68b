//! sensor.rs
//! Climate sensor side of the acquisition loop.
//! - `SensorTransport`: anything that answers a text query with a raw reply line
//! - `parse_frame`: tab-delimited reply → typed `SensorReading` (pure, no logging)
//!
//! Reply layout: `device_time_ms \t temperature_C \t humidity_pct \t aux_temperature_C`.
//! The sensor firmware prints `nan` for a failed read; that is still a well-formed field.

use crate::error::{DaqError, DaqResult};

/// Query string that makes the sensor report its current readings.
pub const READINGS_QUERY: &str = "?";
/// Query string that makes the sensor report its identity.
pub const IDENTITY_QUERY: &str = "id?";

pub const FRAME_FIELDS: usize = 4;
const FIELD_NAMES: [&str; FRAME_FIELDS] = ["device_time", "temperature", "humidity", "aux_temperature"];

/// One parsed sensor reply. Ephemeral: folded into `ProcessState` and dropped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    /// Device uptime in seconds (reported in ms by the device).
    pub elapsed_device_time: f64,
    pub temperature_c: f64,
    pub humidity_pct: f64,
    /// Heater surface temperature; logged only, never fed to the controller.
    pub aux_temperature_c: f64,
}

/// Serial-like device that answers one text query with one reply line.
///
/// Implementations own their framing and timeouts; any failure is a `DaqError::Transport`.
pub trait SensorTransport: Send {
    fn name(&self) -> &str;

    fn query(&mut self, command: &str) -> DaqResult<String>;
}

/// Parse a raw reply into a `SensorReading`.
pub fn parse_frame(raw: &str) -> DaqResult<SensorReading> {
    let line = raw.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return Err(DaqError::parse("empty reply"));
    }

    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() != FRAME_FIELDS {
        return Err(DaqError::parse(format!(
            "expected {} fields, got {}",
            FRAME_FIELDS,
            fields.len()
        )));
    }

    let mut values = [0.0_f64; FRAME_FIELDS];
    for (i, field) in fields.iter().enumerate() {
        values[i] = field.trim().parse::<f64>().map_err(|_| {
            DaqError::parse(format!("field '{}' is not numeric: {:?}", FIELD_NAMES[i], field))
        })?;
    }

    Ok(SensorReading {
        elapsed_device_time: values[0] / 1_000.0,
        temperature_c: values[1],
        humidity_pct: values[2],
        aux_temperature_c: values[3],
    })
}

/// Query the transport for one frame and parse it.
pub fn acquire(transport: &mut dyn SensorTransport) -> DaqResult<SensorReading> {
    let reply = transport.query(READINGS_QUERY)?;
    parse_frame(&reply)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_reference_frame() {
        let r = parse_frame("1000\t36.50\t45.0\t36.0").unwrap();
        assert_eq!(r.elapsed_device_time, 1.0);
        assert_eq!(r.temperature_c, 36.5);
        assert_eq!(r.humidity_pct, 45.0);
        assert_eq!(r.aux_temperature_c, 36.0);
    }

    #[test]
    fn tolerates_line_ending_and_padding() {
        let r = parse_frame("2500\t 21.125\t55.5 \t-3.25\r\n").unwrap();
        assert_eq!(r.elapsed_device_time, 2.5);
        assert_eq!(r.temperature_c, 21.125);
        assert_eq!(r.aux_temperature_c, -3.25);
    }

    #[test]
    fn nan_fields_are_well_formed() {
        let r = parse_frame("3000\tnan\tnan\t22.00").unwrap();
        assert!(r.temperature_c.is_nan());
        assert!(r.humidity_pct.is_nan());
    }

    #[test]
    fn rejects_wrong_field_count() {
        assert!(matches!(parse_frame("1000\t36.5\t45.0"), Err(DaqError::Parse { .. })));
        assert!(matches!(parse_frame("1\t2\t3\t4\t5"), Err(DaqError::Parse { .. })));
    }

    #[test]
    fn rejects_non_numeric_and_empty() {
        assert!(parse_frame("1000\tabc\t45.0\t36.0").is_err());
        assert!(parse_frame("1000\t\t45.0\t36.0").is_err());
        assert!(parse_frame("").is_err());
        assert!(parse_frame("\r\n").is_err());
        assert!(parse_frame("Arduino, E. coli sauna").is_err());
    }
}
