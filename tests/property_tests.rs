//! Property tests for frame parsing, the PID controller and operator clamping.

use proptest::prelude::*;
use std::time::{Duration, Instant};

use sauna_control::component_a::sensor::parse_frame;
use sauna_control::component_b::controller::{ControllerMode, PidController};
use sauna_control::component_b::operator::OperatorControls;
use sauna_control::config::PidConfig;

fn round(v: f64, decimals: usize) -> f64 {
    format!("{:.*}", decimals, v).parse().unwrap()
}

// ── Frame parsing ────────────────────────────────────────────

proptest! {
    /// A frame printed the way the firmware prints it parses back to the printed values.
    #[test]
    fn valid_frames_parse_to_printed_values(
        ms in 0u64..=4_000_000_000u64,
        t in -40.0f64..80.0,
        rh in 0.0f64..100.0,
        aux in -40.0f64..120.0,
        crlf in any::<bool>(),
    ) {
        let raw = format!(
            "{}\t{:.2}\t{:.1}\t{:.2}{}",
            ms, t, rh, aux, if crlf { "\r\n" } else { "\n" }
        );
        let r = parse_frame(&raw).unwrap();

        prop_assert!((r.elapsed_device_time - ms as f64 / 1000.0).abs() < 1e-9);
        prop_assert_eq!(r.temperature_c, round(t, 2));
        prop_assert_eq!(r.humidity_pct, round(rh, 1));
        prop_assert_eq!(r.aux_temperature_c, round(aux, 2));
    }

    #[test]
    fn wrong_field_count_is_rejected(
        fields in proptest::collection::vec(-100.0f64..100.0, 0..=8)
            .prop_filter("not four fields", |f| f.len() != 4),
    ) {
        let raw = fields.iter().map(|v| format!("{:.2}", v)).collect::<Vec<_>>().join("\t");
        prop_assert!(parse_frame(&raw).is_err());
    }

    #[test]
    fn non_numeric_field_is_rejected(
        pos in 0usize..4,
        junk in "[a-mo-z]{1,6}",
    ) {
        let mut fields = vec!["1000".to_string(), "36.50".into(), "45.0".into(), "36.0".into()];
        fields[pos] = junk;
        prop_assert!(parse_frame(&fields.join("\t")).is_err());
    }
}

// ── PID controller ───────────────────────────────────────────

fn controller(kp: f64, ki: f64, kd: f64, setpoint: f64, ceiling: f64) -> PidController {
    PidController::new(kp, ki, kd)
        .with_setpoint(setpoint)
        .with_output_limits(0.0, ceiling)
        .unwrap()
}

proptest! {
    /// In Auto, every computed output stays inside the output limits.
    #[test]
    fn auto_output_stays_within_limits(
        kp in 0.0f64..10.0,
        ki in 0.0f64..1.0,
        kd in 0.0f64..1.0,
        setpoint in 25.0f64..40.0,
        ceiling in 0.0f64..18.0,
        start_output in -50.0f64..50.0,
        steps in proptest::collection::vec((-20.0f64..120.0, 1u64..5_000), 1..60),
    ) {
        let mut pid = controller(kp, ki, kd, setpoint, ceiling);
        let mut now = Instant::now();
        pid.set_mode_at(ControllerMode::Auto, steps[0].0, start_output, now);
        prop_assert!(pid.output() >= 0.0 && pid.output() <= ceiling);

        for (input, dt_ms) in steps {
            now += Duration::from_millis(dt_ms);
            prop_assert!(pid.compute_at(input, now));
            let out = pid.output();
            prop_assert!(out >= 0.0 && out <= ceiling, "output {} outside [0, {}]", out, ceiling);
        }
    }

    /// Manual → Auto takes over at the actuator's present output.
    #[test]
    fn manual_to_auto_is_bumpless(
        kp in 0.0f64..10.0,
        ki in 0.0f64..1.0,
        setpoint in 25.0f64..40.0,
        input in 0.0f64..60.0,
        output_frac in 0.0f64..=1.0,
    ) {
        let ceiling = 12.0;
        let current_output = output_frac * ceiling;
        let mut pid = controller(kp, ki, 0.0, setpoint, ceiling);
        let now = Instant::now();

        pid.set_mode_at(ControllerMode::Auto, input, current_output, now);
        prop_assert!(pid.compute_at(input, now));
        prop_assert!((pid.output() - current_output).abs() < 1e-9);
    }

    /// An invalid measurement never leaves the controller in Auto.
    #[test]
    fn invalid_measurement_forces_manual(
        actuator_enabled in any::<bool>(),
        feedback_enabled in any::<bool>(),
        bad in prop_oneof![Just(f64::NAN), Just(f64::INFINITY), Just(f64::NEG_INFINITY)],
    ) {
        prop_assert_eq!(
            ControllerMode::evaluate(actuator_enabled, feedback_enabled, false),
            ControllerMode::Manual
        );

        let mut pid = controller(4.0, 0.003, 0.0, 37.0, 12.0);
        let now = Instant::now();
        pid.set_mode_at(ControllerMode::Auto, 30.0, 5.0, now);
        pid.set_mode_at(ControllerMode::Auto, bad, 5.0, now);
        prop_assert_eq!(pid.mode(), ControllerMode::Manual);
        prop_assert!(!pid.compute_at(bad, now));
    }
}

// ── Operator clamping ────────────────────────────────────────

proptest! {
    #[test]
    fn operator_entries_are_always_clamped(
        setpoint in any::<f64>(),
        kp in any::<f64>(),
        ki in any::<f64>(),
        ceiling in any::<f64>(),
    ) {
        let controls = OperatorControls::new(&PidConfig::default());
        let sp = controls.set_setpoint(setpoint);
        prop_assert!((25.0..=40.0).contains(&sp));
        prop_assert!((0.0..=10.0).contains(&controls.set_kp(kp)));
        prop_assert!((0.0..=1.0).contains(&controls.set_ki(ki)));
        prop_assert!((0.0..=18.0).contains(&controls.set_output_ceiling(ceiling)));
    }
}
