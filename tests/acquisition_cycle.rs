//! End-to-end acquisition scenarios: scripted devices through one cycle at a time, and the
//! simulated heater box under the DAQ worker.

use parking_lot::Mutex;
use std::{
    collections::VecDeque,
    fs,
    path::PathBuf,
    sync::Arc,
    thread,
    time::Duration,
};

use sauna_control::{
    component_a::{
        acquisition::AcquisitionCycle,
        scheduler::{DaqWorker, WorkerConfig, WorkerEvent},
        sensor::SensorTransport,
    },
    component_b::{
        actuator::{Actuator, PowerSupply, PsuReadback},
        controller::ControllerMode,
        operator::OperatorControls,
    },
    config::{PidConfig, PsuConfig},
    error::{DaqError, DaqResult},
    sim::{
        clock::ScaledClock,
        devices::{SimFaults, SimulatedPsu, SimulatedSensor},
        plant::{PlantParams, ThermalPlant},
    },
    utils::{
        metrics::{ChartHistory, SharedMetrics},
        session_log::{RecordSwitch, SessionLog},
    },
};

// ── Scripted devices ─────────────────────────────────────────

struct ScriptedSensor(VecDeque<DaqResult<String>>);

impl ScriptedSensor {
    fn new(replies: Vec<DaqResult<String>>) -> Self {
        Self(replies.into())
    }
}

impl SensorTransport for ScriptedSensor {
    fn name(&self) -> &str {
        "scripted"
    }

    fn query(&mut self, _command: &str) -> DaqResult<String> {
        self.0
            .pop_front()
            .unwrap_or_else(|| Err(DaqError::transport("scripted", "script exhausted")))
    }
}

#[derive(Clone)]
struct StubPsu {
    readback: PsuReadback,
    sent: Arc<Mutex<Vec<f64>>>,
}

impl StubPsu {
    fn sourcing(volts: f64, power: f64) -> Self {
        Self {
            readback: PsuReadback {
                source_voltage: volts,
                measured_voltage: volts,
                measured_current: power / volts,
                measured_power: power,
                output_enabled: true,
            },
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl Actuator for StubPsu {
    fn readback(&self) -> PsuReadback {
        self.readback
    }

    fn dispatch_voltage(&self, volts: f64) {
        self.sent.lock().push(volts);
    }
}

fn scratch_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("sauna_it_{}_{}", tag, std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    dir
}

fn feedback_on(pid: &PidConfig) -> OperatorControls {
    let controls = OperatorControls::new(pid);
    controls.set_feedback_enabled(true);
    controls
}

// ── Scenarios ────────────────────────────────────────────────

#[test]
fn reference_frame_updates_state_controls_and_logs() {
    let dir = scratch_dir("reference");
    let record = RecordSwitch::new();
    record.set(true);
    let log = SessionLog::with_default_format(&dir, record.clone(), "reference run".into());

    let psu = StubPsu::sourcing(4.0, 1.6);
    let mut cycle = AcquisitionCycle::new(
        ScriptedSensor::new(vec![Ok("1000\t36.50\t45.0\t36.0\n".into())]),
        psu.clone(),
        feedback_on(&PidConfig::default()),
    )
    .with_session_log(log);

    let report = cycle.run_once().unwrap();
    assert_eq!(report.mode, ControllerMode::Auto);
    assert_eq!(cycle.state().measured_temperature, 36.5);
    assert_eq!(cycle.state().measured_humidity, 45.0);
    assert_eq!(cycle.state().device_time, 1.0);
    assert!((psu.sent.lock()[0] - 4.0).abs() < 1e-9);

    let path = cycle.session_log().and_then(|l| l.path()).unwrap().to_path_buf();
    cycle.finish().unwrap();

    let text = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[1], "reference run");
    assert_eq!(lines.len(), 7);
    assert_eq!(lines[6], "0.0\t36.50\t45.0\t1.600");
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn failed_query_leaves_state_and_log_untouched() {
    let dir = scratch_dir("failed");
    let record = RecordSwitch::new();
    record.set(true);
    let log = SessionLog::with_default_format(&dir, record, String::new());

    let psu = StubPsu::sourcing(4.0, 1.6);
    let mut cycle = AcquisitionCycle::new(
        ScriptedSensor::new(vec![
            Ok("1000\t36.50\t45.0\t36.0".into()),
            Err(DaqError::transport("scripted", "timeout")),
            Ok("garbage".into()),
        ]),
        psu.clone(),
        feedback_on(&PidConfig::default()),
    )
    .with_session_log(log);

    cycle.run_once().unwrap();
    let state = *cycle.state();

    assert!(matches!(cycle.run_once(), Err(DaqError::Transport { .. })));
    assert!(matches!(cycle.run_once(), Err(DaqError::Parse { .. })));
    assert_eq!(cycle.state().timestamp, state.timestamp);
    assert_eq!(cycle.state().measured_temperature, state.measured_temperature);
    assert_eq!(cycle.session_log().unwrap().lines_written(), 1);
    assert_eq!(psu.sent.lock().len(), 1);
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn retuning_mid_session_keeps_integral() {
    let pid = PidConfig { ki: 0.0, ..PidConfig::default() };
    let controls = feedback_on(&pid);
    let psu = StubPsu::sourcing(4.0, 1.6);
    let mut cycle = AcquisitionCycle::new(
        ScriptedSensor::new(vec![
            Ok("1000\t36.50\t45.0\t36.0".into()),
            Ok("2000\t36.50\t45.0\t36.0".into()),
        ]),
        psu.clone(),
        controls.clone(),
    );

    cycle.run_once().unwrap();
    // P = 4 · 0.5 = 2, so the takeover at 4 V leaves I = 2.
    assert!((cycle.controller().integral() - 2.0).abs() < 1e-9);

    controls.set_kp(2.0);
    cycle.run_once().unwrap();
    assert!((cycle.controller().integral() - 2.0).abs() < 1e-9);
    assert!((cycle.controller().p_term() - 1.0).abs() < 1e-9);
    let sent = psu.sent.lock();
    assert!((sent[1] - 3.0).abs() < 1e-9);
}

#[test]
fn setpoint_entries_are_clamped_into_controller() {
    let controls = feedback_on(&PidConfig::default());
    let mut cycle = AcquisitionCycle::new(
        ScriptedSensor::new(vec![
            Ok("1000\t30.0\t45.0\t30.0".into()),
            Ok("2000\t30.0\t45.0\t30.0".into()),
        ]),
        StubPsu::sourcing(4.0, 1.6),
        controls.clone(),
    );

    assert_eq!(controls.set_setpoint(50.0), 40.0);
    cycle.run_once().unwrap();
    assert_eq!(cycle.controller().setpoint, 40.0);

    assert_eq!(controls.set_setpoint(10.0), 25.0);
    cycle.run_once().unwrap();
    assert_eq!(cycle.controller().setpoint, 25.0);
}

// ── Simulated heater box under the DAQ worker ────────────────

#[test]
fn simulated_box_heats_toward_setpoint() {
    let clock = ScaledClock::new(200.0);
    let plant = ThermalPlant::shared(PlantParams { time_scale: clock.scale(), ..PlantParams::default() });
    let faults = SimFaults::new();
    let psu_config = PsuConfig { poll_interval_ms: 5, ..PsuConfig::default() };
    let mut psu = PowerSupply::spawn(SimulatedPsu::new(plant.clone(), faults.clone()), &psu_config).unwrap();
    psu.handle().set_output_enabled(true);

    // Takeover from 0 V seeds I = -P; ki = 0.1 /s ramps to the 12 V ceiling within ~8 sim s.
    let controls = feedback_on(&PidConfig { kp: 1.0, ki: 0.1, ..PidConfig::default() });
    let history = ChartHistory::new(1_000);
    let cycle = AcquisitionCycle::new(
        SimulatedSensor::new(plant.clone(), faults).with_noise(0.0),
        psu.handle(),
        controls,
    )
    .with_history(history.clone())
    .with_clock(move || clock.now());
    let snapshot = cycle.snapshot_cell();

    let metrics = SharedMetrics::default();
    let config = WorkerConfig { period: Duration::from_millis(10), critical_not_alive_count: 1 };
    let (worker, _events) = DaqWorker::spawn(cycle, config, metrics.clone()).unwrap();

    // 0.8 s wall = 160 s simulated.
    thread::sleep(Duration::from_millis(800));
    worker.stop();
    psu.stop();

    let snap = snapshot.get();
    assert!(snap.update_counter > 10);
    assert_eq!(snap.mode, ControllerMode::Auto);
    assert!(snap.psu_output_enabled);
    assert!(snap.pid_output > 6.0, "commanded {} V", snap.pid_output);
    assert!(plant.lock().air_temperature() > 23.0, "air at {} °C", plant.lock().air_temperature());
    assert_eq!(history.len() as u64, snap.update_counter);
    assert_eq!(metrics.lock().update_counter, snap.update_counter);
}

#[test]
fn unplugged_sensor_escalates_connection_lost() {
    let plant = ThermalPlant::shared(PlantParams::default());
    let faults = SimFaults::new();
    let cycle = AcquisitionCycle::new(
        SimulatedSensor::new(plant, faults.clone()),
        StubPsu::sourcing(4.0, 1.6),
        OperatorControls::new(&PidConfig::default()),
    );
    let snapshot = cycle.snapshot_cell();

    let config = WorkerConfig { period: Duration::from_millis(10), critical_not_alive_count: 3 };
    let (worker, events) = DaqWorker::spawn(cycle, config, SharedMetrics::default()).unwrap();

    match events.recv_timeout(Duration::from_secs(2)).unwrap() {
        WorkerEvent::Updated { .. } => {}
        other => panic!("unexpected event {:?}", other),
    }
    faults.set_disconnected(true);

    let lost = events
        .iter()
        .find(|e| matches!(e, WorkerEvent::ConnectionLost { .. }))
        .unwrap();
    assert_eq!(lost, WorkerEvent::ConnectionLost { device: "sim-sensor".into(), failures: 3 });
    assert!(worker.connection_lost());
    assert!(!worker.is_running());

    // Last good snapshot stays readable.
    let snap = snapshot.get();
    assert!(snap.update_counter >= 1);
    assert!(snap.process.measured_temperature.is_finite());
    worker.stop();
}
