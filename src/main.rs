//! # Heater Box Controller Entry Point
//!
//! Runs the acquisition / PID / logging loop against the simulated heater box.
//!
//! ## Modes
//! - **Console (default):** interactive menu for feedback, setpoint, gains, heater voltage
//!   ceiling, PSU output and recording, with a status line on demand.
//! - **Headless (`--duration-secs N`):** enables the PSU output and feedback, regulates for
//!   `N` seconds while logging status, then shuts down.
//!
//! ## Threads
//! - **DAQ worker:** one acquisition cycle per `daq_interval_ms`, never overlapping.
//! - **PSU worker:** polls the supply readback and applies queued commands.
//! - **Main:** operator input and status; reads the published snapshot only.
//!
//! ## Outputs
//! - `<log_dir>/yyMMdd_HHmmss.txt` — one session log per recording.
//! - `<log_dir>/daq_summary.csv` — one row per run.

use clap::Parser;
use crossbeam::channel::{Receiver, RecvTimeoutError};
use log::{error, info, warn};
use std::{
    io::{stdin, stdout, Write},
    path::PathBuf,
    thread,
    time::{Duration, Instant},
};

use sauna_control::{
    component_a::{
        acquisition::AcquisitionCycle,
        scheduler::{DaqWorker, WorkerConfig, WorkerEvent},
        sensor::{SensorTransport, IDENTITY_QUERY},
        state::{ProcessSnapshot, SnapshotCell},
    },
    component_b::{
        actuator::{PowerSupply, PsuHandle},
        operator::OperatorControls,
    },
    config::Config,
    error::DaqResult,
    sim::{
        clock::ScaledClock,
        devices::{SimFaults, SimulatedPsu, SimulatedSensor},
        plant::{PlantParams, ThermalPlant},
    },
    utils::{
        metrics::{ChartHistory, DaqMetrics, SharedMetrics},
        metrics_export::export_summary_csv,
        session_log::{pretty_duration, RecordSwitch, SessionLog},
    },
};

#[derive(Debug, Parser)]
#[command(name = "sauna_control", about = "Heater box acquisition, PID control and session logging")]
struct Cli {
    /// YAML configuration file; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run headless for this many seconds instead of the console menu.
    #[arg(long)]
    duration_secs: Option<u64>,

    /// Start recording immediately.
    #[arg(long)]
    record: bool,

    /// Comments written to the session log header.
    #[arg(long, default_value = "")]
    comments: String,

    /// Simulated seconds per wall-clock second, for the plant and the controller alike.
    #[arg(long, default_value_t = 1.0)]
    time_scale: f64,
}

type HeaterCycle = AcquisitionCycle<SimulatedSensor, PsuHandle>;

/// Everything the operator side holds on to while the workers run.
struct Session {
    config: Config,
    controls: OperatorControls,
    record: RecordSwitch,
    record_started: Option<Instant>,
    snapshot: SnapshotCell,
    history: ChartHistory,
    metrics: SharedMetrics,
    psu: PowerSupply,
    worker: DaqWorker<HeaterCycle>,
    events: Receiver<WorkerEvent>,
    lost_reported: bool,
    started: Instant,
}

fn main() -> DaqResult<()> {
    env_logger::init();
    let cli = Cli::parse();
    info!("=== HEATER BOX START ===");

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    info!("Config: {:?}", config);

    let mut session = start_session(config, &cli)?;

    match cli.duration_secs {
        Some(secs) => run_headless(&mut session, Duration::from_secs(secs)),
        None => run_console(&mut session),
    }

    shutdown(session)?;
    info!("=== HEATER BOX FINISHED ===");
    Ok(())
}

// ============================================================================
// Startup / shutdown
// ============================================================================

fn start_session(config: Config, cli: &Cli) -> DaqResult<Session> {
    let clock = ScaledClock::new(cli.time_scale);
    let plant = ThermalPlant::shared(PlantParams {
        time_scale: clock.scale(),
        ..PlantParams::default()
    });
    let faults = SimFaults::new();

    let mut sensor = SimulatedSensor::new(plant.clone(), faults.clone());
    match sensor.query(IDENTITY_QUERY) {
        Ok(id) => info!("Sensor identifies as '{}'", id.trim()),
        Err(e) => warn!("Sensor did not identify itself: {}", e),
    }

    let psu = PowerSupply::spawn(SimulatedPsu::new(plant, faults), &config.psu)?;

    let controls = OperatorControls::new(&config.pid);
    let record = RecordSwitch::new();
    record.set(cli.record);
    let history = ChartHistory::new(config.chart_capacity());
    info!("Chart history holds {} points", history.capacity());
    let log = SessionLog::with_default_format(&config.log_dir, record.clone(), cli.comments.clone());

    let cycle = AcquisitionCycle::new(sensor, psu.handle(), controls.clone())
        .with_history(history.clone())
        .with_session_log(log)
        .with_clock(move || clock.now());
    let snapshot = cycle.snapshot_cell();

    let metrics: SharedMetrics = SharedMetrics::default();
    let worker_config = WorkerConfig {
        period: config.daq_interval(),
        critical_not_alive_count: config.critical_not_alive_count,
    };
    let (worker, events) = DaqWorker::spawn(cycle, worker_config, metrics.clone())?;

    Ok(Session {
        record_started: cli.record.then(Instant::now),
        config,
        controls,
        record,
        snapshot,
        history,
        metrics,
        psu,
        worker,
        events,
        lost_reported: false,
        started: Instant::now(),
    })
}

fn shutdown(session: Session) -> DaqResult<()> {
    let Session { config, metrics, mut psu, worker, history, started, .. } = session;

    info!("[Main] Stopping DAQ worker...");
    if worker.stop().is_none() {
        error!("[Main] DAQ worker did not hand back its cycle");
    }

    let handle = psu.handle();
    handle.set_output_enabled(false);
    psu.stop();
    if handle.dropped_commands() > 0 {
        warn!("[Main] {} PSU commands dropped on a full queue", handle.dropped_commands());
    }

    let final_metrics: DaqMetrics = metrics.lock().clone();
    let duration_s = started.elapsed().as_secs_f64();
    info!(
        "[Main] {} cycles, {} failed, {} overruns, {} chart points",
        final_metrics.update_counter,
        final_metrics.failed_cycles,
        final_metrics.overruns,
        history.len()
    );
    export_summary_csv(&config.log_dir, &final_metrics, duration_s)?;
    Ok(())
}

// ============================================================================
// Headless run
// ============================================================================

fn run_headless(session: &mut Session, duration: Duration) {
    info!("[Main] Running headless for {:?}", duration);
    session.psu.handle().set_output_enabled(true);
    session.controls.set_feedback_enabled(true);

    let deadline = Instant::now() + duration;
    let tick = session.config.chart_interval();
    loop {
        let now = Instant::now();
        if now >= deadline {
            info!("[Main] Time's up");
            return;
        }

        match session.events.recv_timeout(tick.min(deadline - now)) {
            Ok(WorkerEvent::Updated { .. }) => info!("{}", status_line(session)),
            Ok(WorkerEvent::ConnectionLost { device, failures }) => {
                error!("[Main] '{}' lost after {} failures, stopping", device, failures);
                return;
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}

// ============================================================================
// Operator console
// ============================================================================

fn run_console(session: &mut Session) {
    loop {
        report_events(session);

        let choice = prompt_menu();
        match choice.as_str() {
            "1" => {
                let on = !session.controls.feedback_enabled();
                session.controls.set_feedback_enabled(on);
                println!("PID feedback {}", if on { "ON" } else { "OFF" });
            }
            "2" => {
                let text = prompt("Setpoint [°C, 25..40]: ");
                println!("Setpoint = {:.1} °C", session.controls.enter_setpoint(&text));
            }
            "3" => {
                let text = prompt("Kp [0..10]: ");
                println!("Kp = {}", session.controls.enter_kp(&text));
            }
            "4" => {
                let text = prompt("Ki [0..1 /s]: ");
                println!("Ki = {}", session.controls.enter_ki(&text));
            }
            "5" => {
                let text = prompt("Heater voltage ceiling [V, 0..18]: ");
                println!("Ceiling = {:.2} V", session.controls.enter_output_ceiling(&text));
            }
            "6" => {
                let on = !session.snapshot.get().psu_output_enabled;
                session.psu.handle().set_output_enabled(on);
                println!("PSU output {} requested", if on { "ON" } else { "OFF" });
            }
            "7" => {
                if session.record.toggle() {
                    session.record_started = Some(Instant::now());
                    println!("Recording armed; a new log starts on the next cycle");
                } else {
                    session.record_started = None;
                    println!("Recording stopped");
                }
            }
            "8" | "" => println!("{}", status_line(session)),
            "9" => {
                println!("Exiting. Goodbye!");
                return;
            }
            other => println!("Unrecognized option '{}', please try again.", other),
        }
        thread::sleep(Duration::from_millis(50));
    }
}

/// Drain pending worker events; connection loss is reported once.
///
/// The event can be dropped on a full queue, so the worker's flag is checked as well.
fn report_events(session: &mut Session) {
    let mut lost = None;
    while let Ok(event) = session.events.try_recv() {
        if let WorkerEvent::ConnectionLost { device, failures } = event {
            lost = Some(format!("'{}' after {} failed cycles", device, failures));
        }
    }
    if session.lost_reported || !session.worker.connection_lost() {
        return;
    }
    session.lost_reported = true;
    println!(
        "!! Connection lost {}; DAQ stopped. Exit and restart.",
        lost.unwrap_or_else(|| "to the sensor".to_string())
    );
}

fn prompt_menu() -> String {
    println!("\n┌─────────────────────────────────────────────┐");
    println!("│     HEATER BOX CONTROL                      │");
    println!("├─────────────────────────────────────────────┤");
    println!("│  1) Toggle PID feedback                     │");
    println!("│  2) Setpoint                                │");
    println!("│  3) Kp                                      │");
    println!("│  4) Ki                                      │");
    println!("│  5) Heater voltage ceiling                  │");
    println!("│  6) Toggle PSU output                       │");
    println!("│  7) Toggle recording                        │");
    println!("│  8) Status                                  │");
    println!("│  9) Exit                                    │");
    println!("└─────────────────────────────────────────────┘");
    prompt("Select [1-9] (default: 8): ")
}

fn prompt(label: &str) -> String {
    print!("{}", label);
    let _ = stdout().flush();
    let mut input = String::new();
    let _ = stdin().read_line(&mut input);
    input.trim().to_string()
}

fn status_line(session: &Session) -> String {
    let snap: ProcessSnapshot = session.snapshot.get();
    let settings = session.controls.settings();
    let rate = session.metrics.lock().obtained_rate_hz;
    let recording = match session.record_started.filter(|_| session.record.is_armed()) {
        Some(t) => format!("REC {}", pretty_duration(t.elapsed().as_secs_f64())),
        None => "rec off".to_string(),
    };
    let daq = if session.worker.connection_lost() {
        "LOST"
    } else if session.worker.is_running() {
        "ok"
    } else {
        "stopped"
    };

    format!(
        "#{:<5} T={:6.2} °C  RH={:5.1} %  P={:6.3} W  V={:5.2}  out={}  {:?} sp={:.1} fb={}  Kp={} Ki={} max={:.1} V  {}  DAQ {} @ {:.2} Hz",
        snap.update_counter,
        snap.process.measured_temperature,
        snap.process.measured_humidity,
        snap.heater_power,
        snap.source_voltage,
        if snap.psu_output_enabled { "on" } else { "off" },
        snap.mode,
        settings.setpoint,
        if settings.feedback_enabled { "on" } else { "off" },
        settings.kp,
        settings.ki,
        settings.output_ceiling,
        recording,
        daq,
        rate,
    )
}
