//! acquisition.rs
//! One data-acquisition cycle of the heater box:
//! query sensor → parse → update state → evaluate controller mode → compute →
//! dispatch heater voltage → append chart history and session log → publish snapshot.
//!
//! A failed query or unparsable reply ends the cycle early: no control action, no log line,
//! state untouched. The error is returned to the DAQ worker, which alone decides whether the
//! connection is lost.

use log::debug;
use std::time::Instant;

use crate::component_a::{
    sensor::{acquire, SensorReading, SensorTransport},
    state::{ProcessSnapshot, ProcessState, SnapshotCell},
};
use crate::component_b::{
    actuator::Actuator,
    controller::{ControllerMode, PidController},
    operator::OperatorControls,
};
use crate::error::DaqResult;
use crate::utils::{
    metrics::{ChartHistory, ChartPoint},
    session_log::{LogRecord, SessionLog},
};

/// What a successful cycle did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleReport {
    pub reading: SensorReading,
    pub mode: ControllerMode,
    /// Heater voltage sent to the power supply this cycle, if any.
    pub dispatched_voltage: Option<f64>,
    pub heater_power: f64,
}

/// Source of "now" for stamping and the controller's time base.
pub type CycleClock = Box<dyn Fn() -> Instant + Send>;

pub struct AcquisitionCycle<S, A> {
    sensor: S,
    actuator: A,
    pid: PidController,
    controls: OperatorControls,
    state: ProcessState,
    snapshot: SnapshotCell,
    history: Option<ChartHistory>,
    log: Option<SessionLog>,
    clock: CycleClock,
    clock_origin: Instant,
    update_counter: u64,
}

impl<S: SensorTransport, A: Actuator> AcquisitionCycle<S, A> {
    /// New cycle; gains, setpoint and output ceiling come from `controls` on the first run.
    pub fn new(sensor: S, actuator: A, controls: OperatorControls) -> Self {
        Self {
            sensor,
            actuator,
            pid: PidController::new(0.0, 0.0, 0.0),
            controls,
            state: ProcessState::default(),
            snapshot: SnapshotCell::new(),
            history: None,
            log: None,
            clock: Box::new(Instant::now),
            clock_origin: Instant::now(),
            update_counter: 0,
        }
    }

    pub fn with_history(mut self, history: ChartHistory) -> Self {
        self.history = Some(history);
        self
    }

    pub fn with_session_log(mut self, log: SessionLog) -> Self {
        self.log = Some(log);
        self
    }

    /// Replace the wall clock, e.g. with a simulated one that runs with the plant.
    pub fn with_clock(mut self, clock: impl Fn() -> Instant + Send + 'static) -> Self {
        self.clock_origin = clock();
        self.clock = Box::new(clock);
        self
    }

    pub fn with_snapshot_cell(mut self, cell: SnapshotCell) -> Self {
        self.snapshot = cell;
        self
    }

    /// Readers' handle to the published snapshot.
    pub fn snapshot_cell(&self) -> SnapshotCell {
        self.snapshot.clone()
    }

    pub fn state(&self) -> &ProcessState {
        &self.state
    }

    pub fn controller(&self) -> &PidController {
        &self.pid
    }

    pub fn session_log(&self) -> Option<&SessionLog> {
        self.log.as_ref()
    }

    pub fn session_log_mut(&mut self) -> Option<&mut SessionLog> {
        self.log.as_mut()
    }

    pub fn sensor_name(&self) -> &str {
        self.sensor.name()
    }

    /// Run one cycle.
    pub fn run_once(&mut self) -> DaqResult<CycleReport> {
        self.controls.apply_pending(&mut self.pid);

        // ====================================================================
        // Acquire: transport and parse failures leave everything untouched
        // ====================================================================
        let reading = acquire(&mut self.sensor).inspect_err(|e| {
            debug!("'{}' reports {}", self.sensor.name(), e);
        })?;

        let now = (self.clock)();
        let local_time = now.duration_since(self.clock_origin).as_secs_f64();
        self.state.apply_reading(&reading, local_time);

        // ====================================================================
        // Control: mode from interlocks, bump-less takeover from PSU readback
        // ====================================================================
        let readback = self.actuator.readback();
        let temperature = self.state.measured_temperature;
        let mode = ControllerMode::evaluate(
            readback.output_enabled,
            self.controls.feedback_enabled(),
            self.state.measured_value_is_valid(),
        );
        self.pid.set_mode_at(mode, temperature, readback.source_voltage, now);
        self.state.controller_engaged = self.pid.is_auto();

        let mut dispatched_voltage = None;
        if self.pid.compute_at(temperature, now) {
            let volts = self.pid.output();
            self.actuator.dispatch_voltage(volts);
            dispatched_voltage = Some(volts);
            debug!(
                "Tp={:7.3}   Ti={:7.3}   outp={:7.3}",
                self.pid.p_term(),
                self.pid.i_term(),
                volts
            );
        }

        // ====================================================================
        // Record: chart history, session log, snapshot
        // ====================================================================
        if let Some(history) = &self.history {
            history.push(ChartPoint {
                time: self.state.timestamp,
                temperature,
                humidity: self.state.measured_humidity,
                heater_power: readback.measured_power,
            });
        }

        if let Some(log) = self.log.as_mut() {
            log.update(&LogRecord {
                temperature,
                humidity: self.state.measured_humidity,
                heater_power: readback.measured_power,
                aux_temperature: self.state.aux_temperature,
            });
        }

        self.update_counter += 1;
        let settings = self.controls.settings();
        self.snapshot.publish(ProcessSnapshot {
            process: self.state,
            mode: self.pid.mode(),
            feedback_enabled: settings.feedback_enabled,
            setpoint: self.pid.setpoint,
            pid_output: self.pid.output(),
            heater_power: readback.measured_power,
            source_voltage: readback.source_voltage,
            psu_output_enabled: readback.output_enabled,
            update_counter: self.update_counter,
        });

        Ok(CycleReport {
            reading,
            mode: self.pid.mode(),
            dispatched_voltage,
            heater_power: readback.measured_power,
        })
    }

    /// Close a running log session (shutdown path).
    pub fn finish(&mut self) -> DaqResult<()> {
        match self.log.as_mut() {
            Some(log) => log.end(),
            None => Ok(()),
        }
    }
}
