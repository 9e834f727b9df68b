//! controller.rs
//! PID controller driving the heater voltage from the measured box temperature.
//!
//! - Two modes: `Manual` (controller silent) and `Auto` (controller owns the output)
//! - Bump-less Manual→Auto: the integral is seeded so the first output equals the
//!   actuator's current output
//! - Anti-windup by clamping the integral so that P + I stays inside the output limits
//! - Derivative on measurement, so setpoint steps do not kick the output
//!
//! The controller is owned by the acquisition cycle; it needs no locking.

use std::time::Instant;

use crate::error::{DaqError, DaqResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControllerMode {
    #[default]
    Manual,
    Auto,
}

impl ControllerMode {
    /// Mode the controller should be in given the current interlocks.
    ///
    /// Auto needs all three: the actuator output is on, the operator enabled feedback, and
    /// the measured value is a number.
    pub fn evaluate(actuator_enabled: bool, feedback_enabled: bool, measured_value_is_valid: bool) -> Self {
        if actuator_enabled && feedback_enabled && measured_value_is_valid {
            ControllerMode::Auto
        } else {
            ControllerMode::Manual
        }
    }
}

/// Gains, limits and internal state of the PID loop.
#[derive(Debug, Clone)]
pub struct PidController {
    pub setpoint: f64,
    kp: f64,
    /// Per second.
    ki: f64,
    /// Seconds.
    kd: f64,
    output_low: f64,
    output_high: f64,
    mode: ControllerMode,

    integral_accumulator: f64,
    last_input: f64,
    last_output: f64,
    last_time: Option<Instant>,

    // Terms of the last compute, for debug output.
    p_term: f64,
    d_term: f64,
}

impl PidController {
    /// New controller in `Manual` with output limits `[0, +inf)`.
    pub fn new(kp: f64, ki: f64, kd: f64) -> Self {
        Self {
            setpoint: 0.0,
            kp,
            ki,
            kd,
            output_low: 0.0,
            output_high: f64::INFINITY,
            mode: ControllerMode::Manual,
            integral_accumulator: 0.0,
            last_input: f64::NAN,
            last_output: 0.0,
            last_time: None,
            p_term: 0.0,
            d_term: 0.0,
        }
    }

    pub fn with_setpoint(mut self, setpoint: f64) -> Self {
        self.setpoint = setpoint;
        self
    }

    pub fn with_output_limits(mut self, low: f64, high: f64) -> DaqResult<Self> {
        self.set_output_limits(low, high)?;
        Ok(self)
    }

    #[inline]
    pub fn mode(&self) -> ControllerMode {
        self.mode
    }

    #[inline]
    pub fn is_auto(&self) -> bool {
        self.mode == ControllerMode::Auto
    }

    #[inline]
    pub fn output(&self) -> f64 {
        self.last_output
    }

    pub fn tunings(&self) -> (f64, f64, f64) {
        (self.kp, self.ki, self.kd)
    }

    pub fn output_limits(&self) -> (f64, f64) {
        (self.output_low, self.output_high)
    }

    pub fn integral(&self) -> f64 {
        self.integral_accumulator
    }

    pub fn p_term(&self) -> f64 {
        self.p_term
    }

    pub fn i_term(&self) -> f64 {
        self.integral_accumulator
    }

    pub fn d_term(&self) -> f64 {
        self.d_term
    }

    /// Switch mode at the current instant. See [`PidController::set_mode_at`].
    pub fn set_mode(&mut self, mode: ControllerMode, current_input: f64, current_output: f64) {
        self.set_mode_at(mode, current_input, current_output, Instant::now());
    }

    /// Switch mode. On a Manual→Auto edge the internal state is re-seeded from the
    /// plant's present input and the actuator's present output (bump-less takeover).
    ///
    /// A non-finite `current_input` always forces `Manual`.
    pub fn set_mode_at(
        &mut self,
        mode: ControllerMode,
        current_input: f64,
        current_output: f64,
        now: Instant,
    ) {
        let mode = if current_input.is_finite() { mode } else { ControllerMode::Manual };

        if mode == ControllerMode::Auto && self.mode == ControllerMode::Manual {
            self.initialize(current_input, current_output, now);
        }
        self.mode = mode;
    }

    fn initialize(&mut self, current_input: f64, current_output: f64, now: Instant) {
        let output = if current_output.is_finite() { current_output } else { 0.0 };
        let p = self.kp * (self.setpoint - current_input);

        self.p_term = p;
        self.d_term = 0.0;
        self.integral_accumulator = self.clamp_integral(p, output - p);
        self.last_input = current_input;
        self.last_output = self.clamp_output(p + self.integral_accumulator);
        self.last_time = Some(now);
    }

    /// Compute a new output from the current input. Returns `true` when a new output is
    /// available in [`PidController::output`].
    pub fn compute(&mut self, current_input: f64) -> bool {
        self.compute_at(current_input, Instant::now())
    }

    pub fn compute_at(&mut self, current_input: f64, now: Instant) -> bool {
        if self.mode != ControllerMode::Auto || !current_input.is_finite() {
            return false;
        }

        let dt = self
            .last_time
            .map(|t| now.saturating_duration_since(t).as_secs_f64())
            .unwrap_or(0.0);

        let error = self.setpoint - current_input;
        let p = self.kp * error;

        let integral = self.integral_accumulator + self.ki * error * dt;
        self.integral_accumulator = self.clamp_integral(p, integral);

        let d = if dt > 0.0 && self.last_input.is_finite() {
            -self.kd * (current_input - self.last_input) / dt
        } else {
            0.0
        };

        self.p_term = p;
        self.d_term = d;
        self.last_output = self.clamp_output(p + self.integral_accumulator + d);
        self.last_input = current_input;
        self.last_time = Some(now);
        true
    }

    /// Replace the gains. The integral accumulator is kept as-is.
    pub fn set_tunings(&mut self, kp: f64, ki: f64, kd: f64) -> DaqResult<()> {
        if !(kp >= 0.0 && ki >= 0.0 && kd >= 0.0) || !(kp.is_finite() && ki.is_finite() && kd.is_finite()) {
            return Err(DaqError::InvalidArg {
                what: "PID gains must be finite and non-negative",
            });
        }
        self.kp = kp;
        self.ki = ki;
        self.kd = kd;
        Ok(())
    }

    /// Replace the output clamp and pull the stored state back inside it.
    pub fn set_output_limits(&mut self, low: f64, high: f64) -> DaqResult<()> {
        if low.is_nan() || high.is_nan() || low > high {
            return Err(DaqError::InvalidArg {
                what: "output_low must not exceed output_high",
            });
        }
        self.output_low = low;
        self.output_high = high;

        self.last_output = self.clamp_output(self.last_output);
        self.integral_accumulator = self.clamp_integral(self.p_term, self.integral_accumulator);
        Ok(())
    }

    #[inline]
    fn clamp_output(&self, value: f64) -> f64 {
        value.clamp(self.output_low, self.output_high)
    }

    /// Clamp `integral` so that `p + integral` lies inside the output limits.
    #[inline]
    fn clamp_integral(&self, p: f64, integral: f64) -> f64 {
        if !p.is_finite() {
            return integral.clamp(self.output_low, self.output_high);
        }
        integral.clamp(self.output_low - p, self.output_high - p)
    }
}
