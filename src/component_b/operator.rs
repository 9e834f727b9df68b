//! operator.rs
//! Operator-facing PID settings with input validation and clamping.
//!
//! Writes come from the UI/console thread at any time; the acquisition cycle picks them up
//! at the start of its next run via [`OperatorControls::apply_pending`], so the controller
//! itself is only ever touched from inside the cycle.

use log::{info, warn};
use parking_lot::Mutex;
use std::sync::Arc;

use crate::component_b::controller::PidController;
use crate::config::PidConfig;

pub const SETPOINT_MIN: f64 = 25.0;
pub const SETPOINT_MAX: f64 = 40.0;
pub const KP_MAX: f64 = 10.0;
pub const KI_MAX: f64 = 1.0;
pub const OUTPUT_CEILING_MAX: f64 = 18.0;

/// Value used when setpoint text does not parse.
const SETPOINT_FALLBACK: f64 = 25.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OperatorSettings {
    pub setpoint: f64,
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    pub output_ceiling: f64,
    pub feedback_enabled: bool,
}

#[derive(Debug)]
struct Inner {
    settings: OperatorSettings,
    default_ceiling: f64,
    dirty: bool,
}

/// Shared operator settings. Clone freely; all clones see the same values.
#[derive(Debug, Clone)]
pub struct OperatorControls {
    inner: Arc<Mutex<Inner>>,
}

impl OperatorControls {
    /// Start from the configured defaults, clamped like any operator entry.
    /// Feedback starts disabled.
    pub fn new(pid: &PidConfig) -> Self {
        let settings = OperatorSettings {
            setpoint: clamp_setpoint(pid.setpoint),
            kp: clamp_or(pid.kp, 0.0, KP_MAX, 0.0),
            ki: clamp_or(pid.ki, 0.0, KI_MAX, 0.0),
            kd: if pid.kd.is_finite() { pid.kd.max(0.0) } else { 0.0 },
            output_ceiling: clamp_or(pid.output_ceiling, 0.0, OUTPUT_CEILING_MAX, 0.0),
            feedback_enabled: false,
        };
        Self {
            inner: Arc::new(Mutex::new(Inner {
                default_ceiling: settings.output_ceiling,
                settings,
                dirty: true,
            })),
        }
    }

    pub fn settings(&self) -> OperatorSettings {
        self.inner.lock().settings
    }

    pub fn feedback_enabled(&self) -> bool {
        self.inner.lock().settings.feedback_enabled
    }

    pub fn set_feedback_enabled(&self, enabled: bool) {
        let mut inner = self.inner.lock();
        if inner.settings.feedback_enabled != enabled {
            info!("PID feedback {}", if enabled { "ON" } else { "OFF" });
        }
        inner.settings.feedback_enabled = enabled;
    }

    /// Returns the value actually applied.
    pub fn set_setpoint(&self, setpoint: f64) -> f64 {
        let v = clamp_setpoint(setpoint);
        self.update(|s| s.setpoint = v);
        v
    }

    pub fn set_kp(&self, kp: f64) -> f64 {
        let v = clamp_or(kp, 0.0, KP_MAX, 0.0);
        self.update(|s| s.kp = v);
        v
    }

    pub fn set_ki(&self, ki: f64) -> f64 {
        let v = clamp_or(ki, 0.0, KI_MAX, 0.0);
        self.update(|s| s.ki = v);
        v
    }

    pub fn set_output_ceiling(&self, volts: f64) -> f64 {
        let fallback = self.inner.lock().default_ceiling;
        let v = clamp_or(volts, 0.0, OUTPUT_CEILING_MAX, fallback);
        self.update(|s| s.output_ceiling = v);
        v
    }

    /// Text entry variants: unparsable input falls back to a safe default.
    pub fn enter_setpoint(&self, text: &str) -> f64 {
        self.set_setpoint(parse_or(text, SETPOINT_FALLBACK))
    }

    pub fn enter_kp(&self, text: &str) -> f64 {
        self.set_kp(parse_or(text, 0.0))
    }

    pub fn enter_ki(&self, text: &str) -> f64 {
        self.set_ki(parse_or(text, 0.0))
    }

    pub fn enter_output_ceiling(&self, text: &str) -> f64 {
        let fallback = self.inner.lock().default_ceiling;
        self.set_output_ceiling(parse_or(text, fallback))
    }

    fn update(&self, f: impl FnOnce(&mut OperatorSettings)) {
        let mut inner = self.inner.lock();
        f(&mut inner.settings);
        inner.dirty = true;
    }

    /// Push changed settings into the controller. Called by the cycle only.
    ///
    /// Returns `true` when something was applied.
    pub fn apply_pending(&self, pid: &mut PidController) -> bool {
        let settings = {
            let mut inner = self.inner.lock();
            if !inner.dirty {
                return false;
            }
            inner.dirty = false;
            inner.settings
        };

        pid.setpoint = settings.setpoint;
        if let Err(e) = pid.set_tunings(settings.kp, settings.ki, settings.kd) {
            warn!("rejected PID tunings: {}", e);
        }
        let (low, _) = pid.output_limits();
        if let Err(e) = pid.set_output_limits(low, settings.output_ceiling.max(low)) {
            warn!("rejected PID output limits: {}", e);
        }
        true
    }
}

fn clamp_setpoint(v: f64) -> f64 {
    clamp_or(v, SETPOINT_MIN, SETPOINT_MAX, SETPOINT_FALLBACK)
}

/// Clamp to `[lo, hi]`; NaN becomes `fallback` (also clamped).
fn clamp_or(v: f64, lo: f64, hi: f64, fallback: f64) -> f64 {
    if v.is_nan() { fallback.clamp(lo, hi) } else { v.clamp(lo, hi) }
}

fn parse_or(text: &str, fallback: f64) -> f64 {
    text.trim().parse::<f64>().unwrap_or(fallback)
}
