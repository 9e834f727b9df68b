//! error.rs
//! Error taxonomy for the acquisition / control / logging loop.
//!
//! Per-cycle failures (`Transport`, `Parse`) are recovered inside the cycle;
//! `ConnectionLost` is only ever raised by the DAQ worker after repeated failures.

use thiserror::Error;

pub type DaqResult<T> = Result<T, DaqError>;

#[derive(Debug, Error)]
pub enum DaqError {
    /// Device did not answer, timed out or framed its reply badly.
    #[error("transport failure on '{device}': {what}")]
    Transport { device: String, what: String },

    /// A reply arrived but its fields are missing or not numeric.
    #[error("parse failure: {what}")]
    Parse { what: String },

    /// Escalated by the DAQ worker after too many consecutive cycle failures.
    #[error("lost connection to '{device}' after {failures} consecutive failures")]
    ConnectionLost { device: String, failures: u32 },

    #[error("invalid argument: {what}")]
    InvalidArg { what: &'static str },

    #[error("config error: {0}")]
    Config(#[from] serde_yaml::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl DaqError {
    pub fn transport(device: &str, what: impl Into<String>) -> Self {
        DaqError::Transport {
            device: device.to_string(),
            what: what.into(),
        }
    }

    pub fn parse(what: impl Into<String>) -> Self {
        DaqError::Parse { what: what.into() }
    }

    /// Transport and parse failures are the per-cycle, recoverable kind.
    pub fn is_cycle_failure(&self) -> bool {
        matches!(self, DaqError::Transport { .. } | DaqError::Parse { .. })
    }
}
