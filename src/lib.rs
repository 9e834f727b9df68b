//! # Heater box acquisition and control
//!
//! Periodically queries a climate sensor, runs a PID loop that drives a heater through a
//! programmable power supply, and records the session to a tab-delimited log.
//!
//! ## Layout
//! - **component_a:** sensor frames, process state, the acquisition cycle and its DAQ worker.
//! - **component_b:** PID controller, power supply worker, operator settings.
//! - **utils:** DAQ metrics, chart history, session log, run summary export.
//! - **sim:** thermal plant with simulated sensor and power supply.

pub mod component_a;
pub mod component_b;
pub mod config;
pub mod error;
pub mod sim;
pub mod utils;

pub use config::Config;
pub use error::{DaqError, DaqResult};
