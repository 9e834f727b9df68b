//! CSV export of a DAQ run summary.
//!
//! Appends one row per run to `<log_dir>/daq_summary.csv`; the header is written when the
//! file is created.

use csv::WriterBuilder;
use log::info;
use serde::Serialize;
use std::{
    fs::{create_dir_all, OpenOptions},
    path::{Path, PathBuf},
};

use crate::error::DaqResult;
use crate::utils::metrics::DaqMetrics;

pub const SUMMARY_FILE: &str = "daq_summary.csv";

#[derive(Debug, Serialize)]
struct SummaryRow {
    finished_at: String,
    duration_s: f64,
    cycles: u64,
    failed_cycles: u64,
    overruns: u64,
    obtained_rate_hz: f64,
    mean_exec_us: f64,
    max_exec_us: u64,
}

/// Appends the run summary row and returns the file path.
pub fn export_summary_csv(log_dir: &Path, metrics: &DaqMetrics, duration_s: f64) -> DaqResult<PathBuf> {
    create_dir_all(log_dir)?;
    let path = log_dir.join(SUMMARY_FILE);
    let file_exists = path.exists();

    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    let mut wtr = WriterBuilder::new().has_headers(!file_exists).from_writer(file);

    wtr.serialize(SummaryRow {
        finished_at: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        duration_s,
        cycles: metrics.update_counter,
        failed_cycles: metrics.failed_cycles,
        overruns: metrics.overruns,
        obtained_rate_hz: metrics.obtained_rate_hz,
        mean_exec_us: metrics.mean_exec_us(),
        max_exec_us: metrics.max_exec_us(),
    })?;
    wtr.flush()?;

    info!("Summary exported to: {:?}", path);
    Ok(path)
}
