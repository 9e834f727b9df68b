//! Metrics of the DAQ worker and the chart history fed to the (external) chart display.
//!
//! - **DaqMetrics:** update counter, failure streaks, obtained DAQ rate, cycle execution
//!   times and overruns. Shared behind a `parking_lot::Mutex`, touched once per cycle.
//! - **ChartHistory:** bounded time series of temperature, humidity and heater power,
//!   appended once per successful cycle, read by the chart feeder at its own rate.

use parking_lot::Mutex;
use std::{
    collections::VecDeque,
    sync::Arc,
    time::Instant,
};

/// Execution time history length (cycles).
pub const MAX_POINTS: usize = 1_000;

/// Appends value to buffer; removes oldest if at capacity (FIFO).
#[inline]
pub fn push_capped<T>(buf: &mut VecDeque<T>, val: T, cap: usize) {
    if buf.len() >= cap {
        buf.pop_front();
    }
    buf.push_back(val);
}

#[derive(Debug, Clone)]
pub struct DaqMetrics {
    /// Successful cycles.
    pub update_counter: u64,
    pub failed_cycles: u64,
    pub consecutive_failures: u32,
    /// Cycles that took longer than the DAQ period.
    pub overruns: u64,
    /// Obtained rate of successful cycles, refreshed about once a second.
    pub obtained_rate_hz: f64,
    pub exec_us: VecDeque<u64>,

    rate_window_start: Option<Instant>,
    rate_window_count: u64,
}

impl Default for DaqMetrics {
    fn default() -> Self {
        Self {
            update_counter: 0,
            failed_cycles: 0,
            consecutive_failures: 0,
            overruns: 0,
            obtained_rate_hz: f64::NAN,
            exec_us: VecDeque::new(),
            rate_window_start: None,
            rate_window_count: 0,
        }
    }
}

impl DaqMetrics {
    pub fn record_success(&mut self, now: Instant) {
        self.update_counter += 1;
        self.consecutive_failures = 0;

        let start = *self.rate_window_start.get_or_insert(now);
        self.rate_window_count += 1;
        let window = now.saturating_duration_since(start).as_secs_f64();
        if window >= 1.0 {
            self.obtained_rate_hz = self.rate_window_count as f64 / window;
            self.rate_window_start = Some(now);
            self.rate_window_count = 0;
        }
    }

    /// Returns the failure streak including this one.
    pub fn record_failure(&mut self) -> u32 {
        self.failed_cycles += 1;
        self.consecutive_failures += 1;
        self.consecutive_failures
    }

    pub fn record_exec(&mut self, exec_us: u64, overrun: bool) {
        push_capped(&mut self.exec_us, exec_us, MAX_POINTS);
        if overrun {
            self.overruns += 1;
        }
    }

    pub fn mean_exec_us(&self) -> f64 {
        if self.exec_us.is_empty() {
            return f64::NAN;
        }
        self.exec_us.iter().sum::<u64>() as f64 / self.exec_us.len() as f64
    }

    pub fn max_exec_us(&self) -> u64 {
        self.exec_us.iter().copied().max().unwrap_or(0)
    }
}

pub type SharedMetrics = Arc<Mutex<DaqMetrics>>;

/// One chart sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChartPoint {
    pub time: f64,
    pub temperature: f64,
    pub humidity: f64,
    pub heater_power: f64,
}

/// Bounded chart history shared between the cycle (writer) and chart feeder (reader).
#[derive(Debug, Clone)]
pub struct ChartHistory {
    inner: Arc<Mutex<VecDeque<ChartPoint>>>,
    capacity: usize,
}

impl ChartHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn push(&self, point: ChartPoint) {
        push_capped(&mut self.inner.lock(), point, self.capacity);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Copy of the history, oldest first.
    pub fn snapshot(&self) -> Vec<ChartPoint> {
        self.inner.lock().iter().copied().collect()
    }
}
