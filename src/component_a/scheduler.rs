//! scheduler.rs
//! DAQ worker: runs a task at a fixed period on its own thread.
//! - Periodic release paced by `SpinSleeper`; cycles never overlap
//! - An overrunning cycle delays the next release instead of bursting to catch up
//! - Counts consecutive failures and escalates `ConnectionLost` once the critical count is
//!   reached; the worker then stops, leaving the last published state readable

use crossbeam::channel::{bounded, Receiver, Sender};
use log::{debug, error, info, warn};
use spin_sleep::{SpinSleeper, SpinStrategy};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};
use thread_priority::{ThreadBuilderExt, ThreadPriority};

use crate::component_a::{acquisition::AcquisitionCycle, sensor::SensorTransport};
use crate::component_b::actuator::Actuator;
use crate::error::{DaqError, DaqResult};
use crate::utils::metrics::SharedMetrics;

const EVENT_CAPACITY: usize = 64;

/// Work executed once per DAQ period.
pub trait DaqTask: Send {
    fn device_name(&self) -> &str;

    fn run_once(&mut self) -> DaqResult<()>;

    /// Called once on the worker thread after the last cycle.
    fn shutdown(&mut self) {}
}

impl<S, A> DaqTask for AcquisitionCycle<S, A>
where
    S: SensorTransport,
    A: Actuator + Send,
{
    fn device_name(&self) -> &str {
        self.sensor_name()
    }

    fn run_once(&mut self) -> DaqResult<()> {
        AcquisitionCycle::run_once(self).map(|_| ())
    }

    fn shutdown(&mut self) {
        if let Err(e) = self.finish() {
            warn!("closing session log failed: {}", e);
        }
    }
}

/// Notifications from the DAQ worker, delivered best-effort.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    Updated { update_counter: u64 },
    ConnectionLost { device: String, failures: u32 },
}

#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    pub period: Duration,
    pub critical_not_alive_count: u32,
}

pub struct DaqWorker<T> {
    running: Arc<AtomicBool>,
    connection_lost: Arc<AtomicBool>,
    join: Option<JoinHandle<T>>,
}

impl<T: DaqTask + 'static> DaqWorker<T> {
    /// Start the worker thread. Returns the worker and the event receiver.
    pub fn spawn(task: T, config: WorkerConfig, metrics: SharedMetrics) -> DaqResult<(Self, Receiver<WorkerEvent>)> {
        let (tx, rx) = bounded(EVENT_CAPACITY);
        let running = Arc::new(AtomicBool::new(true));
        let connection_lost = Arc::new(AtomicBool::new(false));

        let r = running.clone();
        let lost = connection_lost.clone();
        let join = thread::Builder::new()
            .name("daq".into())
            .spawn_with_priority(ThreadPriority::Max, move |prio| {
                if let Err(e) = prio {
                    debug!("DAQ worker runs at default priority: {:?}", e);
                }
                run_periodic(task, config, metrics, r, lost, tx)
            })?;

        Ok((
            Self {
                running,
                connection_lost,
                join: Some(join),
            },
            rx,
        ))
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn connection_lost(&self) -> bool {
        self.connection_lost.load(Ordering::Acquire)
    }

    /// Stop after the current cycle and hand the task back.
    pub fn stop(mut self) -> Option<T> {
        self.running.store(false, Ordering::Release);
        let join = self.join.take()?;
        match join.join() {
            Ok(task) => Some(task),
            Err(_) => {
                error!("DAQ worker panicked");
                None
            }
        }
    }
}

impl<T> Drop for DaqWorker<T> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

/// Periodic release loop. Returns the task so its final state stays inspectable.
fn run_periodic<T: DaqTask>(
    mut task: T,
    config: WorkerConfig,
    metrics: SharedMetrics,
    running: Arc<AtomicBool>,
    connection_lost: Arc<AtomicBool>,
    events: Sender<WorkerEvent>,
) -> T {
    let period = config.period;
    let critical = config.critical_not_alive_count.max(1);
    let sleeper = SpinSleeper::new(100_000).with_spin_strategy(SpinStrategy::YieldThread);

    info!("[{}] DAQ worker started, period {:?}", task.device_name(), period);
    let mut next_release = Instant::now();

    while running.load(Ordering::Acquire) {
        let now = Instant::now();
        if now < next_release {
            sleeper.sleep(next_release - now);
            continue;
        }

        let cycle_start = Instant::now();
        let result = task.run_once();
        let exec = cycle_start.elapsed();
        let overrun = exec > period;

        let mut m = metrics.lock();
        m.record_exec(exec.as_micros() as u64, overrun);
        match result {
            Ok(()) => {
                m.record_success(cycle_start);
                let update_counter = m.update_counter;
                drop(m);
                let _ = events.try_send(WorkerEvent::Updated { update_counter });
            }
            Err(e) => {
                let failures = m.record_failure();
                drop(m);
                if e.is_cycle_failure() {
                    debug!("[{}] cycle failed ({} in a row): {}", task.device_name(), failures, e);
                } else {
                    warn!("[{}] cycle failed ({} in a row): {}", task.device_name(), failures, e);
                }

                if failures >= critical {
                    let lost = DaqError::ConnectionLost {
                        device: task.device_name().to_string(),
                        failures,
                    };
                    error!("{}", lost);
                    connection_lost.store(true, Ordering::Release);
                    running.store(false, Ordering::Release);
                    let _ = events.try_send(WorkerEvent::ConnectionLost {
                        device: task.device_name().to_string(),
                        failures,
                    });
                    break;
                }
            }
        }

        if overrun {
            warn!("[{}] cycle overran its period: {:?} > {:?}", task.device_name(), exec, period);
        }

        next_release += period;
        let now = Instant::now();
        if next_release < now {
            next_release = now + period;
        }
    }

    task.shutdown();
    info!("[{}] DAQ worker stopped", task.device_name());
    task
}
