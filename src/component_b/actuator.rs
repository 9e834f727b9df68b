//! actuator.rs
//! Heater power supply: transport trait, polling worker, and the handle the cycle talks to.
//!
//! - The worker thread owns the transport; nobody else touches the serial device
//! - Commands are fire-and-forget over a bounded channel (dropped and counted when full)
//! - Readback (voltage, current, power, output enable) is polled at its own rate and
//!   published for the acquisition cycle, which only ever reads it
//! - After `critical_not_alive_count` consecutive failures the worker marks the supply as
//!   lost and exits; from then on it reports its output as disabled

use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info, warn};
use parking_lot::RwLock;
use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};
use thread_priority::{ThreadBuilderExt, ThreadPriority};

use crate::config::PsuConfig;
use crate::error::DaqResult;

/// Measured state of the power supply.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PsuReadback {
    /// Programmed source voltage [V].
    pub source_voltage: f64,
    pub measured_voltage: f64,
    pub measured_current: f64,
    /// Heater power [W].
    pub measured_power: f64,
    pub output_enabled: bool,
}

impl Default for PsuReadback {
    fn default() -> Self {
        Self {
            source_voltage: f64::NAN,
            measured_voltage: f64::NAN,
            measured_current: f64::NAN,
            measured_power: f64::NAN,
            output_enabled: false,
        }
    }
}

/// Serial-like programmable power supply.
pub trait ActuatorTransport: Send {
    fn name(&self) -> &str;

    fn set_source_voltage(&mut self, volts: f64) -> DaqResult<()>;

    fn set_output_enabled(&mut self, enabled: bool) -> DaqResult<()>;

    fn read_back(&mut self) -> DaqResult<PsuReadback>;
}

/// What the acquisition cycle needs from the heater side.
pub trait Actuator {
    /// Latest readback; `output_enabled` is false once the supply is lost.
    fn readback(&self) -> PsuReadback;

    /// Request a new source voltage without waiting for it to be applied.
    fn dispatch_voltage(&self, volts: f64);
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PsuCommand {
    SetVoltage(f64),
    SetOutput(bool),
}

struct Shared {
    readback: RwLock<PsuReadback>,
    alive: AtomicBool,
    dropped_commands: AtomicU64,
}

/// Cheap, cloneable front of the power supply worker.
#[derive(Clone)]
pub struct PsuHandle {
    name: Arc<str>,
    tx: Sender<PsuCommand>,
    shared: Arc<Shared>,
}

impl PsuHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Non-blocking send; a full queue drops the command.
    pub fn send(&self, command: PsuCommand) {
        if let Err(e) = self.tx.try_send(command) {
            self.shared.dropped_commands.fetch_add(1, Ordering::Relaxed);
            debug!("[{}] command dropped: {:?}", self.name, e);
        }
    }

    pub fn set_output_enabled(&self, enabled: bool) {
        self.send(PsuCommand::SetOutput(enabled));
    }

    pub fn is_alive(&self) -> bool {
        self.shared.alive.load(Ordering::Acquire)
    }

    pub fn dropped_commands(&self) -> u64 {
        self.shared.dropped_commands.load(Ordering::Relaxed)
    }
}

impl Actuator for PsuHandle {
    fn readback(&self) -> PsuReadback {
        let mut rb = *self.shared.readback.read();
        if !self.is_alive() {
            rb.output_enabled = false;
        }
        rb
    }

    fn dispatch_voltage(&self, volts: f64) {
        self.send(PsuCommand::SetVoltage(volts));
    }
}

/// Owns the power supply thread.
pub struct PowerSupply {
    handle: PsuHandle,
    running: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl PowerSupply {
    /// Spawn the polling worker with max thread priority (falls back to normal priority
    /// when the OS refuses).
    pub fn spawn<T>(transport: T, config: &PsuConfig) -> DaqResult<Self>
    where
        T: ActuatorTransport + 'static,
    {
        let (tx, rx) = bounded(config.command_capacity.max(1));
        let name: Arc<str> = Arc::from(transport.name());
        let shared = Arc::new(Shared {
            readback: RwLock::new(PsuReadback::default()),
            alive: AtomicBool::new(true),
            dropped_commands: AtomicU64::new(0),
        });
        let running = Arc::new(AtomicBool::new(true));

        let worker = PsuWorker {
            transport,
            rx,
            shared: shared.clone(),
            running: running.clone(),
            poll_interval: config.poll_interval(),
            critical_not_alive_count: config.critical_not_alive_count.max(1),
            consecutive_failures: 0,
        };

        let join = thread::Builder::new()
            .name(format!("psu:{}", name))
            .spawn_with_priority(ThreadPriority::Max, move |prio| {
                if let Err(e) = prio {
                    debug!("PSU worker runs at default priority: {:?}", e);
                }
                worker.run();
            })?;

        Ok(Self {
            handle: PsuHandle { name, tx, shared },
            running,
            join: Some(join),
        })
    }

    pub fn handle(&self) -> PsuHandle {
        self.handle.clone()
    }

    /// Stop polling and join the worker. Pending commands are applied first.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                error!("[{}] worker panicked", self.handle.name);
            }
        }
    }
}

impl Drop for PowerSupply {
    fn drop(&mut self) {
        self.stop();
    }
}

struct PsuWorker<T> {
    transport: T,
    rx: Receiver<PsuCommand>,
    shared: Arc<Shared>,
    running: Arc<AtomicBool>,
    poll_interval: Duration,
    critical_not_alive_count: u32,
    consecutive_failures: u32,
}

impl<T: ActuatorTransport> PsuWorker<T> {
    fn run(mut self) {
        info!("[{}] worker started, poll every {:?}", self.transport.name(), self.poll_interval);
        let mut next_poll = Instant::now();

        while self.running.load(Ordering::Acquire) {
            let now = Instant::now();
            if now >= next_poll {
                let ok = self.poll();
                if !self.track(ok) {
                    break;
                }
                next_poll = now + self.poll_interval;
                continue;
            }

            match self.rx.recv_timeout(next_poll - now) {
                Ok(command) => {
                    let ok = self.apply(command);
                    if !self.track(ok) {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        // Shutdown: apply whatever was still queued.
        if self.shared.alive.load(Ordering::Acquire) {
            while let Ok(command) = self.rx.try_recv() {
                let _ = self.apply(command);
            }
        }
        debug!("[{}] worker stopped.", self.transport.name());
    }

    fn apply(&mut self, command: PsuCommand) -> bool {
        let result = match command {
            PsuCommand::SetVoltage(v) => self.transport.set_source_voltage(v),
            PsuCommand::SetOutput(on) => self.transport.set_output_enabled(on),
        };
        match result {
            Ok(()) => true,
            Err(e) => {
                warn!("[{}] {:?} failed: {}", self.transport.name(), command, e);
                false
            }
        }
    }

    fn poll(&mut self) -> bool {
        match self.transport.read_back() {
            Ok(rb) => {
                *self.shared.readback.write() = rb;
                true
            }
            Err(e) => {
                debug!("[{}] readback failed: {}", self.transport.name(), e);
                false
            }
        }
    }

    /// Update the failure streak; returns `false` once the supply is considered lost.
    fn track(&mut self, ok: bool) -> bool {
        if ok {
            self.consecutive_failures = 0;
            return true;
        }
        self.consecutive_failures += 1;
        if self.consecutive_failures >= self.critical_not_alive_count {
            self.shared.alive.store(false, Ordering::Release);
            error!(
                "[{}] lost connection after {} consecutive failures",
                self.transport.name(),
                self.consecutive_failures
            );
            return false;
        }
        true
    }
}
