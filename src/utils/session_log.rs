//! session_log.rs
//! Tab-delimited session log of the regulated process.
//!
//! One file per recording session. The header producer runs exactly once when a session
//! begins; the line producer runs once per successful acquisition cycle. Elapsed time in
//! each line is measured from session start.
//!
//! `update()` drives the lifecycle from a shared `RecordSwitch`: the first cycle after
//! arming opens a new file, the first cycle after disarming closes it.

use chrono::Local;
use log::{error, info};
use std::{
    fs::{create_dir_all, File, OpenOptions},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Instant,
};

use crate::error::DaqResult;

/// Values written for one cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogRecord {
    pub temperature: f64,
    pub humidity: f64,
    pub heater_power: f64,
    pub aux_temperature: f64,
}

pub type HeaderFn = Box<dyn FnMut(&mut dyn Write) -> io::Result<()> + Send>;
pub type LineFn = Box<dyn FnMut(&mut dyn Write, f64, &LogRecord) -> io::Result<()> + Send>;

/// Operator's record on/off switch, shared with the cycle.
#[derive(Debug, Clone, Default)]
pub struct RecordSwitch(Arc<AtomicBool>);

impl RecordSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, armed: bool) {
        self.0.store(armed, Ordering::Release);
    }

    pub fn toggle(&self) -> bool {
        !self.0.fetch_xor(true, Ordering::AcqRel)
    }

    pub fn is_armed(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Writes the standard header: free-text comments, then column names and units.
pub fn write_default_header(w: &mut dyn Write, comments: &str) -> io::Result<()> {
    writeln!(w, "[HEADER]")?;
    write!(w, "{}", comments)?;
    write!(w, "\n\n[DATA]\n")?;
    writeln!(w, "time\ttemperature\thumidity\theater power")?;
    writeln!(w, "[s]\t[±0.5 °C]\t[±3 pct]\t[±0.05 W]")
}

/// Fixed-point field; a failed read prints `nan`, as the sensor firmware does.
pub fn fixed_or_nan(value: f64, decimals: usize) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else {
        format!("{:.*}", decimals, value)
    }
}

/// Writes one data line: `elapsed, temperature, humidity, heater_power`.
pub fn write_default_line(w: &mut dyn Write, elapsed_s: f64, r: &LogRecord) -> io::Result<()> {
    writeln!(
        w,
        "{:.1}\t{}\t{}\t{}",
        elapsed_s,
        fixed_or_nan(r.temperature, 2),
        fixed_or_nan(r.humidity, 1),
        fixed_or_nan(r.heater_power, 3)
    )
}

/// Whole seconds as `HH:MM:SS`.
pub fn pretty_duration(secs: f64) -> String {
    let secs = secs.max(0.0) as u64;
    format!("{:02}:{:02}:{:02}", secs / 3_600, (secs / 60) % 60, secs % 60)
}

/// Suffixed names tried when sessions start within the same second.
const MAX_NAME_SUFFIX: u32 = 100;

/// File name stem for a session started now, e.g. `200831_141502`.
pub fn session_file_stem() -> String {
    Local::now().format("%y%m%d_%H%M%S").to_string()
}

fn create_new(path: &Path) -> io::Result<File> {
    OpenOptions::new().write(true).create_new(true).open(path)
}

pub struct SessionLog {
    dir: PathBuf,
    switch: RecordSwitch,
    header_fn: HeaderFn,
    line_fn: LineFn,
    writer: Option<BufWriter<File>>,
    path: Option<PathBuf>,
    started: Option<Instant>,
    lines: u64,
}

impl SessionLog {
    pub fn new(dir: impl Into<PathBuf>, switch: RecordSwitch, header_fn: HeaderFn, line_fn: LineFn) -> Self {
        Self {
            dir: dir.into(),
            switch,
            header_fn,
            line_fn,
            writer: None,
            path: None,
            started: None,
            lines: 0,
        }
    }

    /// Log with the standard header (carrying `comments`) and line format.
    pub fn with_default_format(dir: impl Into<PathBuf>, switch: RecordSwitch, comments: String) -> Self {
        Self::new(
            dir,
            switch,
            Box::new(move |w: &mut dyn Write| write_default_header(w, &comments)),
            Box::new(write_default_line),
        )
    }

    pub fn is_recording(&self) -> bool {
        self.writer.is_some()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn lines_written(&self) -> u64 {
        self.lines
    }

    /// Seconds since the session began; 0 when not recording.
    pub fn elapsed(&self) -> f64 {
        self.started.map(|t| t.elapsed().as_secs_f64()).unwrap_or(0.0)
    }

    /// Elapsed session time as `HH:MM:SS`.
    pub fn pretty_elapsed(&self) -> String {
        pretty_duration(self.elapsed())
    }

    /// Open a new session file at `path` and write its header. Ends any running session
    /// first. Fails if `path` already exists; an existing log is never truncated.
    pub fn begin(&mut self, path: impl Into<PathBuf>) -> DaqResult<()> {
        self.end()?;
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                create_dir_all(parent)?;
            }
        }
        let file = create_new(&path)?;
        self.start(path, file)
    }

    /// Open a fresh `yyMMdd_HHmmss.txt` in the log directory, suffixed `_1`, `_2`, ... when
    /// a session from the same second already holds the name.
    pub fn begin_in_dir(&mut self) -> DaqResult<()> {
        self.end()?;
        create_dir_all(&self.dir)?;
        let stem = session_file_stem();

        for n in 0..MAX_NAME_SUFFIX {
            let name = if n == 0 { format!("{}.txt", stem) } else { format!("{}_{}.txt", stem, n) };
            let path = self.dir.join(name);
            match create_new(&path) {
                Ok(file) => return self.start(path, file),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("no free session file name for {} in {:?}", stem, self.dir),
        )
        .into())
    }

    fn start(&mut self, path: PathBuf, file: File) -> DaqResult<()> {
        let mut writer = BufWriter::new(file);
        (self.header_fn)(&mut writer)?;
        writer.flush()?;

        info!("Recording started: {:?}", path);
        self.writer = Some(writer);
        self.path = Some(path);
        self.started = Some(Instant::now());
        self.lines = 0;
        Ok(())
    }

    /// Append one line. No-op when not recording.
    pub fn append(&mut self, record: &LogRecord) -> DaqResult<()> {
        let elapsed = self.elapsed();
        if let Some(writer) = self.writer.as_mut() {
            (self.line_fn)(writer, elapsed, record)?;
            writer.flush()?;
            self.lines += 1;
        }
        Ok(())
    }

    /// Close the current session, if any.
    pub fn end(&mut self) -> DaqResult<()> {
        if let Some(mut writer) = self.writer.take() {
            self.started = None;
            writer.flush()?;
            info!("Recording stopped: {:?} ({} lines)", self.path, self.lines);
        }
        Ok(())
    }

    /// Per-cycle hook: follow the record switch, then append `record` if recording.
    ///
    /// I/O errors end the session and disarm the switch so a broken disk is reported once.
    pub fn update(&mut self, record: &LogRecord) {
        let result = match (self.switch.is_armed(), self.is_recording()) {
            (true, false) => self.begin_in_dir().and_then(|_| self.append(record)),
            (true, true) => self.append(record),
            (false, true) => self.end(),
            (false, false) => Ok(()),
        };

        if let Err(e) = result {
            error!("Session log failed, recording stopped: {}", e);
            self.writer = None;
            self.started = None;
            self.switch.set(false);
        }
    }
}

impl Drop for SessionLog {
    fn drop(&mut self) {
        let _ = self.end();
    }
}
