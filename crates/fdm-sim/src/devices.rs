//! Reference devices: a JSON-lines file writer, a scripted input replay and a
//! console status frontend.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::{Duration, Instant};

use fdm_results::JsonlWriter;
use fdm_system::System;
use tracing::info;

use crate::control::SimControl;
use crate::error::{IoError, IoResult};
use crate::io::{Frontend, InputDevice, IoDevice, OutputDevice, OutputRecord};

/// Writes every record it receives as one JSON line.
#[derive(Debug)]
pub struct JsonlOutput<W: Write + Send> {
    writer: JsonlWriter<W>,
}

impl JsonlOutput<BufWriter<File>> {
    pub fn create(path: impl AsRef<Path>) -> IoResult<Self> {
        let file = File::create(path)?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write + Send> JsonlOutput<W> {
    pub fn new(out: W) -> Self {
        Self {
            writer: JsonlWriter::new(out),
        }
    }

    pub fn records_written(&self) -> u64 {
        self.writer.records_written()
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W: Write + Send> IoDevice for JsonlOutput<W> {
    fn shutdown(&mut self) -> IoResult<()> {
        self.writer.flush()?;
        Ok(())
    }

    fn name(&self) -> &str {
        "jsonl-output"
    }
}

impl<W: Write + Send> OutputDevice for JsonlOutput<W> {
    fn handle_data(&mut self, record: &OutputRecord) -> IoResult<()> {
        self.writer.write_sample(record.t, record.y.as_ref())?;
        Ok(())
    }
}

/// Replays a fixed sequence of readings, one per `interval`, then asks to
/// close.
#[derive(Debug, Clone)]
pub struct ScriptedInput<T> {
    readings: VecDeque<T>,
    interval: Duration,
    last: Option<Instant>,
}

impl<T> ScriptedInput<T> {
    pub fn new(readings: impl IntoIterator<Item = T>, interval: Duration) -> Self {
        Self {
            readings: readings.into_iter().collect(),
            interval,
            last: None,
        }
    }

    pub fn remaining(&self) -> usize {
        self.readings.len()
    }
}

impl<T: Send> IoDevice for ScriptedInput<T> {
    fn should_close(&self) -> bool {
        self.readings.is_empty()
    }

    fn name(&self) -> &str {
        "scripted-input"
    }
}

impl<T: Send> InputDevice for ScriptedInput<T> {
    type Data = T;

    fn get_data(&mut self) -> IoResult<T> {
        if let Some(last) = self.last {
            let next = last + self.interval;
            let now = Instant::now();
            if next > now {
                spin_sleep::sleep(next - now);
            }
        }
        self.last = Some(Instant::now());
        self.readings.pop_front().ok_or_else(|| IoError::Device {
            message: "script exhausted".into(),
        })
    }
}

/// Logs a status line at a fixed interval.
#[derive(Debug, Clone)]
pub struct ConsoleFrontend {
    interval: Duration,
    last: Option<Instant>,
    t_start: f64,
    renders: u64,
}

impl ConsoleFrontend {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
            t_start: 0.0,
            renders: 0,
        }
    }

    /// Status lines emitted so far.
    pub fn renders(&self) -> u64 {
        self.renders
    }
}

impl Default for ConsoleFrontend {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl Frontend for ConsoleFrontend {
    fn render(&mut self, sys: &System, control: &mut SimControl) -> IoResult<()> {
        let now = Instant::now();
        match self.last {
            None => {
                self.t_start = control.t;
            }
            Some(last) if now.duration_since(last) < self.interval => return Ok(()),
            Some(_) => {}
        }
        self.last = Some(now);
        self.renders += 1;
        info!(
            t = sys.t(),
            steps = control.steps,
            pace = control.achieved_pace(self.t_start),
            overruns = control.overruns,
            dropped = control.dropped_outputs,
            step_ms = control.step_timer.average_seconds() * 1e3,
            paused = control.paused,
            "status"
        );
        Ok(())
    }

    fn refresh_interval(&self) -> Duration {
        self.interval.min(Duration::from_millis(50))
    }
}
