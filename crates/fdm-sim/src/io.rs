//! I/O device contract and attachment.
//!
//! Devices run on their own threads for the duration of a run. Input devices
//! read outside the simulation lock and assign into `u` under it; output
//! devices consume `(t, y)` records from a single-slot channel that the
//! simulation thread overwrites instead of blocking on.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use fdm_system::{System, SystemResult, Value};
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::control::SimControl;
use crate::error::IoResult;
use crate::event::StartEvent;
use crate::sim::SharedEngine;

/// How long an output thread waits for a record before re-checking the run
/// flags.
const OUTPUT_POLL: Duration = Duration::from_millis(20);

/// Lifecycle shared by every peripheral.
pub trait IoDevice: Send {
    fn init(&mut self) -> IoResult<()> {
        Ok(())
    }

    fn shutdown(&mut self) -> IoResult<()> {
        Ok(())
    }

    /// The device asks to stop (disconnected, exhausted, window closed).
    fn should_close(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// A device producing readings, e.g. a joystick or a network socket.
pub trait InputDevice: IoDevice {
    type Data: Send;

    /// Next reading. May block; never called with the simulation lock held.
    fn get_data(&mut self) -> IoResult<Self::Data>;
}

/// A device consuming `(t, y)` records, e.g. a file writer or a plot.
pub trait OutputDevice: IoDevice {
    /// May block; the simulation keeps running and replaces unconsumed data.
    fn handle_data(&mut self, record: &OutputRecord) -> IoResult<()>;
}

/// Maps a device reading onto the system's inputs. Called under the lock.
pub trait InputMapping<D>: Send {
    fn assign(&mut self, sys: &mut System, data: &D) -> SystemResult<()>;
}

impl<D, F> InputMapping<D> for F
where
    F: FnMut(&mut System, &D) -> SystemResult<()> + Send,
{
    fn assign(&mut self, sys: &mut System, data: &D) -> SystemResult<()> {
        self(sys, data)
    }
}

/// Interactive surface driven from the thread calling
/// [`Simulation::run_interactive`](crate::Simulation::run_interactive).
///
/// Each refresh renders under the simulation lock, so `render` must not wait
/// on anything external (no vsync). A failing frontend aborts the run.
pub trait Frontend: Send {
    fn init(&mut self) -> IoResult<()> {
        Ok(())
    }

    fn render(&mut self, sys: &System, control: &mut SimControl) -> IoResult<()>;

    fn should_close(&self) -> bool {
        false
    }

    fn shutdown(&mut self) -> IoResult<()> {
        Ok(())
    }

    fn refresh_interval(&self) -> Duration {
        Duration::from_millis(16)
    }
}

/// Snapshot handed to output devices.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OutputRecord {
    pub t: f64,
    pub y: Option<Value>,
}

/// Something that can be attached to a simulation.
///
/// Implemented by [`Input`] and [`Output`], so `attach` dispatches on the
/// device's capability.
pub trait Attachment {
    fn register(self, attachments: &mut Attachments);
}

/// Devices attached to a simulation, kept across runs.
#[derive(Default)]
pub struct Attachments {
    pub(crate) inputs: Vec<Box<dyn InputWorker>>,
    pub(crate) outputs: Vec<Box<dyn OutputDevice>>,
}

impl Attachments {
    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }
}

impl std::fmt::Debug for Attachments {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attachments")
            .field("inputs", &self.inputs.len())
            .field("outputs", &self.outputs.len())
            .finish()
    }
}

/// An input device paired with the mapping that applies its readings.
pub struct Input<D, M> {
    device: D,
    mapping: M,
}

impl<D, M> Input<D, M>
where
    D: InputDevice + 'static,
    M: InputMapping<D::Data> + 'static,
{
    pub fn new(device: D, mapping: M) -> Self {
        Self { device, mapping }
    }
}

impl<D, M> Attachment for Input<D, M>
where
    D: InputDevice + 'static,
    M: InputMapping<D::Data> + 'static,
{
    fn register(self, attachments: &mut Attachments) {
        attachments.inputs.push(Box::new(self));
    }
}

/// An output device.
pub struct Output<D>(pub D);

impl<D: OutputDevice + 'static> Output<D> {
    pub fn new(device: D) -> Self {
        Self(device)
    }
}

impl<D: OutputDevice + 'static> Attachment for Output<D> {
    fn register(self, attachments: &mut Attachments) {
        attachments.outputs.push(Box::new(self.0));
    }
}

/// Type-erased input loop.
pub(crate) trait InputWorker: Send {
    fn name(&self) -> &str;
    fn run(&mut self, shared: &SharedEngine, start: &StartEvent);
}

impl<D, M> InputWorker for Input<D, M>
where
    D: InputDevice,
    M: InputMapping<D::Data>,
{
    fn name(&self) -> &str {
        self.device.name()
    }

    fn run(&mut self, shared: &SharedEngine, start: &StartEvent) {
        let name = self.name().to_string();
        if let Err(e) = self.device.init() {
            error!(device = %name, error = %e, "input device failed to initialize");
            return;
        }
        if start.wait().is_ok() {
            loop {
                if self.device.should_close() || !is_running(shared) {
                    break;
                }
                let data = match self.device.get_data() {
                    Ok(data) => data,
                    Err(e) => {
                        error!(device = %name, error = %e, "input device failed");
                        break;
                    }
                };
                let Ok(mut engine) = shared.lock() else {
                    break;
                };
                if !engine.control.running {
                    break;
                }
                let assigned = self
                    .mapping
                    .assign(&mut engine.sys, &data)
                    .and_then(|()| engine.sys.check_shapes());
                if let Err(e) = assigned {
                    error!(device = %name, error = %e, "input mapping failed");
                    break;
                }
            }
        }
        if let Err(e) = self.device.shutdown() {
            warn!(device = %name, error = %e, "input device shutdown failed");
        }
        debug!(device = %name, "input loop exited");
    }
}

pub(crate) fn is_running(shared: &SharedEngine) -> bool {
    shared.lock().map(|e| e.control.running).unwrap_or(false)
}

/// Producer side of an output channel, owned by the simulation thread.
pub(crate) struct OutputPort {
    tx: Sender<OutputRecord>,
    // Lets the producer discard a record the consumer has not taken yet.
    stale: Receiver<OutputRecord>,
}

impl OutputPort {
    pub(crate) fn channel() -> (Self, Receiver<OutputRecord>) {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let stale = rx.clone();
        (Self { tx, stale }, rx)
    }

    /// Offer a record without blocking. Returns `true` if an unconsumed record
    /// was replaced.
    pub(crate) fn offer(&self, record: OutputRecord) -> bool {
        match self.tx.try_send(record) {
            Ok(()) => false,
            Err(TrySendError::Full(record)) => {
                let replaced = self.stale.try_recv().is_ok();
                // Single producer: the slot is free now unless the consumer
                // raced us to it, in which case it is free as well.
                let _ = self.tx.try_send(record);
                replaced
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

pub(crate) fn run_output(
    device: &mut dyn OutputDevice,
    rx: Receiver<OutputRecord>,
    shared: &SharedEngine,
    start: &StartEvent,
) {
    let name = device.name().to_string();
    if let Err(e) = device.init() {
        error!(device = %name, error = %e, "output device failed to initialize");
        return;
    }
    if start.wait().is_ok() {
        loop {
            if device.should_close() {
                break;
            }
            match rx.recv_timeout(OUTPUT_POLL) {
                Ok(record) => {
                    if let Err(e) = device.handle_data(&record) {
                        error!(device = %name, error = %e, "output device failed");
                        break;
                    }
                }
                // Records still queued are delivered before disconnection.
                Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    if !is_running(shared) && rx.is_empty() {
                        break;
                    }
                }
            }
        }
    }
    if let Err(e) = device.shutdown() {
        warn!(device = %name, error = %e, "output device shutdown failed");
    }
    debug!(device = %name, "output loop exited");
}
