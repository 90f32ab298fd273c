//! The simulation driver: a root system, an integrator and the run loop.
//!
//! All state shared with device and frontend threads (the system and the
//! [`SimControl`] record) lives in one [`Engine`] behind one mutex. The
//! simulation thread holds the lock for one step at a time; output records
//! are pushed and pacing waits happen with the lock released.

use std::any::Any;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use fdm_core::{Timer, time_eps};
use fdm_results::TimeSeries;
use fdm_system::{Args, Record, System, SystemError, SystemResult, Value};
use tracing::{debug, error, info, warn};

use crate::control::{RunSummary, SimControl};
use crate::error::{SimError, SimResult};
use crate::event::StartEvent;
use crate::integrator::{OdeIntegrator, OdeRhs, StepInfo};
use crate::io::{Attachment, Attachments, Frontend, OutputPort, OutputRecord, run_output};
use crate::options::SimOptions;
use crate::pacing::{Pacer, SyncStatus};
use crate::schedule::PeriodicClock;

/// Per-step user callback. Receives the system after the step completed;
/// it cannot modify it.
pub type Callback = Box<dyn FnMut(&System) + Send>;

/// Restores a system to its initial values before a new run.
pub type ReinitFn = Box<dyn FnMut(&mut System) -> SystemResult<()> + Send>;

pub(crate) type SharedEngine = Mutex<Engine>;

const PAUSE_POLL: Duration = Duration::from_millis(1);

/// Everything the simulation thread mutates.
pub(crate) struct Engine {
    pub(crate) sys: System,
    pub(crate) control: SimControl,
    integrator: OdeIntegrator,
    clock: PeriodicClock,
    options: SimOptions,
    log: Vec<(f64, Value)>,
    save_at: Vec<f64>,
    save_cursor: usize,
    last_saved: Option<f64>,
    started: bool,
    callback: Option<Callback>,
    reinit: Option<ReinitFn>,
    args: Option<Box<dyn Any + Send + Sync>>,
}

fn erased(args: &Option<Box<dyn Any + Send + Sync>>) -> Args<'_> {
    match args {
        Some(a) => Args::from_any(a.as_ref()),
        None => Args::NONE,
    }
}

/// The system seen by the integrator: trial points are written into the root
/// state, evaluated, and the derivative copied out.
struct SystemRhs<'a, 'b> {
    sys: &'a mut System,
    args: Args<'b>,
}

impl OdeRhs for SystemRhs<'_, '_> {
    fn rhs(&mut self, t: f64, x: &[f64], xdot: &mut [f64]) -> SimResult<()> {
        self.sys.set_t(t);
        // A blown-up stage is a solver failure, not a bad caller-supplied state.
        self.sys.set_x(x).map_err(|e| match e {
            SystemError::NonFinite { .. } => SimError::Integration {
                t,
                message: e.to_string(),
            },
            e => SimError::System(e),
        })?;
        self.sys.f_ode(self.args)?;
        xdot.copy_from_slice(self.sys.xdot());
        Ok(())
    }
}

impl Engine {
    fn new(mut sys: System, options: SimOptions) -> SimResult<Self> {
        options.validate()?;
        sys.set_t(options.t_start);
        let mut integrator =
            OdeIntegrator::new(options.integrator_config(), sys.x(), options.t_start)?;
        let mut save_at = options.save.at.clone();
        save_at.sort_by(f64::total_cmp);
        save_at.dedup();
        for &t in &save_at {
            if t <= options.t_end {
                integrator.add_permanent_tstop(t)?;
            }
        }
        let clock = PeriodicClock::new(options.disc_dt, options.t_start)?;
        let engine = Self {
            sys,
            control: SimControl::new(options.pace, options.t_start),
            integrator,
            clock,
            options,
            log: Vec::new(),
            save_at,
            save_cursor: 0,
            last_saved: None,
            started: false,
            callback: None,
            reinit: None,
            args: None,
        };
        Ok(engine)
    }

    /// Evaluate outputs at the initial point and save the first sample.
    ///
    /// Deferred until first use so builder-supplied args are in place.
    fn start(&mut self) -> SimResult<()> {
        let t0 = self.options.t_start;
        self.sys.f_ode(erased(&self.args))?;
        self.started = true;
        let eps = time_eps(t0);
        let mut at_start = false;
        while let Some(&s) = self.save_at.get(self.save_cursor)
            && s <= t0 + eps
        {
            at_start |= s >= t0 - eps;
            self.save_cursor += 1;
        }
        if self.options.save.start || at_start {
            self.save_sample(t0);
        }
        Ok(())
    }

    fn ensure_started(&mut self) -> SimResult<()> {
        if !self.started {
            self.start()?;
        }
        Ok(())
    }

    fn reinit(&mut self, with: Option<ReinitFn>) -> SimResult<()> {
        match with {
            Some(mut f) => f(&mut self.sys)?,
            None => match &mut self.reinit {
                Some(f) => f(&mut self.sys)?,
                None => self.sys.reset()?,
            },
        }
        let t0 = self.options.t_start;
        self.sys.set_t(t0);
        self.integrator.reinit(self.sys.x(), t0)?;
        self.clock.reset(t0);
        self.control.reset(t0);
        self.log.clear();
        self.save_cursor = 0;
        self.last_saved = None;
        self.start()?;
        debug!(t = t0, "simulation reinitialized");
        Ok(())
    }

    /// One full step: integrate, sync, post-step and discrete hooks, callback,
    /// diagnostics and save.
    fn step(&mut self) -> SimResult<StepInfo> {
        self.ensure_started()?;
        if self.integrator.is_done() {
            return Err(SimError::InvalidArg {
                what: "simulation already reached t_end",
            });
        }
        if self.integrator.steps() >= self.options.max_steps {
            return Err(SimError::Integration {
                t: self.integrator.t(),
                message: format!("max_steps ({}) exceeded", self.options.max_steps),
            });
        }

        let Engine {
            sys,
            integrator,
            clock,
            control,
            args,
            callback,
            ..
        } = self;
        let args = erased(args);

        let mut rhs = SystemRhs {
            sys: &mut *sys,
            args,
        };
        let info = integrator.step(&mut rhs, clock.next_time())?;

        // Outputs and ẋ must reflect the accepted state, not the last trial
        // evaluation.
        sys.set_t(info.t);
        sys.set_x(integrator.x())?;
        sys.f_ode(args)?;

        let mut modified = sys.f_step(args)?;
        let discrete = clock.is_due(info.t);
        if discrete {
            modified |= sys.f_disc(clock.period(), args)?;
            clock.advance_past(info.t);
            control.discrete_updates += 1;
        }
        if modified {
            integrator.set_x(sys.x())?;
        }
        // A discrete update may have changed `s` or `u` without touching `x`;
        // either way `y` is refreshed before anyone observes it.
        if modified || discrete {
            sys.f_ode(args)?;
        }

        if let Some(callback) = callback {
            callback(&*sys);
        }

        control.t = info.t;
        control.dt = info.dt;
        control.steps += 1;

        self.save(info.t);
        Ok(info)
    }

    fn save(&mut self, t: f64) {
        let eps = time_eps(t);
        let mut at = false;
        while let Some(&s) = self.save_at.get(self.save_cursor)
            && s <= t + eps
        {
            at |= s >= t - eps;
            self.save_cursor += 1;
        }
        let end = self.integrator.is_done() && self.options.save.end;
        if self.options.save.every_step || at || end {
            self.save_sample(t);
        }
    }

    fn save_sample(&mut self, t: f64) {
        if self.last_saved == Some(t) {
            return;
        }
        // A system without outputs logs empty records so the time axis is kept.
        let y = self
            .sys
            .snapshot_y()
            .unwrap_or_else(|| Value::Record(Record::new()));
        self.log.push((t, y));
        self.last_saved = Some(t);
    }

    fn summary(&self, aborted: bool) -> RunSummary {
        RunSummary {
            t: self.control.t,
            steps: self.control.steps,
            wall_time: self.control.wall_time,
            overruns: self.control.overruns,
            dropped_outputs: self.control.dropped_outputs,
            discrete_updates: self.control.discrete_updates,
            mean_step_time: self.control.step_timer.average_seconds(),
            max_step_time: self.control.step_timer.max_seconds(),
            aborted,
        }
    }
}

fn lock(shared: &SharedEngine) -> SimResult<MutexGuard<'_, Engine>> {
    Ok(shared.lock()?)
}

/// Clears `running` and releases the start event when a run ends, on every
/// exit path including unwinding.
struct RunGuard<'a> {
    shared: &'a SharedEngine,
    start: &'a StartEvent,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let mut engine = self.shared.lock().unwrap_or_else(PoisonError::into_inner);
        engine.control.running = false;
        drop(engine);
        self.start.set();
    }
}

/// Thread-safe handle to a simulation for frontends, devices and tests.
#[derive(Clone)]
pub struct SimHandle {
    shared: Arc<SharedEngine>,
}

impl SimHandle {
    /// Stop the current run. The simulation thread exits at its next step
    /// boundary and devices at their next poll.
    pub fn abort(&self) -> SimResult<()> {
        lock(&self.shared)?.control.running = false;
        Ok(())
    }

    pub fn pause(&self) -> SimResult<()> {
        lock(&self.shared)?.control.paused = true;
        Ok(())
    }

    pub fn resume(&self) -> SimResult<()> {
        lock(&self.shared)?.control.paused = false;
        Ok(())
    }

    pub fn set_pace(&self, pace: f64) -> SimResult<()> {
        if !(pace > 0.0) {
            return Err(SimError::InvalidArg {
                what: "pace must be positive",
            });
        }
        lock(&self.shared)?.control.pace = pace;
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        crate::io::is_running(&self.shared)
    }

    pub fn t(&self) -> SimResult<f64> {
        Ok(lock(&self.shared)?.sys.t())
    }

    pub fn with_control<R>(&self, f: impl FnOnce(&mut SimControl) -> R) -> SimResult<R> {
        Ok(f(&mut lock(&self.shared)?.control))
    }

    pub fn with_system<R>(&self, f: impl FnOnce(&mut System) -> R) -> SimResult<R> {
        Ok(f(&mut lock(&self.shared)?.sys))
    }
}

impl std::fmt::Debug for SimHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimHandle").finish_non_exhaustive()
    }
}

/// A root system driven by an ODE integrator, with attached devices.
pub struct Simulation {
    shared: Arc<SharedEngine>,
    attachments: Attachments,
    frontend: Option<Box<dyn Frontend>>,
}

impl Simulation {
    pub fn new(system: System, options: SimOptions) -> SimResult<Self> {
        let engine = Engine::new(system, options)?;
        debug!(
            states = engine.sys.x().len(),
            nodes = engine.sys.node_count(),
            algorithm = ?engine.options.algorithm,
            dt = engine.options.dt,
            disc_dt = engine.options.disc_dt,
            "simulation created"
        );
        Ok(Self {
            shared: Arc::new(Mutex::new(engine)),
            attachments: Attachments::default(),
            frontend: None,
        })
    }

    /// Called after every step with the updated system.
    pub fn with_callback(self, callback: impl FnMut(&System) + Send + 'static) -> Self {
        self.engine_mut(|e| e.callback = Some(Box::new(callback)));
        self
    }

    /// Replaces [`System::reset`] as the default reinitialization.
    pub fn with_reinit(
        self,
        reinit: impl FnMut(&mut System) -> SystemResult<()> + Send + 'static,
    ) -> Self {
        self.engine_mut(|e| e.reinit = Some(Box::new(reinit)));
        self
    }

    /// Extra argument passed to every update call, retrieved in components
    /// with [`Args::get`].
    pub fn with_args<T: Any + Send + Sync>(self, args: T) -> Self {
        self.engine_mut(|e| e.args = Some(Box::new(args)));
        self
    }

    fn engine_mut(&self, f: impl FnOnce(&mut Engine)) {
        // Builder methods run before any thread exists; poisoning is impossible.
        f(&mut self.shared.lock().unwrap_or_else(PoisonError::into_inner));
    }

    fn engine(&self) -> SimResult<MutexGuard<'_, Engine>> {
        lock(&self.shared)
    }

    fn started_engine(&self) -> SimResult<MutexGuard<'_, Engine>> {
        let mut engine = lock(&self.shared)?;
        engine.ensure_started()?;
        Ok(engine)
    }

    /// Advance by one step on the calling thread.
    pub fn step(&mut self) -> SimResult<StepInfo> {
        self.engine()?.step()
    }

    /// Reset the system with the configured reinit function and restart from
    /// `t_start`. Clears the log.
    pub fn reinit(&mut self) -> SimResult<()> {
        self.engine()?.reinit(None)
    }

    /// Reinitialize with a one-off function instead of the configured one.
    pub fn reinit_with(
        &mut self,
        f: impl FnMut(&mut System) -> SystemResult<()> + Send + 'static,
    ) -> SimResult<()> {
        self.engine()?.reinit(Some(Box::new(f)))
    }

    /// Make the integrator land exactly on `t`.
    pub fn add_tstop(&mut self, t: f64) -> SimResult<()> {
        self.engine()?.integrator.add_tstop(t)
    }

    pub fn proposed_dt(&self) -> SimResult<f64> {
        Ok(self.engine()?.integrator.proposed_dt())
    }

    pub fn t(&self) -> SimResult<f64> {
        Ok(self.engine()?.integrator.t())
    }

    pub fn is_done(&self) -> SimResult<bool> {
        Ok(self.engine()?.integrator.is_done())
    }

    pub fn options(&self) -> SimResult<SimOptions> {
        Ok(self.engine()?.options.clone())
    }

    /// Attach an input ([`Input`](crate::Input)) or output
    /// ([`Output`](crate::Output)) device.
    pub fn attach(&mut self, attachment: impl Attachment) {
        attachment.register(&mut self.attachments);
    }

    pub fn attachments(&self) -> &Attachments {
        &self.attachments
    }

    pub fn set_frontend(&mut self, frontend: impl Frontend + 'static) {
        self.frontend = Some(Box::new(frontend));
    }

    pub fn handle(&self) -> SimHandle {
        SimHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Copy of the `(t, y)` log.
    pub fn log(&self) -> SimResult<Vec<(f64, Value)>> {
        Ok(self.started_engine()?.log.clone())
    }

    /// Number of logged samples.
    pub fn log_len(&self) -> SimResult<usize> {
        Ok(self.started_engine()?.log.len())
    }

    pub fn timeseries(&self) -> SimResult<TimeSeries> {
        Ok(TimeSeries::from_log(self.log()?)?)
    }

    pub fn with_system<R>(&self, f: impl FnOnce(&System) -> R) -> SimResult<R> {
        Ok(f(&self.engine()?.sys))
    }

    pub fn with_system_mut<R>(&mut self, f: impl FnOnce(&mut System) -> R) -> SimResult<R> {
        Ok(f(&mut self.engine()?.sys))
    }

    pub fn with_control<R>(&self, f: impl FnOnce(&SimControl) -> R) -> SimResult<R> {
        Ok(f(&self.engine()?.control))
    }

    /// Run to `t_end` as fast as possible. Only output devices are started;
    /// input devices and the frontend are left idle.
    pub fn run(&mut self) -> SimResult<RunSummary> {
        self.run_threads(f64::INFINITY, false)
    }

    /// Run paced against the wall clock with every attached device and the
    /// frontend (on the calling thread). `pace` is the real-time factor;
    /// infinity disables pacing.
    pub fn run_interactive(&mut self, pace: f64) -> SimResult<RunSummary> {
        if !(pace > 0.0) {
            return Err(SimError::InvalidArg {
                what: "pace must be positive",
            });
        }
        self.run_threads(pace, true)
    }

    fn run_threads(&mut self, pace: f64, interactive: bool) -> SimResult<RunSummary> {
        let t_start = {
            let mut engine = self.started_engine()?;
            engine.control.running = true;
            engine.control.paused = false;
            engine.control.pace = pace;
            engine.control.t
        };
        let inputs = if interactive {
            self.attachments.inputs.len()
        } else {
            0
        };
        info!(
            t = t_start,
            pace,
            interactive,
            inputs,
            outputs = self.attachments.outputs.len(),
            "run started"
        );

        let shared: &SharedEngine = &self.shared;
        let start = StartEvent::new();
        let Attachments { inputs, outputs } = &mut self.attachments;
        let frontend = if interactive {
            self.frontend.as_deref_mut()
        } else {
            None
        };

        let (sim_result, frontend_result) = thread::scope(|s| {
            let guard = RunGuard {
                shared,
                start: &start,
            };
            let start = &start;

            let mut ports = Vec::with_capacity(outputs.len());
            for (k, device) in outputs.iter_mut().enumerate() {
                debug!(device = device.name(), thread = k, "starting output device");
                let (port, rx) = OutputPort::channel();
                ports.push(port);
                let spawned = thread::Builder::new()
                    .name(format!("fdm-output-{k}"))
                    .spawn_scoped(s, move || run_output(device.as_mut(), rx, shared, start));
                if let Err(e) = spawned {
                    return (Err(SimError::from(e)), Ok(()));
                }
            }
            if interactive {
                for (k, input) in inputs.iter_mut().enumerate() {
                    debug!(device = input.name(), thread = k, "starting input device");
                    let spawned = thread::Builder::new()
                        .name(format!("fdm-input-{k}"))
                        .spawn_scoped(s, move || input.run(shared, start));
                    if let Err(e) = spawned {
                        return (Err(SimError::from(e)), Ok(()));
                    }
                }
            }

            let sim = match thread::Builder::new()
                .name("fdm-sim".into())
                .spawn_scoped(s, move || {
                    let _guard = RunGuard { shared, start };
                    sim_loop(shared, start, ports)
                }) {
                Ok(h) => h,
                Err(e) => return (Err(SimError::from(e)), Ok(())),
            };

            let frontend_result = match frontend {
                Some(frontend) => run_frontend(frontend, shared, start),
                None => Ok(()),
            };
            let sim_result = sim.join().unwrap_or_else(|_| {
                Err(SimError::ThreadPanicked {
                    name: "fdm-sim".into(),
                })
            });
            drop(guard);
            (sim_result, frontend_result)
        });

        let summary = sim_result?;
        frontend_result?;
        if summary.overruns > 0 {
            warn!(overruns = summary.overruns, "steps missed their pacing deadline");
        }
        info!(
            t = summary.t,
            steps = summary.steps,
            wall_time = summary.wall_time,
            mean_step_ms = summary.mean_step_time * 1e3,
            aborted = summary.aborted,
            "run finished"
        );
        Ok(summary)
    }
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("attachments", &self.attachments)
            .field("frontend", &self.frontend.is_some())
            .finish_non_exhaustive()
    }
}

fn sim_loop(
    shared: &SharedEngine,
    start: &StartEvent,
    ports: Vec<OutputPort>,
) -> SimResult<RunSummary> {
    start.set();
    let started = Instant::now();
    let mut pacer = Pacer::new();
    let mut rebase = true;
    let mut pace = f64::NAN;
    let mut dropped = 0_u64;
    let mut overruns = 0_u64;

    loop {
        let (deadline, record) = {
            let mut engine = lock(shared)?;
            engine.control.wall_time = started.elapsed().as_secs_f64();
            engine.control.dropped_outputs += std::mem::take(&mut dropped);
            engine.control.overruns += std::mem::take(&mut overruns);

            if !engine.control.running {
                debug!(t = engine.control.t, "run aborted");
                return Ok(engine.summary(true));
            }
            if engine.integrator.is_done() {
                return Ok(engine.summary(false));
            }
            if engine.control.paused {
                drop(engine);
                rebase = true;
                spin_sleep::sleep(PAUSE_POLL);
                continue;
            }
            if engine.control.pace != pace {
                pace = engine.control.pace;
                rebase = true;
            }
            if rebase {
                pacer.rebase();
                rebase = false;
            }

            let timer = Timer::start();
            let info = match engine.step() {
                Ok(info) => info,
                Err(e) => {
                    error!(t = engine.integrator.t(), error = %e, "simulation step failed");
                    return Err(e);
                }
            };
            timer.stop_into(&engine.control.step_timer);

            let record = (!ports.is_empty()).then(|| OutputRecord {
                t: info.t,
                y: engine.sys.snapshot_y(),
            });
            (pacer.advance(info.dt, pace), record)
        };

        if let Some(record) = record {
            for port in &ports {
                if port.offer(record.clone()) {
                    dropped += 1;
                }
            }
        }

        if let SyncStatus::OutOfSync(lag) = Pacer::wait(deadline) {
            overruns += 1;
            if lag > Duration::from_millis(100) {
                // Far behind: restart pacing instead of racing to catch up.
                debug!(lag_ms = lag.as_millis() as u64, "pacing rebased");
                rebase = true;
            }
        }
    }
}

fn run_frontend(
    frontend: &mut dyn Frontend,
    shared: &SharedEngine,
    start: &StartEvent,
) -> SimResult<()> {
    let abort = |message: String| {
        let mut engine = shared.lock().unwrap_or_else(PoisonError::into_inner);
        engine.control.running = false;
        SimError::Frontend { message }
    };

    if let Err(e) = frontend.init() {
        error!(error = %e, "frontend failed to initialize");
        return Err(abort(e.to_string()));
    }
    start.wait()?;

    let mut result = Ok(());
    loop {
        {
            let mut engine = lock(shared)?;
            let Engine { sys, control, .. } = &mut *engine;
            if !control.running {
                break;
            }
            if let Err(e) = frontend.render(sys, control) {
                drop(engine);
                error!(error = %e, "frontend failed; aborting run");
                result = Err(abort(e.to_string()));
                break;
            }
        }
        if frontend.should_close() {
            info!("frontend closed; aborting run");
            lock(shared)?.control.running = false;
            break;
        }
        thread::sleep(frontend.refresh_interval());
    }
    if let Err(e) = frontend.shutdown() {
        warn!(error = %e, "frontend shutdown failed");
    }
    result
}
