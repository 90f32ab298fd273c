//! Explicit ODE integrators over a flat state buffer.
//!
//! Every method owns its stage workspaces, sized once at construction, so a
//! step performs no allocation.

use fdm_core::{ensure_all_finite, time_eps};
use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};

/// Right-hand side `ẋ = f(t, x)` of an ODE.
pub trait OdeRhs {
    fn rhs(&mut self, t: f64, x: &[f64], xdot: &mut [f64]) -> SimResult<()>;
}

impl<F> OdeRhs for F
where
    F: FnMut(f64, &[f64], &mut [f64]) -> SimResult<()>,
{
    fn rhs(&mut self, t: f64, x: &[f64], xdot: &mut [f64]) -> SimResult<()> {
        self(t, x, xdot)
    }
}

/// Integrator selection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    /// Classical 4th-order Runge-Kutta (default, 4 rhs calls per step).
    #[default]
    Rk4,
    /// Heun's method (explicit trapezoid, 2nd order).
    Heun,
    /// Forward Euler (1st order, 1 rhs call per step).
    ForwardEuler,
    /// Bogacki-Shampine 3(2) with embedded error estimate.
    BogackiShampine,
}

impl Algorithm {
    /// True if the method carries an embedded error estimate.
    pub fn is_embedded(self) -> bool {
        matches!(self, Algorithm::BogackiShampine)
    }

    /// Order of the propagated solution.
    pub fn order(self) -> u32 {
        match self {
            Algorithm::Rk4 => 4,
            Algorithm::Heun => 2,
            Algorithm::ForwardEuler => 1,
            Algorithm::BogackiShampine => 3,
        }
    }
}

/// One explicit step method.
pub trait Integrator {
    /// Advance `x` in place from `t` by `dt`.
    ///
    /// Returns the scaled error norm for embedded methods (accept if ≤ 1).
    fn step<R: OdeRhs + ?Sized>(
        &mut self,
        rhs: &mut R,
        t: f64,
        x: &mut [f64],
        dt: f64,
        tol: &StepTolerance,
    ) -> SimResult<Option<f64>>;
}

/// Error-control tolerances for embedded methods.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepTolerance {
    pub abstol: f64,
    pub reltol: f64,
}

fn axpy(out: &mut [f64], x: &[f64], a: f64, k: &[f64]) {
    for ((o, xi), ki) in out.iter_mut().zip(x).zip(k) {
        *o = xi + a * ki;
    }
}

/// Classical RK4.
#[derive(Clone, Debug)]
pub struct Rk4 {
    k1: Vec<f64>,
    k2: Vec<f64>,
    k3: Vec<f64>,
    k4: Vec<f64>,
    tmp: Vec<f64>,
}

impl Rk4 {
    pub fn new(n: usize) -> Self {
        Self {
            k1: vec![0.0; n],
            k2: vec![0.0; n],
            k3: vec![0.0; n],
            k4: vec![0.0; n],
            tmp: vec![0.0; n],
        }
    }
}

impl Integrator for Rk4 {
    fn step<R: OdeRhs + ?Sized>(
        &mut self,
        rhs: &mut R,
        t: f64,
        x: &mut [f64],
        dt: f64,
        _tol: &StepTolerance,
    ) -> SimResult<Option<f64>> {
        rhs.rhs(t, x, &mut self.k1)?;

        axpy(&mut self.tmp, x, 0.5 * dt, &self.k1);
        rhs.rhs(t + 0.5 * dt, &self.tmp, &mut self.k2)?;

        axpy(&mut self.tmp, x, 0.5 * dt, &self.k2);
        rhs.rhs(t + 0.5 * dt, &self.tmp, &mut self.k3)?;

        axpy(&mut self.tmp, x, dt, &self.k3);
        rhs.rhs(t + dt, &self.tmp, &mut self.k4)?;

        // x_new = x + (dt/6) * (k1 + 2*k2 + 2*k3 + k4)
        let Self { k1, k2, k3, k4, .. } = self;
        for (((xi, a), b), (c, d)) in x.iter_mut().zip(&*k1).zip(&*k2).zip(k3.iter().zip(&*k4)) {
            *xi += dt / 6.0 * (a + 2.0 * b + 2.0 * c + d);
        }
        Ok(None)
    }
}

/// Heun's method.
#[derive(Clone, Debug)]
pub struct Heun {
    k1: Vec<f64>,
    k2: Vec<f64>,
    tmp: Vec<f64>,
}

impl Heun {
    pub fn new(n: usize) -> Self {
        Self {
            k1: vec![0.0; n],
            k2: vec![0.0; n],
            tmp: vec![0.0; n],
        }
    }
}

impl Integrator for Heun {
    fn step<R: OdeRhs + ?Sized>(
        &mut self,
        rhs: &mut R,
        t: f64,
        x: &mut [f64],
        dt: f64,
        _tol: &StepTolerance,
    ) -> SimResult<Option<f64>> {
        rhs.rhs(t, x, &mut self.k1)?;
        axpy(&mut self.tmp, x, dt, &self.k1);
        rhs.rhs(t + dt, &self.tmp, &mut self.k2)?;
        for ((xi, a), b) in x.iter_mut().zip(&self.k1).zip(&self.k2) {
            *xi += 0.5 * dt * (a + b);
        }
        Ok(None)
    }
}

/// Forward Euler (explicit, 1st order, fast for testing).
#[derive(Clone, Debug)]
pub struct ForwardEuler {
    k1: Vec<f64>,
}

impl ForwardEuler {
    pub fn new(n: usize) -> Self {
        Self { k1: vec![0.0; n] }
    }
}

impl Integrator for ForwardEuler {
    fn step<R: OdeRhs + ?Sized>(
        &mut self,
        rhs: &mut R,
        t: f64,
        x: &mut [f64],
        dt: f64,
        _tol: &StepTolerance,
    ) -> SimResult<Option<f64>> {
        rhs.rhs(t, x, &mut self.k1)?;
        for (xi, ki) in x.iter_mut().zip(&self.k1) {
            *xi += dt * ki;
        }
        Ok(None)
    }
}

/// Bogacki-Shampine 3(2) pair.
#[derive(Clone, Debug)]
pub struct BogackiShampine {
    k1: Vec<f64>,
    k2: Vec<f64>,
    k3: Vec<f64>,
    k4: Vec<f64>,
    tmp: Vec<f64>,
}

impl BogackiShampine {
    pub fn new(n: usize) -> Self {
        Self {
            k1: vec![0.0; n],
            k2: vec![0.0; n],
            k3: vec![0.0; n],
            k4: vec![0.0; n],
            tmp: vec![0.0; n],
        }
    }
}

impl Integrator for BogackiShampine {
    fn step<R: OdeRhs + ?Sized>(
        &mut self,
        rhs: &mut R,
        t: f64,
        x: &mut [f64],
        dt: f64,
        tol: &StepTolerance,
    ) -> SimResult<Option<f64>> {
        rhs.rhs(t, x, &mut self.k1)?;

        axpy(&mut self.tmp, x, 0.5 * dt, &self.k1);
        rhs.rhs(t + 0.5 * dt, &self.tmp, &mut self.k2)?;

        axpy(&mut self.tmp, x, 0.75 * dt, &self.k2);
        rhs.rhs(t + 0.75 * dt, &self.tmp, &mut self.k3)?;

        let Self { k1, k2, k3, k4, tmp } = self;
        for (((ti, xi), a), (b, c)) in tmp.iter_mut().zip(&*x).zip(&*k1).zip(k2.iter().zip(&*k3)) {
            *ti = xi + dt * (2.0 / 9.0 * a + 1.0 / 3.0 * b + 4.0 / 9.0 * c);
        }
        rhs.rhs(t + dt, tmp, k4)?;

        // Difference between the 3rd- and 2nd-order solutions, RMS-scaled.
        let sum: f64 = x
            .iter()
            .zip(&*tmp)
            .zip(k1.iter().zip(&*k2))
            .zip(k3.iter().zip(&*k4))
            .map(|(((xi, ti), (a, b)), (c, d))| {
                let err = dt * (-5.0 / 72.0 * a + 1.0 / 12.0 * b + 1.0 / 9.0 * c - 0.125 * d);
                let scale = tol.abstol + tol.reltol * xi.abs().max(ti.abs());
                (err / scale).powi(2)
            })
            .sum();
        let norm = if x.is_empty() {
            0.0
        } else {
            (sum / x.len() as f64).sqrt()
        };
        x.copy_from_slice(tmp);
        Ok(Some(norm))
    }
}

#[derive(Clone, Debug)]
enum Method {
    Rk4(Rk4),
    Heun(Heun),
    ForwardEuler(ForwardEuler),
    BogackiShampine(BogackiShampine),
}

impl Method {
    fn new(algorithm: Algorithm, n: usize) -> Self {
        match algorithm {
            Algorithm::Rk4 => Method::Rk4(Rk4::new(n)),
            Algorithm::Heun => Method::Heun(Heun::new(n)),
            Algorithm::ForwardEuler => Method::ForwardEuler(ForwardEuler::new(n)),
            Algorithm::BogackiShampine => Method::BogackiShampine(BogackiShampine::new(n)),
        }
    }

    fn step<R: OdeRhs + ?Sized>(
        &mut self,
        rhs: &mut R,
        t: f64,
        x: &mut [f64],
        dt: f64,
        tol: &StepTolerance,
    ) -> SimResult<Option<f64>> {
        match self {
            Method::Rk4(m) => m.step(rhs, t, x, dt, tol),
            Method::Heun(m) => m.step(rhs, t, x, dt, tol),
            Method::ForwardEuler(m) => m.step(rhs, t, x, dt, tol),
            Method::BogackiShampine(m) => m.step(rhs, t, x, dt, tol),
        }
    }
}

/// Settings for an [`OdeIntegrator`].
#[derive(Clone, Debug, PartialEq)]
pub struct IntegratorConfig {
    pub algorithm: Algorithm,
    pub adaptive: bool,
    pub dt: f64,
    pub dt_min: f64,
    pub t_end: f64,
    pub tol: StepTolerance,
}

/// Outcome of one accepted step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepInfo {
    pub t: f64,
    pub dt: f64,
    pub rejected: u32,
}

/// Integrator state: current time and state, step-size control and stop
/// times.
///
/// Steps never cross a stop time: the final step before one is shortened (or
/// stretched by at most the time tolerance) so that `t` lands on it exactly.
#[derive(Clone, Debug)]
pub struct OdeIntegrator {
    config: IntegratorConfig,
    method: Method,
    t: f64,
    x: Vec<f64>,
    trial: Vec<f64>,
    dt_proposed: f64,
    last_dt: f64,
    tstops: Vec<f64>,
    base_tstops: Vec<f64>,
    steps: u64,
    rejected: u64,
}

const MAX_REJECTS: u32 = 50;

impl OdeIntegrator {
    pub fn new(config: IntegratorConfig, x0: &[f64], t0: f64) -> SimResult<Self> {
        if !(config.dt > 0.0 && config.dt.is_finite()) {
            return Err(SimError::InvalidArg {
                what: "dt must be positive",
            });
        }
        if config.adaptive && !config.algorithm.is_embedded() {
            return Err(SimError::InvalidArg {
                what: "adaptive stepping requires an embedded method",
            });
        }
        let n = x0.len();
        let mut out = Self {
            method: Method::new(config.algorithm, n),
            t: t0,
            x: x0.to_vec(),
            trial: vec![0.0; n],
            dt_proposed: config.dt,
            last_dt: 0.0,
            tstops: Vec::new(),
            base_tstops: Vec::new(),
            steps: 0,
            rejected: 0,
            config,
        };
        out.push_tstop(out.config.t_end);
        out.base_tstops = out.tstops.clone();
        Ok(out)
    }

    pub fn t(&self) -> f64 {
        self.t
    }

    pub fn x(&self) -> &[f64] {
        &self.x
    }

    /// Replace the state after an external modification (post-step hooks).
    pub fn set_x(&mut self, x: &[f64]) -> SimResult<()> {
        if x.len() != self.x.len() {
            return Err(SimError::InvalidArg {
                what: "state length differs from integrator state",
            });
        }
        self.x.copy_from_slice(x);
        Ok(())
    }

    pub fn proposed_dt(&self) -> f64 {
        self.dt_proposed
    }

    /// Size of the last accepted step.
    pub fn last_dt(&self) -> f64 {
        self.last_dt
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    pub fn t_end(&self) -> f64 {
        self.config.t_end
    }

    pub fn is_done(&self) -> bool {
        self.t >= self.config.t_end - time_eps(self.config.t_end)
    }

    /// Pending stop times, ascending.
    pub fn tstops(&self) -> &[f64] {
        &self.tstops
    }

    /// Add a time the integrator must land on exactly.
    ///
    /// Past times and duplicates are ignored.
    pub fn add_tstop(&mut self, t: f64) -> SimResult<()> {
        if !t.is_finite() {
            return Err(SimError::InvalidArg {
                what: "tstop must be finite",
            });
        }
        if t > self.t + time_eps(self.t) {
            self.push_tstop(t);
        }
        Ok(())
    }

    /// Make `t` a stop that survives [`OdeIntegrator::reinit`].
    pub fn add_permanent_tstop(&mut self, t: f64) -> SimResult<()> {
        self.add_tstop(t)?;
        if t.is_finite() && !self.base_tstops.iter().any(|&s| (s - t).abs() <= time_eps(t)) {
            let at = self.base_tstops.partition_point(|&s| s < t);
            self.base_tstops.insert(at, t);
        }
        Ok(())
    }

    fn push_tstop(&mut self, t: f64) {
        let at = self.tstops.partition_point(|&s| s < t);
        let dup = |i: usize| {
            self.tstops
                .get(i)
                .is_some_and(|&s| (s - t).abs() <= time_eps(t))
        };
        if dup(at) || (at > 0 && dup(at - 1)) {
            return;
        }
        self.tstops.insert(at, t);
    }

    /// Restart from `x0` at `t0` with the original stop times.
    pub fn reinit(&mut self, x0: &[f64], t0: f64) -> SimResult<()> {
        self.set_x(x0)?;
        self.t = t0;
        self.dt_proposed = self.config.dt;
        self.last_dt = 0.0;
        self.steps = 0;
        self.rejected = 0;
        self.tstops.clear();
        let eps = time_eps(t0);
        self.tstops
            .extend(self.base_tstops.iter().copied().filter(|&s| s > t0 + eps));
        Ok(())
    }

    /// Take one accepted step, landing exactly on the next stop time or on
    /// `bound` if that comes first.
    pub fn step<R: OdeRhs + ?Sized>(&mut self, rhs: &mut R, bound: f64) -> SimResult<StepInfo> {
        let stop = self.tstops.first().copied().unwrap_or(f64::INFINITY).min(bound);
        let mut rejected = 0;
        loop {
            let remaining = stop - self.t;
            if remaining <= 0.0 {
                return Err(self.failure("no time left before the next stop"));
            }
            let lands = self.dt_proposed >= remaining - time_eps(stop);
            let dt = if lands { remaining } else { self.dt_proposed };
            if dt < self.config.dt_min {
                return Err(self.failure(format!("step size {dt:e} below dt_min")));
            }

            self.trial.copy_from_slice(&self.x);
            let err = self
                .method
                .step(rhs, self.t, &mut self.trial, dt, &self.config.tol)?;

            if self.config.adaptive {
                let norm = err.unwrap_or(0.0);
                if !norm.is_finite() {
                    return Err(self.failure("non-finite error estimate"));
                }
                // Standard controller for a 3rd-order pair.
                let factor = if norm == 0.0 {
                    5.0
                } else {
                    (0.9 * norm.powf(-1.0 / 3.0)).clamp(0.2, 5.0)
                };
                if norm > 1.0 {
                    rejected += 1;
                    self.rejected += 1;
                    if rejected > MAX_REJECTS {
                        return Err(self.failure("too many rejected steps"));
                    }
                    self.dt_proposed = dt * factor;
                    continue;
                }
                // A step shortened to hit a stop says little about growth.
                if !lands || factor < 1.0 {
                    self.dt_proposed = dt * factor;
                }
            }

            if let Err(e) = ensure_all_finite(&self.trial, "state") {
                return Err(self.failure(e.to_string()));
            }
            std::mem::swap(&mut self.x, &mut self.trial);
            self.t = if lands { stop } else { self.t + dt };
            self.last_dt = dt;
            self.steps += 1;

            let eps = time_eps(self.t);
            while self.tstops.first().is_some_and(|&s| s <= self.t + eps) {
                self.tstops.remove(0);
            }
            return Ok(StepInfo {
                t: self.t,
                dt,
                rejected,
            });
        }
    }

    fn failure(&self, message: impl Into<String>) -> SimError {
        SimError::Integration {
            t: self.t,
            message: message.into(),
        }
    }
}
