//! Box-constrained minimization.
//!
//! The frame solver only needs a minimizer that takes an objective with a
//! gradient, per-variable bounds, an initial guess and a set of stopping
//! rules, and hands back the best point together with the reason it stopped.

mod quasi_newton;

use std::fmt;
use std::time::Duration;

pub use quasi_newton::ProjectedBfgs;

/// Objective callback. `grad` is `Some` when the minimizer also needs the
/// gradient at `x`; every call counts as one evaluation.
pub trait Objective<const N: usize> {
    type Error: fmt::Display;

    fn evaluate(&mut self, x: &[f64; N], grad: Option<&mut [f64; N]>) -> Result<f64, Self::Error>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bounds<const N: usize> {
    pub lower: [f64; N],
    pub upper: [f64; N],
}

impl<const N: usize> Bounds<N> {
    pub fn new(lower: [f64; N], upper: [f64; N]) -> Self {
        Self { lower, upper }
    }

    pub fn clamp(&self, x: &[f64; N]) -> [f64; N] {
        core::array::from_fn(|i| x[i].max(self.lower[i]).min(self.upper[i]))
    }

    pub fn contains(&self, x: &[f64; N]) -> bool {
        x.iter()
            .zip(self.lower.iter().zip(self.upper.iter()))
            .all(|(x, (lo, hi))| lo <= x && x <= hi)
    }
}

/// Stopping rules, checked after every accepted step.
#[derive(Debug, Clone, PartialEq)]
pub struct StopCriteria {
    /// Stop as soon as the objective reaches this value.
    pub stopval: f64,
    /// Relative change of the objective between accepted points.
    pub ftol_rel: f64,
    /// Relative change of every coordinate between accepted points.
    pub xtol_rel: f64,
    pub max_evals: usize,
    pub max_time: Option<Duration>,
}

impl Default for StopCriteria {
    fn default() -> Self {
        Self {
            stopval: f64::NEG_INFINITY,
            ftol_rel: 0.0,
            xtol_rel: 0.0,
            max_evals: 1000,
            max_time: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Termination {
    Success,
    StopValueReached,
    FtolReached,
    XtolReached,
    MaxEvalReached,
    MaxTimeReached,
    /// The objective could not be evaluated where it had to be.
    EvaluationRejected,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Termination::Success => "optimization finished successfully",
            Termination::StopValueReached => "optimization terminated due to stop value reached",
            Termination::FtolReached => "optimization terminated due to function tolerance reached",
            Termination::XtolReached => "optimization terminated due to parameter tolerance reached",
            Termination::MaxEvalReached => "optimization terminated due to evaluation budget exhausted",
            Termination::MaxTimeReached => "optimization terminated due to time budget exhausted",
            Termination::EvaluationRejected => "optimization stopped on a rejected evaluation",
        };
        f.write_str(msg)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Minimum<const N: usize> {
    pub x: [f64; N],
    pub value: f64,
    pub termination: Termination,
    pub evaluations: usize,
}

pub trait BoundedMinimizer<const N: usize> {
    fn minimize<O: Objective<N>>(
        &self,
        objective: &mut O,
        bounds: &Bounds<N>,
        initial: &[f64; N],
        stop: &StopCriteria,
    ) -> Minimum<N>;
}
