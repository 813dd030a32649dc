use std::time::Instant;

use nalgebra::{DMatrix, DVector};
use tracing::{trace, warn};

use super::{BoundedMinimizer, Bounds, Minimum, Objective, StopCriteria, Termination};

/// Projected BFGS with a backtracking (Armijo) line search.
///
/// Variables held at a bound by the gradient are frozen for the step, the
/// inverse-Hessian estimate drives the free ones, and every trial point is
/// projected back into the bounds. Each trial is evaluated together with its
/// gradient, so an accepted point costs a single evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedBfgs {
    /// Largest coordinate change of a step taken without curvature
    /// information, i.e. the first step and every step after a reset.
    pub initial_step: f64,
    pub min_step: f64,
    pub shrink: f64,
    pub sufficient_decrease: f64,
    /// Projected gradient norm below which the point counts as stationary.
    pub gradient_tolerance: f64,
}

impl Default for ProjectedBfgs {
    fn default() -> Self {
        Self {
            initial_step: 0.1,
            min_step: 1e-12,
            shrink: 0.5,
            sufficient_decrease: 1e-4,
            gradient_tolerance: 1e-10,
        }
    }
}

fn dot<const N: usize>(a: &[f64; N], b: &[f64; N]) -> f64 {
    a.iter().zip(b).map(|(a, b)| a * b).sum()
}

fn projected_gradient_norm<const N: usize>(bounds: &Bounds<N>, x: &[f64; N], grad: &[f64; N]) -> f64 {
    let moved = bounds.clamp(&core::array::from_fn(|i| x[i] - grad[i]));
    x.iter().zip(&moved).map(|(x, m)| (x - m).powi(2)).sum::<f64>().sqrt()
}

/// Inverse-Hessian estimate, reset to the identity when it stops producing
/// descent directions.
struct InverseHessian {
    h: DMatrix<f64>,
    fresh: bool,
}

impl InverseHessian {
    fn new(n: usize) -> Self {
        Self {
            h: DMatrix::identity(n, n),
            fresh: true,
        }
    }

    fn reset(&mut self) {
        self.h.fill_with_identity();
        self.fresh = true;
    }

    /// `-H g` restricted to the free variables.
    fn direction<const N: usize>(&self, grad: &[f64; N], free: &[bool; N]) -> [f64; N] {
        let masked = DVector::from_fn(N, |i, _| if free[i] { grad[i] } else { 0.0 });
        let hg = &self.h * masked;
        core::array::from_fn(|i| if free[i] { -hg[i] } else { 0.0 })
    }

    fn update<const N: usize>(&mut self, s: &[f64; N], y: &[f64; N]) {
        let s = DVector::from_column_slice(s);
        let y = DVector::from_column_slice(y);
        let sy = s.dot(&y);
        // skip updates that would lose positive definiteness
        if sy <= 1e-12 * s.norm() * y.norm() {
            return;
        }
        if self.fresh {
            self.h.fill_with_identity();
            self.h *= sy / y.norm_squared();
            self.fresh = false;
        }
        let rho = 1.0 / sy;
        let hy = &self.h * &y;
        let yhy = y.dot(&hy);
        self.h -= (&hy * s.transpose() + &s * hy.transpose()) * rho;
        self.h += &s * s.transpose() * (rho * rho * yhy + rho);
    }
}

impl<const N: usize> BoundedMinimizer<N> for ProjectedBfgs {
    fn minimize<O: Objective<N>>(
        &self,
        objective: &mut O,
        bounds: &Bounds<N>,
        initial: &[f64; N],
        stop: &StopCriteria,
    ) -> Minimum<N> {
        let started = Instant::now();
        let mut evaluations = 1;
        let mut x = bounds.clamp(initial);
        let mut grad = [0.; N];
        let mut value = match objective.evaluate(&x, Some(&mut grad)) {
            Ok(value) => value,
            Err(err) => {
                warn!(%err, "initial point rejected");
                return Minimum {
                    x,
                    value: f64::INFINITY,
                    termination: Termination::EvaluationRejected,
                    evaluations,
                };
            }
        };
        let mut hessian = InverseHessian::new(N);

        let termination = loop {
            if value <= stop.stopval {
                break Termination::StopValueReached;
            }
            if evaluations >= stop.max_evals {
                break Termination::MaxEvalReached;
            }
            if stop.max_time.is_some_and(|limit| started.elapsed() >= limit) {
                break Termination::MaxTimeReached;
            }
            if projected_gradient_norm(bounds, &x, &grad) <= self.gradient_tolerance {
                break Termination::Success;
            }

            // variables pushed against their bound stay there this step
            let free: [bool; N] = core::array::from_fn(|i| {
                !((x[i] <= bounds.lower[i] && grad[i] > 0.0) || (x[i] >= bounds.upper[i] && grad[i] < 0.0))
            });
            let mut direction = hessian.direction(&grad, &free);
            if dot(&direction, &grad) >= 0.0 {
                trace!("inverse hessian reset");
                hessian.reset();
                direction = core::array::from_fn(|i| if free[i] { -grad[i] } else { 0.0 });
            }

            let mut step = 1.0;
            if hessian.fresh {
                let longest = direction.iter().fold(0.0_f64, |m, d| m.max(d.abs()));
                if longest > 0.0 {
                    step = (self.initial_step / longest).min(1.0);
                }
            }

            let mut accepted = None;
            while step >= self.min_step && evaluations < stop.max_evals {
                let trial = bounds.clamp(&core::array::from_fn(|i| x[i] + step * direction[i]));
                let slope: f64 = grad.iter().zip(trial.iter().zip(&x)).map(|(g, (t, x))| g * (t - x)).sum();
                if slope >= 0.0 {
                    break;
                }
                evaluations += 1;
                let mut trial_grad = [0.; N];
                match objective.evaluate(&trial, Some(&mut trial_grad)) {
                    Ok(trial_value) if trial_value <= value + self.sufficient_decrease * slope => {
                        accepted = Some((trial, trial_value, trial_grad));
                        break;
                    }
                    Ok(trial_value) => trace!(step, trial_value, "insufficient decrease"),
                    Err(err) => warn!(step, %err, "trial point rejected"),
                }
                step *= self.shrink;
            }

            let Some((trial, trial_value, trial_grad)) = accepted else {
                break if evaluations >= stop.max_evals {
                    Termination::MaxEvalReached
                } else {
                    Termination::XtolReached
                };
            };

            let s: [f64; N] = core::array::from_fn(|i| trial[i] - x[i]);
            let y: [f64; N] = core::array::from_fn(|i| trial_grad[i] - grad[i]);
            hessian.update(&s, &y);

            let previous_value = value;
            let previous_x = x;
            x = trial;
            value = trial_value;
            grad = trial_grad;

            if value <= stop.stopval {
                break Termination::StopValueReached;
            }
            if (previous_value - value).abs() <= stop.ftol_rel * value.abs() {
                break Termination::FtolReached;
            }
            if x.iter().zip(&previous_x).all(|(x, p)| (x - p).abs() <= stop.xtol_rel * x.abs()) {
                break Termination::XtolReached;
            }
        };

        Minimum {
            x,
            value,
            termination,
            evaluations,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::time::Duration;

    /// sum (x_i - c_i)^2 with an analytic gradient
    struct Bowl<const N: usize> {
        center: [f64; N],
        calls: usize,
        points: Vec<[f64; N]>,
    }

    impl<const N: usize> Objective<N> for Bowl<N> {
        type Error = String;

        fn evaluate(&mut self, x: &[f64; N], grad: Option<&mut [f64; N]>) -> Result<f64, String> {
            self.calls += 1;
            self.points.push(*x);
            if let Some(grad) = grad {
                for i in 0..N {
                    grad[i] = 2. * (x[i] - self.center[i]);
                }
            }
            Ok(x.iter().zip(&self.center).map(|(x, c)| (x - c).powi(2)).sum())
        }
    }

    fn bowl<const N: usize>(center: [f64; N]) -> Bowl<N> {
        Bowl {
            center,
            calls: 0,
            points: vec![],
        }
    }

    /// Curved valley, minimum 0 at (1, 1).
    struct Rosenbrock;

    impl Objective<2> for Rosenbrock {
        type Error = String;

        fn evaluate(&mut self, x: &[f64; 2], grad: Option<&mut [f64; 2]>) -> Result<f64, String> {
            let [a, b] = *x;
            if let Some(grad) = grad {
                grad[0] = -2. * (1. - a) - 400. * a * (b - a * a);
                grad[1] = 200. * (b - a * a);
            }
            Ok((1. - a).powi(2) + 100. * (b - a * a).powi(2))
        }
    }

    fn stop() -> StopCriteria {
        StopCriteria {
            stopval: 1e-12,
            ftol_rel: 1e-14,
            xtol_rel: 1e-10,
            max_evals: 500,
            max_time: None,
        }
    }

    #[test]
    fn test_unconstrained_minimum() {
        let mut objective = bowl([0.3, -0.2, 0.1]);
        let bounds = Bounds::new([-1.; 3], [1.; 3]);
        let res = ProjectedBfgs::default().minimize(&mut objective, &bounds, &[0.9, 0.9, -0.9], &stop());
        assert_abs_diff_eq!(res.x[0], 0.3, epsilon = 1e-5);
        assert_abs_diff_eq!(res.x[1], -0.2, epsilon = 1e-5);
        assert_abs_diff_eq!(res.x[2], 0.1, epsilon = 1e-5);
        assert!(res.value <= 1e-10);
        assert_eq!(res.evaluations, objective.calls);
    }

    #[test]
    fn test_curved_valley() {
        let bounds = Bounds::new([-2.; 2], [2.; 2]);
        let res = ProjectedBfgs::default().minimize(&mut Rosenbrock, &bounds, &[-1.2, 1.0], &stop());
        assert_abs_diff_eq!(res.x[0], 1.0, epsilon = 1e-4);
        assert_abs_diff_eq!(res.x[1], 1.0, epsilon = 1e-4);
        assert!(res.evaluations < 200);
    }

    #[test]
    fn test_accepted_points_are_evaluated_once() {
        let mut objective = bowl([0.3, -0.2, 0.1, 0.4]);
        let bounds = Bounds::new([-1.; 4], [1.; 4]);
        let stop = StopCriteria {
            stopval: f64::NEG_INFINITY,
            ftol_rel: 0.0,
            xtol_rel: 0.0,
            max_evals: 40,
            max_time: None,
        };
        let res = ProjectedBfgs::default().minimize(&mut objective, &bounds, &[-1.; 4], &stop);
        assert_eq!(res.evaluations, objective.calls);
        for pair in objective.points.windows(2) {
            assert_ne!(pair[0], pair[1]);
        }
        // one clamped first step, then the curvature estimate lands on the center
        assert!(res.value <= 1e-20);
        assert!(res.evaluations <= 4);
    }

    #[test]
    fn test_minimum_outside_bounds() {
        let mut objective = bowl([2.0, -3.0]);
        let bounds = Bounds::new([-1.0, -1.57], [1.0, 1.57]);
        let res = ProjectedBfgs::default().minimize(&mut objective, &bounds, &[0., 0.], &stop());
        assert!(bounds.contains(&res.x));
        assert_eq!(res.termination, Termination::Success);
        assert_abs_diff_eq!(res.x[0], 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(res.x[1], -1.57, epsilon = 1e-9);
        assert_abs_diff_eq!(res.value, 1.0 + 1.43 * 1.43, epsilon = 1e-9);
    }

    #[test]
    fn test_initial_guess_is_clamped() {
        let mut objective = bowl([0.]);
        let bounds = Bounds::new([-1.], [1.]);
        let stop = StopCriteria {
            max_evals: 1,
            ..stop()
        };
        let res = ProjectedBfgs::default().minimize(&mut objective, &bounds, &[5.], &stop);
        assert_eq!(res.x, [1.]);
        assert_eq!(res.termination, Termination::MaxEvalReached);
        assert_eq!(res.evaluations, 1);
    }

    #[test]
    fn test_stopval_at_start() {
        let mut objective = bowl([0.5, 0.5]);
        let bounds = Bounds::new([-1.; 2], [1.; 2]);
        let res = ProjectedBfgs::default().minimize(&mut objective, &bounds, &[0.5, 0.5], &stop());
        assert_eq!(res.termination, Termination::StopValueReached);
        assert_eq!(res.x, [0.5, 0.5]);
        assert_eq!(res.evaluations, 1);
    }

    #[test]
    fn test_evaluation_budget() {
        let mut objective = bowl([0.3; 4]);
        let bounds = Bounds::new([-1.; 4], [1.; 4]);
        let stop = StopCriteria {
            max_evals: 2,
            ..stop()
        };
        let res = ProjectedBfgs::default().minimize(&mut objective, &bounds, &[-1.; 4], &stop);
        assert_eq!(res.termination, Termination::MaxEvalReached);
        assert_eq!(res.evaluations, 2);
        assert_eq!(res.evaluations, objective.calls);
        // never worse than the start
        assert!(res.value <= 4. * 1.3 * 1.3);
    }

    #[test]
    fn test_time_budget() {
        let mut objective = bowl([0.3; 2]);
        let bounds = Bounds::new([-1.; 2], [1.; 2]);
        let stop = StopCriteria {
            max_time: Some(Duration::ZERO),
            ..stop()
        };
        let res = ProjectedBfgs::default().minimize(&mut objective, &bounds, &[-1.; 2], &stop);
        assert_eq!(res.termination, Termination::MaxTimeReached);
    }

    #[test]
    fn test_ftol() {
        let mut objective = bowl([0.3; 2]);
        let bounds = Bounds::new([-1.; 2], [1.; 2]);
        let stop = StopCriteria {
            stopval: f64::NEG_INFINITY,
            // the first step moves 0.1 and changes the value by less than itself
            ftol_rel: 1.0,
            xtol_rel: 0.0,
            max_evals: 500,
            max_time: None,
        };
        let res = ProjectedBfgs::default().minimize(&mut objective, &bounds, &[-1.; 2], &stop);
        assert_eq!(res.termination, Termination::FtolReached);
        assert_eq!(res.evaluations, 2);
    }

    /// Bowl that cannot be evaluated for x[0] > limit.
    struct Walled {
        inner: Bowl<1>,
        limit: f64,
    }

    impl Objective<1> for Walled {
        type Error = String;

        fn evaluate(&mut self, x: &[f64; 1], grad: Option<&mut [f64; 1]>) -> Result<f64, String> {
            if x[0] > self.limit {
                self.inner.calls += 1;
                return Err(format!("x = {} is past the wall", x[0]));
            }
            self.inner.evaluate(x, grad)
        }
    }

    #[test]
    fn test_rejected_trials_are_not_minima() {
        let mut objective = Walled {
            inner: bowl([1.0]),
            limit: 0.8,
        };
        let bounds = Bounds::new([-1.], [2.]);
        let res = ProjectedBfgs::default().minimize(&mut objective, &bounds, &[0.], &stop());
        assert!(res.x[0] <= 0.8);
        assert!(res.value.is_finite());
        assert!(res.value >= 0.2 * 0.2 - 1e-12);
        assert_eq!(res.evaluations, objective.inner.calls);
    }

    #[test]
    fn test_rejected_start() {
        let mut objective = Walled {
            inner: bowl([0.0]),
            limit: 0.0,
        };
        let bounds = Bounds::new([-1.], [2.]);
        let res = ProjectedBfgs::default().minimize(&mut objective, &bounds, &[1.], &stop());
        assert_eq!(res.termination, Termination::EvaluationRejected);
        assert_eq!(res.value, f64::INFINITY);
        assert_eq!(res.x, [1.]);
    }
}
