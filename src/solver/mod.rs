use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cost::{DualArmObjective, DEFAULT_STEP};
use crate::kinematics::{ArmJoints, ArmKinematics, KinematicsError};
use crate::optimizer::{BoundedMinimizer, Bounds, Objective, ProjectedBfgs, StopCriteria, Termination};
use crate::pose::{join_arms, JointVector, JOINT_DIM};

/// Joint limits of one arm. The first three joints move the upper arm, the
/// last three the wrist.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArmBounds {
    pub lower: ArmJoints,
    pub upper: ArmJoints,
}

impl Default for ArmBounds {
    fn default() -> Self {
        Self {
            lower: [-1.0, -1.0, -1.0, -1.57, -1.57, -1.57],
            upper: [1.0, 1.0, 1.0, 1.57, 1.57, 1.57],
        }
    }
}

/// Run-wide optimizer settings, shared by every frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub left_bounds: ArmBounds,
    pub right_bounds: ArmBounds,
    pub stopval: f64,
    pub ftol_rel: f64,
    pub xtol_rel: f64,
    pub max_evals: usize,
    pub max_time_secs: Option<f64>,
    pub gradient_step: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            left_bounds: ArmBounds::default(),
            right_bounds: ArmBounds::default(),
            stopval: 1e-6,
            ftol_rel: 1e-8,
            xtol_rel: 1e-6,
            max_evals: 200,
            max_time_secs: None,
            gradient_step: DEFAULT_STEP,
        }
    }
}

impl SolverConfig {
    pub fn bounds(&self) -> Bounds<JOINT_DIM> {
        Bounds::new(
            join_arms(&self.left_bounds.lower, &self.right_bounds.lower),
            join_arms(&self.left_bounds.upper, &self.right_bounds.upper),
        )
    }

    pub fn stop_criteria(&self) -> StopCriteria {
        StopCriteria {
            stopval: self.stopval,
            ftol_rel: self.ftol_rel,
            xtol_rel: self.xtol_rel,
            max_evals: self.max_evals,
            max_time: self
                .max_time_secs
                .filter(|secs| secs.is_finite() && *secs >= 0.0)
                .map(Duration::from_secs_f64),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrameSolveResult {
    pub joints: JointVector,
    pub cost: f64,
    pub termination: Termination,
    pub evaluations: usize,
}

/// Hands the two-arm cost and its numeric gradient to the minimizer.
struct FrameObjective<'o, 'a, K> {
    cost: &'o DualArmObjective<'a, K>,
    step: f64,
}

impl<K: ArmKinematics> Objective<JOINT_DIM> for FrameObjective<'_, '_, K> {
    type Error = KinematicsError;

    fn evaluate(
        &mut self,
        x: &JointVector,
        grad: Option<&mut JointVector>,
    ) -> Result<f64, KinematicsError> {
        let value = self.cost.cost(x)?;
        if let Some(grad) = grad {
            *grad = self.cost.gradient(x, self.step)?;
        }
        Ok(value)
    }
}

pub struct FrameSolver<M = ProjectedBfgs> {
    minimizer: M,
    bounds: Bounds<JOINT_DIM>,
    stop: StopCriteria,
    gradient_step: f64,
}

impl FrameSolver<ProjectedBfgs> {
    pub fn from_config(config: &SolverConfig) -> Self {
        Self::new(config, ProjectedBfgs::default())
    }
}

impl<M: BoundedMinimizer<JOINT_DIM>> FrameSolver<M> {
    pub fn new(config: &SolverConfig, minimizer: M) -> Self {
        Self {
            minimizer,
            bounds: config.bounds(),
            stop: config.stop_criteria(),
            gradient_step: config.gradient_step,
        }
    }

    pub fn bounds(&self) -> &Bounds<JOINT_DIM> {
        &self.bounds
    }

    /// Minimizes one frame's cost starting from `initial`. Whatever the
    /// minimizer returns is the frame's solution.
    pub fn solve<K: ArmKinematics>(
        &self,
        cost: &DualArmObjective<'_, K>,
        initial: &JointVector,
    ) -> FrameSolveResult {
        let mut objective = FrameObjective {
            cost,
            step: self.gradient_step,
        };
        let minimum = self
            .minimizer
            .minimize(&mut objective, &self.bounds, initial, &self.stop);
        debug!(
            termination = ?minimum.termination,
            evaluations = minimum.evaluations,
            cost = minimum.value,
            "frame solved"
        );
        FrameSolveResult {
            joints: minimum.x,
            cost: minimum.value,
            termination: minimum.termination,
            evaluations: minimum.evaluations,
        }
    }
}
