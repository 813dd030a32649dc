use tracing::{debug, info};

use crate::config::RetargetConfig;
use crate::cost::{ContinuityState, CostWeights, DualArmObjective};
use crate::kinematics::{ArmKinematics, DualArmModel};
use crate::multi_body::ArmChain;
use crate::optimizer::{BoundedMinimizer, ProjectedBfgs};
use crate::pose::{FrameTarget, JointVector, Side, JOINT_DIM};
use crate::solver::{FrameSolveResult, FrameSolver};
use crate::store::{JointTrajectory, MotionTrajectory};

/// Retargets a motion frame by frame, each frame warm-started from the
/// previous solution.
pub struct RetargetSession<'m, K = ArmChain, M = ProjectedBfgs> {
    model: &'m DualArmModel<K>,
    solver: FrameSolver<M>,
    weights: CostWeights,
    initial_guess: JointVector,
    continuity: ContinuityState,
    results: Vec<FrameSolveResult>,
}

impl<'m, K: ArmKinematics> RetargetSession<'m, K, ProjectedBfgs> {
    pub fn new(model: &'m DualArmModel<K>, config: &RetargetConfig) -> Self {
        Self::with_solver(model, config, FrameSolver::from_config(&config.solver))
    }
}

impl<'m, K: ArmKinematics, M: BoundedMinimizer<JOINT_DIM>> RetargetSession<'m, K, M> {
    pub fn with_solver(model: &'m DualArmModel<K>, config: &RetargetConfig, solver: FrameSolver<M>) -> Self {
        Self {
            model,
            solver,
            weights: config.weights,
            initial_guess: config.initial_guess,
            continuity: ContinuityState::first_frame(),
            results: Vec::new(),
        }
    }

    /// Solves the next frame and makes its solution the baseline of the one
    /// after.
    pub fn step(&mut self, target: &FrameTarget) -> FrameSolveResult {
        let start = *self.continuity.previous().unwrap_or(&self.initial_guess);
        let objective = DualArmObjective::new(self.model, target, &self.continuity, &self.weights);
        let result = self.solver.solve(&objective, &start);

        info!(
            frame = self.results.len(),
            evaluations = result.evaluations,
            cost = result.cost,
            "{}",
            result.termination
        );
        if tracing::enabled!(tracing::Level::DEBUG) {
            for side in Side::BOTH {
                if let Ok(terms) = objective.arm_terms(&result.joints, side) {
                    debug!(%side, ?terms, "cost breakdown");
                }
            }
        }

        self.continuity.accept(result.joints);
        self.results.push(result.clone());
        result
    }

    /// Solves every frame of `motion` in order.
    pub fn run(&mut self, motion: &MotionTrajectory) -> JointTrajectory {
        let total = motion.len();
        let mut trajectory = JointTrajectory::default();
        for (k, frame) in motion.frames.iter().enumerate() {
            info!("frame {}/{}", k + 1, total);
            let joints = self.step(frame).joints;
            trajectory.joints.push(joints);
            trajectory.timestamps.push(frame.timestamp);
        }
        trajectory
    }

    pub fn continuity(&self) -> &ContinuityState {
        &self.continuity
    }

    pub fn results(&self) -> &[FrameSolveResult] {
        &self.results
    }
}
