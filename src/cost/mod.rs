mod gradient;

use nalgebra::{Matrix3, Vector3, Vector6};
use serde::{Deserialize, Serialize};

use crate::kinematics::{ArmJoints, ArmKinematics, DualArmModel, KinematicsError};
use crate::pose::{arm_block, ArmPoseTarget, FrameTarget, JointVector, Side};

pub use gradient::{central_difference, DEFAULT_STEP};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostWeights {
    pub upper_arm_direction: f64,
    pub forearm_direction: f64,
    pub wrist_orientation: f64,
    pub wrist_position: f64,
    pub elbow_position: f64,
    pub continuity: f64,
}

impl Default for CostWeights {
    fn default() -> Self {
        Self {
            upper_arm_direction: 2.0,
            forearm_direction: 2.0,
            wrist_orientation: 10.0,
            wrist_position: 5.0,
            elbow_position: 5.0,
            continuity: 5.0,
        }
    }
}

/// Weighted cost terms of one arm.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CostTerms {
    pub upper_arm_direction: f64,
    pub forearm_direction: f64,
    pub wrist_orientation: f64,
    pub wrist_position: f64,
    pub elbow_position: f64,
    pub continuity: f64,
}

impl CostTerms {
    pub fn total(&self) -> f64 {
        self.upper_arm_direction
            + self.forearm_direction
            + self.wrist_orientation
            + self.wrist_position
            + self.elbow_position
            + self.continuity
    }
}

/// Previous accepted solution, `None` until the first frame is solved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContinuityState {
    previous: Option<JointVector>,
}

impl ContinuityState {
    pub fn first_frame() -> Self {
        Self::default()
    }

    pub fn is_first_frame(&self) -> bool {
        self.previous.is_none()
    }

    pub fn previous(&self) -> Option<&JointVector> {
        self.previous.as_ref()
    }

    pub fn previous_arm(&self, side: Side) -> Option<ArmJoints> {
        self.previous.as_ref().map(|q| arm_block(q, side))
    }

    pub fn accept(&mut self, solution: JointVector) {
        self.previous = Some(solution);
    }
}

/// Unit vector from `from` to `to`; zero when the points coincide.
fn direction(from: &Vector3<f64>, to: &Vector3<f64>) -> Vector3<f64> {
    (to - from).try_normalize(0.0).unwrap_or_else(Vector3::zeros)
}

/// Geodesic angle between two rotations, in radians.
pub fn rotation_angle(a: &Matrix3<f64>, b: &Matrix3<f64>) -> f64 {
    // rounding can push the cosine just outside [-1, 1]
    let cos = (((a * b.transpose()).trace() - 1.0) / 2.0).clamp(-1.0, 1.0);
    cos.acos().abs()
}

pub fn arm_cost_terms<K: ArmKinematics + ?Sized>(
    kinematics: &K,
    joints: &ArmJoints,
    target: &ArmPoseTarget,
    previous: Option<&ArmJoints>,
    weights: &CostWeights,
) -> Result<CostTerms, KinematicsError> {
    let robot = kinematics.arm_pose(joints)?;

    let upper_arm_human = direction(&target.shoulder, &target.elbow);
    let forearm_human = direction(&target.elbow, &target.wrist);
    let upper_arm_robot = direction(&robot.shoulder, &robot.elbow);
    let forearm_robot = direction(&robot.elbow, &robot.wrist);

    let continuity = match previous {
        Some(previous) => {
            weights.continuity * (Vector6::from(*joints) - Vector6::from(*previous)).norm()
        }
        None => 0.0,
    };

    Ok(CostTerms {
        upper_arm_direction: weights.upper_arm_direction
            * (upper_arm_human - upper_arm_robot).norm(),
        forearm_direction: weights.forearm_direction * (forearm_human - forearm_robot).norm(),
        wrist_orientation: weights.wrist_orientation
            * rotation_angle(&target.wrist_orientation, &robot.wrist_orientation),
        wrist_position: weights.wrist_position * (target.wrist - robot.wrist).norm(),
        elbow_position: weights.elbow_position * (target.elbow - robot.elbow).norm(),
        continuity,
    })
}

/// Mismatch between one arm's pose at `joints` and the human target, plus
/// the continuity penalty against `previous` when there is one.
pub fn arm_cost<K: ArmKinematics + ?Sized>(
    kinematics: &K,
    joints: &ArmJoints,
    target: &ArmPoseTarget,
    previous: Option<&ArmJoints>,
    weights: &CostWeights,
) -> Result<f64, KinematicsError> {
    arm_cost_terms(kinematics, joints, target, previous, weights).map(|terms| terms.total())
}

/// Two-arm objective of one frame over the shared 12-joint decision vector.
#[derive(Debug, Clone, Copy)]
pub struct DualArmObjective<'a, K> {
    model: &'a DualArmModel<K>,
    target: &'a FrameTarget,
    continuity: &'a ContinuityState,
    weights: &'a CostWeights,
}

impl<'a, K: ArmKinematics> DualArmObjective<'a, K> {
    pub fn new(
        model: &'a DualArmModel<K>,
        target: &'a FrameTarget,
        continuity: &'a ContinuityState,
        weights: &'a CostWeights,
    ) -> Self {
        Self {
            model,
            target,
            continuity,
            weights,
        }
    }

    pub fn arm_terms(&self, joints: &JointVector, side: Side) -> Result<CostTerms, KinematicsError> {
        let previous = self.continuity.previous_arm(side);
        arm_cost_terms(
            self.model.arm(side),
            &arm_block(joints, side),
            self.target.arm(side),
            previous.as_ref(),
            self.weights,
        )
    }

    /// Sum of the left and right arm costs.
    pub fn cost(&self, joints: &JointVector) -> Result<f64, KinematicsError> {
        Side::BOTH
            .iter()
            .map(|side| self.arm_terms(joints, *side).map(|terms| terms.total()))
            .sum()
    }

    /// Central-difference gradient of [`Self::cost`].
    pub fn gradient(&self, joints: &JointVector, step: f64) -> Result<JointVector, KinematicsError> {
        central_difference(|q| self.cost(q), joints, step)
    }
}
