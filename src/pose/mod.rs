use std::fmt;

use nalgebra::{Matrix3, Vector3};

use crate::kinematics::{ArmJoints, ArmPose, ARM_DOF};

/// Decision variables of one frame: both arms, left arm block first.
pub const JOINT_DIM: usize = 2 * ARM_DOF;

pub type JointVector = [f64; JOINT_DIM];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Left, Side::Right];

    /// Offset of this arm's block in a [`JointVector`].
    pub fn offset(self) -> usize {
        match self {
            Side::Left => 0,
            Side::Right => ARM_DOF,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }

    /// Dataset name prefix in the motion store.
    pub fn prefix(self) -> &'static str {
        match self {
            Side::Left => "l",
            Side::Right => "r",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub fn arm_block(joints: &JointVector, side: Side) -> ArmJoints {
    let mut block = [0.; ARM_DOF];
    block.copy_from_slice(&joints[side.offset()..side.offset() + ARM_DOF]);
    block
}

pub fn join_arms(left: &ArmJoints, right: &ArmJoints) -> JointVector {
    let mut joints = [0.; JOINT_DIM];
    joints[..ARM_DOF].copy_from_slice(left);
    joints[ARM_DOF..].copy_from_slice(right);
    joints
}

/// Human arm pose one arm should reproduce.
///
/// `wrist_orientation` is expected to be a rotation matrix; upstream data is
/// trusted on that.
#[derive(Debug, Clone, PartialEq)]
pub struct ArmPoseTarget {
    pub shoulder: Vector3<f64>,
    pub elbow: Vector3<f64>,
    pub wrist: Vector3<f64>,
    pub wrist_orientation: Matrix3<f64>,
}

impl From<ArmPose> for ArmPoseTarget {
    fn from(pose: ArmPose) -> Self {
        Self {
            shoulder: pose.shoulder,
            elbow: pose.elbow,
            wrist: pose.wrist,
            wrist_orientation: pose.wrist_orientation,
        }
    }
}

/// Both arm targets of one recorded frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameTarget {
    pub left: ArmPoseTarget,
    pub right: ArmPoseTarget,
    pub timestamp: f64,
}

impl FrameTarget {
    pub fn arm(&self, side: Side) -> &ArmPoseTarget {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }
}
