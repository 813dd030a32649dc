mod dual_arm;

use nalgebra::{Isometry3, Matrix3, Vector3};
use thiserror::Error;

use crate::multi_body::ArmChain;

pub use dual_arm::DualArmModel;
#[cfg(test)]
pub(crate) use dual_arm::test_model;

/// Movable joints per arm.
pub const ARM_DOF: usize = 6;

pub type ArmJoints = [f64; ARM_DOF];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Segment {
    Shoulder,
    Elbow,
    Wrist,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum KinematicsError {
    #[error("joint {index} is not finite ({value})")]
    NonFiniteJoint { index: usize, value: f64 },
    #[error("{0:?} pose could not be resolved")]
    Unresolved(Segment),
}

/// Robot-side arm pose in the base frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ArmPose {
    pub shoulder: Vector3<f64>,
    pub elbow: Vector3<f64>,
    pub wrist: Vector3<f64>,
    pub wrist_orientation: Matrix3<f64>,
}

/// Forward kinematics of a single 6-joint arm.
pub trait ArmKinematics {
    fn segment_pose(
        &self,
        joints: &ArmJoints,
        segment: Segment,
    ) -> Result<Isometry3<f64>, KinematicsError>;

    fn arm_pose(&self, joints: &ArmJoints) -> Result<ArmPose, KinematicsError> {
        let elbow = self.segment_pose(joints, Segment::Elbow)?;
        let wrist = self.segment_pose(joints, Segment::Wrist)?;
        let shoulder = self.segment_pose(joints, Segment::Shoulder)?;
        Ok(ArmPose {
            shoulder: shoulder.translation.vector,
            elbow: elbow.translation.vector,
            wrist: wrist.translation.vector,
            wrist_orientation: wrist.rotation.to_rotation_matrix().into_inner(),
        })
    }
}

impl ArmChain {
    /// Pose of every chain segment up to and including `last`.
    fn walk(&self, joints: &ArmJoints, last: usize) -> Vec<Isometry3<f64>> {
        let mut pose = self.base_pose;
        self.segments
            .iter()
            .take(last + 1)
            .map(|segment| {
                pose *= segment.origin;
                if let Some(axis) = &segment.axis {
                    pose *= Isometry3::rotation(axis.direction.into_inner() * joints[axis.index]);
                }
                pose
            })
            .collect()
    }

    pub fn fk(&self, joints: &ArmJoints, segment: Segment) -> Result<Isometry3<f64>, KinematicsError> {
        check_joints(joints)?;
        let index = self.segment_index(segment);
        self.walk(joints, index)
            .get(index)
            .copied()
            .filter(is_finite)
            .ok_or(KinematicsError::Unresolved(segment))
    }
}

impl ArmKinematics for ArmChain {
    fn segment_pose(
        &self,
        joints: &ArmJoints,
        segment: Segment,
    ) -> Result<Isometry3<f64>, KinematicsError> {
        self.fk(joints, segment)
    }

    // one pass over the chain serves all three segments
    fn arm_pose(&self, joints: &ArmJoints) -> Result<ArmPose, KinematicsError> {
        check_joints(joints)?;
        let poses = self.walk(joints, self.wrist);
        let resolve = |segment: Segment| {
            poses
                .get(self.segment_index(segment))
                .copied()
                .filter(is_finite)
                .ok_or(KinematicsError::Unresolved(segment))
        };
        let elbow = resolve(Segment::Elbow)?;
        let wrist = resolve(Segment::Wrist)?;
        let shoulder = resolve(Segment::Shoulder)?;
        Ok(ArmPose {
            shoulder: shoulder.translation.vector,
            elbow: elbow.translation.vector,
            wrist: wrist.translation.vector,
            wrist_orientation: wrist.rotation.to_rotation_matrix().into_inner(),
        })
    }
}

fn check_joints(joints: &ArmJoints) -> Result<(), KinematicsError> {
    match joints.iter().position(|q| !q.is_finite()) {
        Some(index) => Err(KinematicsError::NonFiniteJoint {
            index,
            value: joints[index],
        }),
        None => Ok(()),
    }
}

fn is_finite(pose: &Isometry3<f64>) -> bool {
    pose.translation.vector.iter().all(|v| v.is_finite())
        && pose.rotation.coords.iter().all(|v| v.is_finite())
}
