use nalgebra::Vector3;
use tracing::{debug, warn};

use super::{ArmKinematics, Segment, ARM_DOF};
use crate::config::RetargetConfig;
use crate::multi_body::{ArmChain, ModelError, MultiBody};
use crate::pose::Side;

/// Both arms of the robot. Built once per run and shared by every frame.
#[derive(Debug, Clone)]
pub struct DualArmModel<K = ArmChain> {
    pub left: K,
    pub right: K,
}

impl<K> DualArmModel<K> {
    pub fn new(left: K, right: K) -> Self {
        Self { left, right }
    }

    pub fn arm(&self, side: Side) -> &K {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }
}

impl DualArmModel<ArmChain> {
    pub fn from_config(multi_body: &MultiBody, config: &RetargetConfig) -> Result<Self, ModelError> {
        let model = Self::new(
            multi_body.arm_chain(config.links(Side::Left))?,
            multi_body.arm_chain(config.links(Side::Right))?,
        );
        for side in Side::BOTH {
            model.check_shoulder(side, &config.robot_shoulder(side));
        }
        Ok(model)
    }
}

impl<K: ArmKinematics> DualArmModel<K> {
    /// Compares the arm's shoulder against the configured robot constant.
    /// A mismatch only means the targets and the model disagree on where the
    /// shoulder sits, so it is reported and the run goes on.
    pub fn check_shoulder(&self, side: Side, expected: &Vector3<f64>) -> bool {
        let shoulder = match self.arm(side).segment_pose(&[0.; ARM_DOF], Segment::Shoulder) {
            Ok(pose) => pose.translation.vector,
            Err(err) => {
                warn!(%side, %err, "cannot evaluate robot shoulder");
                return false;
            }
        };
        let matches = approx::relative_eq!(shoulder, *expected, epsilon = 1e-6);
        if matches {
            debug!(%side, ?shoulder, "robot shoulder matches model");
        } else {
            warn!(%side, ?shoulder, ?expected, "robot shoulder constant differs from model");
        }
        matches
    }
}

#[cfg(test)]
pub(crate) fn test_model() -> DualArmModel {
    let multi_body = MultiBody::from_urdf_str(crate::multi_body::DUAL_ARM_URDF).unwrap();
    DualArmModel::from_config(&multi_body, &RetargetConfig::default()).unwrap()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_default_shoulders_match_model() {
        let model = test_model();
        let config = RetargetConfig::default();
        for side in Side::BOTH {
            assert!(model.check_shoulder(side, &config.robot_shoulder(side)));
        }
    }

    #[test]
    fn test_shoulder_mismatch() {
        let model = test_model();
        assert!(!model.check_shoulder(Side::Left, &Vector3::new(0., 0., 0.)));
        // each side sees its own chain
        let left = RetargetConfig::default().robot_shoulder(Side::Left);
        assert!(!model.check_shoulder(Side::Right, &left));
    }
}
