use nalgebra::{Matrix3, Vector3};

use super::{MotionStore, StoreError, StoreFailure};
use crate::pose::{ArmPoseTarget, FrameTarget, JointVector, Side, JOINT_DIM};

const TIME: &str = "time";
const JOINT_TRAJECTORY: &str = "arm_traj_1";
const JOINT_TIMESTAMPS: &str = "timestamp_1";

fn arm_dataset(side: Side, part: &str) -> String {
    format!("{}_{part}", side.prefix())
}

fn check_rows(group: &str, name: &str, expected: usize, found: usize) -> Result<(), StoreError> {
    if expected == found {
        Ok(())
    } else {
        Err(StoreError::new(
            format!("{group}/{name}"),
            StoreFailure::RowCount { expected, found },
        ))
    }
}

/// Recorded human motion, one target per frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MotionTrajectory {
    pub frames: Vec<FrameTarget>,
}

impl MotionTrajectory {
    pub fn new(frames: Vec<FrameTarget>) -> Self {
        Self { frames }
    }

    /// Reads every frame of `motion`. All datasets must agree on the frame
    /// count, which the `time` dataset defines.
    pub fn from_store(store: &MotionStore, motion: &str) -> Result<Self, StoreError> {
        let time = store.matrix::<1>(motion, TIME)?;
        let frames = time.len();

        let read_arm = |side: Side| -> Result<Vec<ArmPoseTarget>, StoreError> {
            let positions = |part: &str| -> Result<Vec<[f64; 3]>, StoreError> {
                let name = arm_dataset(side, part);
                let rows = store.matrix::<3>(motion, &name)?;
                check_rows(motion, &name, frames, rows.len())?;
                Ok(rows)
            };
            let shoulder = positions("shoulder_pos")?;
            let elbow = positions("elbow_pos")?;
            let wrist = positions("wrist_pos")?;
            let name = arm_dataset(side, "wrist_ori");
            let orientation = store.matrix::<9>(motion, &name)?;
            check_rows(motion, &name, frames, orientation.len())?;

            Ok((0..frames)
                .map(|i| ArmPoseTarget {
                    shoulder: Vector3::from(shoulder[i]),
                    elbow: Vector3::from(elbow[i]),
                    wrist: Vector3::from(wrist[i]),
                    wrist_orientation: Matrix3::from_row_slice(&orientation[i]),
                })
                .collect())
        };
        let left = read_arm(Side::Left)?;
        let right = read_arm(Side::Right)?;

        let frames = left
            .into_iter()
            .zip(right)
            .zip(time)
            .map(|((left, right), [timestamp])| FrameTarget {
                left,
                right,
                timestamp,
            })
            .collect();
        Ok(Self { frames })
    }

    /// Writes the frames under `motion` in the layout [`Self::from_store`]
    /// reads.
    pub fn write_to(&self, store: &mut MotionStore, motion: &str) {
        for side in Side::BOTH {
            let rows = |part: fn(&ArmPoseTarget) -> Vec<f64>| {
                self.frames.iter().map(|f| part(f.arm(side))).collect::<Vec<_>>()
            };
            store.insert(motion, &arm_dataset(side, "shoulder_pos"), rows(|a| a.shoulder.as_slice().to_vec()));
            store.insert(motion, &arm_dataset(side, "elbow_pos"), rows(|a| a.elbow.as_slice().to_vec()));
            store.insert(motion, &arm_dataset(side, "wrist_pos"), rows(|a| a.wrist.as_slice().to_vec()));
            // row-major, matching from_row_slice on the way in
            store.insert(
                motion,
                &arm_dataset(side, "wrist_ori"),
                rows(|a| a.wrist_orientation.transpose().as_slice().to_vec()),
            );
        }
        store.insert(
            motion,
            TIME,
            self.frames.iter().map(|f| vec![f.timestamp]).collect(),
        );
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn timestamps(&self) -> Vec<f64> {
        self.frames.iter().map(|f| f.timestamp).collect()
    }
}

/// Retargeted robot motion: `N x 12` joint angles and their timestamps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JointTrajectory {
    pub joints: Vec<JointVector>,
    pub timestamps: Vec<f64>,
}

impl JointTrajectory {
    /// Replaces the joint and timestamp datasets of `motion`, leaving the rest
    /// of the store as it is.
    pub fn write_to(&self, store: &mut MotionStore, motion: &str) {
        store.insert(
            motion,
            JOINT_TRAJECTORY,
            self.joints.iter().map(|q| q.to_vec()).collect(),
        );
        store.insert(
            motion,
            JOINT_TIMESTAMPS,
            self.timestamps.iter().map(|t| vec![*t]).collect(),
        );
    }

    pub fn read_from(store: &MotionStore, motion: &str) -> Result<Self, StoreError> {
        let joints = store.matrix::<JOINT_DIM>(motion, JOINT_TRAJECTORY)?;
        let timestamps = store.matrix::<1>(motion, JOINT_TIMESTAMPS)?;
        check_rows(motion, JOINT_TIMESTAMPS, joints.len(), timestamps.len())?;
        Ok(Self {
            joints,
            timestamps: timestamps.into_iter().map(|[t]| t).collect(),
        })
    }
}
