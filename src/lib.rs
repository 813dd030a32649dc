//! # retarget maps recorded human arm motion onto a dual-arm robot.
//! Each frame is solved as a bounded minimization over both arms' joints,
//! warm-started from the frame before.

#![deny(unsafe_code)]

mod config;
mod cost;
mod driver;
mod kinematics;
mod multi_body;
mod optimizer;
mod pose;
mod solver;
mod store;

pub use config::{ConfigError, RetargetConfig};
pub use cost::{
    arm_cost, arm_cost_terms, central_difference, rotation_angle, ContinuityState, CostTerms,
    CostWeights, DualArmObjective, DEFAULT_STEP,
};
pub use driver::RetargetSession;
pub use kinematics::{ArmJoints, ArmKinematics, ArmPose, DualArmModel, KinematicsError, Segment, ARM_DOF};
pub use multi_body::{ArmChain, ArmLinks, Link, ModelError, MultiBody};
pub use optimizer::{
    BoundedMinimizer, Bounds, Minimum, Objective, ProjectedBfgs, StopCriteria, Termination,
};
pub use pose::{arm_block, join_arms, ArmPoseTarget, FrameTarget, JointVector, Side, JOINT_DIM};
pub use solver::{ArmBounds, FrameSolveResult, FrameSolver, SolverConfig};
pub use store::{Dataset, JointTrajectory, MotionStore, MotionTrajectory, StoreError, StoreFailure};
