use std::{fs, io, path::Path, path::PathBuf};

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cost::CostWeights;
use crate::multi_body::ArmLinks;
use crate::pose::{JointVector, Side, JOINT_DIM};
use crate::solver::SolverConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Everything a retargeting run needs besides the robot description and the
/// motion data. Missing fields take their defaults, so `{}` is a valid file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetargetConfig {
    pub left_links: ArmLinks,
    pub right_links: ArmLinks,
    /// Robot shoulder positions in the world frame.
    pub left_robot_shoulder: [f64; 3],
    pub right_robot_shoulder: [f64; 3],
    pub weights: CostWeights,
    pub solver: SolverConfig,
    /// Starting point of the first frame.
    pub initial_guess: JointVector,
}

impl Default for RetargetConfig {
    fn default() -> Self {
        Self {
            left_links: ArmLinks::for_side(Side::Left),
            right_links: ArmLinks::for_side(Side::Right),
            left_robot_shoulder: [-0.06, 0.235, 0.395],
            right_robot_shoulder: [-0.06, -0.235, 0.395],
            weights: CostWeights::default(),
            solver: SolverConfig::default(),
            initial_guess: [0.; JOINT_DIM],
        }
    }
}

impl RetargetConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })
    }

    pub fn links(&self, side: Side) -> &ArmLinks {
        match side {
            Side::Left => &self.left_links,
            Side::Right => &self.right_links,
        }
    }

    pub fn robot_shoulder(&self, side: Side) -> Vector3<f64> {
        match side {
            Side::Left => Vector3::from(self.left_robot_shoulder),
            Side::Right => Vector3::from(self.right_robot_shoulder),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        fs::write(&path, "{}").unwrap();
        assert_eq!(RetargetConfig::from_file(&path).unwrap(), RetargetConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        fs::write(
            &path,
            r#"{
                "weights": { "continuity": 0.0 },
                "solver": { "max_evals": 50, "right_bounds": { "lower": [-2, -2, -2, -2, -2, -2], "upper": [2, 2, 2, 2, 2, 2] } },
                "left_links": { "base": "world", "shoulder": "a", "elbow": "b", "wrist": "c" }
            }"#,
        )
        .unwrap();
        let config = RetargetConfig::from_file(&path).unwrap();
        assert_eq!(config.weights.continuity, 0.0);
        assert_eq!(config.weights.wrist_orientation, 10.0);
        assert_eq!(config.solver.max_evals, 50);
        assert_eq!(config.solver.xtol_rel, 1e-6);
        assert_eq!(config.solver.right_bounds.upper, [2.0; 6]);
        assert_eq!(config.links(Side::Left).wrist, "c");
        assert_eq!(config.links(Side::Right), &ArmLinks::for_side(Side::Right));
    }

    #[test]
    fn test_robot_shoulder() {
        let config = RetargetConfig::default();
        assert_eq!(config.robot_shoulder(Side::Left), Vector3::new(-0.06, 0.235, 0.395));
        assert_eq!(config.robot_shoulder(Side::Right).y, -0.235);
    }

    #[test]
    fn test_load_failures() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(matches!(
            RetargetConfig::from_file(&missing),
            Err(ConfigError::Io { .. })
        ));

        let bad = dir.path().join("bad.json");
        fs::write(&bad, r#"{ "initial_guess": [0, 0] }"#).unwrap();
        let err = RetargetConfig::from_file(&bad).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("bad.json"));
    }
}
