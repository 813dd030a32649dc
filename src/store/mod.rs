//! Motion store: a JSON document of groups, one per motion, each holding
//! named row-major datasets.
//!
//! ```json
//! { "fengren": { "l_wrist_pos": [[0.1, 0.2, 0.3], ...], "time": [[0.0], ...] } }
//! ```

mod trajectory;

use std::{collections::BTreeMap, fs, io, path::Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use trajectory::{JointTrajectory, MotionTrajectory};

#[derive(Debug, Error)]
pub enum StoreFailure {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("malformed store: {0}")]
    Format(#[from] serde_json::Error),
    #[error("no such group")]
    MissingGroup,
    #[error("no such dataset")]
    MissingDataset,
    #[error("row {row} has {found} columns, expected {expected}")]
    Shape {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("{found} rows, expected {expected}")]
    RowCount { expected: usize, found: usize },
}

/// Any failure to read or write the store, with the path, group or dataset
/// it concerns.
#[derive(Debug, Error)]
#[error("store access failed for `{key}`: {reason}")]
pub struct StoreError {
    pub key: String,
    #[source]
    pub reason: StoreFailure,
}

impl StoreError {
    pub fn new(key: impl Into<String>, reason: impl Into<StoreFailure>) -> Self {
        Self {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

pub type Dataset = Vec<Vec<f64>>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MotionStore {
    groups: BTreeMap<String, BTreeMap<String, Dataset>>,
}

fn dataset_key(group: &str, name: &str) -> String {
    format!("{group}/{name}")
}

impl MotionStore {
    /// Reads an existing store.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let key = path.display().to_string();
        let text = fs::read_to_string(path).map_err(|e| StoreError::new(&key, e))?;
        serde_json::from_str(&text).map_err(|e| StoreError::new(&key, e))
    }

    /// Reads a store, or starts an empty one when the file does not exist yet.
    pub fn open_or_default(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if path.exists() {
            Self::open(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        let path = path.as_ref();
        let key = path.display().to_string();
        let text = serde_json::to_string(self).map_err(|e| StoreError::new(&key, e))?;
        fs::write(path, text).map_err(|e| StoreError::new(&key, e))
    }

    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub fn dataset(&self, group: &str, name: &str) -> Result<&Dataset, StoreError> {
        self.groups
            .get(group)
            .ok_or_else(|| StoreError::new(group, StoreFailure::MissingGroup))?
            .get(name)
            .ok_or_else(|| StoreError::new(dataset_key(group, name), StoreFailure::MissingDataset))
    }

    /// Reads a dataset whose rows must all have `C` columns.
    pub fn matrix<const C: usize>(&self, group: &str, name: &str) -> Result<Vec<[f64; C]>, StoreError> {
        self.dataset(group, name)?
            .iter()
            .enumerate()
            .map(|(row, values)| {
                <[f64; C]>::try_from(values.as_slice()).map_err(|_| {
                    StoreError::new(
                        dataset_key(group, name),
                        StoreFailure::Shape {
                            row,
                            expected: C,
                            found: values.len(),
                        },
                    )
                })
            })
            .collect()
    }

    /// Stores a dataset, replacing any dataset of the same name in the group.
    pub fn insert(&mut self, group: &str, name: &str, rows: Dataset) -> Option<Dataset> {
        self.groups
            .entry(group.to_owned())
            .or_default()
            .insert(name.to_owned(), rows)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_missing_group_and_dataset() {
        let mut store = MotionStore::default();
        let err = store.dataset("wave", "time").unwrap_err();
        assert_eq!(err.key, "wave");
        assert!(matches!(err.reason, StoreFailure::MissingGroup));

        store.insert("wave", "time", vec![vec![0.0]]);
        let err = store.dataset("wave", "l_wrist_pos").unwrap_err();
        assert_eq!(err.key, "wave/l_wrist_pos");
        assert!(matches!(err.reason, StoreFailure::MissingDataset));
    }

    #[test]
    fn test_matrix_shape() {
        let mut store = MotionStore::default();
        store.insert("wave", "pos", vec![vec![1., 2., 3.], vec![4., 5.]]);
        let err = store.matrix::<3>("wave", "pos").unwrap_err();
        assert!(matches!(
            err.reason,
            StoreFailure::Shape {
                row: 1,
                expected: 3,
                found: 2
            }
        ));

        store.insert("wave", "pos", vec![vec![1., 2., 3.], vec![4., 5., 6.]]);
        assert_eq!(
            store.matrix::<3>("wave", "pos").unwrap(),
            vec![[1., 2., 3.], [4., 5., 6.]]
        );
    }

    #[test]
    fn test_insert_replaces_dataset() {
        let mut store = MotionStore::default();
        assert!(store.insert("wave", "time", vec![vec![0.0]]).is_none());
        store.insert("wave", "other", vec![vec![7.0]]);
        let old = store.insert("wave", "time", vec![vec![1.0], vec![2.0]]);
        assert_eq!(old, Some(vec![vec![0.0]]));
        assert_eq!(store.dataset("wave", "time").unwrap().len(), 2);
        assert_eq!(store.dataset("wave", "other").unwrap(), &vec![vec![7.0]]);
    }

    #[test]
    fn test_save_and_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let mut store = MotionStore::default();
        store.insert("wave", "time", vec![vec![0.1], vec![1.0 / 3.0]]);
        store.insert("nod", "time", vec![vec![f64::MIN_POSITIVE]]);
        store.save(&path).unwrap();

        let loaded = MotionStore::open(&path).unwrap();
        assert_eq!(loaded, store);
        assert_eq!(loaded.groups().collect::<Vec<_>>(), vec!["nod", "wave"]);
    }

    #[test]
    fn test_open_failures() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        let err = MotionStore::open(&missing).unwrap_err();
        assert!(matches!(err.reason, StoreFailure::Io(_)));
        assert!(err.key.ends_with("missing.json"));
        assert_eq!(MotionStore::open_or_default(&missing).unwrap(), MotionStore::default());

        let garbage = dir.path().join("garbage.json");
        fs::write(&garbage, "{ not json").unwrap();
        let err = MotionStore::open(&garbage).unwrap_err();
        assert!(matches!(err.reason, StoreFailure::Format(_)));
        assert!(MotionStore::open_or_default(&garbage).is_err());
    }
}
