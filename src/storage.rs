//! # Persistence
//!
//! Two on-disk formats:
//!
//! - **Results files** hold a hierarchical [`Record`], flattened to
//!   `/group/key` paths and written as JSON.
//! - **Checkpoints** map an episode index to a full [`AgentState`] and are
//!   written with bincode.

use serde::{Serialize, Deserialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::agent::AgentState;
use crate::error::{DqnError, Result};
use crate::trainer::TrainingResults;

/// Agent snapshots keyed by the episode after which they were taken.
pub type Checkpoint = BTreeMap<usize, AgentState>;

/// Hierarchical key-value data.
#[derive(Clone, Debug, PartialEq)]
pub enum Record {
    Scalar(f64),
    Bool(bool),
    Array(Vec<f64>),
    Group(BTreeMap<String, Record>),
}

/// A stored value at one flattened path.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum Leaf {
    Bool(bool),
    Scalar(f64),
    Array(Vec<f64>),
}

impl From<Leaf> for Record {
    fn from(leaf: Leaf) -> Self {
        match leaf {
            Leaf::Bool(value) => Record::Bool(value),
            Leaf::Scalar(value) => Record::Scalar(value),
            Leaf::Array(values) => Record::Array(values),
        }
    }
}

impl Record {
    pub fn group() -> Self {
        Record::Group(BTreeMap::new())
    }

    /// Insert `value` under `key` if this record is a group.
    pub fn with(mut self, key: &str, value: Record) -> Self {
        if let Record::Group(entries) = &mut self {
            entries.insert(key.to_string(), value);
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&Record> {
        match self {
            Record::Group(entries) => entries.get(key),
            _ => None,
        }
    }
}

/// Flatten a group into `/`-separated paths. Empty groups have no leaves and
/// are dropped. Non-finite numbers are rejected.
pub fn flatten(record: &Record) -> Result<BTreeMap<String, Leaf>> {
    let Record::Group(entries) = record else {
        return Err(DqnError::Serialization("only a group can be flattened".to_string()));
    };
    let mut leaves = BTreeMap::new();
    flatten_into(entries, "/", &mut leaves)?;
    Ok(leaves)
}

fn flatten_into(entries: &BTreeMap<String, Record>, prefix: &str, leaves: &mut BTreeMap<String, Leaf>) -> Result<()> {
    for (key, value) in entries {
        if key.is_empty() || key.contains('/') {
            return Err(DqnError::Serialization(format!("invalid record key {:?}", key)));
        }
        let path = format!("{}{}", prefix, key);
        match value {
            Record::Group(children) => flatten_into(children, &format!("{}/", path), leaves)?,
            Record::Scalar(v) => {
                check_finite(&path, std::slice::from_ref(v))?;
                leaves.insert(path, Leaf::Scalar(*v));
            }
            Record::Bool(v) => {
                leaves.insert(path, Leaf::Bool(*v));
            }
            Record::Array(v) => {
                check_finite(&path, v)?;
                leaves.insert(path, Leaf::Array(v.clone()));
            }
        }
    }
    Ok(())
}

/// JSON has no representation for NaN or infinity.
fn check_finite(path: &str, values: &[f64]) -> Result<()> {
    match values.iter().find(|v| !v.is_finite()) {
        Some(v) => Err(DqnError::Numerical(format!("value {} at {} cannot be stored", v, path))),
        None => Ok(()),
    }
}

/// Rebuild the nested record from flattened paths.
pub fn unflatten(leaves: &BTreeMap<String, Leaf>) -> Result<Record> {
    let mut root = BTreeMap::new();
    for (path, leaf) in leaves {
        let keys: Vec<&str> = path.trim_start_matches('/').split('/').collect();
        if keys.iter().any(|key| key.is_empty()) {
            return Err(DqnError::Serialization(format!("invalid record path {:?}", path)));
        }
        let (last, parents) = keys.split_last().ok_or_else(|| DqnError::Serialization("empty record path".to_string()))?;

        let mut node = &mut root;
        for key in parents {
            let child = node.entry(key.to_string()).or_insert_with(Record::group);
            node = match child {
                Record::Group(children) => children,
                _ => return Err(DqnError::Serialization(format!("path {:?} passes through a value", path))),
            };
        }
        if node.insert(last.to_string(), leaf.clone().into()).is_some() {
            return Err(DqnError::Serialization(format!("path {:?} is defined twice", path)));
        }
    }
    Ok(Record::Group(root))
}

pub fn save_record<P: AsRef<Path>>(path: P, record: &Record) -> Result<()> {
    let leaves = flatten(record)?;
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, &leaves)?;
    Ok(())
}

pub fn load_record<P: AsRef<Path>>(path: P) -> Result<Record> {
    let reader = BufReader::new(File::open(path)?);
    let leaves: BTreeMap<String, Leaf> = serde_json::from_reader(reader)?;
    unflatten(&leaves)
}

pub fn save_checkpoint<P: AsRef<Path>>(path: P, checkpoint: &Checkpoint) -> Result<()> {
    let writer = BufWriter::new(File::create(path)?);
    bincode::serialize_into(writer, checkpoint)?;
    Ok(())
}

pub fn load_checkpoint<P: AsRef<Path>>(path: P) -> Result<Checkpoint> {
    let reader = BufReader::new(File::open(path)?);
    Ok(bincode::deserialize_from(reader)?)
}

fn to_array<T: Copy + Into<f64>>(values: &[T]) -> Record {
    Record::Array(values.iter().map(|&v| v.into()).collect())
}

fn counts_to_array(values: &[usize]) -> Record {
    Record::Array(values.iter().map(|&v| v as f64).collect())
}

fn array_field(record: &Record, key: &str) -> Result<Vec<f64>> {
    match record.get(key) {
        Some(Record::Array(values)) => Ok(values.clone()),
        Some(_) => Err(DqnError::Serialization(format!("field {} is not an array", key))),
        None => Err(DqnError::Serialization(format!("missing field {}", key))),
    }
}

impl TrainingResults {
    pub fn to_record(&self) -> Record {
        Record::group()
            .with("episode_durations", counts_to_array(&self.episode_durations))
            .with("episode_returns", to_array(&self.episode_returns))
            .with("n_training_epochs", counts_to_array(&self.training_epochs))
            .with("n_steps_simulated", counts_to_array(&self.steps_simulated))
            .with("training_completed", Record::Bool(self.training_completed))
    }

    pub fn from_record(record: &Record) -> Result<Self> {
        let counts = |key: &str| -> Result<Vec<usize>> {
            Ok(array_field(record, key)?.into_iter().map(|v| v as usize).collect())
        };
        let training_completed = match record.get("training_completed") {
            Some(Record::Bool(value)) => *value,
            _ => return Err(DqnError::Serialization("missing field training_completed".to_string())),
        };
        Ok(TrainingResults {
            episode_durations: counts("episode_durations")?,
            episode_returns: array_field(record, "episode_returns")?.into_iter().map(|v| v as f32).collect(),
            training_epochs: counts("n_training_epochs")?,
            steps_simulated: counts("n_steps_simulated")?,
            training_completed,
        })
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        save_record(path, &self.to_record())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_record(&load_record(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nested() -> Record {
        Record::group()
            .with("flag", Record::Bool(true))
            .with("run", Record::group()
                .with("returns", Record::Array(vec![1.0, -2.5]))
                .with("meta", Record::group().with("seed", Record::Scalar(7.0))))
    }

    #[test]
    fn test_flatten_paths() {
        let leaves = flatten(&nested()).unwrap();
        let paths: Vec<&str> = leaves.keys().map(String::as_str).collect();
        assert_eq!(paths, vec!["/flag", "/run/meta/seed", "/run/returns"]);
        assert_eq!(leaves["/run/meta/seed"], Leaf::Scalar(7.0));
        assert_eq!(unflatten(&leaves).unwrap(), nested());
    }

    #[test]
    fn test_flatten_rejects_bad_keys() {
        assert!(flatten(&Record::Scalar(1.0)).is_err());
        assert!(flatten(&Record::group().with("a/b", Record::Bool(false))).is_err());
    }

    #[test]
    fn test_non_finite_values_are_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        let results = TrainingResults {
            episode_durations: vec![2],
            episode_returns: vec![f32::INFINITY],
            training_epochs: vec![0],
            steps_simulated: vec![2],
            training_completed: false,
        };
        assert!(matches!(results.save(&path), Err(DqnError::Numerical(_))));
        assert!(matches!(
            flatten(&Record::group().with("loss", Record::Scalar(f64::NAN))),
            Err(DqnError::Numerical(_))
        ));
    }

    #[test]
    fn test_unflatten_rejects_conflicts() {
        let mut leaves = BTreeMap::new();
        leaves.insert("/a".to_string(), Leaf::Scalar(1.0));
        leaves.insert("/a/b".to_string(), Leaf::Scalar(2.0));
        assert!(unflatten(&leaves).is_err());
    }

    #[test]
    fn test_record_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("record.json");
        save_record(&path, &nested()).unwrap();
        assert_eq!(load_record(&path).unwrap(), nested());
    }

    #[test]
    fn test_training_results_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        let results = TrainingResults {
            episode_durations: vec![1, 3],
            episode_returns: vec![1.0, -0.5],
            training_epochs: vec![0, 1],
            steps_simulated: vec![1, 4],
            training_completed: true,
        };
        results.save(&path).unwrap();
        assert_eq!(TrainingResults::load(&path).unwrap(), results);
    }
}
