//! Data transformation: gated train/test split.

use crate::data::table::Table;
use crate::data::validate::StatusGate;
use crate::error::MlError;
use mlpipe_core::DataTransformationConfig;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const TRAIN_FILE_NAME: &str = "train.csv";
pub const TEST_FILE_NAME: &str = "test.csv";

/// Output of the transformation stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitArtifact {
    pub train_path: PathBuf,
    pub test_path: PathBuf,
    pub train_rows: usize,
    pub test_rows: usize,
    pub columns: usize,
}

/// Shuffle row indices and cut them into `(train, test)`.
///
/// The test split gets `ceil(test_size * n)` rows. With `seed` unset the
/// shuffle is drawn from the thread RNG, so every call differs.
pub fn split_indices(
    n_rows: usize,
    test_size: f64,
    seed: Option<u64>,
) -> Result<(Vec<usize>, Vec<usize>), MlError> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(MlError::invalid_input(format!(
            "test_size must be within (0, 1), got {test_size}"
        )));
    }
    let n_test = (test_size * n_rows as f64).ceil() as usize;
    if n_test == 0 || n_test >= n_rows {
        return Err(MlError::invalid_input(format!(
            "{n_rows} rows cannot be split into non-empty train and test sets with test_size {test_size}"
        )));
    }

    let mut indices: Vec<usize> = (0..n_rows).collect();
    match seed {
        Some(seed) => indices.shuffle(&mut StdRng::seed_from_u64(seed)),
        None => indices.shuffle(&mut rand::thread_rng()),
    }
    let train = indices.split_off(n_test);
    Ok((train, indices))
}

/// Randomized split of a table's rows into `(train, test)`.
pub fn train_test_split(
    table: &Table,
    test_size: f64,
    seed: Option<u64>,
) -> Result<(Table, Table), MlError> {
    let (train, test) = split_indices(table.row_count(), test_size, seed)?;
    Ok((table.select_rows(&train), table.select_rows(&test)))
}

/// Splits the validated table into train and test files.
pub struct DataTransformation {
    config: DataTransformationConfig,
    gate: StatusGate,
}

impl DataTransformation {
    pub fn new(config: DataTransformationConfig) -> Self {
        let gate = StatusGate::new(&config.status_file);
        Self { config, gate }
    }

    /// Check the validation gate, then split and write both subsets.
    ///
    /// Returns [`MlError::SchemaRejected`] when validation recorded a failure
    /// and [`MlError::StatusFile`] when the status cannot be read.
    pub fn run(&self) -> Result<SplitArtifact, MlError> {
        self.gate.require_passed()?;
        self.train_test_splitting()
    }

    /// Split without consulting the gate.
    pub fn train_test_splitting(&self) -> Result<SplitArtifact, MlError> {
        let data = Table::read_csv(&self.config.data_path)?;
        let (train, test) = train_test_split(&data, self.config.test_size, self.config.seed)?;

        let train_path = self.config.root_dir.join(TRAIN_FILE_NAME);
        let test_path = self.config.root_dir.join(TEST_FILE_NAME);
        train.write_csv(&train_path)?;
        test.write_csv(&test_path)?;

        tracing::info!(
            root_dir = %self.config.root_dir.display(),
            train_shape = ?train.shape(),
            test_shape = ?test.shape(),
            seeded = self.config.seed.is_some(),
            "Train and test data saved"
        );
        Ok(SplitArtifact {
            train_path,
            test_path,
            train_rows: train.row_count(),
            test_rows: test.row_count(),
            columns: data.column_count(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeSet;
    use std::path::Path;
    use tempfile::TempDir;

    fn config(dir: &Path, seed: Option<u64>) -> DataTransformationConfig {
        DataTransformationConfig {
            root_dir: dir.join("data_transformation"),
            data_path: dir.join("data.csv"),
            status_file: dir.join("status.txt"),
            test_size: 0.25,
            seed,
        }
    }

    fn write_data(path: &Path, rows: usize) {
        let mut body = String::from("a,b,target\n");
        for i in 0..rows {
            body.push_str(&format!("{i},{},{}\n", i * 2, i * 3));
        }
        std::fs::write(path, body).unwrap();
    }

    #[test]
    fn test_default_proportions() {
        let (train, test) = split_indices(100, 0.25, Some(7)).unwrap();
        assert_eq!(test.len(), 25);
        assert_eq!(train.len(), 75);
        // ceil, as the test split is rounded up
        let (train, test) = split_indices(10, 0.25, Some(7)).unwrap();
        assert_eq!((train.len(), test.len()), (7, 3));
    }

    #[test]
    fn test_seeded_split_is_reproducible() {
        let a = split_indices(50, 0.2, Some(42)).unwrap();
        let b = split_indices(50, 0.2, Some(42)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_rejects_bad_test_size() {
        assert!(split_indices(10, 0.0, None).is_err());
        assert!(split_indices(10, 1.0, None).is_err());
        assert!(split_indices(10, f64::NAN, None).is_err());
    }

    #[test]
    fn test_rejects_too_few_rows() {
        assert!(split_indices(1, 0.25, None).is_err());
        assert!(split_indices(0, 0.25, None).is_err());
        assert!(split_indices(2, 0.25, None).is_ok());
    }

    proptest! {
        #[test]
        fn prop_split_is_a_partition(n in 2usize..500, test_size in 0.01f64..0.99) {
            let n_test = (test_size * n as f64).ceil() as usize;
            prop_assume!(n_test > 0 && n_test < n);
            let (train, test) = split_indices(n, test_size, None).unwrap();
            prop_assert_eq!(train.len() + test.len(), n);
            let train_set: BTreeSet<_> = train.iter().copied().collect();
            let test_set: BTreeSet<_> = test.iter().copied().collect();
            prop_assert!(train_set.is_disjoint(&test_set));
            let all: BTreeSet<_> = train_set.union(&test_set).copied().collect();
            prop_assert_eq!(all, (0..n).collect::<BTreeSet<_>>());
        }
    }

    #[test]
    fn test_gate_failure_blocks_split() {
        let dir = TempDir::new().unwrap();
        let cfg = config(dir.path(), None);
        write_data(&cfg.data_path, 20);
        std::fs::write(&cfg.status_file, "Validation status: False").unwrap();

        let err = DataTransformation::new(cfg.clone()).run().unwrap_err();
        assert!(matches!(err, MlError::SchemaRejected { .. }));
        assert!(!cfg.root_dir.join(TRAIN_FILE_NAME).exists());
    }

    #[test]
    fn test_missing_status_blocks_split() {
        let dir = TempDir::new().unwrap();
        let cfg = config(dir.path(), None);
        write_data(&cfg.data_path, 20);

        let err = DataTransformation::new(cfg).run().unwrap_err();
        assert!(matches!(err, MlError::StatusFile { .. }));
    }

    #[test]
    fn test_split_writes_disjoint_files() {
        let dir = TempDir::new().unwrap();
        let cfg = config(dir.path(), None);
        write_data(&cfg.data_path, 40);
        std::fs::write(&cfg.status_file, "Validation status: True").unwrap();

        let artifact = DataTransformation::new(cfg).run().unwrap();
        assert_eq!(artifact.train_rows, 30);
        assert_eq!(artifact.test_rows, 10);

        let train = Table::read_csv(&artifact.train_path).unwrap();
        let test = Table::read_csv(&artifact.test_path).unwrap();
        assert_eq!(train.columns, vec!["a", "b", "target"]);
        let train_keys: BTreeSet<_> = train.rows.iter().map(|r| r[0].clone()).collect();
        let test_keys: BTreeSet<_> = test.rows.iter().map(|r| r[0].clone()).collect();
        assert!(train_keys.is_disjoint(&test_keys));
        assert_eq!(train_keys.len() + test_keys.len(), 40);
    }
}
