//! In-memory CSV table and its conversion to numeric arrays.

use crate::error::MlError;
use mlpipe_core::persistence::tmp_sibling;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A delimited table held as strings, with a header row.
///
/// Cells stay untyped until a stage asks for a numeric view, so the table can
/// be split and rewritten byte-for-byte without reformatting values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { columns, rows }
    }

    /// Read a comma-delimited file with a header row.
    pub fn read_csv(path: &Path) -> Result<Self, MlError> {
        if !path.exists() {
            return Err(MlError::not_found(format!("table {}", path.display())));
        }
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_path(path)?;

        let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        if columns.is_empty() || columns.iter().all(String::is_empty) {
            return Err(MlError::dataset(format!(
                "Empty CSV file: {}",
                path.display()
            )));
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        tracing::debug!(
            path = %path.display(),
            rows = rows.len(),
            columns = columns.len(),
            "Table loaded"
        );
        Ok(Self { columns, rows })
    }

    /// Write the table as CSV (header included), atomically.
    pub fn write_csv(&self, path: &Path) -> Result<(), MlError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = tmp_sibling(path);
        {
            let mut writer = csv::Writer::from_path(&tmp)?;
            writer.write_record(&self.columns)?;
            for row in &self.rows {
                writer.write_record(row)?;
            }
            writer.flush()?;
        }
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// `(rows, columns)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.row_count(), self.column_count())
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// A new table containing the given rows, in the given order.
    pub fn select_rows(&self, indices: &[usize]) -> Self {
        Self {
            columns: self.columns.clone(),
            rows: indices
                .iter()
                .filter_map(|&i| self.rows.get(i).cloned())
                .collect(),
        }
    }

    /// Every column except `target`, in table order.
    pub fn feature_names(&self, target: &str) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.as_str() != target)
            .cloned()
            .collect()
    }

    /// A numeric column as a vector.
    pub fn numeric_column(&self, name: &str) -> Result<Array1<f64>, MlError> {
        let idx = self
            .column_index(name)
            .ok_or_else(|| MlError::dataset(format!("Column '{name}' not found")))?;
        let values = self
            .rows
            .iter()
            .enumerate()
            .map(|(row, cells)| parse_cell(cells, row, idx, name))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Array1::from_vec(values))
    }

    /// Numeric design matrix with columns in the order of `features`.
    ///
    /// Columns are looked up by name, so a table whose columns are permuted
    /// relative to training still yields the matrix the model expects.
    pub fn feature_matrix(&self, features: &[String]) -> Result<Array2<f64>, MlError> {
        let indices = features
            .iter()
            .map(|name| {
                self.column_index(name)
                    .ok_or_else(|| MlError::dataset(format!("Feature column '{name}' not found")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut values = Vec::with_capacity(self.rows.len() * indices.len());
        for (row, cells) in self.rows.iter().enumerate() {
            for (&idx, name) in indices.iter().zip(features) {
                values.push(parse_cell(cells, row, idx, name)?);
            }
        }
        Ok(Array2::from_shape_vec(
            (self.rows.len(), indices.len()),
            values,
        )?)
    }
}

fn parse_cell(cells: &[String], row: usize, idx: usize, column: &str) -> Result<f64, MlError> {
    let raw = cells
        .get(idx)
        .ok_or_else(|| MlError::dataset(format!("Row {} is missing column '{column}'", row + 1)))?;
    raw.trim().parse::<f64>().map_err(|_| {
        MlError::dataset(format!(
            "Non-numeric value '{raw}' in column '{column}' at row {}",
            row + 1
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> Table {
        Table::new(
            vec!["a".into(), "b".into(), "target".into()],
            vec![
                vec!["1".into(), "2".into(), "3".into()],
                vec!["4".into(), "5.5".into(), "6".into()],
            ],
        )
    }

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("t.csv");
        sample().write_csv(&path).unwrap();

        let loaded = Table::read_csv(&path).unwrap();
        assert_eq!(loaded, sample());
        assert_eq!(loaded.shape(), (2, 3));
    }

    #[test]
    fn test_read_trims_and_quotes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("q.csv");
        std::fs::write(&path, "\"fixed acidity\", pH\n7.4 , 3.51\n").unwrap();
        let table = Table::read_csv(&path).unwrap();
        assert_eq!(table.columns, vec!["fixed acidity", "pH"]);
        assert_eq!(table.rows[0], vec!["7.4", "3.51"]);
    }

    #[test]
    fn test_read_missing_file() {
        let err = Table::read_csv(Path::new("/nonexistent/data.csv")).unwrap_err();
        assert!(matches!(err, MlError::NotFound(_)));
    }

    #[test]
    fn test_feature_matrix_by_name() {
        let table = sample();
        let features = vec!["b".to_string(), "a".to_string()];
        let x = table.feature_matrix(&features).unwrap();
        assert_eq!(x.shape(), &[2, 2]);
        assert_eq!(x[[0, 0]], 2.0);
        assert_eq!(x[[1, 1]], 4.0);
        assert_eq!(table.numeric_column("b").unwrap()[1], 5.5);
    }

    #[test]
    fn test_non_numeric_cell() {
        let mut table = sample();
        table.rows[1][0] = "abc".into();
        let err = table.feature_matrix(&["a".to_string()]).unwrap_err();
        assert!(err.to_string().contains("Non-numeric value 'abc'"));
    }

    #[test]
    fn test_select_rows_and_features() {
        let table = sample();
        let picked = table.select_rows(&[1]);
        assert_eq!(picked.row_count(), 1);
        assert_eq!(picked.rows[0][0], "4");
        assert_eq!(table.feature_names("target"), vec!["a", "b"]);
    }
}
