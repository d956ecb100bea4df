//! ElasticNet linear regression fitted by cyclic coordinate descent.
//!
//! Minimizes
//! `1/(2n) * ||y - Xw - b||^2 + alpha * l1_ratio * ||w||_1 + alpha * (1 - l1_ratio) / 2 * ||w||^2`,
//! the same objective scikit-learn's `ElasticNet` uses, so hyperparameters
//! carry over unchanged.

use crate::data::table::Table;
use crate::error::MlError;
use chrono::{DateTime, Utc};
use mlpipe_core::ElasticNetParams;
use mlpipe_core::persistence::{atomic_write_json, load_json};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const ALGORITHM: &str = "elastic_net";

/// Unfitted estimator.
#[derive(Debug, Clone, PartialEq)]
pub struct ElasticNet {
    params: ElasticNetParams,
}

/// A fitted model, self-describing enough to score a table by column name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionModel {
    pub algorithm: String,
    pub params: ElasticNetParams,
    pub feature_names: Vec<String>,
    pub target_column: String,
    pub coefficients: Array1<f64>,
    pub intercept: f64,
    /// Coordinate-descent sweeps actually run.
    pub n_iter: usize,
    pub converged: bool,
    pub trained_at: DateTime<Utc>,
}

impl ElasticNet {
    pub fn new(params: ElasticNetParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &ElasticNetParams {
        &self.params
    }

    /// Fit on the numeric feature matrix `x` and target `y`.
    pub fn fit(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        feature_names: Vec<String>,
        target_column: &str,
    ) -> Result<RegressionModel, MlError> {
        let (n_samples, n_features) = x.dim();
        if n_samples == 0 {
            return Err(MlError::training("cannot fit on an empty training set"));
        }
        if y.len() != n_samples {
            return Err(MlError::training(format!(
                "target has {} values but features have {n_samples} rows",
                y.len()
            )));
        }
        if feature_names.len() != n_features {
            return Err(MlError::training(format!(
                "{} feature names for {n_features} feature columns",
                feature_names.len()
            )));
        }
        if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
            return Err(MlError::training("training data contains NaN or infinite values"));
        }

        // Center so the intercept drops out of the coordinate updates.
        let x_mean = x
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(n_features));
        let y_mean = y.mean().unwrap_or(0.0);
        let xc = x - &x_mean.view().insert_axis(Axis(0));
        let yc = y - y_mean;

        let n = n_samples as f64;
        let l1_penalty = self.params.alpha * self.params.l1_ratio * n;
        let l2_penalty = self.params.alpha * (1.0 - self.params.l1_ratio) * n;
        let col_norms: Vec<f64> = xc.columns().into_iter().map(|c| c.dot(&c)).collect();

        let mut w = Array1::<f64>::zeros(n_features);
        let mut residual = yc.clone();
        let mut n_iter = 0;
        let mut converged = false;

        while n_iter < self.params.max_iter {
            n_iter += 1;
            let mut max_change: f64 = 0.0;
            let mut max_weight: f64 = 0.0;

            for j in 0..n_features {
                let denom = col_norms[j] + l2_penalty;
                let old = w[j];
                let column = xc.column(j);
                let updated = if denom < 1e-15 {
                    0.0
                } else {
                    let rho = column.dot(&residual) + col_norms[j] * old;
                    soft_threshold(rho, l1_penalty) / denom
                };
                if updated != old {
                    residual.scaled_add(old - updated, &column);
                    w[j] = updated;
                }
                max_change = max_change.max((updated - old).abs());
                max_weight = max_weight.max(updated.abs());
            }

            if max_weight == 0.0 || max_change <= self.params.tol * max_weight {
                converged = true;
                break;
            }
        }

        if !converged {
            tracing::warn!(
                max_iter = self.params.max_iter,
                "Coordinate descent did not converge"
            );
        }

        let intercept = y_mean - w.dot(&x_mean);
        Ok(RegressionModel {
            algorithm: ALGORITHM.to_string(),
            params: self.params.clone(),
            feature_names,
            target_column: target_column.to_string(),
            coefficients: w,
            intercept,
            n_iter,
            converged,
            trained_at: Utc::now(),
        })
    }

    /// Fit on a table: `target_column` is the label, every other column a feature.
    pub fn fit_table(
        &self,
        table: &Table,
        target_column: &str,
    ) -> Result<RegressionModel, MlError> {
        if table.column_index(target_column).is_none() {
            return Err(MlError::training(format!(
                "target column '{target_column}' not present in training data"
            )));
        }
        let feature_names = table.feature_names(target_column);
        let x = table.feature_matrix(&feature_names)?;
        let y = table.numeric_column(target_column)?;
        self.fit(&x, &y, feature_names, target_column)
    }
}

fn soft_threshold(value: f64, threshold: f64) -> f64 {
    if value > threshold {
        value - threshold
    } else if value < -threshold {
        value + threshold
    } else {
        0.0
    }
}

impl RegressionModel {
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, MlError> {
        if x.ncols() != self.coefficients.len() {
            return Err(MlError::model(format!(
                "model expects {} features, got {}",
                self.coefficients.len(),
                x.ncols()
            )));
        }
        Ok(x.dot(&self.coefficients) + self.intercept)
    }

    /// Predict for every row of `table`, selecting features by name.
    pub fn predict_table(&self, table: &Table) -> Result<Array1<f64>, MlError> {
        let x = table.feature_matrix(&self.feature_names)?;
        self.predict(&x)
    }

    pub fn save(&self, path: &Path) -> Result<(), MlError> {
        atomic_write_json(path, self)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, MlError> {
        let model: Self = load_json(path)?
            .ok_or_else(|| MlError::not_found(format!("model {}", path.display())))?;
        if model.algorithm != ALGORITHM {
            return Err(MlError::model(format!(
                "unsupported model algorithm '{}'",
                model.algorithm
            )));
        }
        if model.coefficients.len() != model.feature_names.len() {
            return Err(MlError::model(format!(
                "model file {} is inconsistent: {} coefficients for {} features",
                path.display(),
                model.coefficients.len(),
                model.feature_names.len()
            )));
        }
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use tempfile::TempDir;

    fn params(alpha: f64, l1_ratio: f64) -> ElasticNetParams {
        ElasticNetParams {
            alpha,
            l1_ratio,
            max_iter: 5000,
            tol: 1e-8,
        }
    }

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("x{i}")).collect()
    }

    #[test]
    fn test_recovers_linear_relation_with_small_alpha() {
        let x = array![[1.0, 0.0], [2.0, 1.0], [3.0, 0.0], [4.0, 1.0], [5.0, 0.0]];
        let y = x.column(0).mapv(|v| 2.0 * v) + x.column(1).mapv(|v| -3.0 * v) + 1.0;
        let model = ElasticNet::new(params(1e-6, 0.5))
            .fit(&x, &y, names(2), "y")
            .unwrap();
        assert!(model.converged);
        assert!((model.coefficients[0] - 2.0).abs() < 1e-3);
        assert!((model.coefficients[1] + 3.0).abs() < 1e-3);
        assert!((model.intercept - 1.0).abs() < 1e-3);

        let preds = model.predict(&x).unwrap();
        for (p, t) in preds.iter().zip(y.iter()) {
            assert!((p - t).abs() < 1e-2);
        }
    }

    #[test]
    fn test_large_alpha_shrinks_to_mean() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = array![3.0, 5.0, 7.0, 9.0];
        let model = ElasticNet::new(params(1e3, 1.0))
            .fit(&x, &y, names(1), "y")
            .unwrap();
        assert_eq!(model.coefficients[0], 0.0);
        assert!((model.intercept - 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_ridge_end_shrinks_but_keeps_sign() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = array![3.0, 5.0, 7.0, 9.0];
        let model = ElasticNet::new(params(0.5, 0.0))
            .fit(&x, &y, names(1), "y")
            .unwrap();
        assert!(model.coefficients[0] > 0.0 && model.coefficients[0] < 2.0);
    }

    #[test]
    fn test_constant_feature_gets_zero_weight() {
        let x = array![[1.0, 7.0], [2.0, 7.0], [3.0, 7.0]];
        let y = array![1.0, 2.0, 3.0];
        let model = ElasticNet::new(params(1e-6, 0.5))
            .fit(&x, &y, names(2), "y")
            .unwrap();
        assert_eq!(model.coefficients[1], 0.0);
    }

    #[test]
    fn test_rejects_bad_inputs() {
        let est = ElasticNet::new(params(0.1, 0.5));
        let empty = Array2::<f64>::zeros((0, 2));
        assert!(est.fit(&empty, &Array1::zeros(0), names(2), "y").is_err());

        let x = array![[1.0], [2.0]];
        assert!(est.fit(&x, &array![1.0], names(1), "y").is_err());
        assert!(est.fit(&x, &array![1.0, f64::NAN], names(1), "y").is_err());
        assert!(est.fit(&x, &array![1.0, 2.0], names(2), "y").is_err());
    }

    #[test]
    fn test_fit_table_and_predict_by_name() {
        let table = Table::new(
            vec!["a".into(), "target".into(), "b".into()],
            vec![
                vec!["1".into(), "3".into(), "1".into()],
                vec!["2".into(), "5".into(), "1".into()],
                vec!["3".into(), "7".into(), "2".into()],
                vec!["4".into(), "9".into(), "2".into()],
            ],
        );
        let model = ElasticNet::new(params(1e-6, 0.5))
            .fit_table(&table, "target")
            .unwrap();
        assert_eq!(model.feature_names, vec!["a", "b"]);

        // Same data, columns permuted: predictions must not change.
        let permuted = Table::new(
            vec!["b".into(), "a".into()],
            table.rows.iter().map(|r| vec![r[2].clone(), r[0].clone()]).collect(),
        );
        let p1 = model.predict_table(&table).unwrap();
        let p2 = model.predict_table(&permuted).unwrap();
        assert_eq!(p1, p2);

        assert!(ElasticNet::new(params(0.1, 0.5)).fit_table(&table, "nope").is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.json");
        let x = array![[1.0], [2.0], [3.0]];
        let y = array![2.0, 4.0, 6.0];
        let model = ElasticNet::new(params(0.01, 0.5))
            .fit(&x, &y, names(1), "y")
            .unwrap();
        model.save(&path).unwrap();
        assert_eq!(RegressionModel::load(&path).unwrap(), model);

        let missing = RegressionModel::load(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(missing, MlError::NotFound(_)));
    }

    #[test]
    fn test_predict_shape_mismatch() {
        let model = ElasticNet::new(params(0.01, 0.5))
            .fit(&array![[1.0], [2.0]], &array![1.0, 2.0], names(1), "y")
            .unwrap();
        assert!(model.predict(&array![[1.0, 2.0]]).is_err());
    }
}
