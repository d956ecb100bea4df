//! Regression metrics.

use crate::error::MlError;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Scores written to the metrics file and logged with the tracker run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    pub rmse: f64,
    pub mae: f64,
    pub r2: f64,
}

impl RegressionMetrics {
    /// Score `predicted` against `actual`.
    ///
    /// A constant `actual` has no variance to explain; R² is then 1.0 for a
    /// perfect fit and 0.0 otherwise, so every field stays finite.
    pub fn compute(actual: &Array1<f64>, predicted: &Array1<f64>) -> Result<Self, MlError> {
        if actual.is_empty() {
            return Err(MlError::evaluation("cannot score an empty test set"));
        }
        if actual.len() != predicted.len() {
            return Err(MlError::evaluation(format!(
                "{} actual values but {} predictions",
                actual.len(),
                predicted.len()
            )));
        }

        let n = actual.len() as f64;
        let errors = actual - predicted;
        let ss_res = errors.mapv(|e| e * e).sum();
        let rmse = (ss_res / n).sqrt();
        let mae = errors.mapv(f64::abs).sum() / n;

        let mean = actual.sum() / n;
        let ss_tot = actual.mapv(|v| (v - mean).powi(2)).sum();
        let r2 = if ss_tot == 0.0 {
            if ss_res == 0.0 { 1.0 } else { 0.0 }
        } else {
            1.0 - ss_res / ss_tot
        };

        let metrics = Self { rmse, mae, r2 };
        if !metrics.is_finite() {
            return Err(MlError::evaluation(format!(
                "metrics are not finite: {metrics:?}"
            )));
        }
        Ok(metrics)
    }

    pub fn is_finite(&self) -> bool {
        self.rmse.is_finite() && self.mae.is_finite() && self.r2.is_finite()
    }

    /// Metric name -> value, in the form trackers log them.
    pub fn to_metric_map(&self) -> BTreeMap<String, f64> {
        BTreeMap::from([
            ("rmse".to_string(), self.rmse),
            ("mae".to_string(), self.mae),
            ("r2".to_string(), self.r2),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_perfect_prediction() {
        let y = array![1.0, 2.0, 3.0];
        let m = RegressionMetrics::compute(&y, &y).unwrap();
        assert_eq!(m.rmse, 0.0);
        assert_eq!(m.mae, 0.0);
        assert_eq!(m.r2, 1.0);
    }

    #[test]
    fn test_known_values() {
        let actual = array![3.0, -0.5, 2.0, 7.0];
        let predicted = array![2.5, 0.0, 2.0, 8.0];
        let m = RegressionMetrics::compute(&actual, &predicted).unwrap();
        // MSE = (0.25 + 0.25 + 0 + 1) / 4 = 0.375
        assert!((m.rmse - 0.375f64.sqrt()).abs() < 1e-12);
        assert!((m.mae - 0.5).abs() < 1e-12);
        assert!((m.r2 - 0.948_608_137_044_967_9).abs() < 1e-9);
    }

    #[test]
    fn test_mean_predictor_scores_zero_r2() {
        let actual = array![1.0, 2.0, 3.0, 4.0];
        let predicted = array![2.5, 2.5, 2.5, 2.5];
        let m = RegressionMetrics::compute(&actual, &predicted).unwrap();
        assert!(m.r2.abs() < 1e-12);
    }

    #[test]
    fn test_constant_target_stays_finite() {
        let actual = array![5.0, 5.0, 5.0];
        let m = RegressionMetrics::compute(&actual, &array![4.0, 5.0, 6.0]).unwrap();
        assert_eq!(m.r2, 0.0);
        assert!(m.is_finite());
        let m = RegressionMetrics::compute(&actual, &actual).unwrap();
        assert_eq!(m.r2, 1.0);
    }

    #[test]
    fn test_rejects_empty_and_mismatched() {
        let empty = Array1::<f64>::zeros(0);
        assert!(RegressionMetrics::compute(&empty, &empty).is_err());
        assert!(RegressionMetrics::compute(&array![1.0], &array![1.0, 2.0]).is_err());
    }

    #[test]
    fn test_non_finite_prediction_is_error() {
        let err = RegressionMetrics::compute(&array![1.0, 2.0], &array![f64::NAN, 2.0]);
        assert!(matches!(err, Err(MlError::Evaluation(_))));
    }

    #[test]
    fn test_metric_map_keys() {
        let m = RegressionMetrics {
            rmse: 1.0,
            mae: 0.5,
            r2: 0.9,
        };
        let keys: Vec<_> = m.to_metric_map().into_keys().collect();
        assert_eq!(keys, vec!["mae", "r2", "rmse"]);
    }
}
