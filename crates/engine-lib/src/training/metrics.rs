//! Regression metrics and cross-validation aggregates

use serde::{Deserialize, Serialize};

/// Point metrics for one set of predictions
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub mae: f64,
    pub rmse: f64,
    pub r2: f64,
}

impl Metrics {
    /// Compute MAE, RMSE and R² for paired observations
    pub fn compute(y_true: &[f64], y_pred: &[f64]) -> Self {
        let n = y_true.len().min(y_pred.len());
        if n == 0 {
            return Self {
                mae: 0.0,
                rmse: 0.0,
                r2: 0.0,
            };
        }
        let nf = n as f64;

        let mut abs_sum = 0.0;
        let mut sq_sum = 0.0;
        for (t, p) in y_true.iter().zip(y_pred.iter()) {
            let err = t - p;
            abs_sum += err.abs();
            sq_sum += err * err;
        }

        let mean = y_true[..n].iter().sum::<f64>() / nf;
        let ss_tot: f64 = y_true[..n].iter().map(|t| (t - mean).powi(2)).sum();
        // Constant targets: perfect fit scores 1, anything else 0
        let r2 = if ss_tot > 0.0 {
            1.0 - sq_sum / ss_tot
        } else if sq_sum == 0.0 {
            1.0
        } else {
            0.0
        };

        Self {
            mae: abs_sum / nf,
            rmse: (sq_sum / nf).sqrt(),
            r2,
        }
    }
}

/// Mean and population standard deviation across folds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub mean: f64,
    pub std: f64,
}

impl MetricSummary {
    pub fn of(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self { mean: 0.0, std: 0.0 };
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        Self {
            mean,
            std: var.sqrt(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CvMetrics {
    pub folds: usize,
    pub mae: MetricSummary,
    pub rmse: MetricSummary,
    pub r2: MetricSummary,
}

impl CvMetrics {
    pub fn aggregate(per_fold: &[Metrics]) -> Self {
        let collect = |f: fn(&Metrics) -> f64| per_fold.iter().map(f).collect::<Vec<_>>();
        Self {
            folds: per_fold.len(),
            mae: MetricSummary::of(&collect(|m| m.mae)),
            rmse: MetricSummary::of(&collect(|m| m.rmse)),
            r2: MetricSummary::of(&collect(|m| m.r2)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_predictions() {
        let y = vec![1.0, 2.0, 3.0];
        let m = Metrics::compute(&y, &y);
        assert_eq!(m.mae, 0.0);
        assert_eq!(m.rmse, 0.0);
        assert_eq!(m.r2, 1.0);
    }

    #[test]
    fn test_known_errors() {
        let m = Metrics::compute(&[1.0, 2.0, 3.0, 4.0], &[2.0, 2.0, 3.0, 2.0]);
        assert!((m.mae - 0.75).abs() < 1e-12);
        assert!((m.rmse - (5.0f64 / 4.0).sqrt()).abs() < 1e-12);
        // ss_tot = 5, ss_res = 5
        assert!(m.r2.abs() < 1e-12);
    }

    #[test]
    fn test_summary_uses_population_std() {
        let s = MetricSummary::of(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert_eq!(s.mean, 5.0);
        assert_eq!(s.std, 2.0);
    }

    #[test]
    fn test_aggregate_counts_folds() {
        let folds = [
            Metrics { mae: 1.0, rmse: 2.0, r2: 0.5 },
            Metrics { mae: 3.0, rmse: 4.0, r2: 0.7 },
        ];
        let cv = CvMetrics::aggregate(&folds);
        assert_eq!(cv.folds, 2);
        assert_eq!(cv.mae.mean, 2.0);
        assert_eq!(cv.mae.std, 1.0);
        assert!((cv.r2.mean - 0.6).abs() < 1e-12);
    }
}
