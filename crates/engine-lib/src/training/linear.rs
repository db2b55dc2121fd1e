//! Elastic-net linear regression fitted by cyclic coordinate descent
//!
//! Objective (per sample):
//! `1/(2n) * ||y - Xw - b||² + alpha * l1_ratio * ||w||₁ + 0.5 * alpha * (1 - l1_ratio) * ||w||²`

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq)]
pub struct ElasticNetConfig {
    pub alpha: f64,
    pub l1_ratio: f64,
    pub max_iter: usize,
    pub tol: f64,
}

impl Default for ElasticNetConfig {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            l1_ratio: 0.5,
            max_iter: 50_000,
            tol: 1e-4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElasticNet {
    pub coef: Vec<f64>,
    pub intercept: f64,
    pub n_iter: usize,
}

impl ElasticNet {
    pub fn fit(x: &[Vec<f64>], y: &[f64], config: &ElasticNetConfig) -> Result<Self> {
        if x.is_empty() || x.len() != y.len() {
            bail!(
                "elastic net needs matching non-empty inputs, got {} rows and {} targets",
                x.len(),
                y.len()
            );
        }
        if !(config.alpha >= 0.0) || !(0.0..=1.0).contains(&config.l1_ratio) {
            bail!(
                "invalid elastic net parameters alpha={} l1_ratio={}",
                config.alpha,
                config.l1_ratio
            );
        }

        let n = x.len();
        let p = x[0].len();
        let nf = n as f64;

        // Center columns and target so the intercept drops out of the updates
        let x_mean: Vec<f64> = (0..p)
            .map(|j| x.iter().map(|row| row[j]).sum::<f64>() / nf)
            .collect();
        let y_mean = y.iter().sum::<f64>() / nf;
        let xc: Vec<Vec<f64>> = (0..p)
            .map(|j| x.iter().map(|row| row[j] - x_mean[j]).collect())
            .collect();
        let col_sq: Vec<f64> = xc.iter().map(|c| c.iter().map(|v| v * v).sum::<f64>() / nf).collect();

        let l1 = config.alpha * config.l1_ratio;
        let l2 = config.alpha * (1.0 - config.l1_ratio);

        let mut w = vec![0.0; p];
        let mut residual: Vec<f64> = y.iter().map(|v| v - y_mean).collect();
        let mut n_iter = 0;

        for iter in 0..config.max_iter {
            n_iter = iter + 1;
            let mut max_delta = 0.0f64;
            let mut max_w = 0.0f64;

            for j in 0..p {
                let denom = col_sq[j] + l2;
                if denom == 0.0 {
                    continue;
                }
                let old = w[j];
                let rho = xc[j]
                    .iter()
                    .zip(residual.iter())
                    .map(|(xij, r)| xij * (r + xij * old))
                    .sum::<f64>()
                    / nf;
                let new = soft_threshold(rho, l1) / denom;
                if new != old {
                    let diff = new - old;
                    for (r, xij) in residual.iter_mut().zip(xc[j].iter()) {
                        *r -= xij * diff;
                    }
                    w[j] = new;
                }
                max_delta = max_delta.max((new - old).abs());
                max_w = max_w.max(new.abs());
            }

            if max_w == 0.0 || max_delta / max_w < config.tol {
                break;
            }
        }

        let intercept = y_mean - w.iter().zip(x_mean.iter()).map(|(w, m)| w * m).sum::<f64>();
        Ok(Self {
            coef: w,
            intercept,
            n_iter,
        })
    }

    pub fn predict(&self, row: &[f64]) -> f64 {
        self.intercept
            + self
                .coef
                .iter()
                .zip(row.iter())
                .map(|(w, x)| w * x)
                .sum::<f64>()
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

#[cfg(test)]
mod tests {
    use super::*;

    fn line(n: usize) -> (Vec<Vec<f64>>, Vec<f64>) {
        let x: Vec<Vec<f64>> = (0..n).map(|i| vec![i as f64 / n as f64, 1.0]).collect();
        let y = x.iter().map(|r| 3.0 * r[0] + 2.0).collect();
        (x, y)
    }

    #[test]
    fn test_small_penalty_recovers_line() {
        let (x, y) = line(50);
        let config = ElasticNetConfig {
            alpha: 1e-6,
            ..Default::default()
        };
        let model = ElasticNet::fit(&x, &y, &config).unwrap();
        assert!((model.coef[0] - 3.0).abs() < 1e-2, "coef {:?}", model.coef);
        assert!((model.predict(&[0.5, 1.0]) - 3.5).abs() < 1e-2);
    }

    #[test]
    fn test_large_l1_penalty_zeroes_weights() {
        let (x, y) = line(50);
        let config = ElasticNetConfig {
            alpha: 100.0,
            l1_ratio: 1.0,
            ..Default::default()
        };
        let model = ElasticNet::fit(&x, &y, &config).unwrap();
        assert!(model.coef.iter().all(|w| *w == 0.0));
        // Falls back to the target mean
        let mean = y.iter().sum::<f64>() / y.len() as f64;
        assert!((model.predict(&x[0]) - mean).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_bad_inputs() {
        assert!(ElasticNet::fit(&[], &[], &ElasticNetConfig::default()).is_err());
        let bad = ElasticNetConfig {
            l1_ratio: 1.5,
            ..Default::default()
        };
        assert!(ElasticNet::fit(&[vec![1.0]], &[1.0], &bad).is_err());
    }
}
