//! Weighted combination of the two candidate predictions

use crate::error::{EngineError, EngineResult};
use crate::store::{Manifest, WeightPair};
use serde::{Deserialize, Serialize};

/// Guards the inverse of a perfect (zero) MAE
const MAE_EPSILON: f64 = 1e-9;

/// Where the effective weights came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightSource {
    Manifest,
    InverseError,
    Default,
}

/// Normalized ensemble weights; `w_a + w_b == 1`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnsembleWeights {
    #[serde(rename = "wA")]
    pub w_a: f64,
    #[serde(rename = "wB")]
    pub w_b: f64,
    pub source: WeightSource,
}

impl Default for EnsembleWeights {
    fn default() -> Self {
        Self {
            w_a: 0.5,
            w_b: 0.5,
            source: WeightSource::Default,
        }
    }
}

impl EnsembleWeights {
    /// Resolve weights: configured manifest pair, then the inverse-error
    /// suggestion, then 0.5/0.5. Unusable pairs are skipped.
    pub fn resolve(manifest: Option<&Manifest>) -> Self {
        let Some(section) = manifest.map(|m| &m.ensemble) else {
            return Self::default();
        };
        if let Some(w) = section.configured().and_then(|p| Self::normalized(p, WeightSource::Manifest)) {
            return w;
        }
        section
            .suggested_inverse_error_weights
            .and_then(|p| Self::normalized(p, WeightSource::InverseError))
            .unwrap_or_default()
    }

    /// Scale a pair so it sums to one; `None` for negative, non-finite or all-zero pairs
    pub fn normalized(pair: WeightPair, source: WeightSource) -> Option<Self> {
        let WeightPair { w_a, w_b } = pair;
        if !w_a.is_finite() || !w_b.is_finite() || w_a < 0.0 || w_b < 0.0 {
            return None;
        }
        let sum = w_a + w_b;
        if sum <= 0.0 {
            return None;
        }
        Some(Self {
            w_a: w_a / sum,
            w_b: w_b / sum,
            source,
        })
    }

    pub fn as_pair(&self) -> WeightPair {
        WeightPair {
            w_a: self.w_a,
            w_b: self.w_b,
        }
    }
}

/// Combines candidate A and B predictions
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EnsembleComposer {
    weights: EnsembleWeights,
}

impl EnsembleComposer {
    pub fn new(weights: EnsembleWeights) -> Self {
        Self { weights }
    }

    pub fn from_manifest(manifest: Option<&Manifest>) -> Self {
        Self::new(EnsembleWeights::resolve(manifest))
    }

    pub fn weights(&self) -> EnsembleWeights {
        self.weights
    }

    /// Inverse-error weights `1/MAE_A : 1/MAE_B`, normalized
    pub fn inverse_error_weights(mae_a: f64, mae_b: f64) -> Option<WeightPair> {
        if !mae_a.is_finite() || !mae_b.is_finite() || mae_a < 0.0 || mae_b < 0.0 {
            return None;
        }
        let inv_a = 1.0 / mae_a.max(MAE_EPSILON);
        let inv_b = 1.0 / mae_b.max(MAE_EPSILON);
        let sum = inv_a + inv_b;
        Some(WeightPair {
            w_a: inv_a / sum,
            w_b: inv_b / sum,
        })
    }

    /// Both present: clamped weighted sum. One present: passed through.
    pub fn combine(&self, pred_a: Option<f64>, pred_b: Option<f64>) -> EngineResult<f64> {
        match (pred_a, pred_b) {
            (Some(a), Some(b)) => Ok((self.weights.w_a * a + self.weights.w_b * b).clamp(0.0, 100.0)),
            (Some(single), None) | (None, Some(single)) => Ok(single),
            (None, None) => Err(EngineError::EnsembleUnavailable),
        }
    }

    /// Element-wise combination of two complete prediction series
    pub fn combine_series(&self, pred_a: &[f64], pred_b: &[f64]) -> Vec<f64> {
        pred_a
            .iter()
            .zip(pred_b)
            .map(|(a, b)| (self.weights.w_a * a + self.weights.w_b * b).clamp(0.0, 100.0))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::EnsembleSection;

    fn section(w_a: Option<f64>, w_b: Option<f64>, suggested: Option<WeightPair>) -> EnsembleSection {
        EnsembleSection {
            w_a,
            w_b,
            suggested_inverse_error_weights: suggested,
            scores: None,
        }
    }

    fn manifest_with(section: EnsembleSection) -> Manifest {
        serde_json::from_value(serde_json::json!({
            "version": "2025-01-01T00:00:00Z",
            "features": crate::models::FeatureVector::columns(),
            "split": {"testFraction": 0.2, "seed": 42},
            "kfold": {"k": 5, "seed": 42, "shuffled": true},
            "perModel": {},
            "best": {"selectedKey": "A", "selectionMetric": "test_mae"},
            "ensemble": section,
        }))
        .unwrap()
    }

    #[test]
    fn test_resolution_order() {
        let suggested = Some(WeightPair { w_a: 0.3, w_b: 0.7 });

        let m = manifest_with(section(Some(0.6), Some(0.4), suggested));
        let w = EnsembleWeights::resolve(Some(&m));
        assert_eq!(w.source, WeightSource::Manifest);
        assert!((w.w_a - 0.6).abs() < 1e-12);

        let m = manifest_with(section(None, None, suggested));
        let w = EnsembleWeights::resolve(Some(&m));
        assert_eq!(w.source, WeightSource::InverseError);
        assert!((w.w_b - 0.7).abs() < 1e-12);

        let m = manifest_with(section(None, None, None));
        assert_eq!(EnsembleWeights::resolve(Some(&m)), EnsembleWeights::default());
        assert_eq!(EnsembleWeights::resolve(None), EnsembleWeights::default());
    }

    #[test]
    fn test_unnormalized_manifest_weights_are_scaled() {
        let m = manifest_with(section(Some(3.0), Some(1.0), None));
        let w = EnsembleWeights::resolve(Some(&m));
        assert!((w.w_a - 0.75).abs() < 1e-12);
        assert!((w.w_a + w.w_b - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_manifest_weights_fall_through() {
        let suggested = Some(WeightPair { w_a: 0.2, w_b: 0.8 });
        let m = manifest_with(section(Some(-1.0), Some(2.0), suggested));
        assert_eq!(EnsembleWeights::resolve(Some(&m)).source, WeightSource::InverseError);

        let m = manifest_with(section(Some(0.0), Some(0.0), None));
        assert_eq!(EnsembleWeights::resolve(Some(&m)).source, WeightSource::Default);
    }

    #[test]
    fn test_inverse_error_weights() {
        let w = EnsembleComposer::inverse_error_weights(1.0, 3.0).unwrap();
        assert!((w.w_a - 0.75).abs() < 1e-12);
        assert!((w.w_a + w.w_b - 1.0).abs() < 1e-12);

        let perfect = EnsembleComposer::inverse_error_weights(0.0, 2.0).unwrap();
        assert!(perfect.w_a > 0.999_999);
        assert!(EnsembleComposer::inverse_error_weights(f64::NAN, 1.0).is_none());
    }

    #[test]
    fn test_combine() {
        let composer = EnsembleComposer::new(
            EnsembleWeights::normalized(WeightPair { w_a: 0.6, w_b: 0.4 }, WeightSource::Manifest)
                .unwrap(),
        );
        assert!((composer.combine(Some(10.0), Some(20.0)).unwrap() - 14.0).abs() < 1e-9);
        assert_eq!(composer.combine(Some(150.0), Some(120.0)).unwrap(), 100.0);
        assert_eq!(composer.combine(Some(-5.0), Some(-1.0)).unwrap(), 0.0);
        assert_eq!(composer.combine(Some(12.5), None).unwrap(), 12.5);
        assert_eq!(composer.combine(None, Some(7.0)).unwrap(), 7.0);
        assert!(matches!(
            composer.combine(None, None),
            Err(EngineError::EnsembleUnavailable)
        ));
    }

    #[test]
    fn test_combine_series() {
        let composer = EnsembleComposer::default();
        assert_eq!(composer.combine_series(&[10.0, 0.0], &[20.0, 4.0]), vec![15.0, 2.0]);
    }
}
