//! Generation manifest document

use crate::training::{CvMetrics, HyperParams, Metrics};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitInfo {
    pub test_fraction: f64,
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KFoldInfo {
    pub k: usize,
    pub seed: u64,
    pub shuffled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelReport {
    pub family: String,
    pub best_hyperparams: HyperParams,
    pub cv_metrics: CvMetrics,
    pub train_metrics: Metrics,
    pub test_metrics: Metrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BestSelection {
    pub selected_key: String,
    pub selection_metric: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightPair {
    #[serde(rename = "wA")]
    pub w_a: f64,
    #[serde(rename = "wB")]
    pub w_b: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleScores {
    pub train: Metrics,
    pub test: Metrics,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnsembleSection {
    /// Operator-configured weights; take precedence over the suggestion
    #[serde(rename = "wA", default)]
    pub w_a: Option<f64>,
    #[serde(rename = "wB", default)]
    pub w_b: Option<f64>,
    #[serde(default)]
    pub suggested_inverse_error_weights: Option<WeightPair>,
    #[serde(default)]
    pub scores: Option<EnsembleScores>,
}

impl EnsembleSection {
    pub fn configured(&self) -> Option<WeightPair> {
        Some(WeightPair {
            w_a: self.w_a?,
            w_b: self.w_b?,
        })
    }
}

/// Metadata for one artifact generation; replaced wholesale on every publish
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub version: DateTime<Utc>,
    pub features: Vec<String>,
    pub split: SplitInfo,
    pub kfold: KFoldInfo,
    pub per_model: BTreeMap<String, ModelReport>,
    pub best: BestSelection,
    pub ensemble: EnsembleSection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    /// SHA-256 of each pipeline file, keyed by file name
    #[serde(default)]
    pub checksums: BTreeMap<String, String>,
}

impl Manifest {
    /// Version label used in responses and metrics
    pub fn version_label(&self) -> String {
        self.version.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
    }

    /// Next version strictly after `previous`, normally the current time
    pub fn next_version(previous: Option<DateTime<Utc>>) -> DateTime<Utc> {
        let now = Utc::now();
        match previous {
            Some(prev) if now <= prev => prev + Duration::milliseconds(1),
            _ => now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensemble_field_names() {
        let section = EnsembleSection {
            w_a: Some(0.6),
            w_b: Some(0.4),
            suggested_inverse_error_weights: Some(WeightPair { w_a: 0.3, w_b: 0.7 }),
            scores: None,
        };
        let json = serde_json::to_value(&section).unwrap();
        assert_eq!(json["wA"], 0.6);
        assert_eq!(json["suggestedInverseErrorWeights"]["wB"], 0.7);
        assert_eq!(section.configured(), Some(WeightPair { w_a: 0.6, w_b: 0.4 }));
    }

    #[test]
    fn test_missing_weights_deserialize_as_none() {
        let section: EnsembleSection = serde_json::from_str("{}").unwrap();
        assert!(section.configured().is_none());
    }

    #[test]
    fn test_version_is_monotonic() {
        let future = Utc::now() + Duration::seconds(60);
        let next = Manifest::next_version(Some(future));
        assert!(next > future);
        let fresh = Manifest::next_version(None);
        assert!(fresh <= Utc::now());
    }
}
