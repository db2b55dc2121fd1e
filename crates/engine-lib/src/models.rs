//! Core data models shared by training and serving

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Trained candidate families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Candidate {
    /// Regularized linear regressor (interpretable)
    A,
    /// Tree-ensemble regressor (nonlinear)
    B,
}

impl Candidate {
    pub const ALL: [Candidate; 2] = [Candidate::A, Candidate::B];

    pub fn key(&self) -> &'static str {
        match self {
            Candidate::A => "A",
            Candidate::B => "B",
        }
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Requested prediction variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Variant {
    A,
    B,
    /// Weighted ensemble of A and B
    #[default]
    C,
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::A => f.write_str("A"),
            Variant::B => f.write_str("B"),
            Variant::C => f.write_str("C"),
        }
    }
}

impl FromStr for Variant {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(Variant::A),
            "B" => Ok(Variant::B),
            "C" | "" => Ok(Variant::C),
            other => Err(EngineError::InvalidRequest(format!(
                "unknown variant '{}', expected A, B or C",
                other
            ))),
        }
    }
}

/// Building use category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildingType {
    Factory,
    Hospital,
    School,
    Office,
    Other,
}

impl BuildingType {
    /// Fixed one-hot order used by every fitted pipeline
    pub const ALL: [BuildingType; 5] = [
        BuildingType::Factory,
        BuildingType::Hospital,
        BuildingType::School,
        BuildingType::Office,
        BuildingType::Other,
    ];

    /// Category used for unknown or missing values
    pub const DEFAULT: BuildingType = BuildingType::Other;

    pub fn as_str(&self) -> &'static str {
        match self {
            BuildingType::Factory => "factory",
            BuildingType::Hospital => "hospital",
            BuildingType::School => "school",
            BuildingType::Office => "office",
            BuildingType::Other => "other",
        }
    }

    /// Lenient parse; anything unrecognized maps to [`BuildingType::DEFAULT`]
    pub fn normalize(raw: Option<&str>) -> (BuildingType, bool) {
        let Some(raw) = raw else {
            return (Self::DEFAULT, false);
        };
        match raw.trim().to_ascii_lowercase().as_str() {
            "factory" => (BuildingType::Factory, true),
            "hospital" => (BuildingType::Hospital, true),
            "school" => (BuildingType::School, true),
            "office" => (BuildingType::Office, true),
            "other" => (BuildingType::Other, true),
            _ => (Self::DEFAULT, false),
        }
    }
}

impl fmt::Display for BuildingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional KPI assumption overrides carried by a request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiOverrides {
    /// Unit electricity tariff (currency units per kWh)
    #[serde(default, alias = "tariffKrwPerKwh", skip_serializing_if = "Option::is_none")]
    pub tariff_per_kwh: Option<f64>,
    /// Yearly tariff escalation as a fraction (0.03 = 3 %)
    #[serde(
        default,
        alias = "electricityEscalationPctPerYear",
        skip_serializing_if = "Option::is_none"
    )]
    pub escalation_rate: Option<f64>,
    /// Capital expenditure per square metre
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capex_per_m2: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount_rate: Option<f64>,
}

/// Building record received at the serving boundary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildingRequest {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub building_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub floor_area_m2: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub built_year: Option<i32>,
    /// Measured annual consumption (kWh/yr)
    #[serde(default, alias = "energy_kwh", skip_serializing_if = "Option::is_none")]
    pub energy_kwh: Option<f64>,
    /// Baseline consumption used when no measurement exists (kWh/yr)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline_kwh: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub years_from: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub years_to: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub building_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pnu: Option<String>,
    #[serde(flatten)]
    pub assumptions: KpiOverrides,
}

impl BuildingRequest {
    pub fn new(building_type: &str, floor_area_m2: f64, built_year: i32) -> Self {
        Self {
            building_type: Some(building_type.to_string()),
            floor_area_m2: Some(floor_area_m2),
            built_year: Some(built_year),
            ..Default::default()
        }
    }
}

/// Canonical model input, identical at training and inference time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureVector {
    #[serde(rename = "type")]
    pub building_type: BuildingType,
    pub floor_area_m2: f64,
    pub built_year: i32,
    pub energy_kwh: f64,
    pub eui_kwh_m2y: f64,
}

impl FeatureVector {
    /// Column names in model order
    pub const COLUMNS: [&'static str; 5] =
        ["type", "floorAreaM2", "builtYear", "energy_kwh", "eui_kwh_m2y"];

    /// Categorical columns (subset of [`Self::COLUMNS`])
    pub const CATEGORICAL: [&'static str; 1] = ["type"];

    pub fn columns() -> Vec<String> {
        Self::COLUMNS.iter().map(|c| c.to_string()).collect()
    }

    /// Numeric value of a named column, `None` for categorical or unknown names
    pub fn numeric(&self, column: &str) -> Option<f64> {
        match column {
            "floorAreaM2" => Some(self.floor_area_m2),
            "builtYear" => Some(self.built_year as f64),
            "energy_kwh" => Some(self.energy_kwh),
            "eui_kwh_m2y" => Some(self.eui_kwh_m2y),
            _ => None,
        }
    }

    pub fn category(&self, column: &str) -> Option<BuildingType> {
        match column {
            "type" => Some(self.building_type),
            _ => None,
        }
    }
}

/// One labelled training row
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingRecord {
    pub features: FeatureVector,
    pub target: f64,
}

/// Where a saving percentage came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PredictionSource {
    Ml,
    RuleFallback,
}

impl PredictionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PredictionSource::Ml => "ML",
            PredictionSource::RuleFallback => "RULE_FALLBACK",
        }
    }
}

/// Investment recommendation label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecommendationLabel {
    Recommend,
    Conditional,
    NotRecommend,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Kpi {
    pub saving_pct: f64,
    pub saving_kwh_yr: f64,
    /// Cost saving in the last projected year
    pub saving_cost_yr: f64,
    pub payback_years: f64,
    pub label: RecommendationLabel,
}

/// Effective KPI assumptions after applying defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiAssumptions {
    pub tariff_per_kwh: f64,
    pub escalation_rate: f64,
    pub capex_per_m2: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_rate: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextEcho {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub building_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pnu: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

/// Full prediction response, built fresh for each request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionResult {
    pub schema_version: String,
    pub model_version: String,
    pub years: Vec<i32>,
    pub after_series: Vec<f64>,
    pub saving_series: Vec<f64>,
    pub cost_saving_series: Vec<f64>,
    pub kpi: Kpi,
    pub source: PredictionSource,
    pub variant: Variant,
    pub warnings: Vec<String>,
    pub assumptions: KpiAssumptions,
    pub context: ContextEcho,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_parse() {
        assert_eq!("a".parse::<Variant>().unwrap(), Variant::A);
        assert_eq!(" C ".parse::<Variant>().unwrap(), Variant::C);
        assert!("D".parse::<Variant>().is_err());
    }

    #[test]
    fn test_building_type_normalization() {
        assert_eq!(
            BuildingType::normalize(Some("Office")),
            (BuildingType::Office, true)
        );
        assert_eq!(
            BuildingType::normalize(Some("warehouse")),
            (BuildingType::DEFAULT, false)
        );
        assert_eq!(BuildingType::normalize(None).0, BuildingType::DEFAULT);
    }

    #[test]
    fn test_request_accepts_legacy_names() {
        let json = r#"{
            "type": "office",
            "floorAreaM2": 1000,
            "builtYear": 1995,
            "energy_kwh": 200000,
            "tariffKrwPerKwh": 140,
            "electricityEscalationPctPerYear": 0.02
        }"#;
        let req: BuildingRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.energy_kwh, Some(200_000.0));
        assert_eq!(req.assumptions.tariff_per_kwh, Some(140.0));
        assert_eq!(req.assumptions.escalation_rate, Some(0.02));
    }

    #[test]
    fn test_request_rejects_non_numeric_area() {
        let json = r#"{"type": "office", "floorAreaM2": "big"}"#;
        assert!(serde_json::from_str::<BuildingRequest>(json).is_err());
    }

    #[test]
    fn test_source_serialization() {
        assert_eq!(
            serde_json::to_string(&PredictionSource::RuleFallback).unwrap(),
            "\"RULE_FALLBACK\""
        );
        assert_eq!(
            serde_json::to_string(&PredictionSource::Ml).unwrap(),
            "\"ML\""
        );
    }

    #[test]
    fn test_feature_columns_cover_every_field() {
        let fv = FeatureVector {
            building_type: BuildingType::School,
            floor_area_m2: 10.0,
            built_year: 2000,
            energy_kwh: 2500.0,
            eui_kwh_m2y: 250.0,
        };
        for column in FeatureVector::COLUMNS {
            let categorical = FeatureVector::CATEGORICAL.contains(&column);
            assert_eq!(fv.category(column).is_some(), categorical, "{}", column);
            assert_eq!(fv.numeric(column).is_some(), !categorical, "{}", column);
        }
    }
}
