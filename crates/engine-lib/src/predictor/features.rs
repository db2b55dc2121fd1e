//! Feature derivation for training and inference
//!
//! Maps a raw [`BuildingRequest`] to the canonical [`FeatureVector`]. The
//! same pipeline is used when building training rows and when serving, so
//! the column set and order cannot drift between the two.

use crate::error::EngineError;
use crate::models::{BuildingRequest, BuildingType, FeatureVector};

/// Default energy-use intensity (kWh/m²/yr)
pub const DEFAULT_EUI_KWH_M2Y: f64 = 250.0;

/// Annual consumption assumed when floor area is unknown (kWh/yr)
pub const DEFAULT_ENERGY_KWH: f64 = 300_000.0;

/// Construction year assumed when none is supplied
pub const DEFAULT_BUILT_YEAR: i32 = 2000;

/// Substitution constants used by [`FeaturePipeline`]
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureDefaults {
    pub eui_kwh_m2y: f64,
    pub energy_kwh: f64,
    pub built_year: i32,
}

impl Default for FeatureDefaults {
    fn default() -> Self {
        Self {
            eui_kwh_m2y: DEFAULT_EUI_KWH_M2Y,
            energy_kwh: DEFAULT_ENERGY_KWH,
            built_year: DEFAULT_BUILT_YEAR,
        }
    }
}

/// Derives feature vectors from building records
#[derive(Debug, Clone, Default)]
pub struct FeaturePipeline {
    defaults: FeatureDefaults,
}

impl FeaturePipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults(defaults: FeatureDefaults) -> Self {
        Self { defaults }
    }

    pub fn defaults(&self) -> &FeatureDefaults {
        &self.defaults
    }

    /// Derive the feature vector, discarding substitution notices
    pub fn derive(&self, req: &BuildingRequest) -> FeatureVector {
        self.derive_with_notices(req).0
    }

    /// Derive the feature vector and report every field that was defaulted.
    ///
    /// Substitutions are never errors; each one is returned as a
    /// [`EngineError::FeatureDerivation`] so the caller can tag the response.
    pub fn derive_with_notices(&self, req: &BuildingRequest) -> (FeatureVector, Vec<EngineError>) {
        let mut notices = Vec::new();

        let (building_type, recognized) = BuildingType::normalize(req.building_type.as_deref());
        if !recognized {
            notices.push(EngineError::FeatureDerivation { field: "type" });
        }

        let floor_area_m2 = match req.floor_area_m2 {
            Some(v) if v.is_finite() => v,
            _ => {
                notices.push(EngineError::FeatureDerivation {
                    field: "floorAreaM2",
                });
                0.0
            }
        };

        let built_year = match req.built_year {
            Some(y) => y,
            None => {
                notices.push(EngineError::FeatureDerivation { field: "builtYear" });
                self.defaults.built_year
            }
        };

        let explicit = usable(req.energy_kwh).or_else(|| usable(req.baseline_kwh));
        let malformed = [req.energy_kwh, req.baseline_kwh]
            .iter()
            .flatten()
            .any(|v| !v.is_finite() || *v < 0.0);
        if explicit.is_none() && malformed {
            notices.push(EngineError::FeatureDerivation { field: "energy_kwh" });
        }
        let energy_kwh = explicit.unwrap_or_else(|| self.estimated_energy(floor_area_m2));

        let eui_kwh_m2y = if floor_area_m2 > 0.0 {
            energy_kwh / floor_area_m2
        } else {
            self.defaults.eui_kwh_m2y
        };

        (
            FeatureVector {
                building_type,
                floor_area_m2,
                built_year,
                energy_kwh,
                eui_kwh_m2y,
            },
            notices,
        )
    }

    /// Baseline consumption for a request, following the same priority as
    /// [`Self::derive`]: measured energy, then baseline, then an estimate.
    pub fn baseline_kwh(&self, req: &BuildingRequest) -> f64 {
        usable(req.energy_kwh)
            .or_else(|| usable(req.baseline_kwh))
            .unwrap_or_else(|| {
                let floor = req.floor_area_m2.filter(|v| v.is_finite()).unwrap_or(0.0);
                self.estimated_energy(floor)
            })
    }

    fn estimated_energy(&self, floor_area_m2: f64) -> f64 {
        if floor_area_m2 > 0.0 {
            floor_area_m2 * self.defaults.eui_kwh_m2y
        } else {
            self.defaults.energy_kwh
        }
    }
}

fn usable(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v > 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_energy_from_explicit_value() {
        let mut req = BuildingRequest::new("office", 1000.0, 1995);
        req.energy_kwh = Some(180_000.0);
        req.baseline_kwh = Some(999.0);
        let fv = FeaturePipeline::new().derive(&req);
        assert_eq!(fv.energy_kwh, 180_000.0);
        assert_eq!(fv.eui_kwh_m2y, 180.0);
    }

    #[test]
    fn test_energy_from_baseline() {
        let mut req = BuildingRequest::new("school", 2000.0, 2010);
        req.baseline_kwh = Some(400_000.0);
        let fv = FeaturePipeline::new().derive(&req);
        assert_eq!(fv.energy_kwh, 400_000.0);
        assert_eq!(fv.eui_kwh_m2y, 200.0);
    }

    #[test]
    fn test_energy_estimated_from_floor_area() {
        let req = BuildingRequest::new("office", 1000.0, 1995);
        let (fv, notices) = FeaturePipeline::new().derive_with_notices(&req);
        assert_eq!(fv.energy_kwh, 250_000.0);
        assert_eq!(fv.eui_kwh_m2y, DEFAULT_EUI_KWH_M2Y);
        assert!(notices.is_empty());
    }

    #[test]
    fn test_zero_floor_area_uses_absolute_default() {
        let req = BuildingRequest::new("factory", 0.0, 1990);
        let fv = FeaturePipeline::new().derive(&req);
        assert_eq!(fv.energy_kwh, DEFAULT_ENERGY_KWH);
        assert_eq!(fv.eui_kwh_m2y, DEFAULT_EUI_KWH_M2Y);
    }

    #[test]
    fn test_unknown_type_and_missing_fields_are_reported() {
        let req = BuildingRequest {
            building_type: Some("warehouse".to_string()),
            floor_area_m2: Some(f64::NAN),
            ..Default::default()
        };
        let (fv, notices) = FeaturePipeline::new().derive_with_notices(&req);
        assert_eq!(fv.building_type, BuildingType::DEFAULT);
        assert_eq!(fv.built_year, DEFAULT_BUILT_YEAR);
        assert_eq!(fv.floor_area_m2, 0.0);

        let tags: Vec<String> = notices.iter().flat_map(|n| n.warning_tags()).collect();
        assert_eq!(
            tags,
            vec!["DEFAULTED:type", "DEFAULTED:floorAreaM2", "DEFAULTED:builtYear"]
        );
    }

    #[test]
    fn test_negative_energy_is_replaced() {
        let mut req = BuildingRequest::new("office", 100.0, 2000);
        req.energy_kwh = Some(-5.0);
        let (fv, notices) = FeaturePipeline::new().derive_with_notices(&req);
        assert_eq!(fv.energy_kwh, 25_000.0);
        assert_eq!(notices.len(), 1);
    }

    #[test]
    fn test_baseline_matches_derived_energy() {
        let pipeline = FeaturePipeline::new();
        for req in [
            BuildingRequest::new("office", 1000.0, 1995),
            BuildingRequest::new("office", -1.0, 1995),
            BuildingRequest {
                baseline_kwh: Some(12_345.0),
                ..BuildingRequest::new("hospital", 10.0, 1980)
            },
        ] {
            assert_eq!(pipeline.baseline_kwh(&req), pipeline.derive(&req).energy_kwh);
        }
    }
}
