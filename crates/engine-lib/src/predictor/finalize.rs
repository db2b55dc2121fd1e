//! Turns a saving percentage into the full projection response

use super::features::FeaturePipeline;
use crate::error::EngineError;
use crate::models::{
    BuildingRequest, ContextEcho, Kpi, KpiAssumptions, KpiOverrides, PredictionResult,
    PredictionSource, RecommendationLabel, Variant,
};

pub const SCHEMA_VERSION: &str = "1.0";

/// Payback reported when the yearly cost saving is not positive
pub const PAYBACK_SENTINEL_YEARS: f64 = 99.0;

/// Years projected after the first year when no end year is given
const DEFAULT_HORIZON_YEARS: i32 = 10;

/// Longest span served after the first year; later end years are cut off
pub const MAX_HORIZON_YEARS: i32 = 50;

/// Inclusive projection horizon.
///
/// Missing start: `current_year`. Missing end: start + 10. Reversed bounds are swapped.
pub fn projection_years(from: Option<i32>, to: Option<i32>, current_year: i32) -> Vec<i32> {
    projection_horizon(from, to, current_year).0
}

/// Like [`projection_years`], also reporting when the span was cut to
/// [`MAX_HORIZON_YEARS`] (surfaced as `DEFAULTED:yearsTo`).
pub fn projection_horizon(
    from: Option<i32>,
    to: Option<i32>,
    current_year: i32,
) -> (Vec<i32>, Option<EngineError>) {
    let start = from.unwrap_or(current_year);
    let end = to.unwrap_or_else(|| start.saturating_add(DEFAULT_HORIZON_YEARS));
    let (lo, hi) = if end < start { (end, start) } else { (start, end) };
    let last = lo.saturating_add(MAX_HORIZON_YEARS);
    if hi > last {
        let notice = EngineError::FeatureDerivation { field: "yearsTo" };
        ((lo..=last).collect(), Some(notice))
    } else {
        ((lo..=hi).collect(), None)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssumptionDefaults {
    pub tariff_per_kwh: f64,
    pub escalation_rate: f64,
    pub capex_per_m2: f64,
}

impl Default for AssumptionDefaults {
    fn default() -> Self {
        Self {
            tariff_per_kwh: 130.0,
            escalation_rate: 0.03,
            capex_per_m2: 200_000.0,
        }
    }
}

impl AssumptionDefaults {
    /// Overrides win when finite
    pub fn apply(&self, overrides: &KpiOverrides) -> KpiAssumptions {
        let pick = |v: Option<f64>, default: f64| v.filter(|x| x.is_finite()).unwrap_or(default);
        KpiAssumptions {
            tariff_per_kwh: pick(overrides.tariff_per_kwh, self.tariff_per_kwh),
            escalation_rate: pick(overrides.escalation_rate, self.escalation_rate),
            capex_per_m2: pick(overrides.capex_per_m2, self.capex_per_m2),
            discount_rate: overrides.discount_rate.filter(|x| x.is_finite()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabelThresholds {
    pub recommend_min_pct: f64,
    pub recommend_max_payback: f64,
    pub conditional_max_payback: f64,
}

impl Default for LabelThresholds {
    fn default() -> Self {
        Self {
            recommend_min_pct: 15.0,
            recommend_max_payback: 5.0,
            conditional_max_payback: 8.0,
        }
    }
}

impl LabelThresholds {
    pub fn classify(&self, saving_pct: f64, payback_years: f64) -> RecommendationLabel {
        if saving_pct >= self.recommend_min_pct && payback_years <= self.recommend_max_payback {
            RecommendationLabel::Recommend
        } else if payback_years <= self.conditional_max_payback {
            RecommendationLabel::Conditional
        } else {
            RecommendationLabel::NotRecommend
        }
    }
}

/// How the saving percentage was obtained
#[derive(Debug, Clone, PartialEq)]
pub struct Provenance {
    pub source: PredictionSource,
    pub variant: Variant,
    pub warnings: Vec<String>,
    pub model_version: String,
}

#[derive(Debug, Clone, Default)]
pub struct Finalizer {
    features: FeaturePipeline,
    assumptions: AssumptionDefaults,
    labels: LabelThresholds,
}

impl Finalizer {
    pub fn new(
        features: FeaturePipeline,
        assumptions: AssumptionDefaults,
        labels: LabelThresholds,
    ) -> Self {
        Self {
            features,
            assumptions,
            labels,
        }
    }

    /// Build the response for `saving_pct` over `years`.
    ///
    /// Pure: the same inputs always produce the same result. The physical
    /// saving is flat across the horizon while the unit price escalates.
    pub fn finalize(
        &self,
        req: &BuildingRequest,
        years: &[i32],
        saving_pct: f64,
        provenance: Provenance,
    ) -> PredictionResult {
        let saving_pct = saving_pct.clamp(0.0, 100.0);
        let assumptions = self.assumptions.apply(&req.assumptions);

        let baseline = self.features.baseline_kwh(req);
        let after = baseline * (1.0 - saving_pct / 100.0);
        let saving_kwh = baseline - after;

        let cost_saving_series: Vec<f64> = (0..years.len())
            .map(|i| {
                let tariff = assumptions.tariff_per_kwh
                    * (1.0 + assumptions.escalation_rate).powi(i as i32);
                round_to(saving_kwh * tariff, 2)
            })
            .collect();

        let floor = req.floor_area_m2.filter(|v| v.is_finite()).unwrap_or(0.0);
        let capex = if floor > 0.0 {
            floor * assumptions.capex_per_m2
        } else {
            0.0
        };
        let last_cost = cost_saving_series.last().copied().unwrap_or(0.0);
        let payback = if last_cost > 0.0 {
            capex / last_cost
        } else {
            PAYBACK_SENTINEL_YEARS
        };

        PredictionResult {
            schema_version: SCHEMA_VERSION.to_string(),
            model_version: provenance.model_version,
            years: years.to_vec(),
            after_series: vec![round_to(after, 4); years.len()],
            saving_series: vec![round_to(saving_kwh, 4); years.len()],
            cost_saving_series,
            kpi: Kpi {
                saving_pct: round_to(saving_pct, 4),
                saving_kwh_yr: round_to(saving_kwh, 4),
                saving_cost_yr: last_cost,
                payback_years: round_to(payback, 3),
                label: self.labels.classify(saving_pct, payback),
            },
            source: provenance.source,
            variant: provenance.variant,
            warnings: provenance.warnings,
            assumptions,
            context: ContextEcho {
                building_name: req.building_name.clone(),
                pnu: req.pnu.clone(),
                region: req.region.clone(),
            },
        }
    }
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
