//! Ordered fallback chain for a single prediction
//!
//! Each [`Step`] either yields a saving percentage or fails with an
//! [`EngineError`]; failures become warning tags and the next step runs.
//! The chain always ends in [`Step::Rule`], which cannot fail.

use super::ensemble::EnsembleComposer;
use super::SavingModel;
use crate::error::{EngineError, EngineResult};
use crate::models::{BuildingRequest, Candidate, FeatureVector, PredictionSource, Variant};
use std::cell::OnceCell;
use tracing::debug;

/// Constants of the rule-based estimator
#[derive(Debug, Clone, PartialEq)]
pub struct RulePolicy {
    pub base_pct: f64,
    /// Floor area above which the large-building bonus applies (m²)
    pub large_floor_threshold_m2: f64,
    pub large_floor_bonus: f64,
    pub small_floor_bonus: f64,
    /// Percentage points per year of building age
    pub age_rate: f64,
    pub reference_year: i32,
    pub min_pct: f64,
    pub max_pct: f64,
    pub default_built_year: i32,
    pub default_floor_area_m2: f64,
}

impl Default for RulePolicy {
    fn default() -> Self {
        Self {
            base_pct: 10.0,
            large_floor_threshold_m2: 1000.0,
            large_floor_bonus: 5.0,
            small_floor_bonus: 3.0,
            age_rate: 0.15,
            reference_year: 2025,
            min_pct: 5.0,
            max_pct: 30.0,
            default_built_year: 2000,
            default_floor_area_m2: 1000.0,
        }
    }
}

impl RulePolicy {
    /// `clamp(base + sizeBonus + ageBonus, min, max)`
    pub fn estimate(&self, req: &BuildingRequest) -> f64 {
        let built = req.built_year.unwrap_or(self.default_built_year);
        let floor = req
            .floor_area_m2
            .filter(|v| v.is_finite())
            .unwrap_or(self.default_floor_area_m2);

        let size_bonus = if floor > self.large_floor_threshold_m2 {
            self.large_floor_bonus
        } else {
            self.small_floor_bonus
        };
        let age = self.reference_year.saturating_sub(built).max(0) as f64;
        (self.base_pct + size_bonus + age * self.age_rate).clamp(self.min_pct, self.max_pct)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// One trained candidate
    Single(Candidate),
    /// Weighted combination; fails unless both candidates succeed
    Ensemble,
    /// The single surviving candidate of a failed ensemble
    PartialEnsemble,
    /// Rule-based heuristic
    Rule,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChainOutcome {
    pub saving_pct: f64,
    pub source: PredictionSource,
    pub step: Step,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct FallbackChain {
    steps: Vec<Step>,
    policy: RulePolicy,
}

impl FallbackChain {
    pub fn for_variant(variant: Variant, policy: RulePolicy) -> Self {
        let steps = match variant {
            Variant::A => vec![Step::Single(Candidate::A), Step::Rule],
            Variant::B => vec![Step::Single(Candidate::B), Step::Rule],
            Variant::C => vec![Step::Ensemble, Step::PartialEnsemble, Step::Rule],
        };
        Self { steps, policy }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Run the steps in order until one succeeds.
    ///
    /// Each candidate is evaluated at most once per run, so a failure is
    /// reported once even when several steps depend on it.
    pub fn run(
        &self,
        a: Option<&dyn SavingModel>,
        b: Option<&dyn SavingModel>,
        features: &FeatureVector,
        composer: &EnsembleComposer,
        req: &BuildingRequest,
    ) -> ChainOutcome {
        let attempts = Attempts {
            models: [a, b],
            features,
            results: [OnceCell::new(), OnceCell::new()],
        };
        let mut warnings = Vec::new();

        for step in &self.steps {
            let result = match step {
                Step::Single(candidate) => attempts.get(*candidate),
                Step::Ensemble => match (attempts.get(Candidate::A), attempts.get(Candidate::B)) {
                    (Ok(pa), Ok(pb)) => composer.combine(Some(pa), Some(pb)),
                    (ra, rb) => Err(EngineError::EnsembleIncomplete {
                        failures: [ra.err(), rb.err()].into_iter().flatten().collect(),
                    }),
                },
                Step::PartialEnsemble => composer.combine(
                    attempts.get(Candidate::A).ok(),
                    attempts.get(Candidate::B).ok(),
                ),
                Step::Rule => {
                    return ChainOutcome {
                        saving_pct: self.policy.estimate(req),
                        source: PredictionSource::RuleFallback,
                        step: Step::Rule,
                        warnings,
                    }
                }
            };

            match result {
                Ok(pct) => {
                    return ChainOutcome {
                        saving_pct: pct,
                        source: PredictionSource::Ml,
                        step: *step,
                        warnings,
                    }
                }
                Err(e) => {
                    debug!(step = ?step, error = %e, "Fallback step failed");
                    warnings.extend(e.warning_tags());
                }
            }
        }

        // Chains built by `for_variant` always end with the rule step
        ChainOutcome {
            saving_pct: self.policy.estimate(req),
            source: PredictionSource::RuleFallback,
            step: Step::Rule,
            warnings,
        }
    }
}

/// Lazily evaluated, memoized candidate predictions
struct Attempts<'a> {
    models: [Option<&'a dyn SavingModel>; 2],
    features: &'a FeatureVector,
    results: [OnceCell<EngineResult<f64>>; 2],
}

impl Attempts<'_> {
    fn slot(candidate: Candidate) -> usize {
        match candidate {
            Candidate::A => 0,
            Candidate::B => 1,
        }
    }

    fn get(&self, candidate: Candidate) -> EngineResult<f64> {
        let idx = Self::slot(candidate);
        self.results[idx]
            .get_or_init(|| match self.models[idx] {
                None => Err(EngineError::ModelUnavailable { candidate }),
                Some(model) => model
                    .predict_pct(self.features)
                    .map(|pct| pct.clamp(0.0, 100.0)),
            })
            .clone()
    }
}
