//! Serving engine: feature derivation, ensemble, fallback chain and finalization

mod ensemble;
mod fallback;
mod features;
mod finalize;
mod manager;

pub use ensemble::{EnsembleComposer, EnsembleWeights, WeightSource};
pub use fallback::{ChainOutcome, FallbackChain, RulePolicy, Step};
pub use features::{
    FeatureDefaults, FeaturePipeline, DEFAULT_BUILT_YEAR, DEFAULT_ENERGY_KWH, DEFAULT_EUI_KWH_M2Y,
};
pub use finalize::{
    projection_horizon, projection_years, AssumptionDefaults, Finalizer, LabelThresholds,
    Provenance, MAX_HORIZON_YEARS, PAYBACK_SENTINEL_YEARS, SCHEMA_VERSION,
};
pub use manager::{Generation, ManagerStatus, ModelServingManager, UNTRAINED_VERSION};

use crate::error::EngineResult;
use crate::models::{Candidate, FeatureVector};

/// A fitted candidate able to score a feature vector
pub trait SavingModel: Send + Sync {
    /// Candidate slot this model serves
    fn candidate(&self) -> Candidate;

    /// Raw saving percentage; the caller applies clamping
    fn predict_pct(&self, features: &FeatureVector) -> EngineResult<f64>;
}
