//! Model serving manager
//!
//! Holds the active artifact generation behind a single `Arc` swapped under
//! a lock. A prediction clones the `Arc` once and works on that snapshot, so
//! a concurrent reload is observed either entirely or not at all.

use super::ensemble::{EnsembleComposer, EnsembleWeights};
use super::fallback::{FallbackChain, RulePolicy};
use super::features::FeaturePipeline;
use super::finalize::{projection_horizon, Finalizer, Provenance};
use super::SavingModel;
use crate::models::{BuildingRequest, PredictionResult, PredictionSource, Variant};
use crate::observability::{EngineMetrics, StructuredLogger};
use crate::store::{ArtifactStore, LoadedArtifacts, Manifest};
use crate::training::TrainedPipeline;
use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use std::time::Instant;

/// Model version reported while no trained generation exists
pub const UNTRAINED_VERSION: &str = "untrained";

/// One consistent set of served artifacts
#[derive(Debug, Clone, Default)]
pub struct Generation {
    pub name: Option<String>,
    pub a: Option<Arc<TrainedPipeline>>,
    pub b: Option<Arc<TrainedPipeline>>,
    pub manifest: Option<Manifest>,
    pub composer: EnsembleComposer,
    /// Warning tags for artifacts that were present but unusable
    pub issues: Vec<String>,
}

impl Generation {
    pub fn from_loaded(loaded: LoadedArtifacts) -> Self {
        let composer = EnsembleComposer::from_manifest(loaded.manifest.as_ref());
        Self {
            name: loaded.generation,
            a: loaded.a,
            b: loaded.b,
            issues: loaded.issues.iter().flat_map(|e| e.warning_tags()).collect(),
            manifest: loaded.manifest,
            composer,
        }
    }

    pub fn version_label(&self) -> String {
        self.manifest
            .as_ref()
            .map(Manifest::version_label)
            .unwrap_or_else(|| UNTRAINED_VERSION.to_string())
    }

    fn model_a(&self) -> Option<&dyn SavingModel> {
        self.a.as_deref().map(|p| p as &dyn SavingModel)
    }

    fn model_b(&self) -> Option<&dyn SavingModel> {
        self.b.as_deref().map(|p| p as &dyn SavingModel)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagerStatus {
    pub has_a: bool,
    pub has_b: bool,
    pub manifest_present: bool,
    pub effective_weights: EnsembleWeights,
    pub model_version: String,
    pub best_key: Option<String>,
    pub generation: Option<String>,
    pub load_issues: Vec<String>,
}

pub struct ModelServingManager {
    store: Arc<ArtifactStore>,
    current: RwLock<Arc<Generation>>,
    features: FeaturePipeline,
    policy: RulePolicy,
    finalizer: Finalizer,
    metrics: EngineMetrics,
    logger: StructuredLogger,
}

impl ModelServingManager {
    /// Create the manager and load whatever the store currently holds
    pub fn new(store: Arc<ArtifactStore>, logger: StructuredLogger) -> Self {
        Self::with_parts(
            store,
            logger,
            FeaturePipeline::new(),
            RulePolicy::default(),
            Finalizer::default(),
        )
    }

    pub fn with_parts(
        store: Arc<ArtifactStore>,
        logger: StructuredLogger,
        features: FeaturePipeline,
        policy: RulePolicy,
        finalizer: Finalizer,
    ) -> Self {
        let manager = Self {
            store,
            current: RwLock::new(Arc::new(Generation::default())),
            features,
            policy,
            finalizer,
            metrics: EngineMetrics::new(),
            logger,
        };
        let generation = manager.install(Generation::from_loaded(manager.store.load())).1;
        manager.logger.log_generation_loaded(
            &generation.version_label(),
            generation.a.is_some(),
            generation.b.is_some(),
            generation.manifest.is_some(),
        );
        manager
    }

    /// Snapshot of the active generation
    pub fn current(&self) -> Arc<Generation> {
        self.current
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn status(&self) -> ManagerStatus {
        let generation = self.current();
        ManagerStatus {
            has_a: generation.a.is_some(),
            has_b: generation.b.is_some(),
            manifest_present: generation.manifest.is_some(),
            effective_weights: generation.composer.weights(),
            model_version: generation.version_label(),
            best_key: generation
                .manifest
                .as_ref()
                .map(|m| m.best.selected_key.clone()),
            generation: generation.name.clone(),
            load_issues: generation.issues.clone(),
        }
    }

    /// Predict with the full fallback chain; never fails
    pub fn predict(&self, req: &BuildingRequest, variant: Variant) -> PredictionResult {
        let generation = self.current();
        self.predict_with(&generation, req, variant)
    }

    /// Independent predictions against one generation snapshot
    pub fn batch(&self, requests: &[BuildingRequest], variant: Variant) -> Vec<PredictionResult> {
        let generation = self.current();
        requests
            .iter()
            .map(|req| self.predict_with(&generation, req, variant))
            .collect()
    }

    /// Build a response for an externally chosen saving percentage
    pub fn finalize(&self, req: &BuildingRequest, years: &[i32], saving_pct: f64) -> PredictionResult {
        let provenance = Provenance {
            source: PredictionSource::Ml,
            variant: Variant::default(),
            warnings: Vec::new(),
            model_version: self.current().version_label(),
        };
        self.finalizer.finalize(req, years, saving_pct, provenance)
    }

    /// Re-read the store and swap in the result as one unit
    pub fn reload(&self) -> ManagerStatus {
        let loaded = self.store.load();
        let (old, new) = self.install(Generation::from_loaded(loaded));
        self.logger
            .log_generation_swapped(&old.version_label(), &new.version_label());
        self.status()
    }

    fn install(&self, generation: Generation) -> (Arc<Generation>, Arc<Generation>) {
        let next = Arc::new(generation);
        let old = {
            let mut guard = self.current.write().unwrap_or_else(|p| p.into_inner());
            std::mem::replace(&mut *guard, next.clone())
        };
        self.metrics.set_generation(
            &next.version_label(),
            &[
                ("A", next.a.is_some()),
                ("B", next.b.is_some()),
                ("manifest", next.manifest.is_some()),
            ],
        );
        (old, next)
    }

    fn predict_with(
        &self,
        generation: &Generation,
        req: &BuildingRequest,
        variant: Variant,
    ) -> PredictionResult {
        let start = Instant::now();

        let (features, notices) = self.features.derive_with_notices(req);
        let mut warnings: Vec<String> = notices.iter().flat_map(|n| n.warning_tags()).collect();

        let outcome = FallbackChain::for_variant(variant, self.policy.clone()).run(
            generation.model_a(),
            generation.model_b(),
            &features,
            &generation.composer,
            req,
        );
        warnings.extend(outcome.warnings);

        let (years, horizon_notice) =
            projection_horizon(req.years_from, req.years_to, Utc::now().year());
        if let Some(notice) = horizon_notice {
            warnings.extend(notice.warning_tags());
        }
        let model_version = generation.version_label();
        let result = self.finalizer.finalize(
            req,
            &years,
            outcome.saving_pct,
            Provenance {
                source: outcome.source,
                variant,
                warnings,
                model_version,
            },
        );

        let variant_label = variant.to_string();
        self.metrics.observe_prediction(
            start.elapsed().as_secs_f64(),
            result.source.as_str(),
            &variant_label,
            result.warnings.len(),
        );
        self.logger.log_prediction(
            &variant_label,
            result.source.as_str(),
            result.kpi.saving_pct,
            &result.warnings,
            &result.model_version,
        );
        result
    }
}
