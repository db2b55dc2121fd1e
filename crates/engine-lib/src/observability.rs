//! Observability infrastructure for the savings engine
//!
//! Provides:
//! - Prometheus metrics (prediction latency and sources, training jobs, active generation)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    register_int_gauge_vec, Histogram, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Default histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<EngineMetricsInner> = OnceLock::new();

struct EngineMetricsInner {
    prediction_latency_seconds: Histogram,
    predictions_total: IntCounterVec,
    prediction_warnings_total: IntCounter,
    training_jobs_total: IntCounterVec,
    training_jobs_active: IntGauge,
    cv_evaluations_total: IntCounter,
    model_generation_info: IntGaugeVec,
    artifacts_loaded: IntGaugeVec,
}

impl EngineMetricsInner {
    fn new() -> Self {
        Self {
            prediction_latency_seconds: register_histogram!(
                "savings_engine_prediction_latency_seconds",
                "Time spent serving a single prediction, fallback chain included",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register prediction_latency_seconds"),

            predictions_total: register_int_counter_vec!(
                "savings_engine_predictions_total",
                "Predictions served, by source and requested variant",
                &["source", "variant"]
            )
            .expect("Failed to register predictions_total"),

            prediction_warnings_total: register_int_counter!(
                "savings_engine_prediction_warnings_total",
                "Warning tags attached to served predictions"
            )
            .expect("Failed to register prediction_warnings_total"),

            training_jobs_total: register_int_counter_vec!(
                "savings_engine_training_jobs_total",
                "Training jobs that reached a terminal state",
                &["state"]
            )
            .expect("Failed to register training_jobs_total"),

            training_jobs_active: register_int_gauge!(
                "savings_engine_training_jobs_active",
                "Training jobs currently running"
            )
            .expect("Failed to register training_jobs_active"),

            cv_evaluations_total: register_int_counter!(
                "savings_engine_cv_evaluations_total",
                "Hyperparameter combinations evaluated by cross-validation"
            )
            .expect("Failed to register cv_evaluations_total"),

            model_generation_info: register_int_gauge_vec!(
                "savings_engine_model_generation_info",
                "Artifact generation currently served",
                &["version"]
            )
            .expect("Failed to register model_generation_info"),

            artifacts_loaded: register_int_gauge_vec!(
                "savings_engine_artifacts_loaded",
                "Whether each artifact of the active generation is loaded",
                &["artifact"]
            )
            .expect("Failed to register artifacts_loaded"),
        }
    }
}

/// Engine metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct EngineMetrics {
    _private: (),
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EngineMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineMetrics").finish()
    }
}

impl EngineMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(EngineMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &EngineMetricsInner {
        GLOBAL_METRICS.get_or_init(EngineMetricsInner::new)
    }

    pub fn observe_prediction(&self, duration_secs: f64, source: &str, variant: &str, warnings: usize) {
        let inner = self.inner();
        inner.prediction_latency_seconds.observe(duration_secs);
        inner
            .predictions_total
            .with_label_values(&[source, variant])
            .inc();
        inner.prediction_warnings_total.inc_by(warnings as u64);
    }

    pub fn inc_cv_evaluations(&self) {
        self.inner().cv_evaluations_total.inc();
    }

    pub fn job_started(&self) {
        self.inner().training_jobs_active.inc();
    }

    pub fn job_finished(&self, state: &str) {
        let inner = self.inner();
        inner.training_jobs_active.dec();
        inner.training_jobs_total.with_label_values(&[state]).inc();
    }

    /// Mark the served generation and which of its artifacts loaded
    pub fn set_generation(&self, version: &str, artifacts: &[(&str, bool)]) {
        let inner = self.inner();
        inner.model_generation_info.reset();
        inner
            .model_generation_info
            .with_label_values(&[version])
            .set(1);
        for (artifact, loaded) in artifacts {
            inner
                .artifacts_loaded
                .with_label_values(&[artifact])
                .set(i64::from(*loaded));
        }
    }
}

/// Structured logger for engine lifecycle events
#[derive(Clone, Debug)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn log_prediction(
        &self,
        variant: &str,
        source: &str,
        saving_pct: f64,
        warnings: &[String],
        model_version: &str,
    ) {
        info!(
            event = "prediction_served",
            instance = %self.instance,
            variant = %variant,
            source = %source,
            saving_pct = saving_pct,
            warnings = warnings.len(),
            warning_tags = %warnings.join(","),
            model_version = %model_version,
            "Served saving prediction"
        );
    }

    pub fn log_generation_loaded(&self, version: &str, has_a: bool, has_b: bool, manifest: bool) {
        info!(
            event = "generation_loaded",
            instance = %self.instance,
            model_version = %version,
            has_a = has_a,
            has_b = has_b,
            manifest = manifest,
            "Model generation loaded"
        );
    }

    pub fn log_generation_swapped(&self, old_version: &str, new_version: &str) {
        if old_version == new_version {
            info!(
                event = "generation_reloaded",
                instance = %self.instance,
                model_version = %new_version,
                "Reloaded artifacts, generation unchanged"
            );
        } else {
            info!(
                event = "generation_reloaded",
                instance = %self.instance,
                old_version = %old_version,
                new_version = %new_version,
                "Switched to new model generation"
            );
        }
    }

    pub fn log_job_submitted(&self, job_id: &str, mode: &str, fold_count: usize) {
        info!(
            event = "job_submitted",
            instance = %self.instance,
            job_id = %job_id,
            mode = %mode,
            fold_count = fold_count,
            "Training job queued"
        );
    }

    pub fn log_job_finished(&self, job_id: &str, state: &str, error: Option<&str>) {
        match error {
            Some(err) => warn!(
                event = "job_finished",
                instance = %self.instance,
                job_id = %job_id,
                state = %state,
                error = %err,
                "Training job failed"
            ),
            None => info!(
                event = "job_finished",
                instance = %self.instance,
                job_id = %job_id,
                state = %state,
                "Training job finished"
            ),
        }
    }

    pub fn log_startup(&self, version: &str, model_version: &str) {
        info!(
            event = "server_started",
            instance = %self.instance,
            server_version = %version,
            model_version = %model_version,
            "Savings server started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "server_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Savings server shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_metrics_creation() {
        let metrics = EngineMetrics::new();
        metrics.observe_prediction(0.002, "ML", "C", 1);
        metrics.inc_cv_evaluations();
        metrics.job_started();
        metrics.job_finished("READY");
        metrics.set_generation("untrained", &[("A", false), ("B", false), ("manifest", false)]);

        let families = prometheus::gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "savings_engine_predictions_total"));
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("test-node");
        assert_eq!(logger.instance, "test-node");
        logger.log_job_finished("job", "FAILED", Some("boom"));
    }
}
