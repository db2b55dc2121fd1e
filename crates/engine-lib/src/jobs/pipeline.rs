//! End-to-end training run: dataset, candidates, ensemble, publish

use super::job::{JobState, TrainingMode};
use crate::events::{emit_quietly, EventSink, TrainingEvent};
use crate::models::{Candidate, FeatureVector};
use crate::predictor::{EnsembleComposer, EnsembleWeights};
use crate::store::{
    ArtifactStore, BestSelection, EnsembleScores, EnsembleSection, KFoldInfo, Manifest,
    ModelReport, PublishedGeneration, SplitInfo, WeightPair,
};
use crate::training::{
    default_cv_workers, CandidateReport, CandidateTrainer, ComboScore, Dataset, DatasetSource,
    ElasticNetFamily, Evaluation, EstimatorFamily, Metrics, RandomForestFamily, TrainerConfig,
    TrainingObserver, DEFAULT_SEED,
};
use anyhow::{Context, Result};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Per-mode sizing
#[derive(Debug, Clone, PartialEq)]
pub struct ModeProfile {
    /// Rows generated when no CSV dataset is available
    pub synthetic_rows: usize,
    pub forest_trees: usize,
}

#[derive(Debug, Clone)]
pub struct TrainingConfig {
    /// CSV dataset; synthetic rows are used when unset or missing
    pub dataset_csv: Option<PathBuf>,
    pub test_fraction: f64,
    pub seed: u64,
    pub quick: ModeProfile,
    pub full: ModeProfile,
    /// Operator-fixed ensemble weights written to the manifest
    pub ensemble_weights: Option<WeightPair>,
    /// CV worker pool size
    pub workers: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            dataset_csv: None,
            test_fraction: 0.2,
            seed: DEFAULT_SEED,
            quick: ModeProfile {
                synthetic_rows: 600,
                forest_trees: 30,
            },
            full: ModeProfile {
                synthetic_rows: 1200,
                forest_trees: 200,
            },
            ensemble_weights: None,
            workers: default_cv_workers(),
        }
    }
}

impl TrainingConfig {
    pub fn profile(&self, mode: TrainingMode) -> &ModeProfile {
        match mode {
            TrainingMode::Quick => &self.quick,
            TrainingMode::Full => &self.full,
        }
    }

    pub fn dataset_source(&self, mode: TrainingMode) -> DatasetSource {
        match &self.dataset_csv {
            Some(path) => DatasetSource::Csv(path.clone()),
            None => DatasetSource::Synthetic {
                rows: self.profile(mode).synthetic_rows,
                seed: self.seed,
            },
        }
    }
}

/// Receives state changes from a running pipeline
pub trait ProgressReporter: Send + Sync {
    fn advance(&self, state: JobState, progress: u8, message: &str) -> Result<()>;

    fn note(&self, message: &str);
}

/// What a successful run produced
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub published: PublishedGeneration,
    pub version_label: String,
    pub best_key: String,
    pub weights: EnsembleWeights,
}

/// Forwards trainer callbacks to the event sink
struct EventObserver<'a> {
    run_id: &'a str,
    sink: &'a dyn EventSink,
}

impl TrainingObserver for EventObserver<'_> {
    fn on_combo(&self, candidate: Candidate, score: &ComboScore) {
        emit_quietly(
            self.sink,
            TrainingEvent::cv(
                self.run_id,
                candidate.key(),
                json!(score.params),
                score.cv.mae.mean,
                score.cv.mae.std,
                score.cv.rmse.mean,
                score.cv.r2.mean,
            ),
        );
    }

    fn on_best(&self, candidate: Candidate, evaluation: &Evaluation) {
        emit_quietly(
            self.sink,
            TrainingEvent::cv_best_selected(
                self.run_id,
                candidate.key(),
                json!(evaluation.best_params),
                evaluation.cv_metrics.mae.mean,
                evaluation.combos.len(),
            ),
        );
    }
}

pub struct TrainingPipeline {
    config: TrainingConfig,
    trainer: CandidateTrainer,
    store: Arc<ArtifactStore>,
    sink: Arc<dyn EventSink>,
}

impl TrainingPipeline {
    pub fn new(config: TrainingConfig, store: Arc<ArtifactStore>, sink: Arc<dyn EventSink>) -> Result<Self> {
        let trainer = CandidateTrainer::new(TrainerConfig {
            kfold_seed: config.seed,
            workers: config.workers,
        })?;
        Ok(Self {
            config,
            trainer,
            store,
            sink,
        })
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Run one training job to completion. Blocking; call from a worker thread.
    ///
    /// Nothing becomes visible to serving unless the final publish succeeds.
    pub fn run(
        &self,
        run_id: &str,
        mode: TrainingMode,
        fold_count: usize,
        progress: &dyn ProgressReporter,
    ) -> Result<RunSummary> {
        let sink = self.sink.as_ref();
        let source = self.config.dataset_source(mode);
        emit_quietly(sink, TrainingEvent::train_start(run_id, mode.as_str(), fold_count, &source.describe()));

        progress.advance(JobState::Training, 20, "[TRAIN] queued → training: loading dataset")?;
        let profile = self.config.profile(mode);
        let dataset = source
            .load(profile.synthetic_rows)
            .with_context(|| format!("failed to load dataset {}", source.describe()))?;
        let (train, test) = dataset
            .split(self.config.test_fraction, self.config.seed)
            .context("failed to split dataset")?;
        emit_quietly(
            sink,
            TrainingEvent::split(run_id, train.len(), test.len(), self.config.test_fraction, self.config.seed),
        );
        progress.note(&format!(
            "[TRAIN] dataset {}: {} train / {} test rows",
            source.describe(),
            train.len(),
            test.len()
        ));

        let family_a = ElasticNetFamily::default();
        let family_b = RandomForestFamily::new(profile.forest_trees);
        let families: [(Candidate, &dyn EstimatorFamily); 2] =
            [(Candidate::A, &family_a), (Candidate::B, &family_b)];

        progress.advance(
            JobState::Evaluating,
            40,
            &format!("[TRAIN] cross-validating candidates (k={})", fold_count),
        )?;
        let observer = EventObserver { run_id, sink };
        let mut evaluations = Vec::with_capacity(families.len());
        for (candidate, family) in families {
            let evaluation = self
                .trainer
                .evaluate(candidate, &train, family, &family.grid(), fold_count, &observer)
                .with_context(|| format!("cross-validation of candidate {} failed", candidate))?;
            progress.note(&format!(
                "[TRAIN] {} best cv_mae={:.4} over {} combinations",
                candidate,
                evaluation.cv_metrics.mae.mean,
                evaluation.combos.len()
            ));
            evaluations.push(evaluation);
        }

        progress.advance(JobState::Training, 60, "[TRAIN] refitting selected hyperparameters")?;
        let mut reports = Vec::with_capacity(families.len());
        for ((candidate, family), evaluation) in families.into_iter().zip(evaluations) {
            let report = self.trainer.refit(candidate, family, &train, &test, evaluation)?;
            self.emit_scores(run_id, &report);
            progress.note(&format!(
                "[TRAIN] {} test_mae={:.4} (gap {:+.4})",
                candidate,
                report.test_metrics.mae,
                report.overfit_gap()
            ));
            reports.push(report);
        }
        let (report_a, report_b) = (&reports[0], &reports[1]);

        // Ties keep A
        let best = if report_b.test_metrics.mae < report_a.test_metrics.mae {
            report_b
        } else {
            report_a
        };

        progress.advance(JobState::Saving, 80, "[TRAIN] saving artifacts (models/manifest)")?;
        let suggested = EnsembleComposer::inverse_error_weights(
            report_a.evaluation.cv_metrics.mae.mean,
            report_b.evaluation.cv_metrics.mae.mean,
        );
        let section = EnsembleSection {
            w_a: self.config.ensemble_weights.map(|w| w.w_a),
            w_b: self.config.ensemble_weights.map(|w| w.w_b),
            suggested_inverse_error_weights: suggested,
            scores: None,
        };
        let mut manifest = self.build_manifest(run_id, mode, fold_count, &reports, best.candidate, section);
        let weights = EnsembleWeights::resolve(Some(&manifest));
        let scores = ensemble_scores(&EnsembleComposer::new(weights), report_a, report_b, &train, &test)?;
        emit_quietly(
            sink,
            TrainingEvent::ensemble(run_id, weights.w_a, weights.w_b, Some(scores.train.mae), Some(scores.test.mae)),
        );
        manifest.ensemble.scores = Some(scores);

        let published = self
            .store
            .persist(Some(&report_a.pipeline), Some(&report_b.pipeline), manifest)
            .context("failed to publish artifacts")?;
        let version_label = published
            .version
            .to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        emit_quietly(
            sink,
            TrainingEvent::artifacts_saved(run_id, &version_label, best.candidate.key(), &published.path),
        );

        info!(
            run_id = %run_id,
            generation = %published.name,
            best = %best.candidate,
            w_a = weights.w_a,
            w_b = weights.w_b,
            weight_source = ?weights.source,
            "Training run published"
        );
        Ok(RunSummary {
            published,
            version_label,
            best_key: best.candidate.key().to_string(),
            weights,
        })
    }

    fn emit_scores(&self, run_id: &str, report: &CandidateReport) {
        let key = report.candidate.key();
        let (tr, te) = (&report.train_metrics, &report.test_metrics);
        emit_quietly(self.sink.as_ref(), TrainingEvent::score_train(run_id, key, tr.mae, tr.rmse, tr.r2));
        emit_quietly(
            self.sink.as_ref(),
            TrainingEvent::score_test(run_id, key, te.mae, te.rmse, te.r2, report.overfit_gap()),
        );
    }

    fn build_manifest(
        &self,
        run_id: &str,
        mode: TrainingMode,
        fold_count: usize,
        reports: &[CandidateReport],
        best: Candidate,
        ensemble: EnsembleSection,
    ) -> Manifest {
        let per_model: BTreeMap<String, ModelReport> = reports
            .iter()
            .map(|r| {
                (
                    r.candidate.key().to_string(),
                    ModelReport {
                        family: r.family.clone(),
                        best_hyperparams: r.evaluation.best_params.clone(),
                        cv_metrics: r.evaluation.cv_metrics,
                        train_metrics: r.train_metrics,
                        test_metrics: r.test_metrics,
                    },
                )
            })
            .collect();

        Manifest {
            // regenerated by the store on publish
            version: chrono::Utc::now(),
            features: FeatureVector::columns(),
            split: SplitInfo {
                test_fraction: self.config.test_fraction,
                seed: self.config.seed,
            },
            kfold: KFoldInfo {
                k: fold_count,
                seed: self.config.seed,
                shuffled: true,
            },
            per_model,
            best: BestSelection {
                selected_key: best.key().to_string(),
                selection_metric: "test_mae".to_string(),
            },
            ensemble,
            mode: Some(mode.as_str().to_string()),
            run_id: Some(run_id.to_string()),
            checksums: BTreeMap::new(),
        }
    }
}

/// Train/test metrics of the weighted ensemble, as served
fn ensemble_scores(
    composer: &EnsembleComposer,
    a: &CandidateReport,
    b: &CandidateReport,
    train: &Dataset,
    test: &Dataset,
) -> Result<EnsembleScores> {
    let score = |data: &Dataset| -> Result<Metrics> {
        let rows = data.features();
        let pred_a = a.pipeline.predict_many(&rows)?;
        let pred_b = b.pipeline.predict_many(&rows)?;
        Ok(Metrics::compute(&data.targets(), &composer.combine_series(&pred_a, &pred_b)))
    };
    Ok(EnsembleScores {
        train: score(train)?,
        test: score(test)?,
    })
}
