//! Grid-searched, cross-validated candidate training
//!
//! Every hyperparameter combination is scored with shuffled k-fold CV on a
//! bounded rayon pool. The combination with the lowest mean CV MAE wins; a
//! later combination must be strictly better to replace the incumbent.

use super::dataset::{kfold_indices, Dataset, DEFAULT_SEED};
use super::estimator::{format_params, EstimatorFamily, HyperParams, ParamGrid, TrainedPipeline};
use super::metrics::{CvMetrics, Metrics};
use crate::models::Candidate;
use crate::observability::EngineMetrics;
use anyhow::{bail, Context, Result};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::debug;

/// Default CV pool size: half the available cores, between 1 and 4
pub fn default_cv_workers() -> usize {
    (num_cpus::get() / 2).clamp(1, 4)
}

#[derive(Debug, Clone)]
pub struct TrainerConfig {
    pub kfold_seed: u64,
    pub workers: usize,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            kfold_seed: DEFAULT_SEED,
            workers: default_cv_workers(),
        }
    }
}

/// CV result for one hyperparameter combination
#[derive(Debug, Clone)]
pub struct ComboScore {
    pub params: HyperParams,
    pub cv: CvMetrics,
}

#[derive(Debug, Clone)]
pub struct Evaluation {
    pub best_index: usize,
    pub best_params: HyperParams,
    pub cv_metrics: CvMetrics,
    /// Every combination, in enumeration order
    pub combos: Vec<ComboScore>,
}

/// Full outcome for one candidate: selection, refit and scores
#[derive(Debug, Clone)]
pub struct CandidateReport {
    pub candidate: Candidate,
    pub family: String,
    pub evaluation: Evaluation,
    pub train_metrics: Metrics,
    pub test_metrics: Metrics,
    pub pipeline: TrainedPipeline,
}

impl CandidateReport {
    /// Test MAE minus train MAE; a large gap signals overfitting
    pub fn overfit_gap(&self) -> f64 {
        self.test_metrics.mae - self.train_metrics.mae
    }
}

/// Progress callbacks from the trainer
pub trait TrainingObserver {
    fn on_combo(&self, _candidate: Candidate, _score: &ComboScore) {}

    fn on_best(&self, _candidate: Candidate, _evaluation: &Evaluation) {}
}

/// Observer that ignores every callback
pub struct NoopObserver;

impl TrainingObserver for NoopObserver {}

pub struct CandidateTrainer {
    pool: ThreadPool,
    config: TrainerConfig,
    metrics: EngineMetrics,
}

impl CandidateTrainer {
    pub fn new(config: TrainerConfig) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.workers.max(1))
            .thread_name(|i| format!("cv-worker-{}", i))
            .build()
            .context("Failed to build cross-validation pool")?;
        Ok(Self {
            pool,
            config,
            metrics: EngineMetrics::new(),
        })
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Grid search with k-fold CV; returns the winning combination and its CV metrics
    pub fn evaluate(
        &self,
        candidate: Candidate,
        train: &Dataset,
        family: &dyn EstimatorFamily,
        grid: &ParamGrid,
        fold_count: usize,
        observer: &dyn TrainingObserver,
    ) -> Result<Evaluation> {
        let combos = grid.combinations();
        if combos.is_empty() {
            bail!("{} has an empty hyperparameter grid", family.name());
        }
        let folds = kfold_indices(train.len(), fold_count, self.config.kfold_seed)?;

        let mut scored: Vec<ComboScore> = Vec::with_capacity(combos.len());
        let mut best: Option<usize> = None;

        for params in combos {
            let per_fold: Vec<Metrics> = self.pool.install(|| {
                folds
                    .par_iter()
                    .map(|fold| -> Result<Metrics> {
                        let fit_part = train.subset(&fold.train);
                        let val_part = train.subset(&fold.validation);
                        let pipe = TrainedPipeline::fit(
                            candidate,
                            family,
                            &fit_part.features(),
                            &fit_part.targets(),
                            &params,
                        )?;
                        let predicted = pipe.predict_many(&val_part.features())?;
                        Ok(Metrics::compute(&val_part.targets(), &predicted))
                    })
                    .collect::<Result<Vec<_>>>()
            })?;

            let score = ComboScore {
                params,
                cv: CvMetrics::aggregate(&per_fold),
            };
            self.metrics.inc_cv_evaluations();
            debug!(
                candidate = %candidate,
                params = %format_params(&score.params),
                cv_mae_mean = score.cv.mae.mean,
                "Evaluated hyperparameter combination"
            );
            observer.on_combo(candidate, &score);

            let improves = match best {
                None => true,
                Some(idx) => score.cv.mae.mean < scored[idx].cv.mae.mean,
            };
            if improves {
                best = Some(scored.len());
            }
            scored.push(score);
        }

        let best_idx = best.context("no hyperparameter combination was scored")?;
        let evaluation = Evaluation {
            best_index: best_idx,
            best_params: scored[best_idx].params.clone(),
            cv_metrics: scored[best_idx].cv,
            combos: scored,
        };
        observer.on_best(candidate, &evaluation);
        Ok(evaluation)
    }

    /// Evaluate, refit the winner on the full training split and score it
    pub fn train_candidate(
        &self,
        candidate: Candidate,
        family: &dyn EstimatorFamily,
        train: &Dataset,
        test: &Dataset,
        fold_count: usize,
        observer: &dyn TrainingObserver,
    ) -> Result<CandidateReport> {
        let evaluation = self.evaluate(candidate, train, family, &family.grid(), fold_count, observer)?;
        self.refit(candidate, family, train, test, evaluation)
    }

    /// Refit the selected combination on the whole training split and score
    /// it on both splits
    pub fn refit(
        &self,
        candidate: Candidate,
        family: &dyn EstimatorFamily,
        train: &Dataset,
        test: &Dataset,
        evaluation: Evaluation,
    ) -> Result<CandidateReport> {
        let pipeline = TrainedPipeline::fit(
            candidate,
            family,
            &train.features(),
            &train.targets(),
            &evaluation.best_params,
        )
        .with_context(|| format!("refit of candidate {} failed", candidate))?;

        let train_pred = pipeline.predict_many(&train.features())?;
        let test_pred = pipeline.predict_many(&test.features())?;

        Ok(CandidateReport {
            candidate,
            family: family.name().to_string(),
            train_metrics: Metrics::compute(&train.targets(), &train_pred),
            test_metrics: Metrics::compute(&test.targets(), &test_pred),
            evaluation,
            pipeline,
        })
    }
}
