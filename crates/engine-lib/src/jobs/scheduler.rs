//! Asynchronous training job scheduler
//!
//! `submit` records a QUEUED job and returns its id at once. A tokio task
//! waits for a run slot, then drives the blocking [`TrainingPipeline`] on
//! the blocking pool. Job records live in an in-process map and are lost
//! on restart.

use super::job::{new_job_id, JobState, TrainingJob, TrainingMode};
use super::pipeline::{ProgressReporter, TrainingPipeline};
use crate::error::{EngineError, EngineResult};
use crate::observability::{EngineMetrics, StructuredLogger};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Jobs allowed to run at once; the rest wait in QUEUED
    pub max_concurrent_jobs: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
        }
    }
}

type JobTable = Arc<DashMap<String, TrainingJob>>;

/// Writes pipeline progress into the job table
struct JobReporter {
    id: String,
    jobs: JobTable,
}

impl ProgressReporter for JobReporter {
    fn advance(&self, state: JobState, progress: u8, message: &str) -> anyhow::Result<()> {
        let mut job = self
            .jobs
            .get_mut(&self.id)
            .ok_or_else(|| EngineError::JobNotFound(self.id.clone()))?;
        job.advance(state, progress, message)?;
        Ok(())
    }

    fn note(&self, message: &str) {
        if let Some(mut job) = self.jobs.get_mut(&self.id) {
            job.note(message);
        }
    }
}

pub struct TrainingJobScheduler {
    jobs: JobTable,
    pipeline: Arc<TrainingPipeline>,
    slots: Arc<Semaphore>,
    metrics: EngineMetrics,
    logger: StructuredLogger,
}

impl TrainingJobScheduler {
    pub fn new(pipeline: Arc<TrainingPipeline>, config: SchedulerConfig, logger: StructuredLogger) -> Self {
        Self {
            jobs: Arc::new(DashMap::new()),
            pipeline,
            slots: Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1))),
            metrics: EngineMetrics::new(),
            logger,
        }
    }

    /// Validate and enqueue a job; never waits for training
    pub fn submit(&self, mode: &str, fold_count: usize) -> EngineResult<String> {
        let mode: TrainingMode = mode.parse()?;
        if fold_count < 2 {
            return Err(EngineError::InvalidRequest(format!(
                "fold count must be at least 2, got {}",
                fold_count
            )));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| EngineError::TrainingStep(format!("no async runtime: {}", e)))?;

        let mut job = TrainingJob::new(mode, fold_count);
        while self.jobs.contains_key(&job.id) {
            job.id = new_job_id(job.started_at);
        }
        let id = job.id.clone();
        self.jobs.insert(id.clone(), job);
        self.logger.log_job_submitted(&id, mode.as_str(), fold_count);

        let jobs = self.jobs.clone();
        let pipeline = self.pipeline.clone();
        let slots = self.slots.clone();
        let metrics = self.metrics.clone();
        let logger = self.logger.clone();
        let job_id = id.clone();

        runtime.spawn(async move {
            let _slot = match slots.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    finish(&jobs, &job_id, Err(format!("scheduler closed: {}", e)), &logger);
                    return;
                }
            };
            metrics.job_started();

            let reporter = JobReporter {
                id: job_id.clone(),
                jobs: jobs.clone(),
            };
            let run_id = job_id.clone();
            let joined = tokio::task::spawn_blocking(move || {
                pipeline.run(&run_id, mode, fold_count, &reporter)
            })
            .await;

            let outcome = match joined {
                Ok(Ok(summary)) => Ok(summary.version_label),
                Ok(Err(e)) => Err(format!("{:#}", e)),
                Err(e) => Err(format!("training worker aborted: {}", e)),
            };
            let state = finish(&jobs, &job_id, outcome, &logger);
            metrics.job_finished(state.as_str());
        });

        Ok(id)
    }

    /// Snapshot of one job
    pub fn get_status(&self, job_id: &str) -> EngineResult<TrainingJob> {
        self.jobs
            .get(job_id)
            .map(|job| job.clone())
            .ok_or_else(|| EngineError::JobNotFound(job_id.to_string()))
    }

    /// Snapshots of all jobs, newest first
    pub fn list(&self) -> Vec<TrainingJob> {
        let mut jobs: Vec<TrainingJob> = self.jobs.iter().map(|e| e.value().clone()).collect();
        jobs.sort_by(|a, b| b.started_at.cmp(&a.started_at).then_with(|| b.id.cmp(&a.id)));
        jobs
    }

    /// Jobs not yet in a terminal state
    pub fn active_jobs(&self) -> usize {
        self.jobs.iter().filter(|e| !e.value().is_terminal()).count()
    }
}

/// Record the terminal state of a job and return it
fn finish(
    jobs: &JobTable,
    job_id: &str,
    outcome: Result<String, String>,
    logger: &StructuredLogger,
) -> JobState {
    let Some(mut job) = jobs.get_mut(job_id) else {
        warn!(job_id = %job_id, "Finished job vanished from the table");
        return JobState::Failed;
    };

    let result = match outcome {
        Ok(version) => job.complete(version),
        Err(error) => job.fail(error),
    };
    if let Err(e) = result {
        // e.g. the pipeline stopped before SAVING; record it as a failure
        let error = format!("{}", e);
        if let Err(e) = job.fail(error) {
            warn!(job_id = %job_id, error = %e, "Could not mark job failed");
        }
    }

    logger.log_job_finished(job_id, job.state.as_str(), job.error.as_deref());
    job.state
}
