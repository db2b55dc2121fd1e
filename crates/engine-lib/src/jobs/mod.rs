//! Training jobs: state machine, pipeline and scheduler

mod job;
mod pipeline;
mod scheduler;

pub use job::{new_job_id, JobState, TrainingJob, TrainingMode};
pub use pipeline::{ModeProfile, ProgressReporter, RunSummary, TrainingConfig, TrainingPipeline};
pub use scheduler::{SchedulerConfig, TrainingJobScheduler};
