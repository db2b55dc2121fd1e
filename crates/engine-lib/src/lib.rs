//! Training and serving engine for building energy-saving predictions
//!
//! This crate provides:
//! - Feature derivation shared by training and inference
//! - Cross-validated, grid-searched training of two candidate regressors
//! - Ensemble composition and a rule-based fallback chain
//! - Atomic artifact generations with tolerant reload
//! - Asynchronous training jobs with pollable status
//! - Health checks, metrics and structured training events

pub mod error;
pub mod events;
pub mod health;
pub mod jobs;
pub mod models;
pub mod observability;
pub mod predictor;
pub mod store;
pub mod training;

pub use error::{EngineError, EngineResult};
pub use events::{EventSink, FanoutSink, JsonlSink, TracingSink, TrainingEvent};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use jobs::{
    JobState, SchedulerConfig, TrainingConfig, TrainingJob, TrainingJobScheduler, TrainingMode,
    TrainingPipeline,
};
pub use models::*;
pub use observability::{EngineMetrics, StructuredLogger};
pub use predictor::{FeaturePipeline, ManagerStatus, ModelServingManager};
pub use store::{ArtifactStore, Manifest, StoreConfig};
