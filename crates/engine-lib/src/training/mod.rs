//! Candidate training: datasets, preprocessing, estimator families and
//! cross-validated grid search

mod dataset;
mod estimator;
mod forest;
mod linear;
mod metrics;
mod preprocess;
mod trainer;

pub use dataset::{kfold_indices, Dataset, DatasetSource, Fold, DEFAULT_SEED};
pub use estimator::{
    format_params, ElasticNetFamily, EstimatorFamily, FittedEstimator, HyperParams, ParamGrid,
    ParamValue, RandomForestFamily, TrainedPipeline,
};
pub use forest::{ForestConfig, RandomForest};
pub use linear::{ElasticNet, ElasticNetConfig};
pub use metrics::{CvMetrics, MetricSummary, Metrics};
pub use preprocess::Preprocessor;
pub use trainer::{
    default_cv_workers, CandidateReport, CandidateTrainer, ComboScore, Evaluation, NoopObserver,
    TrainerConfig, TrainingObserver,
};
