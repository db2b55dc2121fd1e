//! Server configuration

use anyhow::Result;
use engine_lib::jobs::{SchedulerConfig, TrainingConfig};
use engine_lib::store::StoreConfig;
use serde::Deserialize;
use std::path::PathBuf;

/// Server configuration, read from `SAVINGS_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Instance name attached to structured logs
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    /// HTTP port for prediction, training, health and metrics
    #[serde(default = "default_port")]
    pub port: u16,

    /// Root directory of the artifact generations
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,

    /// Directory for JSONL training events; unset keeps events in the log only
    #[serde(default)]
    pub event_log_dir: Option<PathBuf>,

    /// Training CSV; the synthetic generator is used when unset or missing
    #[serde(default)]
    pub dataset_csv: Option<PathBuf>,

    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    #[serde(default = "default_generations_to_keep")]
    pub generations_to_keep: usize,
}

fn default_instance_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "savings-server".to_string())
}

fn default_port() -> u16 {
    8080
}

fn default_model_dir() -> PathBuf {
    StoreConfig::default().root
}

fn default_max_concurrent_jobs() -> usize {
    SchedulerConfig::default().max_concurrent_jobs
}

fn default_generations_to_keep() -> usize {
    StoreConfig::default().generations_to_keep
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            instance_name: default_instance_name(),
            port: default_port(),
            model_dir: default_model_dir(),
            event_log_dir: None,
            dataset_csv: None,
            max_concurrent_jobs: default_max_concurrent_jobs(),
            generations_to_keep: default_generations_to_keep(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from the process environment
    pub fn load() -> Result<Self> {
        Self::from_environment(config::Environment::with_prefix("SAVINGS"))
    }

    pub fn from_environment(environment: config::Environment) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(environment.try_parsing(true))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    pub fn store(&self) -> StoreConfig {
        StoreConfig {
            root: self.model_dir.clone(),
            generations_to_keep: self.generations_to_keep,
        }
    }

    pub fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            max_concurrent_jobs: self.max_concurrent_jobs,
        }
    }

    pub fn training(&self) -> TrainingConfig {
        TrainingConfig {
            dataset_csv: self.dataset_csv.clone(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(vars: &[(&str, &str)]) -> config::Environment {
        let map: config::Map<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        config::Environment::with_prefix("SAVINGS").source(Some(map))
    }

    #[test]
    fn test_defaults_when_nothing_is_set() {
        let config = ServerConfig::from_environment(env(&[])).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.max_concurrent_jobs, 2);
        assert_eq!(config.generations_to_keep, 3);
        assert!(config.dataset_csv.is_none());
        assert!(config.event_log_dir.is_none());
    }

    #[test]
    fn test_environment_overrides() {
        let config = ServerConfig::from_environment(env(&[
            ("SAVINGS_PORT", "9191"),
            ("SAVINGS_MODEL_DIR", "/srv/models"),
            ("SAVINGS_DATASET_CSV", "/srv/train.csv"),
            ("SAVINGS_MAX_CONCURRENT_JOBS", "4"),
        ]))
        .unwrap();
        assert_eq!(config.port, 9191);
        assert_eq!(config.store().root, PathBuf::from("/srv/models"));
        assert_eq!(config.scheduler().max_concurrent_jobs, 4);
        assert_eq!(
            config.training().dataset_csv,
            Some(PathBuf::from("/srv/train.csv"))
        );
    }
}
