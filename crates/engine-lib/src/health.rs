//! Health and readiness reporting for the savings server
//!
//! Components report into a shared registry; liveness returns the worst
//! component status and readiness additionally requires startup to finish.

use crate::jobs::{JobState, TrainingJob};
use crate::predictor::ManagerStatus;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Working, possibly on a fallback path
    Degraded,
    Unhealthy,
}

impl ComponentStatus {
    pub fn is_operational(&self) -> bool {
        matches!(self, ComponentStatus::Healthy | ComponentStatus::Degraded)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

impl ComponentHealth {
    pub fn healthy() -> Self {
        Self::with(ComponentStatus::Healthy, None)
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::with(ComponentStatus::Degraded, Some(message.into()))
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::with(ComponentStatus::Unhealthy, Some(message.into()))
    }

    fn with(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }

    /// Artifact health derived from the serving manager's view.
    ///
    /// Missing or unreadable artifacts degrade the component; prediction
    /// itself keeps working through the rule fallback.
    pub fn from_serving_status(status: &ManagerStatus) -> Self {
        if !status.load_issues.is_empty() {
            return Self::degraded(format!("unusable artifacts: {}", status.load_issues.join(",")));
        }
        match (status.has_a, status.has_b) {
            (true, true) => Self::healthy(),
            (false, false) => Self::degraded("no trained models, serving rule fallback"),
            (true, false) => Self::degraded("pipeline B missing"),
            (false, true) => Self::degraded("pipeline A missing"),
        }
    }

    /// Trainer health from the most recent job
    pub fn from_latest_job(latest: Option<&TrainingJob>) -> Self {
        match latest {
            Some(job) if job.state == JobState::Failed => Self::degraded(format!(
                "last job {} failed: {}",
                job.id,
                job.error.as_deref().unwrap_or("unknown error")
            )),
            _ => Self::healthy(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: BTreeMap<String, ComponentHealth>,
}

impl HealthResponse {
    /// Worst status among the components
    pub fn compute_status(components: &BTreeMap<String, ComponentHealth>) -> ComponentStatus {
        let mut has_degraded = false;
        for health in components.values() {
            match health.status {
                ComponentStatus::Unhealthy => return ComponentStatus::Unhealthy,
                ComponentStatus::Degraded => has_degraded = true,
                ComponentStatus::Healthy => {}
            }
        }
        if has_degraded {
            ComponentStatus::Degraded
        } else {
            ComponentStatus::Healthy
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

pub mod components {
    pub const ARTIFACTS: &str = "artifacts";
    pub const SERVING: &str = "serving";
    pub const TRAINER: &str = "trainer";
}

/// Shared component health table
#[derive(Debug, Clone)]
pub struct HealthRegistry {
    components: Arc<RwLock<BTreeMap<String, ComponentHealth>>>,
    ready: Arc<RwLock<bool>>,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self {
            components: Arc::new(RwLock::new(BTreeMap::new())),
            ready: Arc::new(RwLock::new(false)),
        }
    }

    pub async fn register(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    pub async fn update(&self, name: &str, health: ComponentHealth) {
        self.components
            .write()
            .await
            .insert(name.to_string(), health);
    }

    pub async fn set_degraded(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::degraded(message)).await;
    }

    pub async fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::unhealthy(message)).await;
    }

    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    pub async fn health(&self) -> HealthResponse {
        let components = self.components.read().await.clone();
        let status = HealthResponse::compute_status(&components);
        HealthResponse { status, components }
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        let ready = *self.ready.read().await;
        let health = self.health().await;

        if !ready {
            ReadinessResponse {
                ready: false,
                reason: Some("Server not yet initialized".to_string()),
            }
        } else if !health.status.is_operational() {
            ReadinessResponse {
                ready: false,
                reason: Some("Critical component unhealthy".to_string()),
            }
        } else {
            ReadinessResponse {
                ready: true,
                reason: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::TrainingMode;
    use crate::predictor::EnsembleWeights;

    fn status(has_a: bool, has_b: bool, issues: Vec<String>) -> ManagerStatus {
        ManagerStatus {
            has_a,
            has_b,
            manifest_present: has_a || has_b,
            effective_weights: EnsembleWeights::default(),
            model_version: "untrained".to_string(),
            best_key: None,
            generation: None,
            load_issues: issues,
        }
    }

    #[tokio::test]
    async fn test_registry_initial_state() {
        let registry = HealthRegistry::new();
        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Healthy);
        assert!(health.components.is_empty());
    }

    #[tokio::test]
    async fn test_degraded_component_degrades_overall() {
        let registry = HealthRegistry::new();
        registry.register(components::SERVING).await;
        registry.register(components::ARTIFACTS).await;
        registry
            .set_degraded(components::ARTIFACTS, "no trained models")
            .await;
        assert_eq!(registry.health().await.status, ComponentStatus::Degraded);

        registry.set_ready(true).await;
        assert!(registry.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_unhealthy_component_blocks_readiness() {
        let registry = HealthRegistry::new();
        registry.register(components::TRAINER).await;
        registry.set_ready(true).await;
        registry
            .set_unhealthy(components::TRAINER, "worker pool unavailable")
            .await;

        assert_eq!(registry.health().await.status, ComponentStatus::Unhealthy);
        assert!(!registry.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_not_ready_before_startup() {
        let readiness = HealthRegistry::new().readiness().await;
        assert!(!readiness.ready);
        assert!(readiness.reason.is_some());
    }

    #[test]
    fn test_artifact_health_from_status() {
        assert_eq!(
            ComponentHealth::from_serving_status(&status(true, true, vec![])).status,
            ComponentStatus::Healthy
        );
        let none = ComponentHealth::from_serving_status(&status(false, false, vec![]));
        assert_eq!(none.status, ComponentStatus::Degraded);
        let corrupt = ComponentHealth::from_serving_status(&status(
            true,
            false,
            vec!["ARTIFACT_CORRUPT:model_B.json".to_string()],
        ));
        assert!(corrupt.message.unwrap().contains("model_B.json"));
    }

    #[test]
    fn test_trainer_health_from_latest_job() {
        assert_eq!(ComponentHealth::from_latest_job(None).status, ComponentStatus::Healthy);
        let mut job = TrainingJob::new(TrainingMode::Quick, 5);
        job.fail("boom".to_string()).unwrap();
        let health = ComponentHealth::from_latest_job(Some(&job));
        assert_eq!(health.status, ComponentStatus::Degraded);
        assert!(health.message.unwrap().contains("boom"));
    }
}
