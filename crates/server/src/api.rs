//! HTTP API for prediction, training jobs, health checks and Prometheus metrics

use engine_lib::{
    health::{components, ComponentHealth, ComponentStatus, HealthRegistry},
    BuildingRequest, EngineError, ModelServingManager, TrainingJobScheduler, Variant,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub manager: Arc<ModelServingManager>,
    pub scheduler: Arc<TrainingJobScheduler>,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        manager: Arc<ModelServingManager>,
        scheduler: Arc<TrainingJobScheduler>,
    ) -> Self {
        Self {
            health_registry,
            manager,
            scheduler,
        }
    }

    /// Recompute the artifact and trainer components from live state
    pub async fn refresh_health(&self) {
        let status = self.manager.status();
        self.health_registry
            .update(components::ARTIFACTS, ComponentHealth::from_serving_status(&status))
            .await;

        let jobs = self.scheduler.list();
        self.health_registry
            .update(components::TRAINER, ComponentHealth::from_latest_job(jobs.first()))
            .await;
    }
}

/// Error body returned as `{"error": "..."}`
pub struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            EngineError::JobNotFound(_) => StatusCode::NOT_FOUND,
            e if e.is_client_error() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(error = %self.0, "Request failed");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct VariantQuery {
    pub variant: Option<String>,
}

impl VariantQuery {
    fn parse(&self) -> Result<Variant, EngineError> {
        match self.variant.as_deref() {
            Some(raw) => raw.parse(),
            None => Ok(Variant::default()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TrainRequest {
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default = "default_k")]
    pub k: usize,
}

fn default_mode() -> String {
    "quick".to_string()
}

fn default_k() -> usize {
    5
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.refresh_health().await;
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // rule fallback still serves
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.manager.status())
}

async fn predict(
    State(state): State<Arc<AppState>>,
    Query(query): Query<VariantQuery>,
    Json(request): Json<BuildingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let variant = query.parse()?;
    Ok(Json(state.manager.predict(&request, variant)))
}

async fn predict_batch(
    State(state): State<Arc<AppState>>,
    Query(query): Query<VariantQuery>,
    Json(requests): Json<Vec<BuildingRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let variant = query.parse()?;
    Ok(Json(state.manager.batch(&requests, variant)))
}

async fn reload(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let manager = state.manager.clone();
    let status = tokio::task::spawn_blocking(move || manager.reload())
        .await
        .map_err(|e| EngineError::TrainingStep(format!("reload worker aborted: {}", e)))?;
    state.refresh_health().await;
    Ok(Json(status))
}

async fn train(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TrainRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let job_id = state.scheduler.submit(&request.mode, request.k)?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "jobId": job_id }))))
}

async fn train_status(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.scheduler.get_status(&job_id)?))
}

async fn train_jobs(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.scheduler.list())
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/status", get(status))
        .route("/predict", post(predict))
        .route("/predict/batch", post(predict_batch))
        .route("/reload", post(reload))
        .route("/train", post(train))
        .route("/train/status/:job_id", get(train_status))
        .route("/train/jobs", get(train_jobs))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
