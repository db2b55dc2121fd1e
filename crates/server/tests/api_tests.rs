//! Integration tests for the savings server API endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use engine_lib::{
    health::{components, HealthRegistry},
    jobs::ModeProfile,
    ArtifactStore, ModelServingManager, StoreConfig, StructuredLogger, SchedulerConfig,
    TracingSink, TrainingConfig, TrainingJobScheduler, TrainingPipeline,
};
use savings_server::api::{create_router, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

async fn setup_test_app(dir: &TempDir) -> (Router, Arc<AppState>) {
    let store = Arc::new(
        ArtifactStore::new(StoreConfig {
            root: dir.path().join("models"),
            generations_to_keep: 3,
        })
        .unwrap(),
    );
    let training = TrainingConfig {
        quick: ModeProfile {
            synthetic_rows: 60,
            forest_trees: 2,
        },
        workers: 1,
        ..Default::default()
    };
    let logger = StructuredLogger::new("api-test");
    let pipeline =
        Arc::new(TrainingPipeline::new(training, store.clone(), Arc::new(TracingSink)).unwrap());
    let scheduler = Arc::new(TrainingJobScheduler::new(
        pipeline,
        SchedulerConfig::default(),
        logger.clone(),
    ));
    let manager = Arc::new(ModelServingManager::new(store, logger));

    let health_registry = HealthRegistry::new();
    health_registry.register(components::SERVING).await;
    let state = Arc::new(AppState::new(health_registry, manager, scheduler));
    let router = create_router(state.clone());

    (router, state)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn office() -> Value {
    json!({ "type": "office", "floorAreaM2": 1000.0, "builtYear": 1995 })
}

#[tokio::test]
async fn test_healthz_reports_degraded_without_models() {
    let dir = TempDir::new().unwrap();
    let (app, _state) = setup_test_app(&dir).await;

    let response = app.oneshot(get("/healthz")).await.unwrap();

    // Degraded still returns 200 (rule fallback serves)
    assert_eq!(response.status(), StatusCode::OK);
    let health = body_json(response).await;
    assert_eq!(health["status"], "degraded");
    assert_eq!(health["components"]["artifacts"]["status"], "degraded");
    assert_eq!(health["components"]["trainer"]["status"], "healthy");
}

#[tokio::test]
async fn test_readyz_follows_startup() {
    let dir = TempDir::new().unwrap();
    let (app, state) = setup_test_app(&dir).await;

    let response = app.clone().oneshot(get("/readyz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let readiness = body_json(response).await;
    assert_eq!(readiness["ready"], false);

    state.health_registry.set_ready(true).await;
    let response = app.oneshot(get("/readyz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_metrics_exposes_engine_families() {
    let dir = TempDir::new().unwrap();
    let (app, _state) = setup_test_app(&dir).await;

    // one prediction so the labelled families have a sample
    let response = app
        .clone()
        .oneshot(post_json("/predict", office()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("savings_engine_predictions_total"));
    assert!(text.contains("savings_engine_prediction_latency_seconds"));
}

#[tokio::test]
async fn test_predict_without_models_uses_rule_fallback() {
    let dir = TempDir::new().unwrap();
    let (app, _state) = setup_test_app(&dir).await;

    let response = app.oneshot(post_json("/predict", office())).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let result = body_json(response).await;
    assert_eq!(result["source"], "RULE_FALLBACK");
    assert_eq!(result["variant"], "C");
    assert_eq!(result["modelVersion"], "untrained");
    assert_eq!(result["schemaVersion"], "1.0");
    let pct = result["kpi"]["savingPct"].as_f64().unwrap();
    assert!((5.0..=30.0).contains(&pct));
    assert_eq!(
        result["years"].as_array().unwrap().len(),
        result["afterSeries"].as_array().unwrap().len()
    );
}

#[tokio::test]
async fn test_predict_rejects_unknown_variant() {
    let dir = TempDir::new().unwrap();
    let (app, _state) = setup_test_app(&dir).await;

    let response = app
        .oneshot(post_json("/predict?variant=Z", office()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("unknown variant"));
}

#[tokio::test]
async fn test_predict_rejects_malformed_json() {
    let dir = TempDir::new().unwrap();
    let (app, _state) = setup_test_app(&dir).await;

    let request = Request::builder()
        .method("POST")
        .uri("/predict")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_batch_returns_one_result_per_request() {
    let dir = TempDir::new().unwrap();
    let (app, _state) = setup_test_app(&dir).await;

    let batch = json!([
        office(),
        { "type": "factory", "floorAreaM2": 5000.0, "builtYear": 1900 },
        {}
    ]);
    let response = app
        .oneshot(post_json("/predict/batch?variant=A", batch))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let results = body_json(response).await;
    let results = results.as_array().unwrap();
    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|r| r["variant"] == "A"));
    assert_eq!(results[1]["kpi"]["savingPct"], 30.0);
}

#[tokio::test]
async fn test_status_and_reload_without_artifacts() {
    let dir = TempDir::new().unwrap();
    let (app, _state) = setup_test_app(&dir).await;

    let response = app.clone().oneshot(get("/status")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let status = body_json(response).await;
    assert_eq!(status["hasA"], false);
    assert_eq!(status["hasB"], false);
    assert_eq!(status["effectiveWeights"]["wA"], 0.5);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/reload")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let status = body_json(response).await;
    assert_eq!(status["modelVersion"], "untrained");
}

#[tokio::test]
async fn test_train_rejects_invalid_submissions() {
    let dir = TempDir::new().unwrap();
    let (app, _state) = setup_test_app(&dir).await;

    let response = app
        .clone()
        .oneshot(post_json("/train", json!({ "mode": "turbo", "k": 5 })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(post_json("/train", json!({ "mode": "quick", "k": 1 })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app.oneshot(get("/train/status/unknown-job")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("unknown-job"));
}

#[tokio::test]
async fn test_train_then_reload_serves_ml() {
    let dir = TempDir::new().unwrap();
    let (app, _state) = setup_test_app(&dir).await;

    let response = app
        .clone()
        .oneshot(post_json("/train", json!({ "mode": "quick", "k": 3 })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let job_id = body_json(response).await["jobId"]
        .as_str()
        .unwrap()
        .to_string();

    let mut job = Value::Null;
    for _ in 0..1200 {
        let response = app
            .clone()
            .oneshot(get(&format!("/train/status/{}", job_id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        job = body_json(response).await;
        if job["state"] == "READY" || job["state"] == "FAILED" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(job["state"], "READY", "job: {}", job);
    assert_eq!(job["progress"], 100);

    let response = app.clone().oneshot(get("/train/jobs")).await.unwrap();
    let jobs = body_json(response).await;
    assert_eq!(jobs.as_array().unwrap().len(), 1);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/reload")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = body_json(response).await;
    assert_eq!(status["hasA"], true);
    assert_eq!(status["hasB"], true);
    assert_eq!(status["modelVersion"], job["modelVersion"]);

    let response = app.oneshot(post_json("/predict", office())).await.unwrap();
    let result = body_json(response).await;
    assert_eq!(result["source"], "ML");
}
