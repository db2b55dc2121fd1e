//! API client for communicating with the savings server

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use url::Url;

/// Non-success response from the server
#[derive(Debug, thiserror::Error)]
#[error("API error ({status}): {message}")]
pub struct ApiError {
    pub status: u16,
    pub message: String,
}

/// API client for the savings server
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        decode(response).await
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        decode(response).await
    }

    pub async fn predict(&self, request: &PredictRequest, variant: &str) -> Result<Prediction> {
        self.post(&format!("predict?variant={}", variant), request)
            .await
    }

    pub async fn status(&self) -> Result<ServingStatus> {
        self.get("status").await
    }

    pub async fn reload(&self) -> Result<ServingStatus> {
        self.post("reload", &serde_json::json!({})).await
    }

    pub async fn start_training(&self, mode: &str, k: usize) -> Result<JobAccepted> {
        self.post("train", &TrainRequest { mode: mode.to_string(), k })
            .await
    }

    pub async fn job_status(&self, job_id: &str) -> Result<Job> {
        self.get(&format!("train/status/{}", job_id)).await
    }

    pub async fn list_jobs(&self) -> Result<Vec<Job>> {
        self.get("train/jobs").await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorResponse>(&body)
            .map(|e| e.error)
            .unwrap_or(body);
        return Err(ApiError {
            status: status.as_u16(),
            message,
        }
        .into());
    }

    response.json().await.context("Failed to parse response")
}

// API request and response types

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictRequest {
    #[serde(rename = "type")]
    pub building_type: String,
    pub floor_area_m2: f64,
    pub built_year: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub energy_kwh: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline_kwh: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub years_from: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub years_to: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tariff_per_kwh: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub building_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Kpi {
    pub saving_pct: f64,
    pub saving_kwh_yr: f64,
    pub saving_cost_yr: f64,
    pub payback_years: f64,
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    pub schema_version: String,
    pub model_version: String,
    pub years: Vec<i32>,
    pub after_series: Vec<f64>,
    pub saving_series: Vec<f64>,
    pub cost_saving_series: Vec<f64>,
    pub kpi: Kpi,
    pub source: String,
    pub variant: String,
    #[serde(default)]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Weights {
    pub w_a: f64,
    pub w_b: f64,
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServingStatus {
    pub has_a: bool,
    pub has_b: bool,
    pub manifest_present: bool,
    pub effective_weights: Weights,
    pub model_version: String,
    #[serde(default)]
    pub best_key: Option<String>,
    #[serde(default)]
    pub generation: Option<String>,
    #[serde(default)]
    pub load_issues: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainRequest {
    pub mode: String,
    pub k: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobAccepted {
    pub job_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub mode: String,
    pub fold_count: usize,
    pub state: String,
    pub progress: u8,
    #[serde(default)]
    pub log: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub model_version: Option<String>,
}

impl Job {
    pub fn is_terminal(&self) -> bool {
        matches!(self.state.as_str(), "READY" | "FAILED")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
