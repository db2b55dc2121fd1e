//! Training event sink
//!
//! Training emits structured events (job start, split, per-combination CV
//! scores, selections, scores, ensemble weights, artifact saves). Sinks are
//! fire-and-forget: every emission goes through [`emit_quietly`], so a
//! failing sink is logged and never interrupts training.

use crate::error::{EngineError, EngineResult};
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    Event,
    Metrics,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::Event => "event",
            RecordType::Metrics => "metrics",
        }
    }
}

/// One structured training event
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingEvent {
    pub run_id: String,
    pub kind: &'static str,
    pub record_type: RecordType,
    pub phase: &'static str,
    pub candidate: Option<String>,
    pub body: Value,
}

impl TrainingEvent {
    fn new(run_id: &str, kind: &'static str, record_type: RecordType, phase: &'static str, body: Value) -> Self {
        Self {
            run_id: run_id.to_string(),
            kind,
            record_type,
            phase,
            candidate: None,
            body,
        }
    }

    fn for_candidate(mut self, candidate: &str) -> Self {
        self.candidate = Some(candidate.to_string());
        self
    }

    pub fn train_start(run_id: &str, mode: &str, fold_count: usize, dataset: &str) -> Self {
        Self::new(
            run_id,
            "train_start",
            RecordType::Event,
            "start",
            json!({ "mode": mode, "k": fold_count, "dataset": dataset }),
        )
    }

    pub fn split(run_id: &str, train_rows: usize, test_rows: usize, test_fraction: f64, seed: u64) -> Self {
        Self::new(
            run_id,
            "split",
            RecordType::Event,
            "split",
            json!({
                "train_rows": train_rows,
                "test_rows": test_rows,
                "test_fraction": test_fraction,
                "seed": seed,
            }),
        )
    }

    pub fn cv(run_id: &str, candidate: &str, params: Value, mae_mean: f64, mae_std: f64, rmse_mean: f64, r2_mean: f64) -> Self {
        Self::new(
            run_id,
            "cv",
            RecordType::Metrics,
            "cv",
            json!({
                "params": params,
                "cv_mae_mean": mae_mean,
                "cv_mae_std": mae_std,
                "cv_rmse_mean": rmse_mean,
                "cv_r2_mean": r2_mean,
            }),
        )
        .for_candidate(candidate)
    }

    pub fn cv_best_selected(run_id: &str, candidate: &str, params: Value, mae_mean: f64, combos: usize) -> Self {
        Self::new(
            run_id,
            "cv_best_selected",
            RecordType::Event,
            "cv",
            json!({ "params": params, "cv_mae_mean": mae_mean, "combinations": combos }),
        )
        .for_candidate(candidate)
    }

    pub fn score_train(run_id: &str, candidate: &str, mae: f64, rmse: f64, r2: f64) -> Self {
        Self::new(
            run_id,
            "score_train",
            RecordType::Metrics,
            "train",
            json!({ "train_mae": mae, "train_rmse": rmse, "train_r2": r2 }),
        )
        .for_candidate(candidate)
    }

    pub fn score_test(run_id: &str, candidate: &str, mae: f64, rmse: f64, r2: f64, delta_mae: f64) -> Self {
        Self::new(
            run_id,
            "score_test",
            RecordType::Metrics,
            "test",
            json!({ "test_mae": mae, "test_rmse": rmse, "test_r2": r2, "delta_mae": delta_mae }),
        )
        .for_candidate(candidate)
    }

    pub fn ensemble(run_id: &str, w_a: f64, w_b: f64, train_mae: Option<f64>, test_mae: Option<f64>) -> Self {
        Self::new(
            run_id,
            "ensemble",
            RecordType::Metrics,
            "ensemble",
            json!({ "wA": w_a, "wB": w_b, "train_mae": train_mae, "test_mae": test_mae }),
        )
        .for_candidate("C")
    }

    pub fn artifacts_saved(run_id: &str, version: &str, best_key: &str, location: &Path) -> Self {
        Self::new(
            run_id,
            "artifacts_saved",
            RecordType::Event,
            "save",
            json!({ "version": version, "best": best_key, "location": location.display().to_string() }),
        )
    }

    pub fn tags(&self) -> BTreeMap<&'static str, String> {
        let mut tags = BTreeMap::new();
        tags.insert("run_id", self.run_id.clone());
        tags.insert("phase", self.phase.to_string());
        if let Some(c) = &self.candidate {
            tags.insert("model", c.clone());
        }
        tags
    }

    /// NDJSON record: `{id, ts, type, kind, area, payload|metrics, tags}`
    pub fn to_record(&self) -> Value {
        let body_key = match self.record_type {
            RecordType::Event => "payload",
            RecordType::Metrics => "metrics",
        };
        let mut record = json!({
            "id": uuid::Uuid::new_v4().to_string(),
            "ts": Utc::now().to_rfc3339(),
            "type": self.record_type.as_str(),
            "kind": self.kind,
            "area": "ml",
            "tags": self.tags(),
        });
        record[body_key] = self.body.clone();
        record
    }
}

/// Destination for training events
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &TrainingEvent) -> EngineResult<()>;
}

/// Emit and swallow sink failures
pub fn emit_quietly(sink: &dyn EventSink, event: TrainingEvent) {
    if let Err(e) = sink.emit(&event) {
        warn!(
            event = "sink_failure",
            kind = event.kind,
            run_id = %event.run_id,
            error = %e,
            "Dropping training event"
        );
    }
}

/// Writes events as structured tracing records
#[derive(Debug, Clone, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &TrainingEvent) -> EngineResult<()> {
        info!(
            event = "training_event",
            kind = event.kind,
            record_type = event.record_type.as_str(),
            run_id = %event.run_id,
            phase = event.phase,
            model = ?event.candidate,
            body = %event.body,
            "Training event"
        );
        Ok(())
    }
}

/// Appends one JSON object per line to `<dir>/<YYYY-MM-DD>.jsonl`
#[derive(Debug)]
pub struct JsonlSink {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn current_file(&self) -> PathBuf {
        self.dir
            .join(format!("{}.jsonl", Utc::now().format("%Y-%m-%d")))
    }
}

impl EventSink for JsonlSink {
    fn emit(&self, event: &TrainingEvent) -> EngineResult<()> {
        let sink_err = |e: std::io::Error| EngineError::Sink(e.to_string());
        let line = serde_json::to_string(&event.to_record())
            .map_err(|e| EngineError::Sink(e.to_string()))?;

        let _guard = self.write_lock.lock().unwrap_or_else(|p| p.into_inner());
        std::fs::create_dir_all(&self.dir).map_err(sink_err)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.current_file())
            .map_err(sink_err)?;
        writeln!(file, "{}", line).map_err(sink_err)?;
        Ok(())
    }
}

/// Forwards every event to each inner sink
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }

    pub fn push(&mut self, sink: Arc<dyn EventSink>) {
        self.sinks.push(sink);
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, event: &TrainingEvent) -> EngineResult<()> {
        let mut first_err = None;
        for sink in &self.sinks {
            if let Err(e) = sink.emit(event) {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct FailingSink;

    impl EventSink for FailingSink {
        fn emit(&self, _event: &TrainingEvent) -> EngineResult<()> {
            Err(EngineError::Sink("disk full".to_string()))
        }
    }

    #[derive(Default)]
    struct CountingSink(AtomicUsize);

    impl EventSink for CountingSink {
        fn emit(&self, _event: &TrainingEvent) -> EngineResult<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_record_shape() {
        let event = TrainingEvent::score_test("run-1", "A", 1.0, 2.0, 0.5, 0.25);
        let record = event.to_record();
        assert_eq!(record["type"], "metrics");
        assert_eq!(record["kind"], "score_test");
        assert_eq!(record["metrics"]["delta_mae"], 0.25);
        assert_eq!(record["tags"]["run_id"], "run-1");
        assert_eq!(record["tags"]["model"], "A");
        assert!(record.get("payload").is_none());

        let start = TrainingEvent::train_start("run-1", "quick", 5, "synthetic").to_record();
        assert_eq!(start["type"], "event");
        assert_eq!(start["payload"]["k"], 5);
    }

    #[test]
    fn test_jsonl_sink_appends_lines() {
        let dir = TempDir::new().unwrap();
        let sink = JsonlSink::new(dir.path());
        sink.emit(&TrainingEvent::train_start("r", "quick", 5, "synthetic"))
            .unwrap();
        sink.emit(&TrainingEvent::split("r", 80, 20, 0.2, 42)).unwrap();

        let content = std::fs::read_to_string(sink.current_file()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let second: Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["kind"], "split");
    }

    #[test]
    fn test_fanout_reaches_all_sinks_despite_failure() {
        let counter = Arc::new(CountingSink::default());
        let fanout = FanoutSink::new(vec![Arc::new(FailingSink), counter.clone()]);
        let result = fanout.emit(&TrainingEvent::split("r", 1, 1, 0.5, 1));
        assert!(matches!(result, Err(EngineError::Sink(_))));
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);

        // swallowed
        emit_quietly(&fanout, TrainingEvent::split("r", 1, 1, 0.5, 1));
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);
    }
}
