//! Training job record and its state machine

use crate::error::{EngineError, EngineResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Queued,
    Training,
    Evaluating,
    Saving,
    Ready,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "QUEUED",
            JobState::Training => "TRAINING",
            JobState::Evaluating => "EVALUATING",
            JobState::Saving => "SAVING",
            JobState::Ready => "READY",
            JobState::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Ready | JobState::Failed)
    }

    /// Allowed edges of `QUEUED → TRAINING → EVALUATING → TRAINING → SAVING → READY`,
    /// plus `FAILED` from any non-terminal state.
    ///
    /// `TRAINING` has two outgoing edges; which one is legal depends on the
    /// phase, checked by [`TrainingJob::advance`].
    pub fn can_transition_to(&self, next: JobState) -> bool {
        use JobState::*;
        match (self, next) {
            (Ready | Failed, _) => false,
            (_, Failed) => true,
            (Queued, Training) => true,
            (Training, Evaluating) | (Training, Saving) => true,
            (Evaluating, Training) => true,
            (Saving, Ready) => true,
            _ => false,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrainingMode {
    Quick,
    Full,
}

impl TrainingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrainingMode::Quick => "quick",
            TrainingMode::Full => "full",
        }
    }
}

impl fmt::Display for TrainingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrainingMode {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quick" => Ok(TrainingMode::Quick),
            "full" => Ok(TrainingMode::Full),
            other => Err(EngineError::InvalidRequest(format!(
                "unknown training mode '{}', expected quick or full",
                other
            ))),
        }
    }
}

/// `YYYYMMDD-HHMMSS-XXXXXX`: UTC timestamp plus six hex digits of a v4 UUID
pub fn new_job_id(now: DateTime<Utc>) -> String {
    let suffix: String = uuid::Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(6)
        .collect();
    format!("{}-{}", now.format("%Y%m%d-%H%M%S"), suffix.to_ascii_uppercase())
}

/// Snapshot-able record of one training job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingJob {
    pub id: String,
    pub mode: TrainingMode,
    pub fold_count: usize,
    pub state: JobState,
    pub progress: u8,
    pub log: Vec<String>,
    /// Every state visited, starting with `QUEUED`
    pub history: Vec<JobState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Version of the generation this job published
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
}

impl TrainingJob {
    pub fn new(mode: TrainingMode, fold_count: usize) -> Self {
        let now = Utc::now();
        Self {
            id: new_job_id(now),
            mode,
            fold_count,
            state: JobState::Queued,
            progress: 0,
            log: vec![format!("[TRAIN] queued (mode={}, k={})", mode, fold_count)],
            history: vec![JobState::Queued],
            error: None,
            started_at: now,
            finished_at: None,
            model_version: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Move to `next`, recording the message; rejects edges outside the state machine
    pub fn advance(&mut self, next: JobState, progress: u8, message: impl Into<String>) -> EngineResult<()> {
        if !self.allows(next) {
            return Err(EngineError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        self.state = next;
        self.progress = progress.min(100);
        self.history.push(next);
        self.log.push(message.into());
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    /// The first TRAINING phase may only lead to EVALUATING, the refit after
    /// evaluation only to SAVING
    fn allows(&self, next: JobState) -> bool {
        let evaluated = self.history.contains(&JobState::Evaluating);
        match (self.state, next) {
            (JobState::Training, JobState::Evaluating) => !evaluated,
            (JobState::Training, JobState::Saving) => evaluated,
            (current, next) => current.can_transition_to(next),
        }
    }

    /// Append a log line without changing state; ignored once terminal
    pub fn note(&mut self, message: impl Into<String>) {
        if !self.is_terminal() {
            self.log.push(message.into());
        }
    }

    /// Mark `READY` at 100 %
    pub fn complete(&mut self, model_version: String) -> EngineResult<()> {
        self.advance(
            JobState::Ready,
            100,
            format!("[TRAIN] job completed, generation {}", model_version),
        )?;
        self.model_version = Some(model_version);
        Ok(())
    }

    /// Mark `FAILED`, keeping the progress reached so far
    pub fn fail(&mut self, error: String) -> EngineResult<()> {
        let progress = self.progress;
        self.advance(JobState::Failed, progress, format!("[ERROR] {}", error))?;
        self.error = Some(error);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_job_id_format() {
        let now = Utc.with_ymd_and_hms(2025, 3, 9, 14, 5, 7).unwrap();
        let id = new_job_id(now);
        assert!(id.starts_with("20250309-140507-"));
        let suffix = &id[16..];
        assert_eq!(suffix.len(), 6);
        assert!(suffix
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn test_happy_path() {
        let mut job = TrainingJob::new(TrainingMode::Quick, 5);
        job.advance(JobState::Training, 20, "a").unwrap();
        job.advance(JobState::Evaluating, 40, "b").unwrap();
        job.advance(JobState::Training, 60, "c").unwrap();
        job.advance(JobState::Saving, 80, "d").unwrap();
        job.complete("v1".to_string()).unwrap();

        assert_eq!(
            job.history,
            vec![
                JobState::Queued,
                JobState::Training,
                JobState::Evaluating,
                JobState::Training,
                JobState::Saving,
                JobState::Ready
            ]
        );
        assert_eq!(job.progress, 100);
        assert!(job.finished_at.is_some());
        assert_eq!(job.model_version.as_deref(), Some("v1"));
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut job = TrainingJob::new(TrainingMode::Full, 3);
        job.advance(JobState::Training, 20, "a").unwrap();
        job.fail("dataset missing".to_string()).unwrap();
        assert_eq!(job.progress, 20);
        assert_eq!(job.error.as_deref(), Some("dataset missing"));

        let before = job.clone();
        assert!(job.advance(JobState::Training, 40, "again").is_err());
        assert!(job.fail("twice".to_string()).is_err());
        job.note("ignored");
        assert_eq!(job, before);
    }

    #[test]
    fn test_skipping_states_is_rejected() {
        let mut job = TrainingJob::new(TrainingMode::Quick, 5);
        assert!(matches!(
            job.advance(JobState::Saving, 80, "x"),
            Err(EngineError::InvalidTransition { .. })
        ));
        assert!(job.complete("v".to_string()).is_err());
        assert_eq!(job.state, JobState::Queued);

        // first training phase cannot jump straight to saving
        job.advance(JobState::Training, 20, "a").unwrap();
        assert!(matches!(
            job.advance(JobState::Saving, 80, "x"),
            Err(EngineError::InvalidTransition { .. })
        ));

        // evaluation happens once
        job.advance(JobState::Evaluating, 40, "b").unwrap();
        job.advance(JobState::Training, 60, "c").unwrap();
        assert!(job.advance(JobState::Evaluating, 40, "again").is_err());
        job.advance(JobState::Saving, 80, "d").unwrap();
        assert_eq!(job.history.len(), 5);
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("Quick".parse::<TrainingMode>().unwrap(), TrainingMode::Quick);
        assert!("turbo".parse::<TrainingMode>().is_err());
        assert_eq!(serde_json::to_value(TrainingMode::Full).unwrap(), "full");
        assert_eq!(serde_json::to_value(JobState::Evaluating).unwrap(), "EVALUATING");
    }
}
