use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity of a transcription job: one per (subject, visit).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId {
    pub subject_id: String,
    pub visit_id: String,
}

impl JobId {
    pub fn new(subject_id: impl Into<String>, visit_id: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            visit_id: visit_id.into(),
        }
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.subject_id, self.visit_id)
    }
}

/// Server-side state of a job, normalized from the status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Processing,
    Complete,
    Failed,
}

impl JobState {
    /// Parses the `status` field of a status body. Returns `None` for values
    /// outside the known vocabulary.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" | "queued" => Some(JobState::Pending),
            "processing" => Some(JobState::Processing),
            "complete" | "completed" | "done" => Some(JobState::Complete),
            "failed" => Some(JobState::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Complete | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Pending => write!(f, "pending"),
            JobState::Processing => write!(f, "processing"),
            JobState::Complete => write!(f, "complete"),
            JobState::Failed => write!(f, "failed"),
        }
    }
}

/// A submitted transcription job as observed by the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub state: JobState,
    pub message: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

impl Job {
    pub fn new(id: JobId) -> Self {
        Self {
            id,
            state: JobState::Pending,
            message: None,
            submitted_at: Utc::now(),
        }
    }

    /// Records the latest observed state; a terminal state is never left.
    pub fn observe(&mut self, state: JobState, message: Option<String>) {
        if self.state.is_terminal() {
            return;
        }
        self.state = state;
        if message.is_some() {
            self.message = message;
        }
    }
}

/// Where the wait before the next attempt came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelaySource {
    /// `Retry-After` sent with the status response.
    ServerHint,
    /// Exponential backoff from the attempt index.
    Computed,
}

/// One non-terminal observation within a poll session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollAttempt {
    pub attempt_index: u32,
    pub elapsed_ms: u64,
    pub delay_ms: u64,
    pub delay_source: DelaySource,
}

impl PollAttempt {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}
