use std::time::Duration;

use thiserror::Error;

use crate::api::ApiError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Backend error: {0}")]
    Api(#[from] ApiError),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Why a poll session ended without a transcript.
///
/// Every variant is terminal for the session. Enrichment failures never show
/// up here: they are absorbed while building the artifact.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PollError {
    /// No response was received.
    #[error("network error: {0}")]
    Transport(String),

    /// Non-2xx response; `message` is the server's text, verbatim.
    #[error("server returned status {status}: {message}")]
    Server { status: u16, message: String },

    /// The job itself reported `failed`.
    #[error("{0}")]
    State(String),

    /// A success status with a body that breaks the contract. Never retried.
    #[error("malformed server response: {0}")]
    Parse(String),

    /// Deadline passed and the final check still saw a non-terminal state.
    #[error("transcription did not finish within {}", format_ceiling(.deadline_ms))]
    Timeout { elapsed_ms: u64, deadline_ms: u64 },
}

impl From<ApiError> for PollError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Server { status, message } => PollError::Server { status, message },
            ApiError::Parse(msg) => PollError::Parse(msg),
            other => PollError::Transport(other.to_string()),
        }
    }
}

impl PollError {
    /// Short explanation plus what the user can do about it.
    pub fn user_message(&self) -> String {
        match self {
            PollError::Timeout { deadline_ms, .. } => format!(
                "Transcription did not finish within {}. Check back later, or retry with a shorter recording.",
                format_ceiling(deadline_ms)
            ),
            PollError::State(msg) => format!("Transcription failed: {msg}. You can retry the upload."),
            other => format!("Could not get the transcription status ({other}). Please retry."),
        }
    }
}

fn format_ceiling(ms: &u64) -> String {
    let secs = Duration::from_millis(*ms).as_secs();
    match (secs / 60, secs % 60) {
        (0, s) => format!("{s} seconds"),
        (1, 0) => "1 minute".to_string(),
        (m, 0) => format!("{m} minutes"),
        (m, s) => format!("{m}m {s}s"),
    }
}

/// Failure to fetch the steps for a visit.
#[derive(Debug, Error)]
#[error("failed to load workflow steps for visit {visit_id}: {source}")]
pub struct WorkflowError {
    pub visit_id: String,
    #[source]
    pub source: ApiError,
}

impl WorkflowError {
    /// The backend reports unknown visits as a 404, or with a "not found"
    /// message. Only server responses are inspected: transport errors embed
    /// the request URL, which contains the visit id.
    pub fn is_not_found(&self) -> bool {
        match &self.source {
            ApiError::Server { status: 404, .. } => true,
            ApiError::Server { message, .. } => {
                let text = message.to_lowercase();
                text.contains("404") || text.contains("not found")
            }
            _ => false,
        }
    }

    pub fn user_message(&self) -> String {
        if self.is_not_found() {
            format!("Visit {} was not found.", self.visit_id)
        } else {
            format!(
                "Could not load the available steps for visit {}. Check your connection and try again.",
                self.visit_id
            )
        }
    }
}
