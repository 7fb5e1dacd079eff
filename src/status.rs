//! Normalizes raw status and result responses into job states.
//!
//! Precedence for the status endpoint:
//! 1. `202 Accepted` means the job is still working.
//! 2. `200` with a `status` field is taken verbatim; no field but an inlined
//!    artifact means complete.
//! 3. A success status with an empty body is an anomaly and is retried.
//! 4. Any other non-2xx is a server error carrying code and body text.
//! 5. A malformed body on a success status is a parse error and ends the
//!    session without retrying.
//!
//! A `404` or a body with neither status nor artifact carries no data; the
//! client then falls through to the result endpoint.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde_json::Value;

use crate::api::ApiError;
use crate::api::types::{StatusBody, TranscriptPayload, error_message, unwrap_envelope};
use crate::job::JobState;

/// One normalized status observation.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub state: JobState,
    pub message: Option<String>,
    pub retry_hint: Option<Duration>,
    /// Present when the status response already carried the transcript.
    pub artifact: Option<TranscriptPayload>,
}

impl StatusReport {
    pub fn new(state: JobState) -> Self {
        Self {
            state,
            message: None,
            retry_hint: None,
            artifact: None,
        }
    }

    pub fn with_hint(mut self, retry_hint: Option<Duration>) -> Self {
        self.retry_hint = retry_hint;
        self
    }
}

/// Outcome of classifying the status endpoint alone.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusObservation {
    Report(StatusReport),
    /// Nothing to go on; ask the result endpoint instead.
    NoData,
}

/// Outcome of the result endpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultReport {
    Ready(TranscriptPayload),
    Pending { retry_hint: Option<Duration> },
}

/// Reads `Retry-After` as (possibly fractional) seconds. Negative, non-finite
/// and non-numeric values are ignored.
pub fn retry_hint(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?;
    let secs = raw.trim().parse::<f64>().ok()?;
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(secs).ok()
}

fn parse_object(body: &str, what: &str) -> Result<Value, ApiError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| ApiError::Parse(format!("malformed {what} body: {e}")))?;
    let value = unwrap_envelope(value);
    if !value.is_object() {
        return Err(ApiError::Parse(format!("{what} body is not a JSON object")));
    }
    Ok(value)
}

pub fn classify_status(
    status: StatusCode,
    hint: Option<Duration>,
    body: &str,
) -> Result<StatusObservation, ApiError> {
    if status == StatusCode::ACCEPTED {
        return Ok(StatusObservation::Report(
            StatusReport::new(JobState::Processing).with_hint(hint),
        ));
    }
    if status == StatusCode::NOT_FOUND {
        return Ok(StatusObservation::NoData);
    }
    if !status.is_success() {
        return Err(ApiError::Server {
            status: status.as_u16(),
            message: error_message(body),
        });
    }
    if body.trim().is_empty() {
        tracing::warn!(status = status.as_u16(), "empty success body from status endpoint, retrying");
        return Ok(StatusObservation::Report(
            StatusReport::new(JobState::Processing).with_hint(hint),
        ));
    }

    let parsed: StatusBody = serde_json::from_value(parse_object(body, "status")?)?;
    let artifact = parsed.artifact();
    match parsed.status {
        Some(raw) => {
            let state = JobState::parse(&raw)
                .ok_or_else(|| ApiError::Parse(format!("unrecognized job status {raw:?}")))?;
            Ok(StatusObservation::Report(StatusReport {
                state,
                message: parsed.message,
                retry_hint: hint,
                artifact,
            }))
        }
        None => match artifact {
            Some(artifact) => Ok(StatusObservation::Report(StatusReport {
                state: JobState::Complete,
                message: parsed.message,
                retry_hint: hint,
                artifact: Some(artifact),
            })),
            None => Ok(StatusObservation::NoData),
        },
    }
}

pub fn classify_result(
    status: StatusCode,
    hint: Option<Duration>,
    body: &str,
) -> Result<ResultReport, ApiError> {
    if status == StatusCode::ACCEPTED {
        return Ok(ResultReport::Pending { retry_hint: hint });
    }
    if !status.is_success() {
        return Err(ApiError::Server {
            status: status.as_u16(),
            message: error_message(body),
        });
    }
    if body.trim().is_empty() {
        tracing::warn!(status = status.as_u16(), "empty success body from transcript endpoint, retrying");
        return Ok(ResultReport::Pending { retry_hint: hint });
    }
    let payload: TranscriptPayload = serde_json::from_value(parse_object(body, "transcript")?)?;
    Ok(ResultReport::Ready(payload))
}

/// Folds a result-endpoint outcome into a status report.
pub fn report_from_result(result: ResultReport) -> StatusReport {
    match result {
        ResultReport::Ready(payload) => StatusReport {
            artifact: Some(payload),
            ..StatusReport::new(JobState::Complete)
        },
        ResultReport::Pending { retry_hint } => {
            StatusReport::new(JobState::Processing).with_hint(retry_hint)
        }
    }
}
