pub mod client;
pub mod error;
pub mod types;

use std::future::Future;

use serde_json::Value;

pub use client::ApiClient;
pub use error::ApiError;
pub use types::{StepsBody, TranscriptPayload};

use crate::job::JobId;
use crate::status::{ResultReport, StatusReport};

/// The job-side calls the poller needs. Implemented by [`ApiClient`]; tests
/// substitute scripted backends.
pub trait JobBackend: Send + Sync {
    /// Single-shot status query, falling through to the result endpoint when
    /// the status endpoint has no data.
    fn job_status(&self, id: &JobId)
    -> impl Future<Output = Result<StatusReport, ApiError>> + Send;

    /// Retrieves the produced transcript once the job reports completion.
    fn fetch_result(&self, id: &JobId)
    -> impl Future<Output = Result<ResultReport, ApiError>> + Send;

    /// Asks the server to reformat raw transcript text into role-tagged dialogue.
    fn structure_dialogue(
        &self,
        id: &JobId,
        transcript: &str,
    ) -> impl Future<Output = Result<Value, ApiError>> + Send;
}

/// Source of the per-visit list of permitted workflow steps.
pub trait StepSource: Send + Sync {
    fn available_steps(
        &self,
        visit_id: &str,
    ) -> impl Future<Output = Result<StepsBody, ApiError>> + Send;
}
