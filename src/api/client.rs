use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode, Url};
use serde_json::Value;

use super::error::ApiError;
use super::types::{DialogueRequest, DialogueResponse, StepsBody, error_message, unwrap_envelope};
use super::{JobBackend, StepSource};
use crate::config::AppConfig;
use crate::job::{Job, JobId};
use crate::status::{
    ResultReport, StatusObservation, StatusReport, classify_result, classify_status,
    report_from_result, retry_hint,
};

/// HTTP client for the notes and workflow backend. Constructed explicitly and
/// handed to the poller and resolver; there is no shared global instance.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

struct RawResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: String,
}

impl ApiClient {
    pub fn new(
        base_url: &str,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, ApiError> {
        let base_url =
            Url::parse(base_url).map_err(|_| ApiError::InvalidUrl(base_url.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(base_url.to_string()));
        }
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()?;
        Ok(Self { client, base_url })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, ApiError> {
        Self::new(
            &config.base_url,
            Duration::from_secs(config.connect_timeout_secs),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Joins path segments onto the base URL, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn read(response: reqwest::Response) -> Result<RawResponse, ApiError> {
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await?;
        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }

    async fn get(&self, segments: &[&str]) -> Result<RawResponse, ApiError> {
        let url = self.endpoint(segments)?;
        tracing::debug!(%url, "GET");
        let response = self.client.get(url).send().await?;
        Self::read(response).await
    }

    /// Uploads a recording and creates the transcription job for `id`.
    pub async fn submit_job(
        &self,
        id: &JobId,
        file_name: &str,
        media: Vec<u8>,
    ) -> Result<Job, ApiError> {
        let url = self.endpoint(&["notes", "transcribe"])?;
        let form = Form::new()
            .text("subjectId", id.subject_id.clone())
            .text("visitId", id.visit_id.clone())
            .part("file", Part::bytes(media).file_name(file_name.to_string()));

        tracing::info!(job = %id, file = file_name, "submitting recording");
        let raw = Self::read(self.client.post(url).multipart(form).send().await?).await?;
        if !raw.status.is_success() {
            return Err(ApiError::Server {
                status: raw.status.as_u16(),
                message: error_message(&raw.body),
            });
        }
        Ok(Job::new(id.clone()))
    }

    async fn query_result(&self, id: &JobId) -> Result<ResultReport, ApiError> {
        let raw = self
            .get(&["notes", id.subject_id.as_str(), "visits", id.visit_id.as_str(), "transcript"])
            .await?;
        classify_result(raw.status, retry_hint(&raw.headers), &raw.body)
    }
}

impl JobBackend for ApiClient {
    async fn job_status(&self, id: &JobId) -> Result<StatusReport, ApiError> {
        let raw = self
            .get(&["notes", "transcribe", "status", id.subject_id.as_str(), id.visit_id.as_str()])
            .await?;
        match classify_status(raw.status, retry_hint(&raw.headers), &raw.body)? {
            StatusObservation::Report(report) => Ok(report),
            StatusObservation::NoData => {
                tracing::debug!(job = %id, "status endpoint had no data, asking transcript endpoint");
                Ok(report_from_result(self.query_result(id).await?))
            }
        }
    }

    async fn fetch_result(&self, id: &JobId) -> Result<ResultReport, ApiError> {
        self.query_result(id).await
    }

    async fn structure_dialogue(&self, id: &JobId, transcript: &str) -> Result<Value, ApiError> {
        let url = self.endpoint(&[
            "notes",
            id.subject_id.as_str(),
            "visits",
            id.visit_id.as_str(),
            "dialogue",
            "structure",
        ])?;
        let request = DialogueRequest {
            transcript: transcript.to_string(),
        };
        let raw = Self::read(self.client.post(url).json(&request).send().await?).await?;
        if !raw.status.is_success() {
            return Err(ApiError::Server {
                status: raw.status.as_u16(),
                message: error_message(&raw.body),
            });
        }
        let value = unwrap_envelope(serde_json::from_str(&raw.body)?);
        let response: DialogueResponse = serde_json::from_value(value)?;
        Ok(response.dialogue)
    }
}

impl StepSource for ApiClient {
    async fn available_steps(&self, visit_id: &str) -> Result<StepsBody, ApiError> {
        let raw = self
            .get(&["workflow", "visit", visit_id, "available-steps"])
            .await?;
        if !raw.status.is_success() {
            return Err(ApiError::Server {
                status: raw.status.as_u16(),
                message: error_message(&raw.body),
            });
        }
        let value = unwrap_envelope(serde_json::from_str(&raw.body)?);
        Ok(serde_json::from_value(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobState;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> ApiClient {
        ApiClient::new(&server.uri(), Duration::from_secs(2), Duration::from_secs(5)).unwrap()
    }

    fn job_id() -> JobId {
        JobId::new("p-7", "v-42")
    }

    #[test]
    fn rejects_invalid_base_url() {
        let err = ApiClient::new("not a url", Duration::from_secs(1), Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidUrl(_)));
    }

    #[test]
    fn endpoint_keeps_base_path_and_encodes_segments() {
        let client = ApiClient::new(
            "http://localhost:8000/api/",
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
        .unwrap();
        let url = client.endpoint(&["workflow", "visit", "a b", "available-steps"]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8000/api/workflow/visit/a%20b/available-steps"
        );
    }

    #[tokio::test]
    async fn status_maps_explicit_state() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/notes/transcribe/status/p-7/v-42"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Retry-After", "4")
                    .set_body_json(json!({"data": {"status": "processing"}})),
            )
            .mount(&server)
            .await;

        let report = client_for(&server).job_status(&job_id()).await.unwrap();
        assert_eq!(report.state, JobState::Processing);
        assert_eq!(report.retry_hint, Some(Duration::from_secs(4)));
    }

    #[tokio::test]
    async fn status_404_falls_through_to_transcript() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/notes/transcribe/status/p-7/v-42"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/notes/p-7/visits/v-42/transcript"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"transcript": "hello"})))
            .expect(1)
            .mount(&server)
            .await;

        let report = client_for(&server).job_status(&job_id()).await.unwrap();
        assert_eq!(report.state, JobState::Complete);
        assert_eq!(report.artifact.unwrap().transcript, Some(json!("hello")));
    }

    #[tokio::test]
    async fn transcript_202_is_pending() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/notes/p-7/visits/v-42/transcript"))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;

        let result = client_for(&server).fetch_result(&job_id()).await.unwrap();
        assert_eq!(result, ResultReport::Pending { retry_hint: None });
    }

    #[tokio::test]
    async fn server_error_preserves_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/notes/transcribe/status/p-7/v-42"))
            .respond_with(
                ResponseTemplate::new(500).set_body_json(json!({"message": "queue unavailable"})),
            )
            .mount(&server)
            .await;

        let err = client_for(&server).job_status(&job_id()).await.unwrap_err();
        assert_eq!(err.to_string(), "server returned status 500: queue unavailable");
    }

    #[tokio::test]
    async fn structure_dialogue_posts_transcript() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/notes/p-7/visits/v-42/dialogue/structure"))
            .and(body_json(json!({"transcript": "hello"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"dialogue": "Doctor: hello\nPatient: hi"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let dialogue = client_for(&server)
            .structure_dialogue(&job_id(), "hello")
            .await
            .unwrap();
        assert_eq!(dialogue, json!("Doctor: hello\nPatient: hi"));
    }

    #[tokio::test]
    async fn available_steps_parses_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/workflow/visit/v-42/available-steps"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "visit_id": "v-42",
                "workflow_type": "scheduled",
                "current_status": "in_progress",
                "available_steps": ["transcription", "soap_generation"]
            })))
            .mount(&server)
            .await;

        let body = client_for(&server).available_steps("v-42").await.unwrap();
        assert_eq!(body.workflow_type.as_deref(), Some("scheduled"));
        assert_eq!(body.available_steps, vec!["transcription", "soap_generation"]);
    }

    #[tokio::test]
    async fn submit_job_uploads_multipart() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/notes/transcribe"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let job = client_for(&server)
            .submit_job(&job_id(), "visit.wav", vec![0u8; 16])
            .await
            .unwrap();
        assert_eq!(job.id, job_id());
        assert_eq!(job.state, JobState::Pending);
    }

    #[tokio::test]
    async fn submit_job_surfaces_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/notes/transcribe"))
            .respond_with(ResponseTemplate::new(413).set_body_string("file too large"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .submit_job(&job_id(), "visit.wav", vec![0u8; 16])
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(413));
        assert!(err.to_string().contains("file too large"));
    }

    #[tokio::test]
    async fn unreachable_server_is_transport_error() {
        let client = ApiClient::new(
            "http://127.0.0.1:9",
            Duration::from_millis(200),
            Duration::from_millis(500),
        )
        .unwrap();
        let err = client.job_status(&job_id()).await.unwrap_err();
        assert!(matches!(err, ApiError::Transport(_)));
    }
}
