//! Visit workflow steps: which actions are currently permitted for a visit.
//!
//! The server's list is authoritative. The resolver only normalizes it
//! (drops duplicates, classifies the workflow type) and never adds steps.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::{StepSource, StepsBody};
use crate::error::WorkflowError;

/// A named action in the visit workflow. Values outside the known set are
/// carried through unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StepId {
    Intake,
    PreVisitSummary,
    Transcription,
    Vitals,
    SoapGeneration,
    PostVisitSummary,
    Other(String),
}

impl StepId {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "intake" => StepId::Intake,
            "pre_visit_summary" => StepId::PreVisitSummary,
            "transcription" => StepId::Transcription,
            "vitals" => StepId::Vitals,
            "soap_generation" => StepId::SoapGeneration,
            "post_visit_summary" => StepId::PostVisitSummary,
            other => StepId::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            StepId::Intake => "intake",
            StepId::PreVisitSummary => "pre_visit_summary",
            StepId::Transcription => "transcription",
            StepId::Vitals => "vitals",
            StepId::SoapGeneration => "soap_generation",
            StepId::PostVisitSummary => "post_visit_summary",
            StepId::Other(raw) => raw,
        }
    }

    /// Display label; unknown steps get a title-cased version of the raw id.
    pub fn label(&self) -> String {
        match self {
            StepId::Intake => "Intake".to_string(),
            StepId::PreVisitSummary => "Pre-Visit Summary".to_string(),
            StepId::Transcription => "Transcription".to_string(),
            StepId::Vitals => "Vitals".to_string(),
            StepId::SoapGeneration => "SOAP Note".to_string(),
            StepId::PostVisitSummary => "Post-Visit Summary".to_string(),
            StepId::Other(raw) => raw
                .split(['_', '-', ' '])
                .filter(|word| !word.is_empty())
                .map(|word| {
                    let mut chars = word.chars();
                    match chars.next() {
                        Some(first) => first.to_uppercase().chain(chars).collect(),
                        None => String::new(),
                    }
                })
                .collect::<Vec<String>>()
                .join(" "),
        }
    }
}

impl From<String> for StepId {
    fn from(raw: String) -> Self {
        StepId::parse(&raw)
    }
}

impl From<StepId> for String {
    fn from(step: StepId) -> Self {
        step.as_str().to_string()
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkflowType {
    Scheduled,
    WalkIn,
}

impl WorkflowType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "scheduled" => Some(WorkflowType::Scheduled),
            "walk-in" | "walk_in" | "walkin" => Some(WorkflowType::WalkIn),
            _ => None,
        }
    }
}

impl fmt::Display for WorkflowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowType::Scheduled => write!(f, "scheduled"),
            WorkflowType::WalkIn => write!(f, "walk-in"),
        }
    }
}

/// Fallback when the server gives no type: a vitals step means walk-in.
pub fn infer_workflow_type(steps: &[StepId]) -> WorkflowType {
    if steps.contains(&StepId::Vitals) {
        WorkflowType::WalkIn
    } else {
        WorkflowType::Scheduled
    }
}

/// Snapshot of a visit's workflow. Always replaced as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub visit_id: String,
    pub workflow_type: WorkflowType,
    /// True when `workflow_type` came from [`infer_workflow_type`].
    pub workflow_type_inferred: bool,
    pub current_status: Option<String>,
    pub available_steps: Vec<StepId>,
}

impl WorkflowState {
    pub fn from_body(requested_visit: &str, body: StepsBody) -> Self {
        let mut available_steps: Vec<StepId> = Vec::with_capacity(body.available_steps.len());
        for step in body.available_steps.iter().map(|raw| StepId::parse(raw)) {
            if !available_steps.contains(&step) {
                available_steps.push(step);
            }
        }

        let explicit = body.workflow_type.as_deref().and_then(|raw| {
            let parsed = WorkflowType::parse(raw);
            if parsed.is_none() {
                tracing::warn!(visit = requested_visit, workflow_type = raw, "unrecognized workflow type, inferring from steps");
            }
            parsed
        });
        let (workflow_type, workflow_type_inferred) = match explicit {
            Some(explicit) => (explicit, false),
            None => (infer_workflow_type(&available_steps), true),
        };

        let visit_id = match body.visit_id {
            Some(Value::String(id)) => id,
            Some(Value::Number(id)) => id.to_string(),
            _ => requested_visit.to_string(),
        };

        Self {
            visit_id,
            workflow_type,
            workflow_type_inferred,
            current_status: body.current_status,
            available_steps,
        }
    }

    pub fn allows(&self, step: &StepId) -> bool {
        self.available_steps.contains(step)
    }
}

/// Mutating actions after which step availability must be re-fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitAction {
    TranscriptionCompleted,
    VitalsSaved,
    SummaryGenerated,
}

impl fmt::Display for VisitAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VisitAction::TranscriptionCompleted => write!(f, "transcription completed"),
            VisitAction::VitalsSaved => write!(f, "vitals saved"),
            VisitAction::SummaryGenerated => write!(f, "summary generated"),
        }
    }
}

pub struct WorkflowStepResolver<S> {
    source: Arc<S>,
    latest: Mutex<HashMap<String, WorkflowState>>,
}

impl<S: StepSource> WorkflowStepResolver<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self {
            source,
            latest: Mutex::new(HashMap::new()),
        }
    }

    /// Fetches the permitted steps for `visit_id` and replaces the cached
    /// snapshot. A failed fetch leaves the previous snapshot in place.
    pub async fn fetch_steps(&self, visit_id: &str) -> Result<WorkflowState, WorkflowError> {
        let body = self
            .source
            .available_steps(visit_id)
            .await
            .map_err(|source| WorkflowError {
                visit_id: visit_id.to_string(),
                source,
            })?;
        let state = WorkflowState::from_body(visit_id, body);
        tracing::debug!(
            visit = visit_id,
            workflow_type = %state.workflow_type,
            inferred = state.workflow_type_inferred,
            steps = state.available_steps.len(),
            "workflow steps fetched"
        );
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(visit_id.to_string(), state.clone());
        Ok(state)
    }

    pub async fn refresh_after(
        &self,
        visit_id: &str,
        action: VisitAction,
    ) -> Result<WorkflowState, WorkflowError> {
        tracing::info!(visit = visit_id, %action, "refreshing workflow steps");
        self.fetch_steps(visit_id).await
    }

    /// Most recently fetched snapshot for the visit, if any.
    pub fn latest(&self, visit_id: &str) -> Option<WorkflowState> {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(visit_id)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;
    use std::collections::VecDeque;

    struct ScriptedSteps {
        responses: Mutex<VecDeque<Result<StepsBody, ApiError>>>,
    }

    impl ScriptedSteps {
        fn new(responses: Vec<Result<StepsBody, ApiError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
            })
        }
    }

    impl StepSource for ScriptedSteps {
        async fn available_steps(&self, _visit_id: &str) -> Result<StepsBody, ApiError> {
            let next = self.responses.lock().unwrap().pop_front();
            next.expect("no scripted response left")
        }
    }

    fn body(workflow_type: Option<&str>, steps: &[&str]) -> StepsBody {
        StepsBody {
            visit_id: Some(Value::String("v-1".into())),
            workflow_type: workflow_type.map(str::to_string),
            current_status: Some("in_progress".into()),
            available_steps: steps.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn step_ids_parse_and_label() {
        assert_eq!(StepId::parse("soap_generation"), StepId::SoapGeneration);
        assert_eq!(StepId::SoapGeneration.as_str(), "soap_generation");
        assert_eq!(StepId::PreVisitSummary.label(), "Pre-Visit Summary");

        let unknown = StepId::parse("lab_orders");
        assert_eq!(unknown, StepId::Other("lab_orders".into()));
        assert_eq!(unknown.as_str(), "lab_orders");
        assert_eq!(unknown.label(), "Lab Orders");
    }

    #[test]
    fn step_id_serde_uses_wire_names() {
        let steps: Vec<StepId> = serde_json::from_str(r#"["vitals", "x_ray"]"#).unwrap();
        assert_eq!(steps, vec![StepId::Vitals, StepId::Other("x_ray".into())]);
        assert_eq!(serde_json::to_string(&steps).unwrap(), r#"["vitals","x_ray"]"#);
    }

    #[test]
    fn inference_uses_vitals_presence() {
        assert_eq!(
            infer_workflow_type(&[StepId::Intake, StepId::Vitals]),
            WorkflowType::WalkIn
        );
        assert_eq!(
            infer_workflow_type(&[StepId::Transcription]),
            WorkflowType::Scheduled
        );
    }

    #[test]
    fn explicit_type_is_never_overridden() {
        let state = WorkflowState::from_body("v-1", body(Some("scheduled"), &["vitals"]));
        assert_eq!(state.workflow_type, WorkflowType::Scheduled);
        assert!(!state.workflow_type_inferred);
    }

    #[test]
    fn missing_or_unknown_type_is_inferred() {
        let state = WorkflowState::from_body("v-1", body(None, &["vitals"]));
        assert_eq!(state.workflow_type, WorkflowType::WalkIn);
        assert!(state.workflow_type_inferred);

        let state = WorkflowState::from_body("v-1", body(Some("telehealth"), &["intake"]));
        assert_eq!(state.workflow_type, WorkflowType::Scheduled);
        assert!(state.workflow_type_inferred);
    }

    #[test]
    fn duplicate_steps_are_dropped_in_order() {
        let state = WorkflowState::from_body(
            "v-1",
            body(Some("walk_in"), &["vitals", "transcription", "vitals", "intake"]),
        );
        assert_eq!(
            state.available_steps,
            vec![StepId::Vitals, StepId::Transcription, StepId::Intake]
        );
        assert!(state.allows(&StepId::Transcription));
        assert!(!state.allows(&StepId::SoapGeneration));
    }

    #[test]
    fn numeric_visit_id_and_fallback() {
        let mut b = body(None, &[]);
        b.visit_id = Some(serde_json::json!(77));
        assert_eq!(WorkflowState::from_body("v-1", b).visit_id, "77");

        let mut b = body(None, &[]);
        b.visit_id = None;
        assert_eq!(WorkflowState::from_body("v-9", b).visit_id, "v-9");
    }

    #[tokio::test]
    async fn refresh_replaces_state_wholesale() {
        let source = ScriptedSteps::new(vec![
            Ok(body(Some("walk-in"), &["vitals", "transcription"])),
            Ok(StepsBody {
                visit_id: None,
                workflow_type: None,
                current_status: None,
                available_steps: vec!["soap_generation".into()],
            }),
        ]);
        let resolver = WorkflowStepResolver::new(source);

        let first = resolver.fetch_steps("v-1").await.unwrap();
        assert_eq!(first.current_status.as_deref(), Some("in_progress"));
        assert_eq!(resolver.latest("v-1"), Some(first));

        let second = resolver
            .refresh_after("v-1", VisitAction::VitalsSaved)
            .await
            .unwrap();
        // Nothing from the first snapshot leaks into the second.
        assert_eq!(second.current_status, None);
        assert_eq!(second.available_steps, vec![StepId::SoapGeneration]);
        assert_eq!(second.workflow_type, WorkflowType::Scheduled);
        assert_eq!(resolver.latest("v-1"), Some(second));
    }

    #[tokio::test]
    async fn failure_is_classified_and_keeps_previous_snapshot() {
        let source = ScriptedSteps::new(vec![
            Ok(body(Some("scheduled"), &["transcription"])),
            Err(ApiError::Server {
                status: 404,
                message: "Visit not found".into(),
            }),
        ]);
        let resolver = WorkflowStepResolver::new(source);

        let first = resolver.fetch_steps("v-1").await.unwrap();
        let err = resolver.fetch_steps("v-1").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.visit_id, "v-1");
        assert_eq!(resolver.latest("v-1"), Some(first));
        assert_eq!(resolver.latest("v-2"), None);
    }
}
