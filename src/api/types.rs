//! Wire types for the notes and workflow endpoints.
//!
//! Every response may arrive either bare or wrapped in a `{"data": ...}`
//! envelope; [`unwrap_envelope`] normalizes both shapes before the typed
//! structs below are deserialized.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Strips a `{"data": ...}` envelope if present. A `null` payload becomes an
/// empty object so callers see "no data" rather than a parse failure.
pub fn unwrap_envelope(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.contains_key("data") => match map.remove("data") {
            Some(Value::Null) | None => Value::Object(Default::default()),
            Some(inner) => inner,
        },
        other => other,
    }
}

/// Body of `GET /notes/transcribe/status/{subject}/{visit}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusBody {
    /// `pending`, `processing`, `failed`; absent when the artifact is inlined.
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub transcript: Option<Value>,
    #[serde(default)]
    pub structured_dialogue: Option<Value>,
}

impl StatusBody {
    /// The artifact carried inline, if the status body has one.
    pub fn artifact(&self) -> Option<TranscriptPayload> {
        let payload = TranscriptPayload {
            transcript: self.transcript.clone(),
            structured_dialogue: self.structured_dialogue.clone(),
        };
        payload.has_content().then_some(payload)
    }
}

/// Body of `GET /notes/{subject}/visits/{visit}/transcript`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranscriptPayload {
    #[serde(default)]
    pub transcript: Option<Value>,
    #[serde(default)]
    pub structured_dialogue: Option<Value>,
}

impl TranscriptPayload {
    pub fn has_content(&self) -> bool {
        self.transcript.is_some() || self.structured_dialogue.is_some()
    }
}

/// Request body for the dialogue structuring endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogueRequest {
    pub transcript: String,
}

/// Response body of the dialogue structuring endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogueResponse {
    pub dialogue: Value,
}

/// Body of `GET /workflow/visit/{visit}/available-steps`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepsBody {
    /// Some deployments send the id as a number.
    #[serde(default)]
    pub visit_id: Option<Value>,
    #[serde(default)]
    pub workflow_type: Option<String>,
    #[serde(default)]
    pub current_status: Option<String>,
    #[serde(default)]
    pub available_steps: Vec<String>,
}

/// Pulls the caller-facing message out of an error body: the `message`
/// field (or `error` / `detail`), else the raw text.
pub fn error_message(body: &str) -> String {
    let trimmed = body.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        let value = unwrap_envelope(value);
        for key in ["message", "error", "detail"] {
            if let Some(Value::String(msg)) = value.get(key) {
                return msg.clone();
            }
        }
    }
    trimmed.to_string()
}
