//! Transcript extraction and optional dialogue structuring.
//!
//! Whether a transcript is already structured is a heuristic: the server has
//! no explicit flag, so the text is sniffed for both literal role markers
//! ([`DOCTOR_MARKER`] and [`PATIENT_MARKER`]). A payload that already carries
//! its dialogue as an array of turns counts as structured too.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::{JobBackend, TranscriptPayload};
use crate::job::JobId;

pub const DOCTOR_MARKER: &str = "Doctor:";
pub const PATIENT_MARKER: &str = "Patient:";

/// One role-tagged utterance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueTurn {
    pub speaker_role: String,
    pub utterance: String,
}

/// The final product of a successful job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptArtifact {
    /// Text as extracted from the result, before any enrichment.
    pub raw_text: String,
    /// Working text handed to the caller. Equals `raw_text` unless
    /// enrichment succeeded.
    pub text: String,
    pub structured_dialogue: Option<Vec<DialogueTurn>>,
    pub is_structured: bool,
    pub enriched: bool,
}

impl TranscriptArtifact {
    pub fn from_raw(raw_text: String) -> Self {
        let is_structured = has_role_markers(&raw_text);
        let structured_dialogue = is_structured.then(|| parse_turns(&raw_text));
        Self {
            text: raw_text.clone(),
            raw_text,
            structured_dialogue,
            is_structured,
            enriched: false,
        }
    }

    /// Builds the artifact from a result payload. A `structured_dialogue`
    /// array is read into turns the same way an enrichment result is.
    pub fn from_payload(payload: &TranscriptPayload) -> Self {
        let mut artifact = Self::from_raw(extract_text(payload));
        if let Some(turns) = payload.structured_dialogue.as_ref().and_then(turns_from_value) {
            artifact.structured_dialogue = Some(turns);
            artifact.is_structured = true;
        }
        artifact
    }

    /// Replaces the working text with an enrichment result. Returns false and
    /// leaves the artifact untouched if the result is blank.
    fn apply_enrichment(&mut self, dialogue: &Value) -> bool {
        if is_blank(dialogue) {
            return false;
        }
        let text = value_text(dialogue);
        let turns = turns_from_value(dialogue).or_else(|| {
            has_role_markers(&text).then(|| parse_turns(&text))
        });
        self.is_structured = turns.is_some();
        self.structured_dialogue = turns;
        self.text = text;
        self.enriched = true;
        true
    }
}

pub fn has_role_markers(text: &str) -> bool {
    text.contains(DOCTOR_MARKER) && text.contains(PATIENT_MARKER)
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Strings are used verbatim; anything else is serialized as JSON.
fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Picks the artifact text: a non-empty structured dialogue wins over the
/// plain transcript; empty when neither is present.
pub fn extract_text(payload: &TranscriptPayload) -> String {
    [&payload.structured_dialogue, &payload.transcript]
        .into_iter()
        .flatten()
        .find(|value| !is_blank(value))
        .map(value_text)
        .unwrap_or_default()
}

/// Recovers turns from marker-prefixed lines. Unprefixed lines continue the
/// previous turn.
pub fn parse_turns(text: &str) -> Vec<DialogueTurn> {
    let mut turns: Vec<DialogueTurn> = Vec::new();
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let tagged = [DOCTOR_MARKER, PATIENT_MARKER]
            .into_iter()
            .find_map(|marker| line.strip_prefix(marker).map(|rest| (marker, rest)));
        if let Some((marker, rest)) = tagged {
            turns.push(DialogueTurn {
                speaker_role: marker.trim_end_matches(':').to_string(),
                utterance: rest.trim().to_string(),
            });
        } else if let Some(last) = turns.last_mut() {
            if !last.utterance.is_empty() {
                last.utterance.push(' ');
            }
            last.utterance.push_str(line);
        }
    }
    turns
}

/// Reads `[{"speaker": .., "text": ..}, ..]` style arrays.
fn turns_from_value(value: &Value) -> Option<Vec<DialogueTurn>> {
    let items = value.as_array()?;
    let field = |item: &Value, keys: &[&str]| {
        keys.iter()
            .find_map(|k| item.get(*k).and_then(Value::as_str))
            .map(str::to_string)
    };
    let turns = items
        .iter()
        .map(|item| {
            Some(DialogueTurn {
                speaker_role: field(item, &["speaker_role", "speaker", "role"])?,
                utterance: field(item, &["utterance", "text", "content"])?,
            })
        })
        .collect::<Option<Vec<_>>>()?;
    (!turns.is_empty()).then_some(turns)
}

/// Builds the artifact for a finished job, enriching it when it lacks role
/// markers. Enrichment failures are logged and swallowed; the raw text is kept.
pub async fn build_artifact<B: JobBackend>(
    backend: &B,
    id: &JobId,
    payload: &TranscriptPayload,
) -> TranscriptArtifact {
    let mut artifact = TranscriptArtifact::from_payload(payload);
    if artifact.is_structured || artifact.raw_text.trim().is_empty() {
        return artifact;
    }

    match backend.structure_dialogue(id, &artifact.raw_text).await {
        Ok(dialogue) => {
            if !artifact.apply_enrichment(&dialogue) {
                tracing::warn!(job = %id, "dialogue structuring returned nothing, keeping raw transcript");
            }
        }
        Err(err) => {
            tracing::warn!(job = %id, error = %err, "dialogue structuring failed, keeping raw transcript");
        }
    }
    artifact
}
