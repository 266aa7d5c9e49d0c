//! Interpretation service: OCR text in, structured interpretation out.
//!
//! ```text
//! request ──▶ taxonomy (override or store) ──▶ prompt ──▶ LLM ──▶ JSON
//!                                                                  │
//!        Interpretation ◀── default-filled fields ◀────────────────┤
//!                                                                  ▼
//!                                       store.merge(new_taxonomy_entries)
//! ```
//!
//! The LLM reply is treated as a loosely-typed document. Every field has an
//! explicit default (see [`Interpretation::from_reply`]), so a reply missing
//! `devices` yields an empty device list rather than an error. Only two
//! things fail a request: the call itself (or a non-JSON reply), and the
//! taxonomy merge.

use crate::error::AvError;
use crate::pipeline::llm::CompletionBackend;
use crate::pipeline::reply::parse_reply;
use crate::prompts::{build_prompt, Extras};
use crate::taxonomy::{Taxonomy, TaxonomyRepository};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Body of `POST /interpret`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InterpretRequest {
    pub ocr_text: String,

    /// Overrides the persisted taxonomy as prompt context. Accepts the nested
    /// category shape or a flat label → description map.
    #[serde(default)]
    pub taxonomy: Option<Value>,

    #[serde(default)]
    pub request_pull_sheet: bool,

    #[serde(default)]
    pub request_bom: bool,

    #[serde(default)]
    pub request_detailed_summary: bool,

    #[serde(default)]
    pub request_verification: bool,
}

impl InterpretRequest {
    pub fn new(ocr_text: impl Into<String>) -> Self {
        Self {
            ocr_text: ocr_text.into(),
            ..Self::default()
        }
    }

    pub fn with_extras(mut self, extras: Extras) -> Self {
        self.request_pull_sheet = extras.pull_sheet;
        self.request_bom = extras.bom;
        self.request_detailed_summary = extras.detailed_summary;
        self.request_verification = extras.verification;
        self
    }

    pub fn extras(&self) -> Extras {
        Extras {
            pull_sheet: self.request_pull_sheet,
            bom: self.request_bom,
            detailed_summary: self.request_detailed_summary,
            verification: self.request_verification,
        }
    }
}

/// The structured interpretation returned to the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Interpretation {
    pub summary: String,
    pub devices: Vec<String>,
    pub signal_flow: Vec<String>,
    pub notes: Vec<String>,
    pub new_taxonomy_entries: Taxonomy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cable_pull_sheet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reflected_bom: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detailed_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_verification: Option<String>,
}

impl Interpretation {
    /// Fill the record from a parsed reply, defaulting every missing field.
    ///
    /// | Field | Missing / wrong type | Other handling |
    /// |-------|----------------------|----------------|
    /// | `summary` | `""` | non-string scalars stringified |
    /// | `devices`, `signal_flow`, `notes` | `[]` | non-string items stringified |
    /// | `new_taxonomy_entries` | empty | see [`Taxonomy::from_value`] |
    /// | extras | `None` | array of strings joined by newline, other JSON pretty-printed |
    pub fn from_reply(reply: &Value) -> Self {
        Self {
            summary: text_field(reply.get("summary")).unwrap_or_default(),
            devices: list_field(reply, "devices"),
            signal_flow: list_field(reply, "signal_flow"),
            notes: list_field(reply, "notes"),
            new_taxonomy_entries: reply
                .get("new_taxonomy_entries")
                .map(Taxonomy::from_value)
                .unwrap_or_default(),
            cable_pull_sheet: document_field(reply.get("cable_pull_sheet")),
            reflected_bom: document_field(reply.get("reflected_bom")),
            detailed_summary: document_field(reply.get("detailed_summary")),
            system_verification: document_field(reply.get("system_verification")),
        }
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn text_field(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null | Value::Array(_) | Value::Object(_) => None,
        other => Some(stringify(other)),
    }
}

fn list_field(reply: &Value, key: &str) -> Vec<String> {
    match reply.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter(|v| !v.is_null())
            .map(stringify)
            .collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => {
            warn!("Reply field '{}' is not a list ({}), ignoring", key, type_name(other));
            Vec::new()
        }
    }
}

fn document_field(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Array(items) if items.iter().all(Value::is_string) => Some(
            items
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join("\n"),
        ),
        other => serde_json::to_string_pretty(other).ok(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Runs interpretations against a completion backend and a taxonomy store.
#[derive(Clone)]
pub struct Interpreter {
    backend: Arc<dyn CompletionBackend>,
    taxonomy: Arc<dyn TaxonomyRepository>,
}

impl Interpreter {
    pub fn new(backend: Arc<dyn CompletionBackend>, taxonomy: Arc<dyn TaxonomyRepository>) -> Self {
        Self { backend, taxonomy }
    }

    pub fn taxonomy(&self) -> &Arc<dyn TaxonomyRepository> {
        &self.taxonomy
    }

    /// Build the prompt this request would send, without calling the LLM.
    pub async fn prompt_for(&self, request: &InterpretRequest) -> Result<String, AvError> {
        let known = match request.taxonomy {
            Some(ref value) => Taxonomy::from_value(value),
            None => self.taxonomy.load().await?,
        };
        Ok(build_prompt(&request.ocr_text, Some(&known), request.extras()))
    }

    /// Interpret OCR text.
    ///
    /// # Errors
    /// * [`AvError::Upstream`]: the LLM call failed or the reply is not JSON.
    ///   The taxonomy is not touched.
    /// * Taxonomy load/merge errors propagate unchanged.
    pub async fn interpret(&self, request: &InterpretRequest) -> Result<Interpretation, AvError> {
        let prompt = self.prompt_for(request).await?;
        debug!("Prompt: {} chars", prompt.len());

        let completion = self.backend.complete(&prompt).await?;
        let reply = parse_reply(&completion.content)?;
        let interpretation = Interpretation::from_reply(&reply);

        let outcome = self
            .taxonomy
            .merge(&interpretation.new_taxonomy_entries)
            .await?;

        info!(
            "Interpretation: {} devices, {} signal-flow steps, {} new taxonomy labels",
            interpretation.devices.len(),
            interpretation.signal_flow.len(),
            outcome.added
        );
        Ok(interpretation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_devices_is_empty_not_an_error() {
        let i = Interpretation::from_reply(&json!({"summary": "Two rooms"}));
        assert_eq!(i.summary, "Two rooms");
        assert!(i.devices.is_empty());
        assert!(i.signal_flow.is_empty());
        assert!(i.notes.is_empty());
        assert!(i.new_taxonomy_entries.is_empty());
        assert!(i.cable_pull_sheet.is_none());
    }

    #[test]
    fn empty_object_defaults_everything() {
        assert_eq!(Interpretation::from_reply(&json!({})), Interpretation::default());
    }

    #[test]
    fn non_object_reply_defaults_everything() {
        assert_eq!(Interpretation::from_reply(&json!([1, 2])), Interpretation::default());
    }

    #[test]
    fn wrong_typed_lists_are_ignored_and_items_stringified() {
        let i = Interpretation::from_reply(&json!({
            "devices": "DMPS3",
            "notes": [1, "see sheet AV-2", null, {"k": "v"}]
        }));
        assert!(i.devices.is_empty());
        assert_eq!(i.notes, vec!["1", "see sheet AV-2", "{\"k\":\"v\"}"]);
    }

    #[test]
    fn extras_are_normalised_to_strings() {
        let i = Interpretation::from_reply(&json!({
            "cable_pull_sheet": ["W-1 rack → display", "W-2 rack → projector"],
            "reflected_bom": "1x DMPS3",
            "system_verification": {"steps": 3},
            "detailed_summary": null
        }));
        assert_eq!(
            i.cable_pull_sheet.as_deref(),
            Some("W-1 rack → display\nW-2 rack → projector")
        );
        assert_eq!(i.reflected_bom.as_deref(), Some("1x DMPS3"));
        assert!(i.system_verification.unwrap().contains("\"steps\": 3"));
        assert!(i.detailed_summary.is_none());
    }

    #[test]
    fn absent_extras_are_not_serialised() {
        let body = serde_json::to_value(Interpretation::default()).unwrap();
        assert!(body.get("cable_pull_sheet").is_none());
        assert_eq!(body["devices"], json!([]));
        assert_eq!(body["new_taxonomy_entries"], json!({}));
    }

    #[test]
    fn request_flags_default_false() {
        let r: InterpretRequest = serde_json::from_value(json!({"ocr_text": "x"})).unwrap();
        assert!(!r.extras().any());
        assert!(r.taxonomy.is_none());
    }
}
