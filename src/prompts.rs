//! Prompt construction for AV drawing interpretation.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth**: changing the requested output shape (e.g.
//!    adding a field) requires editing exactly one place, and the field names
//!    here must match what [`crate::interpret::Interpretation::from_reply`]
//!    reads back.
//!
//! 2. **Testability**: [`build_prompt`] is a pure function, so tests can
//!    inspect the exact text without spinning up a real LLM.
//!
//! Prompt length is not validated: a very long OCR text is passed through
//! unmodified and the provider decides whether it fits.

use crate::taxonomy::Taxonomy;
use serde::{Deserialize, Serialize};

/// Fixed instruction header describing the required JSON reply.
pub const INSTRUCTION_HEADER: &str = r#"You are an AV systems expert. Analyze the following OCR'd plan text and extract structured information.

Return your answer as a single JSON object with exactly this structure:
{
  "summary": "...",
  "devices": ["..."],
  "signal_flow": ["..."],
  "notes": ["..."],
  "new_taxonomy_entries": {
    "<category>": { "<label>": "<description>" }
  }
}

Use the categories "devices", "symbols", "abbreviations" and "wire_labels" for new_taxonomy_entries; add another category only when none of these fits.
Only list labels in new_taxonomy_entries that are NOT already in the known taxonomy.
If possible, guess at unknown device types or abbreviations and suggest classifications.
Output ONLY the JSON object. Do NOT wrap it in code fences and do NOT add commentary."#;

/// Heading that introduces the known taxonomy block.
pub const TAXONOMY_HEADING: &str = "Known taxonomy for reference:";

/// Heading that introduces the raw OCR text.
pub const OCR_HEADING: &str = "OCR TEXT:";

/// Heading that introduces the extras block. Absent when no extra is requested.
pub const EXTRAS_HEADING: &str = "ADDITIONAL OUTPUT:";

/// Which derivative documents the LLM should add to its reply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extras {
    /// `cable_pull_sheet`
    pub pull_sheet: bool,
    /// `reflected_bom`
    pub bom: bool,
    /// `detailed_summary`
    pub detailed_summary: bool,
    /// `system_verification`
    pub verification: bool,
}

impl Extras {
    pub fn none() -> Self {
        Self::default()
    }

    /// Pull sheet and BOM, the pair the upload endpoints generate by default.
    pub fn documents() -> Self {
        Self {
            pull_sheet: true,
            bom: true,
            ..Self::default()
        }
    }

    pub fn all() -> Self {
        Self {
            pull_sheet: true,
            bom: true,
            detailed_summary: true,
            verification: true,
        }
    }

    pub fn any(&self) -> bool {
        self.pull_sheet || self.bom || self.detailed_summary || self.verification
    }

    /// Requested `(field name, instruction)` pairs, in a fixed order.
    fn requested(&self) -> Vec<(&'static str, &'static str)> {
        let mut fields = Vec::new();
        if self.pull_sheet {
            fields.push((
                "cable_pull_sheet",
                "a basic cable pull sheet, one cable run per line (cable label, source device, destination device, cable type)",
            ));
        }
        if self.bom {
            fields.push((
                "reflected_bom",
                "a reflected Bill of Materials inferred from the device list, one line item per line (quantity, manufacturer, model, description)",
            ));
        }
        if self.detailed_summary {
            fields.push((
                "detailed_summary",
                "a detailed narrative of the system: rooms, sources, destinations, control and audio paths",
            ));
        }
        if self.verification {
            fields.push((
                "system_verification",
                "a commissioning checklist to verify the installed system, one check per line",
            ));
        }
        fields
    }
}

/// Build the complete interpretation prompt.
///
/// Sections, in order:
/// 1. [`INSTRUCTION_HEADER`]
/// 2. the known taxonomy, one JSON block per non-empty category, only when
///    `taxonomy` holds at least one label
/// 3. [`OCR_HEADING`] and the OCR text verbatim
/// 4. the extras block naming each requested string field, only when
///    `extras.any()`
pub fn build_prompt(ocr_text: &str, taxonomy: Option<&Taxonomy>, extras: Extras) -> String {
    let mut prompt = String::with_capacity(INSTRUCTION_HEADER.len() + ocr_text.len() + 1024);
    prompt.push_str(INSTRUCTION_HEADER);

    if let Some(taxonomy) = taxonomy.filter(|t| !t.is_empty()) {
        prompt.push_str("\n\n");
        prompt.push_str(TAXONOMY_HEADING);
        for (category, labels) in taxonomy.categories() {
            if labels.is_empty() {
                continue;
            }
            // BTreeMap<String, String> serialisation cannot fail.
            let block = serde_json::to_string_pretty(labels).unwrap_or_default();
            prompt.push_str(&format!("\n[{category}]\n{block}"));
        }
    }

    prompt.push_str("\n\n");
    prompt.push_str(OCR_HEADING);
    prompt.push('\n');
    prompt.push_str(ocr_text);
    prompt.push('\n');

    if extras.any() {
        prompt.push('\n');
        prompt.push_str(EXTRAS_HEADING);
        for (field, instruction) in extras.requested() {
            prompt.push_str(&format!("\n- \"{field}\": {instruction}."));
        }
        prompt.push_str(
            "\nInclude each of these as a plain string field of the same name in your final JSON output.",
        );
    }

    prompt
}
