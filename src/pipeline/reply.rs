//! Reply cleanup: deterministic fixes applied to LLM output before JSON parsing.
//!
//! Even when told to "output ONLY the JSON object", models regularly wrap the
//! document in a ```` ```json ```` fence, prefix a BOM, or use CRLF line
//! endings. None of these change the document, so they are undone here; the
//! result is then parsed strictly and anything still not JSON is an upstream
//! failure.
//!
//! Rules (applied in order):
//! 1. Normalise line endings (CRLF → LF)
//! 2. Strip invisible Unicode (BOM, zero-width spaces and joiners)
//! 3. Strip one outer code fence, with or without a language tag

use crate::error::AvError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Apply all cleanup rules to the raw reply.
pub fn clean_reply(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = remove_invisible_chars(&s);
    strip_code_fences(&s)
}

/// Clean the reply and parse it as a JSON document.
pub fn parse_reply(input: &str) -> Result<Value, AvError> {
    let cleaned = clean_reply(input);
    serde_json::from_str(&cleaned)
        .map_err(|e| AvError::upstream(format!("LLM reply is not valid JSON: {e}")))
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Remove invisible characters ──────────────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input
        .chars()
        .filter(|c| !matches!(c, '\u{FEFF}' | '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}'))
        .collect()
}

// ── Rule 3: Strip outer code fences ──────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*[ \t]*\n(.*?)\n?```$").unwrap());

fn strip_code_fences(input: &str) -> String {
    let trimmed = input.trim();
    match RE_OUTER_FENCES.captures(trimmed) {
        Some(caps) => caps[1].trim().to_string(),
        None => trimmed.to_string(),
    }
}
