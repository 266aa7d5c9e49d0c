//! In-process fakes for the LLM and the PDF engine.

#![allow(dead_code)]

use async_trait::async_trait;
use avgpt::{AvError, Completion, CompletionBackend, PdfEngine};
use std::sync::Mutex;

/// Replies with a fixed string (or error) and records every prompt.
pub struct ScriptedBackend {
    reply: Result<String, String>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn replying(reply: impl Into<String>) -> Self {
        Self {
            reply: Ok(reply.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            reply: Err(message.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn last_prompt(&self) -> String {
        self.prompts().pop().expect("no prompt was sent")
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn complete(&self, prompt: &str) -> Result<Completion, AvError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match &self.reply {
            Ok(content) => Ok(Completion {
                content: content.clone(),
                ..Completion::default()
            }),
            Err(message) => Err(AvError::upstream(message)),
        }
    }
}

/// Treats everything after the `%PDF` magic line as the text layer and
/// renders documents as plain text behind a PDF header.
pub struct TextPdfEngine;

#[async_trait]
impl PdfEngine for TextPdfEngine {
    async fn extract_text(&self, _name: &str, bytes: Vec<u8>) -> Result<String, AvError> {
        let text = String::from_utf8_lossy(&bytes);
        Ok(text
            .split_once('\n')
            .map(|(_, rest)| rest.to_string())
            .unwrap_or_default())
    }

    async fn render_document(&self, title: &str, body: &str) -> Result<Vec<u8>, AvError> {
        Ok(format!("%PDF-1.7\n{title}\n\n{body}").into_bytes())
    }
}

/// A "PDF" whose text layer is `text`.
pub fn pdf_with_text(text: &str) -> Vec<u8> {
    format!("%PDF-1.7\n{text}").into_bytes()
}

pub const DRAWING_TEXT: &str = "RACK A\nDMPS3-4K-350-C\nEXTRON SW4 HD 4K PLUS\nDISPLAY 1 (HDMI)";

/// A well-formed reply with both derivative documents.
pub const FULL_REPLY: &str = r#"{
  "summary": "Conference room with a DMPS3 presentation system.",
  "devices": ["DMPS3-4K-350-C", "Extron SW4 HD 4K PLUS", "Display 1"],
  "signal_flow": ["Extron switcher -> DMPS3 -> Display 1"],
  "notes": ["Confirm rack power"],
  "new_taxonomy_entries": {
    "devices": {
      "DMPS3": "A different description that must not win",
      "Extron switcher": "HDMI input switcher"
    }
  },
  "cable_pull_sheet": ["W-101, Rack A, Display 1, HDMI", "", "W-102, Rack A, Table box, CAT6"],
  "reflected_bom": "1, Crestron, DMPS3-4K-350-C, Presentation system\n1, Extron, SW4 HD 4K PLUS, Switcher"
}"#;
