//! Export generator: PDF and CSV artifacts rendered from an interpretation.
//!
//! Artifacts are plain files in one output directory and are served back by
//! name (`GET /files/{filename}`). CSV output is one row per non-empty line
//! under a constant header; lines are written as-is, with no quoting of
//! embedded delimiters.

use crate::error::AvError;
use crate::interpret::Interpretation;
use crate::pipeline::pdf::PdfEngine;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// The documents an interpretation can be exported as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Summary,
    PullSheet,
    Bom,
    DetailedSummary,
    Verification,
}

impl ArtifactKind {
    pub fn title(self) -> &'static str {
        match self {
            ArtifactKind::Summary => "AV System Summary",
            ArtifactKind::PullSheet => "Cable Pull Sheet",
            ArtifactKind::Bom => "Reflected Bill of Materials",
            ArtifactKind::DetailedSummary => "Detailed System Summary",
            ArtifactKind::Verification => "System Verification",
        }
    }

    /// File-name suffix, e.g. `plan_pull_sheet.csv`.
    pub fn slug(self) -> &'static str {
        match self {
            ArtifactKind::Summary => "summary",
            ArtifactKind::PullSheet => "pull_sheet",
            ArtifactKind::Bom => "bom",
            ArtifactKind::DetailedSummary => "detailed_summary",
            ArtifactKind::Verification => "verification",
        }
    }

    pub fn csv_header(self) -> &'static str {
        match self {
            ArtifactKind::Summary => "summary",
            ArtifactKind::PullSheet => "cable_run",
            ArtifactKind::Bom => "line_item",
            ArtifactKind::DetailedSummary => "paragraph",
            ArtifactKind::Verification => "check",
        }
    }
}

/// A file written by [`ArtifactStore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub filename: String,
}

/// Non-empty lines of `body`, trimmed, in order.
pub fn csv_rows(body: &str) -> Vec<&str> {
    body.lines().map(str::trim).filter(|l| !l.is_empty()).collect()
}

/// Render `body` as a single-column CSV under `header`.
pub fn render_csv(header: &str, body: &str) -> String {
    let mut out = String::with_capacity(header.len() + body.len() + 8);
    out.push_str(header);
    out.push('\n');
    for row in csv_rows(body) {
        out.push_str(row);
        out.push('\n');
    }
    out
}

/// Plain-text body of the summary document.
pub fn summary_text(interpretation: &Interpretation) -> String {
    let mut out = String::new();
    out.push_str(interpretation.summary.trim());
    out.push('\n');

    let mut section = |heading: &str, items: &[String]| {
        if items.is_empty() {
            return;
        }
        out.push('\n');
        out.push_str(heading);
        out.push('\n');
        for item in items {
            out.push_str("- ");
            out.push_str(item);
            out.push('\n');
        }
    };
    section("Devices", &interpretation.devices);
    section("Signal flow", &interpretation.signal_flow);
    section("Notes", &interpretation.notes);
    out
}

static RE_UNSAFE_STEM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9_-]+").unwrap());

/// Reduce an uploaded file name to a safe artifact stem.
pub fn artifact_stem(filename: &str) -> String {
    let base = Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let cleaned = RE_UNSAFE_STEM.replace_all(&base, "_");
    let cleaned = cleaned.trim_matches('_');
    if cleaned.is_empty() {
        "drawing".to_string()
    } else {
        cleaned.to_string()
    }
}

/// A name is servable if it is a single plain path component.
fn is_safe_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(['/', '\\', '\0'])
        && !name.contains("..")
}

/// Writes and serves generated artifacts from one directory.
#[derive(Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
    engine: Arc<dyn PdfEngine>,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>, engine: Arc<dyn PdfEngine>) -> Self {
        Self {
            dir: dir.into(),
            engine,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn write(&self, filename: &str, bytes: &[u8]) -> Result<(), AvError> {
        let path = self.dir.join(filename);
        let write_err = |e: std::io::Error| AvError::ArtifactWrite {
            path: path.clone(),
            detail: e.to_string(),
        };
        tokio::fs::create_dir_all(&self.dir).await.map_err(write_err)?;
        tokio::fs::write(&path, bytes).await.map_err(write_err)?;
        debug!("Wrote {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }

    /// Render `body` as a PDF named `{stem}_{kind}.pdf`.
    pub async fn write_pdf(&self, stem: &str, kind: ArtifactKind, body: &str) -> Result<Artifact, AvError> {
        let filename = format!("{stem}_{}.pdf", kind.slug());
        let bytes = self.engine.render_document(kind.title(), body).await?;
        self.write(&filename, &bytes).await?;
        Ok(Artifact { kind, filename })
    }

    /// Render `body` as a CSV named `{stem}_{kind}.csv`.
    pub async fn write_csv(&self, stem: &str, kind: ArtifactKind, body: &str) -> Result<Artifact, AvError> {
        let filename = format!("{stem}_{}.csv", kind.slug());
        self.write(&filename, render_csv(kind.csv_header(), body).as_bytes())
            .await?;
        Ok(Artifact { kind, filename })
    }

    /// Write every artifact the interpretation supports.
    ///
    /// The summary PDF is always written; each derivative document present in
    /// the interpretation gets a PDF and a CSV.
    pub async fn export_interpretation(
        &self,
        stem: &str,
        interpretation: &Interpretation,
    ) -> Result<Vec<Artifact>, AvError> {
        let mut artifacts = vec![
            self.write_pdf(stem, ArtifactKind::Summary, &summary_text(interpretation))
                .await?,
        ];

        let documents = [
            (ArtifactKind::PullSheet, &interpretation.cable_pull_sheet),
            (ArtifactKind::Bom, &interpretation.reflected_bom),
            (ArtifactKind::DetailedSummary, &interpretation.detailed_summary),
            (ArtifactKind::Verification, &interpretation.system_verification),
        ];
        for (kind, body) in documents {
            if let Some(body) = body.as_deref().filter(|b| !b.trim().is_empty()) {
                artifacts.push(self.write_pdf(stem, kind, body).await?);
                artifacts.push(self.write_csv(stem, kind, body).await?);
            }
        }

        info!("Exported {} artifacts for '{}'", artifacts.len(), stem);
        Ok(artifacts)
    }

    /// Read a previously generated artifact.
    pub async fn open(&self, filename: &str) -> Result<Vec<u8>, AvError> {
        let not_found = || AvError::ArtifactNotFound {
            name: filename.to_string(),
        };
        if !is_safe_name(filename) {
            return Err(not_found());
        }
        tokio::fs::read(self.dir.join(filename))
            .await
            .map_err(|_| not_found())
    }
}

/// Content type for a served artifact.
pub fn content_type_for(filename: &str) -> &'static str {
    match filename.rsplit('.').next().map(str::to_ascii_lowercase).as_deref() {
        Some("pdf") => "application/pdf",
        Some("csv") => "text/csv",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_skips_blank_lines_and_keeps_header() {
        let csv = render_csv("cable_run", "W-1, rack, display\n\n   \nW-2, rack, projector\n");
        assert_eq!(csv, "cable_run\nW-1, rack, display\nW-2, rack, projector\n");
    }

    #[test]
    fn csv_of_empty_body_is_header_only() {
        assert_eq!(render_csv("line_item", ""), "line_item\n");
    }

    #[test]
    fn stem_is_sanitised() {
        assert_eq!(artifact_stem("AV Plan (rev 2).pdf"), "AV_Plan_rev_2");
        assert_eq!(artifact_stem("../../etc/passwd"), "passwd");
        assert_eq!(artifact_stem("???.pdf"), "drawing");
    }

    #[test]
    fn unsafe_names_are_rejected() {
        assert!(is_safe_name("plan_bom.csv"));
        assert!(!is_safe_name("../taxonomy_db.json"));
        assert!(!is_safe_name("sub/plan.pdf"));
        assert!(!is_safe_name(".hidden"));
        assert!(!is_safe_name(""));
    }

    #[test]
    fn summary_text_lists_sections() {
        let i = Interpretation {
            summary: "Conference room".into(),
            devices: vec!["DMPS3".into()],
            notes: vec!["Verify rack power".into()],
            ..Interpretation::default()
        };
        let text = summary_text(&i);
        assert!(text.starts_with("Conference room\n"));
        assert!(text.contains("Devices\n- DMPS3\n"));
        assert!(text.contains("Notes\n- Verify rack power\n"));
        assert!(!text.contains("Signal flow"));
    }

    #[test]
    fn content_types() {
        assert_eq!(content_type_for("a.pdf"), "application/pdf");
        assert_eq!(content_type_for("a.CSV"), "text/csv");
        assert_eq!(content_type_for("a"), "application/octet-stream");
    }
}
