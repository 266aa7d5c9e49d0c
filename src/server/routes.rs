//! HTTP handlers.
//!
//! - `GET  /health`
//! - `POST /interpret`: OCR text in, interpretation out
//! - `POST /upload`: PDF in, interpretation plus artifact names out
//! - `POST /upload/async`: PDF in, task id out
//! - `GET  /status/:task_id`
//! - `GET  /files/:filename`
//! - `POST /api/analyze`: PDF in, interpretation out, nothing exported

use axum::{
    extract::{Multipart, Path, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use super::error::ApiError;
use super::state::AppState;
use crate::export::content_type_for;
use crate::interpret::{InterpretRequest, Interpretation};
use crate::pipeline::input::ensure_pdf;
use crate::prompts::Extras;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Synchronous upload result: the interpretation fields plus artifact names.
#[derive(Serialize)]
pub struct UploadResponse {
    #[serde(flatten)]
    pub interpretation: Interpretation,
    pub files: Vec<String>,
}

#[derive(Serialize)]
pub struct TaskResponse {
    pub task_id: String,
    pub status: String,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn interpret(
    State(state): State<AppState>,
    Json(request): Json<InterpretRequest>,
) -> Result<Json<Interpretation>, ApiError> {
    let interpretation = state.interpreter().interpret(&request).await?;
    Ok(Json(interpretation))
}

pub async fn upload(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let form = read_upload(multipart, Extras::documents()).await?;
    let output = state
        .pipeline()
        .analyze_bytes(form.bytes, &form.filename, form.extras)
        .await?;

    let files = output.filenames();
    Ok(Json(UploadResponse {
        interpretation: output.interpretation,
        files,
    }))
}

pub async fn upload_async(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<TaskResponse>, ApiError> {
    let form = read_upload(multipart, Extras::documents()).await?;
    ensure_pdf(&form.filename, &form.bytes)?;

    let pipeline = state.pipeline().clone();
    let handle = state.tasks().submit(move |reporter| async move {
        pipeline
            .with_callback(Arc::new(reporter))
            .analyze_bytes(form.bytes, &form.filename, form.extras)
            .await
            .map(|_| ())
    });
    tracing::info!("Queued background analysis as task {}", handle.task_id);

    let status = state.tasks().status(&handle.task_id);
    Ok(Json(TaskResponse {
        task_id: handle.task_id,
        status,
    }))
}

pub async fn task_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Json<TaskResponse> {
    let status = state.tasks().status(&task_id);
    Json(TaskResponse { task_id, status })
}

pub async fn serve_file(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    let bytes = state.artifacts().open(&filename).await?;
    let content_type = content_type_for(&filename);
    Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response())
}

pub async fn analyze(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<Interpretation>, ApiError> {
    let form = read_upload(multipart, Extras::none()).await?;
    let interpretation = state
        .pipeline()
        .interpret_bytes(form.bytes, &form.filename, form.extras)
        .await?;
    Ok(Json(interpretation))
}

// ── Multipart ────────────────────────────────────────────────────────────

struct UploadForm {
    filename: String,
    bytes: Vec<u8>,
    extras: Extras,
}

/// Read the `file` field and any `request_*` flags. Unknown fields are skipped.
async fn read_upload(mut multipart: Multipart, defaults: Extras) -> Result<UploadForm, ApiError> {
    let mut file = None;
    let mut extras = defaults;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Failed to read upload: {e}")))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .unwrap_or_else(|| "upload.pdf".to_string());
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Failed to read file data: {e}")))?;
                tracing::debug!("Received '{}' ({} bytes)", filename, data.len());
                file = Some((filename, data.to_vec()));
            }
            "request_pull_sheet" | "request_bom" | "request_detailed_summary" | "request_verification" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Failed to read field '{name}': {e}")))?;
                let flag = parse_flag(&name, &value)?;
                match name.as_str() {
                    "request_pull_sheet" => extras.pull_sheet = flag,
                    "request_bom" => extras.bom = flag,
                    "request_detailed_summary" => extras.detailed_summary = flag,
                    _ => extras.verification = flag,
                }
            }
            other => tracing::debug!("Ignoring multipart field '{}'", other),
        }
    }

    let (filename, bytes) =
        file.ok_or_else(|| ApiError::bad_request("No file provided. Use field name 'file'"))?;
    Ok(UploadForm {
        filename,
        bytes,
        extras,
    })
}

fn parse_flag(name: &str, value: &str) -> Result<bool, ApiError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" | "" => Ok(false),
        other => Err(ApiError::bad_request(format!(
            "Field '{name}' must be true or false, got '{other}'"
        ))),
    }
}
