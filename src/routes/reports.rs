use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use tracing::Instrument;
use uuid::Uuid;

use crate::AppState;
use crate::error::{AppError, AppResult, current_trace_id};
use crate::pipeline::RunRequest;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateReportBody {
    pub table: Option<String>,
    pub output_filename: Option<String>,
}

fn parse_body(body: &[u8]) -> AppResult<CreateReportBody> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(CreateReportBody::default());
    }
    serde_json::from_slice(body).map_err(|e| AppError::Validation(format!("invalid body: {e}")))
}

/// Accepts a bare file name; anything that could escape the output
/// directory is rejected.
fn validate_filename(name: &str) -> AppResult<String> {
    let name = name.trim();
    if name.is_empty()
        || name.starts_with('.')
        || name.contains(['/', '\\'])
        || name.chars().any(char::is_control)
    {
        return Err(AppError::Validation(format!(
            "output_filename '{name}' must be a plain file name"
        )));
    }
    if name.to_ascii_lowercase().ends_with(".pdf") {
        Ok(name.to_string())
    } else {
        Ok(format!("{name}.pdf"))
    }
}

pub async fn create_report(State(state): State<AppState>, body: Bytes) -> AppResult<Response> {
    let body = parse_body(&body)?;
    let run_id = Uuid::new_v4();

    let table = match body.table.as_deref().map(str::trim) {
        Some("") => return Err(AppError::Validation("table must not be empty".into())),
        Some(table) => table.to_string(),
        None => state.table.clone(),
    };
    let filename = match body.output_filename.as_deref() {
        Some(name) => validate_filename(name)?,
        None => format!("report-{run_id}.pdf"),
    };

    let request = RunRequest {
        table,
        template_id: state.template_id.clone(),
        destination: state.output_dir.join(filename),
    };

    tracing::info!(%run_id, table = %request.table, "Report run requested");

    // Detached: a dropped request (timeout, disconnect) does not cancel the run.
    let pipeline = state.pipeline.clone();
    let outcome = tokio::spawn(async move { pipeline.run(&request).await }.in_current_span())
        .await
        .map_err(|e| AppError::Internal(format!("report run aborted: {e}")))?;

    match outcome {
        Ok(run) => Ok((
            StatusCode::CREATED,
            Json(json!({
                "status": "done",
                "run_id": run_id,
                "path": run.report.path,
                "format": run.report.format,
                "bytes": run.report.bytes,
                "document_id": run.document_id,
                "summaries": run.summaries,
                "skipped": run.skipped,
                "failures": run.failures,
            })),
        )
            .into_response()),
        Err(failure) => {
            let status = failure.error.status_code();
            let mut body = json!({
                "status": "failed",
                "run_id": run_id,
                "phase": failure.phase,
                "kind": failure.error.kind(),
                "error": failure.error.public_message(),
                "summarized": failure.summarized,
            });
            if let Some(trace_id) = current_trace_id() {
                body["trace_id"] = json!(trace_id);
            }
            Ok((status, Json(body)).into_response())
        }
    }
}
