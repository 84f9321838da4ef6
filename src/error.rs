use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use opentelemetry::trace::TraceContextExt;
use serde_json::json;
use thiserror::Error;
use tracing::Span;
use tracing_opentelemetry::OpenTelemetrySpanExt;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Record source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("No records returned from table '{0}'")]
    SourceEmpty(String),

    #[error("Summary generation failed for record {record_id}: {reason}")]
    GenerationFailed { record_id: String, reason: String },

    #[error("All {0} summary generations failed")]
    AllGenerationsFailed(usize),

    #[error("Document assembly failed: {0}")]
    AssemblyFailed(String),

    #[error("Report export failed: {0}")]
    ExportFailed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable identifier used in logs, metrics and API responses.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Config(_) => "config",
            AppError::Validation(_) => "validation",
            AppError::SourceUnavailable(_) => "source_unavailable",
            AppError::SourceEmpty(_) => "source_empty",
            AppError::GenerationFailed { .. } => "generation_failed",
            AppError::AllGenerationsFailed(_) => "all_generations_failed",
            AppError::AssemblyFailed(_) => "assembly_failed",
            AppError::ExportFailed(_) => "export_failed",
            AppError::Internal(_) => "internal",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::SourceEmpty(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::SourceUnavailable(_)
            | AppError::GenerationFailed { .. }
            | AppError::AllGenerationsFailed(_)
            | AppError::AssemblyFailed(_) => StatusCode::BAD_GATEWAY,
            AppError::Config(_) | AppError::ExportFailed(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to return to API callers.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Config(_) | AppError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

pub(crate) fn current_trace_id() -> Option<String> {
    let span = Span::current();
    let context = span.context();
    let span_ref = context.span();
    let span_context = span_ref.span_context();

    if span_context.is_valid() {
        Some(span_context.trace_id().to_string())
    } else {
        None
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(error = %self, kind = self.kind(), "Request failed");
        }

        let mut body = json!({
            "error": self.public_message(),
            "kind": self.kind(),
            "status": status.as_u16(),
        });
        if let Some(trace_id) = current_trace_id() {
            body["trace_id"] = json!(trace_id);
        }

        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
