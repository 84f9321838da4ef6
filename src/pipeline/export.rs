use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::documents::{DocumentService, ExportFormat};
use crate::error::AppError;

use super::{ExportedReport, ReportDraft};

/// Sibling temp file, unique per export.
fn partial_path(destination: &Path) -> Option<PathBuf> {
    let mut name = destination.file_name()?.to_os_string();
    name.push(format!(".{}.partial", Uuid::new_v4().simple()));
    Some(destination.with_file_name(name))
}

#[tracing::instrument(
    name = "pipeline_stage export",
    skip(documents, draft),
    fields(
        pipeline.stage = "export",
        document.id = %draft.document.document_id,
        export.bytes,
    )
)]
pub async fn export(
    documents: &dyn DocumentService,
    draft: &ReportDraft,
    destination: &Path,
) -> Result<ExportedReport, AppError> {
    let format = ExportFormat::Pdf;
    let partial = partial_path(destination).ok_or_else(|| {
        AppError::ExportFailed(format!(
            "destination {} has no file name",
            destination.display()
        ))
    })?;

    let bytes = documents
        .export(&draft.document, format)
        .await
        .map_err(|e| AppError::ExportFailed(format!("conversion failed: {e:#}")))?;
    if bytes.is_empty() {
        return Err(AppError::ExportFailed(
            "document service returned an empty export".to_string(),
        ));
    }

    if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            AppError::ExportFailed(format!("cannot create {}: {e}", parent.display()))
        })?;
    }

    let written = match tokio::fs::write(&partial, &bytes).await {
        Ok(()) => tokio::fs::rename(&partial, destination).await,
        Err(e) => Err(e),
    };
    if let Err(e) = written {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(AppError::ExportFailed(format!(
            "cannot write {}: {e}",
            destination.display()
        )));
    }

    tracing::Span::current().record("export.bytes", bytes.len());
    tracing::info!(path = %destination.display(), bytes = bytes.len(), "Report exported");

    Ok(ExportedReport {
        path: destination.to_path_buf(),
        format,
        bytes: bytes.len() as u64,
    })
}
