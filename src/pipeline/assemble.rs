use crate::documents::{DocumentHandle, DocumentService};
use crate::error::AppError;

use super::{ReportDraft, Summary};

/// Text inserted for one summary: a paragraph break followed by the
/// summary, so each section starts on its own paragraph after the
/// insertion point.
pub fn section_text(summary: &Summary) -> String {
    format!("\n{}", summary.text)
}

#[tracing::instrument(
    name = "pipeline_stage assemble",
    skip(documents, summaries),
    fields(
        pipeline.stage = "assemble",
        report.sections = summaries.len(),
        document.id,
    )
)]
pub async fn assemble(
    documents: &dyn DocumentService,
    template_id: &str,
    summaries: Vec<Summary>,
) -> Result<ReportDraft, AppError> {
    let document = documents
        .open_template(template_id)
        .await
        .map_err(|e| {
            AppError::AssemblyFailed(format!("cannot open template {template_id}: {e:#}"))
        })?;
    tracing::Span::current().record("document.id", document.document_id.as_str());

    let mut draft = ReportDraft {
        template_id: template_id.to_string(),
        document,
        sections: Vec::with_capacity(summaries.len()),
    };

    for summary in summaries {
        if let Err(e) = documents
            .append_text(&mut draft.document, &section_text(&summary))
            .await
        {
            discard_partial(documents, &draft.document).await;
            return Err(AppError::AssemblyFailed(format!(
                "append for record {} rejected after {} section(s): {e:#}",
                summary.record_id,
                draft.sections.len()
            )));
        }
        draft.sections.push(summary);
    }

    Ok(draft)
}

async fn discard_partial(documents: &dyn DocumentService, document: &DocumentHandle) {
    if let Err(e) = documents.discard(document).await {
        tracing::warn!(
            document.id = %document.document_id,
            error = %e,
            "Failed to discard partially assembled document"
        );
    }
}
