use crate::error::AppError;
use crate::store::{InventoryRecord, RecordStore};

#[tracing::instrument(
    name = "pipeline_stage retrieve",
    skip(store),
    fields(pipeline.stage = "retrieve", report.records)
)]
pub async fn fetch_records(
    store: &dyn RecordStore,
    table: &str,
) -> Result<Vec<InventoryRecord>, AppError> {
    let records = store
        .fetch(table)
        .await
        .map_err(|e| AppError::SourceUnavailable(format!("{e:#}")))?;

    tracing::Span::current().record("report.records", records.len());

    if records.is_empty() {
        return Err(AppError::SourceEmpty(table.to_string()));
    }

    Ok(records)
}
