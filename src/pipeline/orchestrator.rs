use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use opentelemetry::KeyValue;

use crate::config::Config;
use crate::documents::{DocumentService, GoogleDocsService};
use crate::error::AppError;
use crate::llm::LlmClient;
use crate::store::{AirtableStore, RecordStore};
use crate::telemetry::metrics::{
    REPORT_GENERATION_DURATION, REPORT_RECORDS, REPORT_RUNS, REPORT_SECTIONS,
    REPORT_SKIPPED_RECORDS,
};

use super::summarize::{SummaryGenerator, summarize_records};
use super::{Phase, RunFailure, RunReport, assemble, export, retrieve};

/// Inputs of one pipeline invocation.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub table: String,
    pub template_id: String,
    pub destination: PathBuf,
}

impl RunRequest {
    pub fn from_config(config: &Config) -> Self {
        Self {
            table: config.airtable_table.clone(),
            template_id: config.google_doc_template_id.clone(),
            destination: config.output_path(),
        }
    }
}

pub struct Pipeline {
    store: Arc<dyn RecordStore>,
    generator: SummaryGenerator,
    documents: Arc<dyn DocumentService>,
    concurrency: usize,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn RecordStore>,
        generator: SummaryGenerator,
        documents: Arc<dyn DocumentService>,
    ) -> Self {
        Self {
            store,
            generator,
            documents,
            concurrency: 1,
        }
    }

    /// Number of summaries generated at once. 1 keeps generation sequential.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        let store = AirtableStore::new(
            &config.airtable_api_base,
            &config.airtable_base_id,
            &config.airtable_api_key,
        )
        .map_err(|e| AppError::Internal(format!("cannot build Airtable client: {e}")))?;

        let llm = LlmClient::from_config(config)?;
        let generator = SummaryGenerator::new(
            Arc::new(llm),
            &config.llm_model,
            config.llm_max_tokens,
            config.llm_temperature,
        );

        let documents = GoogleDocsService::new(
            &config.google_access_token,
            &config.google_docs_api_base,
            &config.google_drive_api_base,
            config.template_insertion_marker.clone(),
            &config.report_document_title,
        )
        .map_err(|e| AppError::Internal(format!("cannot build Google client: {e}")))?;

        Ok(Self::new(Arc::new(store), generator, Arc::new(documents))
            .with_concurrency(config.generation_concurrency))
    }

    /// Runs Fetching → Summarizing → Assembling → Exporting. `Ok` is the
    /// `Done` state; `Err` is `Failed` with the phase that produced it.
    #[tracing::instrument(
        name = "pipeline report",
        skip(self, request),
        fields(
            report.table = %request.table,
            report.destination = %request.destination.display(),
            report.outcome,
            report.duration_ms,
        )
    )]
    pub async fn run(&self, request: &RunRequest) -> Result<RunReport, RunFailure> {
        let start = Instant::now();
        let result = self.execute(request).await;
        let duration = start.elapsed();

        let span = tracing::Span::current();
        span.record("report.duration_ms", duration.as_millis() as u64);
        REPORT_GENERATION_DURATION.record(duration.as_secs_f64(), &[]);

        match &result {
            Ok(run) => {
                span.record("report.outcome", "done");
                REPORT_RUNS.add(1, &[KeyValue::new("report.outcome", "done")]);
                REPORT_SECTIONS.record(run.summaries as f64, &[]);
                REPORT_SKIPPED_RECORDS.add(run.skipped as u64, &[]);

                tracing::info!(
                    path = %run.report.path.display(),
                    summaries = run.summaries,
                    skipped = run.skipped,
                    "Report run completed"
                );
            }
            Err(failure) => {
                span.record("report.outcome", "failed");
                REPORT_RUNS.add(
                    1,
                    &[
                        KeyValue::new("report.outcome", "failed"),
                        KeyValue::new("report.phase", failure.phase.as_str()),
                        KeyValue::new("error.type", failure.error.kind()),
                    ],
                );

                tracing::error!(
                    phase = %failure.phase,
                    kind = failure.error.kind(),
                    summarized = failure.summarized,
                    error = %failure.error,
                    "Report run failed"
                );
            }
        }

        result
    }

    async fn execute(&self, request: &RunRequest) -> Result<RunReport, RunFailure> {
        let failed = |phase: Phase, error: AppError, summarized: usize| RunFailure {
            phase,
            error,
            summarized,
        };

        tracing::info!(phase = %Phase::Fetching, table = %request.table, "Fetching inventory");
        let records = retrieve::fetch_records(self.store.as_ref(), &request.table)
            .await
            .map_err(|e| failed(Phase::Fetching, e, 0))?;
        REPORT_RECORDS.record(records.len() as f64, &[]);

        tracing::info!(
            phase = %Phase::Summarizing,
            records = records.len(),
            concurrency = self.concurrency,
            "Generating summaries"
        );
        let outcome = summarize_records(&self.generator, &records, self.concurrency).await;
        if outcome.summaries.is_empty() {
            return Err(failed(
                Phase::Summarizing,
                AppError::AllGenerationsFailed(records.len()),
                0,
            ));
        }
        let summarized = outcome.summaries.len();
        let failures = outcome.failures;

        tracing::info!(
            phase = %Phase::Assembling,
            sections = summarized,
            skipped = failures.len(),
            "Assembling report document"
        );
        let draft = assemble::assemble(
            self.documents.as_ref(),
            &request.template_id,
            outcome.summaries,
        )
        .await
        .map_err(|e| failed(Phase::Assembling, e, summarized))?;

        tracing::info!(
            phase = %Phase::Exporting,
            document.id = %draft.document.document_id,
            "Exporting report"
        );
        let report = export::export(self.documents.as_ref(), &draft, &request.destination)
            .await
            .map_err(|e| failed(Phase::Exporting, e, summarized))?;

        Ok(RunReport {
            report,
            document_id: draft.document.document_id,
            summaries: draft.sections.len(),
            skipped: failures.len(),
            failures,
        })
    }
}
