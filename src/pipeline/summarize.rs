use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::Instrument;

use crate::error::AppError;
use crate::llm::{GenerateRequest, LlmClient};
use crate::store::InventoryRecord;

use super::{GenerationFailure, Summary};

const SYSTEM_PROMPT: &str = "You are a consulting arborist.";

/// Prompt label, source column, and the value used when the column is blank.
const PROMPT_FIELDS: &[(&str, &str, &str)] = &[
    ("Species", "Species", "Unknown"),
    ("DBH", "DBH", "N/A"),
    ("Height", "Height", "N/A"),
    ("Condition", "Health Condition", "N/A"),
    ("Risk Rating", "Risk Rating", "N/A"),
];

pub fn build_prompt(record: &InventoryRecord) -> String {
    let mut prompt = String::from("Write a Tree Risk Assessment summary:\n\n");
    for (label, column, default) in PROMPT_FIELDS {
        prompt.push_str(&format!("{label}: {}\n", record.field_or(column, default)));
    }
    prompt.push_str(
        "\nRequirements:\n\
         - Professional tone\n\
         - 2 short paragraphs\n\
         - Clear risk statement + management recommendation\n",
    );
    prompt
}

/// Turns inventory records into prose through the LLM client.
#[derive(Clone)]
pub struct SummaryGenerator {
    llm: Arc<LlmClient>,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl SummaryGenerator {
    pub fn new(llm: Arc<LlmClient>, model: &str, max_tokens: u32, temperature: f32) -> Self {
        Self {
            llm,
            model: model.to_string(),
            max_tokens,
            temperature,
        }
    }

    #[tracing::instrument(
        name = "pipeline_stage summarize_record",
        skip(self, record),
        fields(pipeline.stage = "summarize", record.id = %record.id, summary.chars)
    )]
    pub async fn generate_summary(&self, record: &InventoryRecord) -> Result<Summary, AppError> {
        let failed = |reason: String| AppError::GenerationFailed {
            record_id: record.id.clone(),
            reason,
        };

        let resp = self
            .llm
            .generate(&GenerateRequest {
                model: self.model.clone(),
                system: SYSTEM_PROMPT.to_string(),
                prompt: build_prompt(record),
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                stage: "summarize".to_string(),
            })
            .await
            .map_err(|e| failed(format!("{e:#}")))?;

        if resp.is_truncated() {
            return Err(failed(format!(
                "output truncated at {} tokens",
                self.max_tokens
            )));
        }

        let text = resp.content.trim();
        if text.is_empty() {
            return Err(failed("empty response".to_string()));
        }

        tracing::Span::current().record("summary.chars", text.chars().count());

        Ok(Summary {
            record_id: record.id.clone(),
            text: text.to_string(),
        })
    }
}

#[derive(Debug, Default)]
pub struct SummarizeOutcome {
    pub summaries: Vec<Summary>,
    pub failures: Vec<GenerationFailure>,
}

impl SummarizeOutcome {
    fn push(&mut self, record_id: &str, result: Result<Summary, AppError>) {
        match result {
            Ok(summary) => self.summaries.push(summary),
            Err(err) => {
                tracing::warn!(record.id = %record_id, error = %err, "Skipping record");
                let reason = match err {
                    AppError::GenerationFailed { reason, .. } => reason,
                    other => other.to_string(),
                };
                self.failures.push(GenerationFailure {
                    record_id: record_id.to_string(),
                    reason,
                });
            }
        }
    }
}

/// Summarizes every record, skipping the ones whose generation fails.
/// Summaries come back in record order whatever the concurrency.
#[tracing::instrument(
    name = "pipeline_stage summarize",
    skip(generator, records),
    fields(
        pipeline.stage = "summarize",
        report.records = records.len(),
        report.summaries,
        report.skipped,
    )
)]
pub async fn summarize_records(
    generator: &SummaryGenerator,
    records: &[InventoryRecord],
    concurrency: usize,
) -> SummarizeOutcome {
    let outcome = if concurrency <= 1 {
        let mut outcome = SummarizeOutcome::default();
        for record in records {
            let result = generator.generate_summary(record).await;
            outcome.push(&record.id, result);
        }
        outcome
    } else {
        summarize_concurrently(generator, records, concurrency).await
    };

    let span = tracing::Span::current();
    span.record("report.summaries", outcome.summaries.len());
    span.record("report.skipped", outcome.failures.len());

    outcome
}

async fn summarize_concurrently(
    generator: &SummaryGenerator,
    records: &[InventoryRecord],
    concurrency: usize,
) -> SummarizeOutcome {
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let mut tasks = JoinSet::new();

    for (index, record) in records.iter().cloned().enumerate() {
        let generator = generator.clone();
        let semaphore = semaphore.clone();
        tasks.spawn(
            async move {
                let _permit = semaphore.acquire_owned().await;
                (index, generator.generate_summary(&record).await)
            }
            .in_current_span(),
        );
    }

    let mut slots: Vec<Option<Result<Summary, AppError>>> =
        std::iter::repeat_with(|| None).take(records.len()).collect();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, result)) => slots[index] = Some(result),
            Err(e) => tracing::error!(error = %e, "Summary task aborted"),
        }
    }

    let mut outcome = SummarizeOutcome::default();
    for (record, slot) in records.iter().zip(slots) {
        let result = slot.unwrap_or_else(|| {
            Err(AppError::GenerationFailed {
                record_id: record.id.clone(),
                reason: "generation task aborted".to_string(),
            })
        });
        outcome.push(&record.id, result);
    }
    outcome
}
