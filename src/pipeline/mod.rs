pub mod assemble;
pub mod export;
pub mod orchestrator;
pub mod retrieve;
pub mod summarize;

#[cfg(test)]
pub(crate) mod test_support;

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::documents::{DocumentHandle, ExportFormat};
use crate::error::AppError;

pub use orchestrator::{Pipeline, RunRequest};
pub use summarize::SummaryGenerator;

/// Generated prose for one inventory record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub record_id: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationFailure {
    pub record_id: String,
    pub reason: String,
}

/// Summaries appended to a working document, in record order.
#[derive(Debug, Clone, Serialize)]
pub struct ReportDraft {
    pub template_id: String,
    pub document: DocumentHandle,
    pub sections: Vec<Summary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportedReport {
    pub path: PathBuf,
    pub format: ExportFormat,
    pub bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Fetching,
    Summarizing,
    Assembling,
    Exporting,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Fetching => "fetching",
            Phase::Summarizing => "summarizing",
            Phase::Assembling => "assembling",
            Phase::Exporting => "exporting",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a run that reached `Done`.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub report: ExportedReport,
    pub document_id: String,
    pub summaries: usize,
    pub skipped: usize,
    pub failures: Vec<GenerationFailure>,
}

/// Outcome of a run that ended in `Failed`.
#[derive(Debug)]
pub struct RunFailure {
    pub phase: Phase,
    pub error: AppError,
    /// Records successfully summarized before the run failed.
    pub summarized: usize,
}

impl fmt::Display for RunFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} phase failed after {} record(s) summarized: {}",
            self.phase, self.summarized, self.error
        )
    }
}

impl std::error::Error for RunFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
