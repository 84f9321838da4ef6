pub mod google;

use serde::Serialize;

pub use google::GoogleDocsService;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Pdf,
}

impl ExportFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            ExportFormat::Pdf => "application/pdf",
        }
    }
}

/// A working document opened from a template.
///
/// `insertion_index` is the position the next appended section lands at,
/// expressed in the document service's index units. Appending advances it,
/// so sections keep their append order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentHandle {
    pub template_id: String,
    pub document_id: String,
    pub insertion_index: u64,
}

/// Document service the report is assembled in and exported from.
#[async_trait::async_trait]
pub trait DocumentService: Send + Sync {
    /// Opens a fresh working document derived from the template's current
    /// state. The template itself is never modified.
    async fn open_template(&self, template_id: &str) -> anyhow::Result<DocumentHandle>;

    /// Inserts `text` at the handle's insertion point and advances it.
    async fn append_text(&self, handle: &mut DocumentHandle, text: &str) -> anyhow::Result<()>;

    async fn export(&self, handle: &DocumentHandle, format: ExportFormat)
    -> anyhow::Result<Vec<u8>>;

    /// Removes a working document that will not be exported.
    async fn discard(&self, handle: &DocumentHandle) -> anyhow::Result<()>;
}
