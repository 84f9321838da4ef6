//! In-memory collaborators for pipeline tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::documents::{DocumentHandle, DocumentService, ExportFormat};
use crate::llm::{GenerateRequest, GenerateResponse, LlmClient, Provider};
use crate::store::{InventoryRecord, RecordStore};

use super::SummaryGenerator;

const SPECIES_PREFIX: &str = "Species: Species-";

pub fn record(id: &str) -> InventoryRecord {
    InventoryRecord::new(id)
        .with_field("Species", format!("Species-{id}"))
        .with_field("DBH", "40 cm")
        .with_field("Height", "18 m")
        .with_field("Health Condition", "Fair")
        .with_field("Risk Rating", "Moderate")
}

pub fn records(ids: &[&str]) -> Vec<InventoryRecord> {
    ids.iter().map(|id| record(id)).collect()
}

pub struct MockStore {
    result: Result<Vec<InventoryRecord>, String>,
    tables: Mutex<Vec<String>>,
}

impl MockStore {
    pub fn with_records(records: Vec<InventoryRecord>) -> Self {
        Self {
            result: Ok(records),
            tables: Mutex::new(Vec::new()),
        }
    }

    pub fn unavailable(message: &str) -> Self {
        Self {
            result: Err(message.to_string()),
            tables: Mutex::new(Vec::new()),
        }
    }

    pub fn requested_tables(&self) -> Vec<String> {
        self.tables.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl RecordStore for MockStore {
    async fn fetch(&self, table: &str) -> anyhow::Result<Vec<InventoryRecord>> {
        self.tables.lock().unwrap().push(table.to_string());
        self.result.clone().map_err(|msg| anyhow::anyhow!(msg))
    }
}

#[derive(Default)]
struct ProviderCounters {
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// Answers `Summary for {id}` for records built by [`record`], with
/// per-record failure modes.
#[derive(Clone, Default)]
pub struct ScriptedProvider {
    fail: Vec<String>,
    empty: Vec<String>,
    truncated: Vec<String>,
    delays: HashMap<String, Duration>,
    counters: Arc<ProviderCounters>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_all() -> Self {
        Self {
            fail: vec!["*".to_string()],
            ..Self::default()
        }
    }

    pub fn fail_for(mut self, id: &str) -> Self {
        self.fail.push(id.to_string());
        self
    }

    pub fn empty_for(mut self, id: &str) -> Self {
        self.empty.push(id.to_string());
        self
    }

    pub fn truncate_for(mut self, id: &str) -> Self {
        self.truncated.push(id.to_string());
        self
    }

    pub fn delay_for(mut self, id: &str, delay: Duration) -> Self {
        self.delays.insert(id.to_string(), delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.counters.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.counters.max_in_flight.load(Ordering::SeqCst)
    }

    async fn respond(&self, id: &str, req: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
        if let Some(delay) = self.delays.get(id) {
            tokio::time::sleep(*delay).await;
        }
        if self.fail.iter().any(|f| f == id || f == "*") {
            anyhow::bail!("503 service unavailable for {id}");
        }

        let mut resp = GenerateResponse {
            content: format!("  Summary for {id}\n"),
            model: req.model.clone(),
            input_tokens: 100,
            output_tokens: 60,
            finish_reason: "stop".to_string(),
            provider: String::new(),
        };
        if self.empty.iter().any(|e| e == id) {
            resp.content = " \n".to_string();
        }
        if self.truncated.iter().any(|t| t == id) {
            resp.finish_reason = "length".to_string();
        }
        Ok(resp)
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    async fn generate(&self, req: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
        self.counters.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let id = req
            .prompt
            .lines()
            .find_map(|line| line.strip_prefix(SPECIES_PREFIX))
            .unwrap_or_default()
            .to_string();
        let result = self.respond(&id, req).await;

        self.counters.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

pub fn generator(provider: ScriptedProvider) -> SummaryGenerator {
    let llm = LlmClient::new(Arc::new(provider));
    SummaryGenerator::new(Arc::new(llm), "gpt-4o-mini", 400, 0.3)
}

#[derive(Default)]
struct DocsState {
    next_id: usize,
    documents: HashMap<String, Vec<String>>,
    appends: usize,
    exports: usize,
    discarded: Vec<String>,
}

/// Document service keeping paragraphs in memory. Each opened document is
/// a copy of the template; the insertion index counts paragraphs.
pub struct MockDocuments {
    template: Vec<String>,
    fail_open: Option<String>,
    fail_append_at: Option<usize>,
    export_bytes: Vec<u8>,
    state: Mutex<DocsState>,
}

impl MockDocuments {
    pub fn new(template: &[&str]) -> Self {
        Self {
            template: template.iter().map(|p| p.to_string()).collect(),
            fail_open: None,
            fail_append_at: None,
            export_bytes: b"%PDF-1.7 mock".to_vec(),
            state: Mutex::new(DocsState::default()),
        }
    }

    pub fn failing_open(mut self, message: &str) -> Self {
        self.fail_open = Some(message.to_string());
        self
    }

    /// Rejects the append with this zero-based position across all calls.
    pub fn failing_append_at(mut self, position: usize) -> Self {
        self.fail_append_at = Some(position);
        self
    }

    pub fn exporting(mut self, bytes: &[u8]) -> Self {
        self.export_bytes = bytes.to_vec();
        self
    }

    pub fn template(&self) -> &[String] {
        &self.template
    }

    pub fn document(&self, id: &str) -> Option<Vec<String>> {
        self.state.lock().unwrap().documents.get(id).cloned()
    }

    pub fn opened(&self) -> usize {
        self.state.lock().unwrap().next_id
    }

    pub fn appends(&self) -> usize {
        self.state.lock().unwrap().appends
    }

    pub fn exports(&self) -> usize {
        self.state.lock().unwrap().exports
    }

    pub fn discarded(&self) -> Vec<String> {
        self.state.lock().unwrap().discarded.clone()
    }
}

#[async_trait::async_trait]
impl DocumentService for MockDocuments {
    async fn open_template(&self, template_id: &str) -> anyhow::Result<DocumentHandle> {
        if let Some(message) = &self.fail_open {
            anyhow::bail!("{message}");
        }
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let document_id = format!("doc-{}", state.next_id);
        state
            .documents
            .insert(document_id.clone(), self.template.clone());

        Ok(DocumentHandle {
            template_id: template_id.to_string(),
            document_id,
            insertion_index: self.template.len() as u64,
        })
    }

    async fn append_text(&self, handle: &mut DocumentHandle, text: &str) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        let position = state.appends;
        state.appends += 1;
        if self.fail_append_at == Some(position) {
            anyhow::bail!("403 permission denied");
        }

        let paragraphs = state
            .documents
            .get_mut(&handle.document_id)
            .ok_or_else(|| anyhow::anyhow!("unknown document {}", handle.document_id))?;
        paragraphs.insert(
            handle.insertion_index as usize,
            text.trim_start_matches('\n').to_string(),
        );
        handle.insertion_index += 1;
        Ok(())
    }

    async fn export(
        &self,
        handle: &DocumentHandle,
        _format: ExportFormat,
    ) -> anyhow::Result<Vec<u8>> {
        let mut state = self.state.lock().unwrap();
        if !state.documents.contains_key(&handle.document_id) {
            anyhow::bail!("unknown document {}", handle.document_id);
        }
        state.exports += 1;
        Ok(self.export_bytes.clone())
    }

    async fn discard(&self, handle: &DocumentHandle) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.documents.remove(&handle.document_id);
        state.discarded.push(handle.document_id.clone());
        Ok(())
    }
}
