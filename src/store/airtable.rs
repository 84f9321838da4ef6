use std::collections::HashSet;
use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::{InventoryRecord, RecordStore, render_scalar};

/// Airtable REST API client. Pages are followed through the `offset` cursor.
pub struct AirtableStore {
    client: reqwest::Client,
    api_base: String,
    base_id: String,
    api_key: String,
}

#[derive(Deserialize)]
struct ListRecordsPage {
    #[serde(default)]
    records: Vec<AirtableRecord>,
    offset: Option<String>,
}

#[derive(Deserialize)]
struct AirtableRecord {
    id: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

impl From<AirtableRecord> for InventoryRecord {
    fn from(record: AirtableRecord) -> Self {
        InventoryRecord {
            id: record.id,
            fields: record
                .fields
                .iter()
                .map(|(name, value)| (name.clone(), render_scalar(value)))
                .collect(),
        }
    }
}

impl AirtableStore {
    pub fn new(api_base: &str, base_id: &str, api_key: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            base_id: base_id.to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn table_url(&self, table: &str) -> anyhow::Result<Url> {
        let mut url = Url::parse(&self.api_base)?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("Airtable API base cannot carry a path"))?
            .pop_if_empty()
            .push(&self.base_id)
            .push(table);
        Ok(url)
    }

    async fn fetch_page(&self, url: &Url, offset: Option<&str>) -> anyhow::Result<ListRecordsPage> {
        let mut request = self.client.get(url.clone()).bearer_auth(&self.api_key);
        if let Some(offset) = offset {
            request = request.query(&[("offset", offset)]);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Airtable API error ({status}): {body}");
        }

        Ok(response.json().await?)
    }
}

#[async_trait::async_trait]
impl RecordStore for AirtableStore {
    #[tracing::instrument(
        name = "airtable.list_records",
        skip(self),
        fields(airtable.pages, airtable.records)
    )]
    async fn fetch(&self, table: &str) -> anyhow::Result<Vec<InventoryRecord>> {
        let url = self.table_url(table)?;
        let mut records = Vec::new();
        let mut offset: Option<String> = None;
        let mut seen = HashSet::new();
        let mut pages = 0usize;

        loop {
            let page = self.fetch_page(&url, offset.as_deref()).await?;
            pages += 1;
            records.extend(page.records.into_iter().map(InventoryRecord::from));

            match page.offset {
                Some(next) if !next.is_empty() => {
                    if !seen.insert(next.clone()) {
                        anyhow::bail!("Airtable returned offset '{next}' twice");
                    }
                    offset = Some(next);
                }
                _ => break,
            }
        }

        let span = tracing::Span::current();
        span.record("airtable.pages", pages);
        span.record("airtable.records", records.len());

        Ok(records)
    }
}
