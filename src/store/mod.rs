pub mod airtable;

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

pub use airtable::AirtableStore;

/// One tree inventory row. Attribute values are rendered to strings at fetch
/// time and never change afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InventoryRecord {
    pub id: String,
    pub fields: BTreeMap<String, String>,
}

impl InventoryRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Field value, or `default` when the column is absent or blank.
    pub fn field_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        match self.fields.get(name).map(|v| v.trim()) {
            Some(v) if !v.is_empty() => v,
            _ => default,
        }
    }
}

/// Tabular store holding the inventory.
#[async_trait::async_trait]
pub trait RecordStore: Send + Sync {
    /// Returns every row of `table` in the store's native order.
    async fn fetch(&self, table: &str) -> anyhow::Result<Vec<InventoryRecord>>;
}

pub(crate) fn render_scalar(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .map(render_scalar)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(_) => value.to_string(),
    }
}
