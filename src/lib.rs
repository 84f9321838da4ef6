pub mod config;
pub mod documents;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod routes;
pub mod store;
pub mod telemetry;

use std::path::PathBuf;
use std::sync::Arc;

pub use config::Config;

use pipeline::Pipeline;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub table: String,
    pub template_id: String,
    pub output_dir: PathBuf,
}

impl AppState {
    pub fn from_config(config: &Config) -> Result<Self, error::AppError> {
        Ok(Self {
            pipeline: Arc::new(Pipeline::from_config(config)?),
            table: config.airtable_table.clone(),
            template_id: config.google_doc_template_id.clone(),
            output_dir: config.output_dir.clone(),
        })
    }
}
