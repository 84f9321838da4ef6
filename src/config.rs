use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub environment: String,

    pub airtable_api_key: String,
    pub airtable_base_id: String,
    pub airtable_table: String,
    pub airtable_api_base: String,

    pub llm_provider: String,
    pub llm_model: String,
    pub llm_max_tokens: u32,
    pub llm_temperature: f32,
    pub llm_max_attempts: u32,
    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub fallback_provider: String,
    pub fallback_model: String,
    pub generation_concurrency: usize,

    pub google_access_token: String,
    pub google_doc_template_id: String,
    pub google_docs_api_base: String,
    pub google_drive_api_base: String,
    pub template_insertion_marker: Option<String>,
    pub report_document_title: String,

    pub output_dir: PathBuf,
    pub output_filename: String,

    pub otel_service_name: String,
    pub otel_exporter_endpoint: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup. Blank
    /// values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(&lookup);

        let llm_provider = vars.or("LLM_PROVIDER", "openai");
        let openai_api_key = vars.optional("OPENAI_API_KEY");
        let anthropic_api_key = vars.optional("ANTHROPIC_API_KEY");
        let fallback_provider = vars.or("FALLBACK_PROVIDER", "none");

        for provider in [llm_provider.as_str(), fallback_provider.as_str()] {
            match provider {
                "openai" if openai_api_key.is_none() => {
                    return Err(missing("OPENAI_API_KEY"));
                }
                "anthropic" if anthropic_api_key.is_none() => {
                    return Err(missing("ANTHROPIC_API_KEY"));
                }
                "openai" | "anthropic" | "none" => {}
                other => {
                    return Err(AppError::Config(format!(
                        "unsupported LLM provider '{other}'"
                    )));
                }
            }
        }
        if llm_provider == "none" {
            return Err(AppError::Config(
                "LLM_PROVIDER must name a provider".to_string(),
            ));
        }

        let llm_model = match vars.optional("LLM_MODEL") {
            Some(model) => model,
            None if llm_provider == "anthropic" => "claude-sonnet-4-5-20250929".to_string(),
            None => vars.or("OPENAI_MODEL", "gpt-4o-mini"),
        };

        let llm_max_attempts: u32 = vars.parsed("LLM_MAX_ATTEMPTS", 1)?;
        let generation_concurrency: usize = vars.parsed("GENERATION_CONCURRENCY", 1)?;
        if llm_max_attempts == 0 || generation_concurrency == 0 {
            return Err(AppError::Config(
                "LLM_MAX_ATTEMPTS and GENERATION_CONCURRENCY must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            port: vars.parsed("APP_PORT", 8080)?,
            environment: vars.or("ENVIRONMENT", "development"),

            airtable_api_key: vars.required("AIRTABLE_API_KEY")?,
            airtable_base_id: vars.required("AIRTABLE_BASE_ID")?,
            airtable_table: vars.or("AIRTABLE_TABLE_NAME", "Trees"),
            airtable_api_base: vars.or("AIRTABLE_API_BASE", "https://api.airtable.com/v0"),

            llm_provider,
            llm_model,
            llm_max_tokens: vars.parsed("OPENAI_MAX_TOKENS", 400)?,
            llm_temperature: vars.parsed("LLM_TEMPERATURE", 0.3)?,
            llm_max_attempts,
            openai_api_key,
            openai_base_url: vars.optional("OPENAI_BASE_URL"),
            anthropic_api_key,
            fallback_provider,
            fallback_model: vars.or("FALLBACK_MODEL", "claude-haiku-4-5-20251001"),
            generation_concurrency,

            google_access_token: vars.required("GOOGLE_ACCESS_TOKEN")?,
            google_doc_template_id: vars.required("GOOGLE_DOC_TEMPLATE_ID")?,
            google_docs_api_base: vars.or("GOOGLE_DOCS_API_BASE", "https://docs.googleapis.com/v1"),
            google_drive_api_base: vars.or(
                "GOOGLE_DRIVE_API_BASE",
                "https://www.googleapis.com/drive/v3",
            ),
            template_insertion_marker: vars.optional("TEMPLATE_INSERTION_MARKER"),
            report_document_title: vars.or("REPORT_DOCUMENT_TITLE", "Tree Risk Assessment Report"),

            output_dir: PathBuf::from(vars.or("OUTPUT_DIR", "outputs")),
            output_filename: vars.or("OUTPUT_PDF_FILENAME", "generated_report.pdf"),

            otel_service_name: vars.or("OTEL_SERVICE_NAME", "tree-risk-reports"),
            otel_exporter_endpoint: vars.optional("OTEL_EXPORTER_OTLP_ENDPOINT"),
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(&self.output_filename)
    }
}

struct Vars<'a, F>(&'a F);

impl<F> Vars<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, name: &str) -> Result<String, AppError> {
        self.optional(name).ok_or_else(|| missing(name))
    }

    fn or(&self, name: &str, default: &str) -> String {
        self.optional(name).unwrap_or_else(|| default.to_string())
    }

    fn parsed<T: FromStr>(&self, name: &str, default: T) -> Result<T, AppError> {
        match self.optional(name) {
            Some(raw) => raw
                .parse()
                .map_err(|_| AppError::Config(format!("{name} has an invalid value '{raw}'"))),
            None => Ok(default),
        }
    }
}

fn missing(name: &str) -> AppError {
    AppError::Config(format!("{name} must be set"))
}
