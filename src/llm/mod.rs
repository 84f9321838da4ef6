pub mod anthropic;
pub mod client;
pub mod openai;

use std::sync::Arc;

pub use client::LlmClient;

use crate::config::Config;
use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub model: String,
    pub system: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stage: String,
}

#[derive(Debug, Clone, Default)]
pub struct GenerateResponse {
    pub content: String,
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub finish_reason: String,
    pub provider: String,
}

impl GenerateResponse {
    /// True when the provider stopped because the output token budget ran out.
    pub fn is_truncated(&self) -> bool {
        matches!(self.finish_reason.as_str(), "length" | "max_tokens")
    }
}

#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    async fn generate(&self, req: &GenerateRequest) -> anyhow::Result<GenerateResponse>;
    fn name(&self) -> &str;
}

fn provider_for(name: &str, config: &Config) -> Result<Arc<dyn Provider>, AppError> {
    let key_for = |key: &Option<String>, var: &str| {
        key.clone()
            .ok_or_else(|| AppError::Config(format!("{var} must be set")))
    };

    match name {
        "openai" => {
            let api_key = key_for(&config.openai_api_key, "OPENAI_API_KEY")?;
            Ok(Arc::new(openai::OpenAIProvider::new(
                &api_key,
                config.openai_base_url.as_deref(),
            )))
        }
        "anthropic" => {
            let api_key = key_for(&config.anthropic_api_key, "ANTHROPIC_API_KEY")?;
            Ok(Arc::new(anthropic::AnthropicProvider::new(&api_key)))
        }
        other => Err(AppError::Config(format!(
            "unsupported LLM provider '{other}'"
        ))),
    }
}

impl LlmClient {
    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        let primary = provider_for(&config.llm_provider, config)?;
        let fallback = match config.fallback_provider.as_str() {
            "none" => None,
            name => Some(provider_for(name, config)?),
        };

        tracing::info!(
            primary_provider = %config.llm_provider,
            fallback_provider = %config.fallback_provider,
            max_attempts = config.llm_max_attempts,
            "LLM client initialized"
        );

        Ok(Self {
            primary,
            fallback,
            fallback_model: config.fallback_model.clone(),
            max_attempts: config.llm_max_attempts,
        })
    }
}
