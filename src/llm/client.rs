use std::sync::Arc;
use std::time::{Duration, Instant};

use opentelemetry::KeyValue;
use tracing::Instrument;
use tracing_opentelemetry::OpenTelemetrySpanExt;

use super::{GenerateRequest, GenerateResponse, Provider};
use crate::telemetry::metrics::{
    GEN_AI_ERROR_COUNT, GEN_AI_FALLBACK_COUNT, GEN_AI_OPERATION_DURATION, GEN_AI_RETRY_COUNT,
    GEN_AI_TOKEN_USAGE,
};

/// Text-generation client used by the summary stage. Wraps a primary
/// provider and an optional fallback; every call is traced and metered.
pub struct LlmClient {
    pub primary: Arc<dyn Provider>,
    pub fallback: Option<Arc<dyn Provider>>,
    pub fallback_model: String,
    /// Attempts per provider. 1 means a single call with no retry.
    pub max_attempts: u32,
}

impl LlmClient {
    pub fn new(primary: Arc<dyn Provider>) -> Self {
        Self {
            primary,
            fallback: None,
            fallback_model: String::new(),
            max_attempts: 1,
        }
    }

    pub async fn generate_once(
        &self,
        provider: &dyn Provider,
        req: &GenerateRequest,
    ) -> anyhow::Result<GenerateResponse> {
        let provider_name = provider.name().to_string();
        let span_display_name = format!("gen_ai.chat {}", req.model);
        let start = Instant::now();

        let span = tracing::info_span!(
            "gen_ai.chat",
            otel.name = %span_display_name,
            gen_ai.operation.name = "chat",
            gen_ai.provider.name = %provider_name,
            gen_ai.request.model = %req.model,
            server.address = %server_address(&provider_name),
            gen_ai.request.temperature = req.temperature,
            gen_ai.request.max_tokens = req.max_tokens as i64,
            gen_ai.response.model = tracing::field::Empty,
            gen_ai.usage.input_tokens = tracing::field::Empty,
            gen_ai.usage.output_tokens = tracing::field::Empty,
            gen_ai.response.finish_reasons = tracing::field::Empty,
            report.stage = %req.stage,
            otel.status_code = tracing::field::Empty,
            error.type = tracing::field::Empty,
        );

        span.add_event(
            "gen_ai.user.message",
            vec![KeyValue::new("gen_ai.prompt", truncate(&req.prompt, 1000))],
        );

        let result = provider.generate(req).instrument(span.clone()).await;

        let duration = start.elapsed().as_secs_f64();

        match result {
            Ok(mut resp) => {
                resp.provider = provider_name.clone();

                span.record("gen_ai.response.model", resp.model.as_str());
                span.record("gen_ai.usage.input_tokens", resp.input_tokens as i64);
                span.record("gen_ai.usage.output_tokens", resp.output_tokens as i64);
                if !resp.finish_reason.is_empty() {
                    span.record(
                        "gen_ai.response.finish_reasons",
                        resp.finish_reason.as_str(),
                    );
                }

                span.add_event(
                    "gen_ai.assistant.message",
                    vec![KeyValue::new(
                        "gen_ai.completion",
                        truncate(&resp.content, 2000),
                    )],
                );

                let op_kv = KeyValue::new("gen_ai.operation.name", "chat");
                let provider_kv = KeyValue::new("gen_ai.provider.name", provider_name);
                let model_kv = KeyValue::new("gen_ai.request.model", req.model.clone());

                GEN_AI_TOKEN_USAGE.record(
                    f64::from(resp.input_tokens),
                    &[
                        KeyValue::new("gen_ai.token.type", "input"),
                        op_kv.clone(),
                        provider_kv.clone(),
                        model_kv.clone(),
                    ],
                );
                GEN_AI_TOKEN_USAGE.record(
                    f64::from(resp.output_tokens),
                    &[
                        KeyValue::new("gen_ai.token.type", "output"),
                        op_kv.clone(),
                        provider_kv.clone(),
                        model_kv.clone(),
                    ],
                );
                GEN_AI_OPERATION_DURATION.record(duration, &[op_kv, provider_kv, model_kv]);

                Ok(resp)
            }
            Err(err) => {
                span.record("otel.status_code", "ERROR");
                span.record("error.type", classify_error(&err));

                GEN_AI_ERROR_COUNT.add(
                    1,
                    &[
                        KeyValue::new("gen_ai.provider.name", provider_name),
                        KeyValue::new("gen_ai.request.model", req.model.clone()),
                    ],
                );

                Err(err)
            }
        }
    }

    pub async fn generate_with_retry(
        &self,
        provider: &dyn Provider,
        req: &GenerateRequest,
    ) -> anyhow::Result<GenerateResponse> {
        let max_attempts = self.max_attempts.max(1);
        let mut last_err = None;

        for attempt in 0..max_attempts {
            if attempt > 0 {
                GEN_AI_RETRY_COUNT.add(
                    1,
                    &[
                        KeyValue::new("gen_ai.provider.name", provider.name().to_string()),
                        KeyValue::new("gen_ai.request.model", req.model.clone()),
                    ],
                );
            }

            match self.generate_once(provider, req).await {
                Ok(resp) => return Ok(resp),
                Err(err) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_attempts = max_attempts,
                        provider = provider.name(),
                        model = %req.model,
                        error = %err,
                        "LLM call failed"
                    );

                    last_err = Some(err);

                    if attempt + 1 < max_attempts {
                        tokio::time::sleep(backoff_delay(attempt)).await;
                    }
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("all attempts exhausted")))
    }

    pub async fn generate(&self, req: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
        let primary_err = match self.generate_with_retry(self.primary.as_ref(), req).await {
            Ok(resp) => return Ok(resp),
            Err(err) => err,
        };

        let Some(fallback) = self.fallback.as_ref() else {
            return Err(primary_err.context(format!(
                "provider {} failed",
                self.primary.name()
            )));
        };

        tracing::warn!(
            primary_provider = self.primary.name(),
            fallback_provider = fallback.name(),
            error = %primary_err,
            "Primary provider failed, falling back"
        );

        GEN_AI_FALLBACK_COUNT.add(1, &[]);

        let fallback_req = GenerateRequest {
            model: self.fallback_model.clone(),
            ..req.clone()
        };

        self.generate_with_retry(fallback.as_ref(), &fallback_req)
            .await
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    let base = Duration::from_secs(1) * 2u32.pow(attempt.min(4));
    let base = base.min(Duration::from_secs(10));
    let jitter_ms = fastrand::u64(0..=base.as_millis() as u64 / 4);
    base + Duration::from_millis(jitter_ms)
}

fn server_address(provider_name: &str) -> &'static str {
    match provider_name {
        "openai" => "api.openai.com",
        "anthropic" => "api.anthropic.com",
        _ => "unknown",
    }
}

fn classify_error(err: &anyhow::Error) -> &'static str {
    let msg = err.to_string().to_lowercase();
    if msg.contains("rate limit") || msg.contains("429") {
        "rate_limit"
    } else if msg.contains("timeout") || msg.contains("timed out") || msg.contains("deadline") {
        "timeout"
    } else if msg.contains("401")
        || msg.contains("403")
        || msg.contains("auth")
        || msg.contains("api key")
    {
        "auth_error"
    } else if msg.contains("400") || msg.contains("422") || msg.contains("invalid") {
        "invalid_request"
    } else if msg.contains("500")
        || msg.contains("502")
        || msg.contains("503")
        || msg.contains("server")
    {
        "server_error"
    } else if msg.contains("connect")
        || msg.contains("dns")
        || msg.contains("network")
        || msg.contains("reset")
    {
        "network_error"
    } else {
        "unknown_error"
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        s.char_indices()
            .take_while(|&(i, _)| i < max)
            .map(|(_, c)| c)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    struct FlakyProvider {
        name: &'static str,
        failures_before_success: u32,
        calls: AtomicU32,
    }

    impl FlakyProvider {
        fn new(name: &'static str, failures_before_success: u32) -> Self {
            Self {
                name,
                failures_before_success,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl Provider for FlakyProvider {
        async fn generate(&self, req: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures_before_success {
                anyhow::bail!("503 service unavailable");
            }
            Ok(GenerateResponse {
                content: format!("{} via {}", req.model, self.name),
                model: req.model.clone(),
                finish_reason: "stop".to_string(),
                ..Default::default()
            })
        }

        fn name(&self) -> &str {
            self.name
        }
    }

    fn request() -> GenerateRequest {
        GenerateRequest {
            model: "gpt-4o-mini".to_string(),
            system: String::new(),
            prompt: "Summarise".to_string(),
            temperature: 0.3,
            max_tokens: 400,
            stage: "summarize".to_string(),
        }
    }

    #[tokio::test]
    async fn test_single_attempt_by_default() {
        let primary = Arc::new(FlakyProvider::new("openai", 1));
        let client = LlmClient::new(primary.clone());

        let result = client.generate(&request()).await;
        assert!(result.is_err());
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_successful_call_sets_provider() {
        let client = LlmClient::new(Arc::new(FlakyProvider::new("openai", 0)));

        let resp = client.generate(&request()).await.unwrap();
        assert_eq!(resp.provider, "openai");
        assert_eq!(resp.content, "gpt-4o-mini via openai");
    }

    #[tokio::test]
    async fn test_fallback_uses_fallback_model() {
        let primary = Arc::new(FlakyProvider::new("openai", u32::MAX));
        let fallback = Arc::new(FlakyProvider::new("anthropic", 0));
        let client = LlmClient {
            primary: primary.clone(),
            fallback: Some(fallback.clone()),
            fallback_model: "claude-haiku".to_string(),
            max_attempts: 1,
        };

        let resp = client.generate(&request()).await.unwrap();
        assert_eq!(resp.provider, "anthropic");
        assert_eq!(resp.model, "claude-haiku");
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_when_configured() {
        let primary = Arc::new(FlakyProvider::new("openai", 2));
        let client = LlmClient {
            max_attempts: 3,
            ..LlmClient::new(primary.clone())
        };

        let resp = client.generate(&request()).await.unwrap();
        assert_eq!(resp.provider, "openai");
        assert_eq!(primary.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_backoff_is_capped() {
        for attempt in 0..8 {
            let delay = backoff_delay(attempt);
            assert!(delay >= Duration::from_secs(1));
            assert!(delay <= Duration::from_millis(12_500));
        }
    }

    #[test]
    fn test_classify_error_categories() {
        let cases = vec![
            ("rate limit exceeded", "rate_limit"),
            ("status 429: too many requests", "rate_limit"),
            ("request timed out", "timeout"),
            ("401 unauthorized", "auth_error"),
            ("invalid api key", "auth_error"),
            ("400 bad request", "invalid_request"),
            ("503 service unavailable", "server_error"),
            ("connection refused", "network_error"),
            ("something unexpected", "unknown_error"),
        ];

        for (msg, expected) in cases {
            let err = anyhow::anyhow!("{}", msg);
            assert_eq!(
                classify_error(&err),
                expected,
                "classify_error({msg:?}) should be {expected:?}"
            );
        }
    }

    #[test]
    fn test_truncate_multibyte_safe() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello world", 5), "hello");
        let result = truncate("hé世界!", 3);
        assert!(result.len() <= 3);
        assert!(result.is_char_boundary(result.len()));
    }
}
