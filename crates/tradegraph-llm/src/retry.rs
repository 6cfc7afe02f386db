use std::time::Duration;

use tracing::warn;

use tradegraph_core::config::RetryConfig;
use tradegraph_core::error::{Result, TradegraphError};
use tradegraph_core::traits::{Generator, Validator};
use tradegraph_core::types::GenerateRequest;

/// A generator that retries failed requests with exponential backoff.
///
/// Malformed structured output, including responses rejected by the caller's
/// validator, counts as retryable, so callers only ever see a final success
/// or a final failure.
pub struct RetryingGenerator {
    inner: Box<dyn Generator>,
    retry_config: RetryConfig,
}

impl RetryingGenerator {
    pub fn new(inner: Box<dyn Generator>, retry_config: RetryConfig) -> Self {
        Self {
            inner,
            retry_config,
        }
    }
}

fn is_retryable(e: &TradegraphError) -> bool {
    match e {
        TradegraphError::Llm(msg) => {
            msg.contains("429")
                || msg.contains("500")
                || msg.contains("502")
                || msg.contains("503")
                || msg.contains("timeout")
                || msg.contains("timed out")
                || msg.contains("connection")
        }
        TradegraphError::LlmParse(_) => true,
        _ => false,
    }
}

fn calculate_backoff(attempt: u32, config: &RetryConfig) -> Duration {
    let ms = config
        .initial_backoff_ms
        .saturating_mul(2u64.saturating_pow(attempt))
        .min(config.max_backoff_ms);
    // Add jitter: 0.8x to 1.2x
    let jitter = 0.8 + rand::random::<f64>() * 0.4;
    Duration::from_millis((ms as f64 * jitter) as u64)
}

impl Generator for RetryingGenerator {
    fn generate(&self, request: &GenerateRequest) -> Result<serde_json::Value> {
        self.generate_validated(request, &|_| Ok(()))
    }

    fn generate_validated(
        &self,
        request: &GenerateRequest,
        validate: Validator<'_>,
    ) -> Result<serde_json::Value> {
        let max_retries = self.retry_config.max_retries;

        let mut attempt = 0;
        loop {
            let result = self
                .inner
                .generate(request)
                .and_then(|value| validate(&value).map(|_| value));
            match result {
                Ok(value) => return Ok(value),
                Err(e) if is_retryable(&e) && attempt < max_retries => {
                    let backoff = calculate_backoff(attempt, &self.retry_config);
                    warn!(
                        agent = %request.agent,
                        attempt = attempt + 1,
                        max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Retrying generator request"
                    );
                    std::thread::sleep(backoff);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
