use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use tradegraph_core::config::ModelConfig;
use tradegraph_core::error::{Result, TradegraphError};
use tradegraph_core::traits::Generator;
use tradegraph_core::types::GenerateRequest;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Google Gemini structured-output client.
///
/// Blocking client; pipelines run on a worker thread and never suspend.
pub struct GeminiGenerator {
    http: Client,
    api_key: String,
    base_url: String,
}

impl GeminiGenerator {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("GEMINI_API_KEY").ok())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                TradegraphError::Config("Gemini: set model.api_key or GEMINI_API_KEY".into())
            })?;

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TradegraphError::Llm(e.to_string()))?;

        Ok(Self {
            http,
            api_key,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        })
    }
}

// ── Request types ────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    generation_config: GenerationConfig,
}

#[derive(Serialize, Deserialize, Debug)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize, Debug)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    response_schema: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking_config: Option<ThinkingConfig>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ThinkingConfig {
    thinking_budget: i32,
}

// ── Response types ───────────────────────────────────────────────

#[derive(Deserialize, Debug)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize, Debug)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

// ── Conversion ───────────────────────────────────────────────────

fn build_request(request: &GenerateRequest) -> GeminiRequest {
    let parts = request
        .parts
        .iter()
        .map(|p| GeminiPart { text: p.clone() })
        .collect();

    GeminiRequest {
        contents: vec![GeminiContent {
            role: Some("user".to_string()),
            parts,
        }],
        system_instruction: request.system.as_ref().map(|s| GeminiContent {
            role: None,
            parts: vec![GeminiPart { text: s.clone() }],
        }),
        generation_config: GenerationConfig {
            response_mime_type: "application/json",
            response_schema: request.schema.clone(),
            // -1 lets the provider decide
            thinking_config: (request.thinking_budget >= 0).then_some(ThinkingConfig {
                thinking_budget: request.thinking_budget,
            }),
        },
    }
}

/// Extract the JSON payload from a response body.
fn parse_response(body: &str) -> Result<serde_json::Value> {
    let response: GeminiResponse =
        serde_json::from_str(body).map_err(|e| TradegraphError::LlmParse(e.to_string()))?;

    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().map(|p| p.text).collect())
        .unwrap_or_default();

    parse_json_text(&text)
}

/// Parse model text as JSON, tolerating a surrounding code fence.
pub fn parse_json_text(text: &str) -> Result<serde_json::Value> {
    let trimmed = text.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    if unfenced.is_empty() {
        return Err(TradegraphError::LlmParse("empty response".into()));
    }

    serde_json::from_str(unfenced).map_err(|e| TradegraphError::LlmParse(e.to_string()))
}

impl Generator for GeminiGenerator {
    fn generate(&self, request: &GenerateRequest) -> Result<serde_json::Value> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url.trim_end_matches('/'),
            request.model,
            self.api_key
        );

        debug!(agent = %request.agent, model = %request.model, parts = request.parts.len(), "Gemini request");

        let response = self
            .http
            .post(&url)
            .header("content-type", "application/json")
            .json(&build_request(request))
            .send()
            .map_err(|e| TradegraphError::Llm(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| TradegraphError::Llm(e.to_string()))?;

        if !status.is_success() {
            return Err(TradegraphError::Llm(format!("HTTP {}: {}", status, body)));
        }

        parse_response(&body)
    }
}
