use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TradegraphError};
use crate::types::Depth;

/// Top-level tradegraph configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
}

/// Parameters seeded into the context config at pipeline start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Universe of tickers the ranking stage chooses from.
    #[serde(default)]
    pub tickers: Vec<String>,
    /// Analysis tasks run per ticker, in order.
    #[serde(default = "default_analysis_tasks")]
    pub analysis_tasks: Vec<String>,
    #[serde(default = "default_max_portfolio_size")]
    pub max_portfolio_size: usize,
    /// Debate rounds (one round = bull turn + bear turn).
    #[serde(default = "default_rounds")]
    pub rounds: u32,
    #[serde(default = "default_order_quantity")]
    pub order_quantity: u32,
    /// Limit price; 0 means market order.
    #[serde(default)]
    pub order_price: f64,
    /// Trade date; any format accepted by the report period normalizer.
    /// Defaults to the current time when unset.
    #[serde(default)]
    pub trade_date: Option<String>,
    /// Attempts an analyst node gets to produce a non-empty report.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tickers: vec![],
            analysis_tasks: default_analysis_tasks(),
            max_portfolio_size: default_max_portfolio_size(),
            rounds: default_rounds(),
            order_quantity: default_order_quantity(),
            order_price: 0.0,
            trade_date: None,
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_analysis_tasks() -> Vec<String> { vec!["financial".to_string()] }
fn default_max_portfolio_size() -> usize { 5 }
fn default_rounds() -> u32 { 1 }
fn default_order_quantity() -> u32 { 1 }
fn default_max_attempts() -> usize { 3 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_quick_model")]
    pub quick_model: String,
    #[serde(default = "default_deep_model")]
    pub deep_model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub quick_thinking_budget: i32,
    #[serde(default = "default_deep_thinking_budget")]
    pub deep_thinking_budget: i32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            quick_model: default_quick_model(),
            deep_model: default_deep_model(),
            api_key: None,
            base_url: None,
            quick_thinking_budget: 0,
            deep_thinking_budget: default_deep_thinking_budget(),
            timeout_secs: default_timeout_secs(),
            retry: None,
        }
    }
}

impl ModelConfig {
    /// Model id and thinking budget for a given depth.
    pub fn select(&self, depth: Depth) -> (&str, i32) {
        match depth {
            Depth::Quick => (&self.quick_model, self.quick_thinking_budget),
            Depth::Deep => (&self.deep_model, self.deep_thinking_budget),
        }
    }
}

fn default_provider() -> String { "gemini".to_string() }
fn default_quick_model() -> String { "gemini-2.5-flash".to_string() }
fn default_deep_model() -> String { "gemini-2.5-pro".to_string() }
fn default_deep_thinking_budget() -> i32 { -1 }
fn default_timeout_secs() -> u64 { 120 }

/// Retry configuration for generator requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_max_retries() -> u32 { 3 }
fn default_initial_backoff() -> u64 { 1000 }
fn default_max_backoff() -> u64 { 30000 }

/// Persistence of context state between runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateConfig {
    /// JSON snapshot of reports/config/logs. Unset = in-memory only.
    #[serde(default)]
    pub snapshot_path: Option<String>,
    /// Directory for per-turn debate transcript files.
    #[serde(default)]
    pub transcript_dir: Option<String>,
}

impl StateConfig {
    pub fn snapshot_path(&self) -> Option<PathBuf> {
        self.snapshot_path.as_deref().map(expand_home)
    }

    pub fn transcript_dir(&self) -> Option<PathBuf> {
        self.transcript_dir.as_deref().map(expand_home)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_broker_mode")]
    pub mode: String,
    /// Starting cash for the paper broker.
    #[serde(default = "default_cash")]
    pub cash: f64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            mode: default_broker_mode(),
            cash: default_cash(),
        }
    }
}

fn default_broker_mode() -> String { "paper".to_string() }
fn default_cash() -> f64 { 100_000.0 }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| TradegraphError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        let config: AppConfig =
            toml::from_str(&expanded).map_err(|e| TradegraphError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipelines cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.analysis_tasks.is_empty() {
            return Err(TradegraphError::Config(
                "pipeline.analysis_tasks must name at least one task".into(),
            ));
        }
        if self.pipeline.rounds == 0 {
            return Err(TradegraphError::Config("pipeline.rounds must be at least 1".into()));
        }
        if self.pipeline.max_attempts == 0 {
            return Err(TradegraphError::Config(
                "pipeline.max_attempts must be at least 1".into(),
            ));
        }
        if self.broker.mode != "paper" {
            return Err(TradegraphError::Config(format!(
                "unsupported broker mode '{}'",
                self.broker.mode
            )));
        }
        Ok(())
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var("HOME").ok().map(PathBuf::from) {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("TEST_TRADEGRAPH_VAR", "hello");
        let result = expand_env_vars("key = \"${TEST_TRADEGRAPH_VAR}\"");
        assert_eq!(result, "key = \"hello\"");
        std::env::remove_var("TEST_TRADEGRAPH_VAR");
    }

    #[test]
    fn test_expand_env_vars_missing() {
        let result = expand_env_vars("key = \"${NONEXISTENT_TRADEGRAPH_VAR}\"");
        assert_eq!(result, "key = \"${NONEXISTENT_TRADEGRAPH_VAR}\"");
    }

    #[test]
    fn test_defaults_from_minimal_toml() {
        let toml_str = r#"
[pipeline]
tickers = ["AAPL", "MSFT"]
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.pipeline.tickers, vec!["AAPL", "MSFT"]);
        assert_eq!(config.pipeline.analysis_tasks, vec!["financial"]);
        assert_eq!(config.pipeline.max_portfolio_size, 5);
        assert_eq!(config.pipeline.rounds, 1);
        assert_eq!(config.pipeline.order_quantity, 1);
        assert_eq!(config.pipeline.order_price, 0.0);
        assert!(config.pipeline.trade_date.is_none());
        assert_eq!(config.model.provider, "gemini");
        assert_eq!(config.model.deep_thinking_budget, -1);
        assert!(config.state.snapshot_path.is_none());
        assert_eq!(config.broker.mode, "paper");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_model_select_by_depth() {
        let model = ModelConfig::default();
        assert_eq!(model.select(Depth::Quick), ("gemini-2.5-flash", 0));
        assert_eq!(model.select(Depth::Deep), ("gemini-2.5-pro", -1));
    }

    #[test]
    fn test_validate_rejects_zero_rounds() {
        let mut config = AppConfig::default();
        config.pipeline.rounds = 0;
        assert!(matches!(config.validate(), Err(TradegraphError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_empty_tasks() {
        let mut config = AppConfig::default();
        config.pipeline.analysis_tasks.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_broker() {
        let mut config = AppConfig::default();
        config.broker.mode = "live".into();
        assert!(config.validate().is_err());
    }
}
