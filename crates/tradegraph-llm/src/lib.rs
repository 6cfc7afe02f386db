pub mod gemini;
pub mod retry;

use tradegraph_core::config::ModelConfig;
use tradegraph_core::error::{Result, TradegraphError};
use tradegraph_core::traits::Generator;

pub use gemini::GeminiGenerator;
pub use retry::RetryingGenerator;

/// Create a retrying generator for the configured provider.
pub fn create_generator(config: &ModelConfig) -> Result<Box<dyn Generator>> {
    let primary: Box<dyn Generator> = match config.provider.as_str() {
        "gemini" | "google" => Box::new(GeminiGenerator::new(config)?),
        other => {
            return Err(TradegraphError::Config(format!(
                "unsupported model provider '{}'",
                other
            )))
        }
    };

    Ok(Box::new(RetryingGenerator::new(
        primary,
        config.retry.clone().unwrap_or_default(),
    )))
}
