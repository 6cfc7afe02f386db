//! Structured-output calls to the language model.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::debug;

use tradegraph_core::config::ModelConfig;
use tradegraph_core::error::{Result, TradegraphError};
use tradegraph_core::traits::Generator;
use tradegraph_core::types::{Depth, GenerateRequest};

/// A response type with a JSON schema the model is asked to follow.
pub trait Structured: DeserializeOwned {
    fn schema() -> serde_json::Value;
}

/// A labelled handle on the generator, e.g. the "bull" researcher.
#[derive(Clone)]
pub struct Agent {
    label: String,
    generator: Arc<dyn Generator>,
    models: Arc<ModelConfig>,
}

impl Agent {
    pub fn new(
        label: impl Into<String>,
        generator: Arc<dyn Generator>,
        models: Arc<ModelConfig>,
    ) -> Self {
        Self {
            label: label.into(),
            generator,
            models,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Ask for a `T`-shaped answer.
    pub fn ask<T: Structured>(
        &self,
        depth: Depth,
        system: &str,
        parts: Vec<String>,
    ) -> Result<T> {
        let (model, thinking_budget) = self.models.select(depth);
        let request = GenerateRequest {
            agent: self.label.clone(),
            model: model.to_string(),
            parts,
            system: (!system.is_empty()).then(|| system.to_string()),
            schema: T::schema(),
            thinking_budget,
        };
        debug!(agent = %self.label, model = %request.model, parts = request.parts.len(), "Generating");

        // Shape mismatches are rejected inside the generator so they get retried
        let label = self.label.as_str();
        let check = |v: &serde_json::Value| parse::<T>(label, v.clone()).map(|_| ());
        let value = self.generator.generate_validated(&request, &check)?;
        parse(label, value)
    }
}

fn parse<T: Structured>(label: &str, value: serde_json::Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| {
        TradegraphError::LlmParse(format!("{} response did not match schema: {}", label, e))
    })
}
