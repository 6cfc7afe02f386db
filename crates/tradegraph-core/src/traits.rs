use crate::error::Result;
use crate::types::*;

/// Checks a generated value before it is accepted; an `Err` rejects it.
pub type Validator<'a> = &'a (dyn Fn(&serde_json::Value) -> Result<()> + Sync);

/// Structured-output language model call.
///
/// Implementations retry transient and validation failures internally; callers
/// only ever see a final value or a final error.
pub trait Generator: Send + Sync + 'static {
    /// Run one request and return the schema-shaped JSON response.
    fn generate(&self, request: &GenerateRequest) -> Result<serde_json::Value>;

    /// Like [`generate`](Generator::generate), but a response is only accepted
    /// once `validate` passes. Retrying implementations treat a rejection like
    /// any other malformed response.
    fn generate_validated(
        &self,
        request: &GenerateRequest,
        validate: Validator<'_>,
    ) -> Result<serde_json::Value> {
        let value = self.generate(request)?;
        validate(&value)?;
        Ok(value)
    }
}

/// Order execution backend.
pub trait Broker: Send + Sync + 'static {
    /// Broker name (e.g., "paper").
    fn name(&self) -> &str;

    /// Submit an order and return the acknowledgement.
    fn place_order(&self, order: &Order) -> Result<OrderReceipt>;
}
