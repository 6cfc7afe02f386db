//! Scripted collaborators for tests.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;

use tradegraph_core::error::{Result, TradegraphError};
use tradegraph_core::traits::{Broker, Generator};
use tradegraph_core::types::{GenerateRequest, Order, OrderReceipt};

type Responder = Box<dyn Fn(&GenerateRequest) -> Result<serde_json::Value> + Send + Sync>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A generator that answers from a queue of canned responses, then from an
/// optional responder closure. Every request is recorded.
pub struct ScriptedGenerator {
    queue: Mutex<VecDeque<Result<serde_json::Value>>>,
    responder: Option<Responder>,
    requests: Mutex<Vec<GenerateRequest>>,
}

impl Default for ScriptedGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            responder: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_responder(
        responder: impl Fn(&GenerateRequest) -> Result<serde_json::Value> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Some(Box::new(responder)),
            ..Self::new()
        }
    }

    /// Answers every request with a value built from its schema.
    pub fn schema_filler() -> Self {
        Self::with_responder(|req| Ok(fill_schema(&req.schema, &req.agent)))
    }

    pub fn push(&self, value: serde_json::Value) {
        lock(&self.queue).push_back(Ok(value));
    }

    pub fn push_error(&self, error: TradegraphError) {
        lock(&self.queue).push_back(Err(error));
    }

    pub fn requests(&self) -> Vec<GenerateRequest> {
        lock(&self.requests).clone()
    }

    pub fn calls_for(&self, agent: &str) -> usize {
        lock(&self.requests).iter().filter(|r| r.agent == agent).count()
    }
}

impl Generator for ScriptedGenerator {
    fn generate(&self, request: &GenerateRequest) -> Result<serde_json::Value> {
        lock(&self.requests).push(request.clone());
        if let Some(next) = lock(&self.queue).pop_front() {
            return next;
        }
        match &self.responder {
            Some(responder) => responder(request),
            None => Err(TradegraphError::Llm(format!(
                "no scripted response left for '{}'",
                request.agent
            ))),
        }
    }
}

/// A value satisfying `schema`: the first enum option, 0.5 for numbers and
/// `"{agent} {field}"` for free strings.
pub fn fill_schema(schema: &serde_json::Value, agent: &str) -> serde_json::Value {
    fill(schema, agent, "value")
}

fn fill(schema: &serde_json::Value, agent: &str, field: &str) -> serde_json::Value {
    if let Some(first) = schema
        .get("enum")
        .and_then(|e| e.as_array())
        .and_then(|e| e.first())
    {
        return first.clone();
    }
    let kind = schema
        .get("type")
        .and_then(|t| t.as_str())
        .unwrap_or("STRING")
        .to_ascii_uppercase();
    match kind.as_str() {
        "OBJECT" => {
            let mut out = serde_json::Map::new();
            if let Some(props) = schema.get("properties").and_then(|p| p.as_object()) {
                for (name, prop) in props {
                    out.insert(name.clone(), fill(prop, agent, name));
                }
            }
            serde_json::Value::Object(out)
        }
        "ARRAY" => match schema.get("items") {
            Some(items) => serde_json::Value::Array(vec![fill(items, agent, field)]),
            None => serde_json::Value::Array(vec![]),
        },
        "NUMBER" => serde_json::json!(0.5),
        "INTEGER" => serde_json::json!(1),
        "BOOLEAN" => serde_json::json!(true),
        _ => serde_json::Value::String(format!("{agent} {field}")),
    }
}

/// A broker that records orders and either fills them or fails them all.
pub struct RecordingBroker {
    orders: Mutex<Vec<Order>>,
    failure: Option<String>,
}

impl Default for RecordingBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingBroker {
    pub fn new() -> Self {
        Self {
            orders: Mutex::new(Vec::new()),
            failure: None,
        }
    }

    /// Rejects every order with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            orders: Mutex::new(Vec::new()),
            failure: Some(message.into()),
        }
    }

    /// Orders submitted so far, including rejected ones.
    pub fn orders(&self) -> Vec<Order> {
        lock(&self.orders).clone()
    }
}

impl Broker for RecordingBroker {
    fn name(&self) -> &str {
        "recording"
    }

    fn place_order(&self, order: &Order) -> Result<OrderReceipt> {
        let mut orders = lock(&self.orders);
        orders.push(order.clone());
        if let Some(message) = &self.failure {
            return Err(TradegraphError::Broker(message.clone()));
        }
        Ok(OrderReceipt {
            order_id: format!("rec-{}", orders.len()),
            order: order.clone(),
            filled_price: order.price,
            timestamp: Utc::now(),
        })
    }
}
