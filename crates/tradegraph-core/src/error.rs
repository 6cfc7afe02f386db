use thiserror::Error;

#[derive(Debug, Error)]
pub enum TradegraphError {
    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // Graph errors
    #[error("Graph error: {0}")]
    Graph(String),

    #[error("Empty worklist at selection node {node}: '{worklist}' and fallback '{fallback}' are empty")]
    EmptyWorklist {
        node: String,
        worklist: String,
        fallback: String,
    },

    #[error("Missing report: {entity}/{period}/{task}")]
    MissingReport {
        entity: String,
        period: String,
        task: String,
    },

    #[error("Node {node} gave up after {attempts} attempts")]
    AttemptsExhausted { node: String, attempts: usize },

    // LLM errors
    #[error("LLM request failed: {0}")]
    Llm(String),

    #[error("LLM response parse error: {0}")]
    LlmParse(String),

    // Broker errors
    #[error("Broker error: {0}")]
    Broker(String),

    // Persistence errors
    #[error("Snapshot error: {0}")]
    Snapshot(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TradegraphError>;
