use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TradegraphError;

/// A trading verdict.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Buy,
    Sell,
    #[default]
    Hold,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Buy => "BUY",
            Decision::Sell => "SELL",
            Decision::Hold => "HOLD",
        }
    }

    /// Whether this decision results in an order.
    pub fn is_actionable(&self) -> bool {
        !matches!(self, Decision::Hold)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Decision {
    type Err = TradegraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_matches('*').to_ascii_uppercase().as_str() {
            "BUY" => Ok(Decision::Buy),
            "SELL" => Ok(Decision::Sell),
            "HOLD" => Ok(Decision::Hold),
            other => Err(TradegraphError::LlmParse(format!(
                "unknown decision '{}'",
                other
            ))),
        }
    }
}

/// Which side of a pairwise comparison won.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    A,
    B,
}

/// How much reasoning effort a generator call should spend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Depth {
    #[default]
    Quick,
    Deep,
}

/// A single structured-output request to a generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// Label of the calling agent (e.g. "rank", "bull"), used for tracing.
    pub agent: String,
    /// Model identifier.
    pub model: String,
    /// Prompt parts, sent in order.
    pub parts: Vec<String>,
    /// Optional system instruction.
    #[serde(default)]
    pub system: Option<String>,
    /// JSON schema the response must follow.
    pub schema: serde_json::Value,
    /// Thinking budget (-1 = provider default, 0 = off).
    #[serde(default)]
    pub thinking_budget: i32,
}

/// An order submitted to a broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub ticker: String,
    pub decision: Decision,
    pub quantity: u32,
    /// Limit price; 0 means market order.
    pub price: f64,
}

/// Broker acknowledgement of an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderReceipt {
    pub order_id: String,
    pub order: Order,
    pub filled_price: f64,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_parse_lenient() {
        assert_eq!("buy".parse::<Decision>().unwrap(), Decision::Buy);
        assert_eq!(" **SELL** ".parse::<Decision>().unwrap(), Decision::Sell);
        assert_eq!("Hold".parse::<Decision>().unwrap(), Decision::Hold);
        assert!("maybe".parse::<Decision>().is_err());
    }

    #[test]
    fn test_decision_serde_uppercase() {
        let json = serde_json::to_string(&Decision::Buy).unwrap();
        assert_eq!(json, "\"BUY\"");
        let parsed: Decision = serde_json::from_str("\"HOLD\"").unwrap();
        assert_eq!(parsed, Decision::Hold);
    }

    #[test]
    fn test_hold_is_not_actionable() {
        assert!(!Decision::Hold.is_actionable());
        assert!(Decision::Buy.is_actionable());
        assert!(Decision::Sell.is_actionable());
    }
}
