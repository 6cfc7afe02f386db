//! Structured responses the pipelines ask for, and the records they keep.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use tradegraph_core::types::{Decision, Side};

use crate::agent::Structured;

fn string_field(description: &str) -> serde_json::Value {
    json!({"type": "STRING", "description": description})
}

fn enum_field(description: &str, values: &[&str]) -> serde_json::Value {
    json!({"type": "STRING", "description": description, "enum": values})
}

fn object(properties: serde_json::Value, required: &[&str]) -> serde_json::Value {
    json!({"type": "OBJECT", "properties": properties, "required": required})
}

// -- analyst --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalystRecommendation {
    Buy,
    #[serde(rename = "No Action")]
    NoAction,
    Sell,
}

impl AnalystRecommendation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "Buy",
            Self::NoAction => "No Action",
            Self::Sell => "Sell",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    #[serde(default)]
    pub plan: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub key_considerations: String,
    #[serde(default)]
    pub indicators_table: String,
    #[serde(default)]
    pub detailed_analysis: String,
    #[serde(default)]
    pub conclusion: String,
    pub recommendation: AnalystRecommendation,
}

impl AnalysisReport {
    /// A report with neither analysis nor conclusion carries nothing usable.
    pub fn is_empty(&self) -> bool {
        self.detailed_analysis.trim().is_empty() && self.conclusion.trim().is_empty()
    }

    /// Markdown rendering stored in the report store. The planning scratchpad
    /// is left out.
    pub fn render(&self) -> String {
        format!(
            "# {}\n\n## Key Considerations\n{}\n\n## Indicators\n{}\n\n## Detailed Analysis\n{}\n\n## Conclusion\n{}\n\n**Recommendation:** {}",
            self.title.trim(),
            self.key_considerations.trim(),
            self.indicators_table.trim(),
            self.detailed_analysis.trim(),
            self.conclusion.trim(),
            self.recommendation.as_str(),
        )
    }
}

impl Structured for AnalysisReport {
    fn schema() -> serde_json::Value {
        object(
            json!({
                "plan": string_field("Outline of how the report will be structured"),
                "title": string_field("Title of the report"),
                "key_considerations": string_field("Key considerations for this analysis"),
                "indicators_table": string_field("Markdown table of the relevant indicators"),
                "detailed_analysis": string_field("In-depth analysis"),
                "conclusion": string_field("Final conclusion"),
                "recommendation": enum_field("Recommendation", &["Buy", "No Action", "Sell"]),
            }),
            &[
                "plan",
                "title",
                "key_considerations",
                "indicators_table",
                "detailed_analysis",
                "conclusion",
                "recommendation",
            ],
        )
    }
}

// -- ranking --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comparison {
    #[serde(default)]
    pub reasoning: String,
    /// "A" or "B"; anything else is treated as no decision.
    #[serde(default)]
    pub better_stock: String,
}

impl Comparison {
    pub fn winner(&self) -> Option<Side> {
        match self.better_stock.trim().to_ascii_uppercase().as_str() {
            "A" => Some(Side::A),
            "B" => Some(Side::B),
            _ => None,
        }
    }
}

impl Structured for Comparison {
    fn schema() -> serde_json::Value {
        object(
            json!({
                "reasoning": string_field("Reasoning behind the comparison"),
                "better_stock": enum_field("The more attractive stock", &["A", "B"]),
            }),
            &["reasoning", "better_stock"],
        )
    }
}

// -- debate --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateReply {
    pub chat: String,
}

impl Structured for DebateReply {
    fn schema() -> serde_json::Value {
        object(
            json!({"chat": string_field("Your argument for this turn")}),
            &["chat"],
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerDecision {
    pub decision: Decision,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub plan: String,
}

impl ManagerDecision {
    pub fn render(&self, ticker: &str, period: &str) -> String {
        format!(
            "# Investment Plan ({ticker} / {period})\n\n**Decision:** {}\n\n## Rationale\n{}\n\n## Plan\n{}",
            self.decision,
            self.rationale.trim(),
            self.plan.trim(),
        )
    }
}

impl Structured for ManagerDecision {
    fn schema() -> serde_json::Value {
        object(
            json!({
                "decision": enum_field("Final call", &["BUY", "SELL", "HOLD"]),
                "rationale": string_field("Why the stronger side won the debate"),
                "plan": string_field("Concrete investment plan for the trader"),
            }),
            &["decision", "rationale", "plan"],
        )
    }
}

// -- trading --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Most aggressive decision the risk check would allow. Advisory input to the trader.
    pub decision: Decision,
    /// Free-form level reported by the model (LOW, MEDIUM, HIGH).
    pub risk_level: String,
    /// Model confidence in `[0, 1]`.
    pub confidence: f64,
    #[serde(default)]
    pub rationale: String,
}

impl RiskAssessment {
    /// Stand-in used when no assessment could be obtained.
    pub fn conservative(reason: impl Into<String>) -> Self {
        Self {
            decision: Decision::Hold,
            risk_level: "UNKNOWN".into(),
            confidence: 0.0,
            rationale: reason.into(),
        }
    }
}

impl Structured for RiskAssessment {
    fn schema() -> serde_json::Value {
        object(
            json!({
                "decision": enum_field("Action the risk profile allows", &["BUY", "SELL", "HOLD"]),
                "risk_level": enum_field("Overall risk", &["LOW", "MEDIUM", "HIGH"]),
                "confidence": {"type": "NUMBER", "description": "Confidence between 0 and 1"},
                "rationale": string_field("Main risk factors"),
            }),
            &["decision", "risk_level", "confidence", "rationale"],
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraderDecision {
    /// Free-text recommendation, ideally ending in a
    /// `FINAL TRANSACTION PROPOSAL: **BUY|SELL|HOLD**` marker.
    #[serde(default)]
    pub recommendation: String,
    /// The decision; may be free text rather than a bare keyword.
    #[serde(default)]
    pub decision: String,
    #[serde(default)]
    pub confidence: f64,
}

impl TraderDecision {
    pub fn hold(reason: impl Into<String>) -> Self {
        Self {
            recommendation: reason.into(),
            decision: Decision::Hold.to_string(),
            confidence: 0.0,
        }
    }

    /// The actionable decision: the `decision` field if it is a bare keyword,
    /// else a proposal marker in either field, else HOLD.
    pub fn resolve(&self) -> Decision {
        if let Ok(d) = self.decision.parse::<Decision>() {
            return d;
        }
        proposal_marker(&self.decision)
            .or_else(|| proposal_marker(&self.recommendation))
            .unwrap_or_default()
    }
}

fn proposal_marker(text: &str) -> Option<Decision> {
    static MARKER: OnceLock<regex::Regex> = OnceLock::new();
    let re = MARKER.get_or_init(|| {
        regex::Regex::new(r"(?i)FINAL\s+TRANSACTION\s+PROPOSAL:\s*\**\s*(BUY|SELL|HOLD)")
            .expect("valid proposal pattern")
    });
    re.captures_iter(text)
        .last()
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

impl Structured for TraderDecision {
    fn schema() -> serde_json::Value {
        object(
            json!({
                "recommendation": string_field(
                    "Reasoning, ending with FINAL TRANSACTION PROPOSAL: **BUY/SELL/HOLD**"
                ),
                "decision": enum_field("Final decision", &["BUY", "SELL", "HOLD"]),
                "confidence": {"type": "NUMBER", "description": "Confidence between 0 and 1"},
            }),
            &["recommendation", "decision", "confidence"],
        )
    }
}

// -- records --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioEntry {
    pub added_at: String,
    pub decision: Decision,
}

/// Ticker -> decision history, oldest first.
pub type Portfolio = BTreeMap<String, Vec<PortfolioEntry>>;

/// Tickers currently held: a BUY not followed by a later SELL.
pub fn held_tickers(portfolio: &Portfolio) -> Vec<String> {
    portfolio
        .iter()
        .filter(|(_, entries)| {
            entries.iter().fold(false, |held, e| match e.decision {
                Decision::Buy => true,
                Decision::Sell => false,
                Decision::Hold => held,
            })
        })
        .map(|(ticker, _)| ticker.clone())
        .collect()
}

/// One order attempt, successful or not, as kept in the `orders` cache key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub ticker: String,
    pub decision: Decision,
    pub quantity: u32,
    /// Requested limit price; `0.0` means market.
    pub price: f64,
    /// Broker acknowledgement id, set only when the order was accepted.
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub filled_price: Option<f64>,
    /// Broker rejection message. `None` means the order went through.
    #[serde(default)]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl OrderRecord {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}
