//! Typed keys for the context cache and config.
//!
//! Every well-known key is a constant here, so a misspelled key is a
//! compile error rather than a silent miss.

use std::fmt;
use std::marker::PhantomData;

/// A named slot in the cache or config whose value deserializes to `T`.
pub struct Key<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Key<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for Key<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Key<T> {}

impl<T> fmt::Debug for Key<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", self.name)
    }
}

impl<T> fmt::Display for Key<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Run-scoped values. Never persisted.
pub mod cache {
    use super::Key;
    use crate::pipelines::schema::{
        ManagerDecision, OrderRecord, Portfolio, RiskAssessment, TraderDecision,
    };

    /// Normalized period every report of this run is filed under.
    pub const DATE: Key<String> = Key::new("date");
    /// Ticker currently being processed by a selection loop.
    pub const TICKER: Key<String> = Key::new("ticker");

    // Ranking
    pub const CANDIDATES: Key<Vec<String>> = Key::new("candidates");
    pub const NO_REPORT_CANDIDATES: Key<Vec<String>> = Key::new("no_report_candidates");
    pub const RECOMMENDATION: Key<Vec<String>> = Key::new("recommendation");
    pub const PORTFOLIO: Key<Portfolio> = Key::new("portfolio");

    // Worklists
    pub const ANALYSIS_QUEUE: Key<Vec<String>> = Key::new("analysis_queue");
    pub const DEBATE_QUEUE: Key<Vec<String>> = Key::new("debate_queue");
    pub const TRADE_QUEUE: Key<Vec<String>> = Key::new("trade_queue");

    // Debate
    pub const HISTORY: Key<String> = Key::new("history");
    pub const BULL_HISTORY: Key<String> = Key::new("bull_history");
    pub const BEAR_HISTORY: Key<String> = Key::new("bear_history");
    pub const CURRENT_RESPONSE: Key<String> = Key::new("current_response");
    pub const COUNT: Key<u32> = Key::new("count");
    pub const MANAGER_DECISION: Key<ManagerDecision> = Key::new("manager_decision");

    // Trading
    pub const RISK_ASSESSMENT: Key<RiskAssessment> = Key::new("risk_assessment");
    pub const TRADER_DECISION: Key<TraderDecision> = Key::new("trader_decision");
    pub const ORDERS: Key<Vec<OrderRecord>> = Key::new("orders");
}

/// Pipeline parameters, seeded once at start.
pub mod config {
    use super::Key;

    pub const TICKERS: Key<Vec<String>> = Key::new("tickers");
    pub const ANALYSIS_TASKS: Key<Vec<String>> = Key::new("analysis_tasks");
    pub const MAX_PORTFOLIO_SIZE: Key<usize> = Key::new("max_portfolio_size");
    pub const ROUNDS: Key<u32> = Key::new("rounds");
    pub const ORDER_QUANTITY: Key<u32> = Key::new("order_quantity");
    pub const ORDER_PRICE: Key<f64> = Key::new("order_price");
    pub const TRADE_DATE: Key<String> = Key::new("trade_date");
    pub const MAX_ATTEMPTS: Key<usize> = Key::new("max_attempts");
}
