//! Risk-checked trading over the recommended tickers.
//!
//! The risk checker and trader degrade to HOLD when the model cannot be
//! reached; a missing investment plan is fatal. Order failures are recorded
//! and the loop moves on.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use tradegraph_core::error::{Result, TradegraphError};
use tradegraph_core::traits::Broker;
use tradegraph_core::types::{Depth, Order};

use super::schema::{OrderRecord, RiskAssessment, TraderDecision};
use super::{current_period, current_ticker, Collaborators, INVESTMENT_PLAN};
use crate::agent::Agent;
use crate::context::keys::{cache, config};
use crate::context::{period, Context};
use crate::graph::{Graph, Node, NodeStatus};
use crate::patterns::{connect_selection, SelectionNode};

const RISK_SYSTEM: &str = "You are a risk manager. Review the investment plan for the \
stock and rate its risk. State which action the risk profile allows and how confident \
you are, from 0 to 1.";

const TRADER_SYSTEM: &str = "You are a trader. Turn the investment plan and risk \
assessment into a concrete decision. End your recommendation with \
'FINAL TRANSACTION PROPOSAL: **BUY/HOLD/SELL**'.";

fn investment_plan(ctx: &Context, ticker: &str, period: &str) -> Result<String> {
    let plan = ctx.get_report(ticker, period, INVESTMENT_PLAN);
    if plan.trim().is_empty() {
        return Err(TradegraphError::MissingReport {
            entity: ticker.to_string(),
            period: period::normalize(period),
            task: INVESTMENT_PLAN.to_string(),
        });
    }
    Ok(plan)
}

pub struct RiskCheckerNode {
    name: String,
    agent: Agent,
}

impl RiskCheckerNode {
    pub fn new(name: impl Into<String>, agent: Agent) -> Self {
        Self {
            name: name.into(),
            agent,
        }
    }
}

impl Node for RiskCheckerNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self, ctx: &mut Context) -> Result<NodeStatus> {
        let ticker = current_ticker(ctx, &self.name)?;
        let period = current_period(ctx);
        let plan = investment_plan(ctx, &ticker, &period)?;

        let parts = vec![format!("Ticker: {ticker}"), plan];
        let assessment = match self.agent.ask::<RiskAssessment>(Depth::Quick, RISK_SYSTEM, parts) {
            Ok(a) => a,
            Err(e) => {
                warn!(node = %self.name, ticker = %ticker, error = %e, "Risk check failed, assuming HOLD");
                RiskAssessment::conservative(format!("risk check unavailable: {e}"))
            }
        };

        ctx.add_log(
            format!("Risk check: {ticker}"),
            format!(
                "{} risk, {} allowed (confidence {:.2})",
                assessment.risk_level, assessment.decision, assessment.confidence
            ),
        );
        ctx.set_cache(cache::RISK_ASSESSMENT, assessment);
        Ok(NodeStatus::Passed)
    }
}

pub struct TraderNode {
    name: String,
    agent: Agent,
}

impl TraderNode {
    pub fn new(name: impl Into<String>, agent: Agent) -> Self {
        Self {
            name: name.into(),
            agent,
        }
    }
}

impl Node for TraderNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self, ctx: &mut Context) -> Result<NodeStatus> {
        let ticker = current_ticker(ctx, &self.name)?;
        let period = current_period(ctx);
        let plan = investment_plan(ctx, &ticker, &period)?;
        let risk = ctx
            .get_cache(cache::RISK_ASSESSMENT)
            .unwrap_or_else(|| RiskAssessment::conservative("no risk assessment"));

        let parts = vec![
            format!("Ticker: {ticker}"),
            plan,
            format!(
                "Risk assessment: {} risk, {} allowed, confidence {:.2}\n{}",
                risk.risk_level, risk.decision, risk.confidence, risk.rationale
            ),
        ];
        let decision = match self.agent.ask::<TraderDecision>(Depth::Deep, TRADER_SYSTEM, parts) {
            Ok(d) => d,
            Err(e) => {
                warn!(node = %self.name, ticker = %ticker, error = %e, "Trader failed, holding");
                TraderDecision::hold(format!("trader unavailable: {e}"))
            }
        };

        ctx.add_log(
            format!("Trade decision: {ticker}"),
            format!("{} (confidence {:.2})", decision.resolve(), decision.confidence),
        );
        ctx.set_cache(cache::TRADER_DECISION, decision);
        Ok(NodeStatus::Passed)
    }
}

/// Submits BUY and SELL decisions to the broker. HOLD submits nothing.
pub struct ExecutionNode {
    name: String,
    broker: Arc<dyn Broker>,
}

impl ExecutionNode {
    pub fn new(name: impl Into<String>, broker: Arc<dyn Broker>) -> Self {
        Self {
            name: name.into(),
            broker,
        }
    }
}

impl Node for ExecutionNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self, ctx: &mut Context) -> Result<NodeStatus> {
        let ticker = current_ticker(ctx, &self.name)?;
        let decision = ctx
            .get_cache(cache::TRADER_DECISION)
            .map(|d| d.resolve())
            .unwrap_or_default();

        if !decision.is_actionable() {
            ctx.add_log(format!("No order: {ticker}"), "HOLD, nothing submitted");
            return Ok(NodeStatus::Passed);
        }

        let order = Order {
            ticker: ticker.clone(),
            decision,
            quantity: ctx.get_config(config::ORDER_QUANTITY).unwrap_or(1),
            price: ctx.get_config(config::ORDER_PRICE).unwrap_or(0.0),
        };

        let record = match self.broker.place_order(&order) {
            Ok(receipt) => {
                info!(
                    node = %self.name,
                    broker = %self.broker.name(),
                    ticker = %ticker,
                    order_id = %receipt.order_id,
                    "Order filled"
                );
                OrderRecord {
                    ticker: ticker.clone(),
                    decision,
                    quantity: order.quantity,
                    price: order.price,
                    order_id: Some(receipt.order_id),
                    filled_price: Some(receipt.filled_price),
                    error: None,
                    timestamp: receipt.timestamp,
                }
            }
            Err(e) => {
                warn!(node = %self.name, ticker = %ticker, error = %e, "Order failed");
                OrderRecord {
                    ticker: ticker.clone(),
                    decision,
                    quantity: order.quantity,
                    price: order.price,
                    order_id: None,
                    filled_price: None,
                    error: Some(e.to_string()),
                    timestamp: Utc::now(),
                }
            }
        };

        let summary = match (&record.order_id, &record.error) {
            (Some(id), _) => format!("{decision} {} x{} ({id})", ticker, order.quantity),
            (None, Some(err)) => format!("{decision} {} x{} failed: {err}", ticker, order.quantity),
            (None, None) => format!("{decision} {}", ticker),
        };
        ctx.add_log(format!("Order: {ticker}"), summary);

        let mut orders = ctx.get_cache(cache::ORDERS).unwrap_or_default();
        orders.push(record);
        ctx.set_cache(cache::ORDERS, orders);
        Ok(NodeStatus::Passed)
    }
}

/// selector -> risk checker -> trader -> execution -> selector, over
/// `trade_queue` seeded from the recommendation.
pub fn trader_graph(deps: &Collaborators) -> Result<Graph> {
    let selector = SelectionNode::new(
        "trader_selector",
        cache::TRADE_QUEUE,
        cache::RECOMMENDATION,
        cache::TICKER,
    );
    let mut graph = Graph::new("trader_graph", selector);
    let risk = graph.add_node(RiskCheckerNode::new("risk_checker_node", deps.agent("risk")))?;
    let trader = graph.add_node(TraderNode::new("trader_node", deps.agent("trader")))?;
    let execution = graph.add_node(ExecutionNode::new("execution_node", deps.broker.clone()))?;

    connect_selection(&mut graph, "trader_selector", &risk, &execution, cache::TICKER)?;
    graph.add_edge(&risk, &trader)?;
    graph.add_edge(&trader, &execution)?;
    Ok(graph)
}
