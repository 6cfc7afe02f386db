//! Candidate ranking: pick tickers to consider, make sure each has a first
//! analysis report, then rank them with a pairwise tournament.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::info;

use tradegraph_core::config::PipelineConfig;
use tradegraph_core::error::{Result, TradegraphError};
use tradegraph_core::types::{Depth, Side};

use super::schema::{held_tickers, Comparison};
use super::{analyst_graph, current_period, report_sections, Collaborators, INVESTMENT_PLAN};
use crate::agent::Agent;
use crate::context::keys::{cache, config};
use crate::context::Context;
use crate::graph::{Graph, Node, NodeStatus};
use crate::patterns::Tournament;

const DEFAULT_MAX_PORTFOLIO_SIZE: usize = 5;

const SYSTEM: &str = "You compare two stocks for a long position. Weigh the analysis \
reports of both and answer which one is the more attractive investment right now.";

fn portfolio_slots(ctx: &Context) -> (Vec<String>, usize) {
    let held = held_tickers(&ctx.get_cache(cache::PORTFOLIO).unwrap_or_default());
    let max = ctx
        .get_config(config::MAX_PORTFOLIO_SIZE)
        .unwrap_or(DEFAULT_MAX_PORTFOLIO_SIZE);
    let slots = max.saturating_sub(held.len());
    (held, slots)
}

/// Chooses which unheld tickers compete for the open portfolio slots.
///
/// When the unheld tickers fit (or there are fewer than two) they are
/// recommended directly together with the holdings. Otherwise a random
/// sample of twice the open slots goes to the tournament.
pub struct CandidateNode {
    name: String,
    rng: StdRng,
}

impl CandidateNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic sampling, for reproducible runs.
    pub fn with_seed(name: impl Into<String>, seed: u64) -> Self {
        Self {
            name: name.into(),
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Node for CandidateNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self, ctx: &mut Context) -> Result<NodeStatus> {
        ctx.set_cache(cache::RECOMMENDATION, Vec::new());
        ctx.set_cache(cache::CANDIDATES, Vec::new());
        ctx.set_cache(cache::NO_REPORT_CANDIDATES, Vec::new());

        let (held, slots) = portfolio_slots(ctx);
        if slots == 0 {
            info!(node = %self.name, held = held.len(), "Portfolio full, no candidates");
            return Ok(NodeStatus::Passed);
        }

        let mut open: Vec<String> = Vec::new();
        for ticker in ctx.get_config(config::TICKERS).unwrap_or_default() {
            if !held.contains(&ticker) && !open.contains(&ticker) {
                open.push(ticker);
            }
        }

        if open.len() < 2 || open.len() <= slots {
            let mut recommendation = open;
            recommendation.extend(held);
            ctx.add_log(
                "Candidates recommended directly",
                recommendation.join(", "),
            );
            ctx.set_cache(cache::RECOMMENDATION, recommendation);
            return Ok(NodeStatus::Passed);
        }

        open.shuffle(&mut self.rng);
        open.truncate(slots * 2);
        ctx.add_log(
            format!("{} candidates for {} slots", open.len(), slots),
            open.join(", "),
        );
        ctx.set_cache(cache::CANDIDATES, open);
        Ok(NodeStatus::Passed)
    }
}

/// Lists candidates lacking a report for the first analysis task.
pub struct CheckNode {
    name: String,
}

impl CheckNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Node for CheckNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self, ctx: &mut Context) -> Result<NodeStatus> {
        let candidates = ctx.get_cache(cache::CANDIDATES).unwrap_or_default();
        if candidates.is_empty() {
            ctx.set_cache(cache::NO_REPORT_CANDIDATES, Vec::new());
            return Ok(NodeStatus::Passed);
        }

        let task = ctx
            .get_config(config::ANALYSIS_TASKS)
            .unwrap_or_default()
            .into_iter()
            .next()
            .ok_or_else(|| TradegraphError::Config("no analysis tasks configured".into()))?;
        let period = current_period(ctx);

        let missing: Vec<String> = candidates
            .into_iter()
            .filter(|t| ctx.get_report(t, &period, &task).is_empty())
            .collect();
        if !missing.is_empty() {
            info!(node = %self.name, task = %task, missing = missing.len(), "Candidates need analysis");
        }
        ctx.set_cache(cache::NO_REPORT_CANDIDATES, missing);
        Ok(NodeStatus::Passed)
    }
}

/// Runs the tournament over the candidates unless a recommendation is
/// already in place. Holdings are always part of the result.
pub struct RankNode {
    name: String,
    agent: Agent,
}

impl RankNode {
    pub fn new(name: impl Into<String>, agent: Agent) -> Self {
        Self {
            name: name.into(),
            agent,
        }
    }
}

fn compare(agent: &Agent, ctx: &Context, period: &str, a: &str, b: &str) -> Result<Option<Side>> {
    let section = |label: &str, ticker: &str| {
        let reports = report_sections(ctx, ticker, period, &[INVESTMENT_PLAN]);
        let reports = if reports.is_empty() {
            "(no reports)".to_string()
        } else {
            reports
        };
        format!("Stock {label}: {ticker}\n\n{reports}")
    };
    let reply: Comparison = agent.ask(Depth::Quick, SYSTEM, vec![section("A", a), section("B", b)])?;
    Ok(reply.winner())
}

impl Node for RankNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self, ctx: &mut Context) -> Result<NodeStatus> {
        if !ctx.get_cache(cache::RECOMMENDATION).unwrap_or_default().is_empty() {
            return Ok(NodeStatus::Passed);
        }

        let candidates = ctx.get_cache(cache::CANDIDATES).unwrap_or_default();
        let (held, slots) = portfolio_slots(ctx);
        let period = current_period(ctx);

        let agent = &self.agent;
        let shared: &Context = ctx;
        let result = Tournament::new(&candidates)
            .run(|a, b| compare(agent, shared, &period, a, b))?;
        let picks = result.select(slots, &held);

        info!(
            node = %self.name,
            comparisons = result.comparisons,
            picks = picks.len(),
            "Ranking complete"
        );
        let standings = result
            .ranked
            .iter()
            .map(|(t, s)| format!("{t}: {s}"))
            .collect::<Vec<_>>()
            .join(", ");
        ctx.add_log(format!("Ranked {} candidates", candidates.len()), standings);
        ctx.set_cache(cache::RECOMMENDATION, picks);
        Ok(NodeStatus::Passed)
    }
}

/// candidate -> check -> [analyst when reports are missing] -> rank.
pub fn rank_graph(deps: &Collaborators, pipeline: &PipelineConfig) -> Result<Graph> {
    let mut graph = Graph::new("rank_graph", CandidateNode::new("candidate_node"));
    let candidate = graph.start().to_string();
    let check = graph.add_node(CheckNode::new("check_node"))?;
    let analyst = graph.add_node(analyst_graph(deps, pipeline, cache::NO_REPORT_CANDIDATES)?)?;
    let rank = graph.add_node(RankNode::new("rank_node", deps.agent("rank")))?;

    graph.add_edge(&candidate, &check)?;
    graph.add_conditional_edge(&check, &analyst, |ctx| {
        !ctx.get_cache(cache::NO_REPORT_CANDIDATES).unwrap_or_default().is_empty()
    })?;
    graph.add_edge(&check, &rank)?;
    graph.add_edge(&analyst, &rank)?;
    Ok(graph)
}
