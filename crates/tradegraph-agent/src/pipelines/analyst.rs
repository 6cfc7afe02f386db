//! Per-ticker analysis: a selection loop feeding a chain of analyst nodes,
//! one per configured task.

use tracing::{debug, warn};

use tradegraph_core::config::PipelineConfig;
use tradegraph_core::error::{Result, TradegraphError};
use tradegraph_core::types::Depth;

use super::schema::AnalysisReport;
use super::{current_period, current_ticker, report_sections, Collaborators, INVESTMENT_PLAN};
use crate::agent::Agent;
use crate::context::keys::cache;
use crate::context::{Context, Key};
use crate::graph::{Graph, Node, NodeStatus};
use crate::patterns::{connect_selection, SelectionNode};

const SYSTEM: &str = "You are an equity analyst. Write a focused report on the requested \
aspect of the stock. Support every claim with the indicators you cite and finish with a \
clear recommendation.";

/// Writes the `task` report for the current ticker.
///
/// An empty answer leaves the node pending so the executor asks again; after
/// `max_attempts` empty answers the node fails. An existing report for the
/// same ticker, period and task is reused.
pub struct AnalystNode {
    name: String,
    task: String,
    agent: Agent,
    max_attempts: usize,
    attempts: usize,
}

impl AnalystNode {
    pub fn new(task: &str, agent: Agent, max_attempts: usize) -> Self {
        Self {
            name: format!("analyst_{task}"),
            task: task.to_string(),
            agent,
            max_attempts: max_attempts.max(1),
            attempts: 0,
        }
    }

    fn prompt(&self, ctx: &Context, ticker: &str, period: &str) -> Vec<String> {
        let mut parts = vec![format!(
            "Ticker: {ticker}\nPeriod: {period}\nTask: {} analysis",
            self.task
        )];
        let earlier = report_sections(ctx, ticker, period, &[self.task.as_str(), INVESTMENT_PLAN]);
        if !earlier.is_empty() {
            parts.push(format!("Reports already written for this ticker:\n\n{earlier}"));
        }
        parts
    }
}

impl Node for AnalystNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self, ctx: &mut Context) -> Result<NodeStatus> {
        let ticker = current_ticker(ctx, &self.name)?;
        let period = current_period(ctx);

        if ctx
            .report(&ticker, &period, &self.task)
            .is_some_and(|r| !r.trim().is_empty())
        {
            debug!(node = %self.name, ticker = %ticker, "Report exists, skipping");
            return Ok(NodeStatus::Passed);
        }

        self.attempts += 1;
        let parts = self.prompt(ctx, &ticker, &period);
        let report: AnalysisReport = self.agent.ask(Depth::Deep, SYSTEM, parts)?;

        if report.is_empty() {
            if self.attempts >= self.max_attempts {
                let attempts = self.attempts;
                self.attempts = 0;
                return Err(TradegraphError::AttemptsExhausted {
                    node: self.name.clone(),
                    attempts,
                });
            }
            warn!(
                node = %self.name,
                ticker = %ticker,
                attempt = self.attempts,
                max_attempts = self.max_attempts,
                "Empty report, retrying"
            );
            return Ok(NodeStatus::Pending);
        }

        self.attempts = 0;
        ctx.set_report(&ticker, &period, &self.task, report.render());
        ctx.add_log(
            format!("{} analysis: {}", self.task, ticker),
            format!("{} ({})", report.title.trim(), report.recommendation.as_str()),
        );
        Ok(NodeStatus::Passed)
    }

    fn reset(&mut self) {
        self.attempts = 0;
    }
}

/// Selection over `analysis_queue` (seeded from `fallback`) into one analyst
/// node per task, chained in configured order.
pub fn analyst_graph(
    deps: &Collaborators,
    pipeline: &PipelineConfig,
    fallback: Key<Vec<String>>,
) -> Result<Graph> {
    let selector = SelectionNode::new(
        "analyst_selector",
        cache::ANALYSIS_QUEUE,
        fallback,
        cache::TICKER,
    );
    let mut graph = Graph::new("analyst_graph", selector);

    let mut chain = Vec::with_capacity(pipeline.analysis_tasks.len());
    for task in &pipeline.analysis_tasks {
        let agent = deps.agent(&format!("analyst:{task}"));
        chain.push(graph.add_node(AnalystNode::new(task, agent, pipeline.max_attempts))?);
    }
    let (Some(first), Some(last)) = (chain.first(), chain.last()) else {
        return Err(TradegraphError::Config("no analysis tasks configured".into()));
    };

    connect_selection(&mut graph, "analyst_selector", first, last, cache::TICKER)?;
    for pair in chain.windows(2) {
        graph.add_edge(&pair[0], &pair[1])?;
    }
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tradegraph_core::config::ModelConfig;
    use tradegraph_test_utils::{RecordingBroker, ScriptedGenerator};

    fn report(body: &str) -> serde_json::Value {
        serde_json::json!({
            "plan": "p",
            "title": "Quarterly review",
            "key_considerations": "k",
            "indicators_table": "| a | b |",
            "detailed_analysis": body,
            "conclusion": body,
            "recommendation": "Buy"
        })
    }

    fn deps(gen: Arc<ScriptedGenerator>) -> Collaborators {
        Collaborators::new(gen, ModelConfig::default(), Arc::new(RecordingBroker::new()))
    }

    fn ctx_for(ticker: &str) -> Context {
        let mut ctx = Context::new();
        ctx.set_cache(cache::DATE, "20251101T09".to_string());
        ctx.set_cache(cache::TICKER, ticker.to_string());
        ctx
    }

    #[test]
    fn test_writes_rendered_report() {
        let gen = Arc::new(ScriptedGenerator::new());
        gen.push(report("margins expanding"));
        let mut node = AnalystNode::new("financial", deps(gen.clone()).agent("analyst:financial"), 3);
        let mut ctx = ctx_for("AAPL");

        assert_eq!(node.run(&mut ctx).unwrap(), NodeStatus::Passed);
        let stored = ctx.get_report("AAPL", "20251101T09", "financial");
        assert!(stored.contains("margins expanding"));
        assert!(stored.starts_with("# Quarterly review"));
        assert_eq!(ctx.logs().len(), 1);
        assert!(gen.requests()[0].parts[0].contains("Ticker: AAPL"));
    }

    #[test]
    fn test_empty_report_stays_pending_then_fails() {
        let gen = Arc::new(ScriptedGenerator::new());
        for _ in 0..3 {
            gen.push(report(""));
        }
        let mut node = AnalystNode::new("financial", deps(gen).agent("a"), 3);
        let mut ctx = ctx_for("AAPL");

        assert_eq!(node.run(&mut ctx).unwrap(), NodeStatus::Pending);
        assert_eq!(node.run(&mut ctx).unwrap(), NodeStatus::Pending);
        let err = node.run(&mut ctx).unwrap_err();
        assert!(matches!(
            err,
            TradegraphError::AttemptsExhausted { attempts: 3, .. }
        ));
    }

    #[test]
    fn test_executor_reruns_pending_analyst() {
        let gen = Arc::new(ScriptedGenerator::new());
        gen.push(report(""));
        gen.push(report("second try"));
        let pipeline = PipelineConfig::default();
        let mut graph = analyst_graph(&deps(gen.clone()), &pipeline, cache::RECOMMENDATION).unwrap();

        let mut ctx = Context::new();
        ctx.set_cache(cache::DATE, "20251101T09".to_string());
        ctx.set_cache(cache::RECOMMENDATION, vec!["AAPL".to_string()]);
        graph.execute(&mut ctx).unwrap();

        assert_eq!(graph.visits("analyst_financial"), 2);
        assert!(ctx.get_report("AAPL", "20251101T09", "financial").contains("second try"));
        assert_eq!(gen.requests().len(), 2);
    }

    #[test]
    fn test_failed_run_does_not_carry_attempts() {
        let gen = Arc::new(ScriptedGenerator::new());
        gen.push(report(""));
        gen.push_error(TradegraphError::Llm("model unavailable".into()));
        gen.push(report(""));
        gen.push(report("recovered"));
        let pipeline = PipelineConfig {
            max_attempts: 2,
            ..Default::default()
        };
        let mut graph = analyst_graph(&deps(gen.clone()), &pipeline, cache::RECOMMENDATION).unwrap();

        let mut ctx = Context::new();
        ctx.set_cache(cache::DATE, "20251101T09".to_string());
        ctx.set_cache(cache::RECOMMENDATION, vec!["AAPL".to_string()]);
        let err = graph.execute(&mut ctx).unwrap_err();
        assert!(matches!(err, TradegraphError::Llm(_)));

        // A fresh run gets the full attempt budget again
        let mut ctx = Context::new();
        ctx.set_cache(cache::DATE, "20251101T09".to_string());
        ctx.set_cache(cache::RECOMMENDATION, vec!["AAPL".to_string()]);
        graph.execute(&mut ctx).unwrap();

        assert!(ctx.get_report("AAPL", "20251101T09", "financial").contains("recovered"));
        assert_eq!(gen.requests().len(), 4);
    }

    #[test]
    fn test_existing_report_is_reused() {
        let gen = Arc::new(ScriptedGenerator::new());
        let mut node = AnalystNode::new("financial", deps(gen.clone()).agent("a"), 3);
        let mut ctx = ctx_for("AAPL");
        ctx.set_report("AAPL", "20251101T0930", "financial", "cached");

        assert_eq!(node.run(&mut ctx).unwrap(), NodeStatus::Passed);
        assert!(gen.requests().is_empty());
    }

    #[test]
    fn test_tasks_chain_in_order_per_ticker() {
        let gen = Arc::new(ScriptedGenerator::with_responder(|req| {
            Ok(report(&format!("{} body", req.agent)))
        }));
        let pipeline = PipelineConfig {
            analysis_tasks: vec!["financial".into(), "news".into()],
            ..Default::default()
        };
        let mut graph = analyst_graph(&deps(gen.clone()), &pipeline, cache::RECOMMENDATION).unwrap();

        let mut ctx = Context::new();
        ctx.set_cache(cache::DATE, "20251101T09".to_string());
        ctx.set_cache(cache::RECOMMENDATION, vec!["AAPL".to_string(), "MSFT".to_string()]);
        graph.execute(&mut ctx).unwrap();

        let agents: Vec<String> = gen.requests().into_iter().map(|r| r.agent).collect();
        assert_eq!(
            agents,
            vec!["analyst:financial", "analyst:news", "analyst:financial", "analyst:news"]
        );
        assert_eq!(graph.visits("analyst_selector"), 3);
        assert!(ctx.get_report("MSFT", "20251101T09", "news").contains("analyst:news body"));
        // the second task sees the first task's report
        assert!(gen.requests()[1].parts.iter().any(|p| p.contains("### financial")));
    }

    #[test]
    fn test_no_tasks_is_config_error() {
        let gen = Arc::new(ScriptedGenerator::new());
        let pipeline = PipelineConfig {
            analysis_tasks: vec![],
            ..Default::default()
        };
        assert!(matches!(
            analyst_graph(&deps(gen), &pipeline, cache::RECOMMENDATION),
            Err(TradegraphError::Config(_))
        ));
    }
}
