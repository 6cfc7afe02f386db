//! Bull/bear debate per recommended ticker, settled by a research manager.

use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::{debug, warn};

use tradegraph_core::error::Result;
use tradegraph_core::types::Depth;

use super::schema::{DebateReply, ManagerDecision, PortfolioEntry};
use super::{current_period, current_ticker, report_sections, Collaborators, INVESTMENT_PLAN};
use crate::agent::Agent;
use crate::context::keys::{cache, config};
use crate::context::Context;
use crate::graph::{Graph, Node, NodeStatus};
use crate::patterns::{connect_debate, connect_selection, SelectionNode, Speaker, TurnNode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stance {
    Bull,
    Bear,
}

impl Stance {
    fn label(&self) -> &'static str {
        match self {
            Stance::Bull => "Bull Analyst",
            Stance::Bear => "Bear Analyst",
        }
    }

    fn file_prefix(&self) -> &'static str {
        match self {
            Stance::Bull => "bull",
            Stance::Bear => "bear",
        }
    }

    fn system(&self) -> &'static str {
        match self {
            Stance::Bull => {
                "You argue for investing in the stock. Build on growth, competitive \
                 advantages and positive indicators from the reports, and answer the \
                 bear's latest points directly."
            }
            Stance::Bear => {
                "You argue against investing in the stock. Stress risks, weaknesses and \
                 negative indicators from the reports, and answer the bull's latest \
                 points directly."
            }
        }
    }

    fn own_history(&self) -> crate::context::Key<String> {
        match self {
            Stance::Bull => cache::BULL_HISTORY,
            Stance::Bear => cache::BEAR_HISTORY,
        }
    }
}

/// One side of the debate. Reads every analysis report for the ticker.
pub struct Researcher {
    stance: Stance,
    agent: Agent,
    transcript_dir: Option<PathBuf>,
}

impl Researcher {
    pub fn new(stance: Stance, agent: Agent, transcript_dir: Option<PathBuf>) -> Self {
        Self {
            stance,
            agent,
            transcript_dir,
        }
    }
}

impl Speaker for Researcher {
    fn label(&self) -> &str {
        self.stance.label()
    }

    fn speak(&mut self, ctx: &mut Context) -> Result<String> {
        let ticker = current_ticker(ctx, self.stance.file_prefix())?;
        let period = current_period(ctx);
        let history = ctx.get_cache(cache::HISTORY).unwrap_or_default();
        let last = ctx.get_cache(cache::CURRENT_RESPONSE).unwrap_or_default();

        let mut parts = vec![
            format!("Ticker: {ticker}\nPeriod: {period}"),
            format!(
                "Analysis reports:\n\n{}",
                report_sections(ctx, &ticker, &period, &[INVESTMENT_PLAN])
            ),
        ];
        if !history.is_empty() {
            parts.push(format!("Debate so far:\n{history}"));
        }
        if !last.is_empty() {
            parts.push(format!("Your opponent just said:\n{last}"));
        }

        let reply: DebateReply = self.agent.ask(Depth::Quick, self.stance.system(), parts)?;

        let key = self.stance.own_history();
        let mut own = ctx.get_cache(key).unwrap_or_default();
        if !own.is_empty() {
            own.push('\n');
        }
        own.push_str(&reply.chat);
        ctx.set_cache(key, own);
        ctx.set_cache(cache::CURRENT_RESPONSE, reply.chat.clone());

        let turn = ctx.get_cache(cache::COUNT).unwrap_or(0) + 1;
        write_transcript(
            self.transcript_dir.as_deref(),
            &ticker,
            &period,
            &format!("{}_round_{}", self.stance.file_prefix(), turn),
            serde_json::json!({
                "time": Local::now().to_rfc3339(),
                "speaker": self.stance.label(),
                "count": turn,
                "response": reply.chat,
            }),
        );

        Ok(reply.chat)
    }
}

/// Settles the debate: stores the decision, an investment plan report, and
/// appends to the portfolio history.
pub struct ManagerNode {
    name: String,
    agent: Agent,
    transcript_dir: Option<PathBuf>,
}

impl ManagerNode {
    pub fn new(name: impl Into<String>, agent: Agent, transcript_dir: Option<PathBuf>) -> Self {
        Self {
            name: name.into(),
            agent,
            transcript_dir,
        }
    }
}

const MANAGER_SYSTEM: &str = "You moderate a debate between a bull and a bear analyst. \
Decide which side argued better and commit to BUY, SELL or HOLD. Avoid HOLD unless the \
arguments are genuinely balanced. Give a rationale and an investment plan for the trader.";

impl Node for ManagerNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self, ctx: &mut Context) -> Result<NodeStatus> {
        let ticker = current_ticker(ctx, &self.name)?;
        let period = current_period(ctx);
        let mut history = ctx.get_cache(cache::HISTORY).unwrap_or_default();

        let parts = vec![
            format!("Ticker: {ticker}\nPeriod: {period}"),
            format!(
                "Analysis reports:\n\n{}",
                report_sections(ctx, &ticker, &period, &[INVESTMENT_PLAN])
            ),
            format!("Debate transcript:\n{history}"),
        ];
        let decision: ManagerDecision = self.agent.ask(Depth::Deep, MANAGER_SYSTEM, parts)?;

        ctx.set_report(&ticker, &period, INVESTMENT_PLAN, decision.render(&ticker, &period));

        if !history.is_empty() {
            history.push('\n');
        }
        history.push_str(&format!("Research Manager: {}", decision.decision));
        ctx.set_cache(cache::HISTORY, history);

        let added_at = ctx.get_config(config::TRADE_DATE).unwrap_or_else(|| period.clone());
        let mut portfolio = ctx.get_cache(cache::PORTFOLIO).unwrap_or_default();
        portfolio.entry(ticker.clone()).or_default().push(PortfolioEntry {
            added_at,
            decision: decision.decision,
        });
        ctx.set_cache(cache::PORTFOLIO, portfolio);

        write_transcript(
            self.transcript_dir.as_deref(),
            &ticker,
            &period,
            "manager_decision",
            serde_json::json!({
                "time": Local::now().to_rfc3339(),
                "decision": &decision,
            }),
        );

        ctx.add_log(
            format!("Debate verdict: {ticker}"),
            format!("{} - {}", decision.decision, decision.rationale.trim()),
        );
        ctx.set_cache(cache::MANAGER_DECISION, decision);
        Ok(NodeStatus::Passed)
    }
}

/// Best-effort JSON log of one debate step under `dir/{ticker}_{period}/`.
fn write_transcript(
    dir: Option<&Path>,
    ticker: &str,
    period: &str,
    stem: &str,
    payload: serde_json::Value,
) {
    let Some(dir) = dir else {
        return;
    };
    let folder = dir.join(format!("{ticker}_{period}"));
    let file = folder.join(format!("{}_{}.json", stem, Local::now().format("%Y%m%d_%H%M%S")));

    let result = std::fs::create_dir_all(&folder)
        .and_then(|_| serde_json::to_vec_pretty(&payload).map_err(std::io::Error::from))
        .and_then(|bytes| std::fs::write(&file, bytes));
    match result {
        Ok(()) => debug!(path = %file.display(), "Wrote debate transcript"),
        Err(e) => warn!(path = %file.display(), error = %e, "Failed to write debate transcript"),
    }
}

fn reset_debate(ctx: &mut Context, _ticker: &str) {
    ctx.set_cache(cache::HISTORY, String::new());
    ctx.set_cache(cache::BULL_HISTORY, String::new());
    ctx.set_cache(cache::BEAR_HISTORY, String::new());
    ctx.set_cache(cache::CURRENT_RESPONSE, String::new());
    ctx.set_cache(cache::COUNT, 0);
}

/// selector -> bull <-> bear -> manager -> selector, over `debate_queue`
/// seeded from the recommendation.
pub fn debate_graph(deps: &Collaborators) -> Result<Graph> {
    let selector = SelectionNode::new(
        "debate_selector",
        cache::DEBATE_QUEUE,
        cache::RECOMMENDATION,
        cache::TICKER,
    )
    .on_select(reset_debate);
    let mut graph = Graph::new("debate_graph", selector);

    let dir = deps.transcript_dir.clone();
    let bull = graph.add_node(TurnNode::new(
        "bull_node",
        Researcher::new(Stance::Bull, deps.agent("bull"), dir.clone()),
        cache::HISTORY,
        cache::COUNT,
    ))?;
    let bear = graph.add_node(TurnNode::new(
        "bear_node",
        Researcher::new(Stance::Bear, deps.agent("bear"), dir.clone()),
        cache::HISTORY,
        cache::COUNT,
    ))?;
    let manager = graph.add_node(ManagerNode::new("manager_node", deps.agent("manager"), dir))?;

    connect_selection(&mut graph, "debate_selector", &bull, &manager, cache::TICKER)?;
    connect_debate(&mut graph, &bull, &bear, &manager, cache::COUNT, config::ROUNDS)?;
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipelines::schema::held_tickers;
    use std::sync::Arc;
    use tradegraph_core::config::ModelConfig;
    use tradegraph_core::types::Decision;
    use tradegraph_test_utils::{RecordingBroker, ScriptedGenerator};

    fn responder() -> ScriptedGenerator {
        ScriptedGenerator::with_responder(|req| {
            Ok(match req.agent.as_str() {
                "manager" => serde_json::json!({
                    "decision": "BUY",
                    "rationale": "bull case stronger",
                    "plan": "buy on dips"
                }),
                side => serde_json::json!({"chat": format!("{side} point")}),
            })
        })
    }

    fn deps(gen: Arc<ScriptedGenerator>, dir: Option<PathBuf>) -> Collaborators {
        Collaborators::new(gen, ModelConfig::default(), Arc::new(RecordingBroker::new()))
            .with_transcript_dir(dir)
    }

    fn ctx_for(tickers: &[&str], rounds: u32) -> Context {
        let mut ctx = Context::new();
        ctx.set_cache(cache::DATE, "20251101T09".to_string());
        ctx.set_config(config::ROUNDS, rounds);
        ctx.set_cache(
            cache::RECOMMENDATION,
            tickers.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
        );
        for t in tickers {
            ctx.set_report(t, "20251101T09", "financial", format!("{t} fundamentals"));
        }
        ctx
    }

    #[test]
    fn test_two_rounds_then_verdict() {
        let gen = Arc::new(responder());
        let mut graph = debate_graph(&deps(gen.clone(), None)).unwrap();
        let mut ctx = ctx_for(&["AAPL"], 2);

        graph.execute(&mut ctx).unwrap();

        let history = ctx.get_cache(cache::HISTORY).unwrap();
        let lines: Vec<&str> = history.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "Bull Analyst: bull point");
        assert_eq!(lines[1], "Bear Analyst: bear point");
        assert_eq!(lines[4], "Research Manager: BUY");
        assert_eq!(graph.visits("manager_node"), 1);
        assert_eq!(gen.calls_for("bull"), 2);
        assert_eq!(gen.calls_for("bear"), 2);

        let plan = ctx.get_report("AAPL", "20251101T09", INVESTMENT_PLAN);
        assert!(plan.contains("**Decision:** BUY"));
        assert_eq!(
            ctx.get_cache(cache::MANAGER_DECISION).unwrap().decision,
            Decision::Buy
        );
        let portfolio = ctx.get_cache(cache::PORTFOLIO).unwrap();
        assert_eq!(held_tickers(&portfolio), vec!["AAPL"]);
    }

    #[test]
    fn test_state_resets_per_ticker() {
        let gen = Arc::new(responder());
        let mut graph = debate_graph(&deps(gen.clone(), None)).unwrap();
        let mut ctx = ctx_for(&["AAPL", "MSFT"], 1);

        graph.execute(&mut ctx).unwrap();

        assert_eq!(graph.visits("debate_selector"), 3);
        assert_eq!(graph.visits("manager_node"), 2);
        // history holds only the last ticker's debate
        assert_eq!(ctx.get_cache(cache::HISTORY).unwrap().lines().count(), 3);
        assert_eq!(ctx.get_cache(cache::COUNT), Some(2));
        assert_eq!(ctx.get_cache(cache::PORTFOLIO).unwrap().len(), 2);
    }

    #[test]
    fn test_researchers_see_reports_and_opponent() {
        let gen = Arc::new(responder());
        let mut graph = debate_graph(&deps(gen.clone(), None)).unwrap();
        let mut ctx = ctx_for(&["AAPL"], 1);
        graph.execute(&mut ctx).unwrap();

        let requests = gen.requests();
        let bear = requests.iter().find(|r| r.agent == "bear").unwrap();
        assert!(bear.parts.iter().any(|p| p.contains("AAPL fundamentals")));
        assert!(bear.parts.iter().any(|p| p.contains("bull point")));
    }

    #[test]
    fn test_transcripts_written_when_configured() {
        let dir = std::env::temp_dir().join(format!("tradegraph-debate-{}", uuid::Uuid::new_v4()));
        let gen = Arc::new(responder());
        let mut graph = debate_graph(&deps(gen, Some(dir.clone()))).unwrap();
        let mut ctx = ctx_for(&["AAPL"], 1);
        graph.execute(&mut ctx).unwrap();

        let folder = dir.join("AAPL_20251101T09");
        let names: Vec<String> = std::fs::read_dir(&folder)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert!(names.iter().any(|n| n.starts_with("bull_round_1_")));
        assert!(names.iter().any(|n| n.starts_with("bear_round_2_")));
        assert!(names.iter().any(|n| n.starts_with("manager_decision_")));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_transcript_failure_is_ignored() {
        // A file where the transcript directory should be
        let blocker = std::env::temp_dir().join(format!("tradegraph-blocker-{}", uuid::Uuid::new_v4()));
        std::fs::write(&blocker, "x").unwrap();
        let gen = Arc::new(responder());
        let mut graph = debate_graph(&deps(gen, Some(blocker.clone()))).unwrap();
        let mut ctx = ctx_for(&["AAPL"], 1);

        graph.execute(&mut ctx).unwrap();
        assert!(ctx.get_cache(cache::MANAGER_DECISION).is_some());
        let _ = std::fs::remove_file(&blocker);
    }

    #[test]
    fn test_manager_failure_aborts() {
        let gen = Arc::new(ScriptedGenerator::with_responder(|req| {
            if req.agent == "manager" {
                Err(tradegraph_core::TradegraphError::Llm("HTTP 500".into()))
            } else {
                Ok(serde_json::json!({"chat": "point"}))
            }
        }));
        let mut graph = debate_graph(&deps(gen, None)).unwrap();
        let mut ctx = ctx_for(&["AAPL"], 1);
        assert!(graph.execute(&mut ctx).is_err());
        assert_eq!(ctx.get_report("AAPL", "20251101T09", INVESTMENT_PLAN), "");
    }
}
