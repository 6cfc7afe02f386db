//! Domain pipelines: ranking, analysis, debate and trading sub-graphs, and the
//! main graph chaining them.

pub mod analyst;
pub mod debate;
pub mod rank;
pub mod schema;
pub mod trader;

use std::path::PathBuf;
use std::sync::Arc;

use tradegraph_core::config::{ModelConfig, PipelineConfig};
use tradegraph_core::error::{Result, TradegraphError};
use tradegraph_core::traits::{Broker, Generator};

use crate::agent::Agent;
use crate::context::keys::cache;
use crate::context::{period, Context};
use crate::graph::Graph;

pub use analyst::analyst_graph;
pub use debate::debate_graph;
pub use rank::rank_graph;
pub use trader::trader_graph;

/// Report task under which the debate stores its verdict.
pub const INVESTMENT_PLAN: &str = "investment_plan";

/// External services the pipeline nodes call out to.
#[derive(Clone)]
pub struct Collaborators {
    pub generator: Arc<dyn Generator>,
    pub models: Arc<ModelConfig>,
    pub broker: Arc<dyn Broker>,
    /// Where debate turns are logged as JSON, if anywhere.
    pub transcript_dir: Option<PathBuf>,
}

impl Collaborators {
    pub fn new(generator: Arc<dyn Generator>, models: ModelConfig, broker: Arc<dyn Broker>) -> Self {
        Self {
            generator,
            models: Arc::new(models),
            broker,
            transcript_dir: None,
        }
    }

    pub fn with_transcript_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.transcript_dir = dir;
        self
    }

    pub fn agent(&self, label: &str) -> Agent {
        Agent::new(label, self.generator.clone(), self.models.clone())
    }
}

/// rank -> analyst -> debate -> trader. Stops after ranking when nothing is
/// recommended.
pub fn main_graph(deps: &Collaborators, pipeline: &PipelineConfig) -> Result<Graph> {
    let mut graph = Graph::new("main_graph", rank_graph(deps, pipeline)?);
    let rank = graph.start().to_string();
    let analyst = graph.add_node(analyst_graph(deps, pipeline, cache::RECOMMENDATION)?)?;
    let debate = graph.add_node(debate_graph(deps)?)?;
    let trader = graph.add_node(trader_graph(deps)?)?;

    graph.add_conditional_edge(&rank, &analyst, |ctx| {
        !ctx.get_cache(cache::RECOMMENDATION).unwrap_or_default().is_empty()
    })?;
    graph.add_edge(&analyst, &debate)?;
    graph.add_edge(&debate, &trader)?;
    Ok(graph)
}

/// The ticker a selection loop is currently processing.
pub(crate) fn current_ticker(ctx: &Context, node: &str) -> Result<String> {
    ctx.get_cache(cache::TICKER).ok_or_else(|| {
        TradegraphError::Graph(format!("node '{}' ran without a current ticker", node))
    })
}

/// The period reports of this run are filed under.
pub(crate) fn current_period(ctx: &Context) -> String {
    ctx.get_cache(cache::DATE).unwrap_or_else(period::now)
}

/// `### task` sections for every report of `ticker`, except `skip`.
pub(crate) fn report_sections(ctx: &Context, ticker: &str, period: &str, skip: &[&str]) -> String {
    ctx.reports_for(ticker, period)
        .into_iter()
        .filter(|(task, _)| !skip.contains(task))
        .map(|(task, content)| format!("### {task}\n{content}"))
        .collect::<Vec<_>>()
        .join("\n\n")
}
