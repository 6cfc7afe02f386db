use std::path::PathBuf;
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tradegraph_agent::context::keys::cache;
use tradegraph_agent::context::snapshot;
use tradegraph_agent::pipelines::{analyst_graph, debate_graph, rank_graph, trader_graph};
use tradegraph_agent::{main_graph, Collaborators, Context, Graph, PaperBroker};
use tradegraph_core::config::AppConfig;
use tradegraph_core::event::{UpdateKind, UpdateNotifier};
use tradegraph_core::traits::Generator;

#[derive(Parser)]
#[command(
    name = "tradegraph",
    version,
    about = "Graph-orchestrated ranking, debate and trading pipelines"
)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "tradegraph.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline: rank, analyze, debate, trade
    Run,
    /// Rank the configured universe and print the recommendation
    Rank,
    /// Write analysis reports for the given tickers
    Analyze {
        /// Tickers to analyze (default: pipeline.tickers)
        tickers: Vec<String>,
    },
    /// Debate the given tickers and record investment plans
    Debate {
        /// Tickers to debate (default: pipeline.tickers)
        tickers: Vec<String>,
    },
    /// Risk-check and trade tickers that already have an investment plan
    Trade {
        /// Tickers to trade (default: pipeline.tickers)
        tickers: Vec<String>,
    },
    /// Print the effective configuration
    Config,
    /// Print the reports stored in a context snapshot
    Reports {
        /// Snapshot file (default: state.snapshot_path)
        #[arg(short, long)]
        snapshot: Option<PathBuf>,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Debug, Clone, Copy)]
enum Stage {
    Full,
    Rank,
    Analyze,
    Debate,
    Trade,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("tradegraph=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    // Handle completions before config loading
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "tradegraph", &mut std::io::stdout());
        return Ok(());
    }

    let config = if cli.config.exists() {
        AppConfig::load(&cli.config)?
    } else {
        eprintln!(
            "Warning: {} not found, using defaults",
            cli.config.display()
        );
        AppConfig::default()
    };

    match cli.command {
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Reports { snapshot } => {
            let Some(path) = snapshot.or_else(|| config.state.snapshot_path()) else {
                anyhow::bail!("no snapshot given and state.snapshot_path is not set");
            };
            print_reports(&path)?;
        }
        Commands::Run => run_stage(config, Stage::Full, vec![]).await?,
        Commands::Rank => run_stage(config, Stage::Rank, vec![]).await?,
        Commands::Analyze { tickers } => run_stage(config, Stage::Analyze, tickers).await?,
        Commands::Debate { tickers } => run_stage(config, Stage::Debate, tickers).await?,
        Commands::Trade { tickers } => run_stage(config, Stage::Trade, tickers).await?,
        Commands::Completions { .. } => {}
    }

    Ok(())
}

fn build_graph(stage: Stage, deps: &Collaborators, config: &AppConfig) -> anyhow::Result<Graph> {
    let graph = match stage {
        Stage::Full => main_graph(deps, &config.pipeline)?,
        Stage::Rank => rank_graph(deps, &config.pipeline)?,
        Stage::Analyze => analyst_graph(deps, &config.pipeline, cache::RECOMMENDATION)?,
        Stage::Debate => debate_graph(deps)?,
        Stage::Trade => trader_graph(deps)?,
    };
    Ok(graph)
}

async fn run_stage(config: AppConfig, stage: Stage, tickers: Vec<String>) -> anyhow::Result<()> {
    let (notifier, mut rx) = UpdateNotifier::channel(256);

    let mut ctx = match config.state.snapshot_path() {
        Some(path) => Context::persisted(path)?,
        None => Context::new(),
    }
    .with_notifier(notifier);
    ctx.apply_pipeline_config(&config.pipeline);

    // Sub-pipelines run on an explicit ticker list instead of the ranking output
    if !matches!(stage, Stage::Full | Stage::Rank) {
        let tickers = if tickers.is_empty() {
            config.pipeline.tickers.clone()
        } else {
            tickers
        };
        if tickers.is_empty() {
            anyhow::bail!("no tickers given and pipeline.tickers is empty");
        }
        ctx.set_cache(cache::RECOMMENDATION, tickers);
    }
    let logs_before = ctx.logs().len();

    // Drain change notifications while the pipeline runs
    let watcher = tokio::spawn(async move {
        let mut logs = 0usize;
        let mut reports = 0usize;
        while let Some(event) = rx.recv().await {
            match event.kind {
                UpdateKind::Log => logs += 1,
                UpdateKind::Report => reports += 1,
                UpdateKind::Cache | UpdateKind::Config => {}
            }
        }
        (logs, reports)
    });

    info!(stage = ?stage, "Starting pipeline");
    let handle = tokio::task::spawn_blocking(move || -> anyhow::Result<Context> {
        let generator: Arc<dyn Generator> =
            Arc::from(tradegraph_llm::create_generator(&config.model)?);
        let broker = Arc::new(PaperBroker::new(config.broker.cash));
        let deps = Collaborators::new(generator, config.model.clone(), broker)
            .with_transcript_dir(config.state.transcript_dir());

        let mut graph = build_graph(stage, &deps, &config)?;
        graph.execute(&mut ctx)?;
        Ok(ctx)
    });
    let ctx = handle.await??;

    let summary = summarize(&ctx, logs_before);
    // Dropping the context closes the channel and ends the watcher
    drop(ctx);
    let (log_events, report_events) = watcher.await?;
    info!(logs = log_events, reports = report_events, "Pipeline finished");

    println!("{summary}");
    Ok(())
}

/// Log lines written since `first_log`, then the recommendation and orders.
fn summarize(ctx: &Context, first_log: usize) -> String {
    let mut out = String::new();
    for entry in ctx.logs().iter().skip(first_log) {
        out.push_str(&format!(
            "[{}] {}\n    {}\n",
            entry.timestamp.format("%H:%M:%S"),
            entry.summary,
            entry.content.replace('\n', "\n    ")
        ));
    }

    let recommendation = ctx.get_cache(cache::RECOMMENDATION).unwrap_or_default();
    out.push_str(&format!(
        "\nRecommendation: {}\n",
        if recommendation.is_empty() {
            "(none)".to_string()
        } else {
            recommendation.join(", ")
        }
    ));

    for order in ctx.get_cache(cache::ORDERS).unwrap_or_default() {
        match (&order.order_id, &order.error) {
            (Some(id), _) => out.push_str(&format!(
                "Order {}: {} {} x{} ({})\n",
                id, order.decision, order.ticker, order.quantity, order.timestamp
            )),
            (None, Some(err)) => out.push_str(&format!(
                "Order failed: {} {} x{}: {}\n",
                order.decision, order.ticker, order.quantity, err
            )),
            (None, None) => {}
        }
    }
    out
}

fn print_reports(path: &std::path::Path) -> anyhow::Result<()> {
    let Some(snap) = snapshot::load(path)? else {
        println!("No snapshot at {}", path.display());
        return Ok(());
    };
    if snap.reports.is_empty() {
        println!("No reports in {}", path.display());
        return Ok(());
    }
    for (entity, periods) in &snap.reports {
        for (period, tasks) in periods {
            for (task, content) in tasks {
                println!("=== {} / {} / {} ===\n{}\n", entity, period, task, content);
            }
        }
    }
    Ok(())
}
