use std::sync::Arc;

use tradegraph_agent::context::keys::cache;
use tradegraph_agent::pipelines::schema::held_tickers;
use tradegraph_agent::pipelines::INVESTMENT_PLAN;
use tradegraph_agent::{main_graph, Collaborators, Context, PaperBroker};
use tradegraph_core::config::{ModelConfig, PipelineConfig};
use tradegraph_core::error::TradegraphError;
use tradegraph_core::types::Decision;
use tradegraph_test_utils::{fill_schema, RecordingBroker, ScriptedGenerator};

fn pipeline(tickers: &[&str], max_portfolio_size: usize, rounds: u32) -> PipelineConfig {
    PipelineConfig {
        tickers: tickers.iter().map(|s| s.to_string()).collect(),
        max_portfolio_size,
        rounds,
        order_quantity: 10,
        trade_date: Some("2025-11-01 09:30".to_string()),
        ..PipelineConfig::default()
    }
}

fn period(ctx: &Context) -> String {
    ctx.get_cache(cache::DATE).expect("run period")
}

#[test]
fn test_full_run_ranks_debates_and_trades() {
    let dir = tempfile::tempdir().expect("tempdir");
    let snapshot = dir.path().join("context.json");
    let gen = Arc::new(ScriptedGenerator::schema_filler());
    let broker = Arc::new(RecordingBroker::new());
    let deps = Collaborators::new(gen.clone(), ModelConfig::default(), broker.clone());

    let config = pipeline(&["AAPL", "MSFT", "NVDA"], 1, 1);
    let mut ctx = Context::persisted(&snapshot).expect("context");
    ctx.apply_pipeline_config(&config);
    let mut graph = main_graph(&deps, &config).expect("graph");
    graph.execute(&mut ctx).expect("run");

    // One open slot: two sampled candidates, one comparison, one pick
    assert_eq!(gen.calls_for("analyst:financial"), 2);
    assert_eq!(gen.calls_for("rank"), 1);
    let recommendation = ctx.get_cache(cache::RECOMMENDATION).expect("recommendation");
    assert_eq!(recommendation.len(), 1);
    let pick = &recommendation[0];

    assert_eq!(gen.calls_for("bull"), 1);
    assert_eq!(gen.calls_for("bear"), 1);
    assert_eq!(gen.calls_for("manager"), 1);
    let period = period(&ctx);
    assert!(!ctx.get_report(pick, &period, "financial").is_empty());
    assert!(!ctx.get_report(pick, &period, INVESTMENT_PLAN).is_empty());

    let orders = broker.orders();
    assert_eq!(orders.len(), 1);
    assert_eq!(&orders[0].ticker, pick);
    assert_eq!(orders[0].decision, Decision::Buy);
    assert_eq!(orders[0].quantity, 10);

    let portfolio = ctx.get_cache(cache::PORTFOLIO).expect("portfolio");
    assert_eq!(held_tickers(&portfolio), vec![pick.clone()]);
}

#[test]
fn test_snapshot_restores_reports_and_logs() {
    let dir = tempfile::tempdir().expect("tempdir");
    let snapshot = dir.path().join("state").join("context.json");
    let gen = Arc::new(ScriptedGenerator::schema_filler());
    let deps = Collaborators::new(gen, ModelConfig::default(), Arc::new(RecordingBroker::new()));

    let config = pipeline(&["AAPL"], 5, 1);
    let mut ctx = Context::persisted(&snapshot).expect("context");
    ctx.apply_pipeline_config(&config);
    main_graph(&deps, &config)
        .expect("graph")
        .execute(&mut ctx)
        .expect("run");
    let period = period(&ctx);
    let logs = ctx.logs().len();
    assert!(logs > 0);

    let restored = Context::persisted(&snapshot).expect("restore");
    assert_eq!(
        restored.get_report("AAPL", &period, INVESTMENT_PLAN),
        ctx.get_report("AAPL", &period, INVESTMENT_PLAN)
    );
    assert_eq!(restored.logs().len(), logs);
    assert_eq!(
        restored.get_config(tradegraph_agent::context::keys::config::ROUNDS),
        Some(1)
    );
    // The cache is run-scoped
    assert!(restored.get_cache(cache::RECOMMENDATION).is_none());
}

#[test]
fn test_rounds_and_direct_recommendation() {
    let gen = Arc::new(ScriptedGenerator::schema_filler());
    let broker = Arc::new(PaperBroker::new(1_000.0));
    broker.set_quote("AAPL", 20.0).expect("quote");
    broker.set_quote("MSFT", 30.0).expect("quote");
    let deps = Collaborators::new(gen.clone(), ModelConfig::default(), broker.clone());

    let config = pipeline(&["AAPL", "MSFT"], 5, 2);
    let mut ctx = Context::new();
    ctx.apply_pipeline_config(&config);
    main_graph(&deps, &config)
        .expect("graph")
        .execute(&mut ctx)
        .expect("run");

    // Both fit into the open slots, so no tournament
    assert_eq!(gen.calls_for("rank"), 0);
    assert_eq!(gen.calls_for("bull"), 4);
    assert_eq!(gen.calls_for("bear"), 4);
    assert_eq!(gen.calls_for("manager"), 2);

    assert_eq!(broker.position("AAPL").expect("position"), 10);
    assert_eq!(broker.position("MSFT").expect("position"), 10);
    assert_eq!(broker.cash().expect("cash"), 500.0);
    let orders = ctx.get_cache(cache::ORDERS).expect("orders");
    assert!(orders.iter().all(|o| o.succeeded()));
}

#[test]
fn test_full_portfolio_reconsiders_holdings() {
    let gen = Arc::new(ScriptedGenerator::schema_filler());
    let deps = Collaborators::new(gen.clone(), ModelConfig::default(), Arc::new(RecordingBroker::new()));

    let config = pipeline(&["AAPL", "MSFT"], 1, 1);
    let mut ctx = Context::new();
    ctx.apply_pipeline_config(&config);
    let mut graph = main_graph(&deps, &config).expect("graph");

    graph.execute(&mut ctx).expect("first run");
    let first = ctx.get_cache(cache::RECOMMENDATION).expect("recommendation");
    assert_eq!(first.len(), 1);

    // The manager bought the pick, so the only slot is taken
    graph.execute(&mut ctx).expect("second run");
    assert_eq!(ctx.get_cache(cache::RECOMMENDATION), Some(first));
    assert_eq!(gen.calls_for("rank"), 1);
    assert_eq!(gen.calls_for("manager"), 2);
}

#[test]
fn test_manager_failure_aborts_before_trading() {
    let gen = Arc::new(ScriptedGenerator::with_responder(|req| {
        if req.agent == "manager" {
            return Err(TradegraphError::Llm("model unavailable".into()));
        }
        Ok(fill_schema(&req.schema, &req.agent))
    }));
    let broker = Arc::new(RecordingBroker::new());
    let deps = Collaborators::new(gen, ModelConfig::default(), broker.clone());

    let config = pipeline(&["AAPL"], 5, 1);
    let mut ctx = Context::new();
    ctx.apply_pipeline_config(&config);
    let err = main_graph(&deps, &config)
        .expect("graph")
        .execute(&mut ctx)
        .unwrap_err();

    assert!(matches!(err, TradegraphError::Llm(_)));
    assert!(broker.orders().is_empty());
    let period = period(&ctx);
    assert!(!ctx.get_report("AAPL", &period, "financial").is_empty());
    assert!(ctx.report("AAPL", &period, INVESTMENT_PLAN).is_none());
}

#[test]
fn test_empty_universe_stops_after_ranking() {
    let gen = Arc::new(ScriptedGenerator::schema_filler());
    let broker = Arc::new(RecordingBroker::new());
    let deps = Collaborators::new(gen.clone(), ModelConfig::default(), broker.clone());

    let config = pipeline(&[], 5, 1);
    let mut ctx = Context::new();
    ctx.apply_pipeline_config(&config);
    main_graph(&deps, &config)
        .expect("graph")
        .execute(&mut ctx)
        .expect("run");

    assert!(gen.requests().is_empty());
    assert!(broker.orders().is_empty());
}
