//! Shared mutable state for a pipeline run.
//!
//! A `Context` holds four stores:
//! - `cache`: run-scoped values (worklists, current ticker, debate state)
//! - `config`: parameters seeded at start and read by nodes and predicates
//! - `reports`: `entity -> period -> task -> content`, periods normalized to the hour
//! - `logs`: append-only activity log
//!
//! Every mutation emits a payload-free [`ContextEvent`](tradegraph_core::ContextEvent)
//! when a notifier is attached. A persisted context rewrites its snapshot file
//! on every `set_config` and `add_log`; the cache is never persisted.

pub mod keys;
pub mod period;
pub mod snapshot;

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use tradegraph_core::config::PipelineConfig;
use tradegraph_core::error::Result;
use tradegraph_core::event::{UpdateKind, UpdateNotifier};

pub use keys::Key;

/// `entity -> period -> task -> content`.
pub type Reports = BTreeMap<String, BTreeMap<String, BTreeMap<String, String>>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
/// One line of the run log.
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    /// Short headline, e.g. "financial analysis: AAPL".
    pub summary: String,
    /// Full text behind the headline.
    pub content: String,
}

#[derive(Debug, Default)]
pub struct Context {
    cache: HashMap<String, serde_json::Value>,
    config: BTreeMap<String, serde_json::Value>,
    reports: Reports,
    logs: Vec<LogEntry>,
    notifier: Option<UpdateNotifier>,
    snapshot_path: Option<PathBuf>,
}

impl Context {
    /// An in-memory context.
    pub fn new() -> Self {
        Self::default()
    }

    /// A context backed by a JSON snapshot file.
    ///
    /// Reports, config and logs are restored from `path` if it exists.
    pub fn persisted(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut ctx = Self::default();
        if let Some(snap) = snapshot::load(&path)? {
            info!(
                path = %path.display(),
                reports = snap.reports.len(),
                logs = snap.logs.len(),
                "Restored context snapshot"
            );
            ctx.reports = snap.reports;
            ctx.config = snap.config;
            ctx.logs = snap.logs;
        }
        ctx.snapshot_path = Some(path);
        Ok(ctx)
    }

    /// Attach a change notifier.
    pub fn with_notifier(mut self, notifier: UpdateNotifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot_path.as_deref()
    }

    // -- cache --

    /// Read a cache value. Missing keys and values of the wrong shape are `None`.
    pub fn get_cache<T: DeserializeOwned>(&self, key: Key<T>) -> Option<T> {
        self.cache
            .get(key.name())
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn set_cache<T: Serialize>(&mut self, key: Key<T>, value: T) {
        self.cache.insert(key.name().to_string(), to_json(key.name(), value));
        self.notify(UpdateKind::Cache);
    }

    pub fn remove_cache<T>(&mut self, key: Key<T>) {
        self.cache.remove(key.name());
        self.notify(UpdateKind::Cache);
    }

    // -- config --

    pub fn get_config<T: DeserializeOwned>(&self, key: Key<T>) -> Option<T> {
        self.config
            .get(key.name())
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn set_config<T: Serialize>(&mut self, key: Key<T>, value: T) {
        self.config.insert(key.name().to_string(), to_json(key.name(), value));
        self.persist();
        self.notify(UpdateKind::Config);
    }

    /// Seed the config keys the pipelines read.
    ///
    /// The trade date (or the current hour when unset) also becomes the
    /// run's report period in the cache.
    pub fn apply_pipeline_config(&mut self, pipeline: &PipelineConfig) {
        use keys::{cache, config};

        let date = pipeline
            .trade_date
            .as_deref()
            .map(period::normalize)
            .unwrap_or_else(period::now);

        self.set_config(config::TICKERS, pipeline.tickers.clone());
        self.set_config(config::ANALYSIS_TASKS, pipeline.analysis_tasks.clone());
        self.set_config(config::MAX_PORTFOLIO_SIZE, pipeline.max_portfolio_size);
        self.set_config(config::ROUNDS, pipeline.rounds);
        self.set_config(config::ORDER_QUANTITY, pipeline.order_quantity);
        self.set_config(config::ORDER_PRICE, pipeline.order_price);
        self.set_config(config::MAX_ATTEMPTS, pipeline.max_attempts);
        self.set_config(config::TRADE_DATE, date.clone());
        self.set_cache(cache::DATE, date);
    }

    // -- reports --

    /// Read a report, or the empty string when none exists.
    pub fn get_report(&self, entity: &str, period: &str, task: &str) -> String {
        self.report(entity, period, task).unwrap_or_default().to_string()
    }

    pub fn report(&self, entity: &str, period: &str, task: &str) -> Option<&str> {
        self.reports
            .get(entity)?
            .get(&period::normalize(period))?
            .get(task)
            .map(String::as_str)
    }

    pub fn set_report(
        &mut self,
        entity: &str,
        period: &str,
        task: &str,
        content: impl Into<String>,
    ) {
        self.reports
            .entry(entity.to_string())
            .or_default()
            .entry(period::normalize(period))
            .or_default()
            .insert(task.to_string(), content.into());
        self.notify(UpdateKind::Report);
    }

    /// All reports for one entity and period, in task order.
    pub fn reports_for(&self, entity: &str, period: &str) -> Vec<(&str, &str)> {
        self.reports
            .get(entity)
            .and_then(|periods| periods.get(&period::normalize(period)))
            .map(|tasks| {
                tasks
                    .iter()
                    .map(|(task, content)| (task.as_str(), content.as_str()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn reports(&self) -> &Reports {
        &self.reports
    }

    // -- logs --

    pub fn add_log(&mut self, summary: impl Into<String>, content: impl Into<String>) {
        let entry = LogEntry {
            timestamp: Utc::now(),
            summary: summary.into(),
            content: content.into(),
        };
        info!(summary = %entry.summary, "{}", entry.content);
        self.logs.push(entry);
        self.persist();
        self.notify(UpdateKind::Log);
    }

    pub fn logs(&self) -> &[LogEntry] {
        &self.logs
    }

    fn notify(&self, kind: UpdateKind) {
        if let Some(notifier) = &self.notifier {
            notifier.notify(kind);
        }
    }

    fn persist(&self) {
        let Some(path) = &self.snapshot_path else {
            return;
        };
        let snap = snapshot::SnapshotRef {
            reports: &self.reports,
            config: &self.config,
            logs: &self.logs,
        };
        if let Err(e) = snapshot::save(path, &snap) {
            warn!(path = %path.display(), error = %e, "Failed to write context snapshot");
        }
    }
}

fn to_json<T: Serialize>(key: &str, value: T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        warn!(key, error = %e, "Value is not representable as JSON, storing null");
        serde_json::Value::Null
    })
}
