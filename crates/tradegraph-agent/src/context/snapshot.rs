//! On-disk JSON snapshot of the persistent parts of a [`Context`](super::Context).

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use tradegraph_core::error::{Result, TradegraphError};

use super::{LogEntry, Reports};

#[derive(Debug, Default, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub reports: Reports,
    #[serde(default)]
    pub config: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
}

/// Borrowed view written on every persisted mutation, so saving never clones.
#[derive(Serialize)]
pub struct SnapshotRef<'a> {
    pub reports: &'a Reports,
    pub config: &'a BTreeMap<String, serde_json::Value>,
    pub logs: &'a [LogEntry],
}

/// Load a snapshot. A missing file yields `None`.
pub fn load(path: &Path) -> Result<Option<Snapshot>> {
    if !path.exists() {
        return Ok(None);
    }
    let data = std::fs::read_to_string(path)?;
    let snapshot = serde_json::from_str(&data).map_err(|e| {
        TradegraphError::Snapshot(format!("{}: {}", path.display(), e))
    })?;
    Ok(Some(snapshot))
}

/// Write a snapshot through a temp file and rename, so a crash mid-write
/// leaves the previous snapshot intact.
pub fn save(path: &Path, snapshot: &SnapshotRef<'_>) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(snapshot)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
