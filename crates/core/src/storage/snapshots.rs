use crate::domain::snapshot::{CycleFailure, DashboardSnapshot};
use crate::storage::{FAILURES_DIR, SNAPSHOTS_DIR};
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const LATEST_FILE: &str = "latest.json";

fn file_name(generated_at: DateTime<Utc>, cycle_id: Uuid) -> String {
    format!("{}-{}.json", generated_at.format("%Y%m%dT%H%M%SZ"), cycle_id)
}

pub fn latest_path(data_dir: &Path) -> PathBuf {
    data_dir.join(LATEST_FILE)
}

/// Archives the snapshot, then replaces `latest.json` in one rename so readers see either
/// the previous cycle or this one.
pub async fn persist_success(
    data_dir: &Path,
    snapshot: &DashboardSnapshot,
) -> anyhow::Result<PathBuf> {
    snapshot
        .validate()
        .context("refusing to persist an invalid snapshot")?;

    let archive = data_dir
        .join(SNAPSHOTS_DIR)
        .join(file_name(snapshot.generated_at, snapshot.cycle_id));
    write_json_atomic(&archive, snapshot).await?;

    let latest = latest_path(data_dir);
    write_json_atomic(&latest, snapshot).await?;
    Ok(archive)
}

pub async fn persist_failure(data_dir: &Path, failure: &CycleFailure) -> anyhow::Result<PathBuf> {
    let path = data_dir
        .join(FAILURES_DIR)
        .join(file_name(failure.generated_at, failure.cycle_id));
    write_json_atomic(&path, failure).await?;
    Ok(path)
}

/// `Ok(None)` when no cycle has been published yet.
pub async fn read_latest(data_dir: &Path) -> anyhow::Result<Option<DashboardSnapshot>> {
    let path = latest_path(data_dir);
    let bytes = match tokio::fs::read(&path).await {
        Ok(b) => b,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read {}", path.display()));
        }
    };
    let snapshot = serde_json::from_slice::<DashboardSnapshot>(&bytes)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(Some(snapshot))
}

/// Keeps the newest `keep` archived snapshots and deletes the rest. Returns how many were removed.
pub async fn prune_history(data_dir: &Path, keep: usize) -> anyhow::Result<usize> {
    let dir = data_dir.join(SNAPSHOTS_DIR);
    let mut names = Vec::new();
    let mut rd = match tokio::fs::read_dir(&dir).await {
        Ok(rd) => rd,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(err) => return Err(err).with_context(|| format!("failed to list {}", dir.display())),
    };
    while let Some(entry) = rd.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with(".json") {
            names.push(name);
        }
    }

    // Names start with a fixed-width UTC timestamp, so lexical order is chronological.
    names.sort();
    let excess = names.len().saturating_sub(keep);
    for name in &names[..excess] {
        let path = dir.join(name);
        tokio::fs::remove_file(&path)
            .await
            .with_context(|| format!("failed to remove {}", path.display()))?;
    }
    Ok(excess)
}

async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let bytes = serde_json::to_vec_pretty(value).context("failed to serialize json")?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes)
        .await
        .with_context(|| format!("failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("failed to move {} into place", path.display()))?;
    Ok(())
}
