use anyhow::Context;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

// A lock file in the data directory guards against two worker cycles writing at once.
// A crashed worker leaves its file behind, so locks older than `stale_after` are reclaimed.
const LOCK_FILE: &str = "cycle.lock";
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(60 * 60);

#[derive(Debug)]
pub struct CycleLock {
    path: PathBuf,
}

impl CycleLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// `Ok(None)` when another live cycle holds the lock.
pub async fn try_acquire_cycle_lock(
    data_dir: &Path,
    stale_after: Duration,
) -> anyhow::Result<Option<CycleLock>> {
    tokio::fs::create_dir_all(data_dir)
        .await
        .with_context(|| format!("failed to create {}", data_dir.display()))?;
    let path = data_dir.join(LOCK_FILE);

    if try_create(&path).await? {
        return Ok(Some(CycleLock { path }));
    }

    if !is_stale(&path, stale_after).await? {
        return Ok(None);
    }

    tracing::warn!(path = %path.display(), "reclaiming stale cycle lock");
    match tokio::fs::remove_file(&path).await {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(err).context("failed to remove stale cycle lock"),
    }

    // Another worker may have reclaimed it in between; losing that race is a plain "held".
    if try_create(&path).await? {
        return Ok(Some(CycleLock { path }));
    }
    Ok(None)
}

pub async fn release_cycle_lock(lock: CycleLock) -> anyhow::Result<()> {
    match tokio::fs::remove_file(&lock.path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => {
            Err(err).with_context(|| format!("failed to release {}", lock.path.display()))
        }
    }
}

async fn try_create(path: &Path) -> anyhow::Result<bool> {
    let res = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await;

    let mut file = match res {
        Ok(f) => f,
        Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => return Ok(false),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to create {}", path.display()));
        }
    };

    let owner = format!("pid={} acquired_at={}\n", std::process::id(), Utc::now().to_rfc3339());
    file.write_all(owner.as_bytes())
        .await
        .context("failed to write cycle lock")?;
    file.flush().await.context("failed to flush cycle lock")?;
    Ok(true)
}

async fn is_stale(path: &Path, stale_after: Duration) -> anyhow::Result<bool> {
    if stale_after.is_zero() {
        return Ok(true);
    }
    let meta = match tokio::fs::metadata(path).await {
        Ok(m) => m,
        // Released between our create attempt and now.
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(true),
        Err(err) => return Err(err).context("failed to stat cycle lock"),
    };
    let modified: DateTime<Utc> = meta.modified().context("lock mtime unavailable")?.into();
    let age = Utc::now().signed_duration_since(modified);
    Ok(age.to_std().map(|age| age >= stale_after).unwrap_or(false))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_acquire_fails_until_release() {
        let dir = tempfile::tempdir().unwrap();

        let lock = try_acquire_cycle_lock(dir.path(), DEFAULT_STALE_AFTER)
            .await
            .unwrap()
            .expect("first acquire");
        assert!(lock.path().exists());

        assert!(try_acquire_cycle_lock(dir.path(), DEFAULT_STALE_AFTER)
            .await
            .unwrap()
            .is_none());

        release_cycle_lock(lock).await.unwrap();
        assert!(try_acquire_cycle_lock(dir.path(), DEFAULT_STALE_AFTER)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn stale_lock_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let _held = try_acquire_cycle_lock(dir.path(), DEFAULT_STALE_AFTER)
            .await
            .unwrap()
            .expect("first acquire");

        // Any existing lock counts as stale with a zero threshold.
        let reclaimed = try_acquire_cycle_lock(dir.path(), Duration::ZERO)
            .await
            .unwrap();
        assert!(reclaimed.is_some());
    }
}
