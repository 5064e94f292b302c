pub mod lock;
pub mod snapshots;

use anyhow::Context;
use std::path::Path;

pub const SNAPSHOTS_DIR: &str = "snapshots";
pub const FAILURES_DIR: &str = "failures";

/// Creates the data directory layout if it does not exist yet.
pub async fn prepare(data_dir: &Path) -> anyhow::Result<()> {
    for dir in [
        data_dir.to_path_buf(),
        data_dir.join(SNAPSHOTS_DIR),
        data_dir.join(FAILURES_DIR),
    ] {
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }
    Ok(())
}
