use crate::domain::snapshot::DashboardSnapshot;
use std::sync::Arc;
use tokio::sync::RwLock;

/// The snapshot readers currently see. Publishing swaps the whole `Arc`, so a reader holds
/// one complete cycle for as long as it keeps the pointer.
#[derive(Debug, Default)]
pub struct SnapshotBoard {
    current: RwLock<Option<Arc<DashboardSnapshot>>>,
}

impl SnapshotBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false (and keeps the current one) when `snapshot` is not newer.
    pub async fn publish(&self, snapshot: DashboardSnapshot) -> bool {
        let mut current = self.current.write().await;
        if let Some(existing) = current.as_ref() {
            if existing.cycle_id == snapshot.cycle_id
                || existing.generated_at > snapshot.generated_at
            {
                return false;
            }
        }
        *current = Some(Arc::new(snapshot));
        true
    }

    pub async fn latest(&self) -> Option<Arc<DashboardSnapshot>> {
        self.current.read().await.clone()
    }
}
