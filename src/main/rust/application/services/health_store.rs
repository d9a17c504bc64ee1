use std::sync::Arc;

use tokio::sync::watch;

use crate::domain::value_objects::HealthSnapshot;

/// Single-writer, multi-reader cell holding the latest health snapshot.
///
/// Writers replace the whole value; readers clone the latest one, so a reader
/// never sees fields from two different snapshots.
#[derive(Clone)]
pub struct HealthStore {
    tx: Arc<watch::Sender<HealthSnapshot>>,
}

impl HealthStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(HealthSnapshot::initial());
        Self { tx: Arc::new(tx) }
    }

    /// Replace the published snapshot
    pub fn publish(&self, snapshot: HealthSnapshot) {
        self.tx.send_replace(snapshot);
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> HealthSnapshot {
        self.tx.borrow().clone()
    }
}

impl Default for HealthStore {
    fn default() -> Self {
        Self::new()
    }
}
