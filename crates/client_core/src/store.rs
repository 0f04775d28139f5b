use std::sync::Arc;

use shared::domain::GameSnapshot;
use tracing::warn;

/// Holds the last authoritative snapshot. Every replace swaps the whole
/// record, so readers never observe a mix of old and new sub-state.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    current: Option<Arc<GameSnapshot>>,
    version: u64,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&mut self, snapshot: GameSnapshot) -> Arc<GameSnapshot> {
        if let Err(violation) = snapshot.validate() {
            warn!(
                week = snapshot.week,
                year = snapshot.year,
                %violation,
                "store: server snapshot violates a client invariant; keeping it anyway"
            );
        }
        let snapshot = Arc::new(snapshot);
        self.current = Some(Arc::clone(&snapshot));
        self.version += 1;
        snapshot
    }

    pub fn current(&self) -> Option<Arc<GameSnapshot>> {
        self.current.clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.current.is_some()
    }

    /// Number of replaces so far; zero before the first load.
    pub fn version(&self) -> u64 {
        self.version
    }
}
