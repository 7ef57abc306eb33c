//! Shared snapshot store
//!
//! Single source of truth for the latest classification. The reader loop
//! publishes whole snapshots; HTTP handlers read them. Snapshots are held
//! behind an `Arc` so the write lock only covers a pointer swap and readers
//! never hold the lock while serializing.

use crate::domain::types::Snapshot;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub struct SnapshotStore {
    current: RwLock<Arc<Snapshot>>,
    /// Number of snapshots published since startup
    generation: AtomicU64,
}

impl SnapshotStore {
    /// Create a store with every slot vacant ("no signal yet")
    pub fn new(slot_count: usize) -> Self {
        Self {
            current: RwLock::new(Arc::new(Snapshot::vacant(slot_count))),
            generation: AtomicU64::new(0),
        }
    }

    /// Replace the current snapshot wholesale
    pub fn publish(&self, snapshot: Snapshot) -> u64 {
        let snapshot = Arc::new(snapshot);
        let previous = {
            let mut current = self.current.write();
            std::mem::replace(&mut *current, snapshot)
        };
        // Last reference to the old snapshot may be dropped here, outside the lock
        drop(previous);
        self.generation.fetch_add(1, Ordering::Release) + 1
    }

    /// Latest published snapshot
    #[inline]
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current.read().clone()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::OccupancyState;

    #[test]
    fn test_starts_all_vacant() {
        let store = SnapshotStore::new(3);
        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot.count(OccupancyState::Vacant), 3);
        assert_eq!(store.generation(), 0);
    }

    #[test]
    fn test_publish_replaces_snapshot() {
        let store = SnapshotStore::new(2);
        let before = store.snapshot();

        let next = Snapshot::from_states(vec![OccupancyState::Occupied, OccupancyState::Error]);
        assert_eq!(store.publish(next.clone()), 1);

        assert_eq!(*store.snapshot(), next);
        // Readers holding the old snapshot keep seeing it unchanged
        assert_eq!(before.count(OccupancyState::Vacant), 2);
        assert_eq!(store.generation(), 1);
    }

    #[test]
    fn test_repeated_reads_are_identical() {
        let store = SnapshotStore::new(3);
        store.publish(Snapshot::from_states(vec![
            OccupancyState::Vacant,
            OccupancyState::Misaligned,
            OccupancyState::Occupied,
        ]));

        let first = serde_json::to_vec(&*store.snapshot()).unwrap();
        let second = serde_json::to_vec(&*store.snapshot()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_concurrent_readers_never_see_torn_snapshot() {
        let store = Arc::new(SnapshotStore::new(8));
        let uniform = [
            OccupancyState::Vacant,
            OccupancyState::Occupied,
            OccupancyState::Misaligned,
            OccupancyState::Error,
        ];

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    let mut last_generation = 0;
                    for _ in 0..2000 {
                        let generation = store.generation();
                        assert!(generation >= last_generation);
                        last_generation = generation;

                        let snapshot = store.snapshot();
                        let first = snapshot.iter().next().map(|(_, s)| s).unwrap();
                        assert_eq!(snapshot.count(first), snapshot.len());
                    }
                })
            })
            .collect();

        for i in 0..2000 {
            let state = uniform[i % uniform.len()];
            store.publish(Snapshot::from_states(vec![state; 8]));
        }

        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(store.generation(), 2000);
    }
}
