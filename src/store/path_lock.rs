use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::sync::OwnedMutexGuard;

/// One async lock per live path, shared by every operation kind on that
/// path. Operations on different paths never contend; operations on the
/// same path serialize in lock-acquisition order.
///
/// The map is bounded by the set of live paths: `release_slot` drops a
/// path's lock once no holder or waiter remains (the map's `Arc` is then
/// the only reference).
#[derive(Debug, Default)]
pub struct PathLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl PathLocks {
    pub fn new() -> Self {
        PathLocks {
            locks: DashMap::new(),
        }
    }

    pub async fn acquire(
        &self,
        path: &str,
    ) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(path.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();
        lock.lock_owned().await
    }

    /// Remove the path's lock slot if it is currently unused. Called after
    /// a path is deleted.
    pub fn release_slot(
        &self,
        path: &str,
    ) {
        self.locks.remove_if(path, |_, lock| Arc::strong_count(lock) == 1);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }
}
