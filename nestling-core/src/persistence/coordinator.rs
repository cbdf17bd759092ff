//! Persistence Coordinator: debounced and immediate writes of attribute
//! changes.
//!
//! Two paths into the store:
//!
//! - [`schedule`](PersistenceCoordinator::schedule) merges changes into a
//!   pending patch and (re)arms a timer. The write happens once the quiet
//!   interval passes with no further scheduling.
//! - [`flush_now`](PersistenceCoordinator::flush_now) cancels the timer and
//!   writes pending plus new changes right away.
//!
//! Each arming bumps a generation number. A timer that wakes up with a stale
//! generation does nothing, so an immediate flush always wins over a timer
//! that was already firing. Debounced writes run on the blocking pool so a
//! slow store never stalls a runtime worker. Writes happen with the
//! coordinator lock held, which serialises them. A failed write puts the patch back into pending;
//! nothing is dropped until a write succeeds.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::error::{NestlingError, Result};
use crate::persistence::{AttributePatch, SnapshotStore};

/// Counters describing coordinator activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CoordinatorStats {
    /// Calls to `schedule`.
    pub scheduled: u64,
    /// Successful writes.
    pub writes: u64,
    /// Writes the store rejected.
    pub failed_writes: u64,
    /// Armed timers cancelled before firing.
    pub cancelled_timers: u64,
}

struct CoordinatorInner {
    pending: AttributePatch,
    generation: u64,
    timer: Option<JoinHandle<()>>,
    stats: CoordinatorStats,
}

/// Decides when attribute changes reach the [`SnapshotStore`].
pub struct PersistenceCoordinator {
    inner: Arc<Mutex<CoordinatorInner>>,
    store: Arc<dyn SnapshotStore>,
    debounce: Duration,
    runtime: Handle,
}

impl std::fmt::Debug for PersistenceCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceCoordinator")
            .field("debounce", &self.debounce)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl PersistenceCoordinator {
    /// Create a coordinator writing to `store` after `debounce` of quiet.
    ///
    /// Must be called from within a tokio runtime; timers are spawned on it.
    ///
    /// # Errors
    /// Returns `NestlingError::Runtime` outside a tokio runtime.
    pub fn new(store: Arc<dyn SnapshotStore>, debounce: Duration) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| NestlingError::Runtime(e.to_string()))?;
        Ok(Self {
            inner: Arc::new(Mutex::new(CoordinatorInner {
                pending: AttributePatch::default(),
                generation: 0,
                timer: None,
                stats: CoordinatorStats::default(),
            })),
            store,
            debounce,
            runtime,
        })
    }

    /// Merge `changes` into pending and restart the quiet-interval timer.
    pub fn schedule(&self, changes: AttributePatch) {
        let mut inner = self.inner.lock();
        inner.stats.scheduled += 1;
        inner.pending.merge(changes);
        Self::cancel_timer(&mut inner);

        let generation = inner.generation;
        let shared = Arc::clone(&self.inner);
        let store = Arc::clone(&self.store);
        let debounce = self.debounce;

        inner.timer = Some(self.runtime.spawn(async move {
            tokio::time::sleep(debounce).await;
            let write = tokio::task::spawn_blocking(move || {
                Self::fire(&shared, store.as_ref(), generation);
            });
            if let Err(e) = write.await {
                error!(error = %e, "Debounced write task failed");
            }
        }));
        debug!(pending = inner.pending.len(), "Debounced write scheduled");
    }

    /// Cancel any armed timer and write pending merged with `changes` now.
    ///
    /// # Errors
    /// Returns the store's error. The merged changes stay pending.
    pub fn flush_now(&self, changes: AttributePatch) -> Result<()> {
        let mut inner = self.inner.lock();
        Self::cancel_timer(&mut inner);
        inner.pending.merge(changes);

        if inner.pending.is_empty() {
            return Ok(());
        }
        let patch = std::mem::take(&mut inner.pending);
        match self.store.write_snapshot(&patch) {
            Ok(()) => {
                inner.stats.writes += 1;
                debug!(fields = patch.len(), "Immediate write completed");
                Ok(())
            }
            Err(e) => {
                inner.stats.failed_writes += 1;
                warn!(
                    error = %e,
                    fields = patch.len(),
                    "Immediate write failed; changes kept pending"
                );
                inner.pending = patch;
                Err(e.into())
            }
        }
    }

    /// Final immediate flush of whatever is pending.
    ///
    /// # Errors
    /// Returns the store's error if the final write fails.
    pub fn shutdown(&self) -> Result<()> {
        self.flush_now(AttributePatch::default())
    }

    /// Whether unwritten changes exist.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.inner.lock().pending.is_empty()
    }

    /// Snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> CoordinatorStats {
        self.inner.lock().stats
    }

    /// Configured quiet interval.
    #[must_use]
    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    fn cancel_timer(inner: &mut CoordinatorInner) {
        inner.generation += 1;
        if let Some(timer) = inner.timer.take() {
            if !timer.is_finished() {
                timer.abort();
                inner.stats.cancelled_timers += 1;
            }
        }
    }

    fn fire(shared: &Mutex<CoordinatorInner>, store: &dyn SnapshotStore, generation: u64) {
        let mut inner = shared.lock();
        if inner.generation != generation {
            return;
        }
        inner.timer = None;
        if inner.pending.is_empty() {
            return;
        }

        let patch = std::mem::take(&mut inner.pending);
        match store.write_snapshot(&patch) {
            Ok(()) => {
                inner.stats.writes += 1;
                debug!(fields = patch.len(), "Debounced write completed");
            }
            Err(e) => {
                inner.stats.failed_writes += 1;
                error!(
                    error = %e,
                    fields = patch.len(),
                    "Debounced write failed; changes kept pending"
                );
                inner.pending = patch;
            }
        }
    }
}

impl Drop for PersistenceCoordinator {
    fn drop(&mut self) {
        if !self.has_pending() {
            let mut inner = self.inner.lock();
            Self::cancel_timer(&mut inner);
            return;
        }
        if let Err(e) = self.shutdown() {
            error!(error = %e, "Final write on drop failed; pending changes lost");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStore;
    use crate::types::AttributeState;
    use chrono::Utc;

    const QUIET: Duration = Duration::from_secs(5);

    fn setup() -> (Arc<MemoryStore>, PersistenceCoordinator) {
        let store = Arc::new(MemoryStore::seeded(AttributeState::new(Utc::now())));
        let coordinator =
            PersistenceCoordinator::new(Arc::clone(&store) as Arc<dyn SnapshotStore>, QUIET)
                .expect("inside runtime");
        (store, coordinator)
    }

    fn mood(v: f64) -> AttributePatch {
        AttributePatch {
            mood: Some(v),
            ..AttributePatch::default()
        }
    }

    fn energy(v: f64) -> AttributePatch {
        AttributePatch {
            energy: Some(v),
            ..AttributePatch::default()
        }
    }

    #[test]
    fn new_outside_runtime_fails() {
        let store: Arc<dyn SnapshotStore> = Arc::new(MemoryStore::new());
        assert!(matches!(
            PersistenceCoordinator::new(store, QUIET),
            Err(NestlingError::Runtime(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn debounced_write_waits_for_quiet() {
        let (store, coordinator) = setup();
        coordinator.schedule(mood(10.0));

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(store.write_count(), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(store.write_count(), 1);
        assert!(!coordinator.has_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_scheduling_coalesces() {
        let (store, coordinator) = setup();
        for i in 0..5 {
            coordinator.schedule(mood(f64::from(i)));
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        coordinator.schedule(energy(3.0));

        tokio::time::sleep(Duration::from_secs(10)).await;
        let writes = store.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].mood, Some(4.0));
        assert_eq!(writes[0].energy, Some(3.0));
        assert_eq!(coordinator.stats().cancelled_timers, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_flush_cancels_debounced_write() {
        let (store, coordinator) = setup();
        coordinator.schedule(mood(11.0));
        tokio::time::sleep(Duration::from_secs(1)).await;

        coordinator.flush_now(energy(22.0)).expect("flush");
        assert_eq!(store.write_count(), 1);

        tokio::time::sleep(Duration::from_secs(30)).await;
        let writes = store.writes();
        assert_eq!(writes.len(), 1, "no later write of the scheduled changes");
        assert_eq!(writes[0].mood, Some(11.0));
        assert_eq!(writes[0].energy, Some(22.0));

        let stats = coordinator.stats();
        assert_eq!(stats.cancelled_timers, 1);
        assert_eq!(stats.writes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_write_keeps_changes_for_retry() {
        let (store, coordinator) = setup();
        store.set_failing(true);

        assert!(coordinator.flush_now(mood(5.0)).is_err());
        assert!(coordinator.has_pending());

        coordinator.schedule(energy(6.0));
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(coordinator.has_pending());
        assert_eq!(coordinator.stats().failed_writes, 2);

        store.set_failing(false);
        coordinator.shutdown().expect("shutdown");
        let writes = store.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].mood, Some(5.0));
        assert_eq!(writes[0].energy, Some(6.0));

        let state = store.state().expect("seeded");
        assert!((state.mood - 5.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_flush_does_not_write() {
        let (store, coordinator) = setup();
        coordinator.flush_now(AttributePatch::default()).expect("flush");
        coordinator.shutdown().expect("shutdown");
        assert_eq!(store.write_count(), 0);
    }

    struct ThreadRecordingStore {
        inner: MemoryStore,
        writers: Mutex<Vec<std::thread::ThreadId>>,
    }

    impl SnapshotStore for ThreadRecordingStore {
        fn load_snapshot(&self) -> crate::persistence::StoreResult<Option<AttributeState>> {
            self.inner.load_snapshot()
        }

        fn seed(&self, state: &AttributeState) -> crate::persistence::StoreResult<bool> {
            self.inner.seed(state)
        }

        fn write_snapshot(&self, patch: &AttributePatch) -> crate::persistence::StoreResult<()> {
            self.writers.lock().push(std::thread::current().id());
            self.inner.write_snapshot(patch)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn debounced_write_runs_off_the_runtime_thread() {
        let store = Arc::new(ThreadRecordingStore {
            inner: MemoryStore::seeded(AttributeState::new(Utc::now())),
            writers: Mutex::new(Vec::new()),
        });
        let coordinator =
            PersistenceCoordinator::new(Arc::clone(&store) as Arc<dyn SnapshotStore>, QUIET)
                .expect("inside runtime");

        coordinator.schedule(mood(12.0));
        tokio::time::sleep(Duration::from_secs(6)).await;

        let writers = store.writers.lock().clone();
        assert_eq!(writers.len(), 1);
        assert_ne!(writers[0], std::thread::current().id());
        assert_eq!(store.inner.write_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn drop_flushes_pending() {
        let (store, coordinator) = setup();
        coordinator.schedule(mood(42.0));
        drop(coordinator);
        assert_eq!(store.write_count(), 1);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(store.write_count(), 1);
    }
}
