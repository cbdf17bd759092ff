//! Persistence: the store contract, the stores, and the coordinator that
//! decides when to write.
//!
//! The live [`AttributeState`] is persisted as a single record. Writes are
//! expressed as an [`AttributePatch`]: only the fields present in the patch
//! are written, the rest of the stored record is left untouched.

pub mod coordinator;
pub mod sqlite;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::achievement::UnlockRecord;
use crate::activity::ActivityStats;
use crate::error::StorageError;
use crate::types::{AttributeState, InteractionKind};

pub use coordinator::{CoordinatorStats, PersistenceCoordinator};
pub use sqlite::SqliteStore;

/// Storage result.
pub type StoreResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// Store contracts
// ---------------------------------------------------------------------------

/// Storage for the singleton attribute record.
pub trait SnapshotStore: Send + Sync {
    /// Load the stored state, or `None` on first launch.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if the store cannot be read.
    fn load_snapshot(&self) -> StoreResult<Option<AttributeState>>;

    /// Insert the first-launch record. Returns `false` if one already exists.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if the store cannot be written.
    fn seed(&self, state: &AttributeState) -> StoreResult<bool>;

    /// Write the fields present in `patch`. Absent fields keep their stored
    /// values.
    ///
    /// # Errors
    /// Returns [`StorageError::NotSeeded`] if no record exists yet, or
    /// another [`StorageError`] if the write fails.
    fn write_snapshot(&self, patch: &AttributePatch) -> StoreResult<()>;
}

/// Storage for achievement unlocks and activity statistics.
pub trait ProgressStore: Send + Sync {
    /// All recorded unlocks.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if the store cannot be read.
    fn load_unlocks(&self) -> StoreResult<Vec<UnlockRecord>>;

    /// Record an unlock. Recording the same id twice keeps the first one.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if the store cannot be written.
    fn record_unlock(&self, unlock: &UnlockRecord) -> StoreResult<()>;

    /// Stored activity statistics, or `None` if never saved.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if the store cannot be read.
    fn load_activity(&self) -> StoreResult<Option<ActivityStats>>;

    /// Replace the stored activity statistics.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if the store cannot be written.
    fn save_activity(&self, stats: &ActivityStats) -> StoreResult<()>;

    /// Delete everything the store holds, the attribute record included.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if the store cannot be written.
    fn reset(&self) -> StoreResult<()>;
}

/// A store that holds everything a companion needs.
pub trait CompanionStore: SnapshotStore + ProgressStore {}

impl<T: SnapshotStore + ProgressStore> CompanionStore for T {}

// ---------------------------------------------------------------------------
// AttributePatch
// ---------------------------------------------------------------------------

/// A partial [`AttributeState`]: each field is either a new value or absent.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct AttributePatch {
    /// New mood.
    pub mood: Option<f64>,
    /// New energy.
    pub energy: Option<f64>,
    /// New affinity.
    pub affinity: Option<f64>,
    /// New currency.
    pub currency: Option<u64>,
    /// New experience.
    pub experience: Option<u64>,
    /// New interaction count.
    pub total_interactions: Option<u64>,
    /// New creation time.
    pub created_at: Option<DateTime<Utc>>,
    /// New last-interaction time.
    pub last_interaction_at: Option<DateTime<Utc>>,
    /// New decay clock.
    pub last_decay_applied_at: Option<DateTime<Utc>>,
    /// New per-kind interaction times.
    pub last_interaction_by_kind: Option<BTreeMap<InteractionKind, DateTime<Utc>>>,
}

impl AttributePatch {
    /// A patch carrying every field of `state`.
    #[must_use]
    pub fn from_state(state: &AttributeState) -> Self {
        Self {
            mood: Some(state.mood),
            energy: Some(state.energy),
            affinity: Some(state.affinity),
            currency: Some(state.currency),
            experience: Some(state.experience),
            total_interactions: Some(state.total_interactions),
            created_at: Some(state.created_at),
            last_interaction_at: Some(state.last_interaction_at),
            last_decay_applied_at: Some(state.last_decay_applied_at),
            last_interaction_by_kind: Some(state.last_interaction_by_kind.clone()),
        }
    }

    /// A patch carrying only the fields that differ between `old` and `new`.
    #[must_use]
    pub fn diff(old: &AttributeState, new: &AttributeState) -> Self {
        fn changed<T: PartialEq + Clone>(a: &T, b: &T) -> Option<T> {
            (a != b).then(|| b.clone())
        }

        Self {
            mood: changed(&old.mood, &new.mood),
            energy: changed(&old.energy, &new.energy),
            affinity: changed(&old.affinity, &new.affinity),
            currency: changed(&old.currency, &new.currency),
            experience: changed(&old.experience, &new.experience),
            total_interactions: changed(&old.total_interactions, &new.total_interactions),
            created_at: changed(&old.created_at, &new.created_at),
            last_interaction_at: changed(&old.last_interaction_at, &new.last_interaction_at),
            last_decay_applied_at: changed(&old.last_decay_applied_at, &new.last_decay_applied_at),
            last_interaction_by_kind: changed(
                &old.last_interaction_by_kind,
                &new.last_interaction_by_kind,
            ),
        }
    }

    /// Fold `later` into `self`. Fields present in `later` win.
    pub fn merge(&mut self, later: Self) {
        fn take<T>(slot: &mut Option<T>, value: Option<T>) {
            if value.is_some() {
                *slot = value;
            }
        }

        take(&mut self.mood, later.mood);
        take(&mut self.energy, later.energy);
        take(&mut self.affinity, later.affinity);
        take(&mut self.currency, later.currency);
        take(&mut self.experience, later.experience);
        take(&mut self.total_interactions, later.total_interactions);
        take(&mut self.created_at, later.created_at);
        take(&mut self.last_interaction_at, later.last_interaction_at);
        take(&mut self.last_decay_applied_at, later.last_decay_applied_at);
        take(&mut self.last_interaction_by_kind, later.last_interaction_by_kind);
    }

    /// Number of fields present.
    #[must_use]
    pub fn len(&self) -> usize {
        [
            self.mood.is_some(),
            self.energy.is_some(),
            self.affinity.is_some(),
            self.currency.is_some(),
            self.experience.is_some(),
            self.total_interactions.is_some(),
            self.created_at.is_some(),
            self.last_interaction_at.is_some(),
            self.last_decay_applied_at.is_some(),
            self.last_interaction_by_kind.is_some(),
        ]
        .into_iter()
        .filter(|present| *present)
        .count()
    }

    /// Whether no field is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Overwrite the fields of `state` that are present in the patch.
    pub fn apply_to(&self, state: &mut AttributeState) {
        if let Some(v) = self.mood {
            state.mood = v;
        }
        if let Some(v) = self.energy {
            state.energy = v;
        }
        if let Some(v) = self.affinity {
            state.affinity = v;
        }
        if let Some(v) = self.currency {
            state.currency = v;
        }
        if let Some(v) = self.experience {
            state.experience = v;
        }
        if let Some(v) = self.total_interactions {
            state.total_interactions = v;
        }
        if let Some(v) = self.created_at {
            state.created_at = v;
        }
        if let Some(v) = self.last_interaction_at {
            state.last_interaction_at = v;
        }
        if let Some(v) = self.last_decay_applied_at {
            state.last_decay_applied_at = v;
        }
        if let Some(v) = &self.last_interaction_by_kind {
            state.last_interaction_by_kind.clone_from(v);
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// In-process store. Useful for tests and for embedding without a database.
///
/// Writes can be made to fail on demand with [`MemoryStore::set_failing`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    state: Option<AttributeState>,
    unlocks: Vec<UnlockRecord>,
    activity: Option<ActivityStats>,
    writes: Vec<AttributePatch>,
    failing: bool,
}

impl MemoryStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A store already holding `state`.
    #[must_use]
    pub fn seeded(state: AttributeState) -> Self {
        let store = Self::new();
        store.inner.lock().state = Some(state);
        store
    }

    /// Make subsequent writes fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.inner.lock().failing = failing;
    }

    /// Every patch successfully written, oldest first.
    #[must_use]
    pub fn writes(&self) -> Vec<AttributePatch> {
        self.inner.lock().writes.clone()
    }

    /// Number of successful snapshot writes.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.inner.lock().writes.len()
    }

    /// The stored state.
    #[must_use]
    pub fn state(&self) -> Option<AttributeState> {
        self.inner.lock().state.clone()
    }

    fn check_available(inner: &MemoryInner) -> StoreResult<()> {
        if inner.failing {
            return Err(StorageError::Unavailable("write failure injected".to_string()));
        }
        Ok(())
    }
}

impl SnapshotStore for MemoryStore {
    fn load_snapshot(&self) -> StoreResult<Option<AttributeState>> {
        Ok(self.inner.lock().state.clone())
    }

    fn seed(&self, state: &AttributeState) -> StoreResult<bool> {
        let mut inner = self.inner.lock();
        Self::check_available(&inner)?;
        if inner.state.is_some() {
            return Ok(false);
        }
        inner.state = Some(state.clone());
        Ok(true)
    }

    fn write_snapshot(&self, patch: &AttributePatch) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        Self::check_available(&inner)?;
        let Some(state) = inner.state.as_mut() else {
            return Err(StorageError::NotSeeded);
        };
        patch.apply_to(state);
        inner.writes.push(patch.clone());
        Ok(())
    }
}

impl ProgressStore for MemoryStore {
    fn load_unlocks(&self) -> StoreResult<Vec<UnlockRecord>> {
        Ok(self.inner.lock().unlocks.clone())
    }

    fn record_unlock(&self, unlock: &UnlockRecord) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        Self::check_available(&inner)?;
        if !inner.unlocks.iter().any(|u| u.id == unlock.id) {
            inner.unlocks.push(unlock.clone());
        }
        Ok(())
    }

    fn load_activity(&self) -> StoreResult<Option<ActivityStats>> {
        Ok(self.inner.lock().activity.clone())
    }

    fn save_activity(&self, stats: &ActivityStats) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        Self::check_available(&inner)?;
        inner.activity = Some(stats.clone());
        Ok(())
    }

    fn reset(&self) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        Self::check_available(&inner)?;
        inner.state = None;
        inner.unlocks.clear();
        inner.activity = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn merge_later_fields_win() {
        let mut a = AttributePatch {
            mood: Some(10.0),
            energy: Some(20.0),
            ..AttributePatch::default()
        };
        let b = AttributePatch {
            energy: Some(99.0),
            currency: Some(5),
            ..AttributePatch::default()
        };
        a.merge(b);

        assert_eq!(a.mood, Some(10.0));
        assert_eq!(a.energy, Some(99.0));
        assert_eq!(a.currency, Some(5));
        assert_eq!(a.len(), 3);
    }

    #[test]
    fn diff_only_carries_changes() {
        let old = AttributeState::new(Utc::now());
        let mut new = old.clone();
        new.mood = 12.0;
        new.last_interaction_at = old.created_at + Duration::seconds(3);

        let patch = AttributePatch::diff(&old, &new);
        assert_eq!(patch.len(), 2);
        assert_eq!(patch.mood, Some(12.0));
        assert!(AttributePatch::diff(&old, &old).is_empty());
    }

    #[test]
    fn apply_to_leaves_absent_fields() {
        let mut state = AttributeState::new(Utc::now());
        let patch = AttributePatch {
            affinity: Some(55.0),
            ..AttributePatch::default()
        };
        patch.apply_to(&mut state);
        assert!((state.affinity - 55.0).abs() < 1e-9);
        assert!((state.mood - AttributeState::INITIAL_MOOD).abs() < 1e-9);
    }

    #[test]
    fn from_state_round_trips() {
        let mut state = AttributeState::new(Utc::now());
        state.currency = 7;
        state.last_interaction_by_kind.insert(InteractionKind::Play, state.created_at);

        let mut restored = AttributeState::new(Utc::now() + Duration::days(1));
        AttributePatch::from_state(&state).apply_to(&mut restored);
        assert_eq!(restored, state);
    }

    #[test]
    fn memory_store_requires_seed_and_injects_failures() {
        let store = MemoryStore::new();
        let patch = AttributePatch {
            mood: Some(1.0),
            ..AttributePatch::default()
        };
        assert!(matches!(store.write_snapshot(&patch), Err(StorageError::NotSeeded)));

        assert!(store.seed(&AttributeState::new(Utc::now())).expect("seed"));
        assert!(!store.seed(&AttributeState::new(Utc::now())).expect("seed again"));
        store.write_snapshot(&patch).expect("write");

        store.set_failing(true);
        assert!(matches!(store.write_snapshot(&patch), Err(StorageError::Unavailable(_))));
        assert_eq!(store.write_count(), 1);
    }

    #[test]
    fn memory_store_unlocks_are_one_way() {
        let store = MemoryStore::new();
        let t0 = Utc::now();
        let first = UnlockRecord {
            id: "first_pet".to_string(),
            unlocked_at: t0,
        };
        store.record_unlock(&first).expect("record");
        store
            .record_unlock(&UnlockRecord {
                unlocked_at: t0 + Duration::days(1),
                ..first.clone()
            })
            .expect("record again");
        assert_eq!(store.load_unlocks().expect("load"), vec![first]);
    }
}
