//! `CompanionService`: the composition root and the request surface the
//! interaction UI talks to.
//!
//! Wiring, on open:
//!
//! ```text
//!   store ──load──▶ AttributeState ──▶ Engine ──listener──▶ PersistenceCoordinator ──▶ store
//!     │                                  │
//!     ├──load──▶ unlocks ──▶ AchievementBook ◀── counters ◀── ActivityStats
//!     └──load──▶ ActivityStats
//! ```
//!
//! Attribute changes reach the store through the debounced coordinator.
//! Changes that cross into a higher stage, affinity overrides and resets
//! are written immediately. Activity stats and achievement unlocks are
//! small and written as they happen.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use nestling_core::achievement::{AchievementBook, AchievementRecord, UnlockRecord};
use nestling_core::activity::{ActivityStats, level_for};
use nestling_core::clock::{Clock, SystemClock};
use nestling_core::config::NestlingConfig;
use nestling_core::cooldown;
use nestling_core::persistence::{
    AttributePatch, CompanionStore, PersistenceCoordinator, SnapshotStore, SqliteStore,
};
use nestling_core::stage::{StageProgress, StageTable, StageUpgrade};
use nestling_core::transition::ChangeRecord;
use nestling_core::{
    AttributeState, Emotion, Engine, Event, InteractionKind, Presentation, Rules, Transition,
};

/// Result of an interaction request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InteractionOutcome {
    /// `false` when the kind was cooling down and nothing happened.
    pub accepted: bool,
    /// State after the request.
    pub state: AttributeState,
    /// What changed (all zero when rejected).
    pub effects: ChangeRecord,
    /// Seconds until this kind can be used again.
    pub remaining_cooldown_secs: u64,
    /// Set when affinity crossed into a higher stage.
    pub stage_upgrade: Option<StageUpgrade>,
    /// Achievements unlocked by this interaction.
    pub unlocked: Vec<AchievementRecord>,
}

/// Result of an administrative affinity override.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AffinityOutcome {
    /// The dispatched change.
    pub transition: Transition,
    /// Set when the override crossed into a higher stage.
    pub stage_upgrade: Option<StageUpgrade>,
    /// Achievements unlocked by the override.
    pub unlocked: Vec<AchievementRecord>,
}

/// Everything the UI shows at a glance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompanionStatus {
    /// Current attributes.
    pub state: AttributeState,
    /// Current presentation.
    pub presentation: Presentation,
    /// Growth stage and progress.
    pub stage: StageProgress,
    /// Experience level.
    pub level: u64,
    /// Remaining cooldown per kind, in seconds.
    pub cooldowns: BTreeMap<InteractionKind, u64>,
    /// Activity counters and streak.
    pub activity: ActivityStats,
    /// Unlocked achievements.
    pub achievements_unlocked: usize,
    /// Achievements in the catalog.
    pub achievements_total: usize,
}

/// The running companion.
pub struct CompanionService<S: CompanionStore + 'static> {
    engine: Engine,
    store: Arc<S>,
    coordinator: Arc<PersistenceCoordinator>,
    stages: StageTable,
    achievements: AchievementBook,
    activity: ActivityStats,
}

impl<S: CompanionStore + 'static> std::fmt::Debug for CompanionService<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompanionService")
            .field("engine", &self.engine)
            .field("coordinator", &self.coordinator)
            .field("activity", &self.activity)
            .finish_non_exhaustive()
    }
}

impl CompanionService<SqliteStore> {
    /// Open the SQLite database named in `config` and start the companion
    /// on the system clock.
    ///
    /// # Errors
    /// Fails on invalid configuration, an unreadable database, or when called
    /// outside a tokio runtime.
    pub fn open(config: &NestlingConfig) -> anyhow::Result<Self> {
        config.validate().context("invalid configuration")?;
        let store = SqliteStore::open(&config.persistence.db_path, &config.persistence)
            .with_context(|| format!("opening {}", config.persistence.db_path))?;
        Self::with_store(config, Arc::new(store), Arc::new(SystemClock))
    }
}

impl<S: CompanionStore + 'static> CompanionService<S> {
    /// Start the companion on an already-open store.
    ///
    /// Loads the stored state (seeding a fresh creature on first launch),
    /// restores unlocks and activity, and wires persistence.
    ///
    /// # Errors
    /// Fails on invalid configuration, store read errors, or when called
    /// outside a tokio runtime.
    pub fn with_store(
        config: &NestlingConfig,
        store: Arc<S>,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<Self> {
        config.validate().context("invalid configuration")?;
        let stages = StageTable::new(config.stages.bands.clone())?;
        let mut achievements = AchievementBook::new(config.achievements.clone())?;

        let state = if let Some(state) = store.load_snapshot().context("loading companion state")? {
            info!(
                total_interactions = state.total_interactions,
                affinity = state.affinity,
                "Resuming companion"
            );
            state
        } else {
            let state = AttributeState::new(clock.now());
            store.seed(&state).context("seeding companion state")?;
            info!("First launch; new companion created");
            state
        };

        achievements.restore(&store.load_unlocks().context("loading unlocks")?);
        let activity = store
            .load_activity()
            .context("loading activity stats")?
            .unwrap_or_default();

        let snapshot_store: Arc<dyn SnapshotStore> = Arc::clone(&store) as Arc<dyn SnapshotStore>;
        let coordinator = Arc::new(PersistenceCoordinator::new(
            snapshot_store,
            config.persistence.debounce(),
        )?);

        let engine = Engine::new(state, Rules::from(config), clock);
        let sink = Arc::clone(&coordinator);
        engine.subscribe(move |old, new, _event| {
            let patch = AttributePatch::diff(old, new);
            if !patch.is_empty() {
                sink.schedule(patch);
            }
        });

        Ok(Self {
            engine,
            store,
            coordinator,
            stages,
            achievements,
            activity,
        })
    }

    // ------------------------------------------------------------------
    // Requests
    // ------------------------------------------------------------------

    /// Perform an interaction if it is not cooling down.
    pub fn interact(&mut self, kind: InteractionKind) -> InteractionOutcome {
        let now = self.engine.now();
        let table = &self.engine.rules().interactions;
        let remaining = cooldown::remaining_for(self.engine.state(), kind, now, table);

        if remaining > 0 {
            debug!(kind = %kind, remaining_secs = remaining, "Interaction rejected; cooling down");
            return InteractionOutcome {
                accepted: false,
                state: self.engine.snapshot(),
                effects: ChangeRecord::default(),
                remaining_cooldown_secs: remaining,
                stage_upgrade: None,
                unlocked: Vec::new(),
            };
        }

        let transition = self.engine.dispatch(Event::interact(kind));
        self.activity.record_interaction(kind, transition.at);
        if let Err(e) = self.store.save_activity(&self.activity) {
            warn!(error = %e, "Failed to save activity stats");
        }

        let stage_upgrade = self.detect_upgrade(&transition);
        if stage_upgrade.is_some() {
            if let Err(e) = self.coordinator.flush_now(AttributePatch::default()) {
                warn!(error = %e, "Immediate write after stage upgrade failed; kept pending");
            }
        }
        let unlocked = self.check_achievements(&transition.new, transition.at);
        let remaining_cooldown_secs = cooldown::remaining_for(
            &transition.new,
            kind,
            transition.at,
            &self.engine.rules().interactions,
        );

        InteractionOutcome {
            accepted: true,
            state: transition.new,
            effects: transition.change,
            remaining_cooldown_secs,
            stage_upgrade,
            unlocked,
        }
    }

    /// Apply time-based decay up to now.
    pub fn tick(&mut self) -> Transition {
        self.engine.dispatch(Event::ApplyDecay)
    }

    /// Change the displayed emotion.
    pub fn set_emotion(&mut self, emotion: Emotion) -> Presentation {
        self.engine.dispatch(Event::UpdateEmotion { emotion }).presentation
    }

    /// Administrative affinity override, written to the store immediately.
    ///
    /// # Errors
    /// Returns the store error if the write fails; the change stays pending.
    pub fn set_affinity(&mut self, value: f64) -> nestling_core::error::Result<AffinityOutcome> {
        let transition = self.engine.dispatch(Event::SetAffinity { value });
        let stage_upgrade = self.detect_upgrade(&transition);
        let unlocked = self.check_achievements(&transition.new, transition.at);
        self.coordinator.flush_now(AttributePatch::default())?;
        Ok(AffinityOutcome {
            transition,
            stage_upgrade,
            unlocked,
        })
    }

    /// Grant coins and experience.
    pub fn reward(&mut self, currency: u64, experience: u64) -> Transition {
        let transition = self.engine.dispatch(Event::Reward {
            currency,
            experience,
        });
        self.check_achievements(&transition.new, transition.at);
        transition
    }

    /// Current state, stage, cooldowns and progress.
    #[must_use]
    pub fn status(&self) -> CompanionStatus {
        let state = self.engine.snapshot();
        let now = self.engine.now();
        CompanionStatus {
            presentation: self.engine.presentation(),
            stage: self.stages.stage_for(state.affinity),
            level: level_for(state.experience),
            cooldowns: cooldown::all_remaining(&state, now, &self.engine.rules().interactions),
            activity: self.activity.clone(),
            achievements_unlocked: self.achievements.unlocked_count(),
            achievements_total: self.achievements.records().count(),
            state,
        }
    }

    /// The most useful interaction available right now.
    #[must_use]
    pub fn recommend(&self) -> Option<InteractionKind> {
        cooldown::recommend(
            self.engine.state(),
            self.engine.now(),
            &self.engine.rules().interactions,
        )
    }

    /// The achievement catalog with unlock status.
    #[must_use]
    pub fn achievements(&self) -> Vec<AchievementRecord> {
        self.achievements.records().cloned().collect()
    }

    /// Explicit user data reset: wipe the store and start a new creature.
    ///
    /// The store is wiped and reseeded first; the in-memory creature,
    /// unlocks and activity are only replaced once that succeeded.
    ///
    /// # Errors
    /// Returns the store error if wiping or reseeding fails. The running
    /// creature is left as it was.
    pub fn reset(&mut self) -> nestling_core::error::Result<AttributeState> {
        let fresh = AttributeState::new(self.engine.now());
        self.store.reset()?;
        self.store.seed(&fresh)?;

        self.engine.reset_to(fresh.clone());
        self.achievements.reset();
        self.activity = ActivityStats::default();
        // A full patch supersedes anything still pending from the old creature.
        self.coordinator.flush_now(AttributePatch::from_state(&fresh))?;
        info!("Companion data reset");
        Ok(fresh)
    }

    /// Flush pending changes and activity stats.
    ///
    /// The service stays usable; later changes are persisted as usual and
    /// flushed again when the service is dropped.
    ///
    /// # Errors
    /// Returns the store error if the final write fails.
    pub fn shutdown(&mut self) -> nestling_core::error::Result<()> {
        self.store.save_activity(&self.activity)?;
        self.coordinator.shutdown()?;
        info!(stats = ?self.coordinator.stats(), "Companion shut down");
        Ok(())
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The persistence coordinator.
    #[must_use]
    pub fn coordinator(&self) -> &PersistenceCoordinator {
        &self.coordinator
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn detect_upgrade(&self, transition: &Transition) -> Option<StageUpgrade> {
        let upgrade = self
            .stages
            .detect_upgrade(transition.old.affinity, transition.new.affinity)?;
        info!(
            from = %upgrade.from.stage.id,
            to = %upgrade.to.stage.id,
            affinity = transition.new.affinity,
            "Stage upgrade"
        );
        Some(upgrade)
    }

    fn check_achievements(
        &mut self,
        state: &AttributeState,
        now: DateTime<Utc>,
    ) -> Vec<AchievementRecord> {
        let counters = self.activity.counters(state, now);
        let unlocked = self.achievements.check(&counters, now);
        for record in &unlocked {
            let unlock = UnlockRecord {
                id: record.definition.id.clone(),
                unlocked_at: now,
            };
            if let Err(e) = self.store.record_unlock(&unlock) {
                warn!(error = %e, achievement = %unlock.id, "Failed to save unlock");
            }
        }
        unlocked
    }
}
