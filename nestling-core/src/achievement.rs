//! Achievement Book: a fixed catalog of goals unlocked by [`Condition`]s.
//!
//! Conditions are parsed once when the book is built; malformed ones are
//! reported then and simply never unlock. Unlocking is one-way: a record
//! that is unlocked stays unlocked with its original timestamp.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::condition::{Condition, Counters};
use crate::error::NestlingError;

/// Broad grouping for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AchievementCategory {
    /// Counting interactions.
    Interaction,
    /// Daily streaks and time spent together.
    Streak,
    /// Reaching an affinity level.
    Affinity,
    /// Long-term milestones.
    Milestone,
}

/// A catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AchievementDefinition {
    /// Stable identifier, unique within the catalog.
    pub id: String,
    /// Display grouping.
    pub category: AchievementCategory,
    /// Display name.
    pub name: String,
    /// Display description.
    pub description: String,
    /// Unlock rule in the condition language.
    pub unlock_condition: String,
}

impl AchievementDefinition {
    fn new(
        id: &str,
        category: AchievementCategory,
        name: &str,
        description: &str,
        unlock_condition: &str,
    ) -> Self {
        Self {
            id: id.to_string(),
            category,
            name: name.to_string(),
            description: description.to_string(),
            unlock_condition: unlock_condition.to_string(),
        }
    }
}

/// The stock catalog.
#[must_use]
pub fn default_catalog() -> Vec<AchievementDefinition> {
    use AchievementCategory::{Affinity, Interaction, Milestone, Streak};

    vec![
        AchievementDefinition::new(
            "first_pet",
            Interaction,
            "First Touch",
            "Pet your companion for the first time",
            "pet_count >= 1",
        ),
        AchievementDefinition::new(
            "first_feed",
            Interaction,
            "First Meal",
            "Feed your companion for the first time",
            "feed_count >= 1",
        ),
        AchievementDefinition::new(
            "first_play",
            Interaction,
            "Playtime",
            "Play with your companion for the first time",
            "play_count >= 1",
        ),
        AchievementDefinition::new(
            "interactions_10",
            Interaction,
            "Getting Acquainted",
            "Interact 10 times",
            "total_interactions >= 10",
        ),
        AchievementDefinition::new(
            "interactions_100",
            Interaction,
            "Inseparable",
            "Interact 100 times",
            "total_interactions >= 100",
        ),
        AchievementDefinition::new(
            "streak_3",
            Streak,
            "Regular Visitor",
            "Visit 3 days in a row",
            "consecutive_days >= 3",
        ),
        AchievementDefinition::new(
            "streak_7",
            Streak,
            "Weekly Ritual",
            "Visit 7 days in a row",
            "consecutive_days >= 7",
        ),
        AchievementDefinition::new(
            "affinity_friend",
            Affinity,
            "Friends",
            "Reach 30 affinity",
            "intimacy >= 30",
        ),
        AchievementDefinition::new(
            "affinity_soulmate",
            Affinity,
            "Soulmates",
            "Reach 90 affinity",
            "intimacy >= 90",
        ),
        AchievementDefinition::new(
            "veteran",
            Milestone,
            "Old Friends",
            "Spend 30 days together",
            "total_days >= 30",
        ),
    ]
}

/// A persisted unlock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockRecord {
    /// Achievement id.
    pub id: String,
    /// When it was unlocked.
    pub unlocked_at: DateTime<Utc>,
}

/// A catalog entry together with its unlock status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AchievementRecord {
    /// The definition.
    pub definition: AchievementDefinition,
    /// Whether it has been unlocked.
    pub is_unlocked: bool,
    /// When it was unlocked.
    pub unlocked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
struct Entry {
    record: AchievementRecord,
    condition: Condition,
}

/// The catalog with unlock state.
#[derive(Debug, Clone)]
pub struct AchievementBook {
    entries: Vec<Entry>,
}

impl AchievementBook {
    /// Build a book from `catalog`, parsing every unlock condition.
    ///
    /// # Errors
    /// Returns `NestlingError::Config` on a duplicate id.
    pub fn new(catalog: Vec<AchievementDefinition>) -> crate::error::Result<Self> {
        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(catalog.len());

        for definition in catalog {
            if !seen.insert(definition.id.clone()) {
                return Err(NestlingError::Config(format!(
                    "duplicate achievement id: {}",
                    definition.id
                )));
            }
            let condition = Condition::parse(&definition.unlock_condition);
            for problem in condition.problems() {
                warn!(
                    achievement = %definition.id,
                    condition = %definition.unlock_condition,
                    problem = %problem,
                    "Malformed unlock condition; achievement can never unlock"
                );
            }
            entries.push(Entry {
                record: AchievementRecord {
                    definition,
                    is_unlocked: false,
                    unlocked_at: None,
                },
                condition,
            });
        }

        Ok(Self { entries })
    }

    /// Mark previously persisted unlocks. Unknown ids are ignored.
    pub fn restore(&mut self, unlocks: &[UnlockRecord]) {
        for unlock in unlocks {
            match self.entries.iter_mut().find(|e| e.record.definition.id == unlock.id) {
                Some(entry) if !entry.record.is_unlocked => {
                    entry.record.is_unlocked = true;
                    entry.record.unlocked_at = Some(unlock.unlocked_at);
                }
                Some(_) => {}
                None => debug!(achievement = %unlock.id, "Ignoring unlock for unknown achievement"),
            }
        }
    }

    /// Evaluate every locked achievement and unlock those whose condition
    /// holds. Returns only the newly unlocked records.
    pub fn check(&mut self, counters: &Counters, now: DateTime<Utc>) -> Vec<AchievementRecord> {
        let mut unlocked = Vec::new();
        for entry in &mut self.entries {
            if entry.record.is_unlocked || !entry.condition.evaluate(counters) {
                continue;
            }
            entry.record.is_unlocked = true;
            entry.record.unlocked_at = Some(now);
            info!(achievement = %entry.record.definition.id, "Achievement unlocked");
            unlocked.push(entry.record.clone());
        }
        unlocked
    }

    /// Clear every unlock.
    pub fn reset(&mut self) {
        for entry in &mut self.entries {
            entry.record.is_unlocked = false;
            entry.record.unlocked_at = None;
        }
    }

    /// All records, in catalog order.
    pub fn records(&self) -> impl Iterator<Item = &AchievementRecord> {
        self.entries.iter().map(|e| &e.record)
    }

    /// Look up one record.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&AchievementRecord> {
        self.records().find(|r| r.definition.id == id)
    }

    /// Number of unlocked achievements.
    #[must_use]
    pub fn unlocked_count(&self) -> usize {
        self.records().filter(|r| r.is_unlocked).count()
    }
}
