//! Activity statistics: per-kind counters and the daily visit streak.
//!
//! Days are calendar days in UTC.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::condition::Counters;
use crate::types::{AttributeState, InteractionKind};

/// Experience needed per level.
pub const EXPERIENCE_PER_LEVEL: u64 = 100;

/// Counters that [`AttributeState`] does not carry.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ActivityStats {
    /// Times petted.
    pub pet_count: u64,
    /// Times fed.
    pub feed_count: u64,
    /// Times played with.
    pub play_count: u64,
    /// Distinct days with at least one interaction.
    pub active_days: u64,
    /// Length of the current run of consecutive active days.
    pub consecutive_days: u64,
    /// The most recent active day.
    pub last_active_day: Option<NaiveDate>,
}

impl ActivityStats {
    /// Count one interaction of `kind` at `now` and advance the streak.
    ///
    /// Same day: streak unchanged. Next day: streak + 1. Any gap, or a day
    /// earlier than the last one: streak restarts at 1.
    pub fn record_interaction(&mut self, kind: InteractionKind, now: DateTime<Utc>) {
        let counter = match kind {
            InteractionKind::Pet => &mut self.pet_count,
            InteractionKind::Feed => &mut self.feed_count,
            InteractionKind::Play => &mut self.play_count,
        };
        *counter = counter.saturating_add(1);

        let today = now.date_naive();
        match self.last_active_day {
            Some(last) if last == today => return,
            Some(last) if last.succ_opt() == Some(today) => {
                self.consecutive_days = self.consecutive_days.saturating_add(1);
            }
            _ => self.consecutive_days = 1,
        }
        self.active_days = self.active_days.saturating_add(1);
        self.last_active_day = Some(today);
    }

    /// Times `kind` was used.
    #[must_use]
    pub fn count_of(&self, kind: InteractionKind) -> u64 {
        match kind {
            InteractionKind::Pet => self.pet_count,
            InteractionKind::Feed => self.feed_count,
            InteractionKind::Play => self.play_count,
        }
    }

    /// Condition-evaluator context combining these stats with `state`.
    #[must_use]
    pub fn counters(&self, state: &AttributeState, now: DateTime<Utc>) -> Counters {
        Counters {
            pet_count: self.pet_count,
            feed_count: self.feed_count,
            play_count: self.play_count,
            total_interactions: state.total_interactions,
            total_days: total_days(state, now),
            consecutive_days: self.consecutive_days,
            intimacy: state.affinity,
            level: level_for(state.experience),
        }
    }
}

/// Whole days since creation, counting the first day as day 1.
#[must_use]
pub fn total_days(state: &AttributeState, now: DateTime<Utc>) -> u64 {
    let days = (now.date_naive() - state.created_at.date_naive()).num_days();
    u64::try_from(days).unwrap_or(0) + 1
}

/// Level reached with `experience` points. Starts at 1.
#[must_use]
pub fn level_for(experience: u64) -> u64 {
    experience / EXPERIENCE_PER_LEVEL + 1
}
