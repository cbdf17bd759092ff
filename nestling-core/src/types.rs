//! Core type definitions for the companion simulation.
//!
//! [`AttributeState`] is a plain value: cloning it is how callers receive
//! snapshots, and the engine is the only owner of the live copy.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Range enforcement
// ---------------------------------------------------------------------------

/// Lower bound of every bounded attribute.
pub const ATTRIBUTE_MIN: f64 = 0.0;
/// Upper bound of every bounded attribute.
pub const ATTRIBUTE_MAX: f64 = 100.0;

/// Clamp a bounded attribute into `[0, 100]`.
///
/// Every write to mood, energy, or affinity goes through here. NaN maps
/// to the lower bound.
#[must_use]
pub fn clamp_attribute(value: f64) -> f64 {
    if value.is_nan() {
        return ATTRIBUTE_MIN;
    }
    value.clamp(ATTRIBUTE_MIN, ATTRIBUTE_MAX)
}

// ---------------------------------------------------------------------------
// Interaction kinds
// ---------------------------------------------------------------------------

/// The closed set of interactions a user can perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    /// Stroke / pat the creature.
    Pet,
    /// Give the creature food.
    Feed,
    /// Play a game with the creature.
    Play,
}

impl InteractionKind {
    /// All kinds in tie-break priority order (pet > feed > play).
    pub const ALL: [Self; 3] = [Self::Pet, Self::Feed, Self::Play];

    /// Stable lowercase name, as used in config files and storage.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pet => "pet",
            Self::Feed => "feed",
            Self::Play => "play",
        }
    }
}

impl fmt::Display for InteractionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InteractionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pet" => Ok(Self::Pet),
            "feed" => Ok(Self::Feed),
            "play" => Ok(Self::Play),
            other => Err(format!("unknown interaction kind: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Presentation
// ---------------------------------------------------------------------------

/// Displayed emotion. Purely presentational; never feeds attribute math.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Emotion {
    /// Resting expression.
    #[default]
    Neutral,
    /// Content, smiling.
    Happy,
    /// Bouncing around.
    Excited,
    /// Downcast.
    Sad,
    /// Drowsy.
    Sleepy,
    /// Asking for food.
    Hungry,
    /// Busy thinking (e.g. while a reply is composed).
    Thinking,
}

/// Presentation-facing sub-record, disjoint from [`AttributeState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Presentation {
    /// Currently displayed emotion.
    pub emotion: Emotion,
}

// ---------------------------------------------------------------------------
// Attribute state
// ---------------------------------------------------------------------------

/// The creature's condition.
///
/// Bounded fields live in `[0, 100]`; counters only grow during play.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeState {
    /// Happiness, 0–100.
    pub mood: f64,
    /// Stamina, 0–100.
    pub energy: f64,
    /// Relationship strength ("intimacy"), 0–100. Drives the growth stage.
    pub affinity: f64,
    /// Coins earned.
    pub currency: u64,
    /// Experience points.
    pub experience: u64,
    /// Number of interactions ever dispatched.
    pub total_interactions: u64,
    /// When the creature was created. Never changes.
    pub created_at: DateTime<Utc>,
    /// Time of the most recent interaction of any kind.
    pub last_interaction_at: DateTime<Utc>,
    /// Time decay was last actually applied. Never moves backward.
    pub last_decay_applied_at: DateTime<Utc>,
    /// Time of the most recent interaction, per kind.
    #[serde(default)]
    pub last_interaction_by_kind: BTreeMap<InteractionKind, DateTime<Utc>>,
}

impl AttributeState {
    /// Mood of a freshly created creature.
    pub const INITIAL_MOOD: f64 = 80.0;
    /// Energy of a freshly created creature.
    pub const INITIAL_ENERGY: f64 = 80.0;
    /// Affinity of a freshly created creature.
    pub const INITIAL_AFFINITY: f64 = 0.0;

    /// First-launch defaults, with every timestamp set to `now`.
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            mood: Self::INITIAL_MOOD,
            energy: Self::INITIAL_ENERGY,
            affinity: Self::INITIAL_AFFINITY,
            currency: 0,
            experience: 0,
            total_interactions: 0,
            created_at: now,
            last_interaction_at: now,
            last_decay_applied_at: now,
            last_interaction_by_kind: BTreeMap::new(),
        }
    }

    /// When `kind` was last used, or `None` if it never was.
    #[must_use]
    pub fn last_interaction_of(&self, kind: InteractionKind) -> Option<DateTime<Utc>> {
        self.last_interaction_by_kind.get(&kind).copied()
    }

    /// Whether every bounded attribute is within range.
    #[must_use]
    pub fn is_in_range(&self) -> bool {
        [self.mood, self.energy, self.affinity]
            .iter()
            .all(|v| (ATTRIBUTE_MIN..=ATTRIBUTE_MAX).contains(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_bounds() {
        assert_eq!(clamp_attribute(-5.0), 0.0);
        assert_eq!(clamp_attribute(150.0), 100.0);
        assert_eq!(clamp_attribute(42.5), 42.5);
        assert_eq!(clamp_attribute(f64::NAN), 0.0);
        assert_eq!(clamp_attribute(f64::INFINITY), 100.0);
    }

    #[test]
    fn kind_parsing() {
        assert_eq!("Pet".parse::<InteractionKind>(), Ok(InteractionKind::Pet));
        assert_eq!(" feed ".parse::<InteractionKind>(), Ok(InteractionKind::Feed));
        assert!("bathe".parse::<InteractionKind>().is_err());
        assert_eq!(InteractionKind::Play.to_string(), "play");
    }

    #[test]
    fn fresh_state_is_in_range() {
        let now = Utc::now();
        let state = AttributeState::new(now);
        assert!(state.is_in_range());
        assert_eq!(state.created_at, now);
        assert_eq!(state.last_decay_applied_at, now);
        assert_eq!(state.last_interaction_of(InteractionKind::Feed), None);
    }

    #[test]
    fn per_kind_timestamps() {
        let now = Utc::now();
        let mut state = AttributeState::new(now);
        let later = now + chrono::Duration::seconds(30);
        state.last_interaction_by_kind.insert(InteractionKind::Pet, later);
        assert_eq!(state.last_interaction_of(InteractionKind::Pet), Some(later));
        assert_eq!(state.last_interaction_of(InteractionKind::Play), None);
    }
}
