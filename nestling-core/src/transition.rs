//! Transition Engine: the pure reducer behind [`Engine`](crate::engine::Engine).
//!
//! `reduce` maps `(state, event, now)` to a new state and a change record.
//! It is total: every event has an outcome, nothing is rejected, and all
//! range enforcement goes through [`clamp_attribute`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{DecayConfig, InteractionTable, NestlingConfig};
use crate::decay;
use crate::types::{AttributeState, Emotion, InteractionKind, Presentation, clamp_attribute};

/// Something that happened to the creature.
///
/// Events arriving from outside are JSON objects tagged by `type`. A tag
/// this build does not know decodes to [`Event::Unsupported`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// The user interacted with the creature.
    Interact {
        /// Which interaction.
        kind: InteractionKind,
    },
    /// Apply time-based decay up to now.
    ApplyDecay,
    /// Change the displayed emotion. Touches presentation only.
    UpdateEmotion {
        /// New emotion.
        emotion: Emotion,
    },
    /// Administrative override of affinity.
    SetAffinity {
        /// Requested value; clamped.
        value: f64,
    },
    /// Grant coins and experience.
    Reward {
        /// Coins to add.
        #[serde(default)]
        currency: u64,
        /// Experience to add.
        #[serde(default)]
        experience: u64,
    },
    /// An event this build does not understand.
    #[serde(other)]
    Unsupported,
}

impl Event {
    /// Shorthand for `Event::Interact { kind }`.
    #[must_use]
    pub fn interact(kind: InteractionKind) -> Self {
        Self::Interact { kind }
    }

    /// Decode an event from JSON. Anything undecodable becomes
    /// [`Event::Unsupported`] instead of an error.
    #[must_use]
    pub fn from_json(json: &str) -> Self {
        serde_json::from_str(json).unwrap_or_else(|e| {
            warn!(error = %e, "Undecodable event treated as unsupported");
            Self::Unsupported
        })
    }

    /// Short name for logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Interact { .. } => "interact",
            Self::ApplyDecay => "apply_decay",
            Self::UpdateEmotion { .. } => "update_emotion",
            Self::SetAffinity { .. } => "set_affinity",
            Self::Reward { .. } => "reward",
            Self::Unsupported => "unsupported",
        }
    }
}

/// The tuning `reduce` needs.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Rules {
    /// Interaction effects and cooldowns.
    pub interactions: InteractionTable,
    /// Decay rates and caps.
    pub decay: DecayConfig,
}

impl From<&NestlingConfig> for Rules {
    fn from(config: &NestlingConfig) -> Self {
        Self {
            interactions: config.interactions.clone(),
            decay: config.decay,
        }
    }
}

/// What an event changed.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ChangeRecord {
    /// Mood after minus mood before.
    pub mood_delta: f64,
    /// Energy after minus energy before.
    pub energy_delta: f64,
    /// Affinity after minus affinity before.
    pub affinity_delta: f64,
    /// Experience gained.
    pub experience_gained: u64,
    /// Coins gained.
    pub currency_gained: u64,
    /// Whether decay ran (and advanced the decay clock).
    pub decay_applied: bool,
    /// Whether the displayed emotion changed.
    pub emotion_changed: bool,
    /// `false` only for unsupported events.
    pub handled: bool,
}

impl ChangeRecord {
    fn between(
        before: &AttributeState,
        after: &AttributeState,
        old_presentation: Presentation,
        new_presentation: Presentation,
    ) -> Self {
        Self {
            mood_delta: after.mood - before.mood,
            energy_delta: after.energy - before.energy,
            affinity_delta: after.affinity - before.affinity,
            experience_gained: after.experience.saturating_sub(before.experience),
            currency_gained: after.currency.saturating_sub(before.currency),
            decay_applied: after.last_decay_applied_at != before.last_decay_applied_at,
            emotion_changed: old_presentation != new_presentation,
            handled: true,
        }
    }
}

/// Output of [`reduce`].
#[derive(Debug, Clone, PartialEq)]
pub struct Reduction {
    /// New attribute state.
    pub state: AttributeState,
    /// New presentation record.
    pub presentation: Presentation,
    /// Summary of the change.
    pub change: ChangeRecord,
}

/// Apply `event` to `state` at time `now`.
#[must_use]
pub fn reduce(
    state: &AttributeState,
    presentation: Presentation,
    event: &Event,
    now: DateTime<Utc>,
    rules: &Rules,
) -> Reduction {
    let (next, next_presentation) = match event {
        Event::Interact { kind } => {
            (interact(state, *kind, now, &rules.interactions), presentation)
        }
        Event::ApplyDecay => (decay::apply_decay(state, now, &rules.decay).state, presentation),
        Event::UpdateEmotion { emotion } => (state.clone(), Presentation { emotion: *emotion }),
        Event::SetAffinity { value } => {
            let mut next = state.clone();
            next.affinity = clamp_attribute(*value);
            (next, presentation)
        }
        Event::Reward {
            currency,
            experience,
        } => {
            let mut next = state.clone();
            next.currency = next.currency.saturating_add(*currency);
            next.experience = next.experience.saturating_add(*experience);
            (next, presentation)
        }
        Event::Unsupported => {
            warn!("Unsupported event ignored; state unchanged");
            return Reduction {
                state: state.clone(),
                presentation,
                change: ChangeRecord::default(),
            };
        }
    };

    let change = ChangeRecord::between(state, &next, presentation, next_presentation);
    debug!(
        event = event.name(),
        mood = next.mood,
        energy = next.energy,
        affinity = next.affinity,
        "Event reduced"
    );

    Reduction {
        state: next,
        presentation: next_presentation,
        change,
    }
}

fn interact(
    state: &AttributeState,
    kind: InteractionKind,
    now: DateTime<Utc>,
    table: &InteractionTable,
) -> AttributeState {
    let effect = table.get(kind);
    let mut next = state.clone();

    next.mood = clamp_attribute(state.mood + effect.mood_delta);
    next.energy = clamp_attribute(state.energy + effect.energy_delta);
    next.affinity = clamp_attribute(state.affinity + effect.affinity_delta);
    next.experience = state.experience.saturating_add(effect.experience_gain);
    next.currency = state.currency.saturating_add(effect.currency_gain);
    next.total_interactions = state.total_interactions.saturating_add(1);
    next.last_interaction_at = now;
    next.last_interaction_by_kind.insert(kind, now);

    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn state(mood: f64, energy: f64, affinity: f64) -> AttributeState {
        let mut s = AttributeState::new(Utc::now());
        s.mood = mood;
        s.energy = energy;
        s.affinity = affinity;
        s
    }

    #[test]
    fn interact_applies_deltas_and_clamps() {
        let s = state(100.0, 100.0, 20.0);
        let now = s.created_at + Duration::seconds(5);
        let r = reduce(
            &s,
            Presentation::default(),
            &Event::interact(InteractionKind::Pet),
            now,
            &Rules::default(),
        );

        assert!((r.state.mood - 100.0).abs() < 1e-9);
        assert!((r.state.energy - 100.0).abs() < 1e-9);
        assert!((r.state.affinity - 22.0).abs() < 1e-9);
        assert_eq!(r.state.total_interactions, 1);
        assert_eq!(r.state.last_interaction_at, now);
        assert_eq!(r.state.last_interaction_of(InteractionKind::Pet), Some(now));
        assert!((r.change.affinity_delta - 2.0).abs() < 1e-9);
        assert!(r.change.mood_delta.abs() < 1e-9);
        assert!(r.change.handled);
    }

    #[test]
    fn negative_energy_delta_clamps_at_zero() {
        let s = state(50.0, 4.0, 10.0);
        let r = reduce(
            &s,
            Presentation::default(),
            &Event::interact(InteractionKind::Play),
            s.created_at,
            &Rules::default(),
        );
        assert!(r.state.energy.abs() < 1e-9);
        assert_eq!(r.state.currency, 1);
        assert_eq!(r.state.experience, 2);
    }

    #[test]
    fn update_emotion_leaves_attributes_alone() {
        let s = state(12.0, 34.0, 56.0);
        let r = reduce(
            &s,
            Presentation::default(),
            &Event::UpdateEmotion { emotion: Emotion::Happy },
            s.created_at + Duration::hours(5),
            &Rules::default(),
        );
        assert_eq!(r.state, s);
        assert_eq!(r.presentation.emotion, Emotion::Happy);
        assert!(r.change.emotion_changed);
    }

    #[test]
    fn set_affinity_is_clamped() {
        let s = state(50.0, 50.0, 50.0);
        let r = reduce(
            &s,
            Presentation::default(),
            &Event::SetAffinity { value: 1e9 },
            s.created_at,
            &Rules::default(),
        );
        assert!((r.state.affinity - 100.0).abs() < 1e-9);
        let r = reduce(
            &s,
            Presentation::default(),
            &Event::SetAffinity { value: -3.0 },
            s.created_at,
            &Rules::default(),
        );
        assert!(r.state.affinity.abs() < 1e-9);
    }

    #[test]
    fn reward_saturates() {
        let mut s = state(50.0, 50.0, 50.0);
        s.currency = u64::MAX - 1;
        let r = reduce(
            &s,
            Presentation::default(),
            &Event::Reward { currency: 10, experience: 5 },
            s.created_at,
            &Rules::default(),
        );
        assert_eq!(r.state.currency, u64::MAX);
        assert_eq!(r.state.experience, 5);
    }

    #[test]
    fn apply_decay_marks_change() {
        let s = state(80.0, 80.0, 30.0);
        let r = reduce(
            &s,
            Presentation::default(),
            &Event::ApplyDecay,
            s.created_at + Duration::hours(1),
            &Rules::default(),
        );
        assert!(r.change.decay_applied);
        assert!(r.change.mood_delta < 0.0);

        let r = reduce(
            &s,
            Presentation::default(),
            &Event::ApplyDecay,
            s.created_at + Duration::minutes(1),
            &Rules::default(),
        );
        assert!(!r.change.decay_applied);
        assert_eq!(r.state, s);
    }

    #[test]
    fn unsupported_is_a_no_op() {
        let s = state(1.0, 2.0, 3.0);
        let r = reduce(
            &s,
            Presentation::default(),
            &Event::Unsupported,
            s.created_at,
            &Rules::default(),
        );
        assert_eq!(r.state, s);
        assert!(!r.change.handled);
    }

    #[test]
    fn json_decoding() {
        assert_eq!(
            Event::from_json(r#"{"type":"interact","kind":"feed"}"#),
            Event::interact(InteractionKind::Feed)
        );
        assert_eq!(Event::from_json(r#"{"type":"apply_decay"}"#), Event::ApplyDecay);
        assert_eq!(Event::from_json(r#"{"type":"teleport","to":"moon"}"#), Event::Unsupported);
        assert_eq!(Event::from_json(r#"{"type":"interact","kind":"bathe"}"#), Event::Unsupported);
        assert_eq!(Event::from_json("not json"), Event::Unsupported);
    }
}
