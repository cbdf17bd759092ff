//! Decay Policy: mood and energy fade with wall-clock time.
//!
//! Loss is linear in elapsed hours but capped per application:
//!
//! ```text
//!   hours       = (now - last_decay_applied_at) / 3600 s
//!   mood_loss   = min(hours × mood_per_hour,   max_mood_decay_per_tick)
//!   energy_loss = min(hours × energy_per_hour, max_energy_decay_per_tick)
//! ```
//!
//! The cap bounds the catch-up after a long suspension (laptop asleep, app
//! closed for days), so the creature never drops straight to zero on
//! resume. Affinity never decays.

use chrono::{DateTime, Utc};

use crate::config::DecayConfig;
use crate::types::{AttributeState, clamp_attribute};

/// Result of one decay application.
#[derive(Debug, Clone, PartialEq)]
pub struct DecayOutcome {
    /// State after decay (identical to the input when skipped).
    pub state: AttributeState,
    /// Whether decay was applied and the decay clock advanced.
    pub applied: bool,
    /// Hours elapsed since the last application.
    pub elapsed_hours: f64,
    /// Mood actually removed.
    pub mood_loss: f64,
    /// Energy actually removed.
    pub energy_loss: f64,
}

/// Hours between `last_decay_applied_at` and `now`. Negative under clock skew.
#[must_use]
pub fn elapsed_hours(state: &AttributeState, now: DateTime<Utc>) -> f64 {
    let millis = (now - state.last_decay_applied_at).num_milliseconds();
    millis as f64 / 3_600_000.0
}

/// Apply decay to `state` as of `now`.
///
/// Below `config.min_elapsed_hours` (including a clock that went backward)
/// nothing changes, not even `last_decay_applied_at`.
#[must_use]
pub fn apply_decay(
    state: &AttributeState,
    now: DateTime<Utc>,
    config: &DecayConfig,
) -> DecayOutcome {
    let hours = elapsed_hours(state, now);

    if hours < config.min_elapsed_hours || now <= state.last_decay_applied_at {
        return DecayOutcome {
            state: state.clone(),
            applied: false,
            elapsed_hours: hours,
            mood_loss: 0.0,
            energy_loss: 0.0,
        };
    }

    let mood_loss = (hours * config.mood_per_hour).min(config.max_mood_decay_per_tick);
    let energy_loss = (hours * config.energy_per_hour).min(config.max_energy_decay_per_tick);

    let mut next = state.clone();
    next.mood = clamp_attribute(state.mood - mood_loss);
    next.energy = clamp_attribute(state.energy - energy_loss);
    next.last_decay_applied_at = now;

    DecayOutcome {
        mood_loss: state.mood - next.mood,
        energy_loss: state.energy - next.energy,
        state: next,
        applied: true,
        elapsed_hours: hours,
    }
}
