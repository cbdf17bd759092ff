//! Cooldown Policy: how long until an interaction kind can be used again.
//!
//! Cooldown is advice for the caller. The transition engine accepts every
//! interaction it is given; gating happens in the layer that talks to the UI.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use ordered_float::OrderedFloat;

use crate::config::InteractionTable;
use crate::types::{AttributeState, InteractionKind};

/// Below this an attribute counts as "low" for recommendations.
pub const LOW_ATTRIBUTE_THRESHOLD: f64 = 50.0;

/// Seconds left before `kind` is available again.
///
/// `max(0, cooldown_seconds - (now - last_interaction_at))`, with elapsed
/// time rounded down to whole seconds. A clock behind `last_interaction_at`
/// counts as zero elapsed.
#[must_use]
pub fn remaining_cooldown(
    kind: InteractionKind,
    last_interaction_at: DateTime<Utc>,
    now: DateTime<Utc>,
    table: &InteractionTable,
) -> u64 {
    let elapsed = u64::try_from((now - last_interaction_at).num_seconds()).unwrap_or(0);
    table.get(kind).cooldown_seconds.saturating_sub(elapsed)
}

/// Seconds left for `kind` given the creature's recorded history.
///
/// A kind that was never used is always available.
#[must_use]
pub fn remaining_for(
    state: &AttributeState,
    kind: InteractionKind,
    now: DateTime<Utc>,
    table: &InteractionTable,
) -> u64 {
    state
        .last_interaction_of(kind)
        .map_or(0, |last| remaining_cooldown(kind, last, now, table))
}

/// Whether `kind` can be used right now.
#[must_use]
pub fn is_available(
    state: &AttributeState,
    kind: InteractionKind,
    now: DateTime<Utc>,
    table: &InteractionTable,
) -> bool {
    remaining_for(state, kind, now, table) == 0
}

/// Remaining cooldown of every kind.
#[must_use]
pub fn all_remaining(
    state: &AttributeState,
    now: DateTime<Utc>,
    table: &InteractionTable,
) -> BTreeMap<InteractionKind, u64> {
    InteractionKind::ALL
        .iter()
        .map(|&kind| (kind, remaining_for(state, kind, now, table)))
        .collect()
}

/// Suggest the most useful available interaction.
///
/// Low energy suggests feeding, low mood suggests playing; the lower of
/// the two wins and ties go to feeding. Otherwise petting. If the
/// preferred kind is cooling down, the first available kind in
/// pet > feed > play order is returned. `None` when everything is
/// cooling down.
#[must_use]
pub fn recommend(
    state: &AttributeState,
    now: DateTime<Utc>,
    table: &InteractionTable,
) -> Option<InteractionKind> {
    let available = |kind: InteractionKind| is_available(state, kind, now, table);

    let needs = [
        (InteractionKind::Feed, state.energy),
        (InteractionKind::Play, state.mood),
    ];
    let preferred = needs
        .iter()
        .filter(|(kind, value)| *value < LOW_ATTRIBUTE_THRESHOLD && available(*kind))
        .min_by_key(|(_, value)| OrderedFloat(*value))
        .map(|(kind, _)| *kind);

    preferred.or_else(|| InteractionKind::ALL.into_iter().find(|&kind| available(kind)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn table() -> InteractionTable {
        InteractionTable::default()
    }

    #[test]
    fn remaining_counts_down_to_zero() {
        let t0 = Utc::now();
        let table = table();
        let cd = table.feed.cooldown_seconds;

        assert_eq!(remaining_cooldown(InteractionKind::Feed, t0, t0, &table), cd);
        assert_eq!(
            remaining_cooldown(InteractionKind::Feed, t0, t0 + Duration::seconds(1), &table),
            cd - 1
        );
        assert_eq!(
            remaining_cooldown(
                InteractionKind::Feed,
                t0,
                t0 + Duration::seconds(i64::try_from(cd).expect("fits")),
                &table
            ),
            0
        );
        assert_eq!(
            remaining_cooldown(InteractionKind::Feed, t0, t0 + Duration::days(1), &table),
            0
        );
    }

    #[test]
    fn clock_behind_counts_as_zero_elapsed() {
        let t0 = Utc::now();
        let table = table();
        assert_eq!(
            remaining_cooldown(InteractionKind::Pet, t0, t0 - Duration::hours(1), &table),
            table.pet.cooldown_seconds
        );
    }

    #[test]
    fn never_used_kind_is_available() {
        let t0 = Utc::now();
        let state = AttributeState::new(t0);
        assert!(is_available(&state, InteractionKind::Play, t0, &table()));
        assert!(all_remaining(&state, t0, &table()).values().all(|&s| s == 0));
    }

    #[test]
    fn recommend_addresses_lowest_attribute() {
        let t0 = Utc::now();
        let table = table();
        let mut state = AttributeState::new(t0);

        state.energy = 20.0;
        state.mood = 40.0;
        assert_eq!(recommend(&state, t0, &table), Some(InteractionKind::Feed));

        state.energy = 45.0;
        state.mood = 10.0;
        assert_eq!(recommend(&state, t0, &table), Some(InteractionKind::Play));

        state.energy = 30.0;
        state.mood = 30.0;
        assert_eq!(recommend(&state, t0, &table), Some(InteractionKind::Feed), "tie goes to feed");

        state.energy = 90.0;
        state.mood = 90.0;
        assert_eq!(recommend(&state, t0, &table), Some(InteractionKind::Pet));
    }

    #[test]
    fn recommend_falls_back_when_preferred_is_cooling_down() {
        let t0 = Utc::now();
        let table = table();
        let mut state = AttributeState::new(t0);
        state.energy = 10.0;
        state.last_interaction_by_kind.insert(InteractionKind::Feed, t0);

        assert_eq!(recommend(&state, t0, &table), Some(InteractionKind::Pet));

        state.last_interaction_by_kind.insert(InteractionKind::Pet, t0);
        assert_eq!(recommend(&state, t0, &table), Some(InteractionKind::Play));

        state.last_interaction_by_kind.insert(InteractionKind::Play, t0);
        assert_eq!(recommend(&state, t0, &table), None);
    }
}
