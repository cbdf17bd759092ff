//! The engine handle: owns the live [`AttributeState`], reads time from an
//! injected [`Clock`], runs [`reduce`], and notifies subscribers.
//!
//! Callers only ever get clones of the state. Dispatch is synchronous and
//! total; listeners run in registration order right after each dispatch.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error, info};

use crate::clock::Clock;
use crate::transition::{ChangeRecord, Event, Rules, reduce};
use crate::types::{AttributeState, Presentation};

/// A state-change listener: `(old, new, event)`.
pub type Listener = Arc<dyn Fn(&AttributeState, &AttributeState, &Event) + Send + Sync>;

#[derive(Default)]
struct ListenerRegistry {
    next_id: u64,
    listeners: Vec<(u64, Listener)>,
}

/// Handle returned by [`Engine::subscribe`].
///
/// Dropping it does not unsubscribe; call [`Subscription::unsubscribe`].
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<ListenerRegistry>>,
}

impl Subscription {
    /// Remove the listener. Returns `false` if it was already gone or the
    /// engine no longer exists.
    pub fn unsubscribe(self) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        let mut registry = registry.lock();
        let before = registry.listeners.len();
        registry.listeners.retain(|(id, _)| *id != self.id);
        registry.listeners.len() != before
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

/// Everything one dispatch produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transition {
    /// The event that was dispatched.
    pub event: Event,
    /// State before.
    pub old: AttributeState,
    /// State after.
    pub new: AttributeState,
    /// Presentation after.
    pub presentation: Presentation,
    /// Summary of the change.
    pub change: ChangeRecord,
    /// Time the event was applied at.
    pub at: DateTime<Utc>,
}

/// Owner of the live companion state.
pub struct Engine {
    state: AttributeState,
    presentation: Presentation,
    rules: Rules,
    clock: Arc<dyn Clock>,
    registry: Arc<Mutex<ListenerRegistry>>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("state", &self.state)
            .field("presentation", &self.presentation)
            .field("registry", &*self.registry.lock())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Resume from a previously persisted state.
    #[must_use]
    pub fn new(state: AttributeState, rules: Rules, clock: Arc<dyn Clock>) -> Self {
        Self {
            state,
            presentation: Presentation::default(),
            rules,
            clock,
            registry: Arc::new(Mutex::new(ListenerRegistry::default())),
        }
    }

    /// Start a brand-new creature at the clock's current time.
    #[must_use]
    pub fn fresh(rules: Rules, clock: Arc<dyn Clock>) -> Self {
        let state = AttributeState::new(clock.now());
        Self::new(state, rules, clock)
    }

    /// A copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> AttributeState {
        self.state.clone()
    }

    /// Borrow the current state.
    #[must_use]
    pub fn state(&self) -> &AttributeState {
        &self.state
    }

    /// Current presentation record.
    #[must_use]
    pub fn presentation(&self) -> Presentation {
        self.presentation
    }

    /// The tuning in effect.
    #[must_use]
    pub fn rules(&self) -> &Rules {
        &self.rules
    }

    /// Current time according to the injected clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Apply `event`, store the result, and notify listeners.
    pub fn dispatch(&mut self, event: Event) -> Transition {
        let at = self.clock.now();
        let reduction = reduce(&self.state, self.presentation, &event, at, &self.rules);

        let old = std::mem::replace(&mut self.state, reduction.state);
        self.presentation = reduction.presentation;

        let transition = Transition {
            event,
            old,
            new: self.state.clone(),
            presentation: self.presentation,
            change: reduction.change,
            at,
        };
        self.notify(&transition);
        transition
    }

    /// Register a listener. It runs after every dispatch, in registration
    /// order, until unsubscribed.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&AttributeState, &AttributeState, &Event) + Send + Sync + 'static,
    {
        let mut registry = self.registry.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.listeners.push((id, Arc::new(listener)));
        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.registry.lock().listeners.len()
    }

    /// Explicit user data reset: replace the creature with a fresh one.
    ///
    /// Listeners are not notified; the returned state is the new snapshot.
    pub fn reset(&mut self) -> AttributeState {
        let fresh = AttributeState::new(self.clock.now());
        self.reset_to(fresh.clone());
        fresh
    }

    /// Replace the creature with `fresh`, e.g. one already seeded in a store.
    ///
    /// Listeners are not notified.
    pub fn reset_to(&mut self, fresh: AttributeState) {
        self.state = fresh;
        self.presentation = Presentation::default();
        info!("Companion state reset");
    }

    fn notify(&self, transition: &Transition) {
        // Listeners are cloned out so one may subscribe or unsubscribe
        // without deadlocking the registry.
        let listeners: Vec<(u64, Listener)> = self.registry.lock().listeners.clone();

        for (id, listener) in listeners {
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                listener(&transition.old, &transition.new, &transition.event);
            }));
            if outcome.is_err() {
                error!(
                    listener = id,
                    event = transition.event.name(),
                    "State listener panicked; continuing with remaining listeners"
                );
            }
        }
        debug!(event = transition.event.name(), "Listeners notified");
    }
}
