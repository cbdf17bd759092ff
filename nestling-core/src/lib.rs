//! # Nestling Core Library
//!
//! Simulation core for a virtual companion creature.
//!
//! The creature is an [`AttributeState`] (mood, energy, affinity, coins,
//! experience) that changes only through events applied by the [`Engine`]:
//!
//! - **Transitions**: `reduce(state, event, now)`, pure and total
//! - **Decay**: mood and energy fade with elapsed hours, capped per tick
//! - **Cooldowns**: how long until each interaction kind is available
//! - **Stages**: affinity bands (hatchling → soulmate) with upgrade detection
//! - **Conditions**: a closed `AND`/`OR` comparison language for unlocks
//! - **Achievements**: a catalog of one-way unlocks driven by conditions
//! - **Persistence**: partial writes of a singleton record, debounced or immediate
//!
//! Time always comes from an injected [`Clock`](clock::Clock).

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod achievement;
pub mod activity;
pub mod clock;
pub mod condition;
pub mod config;
pub mod cooldown;
pub mod decay;
pub mod engine;
pub mod error;
pub mod persistence;
pub mod stage;
pub mod transition;
pub mod types;

pub use config::NestlingConfig;
pub use engine::{Engine, Subscription, Transition};
pub use error::{NestlingError, StorageError};
pub use transition::{Event, Rules};
pub use types::*;
