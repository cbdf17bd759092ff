//! # nestling-host: Host Integration for Nestling
//!
//! Wires the game-agnostic `nestling-core` pieces into one running
//! companion and exposes the requests an interaction UI makes.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │            Interaction UI / timers       │
//! │  ┌────────────────────────────────────┐  │
//! │  │        nestling-host               │  │
//! │  │  ┌──────────────────┐ ┌─────────┐  │  │
//! │  │  │ CompanionService │ │ logging │  │  │
//! │  │  └────────┬─────────┘ └─────────┘  │  │
//! │  │           ▼                        │  │
//! │  │  ┌──────────────────────────────┐  │  │
//! │  │  │        nestling-core         │  │  │
//! │  │  └──────────────────────────────┘  │  │
//! │  └────────────────────────────────────┘  │
//! └──────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `service`: `CompanionService`: open, interact, tick, status, reset, shutdown
//! - `logging`: `tracing-subscriber` setup driven by `[general]` config

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod logging;
pub mod service;

pub use service::{AffinityOutcome, CompanionService, CompanionStatus, InteractionOutcome};
