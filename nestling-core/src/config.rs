//! Configuration for the companion engine.
//!
//! Maps directly to `nestling.toml`. Every field has a default, so an empty
//! file yields the stock tuning.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::achievement::{AchievementDefinition, default_catalog};
use crate::error::NestlingError;
use crate::stage::{StageBand, StageTable, default_bands};
use crate::types::InteractionKind;

/// Top-level configuration, loadable from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NestlingConfig {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Effects and cooldowns of each interaction kind.
    #[serde(default)]
    pub interactions: InteractionTable,
    /// Time-based attribute loss.
    #[serde(default)]
    pub decay: DecayConfig,
    /// Growth-stage partition of the affinity range.
    #[serde(default)]
    pub stages: StageConfig,
    /// Debounced persistence settings.
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// Achievement catalog, seeded once at startup.
    #[serde(default = "default_catalog")]
    pub achievements: Vec<AchievementDefinition>,
}

impl Default for NestlingConfig {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            interactions: InteractionTable::default(),
            decay: DecayConfig::default(),
            stages: StageConfig::default(),
            persistence: PersistenceConfig::default(),
            achievements: default_catalog(),
        }
    }
}

impl NestlingConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `NestlingError::Config` if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> crate::error::Result<Self> {
        toml::from_str(toml_str).map_err(|e| NestlingError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Check everything that must hold before the engine starts.
    ///
    /// Misconfiguration here is a programming mistake, so callers are
    /// expected to refuse to start on error.
    ///
    /// # Errors
    /// Returns `NestlingError::Config` describing the first problem found.
    pub fn validate(&self) -> crate::error::Result<()> {
        StageTable::new(self.stages.bands.clone())?;
        self.decay.validate()?;

        if self.persistence.debounce_ms == 0 {
            return Err(NestlingError::Config(
                "persistence.debounce_ms must be positive".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for def in &self.achievements {
            if !seen.insert(def.id.as_str()) {
                return Err(NestlingError::Config(format!(
                    "duplicate achievement id: {}",
                    def.id
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// General system settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level used when `RUST_LOG` is unset: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit logs as JSON lines instead of human-readable text.
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// Effect of a single interaction kind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InteractionEffect {
    /// Minimum seconds between two uses of this kind.
    pub cooldown_seconds: u64,
    /// Added to mood.
    pub mood_delta: f64,
    /// Added to energy (may be negative).
    pub energy_delta: f64,
    /// Added to affinity.
    pub affinity_delta: f64,
    /// Experience granted.
    #[serde(default)]
    pub experience_gain: u64,
    /// Coins granted.
    #[serde(default)]
    pub currency_gain: u64,
}

/// The single source of truth for interaction effects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionTable {
    /// Petting.
    #[serde(default = "default_pet")]
    pub pet: InteractionEffect,
    /// Feeding.
    #[serde(default = "default_feed")]
    pub feed: InteractionEffect,
    /// Playing.
    #[serde(default = "default_play")]
    pub play: InteractionEffect,
}

impl InteractionTable {
    /// Effect record for `kind`.
    #[must_use]
    pub fn get(&self, kind: InteractionKind) -> &InteractionEffect {
        match kind {
            InteractionKind::Pet => &self.pet,
            InteractionKind::Feed => &self.feed,
            InteractionKind::Play => &self.play,
        }
    }

    /// Mutable effect record for `kind`.
    pub fn get_mut(&mut self, kind: InteractionKind) -> &mut InteractionEffect {
        match kind {
            InteractionKind::Pet => &mut self.pet,
            InteractionKind::Feed => &mut self.feed,
            InteractionKind::Play => &mut self.play,
        }
    }
}

impl Default for InteractionTable {
    fn default() -> Self {
        Self {
            pet: default_pet(),
            feed: default_feed(),
            play: default_play(),
        }
    }
}

/// Mood and energy loss over time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecayConfig {
    /// Mood lost per elapsed hour.
    #[serde(default = "default_mood_per_hour")]
    pub mood_per_hour: f64,
    /// Energy lost per elapsed hour.
    #[serde(default = "default_energy_per_hour")]
    pub energy_per_hour: f64,
    /// Upper bound on mood lost in a single application.
    #[serde(default = "default_max_mood_decay")]
    pub max_mood_decay_per_tick: f64,
    /// Upper bound on energy lost in a single application.
    #[serde(default = "default_max_energy_decay")]
    pub max_energy_decay_per_tick: f64,
    /// Decay is skipped entirely below this many elapsed hours.
    #[serde(default = "default_min_elapsed_hours")]
    pub min_elapsed_hours: f64,
}

impl DecayConfig {
    fn validate(&self) -> crate::error::Result<()> {
        let fields = [
            ("mood_per_hour", self.mood_per_hour),
            ("energy_per_hour", self.energy_per_hour),
            ("max_mood_decay_per_tick", self.max_mood_decay_per_tick),
            ("max_energy_decay_per_tick", self.max_energy_decay_per_tick),
            ("min_elapsed_hours", self.min_elapsed_hours),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(NestlingError::Config(format!(
                    "decay.{name} must be a non-negative number, got {value}"
                )));
            }
        }
        Ok(())
    }
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            mood_per_hour: 2.0,
            energy_per_hour: 3.0,
            max_mood_decay_per_tick: 30.0,
            max_energy_decay_per_tick: 40.0,
            min_elapsed_hours: 0.1,
        }
    }
}

/// Growth-stage bands, lowest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    /// Ordered bands partitioning `[0, 100]`.
    #[serde(default = "default_bands")]
    pub bands: Vec<StageBand>,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            bands: default_bands(),
        }
    }
}

/// Persistence / save configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// SQLite database file.
    #[serde(default = "default_db_path")]
    pub db_path: String,
    /// Use WAL mode.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
    /// Quiet period before a debounced flush, in milliseconds.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl PersistenceConfig {
    /// Quiet period as a `Duration`.
    #[must_use]
    pub fn debounce(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.debounce_ms)
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            db_path: "nestling.db".to_string(),
            wal_mode: true,
            debounce_ms: 5_000,
        }
    }
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool { true }
fn default_log_level() -> String { "info".to_string() }
fn default_db_path() -> String { "nestling.db".to_string() }
fn default_debounce_ms() -> u64 { 5_000 }
fn default_mood_per_hour() -> f64 { 2.0 }
fn default_energy_per_hour() -> f64 { 3.0 }
fn default_max_mood_decay() -> f64 { 30.0 }
fn default_max_energy_decay() -> f64 { 40.0 }
fn default_min_elapsed_hours() -> f64 { 0.1 }

fn default_pet() -> InteractionEffect {
    InteractionEffect {
        cooldown_seconds: 60,
        mood_delta: 10.0,
        energy_delta: 0.0,
        affinity_delta: 2.0,
        experience_gain: 1,
        currency_gain: 0,
    }
}

fn default_feed() -> InteractionEffect {
    InteractionEffect {
        cooldown_seconds: 120,
        mood_delta: 5.0,
        energy_delta: 20.0,
        affinity_delta: 1.0,
        experience_gain: 1,
        currency_gain: 0,
    }
}

fn default_play() -> InteractionEffect {
    InteractionEffect {
        cooldown_seconds: 300,
        mood_delta: 15.0,
        energy_delta: -10.0,
        affinity_delta: 3.0,
        experience_gain: 2,
        currency_gain: 1,
    }
}
