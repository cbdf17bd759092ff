//! Growth stages: a named partition of the affinity range.
//!
//! Bands are half-open `[min, max)`, except the last which also includes
//! `max`. A [`StageTable`] can only be built from bands that are contiguous
//! and cover `[0, 100]` exactly, so lookup never misses.

use serde::{Deserialize, Serialize};

use crate::error::NestlingError;
use crate::types::{ATTRIBUTE_MAX, ATTRIBUTE_MIN, clamp_attribute};

/// Tolerance used when checking that adjacent bands touch.
const BOUNDARY_EPSILON: f64 = 1e-9;

/// One growth stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageBand {
    /// Stable identifier (e.g. `"hatchling"`).
    pub id: String,
    /// Display name.
    pub name: String,
    /// Inclusive lower bound.
    pub min: f64,
    /// Exclusive upper bound (inclusive for the last band).
    pub max: f64,
}

impl StageBand {
    /// Convenience constructor.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, min: f64, max: f64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            min,
            max,
        }
    }
}

/// The stock stages.
#[must_use]
pub fn default_bands() -> Vec<StageBand> {
    vec![
        StageBand::new("hatchling", "Hatchling", 0.0, 30.0),
        StageBand::new("friend", "Friend", 30.0, 60.0),
        StageBand::new("companion", "Companion", 60.0, 90.0),
        StageBand::new("soulmate", "Soulmate", 90.0, 100.0),
    ]
}

/// Where an affinity value falls.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageProgress {
    /// Position of the stage in the table (0 = lowest).
    pub index: usize,
    /// The stage itself.
    pub stage: StageBand,
    /// Progress through the stage, 0–100.
    pub progress_percent: f64,
}

/// Movement to a higher stage between two affinity readings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageUpgrade {
    /// Stage before the change.
    pub from: StageProgress,
    /// Stage after the change.
    pub to: StageProgress,
}

/// A validated, ordered list of stages.
#[derive(Debug, Clone)]
pub struct StageTable {
    bands: Vec<StageBand>,
}

impl StageTable {
    /// Validate `bands` and build a table.
    ///
    /// # Errors
    /// Returns `NestlingError::Config` if the bands are empty, inverted,
    /// overlapping, leave a gap, or do not span exactly `[0, 100]`.
    pub fn new(bands: Vec<StageBand>) -> crate::error::Result<Self> {
        let (Some(first), Some(last)) = (bands.first(), bands.last()) else {
            return Err(NestlingError::Config("no growth stages configured".to_string()));
        };

        if (first.min - ATTRIBUTE_MIN).abs() > BOUNDARY_EPSILON {
            return Err(NestlingError::Config(format!(
                "first stage '{}' must start at {ATTRIBUTE_MIN}, starts at {}",
                first.id, first.min
            )));
        }
        if (last.max - ATTRIBUTE_MAX).abs() > BOUNDARY_EPSILON {
            return Err(NestlingError::Config(format!(
                "last stage '{}' must end at {ATTRIBUTE_MAX}, ends at {}",
                last.id, last.max
            )));
        }

        for band in &bands {
            if !(band.min < band.max) {
                return Err(NestlingError::Config(format!(
                    "stage '{}' has an empty or inverted range [{}, {})",
                    band.id, band.min, band.max
                )));
            }
        }

        for pair in bands.windows(2) {
            let (lower, upper) = (&pair[0], &pair[1]);
            if (upper.min - lower.max).abs() > BOUNDARY_EPSILON {
                return Err(NestlingError::Config(format!(
                    "stages '{}' and '{}' are not contiguous ({} vs {})",
                    lower.id, upper.id, lower.max, upper.min
                )));
            }
        }

        Ok(Self { bands })
    }

    /// The bands, lowest first.
    #[must_use]
    pub fn bands(&self) -> &[StageBand] {
        &self.bands
    }

    /// Stage and within-stage progress for `affinity`.
    ///
    /// Out-of-range input is clamped first.
    #[must_use]
    pub fn stage_for(&self, affinity: f64) -> StageProgress {
        let affinity = clamp_attribute(affinity);
        let last = self.bands.len() - 1;
        let index = self
            .bands
            .iter()
            .position(|band| affinity < band.max)
            .unwrap_or(last);
        let band = &self.bands[index];
        let progress = 100.0 * (affinity - band.min) / (band.max - band.min);

        StageProgress {
            index,
            stage: band.clone(),
            progress_percent: progress.clamp(0.0, 100.0),
        }
    }

    /// Report a stage upgrade between two affinity readings, if any.
    #[must_use]
    pub fn detect_upgrade(&self, before: f64, after: f64) -> Option<StageUpgrade> {
        let from = self.stage_for(before);
        let to = self.stage_for(after);
        (to.index > from.index).then_some(StageUpgrade { from, to })
    }
}

impl Default for StageTable {
    fn default() -> Self {
        Self {
            bands: default_bands(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_bands_validate() {
        assert!(StageTable::new(default_bands()).is_ok());
    }

    #[test]
    fn lookup_and_progress() {
        let table = StageTable::default();

        let p = table.stage_for(0.0);
        assert_eq!(p.stage.id, "hatchling");
        assert!(p.progress_percent.abs() < 1e-9);

        let p = table.stage_for(15.0);
        assert_eq!(p.stage.id, "hatchling");
        assert!((p.progress_percent - 50.0).abs() < 1e-9);

        let p = table.stage_for(30.0);
        assert_eq!(p.stage.id, "friend");
        assert_eq!(p.index, 1);

        let p = table.stage_for(100.0);
        assert_eq!(p.stage.id, "soulmate");
        assert!((p.progress_percent - 100.0).abs() < 1e-9);
    }

    #[test]
    fn out_of_range_affinity_is_clamped() {
        let table = StageTable::default();
        assert_eq!(table.stage_for(-20.0).stage.id, "hatchling");
        assert_eq!(table.stage_for(250.0).stage.id, "soulmate");
        assert_eq!(table.stage_for(f64::NAN).stage.id, "hatchling");
    }

    #[test]
    fn rejects_gap() {
        let bands = vec![
            StageBand::new("a", "A", 0.0, 40.0),
            StageBand::new("b", "B", 50.0, 100.0),
        ];
        assert!(StageTable::new(bands).is_err());
    }

    #[test]
    fn rejects_overlap_and_inversion() {
        let overlap = vec![
            StageBand::new("a", "A", 0.0, 60.0),
            StageBand::new("b", "B", 50.0, 100.0),
        ];
        assert!(StageTable::new(overlap).is_err());

        let inverted = vec![
            StageBand::new("a", "A", 0.0, 0.0),
            StageBand::new("b", "B", 0.0, 100.0),
        ];
        assert!(StageTable::new(inverted).is_err());
    }

    #[test]
    fn rejects_partial_coverage() {
        assert!(StageTable::new(vec![]).is_err());
        assert!(StageTable::new(vec![StageBand::new("a", "A", 0.0, 90.0)]).is_err());
        assert!(StageTable::new(vec![StageBand::new("a", "A", 5.0, 100.0)]).is_err());
    }

    #[test]
    fn upgrade_detection() {
        let table = StageTable::default();
        let upgrade = table.detect_upgrade(29.0, 31.0).expect("upgrade");
        assert_eq!(upgrade.from.stage.id, "hatchling");
        assert_eq!(upgrade.to.stage.id, "friend");

        assert!(table.detect_upgrade(31.0, 45.0).is_none());
        assert!(table.detect_upgrade(61.0, 59.0).is_none());
    }
}
