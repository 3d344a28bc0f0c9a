//! Window-pair configuration loaded from JSON.

use cyclone_core::gap::DEFAULT_MISSING_VALUE;
use cyclone_core::overlap::DEFAULT_DISTANCE_THRESHOLD;
use cyclone_core::{ColumnSchema, ExtendOddPolicy, GapFiller, OverlapDetector, StitchError, TrackFileMerger};
use cyclone_env::GridSource;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

fn default_distance_threshold() -> f64 {
    DEFAULT_DISTANCE_THRESHOLD
}

fn default_time_period() -> u32 {
    6
}

fn default_missing_value() -> f64 {
    DEFAULT_MISSING_VALUE
}

/// Everything needed to stitch one pair of adjacent windows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StitchConfig {
    /// Track file column layout (`name -> index`)
    pub columns: BTreeMap<String, usize>,

    /// Variable columns holding one vector per point
    #[serde(default)]
    pub profiles: Vec<String>,

    /// Lat/lon proximity (degrees) for two storms to be the same
    #[serde(default = "default_distance_threshold")]
    pub distance_threshold: f64,

    /// Hours between time steps of the source data
    #[serde(default = "default_time_period")]
    pub time_period: u32,

    /// Fill value for profiles at gap-filled points
    #[serde(default = "default_missing_value")]
    pub missing_value: f64,

    /// Handling of same-start matches where the early track is longer
    #[serde(default)]
    pub extend_odd: ExtendOddPolicy,

    /// Known units per variable base name; the rest are guessed
    #[serde(default)]
    pub variable_units: BTreeMap<String, String>,

    /// Source data of the earlier window
    pub previous_source: GridSource,

    /// Source data of the later window
    pub current_source: GridSource,
}

impl StitchConfig {
    /// Creates a config with default tuning for the given layout and sources.
    pub fn new(columns: BTreeMap<String, usize>, previous_source: GridSource, current_source: GridSource) -> Self {
        Self {
            columns,
            profiles: Vec::new(),
            distance_threshold: DEFAULT_DISTANCE_THRESHOLD,
            time_period: default_time_period(),
            missing_value: DEFAULT_MISSING_VALUE,
            extend_odd: ExtendOddPolicy::default(),
            variable_units: BTreeMap::new(),
            previous_source,
            current_source,
        }
    }

    /// Sets the profile variables.
    pub fn with_profiles(mut self, profiles: Vec<String>) -> Self {
        self.profiles = profiles;
        self
    }

    /// Sets the ExtendOdd policy.
    pub fn with_extend_odd(mut self, policy: ExtendOddPolicy) -> Self {
        self.extend_odd = policy;
        self
    }

    /// Sets the distance threshold.
    pub fn with_distance_threshold(mut self, degrees: f64) -> Self {
        self.distance_threshold = degrees;
        self
    }

    pub fn from_json(json: &str) -> Result<Self, StitchError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, StitchError> {
        let json = std::fs::read_to_string(path)
            .map_err(|err| StitchError::Config(format!("cannot read {}: {}", path.display(), err)))?;
        Self::from_json(&json)
    }

    /// Check tuning values and the column layout.
    pub fn validate(&self) -> Result<(), StitchError> {
        if !(self.distance_threshold > 0.0) {
            return Err(StitchError::Config(format!(
                "distance_threshold must be positive, got {}",
                self.distance_threshold
            )));
        }
        if self.time_period == 0 {
            return Err(StitchError::Config("time_period must be positive".to_string()));
        }
        self.column_schema()?;
        Ok(())
    }

    pub fn column_schema(&self) -> Result<ColumnSchema, StitchError> {
        ColumnSchema::new(&self.columns, &self.profiles)
    }

    pub fn gap_filler(&self) -> GapFiller {
        GapFiller {
            time_period: self.time_period,
            missing_value: self.missing_value,
        }
    }

    pub fn detector(&self) -> OverlapDetector {
        OverlapDetector::new(self.distance_threshold)
    }

    pub fn merger(&self) -> Result<TrackFileMerger, StitchError> {
        Ok(TrackFileMerger::new(self.column_schema()?).with_policy(self.extend_odd))
    }
}
