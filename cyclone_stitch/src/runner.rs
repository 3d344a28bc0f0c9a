//! Window-pair runner - reads, detects, reconciles.

use crate::config::StitchConfig;
use cyclone_core::{
    describe_variable, ensure_uniform_variables, guess_variable_units, read_track_file, write_track_file,
    MergeSummary, OverlapMethod, StitchError, Storm, TrackPoint, VariableMetadata,
};
use cyclone_env::{CalendarDateTime, DataSource, GridSource};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

/// Which window of the pair a file belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Window {
    Previous,
    Current,
}

impl FromStr for Window {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "previous" | "prev" => Ok(Self::Previous),
            "current" | "curr" => Ok(Self::Current),
            _ => Err(format!("Unknown window: {}. Use: previous, current", s)),
        }
    }
}

/// Input and output files of one stitch.
#[derive(Debug, Clone)]
pub struct PairPaths {
    pub previous_in: PathBuf,
    pub current_in: PathBuf,
    pub previous_out: PathBuf,
    pub current_out: PathBuf,
}

/// One detected overlap, as reported to the user.
#[derive(Debug, Clone, Serialize)]
pub struct MatchReport {
    pub early_track: usize,
    pub late_track: usize,
    pub method: OverlapMethod,
    pub offset: i64,
    pub first_shared: String,
}

/// Results from stitching a window pair.
#[derive(Debug, Clone, Serialize)]
pub struct StitchReport {
    /// First time point of the previous window
    pub previous_start: String,

    /// First time point of the current window
    pub current_start: String,

    /// Tracks read from the previous window
    pub previous_tracks: usize,

    /// Tracks read from the current window
    pub current_tracks: usize,

    /// Matches in current-window order
    pub matches: Vec<MatchReport>,

    /// What the file rewrite changed
    pub merge: MergeSummary,
}

/// Results from gap-filling one track file.
#[derive(Debug, Clone, Serialize)]
pub struct FillReport {
    pub tracks: usize,
    pub points_read: usize,
    pub points_written: usize,
}

/// Metadata of one variable column.
#[derive(Debug, Clone, Serialize)]
pub struct VariableDescription {
    pub name: String,
    #[serde(flatten)]
    pub metadata: VariableMetadata,
}

/// Runs the stitching pipeline for a configured window pair.
pub struct WindowPairRunner {
    config: StitchConfig,
}

impl WindowPairRunner {
    /// Creates a runner, validating the config.
    pub fn new(config: StitchConfig) -> Result<Self, StitchError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &StitchConfig {
        &self.config
    }

    fn source(&self, window: Window) -> &GridSource {
        match window {
            Window::Previous => &self.config.previous_source,
            Window::Current => &self.config.current_source,
        }
    }

    /// Read a window's track file.
    pub fn read_window(&self, path: &Path, window: Window) -> Result<Vec<Storm>, StitchError> {
        let schema = self.config.column_schema()?;
        let storms = read_track_file(path, &schema, self.source(window), self.config.time_period)?;
        ensure_uniform_variables(&storms)?;
        Ok(storms)
    }

    /// Detect overlaps between the two windows and rewrite both files.
    pub fn stitch(&self, paths: &PairPaths) -> Result<StitchReport, StitchError> {
        let previous_start = self.window_start(Window::Previous)?;
        let current_start = self.window_start(Window::Current)?;
        let previous = self.read_window(&paths.previous_in, Window::Previous)?;
        let current = self.read_window(&paths.current_in, Window::Current)?;
        info!(
            "Stitching {} previous tracks (from {}) and {} current tracks (from {})",
            previous.len(),
            previous_start,
            current.len(),
            current_start
        );

        let records = self.config.detector().detect(&previous, &current);
        let matches = records
            .iter()
            .map(|record| MatchReport {
                early_track: record.early.track_id(),
                late_track: record.late.track_id(),
                method: record.method,
                offset: record.offset,
                first_shared: record.late.points()[record.time_c].time.to_string(),
            })
            .collect();
        info!("Found {} overlapping tracks", records.len());

        let merge = self.config.merger()?.reconcile(
            &paths.previous_in,
            &paths.current_in,
            &paths.previous_out,
            &paths.current_out,
            &records,
        )?;

        Ok(StitchReport {
            previous_start: previous_start.to_string(),
            current_start: current_start.to_string(),
            previous_tracks: previous.len(),
            current_tracks: current.len(),
            matches,
            merge,
        })
    }

    /// Rewrite a track file with every step gap filled.
    pub fn fill(&self, input: &Path, output: &Path, window: Window) -> Result<FillReport, StitchError> {
        let schema = self.config.column_schema()?;
        let storms = self.read_window(input, window)?;
        let points_read: usize = storms.iter().map(Storm::len).sum();

        let detections: Vec<TrackPoint> = storms.iter().flat_map(|s| s.points().iter().cloned()).collect();
        let filled = self
            .config
            .gap_filler()
            .assemble_window(detections, schema.variables(), self.source(window))?;
        let points_written: usize = filled.iter().map(Storm::len).sum();
        debug!("Filled {} missing points", points_written - points_read);

        write_track_file(output, &filled, &schema)?;
        info!(
            "Wrote {} tracks ({} points, {} synthesized) to {}",
            filled.len(),
            points_written,
            points_written - points_read,
            output.display()
        );

        Ok(FillReport {
            tracks: filled.len(),
            points_read,
            points_written,
        })
    }

    /// Describe every variable column of the configured layout.
    pub fn describe_variables(&self) -> Result<Vec<VariableDescription>, StitchError> {
        let schema = self.config.column_schema()?;
        let names: Vec<&str> = schema.variables().names().collect();
        let units = guess_variable_units(names.iter().copied(), &self.config.variable_units);
        Ok(names
            .into_iter()
            .map(|name| VariableDescription {
                name: name.to_string(),
                metadata: describe_variable(name, &units),
            })
            .collect())
    }

    /// Date of the first time point of a window.
    pub fn window_start(&self, window: Window) -> Result<CalendarDateTime, StitchError> {
        Ok(self.source(window).first_time()?)
    }
}

// ============================================================================
// TESTS
// ============================================================================
