//! The "GAP" Engine - Missed-detection reconstruction
//!
//! The feature tracker occasionally misses a storm for one or more time
//! steps, so a track jumps from step `n` straight to `n + k`. The GapFiller
//! synthesizes the `k - 1` missing points by linear interpolation toward the
//! new detection:
//! - **Longitude** takes the short way round the 0/360 seam
//! - **Dates** are stepped by the data period with calendar arithmetic
//! - **Profiles** cannot be averaged and are filled with the missing value

use crate::storm::{AuxValue, Storm, TrackPoint, VarKind, VariableSchema};
use crate::StitchError;
use cyclone_env::DataSource;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Fill value for profile variables at synthesized points.
pub const DEFAULT_MISSING_VALUE: f64 = -99.0;

/// Decimal places kept for interpolated longitude and latitude.
const POSITION_DECIMALS: i32 = 6;

/// Decimal places kept for the per-step increment of scalar variables.
const VARIABLE_DELTA_DECIMALS: i32 = 5;

/// Round to a fixed number of decimal places.
pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

/// Round a longitude to the stored precision, keeping it in [0, 360).
fn round_lon(lon: f64) -> f64 {
    let rounded = round_to(lon.rem_euclid(360.0), POSITION_DECIMALS);
    if rounded >= 360.0 {
        rounded - 360.0
    } else {
        rounded
    }
}

/// Per-variable increment for one synthesized step.
enum VariableStep {
    Delta(f64),
    Missing(usize),
}

// ============================================================================
// GAP FILLER
// ============================================================================

/// Interpolation settings for one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GapFiller {
    /// Hours between consecutive time steps of the source data
    pub time_period: u32,

    /// Fill value for profile variables at synthesized points
    pub missing_value: f64,
}

impl Default for GapFiller {
    fn default() -> Self {
        Self {
            time_period: 6,
            missing_value: DEFAULT_MISSING_VALUE,
        }
    }
}

impl GapFiller {
    pub fn new(time_period: u32) -> Self {
        Self {
            time_period,
            ..Default::default()
        }
    }

    /// Append `gap_length - 1` interpolated points to `storm`, leading up to
    /// (but not including) `new_point`.
    ///
    /// The caller appends `new_point` itself afterwards. A `gap_length` of 1
    /// synthesizes nothing.
    pub fn fill_gap(
        &self,
        storm: &mut Storm,
        new_point: &TrackPoint,
        gap_length: i64,
        source: &dyn DataSource,
    ) -> Result<(), StitchError> {
        if gap_length < 1 {
            return Err(StitchError::malformed(format!(
                "gap length must be at least 1, got {gap_length}"
            )));
        }
        let last = storm
            .last()
            .cloned()
            .ok_or_else(|| StitchError::malformed("cannot fill a gap in an empty storm"))?;
        storm.schema().check(&new_point.vars)?;

        let nx = source.grid_width();
        if nx == 0 {
            return Err(StitchError::malformed("data source has zero grid width"));
        }
        let calendar = source.calendar();
        let period = self.time_period as i64;

        let n = gap_length as f64;
        let dlon = ((new_point.lon - last.lon + 180.0).rem_euclid(360.0) - 180.0) / n;
        let dlat = (new_point.lat - last.lat) / n;
        // Grid index crosses the seam the same way as longitude
        let width = nx as f64;
        let di = ((new_point.i - last.i) as f64 + width / 2.0).rem_euclid(width) - width / 2.0;
        let di = di / n;
        let dj = (new_point.j - last.j) as f64 / n;

        let steps: Vec<VariableStep> = storm
            .schema()
            .specs()
            .iter()
            .zip(last.vars.iter().zip(&new_point.vars))
            .map(|(spec, pair)| match (spec.kind, pair) {
                (VarKind::Scalar, (AuxValue::Scalar(old), AuxValue::Scalar(new))) => {
                    VariableStep::Delta(round_to((new - old) / n, VARIABLE_DELTA_DECIMALS))
                }
                (_, (_, AuxValue::Profile(profile))) => VariableStep::Missing(profile.len()),
                // schema.check has already matched kinds on both ends
                (_, (_, AuxValue::Scalar(_))) => VariableStep::Delta(0.0),
            })
            .collect();

        // Build every point before touching the storm so a failure leaves it unchanged
        let mut synthesized = Vec::with_capacity((gap_length - 1) as usize);
        let mut previous = last.clone();
        for g in 1..gap_length {
            let vars = previous
                .vars
                .iter()
                .zip(&steps)
                .map(|(value, step)| match (value, step) {
                    (AuxValue::Scalar(v), VariableStep::Delta(d)) => AuxValue::Scalar(v + d),
                    (_, VariableStep::Missing(len)) => AuxValue::Profile(vec![self.missing_value; *len]),
                    (other, VariableStep::Delta(_)) => other.clone(),
                })
                .collect();

            let point = TrackPoint {
                time: calendar.add_hours(previous.time, period)?,
                lon: round_lon(previous.lon + dlon),
                lat: round_to(previous.lat + dlat, POSITION_DECIMALS),
                i: (last.i as f64 + g as f64 * di).rem_euclid(nx as f64).trunc() as i64,
                j: (last.j as f64 + g as f64 * dj).trunc() as i64,
                step: previous.step + 1,
                track_id: last.track_id,
                vars,
            };
            synthesized.push(point.clone());
            previous = point;
        }
        for point in synthesized {
            storm.push(point)?;
        }

        debug!(
            "track {}: filled {} missing step(s) before step {}",
            storm.track_id(),
            gap_length - 1,
            new_point.step
        );
        Ok(())
    }

    /// Append a detection to `storm`, filling any step gap first.
    pub fn append(
        &self,
        storm: &mut Storm,
        point: TrackPoint,
        source: &dyn DataSource,
    ) -> Result<(), StitchError> {
        if let Some(last_step) = storm.last().map(|p| p.step) {
            if point.step <= last_step {
                return Err(StitchError::malformed(format!(
                    "track {}: detection at step {} does not follow step {}",
                    storm.track_id(),
                    point.step,
                    last_step
                )));
            }
            let gap_length = point.step - last_step;
            if gap_length > 1 {
                self.fill_gap(storm, &point, gap_length, source)?;
            }
        }
        storm.push(point)
    }

    /// Assemble a window's storms from its detections.
    ///
    /// Detections are grouped by `track_id`; storms come out in order of
    /// their first detection, each gap-free.
    pub fn assemble_window(
        &self,
        detections: impl IntoIterator<Item = TrackPoint>,
        schema: &Arc<VariableSchema>,
        source: &dyn DataSource,
    ) -> Result<Vec<Storm>, StitchError> {
        let mut storms: Vec<Storm> = Vec::new();
        let mut by_track: HashMap<usize, usize> = HashMap::new();

        for point in detections {
            let index = *by_track.entry(point.track_id).or_insert_with(|| {
                storms.push(Storm::new(point.track_id, Arc::clone(schema)));
                storms.len() - 1
            });
            self.append(&mut storms[index], point, source)?;
        }
        Ok(storms)
    }
}

// ============================================================================
// TESTS
// ============================================================================
