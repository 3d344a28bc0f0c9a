//! The storm record: one tracked feature's point sequence within a window.
//!
//! A [`Storm`] owns an ordered list of [`TrackPoint`]s that all share one
//! [`VariableSchema`]. Points enter only through [`Storm::push`], which checks
//! the auxiliary variables against the schema, keeps `step` strictly
//! increasing and normalizes longitude into [0, 360).

use crate::StitchError;
use cyclone_env::CalendarDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

// ============================================================================
// AUXILIARY VARIABLES
// ============================================================================

/// Whether an auxiliary variable holds one number or a fixed-length vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarKind {
    /// Interpolable single value
    Scalar,

    /// Vector per point (e.g. a radial profile); never interpolated
    Profile,
}

/// Name and kind of one auxiliary variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VariableSpec {
    pub name: String,
    pub kind: VarKind,
}

impl VariableSpec {
    pub fn scalar(name: impl Into<String>) -> Self {
        Self { name: name.into(), kind: VarKind::Scalar }
    }

    pub fn profile(name: impl Into<String>) -> Self {
        Self { name: name.into(), kind: VarKind::Profile }
    }
}

/// Ordered auxiliary variables carried by every point of a storm.
///
/// The order is the track-file column order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VariableSchema {
    specs: Vec<VariableSpec>,
}

impl VariableSchema {
    pub fn new(specs: Vec<VariableSpec>) -> Self {
        Self { specs }
    }

    pub fn specs(&self) -> &[VariableSpec] {
        &self.specs
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.specs.iter().map(|spec| spec.name.as_str())
    }

    /// Position of `name` in the schema.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.specs.iter().position(|spec| spec.name == name)
    }

    /// Check that `values` has one entry per variable, of the declared kind.
    pub fn check(&self, values: &[AuxValue]) -> Result<(), StitchError> {
        if values.len() != self.specs.len() {
            return Err(StitchError::malformed(format!(
                "point carries {} auxiliary values, schema declares {}",
                values.len(),
                self.specs.len()
            )));
        }
        for (spec, value) in self.specs.iter().zip(values) {
            if spec.kind != value.kind() {
                return Err(StitchError::malformed(format!(
                    "variable '{}' declared {:?} but point holds {:?}",
                    spec.name,
                    spec.kind,
                    value.kind()
                )));
            }
        }
        Ok(())
    }
}

/// Value of one auxiliary variable at one point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AuxValue {
    Scalar(f64),
    Profile(Vec<f64>),
}

impl AuxValue {
    pub fn kind(&self) -> VarKind {
        match self {
            AuxValue::Scalar(_) => VarKind::Scalar,
            AuxValue::Profile(_) => VarKind::Profile,
        }
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            AuxValue::Scalar(value) => Some(*value),
            AuxValue::Profile(_) => None,
        }
    }
}

// ============================================================================
// POINTS AND DATE KEYS
// ============================================================================

/// One point of a storm track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    /// Calendar date/time of the point
    pub time: CalendarDateTime,

    /// Longitude in degrees east, [0, 360)
    pub lon: f64,

    /// Latitude in degrees north
    pub lat: f64,

    /// Grid index along the periodic x axis
    pub i: i64,

    /// Grid index along y
    pub j: i64,

    /// Time-step count from the start of the source window (first step = 1)
    pub step: i64,

    /// Track number within the window
    pub track_id: usize,

    /// Auxiliary values in schema order
    pub vars: Vec<AuxValue>,
}

/// Per-point date key used for temporal overlap.
///
/// Two keys are equal iff year, month, day and hour are all equal; the
/// ordering is chronological within one calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DateKey(pub CalendarDateTime);

impl From<CalendarDateTime> for DateKey {
    fn from(dt: CalendarDateTime) -> Self {
        Self(dt)
    }
}

impl fmt::Display for DateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dt = self.0;
        write!(f, "{}{:02}{:02}{:02}", dt.year, dt.month, dt.day, dt.hour)
    }
}

/// Fold a longitude into [0, 360).
pub fn normalize_lon(lon: f64) -> f64 {
    let wrapped = lon.rem_euclid(360.0);
    // rem_euclid of a tiny negative value can round up to exactly 360
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

// ============================================================================
// STORM
// ============================================================================

/// A single track: an ordered point sequence with a shared variable schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Storm {
    track_id: usize,
    schema: Arc<VariableSchema>,
    points: Vec<TrackPoint>,
}

impl Storm {
    /// Create an empty storm.
    pub fn new(track_id: usize, schema: Arc<VariableSchema>) -> Self {
        Self {
            track_id,
            schema,
            points: Vec::new(),
        }
    }

    /// Build a storm from points, validating each one.
    pub fn from_points(
        track_id: usize,
        schema: Arc<VariableSchema>,
        points: impl IntoIterator<Item = TrackPoint>,
    ) -> Result<Self, StitchError> {
        let mut storm = Self::new(track_id, schema);
        for point in points {
            storm.push(point)?;
        }
        Ok(storm)
    }

    /// Append a point.
    ///
    /// Fails if the auxiliary values do not match the schema or the step
    /// does not advance past the last point.
    pub fn push(&mut self, mut point: TrackPoint) -> Result<(), StitchError> {
        self.schema.check(&point.vars)?;
        if let Some(last) = self.points.last() {
            if point.step <= last.step {
                return Err(StitchError::malformed(format!(
                    "track {}: step {} does not follow step {}",
                    self.track_id, point.step, last.step
                )));
            }
        }
        point.lon = normalize_lon(point.lon);
        self.points.push(point);
        Ok(())
    }

    pub fn track_id(&self) -> usize {
        self.track_id
    }

    pub fn schema(&self) -> &Arc<VariableSchema> {
        &self.schema
    }

    pub fn points(&self) -> &[TrackPoint] {
        &self.points
    }

    /// Number of points (the track length).
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first(&self) -> Option<&TrackPoint> {
        self.points.first()
    }

    pub fn last(&self) -> Option<&TrackPoint> {
        self.points.last()
    }

    /// Date key of every point, in point order.
    pub fn date_keys(&self) -> Vec<DateKey> {
        self.points.iter().map(|p| DateKey(p.time)).collect()
    }

    /// Date key of the first point.
    pub fn start_key(&self) -> Option<DateKey> {
        self.first().map(|p| DateKey(p.time))
    }

    /// Iterate the values of one auxiliary variable.
    pub fn variable(&self, name: &str) -> Option<impl Iterator<Item = &AuxValue>> {
        let index = self.schema.index_of(name)?;
        Some(self.points.iter().map(move |p| &p.vars[index]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Arc<VariableSchema> {
        Arc::new(VariableSchema::new(vec![
            VariableSpec::scalar("psl"),
            VariableSpec::profile("rprof"),
        ]))
    }

    fn point(step: i64, lon: f64) -> TrackPoint {
        TrackPoint {
            time: CalendarDateTime::new(1980, 1, 1, 0),
            lon,
            lat: 15.0,
            i: 10,
            j: 20,
            step,
            track_id: 0,
            vars: vec![AuxValue::Scalar(100_000.0), AuxValue::Profile(vec![1.0, 2.0])],
        }
    }

    #[test]
    fn test_push_normalizes_longitude() {
        let mut storm = Storm::new(0, schema());
        storm.push(point(1, -10.0)).unwrap();
        storm.push(point(2, 370.0)).unwrap();
        storm.push(point(3, -1e-18)).unwrap();

        let lons: Vec<f64> = storm.points().iter().map(|p| p.lon).collect();
        assert_eq!(lons, vec![350.0, 10.0, 0.0]);
    }

    #[test]
    fn test_push_rejects_non_increasing_step() {
        let mut storm = Storm::new(3, schema());
        storm.push(point(4, 100.0)).unwrap();
        let err = storm.push(point(4, 101.0)).unwrap_err();
        assert!(matches!(err, StitchError::MalformedStorm(_)));
        assert_eq!(storm.len(), 1);
    }

    #[test]
    fn test_push_rejects_schema_mismatch() {
        let mut storm = Storm::new(0, schema());

        let mut missing = point(1, 100.0);
        missing.vars.pop();
        assert!(storm.push(missing).is_err());

        let mut swapped = point(1, 100.0);
        swapped.vars.swap(0, 1);
        assert!(storm.push(swapped).is_err());

        assert!(storm.is_empty());
    }

    #[test]
    fn test_date_key_display_is_zero_padded() {
        let key = DateKey(CalendarDateTime::new(1980, 1, 2, 6));
        assert_eq!(key.to_string(), "1980010206");
    }

    #[test]
    fn test_date_keys_order_chronologically() {
        let early = DateKey(CalendarDateTime::new(1980, 9, 30, 18));
        let late = DateKey(CalendarDateTime::new(1980, 10, 1, 0));
        assert!(early < late);
    }

    #[test]
    fn test_variable_accessor() {
        let storm = Storm::from_points(0, schema(), vec![point(1, 1.0), point(2, 2.0)]).unwrap();
        let psl: Vec<f64> = storm
            .variable("psl")
            .unwrap()
            .filter_map(AuxValue::as_scalar)
            .collect();
        assert_eq!(psl, vec![100_000.0, 100_000.0]);
        assert!(storm.variable("sfcWind").is_none());
    }
}
