//! The "OVERLAP" Engine - Cross-window duplicate detection
//!
//! Adjacent windows share a stretch of model time, so a storm alive across
//! the boundary is tracked twice: once ending in the earlier window and once
//! starting in the later one. Detection runs in two stages:
//! 1. Temporal Overlap (shared date keys)
//! 2. Spatial Gating (lat/lon within a degree threshold at the first shared date)
//!
//! The first candidate passing both stages is classified into an
//! [`OverlapMethod`] telling the merger what to do with the pair.

use crate::storm::{DateKey, Storm};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// Default lat/lon proximity threshold in degrees.
pub const DEFAULT_DISTANCE_THRESHOLD: f64 = 0.5;

// ============================================================================
// OVERLAP RECORD
// ============================================================================

/// How a matched pair of storms is reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapMethod {
    /// The early copy is a duplicate; drop it and keep the late storm as is
    Remove,

    /// The early copy holds the storm's genesis; prepend its first `offset`
    /// points to the late storm
    Extend,

    /// Same start, but the early copy is longer; no rewrite action defined
    ExtendOdd,
}

/// One matched pair of storms from adjacent windows.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlapRecord {
    /// Storm from the previous window
    pub early: Storm,

    /// Storm from the current window
    pub late: Storm,

    /// Index of the first shared date within the late storm
    pub time_c: usize,

    /// Index of the first shared date within the early storm
    pub time_p: usize,

    /// `time_p - time_c`: number of lead-in points for `Extend`
    pub offset: i64,

    pub method: OverlapMethod,
}

// ============================================================================
// STAGE 1: TEMPORAL OVERLAP
// ============================================================================

/// Return every storm in `storms_y` sharing at least one date key with `storm_x`.
pub fn find_temporal_overlap<'a>(storm_x: &Storm, storms_y: &'a [Storm]) -> Vec<&'a Storm> {
    let keys_x: HashSet<DateKey> = storm_x.date_keys().into_iter().collect();
    storms_y
        .iter()
        .filter(|storm| storm.date_keys().iter().any(|key| keys_x.contains(key)))
        .collect()
}

// ============================================================================
// STAGE 2: SPATIAL GATING + CLASSIFICATION
// ============================================================================

/// Classify a spatially matched pair.
///
/// * `len_c`, `len_p` - point counts of the late and early storm
/// * `shared` - number of distinct shared date keys
/// * `time_c`, `time_p` - index of the first shared date in each storm
pub fn classify(len_c: usize, len_p: usize, shared: usize, time_c: usize, time_p: usize) -> OverlapMethod {
    if len_c == len_p && len_p == shared {
        OverlapMethod::Remove
    } else if time_c == time_p {
        if len_c >= len_p {
            OverlapMethod::Remove
        } else {
            OverlapMethod::ExtendOdd
        }
    } else if time_p > time_c {
        OverlapMethod::Extend
    } else {
        OverlapMethod::Remove
    }
}

/// Find the storm in `storms_y` that `storm_c` duplicates, if any.
///
/// Candidates are examined in input order and the first one whose position
/// at the first shared date lies within `distance_threshold` degrees in both
/// latitude and longitude wins. Candidates without a shared date are skipped.
pub fn find_spatial_overlap<'a, I>(
    storm_c: &Storm,
    storms_y: I,
    distance_threshold: f64,
) -> Option<OverlapRecord>
where
    I: IntoIterator<Item = &'a Storm>,
{
    let keys_c = storm_c.date_keys();
    let set_c: HashSet<DateKey> = keys_c.iter().copied().collect();

    for storm_p in storms_y {
        let keys_p = storm_p.date_keys();
        let shared: HashSet<DateKey> = keys_p.iter().copied().filter(|k| set_c.contains(k)).collect();
        let Some(first_shared) = shared.iter().min().copied() else {
            continue;
        };

        let time_c = keys_c.iter().position(|k| *k == first_shared)?;
        let time_p = keys_p.iter().position(|k| *k == first_shared)?;
        let point_c = &storm_c.points()[time_c];
        let point_p = &storm_p.points()[time_p];

        let dist_lat = (point_c.lat - point_p.lat).abs();
        let dist_lon = (point_c.lon - point_p.lon).abs();
        if dist_lat >= distance_threshold || dist_lon >= distance_threshold {
            continue;
        }

        let method = classify(storm_c.len(), storm_p.len(), shared.len(), time_c, time_p);
        debug!(
            "late track {} matches early track {} at {}: time_c={} time_p={} len_c={} len_p={} shared={} -> {:?}",
            storm_c.track_id(),
            storm_p.track_id(),
            first_shared,
            time_c,
            time_p,
            storm_c.len(),
            storm_p.len(),
            shared.len(),
            method
        );

        return Some(OverlapRecord {
            early: storm_p.clone(),
            late: storm_c.clone(),
            time_c,
            time_p,
            offset: time_p as i64 - time_c as i64,
            method,
        });
    }

    None
}

// ============================================================================
// DETECTOR
// ============================================================================

/// Runs both stages for every storm of the current window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlapDetector {
    /// Maximum |Δlat| and |Δlon| (degrees) for two storms to be the same
    pub distance_threshold: f64,
}

impl Default for OverlapDetector {
    fn default() -> Self {
        Self {
            distance_threshold: DEFAULT_DISTANCE_THRESHOLD,
        }
    }
}

impl OverlapDetector {
    pub fn new(distance_threshold: f64) -> Self {
        Self { distance_threshold }
    }

    /// Match every current-window storm against the previous window.
    ///
    /// Returns at most one record per current storm, in current-window order.
    pub fn detect(&self, previous: &[Storm], current: &[Storm]) -> Vec<OverlapRecord> {
        current
            .iter()
            .filter_map(|storm_c| {
                let candidates = find_temporal_overlap(storm_c, previous);
                if candidates.is_empty() {
                    return None;
                }
                find_spatial_overlap(storm_c, candidates, self.distance_threshold)
            })
            .collect()
    }
}

// ============================================================================
// TESTS
// ============================================================================
