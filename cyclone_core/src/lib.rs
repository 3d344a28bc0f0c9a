//! Cyclone Core - Stitching tropical-cyclone tracks across overlapping windows
//!
//! A long model run is tracked in consecutive, partly overlapping windows.
//! This library turns the per-window track files into one continuous set:
//! 1. **Gap filling**: missed detections are rebuilt by interpolation
//! 2. **Overlap detection**: storms seen in both windows are paired up
//! 3. **File merging**: duplicates are dropped and storm genesis is carried forward

pub mod error;
pub mod gap;
pub mod merge;
pub mod metadata;
pub mod overlap;
pub mod schema;
pub mod storm;
pub mod track_file;

// Re-export key types for convenience
pub use error::StitchError;
pub use gap::GapFiller;
pub use merge::{reconcile, ExtendOddPolicy, MergeSummary, TrackFileMerger};
pub use metadata::{describe_variable, ensure_uniform_variables, guess_variable_units, VariableMetadata};
pub use overlap::{classify, find_spatial_overlap, find_temporal_overlap, OverlapDetector, OverlapMethod, OverlapRecord};
pub use schema::ColumnSchema;
pub use storm::{AuxValue, DateKey, Storm, TrackPoint, VarKind, VariableSchema, VariableSpec};
pub use track_file::{read_track_file, write_track_file};
