//! Cyclone Stitch - Window-pair pipeline over the stitching engines
//!
//! Loads a [`StitchConfig`], reads the track files of two adjacent windows,
//! runs overlap detection and rewrites both files. Also exposes the gap
//! filler as a standalone file-to-file pass.

pub mod config;
pub mod runner;

pub use config::StitchConfig;
pub use runner::{FillReport, PairPaths, StitchReport, VariableDescription, Window, WindowPairRunner};
