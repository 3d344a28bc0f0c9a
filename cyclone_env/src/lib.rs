//! Cyclone Environment Abstraction Layer
//!
//! This crate is the boundary between the stitching engines and the gridded
//! model data they were detected in. The engines never load model fields;
//! they only need three things from a window's source data:
//! - **Calendar**: which CF calendar the dates live in (`noleap`, `360_day`, ...)
//! - **Grid shape**: the periodic width `nx` used to wrap grid index `i`
//! - **Time coordinate**: `num2date` of the first time point, for step numbers
//!
//! # Example
//!
//! ```ignore
//! use cyclone_env::{Calendar, CalendarDateTime, DataSource, GridSource};
//!
//! let start = CalendarDateTime::new(1979, 1, 1, 0);
//! let source = GridSource::regular(Calendar::NoLeap, vec![40, 324, 432], start, 6, 40)?;
//! let step = source.step_of(CalendarDateTime::new(1979, 1, 2, 0), 6)?; // 5
//! ```

mod calendar;
mod error;
mod source;
mod time_units;

pub use calendar::{Calendar, CalendarDateTime};
pub use error::EnvError;
pub use source::{DataSource, GridSource, TimeCoordinate};
pub use time_units::{TimeUnit, TimeUnits};
