//! The data-source handle the stitching engines see in place of model data.

use crate::{Calendar, CalendarDateTime, EnvError, TimeUnit, TimeUnits};
use serde::{Deserialize, Serialize};

/// Numeric time coordinate of a window's source data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeCoordinate {
    /// CF units string, e.g. `"hours since 1979-01-01 00:00:00"`
    pub units: TimeUnits,

    /// Time values in `units`
    pub points: Vec<f64>,
}

/// Read-only view of the gridded data a window was tracked in.
///
/// The engines only ever ask for calendar metadata, grid shape and the time
/// coordinate; loading the fields themselves happens elsewhere.
///
/// # Implementations
///
/// - [`GridSource`]: plain in-memory description (config files, tests)
pub trait DataSource {
    /// Calendar of the time coordinate.
    fn calendar(&self) -> Calendar;

    /// Shape of the data, horizontal grid last (`[..., ny, nx]`).
    fn shape(&self) -> &[usize];

    /// Time coordinate of the window.
    fn time_coordinate(&self) -> &TimeCoordinate;

    /// Periodic width `nx` of the horizontal grid.
    fn grid_width(&self) -> usize {
        self.shape().last().copied().unwrap_or(0)
    }

    /// Date of the first time point of the window.
    fn first_time(&self) -> Result<CalendarDateTime, EnvError> {
        let coordinate = self.time_coordinate();
        let first = coordinate.points.first().ok_or(EnvError::EmptyTimeCoordinate)?;
        coordinate.units.num2date(*first, self.calendar())
    }

    /// Step number of `dt` within the window; the first time point is step 1.
    fn step_of(&self, dt: CalendarDateTime, time_period: u32) -> Result<i64, EnvError> {
        if time_period == 0 {
            return Err(EnvError::InvalidTimePeriod(time_period));
        }
        let hours = self.calendar().hours_between(self.first_time()?, dt)?;
        Ok((hours as f64 / time_period as f64).round() as i64 + 1)
    }
}

/// In-memory data source description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSource {
    pub calendar: Calendar,
    pub shape: Vec<usize>,
    pub time: TimeCoordinate,
}

impl GridSource {
    /// Creates a source from its parts.
    pub fn new(calendar: Calendar, shape: Vec<usize>, time: TimeCoordinate) -> Self {
        Self { calendar, shape, time }
    }

    /// Creates a source with `count` time points every `period_hours`
    /// starting at `start`.
    pub fn regular(
        calendar: Calendar,
        shape: Vec<usize>,
        start: CalendarDateTime,
        period_hours: u32,
        count: usize,
    ) -> Result<Self, EnvError> {
        calendar.validate(start)?;
        if period_hours == 0 {
            return Err(EnvError::InvalidTimePeriod(period_hours));
        }
        let points = (0..count).map(|n| (n as u32 * period_hours) as f64).collect();
        Ok(Self::new(
            calendar,
            shape,
            TimeCoordinate {
                units: TimeUnits::new(TimeUnit::Hours, start),
                points,
            },
        ))
    }
}

impl DataSource for GridSource {
    fn calendar(&self) -> Calendar {
        self.calendar
    }

    fn shape(&self) -> &[usize] {
        &self.shape
    }

    fn time_coordinate(&self) -> &TimeCoordinate {
        &self.time
    }
}
