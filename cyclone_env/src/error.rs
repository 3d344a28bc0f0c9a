//! Error types for the cyclone environment abstraction.

use thiserror::Error;

/// Errors that can occur in the time system or data-source layer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EnvError {
    /// Calendar identifier is not one of the supported CF calendars
    #[error("Unknown calendar: {0}")]
    UnknownCalendar(String),
    
    /// Date does not exist in the given calendar
    #[error("Invalid date {date} in {calendar} calendar")]
    InvalidDate { date: String, calendar: String },
    
    /// CF time units string could not be parsed
    #[error("Invalid time units: {0}")]
    InvalidTimeUnits(String),
    
    /// Time coordinate has no points
    #[error("Time coordinate is empty")]
    EmptyTimeCoordinate,
    
    /// Time period between steps must be positive
    #[error("Invalid time period: {0} hours")]
    InvalidTimePeriod(u32),
}

impl EnvError {
    /// Creates an invalid date error.
    pub fn invalid_date(date: impl std::fmt::Display, calendar: impl std::fmt::Display) -> Self {
        Self::InvalidDate {
            date: date.to_string(),
            calendar: calendar.to_string(),
        }
    }
}
