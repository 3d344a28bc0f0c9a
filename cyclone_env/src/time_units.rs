//! CF time units (`"hours since 1979-01-01 00:00:00"`) and conversions
//! between numeric time coordinates and calendar dates.

use crate::{Calendar, CalendarDateTime, EnvError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Unit of a numeric time coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeUnit {
    Days,
    Hours,
    Minutes,
    Seconds,
}

impl TimeUnit {
    /// Length of one unit in seconds.
    pub fn seconds(&self) -> f64 {
        match self {
            TimeUnit::Days => 86_400.0,
            TimeUnit::Hours => 3_600.0,
            TimeUnit::Minutes => 60.0,
            TimeUnit::Seconds => 1.0,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            TimeUnit::Days => "days",
            TimeUnit::Hours => "hours",
            TimeUnit::Minutes => "minutes",
            TimeUnit::Seconds => "seconds",
        }
    }
}

impl FromStr for TimeUnit {
    type Err = EnvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "days" | "day" | "d" => Ok(TimeUnit::Days),
            "hours" | "hour" | "hrs" | "hr" | "h" => Ok(TimeUnit::Hours),
            "minutes" | "minute" | "mins" | "min" => Ok(TimeUnit::Minutes),
            "seconds" | "second" | "secs" | "sec" | "s" => Ok(TimeUnit::Seconds),
            _ => Err(EnvError::InvalidTimeUnits(s.to_string())),
        }
    }
}

/// Parsed CF time units: a unit and a reference epoch.
///
/// Dates are resolved to the hour; the epoch may carry minutes and seconds,
/// which are folded into `epoch_offset_seconds`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeUnits {
    pub unit: TimeUnit,
    pub epoch: CalendarDateTime,
    pub epoch_offset_seconds: i64,
}

impl TimeUnits {
    pub fn new(unit: TimeUnit, epoch: CalendarDateTime) -> Self {
        Self {
            unit,
            epoch,
            epoch_offset_seconds: 0,
        }
    }

    /// Convert a numeric time value to a date, rounded to the nearest hour.
    pub fn num2date(&self, value: f64, calendar: Calendar) -> Result<CalendarDateTime, EnvError> {
        let seconds = value * self.unit.seconds() + self.epoch_offset_seconds as f64;
        let hours = (seconds / 3_600.0).round() as i64;
        calendar.add_hours(self.epoch, hours)
    }

    /// Convert a date to a numeric time value in these units.
    pub fn date2num(&self, dt: CalendarDateTime, calendar: Calendar) -> Result<f64, EnvError> {
        let seconds = calendar.hours_between(self.epoch, dt)? * 3_600 - self.epoch_offset_seconds;
        Ok(seconds as f64 / self.unit.seconds())
    }
}

impl fmt::Display for TimeUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let minutes = self.epoch_offset_seconds / 60;
        let seconds = self.epoch_offset_seconds % 60;
        write!(
            f,
            "{} since {:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.unit.name(),
            self.epoch.year,
            self.epoch.month,
            self.epoch.day,
            self.epoch.hour,
            minutes,
            seconds
        )
    }
}

impl FromStr for TimeUnits {
    type Err = EnvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || EnvError::InvalidTimeUnits(s.to_string());

        let (unit, reference) = s.split_once(" since ").ok_or_else(invalid)?;
        let unit: TimeUnit = unit.trim().parse().map_err(|_| invalid())?;

        // "1979-1-1", "1979-01-01 06:00:00", "1979-01-01T06:00"
        let mut parts = reference.trim().splitn(2, |c: char| c == ' ' || c == 'T');
        let date = parts.next().ok_or_else(invalid)?;
        let clock = parts
            .next()
            .and_then(|rest| rest.split_whitespace().next())
            .unwrap_or("0");

        let mut ymd = date.splitn(3, '-');
        let next_field = |fields: &mut std::str::SplitN<'_, char>| {
            fields.next().and_then(|v| v.parse::<i64>().ok()).ok_or_else(invalid)
        };
        let year = next_field(&mut ymd)?;
        let month = next_field(&mut ymd)?;
        let day = next_field(&mut ymd)?;

        let mut hms = clock.splitn(3, ':');
        let hour = next_field(&mut hms)?;
        let minute = hms.next().map(|v| v.parse::<f64>()).transpose().map_err(|_| invalid())?;
        let second = hms.next().map(|v| v.parse::<f64>()).transpose().map_err(|_| invalid())?;

        if !(0..24).contains(&hour) || month < 1 || day < 1 {
            return Err(invalid());
        }

        Ok(Self {
            unit,
            epoch: CalendarDateTime::new(year as i32, month as u32, day as u32, hour as u32),
            epoch_offset_seconds: (minute.unwrap_or(0.0) * 60.0 + second.unwrap_or(0.0)).round() as i64,
        })
    }
}

impl TryFrom<String> for TimeUnits {
    type Error = EnvError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeUnits> for String {
    fn from(units: TimeUnits) -> Self {
        units.to_string()
    }
}
