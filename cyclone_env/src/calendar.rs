//! CF calendars and calendar-aware date arithmetic.
//!
//! Storm points carry `(year, month, day, hour)` in whatever calendar the
//! model ran with. Stepping a date forward by a fixed number of hours must
//! roll months and years over according to that calendar, so every
//! calendar maps dates onto an ordinal day count and back.

use crate::EnvError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Cumulative day count at the start of each month in a 365-day year.
const CUMULATIVE_DAYS_NOLEAP: [i64; 12] = [0, 31, 59, 90, 120, 151, 181, 212, 243, 273, 304, 334];

/// Cumulative day count at the start of each month in a 366-day year.
const CUMULATIVE_DAYS_LEAP: [i64; 12] = [0, 31, 60, 91, 121, 152, 182, 213, 244, 274, 305, 335];

/// Julian day number of 1582-10-15, the first Gregorian day of the standard calendar.
const GREGORIAN_REFORM_JDN: i64 = 2_299_161;

// ============================================================================
// CALENDAR DATE/TIME
// ============================================================================

/// A calendar date with hour resolution.
///
/// Field order gives the derived ordering: for dates in one calendar it is
/// chronological.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CalendarDateTime {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
}

impl CalendarDateTime {
    pub const fn new(year: i32, month: u32, day: u32, hour: u32) -> Self {
        Self { year, month, day, hour }
    }
}

impl fmt::Display for CalendarDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:00",
            self.year, self.month, self.day, self.hour
        )
    }
}

// ============================================================================
// CALENDAR
// ============================================================================

/// The CF calendars a data source may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Calendar {
    /// Mixed Julian/Gregorian (`standard`, `gregorian`), reform at 1582-10-15
    Standard,

    /// Gregorian rules extended backwards indefinitely
    ProlepticGregorian,

    /// Julian rules: every fourth year is a leap year
    Julian,

    /// 365 days every year (`noleap`, `365_day`)
    NoLeap,

    /// 366 days every year
    AllLeap,

    /// Twelve 30-day months
    Day360,
}

impl Calendar {
    /// Returns every supported calendar.
    pub fn all() -> [Calendar; 6] {
        [
            Calendar::Standard,
            Calendar::ProlepticGregorian,
            Calendar::Julian,
            Calendar::NoLeap,
            Calendar::AllLeap,
            Calendar::Day360,
        ]
    }

    /// Canonical CF identifier for this calendar.
    pub fn identifier(&self) -> &'static str {
        match self {
            Calendar::Standard => "standard",
            Calendar::ProlepticGregorian => "proleptic_gregorian",
            Calendar::Julian => "julian",
            Calendar::NoLeap => "noleap",
            Calendar::AllLeap => "all_leap",
            Calendar::Day360 => "360_day",
        }
    }

    /// Whether `year` has a 29th of February.
    pub fn is_leap_year(&self, year: i32) -> bool {
        match self {
            Calendar::NoLeap | Calendar::Day360 => false,
            Calendar::AllLeap => true,
            Calendar::Julian => julian_leap(year),
            Calendar::ProlepticGregorian => gregorian_leap(year),
            Calendar::Standard => {
                if year < 1583 {
                    julian_leap(year)
                } else {
                    gregorian_leap(year)
                }
            }
        }
    }

    /// Number of days in `month` of `year`.
    pub fn days_in_month(&self, year: i32, month: u32) -> u32 {
        if *self == Calendar::Day360 {
            return 30;
        }
        match month {
            1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
            4 | 6 | 9 | 11 => 30,
            2 if self.is_leap_year(year) => 29,
            2 => 28,
            _ => 0,
        }
    }

    /// Check that `dt` names a real date and hour in this calendar.
    pub fn validate(&self, dt: CalendarDateTime) -> Result<(), EnvError> {
        let valid_month = (1..=12).contains(&dt.month);
        let valid_day = valid_month && dt.day >= 1 && dt.day <= self.days_in_month(dt.year, dt.month);
        let in_reform_gap = *self == Calendar::Standard
            && dt.year == 1582
            && dt.month == 10
            && (5..=14).contains(&dt.day);

        if !valid_day || dt.hour > 23 || in_reform_gap {
            return Err(EnvError::invalid_date(dt, self));
        }
        Ok(())
    }

    /// Ordinal day count of the date part of `dt`.
    ///
    /// The epoch is calendar specific (Julian day number for the real-world
    /// calendars, year zero for the idealized ones); only differences between
    /// day numbers of the same calendar are meaningful.
    pub fn day_number(&self, dt: CalendarDateTime) -> Result<i64, EnvError> {
        self.validate(dt)?;
        let (year, month, day) = (dt.year as i64, dt.month as i64, dt.day as i64);
        let month_index = (dt.month - 1) as usize;

        Ok(match self {
            Calendar::Day360 => year * 360 + (month - 1) * 30 + (day - 1),
            Calendar::NoLeap => year * 365 + CUMULATIVE_DAYS_NOLEAP[month_index] + (day - 1),
            Calendar::AllLeap => year * 366 + CUMULATIVE_DAYS_LEAP[month_index] + (day - 1),
            Calendar::Julian => julian_jdn(year, month, day),
            Calendar::ProlepticGregorian => gregorian_jdn(year, month, day),
            Calendar::Standard => {
                if (dt.year, dt.month, dt.day) >= (1582, 10, 15) {
                    gregorian_jdn(year, month, day)
                } else {
                    julian_jdn(year, month, day)
                }
            }
        })
    }

    /// Inverse of [`Calendar::day_number`], at the given hour.
    pub fn from_day_number(&self, day_number: i64, hour: u32) -> CalendarDateTime {
        let (year, month, day) = match self {
            Calendar::Day360 => {
                let year = day_number.div_euclid(360);
                let day_of_year = day_number.rem_euclid(360);
                (year, day_of_year / 30 + 1, day_of_year % 30 + 1)
            }
            Calendar::NoLeap => split_fixed_year(day_number, 365, &CUMULATIVE_DAYS_NOLEAP),
            Calendar::AllLeap => split_fixed_year(day_number, 366, &CUMULATIVE_DAYS_LEAP),
            Calendar::Julian => julian_from_jdn(day_number),
            Calendar::ProlepticGregorian => gregorian_from_jdn(day_number),
            Calendar::Standard => {
                if day_number >= GREGORIAN_REFORM_JDN {
                    gregorian_from_jdn(day_number)
                } else {
                    julian_from_jdn(day_number)
                }
            }
        };
        CalendarDateTime::new(year as i32, month as u32, day as u32, hour)
    }

    /// Hours elapsed since this calendar's day-number epoch.
    pub fn hour_number(&self, dt: CalendarDateTime) -> Result<i64, EnvError> {
        Ok(self.day_number(dt)? * 24 + dt.hour as i64)
    }

    /// Step `dt` by `hours` (negative steps go backwards).
    pub fn add_hours(&self, dt: CalendarDateTime, hours: i64) -> Result<CalendarDateTime, EnvError> {
        let total = self.hour_number(dt)? + hours;
        Ok(self.from_day_number(total.div_euclid(24), total.rem_euclid(24) as u32))
    }

    /// Signed number of hours from `from` to `to`.
    pub fn hours_between(&self, from: CalendarDateTime, to: CalendarDateTime) -> Result<i64, EnvError> {
        Ok(self.hour_number(to)? - self.hour_number(from)?)
    }
}

impl fmt::Display for Calendar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.identifier())
    }
}

impl FromStr for Calendar {
    type Err = EnvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "standard" | "gregorian" => Ok(Calendar::Standard),
            "proleptic_gregorian" => Ok(Calendar::ProlepticGregorian),
            "julian" => Ok(Calendar::Julian),
            "noleap" | "365_day" => Ok(Calendar::NoLeap),
            "all_leap" => Ok(Calendar::AllLeap),
            "360_day" => Ok(Calendar::Day360),
            _ => Err(EnvError::UnknownCalendar(s.to_string())),
        }
    }
}

impl TryFrom<String> for Calendar {
    type Error = EnvError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Calendar> for String {
    fn from(calendar: Calendar) -> Self {
        calendar.identifier().to_string()
    }
}

// ============================================================================
// DAY NUMBER HELPERS
// ============================================================================

fn julian_leap(year: i32) -> bool {
    year.rem_euclid(4) == 0
}

fn gregorian_leap(year: i32) -> bool {
    (year.rem_euclid(4) == 0 && year.rem_euclid(100) != 0) || year.rem_euclid(400) == 0
}

/// Split a day count of a calendar with fixed-length years into (year, month, day).
fn split_fixed_year(day_number: i64, year_length: i64, cumulative: &[i64; 12]) -> (i64, i64, i64) {
    let year = day_number.div_euclid(year_length);
    let day_of_year = day_number.rem_euclid(year_length);
    let month_index = cumulative
        .iter()
        .rposition(|&start| start <= day_of_year)
        .unwrap_or(0);
    (year, month_index as i64 + 1, day_of_year - cumulative[month_index] + 1)
}

/// Shifted year/month used by the Fliegel–Van Flandern day number formulas.
fn shifted(year: i64, month: i64) -> (i64, i64) {
    let a = (14 - month) / 12;
    (year + 4800 - a, month + 12 * a - 3)
}

fn gregorian_jdn(year: i64, month: i64, day: i64) -> i64 {
    let (y, m) = shifted(year, month);
    day + (153 * m + 2) / 5 + 365 * y + y.div_euclid(4) - y.div_euclid(100) + y.div_euclid(400) - 32045
}

fn julian_jdn(year: i64, month: i64, day: i64) -> i64 {
    let (y, m) = shifted(year, month);
    day + (153 * m + 2) / 5 + 365 * y + y.div_euclid(4) - 32083
}

fn gregorian_from_jdn(jdn: i64) -> (i64, i64, i64) {
    let a = jdn + 32044;
    let b = (4 * a + 3).div_euclid(146_097);
    let c = a - (146_097 * b).div_euclid(4);
    let (year, month, day) = month_day_from(c);
    (100 * b + year, month, day)
}

fn julian_from_jdn(jdn: i64) -> (i64, i64, i64) {
    month_day_from(jdn + 32082)
}

/// Shared tail of the inverse day number formulas.
fn month_day_from(c: i64) -> (i64, i64, i64) {
    let d = (4 * c + 3).div_euclid(1461);
    let e = c - (1461 * d).div_euclid(4);
    let m = (5 * e + 2).div_euclid(153);
    let day = e - (153 * m + 2).div_euclid(5) + 1;
    let month = m + 3 - 12 * m.div_euclid(10);
    let year = d - 4800 + m.div_euclid(10);
    (year, month, day)
}

// ============================================================================
// TESTS
// ============================================================================
