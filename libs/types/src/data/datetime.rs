//! Calendar date, time of day, and their combination

use crate::common::errors::{ValidationError, ValidationResult};
use std::fmt;

/// Calendar date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Date {
    year: u16,
    month: u8,
    day: u8,
}

impl Date {
    pub fn new(year: u16, month: u8, day: u8) -> ValidationResult<Self> {
        if !(1..=12).contains(&month) {
            return Err(ValidationError::invalid("date", format!("month {month}")));
        }
        if day == 0 || day > days_in_month(year, month) {
            return Err(ValidationError::invalid(
                "date",
                format!("day {day} for {year}-{month:02}"),
            ));
        }
        Ok(Self { year, month, day })
    }

    pub fn year(&self) -> u16 {
        self.year
    }

    pub fn month(&self) -> u8 {
        self.month
    }

    pub fn day(&self) -> u8 {
        self.day
    }
}

fn days_in_month(year: u16, month: u8) -> u8 {
    match month {
        4 | 6 | 9 | 11 => 30,
        2 if (year % 4 == 0 && year % 100 != 0) || year % 400 == 0 => 29,
        2 => 28,
        _ => 31,
    }
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

/// Time of day with sub-second precision down to nanoseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Time {
    hour: u8,
    minute: u8,
    second: u8,
    millisecond: u16,
    microsecond: u16,
    nanosecond: u16,
}

impl Time {
    pub fn new(hour: u8, minute: u8, second: u8) -> ValidationResult<Self> {
        Self::with_nanos(hour, minute, second, 0, 0, 0)
    }

    pub fn with_nanos(
        hour: u8,
        minute: u8,
        second: u8,
        millisecond: u16,
        microsecond: u16,
        nanosecond: u16,
    ) -> ValidationResult<Self> {
        // 60 is allowed for leap seconds
        if hour > 23 || minute > 59 || second > 60 {
            return Err(ValidationError::invalid(
                "time",
                format!("{hour:02}:{minute:02}:{second:02}"),
            ));
        }
        if millisecond > 999 || microsecond > 999 || nanosecond > 999 {
            return Err(ValidationError::invalid(
                "time",
                format!("sub-second part {millisecond}.{microsecond}.{nanosecond}"),
            ));
        }
        Ok(Self {
            hour,
            minute,
            second,
            millisecond,
            microsecond,
            nanosecond,
        })
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }

    pub fn second(&self) -> u8 {
        self.second
    }

    pub fn millisecond(&self) -> u16 {
        self.millisecond
    }

    pub fn microsecond(&self) -> u16 {
        self.microsecond
    }

    pub fn nanosecond(&self) -> u16 {
        self.nanosecond
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}.{:03}{:03}{:03}",
            self.hour, self.minute, self.second, self.millisecond, self.microsecond, self.nanosecond
        )
    }
}

/// Date and time pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DateTime {
    pub date: Date,
    pub time: Time,
}

impl DateTime {
    pub fn new(date: Date, time: Time) -> Self {
        Self { date, time }
    }
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}T{}", self.date, self.time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_validates_calendar() {
        assert!(Date::new(2024, 2, 29).is_ok());
        assert!(Date::new(2023, 2, 29).is_err());
        assert!(Date::new(2024, 13, 1).is_err());
        assert_eq!(Date::new(2024, 7, 4).unwrap().to_string(), "2024-07-04");
    }

    #[test]
    fn time_validates_ranges() {
        assert!(Time::new(24, 0, 0).is_err());
        assert!(Time::with_nanos(9, 30, 0, 1000, 0, 0).is_err());
        let time = Time::with_nanos(9, 30, 15, 250, 1, 2).unwrap();
        assert_eq!(time.to_string(), "09:30:15.250001002");
    }
}
