use serde::{Deserialize, Serialize};
use std::{cmp, fmt, ops};
use time::{
    Date, PrimitiveDateTime, Time, format_description::BorrowedFormatItem,
    macros::format_description,
};

use crate::error::ValidationError;

type Result<T, E = ValidationError> = std::result::Result<T, E>;

pub const DATE_DESC: &[BorrowedFormatItem<'_>] = format_description!("[year]-[month]-[day]");
pub const TIME_DESC: &[BorrowedFormatItem<'_>] = format_description!("[hour]:[minute]");

/// Type representing the start and end of an event
///
/// Values are wall-clock values in the event's own zone, so two intervals are
/// only comparable when they share a zone.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub struct EventInterval {
    inner: EventIntervalRef,
}

impl EventInterval {
    /// Create date-only interval from start and end dates.
    pub fn new_date(start: Date, end: Date) -> Result<Self> {
        Self::new_checked(EventIntervalRef::Date { start, end })
    }

    /// Create datetime interval from start and end times.
    pub fn new_datetime(start: PrimitiveDateTime, end: PrimitiveDateTime) -> Result<Self> {
        Self::new_checked(EventIntervalRef::DateTime { start, end })
    }

    /// Parse the textual day/time fields of an event.
    ///
    /// Both days are parsed before either time, and time values are ignored
    /// for all-day events.
    pub fn parse(
        start_day: &str,
        start_time: Option<&str>,
        end_day: &str,
        end_time: Option<&str>,
        all_day: bool,
    ) -> Result<Self> {
        let start_date = parse_day(start_day).ok_or(ValidationError::InvalidStartDay)?;
        let end_date = parse_day(end_day).ok_or(ValidationError::InvalidEndDay)?;
        if all_day {
            return Self::new_date(start_date, end_date);
        }
        let start = start_time
            .and_then(parse_time)
            .ok_or(ValidationError::InvalidStartTime)?;
        let end = end_time
            .and_then(parse_time)
            .ok_or(ValidationError::InvalidEndTime)?;
        Self::new_datetime(
            PrimitiveDateTime::new(start_date, start),
            PrimitiveDateTime::new(end_date, end),
        )
    }

    fn new_checked(inner: EventIntervalRef) -> Result<Self> {
        inner.validate()?;
        Ok(Self { inner })
    }
}

pub(crate) fn parse_day(input: &str) -> Option<Date> {
    Date::parse(input, DATE_DESC).ok()
}

pub(crate) fn parse_time(input: &str) -> Option<Time> {
    Time::parse(input, TIME_DESC).ok()
}

impl ops::Deref for EventInterval {
    type Target = EventIntervalRef;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl TryFrom<EventIntervalRef> for EventInterval {
    type Error = ValidationError;
    fn try_from(value: EventIntervalRef) -> Result<Self, Self::Error> {
        value.validate()?;
        Ok(Self { inner: value })
    }
}

impl fmt::Display for EventInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

/// Event interval
// Note: only ref access provided outside this module to maintain EventInterval variants
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum EventIntervalRef {
    Date {
        start: Date,
        end: Date,
    },
    DateTime {
        start: PrimitiveDateTime,
        end: PrimitiveDateTime,
    },
}

/// Chronological by start then end.
///
/// date is (arbitrarily) before datetime when both start at midnight
impl Ord for EventIntervalRef {
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        let res = (self.start(), self.end()).cmp(&(other.start(), other.end()));
        if res != cmp::Ordering::Equal {
            return res;
        }
        match (self.is_date_only(), other.is_date_only()) {
            (true, true) | (false, false) => cmp::Ordering::Equal,
            (true, false) => cmp::Ordering::Less,
            (false, true) => cmp::Ordering::Greater,
        }
    }
}

impl PartialOrd for EventIntervalRef {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl EventIntervalRef {
    /// Start instant. Date-only intervals start at midnight.
    pub fn start(&self) -> PrimitiveDateTime {
        match *self {
            EventIntervalRef::Date { start, .. } => start.midnight(),
            EventIntervalRef::DateTime { start, .. } => start,
        }
    }

    /// End instant. Date-only intervals are taken to end at midnight of the
    /// last day.
    pub fn end(&self) -> PrimitiveDateTime {
        match *self {
            EventIntervalRef::Date { end, .. } => end.midnight(),
            EventIntervalRef::DateTime { end, .. } => end,
        }
    }

    pub fn start_date(&self) -> Date {
        self.start().date()
    }

    pub fn end_date(&self) -> Date {
        self.end().date()
    }

    pub fn is_date_only(&self) -> bool {
        matches!(self, Self::Date { .. })
    }

    /// Whether this interval and `[start, end]` share at least one instant.
    ///
    /// Both ends are inclusive and either bound may be left open.
    pub fn overlaps(&self, start: Option<PrimitiveDateTime>, end: Option<PrimitiveDateTime>) -> bool {
        if start.is_some_and(|start| self.end() < start) {
            return false;
        }
        if end.is_some_and(|end| self.start() > end) {
            return false;
        }
        true
    }

    fn validate(&self) -> Result<()> {
        match *self {
            EventIntervalRef::Date { start, end } => {
                if end < start {
                    return Err(ValidationError::StartDayAfterEndDay);
                }
            }
            EventIntervalRef::DateTime { start, end } => {
                if end.date() < start.date() {
                    return Err(ValidationError::StartDayAfterEndDay);
                }
                if end < start {
                    return Err(ValidationError::StartTimeAfterEndTime);
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for EventIntervalRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventIntervalRef::Date { start, end } => {
                fmt::Display::fmt(start, f)?;
                f.write_str(" - ")?;
                fmt::Display::fmt(end, f)?;
            }
            EventIntervalRef::DateTime { start, end } => {
                write!(
                    f,
                    "{} {:02}:{:02} - {} {:02}:{:02}",
                    start.date(),
                    start.hour(),
                    start.minute(),
                    end.date(),
                    end.hour(),
                    end.minute()
                )?;
            }
        }
        Ok(())
    }
}
