use std::{fmt, str::FromStr};

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use time::{Date, Weekday};

use crate::error::ValidationError;

/// Upper bound on the length of a generated series.
pub const MAX_REPEAT_OCCURRENCES: u32 = 30;

/// How a repeating event is expanded into occurrences
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repeat {
    pub freq: Freq,
    /// Only used by [`Freq::Weekly`], where it must be non-empty.
    pub days: DayOfWeek,
    pub end: RepeatEnd,
}

impl Repeat {
    pub fn daily(end: RepeatEnd) -> Self {
        Self::new(Freq::Daily, end)
    }

    pub fn weekly(days: DayOfWeek, end: RepeatEnd) -> Self {
        Self {
            freq: Freq::Weekly,
            days,
            end,
        }
    }

    pub fn monthly(end: RepeatEnd) -> Self {
        Self::new(Freq::Monthly, end)
    }

    pub fn yearly(end: RepeatEnd) -> Self {
        Self::new(Freq::Yearly, end)
    }

    fn new(freq: Freq, end: RepeatEnd) -> Self {
        Self {
            freq,
            days: DayOfWeek::empty(),
            end,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Freq {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Freq {
    pub fn code(self) -> i64 {
        match self {
            Freq::Daily => 0,
            Freq::Weekly => 1,
            Freq::Monthly => 2,
            Freq::Yearly => 3,
        }
    }
}

impl TryFrom<i64> for Freq {
    type Error = ValidationError;
    fn try_from(code: i64) -> Result<Self, Self::Error> {
        Ok(match code {
            0 => Freq::Daily,
            1 => Freq::Weekly,
            2 => Freq::Monthly,
            3 => Freq::Yearly,
            other => return Err(ValidationError::InvalidRepeatType(other)),
        })
    }
}

impl FromStr for Freq {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "daily" => Self::Daily,
            "weekly" => Self::Weekly,
            "monthly" => Self::Monthly,
            "yearly" => Self::Yearly,
            _ => return Err(format!("unknown repeat frequency `{s}`")),
        })
    }
}

impl fmt::Display for Freq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Freq::Daily => "daily",
            Freq::Weekly => "weekly",
            Freq::Monthly => "monthly",
            Freq::Yearly => "yearly",
        })
    }
}

/// When a series stops
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RepeatEnd {
    /// Fixed number of occurrences, `2..=30`
    Count(u32),
    /// Last day an occurrence may start on
    Until(Date),
    /// Not accepted by the validator, a series must end.
    #[default]
    Forever,
}

impl RepeatEnd {
    pub fn count(self) -> Option<u32> {
        match self {
            RepeatEnd::Count(count) => Some(count),
            _ => None,
        }
    }

    pub fn until(self) -> Option<Date> {
        match self {
            RepeatEnd::Until(date) => Some(date),
            _ => None,
        }
    }
}

bitflags! {
    /// Set of weekdays (SMTWTFS)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct DayOfWeek: u8 {
        const SUNDAY = 1;
        const MONDAY = 1 << 1;
        const TUESDAY = 1 << 2;
        const WEDNESDAY = 1 << 3;
        const THURSDAY = 1 << 4;
        const FRIDAY = 1 << 5;
        const SATURDAY = 1 << 6;
    }
}

impl DayOfWeek {
    pub fn from_weekday(weekday: Weekday) -> Self {
        Self::from_bits_truncate(1 << weekday.number_days_from_sunday())
    }

    pub fn has_weekday(self, weekday: Weekday) -> bool {
        self.contains(Self::from_weekday(weekday))
    }
}

impl FromStr for DayOfWeek {
    type Err = String;

    /// Comma separated day names, e.g. `tue,thu` or `tuesday,thursday`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut days = DayOfWeek::empty();
        for name in s.split(',').map(str::trim).filter(|name| !name.is_empty()) {
            let lower = name.to_ascii_lowercase();
            let day = match lower.get(..3) {
                Some("sun") => DayOfWeek::SUNDAY,
                Some("mon") => DayOfWeek::MONDAY,
                Some("tue") => DayOfWeek::TUESDAY,
                Some("wed") => DayOfWeek::WEDNESDAY,
                Some("thu") => DayOfWeek::THURSDAY,
                Some("fri") => DayOfWeek::FRIDAY,
                Some("sat") => DayOfWeek::SATURDAY,
                _ => return Err(format!("unknown day of the week `{name}`")),
            };
            days.insert(day);
        }
        Ok(days)
    }
}
