//! Expansion of a repeating event template into concrete occurrences.

use time::{Date, Duration, Month};

use crate::data::{DayOfWeek, Event, Freq, MAX_REPEAT_OCCURRENCES, RepeatEnd, parse_day};
use crate::error::{RecurrenceError, Result, ValidationError};
use crate::validate::validate;

/// Generate every occurrence of a repeating event, in chronological order.
///
/// Daily, monthly and yearly series start with the template itself. Weekly
/// series walk forward day by day from the template's start day and keep the
/// days in the pattern's weekday set, so the template's own day is only part
/// of the series when its weekday is in the set.
///
/// Occurrences are copies of the template with new start and end days; the
/// time of day and the number of days between start and end are kept. Nothing
/// is persisted and no parent ids are assigned.
pub fn generate(template: &Event) -> Result<Vec<Event>> {
    if !template.is_repeating {
        return Err(RecurrenceError::NotRepeating.into());
    }
    let start = parse_day(&template.start_day).ok_or(ValidationError::InvalidStartDay)?;
    let end = parse_day(&template.end_day).ok_or(ValidationError::InvalidEndDay)?;
    validate(template)?;
    let repeat = template
        .repeat
        .as_ref()
        .ok_or(ValidationError::MissingRepeatPattern)?;

    let days = match repeat.freq {
        Freq::Weekly => weekly_days(start, repeat.days, repeat.end)?,
        freq => stepped_days(start, freq, repeat.end)?,
    };
    match days.len() {
        0 => return Err(RecurrenceError::EmptySeries.into()),
        1 => return Err(RecurrenceError::SingleOccurrence.into()),
        _ => {}
    }
    tracing::debug!(
        freq = %repeat.freq,
        occurrences = days.len(),
        start = %start,
        "generated repeating series"
    );

    let span = end - start;
    Ok(days
        .into_iter()
        .map(|day| occurrence(template, day, day.saturating_add(span)))
        .collect())
}

fn occurrence(template: &Event, start: Date, end: Date) -> Event {
    Event {
        start_day: start.to_string(),
        end_day: end.to_string(),
        ..template.clone()
    }
}

/// Start days for a daily, monthly or yearly series.
fn stepped_days(start: Date, freq: Freq, end: RepeatEnd) -> Result<Vec<Date>> {
    let mut series = Series::new(end);
    let mut day = start;
    while !series.is_done(day) {
        series.push(day)?;
        let Some(next) = advance(day, freq) else {
            tracing::warn!(%start, %day, "series ran past the end of the calendar");
            break;
        };
        day = next;
    }
    Ok(series.days)
}

/// Start days for a weekly series.
fn weekly_days(start: Date, weekdays: DayOfWeek, end: RepeatEnd) -> Result<Vec<Date>> {
    let mut series = Series::new(end);
    let mut day = start;
    while !series.is_done(day) {
        if weekdays.has_weekday(day.weekday()) {
            series.push(day)?;
        }
        let Some(next) = day.next_day() else {
            break;
        };
        day = next;
    }
    Ok(series.days)
}

/// The occurrence after `day`.
///
/// Each step starts from the previous occurrence, so a month-end start that
/// overflowed once stays on the day it overflowed to.
fn advance(day: Date, freq: Freq) -> Option<Date> {
    match freq {
        Freq::Daily | Freq::Weekly => day.next_day(),
        Freq::Monthly => add_months(day, 1),
        Freq::Yearly => add_months(day, 12),
    }
}

/// Add calendar months, rolling surplus days into the following month.
///
/// Jan 31 + 1 month is Mar 2 in a leap year and Mar 3 otherwise.
fn add_months(date: Date, months: i64) -> Option<Date> {
    let total = i64::from(date.year()) * 12 + i64::from(date.month() as u8 - 1) + months;
    let year = i32::try_from(total.div_euclid(12)).ok()?;
    let month = Month::try_from(u8::try_from(total.rem_euclid(12) + 1).ok()?).ok()?;
    let first = Date::from_calendar_date(year, month, 1).ok()?;
    first.checked_add(Duration::days(i64::from(date.day()) - 1))
}

/// Collects start days until the series' end condition is met.
struct Series {
    end: RepeatEnd,
    days: Vec<Date>,
}

impl Series {
    fn new(end: RepeatEnd) -> Self {
        Self { end, days: vec![] }
    }

    /// Whether no occurrence may start on `day` or later.
    fn is_done(&self, day: Date) -> bool {
        match self.end {
            RepeatEnd::Count(count) => self.days.len() >= count as usize,
            RepeatEnd::Until(stop) => day > stop,
            RepeatEnd::Forever => true,
        }
    }

    fn push(&mut self, day: Date) -> Result<()> {
        if self.days.len() >= MAX_REPEAT_OCCURRENCES as usize {
            return Err(RecurrenceError::TooManyOccurrences.into());
        }
        self.days.push(day);
        Ok(())
    }
}
