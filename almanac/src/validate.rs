//! Checks that events and invitations hold consistent, schedulable values.
//!
//! Everything here is a pure function of its input.

use time::Duration;

use crate::data::{
    Event, EventInterval, Freq, Invitation, MAX_REPEAT_OCCURRENCES, Repeat, RepeatEnd,
};
use crate::error::ValidationError;

type Result<T = (), E = ValidationError> = std::result::Result<T, E>;

/// Validate an event, stopping at the first problem found.
pub fn validate(event: &Event) -> Result {
    let interval = validate_times(
        &event.start_day,
        event.start_time.as_deref(),
        &event.end_day,
        event.end_time.as_deref(),
        &event.zone,
        event.all_day,
    )?;

    if event.is_repeating {
        let repeat = event
            .repeat
            .as_ref()
            .ok_or(ValidationError::MissingRepeatPattern)?;
        validate_repeat(repeat, &interval)?;
    }
    Ok(())
}

/// Validate the day, time and zone values of an event on their own.
///
/// Returns the parsed interval so callers don't have to parse twice.
pub fn validate_times(
    start_day: &str,
    start_time: Option<&str>,
    end_day: &str,
    end_time: Option<&str>,
    zone: &str,
    all_day: bool,
) -> Result<EventInterval> {
    let interval = EventInterval::parse(start_day, start_time, end_day, end_time, all_day)?;
    validate_zone(zone)?;
    Ok(interval)
}

/// Check that `zone` names a known IANA time zone.
pub fn validate_zone(zone: &str) -> Result {
    if zone == "UTC" || time_tz::timezones::get_by_name(zone).is_some() {
        Ok(())
    } else {
        Err(ValidationError::InvalidZone(zone.to_owned()))
    }
}

/// Validate a recurrence pattern against the interval of its template.
pub fn validate_repeat(repeat: &Repeat, interval: &EventInterval) -> Result {
    match repeat.end {
        RepeatEnd::Count(count) if count > MAX_REPEAT_OCCURRENCES => {
            return Err(ValidationError::RepeatOccurrenceTooLarge);
        }
        RepeatEnd::Count(1) => return Err(ValidationError::RepeatOccurrenceTooSmall),
        RepeatEnd::Count(0) | RepeatEnd::Forever => {
            return Err(ValidationError::MissingEndOfRepeat);
        }
        RepeatEnd::Count(_) => {}
        RepeatEnd::Until(stop) => {
            let start = interval.start_date();
            if stop <= start {
                return Err(ValidationError::RepeatStopDateBeforeStart);
            }
            if stop > max_stop_date(start) {
                return Err(ValidationError::RepeatStopDateTooLarge);
            }
        }
    }

    if repeat.freq == Freq::Weekly && repeat.days.is_empty() {
        return Err(ValidationError::MissingDayOfWeek);
    }
    Ok(())
}

/// Latest allowed stop date: one day plus two years after the start.
fn max_stop_date(start: time::Date) -> time::Date {
    let two_years = start
        .replace_year(start.year() + 2)
        // 29th of February
        .unwrap_or_else(|_| start + Duration::days(2 * 365));
    two_years.saturating_add(Duration::DAY)
}

pub fn validate_invitation(invitation: &Invitation) -> Result {
    invitation.permission.check_chain()
}

#[cfg(test)]
mod tests {
    use time::macros::date;

    use super::*;
    use crate::data::{DayOfWeek, Permission, RepeatEnd};

    const DEN: &str = "America/Denver";

    fn base() -> Event {
        Event::timed("2008-01-01", "13:00", "2008-01-01", "14:00").with_zone(DEN)
    }

    #[test]
    fn validate_cases() {
        let cases: Vec<(&str, Event, Option<ValidationError>)> = vec![
            (
                "invalid start day",
                Event {
                    start_day: "not-a-day".into(),
                    ..base()
                },
                Some(ValidationError::InvalidStartDay),
            ),
            (
                "invalid end day",
                Event {
                    end_day: "not-a-day".into(),
                    ..base()
                },
                Some(ValidationError::InvalidEndDay),
            ),
            (
                "invalid start time",
                Event {
                    start_time: Some("HH:mm".into()),
                    ..base()
                },
                Some(ValidationError::InvalidStartTime),
            ),
            (
                "missing end time",
                Event {
                    end_time: None,
                    ..base()
                },
                Some(ValidationError::InvalidEndTime),
            ),
            (
                "start day is after end day",
                Event {
                    start_day: "2008-01-02".into(),
                    ..base()
                },
                Some(ValidationError::StartDayAfterEndDay),
            ),
            (
                "start time is after end time",
                Event {
                    start_time: Some("15:00".into()),
                    ..base()
                },
                Some(ValidationError::StartTimeAfterEndTime),
            ),
            (
                "invalid zone",
                base().with_zone("not-a-zone"),
                Some(ValidationError::InvalidZone("not-a-zone".into())),
            ),
            (
                "missing repeating pattern",
                Event {
                    is_repeating: true,
                    ..base()
                },
                Some(ValidationError::MissingRepeatPattern),
            ),
            (
                "repeat occurrence too large",
                base().repeating(Repeat::daily(RepeatEnd::Count(10000))),
                Some(ValidationError::RepeatOccurrenceTooLarge),
            ),
            (
                "repeat occurrence too small",
                base().repeating(Repeat::daily(RepeatEnd::Count(1))),
                Some(ValidationError::RepeatOccurrenceTooSmall),
            ),
            (
                "missing end of repeat",
                base().repeating(Repeat::daily(RepeatEnd::Forever)),
                Some(ValidationError::MissingEndOfRepeat),
            ),
            (
                "zero count is no end",
                base().repeating(Repeat::daily(RepeatEnd::Count(0))),
                Some(ValidationError::MissingEndOfRepeat),
            ),
            (
                "repeat stop date is before start",
                base().repeating(Repeat::daily(RepeatEnd::Until(date!(2007 - 01 - 01)))),
                Some(ValidationError::RepeatStopDateBeforeStart),
            ),
            (
                "repeat stop date equal to start",
                base().repeating(Repeat::daily(RepeatEnd::Until(date!(2008 - 01 - 01)))),
                Some(ValidationError::RepeatStopDateBeforeStart),
            ),
            (
                "repeat stop date too large",
                base().repeating(Repeat::daily(RepeatEnd::Until(date!(2018 - 01 - 01)))),
                Some(ValidationError::RepeatStopDateTooLarge),
            ),
            (
                "invalid day of the week",
                base().repeating(Repeat::weekly(
                    DayOfWeek::empty(),
                    RepeatEnd::Until(date!(2008 - 01 - 20)),
                )),
                Some(ValidationError::MissingDayOfWeek),
            ),
            (
                "success",
                base().repeating(Repeat::weekly(
                    DayOfWeek::TUESDAY,
                    RepeatEnd::Until(date!(2008 - 01 - 20)),
                )),
                None,
            ),
            (
                "stop date at the two year limit",
                base().repeating(Repeat::monthly(RepeatEnd::Until(date!(2010 - 01 - 02)))),
                None,
            ),
            (
                "stop date just past the two year limit",
                base().repeating(Repeat::monthly(RepeatEnd::Until(date!(2010 - 01 - 03)))),
                Some(ValidationError::RepeatStopDateTooLarge),
            ),
            (
                "all day ignores times",
                Event::all_day("2008-01-01", "2008-01-02").with_zone(DEN),
                None,
            ),
        ];

        for (desc, event, expected) in cases {
            let res = validate(&event);
            match expected {
                Some(err) => assert_eq!(res, Err(err), "{desc}"),
                None => assert_eq!(res, Ok(()), "{desc}"),
            }
        }
    }

    #[test]
    fn utc_always_resolves() {
        assert_eq!(validate_zone("UTC"), Ok(()));
        assert!(validate_zone("").is_err());
    }

    #[test]
    fn invitation_permissions() {
        let invite = |permission| Invitation::new(1, 2, permission);
        assert_eq!(validate_invitation(&invite(Permission::OWNER)), Ok(()));
        assert_eq!(validate_invitation(&invite(Permission::INVITEE)), Ok(()));
        assert_eq!(
            validate_invitation(&invite(Permission::empty())),
            Err(ValidationError::MissingInvitationPermission)
        );
        assert_eq!(
            validate_invitation(&invite(Permission::MODIFY | Permission::CANCEL)),
            Err(ValidationError::IncompatibleInvitationPermission)
        );
    }
}
