use std::{fmt, str::FromStr};

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use time::UtcDateTime;

use crate::error::ValidationError;

mod interval;
mod repeat;
pub use interval::{DATE_DESC, EventInterval, EventIntervalRef, TIME_DESC};
pub(crate) use interval::parse_day;
pub use repeat::{DayOfWeek, Freq, MAX_REPEAT_OCCURRENCES, Repeat, RepeatEnd};

pub type RowID = i64;

/// Caller-defined classification of an event. The calendar never interprets it.
pub type EventType = i64;

/// Free-form JSON object attached to an event.
pub type UserData = serde_json::Map<String, serde_json::Value>;

/// A single dated occurrence.
///
/// Day and time values are kept as the `YYYY-MM-DD` / `HH:MM` strings they were
/// given in and only parsed through [`Event::interval`], so an invalid event can
/// still be represented and reported on by the validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: RowID,
    /// Id of an external object this event is tied to
    pub source_id: Option<RowID>,
    /// Id of the head of the repeating series this event belongs to. The head
    /// points at itself.
    pub parent_id: Option<RowID>,
    pub owner_id: RowID,
    pub event_type: EventType,
    pub title: String,
    pub description: Option<String>,
    pub url: Option<String>,
    pub status: Status,
    pub all_day: bool,
    pub is_repeating: bool,
    pub repeat: Option<Repeat>,
    /// IANA zone name, e.g. `America/Denver`
    pub zone: String,
    pub start_day: String,
    pub start_time: Option<String>,
    pub end_day: String,
    pub end_time: Option<String>,
    pub created: Option<UtcDateTime>,
    pub updated: Option<UtcDateTime>,
    pub user_data: UserData,
}

impl Default for Event {
    fn default() -> Self {
        Self {
            id: 0,
            source_id: None,
            parent_id: None,
            owner_id: 0,
            event_type: 0,
            title: String::new(),
            description: None,
            url: None,
            status: Status::Active,
            all_day: false,
            is_repeating: false,
            repeat: None,
            zone: "UTC".into(),
            start_day: String::new(),
            start_time: None,
            end_day: String::new(),
            end_time: None,
            created: None,
            updated: None,
            user_data: UserData::new(),
        }
    }
}

impl Event {
    /// An all-day event covering `start_day..=end_day`.
    pub fn all_day(start_day: impl Into<String>, end_day: impl Into<String>) -> Self {
        Self {
            all_day: true,
            start_day: start_day.into(),
            end_day: end_day.into(),
            ..Self::default()
        }
    }

    /// An event with a start and end time of day.
    pub fn timed(
        start_day: impl Into<String>,
        start_time: impl Into<String>,
        end_day: impl Into<String>,
        end_time: impl Into<String>,
    ) -> Self {
        Self {
            start_day: start_day.into(),
            start_time: Some(start_time.into()),
            end_day: end_day.into(),
            end_time: Some(end_time.into()),
            ..Self::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_zone(mut self, zone: impl Into<String>) -> Self {
        self.zone = zone.into();
        self
    }

    pub fn with_owner(mut self, owner_id: RowID) -> Self {
        self.owner_id = owner_id;
        self
    }

    /// Mark this event as the template of a repeating series.
    pub fn repeating(mut self, repeat: Repeat) -> Self {
        self.is_repeating = true;
        self.repeat = Some(repeat);
        self
    }

    /// Parse the day and time strings into a typed interval.
    pub fn interval(&self) -> Result<EventInterval, ValidationError> {
        EventInterval::parse(
            &self.start_day,
            self.start_time.as_deref(),
            &self.end_day,
            self.end_time.as_deref(),
            self.all_day,
        )
    }

    /// Key giving ascending (start day, start time) order, ties broken by id.
    ///
    /// Day and time strings are zero padded so they sort chronologically.
    pub fn chronological_key(&self) -> (&str, &str, RowID) {
        (
            &self.start_day,
            self.start_time.as_deref().unwrap_or(""),
            self.id,
        )
    }
}

/// Sort events into ascending (start day, start time, id) order.
pub fn sort_chronologically(events: &mut [Event]) {
    events.sort_by(|left, right| left.chronological_key().cmp(&right.chronological_key()));
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    /// Shows on the calendar as a standard event
    #[default]
    Active,
    /// Canceled by the owner, still shown (faded out)
    Canceled,
    /// Every invitee declined, hidden from the calendar
    Abandoned,
    /// Deleted by the owner. Nothing is ever really deleted.
    Removed,
}

impl Status {
    pub fn code(self) -> i64 {
        match self {
            Status::Active => 0,
            Status::Canceled => 1,
            Status::Abandoned => -2,
            Status::Removed => -1,
        }
    }
}

impl TryFrom<i64> for Status {
    type Error = ValidationError;
    fn try_from(code: i64) -> Result<Self, Self::Error> {
        Ok(match code {
            0 => Status::Active,
            1 => Status::Canceled,
            -2 => Status::Abandoned,
            -1 => Status::Removed,
            other => return Err(ValidationError::InvalidStatus(other)),
        })
    }
}

impl FromStr for Status {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "active" => Status::Active,
            "canceled" | "cancelled" => Status::Canceled,
            "abandoned" => Status::Abandoned,
            "removed" => Status::Removed,
            _ => return Err(format!("unknown status `{s}`")),
        })
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Status::Active => "active",
            Status::Canceled => "canceled",
            Status::Abandoned => "abandoned",
            Status::Removed => "removed",
        })
    }
}

/// A user's invitation to (and permissions on) one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invitation {
    pub event_id: RowID,
    pub user_id: RowID,
    pub status: InvitationStatus,
    pub permission: Permission,
    pub created: Option<UtcDateTime>,
    pub updated: Option<UtcDateTime>,
}

impl Invitation {
    /// A pending invitation, not yet stored.
    pub fn new(event_id: RowID, user_id: RowID, permission: Permission) -> Self {
        Self {
            event_id,
            user_id,
            status: InvitationStatus::Pending,
            permission,
            created: None,
            updated: None,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvitationStatus {
    /// No answer yet. Treated as a soft confirm.
    #[default]
    Pending,
    Confirmed,
    Declined,
    Revoked,
}

impl InvitationStatus {
    pub fn code(self) -> i64 {
        match self {
            InvitationStatus::Pending => 0,
            InvitationStatus::Confirmed => 1,
            InvitationStatus::Declined => 2,
            InvitationStatus::Revoked => 3,
        }
    }

    /// Whether the invitee still has the event on their calendar.
    pub fn is_attending(self) -> bool {
        matches!(self, InvitationStatus::Pending | InvitationStatus::Confirmed)
    }
}

impl TryFrom<i64> for InvitationStatus {
    type Error = ValidationError;
    fn try_from(code: i64) -> Result<Self, Self::Error> {
        Ok(match code {
            0 => InvitationStatus::Pending,
            1 => InvitationStatus::Confirmed,
            2 => InvitationStatus::Declined,
            3 => InvitationStatus::Revoked,
            other => return Err(ValidationError::InvalidInvitationStatus(other)),
        })
    }
}

impl fmt::Display for InvitationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InvitationStatus::Pending => "pending",
            InvitationStatus::Confirmed => "confirmed",
            InvitationStatus::Declined => "declined",
            InvitationStatus::Revoked => "revoked",
        })
    }
}

bitflags! {
    /// What an invited user may do with an event.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct Permission: u32 {
        const DELETE = 1;
        const CANCEL = 1 << 1;
        const MODIFY = 1 << 2;
        const INVITE = 1 << 3;
        const READ = 1 << 4;

        const OWNER = Self::DELETE.bits()
            | Self::CANCEL.bits()
            | Self::MODIFY.bits()
            | Self::INVITE.bits()
            | Self::READ.bits();
        const INVITEE = Self::READ.bits();
    }
}

impl Permission {
    /// Check that every held permission's prerequisites are also held.
    ///
    /// Delete needs cancel, cancel needs modify, modify needs invite and
    /// anything at all needs read.
    pub fn check_chain(self) -> Result<(), ValidationError> {
        if self.is_empty() {
            return Err(ValidationError::MissingInvitationPermission);
        }
        let requirements = [
            (Permission::DELETE, Permission::CANCEL),
            (Permission::CANCEL | Permission::DELETE, Permission::MODIFY),
            (Permission::MODIFY, Permission::INVITE),
            (
                Permission::INVITE | Permission::MODIFY | Permission::CANCEL | Permission::DELETE,
                Permission::READ,
            ),
        ];
        for (held, needed) in requirements {
            if self.intersects(held) && !self.contains(needed) {
                return Err(ValidationError::IncompatibleInvitationPermission);
            }
        }
        Ok(())
    }
}

/// Flag names joined with `|`, e.g. `READ | INVITE`.
impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        bitflags::parser::to_writer(self, f)
    }
}

impl FromStr for Permission {
    type Err = bitflags::parser::ParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        bitflags::parser::from_str(s)
    }
}
