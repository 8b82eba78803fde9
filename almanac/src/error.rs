use thiserror::Error;

use crate::data::RowID;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Anything that can go wrong inside the calendar.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{0} not found")]
    NotFound(Missing),
    #[error(transparent)]
    Recurrence(#[from] RecurrenceError),
    #[error("invalid edit scope `{0}`")]
    InvalidEditScope(i64),
    #[error("database error")]
    Database(#[from] sqlx::Error),
    /// A stored row could not be turned back into a typed value.
    ///
    /// Should never happen because only validated data is written.
    #[error("could not decode stored value: {0}")]
    Decode(String),
}

impl Error {
    pub fn event_not_found(id: RowID) -> Self {
        Self::NotFound(Missing::Event(id))
    }

    pub fn invitation_not_found(event_id: RowID, user_id: RowID) -> Self {
        Self::NotFound(Missing::Invitation { event_id, user_id })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// The thing an identifier-targeted operation was looking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Missing {
    Event(RowID),
    Invitation { event_id: RowID, user_id: RowID },
}

impl std::fmt::Display for Missing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Missing::Event(id) => write!(f, "event {id}"),
            Missing::Invitation { event_id, user_id } => {
                write!(f, "invitation of user {user_id} to event {event_id}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid start day")]
    InvalidStartDay,
    #[error("invalid start time")]
    InvalidStartTime,
    #[error("invalid end day")]
    InvalidEndDay,
    #[error("invalid end time")]
    InvalidEndTime,
    #[error("start day must be equal or less than end day")]
    StartDayAfterEndDay,
    #[error("start time must be equal or less than end time")]
    StartTimeAfterEndTime,
    #[error("invalid zone `{0}`")]
    InvalidZone(String),
    #[error("missing repeat pattern")]
    MissingRepeatPattern,
    #[error("repeat occurrences is over the maximum count")]
    RepeatOccurrenceTooLarge,
    #[error("repeat occurrences must be at least 2")]
    RepeatOccurrenceTooSmall,
    #[error("repeating events must have some end")]
    MissingEndOfRepeat,
    #[error("repeat stop date must be after the start day")]
    RepeatStopDateBeforeStart,
    #[error("repeat stop date is over the maximum duration")]
    RepeatStopDateTooLarge,
    #[error("missing day of the week (SMTWTFS)")]
    MissingDayOfWeek,
    #[error("invalid repeat type `{0}`")]
    InvalidRepeatType(i64),
    #[error("invalid status `{0}`")]
    InvalidStatus(i64),
    #[error("invalid invitation status `{0}`")]
    InvalidInvitationStatus(i64),
    #[error("missing invitation permission")]
    MissingInvitationPermission,
    #[error("incompatible invitation permissions")]
    IncompatibleInvitationPermission,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RecurrenceError {
    #[error("must be a repeating event")]
    NotRepeating,
    #[error("repeating event list is empty")]
    EmptySeries,
    #[error("repeating event has only one occurrence")]
    SingleOccurrence,
    #[error("too many event occurrences in repeat calculation")]
    TooManyOccurrences,
}
