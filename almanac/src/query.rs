//! Compound event filters and the logic deciding whether an event matches one.

use serde::{Deserialize, Serialize};
use time::PrimitiveDateTime;

use crate::data::{Event, EventType, Invitation, RowID, Status};

/// Filter for finding events.
///
/// Each list is an OR over its values, and every non-empty list must match
/// (AND across lists). Empty lists and missing bounds don't constrain anything.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    /// Inclusive, compared against the end of each event
    pub start: Option<PrimitiveDateTime>,
    /// Inclusive, compared against the start of each event
    pub end: Option<PrimitiveDateTime>,
    pub event_ids: Vec<RowID>,
    pub parent_ids: Vec<RowID>,
    /// Owners, or users holding a pending or confirmed invitation
    pub user_ids: Vec<RowID>,
    pub event_types: Vec<EventType>,
    pub source_ids: Vec<RowID>,
    pub statuses: Vec<Status>,
    /// Case-sensitive substrings of the title or description
    pub text: Vec<String>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only events overlapping `[start, end]`.
    pub fn between(mut self, start: PrimitiveDateTime, end: PrimitiveDateTime) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self
    }

    /// Only events ending on or after `start`.
    pub fn starting(mut self, start: PrimitiveDateTime) -> Self {
        self.start = Some(start);
        self
    }

    /// Only events starting on or before `end`.
    pub fn ending(mut self, end: PrimitiveDateTime) -> Self {
        self.end = Some(end);
        self
    }

    pub fn event_ids(mut self, ids: impl IntoIterator<Item = RowID>) -> Self {
        self.event_ids.extend(ids);
        self
    }

    pub fn parent_ids(mut self, ids: impl IntoIterator<Item = RowID>) -> Self {
        self.parent_ids.extend(ids);
        self
    }

    pub fn user_ids(mut self, ids: impl IntoIterator<Item = RowID>) -> Self {
        self.user_ids.extend(ids);
        self
    }

    pub fn event_types(mut self, types: impl IntoIterator<Item = EventType>) -> Self {
        self.event_types.extend(types);
        self
    }

    pub fn source_ids(mut self, ids: impl IntoIterator<Item = RowID>) -> Self {
        self.source_ids.extend(ids);
        self
    }

    pub fn statuses(mut self, statuses: impl IntoIterator<Item = Status>) -> Self {
        self.statuses.extend(statuses);
        self
    }

    pub fn text<S: Into<String>>(mut self, text: impl IntoIterator<Item = S>) -> Self {
        self.text.extend(text.into_iter().map(Into::into));
        self
    }

    /// Whether `event` passes every filter of this query.
    ///
    /// User ids are only checked against the owner here; stores that know
    /// about invitations should use [`Query::matches_attendee`] as well.
    pub fn matches(&self, event: Option<&Event>) -> bool {
        let Some(event) = event else {
            return false;
        };
        self.matches_window(event)
            && any_or_empty(&self.event_ids, &event.id)
            && optional_in(&self.parent_ids, event.parent_id)
            && any_or_empty(&self.event_types, &event.event_type)
            && optional_in(&self.source_ids, event.source_id)
            && any_or_empty(&self.statuses, &event.status)
            && self.matches_text(event)
            && (self.user_ids.is_empty() || self.user_ids.contains(&event.owner_id))
    }

    /// Like [`Query::matches`], but a user id also matches when that user
    /// holds a pending or confirmed invitation to the event.
    ///
    /// `invitations` may contain invitations to other events; they are ignored.
    pub fn matches_attendee(&self, event: Option<&Event>, invitations: &[Invitation]) -> bool {
        let Some(event) = event else {
            return false;
        };
        if self.user_ids.is_empty() || self.user_ids.contains(&event.owner_id) {
            return self.matches(Some(event));
        }
        let invited = invitations.iter().any(|invite| {
            invite.event_id == event.id
                && invite.status.is_attending()
                && self.user_ids.contains(&invite.user_id)
        });
        invited && self.without_users().matches(Some(event))
    }

    /// Whether the event's interval overlaps the query window.
    ///
    /// Events whose days or times don't parse never match a bounded window.
    fn matches_window(&self, event: &Event) -> bool {
        if self.start.is_none() && self.end.is_none() {
            return true;
        }
        match event.interval() {
            Ok(interval) => interval.overlaps(self.start, self.end),
            Err(_) => false,
        }
    }

    fn matches_text(&self, event: &Event) -> bool {
        self.text.is_empty()
            || self.text.iter().any(|needle| {
                event.title.contains(needle.as_str())
                    || event
                        .description
                        .as_deref()
                        .is_some_and(|desc| desc.contains(needle.as_str()))
            })
    }

    fn without_users(&self) -> Query {
        Query {
            user_ids: vec![],
            ..self.clone()
        }
    }
}

fn any_or_empty<T: PartialEq>(allowed: &[T], value: &T) -> bool {
    allowed.is_empty() || allowed.contains(value)
}

fn optional_in(allowed: &[RowID], value: Option<RowID>) -> bool {
    allowed.is_empty() || value.is_some_and(|value| allowed.contains(&value))
}
