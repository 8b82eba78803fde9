//! Persistence boundary of the calendar.
//!
//! The facade only ever talks to a [`DataStore`]. Two implementations ship with
//! the crate: [`MemoryStore`] for tests and embedding, and [`SqliteStore`].

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::data::{Event, Invitation, InvitationStatus, Permission, RowID, Status, UserData};
use crate::error::Result;
use crate::query::Query;

mod memory;
mod sqlite;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// The day, time and zone fields of an event, replaced together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub start_day: String,
    pub start_time: Option<String>,
    pub end_day: String,
    pub end_time: Option<String>,
    pub zone: String,
    pub all_day: bool,
}

impl Schedule {
    pub fn of(event: &Event) -> Self {
        Self {
            start_day: event.start_day.clone(),
            start_time: event.start_time.clone(),
            end_day: event.end_day.clone(),
            end_time: event.end_time.clone(),
            zone: event.zone.clone(),
            all_day: event.all_day,
        }
    }
}

/// Storage for events and invitations.
///
/// Every event mutation fails with [`crate::Error::NotFound`] when the id is
/// absent. Writes bump the `updated` timestamp.
pub trait DataStore: Send + Sync {
    /// Persist a new event, assigning its id and timestamps.
    ///
    /// The owner is recorded as a confirmed invitee with every permission.
    fn create(&self, event: Event) -> impl Future<Output = Result<Event>> + Send;

    fn get(&self, id: RowID) -> impl Future<Output = Result<Option<Event>>> + Send;

    /// All events matching `query`, invitations included, in insertion order.
    fn query(&self, query: &Query) -> impl Future<Output = Result<Vec<Event>>> + Send;

    fn set_parent_id(
        &self,
        id: RowID,
        parent_id: RowID,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Replace the times of day. The event stops being all day.
    fn set_time(
        &self,
        id: RowID,
        start_time: &str,
        end_time: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    fn set_day_time(
        &self,
        id: RowID,
        schedule: &Schedule,
    ) -> impl Future<Output = Result<()>> + Send;

    fn set_status(&self, id: RowID, status: Status) -> impl Future<Output = Result<()>> + Send;

    fn set_title(&self, id: RowID, title: &str) -> impl Future<Output = Result<()>> + Send;

    fn set_description(
        &self,
        id: RowID,
        description: Option<&str>,
    ) -> impl Future<Output = Result<()>> + Send;

    fn set_url(&self, id: RowID, url: Option<&str>) -> impl Future<Output = Result<()>> + Send;

    fn set_user_data(
        &self,
        id: RowID,
        user_data: &UserData,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Store an invitation, replacing any previous one for the same user.
    fn add_invitation(
        &self,
        invitation: Invitation,
    ) -> impl Future<Output = Result<Invitation>> + Send;

    fn set_invitation_status(
        &self,
        event_id: RowID,
        user_id: RowID,
        status: InvitationStatus,
    ) -> impl Future<Output = Result<()>> + Send;

    fn set_invitation_permissions(
        &self,
        event_id: RowID,
        user_id: RowID,
        permission: Permission,
    ) -> impl Future<Output = Result<()>> + Send;

    fn get_invitation(
        &self,
        event_id: RowID,
        user_id: RowID,
    ) -> impl Future<Output = Result<Option<Invitation>>> + Send;

    /// Every invitation to an event, in insertion order.
    fn invitations(&self, event_id: RowID) -> impl Future<Output = Result<Vec<Invitation>>> + Send;
}
