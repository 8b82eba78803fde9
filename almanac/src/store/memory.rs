use std::sync::{Mutex, MutexGuard, PoisonError};

use time::UtcDateTime;

use super::{DataStore, Schedule};
use crate::data::{Event, Invitation, InvitationStatus, Permission, RowID, Status, UserData};
use crate::error::{Error, Result};
use crate::query::Query;

/// Keeps everything in vectors behind a single lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    last_id: RowID,
    events: Vec<Event>,
    invitations: Vec<Invitation>,
}

impl State {
    fn event_mut(&mut self, id: RowID) -> Result<&mut Event> {
        self.events
            .iter_mut()
            .find(|event| event.id == id)
            .ok_or(Error::event_not_found(id))
    }

    fn invitation_mut(&mut self, event_id: RowID, user_id: RowID) -> Result<&mut Invitation> {
        self.invitations
            .iter_mut()
            .find(|invite| invite.event_id == event_id && invite.user_id == user_id)
            .ok_or(Error::invitation_not_found(event_id, user_id))
    }

    fn update_event(&mut self, id: RowID, change: impl FnOnce(&mut Event)) -> Result<()> {
        let event = self.event_mut(id)?;
        change(event);
        event.updated = Some(UtcDateTime::now());
        Ok(())
    }

    fn update_invitation(
        &mut self,
        event_id: RowID,
        user_id: RowID,
        change: impl FnOnce(&mut Invitation),
    ) -> Result<()> {
        let invite = self.invitation_mut(event_id, user_id)?;
        change(invite);
        invite.updated = Some(UtcDateTime::now());
        Ok(())
    }

    fn upsert_invitation(&mut self, mut invitation: Invitation) -> Invitation {
        let now = UtcDateTime::now();
        invitation.updated = Some(now);
        match self.invitation_mut(invitation.event_id, invitation.user_id) {
            Ok(existing) => {
                invitation.created = existing.created;
                *existing = invitation.clone();
            }
            Err(_) => {
                invitation.created = Some(now);
                self.invitations.push(invitation.clone());
            }
        }
        invitation
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // a panic while holding the lock can't leave `State` half-written
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DataStore for MemoryStore {
    async fn create(&self, mut event: Event) -> Result<Event> {
        let mut state = self.lock();
        state.last_id += 1;
        let now = UtcDateTime::now();
        event.id = state.last_id;
        event.created = Some(now);
        event.updated = Some(now);
        state.events.push(event.clone());

        let owner = Invitation {
            status: InvitationStatus::Confirmed,
            ..Invitation::new(event.id, event.owner_id, Permission::OWNER)
        };
        state.upsert_invitation(owner);
        Ok(event)
    }

    async fn get(&self, id: RowID) -> Result<Option<Event>> {
        Ok(self.lock().events.iter().find(|e| e.id == id).cloned())
    }

    async fn query(&self, query: &Query) -> Result<Vec<Event>> {
        let state = self.lock();
        Ok(state
            .events
            .iter()
            .filter(|event| query.matches_attendee(Some(*event), &state.invitations))
            .cloned()
            .collect())
    }

    async fn set_parent_id(&self, id: RowID, parent_id: RowID) -> Result<()> {
        self.lock()
            .update_event(id, |event| event.parent_id = Some(parent_id))
    }

    async fn set_time(&self, id: RowID, start_time: &str, end_time: &str) -> Result<()> {
        self.lock().update_event(id, |event| {
            event.start_time = Some(start_time.to_owned());
            event.end_time = Some(end_time.to_owned());
            event.all_day = false;
        })
    }

    async fn set_day_time(&self, id: RowID, schedule: &Schedule) -> Result<()> {
        self.lock().update_event(id, |event| {
            event.start_day = schedule.start_day.clone();
            event.start_time = schedule.start_time.clone();
            event.end_day = schedule.end_day.clone();
            event.end_time = schedule.end_time.clone();
            event.zone = schedule.zone.clone();
            event.all_day = schedule.all_day;
        })
    }

    async fn set_status(&self, id: RowID, status: Status) -> Result<()> {
        self.lock().update_event(id, |event| event.status = status)
    }

    async fn set_title(&self, id: RowID, title: &str) -> Result<()> {
        self.lock()
            .update_event(id, |event| event.title = title.to_owned())
    }

    async fn set_description(&self, id: RowID, description: Option<&str>) -> Result<()> {
        self.lock()
            .update_event(id, |event| event.description = description.map(str::to_owned))
    }

    async fn set_url(&self, id: RowID, url: Option<&str>) -> Result<()> {
        self.lock()
            .update_event(id, |event| event.url = url.map(str::to_owned))
    }

    async fn set_user_data(&self, id: RowID, user_data: &UserData) -> Result<()> {
        self.lock()
            .update_event(id, |event| event.user_data = user_data.clone())
    }

    async fn add_invitation(&self, invitation: Invitation) -> Result<Invitation> {
        let mut state = self.lock();
        state.event_mut(invitation.event_id)?;
        Ok(state.upsert_invitation(invitation))
    }

    async fn set_invitation_status(
        &self,
        event_id: RowID,
        user_id: RowID,
        status: InvitationStatus,
    ) -> Result<()> {
        self.lock()
            .update_invitation(event_id, user_id, |invite| invite.status = status)
    }

    async fn set_invitation_permissions(
        &self,
        event_id: RowID,
        user_id: RowID,
        permission: Permission,
    ) -> Result<()> {
        self.lock()
            .update_invitation(event_id, user_id, |invite| invite.permission = permission)
    }

    async fn get_invitation(&self, event_id: RowID, user_id: RowID) -> Result<Option<Invitation>> {
        Ok(self
            .lock()
            .invitations
            .iter()
            .find(|invite| invite.event_id == event_id && invite.user_id == user_id)
            .cloned())
    }

    async fn invitations(&self, event_id: RowID) -> Result<Vec<Invitation>> {
        Ok(self
            .lock()
            .invitations
            .iter()
            .filter(|invite| invite.event_id == event_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lunch() -> Event {
        Event::timed("2008-01-01", "12:00", "2008-01-01", "13:00")
            .with_title("lunch")
            .with_owner(1)
    }

    #[tokio::test]
    async fn create_assigns_ids_and_owner_invitation() {
        let store = MemoryStore::new();
        let first = store.create(lunch()).await.unwrap();
        let second = store.create(lunch()).await.unwrap();
        assert_eq!((first.id, second.id), (1, 2));
        assert!(first.created.is_some());

        let owner = store.get_invitation(first.id, 1).await.unwrap().unwrap();
        assert_eq!(owner.status, InvitationStatus::Confirmed);
        assert_eq!(owner.permission, Permission::OWNER);
    }

    #[tokio::test]
    async fn mutations_of_missing_rows() {
        let store = MemoryStore::new();
        let err = store.set_title(-1, "nope").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(crate::error::Missing::Event(-1))));

        let err = store
            .set_invitation_status(-1, 2, InvitationStatus::Declined)
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let err = store
            .add_invitation(Invitation::new(42, 2, Permission::INVITEE))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn set_time_clears_all_day() {
        let store = MemoryStore::new();
        let event = store
            .create(Event::all_day("2008-01-01", "2008-01-01"))
            .await
            .unwrap();
        store.set_time(event.id, "10:00", "11:00").await.unwrap();
        let event = store.get(event.id).await.unwrap().unwrap();
        assert!(!event.all_day);
        assert_eq!(event.start_time.as_deref(), Some("10:00"));
    }

    #[tokio::test]
    async fn query_finds_invitees() {
        let store = MemoryStore::new();
        let event = store.create(lunch()).await.unwrap();
        store
            .add_invitation(Invitation::new(event.id, 2, Permission::INVITEE))
            .await
            .unwrap();

        let found = store.query(&Query::new().user_ids([2])).await.unwrap();
        assert_eq!(found.len(), 1);

        store
            .set_invitation_status(event.id, 2, InvitationStatus::Declined)
            .await
            .unwrap();
        assert!(store.query(&Query::new().user_ids([2])).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn re_inviting_replaces() {
        let store = MemoryStore::new();
        let event = store.create(lunch()).await.unwrap();
        store
            .add_invitation(Invitation::new(event.id, 2, Permission::INVITEE))
            .await
            .unwrap();
        store
            .add_invitation(Invitation::new(event.id, 2, Permission::OWNER))
            .await
            .unwrap();
        let invitations = store.invitations(event.id).await.unwrap();
        assert_eq!(invitations.len(), 2);
        assert_eq!(invitations[1].permission, Permission::OWNER);
    }
}
