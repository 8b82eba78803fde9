//! The public face of the crate: every calendar operation, run against a store.

use crate::cascade::{EditCascade, EditScope};
use crate::data::{
    Event, Invitation, InvitationStatus, Permission, RowID, Status, UserData,
    sort_chronologically,
};
use crate::error::{Error, RecurrenceError, Result};
use crate::query::Query;
use crate::recurrence;
use crate::store::{DataStore, Schedule};
use crate::validate::{validate, validate_invitation, validate_times};

/// Result of [`Calendar::create`].
#[derive(Debug, Clone, PartialEq)]
pub struct Created {
    /// The event as stored. For a series this is its first occurrence.
    pub head: Event,
    /// Number of occurrences written
    pub count: usize,
}

/// Calendar operations on top of a [`DataStore`].
///
/// Nothing here is transactional: when a write fails partway through a
/// series, the occurrences already written stay written.
#[derive(Debug)]
pub struct Calendar<S> {
    store: S,
}

impl<S: DataStore> Calendar<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn cascade(&self) -> EditCascade<'_, S> {
        EditCascade::new(&self.store)
    }

    /// Validate and store an event, expanding it into its occurrences when it
    /// repeats.
    ///
    /// Every occurrence of a series gets the id of the first one as parent id,
    /// including the first one itself.
    pub async fn create(&self, event: Event) -> Result<Created> {
        validate(&event)?;
        if !event.is_repeating {
            let head = self.store.create(event).await?;
            return Ok(Created { head, count: 1 });
        }

        let occurrences = recurrence::generate(&event)?;
        let count = occurrences.len();
        let mut occurrences = occurrences.into_iter();
        let first = occurrences.next().ok_or(RecurrenceError::EmptySeries)?;

        let head = self
            .store
            .create(Event {
                parent_id: None,
                ..first
            })
            .await?;
        self.store.set_parent_id(head.id, head.id).await?;
        for (written, occurrence) in occurrences.enumerate() {
            let occurrence = Event {
                parent_id: Some(head.id),
                ..occurrence
            };
            if let Err(e) = self.store.create(occurrence).await {
                tracing::warn!(
                    head = head.id,
                    written = written + 1,
                    total = count,
                    "series creation stopped partway"
                );
                return Err(e);
            }
        }
        tracing::debug!(head = head.id, count, "created repeating series");

        let head = self
            .store
            .get(head.id)
            .await?
            .ok_or(Error::event_not_found(head.id))?;
        Ok(Created { head, count })
    }

    pub async fn get(&self, id: RowID) -> Result<Option<Event>> {
        self.store.get(id).await
    }

    /// Events matching `query`, in the order the store keeps them.
    pub async fn query(&self, query: &Query) -> Result<Vec<Event>> {
        self.store.query(query).await
    }

    /// Events matching `query`, earliest first.
    pub async fn query_chronological(&self, query: &Query) -> Result<Vec<Event>> {
        let mut events = self.store.query(query).await?;
        sort_chronologically(&mut events);
        Ok(events)
    }

    /// Mark events as canceled. Returns the number of events changed.
    pub async fn cancel(&self, id: RowID, scope: EditScope) -> Result<usize> {
        self.set_status(id, Status::Canceled, scope).await
    }

    /// Mark events as removed. They're kept in the store.
    pub async fn remove(&self, id: RowID, scope: EditScope) -> Result<usize> {
        self.set_status(id, Status::Removed, scope).await
    }

    async fn set_status(&self, id: RowID, status: Status, scope: EditScope) -> Result<usize> {
        let store = &self.store;
        self.cascade()
            .apply(scope, id, move |id| store.set_status(id, status))
            .await
    }

    pub async fn update_title(&self, id: RowID, title: &str, scope: EditScope) -> Result<usize> {
        let store = &self.store;
        self.cascade()
            .apply(scope, id, move |id| store.set_title(id, title))
            .await
    }

    pub async fn update_description(
        &self,
        id: RowID,
        description: Option<&str>,
        scope: EditScope,
    ) -> Result<usize> {
        let store = &self.store;
        self.cascade()
            .apply(scope, id, move |id| store.set_description(id, description))
            .await
    }

    pub async fn update_url(&self, id: RowID, url: Option<&str>, scope: EditScope) -> Result<usize> {
        let store = &self.store;
        self.cascade()
            .apply(scope, id, move |id| store.set_url(id, url))
            .await
    }

    pub async fn update_user_data(
        &self,
        id: RowID,
        user_data: &UserData,
        scope: EditScope,
    ) -> Result<usize> {
        let store = &self.store;
        self.cascade()
            .apply(scope, id, move |id| store.set_user_data(id, user_data))
            .await
    }

    /// Move events to a new time of day, keeping their days.
    ///
    /// The times are checked against the target's days and zone. Changed
    /// events are no longer all day.
    pub async fn update_time(
        &self,
        id: RowID,
        start_time: &str,
        end_time: &str,
        scope: EditScope,
    ) -> Result<usize> {
        let target = self
            .store
            .get(id)
            .await?
            .ok_or(Error::event_not_found(id))?;
        validate_times(
            &target.start_day,
            Some(start_time),
            &target.end_day,
            Some(end_time),
            &target.zone,
            false,
        )?;
        let store = &self.store;
        self.cascade()
            .apply(scope, id, move |id| store.set_time(id, start_time, end_time))
            .await
    }

    /// Reschedule a single occurrence. The rest of its series is untouched.
    pub async fn update_day_time(&self, id: RowID, schedule: &Schedule) -> Result<()> {
        validate_times(
            &schedule.start_day,
            schedule.start_time.as_deref(),
            &schedule.end_day,
            schedule.end_time.as_deref(),
            &schedule.zone,
            schedule.all_day,
        )?;
        self.store.set_day_time(id, schedule).await
    }

    /// Invite a user with `permission`, replacing any earlier invitation of
    /// theirs to the same events.
    ///
    /// Occurrences owned by `user_id` are counted but left alone, so the
    /// owner's own invitation is never downgraded.
    pub async fn invite_user(
        &self,
        event_id: RowID,
        user_id: RowID,
        permission: Permission,
        scope: EditScope,
    ) -> Result<usize> {
        validate_invitation(&Invitation::new(event_id, user_id, permission))?;
        let store = &self.store;
        self.cascade()
            .apply(scope, event_id, move |id| async move {
                let event = store.get(id).await?.ok_or(Error::event_not_found(id))?;
                if event.owner_id == user_id {
                    tracing::debug!(event = id, user_id, "owner keeps their invitation");
                    return Ok(());
                }
                store
                    .add_invitation(Invitation::new(id, user_id, permission))
                    .await
                    .map(drop)
            })
            .await
    }

    pub async fn accept_invitation(
        &self,
        event_id: RowID,
        user_id: RowID,
        scope: EditScope,
    ) -> Result<usize> {
        self.set_invitation_status(event_id, user_id, InvitationStatus::Confirmed, scope)
            .await
    }

    pub async fn decline_invitation(
        &self,
        event_id: RowID,
        user_id: RowID,
        scope: EditScope,
    ) -> Result<usize> {
        self.set_invitation_status(event_id, user_id, InvitationStatus::Declined, scope)
            .await
    }

    pub async fn revoke_invitation(
        &self,
        event_id: RowID,
        user_id: RowID,
        scope: EditScope,
    ) -> Result<usize> {
        self.set_invitation_status(event_id, user_id, InvitationStatus::Revoked, scope)
            .await
    }

    async fn set_invitation_status(
        &self,
        event_id: RowID,
        user_id: RowID,
        status: InvitationStatus,
        scope: EditScope,
    ) -> Result<usize> {
        let store = &self.store;
        self.cascade()
            .apply(scope, event_id, move |id| {
                store.set_invitation_status(id, user_id, status)
            })
            .await
    }

    pub async fn update_invitation_permission(
        &self,
        event_id: RowID,
        user_id: RowID,
        permission: Permission,
        scope: EditScope,
    ) -> Result<usize> {
        permission.check_chain()?;
        let store = &self.store;
        self.cascade()
            .apply(scope, event_id, move |id| {
                store.set_invitation_permissions(id, user_id, permission)
            })
            .await
    }

    pub async fn get_invitation(&self, event_id: RowID, user_id: RowID) -> Result<Option<Invitation>> {
        self.store.get_invitation(event_id, user_id).await
    }

    pub async fn invitations(&self, event_id: RowID) -> Result<Vec<Invitation>> {
        self.store.invitations(event_id).await
    }
}

#[cfg(test)]
mod tests {
    use time::macros::date;

    use super::*;
    use crate::data::{DayOfWeek, Repeat, RepeatEnd};
    use crate::error::{Missing, ValidationError};
    use crate::store::MemoryStore;

    const DEN: &str = "America/Denver";

    fn calendar() -> Calendar<MemoryStore> {
        Calendar::new(MemoryStore::new())
    }

    /// Tuesdays and Thursdays from 2008-01-01 through 2008-01-17, 08:00-09:00.
    async fn weekly_series() -> (Calendar<MemoryStore>, Created) {
        let cal = calendar();
        let created = cal
            .create(
                Event::timed("2008-01-01", "08:00", "2008-01-01", "09:00")
                    .with_zone(DEN)
                    .repeating(Repeat::weekly(
                        DayOfWeek::TUESDAY | DayOfWeek::THURSDAY,
                        RepeatEnd::Until(date!(2008 - 01 - 17)),
                    )),
            )
            .await
            .unwrap();
        (cal, created)
    }

    async fn times(cal: &Calendar<MemoryStore>) -> Vec<String> {
        cal.query(&Query::new())
            .await
            .unwrap()
            .iter()
            .map(|e| e.interval().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn single_event_lifecycle() {
        let cal = calendar();
        let created = cal
            .create(Event::timed("2008-01-01", "09:00", "2008-01-01", "10:00").with_zone(DEN))
            .await
            .unwrap();
        assert_eq!(created.count, 1);
        let id = created.head.id;
        assert_eq!(created.head.parent_id, None);

        let schedule = Schedule {
            start_day: "2008-02-01".into(),
            start_time: Some("10:00".into()),
            end_day: "2008-02-01".into(),
            end_time: Some("11:00".into()),
            zone: DEN.into(),
            all_day: false,
        };
        cal.update_day_time(id, &schedule).await.unwrap();

        assert_eq!(cal.cancel(id, EditScope::This).await.unwrap(), 1);
        assert_eq!(cal.get(id).await.unwrap().unwrap().status, Status::Canceled);
        cal.remove(id, EditScope::This).await.unwrap();
        cal.update_title(id, "New Title", EditScope::This).await.unwrap();

        let mut user_data = UserData::new();
        user_data.insert("key".into(), "value".into());
        cal.update_user_data(id, &user_data, EditScope::This)
            .await
            .unwrap();

        let event = cal.get(id).await.unwrap().unwrap();
        assert_eq!(event.status, Status::Removed);
        assert_eq!(event.title, "New Title");
        assert_eq!(event.user_data, user_data);
        assert_eq!(Schedule::of(&event), schedule);

        cal.invite_user(id, 7, Permission::INVITEE, EditScope::This)
            .await
            .unwrap();
        let invite = cal.get_invitation(id, 7).await.unwrap().unwrap();
        assert_eq!(invite.status, InvitationStatus::Pending);

        cal.accept_invitation(id, 7, EditScope::This).await.unwrap();
        let invite = cal.get_invitation(id, 7).await.unwrap().unwrap();
        assert_eq!(invite.status, InvitationStatus::Confirmed);

        cal.decline_invitation(id, 7, EditScope::This).await.unwrap();
        let invite = cal.get_invitation(id, 7).await.unwrap().unwrap();
        assert_eq!(invite.status, InvitationStatus::Declined);
    }

    #[tokio::test]
    async fn invalid_events_are_not_stored() {
        let cal = calendar();
        let err = cal
            .create(Event::timed("2008-01-01", "10:00", "2008-01-01", "09:00"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::StartTimeAfterEndTime)
        ));
        assert!(cal.query(&Query::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn series_shares_the_head_id() {
        let (cal, created) = weekly_series().await;
        assert_eq!(created.count, 6);
        assert_eq!(created.head.parent_id, Some(created.head.id));

        let events = cal.query(&Query::new()).await.unwrap();
        assert_eq!(events.len(), 6);
        assert!(events.iter().all(|e| e.parent_id == Some(created.head.id)));
        let days: Vec<_> = events.iter().map(|e| e.start_day.as_str()).collect();
        assert_eq!(
            days,
            [
                "2008-01-01",
                "2008-01-03",
                "2008-01-08",
                "2008-01-10",
                "2008-01-15",
                "2008-01-17"
            ]
        );
    }

    #[tokio::test]
    async fn series_edits() {
        let (cal, created) = weekly_series().await;
        let events = cal.query(&Query::new()).await.unwrap();
        let ids: Vec<RowID> = events.iter().map(|e| e.id).collect();

        assert_eq!(cal.cancel(created.head.id, EditScope::All).await.unwrap(), 6);
        let canceled = cal
            .query(&Query::new().statuses([Status::Canceled]))
            .await
            .unwrap();
        assert_eq!(canceled.len(), 6);

        let changed = cal
            .update_title(ids[3], "New Title", EditScope::ThisAndAfter)
            .await
            .unwrap();
        assert_eq!(changed, 3);
        let titles: Vec<String> = cal
            .query(&Query::new())
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.title)
            .collect();
        assert_eq!(titles, ["", "", "", "New Title", "New Title", "New Title"]);

        cal.update_description(ids[1], Some("Some description"), EditScope::This)
            .await
            .unwrap();
        let described: Vec<RowID> = cal
            .query(&Query::new().text(["Some description"]))
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(described, [ids[1]]);
    }

    #[tokio::test]
    async fn update_time_scopes() {
        const BEFORE: [&str; 6] = [
            "2008-01-01 08:00 - 2008-01-01 09:00",
            "2008-01-03 08:00 - 2008-01-03 09:00",
            "2008-01-08 08:00 - 2008-01-08 09:00",
            "2008-01-10 08:00 - 2008-01-10 09:00",
            "2008-01-15 08:00 - 2008-01-15 09:00",
            "2008-01-17 08:00 - 2008-01-17 09:00",
        ];
        let cases = [
            ("no change", "08:00", "09:00", EditScope::This, BEFORE.to_vec()),
            (
                "single event time change",
                "13:00",
                "13:45",
                EditScope::This,
                vec![
                    BEFORE[0],
                    BEFORE[1],
                    BEFORE[2],
                    "2008-01-10 13:00 - 2008-01-10 13:45",
                    BEFORE[4],
                    BEFORE[5],
                ],
            ),
            (
                "all event time changes",
                "13:00",
                "13:45",
                EditScope::All,
                vec![
                    "2008-01-01 13:00 - 2008-01-01 13:45",
                    "2008-01-03 13:00 - 2008-01-03 13:45",
                    "2008-01-08 13:00 - 2008-01-08 13:45",
                    "2008-01-10 13:00 - 2008-01-10 13:45",
                    "2008-01-15 13:00 - 2008-01-15 13:45",
                    "2008-01-17 13:00 - 2008-01-17 13:45",
                ],
            ),
            (
                "all events after or on event time change",
                "13:00",
                "13:45",
                EditScope::ThisAndAfter,
                vec![
                    BEFORE[0],
                    BEFORE[1],
                    BEFORE[2],
                    "2008-01-10 13:00 - 2008-01-10 13:45",
                    "2008-01-15 13:00 - 2008-01-15 13:45",
                    "2008-01-17 13:00 - 2008-01-17 13:45",
                ],
            ),
        ];

        for (name, start, end, scope, expected) in cases {
            let (cal, _) = weekly_series().await;
            cal.update_time(4, start, end, scope).await.unwrap();
            assert_eq!(times(&cal).await, expected, "{name}");
        }
    }

    #[tokio::test]
    async fn update_time_errors() {
        let (cal, _) = weekly_series().await;
        let err = cal
            .update_time(-1, "08:00", "09:00", EditScope::This)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(Missing::Event(-1))));

        let err = cal
            .update_time(4, "10:00", "09:00", EditScope::All)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::StartTimeAfterEndTime)
        ));
    }

    #[tokio::test]
    async fn update_day_time_touches_one_occurrence() {
        let cases = [
            ("2008-01-10", "08:00", "2008-01-10", "09:00"),
            ("2008-01-10", "13:00", "2008-01-10", "13:45"),
            ("2008-01-11", "08:00", "2008-01-11", "09:00"),
            ("2008-01-11", "13:00", "2008-01-11", "13:45"),
        ];
        for (start_day, start_time, end_day, end_time) in cases {
            let (cal, _) = weekly_series().await;
            let before = times(&cal).await;
            let schedule = Schedule {
                start_day: start_day.into(),
                start_time: Some(start_time.into()),
                end_day: end_day.into(),
                end_time: Some(end_time.into()),
                zone: DEN.into(),
                all_day: false,
            };
            cal.update_day_time(4, &schedule).await.unwrap();

            let mut expected = before;
            expected[3] = format!("{start_day} {start_time} - {end_day} {end_time}");
            assert_eq!(times(&cal).await, expected);
        }

        let (cal, _) = weekly_series().await;
        let schedule = Schedule {
            start_day: "2008-01-01".into(),
            start_time: Some("08:00".into()),
            end_day: "2008-01-01".into(),
            end_time: Some("09:00".into()),
            zone: DEN.into(),
            all_day: false,
        };
        let err = cal.update_day_time(-1, &schedule).await.unwrap_err();
        assert!(err.is_not_found());

        let err = cal
            .update_day_time(
                4,
                &Schedule {
                    zone: "Mars/Olympus".into(),
                    ..schedule
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::InvalidZone(_))
        ));
    }

    async fn users_calendar() -> Calendar<MemoryStore> {
        let cal = calendar();
        for day in 1..10 {
            let day_str = format!("2008-01-0{day}");
            // odd days belong to user 1, even days to user 2
            let owner = (day + 1) % 2 + 1;
            let created = cal
                .create(Event {
                    event_type: day,
                    ..Event::all_day(day_str.clone(), day_str).with_owner(owner)
                })
                .await
                .unwrap();
            assert_eq!(created.count, 1);
            if day > 5 {
                let other = day % 2 + 1;
                cal.invite_user(day, other, Permission::INVITEE, EditScope::This)
                    .await
                    .unwrap();
            }
        }
        cal
    }

    #[tokio::test]
    async fn user_queries() {
        let cases = [
            (
                "active events for user",
                Query::new().user_ids([1]).statuses([Status::Active]),
                vec![1, 3, 5, 6, 7, 8, 9],
            ),
            (
                "active events for other user",
                Query::new().user_ids([2]).statuses([Status::Active]),
                vec![2, 4, 6, 7, 8, 9],
            ),
            (
                "active events for multiple users",
                Query::new().user_ids([1, 2]).statuses([Status::Active]),
                vec![1, 2, 3, 4, 5, 6, 7, 8, 9],
            ),
            ("event types", Query::new().event_types([5, 2]), vec![2, 5]),
            ("event ids", Query::new().event_ids([3, 7]), vec![3, 7]),
        ];
        let cal = users_calendar().await;
        for (name, query, expected) in cases {
            let ids: Vec<RowID> = cal
                .query(&query)
                .await
                .unwrap()
                .into_iter()
                .map(|e| e.id)
                .collect();
            assert_eq!(ids, expected, "{name}");
        }
    }

    #[tokio::test]
    async fn declined_invitees_lose_the_event() {
        let cal = users_calendar().await;
        cal.decline_invitation(6, 1, EditScope::This).await.unwrap();
        let ids: Vec<RowID> = cal
            .query(&Query::new().user_ids([1]))
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, [1, 3, 5, 7, 8, 9]);
    }

    #[tokio::test]
    async fn invitations_cascade() {
        let (cal, created) = weekly_series().await;
        let head = created.head.id;
        let invited = cal
            .invite_user(head, 9, Permission::INVITEE, EditScope::All)
            .await
            .unwrap();
        assert_eq!(invited, 6);

        let perms = Permission::READ | Permission::INVITE | Permission::MODIFY;
        let changed = cal
            .update_invitation_permission(4, 9, perms, EditScope::ThisAndAfter)
            .await
            .unwrap();
        assert_eq!(changed, 3);
        assert_eq!(
            cal.get_invitation(head, 9).await.unwrap().unwrap().permission,
            Permission::INVITEE
        );
        assert_eq!(
            cal.get_invitation(6, 9).await.unwrap().unwrap().permission,
            perms
        );

        cal.revoke_invitation(head, 9, EditScope::All).await.unwrap();
        let visible = cal.query(&Query::new().user_ids([9])).await.unwrap();
        assert!(visible.is_empty());
    }

    #[tokio::test]
    async fn inviting_the_owner_keeps_their_invitation() {
        let (cal, created) = weekly_series().await;
        let owner = created.head.owner_id;
        let invited = cal
            .invite_user(created.head.id, owner, Permission::INVITEE, EditScope::All)
            .await
            .unwrap();
        assert_eq!(invited, 6);
        for id in 1..=6 {
            let invite = cal.get_invitation(id, owner).await.unwrap().unwrap();
            assert_eq!(invite.status, InvitationStatus::Confirmed);
            assert_eq!(invite.permission, Permission::OWNER);
            assert_eq!(cal.invitations(id).await.unwrap().len(), 1);
        }
    }

    #[tokio::test]
    async fn invitation_errors() {
        let (cal, _) = weekly_series().await;
        let err = cal
            .invite_user(1, 9, Permission::MODIFY, EditScope::This)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::IncompatibleInvitationPermission)
        ));

        let err = cal
            .accept_invitation(1, 9, EditScope::This)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::NotFound(Missing::Invitation {
                event_id: 1,
                user_id: 9
            })
        ));

        let err = cal
            .update_invitation_permission(1, 9, Permission::empty(), EditScope::This)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::MissingInvitationPermission)
        ));
    }

    #[tokio::test]
    async fn chronological_queries() {
        let cal = calendar();
        for (day, time) in [("2008-01-03", "08:00"), ("2008-01-01", "10:00"), ("2008-01-01", "07:00")] {
            cal.create(Event::timed(day, time, day, "23:00"))
                .await
                .unwrap();
        }
        let ids = |events: Vec<Event>| events.into_iter().map(|e| e.id).collect::<Vec<_>>();
        assert_eq!(ids(cal.query(&Query::new()).await.unwrap()), [1, 2, 3]);
        assert_eq!(
            ids(cal.query_chronological(&Query::new()).await.unwrap()),
            [3, 2, 1]
        );
    }
}
