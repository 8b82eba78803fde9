use std::str::FromStr;

use sqlx::{
    QueryBuilder, Sqlite, SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteQueryResult},
};
use time::UtcDateTime;

use super::{DataStore, Schedule};
use crate::data::{
    DayOfWeek, Event, Freq, Invitation, InvitationStatus, Permission, Repeat, RepeatEnd, RowID,
    Status, UserData, parse_day,
};
use crate::error::{Error, Result};
use crate::query::Query;

const EVENT_COLUMNS: &str = "id, source_id, parent_id, owner_id, event_type, title, \
    description, url, status, all_day, is_repeating, repeat_freq, repeat_days, repeat_count, \
    repeat_until, zone, start_day, start_time, end_day, end_time, created, updated, user_data";

const INVITATION_COLUMNS: &str = "event_id, user_id, status, permission, created, updated";

/// Events and invitations in a SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `url` and bring its schema up to date.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        Self::new(pool).await
    }

    /// A private database living as long as the store.
    pub async fn in_memory() -> Result<Self> {
        // every connection to `:memory:` gets its own database, so keep exactly one alive
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::new(pool).await
    }

    /// Wrap an existing pool, running any pending migrations.
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!()
            .run(&pool)
            .await
            .map_err(sqlx::Error::from)?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn update_invitation(
        &self,
        event_id: RowID,
        user_id: RowID,
        column: &str,
        value: i64,
    ) -> Result<()> {
        let sql = format!(
            "UPDATE invitations SET {column} = ?, updated = ? WHERE event_id = ? AND user_id = ?"
        );
        let result = sqlx::query(&sql)
            .bind(value)
            .bind(now())
            .bind(event_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::invitation_not_found(event_id, user_id));
        }
        Ok(())
    }

    async fn upsert_invitation(&self, invitation: &Invitation) -> Result<()> {
        let now = now();
        sqlx::query(
            "INSERT INTO invitations (event_id, user_id, status, permission, created, updated) \
            VALUES (?, ?, ?, ?, ?, ?) \
            ON CONFLICT (event_id, user_id) DO UPDATE SET \
            status = excluded.status, permission = excluded.permission, updated = excluded.updated",
        )
        .bind(invitation.event_id)
        .bind(invitation.user_id)
        .bind(invitation.status.code())
        .bind(i64::from(invitation.permission.bits()))
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn event_exists(&self, id: RowID) -> Result<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT id FROM events WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }
}

impl DataStore for SqliteStore {
    async fn create(&self, event: Event) -> Result<Event> {
        let (repeat_freq, repeat_days, repeat_count, repeat_until) = match &event.repeat {
            Some(repeat) => (
                Some(repeat.freq.code()),
                i64::from(repeat.days.bits()),
                repeat.end.count().map(i64::from),
                repeat.end.until().map(|date| date.to_string()),
            ),
            None => (None, 0, None, None),
        };
        let user_data = encode_user_data(&event.user_data)?;
        let now = now();
        let id: RowID = sqlx::query_scalar(
            "INSERT INTO events (source_id, parent_id, owner_id, event_type, title, description, \
            url, status, all_day, is_repeating, repeat_freq, repeat_days, repeat_count, \
            repeat_until, zone, start_day, start_time, end_day, end_time, created, updated, \
            user_data) \
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
            RETURNING id",
        )
        .bind(event.source_id)
        .bind(event.parent_id)
        .bind(event.owner_id)
        .bind(event.event_type)
        .bind(&event.title)
        .bind(&event.description)
        .bind(&event.url)
        .bind(event.status.code())
        .bind(event.all_day)
        .bind(event.is_repeating)
        .bind(repeat_freq)
        .bind(repeat_days)
        .bind(repeat_count)
        .bind(repeat_until)
        .bind(&event.zone)
        .bind(&event.start_day)
        .bind(&event.start_time)
        .bind(&event.end_day)
        .bind(&event.end_time)
        .bind(now)
        .bind(now)
        .bind(user_data)
        .fetch_one(&self.pool)
        .await?;

        let owner = Invitation {
            status: InvitationStatus::Confirmed,
            ..Invitation::new(id, event.owner_id, Permission::OWNER)
        };
        self.upsert_invitation(&owner).await?;

        self.get(id).await?.ok_or(Error::event_not_found(id))
    }

    async fn get(&self, id: RowID) -> Result<Option<Event>> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ?");
        let row: Option<EventRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Event::try_from).transpose()
    }

    async fn query(&self, query: &Query) -> Result<Vec<Event>> {
        let mut builder =
            QueryBuilder::<Sqlite>::new(format!("SELECT {EVENT_COLUMNS} FROM events WHERE 1 = 1"));
        push_in(&mut builder, "id", query.event_ids.iter().copied());
        push_in(&mut builder, "parent_id", query.parent_ids.iter().copied());
        push_in(&mut builder, "event_type", query.event_types.iter().copied());
        push_in(&mut builder, "source_id", query.source_ids.iter().copied());
        push_in(
            &mut builder,
            "status",
            query.statuses.iter().map(|status| status.code()),
        );
        builder.push(" ORDER BY id");
        tracing::debug!(sql = builder.sql(), "querying events");

        let rows: Vec<EventRow> = builder.build_query_as().fetch_all(&self.pool).await?;
        let events = rows
            .into_iter()
            .map(Event::try_from)
            .collect::<Result<Vec<_>>>()?;

        let invitations = if query.user_ids.is_empty() {
            vec![]
        } else {
            let mut builder = QueryBuilder::<Sqlite>::new(format!(
                "SELECT {INVITATION_COLUMNS} FROM invitations WHERE 1 = 1"
            ));
            push_in(&mut builder, "user_id", query.user_ids.iter().copied());
            let rows: Vec<InvitationRow> = builder.build_query_as().fetch_all(&self.pool).await?;
            rows.into_iter()
                .map(Invitation::try_from)
                .collect::<Result<Vec<_>>>()?
        };

        Ok(events
            .into_iter()
            .filter(|event| query.matches_attendee(Some(event), &invitations))
            .collect())
    }

    async fn set_parent_id(&self, id: RowID, parent_id: RowID) -> Result<()> {
        let result = sqlx::query("UPDATE events SET parent_id = ?, updated = ? WHERE id = ?")
            .bind(parent_id)
            .bind(now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        expect_event(id, result)
    }

    async fn set_time(&self, id: RowID, start_time: &str, end_time: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE events SET start_time = ?, end_time = ?, all_day = FALSE, updated = ? \
            WHERE id = ?",
        )
        .bind(start_time)
        .bind(end_time)
        .bind(now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        expect_event(id, result)
    }

    async fn set_day_time(&self, id: RowID, schedule: &Schedule) -> Result<()> {
        let result = sqlx::query(
            "UPDATE events SET start_day = ?, start_time = ?, end_day = ?, end_time = ?, \
            zone = ?, all_day = ?, updated = ? WHERE id = ?",
        )
        .bind(&schedule.start_day)
        .bind(&schedule.start_time)
        .bind(&schedule.end_day)
        .bind(&schedule.end_time)
        .bind(&schedule.zone)
        .bind(schedule.all_day)
        .bind(now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        expect_event(id, result)
    }

    async fn set_status(&self, id: RowID, status: Status) -> Result<()> {
        let result = sqlx::query("UPDATE events SET status = ?, updated = ? WHERE id = ?")
            .bind(status.code())
            .bind(now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        expect_event(id, result)
    }

    async fn set_title(&self, id: RowID, title: &str) -> Result<()> {
        let result = sqlx::query("UPDATE events SET title = ?, updated = ? WHERE id = ?")
            .bind(title)
            .bind(now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        expect_event(id, result)
    }

    async fn set_description(&self, id: RowID, description: Option<&str>) -> Result<()> {
        let result = sqlx::query("UPDATE events SET description = ?, updated = ? WHERE id = ?")
            .bind(description)
            .bind(now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        expect_event(id, result)
    }

    async fn set_url(&self, id: RowID, url: Option<&str>) -> Result<()> {
        let result = sqlx::query("UPDATE events SET url = ?, updated = ? WHERE id = ?")
            .bind(url)
            .bind(now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        expect_event(id, result)
    }

    async fn set_user_data(&self, id: RowID, user_data: &UserData) -> Result<()> {
        let result = sqlx::query("UPDATE events SET user_data = ?, updated = ? WHERE id = ?")
            .bind(encode_user_data(user_data)?)
            .bind(now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        expect_event(id, result)
    }

    async fn add_invitation(&self, invitation: Invitation) -> Result<Invitation> {
        if !self.event_exists(invitation.event_id).await? {
            return Err(Error::event_not_found(invitation.event_id));
        }
        self.upsert_invitation(&invitation).await?;
        self.get_invitation(invitation.event_id, invitation.user_id)
            .await?
            .ok_or(Error::invitation_not_found(
                invitation.event_id,
                invitation.user_id,
            ))
    }

    async fn set_invitation_status(
        &self,
        event_id: RowID,
        user_id: RowID,
        status: InvitationStatus,
    ) -> Result<()> {
        self.update_invitation(event_id, user_id, "status", status.code())
            .await
    }

    async fn set_invitation_permissions(
        &self,
        event_id: RowID,
        user_id: RowID,
        permission: Permission,
    ) -> Result<()> {
        self.update_invitation(event_id, user_id, "permission", permission.bits().into())
            .await
    }

    async fn get_invitation(&self, event_id: RowID, user_id: RowID) -> Result<Option<Invitation>> {
        let sql = format!(
            "SELECT {INVITATION_COLUMNS} FROM invitations WHERE event_id = ? AND user_id = ?"
        );
        let row: Option<InvitationRow> = sqlx::query_as(&sql)
            .bind(event_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Invitation::try_from).transpose()
    }

    async fn invitations(&self, event_id: RowID) -> Result<Vec<Invitation>> {
        let sql = format!(
            "SELECT {INVITATION_COLUMNS} FROM invitations WHERE event_id = ? ORDER BY rowid"
        );
        let rows: Vec<InvitationRow> = sqlx::query_as(&sql)
            .bind(event_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Invitation::try_from).collect()
    }
}

/// Append `AND column IN (..)`, or nothing when `values` is empty.
fn push_in(
    builder: &mut QueryBuilder<'_, Sqlite>,
    column: &str,
    values: impl ExactSizeIterator<Item = i64>,
) {
    if values.len() == 0 {
        return;
    }
    builder.push(" AND ").push(column).push(" IN (");
    let mut list = builder.separated(", ");
    for value in values {
        list.push_bind(value);
    }
    list.push_unseparated(")");
}

fn expect_event(id: RowID, result: SqliteQueryResult) -> Result<()> {
    if result.rows_affected() == 0 {
        return Err(Error::event_not_found(id));
    }
    Ok(())
}

fn now() -> i64 {
    UtcDateTime::now().unix_timestamp()
}

fn timestamp(secs: i64) -> Result<UtcDateTime> {
    UtcDateTime::from_unix_timestamp(secs).map_err(|e| Error::Decode(e.to_string()))
}

fn encode_user_data(user_data: &UserData) -> Result<String> {
    serde_json::to_string(user_data).map_err(|e| Error::Decode(e.to_string()))
}

#[derive(Debug, sqlx::FromRow)]
struct EventRow {
    id: i64,
    source_id: Option<i64>,
    parent_id: Option<i64>,
    owner_id: i64,
    event_type: i64,
    title: String,
    description: Option<String>,
    url: Option<String>,
    status: i64,
    all_day: bool,
    is_repeating: bool,
    repeat_freq: Option<i64>,
    repeat_days: i64,
    repeat_count: Option<i64>,
    repeat_until: Option<String>,
    zone: String,
    start_day: String,
    start_time: Option<String>,
    end_day: String,
    end_time: Option<String>,
    created: i64,
    updated: i64,
    user_data: String,
}

impl EventRow {
    fn repeat(&self) -> Result<Option<Repeat>> {
        let Some(code) = self.repeat_freq else {
            return Ok(None);
        };
        let freq = Freq::try_from(code)?;
        let days = u8::try_from(self.repeat_days)
            .ok()
            .and_then(DayOfWeek::from_bits)
            .ok_or_else(|| Error::Decode(format!("repeat days `{}`", self.repeat_days)))?;
        let end = match (self.repeat_count, self.repeat_until.as_deref()) {
            (Some(count), _) => RepeatEnd::Count(
                u32::try_from(count)
                    .map_err(|_| Error::Decode(format!("repeat count `{count}`")))?,
            ),
            (None, Some(until)) => RepeatEnd::Until(
                parse_day(until).ok_or_else(|| Error::Decode(format!("repeat until `{until}`")))?,
            ),
            (None, None) => RepeatEnd::Forever,
        };
        Ok(Some(Repeat { freq, days, end }))
    }
}

impl TryFrom<EventRow> for Event {
    type Error = Error;

    fn try_from(row: EventRow) -> Result<Self> {
        let repeat = row.repeat()?;
        let user_data = serde_json::from_str(&row.user_data)
            .map_err(|e| Error::Decode(format!("user data of event {}: {e}", row.id)))?;
        Ok(Event {
            id: row.id,
            source_id: row.source_id,
            parent_id: row.parent_id,
            owner_id: row.owner_id,
            event_type: row.event_type,
            title: row.title,
            description: row.description,
            url: row.url,
            status: Status::try_from(row.status)?,
            all_day: row.all_day,
            is_repeating: row.is_repeating,
            repeat,
            zone: row.zone,
            start_day: row.start_day,
            start_time: row.start_time,
            end_day: row.end_day,
            end_time: row.end_time,
            created: Some(timestamp(row.created)?),
            updated: Some(timestamp(row.updated)?),
            user_data,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct InvitationRow {
    event_id: i64,
    user_id: i64,
    status: i64,
    permission: i64,
    created: i64,
    updated: i64,
}

impl TryFrom<InvitationRow> for Invitation {
    type Error = Error;

    fn try_from(row: InvitationRow) -> Result<Self> {
        let permission = u32::try_from(row.permission)
            .ok()
            .and_then(Permission::from_bits)
            .ok_or_else(|| Error::Decode(format!("permission `{}`", row.permission)))?;
        Ok(Invitation {
            event_id: row.event_id,
            user_id: row.user_id,
            status: InvitationStatus::try_from(row.status)?,
            permission,
            created: Some(timestamp(row.created)?),
            updated: Some(timestamp(row.updated)?),
        })
    }
}
