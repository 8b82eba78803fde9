use almanac::{
    Calendar, EditScope, Query, Schedule, SqliteStore,
    config::Settings,
    data::{
        DATE_DESC, DayOfWeek, Event, Freq, Invitation, Permission, Repeat, RepeatEnd, RowID,
        Status, TIME_DESC,
    },
};
use anyhow::{Context, Result, bail};
use camino::Utf8PathBuf;
use clap::Parser;
use cli_table::{Table, WithTitle, print_stdout};
use time::{Date, PrimitiveDateTime, Time};
use tracing_subscriber::EnvFilter;

#[derive(Debug, clap::Parser)]
struct Args {
    /// JSON settings file
    #[clap(long, global = true)]
    config: Option<Utf8PathBuf>,
    #[clap(subcommand)]
    cmd: Cmd,
}

#[derive(Debug, clap::Parser)]
enum Cmd {
    /// Create an event, or a series of events
    CreateEvent {
        title: String,
        /// `YYYY-MM-DD` for all-day events, `YYYY-MM-DD HH:MM` otherwise
        start: String,
        end: String,
        #[clap(long)]
        zone: Option<String>,
        #[clap(long)]
        owner: Option<RowID>,
        #[clap(long)]
        description: Option<String>,
        #[clap(long)]
        url: Option<String>,
        #[clap(long, default_value_t = 0)]
        event_type: i64,
        /// daily, weekly, monthly or yearly
        #[clap(long)]
        repeat: Option<Freq>,
        /// Days of a weekly series, e.g. `tue,thu`
        #[clap(long)]
        days: Option<DayOfWeek>,
        /// Number of occurrences
        #[clap(long)]
        count: Option<u32>,
        /// Last day an occurrence may start on
        #[clap(long)]
        until: Option<String>,
    },
    /// List events, earliest first
    ListEvents {
        #[clap(long)]
        from: Option<String>,
        #[clap(long)]
        to: Option<String>,
        #[clap(long)]
        parent: Option<RowID>,
        #[clap(long)]
        status: Vec<Status>,
        #[clap(long)]
        text: Vec<String>,
        /// Events owned by, or open invitations of, this user
        #[clap(long)]
        user: Vec<RowID>,
    },
    /// Cancel events
    Cancel {
        id: RowID,
        #[clap(long, default_value_t = EditScope::This)]
        scope: EditScope,
    },
    /// Remove events
    Remove {
        id: RowID,
        #[clap(long, default_value_t = EditScope::This)]
        scope: EditScope,
    },
    /// Change the title of events
    Retitle {
        id: RowID,
        title: String,
        #[clap(long, default_value_t = EditScope::This)]
        scope: EditScope,
    },
    /// Change the time of day of events
    Retime {
        id: RowID,
        start_time: String,
        end_time: String,
        #[clap(long, default_value_t = EditScope::This)]
        scope: EditScope,
    },
    /// Move a single occurrence to other days
    Reschedule {
        id: RowID,
        start: String,
        end: String,
        #[clap(long)]
        zone: Option<String>,
    },
    /// Invite a user to events
    Invite {
        id: RowID,
        user: RowID,
        /// Flags joined with `|`, e.g. `READ | INVITE`
        #[clap(long, default_value = "READ")]
        permission: Permission,
        #[clap(long, default_value_t = EditScope::This)]
        scope: EditScope,
    },
    /// Answer or withdraw an invitation
    Respond {
        id: RowID,
        user: RowID,
        response: Response,
        #[clap(long, default_value_t = EditScope::This)]
        scope: EditScope,
    },
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum Response {
    Accept,
    Decline,
    Revoke,
}

#[derive(Table)]
struct EventDisplay {
    #[table(title = "ID")]
    id: RowID,
    #[table(title = "Parent")]
    parent: String,
    #[table(title = "Title")]
    title: String,
    #[table(title = "When")]
    when: String,
    #[table(title = "Zone")]
    zone: String,
    #[table(title = "Status")]
    status: Status,
}

impl From<Event> for EventDisplay {
    fn from(event: Event) -> Self {
        let when = match event.interval() {
            Ok(interval) => interval.to_string(),
            Err(_) => format!("{} - {}", event.start_day, event.end_day),
        };
        Self {
            id: event.id,
            parent: event.parent_id.map(|id| id.to_string()).unwrap_or_default(),
            title: event.title,
            when,
            zone: event.zone,
            status: event.status,
        }
    }
}

#[derive(Table)]
struct InvitationDisplay {
    #[table(title = "Event")]
    event_id: RowID,
    #[table(title = "User")]
    user_id: RowID,
    #[table(title = "Status")]
    status: String,
    #[table(title = "Permission")]
    permission: String,
}

impl From<Invitation> for InvitationDisplay {
    fn from(invite: Invitation) -> Self {
        Self {
            event_id: invite.event_id,
            user_id: invite.user_id,
            status: invite.status.to_string(),
            permission: invite.permission.to_string(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    // a missing `.env` is fine, everything can come from the environment
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    if let Err(e) = run(args).await {
        tracing::error!("{e:?}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run(args: Args) -> Result<()> {
    let settings = match &args.config {
        Some(path) => {
            Settings::from_file(path).with_context(|| format!("reading settings `{path}`"))?
        }
        None => Settings::default(),
    };
    let store = SqliteStore::connect(&settings.database_url()?).await?;
    let calendar = Calendar::new(store);

    match args.cmd {
        Cmd::CreateEvent {
            title,
            start,
            end,
            zone,
            owner,
            description,
            url,
            event_type,
            repeat,
            days,
            count,
            until,
        } => {
            let repeat = repeat_pattern(repeat, days, count, until.as_deref())?;
            let (start_day, start_time) = split_when(&start);
            let (end_day, end_time) = split_when(&end);
            let mut event = Event {
                owner_id: owner.unwrap_or(settings.default_owner),
                event_type,
                title,
                description,
                url,
                zone: zone.unwrap_or(settings.default_zone),
                all_day: start_time.is_none(),
                start_day,
                start_time,
                end_day,
                end_time,
                ..Event::default()
            };
            if let Some(repeat) = repeat {
                event = event.repeating(repeat);
            }
            let created = calendar.create(event).await?;
            let series = match created.head.parent_id {
                Some(parent) => calendar
                    .query_chronological(&Query::new().parent_ids([parent]))
                    .await?,
                None => vec![created.head],
            };
            print_events(series)
        }
        Cmd::ListEvents {
            from,
            to,
            parent,
            status,
            text,
            user,
        } => {
            let mut query = Query::new()
                .parent_ids(parent)
                .statuses(status)
                .text(text)
                .user_ids(user);
            if let Some(from) = from {
                query = query.starting(parse_instant(&from)?);
            }
            if let Some(to) = to {
                query = query.ending(parse_instant(&to)?);
            }
            print_events(calendar.query_chronological(&query).await?)
        }
        Cmd::Cancel { id, scope } => changed(calendar.cancel(id, scope).await?),
        Cmd::Remove { id, scope } => changed(calendar.remove(id, scope).await?),
        Cmd::Retitle { id, title, scope } => {
            changed(calendar.update_title(id, &title, scope).await?)
        }
        Cmd::Retime {
            id,
            start_time,
            end_time,
            scope,
        } => changed(
            calendar
                .update_time(id, &start_time, &end_time, scope)
                .await?,
        ),
        Cmd::Reschedule {
            id,
            start,
            end,
            zone,
        } => {
            let current = calendar
                .get(id)
                .await?
                .with_context(|| format!("no event with ID `{id}`"))?;
            let (start_day, start_time) = split_when(&start);
            let (end_day, end_time) = split_when(&end);
            let schedule = Schedule {
                all_day: start_time.is_none(),
                start_day,
                start_time,
                end_day,
                end_time,
                zone: zone.unwrap_or(current.zone),
            };
            calendar.update_day_time(id, &schedule).await?;
            changed(1)
        }
        Cmd::Invite {
            id,
            user,
            permission,
            scope,
        } => {
            changed(calendar.invite_user(id, user, permission, scope).await?)?;
            print_invitations(calendar.invitations(id).await?)
        }
        Cmd::Respond {
            id,
            user,
            response,
            scope,
        } => {
            let count = match response {
                Response::Accept => calendar.accept_invitation(id, user, scope).await?,
                Response::Decline => calendar.decline_invitation(id, user, scope).await?,
                Response::Revoke => calendar.revoke_invitation(id, user, scope).await?,
            };
            changed(count)?;
            print_invitations(calendar.invitations(id).await?)
        }
    }
}

fn repeat_pattern(
    freq: Option<Freq>,
    days: Option<DayOfWeek>,
    count: Option<u32>,
    until: Option<&str>,
) -> Result<Option<Repeat>> {
    let Some(freq) = freq else {
        if days.is_some() || count.is_some() || until.is_some() {
            bail!("`--days`, `--count` and `--until` need `--repeat`");
        }
        return Ok(None);
    };
    let end = match (count, until) {
        (Some(count), None) => RepeatEnd::Count(count),
        (None, Some(until)) => RepeatEnd::Until(
            Date::parse(until, DATE_DESC).with_context(|| format!("invalid date `{until}`"))?,
        ),
        (None, None) => RepeatEnd::Forever,
        (Some(_), Some(_)) => bail!("only one of `--count` and `--until` can be set"),
    };
    Ok(Some(Repeat {
        freq,
        days: days.unwrap_or(DayOfWeek::empty()),
        end,
    }))
}

/// Split `YYYY-MM-DD HH:MM` into its day and optional time.
fn split_when(input: &str) -> (String, Option<String>) {
    match input.trim().split_once(' ') {
        Some((day, time)) => (day.to_owned(), Some(time.trim().to_owned())),
        None => (input.trim().to_owned(), None),
    }
}

/// Parse a query bound. A bare day means midnight.
fn parse_instant(input: &str) -> Result<PrimitiveDateTime> {
    let (day, time) = split_when(input);
    let day = Date::parse(&day, DATE_DESC).with_context(|| format!("invalid date `{day}`"))?;
    let time = match time {
        Some(time) => {
            Time::parse(&time, TIME_DESC).with_context(|| format!("invalid time `{time}`"))?
        }
        None => Time::MIDNIGHT,
    };
    Ok(PrimitiveDateTime::new(day, time))
}

fn print_events(events: Vec<Event>) -> Result<()> {
    let rows: Vec<EventDisplay> = events.into_iter().map(EventDisplay::from).collect();
    print_stdout(rows.with_title())?;
    Ok(())
}

fn print_invitations(invitations: Vec<Invitation>) -> Result<()> {
    let rows: Vec<InvitationDisplay> = invitations
        .into_iter()
        .map(InvitationDisplay::from)
        .collect();
    print_stdout(rows.with_title())?;
    Ok(())
}

fn changed(count: usize) -> Result<()> {
    println!("{count} event(s) changed");
    Ok(())
}
