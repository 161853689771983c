use crate::db::found;
use crate::error::{Result, SiteError, Violations};
use crate::project::VISIBLE_TO;
use crate::types::{EventKind, EventUrgency};
use crate::user::User;
use chrono::{DateTime, Datelike, Days, NaiveDate, Utc};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub id: i64,
    pub description: String,
    pub date: NaiveDate,
    pub responsible: String,
    pub project_id: i64,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Keyword groups checked in order; the first hit names the event type.
const KIND_KEYWORDS: &[(EventKind, &[&str])] = &[
    (EventKind::Meeting, &["meeting", "standup", "kickoff", "discussion"]),
    (EventKind::Deadline, &["deadline", "delivery", "submission", "due"]),
    (EventKind::Review, &["review", "presentation", "demo", "showcase"]),
    (EventKind::Inspection, &["inspection", "visit", "site", "audit"]),
    (EventKind::Training, &["training", "workshop", "seminar"]),
];

/// Monday..=Sunday of the week containing `day`.
pub fn week_bounds(day: NaiveDate) -> (NaiveDate, NaiveDate) {
    let offset = u64::from(day.weekday().num_days_from_monday());
    let monday = day - Days::new(offset);
    (monday, monday + Days::new(6))
}

impl Event {
    pub fn kind(&self) -> EventKind {
        let lower = self.description.to_lowercase();
        KIND_KEYWORDS
            .iter()
            .find(|(_, words)| words.iter().any(|w| lower.contains(w)))
            .map(|(kind, _)| *kind)
            .unwrap_or(EventKind::General)
    }

    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.date < today
    }

    pub fn days_until(&self, today: NaiveDate) -> i64 {
        if self.is_overdue(today) {
            0
        } else {
            (self.date - today).num_days()
        }
    }

    pub fn urgency(&self, today: NaiveDate) -> EventUrgency {
        if self.is_overdue(today) {
            return EventUrgency::Overdue;
        }
        match self.days_until(today) {
            0..=1 => EventUrgency::Urgent,
            2..=3 => EventUrgency::Soon,
            4..=7 => EventUrgency::Upcoming,
            _ => EventUrgency::Future,
        }
    }

    /// `Today`, `Tomorrow`, a weekday name inside the current week, else
    /// `March 04, 2025`.
    pub fn formatted_date(&self, today: NaiveDate) -> String {
        let (monday, sunday) = week_bounds(today);
        if self.date == today {
            "Today".to_string()
        } else if today.succ_opt() == Some(self.date) {
            "Tomorrow".to_string()
        } else if (monday..=sunday).contains(&self.date) {
            self.date.format("%A").to_string()
        } else {
            self.date.format("%B %d, %Y").to_string()
        }
    }

    pub fn view(&self, today: NaiveDate) -> EventView {
        let urgency = self.urgency(today);
        EventView {
            event: self.clone(),
            event_type: self.kind(),
            urgency_level: urgency,
            color: urgency.color(),
            days_until: self.days_until(today),
            formatted_date: self.formatted_date(today),
        }
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            description: row.get("description")?,
            date: row.get("date")?,
            responsible: row.get("responsible")?,
            project_id: row.get("project_id")?,
            completed_at: row.get("completed_at")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EventView {
    #[serde(flatten)]
    pub event: Event,
    pub event_type: EventKind,
    pub urgency_level: EventUrgency,
    pub color: &'static str,
    pub days_until: i64,
    pub formatted_date: String,
}

fn query(conn: &Connection, sql: &str, args: impl rusqlite::Params) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(args, Event::from_row)?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

/// Events on projects the user can see, within an optional date range.
fn visible(
    conn: &Connection,
    user: &User,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    limit: Option<usize>,
) -> Result<Vec<Event>> {
    let scope = if user.is_admin() { "?1 = ?1" } else { VISIBLE_TO };
    let limit = limit.map(|n| format!(" LIMIT {n}")).unwrap_or_default();
    query(
        conn,
        &format!(
            "SELECT e.* FROM events e JOIN projects p ON p.id = e.project_id
             WHERE {scope} AND (?2 IS NULL OR e.date >= ?2) AND (?3 IS NULL OR e.date <= ?3)
             ORDER BY e.date, e.id{limit}"
        ),
        params![user.id, from, to],
    )
}

pub fn get(conn: &Connection, id: i64) -> Result<Event> {
    found(
        conn.query_row("SELECT * FROM events WHERE id = ?1", [id], Event::from_row),
        "event",
        id,
    )
}

/// Fetch an event on a project the user can see; others are not found.
pub fn get_for(conn: &Connection, user: &User, id: i64) -> Result<Event> {
    let event = get(conn, id)?;
    if !crate::project::can_view(conn, user, event.project_id)? {
        return Err(SiteError::not_found("event", id));
    }
    Ok(event)
}

pub fn list(conn: &Connection, user: &User) -> Result<Vec<Event>> {
    visible(conn, user, None, None, None)
}

pub fn between(conn: &Connection, user: &User, from: NaiveDate, to: NaiveDate) -> Result<Vec<Event>> {
    visible(conn, user, Some(from), Some(to), None)
}

pub fn upcoming(conn: &Connection, user: &User, today: NaiveDate) -> Result<Vec<Event>> {
    visible(conn, user, Some(today), None, None)
}

pub fn this_week(conn: &Connection, user: &User, today: NaiveDate) -> Result<Vec<Event>> {
    let (monday, sunday) = week_bounds(today);
    visible(conn, user, Some(monday), Some(sunday), None)
}

/// Upcoming events on projects the user manages, soonest first.
pub fn for_manager(
    conn: &Connection,
    manager_id: i64,
    today: NaiveDate,
    limit: Option<usize>,
) -> Result<Vec<Event>> {
    let limit = limit.map(|n| format!(" LIMIT {n}")).unwrap_or_default();
    query(
        conn,
        &format!(
            "SELECT e.* FROM events e JOIN projects p ON p.id = e.project_id
             WHERE p.project_manager_id = ?1 AND e.date >= ?2
             ORDER BY e.date, e.id{limit}"
        ),
        params![manager_id, today],
    )
}

pub fn for_project(conn: &Connection, project_id: i64) -> Result<Vec<Event>> {
    query(
        conn,
        "SELECT * FROM events WHERE project_id = ?1 ORDER BY date, id",
        [project_id],
    )
}

pub fn upcoming_for_project(conn: &Connection, project_id: i64, today: NaiveDate) -> Result<Vec<Event>> {
    query(
        conn,
        "SELECT * FROM events WHERE project_id = ?1 AND date >= ?2 ORDER BY date, id",
        params![project_id, today],
    )
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventInput {
    pub description: Option<String>,
    pub date: Option<NaiveDate>,
    pub responsible: Option<String>,
    pub project_id: Option<i64>,
}

fn validate(
    description: Option<&str>,
    date: Option<NaiveDate>,
    check_date: bool,
    responsible: Option<&str>,
    project_id: Option<i64>,
    today: NaiveDate,
) -> Result<()> {
    let mut v = Violations::new();
    v.length("Description", description, 3, 500);
    match date {
        None => v.add("Date can't be blank"),
        Some(d) if check_date && d < today => v.add("Date can't be in the past"),
        Some(_) => {}
    }
    v.present("Responsible", responsible);
    v.check(project_id.is_some(), "Project must exist");
    v.into_result()
}

pub fn create(conn: &Connection, input: &EventInput, today: NaiveDate, now: DateTime<Utc>) -> Result<Event> {
    validate(
        input.description.as_deref(),
        input.date,
        true,
        input.responsible.as_deref(),
        input.project_id,
        today,
    )?;
    let project_id = input
        .project_id
        .ok_or_else(|| SiteError::invalid("Project must exist"))?;
    crate::project::get(conn, project_id)?;
    conn.execute(
        "INSERT INTO events (description, date, responsible, project_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
        params![
            input.description.as_deref().map(str::trim),
            input.date,
            input.responsible.as_deref().map(str::trim),
            project_id,
            now
        ],
    )?;
    get(conn, conn.last_insert_rowid())
}

pub fn update(
    conn: &Connection,
    id: i64,
    input: &EventInput,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<Event> {
    let old = get(conn, id)?;
    let description = input.description.clone().unwrap_or(old.description);
    let date = input.date.unwrap_or(old.date);
    let responsible = input.responsible.clone().unwrap_or(old.responsible);
    let project_id = input.project_id.unwrap_or(old.project_id);
    validate(
        Some(&description),
        Some(date),
        date != old.date,
        Some(&responsible),
        Some(project_id),
        today,
    )?;
    if project_id != old.project_id {
        crate::project::get(conn, project_id)?;
    }
    conn.execute(
        "UPDATE events SET description = ?1, date = ?2, responsible = ?3, project_id = ?4,
                updated_at = ?5
         WHERE id = ?6",
        params![description.trim(), date, responsible.trim(), project_id, now, id],
    )?;
    get(conn, id)
}

pub fn delete(conn: &Connection, id: i64) -> Result<()> {
    if conn.execute("DELETE FROM events WHERE id = ?1", [id])? == 0 {
        return Err(SiteError::not_found("event", id));
    }
    Ok(())
}

pub fn mark_completed(conn: &Connection, id: i64, now: DateTime<Utc>) -> Result<Event> {
    let n = conn.execute(
        "UPDATE events SET completed_at = COALESCE(completed_at, ?1), updated_at = ?1
         WHERE id = ?2",
        params![now, id],
    )?;
    if n == 0 {
        return Err(SiteError::not_found("event", id));
    }
    get(conn, id)
}

/// Move an event to a new, non-past date. Completion is cleared.
pub fn reschedule(
    conn: &Connection,
    id: i64,
    date: NaiveDate,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<Event> {
    get(conn, id)?;
    if date < today {
        return Err(SiteError::invalid("Date can't be in the past"));
    }
    conn.execute(
        "UPDATE events SET date = ?1, completed_at = NULL, updated_at = ?2 WHERE id = ?3",
        params![date, now, id],
    )?;
    get(conn, id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Store;
    use crate::testutil;
    use crate::types::Role;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn event(description: &str, date: NaiveDate) -> Event {
        let now = Utc::now();
        Event {
            id: 1,
            description: description.into(),
            date,
            responsible: "Ana".into(),
            project_id: 1,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn kind_from_keywords() {
        let day = d(2025, 6, 1);
        assert_eq!(event("Weekly standup", day).kind(), EventKind::Meeting);
        assert_eq!(event("Steel delivery", day).kind(), EventKind::Deadline);
        assert_eq!(event("Client demo", day).kind(), EventKind::Review);
        assert_eq!(event("Fire audit", day).kind(), EventKind::Inspection);
        assert_eq!(event("Crane workshop", day).kind(), EventKind::Training);
        assert_eq!(event("Pour concrete", day).kind(), EventKind::General);
    }

    #[test]
    fn urgency_bands() {
        // Wednesday
        let today = d(2025, 6, 4);
        assert_eq!(event("x", d(2025, 6, 3)).urgency(today), EventUrgency::Overdue);
        assert_eq!(event("x", today).urgency(today), EventUrgency::Urgent);
        assert_eq!(event("x", d(2025, 6, 5)).urgency(today), EventUrgency::Urgent);
        assert_eq!(event("x", d(2025, 6, 7)).urgency(today), EventUrgency::Soon);
        assert_eq!(event("x", d(2025, 6, 11)).urgency(today), EventUrgency::Upcoming);
        assert_eq!(event("x", d(2025, 6, 12)).urgency(today), EventUrgency::Future);
        assert_eq!(event("x", d(2025, 6, 3)).days_until(today), 0);
    }

    #[test]
    fn formatted_date_forms() {
        let today = d(2025, 6, 4);
        assert_eq!(event("x", today).formatted_date(today), "Today");
        assert_eq!(event("x", d(2025, 6, 5)).formatted_date(today), "Tomorrow");
        assert_eq!(event("x", d(2025, 6, 8)).formatted_date(today), "Sunday");
        assert_eq!(event("x", d(2025, 6, 2)).formatted_date(today), "Monday");
        assert_eq!(event("x", d(2025, 6, 9)).formatted_date(today), "June 09, 2025");
    }

    #[test]
    fn create_validates_and_reschedule_clears_completion() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.conn();
        let now = Utc::now();
        let today = now.date_naive();
        let pm = testutil::user(conn, "pm@site.io", Role::ProjectManager);
        let sup = testutil::supervisor(conn, "sup@site.io");
        let project = testutil::project(conn, pm, sup, now);

        let err = create(conn, &EventInput::default(), today, now).unwrap_err();
        match err {
            SiteError::Validation(msgs) => assert_eq!(msgs.len(), 4),
            other => panic!("unexpected {other:?}"),
        }

        let e = create(
            conn,
            &EventInput {
                description: Some("Site inspection".into()),
                date: today.succ_opt(),
                responsible: Some("Ana".into()),
                project_id: Some(project),
            },
            today,
            now,
        )
        .unwrap();
        let done = mark_completed(conn, e.id, now).unwrap();
        assert!(done.completed_at.is_some());

        let moved = reschedule(conn, e.id, today + Days::new(10), today, now).unwrap();
        assert_eq!(moved.date, today + Days::new(10));
        assert!(moved.completed_at.is_none());
        assert!(reschedule(conn, e.id, today - Days::new(1), today, now).is_err());
    }

    #[test]
    fn listing_is_scoped_to_visible_projects() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.conn();
        let now = Utc::now();
        let today = now.date_naive();
        let pm = testutil::user(conn, "pm@site.io", Role::ProjectManager);
        let other = testutil::user(conn, "other@site.io", Role::ProjectManager);
        let sup = testutil::supervisor(conn, "sup@site.io");
        let project = testutil::project(conn, pm, sup, now);
        for offset in [0u64, 2, 40] {
            create(
                conn,
                &EventInput {
                    description: Some(format!("Progress meeting {offset}")),
                    date: Some(today + Days::new(offset)),
                    responsible: Some("Ana".into()),
                    project_id: Some(project),
                },
                today,
                now,
            )
            .unwrap();
        }
        let pm_user = crate::user::get(conn, pm).unwrap();
        let other_user = crate::user::get(conn, other).unwrap();
        assert_eq!(list(conn, &pm_user).unwrap().len(), 3);
        assert!(list(conn, &other_user).unwrap().is_empty());
        assert_eq!(for_manager(conn, pm, today, Some(2)).unwrap().len(), 2);
        assert_eq!(upcoming_for_project(conn, project, today).unwrap().len(), 3);

        let first = list(conn, &pm_user).unwrap()[0].id;
        assert!(get_for(conn, &pm_user, first).is_ok());
        assert!(matches!(
            get_for(conn, &other_user, first),
            Err(SiteError::NotFound { .. })
        ));
    }
}
