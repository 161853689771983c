use crate::db::found;
use crate::error::{Result, SiteError, Violations};
use crate::types::{ProjectPriority, ProjectStatus};
use crate::user::User;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct Project {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub status: ProjectStatus,
    pub priority: ProjectPriority,
    pub location: Option<String>,
    pub lead_person: Option<String>,
    pub responsible: Option<String>,
    pub budget: Option<f64>,
    pub start_date: Option<NaiveDate>,
    pub finishing_date: NaiveDate,
    pub actual_start_date: Option<NaiveDate>,
    pub progress_percentage: f64,
    pub last_progress_update: Option<DateTime<Utc>>,
    pub progress_notes: Option<String>,
    pub project_manager_id: i64,
    pub supervisor_id: i64,
    pub site_manager_id: Option<i64>,
    pub user_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get("id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        status: row.get("status")?,
        priority: row.get("priority")?,
        location: row.get("location")?,
        lead_person: row.get("lead_person")?,
        responsible: row.get("responsible")?,
        budget: row.get("budget")?,
        start_date: row.get("start_date")?,
        finishing_date: row.get("finishing_date")?,
        actual_start_date: row.get("actual_start_date")?,
        progress_percentage: row.get("progress_percentage")?,
        last_progress_update: row.get("last_progress_update")?,
        progress_notes: row.get("progress_notes")?,
        project_manager_id: row.get("project_manager_id")?,
        supervisor_id: row.get("supervisor_id")?,
        site_manager_id: row.get("site_manager_id")?,
        user_id: row.get("user_id")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

/// Projects a non-admin user can see: ones they manage or own, and ones
/// whose supervisor or site manager record shares their e-mail. `?1` is the
/// user id.
pub(crate) const VISIBLE_TO: &str = "(p.project_manager_id = ?1 OR p.user_id = ?1
  OR p.supervisor_id IN (SELECT s.id FROM supervisors s JOIN users u
                         ON u.email = s.email COLLATE NOCASE WHERE u.id = ?1)
  OR p.site_manager_id IN (SELECT m.id FROM site_managers m JOIN users u
                           ON u.email = m.email COLLATE NOCASE WHERE u.id = ?1))";

fn query(conn: &Connection, sql: &str, args: impl rusqlite::Params) -> Result<Vec<Project>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(args, from_row)?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

pub fn get(conn: &Connection, id: i64) -> Result<Project> {
    found(
        conn.query_row("SELECT * FROM projects WHERE id = ?1", [id], from_row),
        "project",
        id,
    )
}

pub fn list_all(conn: &Connection) -> Result<Vec<Project>> {
    query(conn, "SELECT * FROM projects ORDER BY id", [])
}

pub fn list_visible(conn: &Connection, user: &User) -> Result<Vec<Project>> {
    if user.is_admin() {
        return list_all(conn);
    }
    query(
        conn,
        &format!("SELECT p.* FROM projects p WHERE {VISIBLE_TO} ORDER BY p.id"),
        [user.id],
    )
}

pub fn can_view(conn: &Connection, user: &User, id: i64) -> Result<bool> {
    if user.is_admin() {
        return Ok(true);
    }
    Ok(conn
        .query_row(
            &format!("SELECT 1 FROM projects p WHERE p.id = ?2 AND {VISIBLE_TO}"),
            params![user.id, id],
            |_| Ok(()),
        )
        .optional()?
        .is_some())
}

/// Fetch a project the user is allowed to see. Hidden projects are not found.
pub fn get_visible(conn: &Connection, user: &User, id: i64) -> Result<Project> {
    if !can_view(conn, user, id)? {
        return Err(SiteError::not_found("project", id));
    }
    get(conn, id)
}

/// Projects the user manages, soonest deadline first.
pub fn managed_by(conn: &Connection, user_id: i64) -> Result<Vec<Project>> {
    query(
        conn,
        "SELECT * FROM projects WHERE project_manager_id = ?1 ORDER BY finishing_date, id",
        [user_id],
    )
}

pub fn for_supervisor(conn: &Connection, supervisor_id: i64) -> Result<Vec<Project>> {
    query(
        conn,
        "SELECT * FROM projects WHERE supervisor_id = ?1 ORDER BY finishing_date, id",
        [supervisor_id],
    )
}

/// Not completed, due between `from` and `to` inclusive.
pub fn due_between(conn: &Connection, from: NaiveDate, to: NaiveDate) -> Result<Vec<Project>> {
    query(
        conn,
        "SELECT * FROM projects
         WHERE finishing_date >= ?1 AND finishing_date <= ?2 AND status != 'completed'
         ORDER BY finishing_date, id",
        params![from, to],
    )
}

/// Create/update payload. On update an absent field keeps its value; the
/// doubled options also accept an explicit `null`, which clears the column.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectInput {
    pub title: Option<String>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub description: Option<Option<String>>,
    pub status: Option<ProjectStatus>,
    pub priority: Option<ProjectPriority>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub location: Option<Option<String>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub lead_person: Option<Option<String>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub responsible: Option<Option<String>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub budget: Option<Option<f64>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub start_date: Option<Option<NaiveDate>>,
    pub finishing_date: Option<NaiveDate>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub actual_start_date: Option<Option<NaiveDate>>,
    pub supervisor_id: Option<i64>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub site_manager_id: Option<Option<i64>>,
    pub user_id: Option<i64>,
}

/// `Some(v)` replaces the old value (`Some(None)` clears it); `None` keeps it.
fn merged<T: Clone>(change: &Option<Option<T>>, old: &Option<T>) -> Option<T> {
    match change {
        Some(v) => v.clone(),
        None => old.clone(),
    }
}

fn exists(conn: &Connection, table: &str, id: i64) -> Result<bool> {
    Ok(conn
        .query_row(&format!("SELECT 1 FROM {table} WHERE id = ?1"), [id], |_| Ok(()))
        .optional()?
        .is_some())
}

fn validate(
    conn: &Connection,
    title: &str,
    finishing_date: Option<NaiveDate>,
    check_finishing: bool,
    supervisor_id: Option<i64>,
    site_manager_id: Option<i64>,
    today: NaiveDate,
) -> Result<()> {
    let mut v = Violations::new();
    v.length("Title", Some(title), 3, 255);
    match finishing_date {
        None => v.add("Finishing date can't be blank"),
        Some(d) if check_finishing && d < today => v.add("Finishing date can't be in the past"),
        Some(_) => {}
    }
    match supervisor_id {
        None => v.add("Supervisor must exist"),
        Some(id) => v.check(exists(conn, "supervisors", id)?, "Supervisor must exist"),
    }
    if let Some(id) = site_manager_id {
        v.check(exists(conn, "site_managers", id)?, "Site manager must exist");
    }
    v.into_result()
}

/// Create a project managed by `manager_id`.
pub fn create(
    conn: &Connection,
    manager_id: i64,
    input: &ProjectInput,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<Project> {
    let title = input.title.clone().unwrap_or_default();
    validate(
        conn,
        &title,
        input.finishing_date,
        true,
        input.supervisor_id,
        input.site_manager_id.flatten(),
        today,
    )?;
    conn.execute(
        "INSERT INTO projects
           (title, description, status, priority, location, lead_person, responsible, budget,
            start_date, finishing_date, actual_start_date, project_manager_id, supervisor_id,
            site_manager_id, user_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?16)",
        params![
            title.trim(),
            input.description.clone().flatten(),
            input.status.unwrap_or_default(),
            input.priority.unwrap_or_default(),
            input.location.clone().flatten(),
            input.lead_person.clone().flatten(),
            input.responsible.clone().flatten(),
            input.budget.flatten(),
            input.start_date.flatten(),
            input.finishing_date,
            input.actual_start_date.flatten(),
            manager_id,
            input.supervisor_id,
            input.site_manager_id.flatten(),
            input.user_id,
            now,
        ],
    )?;
    let id = conn.last_insert_rowid();
    tracing::info!(project_id = id, manager_id, "project created");
    get(conn, id)
}

#[derive(Debug, Clone)]
pub struct ProjectChange {
    pub project: Project,
    pub previous_status: ProjectStatus,
}

impl ProjectChange {
    pub fn status_changed(&self) -> Option<(ProjectStatus, ProjectStatus)> {
        (self.previous_status != self.project.status)
            .then_some((self.previous_status, self.project.status))
    }
}

/// Apply the fields present in `input`; nullable fields sent as `null` are
/// cleared. The finishing date is only checked against `today` when it changes.
pub fn update(
    conn: &Connection,
    id: i64,
    input: &ProjectInput,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<ProjectChange> {
    let old = get(conn, id)?;
    let title = input.title.clone().unwrap_or_else(|| old.title.clone());
    let finishing = input.finishing_date.unwrap_or(old.finishing_date);
    let supervisor_id = input.supervisor_id.unwrap_or(old.supervisor_id);
    let site_manager_id = merged(&input.site_manager_id, &old.site_manager_id);
    validate(
        conn,
        &title,
        Some(finishing),
        finishing != old.finishing_date,
        Some(supervisor_id),
        input.site_manager_id.flatten(),
        today,
    )?;
    conn.execute(
        "UPDATE projects SET title = ?1, description = ?2, status = ?3, priority = ?4,
                location = ?5, lead_person = ?6, responsible = ?7, budget = ?8,
                start_date = ?9, finishing_date = ?10, actual_start_date = ?11,
                supervisor_id = ?12, site_manager_id = ?13, user_id = ?14, updated_at = ?15
         WHERE id = ?16",
        params![
            title.trim(),
            merged(&input.description, &old.description),
            input.status.unwrap_or(old.status),
            input.priority.unwrap_or(old.priority),
            merged(&input.location, &old.location),
            merged(&input.lead_person, &old.lead_person),
            merged(&input.responsible, &old.responsible),
            merged(&input.budget, &old.budget),
            merged(&input.start_date, &old.start_date),
            finishing,
            merged(&input.actual_start_date, &old.actual_start_date),
            supervisor_id,
            site_manager_id,
            input.user_id.or(old.user_id),
            now,
            id,
        ],
    )?;
    Ok(ProjectChange {
        project: get(conn, id)?,
        previous_status: old.status,
    })
}

/// Events, milestones and progress updates go with the project; tenders,
/// tasks and notifications keep their rows with the link cleared.
pub fn delete(conn: &Connection, id: i64) -> Result<()> {
    let n = conn.execute("DELETE FROM projects WHERE id = ?1", [id])?;
    if n == 0 {
        return Err(SiteError::not_found("project", id));
    }
    tracing::info!(project_id = id, "project deleted");
    Ok(())
}

/// `[("2025-03", 4), ...]` counting projects by creation month.
pub fn chart_data(conn: &Connection, user: &User) -> Result<Vec<(String, i64)>> {
    let (sql, args): (String, Vec<i64>) = if user.is_admin() {
        (
            "SELECT substr(p.created_at, 1, 7) AS month, COUNT(*) FROM projects p
             GROUP BY month ORDER BY month"
                .into(),
            vec![],
        )
    } else {
        (
            format!(
                "SELECT substr(p.created_at, 1, 7) AS month, COUNT(*) FROM projects p
                 WHERE {VISIBLE_TO} GROUP BY month ORDER BY month"
            ),
            vec![user.id],
        )
    };
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(args), |row| {
        Ok((row.get(0)?, row.get(1)?))
    })?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

// ---------------------------------------------------------------------------
// Team and timeline
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TeamMember {
    pub role: &'static str,
    pub name: String,
    pub email: String,
    /// Set when the person has a user account.
    pub user_id: Option<i64>,
}

/// Everyone attached to a project: manager, supervisor, site manager and
/// task assignees, de-duplicated by e-mail.
pub fn team(conn: &Connection, project: &Project) -> Result<Vec<TeamMember>> {
    let mut members: Vec<TeamMember> = Vec::new();
    let mut push = |m: TeamMember| {
        if !members.iter().any(|x| x.email.eq_ignore_ascii_case(&m.email)) {
            members.push(m);
        }
    };

    let manager = crate::user::get(conn, project.project_manager_id)?;
    push(TeamMember {
        role: "project_manager",
        name: manager.display_name().to_string(),
        email: manager.email.clone(),
        user_id: Some(manager.id),
    });

    let linked_user = |email: &str| -> Result<Option<i64>> {
        Ok(crate::user::find_by_email(conn, email)?.map(|u| u.id))
    };

    if let Some((name, email)) = conn
        .query_row(
            "SELECT name, email FROM supervisors WHERE id = ?1",
            [project.supervisor_id],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        )
        .optional()?
    {
        let user_id = linked_user(&email)?;
        push(TeamMember {
            role: "supervisor",
            name,
            email,
            user_id,
        });
    }

    if let Some(sm) = project.site_manager_id {
        if let Some((name, email)) = conn
            .query_row(
                "SELECT name, email FROM site_managers WHERE id = ?1",
                [sm],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?
        {
            let user_id = linked_user(&email)?;
            push(TeamMember {
                role: "site_manager",
                name,
                email,
                user_id,
            });
        }
    }

    let mut stmt = conn.prepare(
        "SELECT DISTINCT u.id, COALESCE(u.name, u.email), u.email
         FROM task_assignees a
         JOIN tasks t ON t.id = a.task_id
         JOIN users u ON u.id = a.user_id
         WHERE t.project_id = ?1
         ORDER BY u.id",
    )?;
    let assignees = stmt.query_map([project.id], |row| {
        Ok(TeamMember {
            role: "assignee",
            user_id: Some(row.get(0)?),
            name: row.get(1)?,
            email: row.get(2)?,
        })
    })?;
    for a in assignees {
        push(a?);
    }
    Ok(members)
}

pub fn team_size(conn: &Connection, project: &Project) -> Result<usize> {
    Ok(team(conn, project)?.len())
}

#[derive(Debug, Clone, Serialize)]
pub struct TimelineEntry {
    pub kind: &'static str,
    pub id: i64,
    pub title: String,
    pub date: Option<NaiveDate>,
    pub completed: bool,
}

/// Milestones and events merged by date; undated milestones go last.
pub fn timeline(conn: &Connection, project_id: i64) -> Result<Vec<TimelineEntry>> {
    let mut entries: Vec<TimelineEntry> = crate::milestone::list(conn, project_id)?
        .into_iter()
        .map(|m| TimelineEntry {
            kind: "milestone",
            id: m.id,
            completed: m.actual_date.is_some(),
            date: m.actual_date.or(m.planned_date),
            title: m.name,
        })
        .collect();
    entries.extend(
        crate::event::for_project(conn, project_id)?
            .into_iter()
            .map(|e| TimelineEntry {
                kind: "event",
                id: e.id,
                completed: e.completed_at.is_some(),
                date: Some(e.date),
                title: e.description,
            }),
    );
    entries.sort_by_key(|e| (e.date.is_none(), e.date));
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Store;
    use crate::testutil;
    use crate::types::Role;
    use chrono::Duration;

    fn input(title: &str, sup: i64, finish: NaiveDate) -> ProjectInput {
        ProjectInput {
            title: Some(title.into()),
            supervisor_id: Some(sup),
            finishing_date: Some(finish),
            ..Default::default()
        }
    }

    #[test]
    fn create_applies_defaults() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.conn();
        let now = Utc::now();
        let today = now.date_naive();
        let pm = testutil::user(conn, "pm@site.io", Role::ProjectManager);
        let sup = testutil::supervisor(conn, "sup@site.io");
        let p = create(conn, pm, &input("Harbour Bridge", sup, today + Duration::days(30)), today, now)
            .unwrap();
        assert_eq!(p.status, ProjectStatus::Planning);
        assert_eq!(p.priority, ProjectPriority::Medium);
        assert_eq!(p.progress_percentage, 0.0);
        assert_eq!(p.project_manager_id, pm);
    }

    #[test]
    fn create_validates_title_deadline_and_supervisor() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.conn();
        let now = Utc::now();
        let today = now.date_naive();
        let pm = testutil::user(conn, "pm@site.io", Role::ProjectManager);
        let err = create(conn, pm, &input("ab", 999, today - Duration::days(1)), today, now)
            .unwrap_err();
        match err {
            SiteError::Validation(msgs) => assert_eq!(
                msgs,
                vec![
                    "Title is too short (minimum is 3 characters)",
                    "Finishing date can't be in the past",
                    "Supervisor must exist",
                ]
            ),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn update_keeps_past_deadline_when_unchanged() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.conn();
        let now = Utc::now();
        let today = now.date_naive();
        let pm = testutil::user(conn, "pm@site.io", Role::ProjectManager);
        let sup = testutil::supervisor(conn, "sup@site.io");
        let id = testutil::project(conn, pm, sup, now);

        // a week later the deadline may have passed; editing other fields still works
        let later = today + Duration::days(200);
        let change = update(
            conn,
            id,
            &ProjectInput {
                status: Some(ProjectStatus::InProgress),
                ..Default::default()
            },
            later,
            now,
        )
        .unwrap();
        assert_eq!(
            change.status_changed(),
            Some((ProjectStatus::Planning, ProjectStatus::InProgress))
        );

        let err = update(
            conn,
            id,
            &ProjectInput {
                finishing_date: Some(later - Duration::days(1)),
                ..Default::default()
            },
            later,
            now,
        )
        .unwrap_err();
        assert!(matches!(err, SiteError::Validation(_)));
    }

    #[test]
    fn update_clears_fields_sent_as_null() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.conn();
        let now = Utc::now();
        let today = now.date_naive();
        let pm = testutil::user(conn, "pm@site.io", Role::ProjectManager);
        let sup = testutil::supervisor(conn, "sup@site.io");
        let id = testutil::project(conn, pm, sup, now);
        conn.execute(
            "INSERT INTO site_managers (name, email, created_at, updated_at)
             VALUES ('Mia', 'mia@site.io', ?1, ?1)",
            [now],
        )
        .unwrap();
        let manager = conn.last_insert_rowid();

        let set: ProjectInput = serde_json::from_value(serde_json::json!({
            "description": "North wing",
            "budget": 1200.5,
            "site_manager_id": manager,
        }))
        .unwrap();
        let p = update(conn, id, &set, today, now).unwrap().project;
        assert_eq!(p.description.as_deref(), Some("North wing"));
        assert_eq!(p.site_manager_id, Some(manager));

        let untouched: ProjectInput =
            serde_json::from_value(serde_json::json!({ "title": "Riverside Depot II" })).unwrap();
        let p = update(conn, id, &untouched, today, now).unwrap().project;
        assert_eq!(p.description.as_deref(), Some("North wing"));
        assert_eq!(p.budget, Some(1200.5));

        let clear: ProjectInput = serde_json::from_value(serde_json::json!({
            "description": null,
            "site_manager_id": null,
        }))
        .unwrap();
        let p = update(conn, id, &clear, today, now).unwrap().project;
        assert_eq!(p.description, None);
        assert_eq!(p.site_manager_id, None);
        assert_eq!(p.budget, Some(1200.5));
        assert_eq!(p.title, "Riverside Depot II");
    }

    #[test]
    fn visibility_follows_roles() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.conn();
        let now = Utc::now();
        let pm = testutil::user(conn, "pm@site.io", Role::ProjectManager);
        let sup_user = testutil::user(conn, "sup@site.io", Role::Supervisor);
        let outsider = testutil::user(conn, "out@site.io", Role::ProjectManager);
        let admin = testutil::user(conn, "admin@site.io", Role::Admin);
        let sup = testutil::supervisor(conn, "SUP@site.io");
        let id = testutil::project(conn, pm, sup, now);

        let get_user = |id| crate::user::get(conn, id).unwrap();
        assert_eq!(list_visible(conn, &get_user(pm)).unwrap().len(), 1);
        assert_eq!(list_visible(conn, &get_user(sup_user)).unwrap().len(), 1);
        assert_eq!(list_visible(conn, &get_user(admin)).unwrap().len(), 1);
        assert!(list_visible(conn, &get_user(outsider)).unwrap().is_empty());
        assert!(matches!(
            get_visible(conn, &get_user(outsider), id),
            Err(SiteError::NotFound { .. })
        ));
    }

    #[test]
    fn delete_detaches_tenders_and_drops_events() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.conn();
        let now = Utc::now();
        let pm = testutil::user(conn, "pm@site.io", Role::ProjectManager);
        let sup = testutil::supervisor(conn, "sup@site.io");
        let id = testutil::project(conn, pm, sup, now);
        conn.execute(
            "INSERT INTO events (description, date, responsible, project_id, created_at, updated_at)
             VALUES ('Kickoff meeting', '2030-01-01', 'Ana', ?1, ?2, ?2)",
            params![id, now],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO tenders (title, description, deadline, responsible, project_id,
                                  created_at, updated_at)
             VALUES ('Roof', 'Roof works', '2030-01-01', 'Ana', ?1, ?2, ?2)",
            params![id, now],
        )
        .unwrap();

        delete(conn, id).unwrap();
        let events: i64 = conn.query_row("SELECT COUNT(*) FROM events", [], |r| r.get(0)).unwrap();
        let linked: Option<i64> = conn
            .query_row("SELECT project_id FROM tenders", [], |r| r.get(0))
            .unwrap();
        assert_eq!(events, 0);
        assert_eq!(linked, None);
        assert!(matches!(delete(conn, id), Err(SiteError::NotFound { .. })));
    }

    #[test]
    fn team_dedupes_by_email() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.conn();
        let now = Utc::now();
        let pm = testutil::user(conn, "pm@site.io", Role::ProjectManager);
        // the supervisor record points at the manager's own address
        let sup = testutil::supervisor(conn, "pm@site.io");
        let id = testutil::project(conn, pm, sup, now);
        let p = get(conn, id).unwrap();
        let members = team(conn, &p).unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].role, "project_manager");
    }

    #[test]
    fn chart_data_groups_by_month() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.conn();
        let pm = testutil::user(conn, "pm@site.io", Role::Admin);
        let sup = testutil::supervisor(conn, "sup@site.io");
        let march = "2025-03-04T10:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let april = "2025-04-01T10:00:00Z".parse::<DateTime<Utc>>().unwrap();
        testutil::project(conn, pm, sup, march);
        testutil::project(conn, pm, sup, march);
        testutil::project(conn, pm, sup, april);
        let user = crate::user::get(conn, pm).unwrap();
        assert_eq!(
            chart_data(conn, &user).unwrap(),
            vec![("2025-03".to_string(), 2), ("2025-04".to_string(), 1)]
        );
    }
}
