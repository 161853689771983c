use crate::db::{found, is_unique_violation};
use crate::error::{Result, SiteError, Violations};
use crate::progress::round2;
use crate::types::ProjectStatus;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct Supervisor {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Supervisor {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            email: row.get("email")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// A supervisor with the projects they oversee.
#[derive(Debug, Clone, Serialize)]
pub struct SupervisorSummary {
    #[serde(flatten)]
    pub supervisor: Supervisor,
    pub role: &'static str,
    pub projects_count: usize,
    pub current_projects: Vec<String>,
}

pub fn get(conn: &Connection, id: i64) -> Result<Supervisor> {
    found(
        conn.query_row("SELECT * FROM supervisors WHERE id = ?1", [id], Supervisor::from_row),
        "supervisor",
        id,
    )
}

pub fn list(conn: &Connection) -> Result<Vec<Supervisor>> {
    let mut stmt = conn.prepare("SELECT * FROM supervisors ORDER BY name, id")?;
    let rows = stmt.query_map([], Supervisor::from_row)?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

pub fn summarize(conn: &Connection, supervisor: Supervisor) -> Result<SupervisorSummary> {
    let mut stmt = conn.prepare("SELECT title FROM projects WHERE supervisor_id = ?1 ORDER BY id")?;
    let titles: Vec<String> = stmt
        .query_map([supervisor.id], |row| row.get(0))?
        .collect::<rusqlite::Result<_>>()?;
    Ok(SupervisorSummary {
        supervisor,
        role: "supervisor",
        projects_count: titles.len(),
        current_projects: titles,
    })
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SupervisorInput {
    pub name: Option<String>,
    pub email: Option<String>,
}

fn validate(name: &str, email: &str) -> Result<()> {
    let mut v = Violations::new();
    v.present("Name", Some(name));
    if email.trim().is_empty() {
        v.add("Email can't be blank");
    } else {
        v.check(crate::user::is_valid_email(email.trim()), "Email is invalid");
    }
    v.into_result()
}

fn taken(e: rusqlite::Error) -> SiteError {
    if is_unique_violation(&e) {
        SiteError::Validation(vec!["Email has already been taken".into()])
    } else {
        e.into()
    }
}

pub fn create(conn: &Connection, input: &SupervisorInput, now: DateTime<Utc>) -> Result<Supervisor> {
    let name = input.name.clone().unwrap_or_default();
    let email = input.email.clone().unwrap_or_default();
    validate(&name, &email)?;
    conn.execute(
        "INSERT INTO supervisors (name, email, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
        params![name.trim(), email.trim().to_lowercase(), now],
    )
    .map_err(taken)?;
    get(conn, conn.last_insert_rowid())
}

pub fn update(conn: &Connection, id: i64, input: &SupervisorInput, now: DateTime<Utc>) -> Result<Supervisor> {
    let old = get(conn, id)?;
    let name = input.name.clone().unwrap_or(old.name);
    let email = input.email.clone().unwrap_or(old.email);
    validate(&name, &email)?;
    conn.execute(
        "UPDATE supervisors SET name = ?1, email = ?2, updated_at = ?3 WHERE id = ?4",
        params![name.trim(), email.trim().to_lowercase(), now, id],
    )
    .map_err(taken)?;
    get(conn, id)
}

/// Refused while projects still reference the supervisor.
pub fn delete(conn: &Connection, id: i64) -> Result<()> {
    get(conn, id)?;
    let in_use: i64 = conn.query_row(
        "SELECT COUNT(*) FROM projects WHERE supervisor_id = ?1",
        [id],
        |row| row.get(0),
    )?;
    if in_use > 0 {
        return Err(SiteError::Conflict(format!(
            "supervisor {id} still oversees {in_use} project(s)"
        )));
    }
    conn.execute("DELETE FROM supervisors WHERE id = ?1", [id])?;
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct Workload {
    pub supervisor_id: i64,
    pub supervisor_name: String,
    pub project_count: i64,
}

pub fn workload(conn: &Connection) -> Result<Vec<Workload>> {
    let mut stmt = conn.prepare(
        "SELECT s.id, s.name, COUNT(p.id) FROM supervisors s
         LEFT JOIN projects p ON p.supervisor_id = s.id
         GROUP BY s.id ORDER BY s.name, s.id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(Workload {
            supervisor_id: row.get(0)?,
            supervisor_name: row.get(1)?,
            project_count: row.get(2)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Performance {
    pub total_projects: usize,
    pub active_projects: usize,
    pub completed_projects: usize,
    pub overdue_projects: usize,
    pub completion_rate: f64,
    pub average_progress: f64,
}

pub fn performance(conn: &Connection, id: i64, today: NaiveDate) -> Result<Performance> {
    get(conn, id)?;
    let projects = crate::project::for_supervisor(conn, id)?;
    if projects.is_empty() {
        return Ok(Performance::default());
    }
    let total = projects.len();
    let completed = projects
        .iter()
        .filter(|p| p.status == ProjectStatus::Completed)
        .count();
    let active = projects.iter().filter(|p| !p.status.is_closed()).count();
    let overdue = projects.iter().filter(|p| p.is_overdue(today)).count();
    let progress: f64 = projects.iter().map(|p| p.progress_percentage).sum();
    Ok(Performance {
        total_projects: total,
        active_projects: active,
        completed_projects: completed,
        overdue_projects: overdue,
        completion_rate: (completed as f64 / total as f64 * 1000.0).round() / 10.0,
        average_progress: round2(progress / total as f64),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Store;
    use crate::testutil;
    use crate::types::Role;

    fn input(name: &str, email: &str) -> SupervisorInput {
        SupervisorInput {
            name: Some(name.into()),
            email: Some(email.into()),
        }
    }

    #[test]
    fn email_is_unique_and_required() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.conn();
        let now = Utc::now();
        create(conn, &input("Rui", "rui@site.io"), now).unwrap();
        let err = create(conn, &input("Rui 2", "RUI@site.io"), now).unwrap_err();
        match err {
            SiteError::Validation(msgs) => assert_eq!(msgs, vec!["Email has already been taken"]),
            other => panic!("unexpected {other:?}"),
        }
        assert!(create(conn, &input("Nobody", ""), now).is_err());
    }

    #[test]
    fn workload_and_performance() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.conn();
        let now = Utc::now();
        let pm = testutil::user(conn, "pm@site.io", Role::ProjectManager);
        let sup = testutil::supervisor(conn, "sup@site.io");
        let idle = create(conn, &input("Idle", "idle@site.io"), now).unwrap();
        let a = testutil::project(conn, pm, sup, now);
        testutil::project(conn, pm, sup, now);
        conn.execute(
            "UPDATE projects SET status = 'completed', progress_percentage = 100 WHERE id = ?1",
            [a],
        )
        .unwrap();

        let load = workload(conn).unwrap();
        let by_id = |id| load.iter().find(|w| w.supervisor_id == id).unwrap().project_count;
        assert_eq!(by_id(sup), 2);
        assert_eq!(by_id(idle.id), 0);

        let perf = performance(conn, sup, now.date_naive()).unwrap();
        assert_eq!(perf.total_projects, 2);
        assert_eq!(perf.completed_projects, 1);
        assert_eq!(perf.active_projects, 1);
        assert_eq!(perf.completion_rate, 50.0);
        assert_eq!(perf.average_progress, 50.0);

        let summary = summarize(conn, get(conn, sup).unwrap()).unwrap();
        assert_eq!(summary.projects_count, 2);
        assert!(matches!(delete(conn, sup), Err(SiteError::Conflict(_))));
        delete(conn, idle.id).unwrap();
    }
}
