use crate::db::found;
use crate::error::{Result, SiteError, Violations};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct Milestone {
    pub id: i64,
    pub project_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub planned_date: Option<NaiveDate>,
    pub actual_date: Option<NaiveDate>,
    pub progress_percentage_target: f64,
    pub order_position: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Milestone {
    pub fn reached(&self) -> bool {
        self.actual_date.is_some()
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            project_id: row.get("project_id")?,
            name: row.get("name")?,
            description: row.get("description")?,
            planned_date: row.get("planned_date")?,
            actual_date: row.get("actual_date")?,
            progress_percentage_target: row.get("progress_percentage_target")?,
            order_position: row.get("order_position")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

pub fn get(conn: &Connection, id: i64) -> Result<Milestone> {
    found(
        conn.query_row(
            "SELECT * FROM project_milestones WHERE id = ?1",
            [id],
            Milestone::from_row,
        ),
        "milestone",
        id,
    )
}

pub fn list(conn: &Connection, project_id: i64) -> Result<Vec<Milestone>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM project_milestones WHERE project_id = ?1
         ORDER BY order_position, planned_date, id",
    )?;
    let rows = stmt.query_map([project_id], Milestone::from_row)?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MilestoneInput {
    pub name: String,
    pub description: Option<String>,
    pub planned_date: Option<NaiveDate>,
    #[serde(default)]
    pub progress_percentage_target: f64,
    pub order_position: Option<i64>,
}

pub fn create(
    conn: &Connection,
    project_id: i64,
    input: &MilestoneInput,
    now: DateTime<Utc>,
) -> Result<Milestone> {
    crate::project::get(conn, project_id)?;
    let mut v = Violations::new();
    v.present("Name", Some(&input.name));
    v.check(
        (0.0..=100.0).contains(&input.progress_percentage_target),
        "Progress percentage target must be between 0 and 100",
    );
    v.into_result()?;

    let position = match input.order_position {
        Some(p) => p,
        None => conn.query_row(
            "SELECT COALESCE(MAX(order_position), -1) + 1 FROM project_milestones
             WHERE project_id = ?1",
            [project_id],
            |row| row.get(0),
        )?,
    };
    conn.execute(
        "INSERT INTO project_milestones
           (project_id, name, description, planned_date, progress_percentage_target,
            order_position, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
        params![
            project_id,
            input.name.trim(),
            input.description,
            input.planned_date,
            input.progress_percentage_target,
            position,
            now
        ],
    )?;
    get(conn, conn.last_insert_rowid())
}

/// Stamp the milestone as reached on `today`. Reaching twice is a conflict.
pub fn reach(conn: &Connection, id: i64, today: NaiveDate, now: DateTime<Utc>) -> Result<Milestone> {
    let m = get(conn, id)?;
    if m.reached() {
        return Err(SiteError::Conflict(format!(
            "milestone '{}' was already reached",
            m.name
        )));
    }
    conn.execute(
        "UPDATE project_milestones SET actual_date = ?1, updated_at = ?2 WHERE id = ?3",
        params![today, now, id],
    )?;
    get(conn, id)
}
