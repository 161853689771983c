use crate::error::Result;
use crate::user::User;
use chrono::{DateTime, Days, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, ToSql};
use serde::Serialize;
use serde_json::Value;

pub const DEFAULT_LIMIT: usize = 20;
pub const MAX_LIMIT: usize = 100;

#[derive(Debug, Clone, Serialize)]
pub struct ActorRef {
    pub id: i64,
    pub name: Option<String>,
    pub email: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Activity {
    pub id: i64,
    pub actor_id: Option<i64>,
    pub action: String,
    pub target_type: String,
    pub target_id: Option<i64>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub actor: Option<ActorRef>,
    pub target_label: Option<String>,
    pub summary: String,
}

pub fn record(
    conn: &Connection,
    actor_id: Option<i64>,
    action: &str,
    target_type: &str,
    target_id: Option<i64>,
    metadata: Value,
    now: DateTime<Utc>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO activities (actor_id, action, target_type, target_id, metadata, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![actor_id, action, target_type, target_id, metadata, now],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Record `actor` performing `action` on one row, with no extra metadata.
pub fn log(
    conn: &Connection,
    actor: &User,
    action: &str,
    target_type: &str,
    target_id: i64,
    now: DateTime<Utc>,
) -> Result<()> {
    record(
        conn,
        Some(actor.id),
        action,
        target_type,
        Some(target_id),
        Value::Object(Default::default()),
        now,
    )?;
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct ActivityFilter {
    /// Target type; snake_case is accepted (`site_manager` matches `SiteManager`).
    pub target_type: Option<String>,
    pub actor_id: Option<i64>,
    pub start_date: Option<NaiveDate>,
    /// Inclusive: the whole day is matched.
    pub end_date: Option<NaiveDate>,
    pub ascending: bool,
    pub limit: Option<usize>,
}

impl ActivityFilter {
    pub fn effective_limit(&self) -> usize {
        match self.limit {
            Some(n) if n > 0 => n.min(MAX_LIMIT),
            _ => DEFAULT_LIMIT,
        }
    }
}

/// `site_manager` and `project` name the stored `SiteManager` and `Project`.
fn camelize(s: &str) -> String {
    s.split('_')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(c) => c.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

fn target_label(conn: &Connection, target_type: &str, target_id: Option<i64>) -> Result<Option<String>> {
    let Some(id) = target_id else {
        return Ok(None);
    };
    let sql = match target_type {
        "Project" => "SELECT title FROM projects WHERE id = ?1",
        "Tender" => "SELECT title FROM tenders WHERE id = ?1",
        "Task" => "SELECT title FROM tasks WHERE id = ?1",
        "Event" => "SELECT description FROM events WHERE id = ?1",
        "User" => "SELECT COALESCE(name, email) FROM users WHERE id = ?1",
        "Supervisor" => "SELECT name FROM supervisors WHERE id = ?1",
        "SiteManager" => "SELECT name FROM site_managers WHERE id = ?1",
        _ => return Ok(None),
    };
    Ok(conn.query_row(sql, [id], |row| row.get(0)).optional()?)
}

pub fn list(conn: &Connection, filter: &ActivityFilter) -> Result<Vec<Activity>> {
    let mut sql = String::from(
        "SELECT a.id, a.actor_id, a.action, a.target_type, a.target_id, a.metadata, a.created_at,
                u.name, u.email
         FROM activities a LEFT JOIN users u ON u.id = a.actor_id WHERE 1=1",
    );
    let mut args: Vec<Box<dyn ToSql>> = Vec::new();
    if let Some(t) = filter.target_type.as_deref().filter(|t| !t.is_empty()) {
        args.push(Box::new(camelize(t)));
        sql.push_str(&format!(" AND a.target_type = ?{}", args.len()));
    }
    if let Some(actor) = filter.actor_id {
        args.push(Box::new(actor));
        sql.push_str(&format!(" AND a.actor_id = ?{}", args.len()));
    }
    if let Some(start) = filter.start_date {
        args.push(Box::new(start));
        sql.push_str(&format!(" AND a.created_at >= ?{}", args.len()));
    }
    if let Some(end) = filter.end_date.and_then(|d| d.checked_add_days(Days::new(1))) {
        args.push(Box::new(end));
        sql.push_str(&format!(" AND a.created_at < ?{}", args.len()));
    }
    let dir = if filter.ascending { "ASC" } else { "DESC" };
    sql.push_str(&format!(
        " ORDER BY a.created_at {dir}, a.id {dir} LIMIT {}",
        filter.effective_limit()
    ));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(args.iter()), |row| {
        let actor_id: Option<i64> = row.get(1)?;
        let email: Option<String> = row.get(8)?;
        let actor = match (actor_id, email) {
            (Some(id), Some(email)) => Some(ActorRef {
                id,
                name: row.get(7)?,
                email,
            }),
            _ => None,
        };
        Ok(Activity {
            id: row.get(0)?,
            actor_id,
            action: row.get(2)?,
            target_type: row.get(3)?,
            target_id: row.get(4)?,
            metadata: row.get(5)?,
            created_at: row.get(6)?,
            actor,
            target_label: None,
            summary: String::new(),
        })
    })?;

    let mut out = Vec::new();
    for row in rows {
        let mut activity = row?;
        activity.target_label = target_label(conn, &activity.target_type, activity.target_id)?;
        let actor_display = activity
            .actor
            .as_ref()
            .map(|a| a.email.clone())
            .unwrap_or_else(|| "System".to_string());
        let target_display = activity
            .target_label
            .clone()
            .unwrap_or_else(|| activity.target_type.clone());
        activity.summary = format!("{actor_display} {} {target_display}", activity.action);
        out.push(activity);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Store;
    use crate::testutil;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn lists_newest_first_with_summary() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.conn();
        let user = testutil::user(conn, "pm@example.com", crate::types::Role::ProjectManager);
        let t1 = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2025, 3, 2, 9, 0, 0).unwrap();
        record(conn, Some(user), "login", "User", Some(user), json!({"method": "password"}), t1).unwrap();
        record(conn, Some(user), "logout", "User", Some(user), json!({}), t2).unwrap();

        let all = list(conn, &ActivityFilter::default()).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].action, "logout");
        assert_eq!(all[1].summary, "pm@example.com login Test User");
    }

    #[test]
    fn filters_by_type_and_inclusive_end_date() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.conn();
        let t = |d| Utc.with_ymd_and_hms(2025, 3, d, 23, 30, 0).unwrap();
        record(conn, None, "created", "Project", None, json!({}), t(1)).unwrap();
        record(conn, None, "created", "Tender", None, json!({}), t(2)).unwrap();
        record(conn, None, "updated", "Project", None, json!({}), t(3)).unwrap();

        let filter = ActivityFilter {
            target_type: Some("project".into()),
            end_date: NaiveDate::from_ymd_opt(2025, 3, 1),
            ..Default::default()
        };
        let found = list(conn, &filter).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].action, "created");
        assert_eq!(found[0].summary, "System created Project");
    }

    #[test]
    fn snake_case_type_names_match() {
        assert_eq!(camelize("site_manager"), "SiteManager");
        assert_eq!(camelize("project"), "Project");
        assert_eq!(camelize("SiteManager"), "SiteManager");
    }

    #[test]
    fn limit_is_capped() {
        let f = ActivityFilter {
            limit: Some(1000),
            ..Default::default()
        };
        assert_eq!(f.effective_limit(), MAX_LIMIT);
        assert_eq!(ActivityFilter::default().effective_limit(), DEFAULT_LIMIT);
    }
}
