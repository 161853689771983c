//! Per-user notification inbox.
//!
//! Rows are written by [`crate::fanout`]; this module owns reading them,
//! read-state bookkeeping and the per-user delivery settings blob.

use crate::db::json_column;
use crate::error::{Result, SiteError};
use crate::types::{NotificationType, Priority};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, Row, ToSql};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 100;

/// An inbox entry, serialized in the shape the frontend consumes.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub id: i64,
    #[serde(skip)]
    pub user_id: i64,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub category: String,
    pub title: String,
    pub message: String,
    pub project: Option<String>,
    pub project_id: Option<i64>,
    pub tender: Option<String>,
    pub tender_id: Option<i64>,
    pub task: Option<String>,
    pub task_id: Option<i64>,
    pub sender: Option<String>,
    #[serde(skip)]
    pub sender_id: Option<i64>,
    #[serde(rename = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "isRead")]
    pub is_read: bool,
    #[serde(skip)]
    pub read_at: Option<DateTime<Utc>>,
    pub priority: Priority,
    #[serde(rename = "actionRequired")]
    pub action_required: bool,
    pub tags: Vec<String>,
    pub metadata: Map<String, Value>,
}

const SELECT: &str = "SELECT n.*, p.title AS project_title, t.title AS tender_title,
       k.title AS task_title, COALESCE(s.name, n.sender_name) AS sender
  FROM notifications n
  LEFT JOIN projects p ON p.id = n.project_id
  LEFT JOIN tenders t ON t.id = n.tender_id
  LEFT JOIN tasks k ON k.id = n.task_id
  LEFT JOIN users s ON s.id = n.sender_id";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Notification> {
    let metadata: Value = row.get("metadata")?;
    Ok(Notification {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        notification_type: row.get("notification_type")?,
        category: row.get("category")?,
        title: row.get("title")?,
        message: row.get("message")?,
        project: row.get("project_title")?,
        project_id: row.get("project_id")?,
        tender: row.get("tender_title")?,
        tender_id: row.get("tender_id")?,
        task: row.get("task_title")?,
        task_id: row.get("task_id")?,
        sender: row.get("sender")?,
        sender_id: row.get("sender_id")?,
        created_at: row.get("created_at")?,
        is_read: row.get("is_read")?,
        read_at: row.get("read_at")?,
        priority: row.get("priority")?,
        action_required: row.get("action_required")?,
        tags: json_column(row, "tags")?,
        metadata: match metadata {
            Value::Object(map) => map,
            _ => Map::new(),
        },
    })
}

/// A notification about to be delivered to one or more users.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub title: String,
    pub message: String,
    pub notification_type: NotificationType,
    pub category: String,
    pub priority: Priority,
    pub action_required: bool,
    pub sender_id: Option<i64>,
    pub sender_name: Option<String>,
    pub project_id: Option<i64>,
    pub tender_id: Option<i64>,
    pub task_id: Option<i64>,
    pub metadata: Value,
    pub tags: Vec<String>,
}

impl NewNotification {
    /// An informational, medium-priority system notification.
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            notification_type: NotificationType::Info,
            category: "system".into(),
            priority: Priority::Medium,
            action_required: false,
            sender_id: None,
            sender_name: None,
            project_id: None,
            tender_id: None,
            task_id: None,
            metadata: json!({}),
            tags: Vec::new(),
        }
    }
}

pub fn create(conn: &Connection, user_id: i64, n: &NewNotification, now: DateTime<Utc>) -> Result<i64> {
    conn.execute(
        "INSERT INTO notifications
           (user_id, title, message, notification_type, category, priority, action_required,
            sender_id, sender_name, project_id, tender_id, task_id, metadata, tags, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        params![
            user_id,
            n.title,
            n.message,
            n.notification_type,
            n.category,
            n.priority,
            n.action_required,
            n.sender_id,
            n.sender_name,
            n.project_id,
            n.tender_id,
            n.task_id,
            n.metadata,
            serde_json::to_value(&n.tags)?,
            now,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Fetch one of `user_id`'s notifications. Other users' rows are not found.
pub fn get(conn: &Connection, user_id: i64, id: i64) -> Result<Notification> {
    crate::db::found(
        conn.query_row(
            &format!("{SELECT} WHERE n.id = ?1 AND n.user_id = ?2"),
            params![id, user_id],
            from_row,
        ),
        "notification",
        id,
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadStatus {
    Read,
    Unread,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    CreatedAt,
    Priority,
    Title,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InboxFilter {
    /// Substring match on title or message.
    pub search: Option<String>,
    #[serde(rename = "type")]
    pub notification_type: Option<NotificationType>,
    pub status: Option<ReadStatus>,
    pub sort_by: Option<SortKey>,
    /// `asc` or `desc` (default).
    pub sort_direction: Option<String>,
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

impl InboxFilter {
    fn per_page(&self) -> usize {
        match self.limit {
            Some(n) if n > 0 => n.min(MAX_PAGE_SIZE),
            _ => DEFAULT_PAGE_SIZE,
        }
    }

    fn page(&self) -> usize {
        self.page.filter(|p| *p > 0).unwrap_or(1)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Pagination {
    pub current_page: usize,
    pub total_pages: usize,
    pub total_count: usize,
    pub per_page: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Page {
    pub notifications: Vec<Notification>,
    pub pagination: Pagination,
}

pub fn list(conn: &Connection, user_id: i64, filter: &InboxFilter) -> Result<Page> {
    let mut clause = String::from(" WHERE n.user_id = ?1");
    let mut args: Vec<Box<dyn ToSql>> = vec![Box::new(user_id)];
    if let Some(q) = filter.search.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        args.push(Box::new(format!("%{}%", crate::tender::escape_like(q))));
        let n = args.len();
        clause.push_str(&format!(
            " AND (n.title LIKE ?{n} ESCAPE '\\' OR n.message LIKE ?{n} ESCAPE '\\')"
        ));
    }
    if let Some(ty) = filter.notification_type {
        args.push(Box::new(ty));
        clause.push_str(&format!(" AND n.notification_type = ?{}", args.len()));
    }
    match filter.status {
        Some(ReadStatus::Read) => clause.push_str(" AND n.is_read = 1"),
        Some(ReadStatus::Unread) => clause.push_str(" AND n.is_read = 0"),
        None => {}
    }

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM notifications n{clause}"),
        rusqlite::params_from_iter(args.iter()),
        |row| row.get(0),
    )?;
    let total = total as usize;

    let dir = match filter.sort_direction.as_deref() {
        Some(d) if d.eq_ignore_ascii_case("asc") => "ASC",
        _ => "DESC",
    };
    let order = match filter.sort_by.unwrap_or_default() {
        SortKey::CreatedAt => format!("n.created_at {dir}"),
        SortKey::Priority => format!(
            "CASE n.priority WHEN 'high' THEN 3 WHEN 'medium' THEN 2 ELSE 1 END {dir}, n.created_at DESC"
        ),
        SortKey::Title => format!("n.title {dir}"),
    };
    let per_page = filter.per_page();
    let page = filter.page();
    let sql = format!(
        "{SELECT}{clause} ORDER BY {order}, n.id {dir} LIMIT {per_page} OFFSET {}",
        (page - 1).saturating_mul(per_page).min(i64::MAX as usize)
    );
    let mut stmt = conn.prepare(&sql)?;
    let notifications = stmt
        .query_map(rusqlite::params_from_iter(args.iter()), from_row)?
        .collect::<rusqlite::Result<_>>()?;

    Ok(Page {
        notifications,
        pagination: Pagination {
            current_page: page,
            total_pages: total.div_ceil(per_page),
            total_count: total,
            per_page,
        },
    })
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Stats {
    pub total: i64,
    pub unread: i64,
    /// Unread urgent notifications.
    pub urgent: i64,
    /// Unread notifications that need action.
    pub action_required: i64,
    pub by_category: BTreeMap<String, i64>,
    pub by_type: BTreeMap<String, i64>,
    pub today: i64,
    pub this_week: i64,
}

fn grouped(conn: &Connection, column: &str, user_id: i64) -> Result<BTreeMap<String, i64>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {column}, COUNT(*) FROM notifications WHERE user_id = ?1 GROUP BY {column}"
    ))?;
    let rows = stmt.query_map([user_id], |row| Ok((row.get(0)?, row.get(1)?)))?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

pub fn stats(conn: &Connection, user_id: i64, now: DateTime<Utc>) -> Result<Stats> {
    let (total, unread, urgent, action_required, today, this_week) = conn.query_row(
        "SELECT COUNT(*),
                COALESCE(SUM(is_read = 0), 0),
                COALESCE(SUM(is_read = 0 AND notification_type = 'urgent'), 0),
                COALESCE(SUM(is_read = 0 AND action_required = 1), 0),
                COALESCE(SUM(created_at >= ?2), 0),
                COALESCE(SUM(created_at >= ?3), 0)
         FROM notifications WHERE user_id = ?1",
        params![user_id, now.date_naive(), now - Duration::days(7)],
        |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
            ))
        },
    )?;
    Ok(Stats {
        total,
        unread,
        urgent,
        action_required,
        by_category: grouped(conn, "category", user_id)?,
        by_type: grouped(conn, "notification_type", user_id)?,
        today,
        this_week,
    })
}

pub fn mark_read(conn: &Connection, user_id: i64, id: i64, now: DateTime<Utc>) -> Result<Notification> {
    get(conn, user_id, id)?;
    conn.execute(
        "UPDATE notifications SET is_read = 1, read_at = COALESCE(read_at, ?1) WHERE id = ?2",
        params![now, id],
    )?;
    get(conn, user_id, id)
}

pub fn mark_unread(conn: &Connection, user_id: i64, id: i64) -> Result<Notification> {
    get(conn, user_id, id)?;
    conn.execute(
        "UPDATE notifications SET is_read = 0, read_at = NULL WHERE id = ?1",
        [id],
    )?;
    get(conn, user_id, id)
}

/// Returns how many notifications changed state.
pub fn mark_all_read(conn: &Connection, user_id: i64, now: DateTime<Utc>) -> Result<usize> {
    Ok(conn.execute(
        "UPDATE notifications SET is_read = 1, read_at = ?1 WHERE user_id = ?2 AND is_read = 0",
        params![now, user_id],
    )?)
}

fn id_list(ids: &[i64]) -> String {
    ids.iter().map(i64::to_string).collect::<Vec<_>>().join(",")
}

/// Ids that do not belong to `user_id` are ignored.
pub fn bulk_mark_read(conn: &Connection, user_id: i64, ids: &[i64], now: DateTime<Utc>) -> Result<usize> {
    if ids.is_empty() {
        return Ok(0);
    }
    Ok(conn.execute(
        &format!(
            "UPDATE notifications SET is_read = 1, read_at = COALESCE(read_at, ?1)
             WHERE user_id = ?2 AND id IN ({})",
            id_list(ids)
        ),
        params![now, user_id],
    )?)
}

pub fn bulk_delete(conn: &Connection, user_id: i64, ids: &[i64]) -> Result<usize> {
    if ids.is_empty() {
        return Ok(0);
    }
    Ok(conn.execute(
        &format!(
            "DELETE FROM notifications WHERE user_id = ?1 AND id IN ({})",
            id_list(ids)
        ),
        [user_id],
    )?)
}

pub fn delete(conn: &Connection, user_id: i64, id: i64) -> Result<()> {
    if conn.execute(
        "DELETE FROM notifications WHERE id = ?1 AND user_id = ?2",
        params![id, user_id],
    )? == 0
    {
        return Err(SiteError::not_found("notification", id));
    }
    Ok(())
}

const CATEGORIES: &[&str] = &[
    "safety", "project", "budget", "delivery", "meeting", "deadline", "equipment", "approval",
    "training", "weather", "tender", "task", "system",
];

pub fn default_settings() -> Value {
    let categories: Map<String, Value> = CATEGORIES
        .iter()
        .map(|c| (c.to_string(), Value::Bool(true)))
        .collect();
    json!({
        "email_notifications": true,
        "push_notifications": true,
        "urgent_only": false,
        "categories": categories,
    })
}

/// Stored settings, or the defaults when the user never saved any.
pub fn settings(conn: &Connection, user_id: i64) -> Result<Value> {
    let stored: Option<Value> = crate::db::found(
        conn.query_row(
            "SELECT notification_settings FROM users WHERE id = ?1",
            [user_id],
            |row| row.get(0),
        ),
        "user",
        user_id,
    )?;
    Ok(match stored {
        Some(v @ Value::Object(_)) => v,
        _ => default_settings(),
    })
}

pub fn update_settings(conn: &Connection, user_id: i64, settings: Value, now: DateTime<Utc>) -> Result<Value> {
    if !settings.is_object() {
        return Err(SiteError::invalid("Settings must be an object"));
    }
    if conn.execute(
        "UPDATE users SET notification_settings = ?1, updated_at = ?2 WHERE id = ?3",
        params![settings, now, user_id],
    )? == 0
    {
        return Err(SiteError::not_found("user", user_id));
    }
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Store;
    use crate::testutil;
    use crate::types::Role;

    fn seed(conn: &Connection, user: i64, title: &str, ty: NotificationType, priority: Priority) -> i64 {
        let mut n = NewNotification::new(title, format!("{title} body"));
        n.notification_type = ty;
        n.priority = priority;
        create(conn, user, &n, Utc::now()).unwrap()
    }

    #[test]
    fn list_filters_sorts_and_paginates() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.conn();
        let me = testutil::user(conn, "me@site.io", Role::ProjectManager);
        let other = testutil::user(conn, "other@site.io", Role::ProjectManager);
        seed(conn, me, "Alpha crane", NotificationType::Info, Priority::Low);
        seed(conn, me, "Bravo concrete", NotificationType::Urgent, Priority::High);
        seed(conn, me, "Charlie crane", NotificationType::Warning, Priority::Medium);
        seed(conn, other, "Hidden crane", NotificationType::Info, Priority::High);

        let search = InboxFilter {
            search: Some("crane".into()),
            ..Default::default()
        };
        assert_eq!(list(conn, me, &search).unwrap().pagination.total_count, 2);

        let by_priority = InboxFilter {
            sort_by: Some(SortKey::Priority),
            ..Default::default()
        };
        let page = list(conn, me, &by_priority).unwrap();
        assert_eq!(page.notifications[0].title, "Bravo concrete");

        let paged = InboxFilter {
            sort_by: Some(SortKey::Title),
            sort_direction: Some("asc".into()),
            limit: Some(2),
            page: Some(2),
            ..Default::default()
        };
        let page = list(conn, me, &paged).unwrap();
        assert_eq!(page.pagination.total_pages, 2);
        assert_eq!(page.notifications.len(), 1);
        assert_eq!(page.notifications[0].title, "Charlie crane");
    }

    #[test]
    fn far_page_is_empty_not_overflowing() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.conn();
        let me = testutil::user(conn, "me@site.io", Role::ProjectManager);
        seed(conn, me, "Alpha crane", NotificationType::Info, Priority::Low);

        let far = InboxFilter {
            limit: Some(50),
            page: Some(usize::MAX),
            ..Default::default()
        };
        let page = list(conn, me, &far).unwrap();
        assert!(page.notifications.is_empty());
        assert_eq!(page.pagination.total_count, 1);
    }

    #[test]
    fn malformed_tags_surface_as_an_error() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.conn();
        let me = testutil::user(conn, "me@site.io", Role::ProjectManager);
        let id = seed(conn, me, "Alpha crane", NotificationType::Info, Priority::Low);
        conn.execute("UPDATE notifications SET tags = '{\"a\": 1}' WHERE id = ?1", [id])
            .unwrap();

        let err = get(conn, me, id).unwrap_err();
        assert!(matches!(
            err,
            SiteError::Sqlite(rusqlite::Error::FromSqlConversionFailure(..))
        ));
    }

    #[test]
    fn read_state_and_stats() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.conn();
        let now = Utc::now();
        let me = testutil::user(conn, "me@site.io", Role::ProjectManager);
        let other = testutil::user(conn, "other@site.io", Role::ProjectManager);
        let a = seed(conn, me, "A", NotificationType::Urgent, Priority::High);
        let b = seed(conn, me, "B", NotificationType::Info, Priority::Medium);
        let foreign = seed(conn, other, "C", NotificationType::Info, Priority::Medium);

        let stats_before = stats(conn, me, now).unwrap();
        assert_eq!(stats_before.total, 2);
        assert_eq!(stats_before.unread, 2);
        assert_eq!(stats_before.urgent, 1);
        assert_eq!(stats_before.by_category.get("system"), Some(&2));
        assert_eq!(stats_before.this_week, 2);

        assert!(mark_read(conn, me, a, now).unwrap().is_read);
        assert!(!mark_unread(conn, me, a).unwrap().is_read);
        assert!(matches!(mark_read(conn, me, foreign, now), Err(SiteError::NotFound { .. })));

        assert_eq!(bulk_mark_read(conn, me, &[a, foreign], now).unwrap(), 1);
        assert_eq!(mark_all_read(conn, me, now).unwrap(), 1);
        assert_eq!(stats(conn, me, now).unwrap().unread, 0);

        assert_eq!(bulk_delete(conn, me, &[b, foreign]).unwrap(), 1);
        delete(conn, me, a).unwrap();
        assert_eq!(stats(conn, me, now).unwrap().total, 0);
        assert_eq!(stats(conn, other, now).unwrap().total, 1);
    }

    #[test]
    fn settings_default_until_saved() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.conn();
        let me = testutil::user(conn, "me@site.io", Role::Supervisor);
        let defaults = settings(conn, me).unwrap();
        assert_eq!(defaults["urgent_only"], json!(false));
        assert_eq!(defaults["categories"]["tender"], json!(true));

        let saved = json!({"urgent_only": true});
        update_settings(conn, me, saved.clone(), Utc::now()).unwrap();
        assert_eq!(settings(conn, me).unwrap(), saved);
        assert!(update_settings(conn, me, json!([1, 2]), Utc::now()).is_err());
    }
}
