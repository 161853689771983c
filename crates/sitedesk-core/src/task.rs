use crate::db::{found, json_column};
use crate::error::{Result, SiteError, Violations};
use crate::types::{TaskPriority, TaskStatus};
use crate::user::User;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub estimated_hours: Option<f64>,
    pub project_id: Option<i64>,
    pub custom_fields: Map<String, Value>,
    pub tags: Vec<String>,
    pub is_starred: bool,
    pub is_archived: bool,
    pub user_id: Option<i64>,
    pub project_manager_id: i64,
    pub assignee_ids: Vec<i64>,
    pub watcher_ids: Vec<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.due_date.is_some_and(|d| d < today) && !self.status.is_closed()
    }

    pub fn completion_percentage(&self) -> u8 {
        match self.status {
            TaskStatus::Completed => 100,
            TaskStatus::InReview => 75,
            TaskStatus::InProgress => 50,
            _ => 0,
        }
    }

    pub fn view(&self, today: NaiveDate) -> TaskView {
        TaskView {
            task: self.clone(),
            overdue: self.is_overdue(today),
            completion_percentage: self.completion_percentage(),
        }
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let custom: Value = row.get("custom_fields")?;
        Ok(Self {
            id: row.get("id")?,
            title: row.get("title")?,
            description: row.get("description")?,
            start_date: row.get("start_date")?,
            due_date: row.get("due_date")?,
            status: row.get("status")?,
            priority: row.get("priority")?,
            estimated_hours: row.get("estimated_hours")?,
            project_id: row.get("project_id")?,
            custom_fields: match custom {
                Value::Object(map) => map,
                _ => Map::new(),
            },
            tags: json_column(row, "tags")?,
            is_starred: row.get("is_starred")?,
            is_archived: row.get("is_archived")?,
            user_id: row.get("user_id")?,
            project_manager_id: row.get("project_manager_id")?,
            assignee_ids: Vec::new(),
            watcher_ids: Vec::new(),
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskView {
    #[serde(flatten)]
    pub task: Task,
    pub overdue: bool,
    pub completion_percentage: u8,
}

fn member_ids(conn: &Connection, table: &str, task_id: i64) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT user_id FROM {table} WHERE task_id = ?1 ORDER BY user_id"
    ))?;
    let rows = stmt.query_map([task_id], |row| row.get(0))?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

fn set_members(conn: &Connection, table: &str, task_id: i64, ids: &[i64]) -> Result<()> {
    conn.execute(&format!("DELETE FROM {table} WHERE task_id = ?1"), [task_id])?;
    for id in ids {
        conn.execute(
            &format!("INSERT OR IGNORE INTO {table} (task_id, user_id) VALUES (?1, ?2)"),
            params![task_id, id],
        )?;
    }
    Ok(())
}

fn load(conn: &Connection, sql: &str, args: impl rusqlite::Params) -> Result<Vec<Task>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(args, Task::from_row)?;
    let mut tasks = Vec::new();
    for row in rows {
        let mut task = row?;
        task.assignee_ids = member_ids(conn, "task_assignees", task.id)?;
        task.watcher_ids = member_ids(conn, "task_watchers", task.id)?;
        tasks.push(task);
    }
    Ok(tasks)
}

pub fn get(conn: &Connection, id: i64) -> Result<Task> {
    load(conn, "SELECT * FROM tasks WHERE id = ?1", [id])?
        .pop()
        .ok_or_else(|| SiteError::not_found("task", id))
}

/// Tasks the user manages, owns or is assigned to. Admins see all.
pub fn list_for(conn: &Connection, user: &User) -> Result<Vec<Task>> {
    if user.is_admin() {
        return load(conn, "SELECT * FROM tasks ORDER BY id", []);
    }
    load(
        conn,
        "SELECT * FROM tasks t
         WHERE t.project_manager_id = ?1 OR t.user_id = ?1
            OR EXISTS (SELECT 1 FROM task_assignees a WHERE a.task_id = t.id AND a.user_id = ?1)
         ORDER BY t.id",
        [user.id],
    )
}

pub fn get_for(conn: &Connection, user: &User, id: i64) -> Result<Task> {
    let task = get(conn, id)?;
    let visible = user.is_admin()
        || task.project_manager_id == user.id
        || task.user_id == Some(user.id)
        || task.assignee_ids.contains(&user.id);
    if !visible {
        return Err(SiteError::not_found("task", id));
    }
    Ok(task)
}

pub fn for_project(conn: &Connection, project_id: i64) -> Result<Vec<Task>> {
    load(
        conn,
        "SELECT * FROM tasks WHERE project_id = ?1 ORDER BY due_date, id",
        [project_id],
    )
}

/// Open tasks due strictly before `today`.
pub fn overdue(conn: &Connection, today: NaiveDate) -> Result<Vec<Task>> {
    load(
        conn,
        "SELECT * FROM tasks WHERE due_date < ?1 AND status NOT IN ('completed', 'cancelled')
         ORDER BY due_date, id",
        [today],
    )
}

pub fn due_on(conn: &Connection, day: NaiveDate) -> Result<Vec<Task>> {
    load(
        conn,
        "SELECT * FROM tasks WHERE due_date = ?1 AND status NOT IN ('completed', 'cancelled')
         ORDER BY id",
        [day],
    )
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub estimated_hours: Option<f64>,
    pub project_id: Option<i64>,
    pub custom_fields: Option<Map<String, Value>>,
    pub tags: Option<Vec<String>>,
    pub is_starred: Option<bool>,
    pub is_archived: Option<bool>,
    pub user_id: Option<i64>,
    pub assignee_ids: Option<Vec<i64>>,
    pub watcher_ids: Option<Vec<i64>>,
}

fn validate(conn: &Connection, title: &str, input: &TaskInput) -> Result<()> {
    let mut v = Violations::new();
    v.present("Title", Some(title));
    if let (Some(start), Some(due)) = (input.start_date, input.due_date) {
        v.check(start <= due, "Due date must be on or after the start date");
    }
    if let Some(h) = input.estimated_hours {
        v.check(h >= 0.0, "Estimated hours must be greater than or equal to 0");
    }
    for id in input
        .assignee_ids
        .iter()
        .flatten()
        .chain(input.watcher_ids.iter().flatten())
    {
        if crate::user::get(conn, *id).is_err() {
            v.add(format!("User {id} does not exist"));
        }
    }
    v.into_result()
}

/// Create a task managed by `manager`.
pub fn create(conn: &Connection, manager: &User, input: &TaskInput, now: DateTime<Utc>) -> Result<Task> {
    let title = input.title.clone().unwrap_or_default();
    validate(conn, &title, input)?;
    if let Some(project_id) = input.project_id {
        crate::project::get(conn, project_id)?;
    }
    conn.execute(
        "INSERT INTO tasks
           (title, description, start_date, due_date, status, priority, estimated_hours,
            project_id, custom_fields, tags, is_starred, is_archived, user_id,
            project_manager_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?15)",
        params![
            title.trim(),
            input.description,
            input.start_date,
            input.due_date,
            input.status.unwrap_or_default(),
            input.priority.unwrap_or_default(),
            input.estimated_hours,
            input.project_id,
            Value::Object(input.custom_fields.clone().unwrap_or_default()),
            serde_json::to_value(input.tags.clone().unwrap_or_default())?,
            input.is_starred.unwrap_or(false),
            input.is_archived.unwrap_or(false),
            input.user_id,
            manager.id,
            now,
        ],
    )?;
    let id = conn.last_insert_rowid();
    set_members(conn, "task_assignees", id, input.assignee_ids.as_deref().unwrap_or(&[]))?;
    set_members(conn, "task_watchers", id, input.watcher_ids.as_deref().unwrap_or(&[]))?;
    get(conn, id)
}

#[derive(Debug, Clone)]
pub struct TaskChange {
    pub task: Task,
    pub previous_status: TaskStatus,
    /// Assignees that were not on the task before.
    pub new_assignees: Vec<i64>,
}

impl TaskChange {
    pub fn status_changed(&self) -> Option<(TaskStatus, TaskStatus)> {
        (self.previous_status != self.task.status).then_some((self.previous_status, self.task.status))
    }
}

pub fn update(conn: &Connection, id: i64, input: &TaskInput, now: DateTime<Utc>) -> Result<TaskChange> {
    let old = get(conn, id)?;
    let title = input.title.clone().unwrap_or_else(|| old.title.clone());
    let merged = TaskInput {
        start_date: input.start_date.or(old.start_date),
        due_date: input.due_date.or(old.due_date),
        estimated_hours: input.estimated_hours.or(old.estimated_hours),
        ..input.clone()
    };
    validate(conn, &title, &merged)?;
    if let Some(project_id) = input.project_id {
        crate::project::get(conn, project_id)?;
    }
    conn.execute(
        "UPDATE tasks SET title = ?1, description = ?2, start_date = ?3, due_date = ?4,
                status = ?5, priority = ?6, estimated_hours = ?7, project_id = ?8,
                custom_fields = ?9, tags = ?10, is_starred = ?11, is_archived = ?12,
                user_id = ?13, updated_at = ?14
         WHERE id = ?15",
        params![
            title.trim(),
            input.description.clone().or(old.description.clone()),
            merged.start_date,
            merged.due_date,
            input.status.unwrap_or(old.status),
            input.priority.unwrap_or(old.priority),
            merged.estimated_hours,
            input.project_id.or(old.project_id),
            Value::Object(input.custom_fields.clone().unwrap_or(old.custom_fields.clone())),
            serde_json::to_value(input.tags.clone().unwrap_or(old.tags.clone()))?,
            input.is_starred.unwrap_or(old.is_starred),
            input.is_archived.unwrap_or(old.is_archived),
            input.user_id.or(old.user_id),
            now,
            id,
        ],
    )?;
    let mut new_assignees = Vec::new();
    if let Some(ids) = &input.assignee_ids {
        new_assignees = ids
            .iter()
            .copied()
            .filter(|id| !old.assignee_ids.contains(id))
            .collect();
        new_assignees.dedup();
        set_members(conn, "task_assignees", id, ids)?;
    }
    if let Some(ids) = &input.watcher_ids {
        set_members(conn, "task_watchers", id, ids)?;
    }
    Ok(TaskChange {
        task: get(conn, id)?,
        previous_status: old.status,
        new_assignees,
    })
}

pub fn delete(conn: &Connection, id: i64) -> Result<()> {
    found(
        conn.query_row("SELECT id FROM tasks WHERE id = ?1", [id], |row| row.get::<_, i64>(0)),
        "task",
        id,
    )?;
    conn.execute("DELETE FROM tasks WHERE id = ?1", [id])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Store;
    use crate::testutil;
    use crate::types::Role;
    use serde_json::json;

    #[test]
    fn create_with_members_and_json_columns() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.conn();
        let now = Utc::now();
        let pm = crate::user::get(conn, testutil::user(conn, "pm@site.io", Role::ProjectManager)).unwrap();
        let a = testutil::user(conn, "a@site.io", Role::SiteManager);
        let w = testutil::user(conn, "w@site.io", Role::Supervisor);
        let mut fields = Map::new();
        fields.insert("crew".into(), json!("B"));
        let t = create(
            conn,
            &pm,
            &TaskInput {
                title: Some("Order rebar".into()),
                assignee_ids: Some(vec![a, a]),
                watcher_ids: Some(vec![w]),
                custom_fields: Some(fields),
                tags: Some(vec!["steel".into()]),
                ..Default::default()
            },
            now,
        )
        .unwrap();
        assert_eq!(t.assignee_ids, vec![a]);
        assert_eq!(t.watcher_ids, vec![w]);
        assert_eq!(t.custom_fields["crew"], json!("B"));
        assert_eq!(t.tags, vec!["steel"]);
        assert_eq!(t.status, TaskStatus::Pending);
        assert_eq!(t.completion_percentage(), 0);
    }

    #[test]
    fn unknown_assignee_is_rejected() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.conn();
        let pm = crate::user::get(conn, testutil::user(conn, "pm@site.io", Role::ProjectManager)).unwrap();
        let err = create(
            conn,
            &pm,
            &TaskInput {
                title: Some("x".into()),
                assignee_ids: Some(vec![404]),
                ..Default::default()
            },
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, SiteError::Validation(_)));
    }

    #[test]
    fn list_covers_managed_owned_and_assigned_once() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.conn();
        let pm = testutil::user(conn, "pm@site.io", Role::ProjectManager);
        let worker = testutil::user(conn, "w@site.io", Role::SiteManager);
        let t1 = testutil::task(conn, pm, None, "Managed");
        testutil::task(conn, worker, None, "Own managed");
        conn.execute(
            "INSERT INTO task_assignees (task_id, user_id) VALUES (?1, ?2)",
            params![t1, worker],
        )
        .unwrap();
        conn.execute("UPDATE tasks SET user_id = ?1 WHERE id = ?2", params![worker, t1]).unwrap();

        let worker_user = crate::user::get(conn, worker).unwrap();
        let pm_user = crate::user::get(conn, pm).unwrap();
        assert_eq!(list_for(conn, &worker_user).unwrap().len(), 2);
        assert_eq!(list_for(conn, &pm_user).unwrap().len(), 1);
        assert!(get_for(conn, &pm_user, t1).is_ok());
    }

    #[test]
    fn update_reports_status_and_new_assignees() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.conn();
        let now = Utc::now();
        let pm = testutil::user(conn, "pm@site.io", Role::ProjectManager);
        let a = testutil::user(conn, "a@site.io", Role::SiteManager);
        let b = testutil::user(conn, "b@site.io", Role::SiteManager);
        let id = testutil::task(conn, pm, None, "Pour slab");
        update(conn, id, &TaskInput { assignee_ids: Some(vec![a]), ..Default::default() }, now).unwrap();

        let change = update(
            conn,
            id,
            &TaskInput {
                status: Some(TaskStatus::Completed),
                assignee_ids: Some(vec![a, b]),
                ..Default::default()
            },
            now,
        )
        .unwrap();
        assert_eq!(change.new_assignees, vec![b]);
        assert_eq!(
            change.status_changed(),
            Some((TaskStatus::Pending, TaskStatus::Completed))
        );
        assert_eq!(change.task.completion_percentage(), 100);
    }

    #[test]
    fn overdue_ignores_closed_tasks() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.conn();
        let pm = testutil::user(conn, "pm@site.io", Role::ProjectManager);
        let today = NaiveDate::from_ymd_opt(2025, 6, 10).unwrap();
        let late = testutil::task(conn, pm, None, "Late");
        let done = testutil::task(conn, pm, None, "Done");
        conn.execute("UPDATE tasks SET due_date = '2025-06-01'", []).unwrap();
        conn.execute("UPDATE tasks SET status = 'completed' WHERE id = ?1", [done]).unwrap();
        let found = overdue(conn, today).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, late);
        assert!(found[0].is_overdue(today));
    }
}
