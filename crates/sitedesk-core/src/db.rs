//! SQLite store and schema migrations.
//!
//! Schema versions are tracked in `PRAGMA user_version`. Each entry in
//! [`MIGRATIONS`] moves the schema forward by one version and runs inside
//! its own transaction.

use crate::error::Result;
use rusqlite::types::Type;
use rusqlite::{Connection, Row, Transaction, TransactionBehavior};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

const MIGRATIONS: &[&str] = &[
    // v1: accounts, directory, projects
    "
    CREATE TABLE users (
      id INTEGER PRIMARY KEY,
      email TEXT NOT NULL UNIQUE,
      name TEXT,
      nickname TEXT,
      password_hash TEXT NOT NULL,
      role TEXT NOT NULL DEFAULT 'project_manager',
      confirmation_token TEXT UNIQUE,
      confirmed_at TEXT,
      otp_secret TEXT NOT NULL,
      otp_required INTEGER NOT NULL DEFAULT 1,
      notification_settings TEXT,
      created_at TEXT NOT NULL,
      updated_at TEXT NOT NULL
    );
    CREATE TABLE sessions (
      id INTEGER PRIMARY KEY,
      user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
      client TEXT NOT NULL,
      token_hash TEXT NOT NULL UNIQUE,
      expires_at TEXT NOT NULL,
      created_at TEXT NOT NULL
    );
    CREATE TABLE supervisors (
      id INTEGER PRIMARY KEY,
      name TEXT NOT NULL,
      email TEXT NOT NULL UNIQUE,
      created_at TEXT NOT NULL,
      updated_at TEXT NOT NULL
    );
    CREATE TABLE site_managers (
      id INTEGER PRIMARY KEY,
      name TEXT NOT NULL,
      email TEXT NOT NULL UNIQUE,
      phone TEXT,
      location TEXT,
      specialization TEXT,
      experience_years INTEGER NOT NULL DEFAULT 0,
      status TEXT NOT NULL DEFAULT 'active',
      availability TEXT NOT NULL DEFAULT 'available',
      certifications TEXT NOT NULL DEFAULT '[]',
      created_at TEXT NOT NULL,
      updated_at TEXT NOT NULL
    );
    CREATE TABLE projects (
      id INTEGER PRIMARY KEY,
      title TEXT NOT NULL,
      description TEXT,
      status TEXT NOT NULL DEFAULT 'planning',
      priority TEXT NOT NULL DEFAULT 'medium',
      location TEXT,
      lead_person TEXT,
      responsible TEXT,
      budget REAL,
      start_date TEXT,
      finishing_date TEXT NOT NULL,
      actual_start_date TEXT,
      progress_percentage REAL NOT NULL DEFAULT 0
        CHECK (progress_percentage >= 0 AND progress_percentage <= 100),
      last_progress_update TEXT,
      progress_notes TEXT,
      project_manager_id INTEGER NOT NULL REFERENCES users(id),
      supervisor_id INTEGER NOT NULL REFERENCES supervisors(id),
      site_manager_id INTEGER REFERENCES site_managers(id) ON DELETE SET NULL,
      user_id INTEGER REFERENCES users(id),
      created_at TEXT NOT NULL,
      updated_at TEXT NOT NULL
    );
    CREATE INDEX idx_projects_manager_status ON projects(project_manager_id, status);
    CREATE INDEX idx_projects_supervisor ON projects(supervisor_id);
    CREATE INDEX idx_projects_finishing_date ON projects(finishing_date);
    CREATE TABLE progress_updates (
      id INTEGER PRIMARY KEY,
      project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
      old_progress REAL NOT NULL CHECK (old_progress >= 0 AND old_progress <= 100),
      new_progress REAL NOT NULL CHECK (new_progress >= 0 AND new_progress <= 100),
      notes TEXT,
      update_type TEXT NOT NULL DEFAULT 'manual',
      updated_by_id INTEGER REFERENCES users(id),
      timeline_progress_at_update REAL,
      variance_at_update REAL,
      project_status_at_update TEXT,
      created_at TEXT NOT NULL
    );
    CREATE INDEX idx_progress_updates_project ON progress_updates(project_id, created_at);
    CREATE TABLE project_milestones (
      id INTEGER PRIMARY KEY,
      project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
      name TEXT NOT NULL,
      description TEXT,
      planned_date TEXT,
      actual_date TEXT,
      progress_percentage_target REAL NOT NULL DEFAULT 0
        CHECK (progress_percentage_target >= 0 AND progress_percentage_target <= 100),
      order_position INTEGER NOT NULL DEFAULT 0,
      created_at TEXT NOT NULL,
      updated_at TEXT NOT NULL
    );
    ",
    // v2: work items
    "
    CREATE TABLE events (
      id INTEGER PRIMARY KEY,
      description TEXT NOT NULL,
      date TEXT NOT NULL,
      responsible TEXT NOT NULL,
      project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
      completed_at TEXT,
      created_at TEXT NOT NULL,
      updated_at TEXT NOT NULL
    );
    CREATE INDEX idx_events_project_date ON events(project_id, date);
    CREATE TABLE tenders (
      id INTEGER PRIMARY KEY,
      title TEXT NOT NULL,
      description TEXT NOT NULL,
      deadline TEXT NOT NULL,
      lead_person TEXT,
      responsible TEXT NOT NULL,
      status TEXT NOT NULL DEFAULT 'draft',
      priority TEXT NOT NULL DEFAULT 'medium',
      category TEXT,
      location TEXT,
      client TEXT,
      budget_estimate REAL,
      estimated_duration TEXT,
      requirements TEXT,
      submission_count INTEGER NOT NULL DEFAULT 0,
      project_manager_id INTEGER REFERENCES users(id),
      project_id INTEGER REFERENCES projects(id) ON DELETE SET NULL,
      user_id INTEGER REFERENCES users(id),
      created_at TEXT NOT NULL,
      updated_at TEXT NOT NULL
    );
    CREATE INDEX idx_tenders_deadline ON tenders(deadline);
    CREATE INDEX idx_tenders_manager ON tenders(project_manager_id);
    CREATE TABLE tasks (
      id INTEGER PRIMARY KEY,
      title TEXT NOT NULL,
      description TEXT,
      start_date TEXT,
      due_date TEXT,
      status TEXT NOT NULL DEFAULT 'pending',
      priority TEXT NOT NULL DEFAULT 'medium',
      estimated_hours REAL,
      project_id INTEGER REFERENCES projects(id) ON DELETE SET NULL,
      custom_fields TEXT NOT NULL DEFAULT '{}',
      tags TEXT NOT NULL DEFAULT '[]',
      is_starred INTEGER NOT NULL DEFAULT 0,
      is_archived INTEGER NOT NULL DEFAULT 0,
      user_id INTEGER REFERENCES users(id),
      project_manager_id INTEGER NOT NULL REFERENCES users(id),
      created_at TEXT NOT NULL,
      updated_at TEXT NOT NULL
    );
    CREATE INDEX idx_tasks_manager_status ON tasks(project_manager_id, status);
    CREATE INDEX idx_tasks_due_date ON tasks(due_date);
    CREATE TABLE task_assignees (
      task_id INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
      user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
      PRIMARY KEY (task_id, user_id)
    );
    CREATE TABLE task_watchers (
      task_id INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
      user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
      PRIMARY KEY (task_id, user_id)
    );
    CREATE TABLE custom_fields (
      id INTEGER PRIMARY KEY,
      name TEXT NOT NULL,
      field_type TEXT NOT NULL,
      description TEXT,
      required INTEGER NOT NULL DEFAULT 0,
      entity_type TEXT NOT NULL DEFAULT 'task',
      options TEXT NOT NULL DEFAULT '{}',
      created_at TEXT NOT NULL,
      updated_at TEXT NOT NULL,
      UNIQUE (entity_type, name)
    );
    ",
    // v3: inbox and audit trail
    "
    CREATE TABLE notifications (
      id INTEGER PRIMARY KEY,
      user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
      title TEXT NOT NULL,
      message TEXT NOT NULL,
      notification_type TEXT NOT NULL DEFAULT 'info',
      category TEXT NOT NULL DEFAULT 'system',
      priority TEXT NOT NULL DEFAULT 'medium',
      action_required INTEGER NOT NULL DEFAULT 0,
      is_read INTEGER NOT NULL DEFAULT 0,
      read_at TEXT,
      sender_id INTEGER REFERENCES users(id) ON DELETE SET NULL,
      sender_name TEXT,
      project_id INTEGER REFERENCES projects(id) ON DELETE SET NULL,
      tender_id INTEGER REFERENCES tenders(id) ON DELETE SET NULL,
      task_id INTEGER REFERENCES tasks(id) ON DELETE SET NULL,
      metadata TEXT NOT NULL DEFAULT '{}',
      tags TEXT NOT NULL DEFAULT '[]',
      created_at TEXT NOT NULL
    );
    CREATE INDEX idx_notifications_user_read ON notifications(user_id, is_read);
    CREATE TABLE activities (
      id INTEGER PRIMARY KEY,
      actor_id INTEGER REFERENCES users(id) ON DELETE SET NULL,
      action TEXT NOT NULL,
      target_type TEXT NOT NULL,
      target_id INTEGER,
      metadata TEXT NOT NULL DEFAULT '{}',
      created_at TEXT NOT NULL
    );
    CREATE INDEX idx_activities_created ON activities(created_at);
    ",
];

/// Latest schema version this build knows how to produce.
pub fn schema_version() -> i64 {
    MIGRATIONS.len() as i64
}

/// Owns the SQLite connection. Model functions take `&Connection`, so they
/// work equally on the store and inside a [`Transaction`].
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (creating if needed) the database at `path` and migrate it.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let mut store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    /// Apply pending migrations. Returns the number applied.
    pub fn migrate(&mut self) -> Result<usize> {
        let current: i64 = self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?;
        let mut applied = 0;
        for (idx, sql) in MIGRATIONS.iter().enumerate() {
            let version = idx as i64 + 1;
            if version <= current {
                continue;
            }
            let tx = self.conn.transaction()?;
            tx.execute_batch(sql)?;
            tx.execute_batch(&format!("PRAGMA user_version={version};"))?;
            tx.commit()?;
            tracing::info!(version, "applied schema migration");
            applied += 1;
        }
        Ok(applied)
    }

    pub fn version(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?)
    }

    /// Row counts of the main tables.
    pub fn counts(&self) -> Result<BTreeMap<&'static str, i64>> {
        let mut out = BTreeMap::new();
        for table in ["users", "projects", "tasks", "tenders", "events", "notifications"] {
            let n: i64 = self
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
            out.insert(table, n);
        }
        Ok(out)
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Begin an IMMEDIATE transaction so the write lock is taken up front.
    pub fn transaction(&mut self) -> Result<Transaction<'_>> {
        Ok(self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?)
    }
}

/// Map `QueryReturnedNoRows` to a typed not-found error.
pub(crate) fn found<T>(
    result: rusqlite::Result<T>,
    entity: &'static str,
    id: impl ToString,
) -> Result<T> {
    match result {
        Ok(v) => Ok(v),
        Err(rusqlite::Error::QueryReturnedNoRows) => Err(crate::SiteError::not_found(entity, id)),
        Err(e) => Err(e.into()),
    }
}

/// Decode a JSON text column into `T`. NULL reads as `T::default()`; a
/// value of the wrong shape is a conversion error, not an empty default.
pub(crate) fn json_column<T: DeserializeOwned + Default>(
    row: &Row<'_>,
    column: &str,
) -> rusqlite::Result<T> {
    let Some(raw) = row.get::<_, Option<Value>>(column)? else {
        return Ok(T::default());
    };
    serde_json::from_value(raw).map_err(|e| {
        let idx = row.as_ref().column_index(column).unwrap_or_default();
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
    })
}

/// True when a constraint violation names a UNIQUE index.
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, Some(msg))
            if e.code == rusqlite::ErrorCode::ConstraintViolation && msg.contains("UNIQUE")
    )
}
