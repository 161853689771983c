//! Fixture rows for unit tests.

use crate::credentials;
use crate::types::Role;
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection};

pub fn user(conn: &Connection, email: &str, role: Role) -> i64 {
    let now = Utc::now();
    conn.execute(
        "INSERT INTO users (email, name, password_hash, role, otp_secret, otp_required,
                            created_at, updated_at)
         VALUES (?1, 'Test User', ?2, ?3, ?4, 0, ?5, ?5)",
        params![
            email,
            credentials::hash_password("password123").unwrap(),
            role,
            credentials::new_otp_secret(),
            now
        ],
    )
    .unwrap();
    conn.last_insert_rowid()
}

pub fn supervisor(conn: &Connection, email: &str) -> i64 {
    let now = Utc::now();
    conn.execute(
        "INSERT INTO supervisors (name, email, created_at, updated_at) VALUES ('Sam Super', ?1, ?2, ?2)",
        params![email, now],
    )
    .unwrap();
    conn.last_insert_rowid()
}

/// A planning project starting on `now`'s date and due 90 days later.
pub fn project(conn: &Connection, manager: i64, supervisor: i64, now: DateTime<Utc>) -> i64 {
    let start = now.date_naive();
    conn.execute(
        "INSERT INTO projects (title, start_date, finishing_date, project_manager_id,
                               supervisor_id, created_at, updated_at)
         VALUES ('Riverside Depot', ?1, ?2, ?3, ?4, ?5, ?5)",
        params![start, start + Duration::days(90), manager, supervisor, now],
    )
    .unwrap();
    conn.last_insert_rowid()
}

pub fn task(conn: &Connection, manager: i64, project: Option<i64>, title: &str) -> i64 {
    let now = Utc::now();
    conn.execute(
        "INSERT INTO tasks (title, project_manager_id, project_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?4)",
        params![title, manager, project, now],
    )
    .unwrap();
    conn.last_insert_rowid()
}
