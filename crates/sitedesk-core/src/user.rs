use crate::config::AuthConfig;
use crate::credentials;
use crate::db::{found, is_unique_violation};
use crate::error::{Result, SiteError, Violations};
use crate::types::Role;
use chrono::{DateTime, Utc};
use regex::Regex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub name: Option<String>,
    pub nickname: Option<String>,
    pub role: Role,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub otp_required: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is_project_manager(&self) -> bool {
        self.role == Role::ProjectManager
    }

    /// Name when set, otherwise the e-mail address.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.email)
    }
}

pub(crate) const USER_COLUMNS: &str =
    "id, email, name, nickname, role, confirmed_at, otp_required, created_at, updated_at";

pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get("id")?,
        email: row.get("email")?,
        name: row.get("name")?,
        nickname: row.get("nickname")?,
        role: row.get("role")?,
        confirmed_at: row.get("confirmed_at")?,
        otp_required: row.get("otp_required")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn email_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok())
        .as_ref()
}

pub fn is_valid_email(email: &str) -> bool {
    email_regex().is_some_and(|re| re.is_match(email))
}

pub fn get(conn: &Connection, id: i64) -> Result<User> {
    found(
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            [id],
            from_row,
        ),
        "user",
        id,
    )
}

pub fn find_by_email(conn: &Connection, email: &str) -> Result<Option<User>> {
    Ok(conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1 COLLATE NOCASE"),
            [email.trim()],
            from_row,
        )
        .optional()?)
}

pub fn count(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?)
}

pub fn list(conn: &Connection) -> Result<Vec<User>> {
    let mut stmt = conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id"))?;
    let rows = stmt.query_map([], from_row)?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

pub fn admins(conn: &Connection) -> Result<Vec<User>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE role = 'admin' ORDER BY id"
    ))?;
    let rows = stmt.query_map([], from_row)?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

pub fn list_by_ids(conn: &Connection, ids: &[i64]) -> Result<Vec<User>> {
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        match get(conn, *id) {
            Ok(u) => out.push(u),
            Err(SiteError::NotFound { .. }) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(out)
}

pub(crate) fn secrets(conn: &Connection, id: i64) -> Result<(String, String)> {
    found(
        conn.query_row(
            "SELECT password_hash, otp_secret FROM users WHERE id = ?1",
            [id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        ),
        "user",
        id,
    )
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub password_confirmation: Option<String>,
    pub name: Option<String>,
    pub nickname: Option<String>,
    pub role: Option<Role>,
}

#[derive(Debug, Clone)]
pub struct Registered {
    pub user: User,
    pub confirmation_token: String,
}

/// Create an account.
///
/// Asking for `admin` is honoured only for the very first account or when an
/// admin is registering someone. The first account is always promoted.
pub fn register(
    conn: &Connection,
    reg: &Registration,
    caller: Option<&User>,
    auth: &AuthConfig,
    now: DateTime<Utc>,
) -> Result<Registered> {
    let existing = count(conn)?;
    if reg.role == Some(Role::Admin) && existing > 0 && !caller.is_some_and(User::is_admin) {
        tracing::warn!(email = %reg.email, "blocked unauthorized attempt to register as admin");
        return Err(SiteError::Unauthorized(
            "You are not authorized to create an admin user.".into(),
        ));
    }

    let mut v = Violations::new();
    v.check(is_valid_email(reg.email.trim()), "Email is invalid");
    v.check(
        reg.password.chars().count() >= MIN_PASSWORD_LEN,
        format!("Password is too short (minimum is {MIN_PASSWORD_LEN} characters)"),
    );
    if let Some(confirmation) = &reg.password_confirmation {
        v.check(
            confirmation == &reg.password,
            "Password confirmation doesn't match Password",
        );
    }
    v.into_result()?;

    let role = if existing == 0 {
        if reg.role != Some(Role::Admin) {
            tracing::info!(email = %reg.email, "auto-assigned admin role to first user");
        }
        Role::Admin
    } else {
        reg.role.unwrap_or(Role::ProjectManager)
    };

    let confirmation_token = credentials::new_token();
    let password_hash = credentials::hash_password(&reg.password)?;
    let inserted = conn.execute(
        "INSERT INTO users (email, name, nickname, password_hash, role, confirmation_token,
                            otp_secret, otp_required, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
        params![
            reg.email.trim().to_lowercase(),
            reg.name,
            reg.nickname,
            password_hash,
            role,
            confirmation_token,
            credentials::new_otp_secret(),
            auth.require_otp_by_default,
            now,
        ],
    );
    match inserted {
        Ok(_) => {}
        Err(e) if is_unique_violation(&e) => {
            return Err(SiteError::Validation(vec![
                "Email has already been taken".into(),
            ]))
        }
        Err(e) => return Err(e.into()),
    }
    let user = get(conn, conn.last_insert_rowid())?;
    Ok(Registered {
        user,
        confirmation_token,
    })
}

pub fn confirm_email(conn: &Connection, token: &str, now: DateTime<Utc>) -> Result<User> {
    let id: i64 = found(
        conn.query_row(
            "SELECT id FROM users WHERE confirmation_token = ?1",
            [token],
            |row| row.get(0),
        ),
        "confirmation token",
        token,
    )?;
    conn.execute(
        "UPDATE users SET confirmed_at = ?1, confirmation_token = NULL, updated_at = ?1
         WHERE id = ?2",
        params![now, id],
    )?;
    get(conn, id)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub nickname: Option<String>,
}

pub fn update_profile(
    conn: &Connection,
    id: i64,
    patch: &ProfileUpdate,
    now: DateTime<Utc>,
) -> Result<User> {
    let user = get(conn, id)?;
    conn.execute(
        "UPDATE users SET name = ?1, nickname = ?2, updated_at = ?3 WHERE id = ?4",
        params![
            patch.name.clone().or(user.name),
            patch.nickname.clone().or(user.nickname),
            now,
            id
        ],
    )?;
    get(conn, id)
}

pub fn set_role(conn: &Connection, id: i64, role: Role, now: DateTime<Utc>) -> Result<User> {
    let changed = conn.execute(
        "UPDATE users SET role = ?1, updated_at = ?2 WHERE id = ?3",
        params![role, now, id],
    )?;
    if changed == 0 {
        return Err(SiteError::not_found("user", id));
    }
    get(conn, id)
}

pub fn set_otp_required(conn: &Connection, id: i64, required: bool) -> Result<()> {
    conn.execute(
        "UPDATE users SET otp_required = ?1 WHERE id = ?2",
        params![required, id],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Store;

    fn reg(email: &str, role: Option<Role>) -> Registration {
        Registration {
            email: email.into(),
            password: "s3cret-pass".into(),
            password_confirmation: Some("s3cret-pass".into()),
            name: Some("Someone".into()),
            role,
            ..Default::default()
        }
    }

    #[test]
    fn first_user_becomes_admin() {
        let store = Store::open_in_memory().unwrap();
        let r = register(store.conn(), &reg("a@x.io", None), None, &AuthConfig::default(), Utc::now())
            .unwrap();
        assert_eq!(r.user.role, Role::Admin);
        assert!(r.user.otp_required);
    }

    #[test]
    fn later_admin_request_needs_admin_caller() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.conn();
        let auth = AuthConfig::default();
        let admin = register(conn, &reg("a@x.io", None), None, &auth, Utc::now()).unwrap().user;
        let pm = register(conn, &reg("b@x.io", None), None, &auth, Utc::now()).unwrap().user;
        assert_eq!(pm.role, Role::ProjectManager);

        let err = register(conn, &reg("c@x.io", Some(Role::Admin)), Some(&pm), &auth, Utc::now())
            .unwrap_err();
        assert!(matches!(err, SiteError::Unauthorized(_)));

        let ok = register(conn, &reg("c@x.io", Some(Role::Admin)), Some(&admin), &auth, Utc::now())
            .unwrap();
        assert!(ok.user.is_admin());
    }

    #[test]
    fn duplicate_email_is_a_validation_error() {
        let store = Store::open_in_memory().unwrap();
        let auth = AuthConfig::default();
        register(store.conn(), &reg("a@x.io", None), None, &auth, Utc::now()).unwrap();
        let err = register(store.conn(), &reg("A@x.io", None), None, &auth, Utc::now()).unwrap_err();
        match err {
            SiteError::Validation(msgs) => assert_eq!(msgs, vec!["Email has already been taken"]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rejects_short_or_mismatched_password() {
        let store = Store::open_in_memory().unwrap();
        let mut r = reg("a@x.io", None);
        r.password = "short".into();
        let err = register(store.conn(), &r, None, &AuthConfig::default(), Utc::now()).unwrap_err();
        match err {
            SiteError::Validation(msgs) => assert_eq!(msgs.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn confirm_email_consumes_token() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.conn();
        let r = register(conn, &reg("a@x.io", None), None, &AuthConfig::default(), Utc::now()).unwrap();
        let user = confirm_email(conn, &r.confirmation_token, Utc::now()).unwrap();
        assert!(user.confirmed_at.is_some());
        assert!(confirm_email(conn, &r.confirmation_token, Utc::now()).is_err());
    }
}
