//! Login, one-time-code verification and bearer sessions.

use crate::activity;
use crate::config::AuthConfig;
use crate::credentials;
use crate::error::{Result, SiteError};
use crate::user::{self, User, USER_COLUMNS};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use serde_json::json;

/// Delivers confirmation links and one-time codes to a user.
pub trait CodeSender: Send + Sync {
    fn send_otp(&self, user: &User, code: &str) -> std::result::Result<(), String>;
    fn send_confirmation(&self, user: &User, token: &str) -> std::result::Result<(), String>;
}

/// Writes codes to the log instead of mailing them.
#[derive(Debug, Default, Clone)]
pub struct LogSender;

impl CodeSender for LogSender {
    fn send_otp(&self, user: &User, code: &str) -> std::result::Result<(), String> {
        tracing::info!(email = %user.email, code, "one-time code issued");
        Ok(())
    }

    fn send_confirmation(&self, user: &User, token: &str) -> std::result::Result<(), String> {
        tracing::info!(email = %user.email, token, "confirmation token issued");
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub access_token: String,
    pub client: String,
    pub uid: String,
    pub token_type: &'static str,
    pub expiry: i64,
    pub role: crate::types::Role,
    pub user: TokenUser,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenUser {
    pub id: i64,
    pub email: String,
    pub role: crate::types::Role,
}

#[derive(Debug, Clone)]
pub enum LoginOutcome {
    /// A code was sent; the caller must follow up with [`verify_otp`].
    OtpRequired,
    Authenticated(IssuedToken),
}

fn unix_secs(now: DateTime<Utc>) -> u64 {
    now.timestamp().max(0) as u64
}

pub fn issue_token(
    conn: &Connection,
    user: &User,
    auth: &AuthConfig,
    now: DateTime<Utc>,
) -> Result<IssuedToken> {
    let token = credentials::new_token();
    let client = credentials::new_client_id();
    let expires_at = now + Duration::hours(auth.token_ttl_hours);
    conn.execute(
        "INSERT INTO sessions (user_id, client, token_hash, expires_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            user.id,
            client,
            credentials::token_digest(&token),
            expires_at,
            now
        ],
    )?;
    Ok(IssuedToken {
        access_token: token,
        client,
        uid: user.email.clone(),
        token_type: "Bearer",
        expiry: expires_at.timestamp(),
        role: user.role,
        user: TokenUser {
            id: user.id,
            email: user.email.clone(),
            role: user.role,
        },
    })
}

/// Check the password; either issue a token or send a one-time code.
pub fn login(
    conn: &Connection,
    email: &str,
    password: &str,
    auth: &AuthConfig,
    sender: &dyn CodeSender,
    remote_ip: Option<&str>,
    now: DateTime<Utc>,
) -> Result<LoginOutcome> {
    let invalid = || SiteError::Unauthorized("Invalid login credentials".into());
    let Some(user) = user::find_by_email(conn, email)? else {
        return Err(invalid());
    };
    let (hash, secret) = user::secrets(conn, user.id)?;
    if !credentials::verify_password(password, &hash) {
        tracing::warn!(email = %user.email, "failed login");
        activity::record(
            conn,
            Some(user.id),
            "login",
            "User",
            Some(user.id),
            json!({"method": "password", "status": "failed", "ip": remote_ip}),
            now,
        )?;
        return Err(invalid());
    }

    if user.otp_required {
        let code = credentials::totp_now(&secret, unix_secs(now), auth.otp_step_secs)
            .ok_or_else(|| SiteError::Internal("stored one-time secret is unreadable".into()))?;
        if let Err(e) = sender.send_otp(&user, &code) {
            tracing::error!(email = %user.email, error = %e, "error sending OTP");
            activity::record(
                conn,
                Some(user.id),
                "login_attempt",
                "User",
                Some(user.id),
                json!({"method": "otp", "status": "otp_failed", "ip": remote_ip}),
                now,
            )?;
            return Err(SiteError::Internal("Error sending OTP".into()));
        }
        activity::record(
            conn,
            Some(user.id),
            "login_attempt",
            "User",
            Some(user.id),
            json!({"method": "otp", "status": "otp_sent", "ip": remote_ip}),
            now,
        )?;
        return Ok(LoginOutcome::OtpRequired);
    }

    activity::record(
        conn,
        Some(user.id),
        "login",
        "User",
        Some(user.id),
        json!({"method": "password", "status": "success", "ip": remote_ip}),
        now,
    )?;
    Ok(LoginOutcome::Authenticated(issue_token(conn, &user, auth, now)?))
}

pub fn verify_otp(
    conn: &Connection,
    email: &str,
    code: &str,
    auth: &AuthConfig,
    remote_ip: Option<&str>,
    now: DateTime<Utc>,
) -> Result<IssuedToken> {
    let invalid = || SiteError::invalid("Invalid OTP");
    let Some(user) = user::find_by_email(conn, email)? else {
        return Err(invalid());
    };
    let (_, secret) = user::secrets(conn, user.id)?;
    let ok = credentials::totp_verify(
        &secret,
        code,
        unix_secs(now),
        auth.otp_step_secs,
        auth.otp_drift_steps,
    );
    activity::record(
        conn,
        Some(user.id),
        "login",
        "User",
        Some(user.id),
        json!({
            "method": "otp",
            "status": if ok { "success" } else { "failed" },
            "ip": remote_ip,
        }),
        now,
    )?;
    if !ok {
        return Err(invalid());
    }
    issue_token(conn, &user, auth, now)
}

/// Resolve a bearer token to its user. Expired sessions are ignored.
pub fn authenticate(conn: &Connection, token: &str, now: DateTime<Utc>) -> Result<Option<User>> {
    let digest = credentials::token_digest(token);
    let cols = USER_COLUMNS
        .split(", ")
        .map(|c| format!("u.{c}"))
        .collect::<Vec<_>>()
        .join(", ");
    Ok(conn
        .query_row(
            &format!(
                "SELECT {cols} FROM sessions s JOIN users u ON u.id = s.user_id
                 WHERE s.token_hash = ?1 AND s.expires_at > ?2"
            ),
            params![digest, now],
            user::from_row,
        )
        .optional()?)
}

pub fn revoke(conn: &Connection, token: &str) -> Result<bool> {
    let n = conn.execute(
        "DELETE FROM sessions WHERE token_hash = ?1",
        [credentials::token_digest(token)],
    )?;
    Ok(n > 0)
}

pub fn purge_expired(conn: &Connection, now: DateTime<Utc>) -> Result<usize> {
    Ok(conn.execute("DELETE FROM sessions WHERE expires_at <= ?1", [now])?)
}
