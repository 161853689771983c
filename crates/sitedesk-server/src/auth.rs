use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use sitedesk_core::session::{self, IssuedToken};
use sitedesk_core::user::User;

use crate::error::AppError;
use crate::state::AppState;

/// Headers the frontend reads back after sign-in.
pub const EXPOSED_HEADERS: [&str; 6] = [
    "access-token",
    "expiry",
    "token-type",
    "uid",
    "client",
    "authorization",
];

/// The signed-in user, inserted into request extensions by [`require_user`].
#[derive(Clone, Debug)]
pub struct CurrentUser(pub User);

/// Token from `Authorization: Bearer …`, else the bare `access-token` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        if let Some(token) = value.strip_prefix("Bearer ") {
            let token = token.trim();
            if !token.is_empty() {
                return Some(token.to_string());
            }
        }
    }
    headers
        .get("access-token")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Resolve the caller when a token is presented; anonymous otherwise.
pub async fn optional_user(app: &AppState, headers: &HeaderMap) -> Result<Option<User>, AppError> {
    let Some(token) = bearer_token(headers) else {
        return Ok(None);
    };
    app.with_store(move |store| session::authenticate(store.conn(), &token, Utc::now()))
        .await
}

/// Axum middleware that rejects requests without a live session token.
pub async fn require_user(State(app): State<AppState>, mut req: Request, next: Next) -> Response {
    match optional_user(&app, req.headers()).await {
        Ok(Some(user)) => {
            req.extensions_mut().insert(CurrentUser(user));
            next.run(req).await
        }
        Ok(None) => AppError::unauthorized("You need to sign in or sign up before continuing.")
            .into_response(),
        Err(e) => e.into_response(),
    }
}

pub fn require_admin(user: &User) -> Result<(), AppError> {
    if user.is_admin() {
        Ok(())
    } else {
        Err(AppError::forbidden("Admin access required"))
    }
}

/// Session headers mirrored onto sign-in responses.
pub fn token_headers(token: &IssuedToken) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let pairs = [
        ("access-token", token.access_token.clone()),
        ("client", token.client.clone()),
        ("uid", token.uid.clone()),
        ("expiry", token.expiry.to_string()),
        ("token-type", token.token_type.to_string()),
        ("authorization", format!("Bearer {}", token.access_token)),
    ];
    for (name, value) in pairs {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(HeaderName::from_static(name), value);
        }
    }
    headers
}
