use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use sitedesk_core::activity;
use sitedesk_core::session::{self, LoginOutcome};
use sitedesk_core::user::{self, ProfileUpdate, Registration};

use crate::auth::{bearer_token, optional_user, token_headers, CurrentUser};
use crate::error::AppError;
use crate::routes::remote_ip;
use crate::state::AppState;

/// POST /api/auth/register: create an account and send its confirmation.
pub async fn register(
    State(app): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Registration>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let caller = optional_user(&app, &headers).await?;
    let config = app.config.clone();
    let registered = app
        .with_store(move |store| {
            let now = Utc::now();
            let tx = store.transaction()?;
            let registered = user::register(&tx, &body, caller.as_ref(), &config.auth, now)?;
            let actor = caller.as_ref().unwrap_or(&registered.user);
            activity::log(&tx, actor, "registered", "User", registered.user.id, now)?;
            tx.commit()?;
            Ok(registered)
        })
        .await?;

    if let Err(e) = app
        .sender
        .send_confirmation(&registered.user, &registered.confirmation_token)
    {
        tracing::warn!(email = %registered.user.email, error = %e, "confirmation delivery failed");
    }

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Registration successful. Please check your email to confirm your account.",
            "user": registered.user,
        })),
    ))
}

#[derive(Deserialize)]
pub struct ConfirmBody {
    pub confirmation_token: String,
}

/// POST /api/auth/confirm: confirm an e-mail address.
pub async fn confirm(
    State(app): State<AppState>,
    Json(body): Json<ConfirmBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let user = app
        .with_store(move |store| user::confirm_email(store.conn(), &body.confirmation_token, Utc::now()))
        .await?;
    Ok(Json(json!({ "message": "Email confirmed", "user": user })))
}

#[derive(Deserialize)]
pub struct LoginBody {
    pub email: String,
    pub password: String,
}

/// POST /api/auth/login: password check; 202 when a one-time code was sent.
pub async fn login(
    State(app): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<LoginBody>,
) -> Result<Response, AppError> {
    let config = app.config.clone();
    let sender = app.sender.clone();
    let ip = remote_ip(&headers);
    let outcome = app
        .with_store(move |store| {
            session::login(
                store.conn(),
                &body.email,
                &body.password,
                &config.auth,
                sender.as_ref(),
                ip.as_deref(),
                Utc::now(),
            )
        })
        .await?;

    Ok(match outcome {
        LoginOutcome::OtpRequired => (
            StatusCode::ACCEPTED,
            Json(json!({
                "message": "OTP sent to your email. Please verify to complete sign in.",
                "otp_required": true,
            })),
        )
            .into_response(),
        LoginOutcome::Authenticated(token) => {
            (token_headers(&token), Json(token)).into_response()
        }
    })
}

#[derive(Deserialize)]
pub struct VerifyOtpBody {
    pub email: String,
    pub otp: String,
}

/// POST /api/auth/verify_otp: exchange a one-time code for a session token.
pub async fn verify_otp(
    State(app): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<VerifyOtpBody>,
) -> Result<Response, AppError> {
    let config = app.config.clone();
    let ip = remote_ip(&headers);
    let token = app
        .with_store(move |store| {
            session::verify_otp(
                store.conn(),
                &body.email,
                body.otp.trim(),
                &config.auth,
                ip.as_deref(),
                Utc::now(),
            )
        })
        .await?;
    Ok((token_headers(&token), Json(token)).into_response())
}

/// DELETE /api/auth/logout: revoke the presented token.
pub async fn logout(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    let token = bearer_token(&headers).ok_or_else(|| AppError::unauthorized("missing token"))?;
    app.with_store(move |store| {
        session::revoke(store.conn(), &token)?;
        activity::log(store.conn(), &me, "logout", "User", me.id, Utc::now())
    })
    .await?;
    Ok(Json(json!({ "message": "Signed out successfully" })))
}

/// GET /api/auth/me
pub async fn me(Extension(CurrentUser(me)): Extension<CurrentUser>) -> Json<user::User> {
    Json(me)
}

/// PATCH /api/auth/me: change name or nickname.
pub async fn update_me(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    Json(body): Json<ProfileUpdate>,
) -> Result<Json<user::User>, AppError> {
    let updated = app
        .with_store(move |store| user::update_profile(store.conn(), me.id, &body, Utc::now()))
        .await?;
    Ok(Json(updated))
}
