use axum::extract::{Path, State};
use axum::{Extension, Json};
use chrono::Utc;
use serde::Deserialize;
use sitedesk_core::activity;
use sitedesk_core::types::Role;
use sitedesk_core::user::{self, User};

use crate::auth::{require_admin, CurrentUser};
use crate::error::AppError;
use crate::state::AppState;

/// GET /api/users: every account (admin only).
pub async fn list_users(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
) -> Result<Json<Vec<User>>, AppError> {
    require_admin(&me)?;
    let users = app.with_store(|store| user::list(store.conn())).await?;
    Ok(Json(users))
}

#[derive(Deserialize)]
pub struct RoleBody {
    pub role: Role,
}

/// PUT /api/users/{id}/role: change an account's role (admin only).
pub async fn set_role(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(body): Json<RoleBody>,
) -> Result<Json<User>, AppError> {
    require_admin(&me)?;
    let updated = app
        .with_store(move |store| {
            let now = Utc::now();
            let tx = store.transaction()?;
            let updated = user::set_role(&tx, id, body.role, now)?;
            activity::log(&tx, &me, "role_changed", "User", id, now)?;
            tx.commit()?;
            Ok(updated)
        })
        .await?;
    tracing::info!(user_id = id, role = %updated.role, "role changed");
    Ok(Json(updated))
}
