use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::Utc;
use sitedesk_core::activity;
use sitedesk_core::site_manager::{self, SiteManager, SiteManagerInput};

use crate::auth::{require_admin, CurrentUser};
use crate::error::AppError;
use crate::state::AppState;

/// GET /api/site_managers
pub async fn list_site_managers(
    State(app): State<AppState>,
) -> Result<Json<Vec<SiteManager>>, AppError> {
    let all = app.with_store(|store| site_manager::list(store.conn())).await?;
    Ok(Json(all))
}

/// GET /api/site_managers/{id}
pub async fn get_site_manager(
    State(app): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<SiteManager>, AppError> {
    let found = app
        .with_store(move |store| site_manager::get(store.conn(), id))
        .await?;
    Ok(Json(found))
}

/// POST /api/site_managers
pub async fn create_site_manager(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    Json(body): Json<SiteManagerInput>,
) -> Result<(StatusCode, Json<SiteManager>), AppError> {
    let created = app
        .with_store(move |store| {
            let now = Utc::now();
            let tx = store.transaction()?;
            let created = site_manager::create(&tx, &body, now)?;
            activity::log(&tx, &me, "created", "SiteManager", created.id, now)?;
            tx.commit()?;
            Ok(created)
        })
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// PUT /api/site_managers/{id}
pub async fn update_site_manager(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(body): Json<SiteManagerInput>,
) -> Result<Json<SiteManager>, AppError> {
    let updated = app
        .with_store(move |store| {
            let now = Utc::now();
            let tx = store.transaction()?;
            let updated = site_manager::update(&tx, id, &body, now)?;
            activity::log(&tx, &me, "updated", "SiteManager", id, now)?;
            tx.commit()?;
            Ok(updated)
        })
        .await?;
    Ok(Json(updated))
}

/// DELETE /api/site_managers/{id}: admins only; projects keep running unassigned.
pub async fn delete_site_manager(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    require_admin(&me)?;
    app.with_store(move |store| {
        let now = Utc::now();
        let tx = store.transaction()?;
        site_manager::delete(&tx, id)?;
        activity::log(&tx, &me, "deleted", "SiteManager", id, now)?;
        tx.commit()?;
        Ok(())
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}
