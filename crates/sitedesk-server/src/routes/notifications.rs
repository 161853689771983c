use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use sitedesk_core::fanout::{self, Broadcast, ProjectActivity, TaskActivity, TenderActivity};
use sitedesk_core::notification::{self, InboxFilter, Notification, Page, Stats};
use sitedesk_core::{project, task, tender};

use crate::auth::{require_admin, CurrentUser};
use crate::error::AppError;
use crate::state::AppState;

/// GET /api/notifications: paginated inbox with search, type, status and sort.
pub async fn list_notifications(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    Query(filter): Query<InboxFilter>,
) -> Result<Json<Page>, AppError> {
    let page = app
        .with_store(move |store| notification::list(store.conn(), me.id, &filter))
        .await?;
    Ok(Json(page))
}

/// GET /api/notifications/stats
pub async fn stats(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
) -> Result<Json<Stats>, AppError> {
    let stats = app
        .with_store(move |store| notification::stats(store.conn(), me.id, Utc::now()))
        .await?;
    Ok(Json(stats))
}

/// GET /api/notifications/{id}
pub async fn get_notification(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<Json<Notification>, AppError> {
    let found = app
        .with_store(move |store| notification::get(store.conn(), me.id, id))
        .await?;
    Ok(Json(found))
}

/// PATCH /api/notifications/{id}/read
pub async fn mark_read(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<Json<Notification>, AppError> {
    let updated = app
        .with_store(move |store| notification::mark_read(store.conn(), me.id, id, Utc::now()))
        .await?;
    Ok(Json(updated))
}

/// PATCH /api/notifications/{id}/unread
pub async fn mark_unread(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<Json<Notification>, AppError> {
    let updated = app
        .with_store(move |store| notification::mark_unread(store.conn(), me.id, id))
        .await?;
    Ok(Json(updated))
}

/// PATCH /api/notifications/mark_all_read
pub async fn mark_all_read(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
) -> Result<Json<serde_json::Value>, AppError> {
    let count = app
        .with_store(move |store| notification::mark_all_read(store.conn(), me.id, Utc::now()))
        .await?;
    Ok(Json(json!({
        "message": "All notifications marked as read",
        "updated_count": count,
    })))
}

#[derive(Deserialize)]
pub struct IdsBody {
    #[serde(default)]
    pub notification_ids: Vec<i64>,
}

/// PATCH /api/notifications/bulk_mark_read
pub async fn bulk_mark_read(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    Json(body): Json<IdsBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    if body.notification_ids.is_empty() {
        return Err(AppError::bad_request("notification_ids can't be empty"));
    }
    let count = app
        .with_store(move |store| {
            notification::bulk_mark_read(store.conn(), me.id, &body.notification_ids, Utc::now())
        })
        .await?;
    Ok(Json(json!({
        "message": format!("{count} notifications marked as read"),
        "updated_count": count,
    })))
}

/// DELETE /api/notifications/bulk_delete
pub async fn bulk_delete(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    Json(body): Json<IdsBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    if body.notification_ids.is_empty() {
        return Err(AppError::bad_request("notification_ids can't be empty"));
    }
    let count = app
        .with_store(move |store| {
            notification::bulk_delete(store.conn(), me.id, &body.notification_ids)
        })
        .await?;
    Ok(Json(json!({
        "message": format!("{count} notifications deleted"),
        "deleted_count": count,
    })))
}

/// DELETE /api/notifications/{id}
pub async fn delete_notification(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    app.with_store(move |store| notification::delete(store.conn(), me.id, id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/notifications/settings: defaults until the user saves some.
pub async fn get_settings(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
) -> Result<Json<serde_json::Value>, AppError> {
    let settings = app
        .with_store(move |store| notification::settings(store.conn(), me.id))
        .await?;
    Ok(Json(json!({ "settings": settings })))
}

#[derive(Deserialize)]
pub struct SettingsBody {
    pub settings: serde_json::Value,
}

/// PUT /api/notifications/settings
pub async fn update_settings(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    Json(body): Json<SettingsBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let settings = app
        .with_store(move |store| {
            notification::update_settings(store.conn(), me.id, body.settings, Utc::now())
        })
        .await?;
    Ok(Json(json!({
        "message": "Notification settings updated",
        "settings": settings,
    })))
}

fn sent(count: usize) -> Json<serde_json::Value> {
    Json(json!({
        "message": "Notifications sent",
        "notifications_sent": count,
    }))
}

#[derive(Deserialize)]
pub struct TenderTrigger {
    pub tender_id: i64,
    #[serde(flatten)]
    pub activity: TenderActivity,
}

/// POST /api/notifications/trigger/tender
pub async fn trigger_tender(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    Json(body): Json<TenderTrigger>,
) -> Result<Json<serde_json::Value>, AppError> {
    let count = app
        .with_store(move |store| {
            let tx = store.transaction()?;
            tender::get_for(&tx, &me, body.tender_id)?;
            let count = fanout::trigger_tender(&tx, body.tender_id, &body.activity, &me, Utc::now())?;
            tx.commit()?;
            Ok(count)
        })
        .await?;
    Ok(sent(count))
}

#[derive(Deserialize)]
pub struct ProjectTrigger {
    pub project_id: i64,
    #[serde(flatten)]
    pub activity: ProjectActivity,
}

/// POST /api/notifications/trigger/project
pub async fn trigger_project(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    Json(body): Json<ProjectTrigger>,
) -> Result<Json<serde_json::Value>, AppError> {
    let config = app.config.clone();
    let count = app
        .with_store(move |store| {
            let tx = store.transaction()?;
            project::get_visible(&tx, &me, body.project_id)?;
            let count = fanout::trigger_project(
                &tx,
                body.project_id,
                &body.activity,
                &me,
                &config.notifications,
                Utc::now(),
            )?;
            tx.commit()?;
            Ok(count)
        })
        .await?;
    Ok(sent(count))
}

#[derive(Deserialize)]
pub struct TaskTrigger {
    pub task_id: i64,
    #[serde(flatten)]
    pub activity: TaskActivity,
}

/// POST /api/notifications/trigger/task
pub async fn trigger_task(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    Json(body): Json<TaskTrigger>,
) -> Result<Json<serde_json::Value>, AppError> {
    let count = app
        .with_store(move |store| {
            let tx = store.transaction()?;
            task::get_for(&tx, &me, body.task_id)?;
            let count = fanout::trigger_task(&tx, body.task_id, &body.activity, &me, Utc::now())?;
            tx.commit()?;
            Ok(count)
        })
        .await?;
    Ok(sent(count))
}

/// POST /api/notifications/system: broadcast to every user or a list (admin only).
pub async fn system_broadcast(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    Json(body): Json<Broadcast>,
) -> Result<Json<serde_json::Value>, AppError> {
    require_admin(&me)?;
    let count = app
        .with_store(move |store| {
            let tx = store.transaction()?;
            let count = fanout::broadcast(&tx, &body, Utc::now())?;
            tx.commit()?;
            Ok(count)
        })
        .await?;
    tracing::info!(admin = me.id, recipients = count, "system notification broadcast");
    Ok(sent(count))
}
