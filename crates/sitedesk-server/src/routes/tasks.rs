use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::Utc;
use sitedesk_core::task::{self, TaskInput, TaskView};
use sitedesk_core::types::TaskStatus;
use sitedesk_core::{activity, fanout, SiteError};

use crate::auth::CurrentUser;
use crate::error::AppError;
use crate::state::AppState;

/// GET /api/tasks: tasks the caller manages, owns or is assigned to.
pub async fn list_tasks(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
) -> Result<Json<Vec<TaskView>>, AppError> {
    let today = Utc::now().date_naive();
    let tasks = app
        .with_store(move |store| task::list_for(store.conn(), &me))
        .await?;
    Ok(Json(tasks.iter().map(|t| t.view(today)).collect()))
}

/// GET /api/tasks/{id}
pub async fn get_task(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<Json<TaskView>, AppError> {
    let found = app
        .with_store(move |store| task::get_for(store.conn(), &me, id))
        .await?;
    Ok(Json(found.view(Utc::now().date_naive())))
}

/// POST /api/tasks: the caller manages the new task; assignees are told.
pub async fn create_task(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    Json(body): Json<TaskInput>,
) -> Result<(StatusCode, Json<TaskView>), AppError> {
    let now = Utc::now();
    let created = app
        .with_store(move |store| {
            let tx = store.transaction()?;
            let created = task::create(&tx, &me, &body, now)?;
            fanout::task_created(&tx, &created, &me, now)?;
            if !created.assignee_ids.is_empty() {
                fanout::task_assigned(&tx, &created, &created.assignee_ids, &me, now)?;
            }
            activity::log(&tx, &me, "created", "Task", created.id, now)?;
            tx.commit()?;
            Ok(created)
        })
        .await?;
    Ok((StatusCode::CREATED, Json(created.view(now.date_naive()))))
}

/// PUT /api/tasks/{id}: status changes and new assignees notify stakeholders.
pub async fn update_task(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(body): Json<TaskInput>,
) -> Result<Json<TaskView>, AppError> {
    let now = Utc::now();
    let updated = app
        .with_store(move |store| {
            let tx = store.transaction()?;
            task::get_for(&tx, &me, id)?;
            let change = task::update(&tx, id, &body, now)?;
            match change.status_changed() {
                Some((_, TaskStatus::Completed)) => {
                    fanout::task_completed(&tx, &change.task, &me, now)?;
                }
                Some((old, new)) => {
                    fanout::task_status_changed(&tx, &change.task, old, new, &me, now)?;
                }
                None => {}
            }
            if !change.new_assignees.is_empty() {
                fanout::task_assigned(&tx, &change.task, &change.new_assignees, &me, now)?;
            }
            activity::log(&tx, &me, "updated", "Task", id, now)?;
            tx.commit()?;
            Ok(change.task)
        })
        .await?;
    Ok(Json(updated.view(now.date_naive())))
}

/// DELETE /api/tasks/{id}: manager, owner or admin.
pub async fn delete_task(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    app.with_store(move |store| {
        let now = Utc::now();
        let tx = store.transaction()?;
        let existing = task::get_for(&tx, &me, id)?;
        if !me.is_admin() && existing.project_manager_id != me.id && existing.user_id != Some(me.id) {
            return Err(SiteError::Forbidden(
                "Only the task's manager or owner can delete it".into(),
            ));
        }
        task::delete(&tx, id)?;
        activity::log(&tx, &me, "deleted", "Task", id, now)?;
        tx.commit()?;
        Ok(())
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}
