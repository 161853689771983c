use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::Utc;
use sitedesk_core::activity;
use sitedesk_core::project::{self, Project};
use sitedesk_core::supervisor::{self, Performance, SupervisorInput, SupervisorSummary, Workload};

use crate::auth::{require_admin, CurrentUser};
use crate::error::AppError;
use crate::state::AppState;

/// GET /api/supervisors: with project counts and current project titles.
pub async fn list_supervisors(
    State(app): State<AppState>,
) -> Result<Json<Vec<SupervisorSummary>>, AppError> {
    let summaries = app
        .with_store(|store| {
            let conn = store.conn();
            supervisor::list(conn)?
                .into_iter()
                .map(|s| supervisor::summarize(conn, s))
                .collect()
        })
        .await?;
    Ok(Json(summaries))
}

/// GET /api/supervisors/{id}
pub async fn get_supervisor(
    State(app): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<SupervisorSummary>, AppError> {
    let summary = app
        .with_store(move |store| {
            let conn = store.conn();
            supervisor::summarize(conn, supervisor::get(conn, id)?)
        })
        .await?;
    Ok(Json(summary))
}

/// POST /api/supervisors
pub async fn create_supervisor(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    Json(body): Json<SupervisorInput>,
) -> Result<(StatusCode, Json<SupervisorSummary>), AppError> {
    let summary = app
        .with_store(move |store| {
            let now = Utc::now();
            let tx = store.transaction()?;
            let created = supervisor::create(&tx, &body, now)?;
            activity::log(&tx, &me, "created", "Supervisor", created.id, now)?;
            let summary = supervisor::summarize(&tx, created)?;
            tx.commit()?;
            Ok(summary)
        })
        .await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

/// PUT /api/supervisors/{id}
pub async fn update_supervisor(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(body): Json<SupervisorInput>,
) -> Result<Json<SupervisorSummary>, AppError> {
    let summary = app
        .with_store(move |store| {
            let now = Utc::now();
            let tx = store.transaction()?;
            let updated = supervisor::update(&tx, id, &body, now)?;
            activity::log(&tx, &me, "updated", "Supervisor", id, now)?;
            let summary = supervisor::summarize(&tx, updated)?;
            tx.commit()?;
            Ok(summary)
        })
        .await?;
    Ok(Json(summary))
}

/// DELETE /api/supervisors/{id}: admins only; refused while projects reference it.
pub async fn delete_supervisor(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    require_admin(&me)?;
    app.with_store(move |store| {
        let now = Utc::now();
        let tx = store.transaction()?;
        supervisor::delete(&tx, id)?;
        activity::log(&tx, &me, "deleted", "Supervisor", id, now)?;
        tx.commit()?;
        Ok(())
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/supervisors/workload: project count per supervisor.
pub async fn workload(State(app): State<AppState>) -> Result<Json<Vec<Workload>>, AppError> {
    let rows = app.with_store(|store| supervisor::workload(store.conn())).await?;
    Ok(Json(rows))
}

/// GET /api/supervisors/{id}/projects
pub async fn projects(
    State(app): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Project>>, AppError> {
    let found = app
        .with_store(move |store| {
            supervisor::get(store.conn(), id)?;
            project::for_supervisor(store.conn(), id)
        })
        .await?;
    Ok(Json(found))
}

/// GET /api/supervisors/{id}/performance
pub async fn performance(
    State(app): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Performance>, AppError> {
    let today = Utc::now().date_naive();
    let figures = app
        .with_store(move |store| supervisor::performance(store.conn(), id, today))
        .await?;
    Ok(Json(figures))
}
