use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;
use sitedesk_core::project;
use sitedesk_core::tender::{self, Scope, Tender, TenderFilter, TenderInput, TenderView};
use sitedesk_core::types::TenderStatus;
use sitedesk_core::{activity, fanout};

use crate::auth::CurrentUser;
use crate::error::AppError;
use crate::state::AppState;

fn views(tenders: Vec<Tender>, today: NaiveDate) -> Vec<TenderView> {
    tenders.iter().map(|t| t.view(today)).collect()
}

/// List one scope, narrowed to the caller's tenders unless they are an admin.
async fn scoped(
    app: &AppState,
    me: sitedesk_core::user::User,
    scope: Scope,
    filter: TenderFilter,
) -> Result<Vec<TenderView>, AppError> {
    let today = Utc::now().date_naive();
    let tenders = app
        .with_store(move |store| {
            let found = tender::list(store.conn(), scope, &filter)?;
            Ok(found.into_iter().filter(|t| t.involves(&me)).collect())
        })
        .await?;
    Ok(views(tenders, today))
}

/// GET /api/tenders: filters `status`, `priority`, `search`.
pub async fn list_tenders(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    Query(filter): Query<TenderFilter>,
) -> Result<Json<Vec<TenderView>>, AppError> {
    Ok(Json(scoped(&app, me, Scope::All, filter).await?))
}

/// GET /api/tenders/my_tenders: tenders the caller manages or owns.
pub async fn my_tenders(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
) -> Result<Json<Vec<TenderView>>, AppError> {
    let scope = Scope::Mine(me.id);
    Ok(Json(scoped(&app, me, scope, TenderFilter::default()).await?))
}

/// GET /api/tenders/active: deadline today or later.
pub async fn active(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
) -> Result<Json<Vec<TenderView>>, AppError> {
    let scope = Scope::Active(Utc::now().date_naive());
    Ok(Json(scoped(&app, me, scope, TenderFilter::default()).await?))
}

/// GET /api/tenders/urgent: deadline within three days.
pub async fn urgent(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
) -> Result<Json<Vec<TenderView>>, AppError> {
    let scope = Scope::Urgent(Utc::now().date_naive());
    Ok(Json(scoped(&app, me, scope, TenderFilter::default()).await?))
}

/// GET /api/tenders/drafts
pub async fn drafts(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
) -> Result<Json<Vec<TenderView>>, AppError> {
    Ok(Json(scoped(&app, me, Scope::Drafts, TenderFilter::default()).await?))
}

/// GET /api/tenders/{id}
pub async fn get_tender(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<Json<TenderView>, AppError> {
    let found = app
        .with_store(move |store| tender::get_for(store.conn(), &me, id))
        .await?;
    Ok(Json(found.view(Utc::now().date_naive())))
}

/// GET /api/tenders/{id}/details: the tender, its project and who hears about it.
pub async fn details(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    let today = Utc::now().date_naive();
    let (found, linked, stakeholders) = app
        .with_store(move |store| {
            let conn = store.conn();
            let found = tender::get_for(conn, &me, id)?;
            let linked = found.project_id.map(|pid| project::get(conn, pid)).transpose()?;
            let stakeholders = fanout::tender_stakeholders(conn, &found)?;
            Ok((found, linked, stakeholders))
        })
        .await?;
    Ok(Json(json!({
        "tender": found.view(today),
        "project": linked.map(|p| json!({ "id": p.id, "title": p.title, "status": p.status })),
        "stakeholders": stakeholders
            .iter()
            .map(|u| json!({ "id": u.id, "name": u.display_name(), "role": u.role }))
            .collect::<Vec<_>>(),
    })))
}

/// POST /api/tenders: the caller owns the new tender.
pub async fn create_tender(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    Json(body): Json<TenderInput>,
) -> Result<(StatusCode, Json<TenderView>), AppError> {
    let now = Utc::now();
    let today = now.date_naive();
    let created = app
        .with_store(move |store| {
            let tx = store.transaction()?;
            let created = tender::create(&tx, &me, &body, today, now)?;
            fanout::tender_created(&tx, &created, &me, today, now)?;
            activity::log(&tx, &me, "created", "Tender", created.id, now)?;
            tx.commit()?;
            Ok(created)
        })
        .await?;
    Ok((StatusCode::CREATED, Json(created.view(today))))
}

/// PUT /api/tenders/{id}
pub async fn update_tender(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(body): Json<TenderInput>,
) -> Result<Json<TenderView>, AppError> {
    let now = Utc::now();
    let today = now.date_naive();
    let updated = app
        .with_store(move |store| {
            let tx = store.transaction()?;
            tender::get_for(&tx, &me, id)?;
            let updated = tender::update(&tx, id, &body, today, now)?;
            fanout::tender_updated(&tx, &updated, &me, now)?;
            activity::log(&tx, &me, "updated", "Tender", id, now)?;
            tx.commit()?;
            Ok(updated)
        })
        .await?;
    Ok(Json(updated.view(today)))
}

#[derive(Deserialize)]
pub struct StatusBody {
    pub status: TenderStatus,
}

/// PATCH /api/tenders/{id}/status
pub async fn update_status(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(body): Json<StatusBody>,
) -> Result<Json<TenderView>, AppError> {
    let now = Utc::now();
    let updated = app
        .with_store(move |store| {
            let tx = store.transaction()?;
            tender::get_for(&tx, &me, id)?;
            let (updated, old) = tender::update_status(&tx, id, body.status, now)?;
            if old != updated.status {
                fanout::tender_status_changed(&tx, &updated, old, updated.status, &me, now)?;
            }
            activity::log(&tx, &me, "status_changed", "Tender", id, now)?;
            tx.commit()?;
            Ok(updated)
        })
        .await?;
    Ok(Json(updated.view(now.date_naive())))
}

#[derive(Deserialize, Default)]
pub struct ConvertBody {
    pub supervisor_id: Option<i64>,
}

/// POST /api/tenders/{id}/convert: open a project from the tender.
pub async fn convert(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(body): Json<ConvertBody>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let now = Utc::now();
    let today = now.date_naive();
    let (converted, created) = app
        .with_store(move |store| {
            let tx = store.transaction()?;
            tender::get_for(&tx, &me, id)?;
            let (converted, created) =
                tender::convert_to_project(&tx, id, body.supervisor_id, &me, today, now)?;
            fanout::tender_converted(&tx, &converted, &created, &me, now)?;
            activity::log(&tx, &me, "converted", "Tender", id, now)?;
            activity::log(&tx, &me, "created", "Project", created.id, now)?;
            tx.commit()?;
            Ok((converted, created))
        })
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Tender converted to project",
            "tender": converted.view(today),
            "project": created,
        })),
    ))
}

/// DELETE /api/tenders/{id}
pub async fn delete_tender(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    app.with_store(move |store| {
        let now = Utc::now();
        let tx = store.transaction()?;
        tender::get_for(&tx, &me, id)?;
        tender::delete(&tx, id)?;
        activity::log(&tx, &me, "deleted", "Tender", id, now)?;
        tx.commit()?;
        Ok(())
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}
