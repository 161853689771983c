use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use sitedesk_core::event::{self, Event, EventInput, EventView};
use sitedesk_core::{activity, project};

use crate::auth::CurrentUser;
use crate::error::AppError;
use crate::state::AppState;

fn views(events: Vec<Event>, today: NaiveDate) -> Vec<EventView> {
    events.iter().map(|e| e.view(today)).collect()
}

/// GET /api/events: events on projects visible to the caller.
pub async fn list_events(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
) -> Result<Json<Vec<EventView>>, AppError> {
    let today = Utc::now().date_naive();
    let events = app
        .with_store(move |store| event::list(store.conn(), &me))
        .await?;
    Ok(Json(views(events, today)))
}

/// GET /api/events/my_events: upcoming events on projects the caller manages.
pub async fn my_events(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
) -> Result<Json<Vec<EventView>>, AppError> {
    let today = Utc::now().date_naive();
    let events = app
        .with_store(move |store| event::for_manager(store.conn(), me.id, today, None))
        .await?;
    Ok(Json(views(events, today)))
}

/// GET /api/events/upcoming
pub async fn upcoming(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
) -> Result<Json<Vec<EventView>>, AppError> {
    let today = Utc::now().date_naive();
    let events = app
        .with_store(move |store| event::upcoming(store.conn(), &me, today))
        .await?;
    Ok(Json(views(events, today)))
}

/// GET /api/events/this_week: Monday through Sunday.
pub async fn this_week(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
) -> Result<Json<Vec<EventView>>, AppError> {
    let today = Utc::now().date_naive();
    let events = app
        .with_store(move |store| event::this_week(store.conn(), &me, today))
        .await?;
    Ok(Json(views(events, today)))
}

/// GET /api/events/{id}
pub async fn get_event(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<Json<EventView>, AppError> {
    let found = app
        .with_store(move |store| event::get_for(store.conn(), &me, id))
        .await?;
    Ok(Json(found.view(Utc::now().date_naive())))
}

/// POST /api/events: the project must be visible to the caller.
pub async fn create_event(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    Json(body): Json<EventInput>,
) -> Result<(StatusCode, Json<EventView>), AppError> {
    let now = Utc::now();
    let today = now.date_naive();
    let created = app
        .with_store(move |store| {
            let tx = store.transaction()?;
            if let Some(project_id) = body.project_id {
                project::get_visible(&tx, &me, project_id)?;
            }
            let created = event::create(&tx, &body, today, now)?;
            activity::log(&tx, &me, "created", "Event", created.id, now)?;
            tx.commit()?;
            Ok(created)
        })
        .await?;
    Ok((StatusCode::CREATED, Json(created.view(today))))
}

/// PUT /api/events/{id}
pub async fn update_event(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(body): Json<EventInput>,
) -> Result<Json<EventView>, AppError> {
    let now = Utc::now();
    let today = now.date_naive();
    let updated = app
        .with_store(move |store| {
            let tx = store.transaction()?;
            event::get_for(&tx, &me, id)?;
            if let Some(project_id) = body.project_id {
                project::get_visible(&tx, &me, project_id)?;
            }
            let updated = event::update(&tx, id, &body, today, now)?;
            activity::log(&tx, &me, "updated", "Event", id, now)?;
            tx.commit()?;
            Ok(updated)
        })
        .await?;
    Ok(Json(updated.view(today)))
}

/// DELETE /api/events/{id}
pub async fn delete_event(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    app.with_store(move |store| {
        let now = Utc::now();
        let tx = store.transaction()?;
        event::get_for(&tx, &me, id)?;
        event::delete(&tx, id)?;
        activity::log(&tx, &me, "deleted", "Event", id, now)?;
        tx.commit()?;
        Ok(())
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/events/{id}/complete
pub async fn mark_completed(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<Json<EventView>, AppError> {
    let now = Utc::now();
    let done = app
        .with_store(move |store| {
            let tx = store.transaction()?;
            event::get_for(&tx, &me, id)?;
            let done = event::mark_completed(&tx, id, now)?;
            activity::log(&tx, &me, "completed", "Event", id, now)?;
            tx.commit()?;
            Ok(done)
        })
        .await?;
    Ok(Json(done.view(now.date_naive())))
}

#[derive(Deserialize)]
pub struct RescheduleBody {
    pub date: NaiveDate,
}

/// POST /api/events/{id}/reschedule: move to a new, non-past date.
pub async fn reschedule(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(body): Json<RescheduleBody>,
) -> Result<Json<EventView>, AppError> {
    let now = Utc::now();
    let today = now.date_naive();
    let moved = app
        .with_store(move |store| {
            let tx = store.transaction()?;
            event::get_for(&tx, &me, id)?;
            let moved = event::reschedule(&tx, id, body.date, today, now)?;
            activity::log(&tx, &me, "rescheduled", "Event", id, now)?;
            tx.commit()?;
            Ok(moved)
        })
        .await?;
    Ok(Json(moved.view(today)))
}
