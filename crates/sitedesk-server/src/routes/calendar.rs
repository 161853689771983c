use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;
use sitedesk_core::calendar;

use crate::auth::CurrentUser;
use crate::error::AppError;
use crate::state::AppState;

#[derive(Deserialize, Default)]
pub struct RangeQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

async fn range(
    app: &AppState,
    me: sitedesk_core::user::User,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Json<serde_json::Value>, AppError> {
    if to < from {
        return Err(AppError::bad_request("end_date must not be before start_date"));
    }
    let today = Utc::now().date_naive();
    let entries = app
        .with_store(move |store| calendar::entries(store.conn(), &me, from, to, today))
        .await?;
    Ok(Json(json!({
        "events": entries,
        "start_date": from,
        "end_date": to,
        "total": entries.len(),
    })))
}

/// GET /api/calendar/events: defaults to the current month.
pub async fn events(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    Query(query): Query<RangeQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let (first, last) = calendar::month_bounds(Utc::now().date_naive());
    range(
        &app,
        me,
        query.start_date.unwrap_or(first),
        query.end_date.unwrap_or(last),
    )
    .await
}

/// GET /api/calendar/month/{year}/{month}
pub async fn month(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    Path((year, month)): Path<(i32, u32)>,
) -> Result<Json<serde_json::Value>, AppError> {
    let (first, last) = calendar::month_range(year, month)?;
    range(&app, me, first, last).await
}
