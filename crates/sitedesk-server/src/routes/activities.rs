use axum::extract::{Query, State};
use axum::{Extension, Json};
use chrono::NaiveDate;
use serde::Deserialize;
use sitedesk_core::activity::{self, Activity, ActivityFilter};

use crate::auth::{require_admin, CurrentUser};
use crate::error::AppError;
use crate::state::AppState;

#[derive(Deserialize, Default)]
pub struct ActivityQuery {
    #[serde(rename = "type")]
    pub target_type: Option<String>,
    pub actor_id: Option<i64>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub sort_direction: Option<String>,
    pub limit: Option<usize>,
}

impl From<ActivityQuery> for ActivityFilter {
    fn from(q: ActivityQuery) -> Self {
        ActivityFilter {
            target_type: q.target_type,
            actor_id: q.actor_id,
            start_date: q.start_date,
            end_date: q.end_date,
            ascending: q
                .sort_direction
                .is_some_and(|d| d.eq_ignore_ascii_case("asc")),
            limit: q.limit,
        }
    }
}

/// GET /api/activities: audit log (admin only).
pub async fn list_activities(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    Query(query): Query<ActivityQuery>,
) -> Result<Json<Vec<Activity>>, AppError> {
    require_admin(&me)?;
    let filter = ActivityFilter::from(query);
    let rows = app
        .with_store(move |store| activity::list(store.conn(), &filter))
        .await?;
    Ok(Json(rows))
}
