use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::Utc;
use serde::Deserialize;
use sitedesk_core::custom_field::{self, CustomField, CustomFieldInput};
use sitedesk_core::types::EntityType;

use crate::auth::{require_admin, CurrentUser};
use crate::error::AppError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ListQuery {
    pub entity_type: Option<EntityType>,
}

/// GET /api/custom_fields?entity_type=task
pub async fn list_fields(
    State(app): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<CustomField>>, AppError> {
    let fields = app
        .with_store(move |store| custom_field::list(store.conn(), query.entity_type))
        .await?;
    Ok(Json(fields))
}

/// GET /api/custom_fields/{id}
pub async fn get_field(
    State(app): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<CustomField>, AppError> {
    let field = app
        .with_store(move |store| custom_field::get(store.conn(), id))
        .await?;
    Ok(Json(field))
}

/// POST /api/custom_fields (admin only)
pub async fn create_field(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    Json(body): Json<CustomFieldInput>,
) -> Result<(StatusCode, Json<CustomField>), AppError> {
    require_admin(&me)?;
    let field = app
        .with_store(move |store| custom_field::create(store.conn(), &body, Utc::now()))
        .await?;
    Ok((StatusCode::CREATED, Json(field)))
}

/// PUT /api/custom_fields/{id} (admin only)
pub async fn update_field(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(body): Json<CustomFieldInput>,
) -> Result<Json<CustomField>, AppError> {
    require_admin(&me)?;
    let field = app
        .with_store(move |store| custom_field::update(store.conn(), id, &body, Utc::now()))
        .await?;
    Ok(Json(field))
}

/// DELETE /api/custom_fields/{id} (admin only)
pub async fn delete_field(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    require_admin(&me)?;
    app.with_store(move |store| custom_field::delete(store.conn(), id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
