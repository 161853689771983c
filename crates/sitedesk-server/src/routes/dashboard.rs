use axum::extract::State;
use axum::{Extension, Json};
use chrono::Utc;
use sitedesk_core::dashboard::{
    self, Dashboard, EventCard, ProgressRow, ProjectCard, RecentTask, Statistics, TeamMembers,
    TenderCard,
};

use crate::auth::CurrentUser;
use crate::error::AppError;
use crate::state::AppState;

/// GET /api/project_managers/dashboard: every panel in one response.
pub async fn overview(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
) -> Result<Json<Dashboard>, AppError> {
    let today = Utc::now().date_naive();
    let board = app
        .with_store(move |store| dashboard::dashboard(store.conn(), &me, today))
        .await?;
    Ok(Json(board))
}

/// GET /api/project_managers/my_projects
pub async fn my_projects(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
) -> Result<Json<Vec<ProjectCard>>, AppError> {
    let today = Utc::now().date_naive();
    let cards = app
        .with_store(move |store| dashboard::my_projects(store.conn(), &me, today))
        .await?;
    Ok(Json(cards))
}

/// GET /api/project_managers/upcoming_events
pub async fn upcoming_events(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
) -> Result<Json<Vec<EventCard>>, AppError> {
    let today = Utc::now().date_naive();
    let cards = app
        .with_store(move |store| dashboard::upcoming_events(store.conn(), &me, today))
        .await?;
    Ok(Json(cards))
}

/// GET /api/project_managers/my_tenders
pub async fn my_tenders(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
) -> Result<Json<Vec<TenderCard>>, AppError> {
    let today = Utc::now().date_naive();
    let cards = app
        .with_store(move |store| dashboard::my_tenders(store.conn(), &me, today))
        .await?;
    Ok(Json(cards))
}

/// GET /api/project_managers/statistics
pub async fn statistics(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
) -> Result<Json<Statistics>, AppError> {
    let today = Utc::now().date_naive();
    let stats = app
        .with_store(move |store| dashboard::statistics(store.conn(), &me, today))
        .await?;
    Ok(Json(stats))
}

/// GET /api/project_managers/team_members
pub async fn team_members(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
) -> Result<Json<TeamMembers>, AppError> {
    let team = app
        .with_store(move |store| dashboard::team_members(store.conn(), &me))
        .await?;
    Ok(Json(team))
}

/// GET /api/project_managers/projects_progress
pub async fn projects_progress(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
) -> Result<Json<Vec<ProgressRow>>, AppError> {
    let today = Utc::now().date_naive();
    let rows = app
        .with_store(move |store| dashboard::projects_progress(store.conn(), &me, today))
        .await?;
    Ok(Json(rows))
}

/// GET /api/project_managers/recent_tasks
pub async fn recent_tasks(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
) -> Result<Json<Vec<RecentTask>>, AppError> {
    let tasks = app
        .with_store(move |store| dashboard::recent_tasks(store.conn(), &me))
        .await?;
    Ok(Json(tasks))
}
