use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sitedesk_core::event;
use sitedesk_core::fanout;
use sitedesk_core::milestone::{self, Milestone, MilestoneInput};
use sitedesk_core::progress::{self, ProgressReport, ProgressUpdate};
use sitedesk_core::project::{self, Project, ProjectInput, TeamMember, TimelineEntry};
use sitedesk_core::task;
use sitedesk_core::user::User;
use sitedesk_core::{activity, SiteError};

use crate::auth::CurrentUser;
use crate::error::AppError;
use crate::state::AppState;

/// A project with its schedule figures for today.
#[derive(Serialize)]
pub struct ProjectBody {
    #[serde(flatten)]
    pub project: Project,
    pub overdue: bool,
    pub urgent: bool,
    pub progress: ProgressReport,
}

impl ProjectBody {
    fn new(project: Project, today: NaiveDate) -> Self {
        Self {
            overdue: project.is_overdue(today),
            urgent: project.is_urgent(today),
            progress: project.report(today),
            project,
        }
    }
}

/// Only admins and the project's manager may change a project.
fn ensure_manager(user: &User, project: &Project) -> sitedesk_core::Result<()> {
    if user.is_admin() || project.project_manager_id == user.id {
        Ok(())
    } else {
        Err(SiteError::Forbidden(
            "Only the project manager can change this project".into(),
        ))
    }
}

/// GET /api/projects: projects visible to the caller.
pub async fn list_projects(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
) -> Result<Json<Vec<ProjectBody>>, AppError> {
    let today = Utc::now().date_naive();
    let projects = app
        .with_store(move |store| project::list_visible(store.conn(), &me))
        .await?;
    Ok(Json(
        projects
            .into_iter()
            .map(|p| ProjectBody::new(p, today))
            .collect(),
    ))
}

/// POST /api/projects: create a project managed by the caller.
pub async fn create_project(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    Json(body): Json<ProjectInput>,
) -> Result<(StatusCode, Json<ProjectBody>), AppError> {
    let now = Utc::now();
    let created = app
        .with_store(move |store| {
            let tx = store.transaction()?;
            let created = project::create(&tx, me.id, &body, now.date_naive(), now)?;
            fanout::project_created(&tx, &created, &me, now)?;
            activity::log(&tx, &me, "created", "Project", created.id, now)?;
            tx.commit()?;
            Ok(created)
        })
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ProjectBody::new(created, now.date_naive())),
    ))
}

/// GET /api/projects/{id}
pub async fn get_project(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<Json<ProjectBody>, AppError> {
    let project = app
        .with_store(move |store| project::get_visible(store.conn(), &me, id))
        .await?;
    Ok(Json(ProjectBody::new(project, Utc::now().date_naive())))
}

/// PUT /api/projects/{id}: a status change notifies stakeholders.
pub async fn update_project(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(body): Json<ProjectInput>,
) -> Result<Json<ProjectBody>, AppError> {
    let now = Utc::now();
    let updated = app
        .with_store(move |store| {
            let tx = store.transaction()?;
            let existing = project::get_visible(&tx, &me, id)?;
            ensure_manager(&me, &existing)?;
            let change = project::update(&tx, id, &body, now.date_naive(), now)?;
            if let Some((old, new)) = change.status_changed() {
                fanout::project_status_changed(&tx, &change.project, old, new, &me, now)?;
            }
            activity::log(&tx, &me, "updated", "Project", id, now)?;
            tx.commit()?;
            Ok(change.project)
        })
        .await?;
    Ok(Json(ProjectBody::new(updated, now.date_naive())))
}

/// DELETE /api/projects/{id}
pub async fn delete_project(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    app.with_store(move |store| {
        let now = Utc::now();
        let tx = store.transaction()?;
        let existing = project::get_visible(&tx, &me, id)?;
        ensure_manager(&me, &existing)?;
        project::delete(&tx, id)?;
        activity::log(&tx, &me, "deleted", "Project", id, now)?;
        tx.commit()?;
        Ok(())
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/projects/{id}/progress: timeline figures for one project.
pub async fn get_progress(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    let project = app
        .with_store(move |store| project::get_visible(store.conn(), &me, id))
        .await?;
    let report = project.report(Utc::now().date_naive());
    let warning = (report.progress_variance.abs() > progress::WARNING_THRESHOLD)
        .then_some(progress::DEVIATION_WARNING);
    Ok(Json(json!({
        "project": report,
        "progress_notes": project.progress_notes,
        "last_progress_update": project.last_progress_update,
        "warning": warning,
    })))
}

#[derive(Deserialize)]
pub struct ProgressBody {
    pub progress_percentage: f64,
    pub notes: Option<String>,
}

/// PUT /api/projects/{id}/progress: record a manual progress update.
pub async fn update_progress(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(body): Json<ProgressBody>,
) -> Result<Json<progress::ProgressOutcome>, AppError> {
    let config = app.config.clone();
    let outcome = app
        .with_store(move |store| {
            progress::update_progress(
                store,
                id,
                body.progress_percentage,
                body.notes.as_deref(),
                &me,
                &config.notifications,
                Utc::now(),
            )
        })
        .await?;
    tracing::info!(
        project_id = id,
        progress = outcome.project.progress_percentage,
        notified = outcome.notified,
        "progress updated"
    );
    Ok(Json(outcome))
}

/// GET /api/projects/{id}/progress_history: newest first.
pub async fn progress_history(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<ProgressUpdate>>, AppError> {
    let history = app
        .with_store(move |store| {
            project::get_visible(store.conn(), &me, id)?;
            progress::history(store.conn(), id)
        })
        .await?;
    Ok(Json(history))
}

/// GET /api/projects/progress_summary: schedule counts over the caller's projects.
pub async fn progress_summary(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
) -> Result<Json<progress::ProgressSummary>, AppError> {
    let projects = app
        .with_store(move |store| project::list_visible(store.conn(), &me))
        .await?;
    Ok(Json(progress::summarize(&projects, Utc::now().date_naive())))
}

/// GET /api/projects/chart_data: `[["YYYY-MM", count], ...]`.
pub async fn chart_data(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
) -> Result<Json<Vec<(String, i64)>>, AppError> {
    let data = app
        .with_store(move |store| project::chart_data(store.conn(), &me))
        .await?;
    Ok(Json(data))
}

/// GET /api/projects/{id}/team
pub async fn team(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<TeamMember>>, AppError> {
    let members = app
        .with_store(move |store| {
            let project = project::get_visible(store.conn(), &me, id)?;
            project::team(store.conn(), &project)
        })
        .await?;
    Ok(Json(members))
}

/// GET /api/projects/{id}/timeline: milestones and events by date.
pub async fn timeline(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<TimelineEntry>>, AppError> {
    let entries = app
        .with_store(move |store| {
            project::get_visible(store.conn(), &me, id)?;
            project::timeline(store.conn(), id)
        })
        .await?;
    Ok(Json(entries))
}

/// GET /api/projects/{id}/tasks
pub async fn project_tasks(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<task::TaskView>>, AppError> {
    let today = Utc::now().date_naive();
    let tasks = app
        .with_store(move |store| {
            project::get_visible(store.conn(), &me, id)?;
            task::for_project(store.conn(), id)
        })
        .await?;
    Ok(Json(tasks.iter().map(|t| t.view(today)).collect()))
}

/// GET /api/projects/{id}/events/upcoming
pub async fn upcoming_events(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<event::EventView>>, AppError> {
    let today = Utc::now().date_naive();
    let events = app
        .with_store(move |store| {
            project::get_visible(store.conn(), &me, id)?;
            event::upcoming_for_project(store.conn(), id, today)
        })
        .await?;
    Ok(Json(events.iter().map(|e| e.view(today)).collect()))
}

/// GET /api/projects/{id}/milestones
pub async fn list_milestones(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Milestone>>, AppError> {
    let milestones = app
        .with_store(move |store| {
            project::get_visible(store.conn(), &me, id)?;
            milestone::list(store.conn(), id)
        })
        .await?;
    Ok(Json(milestones))
}

/// POST /api/projects/{id}/milestones
pub async fn create_milestone(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(body): Json<MilestoneInput>,
) -> Result<(StatusCode, Json<Milestone>), AppError> {
    let created = app
        .with_store(move |store| {
            let now = Utc::now();
            let tx = store.transaction()?;
            let existing = project::get_visible(&tx, &me, id)?;
            ensure_manager(&me, &existing)?;
            let created = milestone::create(&tx, id, &body, now)?;
            activity::log(&tx, &me, "milestone_created", "Project", id, now)?;
            tx.commit()?;
            Ok(created)
        })
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// POST /api/projects/{id}/milestones/{milestone_id}/reach: stamp it and notify.
pub async fn reach_milestone(
    State(app): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    Path((id, milestone_id)): Path<(i64, i64)>,
) -> Result<Json<Milestone>, AppError> {
    let reached = app
        .with_store(move |store| {
            let now = Utc::now();
            let tx = store.transaction()?;
            let existing = project::get_visible(&tx, &me, id)?;
            ensure_manager(&me, &existing)?;
            if milestone::get(&tx, milestone_id)?.project_id != id {
                return Err(SiteError::not_found("milestone", milestone_id));
            }
            let reached = milestone::reach(&tx, milestone_id, now.date_naive(), now)?;
            fanout::project_milestone_reached(&tx, &existing, &reached.name, &me, now)?;
            activity::log(&tx, &me, "milestone_reached", "Project", id, now)?;
            tx.commit()?;
            Ok(reached)
        })
        .await?;
    Ok(Json(reached))
}
