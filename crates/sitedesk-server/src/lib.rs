pub mod auth;
pub mod error;
pub mod routes;
pub mod state;

use axum::http::{HeaderName, HeaderValue, Request};
use axum::middleware;
use axum::routing::{delete, get, patch, post, put};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::AppState;

fn cors_layer(origins: &[String]) -> CorsLayer {
    let exposed: Vec<HeaderName> = auth::EXPOSED_HEADERS
        .iter()
        .map(|h| HeaderName::from_static(h))
        .collect();
    let layer = CorsLayer::new()
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(exposed);
    if origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "ignoring unparsable CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(allowed)
}

/// Build the axum Router with all API routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(app_state: AppState) -> Router {
    let public = Router::new()
        .route("/health", get(routes::health::health))
        .route("/status", get(routes::health::status))
        .route("/api/auth/register", post(routes::auth::register))
        .route("/api/auth/confirm", post(routes::auth::confirm))
        .route("/api/auth/login", post(routes::auth::login))
        .route("/api/auth/verify_otp", post(routes::auth::verify_otp));

    let protected = Router::new()
        // Session
        .route("/api/auth/logout", delete(routes::auth::logout))
        .route(
            "/api/auth/me",
            get(routes::auth::me).patch(routes::auth::update_me),
        )
        // Users
        .route("/api/users", get(routes::users::list_users))
        .route("/api/users/{id}/role", put(routes::users::set_role))
        // Projects
        .route(
            "/api/projects",
            get(routes::projects::list_projects).post(routes::projects::create_project),
        )
        .route(
            "/api/projects/progress_summary",
            get(routes::projects::progress_summary),
        )
        .route("/api/projects/chart_data", get(routes::projects::chart_data))
        .route(
            "/api/projects/{id}",
            get(routes::projects::get_project)
                .put(routes::projects::update_project)
                .delete(routes::projects::delete_project),
        )
        .route(
            "/api/projects/{id}/progress",
            get(routes::projects::get_progress).put(routes::projects::update_progress),
        )
        .route(
            "/api/projects/{id}/progress_history",
            get(routes::projects::progress_history),
        )
        .route("/api/projects/{id}/team", get(routes::projects::team))
        .route("/api/projects/{id}/timeline", get(routes::projects::timeline))
        .route("/api/projects/{id}/tasks", get(routes::projects::project_tasks))
        .route(
            "/api/projects/{id}/events/upcoming",
            get(routes::projects::upcoming_events),
        )
        .route(
            "/api/projects/{id}/milestones",
            get(routes::projects::list_milestones).post(routes::projects::create_milestone),
        )
        .route(
            "/api/projects/{id}/milestones/{milestone_id}/reach",
            post(routes::projects::reach_milestone),
        )
        // Project manager dashboard
        .route(
            "/api/project_managers/dashboard",
            get(routes::dashboard::overview),
        )
        .route(
            "/api/project_managers/my_projects",
            get(routes::dashboard::my_projects),
        )
        .route(
            "/api/project_managers/upcoming_events",
            get(routes::dashboard::upcoming_events),
        )
        .route(
            "/api/project_managers/my_tenders",
            get(routes::dashboard::my_tenders),
        )
        .route(
            "/api/project_managers/statistics",
            get(routes::dashboard::statistics),
        )
        .route(
            "/api/project_managers/team_members",
            get(routes::dashboard::team_members),
        )
        .route(
            "/api/project_managers/projects_progress",
            get(routes::dashboard::projects_progress),
        )
        .route(
            "/api/project_managers/recent_tasks",
            get(routes::dashboard::recent_tasks),
        )
        // Tasks
        .route(
            "/api/tasks",
            get(routes::tasks::list_tasks).post(routes::tasks::create_task),
        )
        .route(
            "/api/tasks/{id}",
            get(routes::tasks::get_task)
                .put(routes::tasks::update_task)
                .delete(routes::tasks::delete_task),
        )
        // Tenders
        .route(
            "/api/tenders",
            get(routes::tenders::list_tenders).post(routes::tenders::create_tender),
        )
        .route("/api/tenders/my_tenders", get(routes::tenders::my_tenders))
        .route("/api/tenders/active", get(routes::tenders::active))
        .route("/api/tenders/urgent", get(routes::tenders::urgent))
        .route("/api/tenders/drafts", get(routes::tenders::drafts))
        .route(
            "/api/tenders/{id}",
            get(routes::tenders::get_tender)
                .put(routes::tenders::update_tender)
                .delete(routes::tenders::delete_tender),
        )
        .route("/api/tenders/{id}/details", get(routes::tenders::details))
        .route("/api/tenders/{id}/status", patch(routes::tenders::update_status))
        .route("/api/tenders/{id}/convert", post(routes::tenders::convert))
        // Events
        .route(
            "/api/events",
            get(routes::events::list_events).post(routes::events::create_event),
        )
        .route("/api/events/my_events", get(routes::events::my_events))
        .route("/api/events/upcoming", get(routes::events::upcoming))
        .route("/api/events/this_week", get(routes::events::this_week))
        .route(
            "/api/events/{id}",
            get(routes::events::get_event)
                .put(routes::events::update_event)
                .delete(routes::events::delete_event),
        )
        .route("/api/events/{id}/complete", post(routes::events::mark_completed))
        .route("/api/events/{id}/reschedule", post(routes::events::reschedule))
        // Supervisors
        .route(
            "/api/supervisors",
            get(routes::supervisors::list_supervisors).post(routes::supervisors::create_supervisor),
        )
        .route("/api/supervisors/workload", get(routes::supervisors::workload))
        .route(
            "/api/supervisors/{id}",
            get(routes::supervisors::get_supervisor)
                .put(routes::supervisors::update_supervisor)
                .delete(routes::supervisors::delete_supervisor),
        )
        .route(
            "/api/supervisors/{id}/projects",
            get(routes::supervisors::projects),
        )
        .route(
            "/api/supervisors/{id}/performance",
            get(routes::supervisors::performance),
        )
        // Site managers
        .route(
            "/api/site_managers",
            get(routes::site_managers::list_site_managers)
                .post(routes::site_managers::create_site_manager),
        )
        .route(
            "/api/site_managers/{id}",
            get(routes::site_managers::get_site_manager)
                .put(routes::site_managers::update_site_manager)
                .delete(routes::site_managers::delete_site_manager),
        )
        // Custom fields
        .route(
            "/api/custom_fields",
            get(routes::custom_fields::list_fields).post(routes::custom_fields::create_field),
        )
        .route(
            "/api/custom_fields/{id}",
            get(routes::custom_fields::get_field)
                .put(routes::custom_fields::update_field)
                .delete(routes::custom_fields::delete_field),
        )
        // Activities
        .route("/api/activities", get(routes::activities::list_activities))
        // Notifications
        .route(
            "/api/notifications",
            get(routes::notifications::list_notifications),
        )
        .route("/api/notifications/stats", get(routes::notifications::stats))
        .route(
            "/api/notifications/mark_all_read",
            patch(routes::notifications::mark_all_read),
        )
        .route(
            "/api/notifications/bulk_mark_read",
            patch(routes::notifications::bulk_mark_read),
        )
        .route(
            "/api/notifications/bulk_delete",
            delete(routes::notifications::bulk_delete),
        )
        .route(
            "/api/notifications/settings",
            get(routes::notifications::get_settings).put(routes::notifications::update_settings),
        )
        .route(
            "/api/notifications/trigger/tender",
            post(routes::notifications::trigger_tender),
        )
        .route(
            "/api/notifications/trigger/project",
            post(routes::notifications::trigger_project),
        )
        .route(
            "/api/notifications/trigger/task",
            post(routes::notifications::trigger_task),
        )
        .route(
            "/api/notifications/system",
            post(routes::notifications::system_broadcast),
        )
        .route(
            "/api/notifications/{id}",
            get(routes::notifications::get_notification)
                .delete(routes::notifications::delete_notification),
        )
        .route(
            "/api/notifications/{id}/read",
            patch(routes::notifications::mark_read),
        )
        .route(
            "/api/notifications/{id}/unread",
            patch(routes::notifications::mark_unread),
        )
        // Calendar
        .route("/api/calendar/events", get(routes::calendar::events))
        .route(
            "/api/calendar/month/{year}/{month}",
            get(routes::calendar::month),
        )
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            auth::require_user,
        ));

    let trace = TraceLayer::new_for_http().make_span_with(|req: &Request<_>| {
        tracing::info_span!(
            "request",
            id = %uuid::Uuid::new_v4(),
            method = %req.method(),
            path = %req.uri().path(),
        )
    });

    public
        .merge(protected)
        .layer(trace)
        .layer(cors_layer(&app_state.config.server.cors_origins))
        .with_state(app_state)
}

/// Start the HTTP API on the configured port.
pub async fn serve(app_state: AppState, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    serve_on(app_state, listener).await
}

/// Start the HTTP API on a pre-bound listener.
///
/// Lets the caller read the actual port before starting (useful when
/// `port = 0` and the OS picks a free port).
pub async fn serve_on(app_state: AppState, listener: tokio::net::TcpListener) -> anyhow::Result<()> {
    let actual_port = listener.local_addr()?.port();
    let app = build_router(app_state);

    tracing::info!("sitedesk API listening on http://localhost:{actual_port}");

    axum::serve(listener, app).await?;
    Ok(())
}
