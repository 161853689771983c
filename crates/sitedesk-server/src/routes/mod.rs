pub mod activities;
pub mod auth;
pub mod calendar;
pub mod custom_fields;
pub mod dashboard;
pub mod events;
pub mod health;
pub mod notifications;
pub mod projects;
pub mod site_managers;
pub mod supervisors;
pub mod tasks;
pub mod tenders;
pub mod users;

use axum::http::HeaderMap;

/// Client address as reported by the fronting proxy.
pub(crate) fn remote_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .or_else(|| headers.get("x-real-ip"))
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

