use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use sitedesk_core::SiteError;

// ---------------------------------------------------------------------------
// AppError: unified error type for HTTP responses
// ---------------------------------------------------------------------------

/// Unified error type for HTTP responses.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self(SiteError::Unauthorized(msg.into()).into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self(SiteError::Forbidden(msg.into()).into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(SiteError::invalid(msg).into())
    }
}

fn status_of(e: &SiteError) -> StatusCode {
    match e {
        SiteError::NotFound { .. } => StatusCode::NOT_FOUND,
        SiteError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        SiteError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        SiteError::Forbidden(_) => StatusCode::FORBIDDEN,
        SiteError::Conflict(_) => StatusCode::CONFLICT,
        SiteError::InvalidValue { .. } => StatusCode::BAD_REQUEST,
        SiteError::Internal(_)
        | SiteError::Sqlite(_)
        | SiteError::Io(_)
        | SiteError::Yaml(_)
        | SiteError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let Some(e) = self.0.downcast_ref::<SiteError>() else {
            tracing::error!(error = %format!("{:#}", self.0), "request failed");
            let body = json!({ "error": "internal server error" });
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response();
        };

        let status = status_of(e);
        let body = match e {
            SiteError::Validation(messages) => json!({
                "error": messages.join(", "),
                "errors": messages,
            }),
            SiteError::Unauthorized(msg) | SiteError::Forbidden(msg) | SiteError::Conflict(msg) => {
                json!({ "error": msg })
            }
            SiteError::Internal(msg) => {
                tracing::error!(error = %msg, "request failed");
                json!({ "error": msg })
            }
            _ if status == StatusCode::INTERNAL_SERVER_ERROR => {
                tracing::error!(error = %e, "request failed");
                json!({ "error": "internal server error" })
            }
            _ => json!({ "error": e.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn not_found_maps_to_404() {
        let err = AppError(SiteError::not_found("project", 7).into());
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn forbidden_maps_to_403() {
        let err = AppError::forbidden("admins only");
        assert_eq!(err.into_response().status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn conflict_maps_to_409() {
        let err = AppError(SiteError::Conflict("supervisor has projects".into()).into());
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn invalid_value_maps_to_400() {
        let err = AppError(
            SiteError::InvalidValue {
                kind: "status",
                value: "bogus".into(),
            }
            .into(),
        );
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn internal_maps_to_500_with_message() {
        let response = AppError(SiteError::Internal("Error sending OTP".into()).into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body(response).await["error"], "Error sending OTP");
    }

    #[tokio::test]
    async fn validation_lists_every_message() {
        let err = AppError(
            SiteError::Validation(vec!["Title can't be blank".into(), "Email is invalid".into()])
                .into(),
        );
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let json = body(response).await;
        assert_eq!(json["errors"][1], "Email is invalid");
        assert_eq!(json["error"], "Title can't be blank, Email is invalid");
    }

    #[tokio::test]
    async fn unauthorized_carries_bare_message() {
        let response = AppError::unauthorized("Invalid login credentials").into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body(response).await["error"], "Invalid login credentials");
    }

    #[tokio::test]
    async fn foreign_errors_hide_details() {
        let response = AppError(anyhow::anyhow!("disk on fire")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body(response).await["error"], "internal server error");
    }
}
