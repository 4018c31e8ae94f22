use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use miette::Diagnostic;
use serde_json::json;
use thiserror::Error;

use crate::reschedule::RescheduleError;

#[derive(Debug, Error, Diagnostic)]
pub enum DeskError {
    #[error("I/O error: {0}")]
    #[diagnostic(code(rentdesk::io))]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    #[diagnostic(code(rentdesk::config))]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(rentdesk::serde))]
    Serde(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    #[diagnostic(code(rentdesk::db))]
    Db(#[from] sea_orm::DbErr),

    #[error("Token error: {0}")]
    #[diagnostic(code(rentdesk::token))]
    Token(String),

    #[error("{0}")]
    #[diagnostic(code(rentdesk::bad_request))]
    BadRequest(String),

    #[error("{0}")]
    #[diagnostic(code(rentdesk::unauthorized))]
    Unauthorized(String),

    #[error("{0}")]
    #[diagnostic(code(rentdesk::forbidden))]
    Forbidden(String),

    #[error("{0}")]
    #[diagnostic(code(rentdesk::not_found))]
    NotFound(String),

    #[error("{0}")]
    #[diagnostic(code(rentdesk::other))]
    Other(String),
}

impl From<josekit::JoseError> for DeskError {
    fn from(value: josekit::JoseError) -> Self {
        DeskError::Token(value.to_string())
    }
}

impl From<RescheduleError> for DeskError {
    fn from(value: RescheduleError) -> Self {
        DeskError::BadRequest(value.to_string())
    }
}

impl DeskError {
    pub fn status(&self) -> StatusCode {
        match self {
            DeskError::BadRequest(_) => StatusCode::BAD_REQUEST,
            DeskError::Unauthorized(_) | DeskError::Token(_) => StatusCode::UNAUTHORIZED,
            DeskError::Forbidden(_) => StatusCode::FORBIDDEN,
            DeskError::NotFound(_) => StatusCode::NOT_FOUND,
            DeskError::Io(_)
            | DeskError::Config(_)
            | DeskError::Serde(_)
            | DeskError::Db(_)
            | DeskError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for DeskError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
            "internal_error".to_string()
        } else {
            self.to_string()
        };
        let body = json!({ "error": message });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_keep_their_message() {
        let resp = DeskError::BadRequest("Empty message".into()).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        assert_eq!(
            DeskError::Forbidden("nope".into()).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            DeskError::NotFound("Visit not found".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            DeskError::Token("expired".into()).status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn test_storage_errors_map_to_500() {
        let err = DeskError::Db(sea_orm::DbErr::Custom("boom".into()));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_reschedule_errors_are_bad_requests() {
        let err: DeskError = RescheduleError::NoProposal.into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
