use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// REST error. Client-facing variants carry the message shown to the caller;
/// internal failures are logged and reported generically.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Store failure on a user write. A handle or email claimed concurrently
    /// surfaces as the same 400 the up-front check gives.
    pub fn from_user_write(err: anyhow::Error) -> Self {
        let taken = match plaza_db::unique_violation(&err) {
            Some("users.username") => Some("Username is already taken"),
            Some("users.email") => Some("Email is already taken"),
            _ => None,
        };
        match taken {
            Some(msg) => Self::bad_request(msg),
            None => Self::Internal(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Internal(e) => {
                tracing::error!("Internal error: {:#}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn response_status(err: ApiError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn client_errors_map_to_their_status() {
        assert_eq!(response_status(ApiError::bad_request("x")), StatusCode::BAD_REQUEST);
        assert_eq!(
            response_status(ApiError::Unauthorized("x".into())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            response_status(ApiError::Forbidden("x".into())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(response_status(ApiError::not_found("x")), StatusCode::NOT_FOUND);
    }

    #[test]
    fn internal_returns_500() {
        assert_eq!(
            response_status(ApiError::Internal(anyhow::anyhow!("disk on fire"))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn duplicate_user_write_is_a_bad_request() {
        let db = plaza_db::Database::open_in_memory().unwrap();
        db.create_user("u1", "alice", "alice@example.com", "Alice", "hash").unwrap();
        let err = db
            .create_user("u2", "alice", "a2@example.com", "Alice", "hash")
            .unwrap_err();

        match ApiError::from_user_write(err) {
            ApiError::BadRequest(msg) => assert_eq!(msg, "Username is already taken"),
            other => panic!("expected BadRequest, got {:?}", other),
        }
        assert!(matches!(
            ApiError::from_user_write(anyhow::anyhow!("disk on fire")),
            ApiError::Internal(_)
        ));
    }
}
