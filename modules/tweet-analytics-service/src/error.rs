//! Error taxonomy for the HTTP surface.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tweet_analytics_types::{ErrorBody, UnknownName};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Caller input rejected before any query runs.
    #[error("invalid {field}: {message}")]
    InvalidArgument { field: String, message: String },

    #[error("{0} not found")]
    NotFound(String),

    #[error("rate limit exceeded, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Stored rows violate an invariant the importer should have enforced.
    #[error("data integrity violation: {0}")]
    DataIntegrity(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::InvalidArgument {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidArgument { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::DataIntegrity(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<UnknownName> for ApiError {
    fn from(e: UnknownName) -> Self {
        ApiError::invalid(e.kind, e.to_string())
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(e: rusqlite::Error) -> Self {
        ApiError::Internal(format!("query failed: {}", e))
    }
}

impl From<r2d2::Error> for ApiError {
    fn from(e: r2d2::Error) -> Self {
        ApiError::Internal(format!("database pool: {}", e))
    }
}

impl From<crate::db::DbError> for ApiError {
    fn from(e: crate::db::DbError) -> Self {
        match e {
            crate::db::DbError::Pool(e) => e.into(),
            crate::db::DbError::Sqlite(e) => e.into(),
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        ApiError::Internal(format!("query task aborted: {}", e))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(e: QueryRejection) -> Self {
        ApiError::invalid("query", e.body_text())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        ApiError::invalid("body", e.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("{}", self);
        }

        let (field, retry_after_secs) = match &self {
            ApiError::InvalidArgument { field, .. } => (Some(field.clone()), None),
            ApiError::RateLimited { retry_after_secs } => (None, Some(*retry_after_secs)),
            _ => (None, None),
        };
        let body = ErrorBody {
            error: self.to_string(),
            field,
            retry_after_secs,
        };
        (status, Json(body)).into_response()
    }
}
