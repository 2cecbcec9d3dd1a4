use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

pub type Result<T, E = ApiError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("no snowflake session for this request")]
    NoSession,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("run {0} not found")]
    RunNotFound(uuid::Uuid),

    #[error("upstream connect failed: {0}")]
    Connect(#[from] snowflake_session::SnowflakeSessionError),

    #[error("workflow error: {0}")]
    Workflow(#[from] migration_workflow::WorkflowError),

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct JsonError {
    message: String,
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NoSession => StatusCode::CONFLICT,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::RunNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Connect(_) => StatusCode::BAD_REQUEST,
            ApiError::Workflow(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(JsonError {
            message: self.to_string(),
        })
    }
}
