/// Unified error handling module
use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Unified error response format
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub ok: bool,
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum ApiError {
    /// A client-supplied parameter outside its allowed domain.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Expected run files are absent.
    #[error("Data not found: {0}")]
    DataNotFound(String),

    /// A run output file does not follow the naming convention.
    #[error("Malformed output: {0}")]
    MalformedOutput(String),

    /// The model or plotter process could not be run or exited with failure.
    #[error("External process failed: {0}")]
    ExternalProcess(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A job that ended in failure, carrying its recorded error.
    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidInput(_) => "INVALID_INPUT",
            ApiError::DataNotFound(_) => "DATA_NOT_FOUND",
            ApiError::MalformedOutput(_) => "MALFORMED_OUTPUT",
            ApiError::ExternalProcess(_) => "EXTERNAL_PROCESS",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::JobFailed(_) => "JOB_FAILED",
            ApiError::Io(_) => "IO_ERROR",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::DataNotFound(_) | ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::JobFailed(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(format!("{err:#}"))
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Internal(format!("JSON error: {err}"))
    }
}

impl From<zip::result::ZipError> for ApiError {
    fn from(err: zip::result::ZipError) -> Self {
        ApiError::Internal(format!("zip error: {err}"))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidInput(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            ApiError::InvalidInput(msg)
            | ApiError::DataNotFound(msg)
            | ApiError::MalformedOutput(msg)
            | ApiError::ExternalProcess(msg)
            | ApiError::NotFound(msg)
            | ApiError::JobFailed(msg)
            | ApiError::Internal(msg) => msg.clone(),
            ApiError::Io(e) => e.to_string(),
        };

        let error_response = ErrorResponse {
            ok: false,
            error: ErrorDetail {
                code: self.code().to_string(),
                message,
            },
        };

        (self.status(), Json(error_response)).into_response()
    }
}

/// Type alias for API results
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_follow_taxonomy() {
        assert_eq!(ApiError::InvalidInput("x".into()).code(), "INVALID_INPUT");
        assert_eq!(ApiError::DataNotFound("x".into()).code(), "DATA_NOT_FOUND");
        assert_eq!(ApiError::MalformedOutput("x".into()).code(), "MALFORMED_OUTPUT");
        assert_eq!(ApiError::ExternalProcess("x".into()).code(), "EXTERNAL_PROCESS");
    }

    #[test]
    fn test_invalid_input_is_bad_request() {
        let response = ApiError::InvalidInput("min_lon".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_failed_job_is_conflict() {
        let err = ApiError::JobFailed("NAME run exited with 1".into());
        assert_eq!(err.code(), "JOB_FAILED");
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_io_error_converts() {
        let err: ApiError = std::io::Error::new(std::io::ErrorKind::Other, "disk").into();
        assert_eq!(err.code(), "IO_ERROR");
        assert!(err.to_string().contains("disk"));
    }
}
