use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;

use super::analysis::AnalyzerError;
use super::repository::RepositoryError;

/// Typed failure of a case or document operation. None of these leave partial state behind.
#[derive(Debug, thiserror::Error)]
pub enum CaseError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("not authorized: {0}")]
    Authorization(String),
    #[error("precondition not met: {0}")]
    PreconditionNotMet(String),
    #[error("case is finalized: {0}")]
    TerminalState(String),
    #[error("invalid document state: {0}")]
    InvalidState(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("concurrent modification: {0}")]
    Conflict(String),
    #[error("document analysis failed: {0}")]
    AnalysisFailed(String),
    #[error("storage unavailable: {0}")]
    Storage(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Authorization,
    PreconditionNotMet,
    TerminalState,
    InvalidState,
    NotFound,
    Conflict,
    AnalysisFailed,
    Storage,
}

impl CaseError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CaseError::Validation(_) => ErrorKind::Validation,
            CaseError::Authorization(_) => ErrorKind::Authorization,
            CaseError::PreconditionNotMet(_) => ErrorKind::PreconditionNotMet,
            CaseError::TerminalState(_) => ErrorKind::TerminalState,
            CaseError::InvalidState(_) => ErrorKind::InvalidState,
            CaseError::NotFound(_) => ErrorKind::NotFound,
            CaseError::Conflict(_) => ErrorKind::Conflict,
            CaseError::AnalysisFailed(_) => ErrorKind::AnalysisFailed,
            CaseError::Storage(_) => ErrorKind::Storage,
        }
    }

    /// Failures a caller may retry without changing the request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CaseError::AnalysisFailed(_) | CaseError::Conflict(_))
    }

    fn status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Authorization => StatusCode::FORBIDDEN,
            ErrorKind::PreconditionNotMet => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::TerminalState | ErrorKind::InvalidState | ErrorKind::Conflict => {
                StatusCode::CONFLICT
            }
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::AnalysisFailed | ErrorKind::Storage => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<RepositoryError> for CaseError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Conflict => {
                CaseError::Conflict("record was modified by another request".to_string())
            }
            RepositoryError::NotFound => CaseError::NotFound("record not found".to_string()),
            RepositoryError::Unavailable(reason) => CaseError::Storage(reason),
        }
    }
}

impl From<AnalyzerError> for CaseError {
    fn from(value: AnalyzerError) -> Self {
        CaseError::AnalysisFailed(value.to_string())
    }
}

impl IntoResponse for CaseError {
    fn into_response(self) -> Response {
        let payload = json!({
            "error": self.to_string(),
            "kind": self.kind(),
        });
        (self.status_code(), Json(payload)).into_response()
    }
}
