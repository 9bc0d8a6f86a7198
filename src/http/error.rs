use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::engine::EngineError;

use super::dto::ErrorBody;

impl EngineError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            EngineError::Validation(_) => StatusCode::BAD_REQUEST,
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::OverlapConflict { .. }
            | EngineError::TerminalStateViolation { .. }
            | EngineError::PaymentStateViolation { .. } => StatusCode::CONFLICT,
            EngineError::Wal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("request failed: {self}");
        }
        let conflicting_id = match &self {
            EngineError::OverlapConflict { conflicting_id } => Some(conflicting_id.to_string()),
            _ => None,
        };
        let message = match &self {
            // Storage details stay in the log.
            EngineError::Wal(_) => "reservation could not be stored".to_string(),
            other => other.to_string(),
        };
        let body = ErrorBody {
            error: self.kind().to_string(),
            message,
            conflicting_id,
        };
        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for EngineError {
    fn from(rejection: JsonRejection) -> Self {
        EngineError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for EngineError {
    fn from(rejection: QueryRejection) -> Self {
        EngineError::Validation(rejection.body_text())
    }
}
