use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::db::store::StoreError;
use crate::workflow::WorkflowError;

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub status_code: u16,
    pub message: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<serde_json::Value>,
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> axum::response::Response {
        let status =
            StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

impl<T: Serialize> ApiResponse<T> {
    /// Create a success response
    pub fn success(status: StatusCode, message: impl Into<String>, data: T) -> Self {
        ApiResponse {
            success: true,
            status_code: status.as_u16(),
            message: message.into(),
            timestamp: Utc::now().to_rfc3339(),
            data: Some(data),
            errors: None,
        }
    }

    /// Create an error response
    pub fn error(
        status: StatusCode,
        message: impl Into<String>,
        errors: Option<serde_json::Value>,
    ) -> Self {
        ApiResponse {
            success: false,
            status_code: status.as_u16(),
            message: message.into(),
            timestamp: Utc::now().to_rfc3339(),
            data: None,
            errors,
        }
    }
}

/// Transport status for each workflow error kind.
pub fn status_for(err: &WorkflowError) -> StatusCode {
    match err {
        WorkflowError::Unauthenticated => StatusCode::UNAUTHORIZED,
        WorkflowError::MissingAction => StatusCode::BAD_REQUEST,
        WorkflowError::NotFound(_) => StatusCode::NOT_FOUND,
        WorkflowError::Forbidden(_) => StatusCode::FORBIDDEN,
        WorkflowError::InvalidState(_) => StatusCode::BAD_REQUEST,
        WorkflowError::Validation(_) => StatusCode::BAD_REQUEST,
        WorkflowError::Conflict(_) => StatusCode::CONFLICT,
        WorkflowError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<WorkflowError> for ApiResponse<()> {
    fn from(err: WorkflowError) -> Self {
        let status = status_for(&err);
        let message = match &err {
            WorkflowError::Store(e) => {
                tracing::error!(error = %e, "Storage failure");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        ApiResponse::error(status, message, Some(json!({ "kind": err.kind() })))
    }
}

impl From<StoreError> for ApiResponse<()> {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(constraint) => {
                WorkflowError::Conflict(format!("Duplicate value violates {constraint}")).into()
            }
            StoreError::MissingReference(entity) => {
                WorkflowError::NotFound(format!("Referenced {entity} not found")).into()
            }
            other => WorkflowError::Store(other).into(),
        }
    }
}

impl From<sqlx::Error> for ApiResponse<()> {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Database(err).into()
    }
}
