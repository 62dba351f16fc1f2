use crate::db::store::StoreError;

/// Errors surfaced by request lifecycle operations.
///
/// None of these are retried by the engine; the caller decides.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("Authentication required")]
    Unauthenticated,

    #[error("Missing action or status parameter")]
    MissingAction,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    InvalidState(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl WorkflowError {
    /// Stable machine-readable kind, used by the transport mapping.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkflowError::Unauthenticated => "UNAUTHENTICATED",
            WorkflowError::MissingAction => "MISSING_ACTION",
            WorkflowError::NotFound(_) => "NOT_FOUND",
            WorkflowError::Forbidden(_) => "FORBIDDEN",
            WorkflowError::InvalidState(_) => "INVALID_STATE",
            WorkflowError::Validation(_) => "VALIDATION_ERROR",
            WorkflowError::Conflict(_) => "CONFLICT",
            WorkflowError::Store(_) => "INTERNAL_ERROR",
        }
    }

    pub(crate) fn request_not_found() -> Self {
        WorkflowError::NotFound("Request not found".to_string())
    }
}
