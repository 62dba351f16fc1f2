use async_trait::async_trait;
use uuid::Uuid;

use crate::db::models::requests::{
    FeatureRequest, NewRequestRecord, NoteView, RequestDetail, RequestPatch,
};
use crate::workflow::{Principal, Priority, RequestStatus, Role};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A foreign key pointed at a row that does not exist.
    #[error("Referenced {0} does not exist")]
    MissingReference(&'static str),

    #[error("Duplicate value: {0}")]
    Duplicate(String),
}

/// Which requests a caller may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestScope {
    /// Only requests the user created.
    Own(Uuid),
    /// SUBMITTED and RETURNED requests plus those the support user reviews.
    SupportQueue(Uuid),
    All,
}

impl RequestScope {
    pub fn for_principal(principal: &Principal) -> Self {
        match principal.role {
            Role::User => RequestScope::Own(principal.id),
            Role::Support => RequestScope::SupportQueue(principal.id),
            Role::Admin | Role::Viewer => RequestScope::All,
        }
    }

    /// Row-level form of the scope clause in `PgRequestStore::list_requests`.
    pub fn includes(&self, request: &FeatureRequest) -> bool {
        match self {
            RequestScope::Own(user_id) => request.created_by_id == *user_id,
            RequestScope::SupportQueue(user_id) => {
                matches!(request.status, RequestStatus::Submitted | RequestStatus::Returned)
                    || request.support_reviewer_id == Some(*user_id)
            }
            RequestScope::All => true,
        }
    }
}

/// Role scope plus the optional query filters, applied together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestQuery {
    pub scope: RequestScope,
    /// Empty means any status.
    pub statuses: Vec<RequestStatus>,
    pub category_id: Option<Uuid>,
    pub priority: Option<Priority>,
}

impl RequestQuery {
    /// Row-level form of the `WHERE` clause `PgRequestStore::list_requests` builds.
    pub fn matches(&self, request: &FeatureRequest) -> bool {
        self.scope.includes(request)
            && (self.statuses.is_empty() || self.statuses.contains(&request.status))
            && self.category_id.map_or(true, |id| request.category_id == Some(id))
            && self.priority.map_or(true, |p| request.priority == Some(p))
    }
}

/// Persistence operations the lifecycle engine relies on.
///
/// Every returned request is hydrated by the implementation; notes are
/// ordered newest first and listings are ordered by `created_at` desc.
#[async_trait]
pub trait RequestStore: Send + Sync {
    async fn find_request(&self, id: Uuid) -> Result<Option<FeatureRequest>, StoreError>;

    async fn find_request_detail(&self, id: Uuid) -> Result<Option<RequestDetail>, StoreError>;

    /// Insert the request and its attachments atomically.
    async fn insert_request(&self, record: NewRequestRecord) -> Result<RequestDetail, StoreError>;

    /// Apply `patch` only if the request is still in `expected`.
    /// Returns `None` when the row is missing or has moved on.
    async fn update_request_if_status(
        &self,
        id: Uuid,
        expected: RequestStatus,
        patch: &RequestPatch,
    ) -> Result<Option<FeatureRequest>, StoreError>;

    /// Delete, optionally guarded on the current status. Returns whether a row was removed.
    async fn delete_request(
        &self,
        id: Uuid,
        expected: Option<RequestStatus>,
    ) -> Result<bool, StoreError>;

    async fn list_requests(&self, query: &RequestQuery) -> Result<Vec<RequestDetail>, StoreError>;

    async fn insert_note(
        &self,
        request_id: Uuid,
        user_id: Uuid,
        content: &str,
    ) -> Result<NoteView, StoreError>;

    async fn category_name(&self, id: Uuid) -> Result<Option<String>, StoreError>;
}
