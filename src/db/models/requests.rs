// src/db/models/requests.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::workflow::{Priority, RequestStatus, Role};

/// Row of the `requests` table.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FeatureRequest {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub requested_by: Option<String>,
    pub business_justification: Option<String>,
    pub reason: Option<String>,
    pub status: RequestStatus,
    pub priority: Option<Priority>,
    pub final_priority: Option<Priority>,
    pub decline_reason: Option<String>,
    pub admin_notes: Option<String>,
    pub support_notes: Option<String>,
    pub category_id: Option<Uuid>,
    pub created_by_id: Uuid,
    pub support_reviewer_id: Option<Uuid>,
    pub admin_reviewer_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FeatureRequest {
    /// Apply `patch` in place. `None` fields leave the stored value alone.
    ///
    /// Same column writes as the `UPDATE` that `PgRequestStore` builds, for
    /// stores that keep rows in memory.
    pub fn apply(&mut self, patch: &RequestPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(priority) = patch.priority {
            self.priority = Some(priority);
        }
        if let Some(final_priority) = patch.final_priority {
            self.final_priority = Some(final_priority);
        }
        if let Some(notes) = &patch.support_notes {
            self.support_notes = Some(notes.clone());
        }
        if let Some(notes) = &patch.admin_notes {
            self.admin_notes = Some(notes.clone());
        }
        if let Some(reason) = &patch.decline_reason {
            self.decline_reason = Some(reason.clone());
        }
        if let Some(id) = patch.support_reviewer_id {
            self.support_reviewer_id = Some(id);
        }
        if let Some(id) = patch.admin_reviewer_id {
            self.admin_reviewer_id = Some(id);
        }
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(description) = &patch.description {
            self.description = description.clone();
        }
        if let Some(value) = &patch.business_justification {
            self.business_justification = value.clone();
        }
        if let Some(value) = &patch.reason {
            self.reason = value.clone();
        }
        if let Some(value) = patch.category_id {
            self.category_id = value;
        }
        self.updated_at = Utc::now();
    }
}

/// Field writes produced by a transition rule.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestPatch {
    pub status: Option<RequestStatus>,
    pub priority: Option<Priority>,
    pub final_priority: Option<Priority>,
    pub support_notes: Option<String>,
    pub admin_notes: Option<String>,
    pub decline_reason: Option<String>,
    pub support_reviewer_id: Option<Uuid>,
    pub admin_reviewer_id: Option<Uuid>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub business_justification: Option<Option<String>>,
    pub reason: Option<Option<String>>,
    pub category_id: Option<Option<Uuid>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct UserSummary {
    pub id: Uuid,
    pub name: Option<String>,
    pub email: String,
}

impl UserSummary {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.email)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct CategorySummary {
    pub id: Uuid,
    pub name: String,
    pub color: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub id: Uuid,
    pub request_id: Uuid,
    pub file_name: String,
    pub cloud_storage_path: String,
    pub is_public: bool,
    pub content_type: String,
    pub size: i64,
    pub created_at: DateTime<Utc>,
}

/// Reference to an object already uploaded to cloud storage.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewAttachment {
    pub file_name: String,
    pub cloud_storage_path: String,
    #[serde(default)]
    pub is_public: bool,
    pub content_type: String,
    pub size: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NoteAuthor {
    pub id: Uuid,
    pub name: Option<String>,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NoteView {
    pub id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub user: NoteAuthor,
}

/// Flat note row joined with its author, as selected from Postgres.
#[derive(Debug, FromRow)]
pub struct NoteRow {
    pub id: Uuid,
    pub request_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub user_id: Uuid,
    pub user_name: Option<String>,
    pub user_role: Role,
}

impl From<NoteRow> for NoteView {
    fn from(row: NoteRow) -> Self {
        NoteView {
            id: row.id,
            content: row.content,
            created_at: row.created_at,
            user: NoteAuthor {
                id: row.user_id,
                name: row.user_name,
                role: row.user_role,
            },
        }
    }
}

/// A request with creator, category, attachments and notes (newest first).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RequestDetail {
    #[serde(flatten)]
    pub request: FeatureRequest,
    pub created_by: UserSummary,
    pub category: Option<CategorySummary>,
    pub attachments: Vec<Attachment>,
    pub notes: Vec<NoteView>,
}

/// Payload for submitting a new request.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub business_justification: Option<String>,
    pub reason: Option<String>,
    pub category_id: Option<Uuid>,
    pub requested_by: Option<String>,
    #[serde(default)]
    pub attachments: Vec<NewAttachment>,
}

/// Validated insert for the store.
#[derive(Debug, Clone)]
pub struct NewRequestRecord {
    pub title: String,
    pub description: String,
    pub business_justification: Option<String>,
    pub reason: Option<String>,
    pub category_id: Option<Uuid>,
    pub requested_by: Option<String>,
    pub created_by_id: Uuid,
    pub attachments: Vec<NewAttachment>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct RequestFilter {
    /// One status or a comma-separated list.
    pub status: Option<String>,
    pub category_id: Option<Uuid>,
    pub priority: Option<Priority>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct NewNote {
    pub content: Option<String>,
}
