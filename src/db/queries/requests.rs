use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::db::models::requests::{
    Attachment, CategorySummary, FeatureRequest, NewRequestRecord, NoteRow, NoteView,
    RequestDetail, RequestPatch, UserSummary,
};
use crate::db::store::{RequestQuery, RequestScope, RequestStore, StoreError};
use crate::workflow::RequestStatus;

const REQUEST_COLUMNS: &str = "id, title, description, requested_by, business_justification, reason, \
     status, priority, final_priority, decline_reason, admin_notes, support_notes, category_id, \
     created_by_id, support_reviewer_id, admin_reviewer_id, created_at, updated_at";

/// Postgres-backed [`RequestStore`].
#[derive(Clone)]
pub struct PgRequestStore {
    pool: PgPool,
}

impl PgRequestStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Attach creator, category, attachments and notes to each request,
    /// preserving input order.
    async fn hydrate(&self, requests: Vec<FeatureRequest>) -> Result<Vec<RequestDetail>, StoreError> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }

        let request_ids: Vec<Uuid> = requests.iter().map(|r| r.id).collect();
        let creator_ids: Vec<Uuid> = requests.iter().map(|r| r.created_by_id).collect();
        let category_ids: Vec<Uuid> = requests.iter().filter_map(|r| r.category_id).collect();

        let creators: HashMap<Uuid, UserSummary> = sqlx::query_as::<_, UserSummary>(
            "SELECT id, name, email FROM users WHERE id = ANY($1)",
        )
        .bind(&creator_ids)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|u| (u.id, u))
        .collect();

        let categories: HashMap<Uuid, CategorySummary> = if category_ids.is_empty() {
            HashMap::new()
        } else {
            sqlx::query_as::<_, CategorySummary>(
                "SELECT id, name, color FROM categories WHERE id = ANY($1)",
            )
            .bind(&category_ids)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|c| (c.id, c))
            .collect()
        };

        let mut attachments: HashMap<Uuid, Vec<Attachment>> = HashMap::new();
        for attachment in sqlx::query_as::<_, Attachment>(
            r#"
            SELECT id, request_id, file_name, cloud_storage_path, is_public, content_type, size, created_at
            FROM attachments
            WHERE request_id = ANY($1)
            ORDER BY created_at ASC
            "#,
        )
        .bind(&request_ids)
        .fetch_all(&self.pool)
        .await?
        {
            attachments.entry(attachment.request_id).or_default().push(attachment);
        }

        let mut notes: HashMap<Uuid, Vec<NoteView>> = HashMap::new();
        for row in sqlx::query_as::<_, NoteRow>(
            r#"
            SELECT n.id, n.request_id, n.content, n.created_at,
                   u.id AS user_id, u.name AS user_name, u.role AS user_role
            FROM request_notes n
            JOIN users u ON u.id = n.user_id
            WHERE n.request_id = ANY($1)
            ORDER BY n.created_at DESC
            "#,
        )
        .bind(&request_ids)
        .fetch_all(&self.pool)
        .await?
        {
            notes.entry(row.request_id).or_default().push(row.into());
        }

        requests
            .into_iter()
            .map(|request| -> Result<RequestDetail, StoreError> {
                let created_by = creators
                    .get(&request.created_by_id)
                    .cloned()
                    .ok_or(StoreError::MissingReference("creator"))?;
                let category = request.category_id.and_then(|id| categories.get(&id).cloned());
                Ok(RequestDetail {
                    created_by,
                    category,
                    attachments: attachments.remove(&request.id).unwrap_or_default(),
                    notes: notes.remove(&request.id).unwrap_or_default(),
                    request,
                })
            })
            .collect()
    }
}

/// Map Postgres constraint violations onto store errors.
pub(crate) fn classify(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        match db_err.code().as_deref() {
            Some("23503") => {
                let entity = match db_err.constraint() {
                    Some(c) if c.contains("category") => "category",
                    Some(c) if c.contains("user") || c.contains("created_by") => "user",
                    _ => "request",
                };
                return StoreError::MissingReference(entity);
            }
            Some("23505") => {
                return StoreError::Duplicate(db_err.constraint().unwrap_or("unique").to_string());
            }
            _ => {}
        }
    }
    StoreError::Database(err)
}

fn push_patch<'a>(builder: &mut QueryBuilder<'a, Postgres>, patch: &'a RequestPatch) {
    let mut set = builder.separated(", ");
    set.push("updated_at = NOW()");
    if let Some(status) = patch.status {
        set.push("status = ").push_bind_unseparated(status);
    }
    if let Some(priority) = patch.priority {
        set.push("priority = ").push_bind_unseparated(priority);
    }
    if let Some(final_priority) = patch.final_priority {
        set.push("final_priority = ").push_bind_unseparated(final_priority);
    }
    if let Some(notes) = &patch.support_notes {
        set.push("support_notes = ").push_bind_unseparated(notes);
    }
    if let Some(notes) = &patch.admin_notes {
        set.push("admin_notes = ").push_bind_unseparated(notes);
    }
    if let Some(reason) = &patch.decline_reason {
        set.push("decline_reason = ").push_bind_unseparated(reason);
    }
    if let Some(id) = patch.support_reviewer_id {
        set.push("support_reviewer_id = ").push_bind_unseparated(id);
    }
    if let Some(id) = patch.admin_reviewer_id {
        set.push("admin_reviewer_id = ").push_bind_unseparated(id);
    }
    if let Some(title) = &patch.title {
        set.push("title = ").push_bind_unseparated(title);
    }
    if let Some(description) = &patch.description {
        set.push("description = ").push_bind_unseparated(description);
    }
    if let Some(value) = &patch.business_justification {
        set.push("business_justification = ").push_bind_unseparated(value);
    }
    if let Some(value) = &patch.reason {
        set.push("reason = ").push_bind_unseparated(value);
    }
    if let Some(value) = patch.category_id {
        set.push("category_id = ").push_bind_unseparated(value);
    }
}

#[async_trait]
impl RequestStore for PgRequestStore {
    async fn find_request(&self, id: Uuid) -> Result<Option<FeatureRequest>, StoreError> {
        let request = sqlx::query_as::<_, FeatureRequest>(&format!(
            "SELECT {REQUEST_COLUMNS} FROM requests WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(request)
    }

    async fn find_request_detail(&self, id: Uuid) -> Result<Option<RequestDetail>, StoreError> {
        let Some(request) = self.find_request(id).await? else {
            return Ok(None);
        };
        Ok(self.hydrate(vec![request]).await?.pop())
    }

    async fn insert_request(&self, record: NewRequestRecord) -> Result<RequestDetail, StoreError> {
        let mut tx = self.pool.begin().await?;

        let request = sqlx::query_as::<_, FeatureRequest>(&format!(
            r#"
            INSERT INTO requests (id, title, description, business_justification, reason,
                                  category_id, requested_by, created_by_id, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {REQUEST_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&record.title)
        .bind(&record.description)
        .bind(&record.business_justification)
        .bind(&record.reason)
        .bind(record.category_id)
        .bind(&record.requested_by)
        .bind(record.created_by_id)
        .bind(RequestStatus::Submitted)
        .fetch_one(&mut *tx)
        .await
        .map_err(classify)?;

        for attachment in &record.attachments {
            sqlx::query(
                r#"
                INSERT INTO attachments (id, request_id, file_name, cloud_storage_path, is_public, content_type, size)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(request.id)
            .bind(&attachment.file_name)
            .bind(&attachment.cloud_storage_path)
            .bind(attachment.is_public)
            .bind(&attachment.content_type)
            .bind(attachment.size)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        self.hydrate(vec![request])
            .await?
            .pop()
            .ok_or(StoreError::MissingReference("request"))
    }

    async fn update_request_if_status(
        &self,
        id: Uuid,
        expected: RequestStatus,
        patch: &RequestPatch,
    ) -> Result<Option<FeatureRequest>, StoreError> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE requests SET ");
        push_patch(&mut builder, patch);
        builder
            .push(" WHERE id = ")
            .push_bind(id)
            .push(" AND status = ")
            .push_bind(expected)
            .push(" RETURNING ")
            .push(REQUEST_COLUMNS);

        builder
            .build_query_as::<FeatureRequest>()
            .fetch_optional(&self.pool)
            .await
            .map_err(classify)
    }

    async fn delete_request(
        &self,
        id: Uuid,
        expected: Option<RequestStatus>,
    ) -> Result<bool, StoreError> {
        let result = match expected {
            Some(status) => {
                sqlx::query("DELETE FROM requests WHERE id = $1 AND status = $2")
                    .bind(id)
                    .bind(status)
                    .execute(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("DELETE FROM requests WHERE id = $1")
                    .bind(id)
                    .execute(&self.pool)
                    .await?
            }
        };
        Ok(result.rows_affected() > 0)
    }

    async fn list_requests(&self, query: &RequestQuery) -> Result<Vec<RequestDetail>, StoreError> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {REQUEST_COLUMNS} FROM requests WHERE TRUE"));

        match query.scope {
            RequestScope::Own(user_id) => {
                builder.push(" AND created_by_id = ").push_bind(user_id);
            }
            RequestScope::SupportQueue(user_id) => {
                builder
                    .push(" AND (status IN ('SUBMITTED', 'RETURNED') OR support_reviewer_id = ")
                    .push_bind(user_id)
                    .push(")");
            }
            RequestScope::All => {}
        }

        if !query.statuses.is_empty() {
            builder.push(" AND status IN (");
            let mut in_list = builder.separated(", ");
            for status in &query.statuses {
                in_list.push_bind(*status);
            }
            in_list.push_unseparated(")");
        }
        if let Some(category_id) = query.category_id {
            builder.push(" AND category_id = ").push_bind(category_id);
        }
        if let Some(priority) = query.priority {
            builder.push(" AND priority = ").push_bind(priority);
        }
        builder.push(" ORDER BY created_at DESC");

        let requests = builder
            .build_query_as::<FeatureRequest>()
            .fetch_all(&self.pool)
            .await?;
        self.hydrate(requests).await
    }

    async fn insert_note(
        &self,
        request_id: Uuid,
        user_id: Uuid,
        content: &str,
    ) -> Result<NoteView, StoreError> {
        let row = sqlx::query_as::<_, NoteRow>(
            r#"
            WITH n AS (
                INSERT INTO request_notes (id, request_id, user_id, content)
                VALUES ($1, $2, $3, $4)
                RETURNING id, request_id, user_id, content, created_at
            )
            SELECT n.id, n.request_id, n.content, n.created_at,
                   u.id AS user_id, u.name AS user_name, u.role AS user_role
            FROM n
            JOIN users u ON u.id = n.user_id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request_id)
        .bind(user_id)
        .bind(content)
        .fetch_one(&self.pool)
        .await
        .map_err(classify)?;
        Ok(row.into())
    }

    async fn category_name(&self, id: Uuid) -> Result<Option<String>, StoreError> {
        let name = sqlx::query_scalar::<_, String>("SELECT name FROM categories WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(name)
    }
}
