use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use super::error::WorkflowError;
use super::transitions::{plan_transition, require_decline_reason, resolve_action, Action, TransitionInput};
use super::types::{Principal, RequestStatus};
use crate::db::models::requests::{NewRequest, NewRequestRecord, NoteView, RequestDetail, RequestFilter};
use crate::db::store::{RequestQuery, RequestScope, RequestStore, StoreError};
use crate::utils::notification::{NotificationSink, RequestCreated};

/// Drives the request lifecycle against a [`RequestStore`].
///
/// Holds no locks of its own: each mutation is a single conditional write,
/// so concurrent transitions on one request are serialized by the store.
#[derive(Clone)]
pub struct RequestEngine {
    store: Arc<dyn RequestStore>,
    notifier: Arc<dyn NotificationSink>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn map_reference(err: StoreError) -> WorkflowError {
    match err {
        StoreError::MissingReference(entity) => {
            WorkflowError::NotFound(format!("Referenced {entity} not found"))
        }
        other => WorkflowError::Store(other),
    }
}

impl RequestEngine {
    pub fn new(store: Arc<dyn RequestStore>, notifier: Arc<dyn NotificationSink>) -> Self {
        Self { store, notifier }
    }

    pub async fn create_request(
        &self,
        principal: &Principal,
        new: NewRequest,
    ) -> Result<RequestDetail, WorkflowError> {
        let (Some(title), Some(description)) = (non_blank(new.title), non_blank(new.description))
        else {
            return Err(WorkflowError::Validation(
                "Title and description are required".to_string(),
            ));
        };

        let mut category_id = new.category_id;
        let mut category_name = None;
        if let Some(id) = category_id {
            category_name = self.store.category_name(id).await?;
            if category_name.is_none() {
                warn!(category_id = %id, "Unknown category on new request, storing without one");
                category_id = None;
            }
        }

        let record = NewRequestRecord {
            title,
            description,
            business_justification: non_blank(new.business_justification),
            reason: non_blank(new.reason),
            category_id,
            requested_by: non_blank(new.requested_by),
            created_by_id: principal.id,
            attachments: new.attachments,
        };
        let detail = self.store.insert_request(record).await.map_err(map_reference)?;
        info!(request_id = %detail.request.id, created_by = %principal.id, "Feature request created");

        self.dispatch(RequestCreated {
            request_id: detail.request.id,
            title: detail.request.title.clone(),
            description: detail.request.description.clone(),
            business_justification: detail.request.business_justification.clone(),
            requested_by: detail.request.requested_by.clone(),
            submitted_by: detail.created_by.display_name().to_string(),
            category_name,
            attachment_count: detail.attachments.len(),
            submitted_at: detail.request.created_at,
        });

        Ok(detail)
    }

    /// Fire-and-forget: failures are logged, never retried, never surfaced.
    fn dispatch(&self, event: RequestCreated) {
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            if let Err(e) = notifier.notify(&event).await {
                warn!(request_id = %event.request_id, error = %e, "Failed to send new request notification");
            }
        });
    }

    pub async fn get_request(
        &self,
        _principal: &Principal,
        id: Uuid,
    ) -> Result<RequestDetail, WorkflowError> {
        self.store
            .find_request_detail(id)
            .await?
            .ok_or_else(WorkflowError::request_not_found)
    }

    pub async fn transition_request(
        &self,
        principal: &Principal,
        id: Uuid,
        input: TransitionInput,
    ) -> Result<RequestDetail, WorkflowError> {
        let action = resolve_action(&input)?;
        if action == Action::Decline {
            require_decline_reason(&input)?;
        }

        let request = self
            .store
            .find_request(id)
            .await?
            .ok_or_else(WorkflowError::request_not_found)?;

        let planned = plan_transition(principal, &request, action, &input)?;
        let updated = self
            .store
            .update_request_if_status(id, planned.expected, &planned.patch)
            .await
            .map_err(map_reference)?;

        if updated.is_none() {
            // Lost a race: someone else moved or removed the request first.
            return match self.store.find_request(id).await? {
                None => Err(WorkflowError::request_not_found()),
                Some(_) => Err(WorkflowError::InvalidState(planned.rule.requirement.to_string())),
            };
        }

        info!(
            request_id = %id,
            actor = %principal.id,
            action = ?action,
            from = %planned.expected,
            to = %planned.rule.to,
            "Request transitioned"
        );

        self.store
            .find_request_detail(id)
            .await?
            .ok_or_else(WorkflowError::request_not_found)
    }

    pub async fn delete_request(&self, principal: &Principal, id: Uuid) -> Result<(), WorkflowError> {
        let request = self
            .store
            .find_request(id)
            .await?
            .ok_or_else(WorkflowError::request_not_found)?;

        let guard = if principal.is_admin() {
            None
        } else if request.created_by_id == principal.id && request.status == RequestStatus::Submitted {
            Some(RequestStatus::Submitted)
        } else {
            return Err(WorkflowError::Forbidden(
                "Unauthorized to delete this request".to_string(),
            ));
        };

        if !self.store.delete_request(id, guard).await? {
            return match self.store.find_request(id).await? {
                None => Err(WorkflowError::request_not_found()),
                Some(_) => Err(WorkflowError::Forbidden(
                    "Unauthorized to delete this request".to_string(),
                )),
            };
        }
        info!(request_id = %id, actor = %principal.id, "Request deleted");
        Ok(())
    }

    pub async fn list_requests(
        &self,
        principal: &Principal,
        filter: &RequestFilter,
    ) -> Result<Vec<RequestDetail>, WorkflowError> {
        let statuses = match filter.status.as_deref() {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::parse)
                .collect::<Result<Vec<RequestStatus>, _>>()?,
            None => Vec::new(),
        };

        let query = RequestQuery {
            scope: RequestScope::for_principal(principal),
            statuses,
            category_id: filter.category_id,
            priority: filter.priority,
        };
        Ok(self.store.list_requests(&query).await?)
    }

    pub async fn add_note(
        &self,
        principal: &Principal,
        request_id: Uuid,
        content: Option<String>,
    ) -> Result<NoteView, WorkflowError> {
        let content = non_blank(content)
            .ok_or_else(|| WorkflowError::Validation("Note content is required".to_string()))?;

        if self.store.find_request(request_id).await?.is_none() {
            return Err(WorkflowError::request_not_found());
        }
        self.store
            .insert_note(request_id, principal.id, &content)
            .await
            .map_err(map_reference)
    }
}
