#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

use feature_desk::db::models::requests::{
    Attachment, CategorySummary, FeatureRequest, NewRequest, NewRequestRecord, NoteAuthor,
    NoteView, RequestDetail, RequestPatch, UserSummary,
};
use feature_desk::db::store::{RequestQuery, RequestStore, StoreError};
use feature_desk::utils::notification::{
    NotificationError, NotificationResult, NotificationSink, RequestCreated,
};
use feature_desk::workflow::{Principal, RequestEngine, RequestStatus, Role};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, (UserSummary, Role)>,
    categories: HashMap<Uuid, CategorySummary>,
    /// Insertion order; listings walk it backwards for newest first.
    requests: Vec<FeatureRequest>,
    attachments: Vec<Attachment>,
    /// Insertion order, paired with the owning request id.
    notes: Vec<(Uuid, NoteView)>,
}

/// In-memory [`RequestStore`] with the same conditional-write semantics as Postgres.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_user(&self, role: Role, name: &str) -> Principal {
        let id = Uuid::new_v4();
        let summary = UserSummary {
            id,
            name: Some(name.to_string()),
            email: format!("{}@example.com", name.to_lowercase()),
        };
        self.tables.lock().unwrap().users.insert(id, (summary, role));
        Principal::new(id, role)
    }

    pub fn add_category(&self, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.tables.lock().unwrap().categories.insert(
            id,
            CategorySummary {
                id,
                name: name.to_string(),
                color: "#60B5FF".to_string(),
            },
        );
        id
    }

    pub fn request_count(&self) -> usize {
        self.tables.lock().unwrap().requests.len()
    }

    pub fn note_count(&self) -> usize {
        self.tables.lock().unwrap().notes.len()
    }

    fn hydrate(tables: &Tables, request: &FeatureRequest) -> Result<RequestDetail, StoreError> {
        let created_by = tables
            .users
            .get(&request.created_by_id)
            .map(|(summary, _)| summary.clone())
            .ok_or(StoreError::MissingReference("creator"))?;
        let mut notes: Vec<NoteView> = tables
            .notes
            .iter()
            .filter(|(request_id, _)| *request_id == request.id)
            .map(|(_, note)| note.clone())
            .collect();
        notes.reverse();
        Ok(RequestDetail {
            request: request.clone(),
            created_by,
            category: request
                .category_id
                .and_then(|id| tables.categories.get(&id).cloned()),
            attachments: tables
                .attachments
                .iter()
                .filter(|a| a.request_id == request.id)
                .cloned()
                .collect(),
            notes,
        })
    }
}

#[async_trait]
impl RequestStore for MemoryStore {
    async fn find_request(&self, id: Uuid) -> Result<Option<FeatureRequest>, StoreError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.requests.iter().find(|r| r.id == id).cloned())
    }

    async fn find_request_detail(&self, id: Uuid) -> Result<Option<RequestDetail>, StoreError> {
        let tables = self.tables.lock().unwrap();
        tables
            .requests
            .iter()
            .find(|r| r.id == id)
            .map(|r| Self::hydrate(&tables, r))
            .transpose()
    }

    async fn insert_request(&self, record: NewRequestRecord) -> Result<RequestDetail, StoreError> {
        let mut tables = self.tables.lock().unwrap();
        if !tables.users.contains_key(&record.created_by_id) {
            return Err(StoreError::MissingReference("user"));
        }
        if let Some(category_id) = record.category_id {
            if !tables.categories.contains_key(&category_id) {
                return Err(StoreError::MissingReference("category"));
            }
        }

        let now = Utc::now();
        let request = FeatureRequest {
            id: Uuid::new_v4(),
            title: record.title,
            description: record.description,
            requested_by: record.requested_by,
            business_justification: record.business_justification,
            reason: record.reason,
            status: RequestStatus::Submitted,
            priority: None,
            final_priority: None,
            decline_reason: None,
            admin_notes: None,
            support_notes: None,
            category_id: record.category_id,
            created_by_id: record.created_by_id,
            support_reviewer_id: None,
            admin_reviewer_id: None,
            created_at: now,
            updated_at: now,
        };
        for attachment in record.attachments {
            tables.attachments.push(Attachment {
                id: Uuid::new_v4(),
                request_id: request.id,
                file_name: attachment.file_name,
                cloud_storage_path: attachment.cloud_storage_path,
                is_public: attachment.is_public,
                content_type: attachment.content_type,
                size: attachment.size,
                created_at: now,
            });
        }
        tables.requests.push(request.clone());
        Self::hydrate(&tables, &request)
    }

    async fn update_request_if_status(
        &self,
        id: Uuid,
        expected: RequestStatus,
        patch: &RequestPatch,
    ) -> Result<Option<FeatureRequest>, StoreError> {
        let mut tables = self.tables.lock().unwrap();
        let Some(request) = tables.requests.iter_mut().find(|r| r.id == id) else {
            return Ok(None);
        };
        if request.status != expected {
            return Ok(None);
        }
        request.apply(patch);
        Ok(Some(request.clone()))
    }

    async fn delete_request(
        &self,
        id: Uuid,
        expected: Option<RequestStatus>,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().unwrap();
        let Some(index) = tables.requests.iter().position(|r| r.id == id) else {
            return Ok(false);
        };
        if expected.is_some_and(|status| tables.requests[index].status != status) {
            return Ok(false);
        }
        tables.requests.remove(index);
        tables.attachments.retain(|a| a.request_id != id);
        tables.notes.retain(|(request_id, _)| *request_id != id);
        Ok(true)
    }

    async fn list_requests(&self, query: &RequestQuery) -> Result<Vec<RequestDetail>, StoreError> {
        let tables = self.tables.lock().unwrap();
        tables
            .requests
            .iter()
            .rev()
            .filter(|r| query.matches(r))
            .map(|r| Self::hydrate(&tables, r))
            .collect()
    }

    async fn insert_note(
        &self,
        request_id: Uuid,
        user_id: Uuid,
        content: &str,
    ) -> Result<NoteView, StoreError> {
        let mut tables = self.tables.lock().unwrap();
        if !tables.requests.iter().any(|r| r.id == request_id) {
            return Err(StoreError::MissingReference("request"));
        }
        let (summary, role) = tables
            .users
            .get(&user_id)
            .cloned()
            .ok_or(StoreError::MissingReference("user"))?;
        let note = NoteView {
            id: Uuid::new_v4(),
            content: content.to_string(),
            created_at: Utc::now(),
            user: NoteAuthor {
                id: summary.id,
                name: summary.name,
                role,
            },
        };
        tables.notes.push((request_id, note.clone()));
        Ok(note)
    }

    async fn category_name(&self, id: Uuid) -> Result<Option<String>, StoreError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.categories.get(&id).map(|c| c.name.clone()))
    }
}

/// Forwards every event to a channel the test can await.
pub struct RecordingNotifier {
    sent: UnboundedSender<RequestCreated>,
}

impl RecordingNotifier {
    pub fn new() -> (Arc<Self>, UnboundedReceiver<RequestCreated>) {
        let (sent, received) = unbounded_channel();
        (Arc::new(Self { sent }), received)
    }
}

#[async_trait]
impl NotificationSink for RecordingNotifier {
    async fn notify(&self, event: &RequestCreated) -> NotificationResult<()> {
        let _ = self.sent.send(event.clone());
        Ok(())
    }
}

/// Always fails, after reporting that it was called.
pub struct FailingNotifier {
    attempts: UnboundedSender<Uuid>,
}

impl FailingNotifier {
    pub fn new() -> (Arc<Self>, UnboundedReceiver<Uuid>) {
        let (attempts, received) = unbounded_channel();
        (Arc::new(Self { attempts }), received)
    }
}

#[async_trait]
impl NotificationSink for FailingNotifier {
    async fn notify(&self, event: &RequestCreated) -> NotificationResult<()> {
        let _ = self.attempts.send(event.request_id);
        Err(NotificationError::Rejected(503))
    }
}

/// Engine over a fresh memory store with a recording notifier.
pub fn engine() -> (RequestEngine, Arc<MemoryStore>, UnboundedReceiver<RequestCreated>) {
    let store = MemoryStore::new();
    let (notifier, events) = RecordingNotifier::new();
    let engine = RequestEngine::new(store.clone(), notifier);
    (engine, store, events)
}

pub fn new_request(title: &str) -> NewRequest {
    NewRequest {
        title: Some(title.to_string()),
        description: Some(format!("{title} description")),
        ..Default::default()
    }
}

/// Build a transition payload from JSON, the way the HTTP layer does.
pub fn input(value: serde_json::Value) -> feature_desk::workflow::TransitionInput {
    serde_json::from_value(value).expect("valid transition payload")
}
