//! The review state machine.
//!
//! Every legal move is one row of [`TRANSITIONS`], keyed on
//! `(action, role)`. The creator's in-place edit of a submitted request is
//! the separate [`CREATOR_EDIT`] rule, reached only when no table row
//! matches and the caller is the `USER` who created the request.

use serde::{Deserialize, Deserializer};
use utoipa::ToSchema;
use uuid::Uuid;

use super::error::WorkflowError;
use super::types::{Principal, Priority, RequestStatus, Role};
use crate::db::models::requests::{FeatureRequest, RequestPatch};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    SupportReview,
    SubmitToAdmin,
    Accept,
    Decline,
    ReturnToSupport,
    Edit,
}

impl Action {
    /// Wire names map to review actions; any other name can only ever
    /// be served by the creator edit rule.
    pub fn from_name(name: &str) -> Action {
        match name {
            "support_review" => Action::SupportReview,
            "submit_to_admin" => Action::SubmitToAdmin,
            "accept" => Action::Accept,
            "decline" => Action::Decline,
            "return_to_support" => Action::ReturnToSupport,
            _ => Action::Edit,
        }
    }

    /// Legacy clients send a target status instead of an action.
    pub fn from_legacy_status(status: &str) -> Option<Action> {
        match status {
            "ACCEPTED" => Some(Action::Accept),
            "DECLINED" => Some(Action::Decline),
            "RETURNED" => Some(Action::ReturnToSupport),
            _ => None,
        }
    }
}

/// Payload of a request update.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransitionInput {
    pub action: Option<String>,
    /// Legacy target status, honoured for ACCEPTED, DECLINED and RETURNED.
    pub status: Option<String>,
    #[serde(default, deserialize_with = "blank_priority")]
    pub priority: Option<Priority>,
    #[serde(default, deserialize_with = "blank_priority")]
    pub final_priority: Option<Priority>,
    pub support_notes: Option<String>,
    pub admin_notes: Option<String>,
    pub decline_reason: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<String>)]
    pub business_justification: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<String>)]
    pub reason: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<Uuid>)]
    pub category_id: Option<Option<Uuid>>,
}

/// Distinguishes an explicit `null` (`Some(None)`) from an absent key (`None`).
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Accepts `""` as an absent priority.
fn blank_priority<'de, D>(deserializer: D) -> Result<Option<Priority>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) if !raw.trim().is_empty() => {
            Priority::deserialize(serde::de::value::StrDeserializer::<D::Error>::new(raw.trim()))
                .map(Some)
        }
        _ => Ok(None),
    }
}

/// Empty strings count as "not supplied".
fn supplied(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Resolve the canonical action: explicit `action` first, then the legacy
/// status alias.
pub fn resolve_action(input: &TransitionInput) -> Result<Action, WorkflowError> {
    if let Some(name) = input.action.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        return Ok(Action::from_name(name));
    }
    input
        .status
        .as_deref()
        .map(str::trim)
        .and_then(Action::from_legacy_status)
        .ok_or(WorkflowError::MissingAction)
}

/// A decline must carry a non-blank reason.
pub fn require_decline_reason(input: &TransitionInput) -> Result<String, WorkflowError> {
    supplied(&input.decline_reason)
        .ok_or_else(|| WorkflowError::Validation("Decline reason is required".to_string()))
}

type FieldWriter = fn(&FeatureRequest, &Principal, &TransitionInput) -> RequestPatch;

pub struct TransitionRule {
    pub action: Action,
    pub role: Role,
    pub from: &'static [RequestStatus],
    pub to: RequestStatus,
    /// Returned as the `InvalidState` message when `from` is not satisfied.
    pub requirement: &'static str,
    write: FieldWriter,
}

impl TransitionRule {
    pub fn permits(&self, status: RequestStatus) -> bool {
        self.from.contains(&status)
    }
}

pub static TRANSITIONS: &[TransitionRule] = &[
    TransitionRule {
        action: Action::SupportReview,
        role: Role::Support,
        from: &[RequestStatus::Submitted, RequestStatus::Returned],
        to: RequestStatus::UnderReview,
        requirement: "Request must be submitted or returned to start support review",
        write: write_support_review,
    },
    TransitionRule {
        action: Action::SubmitToAdmin,
        role: Role::Support,
        from: &[RequestStatus::UnderReview],
        to: RequestStatus::FinalReview,
        requirement: "Request must be under review to submit to admin",
        write: write_submit_to_admin,
    },
    TransitionRule {
        action: Action::Accept,
        role: Role::Admin,
        from: &[RequestStatus::FinalReview],
        to: RequestStatus::Accepted,
        requirement: "Request must be in final review to accept",
        write: write_accept,
    },
    TransitionRule {
        action: Action::Decline,
        role: Role::Admin,
        from: &[RequestStatus::FinalReview],
        to: RequestStatus::Declined,
        requirement: "Request must be in final review to decline",
        write: write_decline,
    },
    TransitionRule {
        action: Action::ReturnToSupport,
        role: Role::Admin,
        from: &[RequestStatus::FinalReview],
        to: RequestStatus::Returned,
        requirement: "Request must be in final review to return",
        write: write_return_to_support,
    },
];

pub static CREATOR_EDIT: TransitionRule = TransitionRule {
    action: Action::Edit,
    role: Role::User,
    from: &[RequestStatus::Submitted],
    to: RequestStatus::Submitted,
    requirement: "Can only edit requests that are still submitted",
    write: write_creator_edit,
};

fn write_support_review(
    _request: &FeatureRequest,
    principal: &Principal,
    input: &TransitionInput,
) -> RequestPatch {
    RequestPatch {
        support_reviewer_id: Some(principal.id),
        priority: input.priority,
        support_notes: supplied(&input.support_notes),
        ..RequestPatch::default()
    }
}

fn write_submit_to_admin(
    _request: &FeatureRequest,
    _principal: &Principal,
    input: &TransitionInput,
) -> RequestPatch {
    RequestPatch {
        priority: input.priority,
        support_notes: supplied(&input.support_notes),
        ..RequestPatch::default()
    }
}

fn write_accept(
    request: &FeatureRequest,
    principal: &Principal,
    input: &TransitionInput,
) -> RequestPatch {
    RequestPatch {
        admin_reviewer_id: Some(principal.id),
        final_priority: input.final_priority.or(request.priority),
        admin_notes: supplied(&input.admin_notes),
        ..RequestPatch::default()
    }
}

fn write_decline(
    _request: &FeatureRequest,
    principal: &Principal,
    input: &TransitionInput,
) -> RequestPatch {
    RequestPatch {
        admin_reviewer_id: Some(principal.id),
        decline_reason: supplied(&input.decline_reason),
        admin_notes: supplied(&input.admin_notes),
        ..RequestPatch::default()
    }
}

fn write_return_to_support(
    _request: &FeatureRequest,
    _principal: &Principal,
    input: &TransitionInput,
) -> RequestPatch {
    RequestPatch {
        admin_notes: supplied(&input.admin_notes),
        ..RequestPatch::default()
    }
}

fn write_creator_edit(
    _request: &FeatureRequest,
    _principal: &Principal,
    input: &TransitionInput,
) -> RequestPatch {
    RequestPatch {
        title: supplied(&input.title),
        description: supplied(&input.description),
        business_justification: input.business_justification.clone(),
        reason: input.reason.clone(),
        category_id: input.category_id,
        ..RequestPatch::default()
    }
}

/// Look up the rule serving `action` for this caller on this request.
pub fn find_rule(
    principal: &Principal,
    request: &FeatureRequest,
    action: Action,
) -> Option<&'static TransitionRule> {
    TRANSITIONS
        .iter()
        .find(|rule| rule.action == action && rule.role == principal.role)
        .or_else(|| {
            (principal.role == Role::User && request.created_by_id == principal.id)
                .then_some(&CREATOR_EDIT)
        })
}

/// A checked transition, ready to be written with a compare-and-set on
/// `expected`.
#[derive(Debug)]
pub struct PlannedTransition {
    pub rule: &'static TransitionRule,
    pub expected: RequestStatus,
    pub patch: RequestPatch,
}

impl std::fmt::Debug for TransitionRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransitionRule")
            .field("action", &self.action)
            .field("role", &self.role)
            .field("from", &self.from)
            .field("to", &self.to)
            .finish()
    }
}

/// Decide whether `principal` may apply `action` to `request` and compute
/// the field writes.
pub fn plan_transition(
    principal: &Principal,
    request: &FeatureRequest,
    action: Action,
    input: &TransitionInput,
) -> Result<PlannedTransition, WorkflowError> {
    let rule = find_rule(principal, request, action)
        .ok_or_else(|| WorkflowError::Forbidden("Unauthorized action".to_string()))?;

    if !rule.permits(request.status) {
        return Err(WorkflowError::InvalidState(rule.requirement.to_string()));
    }
    if rule.action == Action::Decline {
        require_decline_reason(input)?;
    }

    let mut patch = (rule.write)(request, principal, input);
    if rule.to != request.status {
        patch.status = Some(rule.to);
    }

    Ok(PlannedTransition {
        rule,
        expected: request.status,
        patch,
    })
}
