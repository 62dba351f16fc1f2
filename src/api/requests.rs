use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use utoipa::OpenApi;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::db::models::requests::{
    Attachment, CategorySummary, FeatureRequest, NewAttachment, NewNote, NewRequest, NoteAuthor,
    NoteView, RequestDetail, RequestFilter, UserSummary,
};
use crate::utils::api_response::ApiResponse;
use crate::workflow::{Principal, Priority, RequestEngine, RequestStatus, Role, TransitionInput};

pub fn request_routes() -> Router<AppState> {
    Router::new()
        .route("/requests", get(list_requests).post(create_request))
        .route(
            "/requests/{id}",
            get(get_request)
                .put(update_request)
                .patch(update_request)
                .delete(delete_request),
        )
        .route("/requests/{id}/notes", post(add_note))
}

#[utoipa::path(
    post,
    path = "/requests",
    request_body = NewRequest,
    responses(
        (status = 201, description = "Feature request created", body = RequestDetail),
        (status = 400, description = "Title and description are required"),
        (status = 401, description = "Authentication required")
    ),
    tag = "Requests",
    security(("bearerAuth" = []))
)]
pub async fn create_request(
    State(engine): State<RequestEngine>,
    principal: Principal,
    Json(payload): Json<NewRequest>,
) -> Result<ApiResponse<RequestDetail>, ApiResponse<()>> {
    let detail = engine.create_request(&principal, payload).await?;
    Ok(ApiResponse::success(
        StatusCode::CREATED,
        "Feature request created",
        detail,
    ))
}

/// Lists the requests visible to the caller, newest first.
#[utoipa::path(
    get,
    path = "/requests",
    params(RequestFilter),
    responses(
        (status = 200, description = "Visible requests", body = [RequestDetail]),
        (status = 400, description = "Unknown status filter")
    ),
    tag = "Requests",
    security(("bearerAuth" = []))
)]
pub async fn list_requests(
    State(engine): State<RequestEngine>,
    principal: Principal,
    Query(filter): Query<RequestFilter>,
) -> Result<ApiResponse<Vec<RequestDetail>>, ApiResponse<()>> {
    let requests = engine.list_requests(&principal, &filter).await?;
    Ok(ApiResponse::success(
        StatusCode::OK,
        "Requests retrieved successfully",
        requests,
    ))
}

#[utoipa::path(
    get,
    path = "/requests/{id}",
    params(("id" = Uuid, Path, description = "Request ID")),
    responses(
        (status = 200, description = "Request with creator, category, attachments and notes", body = RequestDetail),
        (status = 404, description = "Request not found")
    ),
    tag = "Requests",
    security(("bearerAuth" = []))
)]
pub async fn get_request(
    State(engine): State<RequestEngine>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<RequestDetail>, ApiResponse<()>> {
    let detail = engine.get_request(&principal, id).await?;
    Ok(ApiResponse::success(
        StatusCode::OK,
        "Request retrieved successfully",
        detail,
    ))
}

/// Applies a lifecycle action (or a creator edit) to a request.
///
/// The action comes from `action`, or from the legacy `status` field for
/// ACCEPTED, DECLINED and RETURNED. Served for both PUT and PATCH.
#[utoipa::path(
    patch,
    path = "/requests/{id}",
    params(("id" = Uuid, Path, description = "Request ID")),
    request_body = TransitionInput,
    responses(
        (status = 200, description = "Request updated", body = RequestDetail),
        (status = 400, description = "Missing action, invalid state or validation error"),
        (status = 403, description = "Action not permitted for this role"),
        (status = 404, description = "Request not found")
    ),
    tag = "Requests",
    security(("bearerAuth" = []))
)]
pub async fn update_request(
    State(engine): State<RequestEngine>,
    principal: Principal,
    Path(id): Path<Uuid>,
    Json(payload): Json<TransitionInput>,
) -> Result<ApiResponse<RequestDetail>, ApiResponse<()>> {
    let detail = engine.transition_request(&principal, id, payload).await?;
    Ok(ApiResponse::success(
        StatusCode::OK,
        "Request updated successfully",
        detail,
    ))
}

#[utoipa::path(
    delete,
    path = "/requests/{id}",
    params(("id" = Uuid, Path, description = "Request ID")),
    responses(
        (status = 200, description = "Request deleted"),
        (status = 403, description = "Unauthorized to delete this request"),
        (status = 404, description = "Request not found")
    ),
    tag = "Requests",
    security(("bearerAuth" = []))
)]
pub async fn delete_request(
    State(engine): State<RequestEngine>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<()>, ApiResponse<()>> {
    engine.delete_request(&principal, id).await?;
    Ok(ApiResponse::success(
        StatusCode::OK,
        "Request deleted successfully",
        (),
    ))
}

#[utoipa::path(
    post,
    path = "/requests/{id}/notes",
    params(("id" = Uuid, Path, description = "Request ID")),
    request_body = NewNote,
    responses(
        (status = 201, description = "Note added", body = NoteView),
        (status = 400, description = "Note content is required"),
        (status = 404, description = "Request not found")
    ),
    tag = "Requests",
    security(("bearerAuth" = []))
)]
pub async fn add_note(
    State(engine): State<RequestEngine>,
    principal: Principal,
    Path(id): Path<Uuid>,
    Json(payload): Json<NewNote>,
) -> Result<ApiResponse<NoteView>, ApiResponse<()>> {
    let note = engine.add_note(&principal, id, payload.content).await?;
    Ok(ApiResponse::success(StatusCode::CREATED, "Note added", note))
}

#[derive(OpenApi)]
#[openapi(
    paths(create_request, list_requests, get_request, update_request, delete_request, add_note),
    components(schemas(
        FeatureRequest,
        RequestDetail,
        NewRequest,
        NewAttachment,
        Attachment,
        UserSummary,
        CategorySummary,
        NoteView,
        NoteAuthor,
        NewNote,
        TransitionInput,
        RequestStatus,
        Priority,
        Role
    )),
    tags((name = "Requests", description = "Feature request lifecycle"))
)]
pub struct RequestDoc;
