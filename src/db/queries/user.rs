use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use bcrypt::{hash, DEFAULT_COST};
use serde_json::json;
use sqlx::{PgPool, QueryBuilder};
use tracing::{error, info};
use utoipa::OpenApi;
use uuid::Uuid;

use crate::db::models::user::{UpdateUser, UserInfo};
use crate::db::queries::requests::classify;
use crate::db::store::StoreError;
use crate::middleware::auth::PrincipalCache;
use crate::utils::api_response::ApiResponse;
use crate::workflow::{Principal, Role, WorkflowError};

const USER_INFO_COLUMNS: &str = "id, email, name, role, created_at";

#[utoipa::path(
    get,
    path = "/users",
    responses(
        (status = 200, description = "List all users", body = [UserInfo]),
        (status = 403, description = "Admin role required")
    ),
    tag = "Users",
    security(("bearerAuth" = []))
)]
pub async fn get_all_users(
    State(pool): State<PgPool>,
    principal: Principal,
) -> Result<ApiResponse<Vec<UserInfo>>, ApiResponse<()>> {
    principal.require_role(Role::Admin)?;

    let users = sqlx::query_as::<_, UserInfo>(&format!(
        "SELECT {USER_INFO_COLUMNS} FROM users ORDER BY created_at DESC"
    ))
    .fetch_all(&pool)
    .await?;

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Users retrieved successfully",
        users,
    ))
}

#[utoipa::path(
    patch,
    path = "/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = UpdateUser,
    responses(
        (status = 200, description = "User updated successfully", body = UserInfo),
        (status = 400, description = "Nothing to update, or an admin changing their own role"),
        (status = 403, description = "Admin role required"),
        (status = 404, description = "User not found"),
        (status = 409, description = "Email already in use")
    ),
    tag = "Users",
    security(("bearerAuth" = []))
)]
pub async fn update_user(
    State(pool): State<PgPool>,
    State(principals): State<PrincipalCache>,
    principal: Principal,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateUser>,
) -> Result<ApiResponse<UserInfo>, ApiResponse<()>> {
    principal.require_role(Role::Admin)?;
    let payload = payload.without_blanks();

    if id == principal.id && payload.role.is_some_and(|role| role != principal.role) {
        return Err(WorkflowError::Validation("Cannot change your own role".to_string()).into());
    }
    if payload.is_empty() {
        return Err(WorkflowError::Validation("No fields to update".to_string()).into());
    }

    let password_hash = match payload.password.as_deref() {
        Some(password) => Some(hash(password, DEFAULT_COST).map_err(|e| {
            error!("Password hashing failed: {}", e);
            ApiResponse::<()>::error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
                Some(json!({ "kind": "INTERNAL_ERROR" })),
            )
        })?),
        None => None,
    };

    let mut query_builder = QueryBuilder::new("UPDATE users SET ");
    let mut separated = query_builder.separated(", ");
    if let Some(name) = &payload.name {
        separated.push("name = ").push_bind_unseparated(name);
    }
    if let Some(email) = &payload.email {
        separated
            .push("email = ")
            .push_bind_unseparated(email.trim().to_lowercase());
    }
    if let Some(password_hash) = password_hash {
        separated
            .push("password_hash = ")
            .push_bind_unseparated(password_hash);
    }
    if let Some(role) = payload.role {
        separated.push("role = ").push_bind_unseparated(role);
    }
    separated.push("updated_at = NOW()");
    query_builder.push(" WHERE id = ").push_bind(id);
    query_builder.push(format!(" RETURNING {USER_INFO_COLUMNS}"));

    let user = query_builder
        .build_query_as::<UserInfo>()
        .fetch_optional(&pool)
        .await
        .map_err(|e| match classify(e) {
            StoreError::Duplicate(_) => {
                ApiResponse::from(WorkflowError::Conflict("Email already in use".to_string()))
            }
            other => ApiResponse::from(other),
        })?
        .ok_or_else(|| ApiResponse::from(WorkflowError::NotFound("User not found".to_string())))?;

    // Role changes must apply to the next request, not after the TTL.
    principals.invalidate(&id);
    info!(user_id = %id, admin = %principal.id, "User updated");

    Ok(ApiResponse::success(
        StatusCode::OK,
        "User updated successfully",
        user,
    ))
}

#[utoipa::path(
    delete,
    path = "/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "User deleted successfully"),
        (status = 400, description = "Cannot delete your own account"),
        (status = 403, description = "Admin role required"),
        (status = 404, description = "User not found")
    ),
    tag = "Users",
    security(("bearerAuth" = []))
)]
pub async fn delete_user(
    State(pool): State<PgPool>,
    State(principals): State<PrincipalCache>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<()>, ApiResponse<()>> {
    principal.require_role(Role::Admin)?;

    if id == principal.id {
        return Err(WorkflowError::Validation("Cannot delete your own account".to_string()).into());
    }

    let result = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(WorkflowError::NotFound("User not found".to_string()).into());
    }

    principals.invalidate(&id);
    info!(user_id = %id, admin = %principal.id, "User deleted");

    Ok(ApiResponse::success(
        StatusCode::OK,
        "User deleted successfully",
        (),
    ))
}

#[derive(OpenApi)]
#[openapi(
    paths(get_all_users, update_user, delete_user),
    components(schemas(UserInfo, UpdateUser)),
    tags((name = "Users", description = "Account administration"))
)]
pub struct UserDoc;
