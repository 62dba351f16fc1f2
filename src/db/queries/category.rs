use axum::{extract::State, http::StatusCode, Json};
use sqlx::PgPool;
use tracing::info;
use utoipa::OpenApi;

use crate::db::models::category::{Category, NewCategory, DEFAULT_CATEGORY_COLOR};
use crate::db::queries::requests::classify;
use crate::db::store::StoreError;
use crate::utils::api_response::ApiResponse;
use crate::workflow::{Principal, Role, WorkflowError};

#[utoipa::path(
    get,
    path = "/categories",
    responses(
        (status = 200, description = "All categories ordered by name", body = [Category])
    ),
    tag = "Categories",
    security(("bearerAuth" = []))
)]
pub async fn get_categories(
    State(pool): State<PgPool>,
    _principal: Principal,
) -> Result<ApiResponse<Vec<Category>>, ApiResponse<()>> {
    let categories = sqlx::query_as::<_, Category>(
        "SELECT id, name, description, color, created_at FROM categories ORDER BY name ASC",
    )
    .fetch_all(&pool)
    .await?;

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Categories retrieved successfully",
        categories,
    ))
}

#[utoipa::path(
    post,
    path = "/categories",
    request_body = NewCategory,
    responses(
        (status = 201, description = "Category created", body = Category),
        (status = 400, description = "Category name is required"),
        (status = 403, description = "Admin role required"),
        (status = 409, description = "Category already exists")
    ),
    tag = "Categories",
    security(("bearerAuth" = []))
)]
pub async fn create_category(
    State(pool): State<PgPool>,
    principal: Principal,
    Json(payload): Json<NewCategory>,
) -> Result<ApiResponse<Category>, ApiResponse<()>> {
    principal.require_role(Role::Admin)?;

    let name = payload
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| WorkflowError::Validation("Category name is required".to_string()))?;
    let color = payload
        .color
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_CATEGORY_COLOR.to_string());

    let category = sqlx::query_as::<_, Category>(
        r#"
        INSERT INTO categories (name, description, color)
        VALUES ($1, $2, $3)
        RETURNING id, name, description, color, created_at
        "#,
    )
    .bind(&name)
    .bind(payload.description.filter(|d| !d.trim().is_empty()))
    .bind(&color)
    .fetch_one(&pool)
    .await
    .map_err(|e| match classify(e) {
        StoreError::Duplicate(_) => {
            ApiResponse::from(WorkflowError::Conflict("Category already exists".to_string()))
        }
        other => ApiResponse::from(other),
    })?;

    info!(category_id = %category.id, "Category created");
    Ok(ApiResponse::success(
        StatusCode::CREATED,
        "Category created",
        category,
    ))
}

#[derive(OpenApi)]
#[openapi(
    paths(get_categories, create_category),
    components(schemas(Category, NewCategory)),
    tags((name = "Categories", description = "Request categories"))
)]
pub struct CategoryDoc;
