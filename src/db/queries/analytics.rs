use axum::{extract::State, http::StatusCode};
use sqlx::PgPool;
use utoipa::OpenApi;

use crate::db::models::analytics::{
    AnalyticsSummary, CategoryCount, PriorityCount, StatusCount, TimelinePoint,
};
use crate::utils::api_response::ApiResponse;
use crate::workflow::Principal;

/// Aggregate request counts for dashboards.
///
/// Every authenticated role may read this; counts are not scoped by visibility.
#[utoipa::path(
    get,
    path = "/analytics",
    responses(
        (status = 200, description = "Request statistics", body = AnalyticsSummary),
        (status = 401, description = "Authentication required")
    ),
    tag = "Analytics",
    security(("bearerAuth" = []))
)]
pub async fn get_analytics(
    State(pool): State<PgPool>,
    _principal: Principal,
) -> Result<ApiResponse<AnalyticsSummary>, ApiResponse<()>> {
    let total_requests: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM requests")
        .fetch_one(&pool)
        .await?;

    let pending_requests: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM requests WHERE status NOT IN ('ACCEPTED', 'DECLINED')",
    )
    .fetch_one(&pool)
    .await?;

    let status_counts = sqlx::query_as::<_, StatusCount>(
        "SELECT status, COUNT(*) AS count FROM requests GROUP BY status ORDER BY status",
    )
    .fetch_all(&pool)
    .await?;

    let priority_counts = sqlx::query_as::<_, PriorityCount>(
        r#"
        SELECT priority, COUNT(*) AS count
        FROM requests
        WHERE priority IS NOT NULL
        GROUP BY priority
        ORDER BY priority
        "#,
    )
    .fetch_all(&pool)
    .await?;

    let category_counts = sqlx::query_as::<_, CategoryCount>(
        r#"
        SELECT r.category_id,
               COALESCE(c.name, 'Uncategorized') AS category_name,
               COALESCE(c.color, '#888888') AS color,
               COUNT(*) AS count
        FROM requests r
        LEFT JOIN categories c ON c.id = r.category_id
        WHERE r.category_id IS NOT NULL
        GROUP BY r.category_id, c.name, c.color
        ORDER BY count DESC
        "#,
    )
    .fetch_all(&pool)
    .await?;

    // Days without requests are omitted rather than zero-filled.
    let timeline_data = sqlx::query_as::<_, TimelinePoint>(
        r#"
        SELECT to_char(created_at AT TIME ZONE 'UTC', 'YYYY-MM-DD') AS date, COUNT(*) AS count
        FROM requests
        WHERE created_at >= NOW() - INTERVAL '30 days'
        GROUP BY 1
        ORDER BY 1
        "#,
    )
    .fetch_all(&pool)
    .await?;

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Analytics retrieved successfully",
        AnalyticsSummary {
            total_requests,
            pending_requests,
            status_counts,
            priority_counts,
            category_counts,
            timeline_data,
        },
    ))
}

#[derive(OpenApi)]
#[openapi(
    paths(get_analytics),
    components(schemas(AnalyticsSummary, StatusCount, PriorityCount, CategoryCount, TimelinePoint)),
    tags((name = "Analytics", description = "Request statistics"))
)]
pub struct AnalyticsDoc;
