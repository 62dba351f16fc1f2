use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::workflow::{Priority, RequestStatus};

#[derive(Serialize, Deserialize, Debug, FromRow, ToSchema)]
pub struct StatusCount {
    pub status: RequestStatus,
    pub count: i64,
}

#[derive(Serialize, Deserialize, Debug, FromRow, ToSchema)]
pub struct PriorityCount {
    pub priority: Priority,
    pub count: i64,
}

#[derive(Serialize, Deserialize, Debug, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CategoryCount {
    pub category_id: Uuid,
    pub category_name: String,
    pub color: String,
    pub count: i64,
}

#[derive(Serialize, Deserialize, Debug, FromRow, ToSchema)]
pub struct TimelinePoint {
    /// `YYYY-MM-DD`
    pub date: String,
    pub count: i64,
}

#[derive(Serialize, Deserialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSummary {
    pub total_requests: i64,
    pub pending_requests: i64,
    pub status_counts: Vec<StatusCount>,
    pub priority_counts: Vec<PriorityCount>,
    pub category_counts: Vec<CategoryCount>,
    pub timeline_data: Vec<TimelinePoint>,
}
