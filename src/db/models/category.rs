use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

pub const DEFAULT_CATEGORY_COLOR: &str = "#60B5FF";

#[derive(Serialize, Deserialize, Debug, Clone, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub color: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct NewCategory {
    pub name: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
}
