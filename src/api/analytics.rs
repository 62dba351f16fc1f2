use axum::{routing::get, Router};

use crate::app_state::AppState;
use crate::db::queries::analytics::get_analytics;

pub fn analytics_routes() -> Router<AppState> {
    Router::new().route("/analytics", get(get_analytics))
}
