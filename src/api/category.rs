use axum::{routing::get, Router};

use crate::app_state::AppState;
use crate::db::queries::category::*;

pub fn category_routes() -> Router<AppState> {
    Router::new().route("/categories", get(get_categories).post(create_category))
}
