use axum::{
    routing::{get, patch},
    Router,
};

use crate::app_state::AppState;
use crate::db::queries::user::*;

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(get_all_users))
        .route("/users/{id}", patch(update_user).delete(delete_user))
}
