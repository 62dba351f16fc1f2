pub mod api;
pub mod app_state;
pub mod config;
pub mod db;
pub mod middleware;
pub mod utils;
pub mod workflow;

use axum::middleware::from_fn_with_state;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::analytics::analytics_routes;
use crate::api::auth::{AuthDoc, SecurityAddon};
use crate::api::category::category_routes;
use crate::api::requests::{request_routes, RequestDoc};
use crate::api::user::user_routes;
use crate::app_state::AppState;
use crate::db::queries::analytics::AnalyticsDoc;
use crate::db::queries::category::CategoryDoc;
use crate::db::queries::user::UserDoc;
use crate::middleware::auth::{identity_middleware, jwt_middleware};

/// Merged OpenAPI document for every route group.
pub fn api_doc() -> utoipa::openapi::OpenApi {
    let mut doc = AuthDoc::openapi()
        .merge_from(RequestDoc::openapi())
        .merge_from(UserDoc::openapi())
        .merge_from(CategoryDoc::openapi())
        .merge_from(AnalyticsDoc::openapi());
    SecurityAddon.modify(&mut doc);
    doc
}

/// Build the full application router.
///
/// Everything outside `/auth` and `/health` requires a bearer token that
/// resolves to an existing account.
pub fn build_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .merge(api::health::health_routes())
        .merge(api::auth::auth_routes());

    let private_routes = Router::new()
        .merge(request_routes())
        .merge(user_routes())
        .merge(category_routes())
        .merge(analytics_routes())
        .route_layer(from_fn_with_state(state.clone(), identity_middleware))
        .route_layer(from_fn_with_state(state.clone(), jwt_middleware));

    Router::new()
        .merge(public_routes)
        .merge(private_routes)
        .merge(SwaggerUi::new("/swagger").url("/api-docs/openapi.json", api_doc()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
