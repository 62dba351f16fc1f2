use std::sync::Arc;

use axum::extract::FromRef;
use sqlx::PgPool;

use crate::config::Config;
use crate::middleware::auth::PrincipalCache;
use crate::workflow::RequestEngine;

/// Shared state for every router. Handlers extract just the field they need.
#[derive(Clone, FromRef)]
pub struct AppState {
    pub pool: PgPool,
    pub engine: RequestEngine,
    pub principals: PrincipalCache,
    pub config: Arc<Config>,
}
