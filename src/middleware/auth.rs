use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use moka::sync::Cache; // ✅ High-performance TTL Cache
use sqlx::PgPool;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::api::auth::Claims;
use crate::app_state::AppState;
use crate::utils::api_response::ApiResponse;
use crate::workflow::{Principal, Role, WorkflowError};

/// ✅ **Resolved principals keyed by user id**
pub type PrincipalCache = Arc<Cache<Uuid, Principal>>;

/// ✅ **Initialize the `moka` Cache**
pub fn create_principal_cache(ttl: Duration) -> PrincipalCache {
    Arc::new(Cache::builder().time_to_live(ttl).build())
}

fn unauthenticated() -> Response {
    ApiResponse::<()>::from(WorkflowError::Unauthenticated).into_response()
}

/// ✅ **JWT Middleware** (Handles Token Authentication)
pub async fn jwt_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    let token = req
        .headers()
        .get("Authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| {
            debug!("Missing or malformed Authorization header");
            unauthenticated()
        })?;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.config.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        warn!("JWT decoding failed: {:?}", e);
        unauthenticated()
    })?;

    req.extensions_mut().insert(token_data.claims);
    Ok(next.run(req).await)
}

/// ✅ **Identity Middleware**: turns token claims into a [`Principal`]
/// carrying the account's current role.
pub async fn identity_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    let user_id = req
        .extensions()
        .get::<Claims>()
        .and_then(|claims| claims.user_id())
        .ok_or_else(unauthenticated)?;

    // ✅ **Check cache first before querying DB**
    let principal = match state.principals.get(&user_id) {
        Some(principal) => principal,
        None => {
            let principal = fetch_principal(user_id, &state.pool)
                .await
                .map_err(|e| {
                    error!("Failed to resolve principal {}: {:?}", user_id, e);
                    ApiResponse::<()>::from(e).into_response()
                })?
                // Token outlived its account.
                .ok_or_else(unauthenticated)?;
            state.principals.insert(user_id, principal);
            principal
        }
    };

    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}

async fn fetch_principal(user_id: Uuid, pool: &PgPool) -> Result<Option<Principal>, sqlx::Error> {
    let role = sqlx::query_scalar::<_, Role>("SELECT role FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(role.map(|role| Principal::new(user_id, role)))
}

impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = ApiResponse<()>;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .copied()
            .ok_or_else(|| WorkflowError::Unauthenticated.into())
    }
}
