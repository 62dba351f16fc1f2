use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use bcrypt::{hash, verify, DEFAULT_COST};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi, ToSchema};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::config::Config;
use crate::db::models::user::{User, UserInfo};
use crate::db::queries::requests::classify;
use crate::db::store::StoreError;
use crate::utils::api_response::ApiResponse;
use crate::workflow::{Role, WorkflowError};

/// Tokens stay valid for 30 days.
const TOKEN_TTL_SECS: i64 = 30 * 24 * 60 * 60;

/// JWT Claims used for authentication.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject - User ID
    pub sub: String,
    pub email: String,
    /// Role at the time the token was issued. Authorization uses the live role.
    pub role: Role,
    /// Expiration timestamp (UNIX TIME)
    pub exp: usize,
}

impl Claims {
    pub fn user_id(&self) -> Option<Uuid> {
        self.sub.parse().ok()
    }
}

/// Represents a request to register a new account.
#[derive(Deserialize, ToSchema)]
pub struct SignupRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    /// Defaults to the local part of the email.
    pub name: Option<String>,
}

/// Represents a request to log in
#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Successful login: bearer token plus the account it belongs to.
#[derive(Serialize, ToSchema)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserInfo,
}

fn credentials(
    email: Option<String>,
    password: Option<String>,
) -> Result<(String, String), ApiResponse<()>> {
    let email = email.map(|e| e.trim().to_lowercase()).filter(|e| !e.is_empty());
    let password = password.filter(|p| !p.is_empty());
    match (email, password) {
        (Some(email), Some(password)) => Ok((email, password)),
        _ => Err(WorkflowError::Validation("Email and password are required".to_string()).into()),
    }
}

fn internal(context: &str, e: impl std::fmt::Display) -> ApiResponse<()> {
    error!("{}: {}", context, e);
    ApiResponse::error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error",
        Some(json!({ "kind": "INTERNAL_ERROR" })),
    )
}

/// Sign a token for `user` with the configured secret.
pub fn issue_token(config: &Config, user: &User) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = Claims {
        sub: user.id.to_string(),
        email: user.email.clone(),
        role: user.role,
        exp: (chrono::Utc::now().timestamp() + TOKEN_TTL_SECS) as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
}

/// Handles account registration. New accounts always get the USER role.
///
/// # Returns
/// * `201 Created` - The created account.
/// * `400 Bad Request` - Email or password missing.
/// * `409 Conflict` - The email is already registered.
#[utoipa::path(
    post,
    path = "/auth/signup",
    tag = "Authentication",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "Account created", body = UserInfo),
        (status = 400, description = "Email and password are required"),
        (status = 409, description = "User already exists"),
        (status = 500, description = "Internal Server Error")
    )
)]
pub async fn signup(
    State(pool): State<PgPool>,
    Json(payload): Json<SignupRequest>,
) -> Result<ApiResponse<UserInfo>, ApiResponse<()>> {
    let (email, password) = credentials(payload.email, payload.password)?;
    let name = payload
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| email.split('@').next().unwrap_or(&email).to_string());

    let password_hash =
        hash(&password, DEFAULT_COST).map_err(|e| internal("Password hashing failed", e))?;

    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (email, password_hash, name, role)
        VALUES ($1, $2, $3, 'USER')
        RETURNING id, email, password_hash, name, role, created_at, updated_at
        "#,
    )
    .bind(&email)
    .bind(&password_hash)
    .bind(&name)
    .fetch_one(&pool)
    .await
    .map_err(|e| match classify(e) {
        StoreError::Duplicate(_) => {
            warn!("Signup attempt for existing email: {}", email);
            ApiResponse::from(WorkflowError::Conflict("User already exists".to_string()))
        }
        other => ApiResponse::from(other),
    })?;

    info!("✅ Account created: {}", user.id);
    Ok(ApiResponse::success(StatusCode::CREATED, "User created", user.into()))
}

/// Handles credential login.
///
/// # Returns
/// * `200 OK` - A bearer token valid for 30 days.
/// * `401 Unauthorized` - Unknown email or wrong password.
#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "Authentication",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Successful login", body = LoginResponse),
        (status = 400, description = "Email and password are required"),
        (status = 401, description = "Invalid email or password"),
        (status = 500, description = "Internal Server Error")
    )
)]
pub async fn login(
    State(pool): State<PgPool>,
    State(config): State<Arc<Config>>,
    Json(payload): Json<LoginRequest>,
) -> Result<ApiResponse<LoginResponse>, ApiResponse<()>> {
    let (email, password) = credentials(payload.email, payload.password)?;

    let rejected = || {
        ApiResponse::<()>::error(
            StatusCode::UNAUTHORIZED,
            "Invalid email or password",
            Some(json!({ "kind": "UNAUTHENTICATED" })),
        )
    };

    let user = sqlx::query_as::<_, User>(
        "SELECT id, email, password_hash, name, role, created_at, updated_at FROM users WHERE email = $1",
    )
    .bind(&email)
    .fetch_optional(&pool)
    .await?
    .ok_or_else(|| {
        warn!("❌ Login attempt for unknown email: {}", email);
        rejected()
    })?;

    if !verify(&password, &user.password_hash).map_err(|e| internal("Password verification error", e))? {
        warn!("❌ Invalid password attempt for user: {}", user.id);
        return Err(rejected());
    }

    let token = issue_token(&config, &user).map_err(|e| internal("Token generation failed", e))?;
    info!("✅ Login successful for user: {}", user.id);
    Ok(ApiResponse::success(
        StatusCode::OK,
        "Login successful",
        LoginResponse { token, user: user.into() },
    ))
}

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
}

pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let mut components = openapi.components.clone().unwrap_or_default();
        components.add_security_scheme(
            "bearerAuth",
            SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
        );
        openapi.components = Some(components);
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(signup, login),
    components(schemas(SignupRequest, LoginRequest, LoginResponse, UserInfo)),
    tags((name = "Authentication", description = "Account signup and login"))
)]
pub struct AuthDoc;
