//! Tests against a real Postgres database.
//!
//! `#[sqlx::test]` creates a fresh database per test from `DATABASE_URL`
//! and applies `migrations/` before handing over the pool.

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use sqlx::PgPool;
use tower::ServiceExt;
use uuid::Uuid;

use feature_desk::api::auth::issue_token;
use feature_desk::app_state::AppState;
use feature_desk::build_router;
use feature_desk::config::Config;
use feature_desk::db::models::requests::{
    NewRequest, NewRequestRecord, RequestFilter, RequestPatch,
};
use feature_desk::db::models::user::User;
use feature_desk::db::queries::requests::PgRequestStore;
use feature_desk::db::store::{RequestStore, StoreError};
use feature_desk::middleware::auth::create_principal_cache;
use feature_desk::utils::notification::LogNotifier;
use feature_desk::workflow::{
    Principal, Priority, RequestEngine, RequestStatus, Role, TransitionInput, WorkflowError,
};

const PASSWORD: &str = "correct horse";

fn config() -> Arc<Config> {
    Arc::new(Config {
        database_url: String::new(),
        jwt_secret: "pg-test-secret".into(),
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        db_max_connections: 5,
        notify: None,
        app_url: None,
        log_dir: "logs".into(),
        principal_cache_ttl: Duration::from_secs(60),
    })
}

/// Insert a user row directly; cost 4 keeps bcrypt fast in tests.
async fn insert_user(pool: &PgPool, name: &str, role: Role) -> Principal {
    let hash = bcrypt::hash(PASSWORD, 4).unwrap();
    let id: Uuid = sqlx::query_scalar(
        "INSERT INTO users (email, password_hash, name, role) VALUES ($1, $2, $3, $4) RETURNING id",
    )
    .bind(format!("{}@example.com", name.to_lowercase()))
    .bind(hash)
    .bind(name)
    .bind(role)
    .fetch_one(pool)
    .await
    .unwrap();
    Principal::new(id, role)
}

fn engine(pool: &PgPool) -> RequestEngine {
    RequestEngine::new(Arc::new(PgRequestStore::new(pool.clone())), Arc::new(LogNotifier))
}

fn new_request(title: &str) -> NewRequest {
    NewRequest {
        title: Some(title.to_string()),
        description: Some(format!("{title} description")),
        ..Default::default()
    }
}

fn input(value: Value) -> TransitionInput {
    serde_json::from_value(value).unwrap()
}

struct PgApp {
    router: Router,
    config: Arc<Config>,
}

impl PgApp {
    fn new(pool: &PgPool) -> Self {
        let config = config();
        let state = AppState {
            pool: pool.clone(),
            engine: engine(pool),
            principals: create_principal_cache(config.principal_cache_ttl),
            config: Arc::clone(&config),
        };
        Self {
            router: build_router(state),
            config,
        }
    }

    fn token(&self, principal: Principal) -> String {
        let user = User {
            id: principal.id,
            email: String::new(),
            password_hash: String::new(),
            name: None,
            role: principal.role,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        issue_token(&self.config, &user).unwrap()
    }

    async fn call(
        &self,
        method: Method,
        uri: &str,
        as_user: Option<Principal>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(principal) = as_user {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", self.token(principal)));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }
}

#[sqlx::test(migrations = "./migrations")]
async fn concurrent_accepts_commit_exactly_once(pool: PgPool) {
    let user = insert_user(&pool, "Uma", Role::User).await;
    let support = insert_user(&pool, "Sam", Role::Support).await;
    let first = insert_user(&pool, "Ada", Role::Admin).await;
    let second = insert_user(&pool, "Alan", Role::Admin).await;
    let engine = engine(&pool);

    let id = engine.create_request(&user, new_request("SSO")).await.unwrap().request.id;
    engine
        .transition_request(&support, id, input(json!({ "action": "support_review", "priority": "HIGH" })))
        .await
        .unwrap();
    engine
        .transition_request(&support, id, input(json!({ "action": "submit_to_admin" })))
        .await
        .unwrap();

    let accept = move |engine: RequestEngine, admin: Principal| async move {
        engine
            .transition_request(&admin, id, input(json!({ "action": "accept" })))
            .await
    };
    let (a, b) = tokio::join!(
        tokio::spawn(accept(engine.clone(), first)),
        tokio::spawn(accept(engine.clone(), second)),
    );
    let outcomes = [a.unwrap(), b.unwrap()];

    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    let loser = outcomes.into_iter().find_map(Result::err).unwrap();
    assert_matches!(loser, WorkflowError::InvalidState(_));

    let stored = engine.get_request(&first, id).await.unwrap().request;
    assert_eq!(stored.status, RequestStatus::Accepted);
    assert_eq!(stored.final_priority, Some(Priority::High));
    assert!(stored.admin_reviewer_id == Some(first.id) || stored.admin_reviewer_id == Some(second.id));
}

#[sqlx::test(migrations = "./migrations")]
async fn conditional_update_skips_rows_in_another_state(pool: PgPool) {
    let user = insert_user(&pool, "Uma", Role::User).await;
    let store = PgRequestStore::new(pool.clone());
    let id = engine(&pool).create_request(&user, new_request("Export")).await.unwrap().request.id;

    let patch = RequestPatch {
        status: Some(RequestStatus::Accepted),
        ..Default::default()
    };
    let stale = store
        .update_request_if_status(id, RequestStatus::FinalReview, &patch)
        .await
        .unwrap();
    assert!(stale.is_none());

    let missing = store
        .update_request_if_status(Uuid::new_v4(), RequestStatus::Submitted, &patch)
        .await
        .unwrap();
    assert!(missing.is_none());

    let applied = store
        .update_request_if_status(id, RequestStatus::Submitted, &patch)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(applied.status, RequestStatus::Accepted);
    assert_eq!(applied.title, "Export");
}

#[sqlx::test(migrations = "./migrations")]
async fn support_sees_open_queue_and_own_reviews(pool: PgPool) {
    let user = insert_user(&pool, "Uma", Role::User).await;
    let other_user = insert_user(&pool, "Otto", Role::User).await;
    let sam = insert_user(&pool, "Sam", Role::Support).await;
    let sue = insert_user(&pool, "Sue", Role::Support).await;
    let engine = engine(&pool);

    let open = engine.create_request(&user, new_request("Open")).await.unwrap().request.id;
    let mine = engine.create_request(&user, new_request("Mine")).await.unwrap().request.id;
    let theirs = engine.create_request(&other_user, new_request("Theirs")).await.unwrap().request.id;
    for (support, id) in [(sam, mine), (sue, theirs)] {
        engine
            .transition_request(&support, id, input(json!({ "action": "support_review" })))
            .await
            .unwrap();
    }

    let listed: Vec<Uuid> = engine
        .list_requests(&sam, &RequestFilter::default())
        .await
        .unwrap()
        .into_iter()
        .map(|d| d.request.id)
        .collect();
    assert_eq!(listed, vec![mine, open]);

    let own: Vec<Uuid> = engine
        .list_requests(&other_user, &RequestFilter::default())
        .await
        .unwrap()
        .into_iter()
        .map(|d| d.request.id)
        .collect();
    assert_eq!(own, vec![theirs]);

    let filtered = engine
        .list_requests(
            &sam,
            &RequestFilter {
                status: Some("UNDER_REVIEW".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].created_by.name.as_deref(), Some("Uma"));
}

#[sqlx::test(migrations = "./migrations")]
async fn foreign_key_violations_name_the_missing_row(pool: PgPool) {
    let user = insert_user(&pool, "Uma", Role::User).await;
    let store = PgRequestStore::new(pool.clone());
    let record = |created_by_id: Uuid, category_id: Option<Uuid>| NewRequestRecord {
        title: "Orphan".into(),
        description: "No parent".into(),
        business_justification: None,
        reason: None,
        category_id,
        requested_by: None,
        created_by_id,
        attachments: Vec::new(),
    };

    let err = store.insert_request(record(Uuid::new_v4(), None)).await.unwrap_err();
    assert_matches!(err, StoreError::MissingReference("user"));

    let err = store
        .insert_request(record(user.id, Some(Uuid::new_v4())))
        .await
        .unwrap_err();
    assert_matches!(err, StoreError::MissingReference("category"));

    let err = store.insert_note(Uuid::new_v4(), user.id, "hello").await.unwrap_err();
    assert_matches!(err, StoreError::MissingReference("request"));
}

#[sqlx::test(migrations = "./migrations")]
async fn notes_hydrate_author_newest_first(pool: PgPool) {
    let user = insert_user(&pool, "Uma", Role::User).await;
    let support = insert_user(&pool, "Sam", Role::Support).await;
    let engine = engine(&pool);
    let id = engine.create_request(&user, new_request("Search")).await.unwrap().request.id;

    engine.add_note(&support, id, Some("first".into())).await.unwrap();
    engine.add_note(&user, id, Some("second".into())).await.unwrap();

    let detail = engine.get_request(&user, id).await.unwrap();
    let contents: Vec<&str> = detail.notes.iter().map(|n| n.content.as_str()).collect();
    assert_eq!(contents, ["second", "first"]);
    assert_eq!(detail.notes[1].user.role, Role::Support);

    engine.delete_request(&user, id).await.unwrap();
    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM request_notes")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(remaining, 0);
}

#[sqlx::test(migrations = "./migrations")]
async fn admin_patch_leaves_blank_fields_unchanged(pool: PgPool) {
    let admin = insert_user(&pool, "Ada", Role::Admin).await;
    let user = insert_user(&pool, "Uma", Role::User).await;
    let app = PgApp::new(&pool);

    let (status, body) = app
        .call(
            Method::PATCH,
            &format!("/users/{}", user.id),
            Some(admin),
            Some(json!({ "name": "New name", "email": "", "password": "" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "New name");
    assert_eq!(body["data"]["email"], "uma@example.com");

    let (status, _) = app
        .call(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "email": "uma@example.com", "password": PASSWORD })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .call(
            Method::PATCH,
            &format!("/users/{}", user.id),
            Some(admin),
            Some(json!({ "email": "  ", "password": "" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "No fields to update");
}

#[sqlx::test(migrations = "./migrations")]
async fn admin_user_changes_apply_to_the_next_request(pool: PgPool) {
    let admin = insert_user(&pool, "Ada", Role::Admin).await;
    let user = insert_user(&pool, "Uma", Role::User).await;
    let viewer = insert_user(&pool, "Vic", Role::Viewer).await;
    let app = PgApp::new(&pool);

    // Warm the identity cache with the old role.
    let (status, _) = app.call(Method::GET, "/requests", Some(user), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .call(
            Method::PATCH,
            &format!("/users/{}", viewer.id),
            Some(admin),
            Some(json!({ "email": "uma@example.com" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "Email already in use");

    let (status, body) = app
        .call(Method::DELETE, &format!("/users/{}", user.id), Some(admin), None)
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (status, body) = app.call(Method::GET, "/requests", Some(user), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["errors"]["kind"], "UNAUTHENTICATED");

    let (status, _) = app
        .call(Method::DELETE, &format!("/users/{}", user.id), Some(admin), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app.call(Method::GET, "/users", Some(admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
}

#[sqlx::test(migrations = "./migrations")]
async fn duplicate_category_and_signup_are_conflicts(pool: PgPool) {
    let admin = insert_user(&pool, "Ada", Role::Admin).await;
    let app = PgApp::new(&pool);

    let (status, body) = app
        .call(Method::POST, "/categories", Some(admin), Some(json!({ "name": "UI/UX" })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["color"], "#60B5FF");

    let (status, body) = app
        .call(Method::POST, "/categories", Some(admin), Some(json!({ "name": "UI/UX" })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["errors"]["kind"], "CONFLICT");

    let signup = json!({ "email": "New@Example.com", "password": "pw" });
    let (status, body) = app.call(Method::POST, "/auth/signup", None, Some(signup.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["role"], "USER");
    assert_eq!(body["data"]["email"], "new@example.com");

    let (status, body) = app.call(Method::POST, "/auth/signup", None, Some(signup)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "User already exists");
}

#[sqlx::test(migrations = "./migrations")]
async fn analytics_counts_every_request(pool: PgPool) {
    let user = insert_user(&pool, "Uma", Role::User).await;
    let support = insert_user(&pool, "Sam", Role::Support).await;
    let admin = insert_user(&pool, "Ada", Role::Admin).await;
    let category: Uuid = sqlx::query_scalar("INSERT INTO categories (name) VALUES ('Reports') RETURNING id")
        .fetch_one(&pool)
        .await
        .unwrap();
    let engine = engine(&pool);

    let categorized = NewRequest {
        category_id: Some(category),
        ..new_request("Charts")
    };
    engine.create_request(&user, categorized).await.unwrap();
    let id = engine.create_request(&user, new_request("Export")).await.unwrap().request.id;
    engine
        .transition_request(&support, id, input(json!({ "action": "support_review", "priority": "LOW" })))
        .await
        .unwrap();
    engine
        .transition_request(&support, id, input(json!({ "action": "submit_to_admin" })))
        .await
        .unwrap();
    engine
        .transition_request(&admin, id, input(json!({ "action": "decline", "declineReason": "Out of scope" })))
        .await
        .unwrap();

    let app = PgApp::new(&pool);
    let (status, body) = app.call(Method::GET, "/analytics", Some(user), None).await;
    assert_eq!(status, StatusCode::OK);
    let data = &body["data"];
    assert_eq!(data["totalRequests"], 2);
    assert_eq!(data["pendingRequests"], 1);
    assert_eq!(data["priorityCounts"], json!([{ "priority": "LOW", "count": 1 }]));
    assert_eq!(data["categoryCounts"][0]["categoryName"], "Reports");
    assert_eq!(data["timelineData"].as_array().unwrap().len(), 1);
    assert_eq!(data["timelineData"][0]["count"], 2);
}
