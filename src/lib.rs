//! Quire is a small blog platform API that keeps posts consistent with their
//! authors.

#![forbid(unsafe_code)]
pub mod config;
pub mod crypto;
pub mod database;
pub mod error;
pub mod id;
pub mod middleware;
pub mod post;
pub mod reconcile;
mod router;
pub mod telemetry;
pub mod token;
pub mod user;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{Method, StatusCode, header};
use axum::routing::{get, post};
use axum::{Router, middleware as AxumMiddleware};
use error::ServerError;
use tower::ServiceBuilder;
use tower_http::LatencyUnit;
use tower_http::cors::{Any, CorsLayer};
use tower_http::sensitive_headers::SetSensitiveHeadersLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};

const TOKEN_SECRET_ENV: &str = "TOKEN_SECRET";

/// State sharing between routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::Configuration>,
    pub db: database::Database,
    pub crypto: Arc<crypto::PasswordManager>,
    pub token: token::TokenManager,
    pub admins: Arc<dyn middleware::AdminPolicy>,
    pub users: user::UserRepository,
    pub reconciler: reconcile::Reconciler,
}

/// Create router.
pub fn app(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        // Add high level tracing/logging to all requests.
        .layer(
            TraceLayer::new_for_http()
                .on_body_chunk(|chunk: &Bytes, latency: Duration, _span: &tracing::Span| {
                    tracing::trace!(size_bytes = chunk.len(), latency = ?latency, "sending body chunk")
                })
                .make_span_with(DefaultMakeSpan::new().include_headers(true).level(tracing::Level::INFO))
                .on_request(DefaultOnRequest::new())
                .on_response(DefaultOnResponse::new().include_headers(true).latency_unit(LatencyUnit::Micros)),
        )
        // Set a timeout.
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, Duration::from_secs(10)))
        // Remove senstive headers from trace.
        .layer(SetSensitiveHeadersLayer::new([header::AUTHORIZATION, header::COOKIE]))
        // Add CORS preflight support.
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE, Method::OPTIONS])
                .allow_headers(Any)
                .vary([header::AUTHORIZATION]),
        );

    Router::new()
        // `GET /status.json` goes to `status`.
        .route("/status.json", get(router::status::status))
        // `POST /register` goes to `register`.
        .route("/register", post(router::register::handler))
        // `POST /login` goes to `login`.
        .route("/login", post(router::login::handler))
        .nest("/users", router::users::router(state.clone()))
        .nest("/posts", router::posts::router())
        // Maintenance. Authorization checked by handlers.
        .route("/admin/cleanup", post(router::admin::cleanup))
        .route("/admin/cleanup/manual", get(router::admin::manual))
        .with_state(state)
        .route_layer(AxumMiddleware::from_fn(telemetry::track))
        .layer(middleware)
}

/// Build the application state from configuration and an opened store.
pub fn build_state(
    config: Arc<config::Configuration>,
    db: database::Database,
) -> Result<AppState, Box<dyn std::error::Error + Send + Sync>> {
    let crypto = crypto::PasswordManager::new(config.argon2.clone())?;

    let secret = match std::env::var(TOKEN_SECRET_ENV).ok().or_else(|| config.token.secret.clone()) {
        Some(secret) => secret,
        None => {
            tracing::warn!("no token secret configured, sessions will not survive a restart");
            hex::encode(rand::random::<[u8; 32]>())
        },
    };
    let mut token = token::TokenManager::new(&config.name, secret.as_bytes(), config.token.expires_in);
    if let Some(audience) = &config.token.audience {
        token.audience(audience);
    }

    let admins = middleware::StaticAdmins::from(&config.admin);
    if config.maintenance.open_manual_cleanup {
        tracing::warn!("`GET /admin/cleanup/manual` is served without authorization");
    }

    Ok(AppState {
        users: user::UserRepository::new(db.clone(), config.cascade),
        reconciler: reconcile::Reconciler::new(db.clone()),
        config,
        db,
        crypto: Arc::new(crypto),
        token,
        admins: Arc::new(admins),
    })
}

/// Open the store described by the configuration.
///
/// Without a `postgres` entry, data is kept in memory and lost on exit.
pub async fn connect(config: &config::Configuration) -> Result<database::Database, database::StoreError> {
    match config.postgres {
        Some(ref config) => {
            database::Database::postgres(
                &config.address,
                config
                    .username
                    .as_deref()
                    .unwrap_or(database::DEFAULT_CREDENTIALS),
                config
                    .password
                    .as_deref()
                    .unwrap_or(database::DEFAULT_CREDENTIALS),
                config
                    .database
                    .as_deref()
                    .unwrap_or(database::DEFAULT_DATABASE_NAME),
                config.pool_size.unwrap_or(database::DEFAULT_POOL_SIZE),
            )
            .await
        },
        None => {
            tracing::warn!("missing `postgres` entry on `config.yaml` file, using in-memory store");
            Ok(database::Database::memory())
        },
    }
}

/// Initialize the application state.
pub async fn initialize_state(
    config: Arc<config::Configuration>,
) -> Result<AppState, Box<dyn std::error::Error + Send + Sync>> {
    let db = connect(&config).await?;
    build_state(config, db)
}

/// Configuration used by tests: cheap hashing and one administrator.
#[cfg(test)]
pub(crate) fn test_config() -> config::Configuration {
    config::Configuration::default()
        .from_yaml(
            r#"
name: quire
token:
  secret: test-secret
admin:
  emails: ["admin@example.com"]
argon2:
  memory_cost: 1024
  iterations: 1
  parallelism: 1
  hash_length: 32
"#,
        )
        .expect("invalid test configuration")
}

#[cfg(test)]
pub(crate) fn state_with(config: config::Configuration, db: database::Database) -> AppState {
    build_state(Arc::new(config), db).expect("cannot build state")
}

/// Fresh state over an empty in-memory store.
#[cfg(test)]
pub(crate) fn state() -> AppState {
    state_with(test_config(), database::Database::memory())
}

#[cfg(test)]
pub(crate) async fn create_user(state: &AppState, name: &str, email: &str, password: &str) -> user::User {
    let user = user::User::builder()
        .name(name)
        .email(email)
        .password_hash(state.crypto.hash_password(password).expect("cannot hash password"))
        .build();
    state.db.users.insert(&user).await.expect("cannot insert user");
    user
}

#[cfg(test)]
pub(crate) async fn create_post(state: &AppState, author: &user::User, published: bool) -> post::Post {
    let post = post::Post::new(author.id.clone(), format!("{} writes", author.name), "Lorem ipsum.", published);
    state.db.posts.insert(&post).await.expect("cannot insert post");
    post
}

/// Session token of `user`.
#[cfg(test)]
pub(crate) fn session(state: &AppState, user: &user::User) -> String {
    state.token.create(user).expect("cannot create JWT")
}

/// MUST NEVER be used in production.
#[cfg(test)]
pub(crate) async fn make_request(
    token: Option<&str>,
    app: Router,
    method: Method,
    path: &str,
    body: String,
) -> axum::http::Response<axum::body::Body> {
    use axum::extract::Request;
    use tower::util::ServiceExt;

    let mut request = Request::builder()
        .method(method)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    app.oneshot(request.body(axum::body::Body::from(body)).unwrap())
        .await
        .unwrap()
}
