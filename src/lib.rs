//! Octogate - Sign in with GitHub
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      HTTP Layer (Axum)                       │
//! │  - Visitor session + GitHub authentication middleware        │
//! │  - Login / logout / protected pages                          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Auth Layer                            │
//! │  - GitHub OAuth client (code exchange, profile fetch)        │
//! │  - Identity resolver (find-or-create local user)             │
//! │  - Authenticator (redirects, flash messages)                 │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Data Layer                              │
//! │  - SQLite (sqlx)                                            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `api`: HTTP handlers
//! - `auth`: GitHub OAuth authentication
//! - `data`: Database layer
//! - `config`: Configuration management
//! - `error`: Error types
//! - `metrics`: Prometheus instruments

pub mod api;
pub mod auth;
pub mod config;
pub mod data;
pub mod error;
pub mod metrics;

use std::sync::Arc;

/// Application state shared across all handlers
///
/// This struct is cloned for each request and contains
/// shared resources like database pool and the authenticator.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Database connection pool
    pub db: Arc<data::Database>,

    /// OAuth provider client
    pub oauth_client: Arc<dyn auth::OAuthClient>,

    /// Callback handler for `/connect/check/github`
    pub authenticator: Arc<auth::GitHubAuthenticator>,

    /// One-shot messages keyed by visitor
    pub flash: Arc<auth::FlashBag>,

    /// Post-login destinations keyed by visitor and firewall
    pub target_paths: Arc<auth::TargetPathStore>,
}

impl AppState {
    /// Initialize application state with the GitHub client
    ///
    /// # Errors
    /// Returns error if the HTTP client, GitHub client or database
    /// cannot be initialized
    pub async fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("Octogate/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| error::AppError::Internal(e.into()))?;

        let github = auth::GitHubClient::new(&config, http_client)?;
        Self::with_oauth_client(config, Arc::new(github)).await
    }

    /// Initialize application state around an existing OAuth client
    ///
    /// # Steps
    /// 1. Connect to SQLite database
    /// 2. Create flash and target path stores
    /// 3. Wire the identity resolver and authenticator
    pub async fn with_oauth_client(
        config: config::AppConfig,
        oauth_client: Arc<dyn auth::OAuthClient>,
    ) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        // 1. Connect to SQLite database
        let db = Arc::new(data::Database::connect(&config.database.path).await?);
        tracing::info!("Database connected");

        // 2. Session-scoped stores
        let flash = Arc::new(auth::FlashBag::new());
        let target_paths = Arc::new(auth::TargetPathStore::new());

        // 3. Authenticator
        let resolver = auth::IdentityResolver::new(
            db.clone(),
            config.auth.github.legacy_nickname_linking,
        );
        let authenticator = Arc::new(auth::GitHubAuthenticator::new(
            oauth_client.clone(),
            resolver,
            flash.clone(),
            target_paths.clone(),
            config.routes.clone(),
        ));

        tracing::info!("Application state initialized successfully");

        Ok(Self {
            config: Arc::new(config),
            db,
            oauth_client,
            authenticator,
            flash,
            target_paths,
        })
    }
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::{Router, middleware};
    use tower_http::trace::TraceLayer;

    Router::new()
        .route("/health", axum::routing::get(health_check))
        .merge(api::login_router())
        .merge(api::account_router(state.clone()))
        // The callback path has no route of its own; the authentication
        // middleware answers it before the fallback runs.
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::github_authentication,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::visitor_session,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
        .merge(api::metrics_router())
}

async fn health_check() -> &'static str {
    "OK"
}

async fn not_found() -> error::AppError {
    error::AppError::NotFound
}
