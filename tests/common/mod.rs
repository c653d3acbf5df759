//! Common test utilities for E2E tests

use axum::{
    Form, Json, Router,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use octogate::{AppState, config};
use serde_json::json;
use std::collections::HashMap;
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Authorization code the fake GitHub accepts
pub const GOOD_CODE: &str = "good-code";

/// GitHub user returned by the fake `/user` endpoint
pub const GITHUB_ID: u64 = 583231;
pub const GITHUB_LOGIN: &str = "octocat";

const FAKE_ACCESS_TOKEN: &str = "gho_test_token";

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub _temp_dir: TempDir,
    /// Client that never follows redirects
    pub client: reqwest::Client,
}

impl TestServer {
    /// Create a new test server instance backed by a fake GitHub
    pub async fn new() -> Self {
        Self::with_legacy_linking(true).await
    }

    pub async fn with_legacy_linking(legacy_nickname_linking: bool) -> Self {
        // Create temporary directory for test database
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let github_addr = spawn(fake_github_router()).await;

        // Create test configuration
        let config = config::AppConfig {
            server: config::ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
                domain: "localhost".to_string(),
                protocol: "http".to_string(),
            },
            database: config::DatabaseConfig { path: db_path },
            auth: config::AuthConfig {
                session_secret: "test-secret-key-32-bytes-long!!!".to_string(),
                session_max_age: 86_400,
                remember_me_max_age: 2_592_000,
                firewall: "main".to_string(),
                github: config::GitHubOAuthConfig {
                    client_id: "test-client-id".to_string(),
                    client_secret: "test-client-secret".to_string(),
                    auth_url: "https://github.com/login/oauth/authorize".to_string(),
                    token_url: format!("{github_addr}/login/oauth/access_token"),
                    api_base_url: github_addr.clone(),
                    scopes: vec!["read:user".to_string()],
                    legacy_nickname_linking,
                },
            },
            routes: config::RoutesConfig {
                default: "/".to_string(),
                login: "/login".to_string(),
            },
            logging: config::LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        };

        // Initialize app state
        let state = AppState::new(config).await.unwrap();

        let addr = spawn(octogate::build_router(state.clone())).await;

        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap();

        Self {
            addr,
            state,
            _temp_dir: temp_dir,
            client,
        }
    }

    /// Get base URL for requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// GET `path` sending the given cookies
    pub async fn get(&self, path: &str, cookies: &CookieJar) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .header(header::COOKIE, cookies.header())
            .send()
            .await
            .unwrap()
    }

    /// Open a visitor session and return its cookies
    pub async fn visit(&self) -> CookieJar {
        let mut cookies = CookieJar::default();
        let response = self.get("/login", &cookies).await;
        assert_eq!(response.status(), 200);
        cookies.update(&response);
        assert!(cookies.get("sid").is_some(), "visitor cookie issued");
        cookies
    }

    /// Start the GitHub redirect and return the CSRF state it issued
    pub async fn start_github_login(&self, cookies: &mut CookieJar) -> String {
        let response = self.get("/connect/github", cookies).await;
        assert!(response.status().is_redirection());
        cookies.update(&response);

        let location = location(&response);
        let url = url::Url::parse(&location).unwrap();
        url.query_pairs()
            .find(|(key, _)| key == "state")
            .map(|(_, value)| value.into_owned())
            .expect("authorize URL carries a state")
    }

    /// Run the whole GitHub round-trip and return the callback response
    pub async fn complete_github_login(&self, cookies: &mut CookieJar) -> reqwest::Response {
        let state = self.start_github_login(cookies).await;
        let response = self
            .get(
                &format!("/connect/check/github?code={GOOD_CODE}&state={state}"),
                cookies,
            )
            .await;
        cookies.update(&response);
        response
    }
}

/// Minimal cookie store keyed by name
#[derive(Debug, Default, Clone)]
pub struct CookieJar {
    cookies: HashMap<String, String>,
}

impl CookieJar {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// Apply every `Set-Cookie` on the response; empty values delete.
    pub fn update(&mut self, response: &reqwest::Response) {
        for value in response.headers().get_all(header::SET_COOKIE) {
            let raw = value.to_str().unwrap();
            let pair = raw.split(';').next().unwrap_or_default();
            let Some((name, value)) = pair.split_once('=') else {
                continue;
            };
            if value.is_empty() {
                self.cookies.remove(name.trim());
            } else {
                self.cookies
                    .insert(name.trim().to_string(), value.trim().to_string());
            }
        }
    }

    pub fn header(&self) -> String {
        self.cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// `Set-Cookie` header for `name`, if the response sets one
pub fn set_cookie(response: &reqwest::Response, name: &str) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with(&format!("{name}=")))
        .map(str::to_string)
}

pub fn location(response: &reqwest::Response) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .expect("location header")
        .to_string()
}

async fn spawn(app: Router) -> String {
    // Bind to random port
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}", addr)
}

// =============================================================================
// Fake GitHub
// =============================================================================

fn fake_github_router() -> Router {
    Router::new()
        .route("/login/oauth/access_token", post(fake_token))
        .route("/user", get(fake_user))
}

/// POST /login/oauth/access_token
///
/// Like GitHub, a bad code is answered with `200 OK` and an error body.
async fn fake_token(Form(form): Form<HashMap<String, String>>) -> Response {
    if form.get("code").map(String::as_str) != Some(GOOD_CODE) {
        return Json(json!({
            "error": "bad_verification_code",
            "error_description": "The code passed is incorrect or expired.",
            "error_uri": "https://docs.github.com/apps/troubleshooting-oauth-app-access-token-request-errors/#bad-verification-code"
        }))
        .into_response();
    }

    Json(json!({
        "access_token": FAKE_ACCESS_TOKEN,
        "token_type": "bearer",
        "scope": "read:user"
    }))
    .into_response()
}

/// GET /user
async fn fake_user(headers: HeaderMap) -> Response {
    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {FAKE_ACCESS_TOKEN}"));
    if !authorized {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "Bad credentials" })),
        )
            .into_response();
    }

    Json(json!({ "id": GITHUB_ID, "login": GITHUB_LOGIN })).into_response()
}
