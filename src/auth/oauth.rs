//! GitHub OAuth client
//!
//! Wraps the `oauth2` crate for the authorization code flow with PKCE and
//! fetches the signed-in GitHub user. Callback query parameters are parsed
//! here and nowhere else.
//!
//! ## Flow
//!
//! 1. [`authorization_url`](OAuthClient::authorization_url) stores a random
//!    CSRF state and PKCE verifier for the visitor and returns the GitHub
//!    authorize URL.
//! 2. [`exchange_code_for_token`](OAuthClient::exchange_code_for_token)
//!    consumes the stored state, checks the callback and trades the code for
//!    an access token.
//! 3. [`fetch_identity`](OAuthClient::fetch_identity) calls `GET /user`.

use async_trait::async_trait;
use axum::extract::Query;
use axum::http::Uri;
use moka::future::Cache;
use oauth2::basic::{BasicClient, BasicErrorResponse};
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet, EndpointSet,
    PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, RequestTokenError, Scope, TokenResponse,
    TokenUrl,
};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use super::visitor::VisitorId;
use crate::config::AppConfig;
use crate::error::{AppError, AuthenticationError};

/// Display name used in user-facing messages
const PROVIDER_NAME: &str = "GitHub";

/// How long an authorize redirect stays valid
const AUTHORIZATION_TTL: Duration = Duration::from_secs(10 * 60);

/// OAuth access token
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken([redacted])")
    }
}

/// The GitHub account behind an access token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteIdentity {
    /// Numeric GitHub user id, as a string
    pub provider_user_id: String,
    /// GitHub login
    pub nickname: String,
}

/// Failure talking to the OAuth provider
///
/// `Display` carries internal detail for logs; the user-facing text comes
/// from the [`AuthenticationError`] conversion.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("callback state is missing, unknown or does not match")]
    InvalidState,

    #[error("callback has no authorization code")]
    MissingCode,

    #[error("user denied access: {description}")]
    Denied { description: String },

    #[error("provider rejected the request: {reason}")]
    Rejected { reason: String },

    #[error("provider unreachable: {reason}")]
    Unreachable { reason: String },

    #[error("provider returned an unusable profile: {reason}")]
    InvalidProfile { reason: String },
}

impl From<&ProviderError> for AuthenticationError {
    fn from(error: &ProviderError) -> Self {
        match error {
            ProviderError::InvalidState => AuthenticationError::new("Invalid state."),
            ProviderError::MissingCode => {
                AuthenticationError::new("No authorization code was received from {{ provider }}.")
                    .with_param("{{ provider }}", PROVIDER_NAME)
            }
            ProviderError::Denied { description } => {
                AuthenticationError::new("{{ provider }} denied access: {{ reason }}")
                    .with_param("{{ provider }}", PROVIDER_NAME)
                    .with_param("{{ reason }}", description.clone())
            }
            ProviderError::Rejected { reason } => {
                AuthenticationError::new("{{ provider }} rejected the login: {{ reason }}")
                    .with_param("{{ provider }}", PROVIDER_NAME)
                    .with_param("{{ reason }}", reason.clone())
            }
            ProviderError::Unreachable { .. } => {
                AuthenticationError::new("Could not reach {{ provider }}. Please try again.")
                    .with_param("{{ provider }}", PROVIDER_NAME)
            }
            ProviderError::InvalidProfile { .. } => {
                AuthenticationError::new("{{ provider }} returned an incomplete profile.")
                    .with_param("{{ provider }}", PROVIDER_NAME)
            }
        }
    }
}

impl From<ProviderError> for AppError {
    fn from(error: ProviderError) -> Self {
        AppError::Authentication(AuthenticationError::from(&error))
    }
}

/// OAuth provider seam consumed by the authenticator
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OAuthClient: Send + Sync {
    /// Start a login: remember state for the visitor and build the
    /// provider's authorize URL.
    async fn authorization_url(&self, visitor: &VisitorId) -> Url;

    /// Validate the callback and exchange its code for an access token.
    async fn exchange_code_for_token(
        &self,
        visitor: &VisitorId,
        callback: &Uri,
    ) -> Result<AccessToken, ProviderError>;

    /// Fetch the account that owns `token`.
    async fn fetch_identity(&self, token: &AccessToken) -> Result<RemoteIdentity, ProviderError>;
}

/// Query parameters GitHub appends to the callback URL
#[derive(Debug, Default, Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// `GET /user` response (only the fields we use)
#[derive(Debug, Deserialize)]
struct GitHubUser {
    id: u64,
    login: String,
}

#[derive(Debug, Clone)]
struct PendingAuthorization {
    csrf_state: String,
    pkce_verifier: String,
}

/// OAuth client type with auth URL, token URL and redirect URL set.
type ConfiguredClient = oauth2::Client<
    oauth2::basic::BasicErrorResponse,
    oauth2::basic::BasicTokenResponse,
    oauth2::basic::BasicTokenIntrospectionResponse,
    oauth2::StandardRevocableToken,
    oauth2::basic::BasicRevocationErrorResponse,
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointSet,
>;

/// GitHub implementation of [`OAuthClient`]
pub struct GitHubClient {
    oauth: ConfiguredClient,
    scopes: Vec<String>,
    api_base_url: String,
    /// Token endpoint client; never follows redirects
    token_http_client: reqwest::Client,
    /// REST API client shared with the rest of the app
    api_http_client: reqwest::Client,
    pending: Cache<String, PendingAuthorization>,
}

impl GitHubClient {
    /// Build the client from configuration
    ///
    /// # Errors
    /// Returns `AppError::Config` if an endpoint URL is invalid
    pub fn new(config: &AppConfig, api_http_client: reqwest::Client) -> Result<Self, AppError> {
        let github = &config.auth.github;
        let invalid_url = |name: &str, e: url::ParseError| {
            AppError::Config(format!("auth.github.{name} is not a valid URL: {e}"))
        };

        let oauth = BasicClient::new(ClientId::new(github.client_id.clone()))
            .set_client_secret(ClientSecret::new(github.client_secret.clone()))
            .set_auth_uri(
                AuthUrl::new(github.auth_url.clone()).map_err(|e| invalid_url("auth_url", e))?,
            )
            .set_token_uri(
                TokenUrl::new(github.token_url.clone()).map_err(|e| invalid_url("token_url", e))?,
            )
            .set_redirect_uri(
                RedirectUrl::new(config.github_redirect_url())
                    .map_err(|e| invalid_url("redirect_url", e))?,
            );

        Url::parse(&github.api_base_url).map_err(|e| invalid_url("api_base_url", e))?;

        let token_http_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| AppError::Internal(e.into()))?;

        let pending = Cache::builder()
            .max_capacity(100_000)
            .time_to_live(AUTHORIZATION_TTL)
            .build();

        Ok(Self {
            oauth,
            scopes: github.scopes.clone(),
            api_base_url: github.api_base_url.trim_end_matches('/').to_string(),
            token_http_client,
            api_http_client,
            pending,
        })
    }

    /// Check the callback against the visitor's pending authorization.
    ///
    /// The pending entry is consumed whatever the outcome, so a callback URL
    /// can be used at most once.
    async fn validate_callback(
        &self,
        visitor: &VisitorId,
        callback: &Uri,
    ) -> Result<(String, PendingAuthorization), ProviderError> {
        let query = Query::<CallbackQuery>::try_from_uri(callback)
            .map(|Query(query)| query)
            .unwrap_or_default();

        let pending = self.pending.remove(visitor.as_str()).await;

        let state_matches = matches!(
            (&pending, &query.state),
            (Some(pending), Some(state)) if pending.csrf_state == *state
        );
        let Some(pending) = pending.filter(|_| state_matches) else {
            return Err(ProviderError::InvalidState);
        };

        if let Some(error) = query.error {
            return Err(ProviderError::Denied {
                description: query.error_description.unwrap_or(error),
            });
        }

        let code = query
            .code
            .filter(|code| !code.is_empty())
            .ok_or(ProviderError::MissingCode)?;

        Ok((code, pending))
    }
}

/// Read an OAuth error object out of a token response body.
fn rejection_from_body(body: &[u8]) -> Option<ProviderError> {
    let response: BasicErrorResponse = serde_json::from_slice(body).ok()?;
    Some(ProviderError::Rejected {
        reason: response.error().to_string(),
    })
}

#[async_trait]
impl OAuthClient for GitHubClient {
    async fn authorization_url(&self, visitor: &VisitorId) -> Url {
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let (auth_url, csrf_state) = self
            .oauth
            .authorize_url(CsrfToken::new_random)
            .add_scopes(self.scopes.iter().cloned().map(Scope::new))
            .set_pkce_challenge(pkce_challenge)
            .url();

        self.pending
            .insert(
                visitor.as_str().to_owned(),
                PendingAuthorization {
                    csrf_state: csrf_state.secret().clone(),
                    pkce_verifier: pkce_verifier.secret().clone(),
                },
            )
            .await;

        tracing::debug!(visitor = %visitor, "Created GitHub authorization request");
        auth_url
    }

    async fn exchange_code_for_token(
        &self,
        visitor: &VisitorId,
        callback: &Uri,
    ) -> Result<AccessToken, ProviderError> {
        let (code, pending) = self.validate_callback(visitor, callback).await?;

        let token = self
            .oauth
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(PkceCodeVerifier::new(pending.pkce_verifier))
            .request_async(&self.token_http_client)
            .await
            .map_err(|error| match error {
                RequestTokenError::ServerResponse(response) => ProviderError::Rejected {
                    reason: response.error().to_string(),
                },
                RequestTokenError::Request(error) => ProviderError::Unreachable {
                    reason: error.to_string(),
                },
                // GitHub reports a bad code with `200 OK` and an error body.
                RequestTokenError::Parse(error, body) => rejection_from_body(&body)
                    .unwrap_or_else(|| ProviderError::Rejected {
                        reason: error.to_string(),
                    }),
                other => ProviderError::Rejected {
                    reason: other.to_string(),
                },
            })?;

        Ok(AccessToken::new(token.access_token().secret().clone()))
    }

    async fn fetch_identity(&self, token: &AccessToken) -> Result<RemoteIdentity, ProviderError> {
        let response = self
            .api_http_client
            .get(format!("{}/user", self.api_base_url))
            .bearer_auth(token.secret())
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| ProviderError::Unreachable {
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ProviderError::Rejected {
                reason: "access token was not accepted".to_string(),
            });
        }
        if !status.is_success() {
            return Err(ProviderError::Unreachable {
                reason: format!("GET /user returned {status}"),
            });
        }

        let user: GitHubUser =
            response
                .json()
                .await
                .map_err(|e| ProviderError::InvalidProfile {
                    reason: e.to_string(),
                })?;

        if user.login.trim().is_empty() {
            return Err(ProviderError::InvalidProfile {
                reason: "empty login".to_string(),
            });
        }

        Ok(RemoteIdentity {
            provider_user_id: user.id.to_string(),
            nickname: user.login,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> GitHubClient {
        let config = crate::config::tests::valid_config();
        GitHubClient::new(&config, reqwest::Client::new()).unwrap()
    }

    fn query_param(url: &Url, name: &str) -> Option<String> {
        url.query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }

    fn callback(query: &str) -> Uri {
        format!("/connect/check/github?{query}").parse().unwrap()
    }

    #[tokio::test]
    async fn authorization_url_carries_client_scope_state_and_pkce() {
        let client = client();
        let url = client.authorization_url(&VisitorId::generate()).await;

        assert!(url.as_str().starts_with("https://github.com/login/oauth/authorize?"));
        assert_eq!(query_param(&url, "client_id").as_deref(), Some("github-client-id"));
        assert_eq!(query_param(&url, "scope").as_deref(), Some("read:user"));
        assert_eq!(
            query_param(&url, "redirect_uri").as_deref(),
            Some("http://localhost/connect/check/github")
        );
        assert_eq!(query_param(&url, "code_challenge_method").as_deref(), Some("S256"));
        assert!(query_param(&url, "state").is_some());
    }

    #[tokio::test]
    async fn callback_without_pending_authorization_is_invalid_state() {
        let client = client();
        let result = client
            .exchange_code_for_token(&VisitorId::generate(), &callback("code=abc&state=xyz"))
            .await;

        assert_eq!(result, Err(ProviderError::InvalidState));
    }

    #[tokio::test]
    async fn mismatched_state_is_rejected_and_consumes_pending() {
        let client = client();
        let visitor = VisitorId::generate();
        let url = client.authorization_url(&visitor).await;
        let state = query_param(&url, "state").unwrap();

        let result = client
            .exchange_code_for_token(&visitor, &callback("code=abc&state=forged"))
            .await;
        assert_eq!(result, Err(ProviderError::InvalidState));

        // The real state no longer works either
        let retry = client
            .validate_callback(&visitor, &callback(&format!("code=abc&state={state}")))
            .await;
        assert_eq!(retry.map(|(code, _)| code), Err(ProviderError::InvalidState));
    }

    #[tokio::test]
    async fn state_from_another_visitor_is_rejected() {
        let client = client();
        let alice = VisitorId::generate();
        let url = client.authorization_url(&alice).await;
        let state = query_param(&url, "state").unwrap();

        let result = client
            .validate_callback(
                &VisitorId::generate(),
                &callback(&format!("code=abc&state={state}")),
            )
            .await;
        assert_eq!(result.map(|(code, _)| code), Err(ProviderError::InvalidState));
    }

    #[tokio::test]
    async fn denied_authorization_is_reported() {
        let client = client();
        let visitor = VisitorId::generate();
        let url = client.authorization_url(&visitor).await;
        let state = query_param(&url, "state").unwrap();

        let result = client
            .exchange_code_for_token(
                &visitor,
                &callback(&format!(
                    "error=access_denied&error_description=The+user+has+denied+your+application+access.&state={state}"
                )),
            )
            .await;

        assert_eq!(
            result,
            Err(ProviderError::Denied {
                description: "The user has denied your application access.".to_string()
            })
        );
    }

    #[tokio::test]
    async fn missing_code_is_reported() {
        let client = client();
        let visitor = VisitorId::generate();
        let url = client.authorization_url(&visitor).await;
        let state = query_param(&url, "state").unwrap();

        let result = client
            .exchange_code_for_token(&visitor, &callback(&format!("state={state}")))
            .await;

        assert_eq!(result, Err(ProviderError::MissingCode));
    }

    #[tokio::test]
    async fn valid_callback_yields_code_and_verifier() {
        let client = client();
        let visitor = VisitorId::generate();
        let url = client.authorization_url(&visitor).await;
        let state = query_param(&url, "state").unwrap();

        let (code, pending) = client
            .validate_callback(&visitor, &callback(&format!("code=abc&state={state}")))
            .await
            .unwrap();

        assert_eq!(code, "abc");
        assert_eq!(pending.csrf_state, state);
        assert!(!pending.pkce_verifier.is_empty());
    }

    #[test]
    fn provider_errors_render_user_messages() {
        let invalid_state = AuthenticationError::from(&ProviderError::InvalidState);
        assert_eq!(invalid_state.render(), "Invalid state.");

        let rejected = AuthenticationError::from(&ProviderError::Rejected {
            reason: "bad_verification_code".to_string(),
        });
        assert_eq!(
            rejected.render(),
            "GitHub rejected the login: bad_verification_code"
        );

        let unreachable = AuthenticationError::from(&ProviderError::Unreachable {
            reason: "connection refused".to_string(),
        });
        assert!(!unreachable.render().contains("connection refused"));
    }

    #[test]
    fn token_error_body_yields_provider_reason() {
        let body = br#"{"error":"bad_verification_code","error_description":"The code passed is incorrect or expired."}"#;

        assert_eq!(
            rejection_from_body(body),
            Some(ProviderError::Rejected {
                reason: "bad_verification_code".to_string(),
            })
        );
        assert_eq!(rejection_from_body(b"<html>busy</html>"), None);
    }

    #[tokio::test]
    async fn bad_code_answered_with_ok_status_is_rejected_with_reason() {
        use axum::{Json, Router, routing::post};

        let token_endpoint = Router::new().route(
            "/login/oauth/access_token",
            post(|| async {
                Json(serde_json::json!({
                    "error": "bad_verification_code",
                    "error_description": "The code passed is incorrect or expired."
                }))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, token_endpoint).await.unwrap();
        });

        let mut config = crate::config::tests::valid_config();
        config.auth.github.token_url = format!("http://{addr}/login/oauth/access_token");
        let client = GitHubClient::new(&config, reqwest::Client::new()).unwrap();
        let visitor = VisitorId::generate();
        let url = client.authorization_url(&visitor).await;
        let state = query_param(&url, "state").unwrap();

        let error = client
            .exchange_code_for_token(&visitor, &callback(&format!("code=expired&state={state}")))
            .await
            .unwrap_err();

        assert_eq!(
            error,
            ProviderError::Rejected {
                reason: "bad_verification_code".to_string(),
            }
        );
    }
}
