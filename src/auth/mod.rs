//! GitHub OAuth authentication
//!
//! Handles:
//! - GitHub OAuth flow (authorize redirect, code exchange, profile fetch)
//! - Resolving a GitHub identity to a local user
//! - Session issuing, flash messages and post-login redirects
//! - Authentication middleware

mod authenticator;
pub mod flash;
mod middleware;
pub mod oauth;
mod resolver;
pub mod session;
pub mod target_path;
pub mod visitor;

pub use authenticator::{AuthContext, AuthResult, GitHubAuthenticator, Passport};
pub use flash::{FlashBag, FlashLevel, FlashMessage};
pub use middleware::{CurrentUser, github_authentication, require_auth};
pub use oauth::{AccessToken, GitHubClient, OAuthClient, ProviderError, RemoteIdentity};
pub use resolver::IdentityResolver;
pub use session::{SESSION_COOKIE, Session, create_session_token, verify_session_token};
pub use target_path::TargetPathStore;
pub use visitor::{VISITOR_COOKIE, VisitorId, visitor_session};

/// Callback path GitHub redirects to after authorization
pub const GITHUB_CHECK_PATH: &str = "/connect/check/github";

/// Path that starts the GitHub login
pub const GITHUB_START_PATH: &str = "/connect/github";
