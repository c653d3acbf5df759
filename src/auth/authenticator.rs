//! GitHub login callback handling
//!
//! `Authenticating -> {Success, Failure}` for one request to
//! `/connect/check/github`. The caller (see `github_authentication`) turns
//! the returned [`AuthResult`] into cookies and a redirect.

use axum::http::Uri;
use std::sync::Arc;

use super::GITHUB_CHECK_PATH;
use super::flash::{FlashBag, FlashLevel};
use super::oauth::OAuthClient;
use super::resolver::IdentityResolver;
use super::target_path::TargetPathStore;
use super::visitor::VisitorId;
use crate::config::RoutesConfig;
use crate::data::User;
use crate::error::{AppError, AuthenticationError};

/// Per-request context
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub visitor: VisitorId,
    pub firewall: String,
}

impl AuthContext {
    pub fn new(visitor: VisitorId, firewall: impl Into<String>) -> Self {
        Self {
            visitor,
            firewall: firewall.into(),
        }
    }
}

/// Self-validating credential produced by a successful login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Passport {
    pub user_identifier: String,
    /// Request a session that outlives the browser session
    pub remember_me: bool,
}

/// Outcome of a callback request
#[derive(Debug)]
pub enum AuthResult {
    Authenticated {
        user: User,
        passport: Passport,
        redirect: String,
    },
    Failed {
        reason: String,
        redirect: String,
    },
}

pub struct GitHubAuthenticator {
    client: Arc<dyn OAuthClient>,
    resolver: IdentityResolver,
    flash: Arc<FlashBag>,
    target_paths: Arc<TargetPathStore>,
    routes: RoutesConfig,
}

impl GitHubAuthenticator {
    pub fn new(
        client: Arc<dyn OAuthClient>,
        resolver: IdentityResolver,
        flash: Arc<FlashBag>,
        target_paths: Arc<TargetPathStore>,
        routes: RoutesConfig,
    ) -> Self {
        Self {
            client,
            resolver,
            flash,
            target_paths,
            routes,
        }
    }

    /// Only the exact callback path is handled.
    pub fn supports(&self, path: &str) -> bool {
        path == GITHUB_CHECK_PATH
    }

    /// Exchange the callback code, fetch the GitHub user and resolve it.
    ///
    /// # Errors
    /// `AppError::Authentication` for provider failures; anything else
    /// (e.g. `AppError::Database`) is not a login failure.
    pub async fn authenticate(
        &self,
        ctx: &AuthContext,
        callback: &Uri,
    ) -> Result<(User, Passport), AppError> {
        let token = self
            .client
            .exchange_code_for_token(&ctx.visitor, callback)
            .await
            .inspect_err(|error| {
                tracing::warn!(%error, visitor = %ctx.visitor, "GitHub code exchange failed");
            })?;

        let identity = self
            .client
            .fetch_identity(&token)
            .await
            .inspect_err(|error| {
                tracing::warn!(%error, visitor = %ctx.visitor, "GitHub profile fetch failed");
            })?;

        let user = self.resolver.resolve(&identity).await?;

        let passport = Passport {
            user_identifier: user.identifier.clone(),
            remember_me: true,
        };
        Ok((user, passport))
    }

    /// Where to go after login: the stored destination, else `default`.
    pub async fn on_success(&self, ctx: &AuthContext) -> String {
        match self.target_paths.take(&ctx.visitor, &ctx.firewall).await {
            Some(target) => target,
            None => self.routes.default.clone(),
        }
    }

    /// Flash the rendered error and send the visitor back to `login`.
    pub async fn on_failure(&self, ctx: &AuthContext, error: &AuthenticationError) -> String {
        self.flash
            .add(&ctx.visitor, FlashLevel::Danger, error.render())
            .await;
        self.routes.login.clone()
    }

    /// Run the whole callback.
    pub async fn handle(&self, ctx: &AuthContext, callback: &Uri) -> Result<AuthResult, AppError> {
        match self.authenticate(ctx, callback).await {
            Ok((user, passport)) => {
                let redirect = self.on_success(ctx).await;
                tracing::info!(
                    identifier = %user.identifier,
                    redirect = %redirect,
                    "GitHub login succeeded"
                );
                Ok(AuthResult::Authenticated {
                    user,
                    passport,
                    redirect,
                })
            }
            Err(AppError::Authentication(error)) => {
                let redirect = self.on_failure(ctx, &error).await;
                Ok(AuthResult::Failed {
                    reason: error.render(),
                    redirect,
                })
            }
            Err(other) => Err(other),
        }
    }
}
