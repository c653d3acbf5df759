//! Authentication middleware
//!
//! - `github_authentication` intercepts the GitHub callback and turns the
//!   authenticator's result into a session cookie and a redirect.
//! - `require_auth` protects routes and remembers where anonymous visitors
//!   were headed.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts, State},
    http::{HeaderMap, Method, Request, request::Parts},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};

use super::authenticator::{AuthContext, AuthResult, Passport};
use super::session::{SESSION_COOKIE, Session, create_session_token, verify_session_token};
use super::visitor::VisitorId;
use crate::AppState;
use crate::data::User;
use crate::error::AppError;
use crate::metrics;

fn extract_token_from_headers(headers: &HeaderMap) -> Option<String> {
    let jar = CookieJar::from_headers(headers);
    jar.get(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_owned())
}

fn visitor_from_request<B>(request: &Request<B>) -> Result<VisitorId, AppError> {
    request
        .extensions()
        .get::<VisitorId>()
        .cloned()
        .ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!("visitor session middleware is not installed"))
        })
}

/// Build the signed session cookie for a passport
///
/// Remember-me sessions get a persistent cookie; others end with the
/// browser session.
fn session_cookie(state: &AppState, passport: &Passport) -> Result<Cookie<'static>, AppError> {
    let auth = &state.config.auth;
    let max_age = if passport.remember_me {
        auth.remember_me_max_age
    } else {
        auth.session_max_age
    };

    let session = Session::start(passport.user_identifier.clone(), passport.remember_me, max_age);
    let token = create_session_token(&session, &auth.session_secret)?;

    let mut cookie = Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(state.config.should_use_secure_cookies());
    if passport.remember_me {
        cookie = cookie.max_age(time::Duration::seconds(max_age));
    }

    Ok(cookie.build())
}

/// Middleware running the GitHub authenticator on its callback path
///
/// Requests to any other path pass through untouched.
pub async fn github_authentication(
    State(state): State<AppState>,
    jar: CookieJar,
    request: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, AppError> {
    if !state.authenticator.supports(request.uri().path()) {
        return Ok(next.run(request).await);
    }

    let visitor = visitor_from_request(&request)?;
    let ctx = AuthContext::new(visitor, state.config.auth.firewall.clone());

    match state.authenticator.handle(&ctx, request.uri()).await {
        Ok(AuthResult::Authenticated {
            passport, redirect, ..
        }) => {
            metrics::record_login_attempt("success");
            let cookie = session_cookie(&state, &passport)?;
            Ok((jar.add(cookie), Redirect::to(&redirect)).into_response())
        }
        Ok(AuthResult::Failed { reason, redirect }) => {
            metrics::record_login_attempt("failure");
            tracing::info!(visitor = %ctx.visitor, %reason, "GitHub login failed");
            Ok(Redirect::to(&redirect).into_response())
        }
        Err(error) => {
            metrics::record_login_attempt("error");
            Err(error)
        }
    }
}

/// Middleware to require authentication
///
/// Verifies the session cookie and adds the `Session` to request
/// extensions. Anonymous GET requests have their path stored as the
/// post-login destination before being redirected to the login page.
///
/// # Usage
/// ```ignore
/// let protected_routes = Router::new()
///     .route("/account", ...)
///     .route_layer(middleware::from_fn_with_state(state, require_auth));
/// ```
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, AppError> {
    let session = extract_token_from_headers(request.headers())
        .and_then(|token| verify_session_token(&token, &state.config.auth.session_secret).ok());

    if let Some(session) = session {
        request.extensions_mut().insert(session);
        return Ok(next.run(request).await);
    }

    if request.method() == Method::GET {
        let visitor = visitor_from_request(&request)?;
        let target = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        state
            .target_paths
            .save(&visitor, &state.config.auth.firewall, target)
            .await;
    }

    Ok(Redirect::to(&state.config.routes.login).into_response())
}

/// Extractor for current authenticated user
///
/// Use in handlers to get the signed-in user.
///
/// # Usage
/// ```ignore
/// async fn handler(
///     CurrentUser { user, .. }: CurrentUser,
/// ) -> impl IntoResponse {
///     format!("Hello, {}", user.identifier)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: User,
    pub session: Session,
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    /// Reload the session's user from the database
    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);

        let session = match parts.extensions.get::<Session>().cloned() {
            Some(session) => session,
            None => {
                let token =
                    extract_token_from_headers(&parts.headers).ok_or(AppError::Unauthorized)?;
                let session = verify_session_token(&token, &state.config.auth.session_secret)?;
                parts.extensions.insert(session.clone());
                session
            }
        };

        let user = state
            .db
            .get_user_by_identifier(&session.user_identifier)
            .await?
            .ok_or(AppError::Unauthorized)?;

        Ok(CurrentUser { user, session })
    }
}
