//! Anonymous visitor sessions
//!
//! Every browser gets a random `sid` cookie before it signs in. The id keys
//! the server-side stores that must survive the round-trip to GitHub:
//! OAuth state, flash messages and pending redirects.

use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::{Request, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};

use crate::AppState;
use crate::error::AppError;

/// Cookie carrying the visitor id
pub const VISITOR_COOKIE: &str = "sid";

/// Opaque visitor session id (ULID)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VisitorId(String);

impl VisitorId {
    pub fn generate() -> Self {
        Self(ulid::Ulid::new().to_string())
    }

    /// Accept only well-formed ids; anything else gets a fresh session.
    pub fn parse(raw: &str) -> Option<Self> {
        ulid::Ulid::from_string(raw)
            .ok()
            .map(|id| Self(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for VisitorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Middleware that attaches a `VisitorId` to every request
///
/// Issues the `sid` cookie on the response when the request had none.
pub async fn visitor_session(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let existing = jar
        .get(VISITOR_COOKIE)
        .and_then(|cookie| VisitorId::parse(cookie.value()));
    let is_new = existing.is_none();
    let visitor = existing.unwrap_or_else(VisitorId::generate);

    request.extensions_mut().insert(visitor.clone());
    let response = next.run(request).await;

    if !is_new {
        return response;
    }

    tracing::debug!(visitor = %visitor, "Issued visitor session");
    let cookie = Cookie::build((VISITOR_COOKIE, visitor.0))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(state.config.should_use_secure_cookies());

    (jar.add(cookie), response).into_response()
}

#[async_trait]
impl<S> FromRequestParts<S> for VisitorId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<VisitorId>().cloned().ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!("visitor session middleware is not installed"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_generated_ids() {
        let id = VisitorId::generate();
        assert_eq!(VisitorId::parse(id.as_str()), Some(id));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(VisitorId::parse("").is_none());
        assert!(VisitorId::parse("not-a-session").is_none());
        assert!(VisitorId::parse("../../etc/passwd").is_none());
    }
}
