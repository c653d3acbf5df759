//! Login page and GitHub sign-in entry points

use axum::{
    Router,
    extract::State,
    response::{Html, IntoResponse, Redirect},
    routing::{get, post},
};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::Cookie;

use crate::AppState;
use crate::auth::{FlashLevel, FlashMessage, GITHUB_START_PATH, SESSION_COOKIE, VisitorId};

/// Create login router
///
/// Routes:
/// - GET /login - Login page
/// - GET /connect/github - Redirect to GitHub
/// - POST /logout - Logout
///
/// The GitHub callback is handled by the authentication middleware.
pub fn login_router() -> Router<AppState> {
    Router::new()
        .route("/login", get(login_page))
        .route(GITHUB_START_PATH, get(github_redirect))
        .route("/logout", post(logout))
}

// =============================================================================
// Login Page
// =============================================================================

/// GET /login
///
/// Renders pending flash messages (consuming them) and the sign-in link.
async fn login_page(State(state): State<AppState>, visitor: VisitorId) -> impl IntoResponse {
    let messages = state.flash.take(&visitor).await;
    Html(render_login_page(&messages))
}

fn render_login_page(messages: &[FlashMessage]) -> String {
    let flashes: String = messages
        .iter()
        .map(|flash| {
            format!(
                r#"<div class="flash flash-{}" role="alert">{}</div>"#,
                flash.level.as_str(),
                html_escape::encode_text(&flash.message)
            )
        })
        .collect();

    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Sign in - Octogate</title></head>
<body>
    <h1>Octogate</h1>
    {flashes}
    <p>Please sign in with GitHub</p>
    <a href="{GITHUB_START_PATH}">Sign in with GitHub</a>
</body>
</html>
"#
    )
}

// =============================================================================
// GitHub OAuth
// =============================================================================

/// GET /connect/github
///
/// Redirects the visitor to GitHub's authorization page.
async fn github_redirect(State(state): State<AppState>, visitor: VisitorId) -> impl IntoResponse {
    let url = state.oauth_client.authorization_url(&visitor).await;
    Redirect::to(url.as_str())
}

// =============================================================================
// Logout
// =============================================================================

/// POST /logout
///
/// Clears the session cookie and redirects to login.
async fn logout(
    State(state): State<AppState>,
    visitor: VisitorId,
    jar: CookieJar,
) -> impl IntoResponse {
    let signed_in = jar.get(SESSION_COOKIE).is_some();
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));

    if signed_in {
        state
            .flash
            .add(&visitor, FlashLevel::Info, "You have been signed out.")
            .await;
    }

    (jar, Redirect::to(&state.config.routes.login))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_page_escapes_flash_messages() {
        let page = render_login_page(&[FlashMessage {
            level: FlashLevel::Danger,
            message: "<script>alert(1)</script>".to_string(),
        }]);

        assert!(page.contains(r#"class="flash flash-danger""#));
        assert!(page.contains("&lt;script&gt;"));
        assert!(!page.contains("<script>"));
    }

    #[test]
    fn login_page_links_to_github() {
        let page = render_login_page(&[]);

        assert!(page.contains(r#"href="/connect/github""#));
        assert!(!page.contains("flash"));
    }
}
