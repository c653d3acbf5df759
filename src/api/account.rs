//! Pages that require a signed-in user

use axum::{
    Json, Router,
    middleware,
    response::{Html, IntoResponse},
    routing::get,
};
use serde::Serialize;

use crate::AppState;
use crate::auth::{CurrentUser, require_auth};

/// Create protected router
///
/// Routes:
/// - GET / - Landing page (the `default` route)
/// - GET /account - Linked account details
pub fn account_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(home))
        .route("/account", get(account))
        .route_layer(middleware::from_fn_with_state(state, require_auth))
}

/// GET /
async fn home(CurrentUser { user, .. }: CurrentUser) -> impl IntoResponse {
    Html(format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Octogate</title></head>
<body>
    <p>Signed in as <strong>{}</strong></p>
    <form method="post" action="/logout"><button type="submit">Sign out</button></form>
</body>
</html>
"#,
        html_escape::encode_text(&user.identifier)
    ))
}

#[derive(Debug, Serialize)]
struct AccountResponse {
    identifier: String,
    github_id: Option<String>,
    remember_me: bool,
}

/// GET /account
async fn account(CurrentUser { user, session }: CurrentUser) -> Json<AccountResponse> {
    Json(AccountResponse {
        identifier: user.identifier,
        github_id: user.github_id,
        remember_me: session.remember_me,
    })
}
