//! Octogate binary entry point

use octogate::{
    AppState,
    config::{AppConfig, LoggingConfig},
};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber from the `logging` section.
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.filter_directives()));

    let registry = tracing_subscriber::registry().with(filter);
    if logging.is_json() {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().pretty()).init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Errors here are printed by the runtime; tracing is not installed yet.
    let config = AppConfig::load()?;

    init_tracing(&config.logging);
    octogate::metrics::init_metrics();

    for warning in config.warnings() {
        tracing::warn!(domain = %config.server.domain, "{warning}");
    }
    tracing::info!(
        base_url = %config.server.base_url(),
        callback = %config.github_redirect_url(),
        legacy_nickname_linking = config.auth.github.legacy_nickname_linking,
        "Configuration loaded"
    );

    let bind_addr = (config.server.host.clone(), config.server.port);
    let app = octogate::build_router(AppState::new(config).await?);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "Octogate listening");

    axum::serve(listener, app).await?;
    Ok(())
}
