//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::path::PathBuf;

use crate::error::AppError;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub routes: RoutesConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 8080)
    pub port: u16,
    /// Public domain (e.g., "login.example.com")
    pub domain: String,
    /// Protocol ("http" or "https")
    pub protocol: String,
}

impl ServerConfig {
    /// Get the base URL for the instance
    ///
    /// # Returns
    /// Full URL like "https://login.example.com"
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.protocol, self.domain)
    }
}

/// Database configuration (SQLite only)
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    pub path: PathBuf,
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Session secret key (32+ bytes)
    pub session_secret: String,
    /// Session max age in seconds (default: 86400 = 1 day)
    pub session_max_age: i64,
    /// Session max age in seconds when remember-me is granted
    /// (default: 2592000 = 30 days)
    pub remember_me_max_age: i64,
    /// Security boundary name used to scope pending redirects
    pub firewall: String,
    pub github: GitHubOAuthConfig,
}

/// GitHub OAuth configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Authorization endpoint
    pub auth_url: String,
    /// Token endpoint
    pub token_url: String,
    /// REST API base used to fetch the signed-in user
    pub api_base_url: String,
    /// Scopes requested on the authorize redirect
    #[serde(default = "default_github_scopes")]
    pub scopes: Vec<String>,
    /// Link a GitHub login to an existing account whose identifier equals the
    /// GitHub nickname. Migration path for accounts created before GitHub
    /// linking existed; see DESIGN.md before enabling on new deployments.
    pub legacy_nickname_linking: bool,
}

fn default_github_scopes() -> Vec<String> {
    vec!["read:user".to_string()]
}

/// Named routes used for redirects
#[derive(Debug, Clone, Deserialize)]
pub struct RoutesConfig {
    /// Landing page after a successful login
    pub default: String,
    /// Login page, target of failed logins
    pub login: String,
}

/// Logging configuration
///
/// `RUST_LOG`, when set, replaces the filter built from `level`.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level for octogate: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl LoggingConfig {
    /// Default `EnvFilter` directives
    pub fn filter_directives(&self) -> String {
        format!(
            "octogate={},tower_http=debug",
            self.level.trim().to_ascii_lowercase()
        )
    }

    pub fn is_json(&self) -> bool {
        self.format.trim().eq_ignore_ascii_case("json")
    }
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (OCTOGATE__*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.domain", "localhost:8080")?
            .set_default("server.protocol", "http")?
            .set_default("database.path", "data/octogate.db")?
            .set_default("auth.session_max_age", 86400)?
            .set_default("auth.remember_me_max_age", 2_592_000)?
            .set_default("auth.firewall", "main")?
            .set_default(
                "auth.github.auth_url",
                "https://github.com/login/oauth/authorize",
            )?
            .set_default(
                "auth.github.token_url",
                "https://github.com/login/oauth/access_token",
            )?
            .set_default("auth.github.api_base_url", "https://api.github.com")?
            .set_default("auth.github.legacy_nickname_linking", true)?
            .set_default("routes.default", "/")?
            .set_default("routes.login", "/login")?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            // Load from config/default.toml if it exists
            .add_source(File::with_name("config/default").required(false))
            // Load from config/local.toml if it exists (overrides default)
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables (OCTOGATE__*)
            .add_source(
                Environment::with_prefix("OCTOGATE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    /// URL GitHub redirects back to after authorization
    pub fn github_redirect_url(&self) -> String {
        format!(
            "{}{}",
            self.server.base_url(),
            crate::auth::GITHUB_CHECK_PATH
        )
    }

    /// Secure cookies everywhere except plain-http local development.
    pub fn should_use_secure_cookies(&self) -> bool {
        self.server.is_https() || !self.server.is_local()
    }

    pub(crate) fn validate(&self) -> Result<(), AppError> {
        const MIN_SESSION_SECRET_BYTES: usize = 32;
        let invalid = |message: String| Err(AppError::Config(message));

        let auth = &self.auth;
        if auth.session_secret.len() < MIN_SESSION_SECRET_BYTES {
            return invalid(format!(
                "auth.session_secret must be at least {MIN_SESSION_SECRET_BYTES} bytes"
            ));
        }
        if auth.session_max_age <= 0 || auth.remember_me_max_age <= 0 {
            return invalid(
                "auth.session_max_age and auth.remember_me_max_age must be positive".to_string(),
            );
        }
        if auth.github.client_id.trim().is_empty() || auth.github.client_secret.trim().is_empty()
        {
            return invalid(
                "auth.github.client_id and auth.github.client_secret are required".to_string(),
            );
        }

        let routes = [
            ("routes.default", &self.routes.default),
            ("routes.login", &self.routes.login),
        ];
        if let Some((name, path)) = routes.iter().find(|(_, path)| !path.starts_with('/')) {
            return invalid(format!("{name} must be an absolute path, got {path:?}"));
        }

        if !self.server.is_https() && !self.server.is_local() {
            return invalid(format!(
                "server.protocol must be https for public domain {:?}",
                self.server.domain
            ));
        }

        let logging = &self.logging;
        if logging.level.trim().parse::<tracing::Level>().is_err() {
            return invalid(format!(
                "logging.level must be one of trace, debug, info, warn, error, got {:?}",
                logging.level
            ));
        }
        if !logging.is_json() && !logging.format.trim().eq_ignore_ascii_case("pretty") {
            return invalid(format!(
                "logging.format must be \"pretty\" or \"json\", got {:?}",
                logging.format
            ));
        }

        Ok(())
    }

    /// Risky but accepted settings, logged once tracing is up
    pub fn warnings(&self) -> Vec<&'static str> {
        let mut warnings = Vec::new();
        if !self.should_use_secure_cookies() {
            warnings.push("Serving over plain http; session cookies are not marked Secure");
        }
        if self.auth.github.legacy_nickname_linking {
            warnings.push(
                "auth.github.legacy_nickname_linking is enabled; GitHub logins may claim existing accounts by nickname",
            );
        }
        warnings
    }
}

impl ServerConfig {
    fn is_https(&self) -> bool {
        self.protocol.eq_ignore_ascii_case("https")
    }

    /// `localhost`, `*.localhost` and loopback/unspecified addresses
    fn is_local(&self) -> bool {
        let Ok(url) = url::Url::parse(&format!("http://{}", self.domain.trim())) else {
            return false;
        };

        match url.host() {
            Some(url::Host::Domain(name)) => {
                let name = name.trim_end_matches('.').to_ascii_lowercase();
                name == "localhost" || name.ends_with(".localhost")
            }
            Some(url::Host::Ipv4(ip)) => ip.is_loopback() || ip.is_unspecified(),
            Some(url::Host::Ipv6(ip)) => ip.is_loopback() || ip.is_unspecified(),
            None => false,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn valid_config() -> AppConfig {
        AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                domain: "localhost".to_string(),
                protocol: "http".to_string(),
            },
            database: DatabaseConfig {
                path: PathBuf::from("/tmp/octogate-test.db"),
            },
            auth: AuthConfig {
                session_secret: "x".repeat(32),
                session_max_age: 86_400,
                remember_me_max_age: 2_592_000,
                firewall: "main".to_string(),
                github: GitHubOAuthConfig {
                    client_id: "github-client-id".to_string(),
                    client_secret: "github-client-secret".to_string(),
                    auth_url: "https://github.com/login/oauth/authorize".to_string(),
                    token_url: "https://github.com/login/oauth/access_token".to_string(),
                    api_base_url: "https://api.github.com".to_string(),
                    scopes: default_github_scopes(),
                    legacy_nickname_linking: true,
                },
            },
            routes: RoutesConfig {
                default: "/".to_string(),
                login: "/login".to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }

    fn config_error(config: &AppConfig) -> String {
        match config.validate() {
            Err(AppError::Config(message)) => message,
            other => panic!("expected a config error, got {other:?}"),
        }
    }

    #[test]
    fn local_http_is_allowed_without_secure_cookies() {
        let config = valid_config();
        assert!(config.validate().is_ok());
        assert!(!config.should_use_secure_cookies());
    }

    #[test]
    fn loopback_addresses_count_as_local() {
        let mut config = valid_config();
        for domain in ["127.0.0.1:8080", "[::1]:3000", "dev.localhost", "LOCALHOST."] {
            config.server.domain = domain.to_string();
            assert!(config.server.is_local(), "{domain} should be local");
        }
        config.server.domain = "login.example.com".to_string();
        assert!(!config.server.is_local());
    }

    #[test]
    fn short_session_secret_is_rejected() {
        let mut config = valid_config();
        config.auth.session_secret = "too-short".to_string();

        assert!(config_error(&config).contains("auth.session_secret"));
    }

    #[test]
    fn public_domain_requires_https() {
        let mut config = valid_config();
        config.server.domain = "login.example.com".to_string();

        assert!(config_error(&config).contains("server.protocol must be https"));

        config.server.protocol = "https".to_string();
        assert!(config.validate().is_ok());
        assert!(config.should_use_secure_cookies());
    }

    #[test]
    fn relative_routes_are_rejected() {
        let mut config = valid_config();
        config.routes.login = "login".to_string();

        assert!(config_error(&config).contains("routes.login"));
    }

    #[test]
    fn blank_client_secret_is_rejected() {
        let mut config = valid_config();
        config.auth.github.client_secret = "  ".to_string();

        assert!(config_error(&config).contains("auth.github.client_secret"));
    }

    #[test]
    fn logging_section_drives_filter_and_format() {
        let mut config = valid_config();
        config.logging.level = "DEBUG".to_string();
        config.logging.format = "json".to_string();

        assert!(config.validate().is_ok());
        assert_eq!(
            config.logging.filter_directives(),
            "octogate=debug,tower_http=debug"
        );
        assert!(config.logging.is_json());
    }

    #[test]
    fn unknown_logging_values_are_rejected() {
        let mut config = valid_config();
        config.logging.level = "loud".to_string();
        assert!(config_error(&config).contains("logging.level"));

        let mut config = valid_config();
        config.logging.format = "xml".to_string();
        assert!(config_error(&config).contains("logging.format"));
    }

    #[test]
    fn local_http_and_legacy_linking_are_reported_as_warnings() {
        let mut config = valid_config();
        assert_eq!(config.warnings().len(), 2);

        config.server.protocol = "https".to_string();
        config.auth.github.legacy_nickname_linking = false;
        assert!(config.warnings().is_empty());
    }

    #[test]
    fn github_redirect_url_points_at_check_path() {
        let config = valid_config();
        assert_eq!(
            config.github_redirect_url(),
            "http://localhost/connect/check/github"
        );
    }
}
