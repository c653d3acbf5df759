//! Pending post-login redirects
//!
//! When an anonymous visitor hits a protected page, the page they wanted is
//! remembered here and consumed after a successful login.

use moka::future::Cache;
use std::time::Duration;

use super::visitor::VisitorId;

const TARGET_PATH_TTL: Duration = Duration::from_secs(60 * 60);

/// Intended destinations keyed by (visitor, firewall)
pub struct TargetPathStore {
    paths: Cache<(String, String), String>,
}

impl TargetPathStore {
    pub fn new() -> Self {
        let paths = Cache::builder()
            .max_capacity(100_000)
            .time_to_live(TARGET_PATH_TTL)
            .build();

        Self { paths }
    }

    /// Remember where to send the visitor after login
    ///
    /// Only same-origin absolute paths are stored. Returns false when the
    /// path was ignored.
    pub async fn save(&self, visitor: &VisitorId, firewall: &str, path: &str) -> bool {
        if !is_local_path(path) {
            tracing::debug!(path, "Ignoring non-local target path");
            return false;
        }

        self.paths
            .insert(key(visitor, firewall), path.to_owned())
            .await;
        true
    }

    /// Take the stored destination, if any
    pub async fn take(&self, visitor: &VisitorId, firewall: &str) -> Option<String> {
        self.paths.remove(&key(visitor, firewall)).await
    }
}

impl Default for TargetPathStore {
    fn default() -> Self {
        Self::new()
    }
}

fn key(visitor: &VisitorId, firewall: &str) -> (String, String) {
    (visitor.as_str().to_owned(), firewall.to_owned())
}

fn is_local_path(path: &str) -> bool {
    path.starts_with('/') && !path.starts_with("//") && !path.contains('\\')
}
