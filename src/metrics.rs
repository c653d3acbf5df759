//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use lazy_static::lazy_static;
use prometheus::{IntCounterVec, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Login Metrics
    pub static ref LOGIN_ATTEMPTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("octogate_login_attempts_total", "Total number of GitHub login callbacks handled"),
        &["outcome"]
    ).expect("metric can be created");
    pub static ref IDENTITY_RESOLUTIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("octogate_identity_resolutions_total", "Total number of GitHub identities resolved to local users"),
        &["path"]
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("octogate_errors_total", "Total number of errors"),
        &["error_type"]
    ).expect("metric can be created");
}

/// Initialize metrics registry.
///
/// Safe to call more than once; later registrations are ignored.
pub fn init_metrics() {
    let collectors: [(&str, Box<dyn prometheus::core::Collector>); 3] = [
        (
            "LOGIN_ATTEMPTS_TOTAL",
            Box::new(LOGIN_ATTEMPTS_TOTAL.clone()),
        ),
        (
            "IDENTITY_RESOLUTIONS_TOTAL",
            Box::new(IDENTITY_RESOLUTIONS_TOTAL.clone()),
        ),
        ("ERRORS_TOTAL", Box::new(ERRORS_TOTAL.clone())),
    ];

    for (name, collector) in collectors {
        match REGISTRY.register(collector) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(error) => tracing::error!(%error, metric = name, "Failed to register metric"),
        }
    }

    tracing::info!("Metrics registry initialized");
}

/// Record the outcome of a login callback ("success", "failure", "error").
pub fn record_login_attempt(outcome: &str) {
    LOGIN_ATTEMPTS_TOTAL.with_label_values(&[outcome]).inc();
}

/// Record which branch resolved an identity ("existing", "legacy_link", "created").
pub fn record_identity_resolution(path: &str) {
    IDENTITY_RESOLUTIONS_TOTAL.with_label_values(&[path]).inc();
}
