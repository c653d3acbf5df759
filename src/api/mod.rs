//! API layer
//!
//! HTTP handlers for:
//! - Login page, GitHub start and logout
//! - Protected account pages
//! - Metrics (Prometheus)

mod account;
mod login;
pub mod metrics;

pub use account::account_router;
pub use login::login_router;
pub use metrics::metrics_router;
