//! Data layer module
//!
//! Handles all data persistence:
//! - SQLite database operations
//! - The `UserRepository` seam used by the identity resolver

mod database;
mod models;
mod repository;

pub use database::Database;
pub use models::*;
pub use repository::UserRepository;

#[cfg(test)]
pub use repository::MockUserRepository;
