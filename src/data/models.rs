//! Data models
//!
//! Rust structs representing database entities.
//! All models use ULID for IDs and chrono for timestamps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// ID Types
// =============================================================================

/// Entity ID wrapper (ULID format, 26 characters)
///
/// Example: "01ARZ3NDEKTSV4RRFFQ69G5FAV"
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    /// Generate a new ULID
    pub fn new() -> Self {
        Self(ulid::Ulid::new().to_string())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// User
// =============================================================================

/// A local user account
///
/// `identifier` is the stable login name carried in sessions.
/// `github_id` is set once the account has signed in with GitHub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub identifier: String,
    pub github_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Build a new, unsaved user linked to a GitHub account
    pub fn new_github(identifier: impl Into<String>, github_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: EntityId::new().0,
            identifier: identifier.into(),
            github_id: Some(github_id.into()),
            created_at: now,
            updated_at: now,
        }
    }

    /// Attach a GitHub account id
    pub fn link_github(&mut self, github_id: impl Into<String>) {
        self.github_id = Some(github_id.into());
        self.updated_at = Utc::now();
    }
}
