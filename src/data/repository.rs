//! User lookup and persistence seam
//!
//! The identity resolver only talks to this trait, so tests can swap the
//! SQLite database for a mock.

use async_trait::async_trait;

use super::database::Database;
use super::models::User;
use crate::error::AppError;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_github_id(&self, github_id: &str) -> Result<Option<User>, AppError>;

    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<User>, AppError>;

    /// Persist and commit the user
    async fn save(&self, user: &User) -> Result<(), AppError>;
}

#[async_trait]
impl UserRepository for Database {
    async fn find_by_github_id(&self, github_id: &str) -> Result<Option<User>, AppError> {
        self.get_user_by_github_id(github_id).await
    }

    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<User>, AppError> {
        self.get_user_by_identifier(identifier).await
    }

    async fn save(&self, user: &User) -> Result<(), AppError> {
        self.upsert_user(user).await
    }
}
