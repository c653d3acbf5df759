//! Maps a GitHub identity to a local user
//!
//! Lookup order is fixed:
//! 1. user already linked to the GitHub id
//! 2. legacy account whose identifier equals the GitHub nickname
//!    (only when `auth.github.legacy_nickname_linking` is on)
//! 3. new user

use std::sync::Arc;

use super::oauth::RemoteIdentity;
use crate::data::{User, UserRepository};
use crate::error::AppError;
use crate::metrics;

/// Find-or-create policy for GitHub logins
pub struct IdentityResolver {
    users: Arc<dyn UserRepository>,
    legacy_nickname_linking: bool,
}

impl IdentityResolver {
    pub fn new(users: Arc<dyn UserRepository>, legacy_nickname_linking: bool) -> Self {
        Self {
            users,
            legacy_nickname_linking,
        }
    }

    /// Resolve `identity` to a stored user, writing at most once.
    ///
    /// # Errors
    /// Persistence failures are returned as-is; they are not login failures.
    pub async fn resolve(&self, identity: &RemoteIdentity) -> Result<User, AppError> {
        if let Some(user) = self
            .users
            .find_by_github_id(&identity.provider_user_id)
            .await?
        {
            tracing::debug!(
                identifier = %user.identifier,
                github_id = %identity.provider_user_id,
                "Returning GitHub user"
            );
            metrics::record_identity_resolution("existing");
            return Ok(user);
        }

        if self.legacy_nickname_linking {
            if let Some(user) = self.link_legacy_account(identity).await? {
                return Ok(user);
            }
        }

        let user = User::new_github(&identity.nickname, &identity.provider_user_id);
        self.users.save(&user).await?;

        tracing::info!(
            identifier = %user.identifier,
            github_id = %identity.provider_user_id,
            "Registered new user from GitHub"
        );
        metrics::record_identity_resolution("created");
        Ok(user)
    }

    /// Migration path for accounts created before GitHub linking existed.
    ///
    /// Claims the account whose identifier equals the GitHub nickname and
    /// stores the GitHub id on it. Anyone holding that nickname on GitHub
    /// gets the account, so remove this once existing users have migrated.
    async fn link_legacy_account(
        &self,
        identity: &RemoteIdentity,
    ) -> Result<Option<User>, AppError> {
        let Some(mut user) = self.users.find_by_identifier(&identity.nickname).await? else {
            return Ok(None);
        };

        let previous_github_id = user.github_id.clone();
        user.link_github(&identity.provider_user_id);
        self.users.save(&user).await?;

        tracing::warn!(
            identifier = %user.identifier,
            github_id = %identity.provider_user_id,
            previous_github_id = ?previous_github_id,
            "Linked existing account to GitHub by nickname"
        );
        metrics::record_identity_resolution("legacy_link");
        Ok(Some(user))
    }
}
