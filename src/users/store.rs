use std::sync::Arc;

use anyhow::Context;
use time::OffsetDateTime;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    auth::{
        password::{HashUpdate, PasswordHasher},
        reset,
    },
    error::AppError,
    images::ImageRef,
    users::{
        repo::UserRepo,
        repo_types::{normalize_identifier, NewUser, User},
    },
};

/// User persistence plus the password-hash lifecycle around it.
#[derive(Clone)]
pub struct CredentialStore {
    repo: Arc<dyn UserRepo>,
    hasher: PasswordHasher,
}

impl CredentialStore {
    pub fn new(repo: Arc<dyn UserRepo>, hasher: PasswordHasher) -> Self {
        Self { repo, hasher }
    }

    /// Hashes first, then writes once; a duplicate or a failed hash leaves
    /// no record behind.
    pub async fn create(&self, new_user: NewUser) -> Result<User, AppError> {
        let hash = self.hash_blocking(new_user.password.clone()).await?;
        let user = new_user.into_user(hash, OffsetDateTime::now_utc());
        let user = self.repo.insert(&user).await?;
        info!(user_id = %user.id, username = %user.username, "user created");
        Ok(user)
    }

    pub async fn find_by_username_or_email(&self, identifier: &str) -> Result<Option<User>, AppError> {
        self.repo
            .find_by_username_or_email(&normalize_identifier(identifier))
            .await
    }

    pub async fn get(&self, id: Uuid) -> Result<User, AppError> {
        self.repo
            .find_by_id(id)
            .await?
            .ok_or(AppError::NotFound("User"))
    }

    /// Persists the profile fields of `user` (username, email, password),
    /// re-hashing only when a new plaintext was set since it was loaded.
    /// Avatar and reset columns are written through their own operations,
    /// so a stale copy never clobbers them. On success `user` reflects the
    /// stored row.
    pub async fn save(&self, user: &mut User) -> Result<(), AppError> {
        let pending = user.take_pending_password();
        let hasher = self.hasher.clone();
        let update = tokio::task::spawn_blocking(move || hasher.derive_hash(pending.as_deref()))
            .await
            .context("password hash task")??;
        let new_hash = match update {
            HashUpdate::Rehashed(hash) => {
                debug!(user_id = %user.id, "password re-hashed");
                Some(hash)
            }
            HashUpdate::Unchanged => None,
        };
        *user = self.repo.update_profile(user, new_hash.as_deref()).await?;
        Ok(())
    }

    pub async fn set_reset_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: OffsetDateTime,
    ) -> Result<User, AppError> {
        self.repo.set_reset_token(user_id, token_hash, expires_at).await
    }

    /// Hashes `new_password`, then checks and clears the reset token and
    /// stores the hash in one repository step.
    pub async fn reset_password(
        &self,
        user_id: Uuid,
        raw_token: &str,
        new_password: &str,
        now: OffsetDateTime,
    ) -> Result<User, AppError> {
        let hash = self.hash_blocking(new_password.to_string()).await?;
        self.repo
            .consume_reset_token(user_id, &reset::hash_token(raw_token), &hash, now)
            .await
    }

    /// Returns the updated user and the avatar it had before.
    pub async fn replace_avatar(&self, user_id: Uuid, image: &ImageRef) -> Result<(User, User), AppError> {
        self.repo.replace_avatar(user_id, image).await
    }

    pub async fn verify_password(&self, user: &User, plain: &str) -> Result<bool, AppError> {
        let hasher = self.hasher.clone();
        let plain = plain.to_string();
        let hash = user.password_hash.clone();
        let ok = tokio::task::spawn_blocking(move || hasher.verify(&plain, &hash))
            .await
            .context("password verify task")?;
        Ok(ok)
    }

    async fn hash_blocking(&self, plain: String) -> Result<String, AppError> {
        let hasher = self.hasher.clone();
        let hash = tokio::task::spawn_blocking(move || hasher.hash(&plain))
            .await
            .context("password hash task")??;
        Ok(hash)
    }
}
