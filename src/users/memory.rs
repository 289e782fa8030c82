use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    auth::reset,
    error::AppError,
    images::ImageRef,
    users::{repo::UserRepo, repo_types::User},
};

/// `UserRepo` over a map; the single lock makes the uniqueness check and
/// the write one atomic step.
#[derive(Default)]
pub struct MemoryUserRepo {
    users: Mutex<HashMap<Uuid, User>>,
}

fn check_unique(users: &HashMap<Uuid, User>, candidate: &User) -> Result<(), AppError> {
    for other in users.values().filter(|u| u.id != candidate.id) {
        if other.username == candidate.username {
            return Err(AppError::DuplicateKey("Username already exists".into()));
        }
        if other.email == candidate.email {
            return Err(AppError::DuplicateKey("Email already exists".into()));
        }
    }
    Ok(())
}

#[async_trait]
impl UserRepo for MemoryUserRepo {
    async fn insert(&self, user: &User) -> Result<User, AppError> {
        let mut users = self.users.lock().await;
        check_unique(&users, user)?;
        users.insert(user.id, user.clone());
        Ok(user.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self.users.lock().await.get(&id).cloned())
    }

    async fn find_by_username_or_email(&self, identifier: &str) -> Result<Option<User>, AppError> {
        Ok(self
            .users
            .lock()
            .await
            .values()
            .find(|u| u.username == identifier || u.email == identifier)
            .cloned())
    }

    async fn update_profile(&self, user: &User, password_hash: Option<&str>) -> Result<User, AppError> {
        let mut users = self.users.lock().await;
        check_unique(&users, user)?;
        let stored = users.get_mut(&user.id).ok_or(AppError::NotFound("User"))?;
        stored.username = user.username.clone();
        stored.email = user.email.clone();
        if let Some(hash) = password_hash {
            stored.password_hash = hash.to_string();
        }
        stored.updated_at = OffsetDateTime::now_utc();
        Ok(stored.clone())
    }

    async fn set_reset_token(
        &self,
        id: Uuid,
        token_hash: &str,
        expires_at: OffsetDateTime,
    ) -> Result<User, AppError> {
        let mut users = self.users.lock().await;
        let stored = users.get_mut(&id).ok_or(AppError::NotFound("User"))?;
        stored.set_reset_token(token_hash.to_string(), expires_at);
        stored.updated_at = OffsetDateTime::now_utc();
        Ok(stored.clone())
    }

    async fn consume_reset_token(
        &self,
        id: Uuid,
        candidate_hash: &str,
        new_password_hash: &str,
        now: OffsetDateTime,
    ) -> Result<User, AppError> {
        let mut users = self.users.lock().await;
        let stored = users.get_mut(&id).ok_or(AppError::InvalidToken)?;
        let outcome = reset::consume(stored, candidate_hash, now);
        if matches!(outcome, Err(AppError::InvalidToken)) {
            return Err(AppError::InvalidToken);
        }
        if outcome.is_ok() {
            stored.password_hash = new_password_hash.to_string();
        }
        stored.updated_at = OffsetDateTime::now_utc();
        outcome.map(|_| stored.clone())
    }

    async fn replace_avatar(&self, id: Uuid, image: &ImageRef) -> Result<(User, User), AppError> {
        let mut users = self.users.lock().await;
        let stored = users.get_mut(&id).ok_or(AppError::NotFound("User"))?;
        let before = stored.clone();
        stored.set_avatar(image.clone());
        stored.updated_at = OffsetDateTime::now_utc();
        Ok((before, stored.clone()))
    }
}
