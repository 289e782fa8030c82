use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{auth::reset, error::AppError, images::ImageRef, users::repo_types::User};

/// Persistence for user records. Implementations enforce username and
/// email uniqueness atomically and report violations as `DuplicateKey`.
#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn insert(&self, user: &User) -> Result<User, AppError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError>;
    /// `identifier` is matched against the normalised username or email.
    async fn find_by_username_or_email(&self, identifier: &str) -> Result<Option<User>, AppError>;
    /// Writes username, email and, when given, a new password hash. Avatar
    /// and reset columns are left untouched.
    async fn update_profile(&self, user: &User, password_hash: Option<&str>) -> Result<User, AppError>;
    async fn set_reset_token(
        &self,
        id: Uuid,
        token_hash: &str,
        expires_at: OffsetDateTime,
    ) -> Result<User, AppError>;
    /// Runs `reset::consume` against the locked row and, on success, stores
    /// `new_password_hash`. An expired token is cleared before the error is
    /// returned.
    async fn consume_reset_token(
        &self,
        id: Uuid,
        candidate_hash: &str,
        new_password_hash: &str,
        now: OffsetDateTime,
    ) -> Result<User, AppError>;
    /// Swaps the avatar; returns the row before and after the change.
    async fn replace_avatar(&self, id: Uuid, image: &ImageRef) -> Result<(User, User), AppError>;
}

#[derive(Clone)]
pub struct PgUserRepo {
    db: PgPool,
}

impl PgUserRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn duplicate_message(constraint: Option<&str>) -> Option<&'static str> {
    match constraint? {
        "users_username_key" => Some("Username already exists"),
        "users_email_key" => Some("Email already exists"),
        _ => None,
    }
}

fn map_write_error(e: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            if let Some(msg) = duplicate_message(db.constraint()) {
                return AppError::DuplicateKey(msg.into());
            }
        }
    }
    AppError::Database(e)
}

#[async_trait]
impl UserRepo for PgUserRepo {
    async fn insert(&self, user: &User) -> Result<User, AppError> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, username, email, avatar_id, avatar_url, password_hash, role)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, username, email, avatar_id, avatar_url, password_hash, role,
                      reset_token_hash, reset_token_expires_at, created_at, updated_at
            "#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.avatar_id)
        .bind(&user.avatar_url)
        .bind(&user.password_hash)
        .bind(user.role)
        .fetch_one(&self.db)
        .await
        .map_err(map_write_error)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, avatar_id, avatar_url, password_hash, role,
                   reset_token_hash, reset_token_expires_at, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_username_or_email(&self, identifier: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, avatar_id, avatar_url, password_hash, role,
                   reset_token_hash, reset_token_expires_at, created_at, updated_at
            FROM users
            WHERE username = $1 OR email = $1
            LIMIT 1
            "#,
        )
        .bind(identifier)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn update_profile(&self, user: &User, password_hash: Option<&str>) -> Result<User, AppError> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users
               SET username = $2,
                   email = $3,
                   password_hash = COALESCE($4, password_hash),
                   updated_at = now()
             WHERE id = $1
            RETURNING id, username, email, avatar_id, avatar_url, password_hash, role,
                      reset_token_hash, reset_token_expires_at, created_at, updated_at
            "#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(password_hash)
        .fetch_optional(&self.db)
        .await
        .map_err(map_write_error)?
        .ok_or(AppError::NotFound("User"))
    }

    async fn set_reset_token(
        &self,
        id: Uuid,
        token_hash: &str,
        expires_at: OffsetDateTime,
    ) -> Result<User, AppError> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users
               SET reset_token_hash = $2,
                   reset_token_expires_at = $3,
                   updated_at = now()
             WHERE id = $1
            RETURNING id, username, email, avatar_id, avatar_url, password_hash, role,
                      reset_token_hash, reset_token_expires_at, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(token_hash)
        .bind(expires_at)
        .fetch_optional(&self.db)
        .await?
        .ok_or(AppError::NotFound("User"))
    }

    async fn consume_reset_token(
        &self,
        id: Uuid,
        candidate_hash: &str,
        new_password_hash: &str,
        now: OffsetDateTime,
    ) -> Result<User, AppError> {
        let mut tx = self.db.begin().await?;
        let mut user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, avatar_id, avatar_url, password_hash, role,
                   reset_token_hash, reset_token_expires_at, created_at, updated_at
            FROM users
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::InvalidToken)?;

        let outcome = reset::consume(&mut user, candidate_hash, now);
        if matches!(outcome, Err(AppError::InvalidToken)) {
            // nothing changed; dropping `tx` rolls back and releases the row
            return Err(AppError::InvalidToken);
        }
        if outcome.is_ok() {
            user.password_hash = new_password_hash.to_string();
        }

        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
               SET password_hash = $2,
                   reset_token_hash = NULL,
                   reset_token_expires_at = NULL,
                   updated_at = now()
             WHERE id = $1
            RETURNING id, username, email, avatar_id, avatar_url, password_hash, role,
                      reset_token_hash, reset_token_expires_at, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(&user.password_hash)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        outcome.map(|_| user)
    }

    async fn replace_avatar(&self, id: Uuid, image: &ImageRef) -> Result<(User, User), AppError> {
        let mut tx = self.db.begin().await?;
        let before = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, avatar_id, avatar_url, password_hash, role,
                   reset_token_hash, reset_token_expires_at, created_at, updated_at
            FROM users
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound("User"))?;

        let after = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
               SET avatar_id = $2,
                   avatar_url = $3,
                   updated_at = now()
             WHERE id = $1
            RETURNING id, username, email, avatar_id, avatar_url, password_hash, role,
                      reset_token_hash, reset_token_expires_at, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(&image.public_id)
        .bind(&image.url)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok((before, after))
    }
}
