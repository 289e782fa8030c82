use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{error::AppError, images::ImageRef};

pub const DEFAULT_AVATAR_ID: &str = "12345";
pub const DEFAULT_AVATAR_URL: &str =
    "https://encrypted-tbn0.gstatic.com/images?q=tbn:ANd9GcTUhvgMYGOcSZXmbHOuSP4a84MTXAYC_vzD6-0-d9exhg&s";

pub const MIN_PASSWORD_LEN: usize = 8;
const MAX_USERNAME_LEN: usize = 64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

/// User record in the database.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub avatar_id: String,
    pub avatar_url: String,
    pub password_hash: String,
    pub role: Role,
    pub reset_token_hash: Option<String>,
    pub reset_token_expires_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    /// Plaintext set since load; hashed and cleared by the save path.
    #[sqlx(skip)]
    pending_password: Option<String>,
}

impl User {
    pub fn set_password(&mut self, plain: impl Into<String>) {
        self.pending_password = Some(plain.into());
    }

    pub(crate) fn take_pending_password(&mut self) -> Option<String> {
        self.pending_password.take()
    }

    pub fn has_pending_password(&self) -> bool {
        self.pending_password.is_some()
    }

    pub fn avatar(&self) -> ImageRef {
        ImageRef {
            public_id: self.avatar_id.clone(),
            url: self.avatar_url.clone(),
        }
    }

    pub fn has_default_avatar(&self) -> bool {
        self.avatar_id == DEFAULT_AVATAR_ID
    }

    pub fn set_avatar(&mut self, image: ImageRef) {
        self.avatar_id = image.public_id;
        self.avatar_url = image.url;
    }

    pub fn set_reset_token(&mut self, hash: String, expires_at: OffsetDateTime) {
        self.reset_token_hash = Some(hash);
        self.reset_token_expires_at = Some(expires_at);
    }

    pub fn clear_reset_token(&mut self) {
        self.reset_token_hash = None;
        self.reset_token_expires_at = None;
    }
}

/// Validated sign-up input, already normalised.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: Role,
}

impl NewUser {
    pub fn new(username: &str, email: &str, password: &str) -> Result<Self, AppError> {
        let username = normalize_username(username)?;
        let email = normalize_email(email)?;
        validate_password(password)?;
        Ok(Self {
            username,
            email,
            password: password.to_string(),
            role: Role::User,
        })
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    /// Builds the record to persist, with the hash computed beforehand.
    pub fn into_user(self, password_hash: String, now: OffsetDateTime) -> User {
        User {
            id: Uuid::new_v4(),
            username: self.username,
            email: self.email,
            avatar_id: DEFAULT_AVATAR_ID.to_string(),
            avatar_url: DEFAULT_AVATAR_URL.to_string(),
            password_hash,
            role: self.role,
            reset_token_hash: None,
            reset_token_expires_at: None,
            created_at: now,
            updated_at: now,
            pending_password: None,
        }
    }
}

pub fn normalize_identifier(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex =
            Regex::new(r"^\w+([.-]?\w+)*@\w+([.-]?\w+)*(\.\w{2,3})+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub fn normalize_email(raw: &str) -> Result<String, AppError> {
    let email = normalize_identifier(raw);
    if !is_valid_email(&email) {
        return Err(AppError::validation("Email address must be a valid address"));
    }
    Ok(email)
}

pub fn normalize_username(raw: &str) -> Result<String, AppError> {
    let username = normalize_identifier(raw);
    if username.is_empty() {
        return Err(AppError::validation("Username is required"));
    }
    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(AppError::validation("Username is too long"));
    }
    // '@' would make sign-in by username-or-email ambiguous
    if username.contains('@') || username.chars().any(char::is_whitespace) {
        return Err(AppError::validation(
            "Username must not contain '@' or whitespace",
        ));
    }
    Ok(username)
}

pub fn validate_password(plain: &str) -> Result<(), AppError> {
    if plain.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::validation("Password too short"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_user_is_normalised() {
        let u = NewUser::new("  Alice ", " Alice@X.com ", "Secret123").unwrap();
        assert_eq!(u.username, "alice");
        assert_eq!(u.email, "alice@x.com");
        assert_eq!(u.role, Role::User);
    }

    #[test]
    fn defaults_on_new_record() {
        let user = NewUser::new("alice", "alice@x.com", "Secret123")
            .unwrap()
            .into_user("hash".into(), OffsetDateTime::now_utc());
        assert_eq!(user.role, Role::User);
        assert_eq!(user.avatar_url, DEFAULT_AVATAR_URL);
        assert!(user.has_default_avatar());
        assert!(user.reset_token_hash.is_none());
        assert!(!user.has_pending_password());
    }

    #[test]
    fn email_pattern() {
        assert!(is_valid_email("alice@x.com"));
        assert!(is_valid_email("first.last@mail.example.org"));
        assert!(!is_valid_email("alice"));
        assert!(!is_valid_email("alice@x"));
        assert!(!is_valid_email("a lice@x.com"));
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(
            NewUser::new("", "alice@x.com", "Secret123"),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            NewUser::new("a@b", "alice@x.com", "Secret123"),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            NewUser::new("alice", "nope", "Secret123"),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            NewUser::new("alice", "alice@x.com", "short"),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn reset_fields_move_together() {
        let mut user = NewUser::new("alice", "alice@x.com", "Secret123")
            .unwrap()
            .into_user("hash".into(), OffsetDateTime::now_utc());
        user.set_reset_token("abc".into(), OffsetDateTime::now_utc());
        assert!(user.reset_token_hash.is_some() && user.reset_token_expires_at.is_some());
        user.clear_reset_token();
        assert!(user.reset_token_hash.is_none() && user.reset_token_expires_at.is_none());
    }

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"admin\"");
    }
}
