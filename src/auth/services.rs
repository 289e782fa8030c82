use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{
        jwt::{Identity, TokenIssuer, TokenPair},
        notifier::ResetNotifier,
        reset::ResetTokenGenerator,
    },
    error::AppError,
    images::ImageRef,
    users::{
        repo_types::{normalize_email, normalize_username, validate_password},
        CredentialStore, NewUser, User,
    },
};

/// Optional profile changes; `None` leaves the field as is.
#[derive(Debug, Default)]
pub struct ProfileUpdate {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Sign-up, sign-in, refresh and password-reset flows over the credential
/// store, the token issuer and the reset-token generator.
#[derive(Clone)]
pub struct AuthService {
    users: CredentialStore,
    tokens: TokenIssuer,
    resets: ResetTokenGenerator,
    notifier: Arc<dyn ResetNotifier>,
    reset_link_base: String,
}

impl AuthService {
    pub fn new(
        users: CredentialStore,
        tokens: TokenIssuer,
        resets: ResetTokenGenerator,
        notifier: Arc<dyn ResetNotifier>,
        reset_link_base: String,
    ) -> Self {
        Self {
            users,
            tokens,
            resets,
            notifier,
            reset_link_base,
        }
    }

    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    pub fn users(&self) -> &CredentialStore {
        &self.users
    }

    #[instrument(skip(self, password))]
    pub async fn sign_up(&self, username: &str, email: &str, password: &str) -> Result<User, AppError> {
        let new_user = NewUser::new(username, email, password)?;
        self.users.create(new_user).await
    }

    /// Unknown identifiers and wrong passwords fail identically.
    #[instrument(skip(self, password))]
    pub async fn sign_in(&self, identifier: &str, password: &str) -> Result<(User, TokenPair), AppError> {
        let Some(user) = self.users.find_by_username_or_email(identifier).await? else {
            warn!("sign-in for unknown account");
            return Err(AppError::AuthenticationFailure);
        };
        if !self.users.verify_password(&user, password).await? {
            warn!(user_id = %user.id, "sign-in with wrong password");
            return Err(AppError::AuthenticationFailure);
        }
        let pair = self.tokens.issue_pair(&Identity::from(&user))?;
        info!(user_id = %user.id, "user signed in");
        Ok((user, pair))
    }

    /// Trades a valid refresh token for a new pair. A token for a user that
    /// no longer resolves is treated as invalid.
    #[instrument(skip_all)]
    pub async fn refresh(&self, refresh_token: &str) -> Result<(User, TokenPair), AppError> {
        let claims = self.tokens.verify_refresh(refresh_token)?;
        let user = match self.users.get(claims.sub).await {
            Ok(u) => u,
            Err(AppError::NotFound(_)) => return Err(AppError::InvalidToken),
            Err(e) => return Err(e),
        };
        let pair = self.tokens.issue_pair(&Identity::from(&user))?;
        Ok((user, pair))
    }

    /// Mints a reset token for the account and hands the raw value to the
    /// notifier. Returns `Ok(false)` for unknown emails so callers can
    /// answer both cases the same way.
    #[instrument(skip(self))]
    pub async fn request_password_reset(&self, email: &str) -> Result<bool, AppError> {
        let email = normalize_email(email)?;
        let Some(user) = self.users.find_by_username_or_email(&email).await? else {
            info!("password reset requested for unknown email");
            return Ok(false);
        };
        if user.email != email {
            return Ok(false);
        }

        let token = self.resets.generate();
        let user = self
            .users
            .set_reset_token(user.id, &token.hash, token.expires_at)
            .await?;

        let link = format!(
            "{}?email={}&token={}",
            self.reset_link_base, user.email, token.raw
        );
        self.notifier.send_reset_link(&user, &link).await?;
        Ok(true)
    }

    #[instrument(skip(self, raw_token, new_password))]
    pub async fn reset_password(
        &self,
        email: &str,
        raw_token: &str,
        new_password: &str,
    ) -> Result<User, AppError> {
        validate_password(new_password)?;
        let email = normalize_email(email)?;
        let user = match self.users.find_by_username_or_email(&email).await? {
            Some(u) if u.email == email && u.reset_token_hash.is_some() => u,
            _ => return Err(AppError::InvalidToken),
        };

        let user = self
            .users
            .reset_password(user.id, raw_token, new_password, OffsetDateTime::now_utc())
            .await?;
        info!(user_id = %user.id, "password reset completed");
        Ok(user)
    }

    #[instrument(skip(self, update))]
    pub async fn update_profile(&self, user_id: Uuid, update: ProfileUpdate) -> Result<User, AppError> {
        let mut user = self.users.get(user_id).await?;
        if let Some(username) = update.username {
            user.username = normalize_username(&username)?;
        }
        if let Some(email) = update.email {
            user.email = normalize_email(&email)?;
        }
        if let Some(password) = update.password {
            validate_password(&password)?;
            user.set_password(password);
        }
        self.users.save(&mut user).await?;
        Ok(user)
    }

    /// Points the user at a new avatar. Also returns the previous avatar
    /// unless it was the placeholder, so the caller can delete it.
    pub async fn replace_avatar(
        &self,
        user_id: Uuid,
        avatar: ImageRef,
    ) -> Result<(User, Option<ImageRef>), AppError> {
        let (before, after) = self.users.replace_avatar(user_id, &avatar).await?;
        let previous = (!before.has_default_avatar()).then(|| before.avatar());
        Ok((after, previous))
    }
}
