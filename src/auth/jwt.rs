use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use crate::{config::JwtConfig, error::AppError, users::User};

/// Type of JWT: access or refresh.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Identity embedded in access tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: Uuid,
    pub email: String,
    pub username: String,
}

impl From<&User> for Identity {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            username: user.username.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: Uuid,
    pub email: String,
    pub username: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
    pub kind: TokenKind,
}

/// Refresh tokens carry the user id and nothing else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: Uuid,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
    pub kind: TokenKind,
}

trait Registered {
    fn exp(&self) -> i64;
    fn kind(&self) -> TokenKind;
}

impl Registered for AccessClaims {
    fn exp(&self) -> i64 {
        self.exp
    }
    fn kind(&self) -> TokenKind {
        self.kind
    }
}

impl Registered for RefreshClaims {
    fn exp(&self) -> i64 {
        self.exp
    }
    fn kind(&self) -> TokenKind {
        self.kind
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Clone)]
struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKeys {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// Signs and verifies access and refresh tokens. Each kind has its own
/// secret.
#[derive(Clone)]
pub struct TokenIssuer {
    access: SigningKeys,
    refresh: SigningKeys,
    issuer: String,
    audience: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenIssuer {
    pub fn new(cfg: &JwtConfig) -> Self {
        Self {
            access: SigningKeys::from_secret(&cfg.access_secret),
            refresh: SigningKeys::from_secret(&cfg.refresh_secret),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            access_ttl: Duration::minutes(cfg.access_ttl_minutes),
            refresh_ttl: Duration::minutes(cfg.refresh_ttl_minutes),
        }
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn issue_access(&self, identity: &Identity) -> Result<String, AppError> {
        self.issue_access_at(identity, OffsetDateTime::now_utc())
    }

    pub fn issue_access_at(&self, identity: &Identity, now: OffsetDateTime) -> Result<String, AppError> {
        let claims = AccessClaims {
            sub: identity.id,
            email: identity.email.clone(),
            username: identity.username.clone(),
            iat: now.unix_timestamp(),
            exp: (now + self.access_ttl).unix_timestamp(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            kind: TokenKind::Access,
        };
        let token = encode(&Header::default(), &claims, &self.access.encoding)
            .map_err(|e| AppError::Internal(e.into()))?;
        debug!(user_id = %identity.id, kind = ?TokenKind::Access, "jwt signed");
        Ok(token)
    }

    pub fn issue_refresh(&self, user_id: Uuid) -> Result<String, AppError> {
        self.issue_refresh_at(user_id, OffsetDateTime::now_utc())
    }

    pub fn issue_refresh_at(&self, user_id: Uuid, now: OffsetDateTime) -> Result<String, AppError> {
        let claims = RefreshClaims {
            sub: user_id,
            iat: now.unix_timestamp(),
            exp: (now + self.refresh_ttl).unix_timestamp(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            kind: TokenKind::Refresh,
        };
        let token = encode(&Header::default(), &claims, &self.refresh.encoding)
            .map_err(|e| AppError::Internal(e.into()))?;
        debug!(user_id = %user_id, kind = ?TokenKind::Refresh, "jwt signed");
        Ok(token)
    }

    pub fn issue_pair(&self, identity: &Identity) -> Result<TokenPair, AppError> {
        Ok(TokenPair {
            access_token: self.issue_access(identity)?,
            refresh_token: self.issue_refresh(identity.id)?,
        })
    }

    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, AppError> {
        self.verify_access_at(token, OffsetDateTime::now_utc())
    }

    pub fn verify_access_at(&self, token: &str, now: OffsetDateTime) -> Result<AccessClaims, AppError> {
        self.verify_with(token, &self.access, TokenKind::Access, now)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, AppError> {
        self.verify_refresh_at(token, OffsetDateTime::now_utc())
    }

    pub fn verify_refresh_at(&self, token: &str, now: OffsetDateTime) -> Result<RefreshClaims, AppError> {
        self.verify_with(token, &self.refresh, TokenKind::Refresh, now)
    }

    /// Signature, issuer and audience are checked by `jsonwebtoken`; expiry
    /// is compared against `now` here so callers can pin the clock.
    fn verify_with<C>(
        &self,
        token: &str,
        keys: &SigningKeys,
        expected: TokenKind,
        now: OffsetDateTime,
    ) -> Result<C, AppError>
    where
        C: DeserializeOwned + Registered,
    {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));

        let claims = decode::<C>(token, &keys.decoding, &validation)
            .map_err(|e| {
                debug!(error = %e, "jwt rejected");
                AppError::InvalidToken
            })?
            .claims;

        if claims.kind() != expected {
            return Err(AppError::InvalidToken);
        }
        if now.unix_timestamp() >= claims.exp() {
            return Err(AppError::ExpiredToken);
        }
        Ok(claims)
    }
}

#[cfg(test)]
pub(crate) fn test_jwt_config() -> JwtConfig {
    JwtConfig {
        access_secret: "test-access-secret".into(),
        refresh_secret: "test-refresh-secret".into(),
        issuer: "test-issuer".into(),
        audience: "test-aud".into(),
        access_ttl_minutes: 15,
        refresh_ttl_minutes: 60 * 24 * 7,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(&test_jwt_config())
    }

    fn identity() -> Identity {
        Identity {
            id: Uuid::new_v4(),
            email: "alice@x.com".into(),
            username: "alice".into(),
        }
    }

    #[test]
    fn sign_and_verify_access_token() {
        let keys = issuer();
        let who = identity();
        let token = keys.issue_access(&who).expect("sign access");
        let claims = keys.verify_access(&token).expect("verify token");
        assert_eq!(claims.sub, who.id);
        assert_eq!(claims.email, "alice@x.com");
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
        assert_eq!(claims.kind, TokenKind::Access);
    }

    #[test]
    fn refresh_token_carries_only_the_id() {
        let keys = issuer();
        let id = Uuid::new_v4();
        let token = keys.issue_refresh(id).expect("sign refresh");
        let claims = keys.verify_refresh(&token).expect("verify refresh");
        assert_eq!(claims.sub, id);
        assert_eq!(claims.kind, TokenKind::Refresh);

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&["test-aud"]);
        let raw = decode::<serde_json::Value>(
            &token,
            &DecodingKey::from_secret(b"test-refresh-secret"),
            &validation,
        )
        .unwrap()
        .claims;
        assert!(raw.get("email").is_none());
        assert!(raw.get("username").is_none());
    }

    #[test]
    fn access_token_expires_after_ttl() {
        let keys = issuer();
        let t = OffsetDateTime::now_utc();
        let token = keys.issue_access_at(&identity(), t).unwrap();
        assert!(keys.verify_access_at(&token, t + Duration::minutes(1)).is_ok());
        let err = keys
            .verify_access_at(&token, t + Duration::minutes(16))
            .unwrap_err();
        assert!(matches!(err, AppError::ExpiredToken));
    }

    #[test]
    fn kinds_are_not_interchangeable() {
        let keys = issuer();
        let who = identity();
        let access = keys.issue_access(&who).unwrap();
        let refresh = keys.issue_refresh(who.id).unwrap();
        assert!(matches!(keys.verify_refresh(&access), Err(AppError::InvalidToken)));
        assert!(matches!(keys.verify_access(&refresh), Err(AppError::InvalidToken)));
    }

    #[test]
    fn verify_rejects_wrong_issuer_or_audience() {
        let good = issuer();
        let mut cfg = test_jwt_config();
        cfg.issuer = "bad-iss".into();
        cfg.audience = "bad-aud".into();
        let bad = TokenIssuer::new(&cfg);
        let token = good.issue_access(&identity()).unwrap();
        assert!(matches!(bad.verify_access(&token), Err(AppError::InvalidToken)));
    }

    #[test]
    fn verify_rejects_foreign_secret_and_garbage() {
        let keys = issuer();
        let mut cfg = test_jwt_config();
        cfg.access_secret = "someone-else".into();
        let forged = TokenIssuer::new(&cfg).issue_access(&identity()).unwrap();
        assert!(matches!(keys.verify_access(&forged), Err(AppError::InvalidToken)));
        assert!(matches!(keys.verify_access("not.a.jwt"), Err(AppError::InvalidToken)));
        assert!(matches!(keys.verify_access(""), Err(AppError::InvalidToken)));
    }
}
