use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use time::{Duration, OffsetDateTime};

use crate::{config::ResetConfig, error::AppError, users::User};

const RAW_TOKEN_BYTES: usize = 32;

/// A freshly minted reset token. Only `hash` and `expires_at` are
/// persisted; `raw` goes to the user and is never stored.
#[derive(Debug, Clone)]
pub struct ResetToken {
    pub raw: String,
    pub hash: String,
    pub expires_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct ResetTokenGenerator {
    ttl: Duration,
}

impl ResetTokenGenerator {
    pub fn new(cfg: &ResetConfig) -> Self {
        Self {
            ttl: Duration::minutes(cfg.ttl_minutes),
        }
    }

    pub fn generate(&self) -> ResetToken {
        self.generate_at(OffsetDateTime::now_utc())
    }

    pub fn generate_at(&self, now: OffsetDateTime) -> ResetToken {
        let mut bytes = [0u8; RAW_TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        let raw = hex::encode(bytes);
        ResetToken {
            hash: hash_token(&raw),
            raw,
            expires_at: now + self.ttl,
        }
    }
}

/// SHA-256 of the raw token, hex encoded.
pub fn hash_token(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Single-use check of `candidate_hash` (the `hash_token` of the presented
/// raw token) against the user's outstanding reset token. Success and
/// expiry both clear the stored pair; a mismatch leaves it in place.
///
/// Repositories call this while holding the row, so two callers holding
/// the same token cannot both succeed.
pub fn consume(user: &mut User, candidate_hash: &str, now: OffsetDateTime) -> Result<(), AppError> {
    let (Some(stored), Some(expires_at)) = (&user.reset_token_hash, user.reset_token_expires_at)
    else {
        return Err(AppError::InvalidToken);
    };
    if !constant_time_eq(candidate_hash.as_bytes(), stored.as_bytes()) {
        return Err(AppError::InvalidToken);
    }
    if now > expires_at {
        user.clear_reset_token();
        return Err(AppError::ExpiredToken);
    }
    user.clear_reset_token();
    Ok(())
}
