use anyhow::Context;
use serde::Deserialize;

const MAX_ACCESS_TTL_MINUTES: i64 = 60 * 24;
const MAX_REFRESH_TTL_MINUTES: i64 = 60 * 24 * 365;
const MAX_RESET_TTL_MINUTES: i64 = 60 * 24;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub issuer: String,
    pub audience: String,
    pub access_ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

/// Argon2id work factor.
#[derive(Debug, Clone, Deserialize)]
pub struct PasswordConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResetConfig {
    pub ttl_minutes: i64,
    pub link_base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    pub public_base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub jwt: JwtConfig,
    pub password: PasswordConfig,
    pub reset: ResetConfig,
    pub storage: StorageConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(get: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| get(key).with_context(|| format!("{key} must be set"));
        let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());
        let number = |key: &str, default: i64| -> anyhow::Result<i64> {
            match get(key) {
                Some(v) => v.parse::<i64>().with_context(|| format!("{key} must be a number")),
                None => Ok(default),
            }
        };
        let minutes = |key: &str, default: i64, max: i64| -> anyhow::Result<i64> {
            let v = number(key, default)?;
            anyhow::ensure!((1..=max).contains(&v), "{key} must be between 1 and {max}");
            Ok(v)
        };
        let unsigned = |key: &str, default: u32| -> anyhow::Result<u32> {
            let v = number(key, i64::from(default))?;
            u32::try_from(v).with_context(|| format!("{key} must fit in an unsigned 32-bit integer"))
        };

        let jwt = JwtConfig {
            access_secret: required("ACCESS_TOKEN_SECRET")?,
            refresh_secret: required("REFRESH_TOKEN_SECRET")?,
            issuer: or("JWT_ISSUER", "homestead"),
            audience: or("JWT_AUDIENCE", "homestead-users"),
            access_ttl_minutes: minutes("ACCESS_TOKEN_TTL_MINUTES", 60, MAX_ACCESS_TTL_MINUTES)?,
            refresh_ttl_minutes: minutes(
                "REFRESH_TOKEN_TTL_MINUTES",
                60 * 24 * 14,
                MAX_REFRESH_TTL_MINUTES,
            )?,
        };
        anyhow::ensure!(
            jwt.access_secret != jwt.refresh_secret,
            "ACCESS_TOKEN_SECRET and REFRESH_TOKEN_SECRET must differ"
        );

        let password = PasswordConfig {
            memory_kib: unsigned("PASSWORD_MEMORY_KIB", 19 * 1024)?,
            iterations: unsigned("PASSWORD_ITERATIONS", 2)?,
            parallelism: unsigned("PASSWORD_PARALLELISM", 1)?,
        };

        let reset = ResetConfig {
            ttl_minutes: minutes("RESET_TOKEN_TTL_MINUTES", 15, MAX_RESET_TTL_MINUTES)?,
            link_base_url: or("RESET_LINK_BASE_URL", "http://localhost:5173/reset-password"),
        };

        let endpoint = required("MINIO_ENDPOINT")?;
        let bucket = required("MINIO_BUCKET")?;
        let public_base_url = get("MEDIA_PUBLIC_BASE_URL").unwrap_or_else(|| {
            format!("{}/{}", endpoint.trim_end_matches('/'), bucket)
        });
        let storage = StorageConfig {
            access_key: required("MINIO_ACCESS_KEY")?,
            secret_key: required("MINIO_SECRET_KEY")?,
            region: or("MINIO_REGION", "us-east-1"),
            endpoint,
            bucket,
            public_base_url,
        };

        let port = or("APP_PORT", "8080")
            .parse::<u16>()
            .context("APP_PORT must be a port number")?;

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            host: or("APP_HOST", "0.0.0.0"),
            port,
            jwt,
            password,
            reset,
            storage,
        })
    }
}
