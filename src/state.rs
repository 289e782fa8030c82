use std::sync::Arc;

use anyhow::Context;
use axum::extract::FromRef;
use sqlx::postgres::PgPoolOptions;
use tracing::warn;

use crate::{
    auth::{
        jwt::TokenIssuer,
        notifier::{LogNotifier, ResetNotifier},
        password::PasswordHasher,
        reset::ResetTokenGenerator,
        services::AuthService,
    },
    config::AppConfig,
    listings::repo::{ListingRepo, PgListingRepo},
    storage::{Storage, StorageClient},
    users::{CredentialStore, PgUserRepo, UserRepo},
};

#[derive(Clone)]
pub struct AppState {
    pub auth: AuthService,
    pub listings: Arc<dyn ListingRepo>,
    pub storage: Arc<dyn StorageClient>,
}

impl FromRef<AppState> for TokenIssuer {
    fn from_ref(state: &AppState) -> Self {
        state.auth.tokens().clone()
    }
}

impl AppState {
    pub async fn init(config: &AppConfig) -> anyhow::Result<Self> {
        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        if let Err(e) = sqlx::migrate!("./migrations").run(&db).await {
            warn!(error = %e, "migration failed; continuing");
        }

        let storage = Arc::new(Storage::new(&config.storage).await?) as Arc<dyn StorageClient>;
        let users = Arc::new(PgUserRepo::new(db.clone())) as Arc<dyn UserRepo>;
        let listings = Arc::new(PgListingRepo::new(db)) as Arc<dyn ListingRepo>;
        let notifier = Arc::new(LogNotifier) as Arc<dyn ResetNotifier>;

        Self::from_parts(config, users, listings, storage, notifier)
    }

    pub fn from_parts(
        config: &AppConfig,
        users: Arc<dyn UserRepo>,
        listings: Arc<dyn ListingRepo>,
        storage: Arc<dyn StorageClient>,
        notifier: Arc<dyn ResetNotifier>,
    ) -> anyhow::Result<Self> {
        let hasher = PasswordHasher::new(&config.password)?;
        let auth = AuthService::new(
            CredentialStore::new(users, hasher),
            TokenIssuer::new(&config.jwt),
            ResetTokenGenerator::new(&config.reset),
            notifier,
            config.reset.link_base_url.clone(),
        );
        Ok(Self {
            auth,
            listings,
            storage,
        })
    }
}
