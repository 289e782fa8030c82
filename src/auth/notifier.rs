use async_trait::async_trait;
use tracing::{debug, info};

use crate::users::User;

/// Out-of-band delivery of password-reset links.
#[async_trait]
pub trait ResetNotifier: Send + Sync {
    async fn send_reset_link(&self, user: &User, link: &str) -> anyhow::Result<()>;
}

/// Development notifier: writes the link to the log instead of mailing it.
pub struct LogNotifier;

#[async_trait]
impl ResetNotifier for LogNotifier {
    async fn send_reset_link(&self, user: &User, link: &str) -> anyhow::Result<()> {
        info!(user_id = %user.id, "password reset requested");
        debug!(user_id = %user.id, %link, "password reset link");
        Ok(())
    }
}
