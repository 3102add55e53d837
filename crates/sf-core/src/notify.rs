//! Operator notification side channel.
//!
//! Fire-and-forget: notification failures never affect the outcome of
//! the operation that triggered them.

use async_trait::async_trait;
use tracing::warn;

use crate::models::account::Account;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// An account failed to authenticate.
    async fn auth_failed(&self, account: &Account, reason: &str);

    /// An account was disabled after persistent failure.
    async fn account_disabled(&self, account: &Account);
}

/// Notifier that only emits log events. Default when no external
/// channel is wired up.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn auth_failed(&self, account: &Account, reason: &str) {
        warn!(
            account_id = account.id,
            username = %account.username,
            reason,
            "account failed to authenticate"
        );
    }

    async fn account_disabled(&self, account: &Account) {
        warn!(
            account_id = account.id,
            username = %account.username,
            "account disabled after repeated failures"
        );
    }
}
