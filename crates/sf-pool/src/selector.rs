//! Pool-wide account selection and health scoring.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use sf_core::{Account, AccountRepository, RepoError};

#[derive(Debug, Error)]
pub enum SelectorError {
    #[error("no usable account available")]
    NoAccountAvailable,

    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone)]
pub struct SelectorConfig {
    /// An account is not reused until this long after its last use.
    pub used_cooldown: Duration,
    /// Cooldown after an authentication failure forced a timeout.
    pub forced_cooldown: Duration,
    /// Freshly onboarded accounts are left alone for this long.
    pub creation_grace: Duration,
    /// Accounts at or above this error count are never selected.
    pub max_errors: u32,
    /// Base for the pool-wide request delay, in seconds.
    pub base_delay: u64,
    /// How long a preferred-server answer stays cached.
    pub preferred_server_ttl: std::time::Duration,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            used_cooldown: Duration::seconds(100),
            forced_cooldown: Duration::seconds(500),
            creation_grace: Duration::seconds(60),
            max_errors: 10,
            base_delay: 200,
            preferred_server_ttl: std::time::Duration::from_secs(60),
        }
    }
}

/// Minimum delay reported when the pool has no usable accounts.
const EMPTY_POOL_DELAY: u64 = 200;

pub struct AccountSelector {
    accounts: Arc<dyn AccountRepository>,
    config: SelectorConfig,
    /// Identifier of this node; accounts assigned elsewhere are skipped.
    server: Option<String>,
    preferred_cache: Mutex<Option<(Instant, Option<String>)>>,
}

impl AccountSelector {
    pub fn new(
        accounts: Arc<dyn AccountRepository>,
        config: SelectorConfig,
        server: Option<String>,
    ) -> Self {
        Self {
            accounts,
            config,
            server,
            preferred_cache: Mutex::new(None),
        }
    }

    fn server_matches(&self, assigned: Option<&str>) -> bool {
        match assigned {
            None => true,
            Some("default") => true,
            Some(s) => Some(s) == self.server.as_deref(),
        }
    }

    fn usable(&self, account: &Account, now: DateTime<Utc>) -> bool {
        account.enabled
            && self.server_matches(account.server.as_deref())
            && now - account.last_used > self.config.used_cooldown
            && account
                .forced_timeout_at
                .is_none_or(|at| now - at > self.config.forced_cooldown)
            && account.error_counter < self.config.max_errors
            && now - account.created_at > self.config.creation_grace
    }

    /// Find and claim the best usable account.
    ///
    /// Candidates are ordered least-recently-used first, tie-broken by
    /// least-recently-selected, then by fewest repeated-texture flags.
    /// The winning account's `last_used`/`last_selected` are advanced
    /// through an atomic conditional update, so concurrent callers
    /// cannot claim the same account; losers move on to the next
    /// candidate.
    #[instrument(skip(self))]
    pub async fn find_usable(&self) -> Result<Account, SelectorError> {
        let now = Utc::now();
        let mut candidates: Vec<Account> = self
            .accounts
            .list()
            .await?
            .into_iter()
            .filter(|a| self.usable(a, now))
            .collect();

        candidates.sort_by(|a, b| {
            a.last_used
                .cmp(&b.last_used)
                .then(a.last_selected.cmp(&b.last_selected))
                .then(a.same_texture_counter.cmp(&b.same_texture_counter))
        });

        for mut candidate in candidates {
            let claimed = self
                .accounts
                .claim(candidate.id, candidate.last_selected, now)
                .await?;
            if claimed {
                debug!(account_id = candidate.id, "claimed account");
                candidate.last_used = now;
                candidate.last_selected = now;
                return Ok(candidate);
            }
            warn!(account_id = candidate.id, "lost claim race, trying next");
        }

        Err(SelectorError::NoAccountAvailable)
    }

    /// Pool-wide delay between requests, in seconds: the base delay
    /// divided by the number of globally usable accounts, floored when
    /// the pool is empty.
    pub async fn calculate_delay(&self) -> Result<u64, SelectorError> {
        let usable = self.accounts.count_usable(self.config.max_errors).await?;
        let delay = (self.config.base_delay as f64 / usable.max(1) as f64).round() as u64;
        if usable == 0 {
            return Ok(delay.max(EMPTY_POOL_DELAY));
        }
        Ok(delay)
    }

    /// Server identifier currently holding the fewest enabled, healthy
    /// accounts. Used to balance new account assignment. The answer is
    /// cached briefly.
    pub async fn preferred_server(&self) -> Result<Option<String>, SelectorError> {
        let mut cache = self.preferred_cache.lock().await;
        if let Some((at, ref server)) = *cache
            && at.elapsed() < self.config.preferred_server_ttl
        {
            return Ok(server.clone());
        }

        let mut counts: std::collections::HashMap<String, u64> = std::collections::HashMap::new();
        for account in self.accounts.list().await? {
            if !account.enabled || account.error_counter >= self.config.max_errors {
                continue;
            }
            if let Some(server) = account.server {
                *counts.entry(server).or_insert(0) += 1;
            }
        }

        let preferred = counts
            .into_iter()
            .min_by_key(|(server, count)| (*count, server.clone()))
            .map(|(server, _)| server);

        *cache = Some((Instant::now(), preferred.clone()));
        Ok(preferred)
    }
}
