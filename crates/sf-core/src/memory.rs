//! In-memory repositories, used by tests and single-process embedding.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::account::Account;
use crate::models::skin::Skin;
use crate::repo::{
    AccountRepository, RepoError, Result, SkinRepository, SkinScope, StatsRepository,
};

#[derive(Debug, Clone, Default)]
pub struct MemoryAccountRepository {
    accounts: Arc<RwLock<HashMap<i64, Account>>>,
}

impl MemoryAccountRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountRepository for MemoryAccountRepository {
    async fn get(&self, id: i64) -> Result<Option<Account>> {
        Ok(self.accounts.read().await.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<Account>> {
        Ok(self.accounts.read().await.values().cloned().collect())
    }

    async fn count_usable(&self, max_errors: u32) -> Result<u64> {
        Ok(self
            .accounts
            .read()
            .await
            .values()
            .filter(|a| a.enabled && a.error_counter < max_errors)
            .count() as u64)
    }

    async fn save(&self, account: &Account) -> Result<()> {
        self.accounts
            .write()
            .await
            .insert(account.id, account.clone());
        Ok(())
    }

    async fn claim(
        &self,
        id: i64,
        expected_last_selected: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut accounts = self.accounts.write().await;
        let account = accounts.get_mut(&id).ok_or(RepoError::NotFound)?;
        if account.last_selected != expected_last_selected {
            return Ok(false);
        }
        account.last_used = now;
        account.last_selected = now;
        Ok(true)
    }
}

fn scope_matches(skin: &Skin, scope: &SkinScope) -> bool {
    skin.name == scope.name && skin.model == scope.model && skin.visibility == scope.visibility
}

#[derive(Debug, Clone, Default)]
pub struct MemorySkinRepository {
    skins: Arc<RwLock<HashMap<u32, Skin>>>,
}

impl MemorySkinRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SkinRepository for MemorySkinRepository {
    async fn get(&self, id: u32) -> Result<Option<Skin>> {
        Ok(self.skins.read().await.get(&id).cloned())
    }

    async fn exists(&self, id: u32) -> Result<bool> {
        Ok(self.skins.read().await.contains_key(&id))
    }

    async fn find_by_hash(&self, hash: &str, scope: &SkinScope) -> Result<Option<Skin>> {
        Ok(self
            .skins
            .read()
            .await
            .values()
            .find(|s| s.hash == hash && scope_matches(s, scope))
            .cloned())
    }

    async fn find_by_uuid(&self, uuid: Uuid, scope: &SkinScope) -> Result<Option<Skin>> {
        Ok(self
            .skins
            .read()
            .await
            .values()
            .find(|s| s.uuid == uuid && scope_matches(s, scope))
            .cloned())
    }

    async fn save(&self, skin: &Skin) -> Result<()> {
        self.skins.write().await.insert(skin.id, skin.clone());
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.skins.read().await.len() as u64)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStatsRepository {
    counters: Arc<RwLock<HashMap<String, u64>>>,
}

impl MemoryStatsRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StatsRepository for MemoryStatsRepository {
    async fn increment(&self, key: &str, by: u64) -> Result<()> {
        *self
            .counters
            .write()
            .await
            .entry(key.to_string())
            .or_insert(0) += by;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<u64> {
        Ok(self.counters.read().await.get(key).copied().unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::account::AccountKind;

    fn account(id: i64) -> Account {
        Account {
            id,
            username: format!("worker{id}@example.com"),
            uuid: Uuid::new_v4(),
            kind: AccountKind::Microsoft,
            password: None,
            access_token: None,
            refresh_token: None,
            token_expires_at: None,
            token_source: None,
            enabled: true,
            last_used: Utc::now(),
            last_selected: Utc::now(),
            server: None,
            previous_server: None,
            forced_timeout_at: None,
            created_at: Utc::now(),
            error_counter: 0,
            success_counter: 0,
            total_success: 0,
            total_errors: 0,
            last_error_code: None,
            same_texture_counter: 0,
            last_texture_url: None,
            security_answers: vec![],
            security_answer: None,
        }
    }

    #[tokio::test]
    async fn claim_is_conditional_on_last_selected() {
        let repo = MemoryAccountRepository::new();
        let a = account(1);
        let selected = a.last_selected;
        repo.save(&a).await.unwrap();

        let now = Utc::now();
        assert!(repo.claim(1, selected, now).await.unwrap());
        // second claim with the stale expectation loses the race
        assert!(!repo.claim(1, selected, Utc::now()).await.unwrap());

        let stored = repo.get(1).await.unwrap().unwrap();
        assert_eq!(stored.last_selected, now);
        assert_eq!(stored.last_used, now);
    }

    #[tokio::test]
    async fn count_usable_respects_threshold_and_enabled() {
        let repo = MemoryAccountRepository::new();
        let mut a = account(1);
        a.error_counter = 9;
        repo.save(&a).await.unwrap();
        let mut b = account(2);
        b.error_counter = 10;
        repo.save(&b).await.unwrap();
        let mut c = account(3);
        c.enabled = false;
        repo.save(&c).await.unwrap();

        assert_eq!(repo.count_usable(10).await.unwrap(), 1);
    }
}
