use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::account::Account;
use crate::models::options::SkinVisibility;
use crate::models::skin::{Skin, SkinModel};

/// Storage failures surfaced by any repository implementation.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("storage failure: {message}")]
    Storage { message: String },

    #[error("record not found")]
    NotFound,
}

pub type Result<T> = std::result::Result<T, RepoError>;

/// Scope a skin lookup is restricted to. Two requests only count as
/// duplicates of each other within the same scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkinScope {
    pub name: String,
    pub model: SkinModel,
    pub visibility: SkinVisibility,
}

/// Persistence boundary for worker accounts.
///
/// The selection and scoring logic lives in `sf-pool`; this trait only
/// exposes the primitive find/save/claim operations the document store
/// actually performs.
#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn get(&self, id: i64) -> Result<Option<Account>>;

    /// All accounts, in no particular order.
    async fn list(&self) -> Result<Vec<Account>>;

    /// Enabled accounts with an error counter below `max_errors`.
    async fn count_usable(&self, max_errors: u32) -> Result<u64>;

    async fn save(&self, account: &Account) -> Result<()>;

    /// Atomically claim an account for use: succeeds only if the stored
    /// `last_selected` still equals `expected_last_selected`, in which
    /// case `last_used` and `last_selected` are both set to `now`.
    /// Returns false when another caller won the race.
    async fn claim(
        &self,
        id: i64,
        expected_last_selected: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool>;
}

/// Persistence boundary for generated skins.
#[async_trait]
pub trait SkinRepository: Send + Sync {
    async fn get(&self, id: u32) -> Result<Option<Skin>>;

    async fn exists(&self, id: u32) -> Result<bool>;

    async fn find_by_hash(&self, hash: &str, scope: &SkinScope) -> Result<Option<Skin>>;

    async fn find_by_uuid(&self, uuid: Uuid, scope: &SkinScope) -> Result<Option<Skin>>;

    async fn save(&self, skin: &Skin) -> Result<()>;

    async fn count(&self) -> Result<u64>;
}

/// Simple keyed counter store for generator statistics.
#[async_trait]
pub trait StatsRepository: Send + Sync {
    async fn increment(&self, key: &str, by: u64) -> Result<()>;

    async fn get(&self, key: &str) -> Result<u64>;
}

/// Well-known stat counter keys.
pub mod stats_keys {
    pub const GENERATE_SUCCESS: &str = "generate.success";
    pub const GENERATE_FAILURE: &str = "generate.failure";
    pub const GENERATE_DUPLICATE: &str = "generate.duplicate";
}
