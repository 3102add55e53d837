//! Short-lived cache of session-server texture lookups.
//!
//! The session server rate-limits aggressively and its answers only
//! change when a profile's skin does, so fresh lookups within the TTL
//! are served from memory. Entries for a profile the pipeline has just
//! written to must be invalidated before the read-back.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::texture::SkinData;

struct Entry {
    inserted_at: Instant,
    data: SkinData,
}

pub struct SkinDataCache {
    ttl: Duration,
    entries: RwLock<HashMap<Uuid, Entry>>,
}

impl SkinDataCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, uuid: Uuid) -> Option<SkinData> {
        let entries = self.entries.read().await;
        let entry = entries.get(&uuid)?;
        if entry.inserted_at.elapsed() >= self.ttl {
            return None;
        }
        Some(entry.data.clone())
    }

    pub async fn insert(&self, data: SkinData) {
        let mut entries = self.entries.write().await;
        entries.insert(
            data.uuid,
            Entry {
                inserted_at: Instant::now(),
                data,
            },
        );
    }

    /// Drop a profile's entry so the next lookup goes upstream.
    pub async fn invalidate(&self, uuid: Uuid) {
        self.entries.write().await.remove(&uuid);
    }

    /// Remove entries past their TTL. Expired entries are already never
    /// served; this only reclaims memory.
    pub async fn evict_expired(&self) {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.inserted_at.elapsed() < self.ttl);
        let evicted = before - entries.len();
        if evicted > 0 {
            debug!(evicted, "evicted expired texture cache entries");
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}
