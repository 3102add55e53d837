//! Duplicate detection across the three generation modes.
//!
//! A request is a duplicate when an existing record matches both the
//! texture (by source URL, content hash, or profile UUID) and the
//! request scope (name, model, visibility). Hits reuse the stored
//! record and bump its duplicate counter instead of spending an
//! account.

use std::sync::Arc;

use tracing::{debug, instrument};
use url::Url;
use uuid::Uuid;

use sf_core::repo::{SkinScope, stats_keys};
use sf_core::{Skin, SkinRepository, StatsRepository};

use crate::errors::Result;

pub struct DuplicateDetector {
    skins: Arc<dyn SkinRepository>,
    stats: Arc<dyn StatsRepository>,
    /// Host of our own public skin URLs.
    public_host: String,
    /// Host of upstream texture URLs.
    texture_host: String,
}

fn last_path_segment(url: &Url) -> Option<&str> {
    url.path_segments()?.filter(|s| !s.is_empty()).next_back()
}

impl DuplicateDetector {
    pub fn new(
        skins: Arc<dyn SkinRepository>,
        stats: Arc<dyn StatsRepository>,
        public_host: String,
        texture_host: String,
    ) -> Self {
        Self {
            skins,
            stats,
            public_host,
            texture_host,
        }
    }

    fn scope_matches(skin: &Skin, scope: &SkinScope) -> bool {
        skin.name == scope.name && skin.model == scope.model && skin.visibility == scope.visibility
    }

    /// Pre-download check on the source URL itself. Recognizes our own
    /// public skin URLs (by embedded id) and upstream texture URLs (by
    /// trailing hash); any other URL is not decidable before download.
    #[instrument(skip(self, scope))]
    pub async fn check_url(&self, url: &str, scope: &SkinScope) -> Result<Option<Skin>> {
        let Ok(parsed) = Url::parse(url) else {
            return Ok(None);
        };
        let Some(host) = parsed.host_str() else {
            return Ok(None);
        };

        if host == self.public_host {
            let Some(id) = last_path_segment(&parsed).and_then(|s| s.parse::<u32>().ok()) else {
                return Ok(None);
            };
            if let Some(skin) = self.skins.get(id).await?
                && Self::scope_matches(&skin, scope)
            {
                debug!(id, "matched own public skin url");
                return Ok(Some(skin));
            }
            return Ok(None);
        }

        if host == self.texture_host {
            let Some(hash) = last_path_segment(&parsed) else {
                return Ok(None);
            };
            return self.check_hash(hash, scope).await;
        }

        Ok(None)
    }

    /// Post-validation check on the texture content hash.
    pub async fn check_hash(&self, hash: &str, scope: &SkinScope) -> Result<Option<Skin>> {
        Ok(self.skins.find_by_hash(hash, scope).await?)
    }

    /// User-mode check on the source profile UUID.
    pub async fn check_uuid(&self, uuid: Uuid, scope: &SkinScope) -> Result<Option<Skin>> {
        Ok(self.skins.find_by_uuid(uuid, scope).await?)
    }

    /// Record a duplicate hit: bump the stored counter and the global
    /// stat, then hand back the updated record.
    pub async fn register_hit(&self, mut skin: Skin) -> Result<Skin> {
        skin.duplicate += 1;
        self.skins.save(&skin).await?;
        self.stats
            .increment(stats_keys::GENERATE_DUPLICATE, 1)
            .await?;
        debug!(id = skin.id, duplicate = skin.duplicate, "duplicate hit");
        Ok(skin)
    }
}
