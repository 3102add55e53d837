use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::options::SkinVisibility;

/// Arm width variant of the skin template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkinModel {
    /// Full-arm template ("steve").
    Classic,
    /// Thin-arm template ("alex").
    Slim,
}

impl SkinModel {
    /// Variant name used by the skin-change endpoint.
    pub fn variant(&self) -> &'static str {
        match self {
            SkinModel::Classic => "classic",
            SkinModel::Slim => "slim",
        }
    }
}

/// Which public operation produced a skin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerateKind {
    Url,
    Upload,
    User,
}

/// One persisted generation outcome, addressed by an obfuscated public id.
///
/// The texture fields (`value`, `signature`, `url`) are immutable once
/// set; only the duplicate and view counters ever change afterwards, and
/// they only increase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Skin {
    /// Public obfuscated id, globally unique.
    pub id: u32,
    /// SHA-1 of the texture image bytes, hex encoded.
    pub hash: String,
    /// Profile UUID the texture was read back from.
    pub uuid: Uuid,

    pub name: String,
    pub model: SkinModel,
    pub visibility: SkinVisibility,

    /// Base64 texture property payload, as served by the session server.
    pub value: String,
    pub signature: String,
    pub url: String,
    pub cape_url: Option<String>,

    pub time: DateTime<Utc>,
    /// Wall-clock generation time in milliseconds.
    pub duration_ms: i64,
    pub account_id: Option<i64>,
    pub server: Option<String>,
    pub kind: GenerateKind,

    pub duplicate: u64,
    pub views: u64,

    pub via: Option<String>,
    pub user_agent: Option<String>,
}

impl Skin {
    /// Public projection served to API callers. Field names are a
    /// compatibility contract and must not change.
    pub fn to_info(&self, next_request: Option<u64>) -> SkinInfo {
        SkinInfo {
            id: self.id,
            name: self.name.clone(),
            model: self.model,
            data: SkinData {
                uuid: self.uuid,
                texture: TextureInfo {
                    value: self.value.clone(),
                    signature: self.signature.clone(),
                    url: self.url.clone(),
                    urls: TextureUrls {
                        skin: self.url.clone(),
                        cape: self.cape_url.clone(),
                    },
                },
            },
            timestamp: self.time.timestamp(),
            duration: self.duration_ms,
            account_id: self.account_id,
            server: self.server.clone(),
            private: self.visibility == SkinVisibility::Private,
            views: self.views,
            next_request,
        }
    }
}

/// Wire projection of a [`Skin`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkinInfo {
    pub id: u32,
    pub name: String,
    pub model: SkinModel,
    pub data: SkinData,
    pub timestamp: i64,
    pub duration: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    pub private: bool,
    pub views: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_request: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkinData {
    pub uuid: Uuid,
    pub texture: TextureInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextureInfo {
    pub value: String,
    pub signature: String,
    pub url: String,
    pub urls: TextureUrls,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextureUrls {
    pub skin: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cape: Option<String>,
}
