//! Session-server profile payload decoding.
//!
//! The profile endpoint returns a property list whose `textures` entry
//! is a base64-encoded JSON document describing the SKIN and CAPE
//! textures. The raw value/signature pair is preserved verbatim; it is
//! part of the public contract.

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::Deserialize;
use uuid::Uuid;

use crate::errors::{GenerateError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileResponse {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub properties: Vec<ProfileProperty>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileProperty {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub signature: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct TexturePayload {
    #[serde(default)]
    textures: std::collections::HashMap<String, TextureEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct TextureEntry {
    url: String,
    #[serde(default)]
    metadata: Option<TextureMetadata>,
}

#[derive(Debug, Clone, Deserialize)]
struct TextureMetadata {
    #[serde(default)]
    model: Option<String>,
}

/// Decoded texture data for one profile.
#[derive(Debug, Clone)]
pub struct SkinData {
    pub uuid: Uuid,
    pub value: String,
    pub signature: String,
    pub url: String,
    pub cape_url: Option<String>,
    /// True when the skin's metadata marks it as slim-armed.
    pub slim: bool,
}

/// Decode a profile response into [`SkinData`], verifying a SKIN
/// texture is present.
pub fn decode_profile(profile: &ProfileResponse) -> Result<SkinData> {
    let uuid = Uuid::parse_str(&profile.id)
        .map_err(|e| GenerateError::InvalidResponse(format!("bad profile id: {e}")))?;

    let property = profile
        .properties
        .iter()
        .find(|p| p.name == "textures")
        .ok_or(GenerateError::MissingTexture)?;

    let decoded = STANDARD
        .decode(&property.value)
        .map_err(|e| GenerateError::InvalidResponse(format!("bad texture payload: {e}")))?;
    let payload: TexturePayload = serde_json::from_slice(&decoded)
        .map_err(|e| GenerateError::InvalidResponse(format!("bad texture payload: {e}")))?;

    let skin = payload
        .textures
        .get("SKIN")
        .ok_or(GenerateError::MissingTexture)?;
    let slim = skin
        .metadata
        .as_ref()
        .and_then(|m| m.model.as_deref())
        .is_some_and(|m| m == "slim");

    Ok(SkinData {
        uuid,
        value: property.value.clone(),
        signature: property.signature.clone().ok_or_else(|| {
            GenerateError::InvalidResponse("profile property is unsigned".into())
        })?,
        url: skin.url.clone(),
        cape_url: payload.textures.get("CAPE").map(|c| c.url.clone()),
        slim,
    })
}

/// Build the base64 `textures` payload for a profile. Test helper used
/// across the workspace's integration tests.
pub fn encode_payload(skin_url: &str, cape_url: Option<&str>, slim: bool) -> String {
    let mut textures = serde_json::Map::new();
    let mut skin = serde_json::Map::new();
    skin.insert("url".into(), skin_url.into());
    if slim {
        skin.insert(
            "metadata".into(),
            serde_json::json!({ "model": "slim" }),
        );
    }
    textures.insert("SKIN".into(), skin.into());
    if let Some(cape) = cape_url {
        textures.insert("CAPE".into(), serde_json::json!({ "url": cape }));
    }
    let document = serde_json::json!({ "textures": textures });
    STANDARD.encode(document.to_string())
}
