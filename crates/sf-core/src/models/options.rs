use serde::{Deserialize, Serialize};

use crate::models::skin::SkinModel;

/// Model requested by the caller. `Unknown` asks the pipeline to
/// classify the image by inspecting the slim-arm region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelChoice {
    #[default]
    Unknown,
    Classic,
    Slim,
}

impl ModelChoice {
    pub fn resolved(self) -> Option<SkinModel> {
        match self {
            ModelChoice::Unknown => None,
            ModelChoice::Classic => Some(SkinModel::Classic),
            ModelChoice::Slim => Some(SkinModel::Slim),
        }
    }
}

/// Visibility of a generated skin. Serialized as 0/1 for compatibility
/// with the public API contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum SkinVisibility {
    #[default]
    Public,
    Private,
}

impl From<SkinVisibility> for u8 {
    fn from(v: SkinVisibility) -> u8 {
        match v {
            SkinVisibility::Public => 0,
            SkinVisibility::Private => 1,
        }
    }
}

impl TryFrom<u8> for SkinVisibility {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(SkinVisibility::Public),
            1 => Ok(SkinVisibility::Private),
            other => Err(format!("invalid visibility value: {other}")),
        }
    }
}

/// Caller-supplied options for one generation request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerateOptions {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub model: ModelChoice,
    #[serde(default)]
    pub visibility: SkinVisibility,
}

/// Where a request came from, recorded on the generated record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientInfo {
    pub via: Option<String>,
    pub user_agent: Option<String>,
    /// Caller's address, forwarded to upstream auth calls.
    pub ip: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visibility_roundtrips_as_number() {
        let json = serde_json::to_string(&SkinVisibility::Private).unwrap();
        assert_eq!(json, "1");
        let back: SkinVisibility = serde_json::from_str(&json).unwrap();
        assert_eq!(back, SkinVisibility::Private);
    }

    #[test]
    fn unknown_model_resolves_to_none() {
        assert_eq!(ModelChoice::Unknown.resolved(), None);
        assert_eq!(ModelChoice::Slim.resolved(), Some(SkinModel::Slim));
    }
}
