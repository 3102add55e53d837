//! Wire DTOs for the legacy auth server and the Xbox token exchange.
//! Field names and casing mirror the upstream payloads exactly.

use serde::{Deserialize, Serialize};

// --- legacy (Yggdrasil-style) auth server ---

#[derive(Debug, Clone, Serialize)]
pub struct Agent {
    pub name: &'static str,
    pub version: u32,
}

impl Default for Agent {
    fn default() -> Self {
        Self {
            name: "Minecraft",
            version: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyAuthenticateRequest {
    pub agent: Agent,
    pub username: String,
    pub password: String,
    pub client_token: String,
    pub request_user: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyRefreshRequest {
    pub access_token: String,
    pub client_token: String,
    pub request_user: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyValidateRequest {
    pub access_token: String,
    pub client_token: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LegacySignoutRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyTokenResponse {
    pub access_token: String,
    pub client_token: String,
    #[serde(default)]
    pub selected_profile: Option<GameProfile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GameProfile {
    /// UUID without dashes.
    pub id: String,
    pub name: String,
}

// --- legacy security challenges ---

#[derive(Debug, Clone, Deserialize)]
pub struct Challenge {
    pub answer: ChallengeAnswerRef,
    pub question: ChallengeQuestion,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChallengeAnswerRef {
    pub id: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChallengeQuestion {
    pub id: u64,
    pub question: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChallengeAnswer {
    pub id: u64,
    pub answer: String,
}

// --- Microsoft OAuth / Xbox exchange ---

#[derive(Debug, Clone, Deserialize)]
pub struct MsTokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: u64,
    pub token_type: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct XblAuthRequest {
    pub properties: XblAuthProperties,
    pub relying_party: String,
    pub token_type: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct XblAuthProperties {
    pub auth_method: String,
    pub site_name: String,
    pub rps_ticket: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct XblAuthResponse {
    pub token: String,
    pub display_claims: XblDisplayClaims,
}

#[derive(Debug, Clone, Deserialize)]
pub struct XblDisplayClaims {
    pub xui: Vec<XblUserInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct XblUserInfo {
    pub uhs: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct XstsAuthRequest {
    pub properties: XstsAuthProperties,
    pub relying_party: String,
    pub token_type: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct XstsAuthProperties {
    pub sandbox_id: String,
    pub user_tokens: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct XstsAuthResponse {
    pub token: String,
    pub display_claims: XblDisplayClaims,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct McLoginRequest {
    pub identity_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct McLoginResponse {
    pub access_token: String,
    pub expires_in: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EntitlementsResponse {
    #[serde(default)]
    pub items: Vec<EntitlementItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EntitlementItem {
    pub name: String,
}
