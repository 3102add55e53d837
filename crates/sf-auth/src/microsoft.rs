//! Client for the modern OAuth login chain: credential (or refresh
//! token) grant, Xbox user token, XSTS identity token, game-services
//! login, entitlement check.
//!
//! Token exchanges go out through the shared [`RequestThrottle`] under
//! the auth class; the entitlement read uses the api class.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, Request, Response, StatusCode};
use tracing::{debug, instrument, warn};

use sf_pool::{RequestThrottle, UpstreamClass};

use crate::config::{AuthConfig, OAUTH_SCOPE, RP_MINECRAFT};
use crate::errors::{AuthError, Result};
use crate::models::*;

/// Outcome of a completed modern login or refresh.
#[derive(Debug, Clone)]
pub struct ModernSession {
    /// Game-services access token used for profile and skin calls.
    pub access_token: String,
    /// OAuth refresh token for the next refresh grant.
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct MicrosoftAuthClient {
    config: AuthConfig,
    http: Client,
    throttle: Arc<RequestThrottle>,
}

impl MicrosoftAuthClient {
    pub fn new(config: AuthConfig, throttle: Arc<RequestThrottle>) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(config.http_timeouts.connect)
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self {
            config,
            http,
            throttle,
        })
    }

    async fn submit(&self, class: UpstreamClass, request: Request) -> Result<Response> {
        Ok(self.throttle.submit(class, request).await?)
    }

    /// Credential grant: exchange stored username/password for OAuth
    /// tokens.
    #[instrument(skip(self, password))]
    pub async fn credential_grant(&self, username: &str, password: &str) -> Result<MsTokenResponse> {
        let form = [
            ("client_id", self.config.client_id.as_str()),
            ("grant_type", "password"),
            ("username", username),
            ("password", password),
            ("scope", OAUTH_SCOPE),
        ];

        debug!("requesting OAuth tokens via credential grant");
        let request = self
            .http
            .post(&self.config.ms_token_url)
            .timeout(self.config.http_timeouts.request)
            .form(&form)
            .build()?;
        let response = self.submit(UpstreamClass::Auth, request).await?;

        if !response.status().is_success() {
            return Err(AuthError::from_response(response).await);
        }
        Ok(response.json().await?)
    }

    #[instrument(skip(self, refresh_token))]
    pub async fn refresh_grant(&self, refresh_token: &str) -> Result<MsTokenResponse> {
        let form = [
            ("client_id", self.config.client_id.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("scope", OAUTH_SCOPE),
        ];

        debug!("requesting OAuth tokens via refresh grant");
        let request = self
            .http
            .post(&self.config.ms_token_url)
            .timeout(self.config.http_timeouts.request)
            .form(&form)
            .build()?;
        let response = self.submit(UpstreamClass::Auth, request).await?;

        if !response.status().is_success() {
            return Err(AuthError::from_response(response).await);
        }
        Ok(response.json().await?)
    }

    #[instrument(skip(self, ms_access_token))]
    pub async fn xbl_authenticate(&self, ms_access_token: &str) -> Result<XblAuthResponse> {
        let payload = XblAuthRequest {
            properties: XblAuthProperties {
                auth_method: "RPS".to_string(),
                site_name: "user.auth.xboxlive.com".to_string(),
                rps_ticket: ms_access_token.to_string(),
            },
            relying_party: "http://auth.xboxlive.com".to_string(),
            token_type: "JWT".to_string(),
        };

        debug!("exchanging OAuth token for Xbox user token");
        let request = self
            .http
            .post(&self.config.xbl_authenticate_url)
            .header("Accept", "application/json")
            .timeout(self.config.http_timeouts.request)
            .json(&payload)
            .build()?;
        let response = self.submit(UpstreamClass::Auth, request).await?;

        // Some ticket formats need a "d=" prefix; retry once.
        if response.status() == StatusCode::BAD_REQUEST {
            warn!("Xbox user token exchange rejected, retrying with 'd=' prefix");
            let retry = XblAuthRequest {
                properties: XblAuthProperties {
                    rps_ticket: format!("d={ms_access_token}"),
                    ..payload.properties
                },
                ..payload
            };
            let request = self
                .http
                .post(&self.config.xbl_authenticate_url)
                .header("Accept", "application/json")
                .timeout(self.config.http_timeouts.request)
                .json(&retry)
                .build()?;
            let response = self.submit(UpstreamClass::Auth, request).await?;
            if !response.status().is_success() {
                return Err(AuthError::from_response(response).await);
            }
            return Ok(response.json().await?);
        }

        if !response.status().is_success() {
            return Err(AuthError::from_response(response).await);
        }
        Ok(response.json().await?)
    }

    #[instrument(skip(self, xbl_token))]
    pub async fn xsts_authorize(&self, xbl_token: &str) -> Result<XstsAuthResponse> {
        let payload = XstsAuthRequest {
            properties: XstsAuthProperties {
                sandbox_id: "RETAIL".to_string(),
                user_tokens: vec![xbl_token.to_string()],
            },
            relying_party: RP_MINECRAFT.to_string(),
            token_type: "JWT".to_string(),
        };

        debug!("exchanging Xbox user token for XSTS identity token");
        let request = self
            .http
            .post(&self.config.xsts_authorize_url)
            .header("Accept", "application/json")
            .timeout(self.config.http_timeouts.request)
            .json(&payload)
            .build()?;
        let response = self.submit(UpstreamClass::Auth, request).await?;

        if !response.status().is_success() {
            return Err(AuthError::from_response(response).await);
        }
        Ok(response.json().await?)
    }

    #[instrument(skip(self, xsts_token, uhs))]
    pub async fn mc_login(&self, xsts_token: &str, uhs: &str) -> Result<McLoginResponse> {
        let payload = McLoginRequest {
            identity_token: format!("XBL3.0 x={uhs};{xsts_token}"),
        };

        debug!("logging in to game services with identity token");
        let request = self
            .http
            .post(&self.config.mc_login_url)
            .header("Accept", "application/json")
            .timeout(self.config.http_timeouts.request)
            .json(&payload)
            .build()?;
        let response = self.submit(UpstreamClass::Auth, request).await?;

        if !response.status().is_success() {
            return Err(AuthError::from_response(response).await);
        }
        Ok(response.json().await?)
    }

    /// Whether the account owns the game. Checked once per login; a
    /// negative result is fatal and never retried.
    #[instrument(skip(self, mc_access_token))]
    pub async fn owns_game(&self, mc_access_token: &str) -> Result<bool> {
        let request = self
            .http
            .get(&self.config.mc_entitlements_url)
            .bearer_auth(mc_access_token)
            .timeout(self.config.http_timeouts.request)
            .build()?;
        let response = self.submit(UpstreamClass::Api, request).await?;

        if !response.status().is_success() {
            return Err(AuthError::from_response(response).await);
        }

        let entitlements: EntitlementsResponse = response.json().await?;
        Ok(entitlements
            .items
            .iter()
            .any(|item| item.name == "product_minecraft" || item.name == "game_minecraft"))
    }

    async fn complete_chain(&self, ms: MsTokenResponse, account_id: i64) -> Result<ModernSession> {
        let xbl = self.xbl_authenticate(&ms.access_token).await?;
        let uhs = xbl
            .display_claims
            .xui
            .first()
            .ok_or_else(|| AuthError::InvalidResponse("missing XUI claims".to_string()))?
            .uhs
            .clone();

        let xsts = self.xsts_authorize(&xbl.token).await?;
        let mc = self.mc_login(&xsts.token, &uhs).await?;

        if !self.owns_game(&mc.access_token).await? {
            return Err(AuthError::DoesNotOwnMinecraft { account_id });
        }

        Ok(ModernSession {
            access_token: mc.access_token,
            refresh_token: ms.refresh_token,
            expires_at: Utc::now() + Duration::seconds(mc.expires_in as i64),
        })
    }

    /// Full five-step login from stored credentials.
    #[instrument(skip(self, password))]
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        account_id: i64,
    ) -> Result<ModernSession> {
        let ms = self.credential_grant(username, password).await?;
        self.complete_chain(ms, account_id).await
    }

    /// Full five-step refresh from a stored refresh token.
    #[instrument(skip(self, refresh_token))]
    pub async fn refresh(&self, refresh_token: &str, account_id: i64) -> Result<ModernSession> {
        let ms = self.refresh_grant(refresh_token).await?;
        self.complete_chain(ms, account_id).await
    }
}
