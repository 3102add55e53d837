//! Client for the legacy username/password auth server and its
//! security-question endpoints.
//!
//! Every request goes out through the shared [`RequestThrottle`]: token
//! calls under the auth class, security-question calls under the api
//! class.

use std::sync::Arc;

use reqwest::{Client, Request, Response, StatusCode};
use tracing::{debug, instrument, warn};

use sf_core::SecurityAnswer;
use sf_pool::{RequestThrottle, UpstreamClass};

use crate::config::AuthConfig;
use crate::errors::{AuthError, Result};
use crate::models::*;

/// Tokens returned by a legacy authenticate/refresh call.
#[derive(Debug, Clone)]
pub struct LegacySession {
    pub access_token: String,
    pub client_token: String,
    /// Profile UUID (without dashes), when the server reported one.
    pub profile_id: Option<String>,
}

#[derive(Clone)]
pub struct LegacyAuthClient {
    config: AuthConfig,
    http: Client,
    throttle: Arc<RequestThrottle>,
}

impl LegacyAuthClient {
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

    fn post(&self, url: &str, forwarded_ip: Option<&str>) -> reqwest::RequestBuilder {
        let mut builder = self
            .http
            .post(url)
            .header("Accept", "application/json")
            .timeout(self.config.http_timeouts.request);
        if let Some(ip) = forwarded_ip {
            builder = builder.header("X-Forwarded-For", ip);
        }
        builder
    }

    fn get(&self, url: &str, access_token: &str, forwarded_ip: Option<&str>) -> reqwest::RequestBuilder {
        let mut builder = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .timeout(self.config.http_timeouts.request);
        if let Some(ip) = forwarded_ip {
            builder = builder.header("X-Forwarded-For", ip);
        }
        builder
    }

    async fn submit(&self, class: UpstreamClass, request: Request) -> Result<Response> {
        Ok(self.throttle.submit(class, request).await?)
    }

    #[instrument(skip(self, password))]
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
        client_token: &str,
        forwarded_ip: Option<&str>,
    ) -> Result<LegacySession> {
        let payload = LegacyAuthenticateRequest {
            agent: Agent::default(),
            username: username.to_string(),
            password: password.to_string(),
            client_token: client_token.to_string(),
            request_user: true,
        };

        debug!("authenticating against legacy auth server");
        let request = self
            .post(&self.config.legacy_authenticate_url, forwarded_ip)
            .json(&payload)
            .build()?;
        let response = self.submit(UpstreamClass::Auth, request).await?;

        if !response.status().is_success() {
            return Err(AuthError::from_response(response).await);
        }

        let tokens: LegacyTokenResponse = response.json().await?;
        Ok(LegacySession {
            access_token: tokens.access_token,
            client_token: tokens.client_token,
            profile_id: tokens.selected_profile.map(|p| p.id),
        })
    }

    #[instrument(skip(self, access_token))]
    pub async fn refresh(
        &self,
        access_token: &str,
        client_token: &str,
        forwarded_ip: Option<&str>,
    ) -> Result<LegacySession> {
        let payload = LegacyRefreshRequest {
            access_token: access_token.to_string(),
            client_token: client_token.to_string(),
            request_user: true,
        };

        debug!("refreshing legacy token");
        let request = self
            .post(&self.config.legacy_refresh_url, forwarded_ip)
            .json(&payload)
            .build()?;
        let response = self.submit(UpstreamClass::Auth, request).await?;

        if !response.status().is_success() {
            return Err(AuthError::from_response(response).await);
        }

        let tokens: LegacyTokenResponse = response.json().await?;
        Ok(LegacySession {
            access_token: tokens.access_token,
            client_token: tokens.client_token,
            profile_id: tokens.selected_profile.map(|p| p.id),
        })
    }

    /// Check whether an access token is still valid. 204/200 means
    /// valid; 403 means invalid; anything else is an upstream error.
    #[instrument(skip(self, access_token))]
    pub async fn validate(&self, access_token: &str, client_token: &str) -> Result<bool> {
        let payload = LegacyValidateRequest {
            access_token: access_token.to_string(),
            client_token: client_token.to_string(),
        };

        let request = self
            .post(&self.config.legacy_validate_url, None)
            .json(&payload)
            .build()?;
        let response = self.submit(UpstreamClass::Auth, request).await?;

        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::FORBIDDEN => Ok(false),
            _ => Err(AuthError::from_response(response).await),
        }
    }

    /// Invalidate all tokens for the account. Best effort on cleanup
    /// paths; the caller decides whether failure matters.
    #[instrument(skip(self, password))]
    pub async fn signout(&self, username: &str, password: &str) -> Result<()> {
        let payload = LegacySignoutRequest {
            username: username.to_string(),
            password: password.to_string(),
        };

        let request = self
            .post(&self.config.legacy_signout_url, None)
            .json(&payload)
            .build()?;
        let response = self.submit(UpstreamClass::Auth, request).await?;

        if !response.status().is_success() {
            return Err(AuthError::from_response(response).await);
        }
        Ok(())
    }

    /// Whether the current location is trusted for this token. The
    /// location endpoint answers 204 for trusted and 403 when security
    /// questions must be answered first.
    #[instrument(skip(self, access_token))]
    pub async fn needs_challenges(
        &self,
        access_token: &str,
        forwarded_ip: Option<&str>,
    ) -> Result<bool> {
        let request = self
            .get(&self.config.security_location_url, access_token, forwarded_ip)
            .build()?;
        let response = self.submit(UpstreamClass::Api, request).await?;

        match response.status() {
            s if s.is_success() => Ok(false),
            StatusCode::FORBIDDEN => Ok(true),
            _ => Err(AuthError::from_response(response).await),
        }
    }

    #[instrument(skip(self, access_token))]
    pub async fn get_challenges(&self, access_token: &str) -> Result<Vec<Challenge>> {
        let request = self
            .get(&self.config.security_challenges_url, access_token, None)
            .build()?;
        let response = self.submit(UpstreamClass::Api, request).await?;

        if !response.status().is_success() {
            return Err(AuthError::from_response(response).await);
        }
        Ok(response.json().await?)
    }

    #[instrument(skip(self, access_token, answers))]
    pub async fn submit_answers(
        &self,
        access_token: &str,
        answers: &[ChallengeAnswer],
        forwarded_ip: Option<&str>,
    ) -> Result<()> {
        let request = self
            .post(&self.config.security_location_url, forwarded_ip)
            .bearer_auth(access_token)
            .json(answers)
            .build()?;
        let response = self.submit(UpstreamClass::Api, request).await?;
        if !response.status().is_success() {
            return Err(AuthError::from_response(response).await);
        }
        Ok(())
    }

    /// Run the post-login challenge completion: if the location is not
    /// trusted, fetch the questions and answer them from the account's
    /// stored answers, falling back to the single legacy answer for
    /// question ids without a match.
    #[instrument(skip(self, access_token, stored, fallback))]
    pub async fn complete_challenges(
        &self,
        access_token: &str,
        stored: &[SecurityAnswer],
        fallback: Option<&str>,
        forwarded_ip: Option<&str>,
    ) -> Result<()> {
        if !self.needs_challenges(access_token, forwarded_ip).await? {
            debug!("location already trusted, no challenges needed");
            return Ok(());
        }

        let challenges = self
            .get_challenges(access_token)
            .await
            .map_err(|e| AuthError::ChallengesFailed { source: Box::new(e) })?;

        let answers: Vec<ChallengeAnswer> = challenges
            .iter()
            .map(|challenge| {
                let answer = stored
                    .iter()
                    .find(|a| a.id == challenge.answer.id)
                    .map(|a| a.answer.clone())
                    .or_else(|| fallback.map(str::to_string))
                    .unwrap_or_default();
                ChallengeAnswer {
                    id: challenge.answer.id,
                    answer,
                }
            })
            .collect();

        if answers.iter().any(|a| a.answer.is_empty()) {
            warn!("no stored answer for at least one security question");
        }

        self.submit_answers(access_token, &answers, forwarded_ip)
            .await
            .map_err(|e| AuthError::ChallengesFailed { source: Box::new(e) })
    }
}
