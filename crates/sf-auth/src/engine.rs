//! Per-account token lifecycle.
//!
//! One entry point, [`AuthenticationEngine::authenticate`], drives an
//! account from whatever token state it is in to a usable access token:
//!
//! - no token: login
//! - token expiring within 30 minutes: force refresh
//! - token of unknown freshness: validate, then refresh if invalid
//! - any refresh failure: exactly one login attempt
//!
//! Ownership-check and missing-credential failures are fatal and never
//! retried. Every successful login/refresh writes the new token state
//! and the server assignment back to storage before returning.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, instrument, warn};

use sf_core::{Account, AccountKind, AccountRepository, Notifier, TokenSource};
use sf_pool::RequestThrottle;

use crate::config::{AuthConfig, legacy_token_lifetime, token_refresh_window};
use crate::crypto::{self, EncryptionKey};
use crate::errors::{AuthError, Provider, Result};
use crate::legacy::LegacyAuthClient;
use crate::microsoft::MicrosoftAuthClient;

pub struct AuthenticationEngine {
    legacy: LegacyAuthClient,
    microsoft: MicrosoftAuthClient,
    accounts: Arc<dyn AccountRepository>,
    notifier: Arc<dyn Notifier>,
    key: EncryptionKey,
    /// Identifier of this node, recorded as the account's assigned
    /// server on every successful login/refresh.
    server: Option<String>,
    allow_legacy: bool,
}

impl AuthenticationEngine {
    pub fn new(
        config: AuthConfig,
        throttle: Arc<RequestThrottle>,
        accounts: Arc<dyn AccountRepository>,
        notifier: Arc<dyn Notifier>,
        key: EncryptionKey,
        server: Option<String>,
    ) -> Result<Self> {
        let allow_legacy = config.allow_legacy;
        Ok(Self {
            legacy: LegacyAuthClient::new(config.clone(), throttle.clone())?,
            microsoft: MicrosoftAuthClient::new(config, throttle)?,
            accounts,
            notifier,
            key,
            server,
            allow_legacy,
        })
    }

    /// Produce a usable access token for the account, logging in,
    /// refreshing, or validating as the stored token state requires.
    /// Mutates and persists the account on success.
    #[instrument(skip(self, account, forwarded_ip), fields(account_id = account.id))]
    pub async fn authenticate(
        &self,
        account: &mut Account,
        forwarded_ip: Option<&str>,
    ) -> Result<String> {
        if account.kind == AccountKind::Legacy && !self.allow_legacy {
            return Err(AuthError::UnsupportedAccountType);
        }

        if !account.has_token() {
            debug!("no stored token, logging in");
            return self.login(account, forwarded_ip).await;
        }

        if account.token_expires_within(token_refresh_window()) {
            debug!("token expires soon, forcing refresh");
            return self.refresh_or_login(account, forwarded_ip).await;
        }

        if self.validate(account).await? {
            debug!("stored token validated");
            return Ok(account.access_token.clone().unwrap_or_default());
        }

        debug!("stored token invalid, refreshing");
        self.invalidate_stale_session(account).await;
        self.refresh_or_login(account, forwarded_ip).await
    }

    /// Best-effort signout of a legacy session that failed validation,
    /// so the stale token is not left registered server-side. Failure
    /// here never affects the re-authentication that follows.
    async fn invalidate_stale_session(&self, account: &Account) {
        if account.kind != AccountKind::Legacy {
            return;
        }
        let Ok(password) = self.decrypt_password(account) else {
            return;
        };
        if let Err(e) = self.legacy.signout(&account.username, &password).await {
            debug!(error = %e, "signout of stale session failed");
        }
    }

    async fn validate(&self, account: &Account) -> Result<bool> {
        let token = account.access_token.as_deref().unwrap_or_default();
        match account.kind {
            AccountKind::Legacy => {
                self.legacy
                    .validate(token, &client_token_for(account))
                    .await
            }
            // The modern provider has no validate endpoint; a token with
            // a known future expiry is taken at face value.
            AccountKind::Microsoft => Ok(account
                .token_expires_at
                .is_some_and(|at| at > Utc::now())),
        }
    }

    async fn refresh_or_login(
        &self,
        account: &mut Account,
        forwarded_ip: Option<&str>,
    ) -> Result<String> {
        match self.refresh(account, forwarded_ip).await {
            Ok(token) => Ok(token),
            // Ownership failures are fatal even when surfaced by a
            // refresh; they would fail the login the same way.
            Err(e @ AuthError::DoesNotOwnMinecraft { .. }) => Err(e),
            Err(e @ AuthError::ChallengesFailed { .. }) => Err(e),
            Err(e) => {
                warn!(error = %e, "refresh failed, falling back to login");
                self.login(account, forwarded_ip).await
            }
        }
    }

    async fn login(&self, account: &mut Account, forwarded_ip: Option<&str>) -> Result<String> {
        let password = match self.decrypt_password(account) {
            Ok(p) => p,
            Err(e) => {
                self.notifier.auth_failed(account, "missing credentials").await;
                return Err(e);
            }
        };

        let result = match account.kind {
            AccountKind::Legacy => self.legacy_login(account, &password, forwarded_ip).await,
            AccountKind::Microsoft => self.microsoft_login(account, &password).await,
        };

        match result {
            Ok(token) => {
                account.assign_server(self.server.clone());
                self.accounts.save(account).await?;
                Ok(token)
            }
            Err(e) => {
                self.notifier.auth_failed(account, "login failed").await;
                Err(e)
            }
        }
    }

    async fn legacy_login(
        &self,
        account: &mut Account,
        password: &str,
        forwarded_ip: Option<&str>,
    ) -> Result<String> {
        let session = self
            .legacy
            .authenticate(
                &account.username,
                password,
                &client_token_for(account),
                forwarded_ip,
            )
            .await
            .map_err(|e| AuthError::AuthFailed {
                provider: Provider::Legacy,
                source: Box::new(e),
            })?;

        self.legacy
            .complete_challenges(
                &session.access_token,
                &account.security_answers,
                account.security_answer.as_deref(),
                forwarded_ip,
            )
            .await?;

        account.access_token = Some(session.access_token.clone());
        account.token_expires_at = Some(Utc::now() + legacy_token_lifetime());
        account.token_source = Some(TokenSource::Login);
        Ok(session.access_token)
    }

    async fn microsoft_login(&self, account: &mut Account, password: &str) -> Result<String> {
        let session = self
            .microsoft
            .login(&account.username, password, account.id)
            .await
            .map_err(|e| match e {
                fatal @ AuthError::DoesNotOwnMinecraft { .. } => fatal,
                other => AuthError::AuthFailed {
                    provider: Provider::Microsoft,
                    source: Box::new(other),
                },
            })?;

        account.access_token = Some(session.access_token.clone());
        account.refresh_token = session.refresh_token;
        account.token_expires_at = Some(session.expires_at);
        account.token_source = Some(TokenSource::Login);
        Ok(session.access_token)
    }

    async fn refresh(&self, account: &mut Account, forwarded_ip: Option<&str>) -> Result<String> {
        let token = match account.kind {
            AccountKind::Legacy => {
                let current = account.access_token.clone().unwrap_or_default();
                let session = self
                    .legacy
                    .refresh(&current, &client_token_for(account), forwarded_ip)
                    .await
                    .map_err(|e| AuthError::RefreshFailed {
                        provider: Provider::Legacy,
                        source: Box::new(e),
                    })?;

                self.legacy
                    .complete_challenges(
                        &session.access_token,
                        &account.security_answers,
                        account.security_answer.as_deref(),
                        forwarded_ip,
                    )
                    .await?;

                account.access_token = Some(session.access_token.clone());
                account.token_expires_at = Some(Utc::now() + legacy_token_lifetime());
                session.access_token
            }
            AccountKind::Microsoft => {
                let refresh_token =
                    account
                        .refresh_token
                        .clone()
                        .ok_or_else(|| AuthError::RefreshFailed {
                            provider: Provider::Microsoft,
                            source: Box::new(AuthError::InvalidResponse(
                                "no refresh token stored".to_string(),
                            )),
                        })?;

                let session = self
                    .microsoft
                    .refresh(&refresh_token, account.id)
                    .await
                    .map_err(|e| match e {
                        fatal @ AuthError::DoesNotOwnMinecraft { .. } => fatal,
                        other => AuthError::RefreshFailed {
                            provider: Provider::Microsoft,
                            source: Box::new(other),
                        },
                    })?;

                account.access_token = Some(session.access_token.clone());
                account.refresh_token = session.refresh_token;
                account.token_expires_at = Some(session.expires_at);
                session.access_token
            }
        };

        account.token_source = Some(TokenSource::Refresh);
        account.assign_server(self.server.clone());
        self.accounts.save(account).await?;
        Ok(token)
    }

    fn decrypt_password(&self, account: &Account) -> Result<String> {
        let blob = account
            .password
            .as_deref()
            .ok_or(AuthError::MissingCredentials {
                account_id: account.id,
            })?;
        crypto::decrypt_password(&self.key, blob, &account.username).map_err(|_| {
            AuthError::MissingCredentials {
                account_id: account.id,
            }
        })
    }
}

/// Stable per-account client token, derived from the profile UUID.
fn client_token_for(account: &Account) -> String {
    account.uuid.simple().to_string()
}
