//! End-to-end skin generation.
//!
//! Three public operations, one per source kind: a download URL, an
//! uploaded image, or an existing profile UUID. URL and upload requests
//! spend a pool account to apply the texture through the official
//! skin-change endpoint and read the signed result back from the
//! session server; user requests only read, so they spend no account.
//!
//! Duplicate requests within the same (name, model, visibility) scope
//! are answered from storage and never touch the pool.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use sf_auth::{AuthConfig, AuthError, AuthenticationEngine, EncryptionKey};
use sf_core::repo::{SkinScope, stats_keys};
use sf_core::{
    Account, AccountRepository, ClientInfo, GenerateKind, GenerateOptions, IdAllocator,
    Notifier, ObfuscatedIdCipher, Skin, SkinModel, SkinRepository, StatsRepository,
};
use sf_pool::{AccountSelector, RequestThrottle, UpstreamClass};

use crate::cache::SkinDataCache;
use crate::config::GeneratorConfig;
use crate::download::Downloader;
use crate::duplicate::DuplicateDetector;
use crate::errors::{GenerateError, Result};
use crate::image::{self, ValidatedImage};
use crate::texture::{self, ProfileResponse, SkinData};

pub struct GenerationPipeline {
    config: GeneratorConfig,
    selector: AccountSelector,
    engine: AuthenticationEngine,
    throttle: Arc<RequestThrottle>,
    cache: SkinDataCache,
    detector: DuplicateDetector,
    ids: IdAllocator,
    downloader: Downloader,
    http: Client,
    accounts: Arc<dyn AccountRepository>,
    skins: Arc<dyn SkinRepository>,
    stats: Arc<dyn StatsRepository>,
    notifier: Arc<dyn Notifier>,
    max_errors: u32,
}

impl GenerationPipeline {
    pub fn new(
        config: GeneratorConfig,
        auth: AuthConfig,
        cipher: ObfuscatedIdCipher,
        accounts: Arc<dyn AccountRepository>,
        skins: Arc<dyn SkinRepository>,
        stats: Arc<dyn StatsRepository>,
        notifier: Arc<dyn Notifier>,
        key: EncryptionKey,
    ) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .user_agent(&config.user_agent)
            .build()?;

        let selector = AccountSelector::new(
            accounts.clone(),
            config.selector.clone(),
            config.server.clone(),
        );
        // one throttle instance paces every upstream call, the auth
        // clients' included
        let throttle = Arc::new(RequestThrottle::new(http.clone(), config.throttle.clone()));
        let engine = AuthenticationEngine::new(
            auth,
            throttle.clone(),
            accounts.clone(),
            notifier.clone(),
            key,
            config.server.clone(),
        )?;
        let cache = SkinDataCache::new(config.cache_ttl);
        let detector = DuplicateDetector::new(
            skins.clone(),
            stats.clone(),
            config.public_host.clone(),
            config.texture_host.clone(),
        );
        let ids = IdAllocator::new(cipher, skins.clone());
        let downloader = Downloader::new(
            config.allowed_redirect_hosts.clone(),
            config.max_redirects,
            config.max_download_bytes,
            config.connect_timeout,
            config.request_timeout,
            &config.user_agent,
        )?;
        let max_errors = config.selector.max_errors;

        Ok(Self {
            config,
            selector,
            engine,
            throttle,
            cache,
            detector,
            ids,
            downloader,
            http,
            accounts,
            skins,
            stats,
            notifier,
            max_errors,
        })
    }

    /// Seconds a polite caller should wait before its next request,
    /// derived from current pool capacity.
    pub async fn next_request_delay(&self) -> Result<u64> {
        Ok(self.selector.calculate_delay().await?)
    }

    /// Generate from a remote image URL.
    #[instrument(skip(self, options, client), fields(name = %options.name))]
    pub async fn generate_from_url(
        &self,
        url: &str,
        options: GenerateOptions,
        client: ClientInfo,
    ) -> Result<Skin> {
        let started = Instant::now();

        // the source URL alone can settle the request when the model is
        // already known
        if let Some(model) = options.model.resolved() {
            let scope = scope_for(&options, model);
            if let Some(hit) = self.detector.check_url(url, &scope).await? {
                return self.detector.register_hit(hit).await;
            }
        }

        let bytes = self.downloader.fetch(url).await?;
        let validated = image::validate(&bytes, options.model)?;

        // with the model now classified, the URL strategies apply even
        // when the caller left the model open
        let scope = scope_for(&options, validated.model);
        if options.model.resolved().is_none()
            && let Some(hit) = self.detector.check_url(url, &scope).await?
        {
            return self.detector.register_hit(hit).await;
        }
        if let Some(hit) = self.detector.check_hash(&validated.hash, &scope).await? {
            return self.detector.register_hit(hit).await;
        }

        self.run_counted(
            started,
            GenerateKind::Url,
            &options,
            &client,
            validated,
            SkinSource::Url(url.to_string()),
        )
        .await
    }

    /// Generate from uploaded image bytes.
    #[instrument(skip(self, bytes, options, client), fields(name = %options.name, size = bytes.len()))]
    pub async fn generate_from_upload(
        &self,
        bytes: Vec<u8>,
        options: GenerateOptions,
        client: ClientInfo,
    ) -> Result<Skin> {
        let started = Instant::now();
        let validated = image::validate(&bytes, options.model)?;

        let scope = scope_for(&options, validated.model);
        if let Some(hit) = self.detector.check_hash(&validated.hash, &scope).await? {
            return self.detector.register_hit(hit).await;
        }

        self.run_counted(
            started,
            GenerateKind::Upload,
            &options,
            &client,
            validated,
            SkinSource::Upload(bytes),
        )
        .await
    }

    /// Generate from an existing profile's current skin. Reads the
    /// signed texture straight off the session server; no pool account
    /// is involved.
    #[instrument(skip(self, options, client), fields(name = %options.name))]
    pub async fn generate_from_user(
        &self,
        uuid: Uuid,
        options: GenerateOptions,
        client: ClientInfo,
    ) -> Result<Skin> {
        let started = Instant::now();

        let data = self.fetch_skin_data(uuid, true).await?;
        let model = options.model.resolved().unwrap_or(if data.slim {
            SkinModel::Slim
        } else {
            SkinModel::Classic
        });

        let scope = scope_for(&options, model);
        if let Some(hit) = self.detector.check_uuid(uuid, &scope).await? {
            return self.detector.register_hit(hit).await;
        }

        let result = self
            .persist(
                started,
                GenerateKind::User,
                &options,
                &client,
                model,
                hash_from_texture_url(&data.url),
                None,
                data,
            )
            .await;
        self.count_outcome(&result).await;
        result
    }

    /// Run an account-spending generation and record the global
    /// success/failure stat for its outcome.
    async fn run_counted(
        &self,
        started: Instant,
        kind: GenerateKind,
        options: &GenerateOptions,
        client: &ClientInfo,
        validated: ValidatedImage,
        source: SkinSource,
    ) -> Result<Skin> {
        let result = self
            .generate_with_account(started, kind, options, client, validated, source)
            .await;
        self.count_outcome(&result).await;
        result
    }

    async fn count_outcome(&self, result: &Result<Skin>) {
        let key = if result.is_ok() {
            stats_keys::GENERATE_SUCCESS
        } else {
            stats_keys::GENERATE_FAILURE
        };
        if let Err(e) = self.stats.increment(key, 1).await {
            warn!(error = %e, "failed to record generation stat");
        }
    }

    async fn generate_with_account(
        &self,
        started: Instant,
        kind: GenerateKind,
        options: &GenerateOptions,
        client: &ClientInfo,
        validated: ValidatedImage,
        source: SkinSource,
    ) -> Result<Skin> {
        let mut account = self.selector.find_usable().await?;
        debug!(account_id = account.id, "generating with account");

        let result = self
            .apply_and_read_back(&mut account, client, validated.model, source)
            .await;

        match result {
            Ok(data) => {
                account.record_texture(&data.url);
                account.record_success();
                self.accounts.save(&account).await?;

                self.persist(
                    started,
                    kind,
                    options,
                    client,
                    validated.model,
                    validated.hash,
                    Some(account.id),
                    data,
                )
                .await
            }
            Err(e) => {
                self.record_account_failure(&mut account, &e).await;
                Err(e)
            }
        }
    }

    /// Apply the texture through the skin-change endpoint, then read
    /// the signed result back from the session server.
    async fn apply_and_read_back(
        &self,
        account: &mut Account,
        client: &ClientInfo,
        model: SkinModel,
        source: SkinSource,
    ) -> Result<SkinData> {
        let token = self
            .engine
            .authenticate(account, client.ip.as_deref())
            .await?;

        let builder = self.http.post(&self.config.skin_change_url).bearer_auth(&token);
        let request = match source {
            SkinSource::Url(url) => builder
                .json(&serde_json::json!({
                    "variant": model.variant(),
                    "url": url,
                }))
                .build()?,
            SkinSource::Upload(bytes) => {
                let part = Part::bytes(bytes)
                    .file_name("skin.png")
                    .mime_str("image/png")
                    .map_err(|e| GenerateError::InvalidResponse(e.to_string()))?;
                let form = Form::new().text("variant", model.variant()).part("file", part);
                builder.multipart(form).build()?
            }
        };

        let response = self.throttle.submit(UpstreamClass::SkinChange, request).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerateError::Upstream {
                status,
                body_snippet: body.chars().take(200).collect(),
            });
        }
        debug!(account_id = account.id, "skin change accepted");

        // the cached entry predates the change we just made
        self.cache.invalidate(account.uuid).await;
        self.fetch_skin_data(account.uuid, false).await
    }

    /// Fetch a profile's signed texture data from the session server,
    /// optionally answering from the short-lived cache.
    async fn fetch_skin_data(&self, uuid: Uuid, use_cache: bool) -> Result<SkinData> {
        if use_cache
            && let Some(data) = self.cache.get(uuid).await
        {
            debug!(%uuid, "texture data served from cache");
            return Ok(data);
        }

        let url = format!(
            "{}/{}?unsigned=false",
            self.config.session_profile_url,
            uuid.simple()
        );
        let request = self.http.get(&url).build()?;
        let response = self.throttle.submit(UpstreamClass::Session, request).await?;

        let status = response.status();
        if status == StatusCode::NO_CONTENT || status == StatusCode::NOT_FOUND {
            return Err(GenerateError::MissingTexture);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerateError::Upstream {
                status,
                body_snippet: body.chars().take(200).collect(),
            });
        }

        let profile: ProfileResponse = response.json().await?;
        let data = texture::decode_profile(&profile)?;
        self.cache.insert(data.clone()).await;
        Ok(data)
    }

    /// Allocate a public id and write the finished record.
    #[allow(clippy::too_many_arguments)]
    async fn persist(
        &self,
        started: Instant,
        kind: GenerateKind,
        options: &GenerateOptions,
        client: &ClientInfo,
        model: SkinModel,
        hash: String,
        account_id: Option<i64>,
        data: SkinData,
    ) -> Result<Skin> {
        let id = self.ids.allocate().await?;
        let skin = Skin {
            id,
            hash,
            uuid: data.uuid,
            name: options.name.clone(),
            model,
            visibility: options.visibility,
            value: data.value,
            signature: data.signature,
            url: data.url,
            cape_url: data.cape_url,
            time: Utc::now(),
            duration_ms: started.elapsed().as_millis() as i64,
            account_id,
            server: self.config.server.clone(),
            kind,
            duplicate: 0,
            views: 0,
            via: client.via.clone(),
            user_agent: client.user_agent.clone(),
        };
        self.skins.save(&skin).await?;
        info!(
            id,
            ?kind,
            duration_ms = skin.duration_ms,
            "generated skin"
        );
        Ok(skin)
    }

    /// Update the failing account's health bookkeeping. Authentication
    /// failures force a cooldown; crossing the error threshold disables
    /// the account entirely.
    async fn record_account_failure(&self, account: &mut Account, error: &GenerateError) {
        account.record_failure(error.code());

        if matches!(error, GenerateError::Auth(_)) {
            account.forced_timeout_at = Some(Utc::now());
            account.assign_server(None);
        }
        if let GenerateError::Auth(auth) = error
            && is_fatal_auth(auth)
        {
            account.enabled = false;
        }
        if account.error_counter >= self.max_errors {
            account.enabled = false;
        }

        if !account.enabled {
            self.notifier.account_disabled(account).await;
        }
        if let Err(e) = self.accounts.save(account).await {
            warn!(account_id = account.id, error = %e, "failed to persist account failure");
        }
    }
}

/// Where the texture bytes for an account-spending generation come from.
enum SkinSource {
    Url(String),
    Upload(Vec<u8>),
}

fn scope_for(options: &GenerateOptions, model: SkinModel) -> SkinScope {
    SkinScope {
        name: options.name.clone(),
        model,
        visibility: options.visibility,
    }
}

/// Conditions no retry with the same credentials can fix.
fn is_fatal_auth(error: &AuthError) -> bool {
    matches!(
        error,
        AuthError::DoesNotOwnMinecraft { .. }
            | AuthError::MissingCredentials { .. }
            | AuthError::UnsupportedAccountType
    )
}

/// Upstream texture URLs end in the texture's own content hash.
fn hash_from_texture_url(url: &str) -> String {
    url.rsplit('/').next().unwrap_or(url).to_string()
}
