use std::time::Duration;

use sf_pool::{SelectorConfig, ThrottleConfig};

/// Official upstream endpoints used by the pipeline.
pub mod endpoints {
    pub const SESSION_PROFILE: &str =
        "https://sessionserver.mojang.com/session/minecraft/profile";
    pub const SKIN_CHANGE: &str = "https://api.minecraftservices.com/minecraft/profile/skins";
    pub const TEXTURE_HOST: &str = "textures.minecraft.net";
}

/// Redirect hosts followed when downloading a source image. Anything
/// else terminates the chain.
pub const DEFAULT_ALLOWED_REDIRECT_HOSTS: &[&str] = &[
    "imgur.com",
    "i.imgur.com",
    "bit.ly",
    "tinyurl.com",
    "goo.gl",
];

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Identifier of this node, recorded on generated skins.
    pub server: Option<String>,
    /// Host of our own public skin URLs, recognized by the duplicate
    /// detector.
    pub public_host: String,
    /// Host of upstream texture URLs, recognized by the duplicate
    /// detector.
    pub texture_host: String,

    pub session_profile_url: String,
    pub skin_change_url: String,

    pub allowed_redirect_hosts: Vec<String>,
    pub max_redirects: usize,
    /// Hard cap on downloaded bytes, before image validation applies
    /// its own bounds.
    pub max_download_bytes: usize,

    /// How long fetched profile texture data stays cached.
    pub cache_ttl: Duration,

    pub selector: SelectorConfig,
    pub throttle: ThrottleConfig,

    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            server: None,
            public_host: "skinforge.net".into(),
            texture_host: endpoints::TEXTURE_HOST.into(),
            session_profile_url: endpoints::SESSION_PROFILE.into(),
            skin_change_url: endpoints::SKIN_CHANGE.into(),
            allowed_redirect_hosts: DEFAULT_ALLOWED_REDIRECT_HOSTS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_redirects: 5,
            max_download_bytes: 1024 * 1024,
            cache_ttl: Duration::from_secs(60),
            selector: SelectorConfig::default(),
            throttle: ThrottleConfig::default(),
            connect_timeout: Duration::from_secs(15),
            request_timeout: Duration::from_secs(30),
            user_agent: "skinforge".into(),
        }
    }
}

impl GeneratorConfig {
    /// Point the profile and skin-change upstreams at one base URL.
    /// Test helper.
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            session_profile_url: format!("{base}/session/minecraft/profile"),
            skin_change_url: format!("{base}/minecraft/profile/skins"),
            ..Self::default()
        }
    }
}
