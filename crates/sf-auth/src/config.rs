use std::time::Duration;

/// Official upstream endpoints. Every URL can be overridden through
/// [`AuthConfig`], which the tests use to point at local fakes.
pub mod endpoints {
    pub const LEGACY_AUTHENTICATE: &str = "https://authserver.mojang.com/authenticate";
    pub const LEGACY_REFRESH: &str = "https://authserver.mojang.com/refresh";
    pub const LEGACY_VALIDATE: &str = "https://authserver.mojang.com/validate";
    pub const LEGACY_SIGNOUT: &str = "https://authserver.mojang.com/signout";

    pub const SECURITY_LOCATION: &str = "https://api.mojang.com/user/security/location";
    pub const SECURITY_CHALLENGES: &str = "https://api.mojang.com/user/security/challenges";

    pub const MS_TOKEN: &str = "https://login.live.com/oauth20_token.srf";
    pub const XBL_AUTHENTICATE: &str = "https://user.auth.xboxlive.com/user/authenticate";
    pub const XSTS_AUTHORIZE: &str = "https://xsts.auth.xboxlive.com/xsts/authorize";
    pub const MC_LOGIN: &str = "https://api.minecraftservices.com/authentication/login_with_xbox";
    pub const MC_ENTITLEMENTS: &str = "https://api.minecraftservices.com/entitlements/mcstore";
}

/// Relying party for the XSTS exchange.
pub const RP_MINECRAFT: &str = "rp://api.minecraftservices.com/";

/// OAuth scope for the credential and refresh grants.
pub const OAUTH_SCOPE: &str = "service::user.auth.xboxlive.com::MBI_SSL";

/// Tokens expiring within this window are force-refreshed instead of
/// validated.
pub fn token_refresh_window() -> chrono::Duration {
    chrono::Duration::minutes(30)
}

/// Lifetime assumed for legacy tokens, which carry no expiry on the wire.
pub fn legacy_token_lifetime() -> chrono::Duration {
    chrono::Duration::hours(24)
}

#[derive(Debug, Clone)]
pub struct HttpTimeouts {
    pub connect: Duration,
    pub request: Duration,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(15),
            request: Duration::from_secs(30),
        }
    }
}

/// Configuration for the authentication clients and engine.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub legacy_authenticate_url: String,
    pub legacy_refresh_url: String,
    pub legacy_validate_url: String,
    pub legacy_signout_url: String,
    pub security_location_url: String,
    pub security_challenges_url: String,

    pub ms_token_url: String,
    pub xbl_authenticate_url: String,
    pub xsts_authorize_url: String,
    pub mc_login_url: String,
    pub mc_entitlements_url: String,

    /// OAuth client id used for the credential grant.
    pub client_id: String,

    pub http_timeouts: HttpTimeouts,
    pub user_agent: String,

    /// When false, legacy accounts are rejected as unsupported.
    pub allow_legacy: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            legacy_authenticate_url: endpoints::LEGACY_AUTHENTICATE.into(),
            legacy_refresh_url: endpoints::LEGACY_REFRESH.into(),
            legacy_validate_url: endpoints::LEGACY_VALIDATE.into(),
            legacy_signout_url: endpoints::LEGACY_SIGNOUT.into(),
            security_location_url: endpoints::SECURITY_LOCATION.into(),
            security_challenges_url: endpoints::SECURITY_CHALLENGES.into(),
            ms_token_url: endpoints::MS_TOKEN.into(),
            xbl_authenticate_url: endpoints::XBL_AUTHENTICATE.into(),
            xsts_authorize_url: endpoints::XSTS_AUTHORIZE.into(),
            mc_login_url: endpoints::MC_LOGIN.into(),
            mc_entitlements_url: endpoints::MC_ENTITLEMENTS.into(),
            client_id: "00000000402B5328".into(),
            http_timeouts: HttpTimeouts::default(),
            user_agent: "skinforge".into(),
            allow_legacy: true,
        }
    }
}

impl AuthConfig {
    /// Point every upstream at one base URL. Test helper.
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            legacy_authenticate_url: format!("{base}/authenticate"),
            legacy_refresh_url: format!("{base}/refresh"),
            legacy_validate_url: format!("{base}/validate"),
            legacy_signout_url: format!("{base}/signout"),
            security_location_url: format!("{base}/user/security/location"),
            security_challenges_url: format!("{base}/user/security/challenges"),
            ms_token_url: format!("{base}/oauth20_token.srf"),
            xbl_authenticate_url: format!("{base}/user/authenticate"),
            xsts_authorize_url: format!("{base}/xsts/authorize"),
            mc_login_url: format!("{base}/authentication/login_with_xbox"),
            mc_entitlements_url: format!("{base}/entitlements/mcstore"),
            ..Self::default()
        }
    }
}
