//! Authentication lifecycle for pool accounts.
//!
//! Two credential providers are supported: the legacy username/password
//! auth server (with its security-question challenge flow) and the
//! modern OAuth chain (credential or refresh grant, Xbox user token,
//! XSTS identity token, game-services login, entitlement check).
//! [`AuthenticationEngine`] sits on top of both and drives a stored
//! account to a usable access token.

pub mod config;
pub mod crypto;
pub mod engine;
pub mod errors;
pub mod legacy;
pub mod microsoft;
pub mod models;

pub use config::AuthConfig;
pub use crypto::EncryptionKey;
pub use engine::AuthenticationEngine;
pub use errors::{AuthError, Provider, Result};
pub use legacy::{LegacyAuthClient, LegacySession};
pub use microsoft::{MicrosoftAuthClient, ModernSession};
