use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Credential kind an account authenticates with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    /// Legacy username/password account against the Yggdrasil auth server.
    Legacy,
    /// Modern OAuth account going through the Xbox token exchange.
    Microsoft,
}

/// How the currently stored access token was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenSource {
    Login,
    Refresh,
}

/// Stored answer to a legacy security question, matched by question id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityAnswer {
    pub id: u64,
    pub answer: String,
}

/// A credentialed worker account used to apply textures through the
/// official skin-change mechanism.
///
/// Accounts are never hard-deleted; persistent failure flips `enabled`
/// off so the selector skips them while operators investigate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    /// Username or email, depending on credential kind.
    pub username: String,
    /// Profile UUID of the game account.
    pub uuid: Uuid,
    pub kind: AccountKind,

    /// Encrypted password blob (see `sf-auth::crypto`). Absence on a
    /// login attempt is a fatal missing-credentials condition.
    pub password: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub token_source: Option<TokenSource>,

    pub enabled: bool,
    pub last_used: DateTime<Utc>,
    pub last_selected: DateTime<Utc>,
    /// Server identifier this account is currently assigned to.
    pub server: Option<String>,
    pub previous_server: Option<String>,
    /// Set on authentication failure; excludes the account from
    /// selection until the forced cooldown elapses.
    pub forced_timeout_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,

    /// Consecutive errors since the last success.
    pub error_counter: u32,
    pub success_counter: u32,
    pub total_success: u64,
    pub total_errors: u64,
    pub last_error_code: Option<String>,

    /// Times in a row this account produced the same texture URL.
    pub same_texture_counter: u32,
    pub last_texture_url: Option<String>,

    /// Per-question answers for the legacy challenge flow.
    pub security_answers: Vec<SecurityAnswer>,
    /// Single legacy answer used for question ids without a stored match.
    pub security_answer: Option<String>,
}

impl Account {
    /// Record a successful generation: error counter resets, success
    /// counters advance.
    pub fn record_success(&mut self) {
        self.error_counter = 0;
        self.success_counter = self.success_counter.saturating_add(1);
        self.total_success = self.total_success.saturating_add(1);
        self.last_error_code = None;
    }

    /// Record a failed generation attempt.
    pub fn record_failure(&mut self, code: &str) {
        self.error_counter = self.error_counter.saturating_add(1);
        self.total_errors = self.total_errors.saturating_add(1);
        self.last_error_code = Some(code.to_string());
    }

    /// Record the texture URL this account just produced, tracking how
    /// often the same texture repeats back to back.
    pub fn record_texture(&mut self, url: &str) {
        if self.last_texture_url.as_deref() == Some(url) {
            self.same_texture_counter = self.same_texture_counter.saturating_add(1);
        } else {
            self.same_texture_counter = 0;
            self.last_texture_url = Some(url.to_string());
        }
    }

    /// Whether the stored access token expires within `window` from now.
    /// An unknown expiry does not count as expiring; the caller decides
    /// how to treat tokens of unknown freshness.
    pub fn token_expires_within(&self, window: Duration) -> bool {
        self.token_expires_at
            .is_some_and(|at| at - Utc::now() < window)
    }

    pub fn has_token(&self) -> bool {
        self.access_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Move the current server assignment into `previous_server` and
    /// record the new one. Called on every successful login/refresh.
    pub fn assign_server(&mut self, server: Option<String>) {
        self.previous_server = self.server.take();
        self.server = server;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> Account {
        Account {
            id: 1,
            username: "worker@example.com".into(),
            uuid: Uuid::new_v4(),
            kind: AccountKind::Microsoft,
            password: None,
            access_token: None,
            refresh_token: None,
            token_expires_at: None,
            token_source: None,
            enabled: true,
            last_used: Utc::now(),
            last_selected: Utc::now(),
            server: None,
            previous_server: None,
            forced_timeout_at: None,
            created_at: Utc::now(),
            error_counter: 0,
            success_counter: 0,
            total_success: 0,
            total_errors: 0,
            last_error_code: None,
            same_texture_counter: 0,
            last_texture_url: None,
            security_answers: vec![],
            security_answer: None,
        }
    }

    #[test]
    fn success_resets_error_counter() {
        let mut a = account();
        a.record_failure("skin_change_failed");
        a.record_failure("skin_change_failed");
        assert_eq!(a.error_counter, 2);
        assert_eq!(a.total_errors, 2);

        a.record_success();
        assert_eq!(a.error_counter, 0);
        assert_eq!(a.total_success, 1);
        // lifetime totals keep counting
        assert_eq!(a.total_errors, 2);
    }

    #[test]
    fn same_texture_counter_tracks_repeats() {
        let mut a = account();
        a.record_texture("http://textures.example/abc");
        assert_eq!(a.same_texture_counter, 0);
        a.record_texture("http://textures.example/abc");
        assert_eq!(a.same_texture_counter, 1);
        a.record_texture("http://textures.example/def");
        assert_eq!(a.same_texture_counter, 0);
    }

    #[test]
    fn expiry_window_check() {
        let mut a = account();
        assert!(!a.token_expires_within(Duration::minutes(30)));

        a.token_expires_at = Some(Utc::now() + Duration::minutes(10));
        assert!(a.token_expires_within(Duration::minutes(30)));

        a.token_expires_at = Some(Utc::now() + Duration::hours(6));
        assert!(!a.token_expires_within(Duration::minutes(30)));
    }

    #[test]
    fn assign_server_keeps_previous() {
        let mut a = account();
        a.assign_server(Some("node-1".into()));
        a.assign_server(Some("node-2".into()));
        assert_eq!(a.previous_server.as_deref(), Some("node-1"));
        assert_eq!(a.server.as_deref(), Some("node-2"));
    }
}
