use thiserror::Error;

/// Which upstream credential provider an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Legacy,
    Microsoft,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::Legacy => f.write_str("legacy"),
            Provider::Microsoft => f.write_str("microsoft"),
        }
    }
}

/// Authentication error taxonomy.
///
/// Only refresh failures are retried (as a single login attempt);
/// everything else propagates to the caller.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("account kind is not supported by this deployment")]
    UnsupportedAccountType,

    #[error("account {account_id} has no decryptable stored credentials")]
    MissingCredentials { account_id: i64 },

    #[error("{provider} login failed")]
    AuthFailed {
        provider: Provider,
        #[source]
        source: Box<AuthError>,
    },

    #[error("{provider} token refresh failed")]
    RefreshFailed {
        provider: Provider,
        #[source]
        source: Box<AuthError>,
    },

    #[error("failed to complete security challenges")]
    ChallengesFailed {
        #[source]
        source: Box<AuthError>,
    },

    #[error("account {account_id} does not own the game")]
    DoesNotOwnMinecraft { account_id: i64 },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error(transparent)]
    Throttle(#[from] sf_pool::ThrottleError),

    #[error("upstream returned {status}: {body_snippet}")]
    Http {
        status: reqwest::StatusCode,
        body_snippet: String,
    },

    #[error("invalid upstream response: {0}")]
    InvalidResponse(String),

    #[error("crypto failure: {0}")]
    Crypto(String),

    #[error(transparent)]
    Storage(#[from] sf_core::RepoError),
}

impl AuthError {
    /// Snapshot an unexpected upstream response into an error.
    pub(crate) async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        AuthError::Http {
            status,
            body_snippet: body.chars().take(200).collect(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
