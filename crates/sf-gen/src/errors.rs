use thiserror::Error;

use crate::image::ImageError;
use sf_auth::AuthError;
use sf_core::{IdError, RepoError};
use sf_pool::{SelectorError, ThrottleError};

/// Coarse category a generation error belongs to, used by the routing
/// layer to pick a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Caller mistake, not retryable as-is.
    Validation,
    /// Pool exhaustion, retryable later.
    Exhaustion,
    /// Credential lifecycle failure.
    Authentication,
    /// Upstream service misbehaved.
    Upstream,
    /// Anything else.
    Internal,
}

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("invalid source url: {reason}")]
    InvalidUrl { reason: String },

    #[error("download failed with status {status}")]
    DownloadFailed { status: reqwest::StatusCode },

    #[error("invalid image: {0}")]
    InvalidImage(#[from] ImageError),

    #[error("no usable account available")]
    NoAccountAvailable,

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Throttle(#[from] ThrottleError),

    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error(transparent)]
    Id(#[from] IdError),

    #[error("upstream returned {status}: {body_snippet}")]
    Upstream {
        status: reqwest::StatusCode,
        body_snippet: String,
    },

    #[error("profile has no skin texture")]
    MissingTexture,

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("invalid upstream response: {0}")]
    InvalidResponse(String),
}

impl From<SelectorError> for GenerateError {
    fn from(e: SelectorError) -> Self {
        match e {
            SelectorError::NoAccountAvailable => GenerateError::NoAccountAvailable,
            SelectorError::Repo(e) => GenerateError::Repo(e),
        }
    }
}

impl GenerateError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            GenerateError::InvalidUrl { .. }
            | GenerateError::DownloadFailed { .. }
            | GenerateError::InvalidImage(_) => ErrorCategory::Validation,
            GenerateError::NoAccountAvailable => ErrorCategory::Exhaustion,
            GenerateError::Auth(_) => ErrorCategory::Authentication,
            GenerateError::Throttle(_)
            | GenerateError::Upstream { .. }
            | GenerateError::MissingTexture
            | GenerateError::Network(_)
            | GenerateError::InvalidResponse(_) => ErrorCategory::Upstream,
            GenerateError::Repo(_) | GenerateError::Id(_) => ErrorCategory::Internal,
        }
    }

    /// Short stable code recorded on the failing account.
    pub fn code(&self) -> &'static str {
        match self {
            GenerateError::InvalidUrl { .. } => "invalid_url",
            GenerateError::DownloadFailed { .. } => "download_failed",
            GenerateError::InvalidImage(_) => "invalid_image",
            GenerateError::NoAccountAvailable => "no_account",
            GenerateError::Auth(_) => "auth_failed",
            GenerateError::Throttle(_) => "throttled",
            GenerateError::Repo(_) => "storage",
            GenerateError::Id(_) => "id_allocation",
            GenerateError::Upstream { .. } => "upstream",
            GenerateError::MissingTexture => "missing_texture",
            GenerateError::Network(_) => "network",
            GenerateError::InvalidResponse(_) => "invalid_response",
        }
    }
}

pub type Result<T> = std::result::Result<T, GenerateError>;
