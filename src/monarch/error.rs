//! Error type for the Monarch Money client.

use std::path::PathBuf;

/// Errors returned by [`MonarchApi`](super::MonarchApi) implementations.
#[derive(Debug, thiserror::Error)]
pub(crate) enum MonarchError {
    /// The HTTP request could not be sent or its body could not be read.
    #[error("request to Monarch Money failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The API rejected the session token (HTTP 401).
    #[error("Monarch Money session is expired or revoked")]
    SessionExpired,

    /// The API is throttling requests (HTTP 429).
    #[error("Monarch Money rate limit exceeded, try again later")]
    RateLimited,

    /// Any other non-success HTTP status.
    #[error("Monarch Money returned HTTP {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body (or a short description when it was empty).
        message: String,
    },

    /// The GraphQL response carried an `errors` array.
    #[error("Monarch Money GraphQL error: {0}")]
    GraphQl(String),

    /// A mutation payload reported errors.
    #[error("Monarch Money rejected the change: {0}")]
    Mutation(String),

    /// The GraphQL response had neither data nor errors.
    #[error("Monarch Money returned no data for {0}")]
    EmptyResponse(&'static str),

    /// Login succeeded partially and needs a one-time code.
    #[error("multi-factor authentication is required; set MONARCH_MFA_SECRET or pass --mfa-code")]
    MfaRequired,

    /// Login was rejected.
    #[error("login failed: {0}")]
    Login(String),

    /// A session file could not be decoded.
    #[error("session file {} is not usable: {reason}", path.display())]
    InvalidSession {
        /// Path of the rejected session file.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },

    /// The token contains bytes that cannot be sent in a header.
    #[error("session token contains invalid characters")]
    InvalidToken,

    /// Filesystem failure while reading or writing a session file.
    #[error("session file I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Session file or response body JSON was malformed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MonarchError {
    /// Returns `true` if the error means the token is no longer accepted.
    pub(crate) const fn is_session_expired(&self) -> bool {
        matches!(*self, Self::SessionExpired)
    }
}
