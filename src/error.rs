//! Errors reported by tool calls.

use crate::auth::REMEDIATION;
use crate::monarch::MonarchError;

/// Failure of a single tool call. Never fatal to the server.
#[derive(Debug, thiserror::Error)]
pub(crate) enum ToolError {
    /// The server started in degraded mode.
    #[error("Not authenticated with Monarch Money ({reason}). {}", REMEDIATION)]
    NotAuthenticated {
        /// Why startup authentication failed.
        reason: String,
    },

    /// The API rejected the session token earlier in this process.
    #[error("The Monarch Money session has expired. {}", REMEDIATION)]
    SessionExpired,

    /// A tool argument is missing or malformed.
    #[error("invalid `{field}`: {reason}")]
    InvalidParam {
        /// Argument name.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// The Monarch API call failed.
    #[error("{context}: {source}")]
    Api {
        /// What the tool was doing.
        context: &'static str,
        /// Underlying error, message preserved.
        source: MonarchError,
    },

    /// The worker running the call failed.
    #[error("{0} failed unexpectedly; the server is still running, please retry")]
    Internal(&'static str),
}

impl ToolError {
    /// Shorthand for [`ToolError::InvalidParam`].
    pub(crate) fn invalid<R: Into<String>>(field: &'static str, reason: R) -> Self {
        Self::InvalidParam {
            field,
            reason: reason.into(),
        }
    }

    /// Returns `true` for argument errors, which are rejected before any
    /// API call.
    pub(crate) const fn is_validation(&self) -> bool {
        matches!(*self, Self::InvalidParam { .. })
    }
}
