//! Runtime configuration read from the process environment.

use std::path::PathBuf;

/// Overrides the session file location.
pub(crate) const SESSION_FILE_VAR: &str = "MONARCH_SESSION_FILE";
/// Directory searched for project-local session files.
pub(crate) const PROJECT_ROOT_VAR: &str = "MONARCH_PROJECT_ROOT";
/// Login email.
pub(crate) const EMAIL_VAR: &str = "MONARCH_EMAIL";
/// Login password.
pub(crate) const PASSWORD_VAR: &str = "MONARCH_PASSWORD";
/// Base32 TOTP secret for headless MFA.
pub(crate) const MFA_SECRET_VAR: &str = "MONARCH_MFA_SECRET";
/// Worker pool size.
pub(crate) const MAX_CONCURRENCY_VAR: &str = "MONARCH_MAX_CONCURRENCY";

/// Worker pool size when [`MAX_CONCURRENCY_VAR`] is unset.
const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Errors building a [`Config`].
#[derive(Debug, thiserror::Error)]
pub(crate) enum ConfigError {
    /// The working directory could not be determined.
    #[error("cannot determine the current directory: {0}")]
    CurrentDir(#[source] std::io::Error),

    /// A variable holds a value of the wrong shape.
    #[error("{name} must be {expected}, got '{value}'")]
    InvalidValue {
        /// Variable name.
        name: &'static str,
        /// What was expected.
        expected: &'static str,
        /// The rejected value.
        value: String,
    },
}

/// Email/password pair used when no session file is usable.
#[derive(Clone, PartialEq, Eq)]
pub(crate) struct Credentials {
    /// Account email.
    pub(crate) email: String,
    /// Account password.
    pub(crate) password: String,
    /// TOTP secret, if the account has MFA enabled.
    pub(crate) mfa_secret: Option<String>,
}

impl core::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("has_mfa_secret", &self.mfa_secret.is_some())
            .finish_non_exhaustive()
    }
}

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Config {
    /// Explicit session file path (highest priority).
    pub(crate) session_file: Option<PathBuf>,
    /// Project root searched for session files.
    pub(crate) project_root: PathBuf,
    /// User home directory, if known.
    pub(crate) home_dir: Option<PathBuf>,
    /// Fallback credentials.
    pub(crate) credentials: Option<Credentials>,
    /// Maximum number of concurrent API calls.
    pub(crate) max_concurrency: usize,
}

impl Config {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the current directory is unavailable or a
    /// variable has an invalid value.
    pub(crate) fn from_env() -> Result<Self, ConfigError> {
        let cwd = std::env::current_dir().map_err(ConfigError::CurrentDir)?;
        Self::from_lookup(|name| std::env::var(name).ok(), cwd, dirs::home_dir())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    ///
    /// Variables set to an empty (or whitespace-only) string count as unset.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable has an invalid value.
    pub(crate) fn from_lookup<F>(
        lookup: F,
        cwd: PathBuf,
        home_dir: Option<PathBuf>,
    ) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };
        // Passwords may legitimately start or end with spaces.
        let password = lookup(PASSWORD_VAR).filter(|value| !value.trim().is_empty());

        let credentials = match (var(EMAIL_VAR), password) {
            (Some(email), Some(password)) => Some(Credentials {
                email,
                password,
                mfa_secret: var(MFA_SECRET_VAR),
            }),
            (Some(_), None) | (None, Some(_)) | (None, None) => None,
        };

        let max_concurrency = match var(MAX_CONCURRENCY_VAR) {
            Some(raw) => raw
                .parse::<usize>()
                .ok()
                .filter(|size| *size > 0)
                .ok_or(ConfigError::InvalidValue {
                    name: MAX_CONCURRENCY_VAR,
                    expected: "a positive integer",
                    value: raw,
                })?,
            None => DEFAULT_MAX_CONCURRENCY,
        };

        Ok(Self {
            session_file: var(SESSION_FILE_VAR).map(PathBuf::from),
            project_root: var(PROJECT_ROOT_VAR).map_or(cwd, PathBuf::from),
            home_dir,
            credentials,
            max_concurrency,
        })
    }

    /// Email from the environment, for status reporting.
    pub(crate) fn email(&self) -> Option<&str> {
        self.credentials
            .as_ref()
            .map(|credentials| credentials.email.as_str())
    }
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::missing_docs_in_private_items,
    clippy::use_debug,
    reason = "test code uses expect and inspects Debug output"
)]
mod tests {
    use std::collections::HashMap;
    use std::path::PathBuf;

    use super::{Config, ConfigError};

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|&(name, value)| (name.to_owned(), value.to_owned()))
            .collect();
        Config::from_lookup(
            |name| vars.get(name).cloned(),
            PathBuf::from("/work"),
            Some(PathBuf::from("/home/user")),
        )
    }

    #[test]
    fn defaults_without_variables() {
        let config = config_from(&[]).expect("empty env is valid");
        assert!(config.session_file.is_none());
        assert_eq!(config.project_root, PathBuf::from("/work"));
        assert!(config.credentials.is_none());
        assert_eq!(config.max_concurrency, 4);
    }

    #[test]
    fn credentials_need_both_halves() {
        let config = config_from(&[("MONARCH_EMAIL", "me@example.com")]).expect("valid");
        assert!(config.credentials.is_none());

        let config = config_from(&[
            ("MONARCH_EMAIL", "me@example.com"),
            ("MONARCH_PASSWORD", "hunter2"),
            ("MONARCH_MFA_SECRET", "JBSWY3DPEHPK3PXP"),
        ])
        .expect("valid");
        let credentials = config.credentials.expect("credentials present");
        assert_eq!(credentials.email, "me@example.com");
        assert_eq!(credentials.mfa_secret.as_deref(), Some("JBSWY3DPEHPK3PXP"));
    }

    #[test]
    fn blank_values_count_as_unset() {
        let config = config_from(&[
            ("MONARCH_SESSION_FILE", "  "),
            ("MONARCH_EMAIL", "me@example.com"),
            ("MONARCH_PASSWORD", ""),
        ])
        .expect("valid");
        assert!(config.session_file.is_none());
        assert!(config.credentials.is_none());
    }

    #[test]
    fn password_is_passed_through_untrimmed() {
        let config = config_from(&[
            ("MONARCH_EMAIL", " me@example.com "),
            ("MONARCH_PASSWORD", " pass phrase "),
        ])
        .expect("valid");
        let credentials = config.credentials.expect("credentials present");
        assert_eq!(credentials.email, "me@example.com");
        assert_eq!(credentials.password, " pass phrase ");
    }

    #[test]
    fn project_root_and_session_override() {
        let config = config_from(&[
            ("MONARCH_PROJECT_ROOT", "/srv/monarch"),
            ("MONARCH_SESSION_FILE", "/tmp/session.bin"),
        ])
        .expect("valid");
        assert_eq!(config.project_root, PathBuf::from("/srv/monarch"));
        assert_eq!(config.session_file, Some(PathBuf::from("/tmp/session.bin")));
    }

    #[test]
    fn invalid_concurrency_is_rejected() {
        let err = config_from(&[("MONARCH_MAX_CONCURRENCY", "0")]).expect_err("zero is invalid");
        assert!(err.to_string().contains("MONARCH_MAX_CONCURRENCY"));
        let config = config_from(&[("MONARCH_MAX_CONCURRENCY", "8")]).expect("valid");
        assert_eq!(config.max_concurrency, 8);
    }

    #[test]
    fn debug_hides_password() {
        let config = config_from(&[
            ("MONARCH_EMAIL", "me@example.com"),
            ("MONARCH_PASSWORD", "hunter2"),
        ])
        .expect("valid");
        let rendered = format!("{:?}", config.credentials);
        assert!(!rendered.contains("hunter2"));
    }
}
