// config.rs — OAuth client and lifecycle configuration.
//
// Client identifier and secret are supplied through the environment, never
// compiled in or read from the repository. `from_env()` is the production
// path; tests and embedders construct AuthConfig directly.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::AuthError;
use crate::store::StorageMode;

/// Configuration for the session manager and OAuth protocol client.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// OAuth client id registered with the authorization server.
    pub client_id: String,
    /// OAuth client secret.
    pub client_secret: String,
    /// Authorization endpoint (consent screen).
    pub authorize_endpoint: String,
    /// Token endpoint (code exchange and refresh).
    pub token_endpoint: String,
    /// Redirect URI registered for this client.
    pub redirect_uri: String,

    /// Credential retention policy. MemoryOnly unless explicitly opted out.
    pub storage_mode: StorageMode,
    /// Directory for persisted credentials (Persisted mode only).
    pub credentials_dir: Option<PathBuf>,

    /// Ceiling on how long a caller suspends waiting for external consent.
    pub authorization_timeout: Duration,
    /// Refresh the access token when it expires within this margin.
    pub refresh_margin: Duration,
    /// Refresh attempts before declaring the credential expired.
    pub refresh_attempts: u32,
    /// Base delay for exponential backoff between refresh attempts.
    pub refresh_backoff: Duration,
}

impl AuthConfig {
    /// Build a config from the process environment.
    ///
    /// Required: `WARDEN_CLIENT_ID`, `WARDEN_CLIENT_SECRET`,
    /// `WARDEN_AUTHORIZE_ENDPOINT`, `WARDEN_TOKEN_ENDPOINT`.
    /// Optional: `WARDEN_REDIRECT_URI`, `WARDEN_PERSIST_CREDENTIALS`
    /// ("1"/"true" switches to Persisted mode), `WARDEN_CREDENTIALS_DIR`.
    pub fn from_env() -> Result<Self, AuthError> {
        let required = |variable: &str| {
            env::var(variable).map_err(|_| AuthError::MissingConfig {
                variable: variable.to_string(),
            })
        };

        let persist = env::var("WARDEN_PERSIST_CREDENTIALS")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let storage_mode = if persist {
            StorageMode::Persisted
        } else {
            StorageMode::MemoryOnly
        };

        Ok(Self {
            client_id: required("WARDEN_CLIENT_ID")?,
            client_secret: required("WARDEN_CLIENT_SECRET")?,
            authorize_endpoint: required("WARDEN_AUTHORIZE_ENDPOINT")?,
            token_endpoint: required("WARDEN_TOKEN_ENDPOINT")?,
            redirect_uri: env::var("WARDEN_REDIRECT_URI")
                .unwrap_or_else(|_| "http://127.0.0.1:8765/callback".to_string()),
            storage_mode,
            credentials_dir: env::var("WARDEN_CREDENTIALS_DIR")
                .map(PathBuf::from)
                .ok()
                .or_else(|| default_credentials_dir(persist)),
            authorization_timeout: Duration::from_secs(300),
            refresh_margin: Duration::from_secs(60),
            refresh_attempts: 3,
            refresh_backoff: Duration::from_millis(250),
        })
    }

    /// A config suitable for tests and embedding against a local fixture
    /// authorization server. MemoryOnly, short timeouts.
    pub fn for_testing() -> Self {
        Self {
            client_id: "test-client".to_string(),
            client_secret: "test-secret".to_string(),
            authorize_endpoint: "https://auth.example.com/authorize".to_string(),
            token_endpoint: "https://auth.example.com/token".to_string(),
            redirect_uri: "http://127.0.0.1:8765/callback".to_string(),
            storage_mode: StorageMode::MemoryOnly,
            credentials_dir: None,
            authorization_timeout: Duration::from_secs(5),
            refresh_margin: Duration::from_secs(60),
            refresh_attempts: 3,
            refresh_backoff: Duration::from_millis(10),
        }
    }
}

fn default_credentials_dir(persist: bool) -> Option<PathBuf> {
    if !persist {
        return None;
    }
    env::var("HOME")
        .ok()
        .map(|home| PathBuf::from(home).join(".warden").join("credentials"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn testing_config_defaults_to_memory_only() {
        let config = AuthConfig::for_testing();
        assert_eq!(config.storage_mode, StorageMode::MemoryOnly);
        assert!(config.credentials_dir.is_none());
    }
}
