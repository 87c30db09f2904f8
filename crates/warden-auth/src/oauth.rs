// oauth.rs — Authorization-code exchange and refresh against the external
// authorization server.
//
// The protocol client sits behind the AuthorizationServer trait so the
// session state machine can be tested offline against a scripted fake.
// HttpAuthorizationServer is the production implementation; it is the only
// code in this crate that performs network I/O.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::pkce;

/// A successful response from the token endpoint, for both code exchange
/// and refresh.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    /// Absent on refresh when the server keeps the original refresh token.
    pub refresh_token: Option<String>,
    /// Seconds until the access token expires (delta, not absolute).
    pub expires_in: u64,
    /// Space-delimited granted scopes, if the server reports them.
    pub scope: Option<String>,
}

impl TokenGrant {
    /// Scopes actually granted: the server-reported set when present,
    /// otherwise the set that was requested.
    pub fn granted_scopes(&self, requested: &BTreeSet<String>) -> BTreeSet<String> {
        match &self.scope {
            Some(scope) if !scope.trim().is_empty() => scope
                .split_whitespace()
                .map(|s| s.to_string())
                .collect(),
            _ => requested.clone(),
        }
    }
}

/// The delegated-authorization protocol, from the session manager's point
/// of view.
#[async_trait]
pub trait AuthorizationServer: Send + Sync {
    /// Exchange an authorization code (plus PKCE verifier) for tokens.
    async fn exchange_code(
        &self,
        code: &str,
        verifier: &str,
        redirect_uri: &str,
    ) -> Result<TokenGrant, AuthError>;

    /// Obtain a fresh access token from a refresh token.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, AuthError>;
}

/// Production implementation over HTTP.
pub struct HttpAuthorizationServer {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    token_endpoint: String,
}

impl HttpAuthorizationServer {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            token_endpoint: config.token_endpoint.clone(),
        }
    }

    async fn post_form(&self, form: &[(&str, &str)]) -> Result<(u16, String), AuthError> {
        let response = self
            .http
            .post(&self.token_endpoint)
            .form(form)
            .send()
            .await
            .map_err(|e| AuthError::Network {
                detail: format!("token endpoint request failed: {e}"),
            })?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| AuthError::Network {
            detail: format!("reading token endpoint response: {e}"),
        })?;
        Ok((status, body))
    }
}

#[async_trait]
impl AuthorizationServer for HttpAuthorizationServer {
    async fn exchange_code(
        &self,
        code: &str,
        verifier: &str,
        redirect_uri: &str,
    ) -> Result<TokenGrant, AuthError> {
        let (status, body) = self
            .post_form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("code_verifier", verifier),
                ("client_id", &self.client_id),
                ("client_secret", &self.client_secret),
                ("redirect_uri", redirect_uri),
            ])
            .await?;

        if !(200..300).contains(&status) {
            return Err(AuthError::AuthorizationDenied {
                detail: format!("token endpoint returned {status}: {body}"),
            });
        }

        debug!("authorization code exchanged");
        serde_json::from_str(&body).map_err(|e| AuthError::Protocol {
            detail: format!("invalid token response: {e}"),
        })
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, AuthError> {
        let (status, body) = self
            .post_form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", &self.client_id),
                ("client_secret", &self.client_secret),
            ])
            .await?;

        // 400/401/403 from the token endpoint means the refresh token is
        // revoked or invalid — terminal, never retried.
        if matches!(status, 400 | 401 | 403) {
            return Err(AuthError::RefreshRejected {
                detail: format!("token endpoint returned {status}: {body}"),
            });
        }
        if !(200..300).contains(&status) {
            return Err(AuthError::Protocol {
                detail: format!("token refresh returned {status}: {body}"),
            });
        }

        debug!("access token refreshed");
        serde_json::from_str(&body).map_err(|e| AuthError::Protocol {
            detail: format!("invalid refresh response: {e}"),
        })
    }
}

/// Build the authorization URL the user must open to grant consent.
pub fn authorization_url(
    config: &AuthConfig,
    scopes: &BTreeSet<String>,
    state: &str,
    challenge: &str,
) -> String {
    let scope_list = scopes.iter().cloned().collect::<Vec<_>>().join(" ");
    format!(
        "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&code_challenge={}&code_challenge_method=S256&state={}&access_type=offline",
        config.authorize_endpoint,
        urlencoded(&config.client_id),
        urlencoded(&config.redirect_uri),
        urlencoded(&scope_list),
        challenge,
        state,
    )
}

/// Build a complete authorization request (state + verifier + URL) for a
/// scope set. Convenience used by the session manager.
pub(crate) fn new_authorization(
    config: &AuthConfig,
    scopes: &BTreeSet<String>,
) -> (String, String, String) {
    let state = pkce::generate_state();
    let verifier = pkce::generate_verifier();
    let challenge = pkce::compute_challenge(&verifier);
    let url = authorization_url(config, scopes, &state, &challenge);
    (state, verifier, url)
}

/// Minimal URL encoding for query parameter values.
fn urlencoded(s: &str) -> String {
    s.replace('%', "%25")
        .replace(' ', "%20")
        .replace(':', "%3A")
        .replace('/', "%2F")
        .replace('&', "%26")
        .replace('+', "%2B")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scopes(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn token_grant_deserializes() {
        let json = r#"{"access_token":"at-1","refresh_token":"rt-1","expires_in":3600,"scope":"mail.readonly drive.readonly"}"#;
        let grant: TokenGrant = serde_json::from_str(json).unwrap();
        assert_eq!(grant.access_token, "at-1");
        assert_eq!(grant.expires_in, 3600);
        assert_eq!(
            grant.granted_scopes(&BTreeSet::new()),
            scopes(&["mail.readonly", "drive.readonly"])
        );
    }

    #[test]
    fn token_grant_without_scope_falls_back_to_requested() {
        let json = r#"{"access_token":"at-1","expires_in":3600}"#;
        let grant: TokenGrant = serde_json::from_str(json).unwrap();
        assert!(grant.refresh_token.is_none());
        assert_eq!(
            grant.granted_scopes(&scopes(&["drive.readonly"])),
            scopes(&["drive.readonly"])
        );
    }

    #[test]
    fn authorization_url_contains_required_parameters() {
        let config = AuthConfig::for_testing();
        let url = authorization_url(
            &config,
            &scopes(&["mail.readonly", "drive.readonly"]),
            "state-123",
            "challenge-abc",
        );

        assert!(url.starts_with(&config.authorize_endpoint));
        assert!(url.contains("client_id=test-client"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("scope=drive.readonly%20mail.readonly"));
        assert!(url.contains("code_challenge=challenge-abc"));
        assert!(url.contains("code_challenge_method=S256"));
        assert!(url.contains("state=state-123"));
    }

    #[test]
    fn new_authorization_produces_distinct_material() {
        let config = AuthConfig::for_testing();
        let (state_a, verifier_a, url_a) = new_authorization(&config, &scopes(&["drive"]));
        let (state_b, verifier_b, url_b) = new_authorization(&config, &scopes(&["drive"]));
        assert_ne!(state_a, state_b);
        assert_ne!(verifier_a, verifier_b);
        assert_ne!(url_a, url_b);
    }
}
