// credential.rs — The live credential for one account.
//
// A Credential is exclusively owned by the SessionManager; everything else
// sees short-lived TokenSnapshots. Serialize/Deserialize exist solely for
// the Persisted storage mode — in MemoryOnly mode no code path serializes
// a Credential, and the Debug impl below keeps token material out of log
// and panic output in both modes.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Access/refresh token pair plus metadata for one account.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credential {
    /// The account this credential authorizes (e.g., an email address).
    pub account_id: String,
    /// Scopes granted at consent time. Must be a superset of the scopes
    /// required by any operation this credential authorizes.
    pub scopes: BTreeSet<String>,
    /// Bearer token for downstream calls.
    pub access_token: String,
    /// Absolute expiry of the access token.
    pub expires_at: DateTime<Utc>,
    /// Refresh token, if the authorization server issued one.
    pub refresh_token: Option<String>,
}

impl Credential {
    /// Whether the access token expires within `margin` from now (or has
    /// already expired). The session manager refreshes before handing out
    /// a token inside this window.
    pub fn expires_within(&self, margin: Duration) -> bool {
        let margin = chrono::Duration::from_std(margin).unwrap_or(chrono::Duration::MAX);
        match self.expires_at.checked_sub_signed(margin) {
            Some(threshold) => Utc::now() >= threshold,
            // Margin overflows the timestamp range — treat as expiring.
            None => true,
        }
    }
}

// Redacting Debug: token fields must never reach durable sinks, and log
// output is a durable sink.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("account_id", &self.account_id)
            .field("scopes", &self.scopes)
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential(expires_at: DateTime<Utc>) -> Credential {
        Credential {
            account_id: "alice@example.com".to_string(),
            scopes: ["mail.readonly".to_string()].into(),
            access_token: "at-secret-123".to_string(),
            expires_at,
            refresh_token: Some("rt-secret-456".to_string()),
        }
    }

    #[test]
    fn fresh_token_not_within_margin() {
        let credential = credential(Utc::now() + chrono::Duration::hours(1));
        assert!(!credential.expires_within(Duration::from_secs(60)));
    }

    #[test]
    fn token_inside_margin_reports_expiring() {
        let credential = credential(Utc::now() + chrono::Duration::seconds(30));
        assert!(credential.expires_within(Duration::from_secs(60)));
    }

    #[test]
    fn already_expired_token_reports_expiring() {
        let credential = credential(Utc::now() - chrono::Duration::hours(1));
        assert!(credential.expires_within(Duration::from_secs(0)));
    }

    #[test]
    fn debug_output_redacts_tokens() {
        let credential = credential(Utc::now());
        let debug = format!("{:?}", credential);
        assert!(!debug.contains("at-secret-123"));
        assert!(!debug.contains("rt-secret-456"));
        assert!(debug.contains("<redacted>"));
        assert!(debug.contains("alice@example.com"));
    }
}
