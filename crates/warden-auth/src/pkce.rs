// pkce.rs — PKCE (RFC 7636) material for the authorization-code flow.
//
// The verifier stays inside the session manager; the S256 challenge goes
// into the authorization URL. The authorization server verifies at exchange
// time that both came from the same party, so an intercepted authorization
// code is useless on its own.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Generate a cryptographically random code verifier.
///
/// 64 random bytes encoded as URL-safe base64 without padding — 86
/// characters, inside RFC 7636's 43–128 range.
pub fn generate_verifier() -> String {
    let mut bytes = [0u8; 64];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Compute the S256 code challenge: `BASE64URL(SHA256(verifier))`.
pub fn compute_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Generate an opaque `state` token for CSRF protection on the callback.
pub fn generate_state() -> String {
    Uuid::new_v4().simple().to_string()
}
