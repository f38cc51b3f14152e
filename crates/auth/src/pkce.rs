//! PKCE verifier/challenge pairs (RFC 7636, S256).

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::{Digest, Sha256};

const VERIFIER_LEN: usize = 56;

/// Marker appended to the stored verifier when the flow started as a password reset.
pub(crate) const RECOVERY_MARKER: &str = "PASSWORD_RECOVERY";

pub(crate) const CHALLENGE_METHOD: &str = "s256";

pub(crate) fn generate_verifier() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(VERIFIER_LEN)
        .map(char::from)
        .collect()
}

pub(crate) fn challenge_for(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Split a stored verifier into the verifier itself and whether it belongs
/// to a password-recovery flow.
pub(crate) fn split_stored(stored: &str) -> (&str, bool) {
    match stored.split_once('/') {
        Some((verifier, marker)) => (verifier, marker == RECOVERY_MARKER),
        None => (stored, false),
    }
}
