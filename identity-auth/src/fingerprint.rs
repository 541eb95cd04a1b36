//! Keyed-hash fingerprints used to look sessions up by token without storing
//! the bearer token itself, and random 256-bit tokens for verification and
//! password-reset flows. Grounded in the teacher pack's `jti_hash` pattern
//! (refresh-token hashing ahead of storage) but never panics outside tests.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// `pepper` is a server-side secret (the service reuses its JWT signing
/// secret here) so the stored fingerprint can't be reversed into a usable
/// token even if the session store leaks.
pub fn fingerprint(token: &str, pepper: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(pepper);
    hasher.update(token.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// A 256-bit random token, base64url-encoded, for verification and
/// password-reset links.
pub fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_deterministic_for_same_inputs() {
        let pepper = b"pepper";
        assert_eq!(fingerprint("token", pepper), fingerprint("token", pepper));
    }

    #[test]
    fn fingerprint_differs_by_pepper() {
        assert_ne!(fingerprint("token", b"pepper-a"), fingerprint("token", b"pepper-b"));
    }

    #[test]
    fn random_tokens_are_not_repeated() {
        assert_ne!(random_token(), random_token());
    }
}
