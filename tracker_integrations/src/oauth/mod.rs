pub mod google;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};

/// S256 PKCE challenge for `verifier` (RFC 7636 §4.2).
pub fn pkce_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn challenge_is_unpadded_base64url_sha256() {
        let c = pkce_challenge("dBjftJeZ4CVP-mJ0kF3N5bQc5o3T7XBbWJrBqzDZVs8");
        assert_eq!(c, "KkfnMFu1f7H_o1V-Nbl7DSGJb91DpQ2A32fDaANuYCA");
        assert!(!c.contains('='));
    }
}
