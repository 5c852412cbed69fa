// ABOUTME: PKCE S256 code verifier validation (RFC 7636)
// ABOUTME: Constant-time challenge comparison; any method other than S256 fails closed
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.

//! PKCE verifier
//!
//! Only the S256 transform is accepted. An absent `code_challenge_method`
//! at authorization time defaults to S256; it never means "no PKCE".

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// The only supported code challenge method
pub const METHOD_S256: &str = "S256";

/// Verify a code verifier against a stored challenge
///
/// Computes SHA-256 over the verifier bytes, base64url-encodes the digest
/// without padding, and compares against the stored challenge in constant
/// time. Returns `false` (never errors) on any mismatch, including an
/// unsupported method.
#[must_use]
pub fn verify(stored_challenge: &str, method: &str, verifier: &str) -> bool {
    if method != METHOD_S256 {
        return false;
    }

    let digest = Sha256::digest(verifier.as_bytes());
    let computed = URL_SAFE_NO_PAD.encode(digest);

    computed.as_bytes().ct_eq(stored_challenge.as_bytes()).into()
}

/// Compute the S256 challenge for a verifier (client side of the pair)
#[must_use]
pub fn challenge_s256(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_verifier_is_accepted() {
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        let challenge = challenge_s256(verifier);
        assert!(verify(&challenge, METHOD_S256, verifier));
    }

    #[test]
    fn rfc7636_appendix_b_vector() {
        // Verifier and challenge from RFC 7636 Appendix B
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        assert_eq!(
            challenge_s256(verifier),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn wrong_verifier_is_rejected() {
        let challenge = challenge_s256("correct-verifier-correct-verifier-correct-1");
        assert!(!verify(&challenge, METHOD_S256, "wrong-verifier"));
    }

    #[test]
    fn non_s256_methods_fail_closed() {
        let verifier = "some-verifier-some-verifier-some-verifier-01";
        let challenge = challenge_s256(verifier);
        assert!(!verify(&challenge, "plain", verifier));
        assert!(!verify(&challenge, "", verifier));
        assert!(!verify(verifier, "plain", verifier));
    }
}
