// ABOUTME: RSA signing key material for RS256 ID tokens and JWK public key publication
// ABOUTME: Loads one static key pair at startup; exposes the public half in JWKS form
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.

//! Signing key material
//!
//! The provider uses a single static RSA key pair for the whole process
//! lifetime. The private key signs ID tokens (RS256); the public key is
//! published through the JWKS endpoint so relying parties can verify
//! tokens offline. There is no rotation: one key, one `kid`.

use crate::errors::{AppError, AppResult};
use jsonwebtoken::{DecodingKey, EncodingKey};
use ring::rand::{SecureRandom, SystemRandom};
use rsa::{
    pkcs1::DecodeRsaPrivateKey,
    pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey},
    RsaPrivateKey, RsaPublicKey,
};
use serde::{Deserialize, Serialize};

/// RSA key size in bits for generated development keys
const RSA_KEY_SIZE: usize = 2048;

/// JWK (JSON Web Key) representation for the JWKS endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonWebKey {
    /// Key type (always "RSA" for RS256)
    pub kty: String,
    /// Public key use (always "sig" for signature)
    #[serde(rename = "use")]
    pub key_use: String,
    /// Key ID
    pub kid: String,
    /// Algorithm (RS256)
    pub alg: String,
    /// RSA modulus (base64url encoded, unpadded)
    pub n: String,
    /// RSA public exponent (base64url encoded, unpadded)
    pub e: String,
}

/// JWKS (JSON Web Key Set) container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonWebKeySet {
    /// Array of public keys
    pub keys: Vec<JsonWebKey>,
}

/// The process-wide RSA signing key pair
#[derive(Clone)]
pub struct SigningKey {
    kid: String,
    private_key: RsaPrivateKey,
    public_key: RsaPublicKey,
}

impl SigningKey {
    /// Import the private key from PEM (PKCS#8 or PKCS#1)
    ///
    /// # Errors
    /// Returns `KeyMaterial` if the PEM cannot be parsed as an RSA private key.
    /// This is a fatal startup condition, never silently defaulted.
    pub fn from_pem(kid: &str, pem: &str) -> AppResult<Self> {
        let private_key = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map_err(|e| AppError::key_material(format!("failed to parse private key PEM: {e}")))?;

        let public_key = RsaPublicKey::from(&private_key);

        Ok(Self {
            kid: kid.to_owned(),
            private_key,
            public_key,
        })
    }

    /// Generate an ephemeral key pair (development and tests)
    ///
    /// # Errors
    /// Returns `KeyMaterial` if key generation fails
    pub fn generate(kid: &str) -> AppResult<Self> {
        Self::generate_with_key_size(kid, RSA_KEY_SIZE)
    }

    /// Generate a key pair with a configurable key size
    ///
    /// # Errors
    /// Returns `KeyMaterial` if key generation fails
    pub fn generate_with_key_size(kid: &str, key_size_bits: usize) -> AppResult<Self> {
        use rand::rngs::OsRng;

        let mut rng = OsRng;
        let private_key = RsaPrivateKey::new(&mut rng, key_size_bits)
            .map_err(|e| AppError::key_material(format!("failed to generate RSA key: {e}")))?;

        let public_key = RsaPublicKey::from(&private_key);

        Ok(Self {
            kid: kid.to_owned(),
            private_key,
            public_key,
        })
    }

    /// Key identifier carried in ID token headers and the published JWK
    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Convert the public key to JWK format
    ///
    /// # Errors
    /// Returns `KeyMaterial` if the key cannot be rendered as a JWK
    pub fn public_jwk(&self) -> AppResult<JsonWebKey> {
        use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
        use rsa::traits::PublicKeyParts;

        let n_bytes = self.public_key.n().to_bytes_be();
        let e_bytes = self.public_key.e().to_bytes_be();

        Ok(JsonWebKey {
            kty: "RSA".to_owned(),
            key_use: "sig".to_owned(),
            kid: self.kid.clone(),
            alg: "RS256".to_owned(),
            n: URL_SAFE_NO_PAD.encode(&n_bytes),
            e: URL_SAFE_NO_PAD.encode(&e_bytes),
        })
    }

    /// Export the private key as PEM
    ///
    /// # Errors
    /// Returns `KeyMaterial` if PEM encoding fails
    pub fn private_key_pem(&self) -> AppResult<String> {
        self.private_key
            .to_pkcs8_pem(rsa::pkcs8::LineEnding::LF)
            .map(|pem| pem.to_string())
            .map_err(|e| AppError::key_material(format!("failed to export private key: {e}")))
    }

    /// Export the public key as PEM
    ///
    /// # Errors
    /// Returns `KeyMaterial` if PEM encoding fails
    pub fn public_key_pem(&self) -> AppResult<String> {
        self.public_key
            .to_public_key_pem(rsa::pkcs8::LineEnding::LF)
            .map_err(|e| AppError::key_material(format!("failed to export public key: {e}")))
    }

    /// Get the encoding key for RS256 signing
    ///
    /// # Errors
    /// Returns `KeyMaterial` if the key cannot be converted
    pub fn encoding_key(&self) -> AppResult<EncodingKey> {
        let pem = self.private_key_pem()?;
        EncodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| AppError::key_material(format!("failed to build encoding key: {e}")))
    }

    /// Get the decoding key for RS256 verification
    ///
    /// # Errors
    /// Returns `KeyMaterial` if the key cannot be converted
    pub fn decoding_key(&self) -> AppResult<DecodingKey> {
        let pem = self.public_key_pem()?;
        DecodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| AppError::key_material(format!("failed to build decoding key: {e}")))
    }
}

/// Generate `byte_len` cryptographically random bytes, hex encoded
///
/// # Errors
/// Returns an error if the system RNG fails - the server cannot mint
/// codes or tokens securely without a working RNG
pub fn random_hex(byte_len: usize) -> AppResult<String> {
    let rng = SystemRandom::new();
    let mut bytes = vec![0u8; byte_len];

    rng.fill(&mut bytes).map_err(|e| {
        tracing::error!("CRITICAL: SystemRandom failed: {}", e);
        AppError::internal("system RNG failure")
    })?;

    Ok(hex::encode(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_key_exports_unpadded_jwk() {
        let key = SigningKey::generate_with_key_size("test-key", 2048).unwrap();
        let jwk = key.public_jwk().unwrap();

        assert_eq!(jwk.kty, "RSA");
        assert_eq!(jwk.alg, "RS256");
        assert_eq!(jwk.key_use, "sig");
        assert_eq!(jwk.kid, "test-key");
        assert!(!jwk.n.contains('='));
        assert!(!jwk.e.contains('='));
    }

    #[test]
    fn pem_round_trip_preserves_kid_and_modulus() {
        let key = SigningKey::generate_with_key_size("round-trip", 2048).unwrap();
        let pem = key.private_key_pem().unwrap();

        let imported = SigningKey::from_pem("round-trip", &pem).unwrap();
        assert_eq!(
            key.public_jwk().unwrap().n,
            imported.public_jwk().unwrap().n
        );
    }

    #[test]
    fn garbage_pem_is_rejected() {
        let result = SigningKey::from_pem("bad", "not a pem at all");
        assert!(result.is_err());
    }

    #[test]
    fn random_hex_length_matches_bytes() {
        let token = random_hex(40).unwrap();
        assert_eq!(token.len(), 80);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
