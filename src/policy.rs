//! # Policy signer/verifier
//!
//! Detached-signature boundary from §6: signs `config_path + ":" +
//! config_sha256_b64` with an Ed25519 key, so a bundle's origin and content
//! hash can be verified independently of how it was transported.
//!
//! Uses `ed25519-dalek` for the detached signature, the same crate used
//! elsewhere in the pipeline for signing build artifacts.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};

use crate::errors::PolicyError;

/// A signed statement that `config_path`'s contents hash to
/// `config_sha256_b64` at the time of signing.
#[derive(Debug, Clone)]
pub struct SignedBundle {
    pub config_path: String,
    pub config_sha256_b64: String,
    pub signature_b64: String,
}

fn digest_message(config_path: &str, config_sha256_b64: &str) -> Vec<u8> {
    format!("{}:{}", config_path, config_sha256_b64).into_bytes()
}

pub fn sha256_b64(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    BASE64.encode(hasher.finalize())
}

/// Signs `config_path` + its content hash with `private_key_bytes` (a
/// 32-byte Ed25519 seed).
pub fn sign(config_path: &str, content: &[u8], private_key_bytes: &[u8]) -> Result<SignedBundle, PolicyError> {
    let seed: [u8; 32] = private_key_bytes
        .try_into()
        .map_err(|_| PolicyError::InvalidPrivateKey("expected a 32-byte Ed25519 seed".to_string()))?;
    let signing_key = SigningKey::from_bytes(&seed);

    let config_sha256_b64 = sha256_b64(content);
    let message = digest_message(config_path, &config_sha256_b64);
    let signature = signing_key.sign(&message);

    Ok(SignedBundle {
        config_path: config_path.to_string(),
        config_sha256_b64,
        signature_b64: BASE64.encode(signature.to_bytes()),
    })
}

/// Verifies that `bundle.signature_b64` was produced by the holder of
/// `public_key_bytes` over `bundle.config_path` + `bundle.config_sha256_b64`.
pub fn verify(bundle: &SignedBundle, public_key_bytes: &[u8]) -> Result<(), PolicyError> {
    let key_bytes: [u8; 32] = public_key_bytes
        .try_into()
        .map_err(|_| PolicyError::InvalidPublicKey("expected a 32-byte Ed25519 public key".to_string()))?;
    let verifying_key = VerifyingKey::from_bytes(&key_bytes)
        .map_err(|e| PolicyError::InvalidPublicKey(e.to_string()))?;

    let signature_bytes = BASE64
        .decode(&bundle.signature_b64)
        .map_err(|e| PolicyError::InvalidSignatureEncoding(e.to_string()))?;
    let signature_bytes: [u8; 64] = signature_bytes
        .try_into()
        .map_err(|_| PolicyError::InvalidSignatureEncoding("signature must be 64 bytes".to_string()))?;
    let signature = Signature::from_bytes(&signature_bytes);

    let message = digest_message(&bundle.config_path, &bundle.config_sha256_b64);
    verifying_key
        .verify(&message, &signature)
        .map_err(|_| PolicyError::VerificationFailed(bundle.config_path.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;
    use rand::rngs::OsRng;

    #[test]
    fn sign_then_verify_round_trips() {
        let signing_key = SigningKey::generate(&mut OsRng);
        let seed = signing_key.to_bytes();
        let verifying_key = signing_key.verifying_key();

        let bundle = sign("plan.json", b"desired state", &seed).unwrap();
        assert!(verify(&bundle, verifying_key.as_bytes()).is_ok());
    }

    #[test]
    fn tampered_content_fails_verification() {
        let signing_key = SigningKey::generate(&mut OsRng);
        let seed = signing_key.to_bytes();
        let verifying_key = signing_key.verifying_key();

        let mut bundle = sign("plan.json", b"desired state", &seed).unwrap();
        bundle.config_sha256_b64 = sha256_b64(b"different content");

        assert!(verify(&bundle, verifying_key.as_bytes()).is_err());
    }

    #[test]
    fn wrong_key_fails_verification() {
        let signing_key = SigningKey::generate(&mut OsRng);
        let seed = signing_key.to_bytes();
        let other_key = SigningKey::generate(&mut OsRng);

        let bundle = sign("plan.json", b"desired state", &seed).unwrap();
        assert!(verify(&bundle, other_key.verifying_key().as_bytes()).is_err());
    }
}
