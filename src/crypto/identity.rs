// ABOUTME: The per-process asymmetric identity keypair and its PKCS#1 v1.5 + PEM transport encoding
// ABOUTME: Generated fresh at boot, never persisted; the public half is published under PUBKEYS:<channel>

use base64::Engine as _;
use pkcs8::{DecodePublicKey, EncodePublicKey};
use rand::rngs::OsRng;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use thiserror::Error;

const KEY_BITS: usize = 2048;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("failed to generate rsa keypair: {0}")]
    Generate(rsa::Error),

    #[error("failed to encode public key: {0}")]
    EncodePublic(#[from] pkcs8::spki::Error),

    #[error("failed to decode public key: {0}")]
    DecodePublic(pkcs8::spki::Error),

    #[error("rsa operation failed: {0}")]
    Rsa(#[from] rsa::Error),

    #[error("invalid base64 ciphertext: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// A freshly generated 2048-bit asymmetric identity, created at process
/// start and never persisted. The private half stays in memory for the
/// life of the process.
pub struct Identity {
    private_key: RsaPrivateKey,
    public_key: RsaPublicKey,
}

impl Identity {
    pub fn generate() -> Result<Self, IdentityError> {
        let private_key = RsaPrivateKey::new(&mut OsRng, KEY_BITS).map_err(IdentityError::Generate)?;
        let public_key = RsaPublicKey::from(&private_key);
        Ok(Identity {
            private_key,
            public_key,
        })
    }

    /// PEM-encoded PKIX public key, the representation published under
    /// `PUBKEYS:<channel>`.
    pub fn public_key_pem(&self) -> Result<String, IdentityError> {
        Ok(self
            .public_key
            .to_public_key_pem(pkcs8::LineEnding::LF)?)
    }

    /// PKCS#1 v1.5 RSA-decrypts a base64-wrapped ciphertext with our
    /// private key, returning the raw plaintext (a 16-byte session key).
    pub fn decrypt_base64(&self, ciphertext_b64: &str) -> Result<Vec<u8>, IdentityError> {
        let ciphertext = base64::engine::general_purpose::STANDARD.decode(ciphertext_b64)?;
        Ok(self.private_key.decrypt(Pkcs1v15Encrypt, &ciphertext)?)
    }
}

/// Parses a PEM-encoded PKIX public key as fetched from `PUBKEYS:<channel>`.
pub fn decode_public_key(pem: &str) -> Result<RsaPublicKey, IdentityError> {
    RsaPublicKey::from_public_key_pem(pem).map_err(IdentityError::DecodePublic)
}

/// PKCS#1 v1.5 RSA-encrypts `plaintext` (a 16-byte session key) for
/// `recipient`, base64-wrapping the ciphertext for key-value transport.
pub fn encrypt_base64(recipient: &RsaPublicKey, plaintext: &[u8]) -> Result<String, IdentityError> {
    let ciphertext = recipient.encrypt(&mut OsRng, Pkcs1v15Encrypt, plaintext)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(ciphertext))
}
