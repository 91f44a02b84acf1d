// ABOUTME: AES-128-CFB symmetric encryption with a random 16-byte IV prepended to the ciphertext
// ABOUTME: Confidentiality only, no authentication tag -- see the design notes on upgrading to an AEAD

use aes::Aes128;
use cfb_mode::cipher::{AsyncStreamCipher, KeyIvInit};
use cfb_mode::{Decryptor, Encryptor};
use rand::RngCore;
use thiserror::Error;

pub const SYMKEY_LEN: usize = 16;
const IV_LEN: usize = 16;

type Aes128CfbEnc = Encryptor<Aes128>;
type Aes128CfbDec = Decryptor<Aes128>;

#[derive(Debug, Error)]
pub enum SymmetricError {
    #[error("ciphertext shorter than the iv: got {0} bytes")]
    Truncated(usize),

    #[error("invalid key or iv length")]
    InvalidKeyLength,
}

/// Generates a fresh 16-byte session key.
pub fn generate_symkey() -> [u8; SYMKEY_LEN] {
    let mut key = [0u8; SYMKEY_LEN];
    rand::rngs::OsRng.fill_bytes(&mut key);
    key
}

/// Encrypts `plaintext` under `key`, prepending a fresh random IV to the
/// returned ciphertext. Two encryptions of the same plaintext under the
/// same key produce distinct outputs.
pub fn encrypt(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, SymmetricError> {
    let mut iv = [0u8; IV_LEN];
    rand::rngs::OsRng.fill_bytes(&mut iv);

    let mut buf = plaintext.to_vec();
    Aes128CfbEnc::new_from_slices(key, &iv)
        .map_err(|_| SymmetricError::InvalidKeyLength)?
        .encrypt(&mut buf);

    let mut out = Vec::with_capacity(IV_LEN + buf.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&buf);
    Ok(out)
}

/// Decrypts a ciphertext produced by [`encrypt`]: the leading 16 bytes are
/// taken as the IV, the remainder as the AES-CFB ciphertext.
pub fn decrypt(key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, SymmetricError> {
    if ciphertext.len() < IV_LEN {
        return Err(SymmetricError::Truncated(ciphertext.len()));
    }
    let (iv, body) = ciphertext.split_at(IV_LEN);
    let mut buf = body.to_vec();
    Aes128CfbDec::new_from_slices(key, iv)
        .map_err(|_| SymmetricError::InvalidKeyLength)?
        .decrypt(&mut buf);
    Ok(buf)
}
