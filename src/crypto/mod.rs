// ABOUTME: The secure session layer — per-channel asymmetric identity, per-pair symmetric session keys
// ABOUTME: Split into identity (RSA), symmetric (AES-CFB) and cryptor (the stateful SessionCryptor trait)

pub mod cryptor;
pub mod identity;
pub mod symmetric;

pub use cryptor::{CryptoError, RsaAesCryptor, SessionCryptor};
pub use identity::Identity;
