// ABOUTME: The stateful session cryptor: identity keypair, pair-keyed symkey cache, and a broker handle
// ABOUTME: Implements PublishIdentity / FetchSymkey / RegisterNewOutboundSymkey / ResetInboundSymkey

use std::collections::HashMap;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;

use crate::broker::{self, Broker, BrokerError};
use crate::crypto::identity::{self, Identity, IdentityError};
use crate::crypto::symmetric::{self, SymmetricError};
use crate::model::Envelope;

/// The declared key lifetime from the original design. Session keys are
/// cached indefinitely and the broker-side records carry no TTL; this
/// constant is kept visible rather than silently dropped, but nothing in
/// this crate enforces it.
#[allow(dead_code)]
pub const SYMKEY_EXPIRE: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("symmetric cipher error: {0}")]
    Symmetric(#[from] SymmetricError),

    /// No session key record exists for this pair on the broker.
    #[error("symkey expired or never registered for pair {0}")]
    Expired(String),
}

/// The four session-cryptor lifecycle operations, layered the way a narrow
/// connection trait sits below a client trait: each operation is a single
/// broker round trip plus cache maintenance, nothing more.
pub trait SessionCryptor {
    fn publish_identity(
        &self,
        channel: &str,
    ) -> impl Future<Output = Result<(), CryptoError>> + Send;

    fn fetch_symkey(
        &self,
        from: &str,
        to: &str,
    ) -> impl Future<Output = Result<[u8; 16], CryptoError>> + Send;

    fn register_new_outbound_symkey(
        &self,
        from: &str,
        to: &str,
    ) -> impl Future<Output = Result<[u8; 16], CryptoError>> + Send;

    fn reset_inbound_symkey(
        &self,
        from: &str,
        to: &str,
    ) -> impl Future<Output = Result<(), CryptoError>> + Send;

    fn encrypt_for(
        &self,
        from: &str,
        to: &str,
        plaintext: &[u8],
    ) -> impl Future<Output = Result<Vec<u8>, CryptoError>> + Send;

    fn decrypt_from(
        &self,
        from: &str,
        to: &str,
        ciphertext: &[u8],
    ) -> impl Future<Output = Result<Vec<u8>, CryptoError>> + Send;
}

/// The concrete `SessionCryptor`: an RSA identity plus an AES session-key
/// cache, backed by any `Broker`.
pub struct RsaAesCryptor<B: Broker> {
    identity: Identity,
    broker: B,
    cache: Mutex<HashMap<String, [u8; 16]>>,
}

impl<B: Broker> RsaAesCryptor<B> {
    pub fn new(identity: Identity, broker: B) -> Self {
        RsaAesCryptor {
            identity,
            broker,
            cache: Mutex::new(HashMap::new()),
        }
    }
}

impl<B: Broker> SessionCryptor for RsaAesCryptor<B> {
    /// At startup: publish our public key, drop every outbound symkey we
    /// authored (stale after identity regeneration), and notify every peer
    /// who had previously sent *us* a key that it is no longer readable.
    async fn publish_identity(&self, channel: &str) -> Result<(), CryptoError> {
        let pem = self.identity.public_key_pem()?;
        self.broker.set(&broker::pubkey_key(channel), &pem).await?;

        for key in self.broker.keys(&broker::symkey_pattern_from(channel)).await? {
            self.broker.del(&key).await?;
        }

        for key in self.broker.keys(&broker::symkey_pattern_to(channel)).await? {
            if let Some((peer, _)) = broker::split_symkey_key(&key) {
                let envelope = Envelope::reset_envelope(channel, peer);
                let wire = crate::codec::encode(&envelope);
                self.broker.publish(peer, &wire).await?;
            }
        }

        Ok(())
    }

    async fn fetch_symkey(&self, from: &str, to: &str) -> Result<[u8; 16], CryptoError> {
        let pair = Envelope::pair_key(from, to);
        if let Some(key) = self.cache.lock().await.get(&pair) {
            return Ok(*key);
        }

        let record = self
            .broker
            .get(&broker::symkey_key(from, to))
            .await?
            .ok_or_else(|| CryptoError::Expired(pair.clone()))?;

        let plaintext = self.identity.decrypt_base64(&record)?;
        let mut key = [0u8; 16];
        if plaintext.len() != 16 {
            return Err(CryptoError::Expired(pair));
        }
        key.copy_from_slice(&plaintext);

        self.cache.lock().await.insert(pair, key);
        Ok(key)
    }

    /// Fetches the recipient's public key, generates a fresh key, encrypts
    /// it for the recipient, and stores + caches it. Invoked when the
    /// sender discovers its key is missing (`Expired`).
    async fn register_new_outbound_symkey(
        &self,
        from: &str,
        to: &str,
    ) -> Result<[u8; 16], CryptoError> {
        let pem = self
            .broker
            .get(&broker::pubkey_key(to))
            .await?
            .ok_or_else(|| CryptoError::Expired(Envelope::pair_key(from, to)))?;
        let recipient = identity::decode_public_key(&pem)?;

        let key = symmetric::generate_symkey();
        let wrapped = identity::encrypt_base64(&recipient, &key)?;

        self.broker.set(&broker::symkey_key(from, to), &wrapped).await?;
        self.cache
            .lock()
            .await
            .insert(Envelope::pair_key(from, to), key);
        Ok(key)
    }

    /// On receipt of a control=1 envelope `{from, to}` (`to` is our own
    /// channel): our peer (`from`) just rotated its identity and can no
    /// longer read the key we registered for `to -> from`. Drop our cached
    /// copy of the `from -> to` key (its broker record is orphaned too: the
    /// peer's own `publish_identity` just deleted the key it had authored
    /// for that direction), then register a fresh outbound key for
    /// `to -> from` against the peer's newly published public key.
    async fn reset_inbound_symkey(&self, from: &str, to: &str) -> Result<(), CryptoError> {
        self.cache.lock().await.remove(&Envelope::pair_key(from, to));
        self.register_new_outbound_symkey(to, from).await?;
        Ok(())
    }

    async fn encrypt_for(&self, from: &str, to: &str, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let key = match self.fetch_symkey(from, to).await {
            Ok(key) => key,
            Err(CryptoError::Expired(_)) => self.register_new_outbound_symkey(from, to).await?,
            Err(e) => return Err(e),
        };
        Ok(symmetric::encrypt(&key, plaintext)?)
    }

    async fn decrypt_from(&self, from: &str, to: &str, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let key = self.fetch_symkey(from, to).await?;
        Ok(symmetric::decrypt(&key, ciphertext)?)
    }
}
