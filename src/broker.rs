// ABOUTME: The pub/sub-capable key-value broker collaborator (Redis in production)
// ABOUTME: Defines the narrow GET/SET/DEL/KEYS/PUBLISH/SUBSCRIBE surface the rest of the crate depends on

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;

/// Broker key schema (spec §6).
pub fn pubkey_key(channel: &str) -> String {
    format!("PUBKEYS:{channel}")
}

pub fn symkey_key(from: &str, to: &str) -> String {
    format!("SYMKEYS:{from}:{to}")
}

pub fn symkey_pattern_from(channel: &str) -> String {
    format!("SYMKEYS:{channel}:*")
}

pub fn symkey_pattern_to(channel: &str) -> String {
    format!("SYMKEYS:*:{channel}")
}

/// Splits a `SYMKEYS:<from>:<to>` key back into its two channel names.
pub fn split_symkey_key(key: &str) -> Option<(&str, &str)> {
    let rest = key.strip_prefix("SYMKEYS:")?;
    rest.split_once(':')
}

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker transport error: {0}")]
    Transport(String),

    #[error("broker connection unavailable: {0}")]
    Connection(String),
}

/// The external pub/sub-capable key-value collaborator.
///
/// rpipe only ever needs this narrow surface; the broker's own internals
/// (clustering, persistence, eviction) are out of scope.
pub trait Broker: Send + Sync {
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, BrokerError>> + Send;

    fn set(&self, key: &str, value: &str) -> impl Future<Output = Result<(), BrokerError>> + Send;

    fn del(&self, key: &str) -> impl Future<Output = Result<(), BrokerError>> + Send;

    fn keys(&self, pattern: &str) -> impl Future<Output = Result<Vec<String>, BrokerError>> + Send;

    fn publish(
        &self,
        topic: &str,
        payload: &[u8],
    ) -> impl Future<Output = Result<(), BrokerError>> + Send;

    /// Subscribes to `topic`, spawning a background task that drains the
    /// subscription into the returned channel. The receiver never yields
    /// again once the subscription task ends (broker connection lost).
    fn subscribe(
        &self,
        topic: &str,
    ) -> impl Future<Output = Result<mpsc::Receiver<Bytes>, BrokerError>> + Send;
}

/// A `Broker` backed by a real Redis server.
#[derive(Clone)]
pub struct RedisBroker {
    client: redis::Client,
    conn: redis::aio::MultiplexedConnection,
}

impl RedisBroker {
    pub async fn connect(url: &str) -> Result<Self, BrokerError> {
        let client = redis::Client::open(url)
            .map_err(|e| BrokerError::Connection(e.to_string()))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;
        Ok(RedisBroker { client, conn })
    }

    pub async fn ping(&self) -> Result<(), BrokerError> {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| BrokerError::Transport(e.to_string()))?;
        Ok(())
    }
}

impl Broker for RedisBroker {
    async fn get(&self, key: &str) -> Result<Option<String>, BrokerError> {
        let mut conn = self.conn.clone();
        redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| BrokerError::Transport(e.to_string()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), BrokerError> {
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| BrokerError::Transport(e.to_string()))
    }

    async fn del(&self, key: &str) -> Result<(), BrokerError> {
        let mut conn = self.conn.clone();
        redis::cmd("DEL")
            .arg(key)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| BrokerError::Transport(e.to_string()))
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, BrokerError> {
        let mut conn = self.conn.clone();
        redis::cmd("KEYS")
            .arg(pattern)
            .query_async(&mut conn)
            .await
            .map_err(|e| BrokerError::Transport(e.to_string()))
    }

    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), BrokerError> {
        let mut conn = self.conn.clone();
        redis::cmd("PUBLISH")
            .arg(topic)
            .arg(payload)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| BrokerError::Transport(e.to_string()))
    }

    async fn subscribe(&self, topic: &str) -> Result<mpsc::Receiver<Bytes>, BrokerError> {
        use futures_util::StreamExt;

        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;
        pubsub
            .subscribe(topic)
            .await
            .map_err(|e| BrokerError::Transport(e.to_string()))?;

        let (tx, rx) = mpsc::channel(64);
        let topic = topic.to_owned();
        tokio::spawn(async move {
            let mut stream = pubsub.on_message();
            while let Some(msg) = stream.next().await {
                let payload: Vec<u8> = match msg.get_payload() {
                    Ok(p) => p,
                    Err(e) => {
                        tracing::warn!(topic = %topic, error = %e, "dropping unreadable pubsub payload");
                        continue;
                    }
                };
                if tx.send(Bytes::from(payload)).await.is_err() {
                    break;
                }
            }
        });

        Ok(rx)
    }
}
