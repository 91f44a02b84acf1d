// ABOUTME: Startup: connect to the broker, publish identity, wire up the child (or local stdio)
// ABOUTME: and register OS signal handlers, before handing off to the steady-state run() loop

use tokio_util::sync::CancellationToken;

use crate::broker::{Broker, RedisBroker};
use crate::child::ChildHarness;
use crate::crypto::{Identity, RsaAesCryptor, SessionCryptor};
use crate::error::RpipeError;
use crate::relay::config::{RelayConfig, LINE_DELIMITER};
use crate::relay::run::Relay;

pub struct RelayBuilder {
    config: RelayConfig,
}

impl RelayBuilder {
    pub fn new(config: RelayConfig) -> Self {
        RelayBuilder { config }
    }

    /// Connects to the broker, publishes this channel's identity, spawns
    /// the child (or falls back to local stdio), subscribes to our own
    /// channel name, and registers SIGINT/SIGTERM handlers against a
    /// single cancellation token shared with the child harness.
    pub async fn build(self) -> Result<Relay<RedisBroker, RsaAesCryptor<RedisBroker>>, RpipeError> {
        if self.config.name.is_empty() {
            return Err(RpipeError::MissingArgument("--name"));
        }
        if self.config.pipe && self.config.target_or_empty().is_empty() {
            return Err(RpipeError::MissingArgument("--target"));
        }

        url::Url::parse(&self.config.redis_url)?;

        let broker = RedisBroker::connect(&self.config.redis_url).await?;
        broker.ping().await?;

        let identity = Identity::generate().map_err(crate::crypto::CryptoError::from)?;
        let cryptor = RsaAesCryptor::new(identity, broker.clone());
        cryptor.publish_identity(&self.config.name).await?;

        let cancellation = CancellationToken::new();

        let child = if self.config.command.is_empty() {
            ChildHarness::local_stdio(self.config.block_size, LINE_DELIMITER, cancellation.clone())
        } else {
            let (program, args) = self
                .config
                .command
                .split_first()
                .expect("non-empty command");
            ChildHarness::spawn(
                program,
                args,
                &self.config.name,
                self.config.target_or_empty(),
                self.config.block_size,
                LINE_DELIMITER,
                cancellation.clone(),
            )
            .map_err(|e| RpipeError::Spawn(std::io::Error::other(e.to_string())))?
        };

        let subscription = broker.subscribe(&self.config.name).await?;

        spawn_signal_handler(cancellation.clone());

        Ok(Relay {
            config: self.config,
            broker,
            cryptor,
            child,
            subscription,
            cancellation,
        })
    }
}

fn spawn_signal_handler(token: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            let mut term = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to register SIGTERM handler");
                    let _ = tokio::signal::ctrl_c().await;
                    token.cancel();
                    return;
                }
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
        token.cancel();
    });
}
