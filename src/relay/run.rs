// ABOUTME: The steady-state select! loop: the sole mutator of the symkey cache and per-peer line buffers
// ABOUTME: Nothing here is fatal -- every branch logs and continues rather than tearing the loop down

use std::collections::HashMap;

use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::broker::Broker;
use crate::child::ChildHarness;
use crate::codec;
use crate::crypto::{CryptoError, SessionCryptor};
use crate::model::{ApplicationMessage, ControlCode, Envelope};
use crate::relay::config::RelayConfig;

/// The assembled relay, ready to run its event loop.
pub struct Relay<B: Broker, C: SessionCryptor> {
    pub(crate) config: RelayConfig,
    pub(crate) broker: B,
    pub(crate) cryptor: C,
    pub(crate) child: ChildHarness,
    pub(crate) subscription: tokio::sync::mpsc::Receiver<Bytes>,
    pub(crate) cancellation: CancellationToken,
}

impl<B: Broker, C: SessionCryptor> Relay<B, C> {
    /// Runs the event loop to completion (shutdown by signal, child exit,
    /// or pipe-mode inbound EOF).
    pub async fn run(mut self) {
        let mut line_accumulators: HashMap<String, Vec<u8>> = HashMap::new();

        loop {
            tokio::select! {
                biased;

                _ = self.cancellation.cancelled() => {
                    tracing::info!("shutting down (signal or child exit)");
                    break;
                }

                frame = self.child.stderr.recv() => {
                    match frame {
                        Some(bytes) => {
                            if let Err(e) = tokio::io::stderr().write_all(&bytes).await {
                                tracing::warn!(error = %e, "failed writing child stderr passthrough");
                            }
                        }
                        None => {} // stderr stream ended; keep running on stdout/inbound
                    }
                }

                frame = self.child.stdout.recv() => {
                    match frame {
                        Some(bytes) => self.handle_outbound(bytes).await,
                        None => {
                            tracing::info!("child stdout closed");
                            break;
                        }
                    }
                }

                msg = self.subscription.recv() => {
                    match msg {
                        Some(bytes) => {
                            if self.handle_inbound(bytes, &mut line_accumulators).await {
                                break;
                            }
                        }
                        None => {
                            tracing::warn!("broker subscription ended");
                            break;
                        }
                    }
                }
            }
        }

        self.shutdown(&line_accumulators).await;
    }

    /// Handles one stdout frame. Returns nothing; every failure mode is
    /// logged and the frame is dropped in place.
    pub(crate) async fn handle_outbound(&self, frame: Bytes) {
        let (target, payload): (String, Vec<u8>) = if self.config.pipe {
            let target = self.config.target_or_empty().to_owned();
            (target, frame.to_vec())
        } else {
            match ApplicationMessage::parse(&frame) {
                Some(msg) => (msg.name, msg.data),
                None => {
                    tracing::warn!("malformed application message on stdout, dropping");
                    return;
                }
            }
        };

        if target.is_empty() {
            tracing::warn!("outbound frame has no target, dropping");
            return;
        }

        let chunks: Vec<&[u8]> = if self.config.pipe {
            vec![&payload[..]]
        } else {
            payload.chunks(self.config.block_size.max(1)).collect()
        };

        for chunk in chunks {
            self.publish_chunk(&target, chunk).await;
        }
    }

    async fn publish_chunk(&self, target: &str, chunk: &[u8]) {
        let mut envelope =
            Envelope::data_envelope(&self.config.name, target, chunk.to_vec(), self.config.pipe);

        if !self.config.nonsecure {
            match self.cryptor.encrypt_for(&self.config.name, target, chunk).await {
                Ok(ciphertext) => {
                    envelope.data = ciphertext;
                    envelope.secured = true;
                }
                Err(e) => {
                    tracing::warn!(error = %e, target, "failed to secure outbound chunk, dropping");
                    return;
                }
            }
        }

        let wire = codec::encode(&envelope);
        if let Err(e) = self.broker.publish(target, &wire).await {
            tracing::warn!(error = %e, target, "failed to publish outbound envelope");
        }
    }

    /// Handles one inbound broker message. Returns `true` if the loop
    /// should shut down (pipe-mode EOF).
    pub(crate) async fn handle_inbound(
        &self,
        bytes: Bytes,
        line_accumulators: &mut HashMap<String, Vec<u8>>,
    ) -> bool {
        let envelope = match codec::decode(&bytes) {
            Ok(env) => env,
            Err(e) => {
                tracing::warn!(error = %e, "malformed inbound envelope, dropping");
                return false;
            }
        };

        if envelope.from.is_empty() {
            tracing::warn!("inbound envelope has empty `from`, processing anyway");
        }

        if self.config.pipe {
            let target = self.config.target_or_empty();
            if envelope.from != target {
                tracing::warn!(from = %envelope.from, target, "inbound from unexpected peer, dropping");
                return false;
            }
        }

        match envelope.control {
            ControlCode::ResetInboundSymkey => {
                if let Err(e) = self
                    .cryptor
                    .reset_inbound_symkey(&envelope.from, &envelope.to)
                    .await
                {
                    tracing::warn!(error = %e, "failed to reset inbound symkey");
                }
                return false;
            }
            ControlCode::Eof => {
                if self.config.pipe {
                    tracing::info!(from = %envelope.from, "received pipe-mode eof");
                    return true;
                }
                return false;
            }
            ControlCode::Data => {}
        }

        let payload = if envelope.secured {
            match self
                .cryptor
                .decrypt_from(&envelope.from, &envelope.to, &envelope.data)
                .await
            {
                Ok(plaintext) => plaintext,
                Err(CryptoError::Expired(_)) => {
                    tracing::warn!(from = %envelope.from, "cannot decrypt, symkey expired, dropping");
                    return false;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "decryption failed, dropping");
                    return false;
                }
            }
        } else {
            envelope.data.clone()
        };

        if self.config.pipe {
            if self.child.stdin.send(Bytes::from(payload)).await.is_err() {
                tracing::warn!("child stdin closed, dropping inbound payload");
            }
        } else {
            let acc = line_accumulators.entry(envelope.from.clone()).or_default();
            acc.extend_from_slice(&payload);

            loop {
                let Some(i) = acc.iter().position(|&b| b == b'\n') else {
                    break;
                };
                let line: Vec<u8> = acc.drain(..=i).collect();
                let framed = ApplicationMessage {
                    name: envelope.from.clone(),
                    data: line,
                };
                if self.child.stdin.send(Bytes::from(framed.encode())).await.is_err() {
                    tracing::warn!("child stdin closed, dropping inbound line");
                    break;
                }
            }
        }

        false
    }

    async fn shutdown(&self, line_accumulators: &HashMap<String, Vec<u8>>) {
        if self.config.pipe {
            let target = self.config.target_or_empty();
            if !target.is_empty() {
                let envelope = Envelope::eof_envelope(&self.config.name, target);
                let wire = codec::encode(&envelope);
                if let Err(e) = self.broker.publish(target, &wire).await {
                    tracing::warn!(error = %e, "failed to publish shutdown eof envelope");
                }
            }
        } else {
            for (peer, remnant) in line_accumulators {
                if !remnant.is_empty() {
                    tracing::warn!(peer, bytes = remnant.len(), "dropping partial inbound line at shutdown");
                }
            }
        }
    }
}
