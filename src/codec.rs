// ABOUTME: Encodes and decodes the on-wire Envelope as self-describing JSON
// ABOUTME: A parse failure here is a non-fatal, steady-state error: the caller logs and drops the message

use crate::model::Envelope;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Serializes an envelope to its wire representation.
pub fn encode(envelope: &Envelope) -> Vec<u8> {
    // Envelope's own field types guarantee this cannot fail.
    serde_json::to_vec(envelope).expect("envelope is always json-serializable")
}

/// Parses a wire message back into an envelope.
///
/// Garbage bytes published on a topic (scenario: a misbehaving peer, or an
/// unrelated publisher sharing the channel) surface here as `CodecError`,
/// which the relay loop logs and otherwise ignores.
pub fn decode(bytes: &[u8]) -> Result<Envelope, CodecError> {
    Ok(serde_json::from_slice(bytes)?)
}
