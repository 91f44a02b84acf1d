// ABOUTME: Crate-wide error types for fatal startup failures across rpipe's subsystems
// ABOUTME: Steady-state loop errors are handled locally (logged and dropped); this enum is for the unrecoverable kind

use thiserror::Error;

/// Fatal configuration and startup errors.
///
/// Nothing in the steady-state relay loop produces this type: a broker
/// hiccup, a malformed envelope, or a missing symkey are all logged and
/// swallowed where they occur. `RpipeError` is reserved for failures that
/// prevent the loop from ever starting.
#[derive(Debug, Error)]
pub enum RpipeError {
    #[error("invalid broker url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("broker error: {0}")]
    Broker(#[from] crate::broker::BrokerError),

    #[error("crypto error: {0}")]
    Crypto(#[from] crate::crypto::CryptoError),

    #[error("failed to spawn child process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("missing required argument: {0}")]
    MissingArgument(&'static str),
}

/// Error returned by fallible setup paths.
///
/// As in many Tokio-based crates, steady-state code favors narrow,
/// structured errors (`BrokerError`, `CryptoError`, `CodecError`); this
/// boxed-friendly alias exists for top-level call sites (`main`) that just
/// want to print and exit.
pub type Error = Box<dyn std::error::Error + Send + Sync>;

/// A specialized `Result` type for rpipe's fallible startup operations.
pub type Result<T> = std::result::Result<T, Error>;
