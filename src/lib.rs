pub mod broker;
pub mod child;
pub mod codec;
pub mod crypto;
pub mod error;
pub mod framed;
pub mod model;
pub mod relay;

#[cfg(test)]
mod tests;

pub use error::{Error, Result};
pub use model::{ApplicationMessage, ControlCode, Envelope};
pub use relay::{Relay, RelayBuilder, RelayConfig};
