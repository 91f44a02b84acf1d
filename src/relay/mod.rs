// ABOUTME: The central event loop binding the framed adapter, child harness, cryptor and broker together
// ABOUTME: config holds resolved CLI flags, builder performs startup, run is the steady-state select! loop

pub mod builder;
pub mod config;
pub mod run;

pub use builder::RelayBuilder;
pub use config::RelayConfig;
pub use run::Relay;
