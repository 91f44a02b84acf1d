// ABOUTME: Resolved relay configuration, produced from CLI flags by the bin crate's clap parser

pub const DEFAULT_BLOCK_SIZE: usize = 512 * 1024;
pub const LINE_DELIMITER: u8 = b'\n';

/// The fully-resolved configuration for one relay run; every field here has
/// already survived CLI validation (e.g. `name` is non-empty).
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub redis_url: String,
    pub name: String,
    pub target: Option<String>,
    pub nonsecure: bool,
    pub pipe: bool,
    pub block_size: usize,
    pub command: Vec<String>,
}

impl RelayConfig {
    pub fn target_or_empty(&self) -> &str {
        self.target.as_deref().unwrap_or("")
    }
}
