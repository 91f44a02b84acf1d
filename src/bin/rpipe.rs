// ABOUTME: rpipe CLI entry point: parses flags, wires up tracing, builds and runs the relay
// ABOUTME: exit code is 0 on clean shutdown, non-zero on any fatal startup error

use clap::Parser;
use rpipe::relay::config::{RelayConfig, DEFAULT_BLOCK_SIZE};
use rpipe::relay::RelayBuilder;

/// Bridge a child process's stdio (or the local terminal) to a channel on a
/// shared pub/sub broker.
#[derive(Debug, Parser)]
#[command(name = "rpipe", version)]
struct Args {
    /// Redis broker URL.
    #[arg(long, default_value = "redis://127.0.0.1:6379")]
    redis: String,

    /// This process's own channel name.
    #[arg(long)]
    name: String,

    /// The peer channel name (required in --pipe mode).
    #[arg(long)]
    target: Option<String>,

    /// Disable end-to-end encryption.
    #[arg(long)]
    nonsecure: bool,

    /// Raw passthrough mode, pinned to a single --target peer.
    #[arg(long)]
    pipe: bool,

    /// Maximum frame/chunk size in bytes.
    #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE)]
    blocksize: usize,

    /// Enable debug-level logging.
    #[arg(long, short)]
    verbose: bool,

    /// The child command to run. If empty, the local terminal's stdio is used.
    #[arg(trailing_var_arg = true)]
    command: Vec<String>,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = RelayConfig {
        redis_url: args.redis,
        name: args.name,
        target: args.target,
        nonsecure: args.nonsecure,
        pipe: args.pipe,
        block_size: args.blocksize,
        command: args.command,
    };

    let relay = match RelayBuilder::new(config).build().await {
        Ok(relay) => relay,
        Err(e) => {
            tracing::error!(error = %e, "failed to start rpipe");
            return std::process::ExitCode::FAILURE;
        }
    };

    relay.run().await;
    std::process::ExitCode::SUCCESS
}
