// ABOUTME: Demonstrates running a single rpipe relay in pipe mode against a local Redis broker
// ABOUTME: Spawns `cat` as the child so stdin written to the broker's peer channel echoes back

use std::time::Duration;

use rpipe::relay::config::RelayConfig;
use rpipe::relay::RelayBuilder;
use tokio::time::sleep;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Brings up one rpipe instance, named "demo-alpha", pinned to peer
/// "demo-beta", running `cat` as its child. A second instance with the
/// names swapped (run in another terminal) will echo whatever is typed
/// into this one's stdin back out on its own stdout.
///
/// ```bash
/// cargo run --example echo_pipe
/// ```
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = RelayConfig {
        redis_url: "redis://127.0.0.1:6379".to_owned(),
        name: "demo-alpha".to_owned(),
        target: Some("demo-beta".to_owned()),
        nonsecure: false,
        pipe: true,
        block_size: 64 * 1024,
        command: vec!["cat".to_owned()],
    };

    info!("connecting to redis and publishing identity for demo-alpha");
    let relay = RelayBuilder::new(config).build().await?;

    info!("relay running; type into this terminal to send to demo-beta");
    relay.run().await;

    sleep(Duration::from_millis(50)).await;
    Ok(())
}
