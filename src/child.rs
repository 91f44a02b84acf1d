// ABOUTME: Spawns a child process and exposes its three streams as cancellable frame streams
// ABOUTME: Mirrors the duck-typed "reader/writer" boundary: a finite frame source and a finite frame sink

use bytes::Bytes;
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::framed::{self, empty_frame_source};

#[derive(Debug, Error)]
pub enum ChildError {
    #[error("failed to spawn child process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("child process did not expose a stdio handle")]
    MissingStdio,
}

/// The three capabilities the relay loop needs from either a spawned child
/// or the rpipe process's own stdio: a stderr frame source, a stdout frame
/// source, a stdin frame sink, plus a token that fires when the underlying
/// process is gone (caller-cancelled or exited on its own).
pub struct ChildHarness {
    pub stdout: mpsc::Receiver<Bytes>,
    pub stderr: mpsc::Receiver<Bytes>,
    pub stdin: mpsc::Sender<Bytes>,
    pub cancellation: CancellationToken,
}

impl ChildHarness {
    /// Spawns `program` with `args`, inheriting the environment plus
    /// `RPIPE_NAME`/`RPIPE_TARGET`. Killing the child is driven by
    /// `cancellation`; the child's own exit also fires `cancellation` so
    /// other selectors on the same token learn of termination.
    pub fn spawn(
        program: &str,
        args: &[String],
        name: &str,
        target: &str,
        block_size: usize,
        delimiter: u8,
        cancellation: CancellationToken,
    ) -> Result<Self, ChildError> {
        let mut child = Command::new(program)
            .args(args)
            .env("RPIPE_NAME", name)
            .env("RPIPE_TARGET", target)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(ChildError::Spawn)?;

        let child_stdin = child.stdin.take().ok_or(ChildError::MissingStdio)?;
        let child_stdout = child.stdout.take().ok_or(ChildError::MissingStdio)?;
        let child_stderr = child.stderr.take().ok_or(ChildError::MissingStdio)?;

        let stdout = framed::spawn_frame_reader(child_stdout, block_size, delimiter);
        let stderr = framed::spawn_frame_reader(child_stderr, block_size, delimiter);
        let stdin = framed::spawn_frame_writer(child_stdin);

        let kill_token = cancellation.clone();
        let exit_token = cancellation.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = kill_token.cancelled() => {
                    let _ = child.start_kill();
                }
                status = child.wait() => {
                    if let Err(e) = status {
                        tracing::warn!(error = %e, "error waiting on child process");
                    }
                    exit_token.cancel();
                }
            }
        });

        Ok(ChildHarness {
            stdout,
            stderr,
            stdin,
            cancellation,
        })
    }

    /// The no-child fallback: rpipe's own stdio stands in for the three
    /// child streams, with stderr replaced by a never-yielding source.
    pub fn local_stdio(block_size: usize, delimiter: u8, cancellation: CancellationToken) -> Self {
        let stdout = framed::spawn_frame_reader(tokio::io::stdin(), block_size, delimiter);
        let stderr = empty_frame_source();
        let stdin = framed::spawn_frame_writer(tokio::io::stdout());

        ChildHarness {
            stdout,
            stderr,
            stdin,
            cancellation,
        }
    }
}
