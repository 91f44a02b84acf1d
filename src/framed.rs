// ABOUTME: Turns a byte reader/writer into a bounded, delimited stream of frames
// ABOUTME: Each direction runs as its own background task feeding/draining a bounded channel

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

const CHANNEL_CAPACITY: usize = 32;

/// Reads `reader` to EOF, producing frames that satisfy the framing
/// algorithm: each frame is either exactly `block_size` bytes and contains
/// no `delimiter`, or ends with `delimiter` at a position `<= block_size`,
/// or is the final short flush at EOF. Any non-EOF read error ends the
/// stream identically to a clean EOF (errors are not surfaced, per the
/// steady-state error policy).
pub fn spawn_frame_reader<R>(mut reader: R, block_size: usize, delimiter: u8) -> mpsc::Receiver<Bytes>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    tokio::spawn(async move {
        let mut acc = BytesMut::new();
        let mut chunk = vec![0u8; block_size.max(1)];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => acc.extend_from_slice(&chunk[..n]),
                Err(_) => break,
            }

            loop {
                if let Some(i) = acc.iter().position(|&b| b == delimiter) {
                    let frame = acc.split_to(i + 1).freeze();
                    if tx.send(frame).await.is_err() {
                        return;
                    }
                } else if acc.len() >= block_size {
                    let frame = acc.split_to(block_size).freeze();
                    if tx.send(frame).await.is_err() {
                        return;
                    }
                } else {
                    break;
                }
            }
        }

        if !acc.is_empty() {
            let _ = tx.send(acc.freeze()).await;
        }
    });
    rx
}

/// Drains a bounded channel of frames, writing and flushing each to
/// `writer` in order. Write errors are logged and the task ends; the
/// channel is then left to fill up and the sender side observes a closed
/// receiver.
pub fn spawn_frame_writer<W>(mut writer: W) -> mpsc::Sender<Bytes>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<Bytes>(CHANNEL_CAPACITY);
    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if let Err(e) = writer.write_all(&frame).await {
                tracing::warn!(error = %e, "frame writer: write failed, stopping");
                break;
            }
            if let Err(e) = writer.flush().await {
                tracing::warn!(error = %e, "frame writer: flush failed, stopping");
                break;
            }
        }
    });
    tx
}

/// A frame source that never yields and never closes, used for the "no
/// child stderr" case in local-stdio mode.
pub fn empty_frame_source() -> mpsc::Receiver<Bytes> {
    let (tx, rx) = mpsc::channel(1);
    std::mem::forget(tx);
    rx
}
