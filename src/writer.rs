//! Dedicated writer task serializing all frame sends.
//!
//! Sends may originate from any context: the caller of `send`, a response
//! callback, a host dispatcher's own executor. Routing every frame through
//! one mpsc channel into a single task that owns the write half guarantees
//! concurrent callers never interleave partial frames on the wire:
//!
//! ```text
//! send()          ─┐
//! ReplyHandle     ─┼─► mpsc::Sender<WriteCommand> ─► writer task ─► socket
//! disconnect()    ─┘
//! ```
//!
//! Frames arrive fully encoded (header + mask + masked payload in one
//! contiguous buffer); the task drains whatever is ready before flushing so
//! bursts coalesce into fewer syscalls.

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{Result, WsBridgeError};

/// Channel capacity; senders wait when the writer falls this far behind.
const WRITE_CHANNEL_CAPACITY: usize = 64;

/// Frames to coalesce into one flush.
const MAX_BATCH_SIZE: usize = 16;

/// Instruction for the writer task.
#[derive(Debug)]
enum WriteCommand {
    /// A fully encoded frame to put on the wire.
    Frame(Bytes),
    /// Flush, shut the write direction down, and exit.
    Close,
}

/// Cheaply cloneable handle for queueing frames to the writer task.
#[derive(Clone)]
pub(crate) struct WriterHandle {
    tx: mpsc::Sender<WriteCommand>,
}

impl WriterHandle {
    /// Queue one encoded frame. Fails once the writer task is gone.
    pub async fn send(&self, frame: Bytes) -> Result<()> {
        self.tx
            .send(WriteCommand::Frame(frame))
            .await
            .map_err(|_| WsBridgeError::ConnectionClosed)
    }

    /// Ask the task to flush pending frames and close the write half.
    /// Best-effort: a writer that already exited is fine.
    pub async fn close(&self) {
        let _ = self.tx.send(WriteCommand::Close).await;
    }
}

/// Spawn the writer task over the transport write half.
pub(crate) fn spawn_writer_task<W>(writer: W) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(WRITE_CHANNEL_CAPACITY);
    let task = tokio::spawn(writer_loop(rx, writer));
    (WriterHandle { tx }, task)
}

async fn writer_loop<W>(mut rx: mpsc::Receiver<WriteCommand>, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        // All senders dropped: clean shutdown.
        let Some(first) = rx.recv().await else {
            return Ok(());
        };

        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        let mut closing = false;

        match first {
            WriteCommand::Frame(frame) => batch.push(frame),
            WriteCommand::Close => closing = true,
        }

        // Drain whatever is already queued before touching the socket.
        while !closing && batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(WriteCommand::Frame(frame)) => batch.push(frame),
                Ok(WriteCommand::Close) => closing = true,
                Err(_) => break,
            }
        }

        for frame in &batch {
            writer.write_all(frame).await?;
        }
        writer.flush().await?;

        if closing {
            writer.shutdown().await?;
            return Ok(());
        }
    }
}
