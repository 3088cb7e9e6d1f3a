//! Dedicated writer task serializing all outbound frames.
//!
//! All sends go through an mpsc channel into one task that owns the
//! write half of the channel, so concurrent callers can never interleave
//! bytes on the stream. The task batches frames that are already queued
//! into a single flush.
//!
//! # Architecture
//!
//! ```text
//! send()     ─┐
//! heartbeat  ─┼─► mpsc::Sender<Bytes> ─► Writer Task ─► Channel
//! auth frame ─┘
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::error::{ImwireError, Result};

/// Default frame queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Maximum frames flushed together in one pass.
const MAX_BATCH_SIZE: usize = 64;

/// Handle for queueing frames to the writer task.
///
/// Cheaply cloneable; dropping every clone shuts the task down after it
/// drains the queue.
#[derive(Clone)]
pub struct WriterHandle {
    /// Frame queue sender.
    tx: mpsc::Sender<Bytes>,
    /// Frames queued but not yet written.
    queued: Arc<AtomicUsize>,
}

impl WriterHandle {
    /// Queue a fully encoded frame for writing.
    ///
    /// Waits for queue capacity when the writer is behind.
    ///
    /// # Errors
    ///
    /// Returns [`ImwireError::ConnectionClosed`] when the writer task has
    /// exited (channel failed or session shut down).
    pub async fn send(&self, frame: Bytes) -> Result<()> {
        self.queued.fetch_add(1, Ordering::AcqRel);

        self.tx.send(frame).await.map_err(|_| {
            self.queued.fetch_sub(1, Ordering::Release);
            ImwireError::ConnectionClosed
        })
    }

    /// Number of frames queued but not yet written.
    #[inline]
    pub fn queued_count(&self) -> usize {
        self.queued.load(Ordering::Acquire)
    }
}

/// Spawn the writer task over the write half of a channel.
///
/// Returns the send handle and the task's join handle. The task exits
/// cleanly when every [`WriterHandle`] clone is dropped, or with an
/// error when the underlying write fails.
pub fn spawn_writer_task<W>(writer: W) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(DEFAULT_QUEUE_CAPACITY);
    let queued = Arc::new(AtomicUsize::new(0));

    let handle = WriterHandle {
        tx,
        queued: queued.clone(),
    };

    let task = tokio::spawn(async move {
        let result = writer_loop(rx, writer, queued).await;
        if let Err(e) = &result {
            error!(error = %e, "Writer task failed");
        }
        result
    });

    (handle, task)
}

/// Receive frames and write them to the channel, flushing per batch.
async fn writer_loop<W>(
    mut rx: mpsc::Receiver<Bytes>,
    mut writer: W,
    queued: Arc<AtomicUsize>,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        let Some(first) = rx.recv().await else {
            debug!("Writer queue closed, shutting down");
            return Ok(());
        };

        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(first);
        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(frame) => batch.push(frame),
                Err(_) => break,
            }
        }

        for frame in &batch {
            writer.write_all(frame).await?;
        }
        writer.flush().await?;

        queued.fetch_sub(batch.len(), Ordering::Release);
    }
}
