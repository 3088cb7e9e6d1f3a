//! Periodic heartbeat scheduler.
//!
//! One task per connection sends a `Heartbeat` request on a fixed
//! interval. Liveness is inferred from the round trips it produces (via
//! the latency analyzer) and from channel closure; a silent-but-open
//! channel is not timed out here.
//!
//! The task captures the session generation it was spawned under and
//! stops as soon as the live generation moves past it, so a heartbeat
//! timer from a torn-down connection can never write into a new one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::codec::MsgPackCodec;
use crate::envelope::{ClientRequest, RequestPayload};
use crate::latency::LatencyAnalyzer;
use crate::protocol::{build_frame, FrameType};
use crate::writer::WriterHandle;

/// Default heartbeat interval.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Spawn the heartbeat task for one connection.
///
/// Every `interval`, builds a fresh `Heartbeat` request, records it with
/// the latency analyzer, and queues it on the writer. Exits when the
/// live generation in `generation` no longer equals `expected_gen`, or
/// when the writer is gone.
pub fn spawn_heartbeat_task(
    interval: Duration,
    writer: WriterHandle,
    latency: Arc<Mutex<LatencyAnalyzer>>,
    generation: Arc<AtomicU64>,
    expected_gen: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately; the auth frame just went
        // out, so skip it.
        ticker.tick().await;

        loop {
            ticker.tick().await;

            if generation.load(Ordering::Acquire) != expected_gen {
                debug!("Heartbeat task superseded, stopping");
                return;
            }

            let request = ClientRequest::new(RequestPayload::Heartbeat, Vec::new());
            let frame = match MsgPackCodec::encode(&request)
                .and_then(|body| build_frame(FrameType::Request, &body))
            {
                Ok(frame) => Bytes::from(frame),
                Err(e) => {
                    warn!(error = %e, "Failed to encode heartbeat");
                    continue;
                }
            };

            match latency.lock() {
                Ok(mut latency) => latency.record_send(&request.req_id),
                Err(poisoned) => poisoned.into_inner().record_send(&request.req_id),
            }

            if writer.send(frame).await.is_err() {
                debug!("Writer gone, heartbeat task stopping");
                return;
            }

            trace!(req_id = %request.req_id, "Heartbeat sent");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::ClientRequest;
    use crate::protocol::FrameBuffer;
    use crate::writer::spawn_writer_task;
    use tokio::io::AsyncReadExt;

    #[tokio::test(start_paused = true)]
    async fn test_emits_heartbeats_on_interval() {
        let (client, mut server) = tokio::io::duplex(4096);
        let (writer, _writer_task) = spawn_writer_task(client);
        let latency = Arc::new(Mutex::new(LatencyAnalyzer::new()));
        let generation = Arc::new(AtomicU64::new(1));

        let _task = spawn_heartbeat_task(
            Duration::from_secs(30),
            writer,
            latency.clone(),
            generation,
            1,
        );

        let mut buffer = FrameBuffer::new();
        let mut buf = vec![0u8; 1024];
        let mut frames = Vec::new();
        while frames.len() < 3 {
            let n = server.read(&mut buf).await.unwrap();
            frames.extend(buffer.push(&buf[..n]).unwrap());
        }

        for frame in &frames {
            assert_eq!(frame.frame_type, FrameType::Request);
            let request: ClientRequest = MsgPackCodec::decode(frame.body()).unwrap();
            assert_eq!(request.payload_type, RequestPayload::Heartbeat);
        }

        // Each heartbeat is pending until a response arrives.
        assert_eq!(latency.lock().unwrap().pending_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_generation_stops_task() {
        let (client, _server) = tokio::io::duplex(4096);
        let (writer, _writer_task) = spawn_writer_task(client);
        let latency = Arc::new(Mutex::new(LatencyAnalyzer::new()));
        let generation = Arc::new(AtomicU64::new(1));

        let task = spawn_heartbeat_task(
            Duration::from_secs(30),
            writer,
            latency.clone(),
            generation.clone(),
            1,
        );

        generation.store(2, Ordering::Release);

        // Next tick observes the bump and exits without sending.
        task.await.unwrap();
        assert_eq!(latency.lock().unwrap().pending_count(), 0);
    }
}
