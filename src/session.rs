//! Session lifecycle manager.
//!
//! Owns the channel and everything running over it: the writer task,
//! the read loop, the heartbeat timer, and the reconnect state machine.
//! All other components (frame buffer, dispatcher, latency analyzer)
//! are wired together here.
//!
//! One [`Session`] is one logical connection. Reconnects replace the
//! channel, writer, and frame buffer wholesale; a generation counter
//! marks tasks from a superseded connection as inert, so a stale timer
//! or read loop can never write into the live session.
//!
//! # Example
//!
//! ```ignore
//! use imwire_client::envelope::{AuthRequest, RequestPayload, ResponsePayload};
//! use imwire_client::session::Session;
//! use imwire_client::transport::TcpConnector;
//!
//! let session = Session::builder(
//!     TcpConnector::new("gateway.example.net:4433"),
//!     AuthRequest {
//!         token: token,
//!         device_id: device_id,
//!         platform: "desktop".to_string(),
//!     },
//! )
//! .build();
//!
//! session.dispatcher().register(ResponsePayload::ChatPush, |resp| {
//!     // feed UI store
//!     Ok(())
//! });
//!
//! session.connect().await?;
//! let req_id = session.send(RequestPayload::ChatSend, payload).await?;
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, ReadHalf};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::codec::MsgPackCodec;
use crate::dispatcher::MessageDispatcher;
use crate::envelope::{AuthRequest, ClientRequest, ClientResponse, RequestPayload};
use crate::error::{ImwireError, Result};
use crate::heartbeat::{spawn_heartbeat_task, DEFAULT_HEARTBEAT_INTERVAL};
use crate::latency::{LatencyAnalyzer, LatencyStats};
use crate::protocol::{build_frame, Frame, FrameBuffer, FrameType, DEFAULT_MAX_BODY_LEN};
use crate::transport::{BoxedChannel, Connector};
use crate::writer::{spawn_writer_task, WriterHandle};

/// Default delay before the first reconnect attempt.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Default reconnect attempt budget.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Read buffer size for the receive loop.
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Connection status, owned by the session; observers read it via
/// [`Session::status`] and status-change callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No channel, no retry scheduled.
    Disconnected,
    /// A connect attempt is in flight.
    Connecting,
    /// Channel up, auth sent, read loop running.
    Connected,
    /// Channel lost; a retry is scheduled.
    Reconnecting,
}

/// Opaque token identifying a registered status observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserverId(u64);

type StatusObserver = Arc<dyn Fn(ConnectionState) + Send + Sync>;

/// Session tuning knobs.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Delay before the first reconnect attempt; doubles per attempt.
    pub base_delay: Duration,
    /// Consecutive failed attempts tolerated before giving up.
    pub max_reconnect_attempts: u32,
    /// Interval between heartbeat requests.
    pub heartbeat_interval: Duration,
    /// Maximum accepted frame body length.
    pub max_body_len: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            max_body_len: DEFAULT_MAX_BODY_LEN,
        }
    }
}

/// Builder for configuring and creating a [`Session`].
pub struct SessionBuilder {
    connector: Arc<dyn Connector>,
    auth: AuthRequest,
    config: SessionConfig,
}

impl SessionBuilder {
    /// Delay before the first reconnect attempt (doubles per attempt).
    ///
    /// Default: 1 second.
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.config.base_delay = delay;
        self
    }

    /// Reconnect attempt budget before giving up.
    ///
    /// Default: 3.
    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.config.max_reconnect_attempts = attempts;
        self
    }

    /// Interval between heartbeat requests.
    ///
    /// Default: 30 seconds.
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.config.heartbeat_interval = interval;
        self
    }

    /// Maximum accepted frame body length.
    ///
    /// Default: 16 MiB.
    pub fn max_body_len(mut self, len: u32) -> Self {
        self.config.max_body_len = len;
        self
    }

    /// Build the session. No connection is attempted until
    /// [`Session::connect`].
    pub fn build(self) -> Session {
        Session {
            shared: Arc::new(SessionShared {
                config: self.config,
                connector: self.connector,
                auth: self.auth,
                dispatcher: Arc::new(MessageDispatcher::new()),
                latency: Arc::new(Mutex::new(LatencyAnalyzer::new())),
                generation: Arc::new(AtomicU64::new(0)),
                state: Mutex::new(SessionState {
                    status: ConnectionState::Disconnected,
                    attempts: 0,
                    writer: None,
                    read_task: None,
                    writer_task: None,
                    heartbeat_task: None,
                    reconnect_task: None,
                }),
                observers: Mutex::new(Vec::new()),
                next_observer_id: AtomicU64::new(1),
            }),
        }
    }
}

/// Mutable session state behind one lock, never held across awaits.
struct SessionState {
    status: ConnectionState,
    /// Consecutive failed reconnect attempts; reset on success.
    attempts: u32,
    writer: Option<WriterHandle>,
    read_task: Option<JoinHandle<()>>,
    writer_task: Option<JoinHandle<Result<()>>>,
    heartbeat_task: Option<JoinHandle<()>>,
    reconnect_task: Option<JoinHandle<()>>,
}

impl SessionState {
    /// Drop every per-connection resource. The caller must have bumped
    /// the generation first so the aborted tasks' peers go inert.
    fn teardown(&mut self) {
        self.writer = None;
        if let Some(task) = self.read_task.take() {
            task.abort();
        }
        if let Some(task) = self.heartbeat_task.take() {
            task.abort();
        }
        if let Some(task) = self.reconnect_task.take() {
            task.abort();
        }
        self.writer_task = None;
    }
}

struct SessionShared {
    config: SessionConfig,
    connector: Arc<dyn Connector>,
    auth: AuthRequest,
    dispatcher: Arc<MessageDispatcher>,
    latency: Arc<Mutex<LatencyAnalyzer>>,
    /// Bumped on every connection attempt and teardown; tasks capture
    /// the value they were spawned under and stand down on mismatch.
    generation: Arc<AtomicU64>,
    state: Mutex<SessionState>,
    observers: Mutex<Vec<(ObserverId, StatusObserver)>>,
    next_observer_id: AtomicU64,
}

impl SessionShared {
    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_latency(&self) -> MutexGuard<'_, LatencyAnalyzer> {
        match self.latency.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Invoke every status observer. Never called with a lock held.
    fn notify(&self, status: ConnectionState) {
        let observers: Vec<StatusObserver> = match self.observers.lock() {
            Ok(guard) => guard.iter().map(|(_, f)| f.clone()).collect(),
            Err(poisoned) => poisoned.into_inner().iter().map(|(_, f)| f.clone()).collect(),
        };
        for observer in observers {
            observer(status);
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::Acquire) == generation
    }
}

/// One logical connection to the gateway.
///
/// Cheap to clone; all clones drive the same underlying session.
#[derive(Clone)]
pub struct Session {
    shared: Arc<SessionShared>,
}

impl Session {
    /// Start configuring a session over the given connector.
    pub fn builder(connector: impl Connector, auth: AuthRequest) -> SessionBuilder {
        SessionBuilder {
            connector: Arc::new(connector),
            auth,
            config: SessionConfig::default(),
        }
    }

    /// Current connection status.
    pub fn status(&self) -> ConnectionState {
        self.shared.lock_state().status
    }

    /// The dispatcher fed by this session's read loop.
    pub fn dispatcher(&self) -> Arc<MessageDispatcher> {
        self.shared.dispatcher.clone()
    }

    /// Register a status-change observer, invoked on every transition.
    pub fn on_status_change<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(ConnectionState) + Send + Sync + 'static,
    {
        let id = ObserverId(self.shared.next_observer_id.fetch_add(1, Ordering::Relaxed));
        match self.shared.observers.lock() {
            Ok(mut guard) => guard.push((id, Arc::new(observer))),
            Err(poisoned) => poisoned.into_inner().push((id, Arc::new(observer))),
        }
        id
    }

    /// Remove a status observer; returns whether it was registered.
    pub fn remove_observer(&self, id: ObserverId) -> bool {
        let mut observers = match self.shared.observers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let before = observers.len();
        observers.retain(|(oid, _)| *oid != id);
        observers.len() != before
    }

    /// Aggregate latency statistics, if any round trips completed.
    pub fn latency_stats(&self) -> Option<LatencyStats> {
        self.shared.lock_latency().stats()
    }

    /// Human-readable latency report.
    pub fn latency_report(&self) -> String {
        self.shared.lock_latency().report()
    }

    /// Requests sent but not yet answered.
    pub fn pending_count(&self) -> usize {
        self.shared.lock_latency().pending_count()
    }

    /// Establish the connection: open the channel, send the Auth frame,
    /// start the read loop and heartbeat.
    ///
    /// A no-op when already `connecting` or `connected`. A manual call
    /// while `reconnecting` supersedes the scheduled retry.
    ///
    /// # Errors
    ///
    /// Setup failures surface here and leave the session `disconnected`;
    /// no retry is scheduled for a failed initial connect.
    pub async fn connect(&self) -> Result<()> {
        let generation = {
            let mut state = self.shared.lock_state();
            if matches!(
                state.status,
                ConnectionState::Connecting | ConnectionState::Connected
            ) {
                debug!(status = ?state.status, "connect() ignored");
                return Ok(());
            }
            if let Some(task) = state.reconnect_task.take() {
                task.abort();
            }
            state.attempts = 0;
            state.status = ConnectionState::Connecting;
            self.shared.generation.fetch_add(1, Ordering::AcqRel) + 1
        };
        self.shared.notify(ConnectionState::Connecting);

        match establish(&self.shared, generation).await {
            Ok(()) => Ok(()),
            Err(e) => {
                let rolled_back = {
                    let mut state = self.shared.lock_state();
                    if self.shared.is_current(generation) {
                        state.status = ConnectionState::Disconnected;
                        true
                    } else {
                        false
                    }
                };
                if rolled_back {
                    self.shared.notify(ConnectionState::Disconnected);
                }
                Err(e)
            }
        }
    }

    /// Tear the session down: cancel any in-flight connect or scheduled
    /// retry, stop all tasks, close the channel.
    ///
    /// Idempotent; always ends in `disconnected` with the retry counter
    /// cleared.
    pub async fn disconnect(&self) {
        // Bump first so tasks not yet aborted see themselves superseded.
        self.shared.generation.fetch_add(1, Ordering::AcqRel);

        let changed = {
            let mut state = self.shared.lock_state();
            state.teardown();
            state.attempts = 0;
            let changed = state.status != ConnectionState::Disconnected;
            state.status = ConnectionState::Disconnected;
            changed
        };
        if changed {
            info!("Disconnected");
            self.shared.notify(ConnectionState::Disconnected);
        }
    }

    /// Build, track, and queue a request; returns its `req_id`.
    ///
    /// All sends funnel through the writer task, so concurrent callers
    /// never interleave bytes on the stream.
    ///
    /// # Errors
    ///
    /// [`ImwireError::NotConnected`] unless the session is `connected`;
    /// [`ImwireError::ConnectionClosed`] when the channel died under us.
    pub async fn send(&self, payload_type: RequestPayload, payload: Vec<u8>) -> Result<String> {
        let request = ClientRequest::new(payload_type, payload);
        let body = MsgPackCodec::encode(&request)?;

        self.shared.lock_latency().record_send(&request.req_id);

        if let Err(e) = self.send_frame(FrameType::Request, &body).await {
            self.shared.lock_latency().forget(&request.req_id);
            return Err(e);
        }

        debug!(req_id = %request.req_id, ?payload_type, "Request queued");
        Ok(request.req_id)
    }

    /// Queue one raw frame on the writer.
    ///
    /// Lower-level sibling of [`send`](Session::send) for callers that
    /// build their own frame bodies; same connected-only rule and
    /// writer-queue serialization.
    pub async fn send_frame(&self, frame_type: FrameType, body: &[u8]) -> Result<()> {
        let writer = {
            let state = self.shared.lock_state();
            if state.status != ConnectionState::Connected {
                return Err(ImwireError::NotConnected);
            }
            state.writer.clone().ok_or(ImwireError::NotConnected)?
        };

        writer
            .send(Bytes::from(build_frame(frame_type, body)?))
            .await
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("status", &self.status())
            .field("pending", &self.pending_count())
            .finish()
    }
}

/// Open the channel, authenticate, and wire up the per-connection tasks.
async fn establish(shared: &Arc<SessionShared>, generation: u64) -> Result<()> {
    let channel = shared.connector.connect().await?;

    // disconnect() may have raced the dial; drop the fresh channel
    // instead of completing into a stale session.
    if !shared.is_current(generation) {
        return Err(ImwireError::ConnectionAborted);
    }

    let (reader, write_half) = tokio::io::split(channel);
    let (writer, writer_task) = spawn_writer_task(write_half);

    // Auth frame is the first bytes on the stream.
    let auth_body = MsgPackCodec::encode(&shared.auth)?;
    writer
        .send(Bytes::from(build_frame(FrameType::Auth, &auth_body)?))
        .await?;

    let read_task = tokio::spawn(read_loop(shared.clone(), generation, reader));
    let heartbeat_task = spawn_heartbeat_task(
        shared.config.heartbeat_interval,
        writer.clone(),
        shared.latency.clone(),
        shared.generation.clone(),
        generation,
    );

    {
        let mut state = shared.lock_state();
        if !shared.is_current(generation) {
            read_task.abort();
            heartbeat_task.abort();
            return Err(ImwireError::ConnectionAborted);
        }
        state.writer = Some(writer);
        state.read_task = Some(read_task);
        state.writer_task = Some(writer_task);
        state.heartbeat_task = Some(heartbeat_task);
        state.attempts = 0;
        state.status = ConnectionState::Connected;
    }

    info!("Connected");
    shared.notify(ConnectionState::Connected);
    Ok(())
}

/// Receive loop for one connection: read chunks, assemble frames,
/// decode envelopes, dispatch.
async fn read_loop(
    shared: Arc<SessionShared>,
    generation: u64,
    mut reader: ReadHalf<BoxedChannel>,
) {
    let mut frame_buffer = FrameBuffer::with_max_body_len(shared.config.max_body_len);
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    let failure = loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break ImwireError::ConnectionClosed,
            Ok(n) => n,
            Err(e) => break ImwireError::Io(e),
        };

        if !shared.is_current(generation) {
            debug!("Read loop superseded, stopping");
            return;
        }

        // A framing error (corrupt length or unknown type) means the
        // stream can no longer be resynchronized; close and reconnect.
        let frames = match frame_buffer.push(&buf[..n]) {
            Ok(frames) => frames,
            Err(e) => break e,
        };

        for frame in frames {
            handle_frame(&shared, frame);
        }
    };

    if shared.is_current(generation) {
        warn!(error = %failure, "Transport failure");
        handle_transport_failure(&shared, generation, &failure);
    }
}

/// Decode one inbound frame and route it.
fn handle_frame(shared: &SessionShared, frame: Frame) {
    match frame.frame_type {
        FrameType::AuthAck => match MsgPackCodec::decode::<ClientResponse>(frame.body()) {
            Ok(ack) if ack.is_ok() => info!("Authenticated"),
            Ok(ack) => warn!(code = ack.code, msg = ?ack.msg, "Authentication rejected"),
            Err(e) => error!(error = %e, "Malformed auth ack, discarding"),
        },
        FrameType::Response => {
            let response: ClientResponse = match MsgPackCodec::decode(frame.body()) {
                Ok(response) => response,
                Err(e) => {
                    // Frame boundary is intact; only this body is lost.
                    error!(error = %e, "Malformed response body, discarding frame");
                    return;
                }
            };

            if let Some(req_id) = &response.req_id {
                if shared.lock_latency().record_receive(req_id).is_none() {
                    debug!(req_id = %req_id, "Response without pending request");
                }
            }

            shared.dispatcher.dispatch(&response);
        }
        FrameType::Auth | FrameType::Request => {
            warn!(frame_type = ?frame.frame_type, "Server sent client-bound frame, discarding");
        }
    }
}

/// Backoff delay for the given attempt (1-based): doubles per attempt,
/// saturating instead of overflowing under very large retry budgets.
fn reconnect_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 1u32
        .checked_shl(attempt.saturating_sub(1))
        .unwrap_or(u32::MAX);
    base.saturating_mul(factor)
}

/// React to a dead channel: tear down the connection and either
/// schedule a backoff retry or give up.
fn handle_transport_failure(shared: &Arc<SessionShared>, failed_gen: u64, error: &ImwireError) {
    let mut state = shared.lock_state();
    if !shared.is_current(failed_gen) {
        return;
    }
    let retry_gen = shared.generation.fetch_add(1, Ordering::AcqRel) + 1;
    state.teardown();

    if state.attempts < shared.config.max_reconnect_attempts {
        state.attempts += 1;
        let attempt = state.attempts;
        let delay = reconnect_delay(shared.config.base_delay, attempt);
        warn!(attempt, ?delay, error = %error, "Scheduling reconnect");

        state.status = ConnectionState::Reconnecting;
        let shared_task = shared.clone();
        state.reconnect_task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !shared_task.is_current(retry_gen) {
                return;
            }

            {
                let mut state = shared_task.lock_state();
                if !shared_task.is_current(retry_gen) {
                    return;
                }
                state.status = ConnectionState::Connecting;
            }
            shared_task.notify(ConnectionState::Connecting);

            if let Err(e) = establish(&shared_task, retry_gen).await {
                warn!(attempt, error = %e, "Reconnect attempt failed");
                handle_transport_failure(&shared_task, retry_gen, &e);
            }
        }));
        drop(state);
        shared.notify(ConnectionState::Reconnecting);
    } else {
        warn!(error = %error, "Retry budget exhausted, giving up");
        state.attempts = 0;
        state.status = ConnectionState::Disconnected;
        drop(state);
        shared.notify(ConnectionState::Disconnected);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{BoxFuture, BoxedChannel};

    struct NeverConnector;

    impl Connector for NeverConnector {
        fn connect(&self) -> BoxFuture<'_, Result<BoxedChannel>> {
            Box::pin(async {
                Err(ImwireError::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "refused",
                )))
            })
        }
    }

    fn auth() -> AuthRequest {
        AuthRequest {
            token: "tok".to_string(),
            device_id: "dev".to_string(),
            platform: "test".to_string(),
        }
    }

    #[test]
    fn test_builder_defaults() {
        let session = Session::builder(NeverConnector, auth()).build();
        assert_eq!(session.shared.config.base_delay, DEFAULT_BASE_DELAY);
        assert_eq!(
            session.shared.config.max_reconnect_attempts,
            DEFAULT_MAX_RECONNECT_ATTEMPTS
        );
        assert_eq!(session.status(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_builder_overrides() {
        let session = Session::builder(NeverConnector, auth())
            .base_delay(Duration::from_millis(50))
            .max_reconnect_attempts(7)
            .heartbeat_interval(Duration::from_secs(5))
            .max_body_len(1024)
            .build();

        assert_eq!(session.shared.config.base_delay, Duration::from_millis(50));
        assert_eq!(session.shared.config.max_reconnect_attempts, 7);
        assert_eq!(
            session.shared.config.heartbeat_interval,
            Duration::from_secs(5)
        );
        assert_eq!(session.shared.config.max_body_len, 1024);
    }

    #[tokio::test]
    async fn test_send_while_disconnected_fails() {
        let session = Session::builder(NeverConnector, auth()).build();
        let result = session.send(RequestPayload::ChatSend, vec![1]).await;
        assert!(matches!(result, Err(ImwireError::NotConnected)));
    }

    #[tokio::test]
    async fn test_failed_connect_returns_to_disconnected() {
        let session = Session::builder(NeverConnector, auth()).build();

        assert!(session.connect().await.is_err());
        assert_eq!(session.status(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let session = Session::builder(NeverConnector, auth()).build();

        let transitions = Arc::new(Mutex::new(Vec::new()));
        let t = transitions.clone();
        session.on_status_change(move |status| t.lock().unwrap().push(status));

        session.disconnect().await;
        session.disconnect().await;

        assert_eq!(session.status(), ConnectionState::Disconnected);
        // Already disconnected, so no transition fired.
        assert!(transitions.lock().unwrap().is_empty());
    }

    #[test]
    fn test_reconnect_delay_doubles_and_saturates() {
        let base = Duration::from_millis(1000);
        assert_eq!(reconnect_delay(base, 1), Duration::from_millis(1000));
        assert_eq!(reconnect_delay(base, 2), Duration::from_millis(2000));
        assert_eq!(reconnect_delay(base, 3), Duration::from_millis(4000));

        // Attempts past the shift width must not panic.
        assert_eq!(reconnect_delay(base, 33), reconnect_delay(base, 64));
        assert_eq!(reconnect_delay(Duration::MAX, 2), Duration::MAX);
    }

    #[test]
    fn test_observer_removal() {
        let session = Session::builder(NeverConnector, auth()).build();

        let id = session.on_status_change(|_| {});
        assert!(session.remove_observer(id));
        assert!(!session.remove_observer(id));
    }
}
