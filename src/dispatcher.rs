//! Message dispatcher routing decoded responses to registered handlers.
//!
//! Handlers subscribe by [`ResponsePayload`] tag. A single tag may have
//! any number of handlers; they run in registration order, and a failing
//! or panicking handler never prevents the remaining handlers from
//! running.
//!
//! # Example
//!
//! ```
//! use imwire_client::dispatcher::MessageDispatcher;
//! use imwire_client::envelope::{ClientResponse, ResponsePayload};
//!
//! let dispatcher = MessageDispatcher::new();
//! let id = dispatcher.register(ResponsePayload::ChatPush, |resp| {
//!     println!("chat push, {} bytes", resp.payload.as_deref().map_or(0, |p| p.len()));
//!     Ok(())
//! });
//!
//! dispatcher.dispatch(&ClientResponse {
//!     req_id: None,
//!     code: 0,
//!     msg: None,
//!     payload_type: ResponsePayload::ChatPush,
//!     payload: Some(vec![1, 2, 3]),
//! });
//!
//! dispatcher.unregister(id);
//! ```

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, error, warn};

use crate::envelope::{ClientResponse, ResponsePayload};
use crate::error::Result;

/// Opaque token identifying a registered handler.
///
/// Returned by [`MessageDispatcher::register`]; pass it back to
/// [`MessageDispatcher::unregister`] to remove the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Boxed handler function invoked with each matching response.
pub type HandlerFn = Arc<dyn Fn(&ClientResponse) -> Result<()> + Send + Sync>;

/// Dispatcher mapping response payload tags to handler lists.
///
/// Cheap to share: internally `Arc`-backed registration state behind a
/// mutex, which is never held while a handler runs.
pub struct MessageDispatcher {
    /// Handlers by payload tag, in registration order.
    handlers: Mutex<HashMap<ResponsePayload, Vec<(HandlerId, HandlerFn)>>>,
    /// Next handler ID to assign.
    next_id: AtomicU64,
}

impl MessageDispatcher {
    /// Create a new empty dispatcher.
    pub fn new() -> Self {
        Self {
            handlers: Mutex::new(HashMap::new()),
            // Start from 1, 0 is reserved
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a handler for a payload tag.
    ///
    /// Multiple handlers may share a tag; they are invoked in the order
    /// they were registered.
    pub fn register<F>(&self, payload_type: ResponsePayload, handler: F) -> HandlerId
    where
        F: Fn(&ClientResponse) -> Result<()> + Send + Sync + 'static,
    {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));

        let mut handlers = lock_poisoned_ok(&self.handlers);
        handlers
            .entry(payload_type)
            .or_default()
            .push((id, Arc::new(handler)));

        debug!(?payload_type, handler_id = id.0, "Handler registered");
        id
    }

    /// Remove a previously registered handler.
    ///
    /// Returns `true` if the handler was found and removed. Unregistering
    /// an already-removed ID is a no-op.
    pub fn unregister(&self, id: HandlerId) -> bool {
        let mut handlers = lock_poisoned_ok(&self.handlers);

        for list in handlers.values_mut() {
            if let Some(pos) = list.iter().position(|(hid, _)| *hid == id) {
                list.remove(pos);
                debug!(handler_id = id.0, "Handler unregistered");
                return true;
            }
        }
        false
    }

    /// Number of handlers registered for a tag.
    pub fn handler_count(&self, payload_type: ResponsePayload) -> usize {
        lock_poisoned_ok(&self.handlers)
            .get(&payload_type)
            .map_or(0, Vec::len)
    }

    /// Dispatch a response to all handlers registered for its tag.
    ///
    /// Handlers run in registration order. A handler returning `Err` or
    /// panicking is logged and skipped; the rest still run. A response
    /// with no registered handler is logged at warn level and dropped.
    pub fn dispatch(&self, response: &ClientResponse) {
        // Clone the handler list out so no lock is held during calls;
        // a handler may itself register or unregister.
        let snapshot: Vec<(HandlerId, HandlerFn)> = lock_poisoned_ok(&self.handlers)
            .get(&response.payload_type)
            .cloned()
            .unwrap_or_default();

        if snapshot.is_empty() {
            warn!(
                payload_type = ?response.payload_type,
                req_id = ?response.req_id,
                "No handler registered for response"
            );
            return;
        }

        for (id, handler) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| handler(response))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(
                        handler_id = id.0,
                        payload_type = ?response.payload_type,
                        error = %e,
                        "Handler failed"
                    );
                }
                Err(_) => {
                    error!(
                        handler_id = id.0,
                        payload_type = ?response.payload_type,
                        "Handler panicked"
                    );
                }
            }
        }
    }

    /// Remove all handlers for all tags.
    pub fn clear(&self) {
        lock_poisoned_ok(&self.handlers).clear();
    }
}

impl Default for MessageDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MessageDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = lock_poisoned_ok(&self.handlers);
        let counts: HashMap<ResponsePayload, usize> =
            handlers.iter().map(|(k, v)| (*k, v.len())).collect();
        f.debug_struct("MessageDispatcher")
            .field("handlers", &counts)
            .finish()
    }
}

/// Lock a mutex, recovering the guard if a panicking handler poisoned it.
fn lock_poisoned_ok<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
