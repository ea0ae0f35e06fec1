//! Bus - The Protocol Core
//!
//! Design decisions:
//! 1. One adapter per bus. `change_adapter` builds a new bus and retires this one.
//! 2. Request/response matching via ID, events fanned out to subscribers
//! 3. Pending entries are removed exactly once: by the response, the
//!    deadline, the caller dropping the future, or `destroy`
//! 4. Never hold a table guard while calling into the adapter or a handler.
//!    Adapters may deliver synchronously and re-enter the bus.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::{self, BoxFuture};
use futures_util::FutureExt;
use serde_json::Value;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::adapter::Adapter;
use crate::config::{BusConfig, Timeout};
use crate::error::{BoxError, BusError, Result};
use crate::handler::{
    panic_message, EventHandler, HandlerId, Reply, RequestHandler, Subscription,
};
use crate::id::IdGenerator;
use crate::protocol::{
    EventMessage, Message, RequestId, RequestMessage, ResponseMessage, ResponseStatus,
};

const ACTIVE: u8 = 0;
const RETIRED: u8 = 1;
const DESTROYED: u8 = 2;

/// Typed publish/subscribe + request/response over an [`Adapter`]
///
/// Cheap to clone; all clones share the same tables.
#[derive(Clone)]
pub struct Bus {
    inner: Arc<BusInner>,
}

struct BusInner {
    id: String,
    ids: IdGenerator,
    config: BusConfig,
    adapter: Arc<dyn Adapter>,
    state: AtomicU8,

    /// Requests waiting for a response
    /// Key: request id, Value: oneshot sender for the outcome
    pending: DashMap<RequestId, oneshot::Sender<Result<Value>>>,

    /// Event subscribers in insertion order
    /// Key: event name, never an empty Vec
    subscribers: DashMap<String, Vec<Subscription>>,

    /// Request handlers, one per name
    handlers: DashMap<String, RequestHandler>,

    next_handler: AtomicU64,
}

impl Bus {
    pub fn new(adapter: Arc<dyn Adapter>) -> Self {
        Self::with_config(adapter, BusConfig::default())
    }

    pub fn with_config(adapter: Arc<dyn Adapter>, config: BusConfig) -> Self {
        let ids = IdGenerator::new();
        let id = ids.next("bus");

        let inner = Arc::new(BusInner {
            id,
            ids,
            config,
            adapter,
            state: AtomicU8::new(ACTIVE),
            pending: DashMap::new(),
            subscribers: DashMap::new(),
            handlers: DashMap::new(),
            next_handler: AtomicU64::new(1),
        });

        // Weak: the adapter must not keep the bus alive
        let weak = Arc::downgrade(&inner);
        inner.adapter.add_listener(Arc::new(move |message| {
            if let Some(inner) = weak.upgrade() {
                inner.on_message(message);
            }
        }));

        tracing::info!("Create Bus with id \"{}\"", inner.id);
        Self { inner }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn config(&self) -> &BusConfig {
        &self.inner.config
    }

    /// Send a fire-and-forget event
    pub fn dispatch_event(&self, name: &str, data: Option<Value>) -> Result<()> {
        self.inner.check_active()?;
        tracing::debug!("Dispatch event \"{}\" from bus \"{}\"", name, self.inner.id);
        self.inner.adapter.send(Message::event(name, data));
        Ok(())
    }

    /// Send a request using the configured default timeout
    pub fn request(&self, name: &str, data: Option<Value>) -> BoxFuture<'static, Result<Value>> {
        self.request_with_timeout(name, data, self.inner.config.default_timeout())
    }

    /// Send a request and wait for the matching response
    ///
    /// The request message goes out before this returns; the deadline
    /// counts from the call. With [`Timeout::Never`] the future can wait
    /// forever, so dropping it is the caller's job.
    pub fn request_with_timeout(
        &self,
        name: &str,
        data: Option<Value>,
        timeout: Timeout,
    ) -> BoxFuture<'static, Result<Value>> {
        if let Err(e) = self.inner.check_active() {
            return future::ready(Err(e)).boxed();
        }

        let id = self.inner.ids.next(&format!("{}-action", self.inner.id));
        let (tx, rx) = oneshot::channel();
        self.inner.pending.insert(id.clone(), tx);

        let deadline = match timeout {
            // Too far out to represent means no deadline at all
            Timeout::After(wait) => Instant::now()
                .checked_add(wait)
                .map(|deadline| (deadline, wait)),
            Timeout::Never => None,
        };
        let guard = PendingGuard {
            inner: Arc::downgrade(&self.inner),
            id: id.clone(),
        };

        tracing::debug!("Request \"{}\" with id \"{}\"", name, id);
        self.inner.adapter.send(Message::request(id, name, data));

        let name = name.to_string();
        let bus_id = self.inner.id.clone();
        async move {
            let _guard = guard;
            let outcome = match deadline {
                Some((deadline, wait)) => match tokio::time::timeout_at(deadline, rx).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        let error = BusError::Timeout {
                            name,
                            timeout_ms: wait.as_millis() as u64,
                        };
                        tracing::error!("{}", error);
                        return Err(error);
                    }
                },
                None => rx.await,
            };
            // Sender gone without an answer: the bus itself went away
            outcome.unwrap_or_else(|_| Err(BusError::Destroyed(bus_id)))
        }
        .boxed()
    }

    /// Subscribe to every occurrence of an event
    pub fn on<F>(&self, name: &str, handler: F) -> Result<HandlerId>
    where
        F: Fn(&Value) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.add_event_handler(name, Arc::new(handler), false)
    }

    /// Subscribe to the next occurrence only
    pub fn once<F>(&self, name: &str, handler: F) -> Result<HandlerId>
    where
        F: Fn(&Value) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.add_event_handler(name, Arc::new(handler), true)
    }

    pub(crate) fn add_event_handler(
        &self,
        name: &str,
        handler: EventHandler,
        once: bool,
    ) -> Result<HandlerId> {
        self.inner.check_active()?;
        let id = HandlerId(self.inner.next_handler.fetch_add(1, Ordering::SeqCst));
        self.inner
            .subscribers
            .entry(name.to_string())
            .or_default()
            .push(Subscription { id, handler, once });
        Ok(id)
    }

    /// Remove subscriptions
    ///
    /// - `(None, None)`: everything
    /// - `(Some(name), None)`: every handler for `name`
    /// - `(Some(name), Some(id))`: that one pair
    /// - `(None, Some(id))`: that handler under any name
    ///
    /// Removing something that is not there is a no-op.
    pub fn off(&self, name: Option<&str>, handler: Option<HandlerId>) {
        let subscribers = &self.inner.subscribers;
        match (name, handler) {
            (None, None) => subscribers.clear(),
            (Some(name), None) => {
                subscribers.remove(name);
            }
            (None, Some(id)) => subscribers.retain(|_, list| {
                list.retain(|s| s.id != id);
                !list.is_empty()
            }),
            (Some(name), Some(id)) => {
                if let Some(mut list) = subscribers.get_mut(name) {
                    list.retain(|s| s.id != id);
                }
                subscribers.remove_if(name, |_, list| list.is_empty());
            }
        }
    }

    /// Register the single handler for request `name`
    pub fn register_request_handler<F>(&self, name: &str, handler: F) -> Result<()>
    where
        F: Fn(Value) -> Reply + Send + Sync + 'static,
    {
        self.insert_request_handler(name, Arc::new(handler))
    }

    pub(crate) fn insert_request_handler(&self, name: &str, handler: RequestHandler) -> Result<()> {
        self.inner.check_active()?;
        match self.inner.handlers.entry(name.to_string()) {
            Entry::Occupied(_) => Err(BusError::DuplicateHandler(name.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(handler);
                Ok(())
            }
        }
    }

    pub fn unregister_handler(&self, name: &str) {
        self.inner.handlers.remove(name);
    }

    /// Move every subscription and request handler onto a new bus
    ///
    /// This bus is retired: its public calls fail with
    /// [`BusError::Retired`] and it ignores inbound events and requests.
    /// Requests already in flight still resolve. The old adapter is left
    /// alone; `destroy` the retired bus to release it.
    pub fn change_adapter(&self, adapter: Arc<dyn Adapter>) -> Result<Bus> {
        self.inner.check_active()?;
        let bus = Bus::with_config(adapter, self.inner.config.clone());

        for entry in self.inner.subscribers.iter() {
            bus.inner
                .subscribers
                .insert(entry.key().clone(), entry.value().clone());
        }
        for entry in self.inner.handlers.iter() {
            bus.inner
                .handlers
                .insert(entry.key().clone(), entry.value().clone());
        }
        // Keep handler ids valid for `off` on the new bus
        bus.inner.next_handler.store(
            self.inner.next_handler.load(Ordering::SeqCst),
            Ordering::SeqCst,
        );

        self.inner.state.store(RETIRED, Ordering::SeqCst);
        tracing::info!("Bus \"{}\" retired, replaced by \"{}\"", self.inner.id, bus.inner.id);
        Ok(bus)
    }

    /// Drop all subscriptions, reject pending requests, destroy the adapter
    pub fn destroy(&self) {
        if self.inner.state.swap(DESTROYED, Ordering::SeqCst) == DESTROYED {
            return;
        }
        tracing::info!("Destroy Bus \"{}\"", self.inner.id);

        self.off(None, None);
        self.inner.handlers.clear();
        self.inner.reject_pending();
        self.inner.adapter.destroy();
    }

    pub fn is_active(&self) -> bool {
        self.inner.state.load(Ordering::SeqCst) == ACTIVE
    }

    /// Number of requests still waiting (for testing)
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// Number of live subscriptions for `name` (for testing)
    pub fn subscriber_count(&self, name: &str) -> usize {
        self.inner
            .subscribers
            .get(name)
            .map(|list| list.len())
            .unwrap_or(0)
    }

    pub fn has_request_handler(&self, name: &str) -> bool {
        self.inner.handlers.contains_key(name)
    }
}

impl std::fmt::Debug for Bus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bus")
            .field("id", &self.inner.id)
            .field("state", &self.inner.state.load(Ordering::SeqCst))
            .field("pending", &self.inner.pending.len())
            .finish()
    }
}

impl BusInner {
    fn check_active(&self) -> Result<()> {
        match self.state.load(Ordering::SeqCst) {
            ACTIVE => Ok(()),
            RETIRED => Err(BusError::Retired(self.id.clone())),
            _ => Err(BusError::Destroyed(self.id.clone())),
        }
    }

    /// Handle an inbound message from the adapter
    fn on_message(&self, message: Message) {
        let state = self.state.load(Ordering::SeqCst);
        match message {
            Message::Response(response) if state != DESTROYED => self.finish_request(response),
            Message::Event(event) if state == ACTIVE => self.fire_event(event),
            Message::Request(request) if state == ACTIVE => self.respond(request),
            other => {
                tracing::debug!(
                    "Bus \"{}\" is not active, ignore {:?} message",
                    self.id,
                    other.message_type()
                );
            }
        }
    }

    fn fire_event(&self, event: EventMessage) {
        tracing::debug!("Has event with name \"{}\"", event.name);

        // Snapshot, then drop `once` entries before anything runs
        let batch = {
            let Some(mut list) = self.subscribers.get_mut(&event.name) else {
                return;
            };
            let batch = list.clone();
            list.retain(|s| !s.once);
            batch
        };
        self.subscribers
            .remove_if(&event.name, |_, list| list.is_empty());

        let data = event.data.unwrap_or(Value::Null);
        for subscription in batch {
            match panic::catch_unwind(AssertUnwindSafe(|| (subscription.handler)(&data))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!("Handler for event \"{}\" failed: {}", event.name, e)
                }
                Err(payload) => tracing::warn!(
                    "Handler for event \"{}\" panicked: {}",
                    event.name,
                    panic_message(payload.as_ref())
                ),
            }
        }
    }

    fn respond(&self, request: RequestMessage) {
        tracing::debug!(
            "Start action with id \"{}\" and name \"{}\"",
            request.id,
            request.name
        );

        let handler = self
            .handlers
            .get(&request.name)
            .map(|entry| entry.value().clone());
        let Some(handler) = handler else {
            let reason = format!("Has no handler for \"{}\" action!", request.name);
            tracing::warn!("{}", reason);
            self.adapter.send(Message::failure(request.id, reason));
            return;
        };

        let data = request.data.unwrap_or(Value::Null);
        let reply = match panic::catch_unwind(AssertUnwindSafe(|| handler(data))) {
            Ok(reply) => reply,
            Err(payload) => {
                let reason = panic_message(payload.as_ref());
                tracing::warn!("Handler for \"{}\" panicked: {}", request.name, reason);
                Reply::Ready(Err(reason))
            }
        };

        match reply {
            Reply::Ready(result) => self.adapter.send(response_for(request.id, result)),
            Reply::Deferred(reply) => match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    let adapter = self.adapter.clone();
                    let id = request.id;
                    let name = request.name.clone();
                    runtime.spawn(async move {
                        let result = match AssertUnwindSafe(reply).catch_unwind().await {
                            Ok(result) => result,
                            Err(payload) => {
                                let reason = panic_message(payload.as_ref());
                                tracing::warn!("Handler for \"{}\" panicked: {}", name, reason);
                                Err(reason)
                            }
                        };
                        adapter.send(response_for(id, result));
                    });
                }
                Err(_) => {
                    tracing::error!(
                        "No Tokio runtime to drive handler \"{}\"",
                        request.name
                    );
                    self.adapter.send(Message::failure(
                        request.id,
                        format!("Handler for \"{}\" could not be scheduled", request.name),
                    ));
                }
            },
        }
    }

    fn finish_request(&self, response: ResponseMessage) {
        let Some((_, tx)) = self.pending.remove(&response.id) else {
            // Timed out, cancelled, or never ours
            tracing::debug!("Ignore response for unknown request \"{}\"", response.id);
            return;
        };

        let outcome = match response.status {
            ResponseStatus::Success => {
                tracing::debug!("Request \"{}\" resolved", response.id);
                Ok(response.content)
            }
            ResponseStatus::Error => {
                let reason = content_to_string(response.content);
                tracing::warn!("Request \"{}\" failed: {}", response.id, reason);
                Err(BusError::Remote(reason))
            }
        };
        let _ = tx.send(outcome); // Receiver dropped: nobody is waiting
    }

    fn reject_pending(&self) {
        let ids: Vec<RequestId> = self.pending.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            if let Some((_, tx)) = self.pending.remove(&id) {
                let _ = tx.send(Err(BusError::Destroyed(self.id.clone())));
            }
        }
    }
}

fn response_for(id: RequestId, result: std::result::Result<Value, String>) -> Message {
    match result {
        Ok(content) => Message::success(id, content),
        Err(reason) => {
            tracing::warn!("Request \"{}\" handler failed: {}", id, reason);
            Message::failure(id, reason)
        }
    }
}

fn content_to_string(content: Value) -> String {
    match content {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Removes the pending entry when the request future completes or is dropped
struct PendingGuard {
    inner: Weak<BusInner>,
    id: RequestId,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.pending.remove(&self.id);
        }
    }
}
