//! Window Protocol - one endpoint, one role
//!
//! A listen wrapper subscribes to native message events on its window
//! and republishes them to its own subscribers. A dispatch wrapper only
//! posts, always to the same target origin. After `destroy` the endpoint
//! is swapped for [`NoopWindow`], so stale callers are swallowed.

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::window::{ListenerId, MessageEvent, NoopWindow, WindowLike, ANY_ORIGIN};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolRole {
    Listen,
    Dispatch,
}

pub type MessageHandler = Arc<dyn Fn(&MessageEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

pub struct WindowProtocol {
    role: ProtocolRole,
    window: RwLock<Arc<dyn WindowLike>>,
    target_origin: String,
    native: Mutex<Option<ListenerId>>,
    subscribers: RwLock<Vec<(SubscriberId, MessageHandler)>>,
    next_subscriber: AtomicU64,
    destroyed: AtomicBool,
}

impl WindowProtocol {
    /// Wrap `window` for inbound traffic
    pub fn listen(window: Arc<dyn WindowLike>) -> Arc<Self> {
        let protocol = Arc::new(Self::build(ProtocolRole::Listen, window.clone(), ANY_ORIGIN));

        let weak = Arc::downgrade(&protocol);
        let id = window.add_message_listener(Arc::new(move |event: &MessageEvent| {
            if let Some(protocol) = weak.upgrade() {
                protocol.emit(event);
            }
        }));
        *protocol.native.lock() = Some(id);

        protocol
    }

    /// Wrap `window` for outbound traffic to `target_origin`
    pub fn dispatch(window: Arc<dyn WindowLike>, target_origin: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::build(ProtocolRole::Dispatch, window, target_origin))
    }

    fn build(
        role: ProtocolRole,
        window: Arc<dyn WindowLike>,
        target_origin: impl Into<String>,
    ) -> Self {
        Self {
            role,
            window: RwLock::new(window),
            target_origin: target_origin.into(),
            native: Mutex::new(None),
            subscribers: RwLock::new(Vec::new()),
            next_subscriber: AtomicU64::new(0),
            destroyed: AtomicBool::new(false),
        }
    }

    pub fn role(&self) -> ProtocolRole {
        self.role
    }

    pub fn target_origin(&self) -> &str {
        &self.target_origin
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Subscribe to republished `message` events (listen role)
    pub fn on_message(&self, handler: MessageHandler) -> SubscriberId {
        let id = SubscriberId(self.next_subscriber.fetch_add(1, Ordering::SeqCst));
        if !self.is_destroyed() {
            self.subscribers.write().push((id, handler));
        }
        id
    }

    pub fn off(&self, id: SubscriberId) {
        self.subscribers.write().retain(|(s, _)| *s != id);
    }

    /// Post `data` to the wrapped window (dispatch role)
    pub fn send(&self, data: Value) {
        if self.role != ProtocolRole::Dispatch {
            tracing::debug!("Ignore send on a listen-only window protocol");
            return;
        }
        let window = self.window.read().clone();
        window.post_message(data, &self.target_origin);
    }

    /// Detach from the native window. Safe to call repeatedly.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        let window: Arc<dyn WindowLike> = Arc::new(NoopWindow);
        let previous = std::mem::replace(&mut *self.window.write(), window);
        if let Some(id) = self.native.lock().take() {
            previous.remove_message_listener(id);
        }
        self.subscribers.write().clear();
    }

    fn emit(&self, event: &MessageEvent) {
        let handlers: Vec<MessageHandler> = self
            .subscribers
            .read()
            .iter()
            .map(|(_, handler)| handler.clone())
            .collect();
        for handler in handlers {
            handler(event);
        }
    }
}

impl std::fmt::Debug for WindowProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowProtocol")
            .field("role", &self.role)
            .field("target_origin", &self.target_origin)
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}
