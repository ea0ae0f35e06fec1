//! In-process windows
//!
//! `MemoryWindow` honours the postMessage contract without a browser:
//! delivery is queued and runs on a Tokio task, one queue per receiving
//! window (so order is kept per target), events carry the sender's origin
//! and a non-matching `target_origin` drops the message.
//!
//! A window posts to another through a handle that knows who is sending:
//!
//! ```ignore
//! let parent = MemoryWindow::new("https://app.example");
//! let frame = MemoryWindow::new("https://widget.example");
//! MemoryWindow::embed(&parent, &frame);
//!
//! // frame -> parent, stamped "https://widget.example"
//! frame.parent().unwrap().post_message(json!(1), "https://app.example");
//! ```

use parking_lot::RwLock;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::origin::normalize_origin;
use crate::window::{BrowsingContext, ListenerId, MessageEvent, NativeListener, WindowLike, ANY_ORIGIN};

pub struct MemoryWindow {
    origin: String,
    referrer: RwLock<Option<String>>,
    ancestors: RwLock<Vec<String>>,
    parent: RwLock<Option<Arc<dyn WindowLike>>>,
    opener: RwLock<Option<Arc<dyn WindowLike>>>,
    listeners: RwLock<Vec<(ListenerId, NativeListener)>>,
    next_listener: AtomicU64,
    inbox: mpsc::UnboundedSender<MessageEvent>,
}

impl MemoryWindow {
    /// Create a window and its delivery task
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(origin: impl Into<String>) -> Arc<Self> {
        let origin = origin.into();
        let origin = normalize_origin(&origin).unwrap_or(origin);
        let (inbox, mut queue) = mpsc::unbounded_channel::<MessageEvent>();

        let window = Arc::new(Self {
            origin,
            referrer: RwLock::new(None),
            ancestors: RwLock::new(Vec::new()),
            parent: RwLock::new(None),
            opener: RwLock::new(None),
            listeners: RwLock::new(Vec::new()),
            next_listener: AtomicU64::new(1),
            inbox,
        });

        let weak = Arc::downgrade(&window);
        tokio::spawn(async move {
            while let Some(event) = queue.recv().await {
                match weak.upgrade() {
                    Some(window) => window.deliver(&event),
                    None => break,
                }
            }
        });

        window
    }

    /// This window as seen by a sender at `source_origin`
    pub fn handle(self: &Arc<Self>, source_origin: impl Into<String>) -> Arc<dyn WindowLike> {
        Arc::new(WindowHandle {
            target: self.clone(),
            source_origin: source_origin.into(),
        })
    }

    /// Put `child` in an iframe inside `parent`
    pub fn embed(parent: &Arc<Self>, child: &Arc<Self>) {
        *child.parent.write() = Some(parent.handle(child.origin.clone()));
        *child.referrer.write() = Some(format!("{}/", parent.origin));

        let mut ancestors = vec![parent.origin.clone()];
        ancestors.extend(parent.ancestors.read().iter().cloned());
        *child.ancestors.write() = ancestors;
    }

    /// Make `popup` a window opened by `opener`
    pub fn open(opener: &Arc<Self>, popup: &Arc<Self>) {
        *popup.opener.write() = Some(opener.handle(popup.origin.clone()));
        *popup.referrer.write() = Some(format!("{}/", opener.origin));
    }

    pub fn set_referrer(&self, referrer: Option<String>) {
        *self.referrer.write() = referrer;
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Run every listener now, bypassing the queue
    pub fn deliver(&self, event: &MessageEvent) {
        let listeners: Vec<NativeListener> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(event);
        }
    }

    fn enqueue(&self, data: Value, target_origin: &str, source_origin: &str) {
        if target_origin != ANY_ORIGIN {
            let matches = normalize_origin(target_origin)
                .map(|target| target == self.origin)
                .unwrap_or(false);
            if !matches {
                tracing::debug!(
                    "Drop message for {}: target origin {} does not match",
                    self.origin,
                    target_origin
                );
                return;
            }
        }

        let event = MessageEvent {
            origin: source_origin.to_string(),
            data,
        };
        if self.inbox.send(event).is_err() {
            tracing::debug!("Delivery task for {} is gone", self.origin);
        }
    }
}

impl WindowLike for MemoryWindow {
    /// Post to this window from itself
    fn post_message(&self, data: Value, target_origin: &str) {
        self.enqueue(data, target_origin, &self.origin);
    }

    fn add_message_listener(&self, listener: NativeListener) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::SeqCst));
        self.listeners.write().push((id, listener));
        id
    }

    fn remove_message_listener(&self, id: ListenerId) {
        self.listeners.write().retain(|(listener, _)| *listener != id);
    }
}

impl BrowsingContext for MemoryWindow {
    fn origin(&self) -> String {
        self.origin.clone()
    }

    fn opener(&self) -> Option<Arc<dyn WindowLike>> {
        self.opener.read().clone()
    }

    fn parent(&self) -> Option<Arc<dyn WindowLike>> {
        self.parent.read().clone()
    }

    fn referrer(&self) -> Option<String> {
        self.referrer.read().clone()
    }

    fn ancestor_origins(&self) -> Vec<String> {
        self.ancestors.read().clone()
    }
}

impl std::fmt::Debug for MemoryWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryWindow")
            .field("origin", &self.origin)
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// Reference to a window held by another context
struct WindowHandle {
    target: Arc<MemoryWindow>,
    source_origin: String,
}

impl WindowLike for WindowHandle {
    fn post_message(&self, data: Value, target_origin: &str) {
        self.target.enqueue(data, target_origin, &self.source_origin);
    }

    fn add_message_listener(&self, listener: NativeListener) -> ListenerId {
        self.target.add_message_listener(listener)
    }

    fn remove_message_listener(&self, id: ListenerId) {
        self.target.remove_message_listener(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::timeout;

    fn collect(window: &MemoryWindow) -> mpsc::UnboundedReceiver<MessageEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        window.add_message_listener(Arc::new(move |event: &MessageEvent| {
            let _ = tx.send(event.clone());
        }));
        rx
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<MessageEvent>) -> MessageEvent {
        timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("delivery timed out")
            .expect("channel closed")
    }

    #[tokio::test]
    async fn test_delivery_is_asynchronous_and_ordered() {
        let window = MemoryWindow::new("https://app.example");
        let mut rx = collect(&window);

        let sender = window.handle("https://other.example");
        sender.post_message(json!(1), "*");
        sender.post_message(json!(2), "https://app.example");

        // Nothing ran inside post_message
        assert!(rx.try_recv().is_err());

        let first = next(&mut rx).await;
        let second = next(&mut rx).await;
        assert_eq!(first.data, json!(1));
        assert_eq!(second.data, json!(2));
        assert_eq!(first.origin, "https://other.example");
    }

    #[tokio::test]
    async fn test_target_origin_mismatch_is_dropped() {
        let window = MemoryWindow::new("https://app.example");
        let mut rx = collect(&window);

        let sender = window.handle("https://other.example");
        sender.post_message(json!("lost"), "https://elsewhere.example");
        sender.post_message(json!("kept"), "https://app.example/some/path");

        assert_eq!(next(&mut rx).await.data, json!("kept"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_removed_listener_gets_nothing() {
        let window = MemoryWindow::new("https://app.example");
        let (tx, mut rx) = mpsc::unbounded_channel::<MessageEvent>();
        let id = window.add_message_listener(Arc::new(move |event: &MessageEvent| {
            let _ = tx.send(event.clone());
        }));
        let mut witness = collect(&window);

        window.remove_message_listener(id);
        window.post_message(json!(1), "*");

        next(&mut witness).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(window.listener_count(), 1);
    }

    #[tokio::test]
    async fn test_embed_links_child_to_parent() {
        let parent = MemoryWindow::new("https://app.example");
        let child = MemoryWindow::new("https://widget.example");
        MemoryWindow::embed(&parent, &child);
        let mut rx = collect(&parent);

        assert_eq!(child.referrer().as_deref(), Some("https://app.example/"));
        assert_eq!(child.ancestor_origins(), vec!["https://app.example"]);
        assert!(child.opener().is_none());

        let parent_handle = child.parent().unwrap();
        parent_handle.post_message(json!("hi"), "https://app.example");

        let event = next(&mut rx).await;
        assert_eq!(event.origin, "https://widget.example");
        assert_eq!(event.data, json!("hi"));
    }

    #[tokio::test]
    async fn test_open_links_popup_to_opener() {
        let opener = MemoryWindow::new("https://app.example");
        let popup = MemoryWindow::new("https://login.example");
        MemoryWindow::open(&opener, &popup);

        assert!(popup.opener().is_some());
        assert!(popup.parent().is_none());
        assert_eq!(popup.referrer().as_deref(), Some("https://app.example/"));
    }
}
