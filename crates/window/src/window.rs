//! Window-like endpoints
//!
//! The native messaging primitive is a given capability: `post_message`
//! queues an asynchronous delivery to listeners on the target, stamped
//! with the sender's origin. These traits describe exactly that much.

use serde_json::Value;
use std::sync::Arc;

/// Target origin that matches any receiver
pub const ANY_ORIGIN: &str = "*";

/// Native message event as seen by a listener
#[derive(Debug, Clone, PartialEq)]
pub struct MessageEvent {
    /// Origin of the sending context
    pub origin: String,
    /// Opaque payload, validated by the adapter
    pub data: Value,
}

/// Handle for removing a native listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

pub type NativeListener = Arc<dyn Fn(&MessageEvent) + Send + Sync>;

/// Something messages can be posted to and received from
pub trait WindowLike: Send + Sync {
    /// Queue `data` for delivery if the receiver's origin matches `target_origin`
    fn post_message(&self, data: Value, target_origin: &str);

    fn add_message_listener(&self, listener: NativeListener) -> ListenerId;

    /// Cancel future deliveries to a listener. Unknown ids are ignored.
    fn remove_message_listener(&self, id: ListenerId);
}

/// The window this code runs in, with the links a child frame or popup has
pub trait BrowsingContext: WindowLike {
    /// Own origin, e.g. `https://app.example.com`
    fn origin(&self) -> String;

    /// Window that opened this one, for popups
    fn opener(&self) -> Option<Arc<dyn WindowLike>>;

    /// Embedding window, for iframes. `None` at the top level.
    fn parent(&self) -> Option<Arc<dyn WindowLike>>;

    /// `document.referrer`
    fn referrer(&self) -> Option<String> {
        None
    }

    /// `location.ancestorOrigins`, nearest first
    fn ancestor_origins(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Inert endpoint swapped in after destruction
///
/// Late calls from anyone still holding a reference go nowhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopWindow;

impl WindowLike for NoopWindow {
    fn post_message(&self, _data: Value, _target_origin: &str) {}

    fn add_message_listener(&self, _listener: NativeListener) -> ListenerId {
        ListenerId(0)
    }

    fn remove_message_listener(&self, _id: ListenerId) {}
}
