//! Synchronous window double for unit tests

use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::window::{ListenerId, MessageEvent, NativeListener, WindowLike};

/// Records posts; `fire` runs listeners immediately
#[derive(Default)]
pub(crate) struct MockWindow {
    posted: Mutex<Vec<(Value, String)>>,
    listeners: Mutex<Vec<(ListenerId, NativeListener)>>,
    next_id: AtomicU64,
}

impl MockWindow {
    pub fn fire(&self, origin: &str, data: Value) {
        let event = MessageEvent {
            origin: origin.to_string(),
            data,
        };
        let listeners: Vec<NativeListener> =
            self.listeners.lock().iter().map(|(_, l)| l.clone()).collect();
        for listener in listeners {
            listener(&event);
        }
    }

    pub fn posted(&self) -> Vec<(Value, String)> {
        self.posted.lock().clone()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }
}

impl WindowLike for MockWindow {
    fn post_message(&self, data: Value, target_origin: &str) {
        self.posted.lock().push((data, target_origin.to_string()));
    }

    fn add_message_listener(&self, listener: NativeListener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.listeners.lock().push((id, listener));
        id
    }

    fn remove_message_listener(&self, id: ListenerId) {
        self.listeners.lock().retain(|(l, _)| *l != id);
    }
}
