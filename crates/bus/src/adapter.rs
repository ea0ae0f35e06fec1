//! Adapter - the transport seam under a Bus
//!
//! Three operations, nothing else. Each transport implements the trait
//! on its own; there is no shared base state.

use std::sync::Arc;

use crate::protocol::Message;

/// Inbound message callback registered by the bus
pub type MessageCallback = Arc<dyn Fn(Message) + Send + Sync>;

/// Bidirectional message channel
///
/// Implementations use interior mutability: a bus holds its adapter
/// behind an `Arc` and calls these from delivery callbacks.
pub trait Adapter: Send + Sync {
    /// Hand a message to the transport. Delivery is not guaranteed.
    fn send(&self, message: Message);

    /// Register a callback for every accepted inbound message
    fn add_listener(&self, callback: MessageCallback);

    /// Release the transport. Must be idempotent.
    fn destroy(&self);
}
