//! Window Transport for the message bus
//!
//! Carries bus messages between two window-like contexts (parent and
//! iframe, opener and popup) over postMessage, gated by origin and an
//! optional logical channel id.
//!
//! ## Core Design
//!
//! ```text
//! Bus ─► WindowAdapter ─► WindowProtocol (dispatch) ─► WindowLike::post_message
//!                                                           │ async
//! Bus ◄─ WindowAdapter ◄─ WindowProtocol (listen)   ◄── native message event
//!        (origin, shape, channel checks)
//! ```
//!
//! - **Origin is the only access control**: allow-lists are fixed at construction
//! - **Destroy is final**: endpoints are swapped for inert stand-ins

pub mod adapter;
pub mod config;
pub mod error;
pub mod log;
pub mod memory;
pub mod origin;
pub mod protocol;
pub mod window;

#[cfg(test)]
mod testing;

pub use adapter::WindowAdapter;
pub use config::{OneOrMany, WindowAdapterOptions};
pub use error::{Result, WindowError};
pub use log::{Console, LogLevel};
pub use memory::MemoryWindow;
pub use origin::{ChannelPolicy, OriginPolicy};
pub use protocol::{ProtocolRole, SubscriberId, WindowProtocol};
pub use window::{BrowsingContext, ListenerId, MessageEvent, NativeListener, NoopWindow, WindowLike, ANY_ORIGIN};
