//! Message Bus - request/response and events over any transport
//!
//! This crate turns a bare [`Adapter`] (send, listen, destroy) into a
//! publish/subscribe and request/response API with timeouts, duplicate
//! handler protection and adapter hot-swapping.
//!
//! # Architecture
//!
//! ```text
//! Bus::request ──► Message::Request ──► Adapter::send ──► (transport)
//!                                                            │
//! PendingRequest ◄── Message::Response ◄── Adapter listener ◄┘
//! ```
//!
//! 1. **Data first**: one wire enum, validated once at the edge
//! 2. **One owner per table**: pending requests and subscriptions belong
//!    to exactly one bus
//! 3. **No globals**: ids come from a generator held by each instance

pub mod adapter;
pub mod bus;
pub mod config;
pub mod error;
pub mod handler;
pub mod id;
pub mod protocol;
pub mod typed;

pub use adapter::{Adapter, MessageCallback};
pub use bus::Bus;
pub use config::{BusConfig, Timeout, NO_TIMEOUT};
pub use error::{BoxError, BusError, ProtocolError, Result};
pub use handler::{HandlerId, Reply};
pub use id::IdGenerator;
pub use protocol::{ChannelId, Message, MessageType, ResponseStatus};
pub use typed::{TypedEvent, TypedRequest};
